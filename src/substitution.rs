// Copyright 2024 Johannes Köster.
// Licensed under the MIT license (http://opensource.org/licenses/MIT)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Symmetric scoring tables over a residue alphabet.
//!
//! Tables are read from a plain text format: the first line lists the column
//! symbols, every following line starts with a row symbol and is followed by
//! the numeric entries of that row. Lines starting with `#` before the header
//! are comments, so `#` may be used as a symbol anywhere but first in the
//! header.
//!
//! ```
//! use phylo_nj::substitution::SubstitutionMatrix;
//!
//! let m = "   A  R  N
//!          A  4 -1 -2
//!          R -1  5  0
//!          N -2  0  6".parse::<SubstitutionMatrix>().unwrap();
//! assert_eq!(m.get(b'A', b'N'), Some(-2.0));
//! assert_eq!(m.get(b'N', b'A'), Some(-2.0));
//! ```

use std::fmt::{self, Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{InputError, ResourceError};
use crate::sequence::Symbol;

/// A square, symmetric symbol × symbol scoring table.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct SubstitutionMatrix {
    symbols: Vec<Symbol>,
    // row-major, symbols.len() squared
    scores: Vec<f64>,
    // symbol byte -> row
    index: Vec<Option<usize>>,
}

impl SubstitutionMatrix {
    /// Create a matrix from its symbols and rows, given in the same order.
    pub fn new(symbols: Vec<Symbol>, rows: Vec<Vec<f64>>) -> Result<Self, ResourceError> {
        let n = symbols.len();
        if n == 0 {
            return Err(ResourceError::Empty);
        }
        if rows.len() != n || rows.iter().any(|row| row.len() != n) {
            return Err(ResourceError::NotSquare {
                rows: rows.len(),
                columns: n,
            });
        }

        let mut index = vec![None; 256];
        for (i, &s) in symbols.iter().enumerate() {
            if index[s as usize].replace(i).is_some() {
                return Err(ResourceError::DuplicateSymbol(s as char));
            }
        }

        for (i, row) in rows.iter().enumerate() {
            if let Some(v) = row.iter().find(|v| !v.is_finite()) {
                return Err(ResourceError::NonNumeric {
                    row: symbols[i] as char,
                    value: v.to_string(),
                });
            }
            for j in 0..i {
                if row[j] != rows[j][i] {
                    return Err(ResourceError::Asymmetric {
                        a: symbols[i] as char,
                        b: symbols[j] as char,
                    });
                }
            }
        }

        Ok(SubstitutionMatrix {
            symbols,
            scores: rows.into_iter().flatten().collect(),
            index,
        })
    }

    /// A table scoring `matches` on the diagonal and `mismatch` everywhere else.
    /// Repeated symbols in `alphabet` are ignored.
    pub fn match_mismatch(alphabet: &[Symbol], matches: f64, mismatch: f64) -> Self {
        let mut symbols: Vec<Symbol> = Vec::with_capacity(alphabet.len());
        let mut index = vec![None; 256];
        for &s in alphabet {
            if index[s as usize].is_none() {
                index[s as usize] = Some(symbols.len());
                symbols.push(s);
            }
        }
        let n = symbols.len();
        let scores = (0..n * n)
            .map(|k| if k / n == k % n { matches } else { mismatch })
            .collect();
        SubstitutionMatrix {
            symbols,
            scores,
            index,
        }
    }

    /// Whether the table satisfies the invariants of [`SubstitutionMatrix::new`].
    /// Only needed for tables that did not come from a constructor, e.g.
    /// deserialized ones.
    pub fn is_well_formed(&self) -> bool {
        let n = self.symbols.len();
        if n == 0 || self.scores.len() != n * n {
            return false;
        }
        let rows = self.scores.chunks(n).map(<[f64]>::to_vec).collect();
        match SubstitutionMatrix::new(self.symbols.clone(), rows) {
            Ok(rebuilt) => rebuilt == *self,
            Err(_) => false,
        }
    }

    /// Read a table from a file in the text format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ResourceError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ResourceError::Missing {
            path: path.to_owned(),
            source,
        })?;
        text.parse()
    }

    /// The alphabet, in header order.
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Size of the alphabet.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn contains(&self, s: Symbol) -> bool {
        self.index[s as usize].is_some()
    }

    /// Score of the pair `(a, b)`, or `None` if either symbol is not in the table.
    pub fn get(&self, a: Symbol, b: Symbol) -> Option<f64> {
        let i = self.index[a as usize]?;
        let j = self.index[b as usize]?;
        Some(self.scores[i * self.symbols.len() + j])
    }

    /// Score of the pair `(a, b)`, failing for symbols outside the table.
    pub fn score(&self, a: Symbol, b: Symbol) -> Result<f64, InputError> {
        self.get(a, b).ok_or(InputError::UnknownSymbol {
            a: a as char,
            b: b as char,
        })
    }
}

fn single_symbol(token: &str) -> Result<Symbol, ResourceError> {
    match token.as_bytes() {
        [s] => Ok(*s),
        _ => Err(ResourceError::BadSymbol(token.to_owned())),
    }
}

impl FromStr for SubstitutionMatrix {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lines = s.lines().map(str::trim).filter(|l| !l.is_empty());

        let symbols = lines
            .by_ref()
            .find(|l| !l.starts_with('#'))
            .ok_or(ResourceError::Empty)?
            .split_whitespace()
            .map(single_symbol)
            .collect::<Result<Vec<_>, _>>()?;
        let n = symbols.len();

        let mut rows: Vec<Option<Vec<f64>>> = vec![None; n];
        let mut seen = 0;
        for (lineno, line) in lines.enumerate() {
            let mut fields = line.split_whitespace();
            // a line is never empty after the filter above
            let label = fields.next().unwrap_or_default();
            let row = single_symbol(label).map_err(|_| ResourceError::MalformedRow {
                row: lineno + 1,
                reason: format!("row label {:?} is not a single symbol", label),
            })?;
            let i = symbols.iter().position(|&c| c == row).ok_or_else(|| {
                ResourceError::MalformedRow {
                    row: lineno + 1,
                    reason: format!("row symbol {:?} is not a column", row as char),
                }
            })?;
            let entries = fields
                .map(|v| {
                    v.parse::<f64>().map_err(|_| ResourceError::NonNumeric {
                        row: row as char,
                        value: v.to_owned(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            if entries.len() != n {
                return Err(ResourceError::NotSquare {
                    rows: entries.len(),
                    columns: n,
                });
            }
            if rows[i].replace(entries).is_some() {
                return Err(ResourceError::MalformedRow {
                    row: lineno + 1,
                    reason: format!("row symbol {:?} is repeated", row as char),
                });
            }
            seen += 1;
        }
        if seen != n {
            return Err(ResourceError::NotSquare {
                rows: seen,
                columns: n,
            });
        }

        SubstitutionMatrix::new(symbols, rows.into_iter().flatten().collect())
    }
}

impl Display for SubstitutionMatrix {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let n = self.symbols.len();
        write!(f, " ")?;
        for &s in &self.symbols {
            write!(f, " {}", s as char)?;
        }
        writeln!(f)?;
        for (i, &s) in self.symbols.iter().enumerate() {
            write!(f, "{}", s as char)?;
            for v in &self.scores[i * n..(i + 1) * n] {
                write!(f, " {}", v)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Resolves substitution matrices by name from a single directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixStore {
    dir: PathBuf,
}

impl MatrixStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        MatrixStore { dir: dir.into() }
    }

    /// Location of the matrix called `name`.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn load(&self, name: &str) -> Result<SubstitutionMatrix, ResourceError> {
        SubstitutionMatrix::from_file(self.path(name))
    }
}

/// The matrices shipped with this crate (`BLOSUM62`, `DNA_IDENTITY`).
impl Default for MatrixStore {
    fn default() -> Self {
        MatrixStore::new(concat!(env!("CARGO_MANIFEST_DIR"), "/matrices"))
    }
}
