//! A distance matrix is stored as a list of taxon names, together with a square
//! or triangular matrix representing all pairwise distances.
//!
//! # Example
//!
//! ```rust
//! use phylo_nj::distance::Hamming;
//! use phylo_nj::distancematrix::DistanceMatrix;
//! use phylo_nj::sequence::Record;
//!
//! let records = vec![
//!     Record::from(("a", "NNN")),
//!     Record::from(("b", "ARN")),
//!     Record::from(("c", "NRN")),
//! ];
//! let m = DistanceMatrix::from_records(&records, &Hamming).unwrap();
//! assert_eq!(m[(1, 2)], 1.0);
//! assert_eq!(m[(2, 1)], 1.0);
//! ```

use std::{
    cmp::{max, min},
    ops::{Index, IndexMut},
};

use strum_macros::{AsRefStr, Display};
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::distance::DistanceMetric;
use crate::error::InputError;
use crate::sequence::Record;

/// The type of the matrix. Either square, lower triangular (excluding the
/// diagonal), or upper triangular (excluding the diagonal).
/// Square matrices are expected to be symmetric; see [`DistanceMatrix::asymmetry`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixType {
    Square,
    Lower,
    Upper,
}

/// A distance matrix containing a list of taxon names and a matrix of pairwise distances.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    pub names: Vec<String>,
    pub distances: Vec<Vec<f64>>,
    pub matrix_type: MatrixType,
}

#[derive(Error, Debug)]
pub enum DistanceMatrixError {
    #[error("names and matrix do not have matching length")]
    LengthError,
    #[error("matrix has unrecognized shape")]
    ShapeError,
}

/// How a similarity matrix is turned into a dissimilarity matrix.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
pub enum Inversion {
    /// `max - v`, where `max` is the largest stored entry.
    MaxMinus,
    /// `-v`
    Negate,
}

impl Default for Inversion {
    fn default() -> Self {
        Inversion::MaxMinus
    }
}

impl DistanceMatrix {
    /// The number of sequences (rows) in the matrix.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Create a new DistanceMatrix.
    ///
    /// `distances` must be a matrix with the same number of rows as `names`, and follow one of the accepted shapes.
    pub fn new(names: Vec<String>, distances: Vec<Vec<f64>>) -> Result<Self, DistanceMatrixError> {
        if names.len() != distances.len() {
            Err(DistanceMatrixError::LengthError)
        } else {
            let n = names.len();
            let square = distances.iter().all(|x| x.len() == n);
            let lower = distances.iter().enumerate().all(|(i, x)| x.len() == i);
            let upper = distances
                .iter()
                .enumerate()
                .all(|(i, x)| x.len() == n - 1 - i);
            let matrix_type = match (square, lower, upper) {
                (true, _, _) => MatrixType::Square,
                (_, true, _) => MatrixType::Lower,
                (_, _, true) => MatrixType::Upper,
                _ => Err(DistanceMatrixError::ShapeError)?,
            };
            Ok(Self {
                names,
                distances,
                matrix_type,
            })
        }
    }

    /// Whether `distances` has the shape `matrix_type` claims for `names.len()`
    /// taxa. Always true for matrices built by this module; deserialized ones
    /// may violate it.
    pub fn is_well_formed(&self) -> bool {
        let n = self.names.len();
        self.distances.len() == n
            && self.distances.iter().enumerate().all(|(i, row)| {
                row.len()
                    == match self.matrix_type {
                        MatrixType::Square => n,
                        MatrixType::Lower => i,
                        MatrixType::Upper => n - 1 - i,
                    }
            })
    }

    /// Compute all pairwise distances between `records`, in order.
    ///
    /// Every pair is evaluated once and mirrored, so the result is symmetric for
    /// any commutative metric. The diagonal holds `metric(s, s)`, which is not
    /// zero for similarity metrics.
    pub fn from_records<M>(records: &[Record], metric: &M) -> Result<Self, InputError>
    where
        M: DistanceMetric + ?Sized,
    {
        let n = records.len();
        if n < 2 {
            return Err(InputError::TooFewSequences(n));
        }
        let mut distances = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in i..n {
                let d = metric.distance(records[i].seq(), records[j].seq())?;
                distances[i][j] = d;
                distances[j][i] = d;
            }
        }
        Ok(DistanceMatrix {
            names: records.iter().map(|r| r.id().to_owned()).collect(),
            distances,
            matrix_type: MatrixType::Square,
        })
    }

    /// The same distances as a full square matrix. Missing diagonals of
    /// triangular matrices become zero.
    pub fn to_square(&self) -> Self {
        let n = self.len();
        let distances = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| {
                        if i == j && self.matrix_type != MatrixType::Square {
                            0.0
                        } else {
                            self[(i, j)]
                        }
                    })
                    .collect()
            })
            .collect();
        DistanceMatrix {
            names: self.names.clone(),
            distances,
            matrix_type: MatrixType::Square,
        }
    }

    /// The first `(i, j)` in row-major order with `self[(i, j)] != self[(j, i)]`.
    /// Triangular matrices are symmetric by construction.
    pub fn asymmetry(&self) -> Option<(usize, usize)> {
        if self.matrix_type != MatrixType::Square {
            return None;
        }
        let n = self.len();
        (0..n)
            .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
            .find(|&(i, j)| self.distances[i][j] != self.distances[j][i])
    }

    /// Turn a similarity matrix (larger = closer) into a dissimilarity matrix
    /// (larger = farther). All stored entries, including the diagonal, are
    /// transformed.
    pub fn to_dissimilarity(&self, inversion: Inversion) -> Self {
        let max = self
            .distances
            .iter()
            .flatten()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        let invert = |v: f64| match inversion {
            Inversion::MaxMinus => max - v,
            Inversion::Negate => -v,
        };
        DistanceMatrix {
            names: self.names.clone(),
            distances: self
                .distances
                .iter()
                .map(|row| row.iter().map(|&v| invert(v)).collect())
                .collect(),
            matrix_type: self.matrix_type,
        }
    }

    // Converts an index (i,j) to the right index to use given the shape of the matrix.
    fn get_index(&self, (i, j): (usize, usize)) -> (usize, usize) {
        match self.matrix_type {
            MatrixType::Square => (i, j),
            MatrixType::Lower => {
                assert!(i != j);
                (max(i, j), min(i, j))
            }
            MatrixType::Upper => {
                assert!(i != j);
                (min(i, j), max(i, j) - min(i, j) - 1)
            }
        }
    }
}

/// Index access into the DistanceMatrix, taking into account the shape.
///
/// Indices should be used as if the matrix was square. For triangular matrices,
/// `i` and `j` must be distinct, and `(i,j)` and `(j,i)` represent the same
/// element.
///
/// # Example
///
/// ```
/// use phylo_nj::distancematrix::DistanceMatrix;
///
/// let mut t = DistanceMatrix::new(vec!["a".to_string(), "b".to_string()],
/// vec![
///  vec![],
///  vec![1.0],
/// ]).unwrap();
/// assert_eq!(t[(1, 0)], 1.0);
/// t[(0, 1)] = 2.0;
/// assert_eq!(t[(1, 0)], 2.0);
/// ```
impl Index<(usize, usize)> for DistanceMatrix {
    type Output = f64;
    fn index(&self, t: (usize, usize)) -> &Self::Output {
        let (i, j) = self.get_index(t);
        &self.distances[i][j]
    }
}

/// Mutable index access into the DistanceMatrix, taking into account the shape, like `Index`.
impl IndexMut<(usize, usize)> for DistanceMatrix {
    fn index_mut(&mut self, t: (usize, usize)) -> &mut Self::Output {
        let (i, j) = self.get_index(t);
        &mut self.distances[i][j]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::{Hamming, SubstitutionScore};
    use crate::substitution::SubstitutionMatrix;
    use proptest::prelude::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| ((b'a' + i as u8) as char).to_string()).collect()
    }

    #[test]
    fn indexing() {
        let mut m = DistanceMatrix::new(
            names(3),
            vec![vec![0., 1., 2.], vec![3., 4., 5.], vec![6., 7., 8.]],
        )
        .unwrap();
        assert_eq!(m.matrix_type, MatrixType::Square);
        assert_eq!(m[(1, 2)], 5.);
        assert_eq!(m[(2, 1)], 7.);
        assert_eq!(m.asymmetry(), Some((0, 1)));
        m[(1, 2)] = -1.;
        assert_eq!(m[(1, 2)], -1.);
    }

    #[test]
    fn lower_to_square() {
        let m = DistanceMatrix::new(names(3), vec![vec![], vec![1.], vec![2., 3.]]).unwrap();
        assert_eq!(m.matrix_type, MatrixType::Lower);
        assert_eq!(m[(0, 2)], 2.);
        let s = m.to_square();
        assert_eq!(s.matrix_type, MatrixType::Square);
        assert_eq!(
            s.distances,
            vec![vec![0., 1., 2.], vec![1., 0., 3.], vec![2., 3., 0.]]
        );
        assert_eq!(s.asymmetry(), None);
    }

    #[test]
    fn upper_to_square() {
        let m = DistanceMatrix::new(names(3), vec![vec![1., 2.], vec![3.], vec![]]).unwrap();
        assert_eq!(m.matrix_type, MatrixType::Upper);
        assert_eq!(m.to_square()[(2, 1)], 3.);
    }

    #[test]
    fn shape_matches_type() {
        let mut m = DistanceMatrix::new(names(3), vec![vec![], vec![1.], vec![2., 3.]]).unwrap();
        assert!(m.is_well_formed());
        m.matrix_type = MatrixType::Square;
        assert!(!m.is_well_formed());
        let truncated = DistanceMatrix {
            names: names(3),
            distances: vec![vec![0.]],
            matrix_type: MatrixType::Square,
        };
        assert!(!truncated.is_well_formed());
    }

    #[test]
    fn bad_length() {
        let m = DistanceMatrix::new(names(3), vec![vec![1., 2.], vec![3.]]);
        assert!(matches!(m, Err(DistanceMatrixError::LengthError)));
    }

    #[test]
    fn bad_shape() {
        let m = DistanceMatrix::new(names(3), vec![vec![1., 2.], vec![3.], vec![4.]]);
        assert!(matches!(m, Err(DistanceMatrixError::ShapeError)));
    }

    #[test]
    fn too_few_records() {
        let records = vec![Record::from(("a", "ARN"))];
        assert!(matches!(
            DistanceMatrix::from_records(&records, &Hamming),
            Err(InputError::TooFewSequences(1))
        ));
        assert!(matches!(
            DistanceMatrix::from_records(&[], &Hamming),
            Err(InputError::TooFewSequences(0))
        ));
    }

    #[test]
    fn substitution_matrix_and_inversion() {
        let sub: SubstitutionMatrix = "   A  R  N
                                       A  4 -1 -2
                                       R -1  5  0
                                       N -2  0  6"
            .parse()
            .unwrap();
        let records = vec![
            Record::from(("x", "NNN")),
            Record::from(("y", "ARN")),
            Record::from(("z", "NRN")),
        ];
        let m = DistanceMatrix::from_records(&records, &SubstitutionScore::new(&sub)).unwrap();
        assert_eq!(m.names, vec!["x", "y", "z"]);
        assert_eq!(m[(0, 0)], 18.);
        assert_eq!(m[(0, 1)], 4.);
        assert_eq!(m[(1, 2)], 9.);
        assert_eq!(m[(1, 1)], 15.);

        let d = m.to_dissimilarity(Inversion::MaxMinus);
        assert_eq!(d[(0, 0)], 0.);
        assert_eq!(d[(0, 1)], 14.);
        assert_eq!(d[(1, 2)], 9.);
        let n = m.to_dissimilarity(Inversion::Negate);
        assert_eq!(n[(1, 2)], -9.);
    }

    #[test]
    fn length_mismatch_propagates() {
        let sub = SubstitutionMatrix::match_mismatch(b"AC", 1., 0.);
        let records = vec![Record::from(("a", "AC")), Record::from(("b", "ACA"))];
        assert!(DistanceMatrix::from_records(&records, &SubstitutionScore::new(&sub)).is_err());
        // Hamming truncates instead
        let m = DistanceMatrix::from_records(&records, &Hamming).unwrap();
        assert_eq!(m[(0, 1)], 0.);
    }

    proptest! {
        #[test]
        fn built_matrix_is_symmetric(seqs in prop::collection::vec("[ACGT]{6}", 2..8)) {
            let records: Vec<Record> = seqs
                .iter()
                .enumerate()
                .map(|(i, s)| Record::from((format!("s{}", i), s.as_str())))
                .collect();
            let sub = SubstitutionMatrix::match_mismatch(b"ACGT", 1., 0.);
            for m in vec![
                DistanceMatrix::from_records(&records, &Hamming).unwrap(),
                DistanceMatrix::from_records(&records, &SubstitutionScore::new(&sub)).unwrap(),
            ] {
                prop_assert_eq!(m.len(), records.len());
                for i in 0..m.len() {
                    for j in 0..m.len() {
                        prop_assert_eq!(m[(i, j)], m[(j, i)]);
                    }
                }
            }
        }
    }
}
