// Copyright 2024 Johannes Köster.
// Licensed under the MIT license (http://opensource.org/licenses/MIT)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Neighbor joining.
//!
//! The engine keeps a square distance matrix and a forest of subtree roots,
//! index-aligned. Each iteration picks a pair `(i, j)`, creates a parent node
//! for `forest[i]` and `forest[j]` with a reconstructed ancestral sequence,
//! and replaces rows and columns `i` and `j` by one row for the new node,
//! placed last, with
//!
//! ```text
//! u[k] = (D[i][k] + D[j][k] - D[i][j]) / 2
//! ```
//!
//! When two roots remain they are joined into the root of the tree.
//!
//! Pairs are chosen either by the Saitou–Nei criterion
//! `Q[i][j] = r[i] + r[j] - D[i][j]` with `r[k] = Σ_{l≠k} D[k][l] / (m - 2)`,
//! or by the smallest distance. Ties go to the first pair in row-major order.
//!
//! ```
//! use phylo_nj::ancestral::Reconstructor;
//! use phylo_nj::distancematrix::DistanceMatrix;
//! use phylo_nj::nj::{JoinCriterion, NeighborJoin};
//! use phylo_nj::sequence::Record;
//! use phylo_nj::substitution::SubstitutionMatrix;
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha8Rng;
//!
//! let leaves: Vec<Record> = vec![("a", "AA"), ("b", "AC"), ("c", "GG")]
//!     .into_iter()
//!     .map(Record::from)
//!     .collect();
//! let matrix = DistanceMatrix::new(
//!     vec!["a".into(), "b".into(), "c".into()],
//!     vec![vec![], vec![1.0], vec![2.0, 2.0]],
//! ).unwrap();
//! let sub = SubstitutionMatrix::match_mismatch(b"ACGT", 1.0, 0.0);
//! let tree = NeighborJoin::new(JoinCriterion::Nearest)
//!     .run(matrix, leaves, &Reconstructor::new(&sub), &mut ChaCha8Rng::seed_from_u64(0))
//!     .unwrap();
//! assert_eq!(tree.to_newick(), "(c,(a,b));");
//! ```

use rand::Rng;
use strum_macros::{AsRefStr, Display};
use tracing::{debug, info};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::ancestral::Reconstructor;
use crate::distancematrix::{DistanceMatrix, MatrixType};
use crate::error::{AlgorithmError, InputError, Result};
use crate::phylogeny::{NodeId, Phylogeny};
use crate::sequence::Record;

/// Diagonal entry of every row in the working matrix, so that no node is
/// ever paired with itself.
pub const SELF_DISTANCE: f64 = f64::INFINITY;

/// Largest distance magnitude accepted as input. Smaller bounds keep the
/// reductions of all but adversarially constructed matrices inside `f64`
/// range; a reduction that still leaves it is reported as
/// [`AlgorithmError::NonFinite`].
pub const MAX_DISTANCE: f64 = f64::MAX / 4.0;

/// How the next pair to join is selected.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
pub enum JoinCriterion {
    /// Minimize `r[i] + r[j] - D[i][j]`.
    SaitouNei,
    /// Minimize `D[i][j]`.
    Nearest,
}

impl Default for JoinCriterion {
    fn default() -> Self {
        JoinCriterion::SaitouNei
    }
}

/// Record of one join.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinStep {
    /// Forest indices that were joined, `i < j`.
    pub pair: (usize, usize),
    /// Dimension of the distance matrix before the join.
    pub dimension: usize,
    /// Size of the forest before the join.
    pub forest: usize,
    /// Value of the selection criterion for `pair`.
    pub criterion: f64,
    /// Distances of the new node to the retained nodes, in retained order.
    /// Empty for the final join.
    pub reduced: Vec<f64>,
    /// The node created by the join.
    pub node: NodeId,
}

/// Saitou–Nei criterion for every pair, with `+inf` on the diagonal.
/// Returns `None` for matrices with fewer than 3 rows.
pub fn q_matrix(matrix: &DistanceMatrix) -> Option<Vec<Vec<f64>>> {
    if matrix.len() < 3 {
        return None;
    }
    Some(saitou_nei(&matrix.to_square().distances))
}

// callers guarantee d.len() > 2
fn saitou_nei(d: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let m = d.len();
    let r: Vec<f64> = d
        .iter()
        .enumerate()
        .map(|(k, row)| {
            row.iter()
                .enumerate()
                .filter(|&(l, _)| l != k)
                .map(|(_, v)| v)
                .sum::<f64>()
                / (m - 2) as f64
        })
        .collect();
    (0..m)
        .map(|i| {
            (0..m)
                .map(|j| {
                    if i == j {
                        f64::INFINITY
                    } else {
                        r[i] + r[j] - d[i][j]
                    }
                })
                .collect()
        })
        .collect()
}

/// First off-diagonal minimum in row-major order.
fn argmin(scores: &[Vec<f64>]) -> (usize, usize, f64) {
    let mut best = (0, 1, f64::INFINITY);
    for (i, row) in scores.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            if i != j && v < best.2 {
                best = (i, j, v);
            }
        }
    }
    best
}

/// The neighbor-joining engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NeighborJoin {
    criterion: JoinCriterion,
}

impl NeighborJoin {
    pub fn new(criterion: JoinCriterion) -> Self {
        NeighborJoin { criterion }
    }

    pub fn criterion(&self) -> JoinCriterion {
        self.criterion
    }

    /// Cluster `leaves` according to `matrix`, whose rows must be named by the
    /// leaf ids in the same order. Returns the tree with `n - 1` internal nodes.
    pub fn run<R>(
        &self,
        matrix: DistanceMatrix,
        leaves: Vec<Record>,
        reconstructor: &Reconstructor,
        rng: &mut R,
    ) -> Result<Phylogeny>
    where
        R: Rng + ?Sized,
    {
        self.cluster(matrix, leaves, reconstructor, rng, None)
    }

    /// Like [`run`](Self::run), additionally returning one [`JoinStep`] per join.
    pub fn run_traced<R>(
        &self,
        matrix: DistanceMatrix,
        leaves: Vec<Record>,
        reconstructor: &Reconstructor,
        rng: &mut R,
    ) -> Result<(Phylogeny, Vec<JoinStep>)>
    where
        R: Rng + ?Sized,
    {
        let mut steps = Vec::with_capacity(leaves.len().saturating_sub(1));
        let tree = self.cluster(matrix, leaves, reconstructor, rng, Some(&mut steps))?;
        Ok((tree, steps))
    }

    fn cluster<R>(
        &self,
        matrix: DistanceMatrix,
        leaves: Vec<Record>,
        reconstructor: &Reconstructor,
        rng: &mut R,
        mut steps: Option<&mut Vec<JoinStep>>,
    ) -> Result<Phylogeny>
    where
        R: Rng + ?Sized,
    {
        validate(&matrix, &leaves, reconstructor)?;
        info!(taxa = leaves.len(), criterion = %self.criterion, "neighbor joining");

        let mut d = match matrix.matrix_type {
            MatrixType::Square => matrix.distances,
            _ => matrix.to_square().distances,
        };
        for (k, row) in d.iter_mut().enumerate() {
            row[k] = SELF_DISTANCE;
        }

        let mut tree = Phylogeny::new();
        let mut forest: Vec<NodeId> = leaves
            .into_iter()
            .map(|leaf| {
                let (id, seq) = leaf.into_parts();
                tree.add_leaf(id, seq)
            })
            .collect();

        loop {
            let m = forest.len();
            debug_assert_eq!(m, d.len());

            let (i, j, criterion) = if m == 2 {
                (0, 1, d[0][1])
            } else {
                match self.criterion {
                    JoinCriterion::SaitouNei => argmin(&saitou_nei(&d)),
                    JoinCriterion::Nearest => argmin(&d),
                }
            };
            let (i, j) = (i.min(j), i.max(j));

            let reduced: Vec<f64> = (0..m)
                .filter(|&k| k != i && k != j)
                .map(|k| (d[i][k] + d[j][k] - d[i][j]) / 2.0)
                .collect();
            if let Some((k, &value)) = reduced.iter().enumerate().find(|(_, v)| !v.is_finite()) {
                return Err(AlgorithmError::NonFinite {
                    row: m - 2,
                    col: k,
                    value,
                }
                .into());
            }

            let (left, right) = (forest[i], forest[j]);
            let seq = reconstructor.reconstruct(
                tree[left].sequence(),
                tree[right].sequence(),
                &mut *rng,
            )?;
            let node = tree.join(left, right, seq)?;
            debug!(i, j, criterion, %node, "joined {} and {}", left, right);

            if let Some(steps) = steps.as_mut() {
                steps.push(JoinStep {
                    pair: (i, j),
                    dimension: d.len(),
                    forest: m,
                    criterion,
                    reduced: reduced.clone(),
                    node,
                });
            }

            if m == 2 {
                return Ok(tree);
            }

            d = reduce(&d, i, j, &reduced);
            forest.remove(j);
            forest.remove(i);
            forest.push(node);
        }
    }
}

/// Drop rows and columns `i < j` and append `u` as the last row and column.
fn reduce(d: &[Vec<f64>], i: usize, j: usize, u: &[f64]) -> Vec<Vec<f64>> {
    let retained: Vec<usize> = (0..d.len()).filter(|&k| k != i && k != j).collect();
    let mut reduced: Vec<Vec<f64>> = retained
        .iter()
        .zip(u)
        .map(|(&k, &uk)| {
            let mut row: Vec<f64> = retained.iter().map(|&l| d[k][l]).collect();
            row.push(uk);
            row
        })
        .collect();
    let mut last = u.to_vec();
    last.push(SELF_DISTANCE);
    reduced.push(last);
    reduced
}

fn validate(
    matrix: &DistanceMatrix,
    leaves: &[Record],
    reconstructor: &Reconstructor,
) -> Result<()> {
    let n = leaves.len();
    if n < 2 {
        return Err(InputError::TooFewSequences(n).into());
    }
    if matrix.len() != n || matrix.names.iter().zip(leaves).any(|(name, leaf)| name != leaf.id()) {
        return Err(InputError::OrderMismatch {
            names: matrix.names.clone(),
            ids: leaves.iter().map(|l| l.id().to_owned()).collect(),
        }
        .into());
    }
    if let Some((i, j)) = matrix.asymmetry() {
        return Err(InputError::Asymmetric(i, j).into());
    }
    for i in 0..n {
        for j in (0..n).filter(|&j| j != i) {
            let value = matrix[(i, j)];
            if !value.is_finite() {
                return Err(AlgorithmError::NonFinite { row: i, col: j, value }.into());
            }
            if value.abs() > MAX_DISTANCE {
                return Err(AlgorithmError::OutOfRange { row: i, col: j, value }.into());
            }
        }
    }

    let expected = leaves[0].len();
    let sub = reconstructor.matrix();
    for leaf in leaves {
        if leaf.len() != expected {
            return Err(InputError::LengthMismatch {
                id: leaf.id().to_owned(),
                expected,
                found: leaf.len(),
            }
            .into());
        }
        if let Some(&s) = leaf.seq().iter().find(|&&s| !sub.contains(s)) {
            return Err(InputError::UnknownLeafSymbol {
                id: leaf.id().to_owned(),
                symbol: s as char,
            }
            .into());
        }
    }
    Ok(())
}
