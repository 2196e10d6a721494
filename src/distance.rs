// Copyright 2024 Johannes Köster.
// Licensed under the MIT license (http://opensource.org/licenses/MIT)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Pairwise distances between aligned sequences.
//!
//! Two metrics are provided. [`Hamming`] counts mismatching positions and is
//! a dissimilarity. [`SubstitutionScore`] sums substitution matrix entries
//! and is a similarity: higher values mean more alike, so a matrix built
//! from it has to be inverted with
//! [`DistanceMatrix::to_dissimilarity`](crate::distancematrix::DistanceMatrix::to_dissimilarity)
//! before clustering.
//!
//! ```
//! use phylo_nj::distance::{DistanceMetric, Hamming};
//!
//! assert_eq!(Hamming.distance(b"ARN", b"NNN").unwrap(), 2.0);
//! ```

use strum_macros::{AsRefStr, Display};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::InputError;
use crate::substitution::SubstitutionMatrix;

/// A commutative pairwise measure between two sequences.
pub trait DistanceMetric {
    fn distance(&self, a: &[u8], b: &[u8]) -> Result<f64, InputError>;

    /// Whether larger values mean *closer* rather than farther.
    fn is_similarity(&self) -> bool {
        false
    }
}

/// Number of mismatching positions.
///
/// Only the shared prefix `min(a.len(), b.len())` is compared; trailing
/// positions of the longer sequence are ignored. This is a truncation, not an
/// alignment, and sequences of different length are not an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Hamming;

impl DistanceMetric for Hamming {
    fn distance(&self, a: &[u8], b: &[u8]) -> Result<f64, InputError> {
        Ok(a.iter().zip(b).filter(|(x, y)| x != y).count() as f64)
    }
}

/// Sum of substitution scores over aligned positions.
#[derive(Debug, Clone, Copy)]
pub struct SubstitutionScore<'a> {
    matrix: &'a SubstitutionMatrix,
}

impl<'a> SubstitutionScore<'a> {
    pub fn new(matrix: &'a SubstitutionMatrix) -> Self {
        SubstitutionScore { matrix }
    }
}

impl<'a> DistanceMetric for SubstitutionScore<'a> {
    fn distance(&self, a: &[u8], b: &[u8]) -> Result<f64, InputError> {
        if a.len() != b.len() {
            return Err(InputError::UnequalLengths {
                left: a.len(),
                right: b.len(),
            });
        }
        a.iter()
            .zip(b)
            .map(|(&x, &y)| self.matrix.score(x, y))
            .sum()
    }

    fn is_similarity(&self) -> bool {
        true
    }
}

/// Selects one of the provided metrics.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
pub enum MetricKind {
    Hamming,
    Substitution,
}

impl Default for MetricKind {
    fn default() -> Self {
        MetricKind::Substitution
    }
}

/// A configured metric, dispatching to [`Hamming`] or [`SubstitutionScore`].
#[derive(Debug, Clone, Copy)]
pub enum Metric<'a> {
    Hamming(Hamming),
    Substitution(SubstitutionScore<'a>),
}

impl<'a> Metric<'a> {
    pub fn new(kind: MetricKind, matrix: &'a SubstitutionMatrix) -> Self {
        match kind {
            MetricKind::Hamming => Metric::Hamming(Hamming),
            MetricKind::Substitution => Metric::Substitution(SubstitutionScore::new(matrix)),
        }
    }
}

impl<'a> DistanceMetric for Metric<'a> {
    fn distance(&self, a: &[u8], b: &[u8]) -> Result<f64, InputError> {
        match self {
            Metric::Hamming(m) => m.distance(a, b),
            Metric::Substitution(m) => m.distance(a, b),
        }
    }

    fn is_similarity(&self) -> bool {
        match self {
            Metric::Hamming(m) => m.is_similarity(),
            Metric::Substitution(m) => m.is_similarity(),
        }
    }
}
