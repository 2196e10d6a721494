// Copyright 2024 Johannes Köster.
// Licensed under the MIT license (http://opensource.org/licenses/MIT)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Settings of a tree build, as chosen by a front end.

use derive_new::new;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::distance::MetricKind;
use crate::distancematrix::Inversion;
use crate::error::ResourceError;
use crate::nj::JoinCriterion;
use crate::substitution::{MatrixStore, SubstitutionMatrix};

/// Name of the substitution matrix used when none is configured.
pub const DEFAULT_MATRIX: &str = "BLOSUM62";

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(new, Debug, Clone, PartialEq, Eq)]
pub struct TreeConfig {
    pub criterion: JoinCriterion,
    pub metric: MetricKind,
    /// Name of the substitution matrix in the [`MatrixStore`].
    pub matrix: String,
    /// Applied to the distance matrix when the metric is a similarity.
    pub inversion: Inversion,
    /// Seed for breaking ties during ancestral reconstruction.
    pub seed: Option<u64>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        TreeConfig {
            criterion: JoinCriterion::default(),
            metric: MetricKind::default(),
            matrix: DEFAULT_MATRIX.to_owned(),
            inversion: Inversion::default(),
            seed: None,
        }
    }
}

impl TreeConfig {
    pub fn with_criterion(mut self, criterion: JoinCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_metric(mut self, metric: MetricKind) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_matrix<S: Into<String>>(mut self, matrix: S) -> Self {
        self.matrix = matrix.into();
        self
    }

    pub fn with_inversion(mut self, inversion: Inversion) -> Self {
        self.inversion = inversion;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// The random generator for reconstruction: seeded if a seed is set,
    /// otherwise from OS entropy.
    pub fn rng(&self) -> ChaCha8Rng {
        match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    pub fn load_matrix(&self, store: &MatrixStore) -> Result<SubstitutionMatrix, ResourceError> {
        store.load(&self.matrix)
    }
}
