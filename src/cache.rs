// Copyright 2024 Johannes Köster.
// Licensed under the MIT license (http://opensource.org/licenses/MIT)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! A single on-disk bundle of a computed distance matrix.
//!
//! The cache is not content-addressed: it lives at one path and holds at most
//! one bundle. A bundle is only used if it is well formed, its identifiers
//! match the requested taxa in order and it was computed with the requested
//! substitution matrix, metric and inversion. Any problem with it is reported
//! as a [`CacheError`] and [`Cache::load_or_compute`] falls back to
//! recomputation, so a bad bundle never reaches the clustering engine.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::TreeConfig;
use crate::distance::MetricKind;
use crate::distancematrix::{DistanceMatrix, Inversion};
use crate::error::Result;
use crate::phylogeny::Phylogeny;
use crate::pipeline;
use crate::sequence::Record;
use crate::substitution::SubstitutionMatrix;

/// File name of the bundle inside the cache directory.
pub const CACHE_FILE: &str = "distances.bin";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("no cached distances at {path:?}")]
    Missing {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cached distances could not be decoded")]
    Corrupt(#[from] bincode::Error),
    #[error("cached distances are malformed: {0}")]
    Malformed(&'static str),
    #[error("cached distances are for taxa {found:?}, expected {expected:?}")]
    Inconsistent {
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("cached distances were computed with a different {0}")]
    Stale(&'static str),
}

/// What the cache stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub matrix: DistanceMatrix,
    pub ids: Vec<String>,
    pub substitution: SubstitutionMatrix,
    pub metric: MetricKind,
    pub inversion: Inversion,
}

impl Bundle {
    fn check(&self, expected: &[String]) -> Result<(), CacheError> {
        if !self.matrix.is_well_formed() {
            return Err(CacheError::Malformed("matrix shape"));
        }
        if !self.substitution.is_well_formed() {
            return Err(CacheError::Malformed("substitution matrix"));
        }
        if self.ids != expected || self.matrix.names != self.ids {
            return Err(CacheError::Inconsistent {
                expected: expected.to_vec(),
                found: self.ids.clone(),
            });
        }
        if self.matrix.asymmetry().is_some() {
            return Err(CacheError::Malformed("asymmetric distances"));
        }
        if self.matrix.distances.iter().flatten().any(|v| !v.is_finite()) {
            return Err(CacheError::Malformed("non-finite distance"));
        }
        Ok(())
    }

    fn check_settings(
        &self,
        substitution: &SubstitutionMatrix,
        config: &TreeConfig,
    ) -> Result<(), CacheError> {
        if self.substitution != *substitution {
            Err(CacheError::Stale("substitution matrix"))
        } else if self.metric != config.metric {
            Err(CacheError::Stale("metric"))
        } else if self.inversion != config.inversion {
            Err(CacheError::Stale("inversion"))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cache {
    path: PathBuf,
}

impl Cache {
    /// A cache keeping its bundle in `dir`.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Cache {
            path: dir.as_ref().join(CACHE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store(&self, bundle: &Bundle) -> Result<(), CacheError> {
        let file = File::create(&self.path).map_err(|source| CacheError::Missing {
            path: self.path.clone(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, bundle)?;
        writer.flush().map_err(bincode::Error::from)?;
        Ok(())
    }

    /// Load the bundle, requiring it to be well formed and its identifiers to
    /// be exactly `expected`.
    pub fn load(&self, expected: &[String]) -> Result<Bundle, CacheError> {
        let file = File::open(&self.path).map_err(|source| CacheError::Missing {
            path: self.path.clone(),
            source,
        })?;
        let bundle: Bundle = bincode::deserialize_from(BufReader::new(file))?;
        bundle.check(expected)?;
        Ok(bundle)
    }

    /// Load the bundle for `records`, or compute and store it if the cache
    /// is unusable.
    pub fn load_or_compute(
        &self,
        records: &[Record],
        substitution: &SubstitutionMatrix,
        config: &TreeConfig,
    ) -> Result<Bundle> {
        let ids: Vec<String> = records.iter().map(|r| r.id().to_owned()).collect();
        let cached = self.load(&ids).and_then(|bundle| {
            bundle.check_settings(substitution, config)?;
            Ok(bundle)
        });
        match cached {
            Ok(bundle) => {
                info!(path = ?self.path, "using cached distances");
                return Ok(bundle);
            }
            Err(err) => warn!(path = ?self.path, "recomputing distances: {}", err),
        }
        let bundle = Bundle {
            matrix: pipeline::distance_matrix(records, substitution, config)?,
            ids,
            substitution: substitution.clone(),
            metric: config.metric,
            inversion: config.inversion,
        };
        if let Err(err) = self.store(&bundle) {
            warn!(path = ?self.path, "distances not cached: {}", err);
        }
        Ok(bundle)
    }

    /// [`pipeline::infer_tree`] with the distance matrix taken from the cache
    /// when possible.
    pub fn infer_tree(
        &self,
        records: Vec<Record>,
        substitution: &SubstitutionMatrix,
        config: &TreeConfig,
    ) -> Result<Phylogeny> {
        let bundle = self.load_or_compute(&records, substitution, config)?;
        pipeline::infer_tree_with(bundle.matrix, records, substitution, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distancematrix::MatrixType;
    use std::fs;

    fn records() -> Vec<Record> {
        vec![
            Record::from(("a", "ACGT")),
            Record::from(("b", "ACGA")),
            Record::from(("c", "TCGA")),
        ]
    }

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn missing_then_stored() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path());
        let sub = SubstitutionMatrix::match_mismatch(b"ACGT", 1., 0.);
        let config = TreeConfig::default().with_metric(MetricKind::Hamming);

        assert!(matches!(
            cache.load(&ids(&["a", "b", "c"])),
            Err(CacheError::Missing { .. })
        ));
        let computed = cache.load_or_compute(&records(), &sub, &config).unwrap();
        assert!(cache.path().exists());
        let loaded = cache.load(&ids(&["a", "b", "c"])).unwrap();
        assert_eq!(computed, loaded);
        assert_eq!(loaded.matrix[(0, 2)], 2.);
    }

    #[test]
    fn order_must_match() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path());
        let sub = SubstitutionMatrix::match_mismatch(b"ACGT", 1., 0.);
        let config = TreeConfig::default();
        cache.load_or_compute(&records(), &sub, &config).unwrap();
        assert!(matches!(
            cache.load(&ids(&["b", "a", "c"])),
            Err(CacheError::Inconsistent { .. })
        ));

        // a different ordering replaces the single cached bundle
        let mut swapped = records();
        swapped.swap(0, 1);
        let bundle = cache.load_or_compute(&swapped, &sub, &config).unwrap();
        assert_eq!(bundle.ids, ids(&["b", "a", "c"]));
        assert!(cache.load(&ids(&["a", "b", "c"])).is_err());
    }

    #[test]
    fn corrupt_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path());
        fs::write(cache.path(), b"not a bundle").unwrap();
        assert!(matches!(
            cache.load(&ids(&["a", "b", "c"])),
            Err(CacheError::Corrupt(_))
        ));
        let sub = SubstitutionMatrix::match_mismatch(b"ACGT", 1., 0.);
        let config = TreeConfig::default().with_seed(2);
        let cached = cache.infer_tree(records(), &sub, &config).unwrap();
        let direct = pipeline::infer_tree(records(), &sub, &config).unwrap();
        assert_eq!(cached, direct);
    }

    #[test]
    fn malformed_bundle_is_recomputed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path());
        let sub = SubstitutionMatrix::match_mismatch(b"ACGT", 1., 0.);
        let config = TreeConfig::default().with_seed(4);
        let truncated = Bundle {
            matrix: DistanceMatrix {
                names: ids(&["a", "b", "c"]),
                distances: vec![vec![0.]],
                matrix_type: MatrixType::Square,
            },
            ids: ids(&["a", "b", "c"]),
            substitution: sub.clone(),
            metric: config.metric,
            inversion: config.inversion,
        };
        cache.store(&truncated).unwrap();
        assert!(matches!(
            cache.load(&ids(&["a", "b", "c"])),
            Err(CacheError::Malformed(_))
        ));

        let tree = cache.infer_tree(records(), &sub, &config).unwrap();
        assert_eq!(tree, pipeline::infer_tree(records(), &sub, &config).unwrap());
        let repaired = cache.load(&ids(&["a", "b", "c"])).unwrap();
        assert!(repaired.matrix.is_well_formed());
        assert_eq!(repaired.matrix.len(), 3);
    }

    #[test]
    fn other_settings_are_recomputed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path());
        let acgt = SubstitutionMatrix::match_mismatch(b"ACGT", 1., 0.);
        let config = TreeConfig::default().with_seed(8);
        cache.load_or_compute(&records(), &acgt, &config).unwrap();

        // same taxa, now with N and a table covering it
        let acgtn = SubstitutionMatrix::match_mismatch(b"ACGTN", 1., 0.);
        let with_n = vec![
            Record::from(("a", "ACGN")),
            Record::from(("b", "ACGA")),
            Record::from(("c", "TCGA")),
        ];
        let tree = cache.infer_tree(with_n.clone(), &acgtn, &config).unwrap();
        assert_eq!(tree, pipeline::infer_tree(with_n, &acgtn, &config).unwrap());
        assert_eq!(cache.load(&ids(&["a", "b", "c"])).unwrap().substitution, acgtn);

        let hamming = config.clone().with_metric(MetricKind::Hamming);
        let bundle = cache.load_or_compute(&records(), &acgtn, &hamming).unwrap();
        assert_eq!(bundle.metric, MetricKind::Hamming);
        assert_eq!(bundle.matrix[(0, 2)], 2.);
    }
}
