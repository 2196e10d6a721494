// Copyright 2024 Johannes Köster.
// Licensed under the MIT license (http://opensource.org/licenses/MIT)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! From sequences to a tree in one call.
//!
//! ```
//! use phylo_nj::config::TreeConfig;
//! use phylo_nj::distance::MetricKind;
//! use phylo_nj::pipeline::infer_tree;
//! use phylo_nj::sequence::Record;
//! use phylo_nj::substitution::MatrixStore;
//!
//! let config = TreeConfig::default()
//!     .with_matrix("DNA_IDENTITY")
//!     .with_metric(MetricKind::Hamming)
//!     .with_seed(1);
//! let matrix = config.load_matrix(&MatrixStore::default()).unwrap();
//! let records = vec![
//!     Record::from(("a", "ACGTAC")),
//!     Record::from(("b", "ACGTTC")),
//!     Record::from(("c", "TCGAAC")),
//! ];
//! let tree = infer_tree(records, &matrix, &config).unwrap();
//! assert_eq!(tree.internal_count(), 2);
//! ```

use tracing::debug;

use crate::ancestral::Reconstructor;
use crate::config::TreeConfig;
use crate::distance::{DistanceMetric, Metric};
use crate::distancematrix::DistanceMatrix;
use crate::error::{InputError, Result};
use crate::nj::NeighborJoin;
use crate::phylogeny::Phylogeny;
use crate::sequence::Record;
use crate::substitution::SubstitutionMatrix;

/// The dissimilarity matrix the engine clusters on: pairwise distances under
/// the configured metric, inverted if that metric is a similarity.
pub fn distance_matrix(
    records: &[Record],
    substitution: &SubstitutionMatrix,
    config: &TreeConfig,
) -> Result<DistanceMatrix, InputError> {
    let metric = Metric::new(config.metric, substitution);
    let matrix = DistanceMatrix::from_records(records, &metric)?;
    if metric.is_similarity() {
        debug!(inversion = %config.inversion, "inverting similarity matrix");
        Ok(matrix.to_dissimilarity(config.inversion))
    } else {
        Ok(matrix)
    }
}

/// Cluster `records` on an already computed dissimilarity `matrix`, e.g. one
/// restored from a cache.
pub fn infer_tree_with(
    matrix: DistanceMatrix,
    records: Vec<Record>,
    substitution: &SubstitutionMatrix,
    config: &TreeConfig,
) -> Result<Phylogeny> {
    let mut rng = config.rng();
    NeighborJoin::new(config.criterion).run(
        matrix,
        records,
        &Reconstructor::new(substitution),
        &mut rng,
    )
}

/// Compute distances and cluster `records` into a rooted tree.
pub fn infer_tree(
    records: Vec<Record>,
    substitution: &SubstitutionMatrix,
    config: &TreeConfig,
) -> Result<Phylogeny> {
    let matrix = distance_matrix(&records, substitution, config)?;
    infer_tree_with(matrix, records, substitution, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::MetricKind;
    use crate::error::Error;
    use crate::nj::JoinCriterion;
    use crate::substitution::MatrixStore;

    fn four() -> Vec<Record> {
        vec![
            Record::from(("human", "ACGTACGT")),
            Record::from(("chimp", "ACGTACGA")),
            Record::from(("mouse", "TCGTTCAA")),
            Record::from(("rat", "TCGATCAA")),
        ]
    }

    #[test]
    fn four_leaves_both_metrics() {
        let sub = SubstitutionMatrix::match_mismatch(b"ACGT", 1., 0.);
        for &metric in &[MetricKind::Hamming, MetricKind::Substitution] {
            for &criterion in &[JoinCriterion::SaitouNei, JoinCriterion::Nearest] {
                let config = TreeConfig::default()
                    .with_metric(metric)
                    .with_criterion(criterion)
                    .with_seed(5);
                let tree = infer_tree(four(), &sub, &config).unwrap();
                assert_eq!(tree.internal_count(), 3);
                assert_eq!(tree.len(), 7);
                let root = tree.root().unwrap();
                assert_eq!(tree.leaves_under(root).len(), 4);
                let mut names = tree.leaf_names();
                names.sort();
                assert_eq!(names, vec!["chimp", "human", "mouse", "rat"]);
            }
        }
    }

    #[test]
    fn match_mismatch_inverts_to_hamming() {
        let sub = SubstitutionMatrix::match_mismatch(b"ACGT", 1., 0.);
        let config = TreeConfig::default();
        let records = four();
        let scored = distance_matrix(&records, &sub, &config).unwrap();
        let hamming = distance_matrix(
            &records,
            &sub,
            &config.clone().with_metric(MetricKind::Hamming),
        )
        .unwrap();
        // max score is the self score 8, so 8 - matches == mismatches
        assert_eq!(scored, hamming);
    }

    #[test]
    fn nearest_on_hamming() {
        let sub = SubstitutionMatrix::match_mismatch(b"ACGT", 1., 0.);
        let config = TreeConfig::default()
            .with_metric(MetricKind::Hamming)
            .with_criterion(JoinCriterion::Nearest)
            .with_seed(0);
        let tree = infer_tree(four(), &sub, &config).unwrap();
        // human/chimp and mouse/rat each differ at one position
        assert_eq!(tree.to_newick(), "((human,chimp),(mouse,rat));");
    }

    #[test]
    fn identity_encoding_round_trips() {
        let sub = MatrixStore::default().load("BLOSUM62").unwrap();
        let records = vec![
            Record::from(("P1", "MKTAYIAK")),
            Record::from(("P2", "MKTAHIAK")),
            Record::from(("P3", "MRSAYLAK")),
            Record::from(("P4", "LRSAYLGK")),
            Record::from(("P5", "MKTWYIAR")),
        ];
        let tree = infer_tree(records, &sub, &TreeConfig::default().with_seed(9)).unwrap();
        let parsed: Phylogeny = tree.to_newick().parse().unwrap();
        let mut expected = tree.leaf_names();
        let mut found = parsed.leaf_names();
        expected.sort();
        found.sort();
        assert_eq!(expected, found);
        assert_eq!(parsed.splits(), tree.splits());
        assert_eq!(parsed.internal_count(), 4);
    }

    #[test]
    fn same_seed_same_tree() {
        let sub = SubstitutionMatrix::match_mismatch(b"ACGT", 1., 0.);
        let config = TreeConfig::default().with_seed(77);
        let first = infer_tree(four(), &sub, &config).unwrap();
        let second = infer_tree(four(), &sub, &config).unwrap();
        assert_eq!(first.to_string(), second.to_string());
        assert_eq!(first.to_newick(), second.to_newick());
    }

    #[test]
    fn input_errors_abort_early() {
        let sub = SubstitutionMatrix::match_mismatch(b"ACGT", 1., 0.);
        let config = TreeConfig::default();
        let mut records = four();
        records[1] = Record::from(("chimp", "ACGTAC"));
        assert!(matches!(
            infer_tree(records, &sub, &config),
            Err(Error::Input(InputError::UnequalLengths { .. }))
        ));
        assert!(matches!(
            infer_tree(four()[..1].to_vec(), &sub, &config),
            Err(Error::Input(InputError::TooFewSequences(1)))
        ));
        let mut unknown = four();
        unknown[0] = Record::from(("human", "ACGTACGN"));
        assert!(matches!(
            infer_tree(unknown, &sub, &config),
            Err(Error::Input(InputError::UnknownSymbol { .. }))
        ));
    }
}
