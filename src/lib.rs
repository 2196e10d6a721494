//! Rooted phylogenies from aligned sequences by neighbor joining, with the
//! sequences of internal nodes reconstructed from their children.
//!
//! The usual entry point is [`pipeline::infer_tree`]; the pieces it is built
//! from ([`distancematrix::DistanceMatrix`], [`nj::NeighborJoin`],
//! [`ancestral::Reconstructor`]) can also be driven on their own.

pub mod ancestral;
#[cfg(feature = "cache")]
pub mod cache;
pub mod config;
pub mod distance;
pub mod distancematrix;
pub mod error;
pub mod nj;
pub mod phylogeny;
pub mod pipeline;
pub mod sequence;
pub mod substitution;

pub use crate::error::{Error, Result};
pub use crate::phylogeny::Phylogeny;
