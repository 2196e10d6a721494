// Copyright 2024 Johannes Köster.
// Licensed under the MIT license (http://opensource.org/licenses/MIT)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Error types shared by the distance, reconstruction and clustering stages.
//!
//! Resource and input problems are detected before any clustering starts.
//! Once the joining loop runs on validated input it cannot fail.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::distancematrix::DistanceMatrixError;
use crate::phylogeny::TreeError;

/// A substitution matrix resource could not be loaded.
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("substitution matrix {path:?} could not be read")]
    Missing {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("substitution matrix has no header line")]
    Empty,
    #[error("column header {0:?} is not a single symbol")]
    BadSymbol(String),
    #[error("symbol {0:?} appears more than once in the header")]
    DuplicateSymbol(char),
    #[error("substitution matrix is not square: {rows} rows for {columns} columns")]
    NotSquare { rows: usize, columns: usize },
    #[error("row {row:?} is malformed: {reason}")]
    MalformedRow { row: usize, reason: String },
    #[error("entry {value:?} in row {row:?} is not numeric")]
    NonNumeric { row: char, value: String },
    #[error("substitution matrix is asymmetric at ({a:?}, {b:?})")]
    Asymmetric { a: char, b: char },
}

/// The sequences or the distance matrix handed in are unusable.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("at least 2 sequences are required, got {0}")]
    TooFewSequences(usize),
    #[error("sequence {id:?} has length {found}, expected {expected}")]
    LengthMismatch {
        id: String,
        expected: usize,
        found: usize,
    },
    #[error("aligned sequences differ in length: {left} vs {right}")]
    UnequalLengths { left: usize, right: usize },
    #[error("symbol pair ({a:?}, {b:?}) is not covered by the substitution matrix")]
    UnknownSymbol { a: char, b: char },
    #[error("sequence {id:?} contains symbol {symbol:?}, not covered by the substitution matrix")]
    UnknownLeafSymbol { id: String, symbol: char },
    #[error("distance matrix rows {names:?} do not match the taxa {ids:?}")]
    OrderMismatch { names: Vec<String>, ids: Vec<String> },
    #[error("distance matrix is asymmetric at ({0}, {1})")]
    Asymmetric(usize, usize),
    #[error(transparent)]
    Matrix(#[from] DistanceMatrixError),
}

/// Numeric states the joining loop refuses to work with.
#[derive(Error, Debug)]
pub enum AlgorithmError {
    #[error("distance ({row}, {col}) is not finite: {value}")]
    NonFinite { row: usize, col: usize, value: f64 },
    #[error("distance ({row}, {col}) = {value} exceeds the supported magnitude")]
    OutOfRange { row: usize, col: usize, value: f64 },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Algorithm(#[from] AlgorithmError),
    #[error(transparent)]
    Tree(#[from] TreeError),
}

impl From<DistanceMatrixError> for Error {
    fn from(err: DistanceMatrixError) -> Self {
        Error::Input(InputError::Matrix(err))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
