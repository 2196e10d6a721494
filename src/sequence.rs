// Copyright 2024 Johannes Köster.
// Licensed under the MIT license (http://opensource.org/licenses/MIT)
// This file may not be copied, modified, or distributed
// except according to those terms.

use derive_new::new;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A residue symbol, e.g. a nucleotide or an amino acid.
pub type Symbol = u8;
/// A biological sequence
pub type Sequence = Vec<Symbol>;

/// An identified input sequence, i.e. one future leaf of the tree.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(new, Debug, PartialEq, Eq, Clone, Hash)]
pub struct Record {
    id: String,
    seq: Sequence,
}

impl Record {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn seq(&self) -> &[Symbol] {
        &self.seq
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    /// Consume the record, returning identifier and sequence.
    pub fn into_parts(self) -> (String, Sequence) {
        (self.id, self.seq)
    }
}

impl<I: Into<String>> From<(I, &str)> for Record {
    fn from((id, seq): (I, &str)) -> Self {
        Record::new(id.into(), seq.as_bytes().to_vec())
    }
}
