//! The reference-sequence provider: an oracle mapping a sequence id to its
//! whole-sequence reference bases. This module supplies one concrete
//! implementation backed by `noodles_fasta::Repository`, matching the
//! repository-backed reference lookup already used by the surrounding CRAM
//! ecosystem (e.g. the slice builder's `fasta::repository::Repository`
//! lookups).

use bstr::BString;
use noodles::fasta;
use noodles::sam;

use crate::error::{EncodeError, Result};

/// Fetches the full base sequence for a reference sequence id.
///
/// `get_reference_bases` must return the entire sequence; implementations
/// may cache the result internally.
pub trait ReferenceProvider {
    fn get_reference_bases(&self, sequence_id: usize) -> Result<Vec<u8>>;
}

/// A [`ReferenceProvider`] backed by an in-memory FASTA repository, keyed by
/// the reference sequence order recorded in the SAM header.
pub struct FastaReferenceProvider {
    repository: fasta::Repository,
    sequence_names: Vec<BString>,
}

impl FastaReferenceProvider {
    pub fn new(repository: fasta::Repository, header: &sam::Header) -> Self {
        let sequence_names = header
            .reference_sequences()
            .keys()
            .map(|name| BString::from(name.as_slice()))
            .collect();

        Self {
            repository,
            sequence_names,
        }
    }
}

impl ReferenceProvider for FastaReferenceProvider {
    fn get_reference_bases(&self, sequence_id: usize) -> Result<Vec<u8>> {
        let name = self
            .sequence_names
            .get(sequence_id)
            .ok_or_else(|| EncodeError::ReferenceFetch {
                sequence_id,
                message: "sequence id out of range of the SAM header".into(),
            })?;

        let sequence = self
            .repository
            .get(name)
            .ok_or_else(|| EncodeError::ReferenceFetch {
                sequence_id,
                message: format!("no reference sequence named {name:?} in repository"),
            })?
            .map_err(|e| EncodeError::ReferenceFetch {
                sequence_id,
                message: e.to_string(),
            })?;

        Ok(sequence.as_ref().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noodles::fasta::record::{Definition, Sequence};
    use noodles::sam::header::record::value::{map::ReferenceSequence, Map};
    use std::num::NonZeroUsize;

    #[test]
    fn fetches_bases_by_header_order() {
        let repo = fasta::Repository::new(vec![
            fasta::Record::new(Definition::new("sq0", None), Sequence::from(b"ACGT".to_vec())),
            fasta::Record::new(Definition::new("sq1", None), Sequence::from(b"TTTT".to_vec())),
        ]);

        let mut header = sam::Header::builder();
        header = header.add_reference_sequence(
            "sq0",
            Map::<ReferenceSequence>::new(NonZeroUsize::new(4).unwrap()),
        );
        header = header.add_reference_sequence(
            "sq1",
            Map::<ReferenceSequence>::new(NonZeroUsize::new(4).unwrap()),
        );
        let header = header.build();

        let provider = FastaReferenceProvider::new(repo, &header);
        assert_eq!(provider.get_reference_bases(0).unwrap(), b"ACGT".to_vec());
        assert_eq!(provider.get_reference_bases(1).unwrap(), b"TTTT".to_vec());
        assert!(provider.get_reference_bases(2).is_err());
    }
}
