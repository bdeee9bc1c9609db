//! Converts one alignment record into a [`CompressionRecord`].
//!
//! Tracks running `base_count`/`feature_count` counters, consulted by the
//! driver's abnormal-mismatch warning.

use noodles::sam::{self, alignment::record::cigar::op::Kind, alignment::RecordBuf};

use crate::options::EncoderOptions;
use crate::record::{CigarOp, CompressionRecord};

/// Converts alignment records to compression records, accumulating the two
/// counters the driver's high-mismatch warning consults.
#[derive(Debug, Default)]
pub struct Sam2CramFactory {
    base_count: u64,
    feature_count: u64,
}

impl Sam2CramFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_count(&self) -> u64 {
        self.base_count
    }

    pub fn feature_count(&self) -> u64 {
        self.feature_count
    }

    /// Converts one record. `reference_bases`, when given, is the entire
    /// sequence for the record's own reference id (used only to tally
    /// substitution-like features; walks the cigar the same way
    /// `ReferenceTracks` does).
    pub fn convert(
        &mut self,
        index: u64,
        header: &sam::Header,
        record: &RecordBuf,
        reference_bases: Option<&[u8]>,
        options: &EncoderOptions,
    ) -> std::io::Result<CompressionRecord> {
        use sam::alignment::Record as _;

        let flags = record.flags()?;

        let reference_sequence_id = record.reference_sequence_id(header).transpose()?;

        let alignment_start = record
            .alignment_start()
            .transpose()?
            .map(usize::from)
            .unwrap_or(0) as i32;

        let alignment_end = record
            .alignment_end()
            .transpose()?
            .map(usize::from)
            .unwrap_or(0) as i32;

        let template_size = record.template_length()?;

        let bases: Vec<u8> = record.sequence().iter().collect();

        let quality_scores = if record.quality_scores().is_empty() {
            None
        } else {
            Some(record.quality_scores().iter().collect::<Vec<u8>>())
        };

        let read_name = if options.preserve_read_names {
            record.name().map(|n| n.as_bytes().to_vec()).unwrap_or_default()
        } else {
            Vec::new()
        };

        let tags = collect_tags(record, options)?;

        let cigar_ops = collect_cigar_ops(record)?;

        self.base_count += bases.len() as u64;
        self.feature_count += count_features(&cigar_ops, &bases, alignment_start, reference_bases);

        Ok(CompressionRecord {
            index,
            read_name,
            reference_sequence_id,
            alignment_start,
            alignment_end,
            alignment_delta: 0,
            template_size,
            bases,
            quality_scores,
            tags,
            cigar_ops,
            multi_fragment: flags.is_segmented(),
            first_segment: flags.is_first_segment(),
            last_segment: flags.is_last_segment(),
            secondary_alignment: flags.is_secondary(),
            next: None,
            previous: None,
            records_to_next_fragment: -1,
            detached: true,
            has_mate_downstream: false,
            force_preserve_quality_scores: false,
        })
    }
}

fn collect_cigar_ops(record: &RecordBuf) -> std::io::Result<Vec<CigarOp>> {
    use sam::alignment::record::Cigar as _;

    let mut ops = Vec::new();

    for result in record.cigar().iter() {
        let op = result?;
        let kind = op.kind();

        ops.push(CigarOp {
            len: op.len(),
            consumes_reference: kind.consumes_reference(),
            consumes_read: kind.consumes_read(),
            is_aligned: matches!(
                kind,
                Kind::Match | Kind::SequenceMatch | Kind::SequenceMismatch
            ),
        });
    }

    Ok(ops)
}

/// One feature per indel/clip op (matching the CRAM convention of encoding
/// an entire run as a single feature), plus one per substituted base within
/// aligned stretches when reference bases are available.
fn count_features(
    ops: &[CigarOp],
    bases: &[u8],
    alignment_start: i32,
    reference_bases: Option<&[u8]>,
) -> u64 {
    let mut count = 0u64;
    let mut ref_pos = alignment_start as usize;
    let mut read_pos = 0usize;

    for op in ops {
        if op.is_aligned {
            if let Some(reference) = reference_bases {
                for i in 0..op.len {
                    let read_base = bases.get(read_pos + i).copied();
                    let ref_base = reference.get(ref_pos + i - 1).copied();
                    if read_base.is_some() && read_base != ref_base {
                        count += 1;
                    }
                }
            }
        } else if op.consumes_reference || op.consumes_read {
            count += 1;
        }

        if op.consumes_read {
            read_pos += op.len;
        }
        if op.consumes_reference {
            ref_pos += op.len;
        }
    }

    count
}

fn collect_tags(
    record: &RecordBuf,
    options: &EncoderOptions,
) -> std::io::Result<Vec<(String, String)>> {
    use sam::alignment::record::Data as _;

    let mut tags = Vec::new();

    for result in record.data().iter() {
        let (tag, value) = result?;
        let name = tag.to_string();

        let keep = if options.ignore_tags.contains(&name) {
            false
        } else if options.capture_all_tags {
            true
        } else {
            options.capture_tags.contains(&name)
        };

        if keep {
            tags.push((name, format!("{value:?}")));
        }
    }

    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use noodles::core::Position;
    use noodles::sam::alignment::record::cigar::Op;
    use noodles::sam::alignment::record_buf::Cigar;
    use noodles::sam::alignment::record_buf::Sequence;

    fn minimal_header() -> sam::Header {
        use noodles::sam::header::record::value::{map::ReferenceSequence, Map};
        use std::num::NonZeroUsize;

        sam::Header::builder()
            .add_reference_sequence(
                "sq0",
                Map::<ReferenceSequence>::new(NonZeroUsize::new(100).unwrap()),
            )
            .build()
    }

    #[test]
    fn converts_a_simple_mapped_record() {
        let header = minimal_header();
        let mut record = RecordBuf::default();
        *record.reference_sequence_id_mut() = Some(0);
        *record.alignment_start_mut() = Position::new(10);
        *record.cigar_mut() = Cigar::from(vec![Op::new(Kind::Match, 4)]);
        *record.sequence_mut() = Sequence::from(b"ACGT".to_vec());

        let mut factory = Sam2CramFactory::new();
        let options = EncoderOptions::default();
        let compression_record = factory
            .convert(1, &header, &record, None, &options)
            .unwrap();

        assert_eq!(compression_record.alignment_start, 10);
        assert_eq!(compression_record.bases, b"ACGT");
        assert_eq!(factory.base_count(), 4);
    }

    #[test]
    fn counts_one_feature_per_indel_regardless_of_length() {
        let header = minimal_header();
        let mut record = RecordBuf::default();
        *record.reference_sequence_id_mut() = Some(0);
        *record.alignment_start_mut() = Position::new(1);
        *record.cigar_mut() = Cigar::from(vec![
            Op::new(Kind::Match, 2),
            Op::new(Kind::Deletion, 5),
            Op::new(Kind::Match, 2),
        ]);
        *record.sequence_mut() = Sequence::from(b"ACGT".to_vec());

        let mut factory = Sam2CramFactory::new();
        let options = EncoderOptions::default();
        factory.convert(1, &header, &record, None, &options).unwrap();

        assert_eq!(factory.feature_count(), 1);
    }
}
