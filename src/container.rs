//! Container/slice packing and the byte-level container writer.
//!
//! A real CRAM codec table (bit-packed rANS/range coding) is out of scope
//! here; this module supplies a structurally faithful but simplified
//! container encoder instead: length-prefixed, gzip-compressed framing,
//! matching the block-compression approach the wider CRAM ecosystem uses
//! (`flate2`'s `GzEncoder`/`CrcWriter` pairing, e.g. the slice writer in
//! `noodles_cram`'s container writer).

use std::io::{self, Write};

use flate2::write::GzEncoder;
use flate2::Compression;
use md5::{Digest, Md5};

use crate::record::CompressionRecord;

/// CRAM format version this core writes.
pub const FORMAT_VERSION: (u8, u8) = (2, 1);

/// One slice: a contiguous run of compression records stamped with the MD5
/// of the reference bases it covers.
#[derive(Debug, Default)]
pub struct Slice {
    pub records: Vec<CompressionRecord>,
    pub ref_md5: [u8; 16],
}

impl Slice {
    /// Stamps `ref_md5` from the bases the enclosing batch covers, following
    /// the SAM spec's `M5` convention: strip non-graphic bytes, uppercase,
    /// then MD5.
    pub fn set_ref_md5(&mut self, batch_bases: &[u8]) {
        self.ref_md5 = md5_of_bases(batch_bases);
    }
}

pub fn md5_of_bases(bases: &[u8]) -> [u8; 16] {
    let cleaned: Vec<u8> = bases
        .iter()
        .filter(|b| b.is_ascii_graphic())
        .map(|b| b.to_ascii_uppercase())
        .collect();

    let mut hasher = Md5::new();
    hasher.update(&cleaned);
    hasher.finalize().into()
}

/// A sealed container: its slices plus the stream offset it was written at.
#[derive(Debug, Default)]
pub struct Container {
    pub slices: Vec<Slice>,
    pub offset: u64,
}

/// Packs a batch of compression records into one container of slices.
pub trait ContainerBuilder {
    fn build_container(
        &self,
        records: Vec<CompressionRecord>,
        slices_per_container: usize,
    ) -> Container;
}

/// Splits the batch into `slices_per_container` roughly-equal slices, in
/// arrival order, leaving `ref_md5` unset for the caller to stamp once the
/// batch's reference bases are known.
#[derive(Debug, Default)]
pub struct DefaultContainerBuilder;

impl ContainerBuilder for DefaultContainerBuilder {
    fn build_container(
        &self,
        records: Vec<CompressionRecord>,
        slices_per_container: usize,
    ) -> Container {
        if records.is_empty() {
            return Container::default();
        }

        let slices_per_container = slices_per_container.max(1);
        let chunk_size = records.len().div_ceil(slices_per_container).max(1);

        let slices = records
            .chunks(chunk_size)
            .map(|chunk| Slice {
                records: chunk.to_vec(),
                ref_md5: [0; 16],
            })
            .collect();

        Container { slices, offset: 0 }
    }
}

/// Writes the CRAM file header prelude -- magic bytes, version, and the
/// length-prefixed textual SAM header -- returning the byte count so the
/// caller can seed `file_offset`.
pub fn write_header_prelude<W: Write>(sink: &mut W, header_text: &str) -> io::Result<u64> {
    let mut written = 0u64;

    sink.write_all(b"CRAM")?;
    written += 4;

    sink.write_all(&[FORMAT_VERSION.0, FORMAT_VERSION.1])?;
    written += 2;

    let text_bytes = header_text.as_bytes();
    sink.write_all(&(text_bytes.len() as u64).to_le_bytes())?;
    written += 8;
    sink.write_all(text_bytes)?;
    written += text_bytes.len() as u64;

    Ok(written)
}

/// Writes the CRAM EOF marker.
pub fn write_eof_marker<W: Write>(sink: &mut W) -> io::Result<u64> {
    sink.write_all(b"EOF\0")?;
    Ok(4)
}

/// Serializes and writes one container to `sink`, returning the number of
/// bytes written so the caller can advance `file_offset` and keep
/// consecutive containers' offsets contiguous.
pub fn write_container<W: Write>(container: &Container, sink: &mut W) -> io::Result<u64> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());

    for slice in &container.slices {
        encoder.write_all(&(slice.records.len() as u32).to_le_bytes())?;
        encoder.write_all(&slice.ref_md5)?;
        for record in &slice.records {
            write_record(&mut encoder, record)?;
        }
    }

    let compressed = encoder.finish()?;

    let mut written = 0u64;
    sink.write_all(&(container.slices.len() as u32).to_le_bytes())?;
    written += 4;
    sink.write_all(&(compressed.len() as u64).to_le_bytes())?;
    written += 8;
    sink.write_all(&compressed)?;
    written += compressed.len() as u64;

    Ok(written)
}

fn write_record<W: Write>(w: &mut W, record: &CompressionRecord) -> io::Result<()> {
    w.write_all(&record.alignment_start.to_le_bytes())?;
    w.write_all(&record.alignment_delta.to_le_bytes())?;
    w.write_all(&(record.bases.len() as u32).to_le_bytes())?;
    w.write_all(&record.bases)?;

    match &record.quality_scores {
        Some(quality_scores) => {
            w.write_all(&[1])?;
            w.write_all(&(quality_scores.len() as u32).to_le_bytes())?;
            w.write_all(quality_scores)?;
        }
        None => w.write_all(&[0])?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(alignment_start: i32, bases: &[u8]) -> CompressionRecord {
        CompressionRecord {
            index: 1,
            read_name: b"r".to_vec(),
            reference_sequence_id: Some(0),
            alignment_start,
            alignment_end: alignment_start + bases.len() as i32 - 1,
            alignment_delta: 0,
            template_size: 0,
            bases: bases.to_vec(),
            quality_scores: Some(vec![30; bases.len()]),
            tags: Vec::new(),
            cigar_ops: Vec::new(),
            multi_fragment: false,
            first_segment: false,
            last_segment: false,
            secondary_alignment: false,
            next: None,
            previous: None,
            records_to_next_fragment: -1,
            detached: true,
            has_mate_downstream: false,
            force_preserve_quality_scores: false,
        }
    }

    #[test]
    fn md5_is_stable_and_case_insensitive_to_input_casing() {
        let upper = md5_of_bases(b"ACGT");
        let lower = md5_of_bases(b"acgt");
        assert_eq!(upper, lower);
        assert_ne!(upper, md5_of_bases(b"TTTT"));
    }

    #[test]
    fn builds_requested_number_of_slices() {
        let records: Vec<_> = (0..10).map(|i| record(i + 1, b"ACGT")).collect();
        let builder = DefaultContainerBuilder;
        let container = builder.build_container(records, 3);
        assert_eq!(container.slices.len(), 3);
        assert_eq!(
            container.slices.iter().map(|s| s.records.len()).sum::<usize>(),
            10
        );
    }

    #[test]
    fn write_container_reports_exactly_the_bytes_it_wrote() {
        let mut container = Container {
            slices: vec![Slice {
                records: vec![record(1, b"ACGT")],
                ref_md5: md5_of_bases(b"ACGT"),
            }],
            offset: 0,
        };
        container.offset = 42;

        let mut sink = Vec::new();
        let written = write_container(&container, &mut sink).unwrap();
        assert_eq!(written, sink.len() as u64);
    }
}
