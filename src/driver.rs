//! Orchestration: boundary → mate-resolve → quality → build → write → index.

use std::io::{self, Write};

use noodles::sam::{self, alignment::RecordBuf};

use crate::boundary::{is_coordinate_sorted, should_seal, BatchState};
use crate::container::{self, ContainerBuilder, DefaultContainerBuilder};
use crate::error::{EncodeError, Result};
use crate::factory::Sam2CramFactory;
use crate::index::IndexSink;
use crate::options::{EncoderOptions, SWITCH_TO_MULTIREF_THRESHOLD};
use crate::quality::{self, parse_policy, requires_tracks};
use crate::record::RefSeqState;
use crate::reference::ReferenceProvider;
use crate::tracks::ReferenceTracks;

/// Summary counters reported once the stream is finished: a CLI-facing
/// rollup of what the pipeline actually did.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncoderStats {
    pub records_written: u64,
    pub containers_sealed: u64,
    pub detached_records: u64,
}

/// Drives the encoder end to end. Owns the buffered batch, the running file
/// offset, the factory, and the index sink; single-threaded -- not safe for
/// concurrent access by multiple producers.
pub struct EncoderDriver {
    sink: Box<dyn Write>,
    reference_provider: Box<dyn ReferenceProvider>,
    index_sink: Box<dyn IndexSink>,
    container_builder: Box<dyn ContainerBuilder>,
    options: EncoderOptions,
    header: Option<sam::Header>,
    coordinate_sorted: bool,
    batch: BatchState,
    file_offset: u64,
    factory: Sam2CramFactory,
    records_written: u64,
    containers_sealed: u64,
    detached_records: u64,
}

impl EncoderDriver {
    pub fn new(
        sink: Box<dyn Write>,
        reference_provider: Box<dyn ReferenceProvider>,
        index_sink: Box<dyn IndexSink>,
        options: EncoderOptions,
    ) -> Self {
        Self {
            sink,
            reference_provider,
            index_sink,
            container_builder: Box::new(DefaultContainerBuilder),
            options,
            header: None,
            coordinate_sorted: false,
            batch: BatchState::default(),
            file_offset: 0,
            factory: Sam2CramFactory::new(),
            records_written: 0,
            containers_sealed: 0,
            detached_records: 0,
        }
    }

    /// Parses the textual SAM header, writes the CRAM file header prelude,
    /// and seeds `file_offset` to its byte length. Must be called exactly
    /// once before any `write_alignment`; a second call is a programmer
    /// error.
    pub fn write_header(&mut self, header_text: &str) -> Result<()> {
        if self.header.is_some() {
            return Err(EncodeError::HeaderAlreadyWritten);
        }

        let header: sam::Header = header_text
            .parse()
            .map_err(|e: sam::header::ParseError| {
                EncodeError::Io(io::Error::new(io::ErrorKind::InvalidData, e))
            })?;

        self.coordinate_sorted = is_coordinate_sorted(&header);

        let written = container::write_header_prelude(&mut self.sink, header_text)
            .map_err(EncodeError::SinkIo)?;
        self.file_offset = written;
        self.header = Some(header);

        Ok(())
    }

    /// Buffers one alignment record, sealing the current batch first if
    /// `should_seal` says so.
    pub fn write_alignment(&mut self, record: RecordBuf) -> Result<()> {
        use sam::alignment::Record as _;

        let header = self
            .header
            .as_ref()
            .ok_or(EncodeError::HeaderNotYetWritten)?;

        let incoming_reference_index = record
            .reference_sequence_id(header)
            .transpose()
            .map_err(EncodeError::Io)?
            .map(|id| id as i32)
            .unwrap_or(-1);

        if should_seal(
            &self.batch,
            incoming_reference_index,
            self.coordinate_sorted,
            self.options.container_size(),
            SWITCH_TO_MULTIREF_THRESHOLD,
        ) {
            self.flush()?;
        }

        self.batch.ref_seq_state.absorb(incoming_reference_index);
        self.batch.buffer.push(record);

        Ok(())
    }

    /// Flushes a non-empty buffer, writes the CRAM EOF marker, and closes
    /// both sinks. Both the output sink and the index sink are finalized on
    /// every exit path, even one that errors partway through -- a failure in
    /// the final flush or EOF marker never leaves an unflushed sink behind,
    /// it just becomes the error this returns. Returns a summary of what was
    /// written.
    pub fn finish(mut self) -> Result<EncoderStats> {
        if self.header.is_none() {
            return Err(EncodeError::HeaderNotYetWritten);
        }

        let mut result = self.flush_and_close();

        let sink_result = self.sink.flush().map_err(EncodeError::SinkIo);
        let index_result = self.index_sink.finish().map_err(EncodeError::SinkIo);

        if result.is_ok() {
            result = sink_result;
        }
        if result.is_ok() {
            result = index_result;
        }

        result?;

        Ok(EncoderStats {
            records_written: self.records_written,
            containers_sealed: self.containers_sealed,
            detached_records: self.detached_records,
        })
    }

    fn flush_and_close(&mut self) -> Result<()> {
        if !self.batch.buffer.is_empty() {
            self.flush()?;
        }

        container::write_eof_marker(&mut self.sink).map_err(EncodeError::SinkIo)?;

        Ok(())
    }

    /// The flush pipeline: resolve reference bases, allocate tracks,
    /// convert records, apply quality preservation, resolve mates, then
    /// build and write the container. Tracks are populated from each
    /// record's own resolved CIGAR ops as it's converted, so allocation and
    /// population happen in the same pass, ahead of quality preservation,
    /// which is the ordering that actually matters.
    fn flush(&mut self) -> Result<()> {
        let header = self.header.as_ref().expect("write_header already enforced");

        let policies = self
            .options
            .quality_preservation_policy
            .as_deref()
            .map(parse_policy)
            .unwrap_or_default();
        let need_tracks = requires_tracks(&policies);

        // Resolve the batch's reference bases.
        let batch_reference_bases: Vec<u8> = match self.batch.ref_seq_state {
            RefSeqState::MultiReference => {
                if need_tracks {
                    return Err(EncodeError::LossyMultiRefNotSupported);
                }
                Vec::new()
            }
            RefSeqState::Id(id) if id == usize::MAX => Vec::new(),
            RefSeqState::Id(id) => self.reference_provider.get_reference_bases(id)?,
            RefSeqState::Uninitialised => Vec::new(),
        };

        // Batch [start, stop] over aligned records only.
        let (min_start, max_end) = batch_span(&self.batch.buffer);

        // Allocate tracks (populated during the conversion loop below).
        let mut tracks = if need_tracks && !batch_reference_bases.is_empty() {
            Some(ReferenceTracks::new(
                min_start.unwrap_or(1),
                max_end.unwrap_or(1),
                &batch_reference_bases,
            ))
        } else {
            None
        };

        let originals: Vec<RecordBuf> = if self.options.paranoid_mode {
            self.batch.buffer.clone()
        } else {
            Vec::new()
        };

        // Convert to compression records.
        let mut compression_records = Vec::with_capacity(self.batch.buffer.len());
        let mut prev_alignment_start: Option<i32> = None;

        let mut batch_index: u64 = 0;
        for record in self.batch.buffer.drain(..) {
            use sam::alignment::Record as _;

            let record_reference_index = record
                .reference_sequence_id(header)
                .transpose()
                .map_err(EncodeError::Io)?;

            let record_reference_bases: Option<Vec<u8>> =
                if self.batch.ref_seq_state.is_multi_reference() {
                    match record_reference_index {
                        Some(id) => Some(self.reference_provider.get_reference_bases(id)?),
                        None => None,
                    }
                } else {
                    None
                };

            let bases_for_conversion = record_reference_bases.as_deref().or({
                if batch_reference_bases.is_empty() {
                    None
                } else {
                    Some(batch_reference_bases.as_slice())
                }
            });

            batch_index += 1;
            self.records_written += 1;
            let mut compression_record = self
                .factory
                .convert(batch_index, header, &record, bases_for_conversion, &self.options)
                .map_err(EncodeError::Io)?;

            compression_record.alignment_delta = match prev_alignment_start {
                Some(prev) => compression_record.alignment_start - prev,
                None => 0,
            };
            prev_alignment_start = Some(compression_record.alignment_start);

            if let Some(tracks) = tracks.as_mut() {
                if compression_record.alignment_start > 0 {
                    tracks.populate_record(&compression_record, &compression_record.cigar_ops);
                }
            }

            compression_records.push(compression_record);
        }

        // Quality preservation, or the lossless default.
        if let Some(tracks) = tracks.as_ref() {
            for record in compression_records.iter_mut() {
                if let Some(quality_scores) = record.quality_scores.as_mut() {
                    quality::apply(
                        quality_scores,
                        record.alignment_start,
                        &record.cigar_ops,
                        &policies,
                        tracks,
                    );
                }
            }
        } else {
            for record in compression_records.iter_mut() {
                record.force_preserve_quality_scores = record.quality_scores.is_some();
            }
        }

        // Advisory high-mismatch warning.
        let base_count = self.factory.base_count();
        let feature_count = self.factory.feature_count();
        if base_count < 3 * feature_count {
            log::warn!(
                "abnormally high mismatches (base_count={base_count}, feature_count={feature_count}) \
                 -- possibly wrong reference"
            );
        }

        // Mate resolution.
        crate::mate::resolve(&mut compression_records, self.coordinate_sorted);
        self.detached_records += compression_records.iter().filter(|r| r.detached).count() as u64;

        // Optional paranoid round-trip check.
        if self.options.paranoid_mode {
            for (original, converted) in originals.iter().zip(compression_records.iter()) {
                check_round_trip(original, converted, header)?;
            }
        }

        // Build, stamp, and write the container.
        let mut container = self
            .container_builder
            .build_container(compression_records, self.options.slices_per_container);
        for slice in container.slices.iter_mut() {
            slice.set_ref_md5(&batch_reference_bases);
        }
        container.offset = self.file_offset;

        let bytes_written =
            container::write_container(&container, &mut self.sink).map_err(EncodeError::SinkIo)?;
        self.file_offset += bytes_written;

        // Notify the index sink.
        self.index_sink
            .process_container(&container, bytes_written)
            .map_err(EncodeError::SinkIo)?;

        self.containers_sealed += 1;

        // Reset batch state.
        self.batch.clear();

        Ok(())
    }
}

fn batch_span(buffer: &[RecordBuf]) -> (Option<usize>, Option<usize>) {
    use sam::alignment::Record as _;

    let mut min_start = None;
    let mut max_end = None;

    for record in buffer {
        let start = record.alignment_start().transpose().ok().flatten();
        let end = record.alignment_end().transpose().ok().flatten();

        if let (Some(start), Some(end)) = (start, end) {
            let start = usize::from(start);
            let end = usize::from(end);
            min_start = Some(min_start.map_or(start, |m: usize| m.min(start)));
            max_end = Some(max_end.map_or(end, |m: usize| m.max(end)));
        }
    }

    (min_start, max_end)
}

/// The paranoid round-trip assertion: a lightweight inverse check over
/// alignment start, reference name, read bases, and base qualities, rather
/// than a full inverse `Sam2CramFactory`, since this core never
/// materializes decoded CRAM bytes to invert in the first place.
fn check_round_trip(
    original: &RecordBuf,
    converted: &crate::record::CompressionRecord,
    header: &sam::Header,
) -> Result<()> {
    use sam::alignment::Record as _;

    let original_start = original
        .alignment_start()
        .transpose()
        .map_err(EncodeError::Io)?
        .map(usize::from)
        .unwrap_or(0) as i32;
    if original_start != converted.alignment_start {
        return Err(EncodeError::RoundTripMismatch {
            index: converted.index,
            field: "alignment_start",
        });
    }

    let original_reference_name = original
        .reference_sequence_id(header)
        .transpose()
        .map_err(EncodeError::Io)?
        .and_then(|id| header.reference_sequences().get_index(id))
        .map(|(name, _)| name.clone());
    let converted_reference_name = converted
        .reference_sequence_id
        .and_then(|id| header.reference_sequences().get_index(id))
        .map(|(name, _)| name.clone());
    if original_reference_name != converted_reference_name {
        return Err(EncodeError::RoundTripMismatch {
            index: converted.index,
            field: "reference_name",
        });
    }

    let original_bases: Vec<u8> = original.sequence().iter().collect();
    if original_bases != converted.bases {
        return Err(EncodeError::RoundTripMismatch {
            index: converted.index,
            field: "bases",
        });
    }

    let original_quality: Vec<u8> = original.quality_scores().iter().collect();
    let original_quality = if original_quality.is_empty() {
        None
    } else {
        Some(original_quality)
    };
    if original_quality != converted.quality_scores {
        return Err(EncodeError::RoundTripMismatch {
            index: converted.index,
            field: "quality_scores",
        });
    }

    Ok(())
}
