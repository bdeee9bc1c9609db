//! Index sink consumed by the flush pipeline once a container is sealed.

use std::io::{self, Write};

use crate::container::{Container, Slice};

/// One entry of the companion index: the reference span a sealed slice
/// covers and where its container lives in the output stream. Mirrors the
/// crai convention (reference id, alignment start, span, container offset,
/// container length) without depending on `noodles_cram`'s own index types.
#[derive(Debug, Clone, Copy)]
pub struct IndexRecord {
    pub reference_sequence_id: Option<usize>,
    pub alignment_start: i32,
    pub span: i32,
    pub offset: u64,
    pub length: u64,
}

/// Consumes sealed containers for indexing.
pub trait IndexSink {
    fn process_container(&mut self, container: &Container, length: u64) -> io::Result<()>;
    fn finish(&mut self) -> io::Result<()>;
}

/// Discards every container; used when indexing is disabled.
#[derive(Debug, Default)]
pub struct NullIndexSink;

impl IndexSink for NullIndexSink {
    fn process_container(&mut self, _container: &Container, _length: u64) -> io::Result<()> {
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writes a crai-style tab-separated index, one line per slice:
/// `reference_sequence_id\talignment_start\tspan\toffset\tlength`. Unmapped
/// slices report `reference_sequence_id` as `-1`, matching crai's
/// convention for unplaced records.
pub struct CraiIndexSink<W: Write> {
    sink: W,
}

impl<W: Write> CraiIndexSink<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }
}

impl<W: Write> IndexSink for CraiIndexSink<W> {
    fn process_container(&mut self, container: &Container, length: u64) -> io::Result<()> {
        for slice in &container.slices {
            let record = index_record_for_slice(slice, container.offset, length);
            writeln!(
                self.sink,
                "{}\t{}\t{}\t{}\t{}",
                record
                    .reference_sequence_id
                    .map(|id| id as i64)
                    .unwrap_or(-1),
                record.alignment_start,
                record.span,
                record.offset,
                record.length,
            )?;
        }

        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

fn index_record_for_slice(slice: &Slice, offset: u64, length: u64) -> IndexRecord {
    let reference_sequence_id = slice
        .records
        .first()
        .and_then(|record| record.reference_sequence_id);

    let start = slice
        .records
        .iter()
        .map(|record| record.alignment_start)
        .min()
        .unwrap_or(0);
    let end = slice
        .records
        .iter()
        .map(|record| record.alignment_end)
        .max()
        .unwrap_or(0);

    IndexRecord {
        reference_sequence_id,
        alignment_start: start,
        span: (end - start + 1).max(0),
        offset,
        length,
    }
}
