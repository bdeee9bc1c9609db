//! Per-position reference coverage and mismatch tracking.

use crate::record::{CigarOp, CompressionRecord};

/// A coordinate-sorted window over one reference sequence's coverage and
/// mismatch counts.
///
/// Constructed per flush, bounded to `[min_start, max_end]` of the batch
/// being sealed. Positions are 1-based, matching `alignment_start`.
#[derive(Debug)]
pub struct ReferenceTracks<'a> {
    min_start: usize,
    reference_bases: &'a [u8],
    coverage: Vec<u32>,
    mismatches: Vec<u32>,
}

impl<'a> ReferenceTracks<'a> {
    /// `reference_bases` is the entire reference sequence returned by the
    /// `ReferenceProvider`, indexed from position 1 -- i.e.
    /// `reference_bases[0]` is the base at position 1, not at `min_start`.
    /// Only `coverage`/`mismatches` are windowed to `[min_start, max_end]`.
    pub fn new(min_start: usize, max_end: usize, reference_bases: &'a [u8]) -> Self {
        let len = max_end.saturating_sub(min_start) + 1;
        Self {
            min_start,
            reference_bases,
            coverage: vec![0; len],
            mismatches: vec![0; len],
        }
    }

    fn offset(&self, pos: usize) -> usize {
        pos - self.min_start
    }

    pub fn add_coverage(&mut self, pos: usize, amount: u32) {
        let i = self.offset(pos);
        self.coverage[i] += amount;
    }

    pub fn add_mismatches(&mut self, pos: usize, amount: u32) {
        let i = self.offset(pos);
        self.mismatches[i] += amount;
    }

    pub fn coverage_at(&self, pos: usize) -> u32 {
        self.coverage[self.offset(pos)]
    }

    pub fn mismatches_at(&self, pos: usize) -> u32 {
        self.mismatches[self.offset(pos)]
    }

    pub fn base_at(&self, pos: usize) -> u8 {
        self.reference_bases[pos - 1]
    }

    /// Populates coverage/mismatch counts for one aligned record.
    ///
    /// Indexes read bases as `read_pos + i` within each cigar op, not
    /// `read_pos + (read_pos + i)` -- the latter double-counts `read_pos`
    /// and was rejected as a bug during design.
    pub fn populate_record(&mut self, record: &CompressionRecord, ops: &[CigarOp]) {
        let mut ref_pos = record.alignment_start as usize;
        let mut read_pos: usize = 0;

        for op in ops {
            if op.consumes_reference {
                for i in 0..op.len {
                    self.add_coverage(ref_pos + i, 1);
                }
            }

            if op.is_aligned {
                for i in 0..op.len {
                    let read_base = record.bases.get(read_pos + i).copied().unwrap_or(b'N');
                    let ref_base = self.base_at(ref_pos + i);
                    if read_base != ref_base {
                        self.add_mismatches(ref_pos + i, 1);
                    }
                }
            }

            if op.consumes_read {
                read_pos += op.len;
            }
            if op.consumes_reference {
                ref_pos += op.len;
            }
        }
    }
}
