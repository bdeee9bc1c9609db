//! The in-batch compression record and the tri-state reference-sequence tag.

/// Tags the reference sequence a batch is currently bound to.
///
/// A proper tagged variant in place of sentinel integers
/// (`UNINITIALISED = -3`, `MULTI_REFERENCE = -2`) -- those sentinel values
/// are an on-the-wire/legacy concern only; they never need to persist past
/// this in-memory representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefSeqState {
    #[default]
    Uninitialised,
    MultiReference,
    Id(usize),
}

/// Maps a SAM-style reference index (`-1` meaning unmapped) to the `usize`
/// key `RefSeqState` compares against.
pub fn reference_key(reference_index: i32) -> usize {
    if reference_index < 0 {
        usize::MAX
    } else {
        reference_index as usize
    }
}

impl RefSeqState {
    pub fn is_multi_reference(&self) -> bool {
        matches!(self, RefSeqState::MultiReference)
    }

    pub fn is_uninitialised(&self) -> bool {
        matches!(self, RefSeqState::Uninitialised)
    }

    pub fn id(&self) -> Option<usize> {
        match self {
            RefSeqState::Id(id) => Some(*id),
            _ => None,
        }
    }

    /// Applies the post-append update rule: uninitialised adopts the
    /// incoming reference; a differing id promotes to multi-reference;
    /// multi-reference is sticky until flush.
    pub fn absorb(&mut self, incoming_reference_index: i32) {
        let incoming = reference_key(incoming_reference_index);
        match *self {
            RefSeqState::Uninitialised => {
                *self = RefSeqState::Id(incoming);
            }
            RefSeqState::Id(current) => {
                if incoming != current {
                    *self = RefSeqState::MultiReference;
                }
            }
            RefSeqState::MultiReference => {}
        }
    }
}

/// A cigar operation reduced to the predicates the tracks/quality builders
/// actually consult. The full CIGAR model lives in `noodles_sam`; this is
/// populated once per record by [`crate::factory::Sam2CramFactory`].
#[derive(Debug, Clone, Copy)]
pub struct CigarOp {
    pub len: usize,
    pub consumes_reference: bool,
    pub consumes_read: bool,
    pub is_aligned: bool,
}

/// An alignment record transformed into reference-relative form, resolved
/// for mate linkage.
///
/// `next`/`previous` are flat-arena indices into the batch's
/// `Vec<CompressionRecord>`, not owned references: the invariant that
/// `previous`/`next` form an acyclic forest is enforced by
/// [`crate::mate::resolve`], never by this type itself.
#[derive(Debug, Clone)]
pub struct CompressionRecord {
    /// 1-based position within the batch.
    pub index: u64,
    pub read_name: Vec<u8>,
    pub reference_sequence_id: Option<usize>,
    pub alignment_start: i32,
    pub alignment_end: i32,
    pub alignment_delta: i32,
    pub template_size: i32,
    pub bases: Vec<u8>,
    pub quality_scores: Option<Vec<u8>>,
    pub tags: Vec<(String, String)>,
    pub cigar_ops: Vec<CigarOp>,

    pub multi_fragment: bool,
    pub first_segment: bool,
    pub last_segment: bool,
    pub secondary_alignment: bool,

    pub next: Option<usize>,
    pub previous: Option<usize>,
    pub records_to_next_fragment: i32,
    pub detached: bool,
    pub has_mate_downstream: bool,
    pub force_preserve_quality_scores: bool,
}

impl CompressionRecord {
    /// Clears all mate-linkage state, marking the record as independently
    /// reconstructable.
    pub fn clear_linkage(&mut self) {
        self.next = None;
        self.previous = None;
        self.records_to_next_fragment = -1;
        self.has_mate_downstream = false;
    }

    pub fn mark_detached(&mut self) {
        self.detached = true;
        self.has_mate_downstream = false;
        self.records_to_next_fragment = -1;
    }
}
