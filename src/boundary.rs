//! Container boundary policy and batch state.

use noodles::sam::{self, alignment::RecordBuf};

use crate::record::{reference_key, RefSeqState};

/// The buffer of records accumulated since the last flush, plus the
/// reference-sequence state the boundary policy reads and updates.
///
/// `file_offset` (the running count of bytes written) is tracked by
/// [`crate::driver::EncoderDriver`] instead of here: unlike `buffer` and
/// `ref_seq_state`, it is never reset on flush, so it does not share this
/// type's between-flushes lifetime.
#[derive(Debug, Default)]
pub struct BatchState {
    pub buffer: Vec<RecordBuf>,
    pub ref_seq_state: RefSeqState,
}

impl BatchState {
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.ref_seq_state = RefSeqState::Uninitialised;
    }
}

/// Returns whether the SAM header declares coordinate sort order.
pub fn is_coordinate_sorted(header: &sam::Header) -> bool {
    use sam::header::record::value::map::header::sort_order::SortOrder;

    header
        .header()
        .and_then(|hd| hd.sort_order())
        .map(|order| order == SortOrder::Coordinate)
        .unwrap_or(false)
}

/// Decides whether the batch must be sealed before `incoming_reference_index`
/// is appended.
///
/// This does not itself mutate `state.ref_seq_state` -- the driver applies
/// the identical update rule (`RefSeqState::absorb`) unconditionally after
/// every append that isn't preceded by a seal, which covers every mutation
/// this policy would otherwise need to perform inline.
pub fn should_seal(
    state: &BatchState,
    incoming_reference_index: i32,
    coordinate_sorted: bool,
    container_size: usize,
    switch_to_multiref_threshold: usize,
) -> bool {
    if state.buffer.is_empty() {
        return false;
    }

    if state.buffer.len() >= container_size {
        return true;
    }

    if !coordinate_sorted || state.ref_seq_state.is_multi_reference() {
        return false;
    }

    let incoming_key = reference_key(incoming_reference_index);
    if state.ref_seq_state.id() == Some(incoming_key) {
        return false;
    }

    state.buffer.len() <= switch_to_multiref_threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use noodles::sam::alignment::record::Flags;
    use noodles::core::Position;

    fn rec_on(reference_sequence_id: usize) -> RecordBuf {
        let mut r = RecordBuf::default();
        *r.flags_mut() = Flags::empty();
        *r.reference_sequence_id_mut() = Some(reference_sequence_id);
        *r.alignment_start_mut() = Position::new(1);
        r
    }

    fn push(state: &mut BatchState, reference_sequence_id: i32) {
        state.buffer.push(rec_on(reference_sequence_id.max(0) as usize));
        state.ref_seq_state.absorb(reference_sequence_id);
    }

    #[test]
    fn empty_batch_never_seals() {
        let state = BatchState::default();
        assert!(!should_seal(&state, 0, true, 10_000, 1_000));
    }

    #[test]
    fn seals_once_container_size_reached() {
        let mut state = BatchState::default();
        for _ in 0..3 {
            push(&mut state, 0);
        }
        assert!(should_seal(&state, 0, true, 3, 1_000));
    }

    #[test]
    fn query_sorted_batches_never_seal_on_reference_change() {
        let mut state = BatchState::default();
        push(&mut state, 0);
        assert!(!should_seal(&state, 1, false, 10_000, 1_000));
    }

    #[test]
    fn small_batch_seals_on_foreign_reference() {
        let mut state = BatchState::default();
        for _ in 0..10 {
            push(&mut state, 0);
        }
        assert!(should_seal(&state, 1, true, 10_000, 1_000));
    }

    #[test]
    fn large_batch_absorbs_foreign_reference_into_multiref() {
        let mut state = BatchState::default();
        for _ in 0..1200 {
            push(&mut state, 0);
        }
        assert!(!should_seal(&state, 1, true, 10_000, 1_000));
    }

    #[test]
    fn multi_reference_batches_never_reseal_on_reference_change() {
        let mut state = BatchState::default();
        state.ref_seq_state = RefSeqState::MultiReference;
        state.buffer.push(rec_on(0));
        assert!(!should_seal(&state, 7, true, 10_000, 1_000));
    }
}
