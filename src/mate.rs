//! Mate linkage resolution within a batch.
//!
//! Only runs on coordinate-sorted batches. The in-batch chain is addressed
//! by flat-arena index rather than by owned reference, so `next`/`previous`
//! are plain `Option<usize>` offsets into the batch slice.

use std::collections::HashMap;

use crate::record::CompressionRecord;

/// Computes the expected template length for a reconstructable mate chain
/// from its head and tail. This is the standard SAM outer-insert-size
/// convention: the distance from the leftmost mapped base of the head to
/// the rightmost mapped base of the tail, inclusive.
pub fn compute_insert_size(head: &CompressionRecord, tail: &CompressionRecord) -> i32 {
    tail.alignment_end - head.alignment_start + 1
}

/// Resolves mate linkage for a batch in place.
///
/// `coordinate_sorted` gates the whole resolver: on a non-coordinate-sorted
/// stream every record is marked detached and nothing else runs.
pub fn resolve(records: &mut [CompressionRecord], coordinate_sorted: bool) {
    if !coordinate_sorted {
        for record in records.iter_mut() {
            record.detached = true;
            record.has_mate_downstream = false;
            record.records_to_next_fragment = -1;
            record.next = None;
            record.previous = None;
        }
        return;
    }

    let mut primary: HashMap<Vec<u8>, usize> = HashMap::new();
    let mut secondary: HashMap<Vec<u8>, usize> = HashMap::new();

    // Pass 1 -- link primary & secondary mate streams separately.
    for i in 0..records.len() {
        if !records[i].multi_fragment {
            records[i].detached = true;
            records[i].has_mate_downstream = false;
            records[i].records_to_next_fragment = -1;
            records[i].next = None;
            records[i].previous = None;
            continue;
        }

        let map = if records[i].secondary_alignment {
            &mut secondary
        } else {
            &mut primary
        };

        let read_name = records[i].read_name.clone();

        match map.get(&read_name).copied() {
            None => {
                map.insert(read_name, i);
            }
            Some(mate_head) => {
                let mut tail = mate_head;
                while let Some(next) = records[tail].next {
                    tail = next;
                }

                let tail_index = records[tail].index as i64;
                let r_index = records[i].index as i64;
                records[tail].records_to_next_fragment = (r_index - tail_index - 1) as i32;
                records[tail].next = Some(i);
                records[i].previous = Some(tail);
                records[tail].has_mate_downstream = true;
                records[i].has_mate_downstream = false;
                records[i].detached = false;
                records[tail].detached = false;
            }
        }
    }

    // Pass 2 -- validate reconstructability of every chain head.
    for i in 0..records.len() {
        if records[i].next.is_some() && records[i].previous.is_none() {
            validate_chain(records, i);
        }
    }

    // Pass 3 -- isolated map entries: no partner arrived in-batch.
    for idx in primary.into_values().chain(secondary.into_values()) {
        if records[idx].next.is_none() {
            records[idx].detached = true;
            records[idx].has_mate_downstream = false;
            records[idx].records_to_next_fragment = -1;
            records[idx].previous = None;
        }
    }
}

fn chain_indices(records: &[CompressionRecord], head: usize) -> Vec<usize> {
    let mut chain = vec![head];
    let mut cur = head;
    while let Some(next) = records[cur].next {
        chain.push(next);
        cur = next;
    }
    chain
}

fn validate_chain(records: &mut [CompressionRecord], head: usize) {
    let chain = chain_indices(records, head);
    let tail = *chain.last().expect("chain always has at least the head");

    if !(records[head].first_segment && records[tail].last_segment) {
        detach(records, head);
        return;
    }

    let expected_tlen = compute_insert_size(&records[head], &records[tail]);
    if records[head].template_size != expected_tlen {
        detach(records, head);
        return;
    }

    for &idx in &chain[1..chain.len().saturating_sub(1)] {
        if records[idx].template_size != -expected_tlen {
            detach(records, head);
            return;
        }
    }
}

/// Marks every record in `head`'s chain as detached, without disturbing the
/// chain pointers themselves -- the downstream encoder treats detached
/// records as independent regardless of what the pointers still say.
fn detach(records: &mut [CompressionRecord], head: usize) {
    let mut cur = Some(head);
    while let Some(idx) = cur {
        let next = records[idx].next;
        records[idx].mark_detached();
        cur = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mate_record(
        index: u64,
        read_name: &[u8],
        alignment_start: i32,
        alignment_end: i32,
        template_size: i32,
        first_segment: bool,
        last_segment: bool,
    ) -> CompressionRecord {
        CompressionRecord {
            index,
            read_name: read_name.to_vec(),
            reference_sequence_id: Some(0),
            alignment_start,
            alignment_end,
            alignment_delta: 0,
            template_size,
            bases: Vec::new(),
            quality_scores: None,
            tags: Vec::new(),
            cigar_ops: Vec::new(),
            multi_fragment: true,
            first_segment,
            last_segment,
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
    fn reconstructable_pair_is_linked_and_not_detached() {
        // head: start 100, end 149 (len 50); tail: start 200, end 249.
        // Expected TLEN = 249 - 100 + 1 = 150.
        let mut records = vec![
            mate_record(1, b"read1", 100, 149, 150, true, false),
            mate_record(2, b"read1", 200, 249, -150, false, true),
        ];

        resolve(&mut records, true);

        assert!(!records[0].detached);
        assert!(!records[1].detached);
        assert_eq!(records[0].next, Some(1));
        assert_eq!(records[1].previous, Some(0));
        assert_eq!(records[0].records_to_next_fragment, 0);
        assert!(records[0].has_mate_downstream);
        assert!(!records[1].has_mate_downstream);
    }

    #[test]
    fn inconsistent_template_size_detaches_both() {
        let mut records = vec![
            mate_record(1, b"read1", 100, 149, 999, true, false),
            mate_record(2, b"read1", 200, 249, -150, false, true),
        ];

        resolve(&mut records, true);

        assert!(records[0].detached);
        assert!(records[1].detached);
    }

    #[test]
    fn unpaired_read_in_batch_is_detached() {
        let mut records = vec![mate_record(1, b"read1", 100, 149, 0, true, false)];
        resolve(&mut records, true);
        assert!(records[0].detached);
        assert_eq!(records[0].records_to_next_fragment, -1);
    }

    #[test]
    fn non_coordinate_sorted_batches_detach_everything() {
        let mut records = vec![
            mate_record(1, b"read1", 100, 149, 150, true, false),
            mate_record(2, b"read1", 200, 249, -150, false, true),
        ];
        resolve(&mut records, false);
        assert!(records[0].detached);
        assert!(records[1].detached);
        assert_eq!(records[0].next, None);
    }

    #[test]
    fn single_fragment_reads_are_always_detached() {
        let mut rec = mate_record(1, b"read1", 100, 149, 0, true, true);
        rec.multi_fragment = false;
        let mut records = vec![rec];
        resolve(&mut records, true);
        assert!(records[0].detached);
    }
}
