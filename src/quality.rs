//! Lossy quality-score preservation policy.
//!
//! A compact grammar built from the two counters [`crate::tracks::ReferenceTracks`]
//! tracks -- reference coverage and mismatches (documented further in
//! DESIGN.md):
//!
//! - `*N` -- preserve the quality score at a reference position covered by
//!   fewer than `N` reads (thin coverage means the base can't be corrected
//!   statistically, so its quality is kept).
//! - `MN` -- preserve the quality score at a reference position with at
//!   least `N` mismatches recorded against it (likely variant site).
//!
//! Entries are concatenated with no separator (e.g. `"*8M3"`). Positions not
//! covered by any surviving cigar-aligned base (insertions, clips) are
//! always preserved, since no reference position exists to evaluate a
//! threshold against.

use crate::record::CigarOp;
use crate::tracks::ReferenceTracks;

/// A masked-out quality score is replaced with this sentinel.
pub const MASKED_QUALITY_SCORE: u8 = 0xff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreservationPolicy {
    MinCoverage(u32),
    MinMismatches(u32),
}

/// Parses a compact preservation policy string into an ordered list of
/// entries. Unrecognized characters are ignored rather than rejected -- a
/// forward-compatible stance matching the "unknown tag" tolerance elsewhere
/// in this pipeline.
pub fn parse_policy(policy: &str) -> Vec<PreservationPolicy> {
    let mut entries = Vec::new();
    let chars: Vec<char> = policy.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let op = chars[i];
        if op != '*' && op != 'M' {
            i += 1;
            continue;
        }

        let mut j = i + 1;
        while j < chars.len() && chars[j].is_ascii_digit() {
            j += 1;
        }

        if j > i + 1 {
            let n: u32 = chars[i + 1..j].iter().collect::<String>().parse().unwrap_or(0);
            entries.push(match op {
                '*' => PreservationPolicy::MinCoverage(n),
                'M' => PreservationPolicy::MinMismatches(n),
                _ => unreachable!(),
            });
        }

        i = j;
    }

    entries
}

/// Reports whether the active policy consults coverage/mismatch counts --
/// if so, a [`ReferenceTracks`] must have been populated before [`apply`]
/// is called.
pub fn requires_tracks(policies: &[PreservationPolicy]) -> bool {
    !policies.is_empty()
}

fn should_preserve(policies: &[PreservationPolicy], tracks: &ReferenceTracks<'_>, pos: usize) -> bool {
    policies.iter().any(|policy| match policy {
        PreservationPolicy::MinCoverage(n) => tracks.coverage_at(pos) < *n,
        PreservationPolicy::MinMismatches(n) => tracks.mismatches_at(pos) >= *n,
    })
}

/// Masks quality scores in place per the active policy, walking the cigar
/// the same way [`ReferenceTracks::populate_record`] does so per-read-base
/// positions map back to the reference positions the policy evaluates.
pub fn apply(
    quality_scores: &mut [u8],
    alignment_start: i32,
    ops: &[CigarOp],
    policies: &[PreservationPolicy],
    tracks: &ReferenceTracks<'_>,
) {
    let mut ref_pos = alignment_start as usize;
    let mut read_pos: usize = 0;

    for op in ops {
        if op.is_aligned {
            for i in 0..op.len {
                let idx = read_pos + i;
                if idx >= quality_scores.len() {
                    continue;
                }
                if !should_preserve(policies, tracks, ref_pos + i) {
                    quality_scores[idx] = MASKED_QUALITY_SCORE;
                }
            }
        }
        // Non-aligned stretches (insertions, clips) are left untouched --
        // there is no reference position to evaluate a threshold against.

        if op.consumes_read {
            read_pos += op.len;
        }
        if op.consumes_reference {
            ref_pos += op.len;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_example_policy_string() {
        assert_eq!(parse_policy("*8"), vec![PreservationPolicy::MinCoverage(8)]);
    }

    #[test]
    fn parses_multiple_concatenated_entries() {
        assert_eq!(
            parse_policy("*8M3"),
            vec![
                PreservationPolicy::MinCoverage(8),
                PreservationPolicy::MinMismatches(3),
            ]
        );
    }

    #[test]
    fn empty_policy_does_not_require_tracks() {
        assert!(!requires_tracks(&parse_policy("")));
        assert!(requires_tracks(&parse_policy("*8")));
    }

    #[test]
    fn masks_high_coverage_positions_and_keeps_thin_coverage() {
        let reference = b"ACGTACGT";
        let mut tracks = ReferenceTracks::new(1, 8, reference);
        // Drive coverage to 10 at positions 1..=4, leave 5..=8 at 0.
        for _ in 0..10 {
            tracks.add_coverage(1, 1);
            tracks.add_coverage(2, 1);
            tracks.add_coverage(3, 1);
            tracks.add_coverage(4, 1);
        }

        let policies = parse_policy("*8");
        let ops = [CigarOp {
            len: 8,
            consumes_reference: true,
            consumes_read: true,
            is_aligned: true,
        }];
        let mut quals = vec![30u8; 8];
        apply(&mut quals, 1, &ops, &policies, &tracks);

        // positions 1..=4 have coverage 10 >= 8: masked.
        assert_eq!(&quals[0..4], &[MASKED_QUALITY_SCORE; 4]);
        // positions 5..=8 have coverage 0 < 8: preserved.
        assert_eq!(&quals[4..8], &[30, 30, 30, 30]);
    }
}
