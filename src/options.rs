//! Producer-facing configuration.

use std::collections::HashSet;

/// Number of records per slice, times slices per container, gives the
/// container-size boundary used by the boundary policy.
pub const DEFAULT_RECORDS_PER_SLICE: usize = 10_000;
pub const DEFAULT_SLICES_PER_CONTAINER: usize = 1;

/// Batch size above which a foreign-reference record is absorbed into a
/// multi-reference batch instead of forcing a seal.
pub const SWITCH_TO_MULTIREF_THRESHOLD: usize = 1_000;

/// Options set before the first call to `write_alignment`.
#[derive(Debug, Clone)]
pub struct EncoderOptions {
    pub records_per_slice: usize,
    pub slices_per_container: usize,
    pub preserve_read_names: bool,
    pub capture_all_tags: bool,
    pub capture_tags: HashSet<String>,
    pub ignore_tags: HashSet<String>,
    pub quality_preservation_policy: Option<String>,
    /// Enables the paranoid round-trip check in the flush pipeline. Off by
    /// default.
    pub paranoid_mode: bool,
}

impl EncoderOptions {
    pub fn container_size(&self) -> usize {
        self.records_per_slice * self.slices_per_container
    }
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            records_per_slice: DEFAULT_RECORDS_PER_SLICE,
            slices_per_container: DEFAULT_SLICES_PER_CONTAINER,
            preserve_read_names: true,
            capture_all_tags: true,
            capture_tags: HashSet::new(),
            ignore_tags: HashSet::new(),
            quality_preservation_policy: None,
            paranoid_mode: false,
        }
    }
}
