//! Metadata-based file comparison
//!
//! The comparer never reads file content; it works entirely from the
//! descriptors the adapters produced during listing. Checksums, when
//! present, were computed at list time.

use rulesync_core::domain::FileInfo;

/// Result of comparing two sides of one path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOutcome {
    /// No transfer needed
    Identical,
    /// Both sides exist and content differs
    Modified,
    /// Present only on the source side
    OnlyInSource,
    /// Present only on the target side
    OnlyInTarget,
}

/// Decides whether two descriptors need synchronization
pub trait Comparer: Send + Sync {
    fn compare(&self, src: Option<&FileInfo>, tgt: Option<&FileInfo>) -> DiffOutcome;
}

/// Size → mtime → checksum comparison cascade
///
/// For two regular files:
///
/// 1. Different sizes are always modified.
/// 2. Equal mtimes (exact instant equality) are identical.
/// 3. Otherwise, two non-empty checksums decide by equality.
/// 4. Two empty checksums (files above the checksum ceiling) fall back
///    to the size match from step 1 and report identical; equal-size
///    large files with different content are rare, and the alternative
///    is re-transferring every large file whose mtime drifted.
/// 5. Exactly one checksum present is reported as modified.
///
/// Directories compare by existence only. Mixed-type pairs are not
/// resolved here; the planner emits a conflict for those before the
/// comparer is consulted.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataComparer;

impl MetadataComparer {
    pub fn new() -> Self {
        Self
    }
}

impl Comparer for MetadataComparer {
    fn compare(&self, src: Option<&FileInfo>, tgt: Option<&FileInfo>) -> DiffOutcome {
        let (src, tgt) = match (src, tgt) {
            (None, None) => return DiffOutcome::Identical,
            (Some(_), None) => return DiffOutcome::OnlyInSource,
            (None, Some(_)) => return DiffOutcome::OnlyInTarget,
            (Some(s), Some(t)) => (s, t),
        };

        if src.is_dir() && tgt.is_dir() {
            return DiffOutcome::Identical;
        }

        if src.size != tgt.size {
            return DiffOutcome::Modified;
        }

        if src.mtime == tgt.mtime {
            return DiffOutcome::Identical;
        }

        match (src.checksum.is_empty(), tgt.checksum.is_empty()) {
            (false, false) if src.checksum == tgt.checksum => DiffOutcome::Identical,
            (false, false) => DiffOutcome::Modified,
            // Sizes already matched; without checksums that is the best
            // evidence available.
            (true, true) => DiffOutcome::Identical,
            _ => DiffOutcome::Modified,
        }
    }
}
