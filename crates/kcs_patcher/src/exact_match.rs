//! Byte-exact substitution for non-image assets.

use crate::resolver::Candidate;

/// Find the first candidate whose original file is byte-identical to
/// `content`.
///
/// Candidates are tried in load order; an original that cannot be read is
/// logged and skipped.
pub fn find_exact_match<'a>(content: &[u8], candidates: &'a [Candidate]) -> Option<&'a Candidate> {
    candidates.iter().find(|candidate| {
        match std::fs::read(candidate.original_path.as_std_path()) {
            Ok(original) => original == content,
            Err(e) => {
                tracing::error!(
                    "Failed to read original '{}' for {}: {}",
                    candidate.original_path,
                    candidate.name,
                    e
                );
                false
            }
        }
    })
}
