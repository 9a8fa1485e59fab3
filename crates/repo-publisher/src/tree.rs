//! Tree assembly with inline-vs-blob thresholding.

use proprietary_scrub::{is_lockfile, CleaningResult};
use tracing::{debug, warn};

use crate::source_host::{SourceHost, TreeItem};

/// Files larger than this many encoded bytes are uploaded as blobs first.
pub const DEFAULT_INLINE_THRESHOLD: usize = 100 * 1024;

/// Outcome of [`build_tree`].
#[derive(Debug, Clone, Default)]
pub struct BuiltTree {
    /// Sorted by path.
    pub items: Vec<TreeItem>,
    pub blobs_uploaded: usize,
    /// Blob uploads that failed and fell back to inline content.
    pub blob_fallbacks: usize,
}

/// Whether content of this size must go through the blob endpoint.
pub fn requires_blob(content: &str, threshold: usize) -> bool {
    content.len() > threshold
}

/// Paths that end up in the tree: not removed, not a lockfile.
pub fn publishable<'a>(
    results: impl IntoIterator<Item = &'a CleaningResult>,
) -> Vec<&'a CleaningResult> {
    let mut files: Vec<&CleaningResult> = results
        .into_iter()
        .filter(|r| !r.removed && !is_lockfile(&r.path))
        .collect();
    files.sort_by(|a, b| a.path.cmp(&b.path));
    files
}

/// Build the tree items for `files`, uploading oversized files as blobs.
pub async fn build_tree(
    host: &dyn SourceHost,
    owner: &str,
    repo: &str,
    files: &[&CleaningResult],
    threshold: usize,
) -> BuiltTree {
    let mut built = BuiltTree::default();
    for file in files {
        let path = file.path.trim_start_matches("./").trim_start_matches('/');
        let content = &file.cleaned_content;
        if !requires_blob(content, threshold) {
            built.items.push(TreeItem::inline(path, content.as_str()));
            continue;
        }
        match host.create_blob(owner, repo, content).await {
            Ok(sha) => {
                debug!(path = %path, bytes = content.len(), "Uploaded blob");
                built.blobs_uploaded += 1;
                built.items.push(TreeItem::blob(path, sha));
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Blob upload failed, inlining content");
                built.blob_fallbacks += 1;
                built.items.push(TreeItem::inline(path, content.as_str()));
            }
        }
    }
    built
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(path: &str, content: &str, removed: bool) -> CleaningResult {
        CleaningResult {
            path: path.to_string(),
            original_content: content.to_string(),
            cleaned_content: content.to_string(),
            changes: Vec::new(),
            removed,
        }
    }

    #[test]
    fn test_threshold_is_strictly_greater() {
        let exact = "a".repeat(DEFAULT_INLINE_THRESHOLD);
        assert!(!requires_blob(&exact, DEFAULT_INLINE_THRESHOLD));
        let over = "a".repeat(DEFAULT_INLINE_THRESHOLD + 1);
        assert!(requires_blob(&over, DEFAULT_INLINE_THRESHOLD));
    }

    #[test]
    fn test_threshold_counts_encoded_bytes() {
        // 4 chars, 12 UTF-8 bytes
        assert!(requires_blob("日本語!", 10));
    }

    #[test]
    fn test_publishable_skips_removed_and_lockfiles_and_sorts() {
        let results = vec![
            result("src/b.ts", "b", false),
            result("yarn.lock", "", false),
            result(".lovable/x", "", true),
            result("README.md", "r", false),
        ];
        let paths: Vec<&str> = publishable(&results)
            .iter()
            .map(|r| r.path.as_str())
            .collect();
        assert_eq!(paths, vec!["README.md", "src/b.ts"]);
    }
}
