//! Node path normalization
//!
//! Node paths are slash-separated, case-sensitive, carry no trailing slash,
//! and always start at the root `/`. Empty segments are collapsed.

/// The root node path
pub const ROOT: &str = "/";

/// Normalize a raw path into canonical form.
///
/// `"world//europe/"` becomes `"/world/europe"`; the empty string and `"/"`
/// both normalize to the root.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 1);
    for segment in raw.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        ROOT.to_string()
    } else {
        out
    }
}

/// Join a relative path chain onto a parent path.
pub fn join(parent: &str, rel: &str) -> String {
    let parent = normalize(parent);
    let rel = rel.trim_matches('/');
    if rel.is_empty() {
        return parent;
    }
    if parent == ROOT {
        normalize(rel)
    } else {
        normalize(&format!("{}/{}", parent, rel))
    }
}

/// Split a normalized path into its segments. The root has no segments.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Whether `path` contains `/<segment>` anywhere.
///
/// This is deliberately a substring match, not a whole-segment match: a
/// segment of `"data"` also matches a node named `"datatransfer"`. Backup and
/// restore both rely on this exact behavior when excluding subtrees.
pub fn contains_segment(path: &str, segment: &str) -> bool {
    !segment.is_empty() && path.contains(&format!("/{}", segment))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("world"), "/world");
        assert_eq!(normalize("/world/europe/"), "/world/europe");
        assert_eq!(normalize("world//europe"), "/world/europe");
    }

    #[test]
    fn test_join() {
        assert_eq!(join("/", "world"), "/world");
        assert_eq!(join("/world", "europe/germany"), "/world/europe/germany");
        assert_eq!(join("/world", ""), "/world");
        assert_eq!(join("/world", "/europe/"), "/world/europe");
    }

    #[test]
    fn test_segments() {
        let segs: Vec<&str> = segments("/world/europe").collect();
        assert_eq!(segs, vec!["world", "europe"]);
        assert_eq!(segments("/").count(), 0);
    }

    #[test]
    fn test_contains_segment_substring_semantics() {
        assert!(contains_segment("/world/datatransfer/x", "datatransfer"));
        // substring match: a longer node name still matches
        assert!(contains_segment("/world/datatransfer2", "datatransfer"));
        assert!(!contains_segment("/world/europe", "datatransfer"));
        assert!(!contains_segment("/world", ""));
    }
}
