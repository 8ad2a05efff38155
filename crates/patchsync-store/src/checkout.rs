use regex::Regex;
use std::sync::LazyLock;

static PATCH_BRANCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"patch/([0-9a-f]+)").expect("patch branch pattern is valid"));

/// Patch id fragment encoded in a branch name such as `patch/ab12cd34`.
pub fn checked_out_patch_id(branch: &str) -> Option<&str> {
    PATCH_BRANCH
        .captures(branch)
        .and_then(|captures| captures.get(1))
        .map(|fragment| fragment.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_hex_after_patch_segment() {
        assert_eq!(checked_out_patch_id("patch/ab12cd34"), Some("ab12cd34"));
        assert_eq!(
            checked_out_patch_id("remotes/rad/patch/0f9e8d7c"),
            Some("0f9e8d7c")
        );
        assert_eq!(checked_out_patch_id("patch/ab12-wip"), Some("ab12"));
    }

    #[test]
    fn branches_without_patch_segment_have_no_id() {
        assert_eq!(checked_out_patch_id("main"), None);
        assert_eq!(checked_out_patch_id("feature/parser"), None);
        assert_eq!(checked_out_patch_id("patch/"), None);
        assert_eq!(checked_out_patch_id("patch/XYZ"), None);
    }
}
