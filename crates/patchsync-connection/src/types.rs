use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub type Rid = String;
pub type PatchId = String;
pub type Oid = String;

/// Length of the abbreviated form of commit and patch ids.
pub const SHORT_ID_LEN: usize = 7;

pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((index, _)) => &id[..index],
        None => id,
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl Author {
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(self.id.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchCounts {
    #[serde(default)]
    pub draft: usize,
    #[serde(default)]
    pub open: usize,
    #[serde(default)]
    pub archived: usize,
    #[serde(default)]
    pub merged: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueCounts {
    #[serde(default)]
    pub open: usize,
    #[serde(default)]
    pub closed: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visibility {
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Rid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default_branch: String,
    #[serde(default)]
    pub delegates: Vec<Author>,
    #[serde(default)]
    pub threshold: usize,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub head: Oid,
    #[serde(default)]
    pub patches: PatchCounts,
    #[serde(default)]
    pub issues: IssueCounts,
    #[serde(default)]
    pub seeding: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchStatus {
    Draft,
    Open,
    Archived,
    Merged,
}

impl PatchStatus {
    /// Every status, in the order the wire adapter requests them.
    pub const ALL: [PatchStatus; 4] = [
        PatchStatus::Draft,
        PatchStatus::Open,
        PatchStatus::Archived,
        PatchStatus::Merged,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PatchStatus::Draft => "draft",
            PatchStatus::Open => "open",
            PatchStatus::Archived => "archived",
            PatchStatus::Merged => "merged",
        }
    }
}

impl fmt::Display for PatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for PatchStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(PatchStatus::Draft),
            "open" => Ok(PatchStatus::Open),
            "archived" => Ok(PatchStatus::Archived),
            "merged" => Ok(PatchStatus::Merged),
            other => Err(format!(
                "patch status must be one of: draft, open, archived, merged (received '{other}')"
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchState {
    pub status: PatchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<Oid>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub author: Author,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub resolved: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub author: Author,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub timestamp: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Merge {
    pub author: Author,
    pub commit: Oid,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub revision: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub id: String,
    pub author: Author,
    #[serde(default)]
    pub description: String,
    pub base: Oid,
    pub oid: Oid,
    #[serde(default)]
    pub refs: Vec<String>,
    /// Unix seconds.
    pub timestamp: u64,
    #[serde(default)]
    pub discussions: Vec<Comment>,
    #[serde(default)]
    pub reviews: Vec<Review>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub id: PatchId,
    pub author: Author,
    pub title: String,
    pub state: PatchState,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub merges: Vec<Merge>,
    #[serde(default)]
    pub assignees: Vec<Author>,
    pub revisions: Vec<Revision>,
}

impl Patch {
    pub fn status(&self) -> PatchStatus {
        self.state.status
    }

    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }

    /// Revisions ordered by ascending timestamp. Equal timestamps keep
    /// their storage order.
    pub fn revisions_by_time(&self) -> Vec<&Revision> {
        let mut revisions = self.revisions.iter().collect::<Vec<_>>();
        revisions.sort_by_key(|revision| revision.timestamp);
        revisions
    }

    /// The oldest and newest revision. Both are the same revision when the
    /// patch has exactly one; `None` only for malformed patches without
    /// revisions.
    pub fn edge_revisions(&self) -> Option<(&Revision, &Revision)> {
        let revisions = self.revisions_by_time();
        let first = *revisions.first()?;
        let latest = *revisions.last()?;
        Some((first, latest))
    }

    pub fn first_revision(&self) -> Option<&Revision> {
        self.edge_revisions().map(|(first, _)| first)
    }

    pub fn latest_revision(&self) -> Option<&Revision> {
        self.edge_revisions().map(|(_, latest)| latest)
    }
}

/// A patch together with the moment the client last fetched it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AugmentedPatch {
    #[serde(flatten)]
    pub patch: Patch,
    pub last_fetched_ts: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffFile {
    pub oid: Oid,
    #[serde(default)]
    pub mode: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileChangeKind {
    Added,
    Deleted,
    Modified,
    Moved,
    Copied,
}

impl FileChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FileChangeKind::Added => "added",
            FileChangeKind::Deleted => "deleted",
            FileChangeKind::Modified => "modified",
            FileChangeKind::Moved => "moved",
            FileChangeKind::Copied => "copied",
        }
    }
}

impl fmt::Display for FileChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum FileChange {
    Added {
        path: String,
        new: DiffFile,
    },
    Deleted {
        path: String,
        old: DiffFile,
    },
    Modified {
        path: String,
        old: DiffFile,
        new: DiffFile,
    },
    #[serde(rename_all = "camelCase")]
    Moved { old_path: String, new_path: String },
    #[serde(rename_all = "camelCase")]
    Copied { old_path: String, new_path: String },
}

impl FileChange {
    pub fn kind(&self) -> FileChangeKind {
        match self {
            FileChange::Added { .. } => FileChangeKind::Added,
            FileChange::Deleted { .. } => FileChangeKind::Deleted,
            FileChange::Modified { .. } => FileChangeKind::Modified,
            FileChange::Moved { .. } => FileChangeKind::Moved,
            FileChange::Copied { .. } => FileChangeKind::Copied,
        }
    }

    /// The path the change resolves to after it is applied.
    pub fn path(&self) -> &str {
        match self {
            FileChange::Added { path, .. }
            | FileChange::Deleted { path, .. }
            | FileChange::Modified { path, .. } => path,
            FileChange::Moved { new_path, .. } | FileChange::Copied { new_path, .. } => new_path,
        }
    }

    pub fn old_path(&self) -> Option<&str> {
        match self {
            FileChange::Moved { old_path, .. } | FileChange::Copied { old_path, .. } => {
                Some(old_path)
            }
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffStats {
    #[serde(default)]
    pub files_changed: usize,
    #[serde(default)]
    pub insertions: usize,
    #[serde(default)]
    pub deletions: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    #[serde(default)]
    pub files: Vec<FileChange>,
    #[serde(default)]
    pub stats: DiffStats,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffBlob {
    #[serde(default)]
    pub binary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResponse {
    pub diff: Diff,
    /// Blob contents keyed by blob oid.
    #[serde(default)]
    pub files: BTreeMap<Oid, DiffBlob>,
}

impl DiffResponse {
    pub fn blob_content(&self, oid: &str) -> Option<&str> {
        self.files
            .get(oid)
            .filter(|blob| !blob.binary)
            .and_then(|blob| blob.content.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn revision(id: &str, timestamp: u64) -> Revision {
        Revision {
            id: id.to_string(),
            author: Author::default(),
            description: String::new(),
            base: format!("base-{id}"),
            oid: format!("oid-{id}"),
            refs: Vec::new(),
            timestamp,
            discussions: Vec::new(),
            reviews: Vec::new(),
        }
    }

    fn patch_with(revisions: Vec<Revision>) -> Patch {
        Patch {
            id: "ab12cd34ef".to_string(),
            author: Author::default(),
            title: "t".to_string(),
            state: PatchState {
                status: PatchStatus::Open,
                revision: None,
                commit: None,
            },
            target: "delegates".to_string(),
            labels: Vec::new(),
            merges: Vec::new(),
            assignees: Vec::new(),
            revisions,
        }
    }

    #[test]
    fn edge_revisions_ignore_storage_order() {
        let patch = patch_with(vec![
            revision("r100", 100),
            revision("r300", 300),
            revision("r200", 200),
        ]);
        let (first, latest) = patch.edge_revisions().expect("patch has revisions");
        assert_eq!(first.timestamp, 100);
        assert_eq!(latest.timestamp, 300);
    }

    #[test]
    fn edge_revisions_single_revision_is_both_edges() {
        let patch = patch_with(vec![revision("only", 42)]);
        let (first, latest) = patch.edge_revisions().expect("patch has revisions");
        assert_eq!(first.id, "only");
        assert_eq!(latest.id, "only");
    }

    #[test]
    fn patch_deserializes_node_shape() {
        let raw = json!({
            "id": "ab12cd34ef56",
            "author": { "id": "did:key:z6Mk", "alias": "alice" },
            "title": "Fix parser",
            "state": { "status": "merged", "revision": "r1", "commit": "c1" },
            "target": "delegates",
            "labels": ["bug"],
            "merges": [],
            "assignees": [],
            "revisions": [{
                "id": "r1",
                "author": { "id": "did:key:z6Mk" },
                "description": "first",
                "edits": [],
                "reactions": [],
                "base": "b1",
                "oid": "o1",
                "refs": ["refs/heads/patches/ab12cd34ef56"],
                "discussions": [],
                "timestamp": 1700000000,
                "reviews": []
            }]
        });

        let patch: Patch = serde_json::from_value(raw).expect("patch should decode");
        assert_eq!(patch.status(), PatchStatus::Merged);
        assert_eq!(patch.state.commit.as_deref(), Some("c1"));
        assert_eq!(patch.author.display_name(), "alice");
        assert_eq!(patch.short_id(), "ab12cd3");
        assert_eq!(patch.revisions[0].timestamp, 1_700_000_000);
    }

    #[test]
    fn file_change_tags_decode_every_kind() {
        let raw = json!([
            { "state": "added", "path": "a.rs", "new": { "oid": "n1", "mode": "blob" } },
            { "state": "deleted", "path": "b.rs", "old": { "oid": "o1", "mode": "blob" } },
            { "state": "modified", "path": "c.rs", "old": { "oid": "o2" }, "new": { "oid": "n2" } },
            { "state": "moved", "oldPath": "d.rs", "newPath": "e.rs" },
            { "state": "copied", "oldPath": "f.rs", "newPath": "g.rs" }
        ]);

        let changes: Vec<FileChange> = serde_json::from_value(raw).expect("changes should decode");
        let kinds = changes.iter().map(FileChange::kind).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                FileChangeKind::Added,
                FileChangeKind::Deleted,
                FileChangeKind::Modified,
                FileChangeKind::Moved,
                FileChangeKind::Copied,
            ]
        );
        assert_eq!(changes[3].path(), "e.rs");
        assert_eq!(changes[3].old_path(), Some("d.rs"));
    }

    #[test]
    fn patch_status_parses_case_insensitively() {
        assert_eq!("Merged".parse::<PatchStatus>(), Ok(PatchStatus::Merged));
        assert!("closed".parse::<PatchStatus>().is_err());
    }

    #[test]
    fn status_and_kind_honor_width_and_fill() {
        assert_eq!(format!("[{:<8}]", PatchStatus::Open), "[open    ]");
        assert_eq!(format!("[{:>8}]", FileChangeKind::Moved), "[   moved]");
        assert_eq!(PatchStatus::Archived.to_string(), "archived");
    }

    #[test]
    fn binary_blobs_have_no_content() {
        let mut response = DiffResponse::default();
        response.files.insert(
            "bin".to_string(),
            DiffBlob {
                binary: true,
                content: Some("ignored".to_string()),
            },
        );
        response.files.insert(
            "txt".to_string(),
            DiffBlob {
                binary: false,
                content: Some("hello".to_string()),
            },
        );
        assert_eq!(response.blob_content("bin"), None);
        assert_eq!(response.blob_content("txt"), Some("hello"));
        assert_eq!(response.blob_content("missing"), None);
    }
}
