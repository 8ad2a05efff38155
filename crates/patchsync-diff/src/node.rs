use patchsync_connection::{FileChange, FileChangeKind, Oid, short_id};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Description shown for a repository-root file that needs its directory
/// displayed.
pub const ROOT_DIRECTORY_LABEL: &str = ".";

/// Opens an external two-way diff.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffCommand {
    pub left: PathBuf,
    pub right: PathBuf,
    pub title: String,
}

/// What a presentation layer needs to draw one changed file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileChangeItem {
    pub label: String,
    pub description: Option<String>,
    pub tooltip: String,
    /// `None` for moved/copied files and for files whose sides could not be
    /// written.
    pub command: Option<DiffCommand>,
}

/// Old and new file locations of a materialized change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaterializedSides {
    pub old: PathBuf,
    pub new: PathBuf,
}

#[derive(Debug)]
pub struct FileChangeNode {
    change: FileChange,
    base: Oid,
    head: Oid,
    sides: Option<MaterializedSides>,
    materialized: bool,
    show_directory: bool,
    item: OnceLock<FileChangeItem>,
}

impl FileChangeNode {
    pub(crate) fn new(
        change: FileChange,
        base: Oid,
        head: Oid,
        sides: Option<MaterializedSides>,
        materialized: bool,
    ) -> Self {
        Self {
            change,
            base,
            head,
            sides,
            materialized,
            show_directory: false,
            item: OnceLock::new(),
        }
    }

    pub fn change(&self) -> &FileChange {
        &self.change
    }

    pub fn kind(&self) -> FileChangeKind {
        self.change.kind()
    }

    /// Path after the change is applied.
    pub fn path(&self) -> &str {
        self.change.path()
    }

    /// Containing directory, `None` for files at the repository root.
    pub fn directory(&self) -> Option<&str> {
        self.path()
            .rsplit_once('/')
            .map(|(directory, _)| directory)
            .filter(|directory| !directory.is_empty())
    }

    pub fn filename(&self) -> &str {
        self.path()
            .rsplit_once('/')
            .map_or(self.path(), |(_, filename)| filename)
    }

    /// Set when another changed file shares this file's name.
    pub fn show_directory(&self) -> bool {
        self.show_directory
    }

    /// Whether both sides were written for a kind that has content.
    pub fn materialized(&self) -> bool {
        self.materialized
    }

    pub fn sides(&self) -> Option<&MaterializedSides> {
        self.sides.as_ref()
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn head(&self) -> &str {
        &self.head
    }

    /// Presentation item, computed on first access.
    pub fn item(&self) -> &FileChangeItem {
        self.item.get_or_init(|| self.build_item())
    }

    pub(crate) fn set_show_directory(&mut self, show: bool) {
        self.show_directory = show;
    }

    fn build_item(&self) -> FileChangeItem {
        let description = self.show_directory.then(|| {
            self.directory()
                .unwrap_or(ROOT_DIRECTORY_LABEL)
                .to_string()
        });

        let tooltip = match self.change.old_path() {
            Some(old_path) => format!(
                "{}: {old_path} -> {}",
                capitalized(self.kind()),
                self.path()
            ),
            None => format!("{}: {}", capitalized(self.kind()), self.path()),
        };

        let command = match (&self.sides, self.materialized) {
            (Some(sides), true) => Some(DiffCommand {
                left: sides.old.clone(),
                right: sides.new.clone(),
                title: format!(
                    "{} ({} <-> {})",
                    self.filename(),
                    short_id(&self.base),
                    short_id(&self.head)
                ),
            }),
            _ => None,
        };

        FileChangeItem {
            label: self.filename().to_string(),
            description,
            tooltip,
            command,
        }
    }
}

fn capitalized(kind: FileChangeKind) -> &'static str {
    match kind {
        FileChangeKind::Added => "Added",
        FileChangeKind::Deleted => "Deleted",
        FileChangeKind::Modified => "Modified",
        FileChangeKind::Moved => "Moved",
        FileChangeKind::Copied => "Copied",
    }
}

/// Orders nodes directory-major and flags the ones whose bare filename is
/// shared with another node. Runs over the whole set at once.
pub(crate) fn arrange(mut nodes: Vec<FileChangeNode>) -> Vec<FileChangeNode> {
    nodes.sort_by(|a, b| Path::new(a.path()).cmp(Path::new(b.path())));

    let mut counts = std::collections::HashMap::<String, usize>::new();
    for node in &nodes {
        *counts.entry(node.filename().to_string()).or_default() += 1;
    }
    for node in &mut nodes {
        let shared = counts.get(node.filename()).is_some_and(|count| *count > 1);
        node.set_show_directory(shared);
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchsync_connection::DiffFile;

    fn modified(path: &str) -> FileChangeNode {
        FileChangeNode::new(
            FileChange::Modified {
                path: path.to_string(),
                old: DiffFile {
                    oid: "o".to_string(),
                    mode: "blob".to_string(),
                },
                new: DiffFile {
                    oid: "n".to_string(),
                    mode: "blob".to_string(),
                },
            },
            "1111111aaaa".to_string(),
            "2222222bbbb".to_string(),
            Some(MaterializedSides {
                old: PathBuf::from(format!("/w/1111111/{path}")),
                new: PathBuf::from(format!("/w/2222222/{path}")),
            }),
            true,
        )
    }

    #[test]
    fn same_filename_in_two_directories_shows_both_directories() {
        let nodes = arrange(vec![modified("src/a.ts"), modified("lib/a.ts")]);
        assert!(nodes.iter().all(FileChangeNode::show_directory));
        assert_eq!(nodes[0].item().description.as_deref(), Some("lib"));
        assert_eq!(nodes[1].item().description.as_deref(), Some("src"));
    }

    #[test]
    fn root_file_sharing_a_filename_is_labelled_as_root() {
        let nodes = arrange(vec![modified("src/a.ts"), modified("a.ts")]);
        assert_eq!(nodes[0].path(), "a.ts");
        assert!(nodes.iter().all(FileChangeNode::show_directory));
        assert_eq!(
            nodes[0].item().description.as_deref(),
            Some(ROOT_DIRECTORY_LABEL)
        );
        assert_eq!(nodes[1].item().description.as_deref(), Some("src"));
    }

    #[test]
    fn unique_filename_hides_directory() {
        let nodes = arrange(vec![modified("src/a.ts")]);
        assert!(!nodes[0].show_directory());
        assert_eq!(nodes[0].item().description, None);
        assert_eq!(nodes[0].item().label, "a.ts");
    }

    #[test]
    fn ordering_is_directory_major() {
        let nodes = arrange(vec![
            modified("src/z.rs"),
            modified("README.md"),
            modified("src-gen/a.rs"),
            modified("src/a.rs"),
        ]);
        let paths = nodes.iter().map(FileChangeNode::path).collect::<Vec<_>>();
        assert_eq!(paths, vec!["README.md", "src/a.rs", "src/z.rs", "src-gen/a.rs"]);
    }

    #[test]
    fn item_is_built_lazily_and_once() {
        let node = modified("src/a.ts");
        assert!(node.item.get().is_none());
        let first = node.item() as *const FileChangeItem;
        assert!(node.item.get().is_some());
        assert_eq!(first, node.item() as *const FileChangeItem);
    }

    #[test]
    fn moved_file_tooltip_names_both_paths() {
        let node = FileChangeNode::new(
            FileChange::Moved {
                old_path: "old/name.rs".to_string(),
                new_path: "new/name.rs".to_string(),
            },
            "b".to_string(),
            "h".to_string(),
            None,
            false,
        );
        let item = node.item();
        assert_eq!(item.tooltip, "Moved: old/name.rs -> new/name.rs");
        assert_eq!(item.command, None);
        assert_eq!(node.directory(), Some("new"));
    }

    #[test]
    fn root_file_has_no_directory() {
        let node = modified("Cargo.toml");
        assert_eq!(node.directory(), None);
        assert_eq!(node.filename(), "Cargo.toml");
    }
}
