//! File-change projection for patch revisions.
//!
//! [`DiffProjector`] fetches the diff of a patch's latest revision, writes
//! both sides of every changed file under a [`DiffWorkspace`] and returns
//! [`FileChangeNode`]s sorted directory-major. Write failures leave the
//! affected node without a diff command; they never fail the projection.

pub mod node;
pub mod projector;
pub mod workspace;

pub use node::{
    DiffCommand, FileChangeItem, FileChangeNode, MaterializedSides, ROOT_DIRECTORY_LABEL,
};
pub use projector::{DiffProjector, edge_revisions};
pub use workspace::{DiffWorkspace, SESSION_DIR_PREFIX};
