#![doc = r#"
Radicle node connection contracts and adapters.

Operation mapping:

| `Connection` method | Wire adapter (httpd) | Binding adapter |
| --- | --- | --- |
| `validate` | `GET /` | `NativeBinding::node_id` |
| `current_project_id` | `rad .` in the workspace (`ProjectResolver`) | `NativeBinding::rid_at` |
| `project` | `GET /projects/:rid` | `NativeBinding::project` |
| `projects` | `GET /projects?show=all` | `NativeBinding::projects` |
| `fetch_patch` | `GET /projects/:rid/patches/:id` | `NativeBinding::patch` |
| `fetch_all_patches` | 4x `GET /projects/:rid/patches?state=:status&perPage=500` | `NativeBinding::patches` |
| `fetch_diff` | `GET /projects/:rid/diff/:base/:oid` | `NativeBinding::diff` |

Implementation notes:
- `fetch_all_patches` returns one result per independent request: four for the wire adapter
  (draft, open, archived, merged, issued concurrently) and one for the binding adapter.
- Binding calls are synchronous and run on the blocking pool. With the `radicle` feature the
  selector falls back to `RadicleBinding`, which reads the local profile; it serves no diffs.
- `ConnectionSelector` picks a backend once from `ConnectionConfig` and keeps it for its lifetime.
"#]

pub mod binding;
pub mod config;
pub mod connection;
pub mod http;
pub mod rad_cli;
#[cfg(feature = "radicle")]
pub mod radicle_binding;
pub mod selector;
pub mod testing;
pub mod types;

pub use binding::{BindingConnection, NativeBinding};
pub use config::{
    ConnectionConfig, HTTPD_URL_ENV, NATIVE_BINDING_ENV, RAD_HOME_ENV, RAD_PATH_ENV,
    WORKSPACE_ENV, parse_flag,
};
pub use connection::{
    BackendKind, Connection, ConnectionError, ConnectionResult, ValidateOptions,
};
pub use http::{
    DEFAULT_HTTPD_BASE_URL, HttpConnection, NodeHttpClient, PATCHES_PER_PAGE, ReqwestNodeClient,
};
pub use rad_cli::{DEFAULT_RAD_PROGRAM, ProjectResolver, RadCli, parse_rid};
#[cfg(feature = "radicle")]
pub use radicle_binding::{PROFILE_SETUP_HINT, RadicleBinding};
pub use selector::ConnectionSelector;
pub use testing::MockNode;
pub use types::{
    AugmentedPatch, Author, Comment, Diff, DiffBlob, DiffFile, DiffResponse, DiffStats,
    FileChange, FileChangeKind, IssueCounts, Merge, Oid, Patch, PatchCounts, PatchId, PatchState,
    PatchStatus, Project, Review, Revision, Rid, SHORT_ID_LEN, Visibility, short_id,
};
