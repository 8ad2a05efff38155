use crate::binding::NativeBinding;
use crate::connection::{ConnectionError, ConnectionResult};
use crate::http::NodeHttpClient;
use crate::rad_cli::ProjectResolver;
use crate::types::{DiffResponse, Patch, PatchStatus, Project, Rid};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// In-memory node answering both the HTTP API and the native binding
/// surface. Requests are recorded so tests can assert on what an adapter
/// actually asked for.
#[derive(Clone, Debug, Default)]
pub struct MockNode {
    inner: Arc<Mutex<MockNodeState>>,
}

#[derive(Clone, Debug, Default)]
struct MockNodeState {
    node_id: Option<String>,
    current_project: Option<Rid>,
    projects: BTreeMap<Rid, Project>,
    patches: BTreeMap<Rid, Vec<Patch>>,
    diffs: BTreeMap<(Rid, String, String), DiffResponse>,
    failing: Vec<String>,
    unreachable: bool,
    requests: Vec<String>,
}

impl MockNode {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockNodeState> {
        self.inner.lock().expect("mock node mutex poisoned")
    }

    pub fn with_node_id(self, node_id: impl Into<String>) -> Self {
        self.state().node_id = Some(node_id.into());
        self
    }

    pub fn with_current_project(self, rid: impl Into<Rid>) -> Self {
        self.state().current_project = Some(rid.into());
        self
    }

    pub fn set_current_project(&self, rid: Option<Rid>) {
        self.state().current_project = rid;
    }

    pub fn insert_project(&self, project: Project) {
        self.state().projects.insert(project.id.clone(), project);
    }

    /// Inserts or replaces (by id) a patch of `rid`.
    pub fn upsert_patch(&self, rid: &str, patch: Patch) {
        let mut state = self.state();
        let patches = state.patches.entry(rid.to_string()).or_default();
        match patches.iter_mut().find(|existing| existing.id == patch.id) {
            Some(existing) => *existing = patch,
            None => patches.push(patch),
        }
    }

    pub fn remove_patch(&self, rid: &str, patch_id: &str) {
        if let Some(patches) = self.state().patches.get_mut(rid) {
            patches.retain(|patch| patch.id != patch_id);
        }
    }

    pub fn insert_diff(&self, rid: &str, base: &str, oid: &str, diff: DiffResponse) {
        self.state().diffs.insert(
            (rid.to_string(), base.to_string(), oid.to_string()),
            diff,
        );
    }

    /// Every later request whose path contains `fragment` fails with a
    /// transport error.
    pub fn fail_requests_containing(&self, fragment: impl Into<String>) {
        self.state().failing.push(fragment.into());
    }

    pub fn clear_failures(&self) {
        self.state().failing.clear();
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    pub fn requests(&self) -> Vec<String> {
        self.state().requests.clone()
    }

    pub fn request_count(&self, fragment: &str) -> usize {
        self.state()
            .requests
            .iter()
            .filter(|request| request.contains(fragment))
            .count()
    }

    fn begin(&self, request: String) -> ConnectionResult<()> {
        let mut state = self.state();
        if state.unreachable {
            return Err(ConnectionError::Transport(format!(
                "mock node unreachable: {request}"
            )));
        }
        let failing = state
            .failing
            .iter()
            .any(|fragment| request.contains(fragment.as_str()));
        state.requests.push(request.clone());
        if failing {
            return Err(ConnectionError::Transport(format!(
                "mock node injected failure: {request}"
            )));
        }
        Ok(())
    }

    fn lookup_project(&self, rid: &str) -> ConnectionResult<Project> {
        self.state()
            .projects
            .get(rid)
            .cloned()
            .ok_or_else(|| ConnectionError::NotFound {
                resource: "project",
                id: rid.to_string(),
            })
    }

    fn lookup_patches(&self, rid: &str, status: Option<PatchStatus>) -> Vec<Patch> {
        self.state()
            .patches
            .get(rid)
            .map(|patches| {
                patches
                    .iter()
                    .filter(|patch| status.is_none_or(|status| patch.status() == status))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn lookup_patch(&self, rid: &str, patch_id: &str) -> ConnectionResult<Patch> {
        self.state()
            .patches
            .get(rid)
            .and_then(|patches| patches.iter().find(|patch| patch.id == patch_id))
            .cloned()
            .ok_or_else(|| ConnectionError::NotFound {
                resource: "patch",
                id: patch_id.to_string(),
            })
    }

    fn lookup_diff(&self, rid: &str, base: &str, oid: &str) -> ConnectionResult<DiffResponse> {
        self.state()
            .diffs
            .get(&(rid.to_string(), base.to_string(), oid.to_string()))
            .cloned()
            .ok_or_else(|| ConnectionError::NotFound {
                resource: "diff",
                id: format!("{base}..{oid}"),
            })
    }

    fn route(&self, path: &str) -> ConnectionResult<Value> {
        let (route, query) = path.split_once('?').unwrap_or((path, ""));
        let segments = route
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>();

        match segments.as_slice() {
            [] => {
                let node_id = self.state().node_id.clone().unwrap_or_default();
                Ok(json!({ "message": "mock node", "nid": node_id }))
            }
            ["projects"] => {
                let projects = self.state().projects.values().cloned().collect::<Vec<_>>();
                to_value(&projects)
            }
            ["projects", rid] => to_value(&self.lookup_project(rid)?),
            ["projects", rid, "patches"] => {
                let status = query_param(query, "state")
                    .map(|raw| raw.parse::<PatchStatus>())
                    .transpose()
                    .map_err(ConnectionError::Transport)?;
                let per_page = query_param(query, "perPage")
                    .and_then(|raw| raw.parse::<usize>().ok())
                    .unwrap_or(usize::MAX);
                let mut patches = self.lookup_patches(rid, status);
                patches.truncate(per_page);
                to_value(&patches)
            }
            ["projects", rid, "patches", patch_id] => to_value(&self.lookup_patch(rid, patch_id)?),
            ["projects", rid, "diff", base, oid] => to_value(&self.lookup_diff(rid, base, oid)?),
            _ => Err(ConnectionError::NotFound {
                resource: "route",
                id: path.to_string(),
            }),
        }
    }
}

fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| *name == key)
        .map(|(_, value)| value)
}

fn to_value<T: Serialize>(value: &T) -> ConnectionResult<Value> {
    serde_json::to_value(value).map_err(|err| ConnectionError::Decode(err.to_string()))
}

#[async_trait]
impl NodeHttpClient for MockNode {
    async fn get_json(&self, path: &str) -> ConnectionResult<Value> {
        // Give concurrently issued requests a chance to overlap.
        tokio::task::yield_now().await;
        self.begin(format!("GET {path}"))?;
        self.route(path)
    }
}

#[async_trait]
impl ProjectResolver for MockNode {
    async fn rid_at(&self, path: &Path) -> ConnectionResult<Rid> {
        tokio::task::yield_now().await;
        self.begin(format!("rid_at {}", path.display()))?;
        self.state().current_project.clone().ok_or_else(|| {
            ConnectionError::Resolution(format!(
                "{} is not a Radicle repository",
                path.display()
            ))
        })
    }
}

impl NativeBinding for MockNode {
    fn node_id(&self) -> ConnectionResult<String> {
        self.begin("binding node_id".to_string())?;
        self.state()
            .node_id
            .clone()
            .ok_or_else(|| ConnectionError::Binding("Radicle profile not found".to_string()))
    }

    fn rid_at(&self, path: &Path) -> ConnectionResult<Rid> {
        self.begin(format!("binding rid_at {}", path.display()))?;
        self.state().current_project.clone().ok_or_else(|| {
            ConnectionError::Resolution(format!(
                "{} is not a Radicle repository",
                path.display()
            ))
        })
    }

    fn project(&self, rid: &str) -> ConnectionResult<Project> {
        self.begin(format!("binding project {rid}"))?;
        self.lookup_project(rid)
    }

    fn projects(&self) -> ConnectionResult<Vec<Project>> {
        self.begin("binding projects".to_string())?;
        Ok(self.state().projects.values().cloned().collect())
    }

    fn patches(&self, rid: &str) -> ConnectionResult<Vec<Patch>> {
        self.begin(format!("binding patches {rid}"))?;
        Ok(self.lookup_patches(rid, None))
    }

    fn patch(&self, rid: &str, patch_id: &str) -> ConnectionResult<Patch> {
        self.begin(format!("binding patch {rid} {patch_id}"))?;
        self.lookup_patch(rid, patch_id)
    }

    fn diff(&self, rid: &str, base: &str, oid: &str) -> ConnectionResult<DiffResponse> {
        self.begin(format!("binding diff {rid} {base} {oid}"))?;
        self.lookup_diff(rid, base, oid)
    }
}

/// Builders for fixture records.
pub mod fixtures {
    use crate::types::{
        Author, Patch, PatchCounts, PatchState, PatchStatus, Project, Revision, Visibility,
    };

    pub fn author(alias: &str) -> Author {
        Author {
            id: format!("did:key:z6Mk{alias}"),
            alias: Some(alias.to_string()),
        }
    }

    pub fn project(rid: &str, name: &str) -> Project {
        Project {
            id: rid.to_string(),
            name: name.to_string(),
            description: format!("{name} project"),
            default_branch: "master".to_string(),
            delegates: vec![author("alice")],
            threshold: 1,
            visibility: Visibility {
                kind: "public".to_string(),
            },
            head: "f".repeat(40),
            patches: PatchCounts::default(),
            issues: Default::default(),
            seeding: 1,
        }
    }

    pub fn revision(id: &str, base: &str, oid: &str, timestamp: u64) -> Revision {
        Revision {
            id: id.to_string(),
            author: author("alice"),
            description: format!("revision {id}"),
            base: base.to_string(),
            oid: oid.to_string(),
            refs: Vec::new(),
            timestamp,
            discussions: Vec::new(),
            reviews: Vec::new(),
        }
    }

    pub fn patch(id: &str, title: &str, status: PatchStatus, revisions: Vec<Revision>) -> Patch {
        Patch {
            id: id.to_string(),
            author: author("alice"),
            title: title.to_string(),
            state: PatchState {
                status,
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

    /// Patch with a single revision stamped at `timestamp`.
    pub fn simple_patch(id: &str, title: &str, status: PatchStatus, timestamp: u64) -> Patch {
        patch(
            id,
            title,
            status,
            vec![revision(
                &format!("{id}-r1"),
                &"b".repeat(40),
                &"c".repeat(40),
                timestamp,
            )],
        )
    }
}
