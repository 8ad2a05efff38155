//! [`NativeBinding`] backed by the local Radicle profile and storage through
//! the `radicle` crate. Built with the `radicle` feature.
//!
//! Records are rendered into the same JSON shapes the node's HTTP API
//! returns and decoded into this crate's types, so both adapters hand out
//! identical values.

use crate::binding::NativeBinding;
use crate::connection::{ConnectionError, ConnectionResult};
use crate::types::{DiffResponse, Patch, Project, Rid};
use radicle::Profile;
use radicle::cob::{ActorId, Author};
use radicle::identity::{DocAt, RepoId};
use radicle::issue::cache::Issues;
use radicle::node::routing::Store;
use radicle::node::{Alias, AliasStore, Handle};
use radicle::patch::PatchId;
use radicle::patch::cache::Patches;
use radicle::storage::git::Repository;
use radicle::storage::{ReadRepository, ReadStorage, RemoteRepository};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

pub const PROFILE_SETUP_HINT: &str = "To setup your radicle profile, run `rad auth`.";

/// Reads the profile found through `RAD_HOME` (or the default home) on
/// every call, so a profile created after startup is picked up.
#[derive(Clone, Copy, Debug, Default)]
pub struct RadicleBinding;

impl RadicleBinding {
    pub fn new() -> Self {
        Self
    }
}

impl NativeBinding for RadicleBinding {
    fn node_id(&self) -> ConnectionResult<String> {
        let profile = load_profile()?;
        radicle::Node::new(profile.socket())
            .nid()
            .map(|nid| nid.to_string())
            .map_err(failed("node id"))
    }

    fn rid_at(&self, path: &Path) -> ConnectionResult<Rid> {
        radicle::rad::at(path)
            .map(|(_, rid)| rid.to_string())
            .map_err(|error| {
                ConnectionError::Resolution(format!(
                    "{} is not a Radicle repository: {error}",
                    path.display()
                ))
            })
    }

    fn project(&self, rid: &str) -> ConnectionResult<Project> {
        let profile = load_profile()?;
        let repo = repository(&profile, rid)?;
        decode(project_info(&profile, &repo)?)
    }

    fn projects(&self) -> ConnectionResult<Vec<Project>> {
        let profile = load_profile()?;
        let policies = profile.policies().map_err(failed("seeding policies"))?;
        let mut repositories = profile
            .storage
            .repositories()
            .map_err(failed("repository listing"))?
            .into_iter()
            .filter(|info| info.doc.visibility.is_public())
            .collect::<Vec<_>>();
        repositories.sort_by_key(|info| info.rid);

        let projects = repositories
            .into_iter()
            .filter(|info| policies.is_seeding(&info.rid).unwrap_or_default())
            .filter_map(|info| {
                let rid = info.rid.to_string();
                profile
                    .storage
                    .repository(info.rid)
                    .map_err(failed("repository"))
                    .and_then(|repo| project_info(&profile, &repo))
                    .and_then(decode::<Project>)
                    .inspect_err(|error| {
                        tracing::debug!(rid = %rid, %error, "skipping unreadable project");
                    })
                    .ok()
            })
            .collect();
        Ok(projects)
    }

    fn patches(&self, rid: &str) -> ConnectionResult<Vec<Patch>> {
        let profile = load_profile()?;
        let aliases = profile.aliases();
        let repo = repository(&profile, rid)?;
        let cache = profile.patches(&repo).map_err(failed("patch cache"))?;

        let mut patches = cache
            .list()
            .map_err(failed("patch listing"))?
            .filter_map(|result| {
                result
                    .inspect_err(|error| {
                        tracing::warn!(rid, %error, "skipping patch that failed to load");
                    })
                    .ok()
            })
            .collect::<Vec<_>>();
        patches.sort_by(|(_, a), (_, b)| b.timestamp().cmp(&a.timestamp()));

        patches
            .iter()
            .map(|(id, patch)| decode(patch_json(*id, patch, &repo, &aliases)))
            .collect()
    }

    fn patch(&self, rid: &str, patch_id: &str) -> ConnectionResult<Patch> {
        let not_found = || ConnectionError::NotFound {
            resource: "patch",
            id: patch_id.to_string(),
        };
        let id = PatchId::from_str(patch_id).map_err(|_| not_found())?;
        let profile = load_profile()?;
        let aliases = profile.aliases();
        let repo = repository(&profile, rid)?;
        let patch = profile
            .patches(&repo)
            .map_err(failed("patch cache"))?
            .get(&id)
            .map_err(failed("patch"))?
            .ok_or_else(not_found)?;
        decode(patch_json(id, &patch, &repo, &aliases))
    }

    fn diff(&self, _rid: &str, _base: &str, _oid: &str) -> ConnectionResult<DiffResponse> {
        Err(ConnectionError::Unsupported(
            "diffs are only served by the node's HTTP API".to_string(),
        ))
    }
}

fn load_profile() -> ConnectionResult<Profile> {
    match Profile::load() {
        Ok(profile) => Ok(profile),
        Err(radicle::profile::Error::NotFound(path)) => Err(ConnectionError::Binding(format!(
            "Radicle profile not found in '{}'. {PROFILE_SETUP_HINT}",
            path.display()
        ))),
        Err(error) => Err(ConnectionError::Binding(format!(
            "could not load radicle profile: {error}"
        ))),
    }
}

fn failed<E: Display>(what: &'static str) -> impl FnOnce(E) -> ConnectionError {
    move |error| ConnectionError::Binding(format!("{what} failed: {error}"))
}

fn repository(profile: &Profile, rid: &str) -> ConnectionResult<Repository> {
    let id = RepoId::from_urn(rid).map_err(|error| {
        ConnectionError::Binding(format!("invalid repository id '{rid}': {error}"))
    })?;
    profile.storage.repository(id).map_err(|error| {
        tracing::debug!(rid, %error, "repository not in local storage");
        ConnectionError::NotFound {
            resource: "project",
            id: rid.to_string(),
        }
    })
}

fn decode<T: DeserializeOwned>(value: Value) -> ConnectionResult<T> {
    serde_json::from_value(value)
        .map_err(|error| ConnectionError::Decode(format!("unexpected radicle record: {error}")))
}

/// Project payload merged with identity, head and counters.
fn project_info(profile: &Profile, repo: &Repository) -> ConnectionResult<Value> {
    let aliases = profile.aliases();
    let DocAt { doc, .. } = repo.identity_doc().map_err(failed("identity document"))?;
    let (_, head) = repo.head().map_err(failed("repository head"))?;
    let id = repo.id();

    let payload = doc.project().map_err(failed("project payload"))?;
    let delegates = doc
        .delegates
        .iter()
        .map(|did| author_json(&Author::new(*did), aliases.alias(did.as_key())))
        .collect::<Vec<_>>();
    let issues = profile
        .issues(repo)
        .map_err(failed("issue cache"))?
        .counts()
        .map_err(failed("issue counts"))?;
    let patches = profile
        .patches(repo)
        .map_err(failed("patch cache"))?
        .counts()
        .map_err(failed("patch counts"))?;
    let seeding = profile
        .database()
        .ok()
        .and_then(|db| db.count(&id).ok())
        .unwrap_or_default();

    let mut info = serde_json::to_value(&payload).map_err(failed("project payload"))?;
    let extra = json!({
        "id": id,
        "delegates": delegates,
        "threshold": doc.threshold,
        "visibility": doc.visibility,
        "head": head,
        "patches": patches,
        "issues": issues,
        "seeding": seeding,
    });
    merge_objects(&mut info, extra);
    Ok(info)
}

fn merge_objects(target: &mut Value, extra: Value) {
    if let (Value::Object(target), Value::Object(extra)) = (target, extra) {
        target.extend(extra);
    }
}

fn author_json(author: &Author, alias: Option<Alias>) -> Value {
    match alias {
        Some(alias) => json!({ "id": author.id, "alias": alias }),
        None => json!({ "id": author.id }),
    }
}

fn patch_json(
    id: PatchId,
    patch: &radicle::patch::Patch,
    repo: &Repository,
    aliases: &impl AliasStore,
) -> Value {
    json!({
        "id": id.to_string(),
        "author": author_json(patch.author(), aliases.alias(patch.author().id())),
        "title": patch.title(),
        "state": patch.state(),
        "target": patch.target(),
        "labels": patch.labels().collect::<Vec<_>>(),
        "merges": patch.merges().map(|(nid, merge)| json!({
            "author": author_json(&Author::from(*nid), aliases.alias(nid)),
            "commit": merge.commit,
            "timestamp": merge.timestamp.as_secs(),
            "revision": merge.revision,
        })).collect::<Vec<_>>(),
        "assignees": patch.assignees().map(|assignee| {
            author_json(&Author::from(*assignee), aliases.alias(&assignee))
        }).collect::<Vec<_>>(),
        "revisions": patch.revisions().map(|(revision_id, revision)| json!({
            "id": revision_id,
            "author": author_json(revision.author(), aliases.alias(revision.author().id())),
            "description": revision.description(),
            "base": revision.base(),
            "oid": revision.head(),
            "refs": refs_at(repo, patch.author().id(), &revision.head()),
            "discussions": revision.discussion().comments().map(|(comment_id, comment)| json!({
                "id": *comment_id,
                "author": author_json(&Author::from(comment.author()), aliases.alias(&comment.author())),
                "body": comment.body(),
                "timestamp": comment.timestamp().as_secs(),
                "replyTo": comment.reply_to(),
                "resolved": comment.is_resolved(),
            })).collect::<Vec<_>>(),
            "timestamp": revision.timestamp().as_secs(),
            "reviews": patch.reviews_of(revision_id).map(|(review_id, review)| json!({
                "id": review_id,
                "author": author_json(review.author(), aliases.alias(review.author().id())),
                "verdict": review.verdict(),
                "summary": review.summary(),
                "timestamp": review.timestamp().as_secs(),
            })).collect::<Vec<_>>(),
        })).collect::<Vec<_>>(),
    })
}

/// Refs of `author`'s remote that point at `head`.
fn refs_at(repo: &Repository, author: &ActorId, head: &radicle::git::Oid) -> Vec<String> {
    repo.remote(author)
        .map(|remote| {
            remote
                .refs
                .iter()
                .filter(|(_, oid)| *oid == head)
                .map(|(name, _)| name.to_string())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_objects_adds_identity_fields_to_payload() {
        let mut info = json!({ "name": "heartwood", "description": "", "defaultBranch": "main" });
        merge_objects(
            &mut info,
            json!({ "id": "rad:z3gqcJUoA1n9HaHKufZs5FCSGazv5", "seeding": 3 }),
        );

        let project: Project = decode(info).expect("merged info should decode");
        assert_eq!(project.id, "rad:z3gqcJUoA1n9HaHKufZs5FCSGazv5");
        assert_eq!(project.default_branch, "main");
        assert_eq!(project.seeding, 3);
    }

    #[test]
    fn rid_at_outside_a_repository_is_resolution_error() {
        let tmp = tempfile::tempdir().expect("tempdir should be created");
        let error = RadicleBinding::new()
            .rid_at(tmp.path())
            .expect_err("plain directory should not resolve");
        assert!(matches!(error, ConnectionError::Resolution(_)));
    }

    #[test]
    fn malformed_patch_id_is_not_found() {
        let error = RadicleBinding::new()
            .patch("rad:z3gqcJUoA1n9HaHKufZs5FCSGazv5", "not-hex")
            .expect_err("malformed id should not load");
        assert!(matches!(
            error,
            ConnectionError::NotFound {
                resource: "patch",
                ..
            }
        ));
    }

    #[test]
    fn diff_is_unsupported() {
        let error = RadicleBinding::new()
            .diff("rad:z3gqcJUoA1n9HaHKufZs5FCSGazv5", "a", "b")
            .expect_err("binding has no diff");
        assert!(matches!(error, ConnectionError::Unsupported(_)));
    }
}
