//! Versioning Engine (§4.2).
//!
//! Produces a new HEAD from a prior HEAD plus a mutation request, enforcing
//! the version-chain invariants of §3. Every public function here owns its
//! own lock acquisition and HEAD re-read, per §5 "Serialisation of
//! versioning": take the lock, *then* read, so the read observes the latest
//! committed state for that logical identity.

use std::sync::Arc;

use chrono::Utc;
use diesel_async::pooled_connection::deadpool::Pool;
use diesel_async::AsyncPgConnection;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;

use tracing::warn;

use chronograph_core::canon::content_hash;
use chronograph_core::diff::change_summary;
use chronograph_core::ids::{AnyId, BranchId, EntityId, ProjectId, VersionId};
use chronograph_core::model::{merge_labels, Object, Relationship};
use chronograph_core::traits::{Embedder, InverseTypeProvider};
use chronograph_core::triplet::build_triplet_text;
use chronograph_core::ChronographError;

use crate::gateway;
use crate::locks;
use crate::pg_error::from_pool;

/// Whether an operation produced a fresh version or determined the request
/// was a no-op (§4.2 "Patch semantics" / "Upsert").
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Unchanged(T),
    Created(T),
}

impl<T> Outcome<T> {
    pub fn into_inner(self) -> T {
        match self {
            Outcome::Unchanged(v) | Outcome::Created(v) => v,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Outcome::Created(_))
    }
}

/// Request to create a brand new entity (no prior HEAD).
#[derive(Debug, Clone, Default)]
pub struct CreateObjectRequest {
    pub object_type: String,
    pub key: Option<String>,
    pub status: Option<String>,
    pub properties: Map<String, Value>,
    pub labels: Vec<String>,
    pub embedding: Option<Vec<f32>>,
    pub actor_id: Option<String>,
    pub actor_type: Option<String>,
}

fn first_version(
    project_id: ProjectId,
    branch_id: Option<BranchId>,
    req: &CreateObjectRequest,
) -> Object {
    let id = VersionId::new();
    let now = Utc::now().naive_utc();
    Object {
        version_id: id,
        entity_id: EntityId(id.0),
        supersedes_id: None,
        version: 1,
        project_id,
        branch_id,
        object_type: req.object_type.clone(),
        key: req.key.clone(),
        status: req.status.clone(),
        properties: req.properties.clone(),
        labels: {
            let mut l = req.labels.clone();
            l.sort();
            l.dedup();
            l
        },
        deleted_at: None,
        content_hash: content_hash(Some(&req.properties)),
        embedding: req.embedding.clone(),
        created_at: now,
        updated_at: now,
        last_accessed_at: None,
        actor_id: req.actor_id.clone(),
        actor_type: req.actor_type.clone(),
        change_summary: None,
    }
}

/// `create(object)` entry point used when the caller already knows no prior
/// version exists (e.g. object creation without a `key`, where there is no
/// identity to collide on).
pub async fn create_object(
    conn: &mut AsyncPgConnection,
    project_id: ProjectId,
    branch_id: Option<BranchId>,
    req: &CreateObjectRequest,
) -> Result<Object, ChronographError> {
    if req.object_type.trim().is_empty() {
        return Err(ChronographError::bad_request("object type must not be empty"));
    }
    let object = first_version(project_id, branch_id, req);
    locks::acquire_object_lock(conn, object.entity_id).await?;
    gateway::create_object(conn, &object).await
}

/// Overlay merge for `properties` (§4.2 "Patch semantics"): a `null` value
/// in the overlay deletes the key, anything else replaces it.
pub fn apply_properties_overlay(current: &Map<String, Value>, overlay: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = current.clone();
    for (key, value) in overlay {
        if value.is_null() {
            merged.remove(key);
        } else {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

#[derive(Debug, Clone, Default)]
pub struct PatchRequest {
    pub properties_overlay: Map<String, Value>,
    pub status: Option<String>,
    pub labels_overlay: Option<Vec<String>>,
    pub replace_labels: bool,
    pub actor_id: Option<String>,
    pub actor_type: Option<String>,
}

fn build_next_version(prev: &Object, merged_properties: Map<String, Value>, merged_status: Option<String>, merged_labels: Vec<String>, actor_id: Option<String>, actor_type: Option<String>, deleted_at: Option<chrono::NaiveDateTime>) -> Object {
    let id = VersionId::new();
    let now = Utc::now().naive_utc();
    let summary = change_summary(Some(&prev.properties), Some(&merged_properties));
    Object {
        version_id: id,
        entity_id: prev.entity_id,
        supersedes_id: None,
        version: prev.version + 1,
        project_id: prev.project_id,
        branch_id: prev.branch_id,
        object_type: prev.object_type.clone(),
        key: prev.key.clone(),
        status: merged_status,
        content_hash: content_hash(Some(&merged_properties)),
        properties: merged_properties,
        labels: merged_labels,
        deleted_at,
        embedding: prev.embedding.clone(),
        created_at: now,
        updated_at: now,
        last_accessed_at: None,
        actor_id,
        actor_type,
        change_summary: summary,
    }
}

/// Applies a patch to the current HEAD of `entity_id`. No-op when merged
/// properties, status, and label set are all equal to the prior HEAD's
/// (testable property 6, "Patch idempotence").
pub async fn patch_object(
    conn: &mut AsyncPgConnection,
    project_id: ProjectId,
    branch_id: Option<BranchId>,
    entity_id: EntityId,
    req: &PatchRequest,
) -> Result<Outcome<Object>, ChronographError> {
    locks::acquire_object_lock(conn, entity_id).await?;
    let prev = gateway::get_head_by_entity(conn, project_id, entity_id, branch_id).await?;
    if prev.is_tombstone() {
        return Err(ChronographError::bad_request("cannot patch a tombstoned object"));
    }

    let merged_properties = apply_properties_overlay(&prev.properties, &req.properties_overlay);
    let merged_status = req.status.clone().or_else(|| prev.status.clone());
    let merged_labels = match &req.labels_overlay {
        Some(overlay) => merge_labels(&prev.labels, overlay, req.replace_labels),
        None => prev.labels.clone(),
    };

    let unchanged = chronograph_core::canon::canonical_eq(
        &Value::Object(merged_properties.clone()),
        &Value::Object(prev.properties.clone()),
    ) && merged_status == prev.status
        && merged_labels == prev.labels;

    if unchanged {
        return Ok(Outcome::Unchanged(prev));
    }

    let next = build_next_version(
        &prev,
        merged_properties,
        merged_status,
        merged_labels,
        req.actor_id.clone(),
        req.actor_type.clone(),
        None,
    );
    let written = gateway::create_version(conn, &prev, &next).await?;
    Ok(Outcome::Created(written))
}

/// `soft_delete` (§4.1, invariant 8): tombstone preserving type/key/
/// properties/labels, with `deleted_at` set. Errors (invariant 5,
/// "Soft-delete idempotence") if the current HEAD is already a tombstone.
pub async fn soft_delete_object(
    conn: &mut AsyncPgConnection,
    project_id: ProjectId,
    branch_id: Option<BranchId>,
    entity_id: EntityId,
) -> Result<Object, ChronographError> {
    locks::acquire_object_lock(conn, entity_id).await?;
    let prev = gateway::get_head_by_entity(conn, project_id, entity_id, branch_id).await?;
    if prev.is_tombstone() {
        return Err(ChronographError::bad_request("object is already deleted"));
    }
    let next = build_next_version(
        &prev,
        prev.properties.clone(),
        prev.status.clone(),
        prev.labels.clone(),
        None,
        None,
        Some(Utc::now().naive_utc()),
    );
    gateway::create_version(conn, &prev, &next).await
}

/// `restore` (§4.1): errors if the current HEAD is not a tombstone.
pub async fn restore_object(
    conn: &mut AsyncPgConnection,
    project_id: ProjectId,
    branch_id: Option<BranchId>,
    entity_id: EntityId,
) -> Result<Object, ChronographError> {
    locks::acquire_object_lock(conn, entity_id).await?;
    let prev = gateway::get_head_by_entity(conn, project_id, entity_id, branch_id).await?;
    if !prev.is_tombstone() {
        return Err(ChronographError::bad_request("cannot restore an object that is not deleted"));
    }
    let next = build_next_version(
        &prev,
        prev.properties.clone(),
        prev.status.clone(),
        prev.labels.clone(),
        None,
        None,
        None,
    );
    gateway::create_version(conn, &prev, &next).await
}

/// `upsert` (§4.2 "Upsert (create-or-update)"). Requires `key`.
pub async fn upsert_object(
    conn: &mut AsyncPgConnection,
    project_id: ProjectId,
    branch_id: Option<BranchId>,
    object_type: &str,
    key: &str,
    properties: &Map<String, Value>,
    status: Option<String>,
    labels: &[String],
    actor_id: Option<String>,
    actor_type: Option<String>,
) -> Result<Outcome<Object>, ChronographError> {
    locks::acquire_upsert_lock(conn, project_id, object_type, key).await?;
    match gateway::find_head_by_type_key(conn, project_id, branch_id, object_type, key).await? {
        None => {
            let req = CreateObjectRequest {
                object_type: object_type.to_string(),
                key: Some(key.to_string()),
                status,
                properties: properties.clone(),
                labels: labels.to_vec(),
                embedding: None,
                actor_id,
                actor_type,
            };
            let created = first_version(project_id, branch_id, &req);
            let written = gateway::create_object(conn, &created).await?;
            Ok(Outcome::Created(written))
        }
        Some(prev) if prev.is_tombstone() => {
            // "restore with new content": write a new version with
            // deleted_at = NULL and a change summary against the old
            // properties.
            let mut merged_labels = labels.to_vec();
            merged_labels.sort();
            merged_labels.dedup();
            let next = build_next_version(
                &prev,
                properties.clone(),
                status.or_else(|| prev.status.clone()),
                merged_labels,
                actor_id,
                actor_type,
                None,
            );
            let written = gateway::create_version(conn, &prev, &next).await?;
            Ok(Outcome::Created(written))
        }
        Some(prev) => {
            let merged_labels = {
                let mut l = labels.to_vec();
                l.sort();
                l.dedup();
                l
            };
            let merged_status = status.or_else(|| prev.status.clone());
            let unchanged = chronograph_core::canon::canonical_eq(
                &Value::Object(properties.clone()),
                &Value::Object(prev.properties.clone()),
            ) && merged_status == prev.status
                && merged_labels == prev.labels;

            if unchanged {
                return Ok(Outcome::Unchanged(prev));
            }
            let next = build_next_version(
                &prev,
                properties.clone(),
                merged_status,
                merged_labels,
                actor_id,
                actor_type,
                None,
            );
            let written = gateway::create_version(conn, &prev, &next).await?;
            Ok(Outcome::Created(written))
        }
    }
}

/// Result of creating a relationship: the forward edge and, when an inverse
/// type is declared, the inverse edge that was created, kept, or restored
/// (§4.2 "Relationship versioning").
#[derive(Debug, Clone)]
pub struct EdgeCreation {
    pub forward: Relationship,
    pub inverse: Option<Relationship>,
}

fn new_relationship_version(
    project_id: ProjectId,
    branch_id: Option<BranchId>,
    relationship_type: &str,
    src_entity_id: EntityId,
    dst_entity_id: EntityId,
    weight: Option<f64>,
    properties: Option<Map<String, Value>>,
    embedding: Option<Vec<f32>>,
) -> Relationship {
    let id = VersionId::new();
    let now = Utc::now().naive_utc();
    Relationship {
        version_id: id,
        entity_id: EntityId(id.0),
        supersedes_id: None,
        version: 1,
        project_id,
        branch_id,
        relationship_type: relationship_type.to_string(),
        src_entity_id,
        dst_entity_id,
        weight,
        content_hash: content_hash(properties.as_ref()),
        properties,
        embedding,
        deleted_at: None,
        created_at: now,
        updated_at: now,
    }
}

fn name_property(object: &Object) -> Option<String> {
    match object.properties.get("name") {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

/// Fires a detached, best-effort triplet embedding (§11 "Triplet text
/// generation"): builds `"{src_name} {humanised_type} {dst_name}"`, hands it
/// to the injected `Embedder`, and patches the stored row once the embedder
/// responds. Runs with its own pooled connection so request cancellation
/// doesn't cancel it (§5 "Background work"); failures are logged at `warn`
/// and never surfaced to the caller that created the relationship.
fn spawn_triplet_embedding(
    pool: Arc<Pool<AsyncPgConnection>>,
    embedder: Arc<dyn Embedder>,
    version_id: VersionId,
    src_name: String,
    relationship_type: String,
    dst_name: String,
) {
    tokio::spawn(async move {
        let text = build_triplet_text(&src_name, &relationship_type, &dst_name);
        let embedding = match embedder.embed(&text).await {
            Ok(embedding) => embedding,
            Err(err) => {
                warn!(error = %err, %version_id, "triplet embedding: embedder call failed");
                return;
            }
        };
        let mut conn = match pool.get().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!(error = %err, %version_id, "triplet embedding: failed to acquire connection");
                return;
            }
        };
        if let Err(err) = gateway::set_relationship_embedding(&mut conn, version_id, embedding).await {
            warn!(error = %err, %version_id, "triplet embedding: failed to store embedding");
        }
    });
}

/// Creates a relationship between two objects (which may be named by either
/// id kind). When `inverse_types` declares an inverse for `relationship_type`,
/// also creates/keeps/restores the inverse edge within the same caller
/// transaction. When neither caller nor the (out-of-scope) request supplied
/// an `embedding` and both endpoints carry a `name` property, a triplet
/// embedding is enqueued in the background (§11).
#[allow(clippy::too_many_arguments)]
pub async fn create_relationship(
    conn: &mut AsyncPgConnection,
    pool: Arc<Pool<AsyncPgConnection>>,
    project_id: ProjectId,
    branch_id: Option<BranchId>,
    relationship_type: &str,
    src: AnyId,
    dst: AnyId,
    weight: Option<f64>,
    properties: Option<Map<String, Value>>,
    embedding: Option<Vec<f32>>,
    inverse_types: &dyn InverseTypeProvider,
    embedder: Arc<dyn Embedder>,
) -> Result<EdgeCreation, ChronographError> {
    if relationship_type.trim().is_empty() {
        return Err(ChronographError::bad_request("relationship type must not be empty"));
    }
    let (src_obj, dst_obj) = gateway::validate_endpoints(conn, project_id, src, dst).await?;

    locks::acquire_edge_lock(conn, project_id, relationship_type, src_obj.entity_id, dst_obj.entity_id).await?;
    let forward = new_relationship_version(
        project_id,
        branch_id,
        relationship_type,
        src_obj.entity_id,
        dst_obj.entity_id,
        weight,
        properties,
        embedding,
    );
    let forward = gateway::create_relationship(conn, &forward).await?;

    if forward.embedding.is_none() {
        if let (Some(src_name), Some(dst_name)) = (name_property(&src_obj), name_property(&dst_obj)) {
            spawn_triplet_embedding(
                Arc::clone(&pool),
                Arc::clone(&embedder),
                forward.version_id,
                src_name,
                relationship_type.to_string(),
                dst_name,
            );
        }
    }

    let inverse = match inverse_types.inverse_of(relationship_type) {
        None => None,
        Some(inverse_type) => {
            let inverse_of_inverse = inverse_types.inverse_of(&inverse_type);
            let is_mutual = inverse_of_inverse.as_deref() == Some(relationship_type);
            // (a) no self-inverse loop: when B's inverse is A, only create
            // the inverse when A < B lexicographically.
            if is_mutual && relationship_type >= inverse_type.as_str() {
                None
            } else {
                locks::acquire_edge_lock(conn, project_id, &inverse_type, dst_obj.entity_id, src_obj.entity_id).await?;
                match gateway::find_head_relationship(conn, project_id, &inverse_type, dst_obj.entity_id, src_obj.entity_id).await? {
                    Some(existing) if existing.deleted_at.is_none() => Some(existing),
                    Some(tombstoned) => {
                        let now = Utc::now().naive_utc();
                        let restored = Relationship {
                            deleted_at: None,
                            version: tombstoned.version + 1,
                            version_id: VersionId::new(),
                            supersedes_id: None,
                            created_at: now,
                            updated_at: now,
                            ..tombstoned.clone()
                        };
                        Some(gateway::create_relationship_version(conn, &tombstoned, &restored).await?)
                    }
                    None => {
                        let fresh = new_relationship_version(
                            project_id,
                            branch_id,
                            &inverse_type,
                            dst_obj.entity_id,
                            src_obj.entity_id,
                            None,
                            None,
                            None,
                        );
                        Some(gateway::create_relationship(conn, &fresh).await?)
                    }
                }
            }
        }
    };

    Ok(EdgeCreation { forward, inverse })
}

/// Bulk object creation (§5 "Bulk writes"): a bounded worker pool (<=20
/// concurrent tasks) processes items independently; an individual failure
/// does not roll back other successes, since each item is its own
/// transaction against its own pooled connection.
pub async fn bulk_create_objects(
    pool: Arc<Pool<AsyncPgConnection>>,
    project_id: ProjectId,
    branch_id: Option<BranchId>,
    items: Vec<CreateObjectRequest>,
) -> Vec<Result<Object, ChronographError>> {
    const MAX_WORKERS: usize = 20;
    let semaphore = Arc::new(Semaphore::new(MAX_WORKERS));
    let mut handles = Vec::with_capacity(items.len());

    for req in items {
        let pool = Arc::clone(&pool);
        let semaphore = Arc::clone(&semaphore);
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await.expect("semaphore not closed");
            let mut conn = pool.get().await.map_err(from_pool)?;
            create_object(&mut conn, project_id, branch_id, &req).await
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(match handle.await {
            Ok(result) => result,
            Err(join_err) => Err(ChronographError::database(anyhow::anyhow!(
                "bulk create worker panicked: {join_err}"
            ))),
        });
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn overlay_null_deletes_key() {
        let current = json!({"a": 1, "b": 2}).as_object().unwrap().clone();
        let overlay = json!({"a": null, "c": 3}).as_object().unwrap().clone();
        let merged = apply_properties_overlay(&current, &overlay);
        assert_eq!(merged, json!({"b": 2, "c": 3}).as_object().unwrap().clone());
    }

    #[test]
    fn overlay_replaces_existing_key() {
        let current = json!({"a": 1}).as_object().unwrap().clone();
        let overlay = json!({"a": 2}).as_object().unwrap().clone();
        let merged = apply_properties_overlay(&current, &overlay);
        assert_eq!(merged.get("a"), Some(&json!(2)));
    }
}
