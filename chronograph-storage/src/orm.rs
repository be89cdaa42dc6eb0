//! Queryable/Insertable row types and their conversions to/from the domain
//! model in `chronograph_core::model`. Dynamic property maps are kept
//! opaque (`serde_json::Value`) at this layer, per §9 "Dynamic property
//! maps": typed accessors live on `chronograph_core::model::Object`.

use chrono::NaiveDateTime;
use chronograph_core::canon::ContentHash;
use chronograph_core::ids::{BranchId, EntityId, ProjectId, VersionId};
use chronograph_core::model::{Branch, BranchLineageRow, Object, Relationship};
use diesel::prelude::*;
use pgvector::Vector;
use uuid::Uuid;

use crate::schema::{branch_lineage, branches, objects, relationships};

fn to_content_hash(bytes: Vec<u8>) -> ContentHash {
    let mut out = [0u8; 32];
    let n = bytes.len().min(32);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = objects)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrmObject {
    pub version_id: Uuid,
    pub entity_id: Uuid,
    pub supersedes_id: Option<Uuid>,
    pub version: i32,
    pub project_id: Uuid,
    pub branch_id: Option<Uuid>,
    pub object_type: String,
    pub key: Option<String>,
    pub status: Option<String>,
    pub properties: serde_json::Value,
    pub labels: Vec<String>,
    pub deleted_at: Option<NaiveDateTime>,
    pub content_hash: Vec<u8>,
    pub embedding: Option<Vector>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub last_accessed_at: Option<NaiveDateTime>,
    pub actor_id: Option<String>,
    pub actor_type: Option<String>,
    pub change_summary: Option<serde_json::Value>,
}

impl From<OrmObject> for Object {
    fn from(row: OrmObject) -> Self {
        let properties = match row.properties {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        let change_summary = row
            .change_summary
            .and_then(|v| serde_json::from_value(v).ok());
        Object {
            version_id: VersionId(row.version_id),
            entity_id: EntityId(row.entity_id),
            supersedes_id: row.supersedes_id.map(VersionId),
            version: row.version,
            project_id: ProjectId(row.project_id),
            branch_id: row.branch_id.map(BranchId),
            object_type: row.object_type,
            key: row.key,
            status: row.status,
            properties,
            labels: row.labels,
            deleted_at: row.deleted_at,
            content_hash: to_content_hash(row.content_hash),
            embedding: row.embedding.map(|v| v.to_vec()),
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_accessed_at: row.last_accessed_at,
            actor_id: row.actor_id,
            actor_type: row.actor_type,
            change_summary,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = objects)]
pub struct NewObject {
    pub version_id: Uuid,
    pub entity_id: Uuid,
    pub supersedes_id: Option<Uuid>,
    pub version: i32,
    pub project_id: Uuid,
    pub branch_id: Option<Uuid>,
    pub object_type: String,
    pub key: Option<String>,
    pub status: Option<String>,
    pub properties: serde_json::Value,
    pub labels: Vec<String>,
    pub deleted_at: Option<NaiveDateTime>,
    pub content_hash: Vec<u8>,
    pub embedding: Option<Vector>,
    pub actor_id: Option<String>,
    pub actor_type: Option<String>,
    pub change_summary: Option<serde_json::Value>,
}

impl From<&Object> for NewObject {
    fn from(o: &Object) -> Self {
        NewObject {
            version_id: o.version_id.0,
            entity_id: o.entity_id.0,
            supersedes_id: o.supersedes_id.map(Uuid::from),
            version: o.version,
            project_id: o.project_id.0,
            branch_id: o.branch_id.map(Uuid::from),
            object_type: o.object_type.clone(),
            key: o.key.clone(),
            status: o.status.clone(),
            properties: serde_json::Value::Object(o.properties.clone()),
            labels: o.labels.clone(),
            deleted_at: o.deleted_at,
            content_hash: o.content_hash.to_vec(),
            embedding: o.embedding.clone().map(Vector::from),
            actor_id: o.actor_id.clone(),
            actor_type: o.actor_type.clone(),
            change_summary: o
                .change_summary
                .as_ref()
                .map(|c| serde_json::to_value(c).expect("change summary serialises")),
        }
    }
}

/// Demotes the previous HEAD: the only in-place update ever applied to a
/// version row, besides `last_accessed_at` (§3 "Lifecycle").
#[derive(AsChangeset)]
#[diesel(table_name = objects)]
pub struct DemoteObject {
    pub supersedes_id: Option<Uuid>,
}

#[derive(AsChangeset)]
#[diesel(table_name = objects)]
pub struct TouchObjectAccess {
    pub last_accessed_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = relationships)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrmRelationship {
    pub version_id: Uuid,
    pub entity_id: Uuid,
    pub supersedes_id: Option<Uuid>,
    pub version: i32,
    pub project_id: Uuid,
    pub branch_id: Option<Uuid>,
    pub relationship_type: String,
    pub src_entity_id: Uuid,
    pub dst_entity_id: Uuid,
    pub weight: Option<f64>,
    pub properties: Option<serde_json::Value>,
    pub embedding: Option<Vector>,
    pub deleted_at: Option<NaiveDateTime>,
    pub content_hash: Vec<u8>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<OrmRelationship> for Relationship {
    fn from(row: OrmRelationship) -> Self {
        let properties = row.properties.map(|v| match v {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        });
        Relationship {
            version_id: VersionId(row.version_id),
            entity_id: EntityId(row.entity_id),
            supersedes_id: row.supersedes_id.map(VersionId),
            version: row.version,
            project_id: ProjectId(row.project_id),
            branch_id: row.branch_id.map(BranchId),
            relationship_type: row.relationship_type,
            src_entity_id: EntityId(row.src_entity_id),
            dst_entity_id: EntityId(row.dst_entity_id),
            weight: row.weight,
            properties,
            embedding: row.embedding.map(|v| v.to_vec()),
            deleted_at: row.deleted_at,
            content_hash: to_content_hash(row.content_hash),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = relationships)]
pub struct NewRelationship {
    pub version_id: Uuid,
    pub entity_id: Uuid,
    pub supersedes_id: Option<Uuid>,
    pub version: i32,
    pub project_id: Uuid,
    pub branch_id: Option<Uuid>,
    pub relationship_type: String,
    pub src_entity_id: Uuid,
    pub dst_entity_id: Uuid,
    pub weight: Option<f64>,
    pub properties: Option<serde_json::Value>,
    pub embedding: Option<Vector>,
    pub deleted_at: Option<NaiveDateTime>,
    pub content_hash: Vec<u8>,
}

impl From<&Relationship> for NewRelationship {
    fn from(r: &Relationship) -> Self {
        NewRelationship {
            version_id: r.version_id.0,
            entity_id: r.entity_id.0,
            supersedes_id: r.supersedes_id.map(Uuid::from),
            version: r.version,
            project_id: r.project_id.0,
            branch_id: r.branch_id.map(Uuid::from),
            relationship_type: r.relationship_type.clone(),
            src_entity_id: r.src_entity_id.0,
            dst_entity_id: r.dst_entity_id.0,
            weight: r.weight,
            properties: r.properties.clone().map(serde_json::Value::Object),
            embedding: r.embedding.clone().map(Vector::from),
            deleted_at: r.deleted_at,
            content_hash: r.content_hash.to_vec(),
        }
    }
}

#[derive(AsChangeset)]
#[diesel(table_name = relationships)]
pub struct DemoteRelationship {
    pub supersedes_id: Option<Uuid>,
}

/// Fills in a triplet embedding computed after the row was already inserted
/// (§11 "Triplet text generation" runs as detached background work, not
/// inline with the insert).
#[derive(AsChangeset)]
#[diesel(table_name = relationships)]
pub struct SetRelationshipEmbedding {
    pub embedding: Option<Vector>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = branches)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrmBranch {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub parent_branch_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

impl From<OrmBranch> for Branch {
    fn from(row: OrmBranch) -> Self {
        Branch {
            id: BranchId(row.id),
            project_id: ProjectId(row.project_id),
            name: row.name,
            parent_branch_id: row.parent_branch_id.map(BranchId),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = branch_lineage)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrmBranchLineage {
    pub branch_id: Uuid,
    pub ancestor_branch_id: Uuid,
    pub depth: i32,
}

impl From<OrmBranchLineage> for BranchLineageRow {
    fn from(row: OrmBranchLineage) -> Self {
        BranchLineageRow {
            branch_id: BranchId(row.branch_id),
            ancestor_branch_id: BranchId(row.ancestor_branch_id),
            depth: row.depth,
        }
    }
}
