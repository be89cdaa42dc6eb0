//! Wire-format types (§6). Responses carry both legacy field names (`id`,
//! `canonical_id`) and the new names (`version_id`, `entity_id`) with
//! identical values, the "JSON response compatibility" requirement -- this
//! is the one place in the workspace that cares about that duplication; the
//! engine crates only ever deal in `VersionId`/`EntityId`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use chronograph_core::diff::ChangeSummary;
use chronograph_core::model::{Direction, LabelFilter, Object, Relationship};

fn hex_hash(hash: [u8; 32]) -> String {
    hex::encode(hash)
}

#[derive(Debug, Serialize)]
pub struct ObjectDto {
    pub id: Uuid,
    pub canonical_id: Uuid,
    pub version_id: Uuid,
    pub entity_id: Uuid,
    pub supersedes_id: Option<Uuid>,
    pub version: i32,
    pub project_id: Uuid,
    pub branch_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub object_type: String,
    pub key: Option<String>,
    pub status: Option<String>,
    pub properties: Map<String, Value>,
    pub labels: Vec<String>,
    pub deleted_at: Option<NaiveDateTime>,
    pub content_hash: String,
    pub embedding: Option<Vec<f32>>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub last_accessed_at: Option<NaiveDateTime>,
    pub actor_id: Option<String>,
    pub actor_type: Option<String>,
    pub change_summary: Option<ChangeSummary>,
}

impl From<Object> for ObjectDto {
    fn from(o: Object) -> Self {
        ObjectDto {
            id: o.version_id.0,
            canonical_id: o.entity_id.0,
            version_id: o.version_id.0,
            entity_id: o.entity_id.0,
            supersedes_id: o.supersedes_id.map(|v| v.0),
            version: o.version,
            project_id: o.project_id.0,
            branch_id: o.branch_id.map(|b| b.0),
            object_type: o.object_type,
            key: o.key,
            status: o.status,
            properties: o.properties,
            labels: o.labels,
            deleted_at: o.deleted_at,
            content_hash: hex_hash(o.content_hash),
            embedding: o.embedding,
            created_at: o.created_at,
            updated_at: o.updated_at,
            last_accessed_at: o.last_accessed_at,
            actor_id: o.actor_id,
            actor_type: o.actor_type,
            change_summary: o.change_summary,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RelationshipDto {
    pub id: Uuid,
    pub canonical_id: Uuid,
    pub version_id: Uuid,
    pub entity_id: Uuid,
    pub supersedes_id: Option<Uuid>,
    pub version: i32,
    pub project_id: Uuid,
    pub branch_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub relationship_type: String,
    pub src_entity_id: Uuid,
    pub dst_entity_id: Uuid,
    pub weight: Option<f64>,
    pub properties: Option<Map<String, Value>>,
    pub content_hash: String,
    pub embedding: Option<Vec<f32>>,
    pub deleted_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<Relationship> for RelationshipDto {
    fn from(r: Relationship) -> Self {
        RelationshipDto {
            id: r.version_id.0,
            canonical_id: r.entity_id.0,
            version_id: r.version_id.0,
            entity_id: r.entity_id.0,
            supersedes_id: r.supersedes_id.map(|v| v.0),
            version: r.version,
            project_id: r.project_id.0,
            branch_id: r.branch_id.map(|b| b.0),
            relationship_type: r.relationship_type,
            src_entity_id: r.src_entity_id.0,
            dst_entity_id: r.dst_entity_id.0,
            weight: r.weight,
            properties: r.properties,
            content_hash: hex_hash(r.content_hash),
            embedding: r.embedding,
            deleted_at: r.deleted_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// `POST /relationships` also creates an inverse edge when one is declared;
/// both are reported back (§4.2 "Relationship versioning").
#[derive(Debug, Serialize)]
pub struct EdgeCreationDto {
    pub forward: RelationshipDto,
    pub inverse: Option<RelationshipDto>,
}

#[derive(Debug, Serialize)]
pub struct PageDto<T> {
    pub items: Vec<T>,
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
pub struct ExpandedNodeDto {
    #[serde(flatten)]
    pub object: ObjectDto,
    pub depth: u32,
}

#[derive(Debug, Serialize)]
pub struct ExpandResultDto {
    pub roots: Vec<Uuid>,
    pub nodes: Vec<ExpandedNodeDto>,
    pub edges: Vec<RelationshipDto>,
    pub truncated: bool,
    pub max_depth_reached: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionDto {
    Out,
    In,
    Both,
}

impl From<DirectionDto> for Direction {
    fn from(d: DirectionDto) -> Self {
        match d {
            DirectionDto::Out => Direction::Out,
            DirectionDto::In => Direction::In,
            DirectionDto::Both => Direction::Both,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LabelFilterDto {
    pub labels_all: Option<Vec<String>>,
    pub labels_any: Option<Vec<String>>,
}

impl LabelFilterDto {
    pub fn into_filter(self) -> Option<LabelFilter> {
        match (self.labels_all, self.labels_any) {
            (Some(all), _) if !all.is_empty() => Some(LabelFilter::All(all)),
            (_, Some(any)) if !any.is_empty() => Some(LabelFilter::Any(any)),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MergeSummaryDto {
    pub entity_id: Uuid,
    pub status: &'static str,
    pub conflicts: Vec<String>,
    pub source_version_id: Option<Uuid>,
    pub target_version_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct MergePreviewDto {
    pub summaries: Vec<MergeSummaryDto>,
    pub truncated: bool,
}

#[derive(Debug, Serialize)]
pub struct MergeResultDto {
    pub objects: MergePreviewDto,
    pub relationships: MergePreviewDto,
    pub execution_eligible: bool,
    pub executed: bool,
}
