//! The data model (§3).

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::canon::ContentHash;
use crate::ids::{BranchId, EntityId, ProjectId, VersionId};

/// A versioned node (§3 "Object").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Object {
    pub version_id: VersionId,
    pub entity_id: EntityId,
    pub supersedes_id: Option<VersionId>,
    pub version: i32,
    pub project_id: ProjectId,
    pub branch_id: Option<BranchId>,
    pub object_type: String,
    pub key: Option<String>,
    pub status: Option<String>,
    pub properties: Map<String, Value>,
    pub labels: Vec<String>,
    pub deleted_at: Option<NaiveDateTime>,
    pub content_hash: ContentHash,
    pub embedding: Option<Vec<f32>>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub last_accessed_at: Option<NaiveDateTime>,
    pub actor_id: Option<String>,
    pub actor_type: Option<String>,
    pub change_summary: Option<crate::diff::ChangeSummary>,
}

impl Object {
    pub fn is_head(&self) -> bool {
        self.supersedes_id.is_none()
    }

    pub fn is_tombstone(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Name used by the triplet-text builder (§11 "Triplet text
    /// generation"); falls back to the entity id when no `name` property is
    /// present.
    pub fn display_name(&self) -> String {
        match self.properties.get("name") {
            Some(Value::String(s)) => s.clone(),
            _ => self.entity_id.to_string(),
        }
    }
}

/// A versioned directed edge (§3 "Relationship"). Endpoints are stored by
/// `entity_id`, not `version_id`, so edges survive versioning of either
/// endpoint (invariant: edge survival).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub version_id: VersionId,
    pub entity_id: EntityId,
    pub supersedes_id: Option<VersionId>,
    pub version: i32,
    pub project_id: ProjectId,
    pub branch_id: Option<BranchId>,
    pub relationship_type: String,
    pub src_entity_id: EntityId,
    pub dst_entity_id: EntityId,
    pub weight: Option<f64>,
    pub properties: Option<Map<String, Value>>,
    pub embedding: Option<Vec<f32>>,
    pub deleted_at: Option<NaiveDateTime>,
    pub content_hash: ContentHash,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Relationship {
    pub fn is_head(&self) -> bool {
        self.supersedes_id.is_none()
    }
}

/// `(id, project_id, name, parent_branch_id, created_at)` (§3 "Branch").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub project_id: ProjectId,
    pub name: String,
    pub parent_branch_id: Option<BranchId>,
    pub created_at: NaiveDateTime,
}

/// Closure table row, `depth=0` for self (§3 "BranchLineage").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchLineageRow {
    pub branch_id: BranchId,
    pub ancestor_branch_id: BranchId,
    pub depth: i32,
}

/// Edge traversal/listing direction (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Out,
    In,
    Both,
}

/// Label set-semantics filter, shared between `list_head_objects` (§4.1) and
/// the similar-objects `labels_all`/`labels_any` parameters (§4.3, §11).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "labels")]
pub enum LabelFilter {
    /// Superset: every listed label must be present.
    All(Vec<String>),
    /// Intersection: at least one listed label must be present.
    Any(Vec<String>),
}

impl LabelFilter {
    pub fn matches(&self, object_labels: &[String]) -> bool {
        match self {
            LabelFilter::All(required) => required.iter().all(|l| object_labels.contains(l)),
            LabelFilter::Any(candidates) => candidates.iter().any(|l| object_labels.contains(l)),
        }
    }
}

/// Union of `labels` with an overlay, or wholesale replacement, as dictated
/// by `replace_labels` (§4.2 "Patch semantics"). Labels behave as a set.
pub fn merge_labels(current: &[String], overlay: &[String], replace: bool) -> Vec<String> {
    if replace {
        let mut out = overlay.to_vec();
        out.sort();
        out.dedup();
        return out;
    }
    let mut out: Vec<String> = current.to_vec();
    for l in overlay {
        if !out.contains(l) {
            out.push(l.clone());
        }
    }
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_labels_union_dedupes() {
        let merged = merge_labels(&["a".into(), "b".into()], &["b".into(), "c".into()], false);
        assert_eq!(merged, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn merge_labels_replace_ignores_current() {
        let merged = merge_labels(&["a".into()], &["c".into()], true);
        assert_eq!(merged, vec!["c".to_string()]);
    }

    #[test]
    fn label_filter_all_requires_every_label() {
        let f = LabelFilter::All(vec!["a".into(), "b".into()]);
        assert!(f.matches(&["a".into(), "b".into(), "c".into()]));
        assert!(!f.matches(&["a".into()]));
    }

    #[test]
    fn label_filter_any_requires_one_label() {
        let f = LabelFilter::Any(vec!["a".into(), "b".into()]);
        assert!(f.matches(&["b".into()]));
        assert!(!f.matches(&["c".into()]));
    }
}
