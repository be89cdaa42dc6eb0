//! Merge Analyser (§4.5).
//!
//! Computes a preview merge of a source branch into a target branch by
//! classifying every `entity_id` present on either branch. No merge-base
//! version is persisted anywhere in the data model (§9's open questions
//! explicitly decline to wire `branch_lineage` into this classification),
//! so "the top-level property paths touched on each side … since branch
//! point" (§4.5 step 2) is approximated from each HEAD's own recorded
//! `change_summary` -- the diff against *its own* prior version, which is
//! the only per-side "what changed" signal the model actually stores. See
//! DESIGN.md for the full rationale.

use std::collections::{HashMap, HashSet};

use diesel_async::AsyncPgConnection;

use chronograph_core::canon::ContentHash;
use chronograph_core::ids::{BranchId, EntityId, ProjectId, VersionId};
use chronograph_core::ChronographError;

use crate::gateway;

/// Default/hard cap on merge preview size (§4.5 step 3, §6 "merge preview
/// hard limit").
pub const DEFAULT_MERGE_LIMIT: usize = 500;

/// Precedence order `conflict < fast_forward < added < unchanged`
/// (conflicts sort first); declaration order doubles as `Ord` (§4.5 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MergeStatus {
    Conflict,
    FastForward,
    Added,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct HeadSnapshot {
    pub version_id: VersionId,
    pub content_hash: ContentHash,
}

#[derive(Debug, Clone)]
pub struct MergeSummary {
    pub entity_id: EntityId,
    pub status: MergeStatus,
    pub conflicts: Vec<String>,
    pub source: Option<HeadSnapshot>,
    pub target: Option<HeadSnapshot>,
}

#[derive(Debug, Clone)]
pub struct MergePreview {
    pub summaries: Vec<MergeSummary>,
    pub truncated: bool,
}

/// The "what changed on this side" path set for one HEAD row (§4.5 step 2).
/// Version 1 has no `change_summary` (there is no prior version to diff
/// against), so it is treated as having touched every key it carries --
/// version 1 is, by definition, "added" relative to nothing.
fn touched_paths_for_head(properties: &serde_json::Map<String, serde_json::Value>, version: i32, change_summary: &Option<chronograph_core::diff::ChangeSummary>) -> HashSet<String> {
    if version == 1 {
        return properties.keys().map(|k| format!("/{}", k.replace('~', "~0").replace('/', "~1"))).collect();
    }
    change_summary.as_ref().map(|s| s.paths.iter().cloned().collect()).unwrap_or_default()
}

fn classify_one<T>(
    entity_id: EntityId,
    source: Option<&T>,
    target: Option<&T>,
    snapshot: impl Fn(&T) -> HeadSnapshot,
    touched: impl Fn(&T) -> HashSet<String>,
) -> MergeSummary {
    match (source, target) {
        (None, Some(t)) => MergeSummary {
            entity_id,
            status: MergeStatus::Unchanged,
            conflicts: Vec::new(),
            source: None,
            target: Some(snapshot(t)),
        },
        (Some(s), None) => MergeSummary {
            entity_id,
            status: MergeStatus::Added,
            conflicts: Vec::new(),
            source: Some(snapshot(s)),
            target: None,
        },
        (Some(s), Some(t)) => {
            let s_snap = snapshot(s);
            let t_snap = snapshot(t);
            if s_snap.content_hash == t_snap.content_hash {
                MergeSummary {
                    entity_id,
                    status: MergeStatus::Unchanged,
                    conflicts: Vec::new(),
                    source: Some(s_snap),
                    target: Some(t_snap),
                }
            } else {
                let changed_source = touched(s);
                let changed_target = touched(t);
                let mut conflicts: Vec<String> =
                    changed_source.intersection(&changed_target).cloned().collect();
                conflicts.sort();
                let status = if conflicts.is_empty() { MergeStatus::FastForward } else { MergeStatus::Conflict };
                MergeSummary { entity_id, status, conflicts, source: Some(s_snap), target: Some(t_snap) }
            }
        }
        (None, None) => unreachable!("entity_id drawn from source ∪ target"),
    }
}

fn finish(mut summaries: Vec<MergeSummary>, limit: usize) -> MergePreview {
    summaries.sort_by(|a, b| a.status.cmp(&b.status).then_with(|| a.entity_id.cmp(&b.entity_id)));
    let truncated = summaries.len() > limit;
    summaries.truncate(limit);
    MergePreview { summaries, truncated }
}

/// Classifies every object `entity_id` present on `source_branch` or
/// `target_branch` (§4.5, objects).
pub async fn analyse_object_merge(
    conn: &mut AsyncPgConnection,
    project_id: ProjectId,
    source_branch: Option<BranchId>,
    target_branch: Option<BranchId>,
    limit: usize,
) -> Result<MergePreview, ChronographError> {
    let source_heads = gateway::all_head_objects(conn, project_id, source_branch).await?;
    let target_heads = gateway::all_head_objects(conn, project_id, target_branch).await?;

    let source_by_entity: HashMap<EntityId, _> = source_heads.into_iter().map(|o| (o.entity_id, o)).collect();
    let target_by_entity: HashMap<EntityId, _> = target_heads.into_iter().map(|o| (o.entity_id, o)).collect();

    let all_entities: HashSet<EntityId> =
        source_by_entity.keys().chain(target_by_entity.keys()).copied().collect();

    let summaries: Vec<MergeSummary> = all_entities
        .into_iter()
        .map(|entity_id| {
            classify_one(
                entity_id,
                source_by_entity.get(&entity_id),
                target_by_entity.get(&entity_id),
                |o: &chronograph_core::model::Object| HeadSnapshot { version_id: o.version_id, content_hash: o.content_hash },
                |o: &chronograph_core::model::Object| touched_paths_for_head(&o.properties, o.version, &o.change_summary),
            )
        })
        .collect();

    Ok(finish(summaries, limit))
}

/// Classifies every relationship `entity_id` present on `source_branch` or
/// `target_branch` (§4.5, relationships). Relationships carry no
/// `change_summary` field (§3), so the touched-path set for a changed edge
/// is derived by diffing its `properties` map directly against the other
/// side's -- there is no "this side's own prior version" diff recorded for
/// edges the way there is for objects.
pub async fn analyse_relationship_merge(
    conn: &mut AsyncPgConnection,
    project_id: ProjectId,
    source_branch: Option<BranchId>,
    target_branch: Option<BranchId>,
    limit: usize,
) -> Result<MergePreview, ChronographError> {
    let source_heads = gateway::all_head_relationships(conn, project_id, source_branch).await?;
    let target_heads = gateway::all_head_relationships(conn, project_id, target_branch).await?;

    let source_by_entity: HashMap<EntityId, _> = source_heads.into_iter().map(|r| (r.entity_id, r)).collect();
    let target_by_entity: HashMap<EntityId, _> = target_heads.into_iter().map(|r| (r.entity_id, r)).collect();

    let all_entities: HashSet<EntityId> =
        source_by_entity.keys().chain(target_by_entity.keys()).copied().collect();

    let summaries: Vec<MergeSummary> = all_entities
        .into_iter()
        .map(|entity_id| {
            classify_one(
                entity_id,
                source_by_entity.get(&entity_id),
                target_by_entity.get(&entity_id),
                |r: &chronograph_core::model::Relationship| {
                    HeadSnapshot { version_id: r.version_id, content_hash: r.content_hash }
                },
                |r: &chronograph_core::model::Relationship| {
                    chronograph_core::diff::touched_paths(None, r.properties.as_ref()).into_iter().collect()
                },
            )
        })
        .collect();

    Ok(finish(summaries, limit))
}

/// §4.5 "If the caller requests execution *and* all classifications are
/// non-conflict, the analyser would apply `added` and `fast_forward` items
/// onto the target branch" -- left unimplemented per §9's open question:
/// the spec is explicit that this code path is not recoverable from the
/// observed source and is a policy decision for the caller's layer. This
/// function only decides whether execution is *eligible*.
pub fn is_execution_eligible(object_summaries: &[MergeSummary], relationship_summaries: &[MergeSummary]) -> bool {
    !object_summaries.iter().any(|s| s.status == MergeStatus::Conflict)
        && !relationship_summaries.iter().any(|s| s.status == MergeStatus::Conflict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronograph_core::diff::ChangeSummary;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn summary(paths: &[&str]) -> Option<ChangeSummary> {
        Some(ChangeSummary {
            added: Default::default(),
            removed: Vec::new(),
            updated: Default::default(),
            paths: paths.iter().map(|p| p.to_string()).collect(),
            meta: chronograph_core::diff::ChangeSummaryMeta { added: 0, removed: 0, updated: 0 },
        })
    }

    #[test]
    fn merge_status_precedence_orders_conflict_first() {
        let mut statuses = vec![MergeStatus::Unchanged, MergeStatus::Added, MergeStatus::Conflict, MergeStatus::FastForward];
        statuses.sort();
        assert_eq!(
            statuses,
            vec![MergeStatus::Conflict, MergeStatus::FastForward, MergeStatus::Added, MergeStatus::Unchanged]
        );
    }

    #[test]
    fn e6_fast_forward_when_source_alone_touched_paths() {
        // Target: {a:1,b:2}; source: {a:1,b:3,c:4}; target's own change_summary
        // is empty (it hasn't been touched since divergence).
        let target_props = json!({"a": 1, "b": 2}).as_object().unwrap().clone();
        let source_props = json!({"a": 1, "b": 3, "c": 4}).as_object().unwrap().clone();
        let changed_source = touched_paths_for_head(&source_props, 2, &summary(&["/b", "/c"]));
        let changed_target = touched_paths_for_head(&target_props, 2, &None);
        let conflicts: HashSet<_> = changed_source.intersection(&changed_target).collect();
        assert!(conflicts.is_empty());
    }

    #[test]
    fn e6_conflict_when_both_sides_touch_the_same_path() {
        let source_props = json!({"a": 1, "b": 3, "c": 4}).as_object().unwrap().clone();
        let target_props = json!({"a": 1, "b": 9}).as_object().unwrap().clone();
        let changed_source = touched_paths_for_head(&source_props, 2, &summary(&["/b", "/c"]));
        let changed_target = touched_paths_for_head(&target_props, 2, &summary(&["/b"]));
        let conflicts: Vec<&String> = changed_source.intersection(&changed_target).collect();
        assert_eq!(conflicts, vec![&"/b".to_string()]);
    }

    #[test]
    fn version_one_touches_all_its_own_keys() {
        let props = json!({"a": 1, "b": 2}).as_object().unwrap().clone();
        let touched = touched_paths_for_head(&props, 1, &None);
        assert_eq!(touched.len(), 2);
        assert!(touched.contains("/a"));
        assert!(touched.contains("/b"));
    }

    #[test]
    fn execution_eligible_only_without_conflicts() {
        let clean = vec![MergeSummary {
            entity_id: EntityId::new(),
            status: MergeStatus::FastForward,
            conflicts: vec![],
            source: None,
            target: None,
        }];
        let conflicted = vec![MergeSummary {
            entity_id: EntityId::new(),
            status: MergeStatus::Conflict,
            conflicts: vec!["/b".into()],
            source: None,
            target: None,
        }];
        assert!(is_execution_eligible(&clean, &[]));
        assert!(!is_execution_eligible(&conflicted, &[]));
    }
}
