//! Traversal Engine (§4.4).
//!
//! Bounded breadth-first expansion from a set of roots. The frontier is
//! always a set of `entity_id`s (§4.4 "Frontier") since edges refer to
//! entities, not versions; edges and nodes are admitted against independent
//! limits (`max_edges`, `max_nodes`) in the order the spec's "Round"
//! algorithm describes.

use std::collections::{HashMap, HashSet};

use diesel_async::AsyncPgConnection;
use serde_json::{Map, Value};
use tracing::warn;

use chronograph_core::ids::{AnyId, EntityId, ProjectId};
use chronograph_core::model::{Direction, LabelFilter, Object, Relationship};
use chronograph_core::ChronographError;

use crate::gateway;

/// Root list bound (§4.4 "Limits").
pub const MAX_ROOTS: usize = 50;
pub const MIN_MAX_DEPTH: u32 = 1;
pub const MAX_MAX_DEPTH: u32 = 8;
pub const MAX_MAX_NODES: usize = 5000;
pub const MAX_MAX_EDGES: usize = 15000;

/// Server-side defaults (§4.4 "Limits").
pub const DEFAULT_MAX_DEPTH: u32 = 2;
pub const DEFAULT_MAX_NODES: usize = 400;
pub const DEFAULT_MAX_EDGES: usize = 800;

/// Optional per-call include/exclude projection of top-level property keys
/// (§4.4 "Projection").
#[derive(Debug, Clone)]
pub enum PropertyProjection {
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl PropertyProjection {
    fn apply(&self, properties: &Map<String, Value>) -> Map<String, Value> {
        match self {
            PropertyProjection::Include(keys) => {
                properties.iter().filter(|(k, _)| keys.contains(k)).map(|(k, v)| (k.clone(), v.clone())).collect()
            }
            PropertyProjection::Exclude(keys) => {
                properties.iter().filter(|(k, _)| !keys.contains(k)).map(|(k, v)| (k.clone(), v.clone())).collect()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExpandRequest {
    pub root_ids: Vec<AnyId>,
    pub direction: Direction,
    pub max_depth: u32,
    pub max_nodes: usize,
    pub max_edges: usize,
    pub rel_types: Vec<String>,
    pub obj_types: Vec<String>,
    pub labels: Option<LabelFilter>,
    pub query_vector: Option<Vec<f32>>,
    pub projection: Option<PropertyProjection>,
}

impl Default for ExpandRequest {
    fn default() -> Self {
        ExpandRequest {
            root_ids: Vec::new(),
            direction: Direction::Both,
            max_depth: DEFAULT_MAX_DEPTH,
            max_nodes: DEFAULT_MAX_NODES,
            max_edges: DEFAULT_MAX_EDGES,
            rel_types: Vec::new(),
            obj_types: Vec::new(),
            labels: None,
            query_vector: None,
            projection: None,
        }
    }
}

/// Validates the bounds named in §4.4 "Limits" before doing any work.
fn validate(req: &ExpandRequest) -> Result<(), ChronographError> {
    if req.root_ids.is_empty() {
        return Err(ChronographError::bad_request("expand requires at least one root id"));
    }
    if req.root_ids.len() > MAX_ROOTS {
        return Err(ChronographError::bad_request(format!("root list exceeds {MAX_ROOTS}")));
    }
    if !(MIN_MAX_DEPTH..=MAX_MAX_DEPTH).contains(&req.max_depth) {
        return Err(ChronographError::bad_request(format!(
            "max_depth must be in [{MIN_MAX_DEPTH}, {MAX_MAX_DEPTH}]"
        )));
    }
    if req.max_nodes == 0 || req.max_nodes > MAX_MAX_NODES {
        return Err(ChronographError::bad_request(format!("max_nodes must be in (0, {MAX_MAX_NODES}]")));
    }
    if req.max_edges == 0 || req.max_edges > MAX_MAX_EDGES {
        return Err(ChronographError::bad_request(format!("max_edges must be in (0, {MAX_MAX_EDGES}]")));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ExpandedNode {
    pub object: Object,
    pub depth: u32,
}

#[derive(Debug, Clone)]
pub struct ExpandResult {
    pub roots: Vec<EntityId>,
    pub nodes: Vec<ExpandedNode>,
    pub edges: Vec<Relationship>,
    pub truncated: bool,
    pub max_depth_reached: u32,
    pub params: ExpandRequest,
}

/// Cosine similarity between two equal-length vectors; `None` on a
/// dimension mismatch so callers fall back to natural order (§4.4 "Round"
/// step 2, "On query failure, fall through to the natural (BFS) order").
fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a * norm_b))
}

/// `expand(...)` (§4.4): bounded BFS. Roots accept either id kind and are
/// resolved to `entity_id`s up front; the frontier and every edge endpoint
/// thereafter is an `entity_id`.
pub async fn expand(
    conn: &mut AsyncPgConnection,
    project_id: ProjectId,
    branch_id: Option<chronograph_core::ids::BranchId>,
    req: ExpandRequest,
) -> Result<ExpandResult, ChronographError> {
    validate(&req)?;

    let mut roots = Vec::with_capacity(req.root_ids.len());
    for id in &req.root_ids {
        let object = gateway::get_by_id(conn, project_id, *id).await?;
        roots.push(object.entity_id);
    }

    let mut visited: HashSet<EntityId> = roots.iter().copied().collect();
    let mut nodes: Vec<ExpandedNode> = Vec::new();
    let mut edges: Vec<Relationship> = Vec::new();
    let mut truncated = false;
    let mut max_depth_reached: u32 = 0;

    // Roots themselves are emitted at depth 0 (§8 E5: "nodes.length <= 101
    // (root + up to 100 leaves)" implies the root is part of the node set).
    let root_objects = gateway::get_heads_by_entities(conn, project_id, branch_id, &roots).await?;
    let root_objects_by_entity: HashMap<EntityId, Object> =
        root_objects.into_iter().map(|o| (o.entity_id, o)).collect();
    for entity_id in &roots {
        if let Some(object) = root_objects_by_entity.get(entity_id) {
            nodes.push(ExpandedNode { object: object.clone(), depth: 0 });
        }
    }

    let mut frontier: Vec<EntityId> = roots.clone();

    'depths: for depth in 0..req.max_depth {
        if frontier.is_empty() {
            break;
        }

        let mut round_edges =
            gateway::edges_for_many(conn, project_id, &frontier, req.direction, &req.rel_types).await?;

        if let Some(query_vector) = &req.query_vector {
            round_edges.sort_by(|a, b| {
                let sim_a = a.embedding.as_deref().and_then(|e| cosine_similarity(e, query_vector));
                let sim_b = b.embedding.as_deref().and_then(|e| cosine_similarity(e, query_vector));
                match (sim_a, sim_b) {
                    (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(std::cmp::Ordering::Equal),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                }
            });
        }

        let frontier_set: HashSet<EntityId> = frontier.iter().copied().collect();
        let mut discovered: Vec<EntityId> = Vec::new();
        let mut discovered_seen: HashSet<EntityId> = HashSet::new();

        for edge in round_edges {
            if edges.len() >= req.max_edges {
                truncated = true;
                break;
            }
            let neighbour = if frontier_set.contains(&edge.src_entity_id) && edge.src_entity_id != edge.dst_entity_id
            {
                if frontier_set.contains(&edge.dst_entity_id) {
                    // Both endpoints are already in the frontier (a cycle
                    // back into already-visited territory); still record the
                    // edge but it discovers nothing new.
                    edges.push(edge);
                    continue;
                }
                edge.dst_entity_id
            } else {
                edge.src_entity_id
            };
            edges.push(edge);
            if !visited.contains(&neighbour) && discovered_seen.insert(neighbour) {
                discovered.push(neighbour);
            }
        }

        for entity_id in &discovered {
            visited.insert(*entity_id);
        }

        if discovered.is_empty() {
            if truncated {
                break 'depths;
            }
            frontier = Vec::new();
            continue;
        }

        let neighbour_objects = gateway::get_heads_by_entities(conn, project_id, branch_id, &discovered).await?;
        let by_entity: HashMap<EntityId, Object> = neighbour_objects.into_iter().map(|o| (o.entity_id, o)).collect();

        let next_depth = depth + 1;
        for entity_id in &discovered {
            let Some(object) = by_entity.get(entity_id) else { continue };
            if !req.obj_types.is_empty() && !req.obj_types.contains(&object.object_type) {
                continue;
            }
            if let Some(labels) = &req.labels {
                if !labels.matches(&object.labels) {
                    continue;
                }
            }
            if nodes.len() >= req.max_nodes {
                truncated = true;
                break;
            }
            nodes.push(ExpandedNode { object: object.clone(), depth: next_depth });
            max_depth_reached = max_depth_reached.max(next_depth);
        }

        if truncated {
            break 'depths;
        }

        frontier = discovered;
    }

    if let Some(projection) = &req.projection {
        for node in &mut nodes {
            node.object.properties = projection.apply(&node.object.properties);
        }
    }

    if truncated {
        warn!(
            project_id = %project_id,
            nodes = nodes.len(),
            edges = edges.len(),
            "expand truncated: max_nodes/max_edges reached before BFS exhausted"
        );
    }

    Ok(ExpandResult { roots, nodes, edges, truncated, max_depth_reached, params: req })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_empty_roots() {
        let req = ExpandRequest { root_ids: vec![], ..Default::default() };
        assert!(validate(&req).is_err());
    }

    #[test]
    fn validate_rejects_too_many_roots() {
        let req = ExpandRequest {
            root_ids: (0..51).map(|_| AnyId(uuid::Uuid::new_v4())).collect(),
            ..Default::default()
        };
        assert!(validate(&req).is_err());
    }

    #[test]
    fn validate_rejects_depth_out_of_range() {
        let mut req = ExpandRequest { root_ids: vec![AnyId(uuid::Uuid::new_v4())], ..Default::default() };
        req.max_depth = 0;
        assert!(validate(&req).is_err());
        req.max_depth = 9;
        assert!(validate(&req).is_err());
        req.max_depth = 8;
        assert!(validate(&req).is_ok());
    }

    #[test]
    fn projection_include_keeps_only_listed_keys() {
        let projection = PropertyProjection::Include(vec!["a".to_string()]);
        let props = serde_json::json!({"a": 1, "b": 2}).as_object().unwrap().clone();
        let projected = projection.apply(&props);
        assert_eq!(projected.len(), 1);
        assert!(projected.contains_key("a"));
    }

    #[test]
    fn projection_exclude_drops_listed_keys() {
        let projection = PropertyProjection::Exclude(vec!["b".to_string()]);
        let props = serde_json::json!({"a": 1, "b": 2}).as_object().unwrap().clone();
        let projected = projection.apply(&props);
        assert_eq!(projected.len(), 1);
        assert!(projected.contains_key("a"));
    }

    #[test]
    fn cosine_similarity_mismatched_dimensions_is_none() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), None);
    }

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let sim = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]).unwrap();
        assert!((sim - 1.0).abs() < 1e-9);
    }
}
