//! `POST /expand` and `POST /traverse` (§4.4, §6). Both ride the same
//! bounded-BFS primitive; `/traverse` is the older route name kept for
//! clients that haven't moved to `/expand` and accepts the identical body.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

use chronograph_core::ids::{AnyId, BranchId};
use chronograph_core::model::Direction;
use chronograph_core::ChronographError;
use chronograph_storage::traversal::{self, ExpandRequest, PropertyProjection, DEFAULT_MAX_DEPTH, DEFAULT_MAX_EDGES, DEFAULT_MAX_NODES};

use crate::auth;
use crate::dto::{DirectionDto, ExpandResultDto, ExpandedNodeDto, LabelFilterDto, ObjectDto, RelationshipDto};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn parse_branch(raw: &Option<String>) -> Result<Option<BranchId>, ApiError> {
    match raw {
        None => Ok(None),
        Some(s) => BranchId::parse(s)
            .map(Some)
            .ok_or_else(|| ApiError(ChronographError::bad_request(format!("malformed branch_id: {s}")))),
    }
}

fn parse_root_ids(raw: &[String]) -> Result<Vec<AnyId>, ApiError> {
    raw.iter()
        .map(|s| AnyId::parse(s).ok_or_else(|| ApiError(ChronographError::bad_request(format!("malformed root id: {s}")))))
        .collect()
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionMode {
    #[default]
    None,
    Include,
    Exclude,
}

#[derive(Debug, Deserialize, Default)]
pub struct ProjectionDto {
    #[serde(default)]
    pub mode: ProjectionMode,
    #[serde(default)]
    pub keys: Vec<String>,
}

impl ProjectionDto {
    fn into_projection(self) -> Option<PropertyProjection> {
        match self.mode {
            ProjectionMode::None => None,
            ProjectionMode::Include => Some(PropertyProjection::Include(self.keys)),
            ProjectionMode::Exclude => Some(PropertyProjection::Exclude(self.keys)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExpandBody {
    pub root_ids: Vec<String>,
    #[serde(default)]
    pub direction: Option<DirectionDto>,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,
    #[serde(default = "default_max_edges")]
    pub max_edges: usize,
    #[serde(default)]
    pub rel_types: Vec<String>,
    #[serde(default)]
    pub obj_types: Vec<String>,
    #[serde(flatten)]
    pub label_filter: LabelFilterDto,
    pub query_vector: Option<Vec<f32>>,
    pub branch_id: Option<String>,
    #[serde(default)]
    pub projection: ProjectionDto,
}

fn default_max_depth() -> u32 {
    DEFAULT_MAX_DEPTH
}

fn default_max_nodes() -> usize {
    DEFAULT_MAX_NODES
}

fn default_max_edges() -> usize {
    DEFAULT_MAX_EDGES
}

/// `POST /expand` (§4.4): bounded BFS from `root_ids`.
pub async fn expand(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<ExpandBody>,
) -> ApiResult<HttpResponse> {
    let ctx = auth::extract(&req)?;
    let branch_id = parse_branch(&body.branch_id)?;
    let body = body.into_inner();
    let root_ids = parse_root_ids(&body.root_ids)?;

    let expand_req = ExpandRequest {
        root_ids,
        direction: body.direction.map(Direction::from).unwrap_or(Direction::Both),
        max_depth: body.max_depth,
        max_nodes: body.max_nodes,
        max_edges: body.max_edges,
        rel_types: body.rel_types,
        obj_types: body.obj_types,
        labels: body.label_filter.into_filter(),
        query_vector: body.query_vector,
        projection: body.projection.into_projection(),
    };

    let mut conn = state.pool.get().await.map_err(chronograph_storage::pg_error::from_pool)?;
    let result = traversal::expand(&mut conn, ctx.project_id, branch_id, expand_req).await?;

    Ok(HttpResponse::Ok().json(ExpandResultDto {
        roots: result.roots.iter().map(|id| id.0).collect(),
        nodes: result
            .nodes
            .into_iter()
            .map(|node| ExpandedNodeDto { object: ObjectDto::from(node.object), depth: node.depth })
            .collect(),
        edges: result.edges.into_iter().map(RelationshipDto::from).collect(),
        truncated: result.truncated,
        max_depth_reached: result.max_depth_reached,
    }))
}

/// `POST /traverse`: same request/response shape as `/expand` (§6 lists
/// both under "Cross" with no distinguishing semantics of their own).
pub async fn traverse(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<ExpandBody>,
) -> ApiResult<HttpResponse> {
    expand(req, state, body).await
}
