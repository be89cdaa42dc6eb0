//! `POST /search` (hybrid) and `POST /search-with-neighbors` (§6 "Cross").

use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

use chronograph_core::ids::BranchId;
use chronograph_storage::gateway::ObjectFilter;
use chronograph_storage::search;
use chronograph_storage::traversal::{self, ExpandRequest};

use crate::auth;
use crate::dto::{ExpandedNodeDto, LabelFilterDto, RelationshipDto};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn parse_branch(raw: &Option<String>) -> Result<Option<BranchId>, ApiError> {
    match raw {
        None => Ok(None),
        Some(s) => BranchId::parse(s)
            .map(Some)
            .ok_or_else(|| ApiError(chronograph_core::ChronographError::bad_request(format!("malformed branch_id: {s}")))),
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchBody {
    pub query: Option<String>,
    pub vector: Option<Vec<f32>>,
    pub branch_id: Option<String>,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(flatten)]
    pub label_filter: LabelFilterDto,
    pub status: Option<String>,
    #[serde(default = "default_weight")]
    pub w_lex: f64,
    #[serde(default = "default_weight")]
    pub w_vec: f64,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    #[serde(default)]
    pub debug: bool,
}

fn default_weight() -> f64 {
    0.5
}

/// `POST /search` (§4.3 "Hybrid fusion"). Debug telemetry requires the
/// debug scope (§6: "Debug mode on hybrid search requires an explicit
/// scope").
pub async fn hybrid_search(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<SearchBody>,
) -> ApiResult<HttpResponse> {
    let ctx = auth::extract(&req)?;
    if body.debug {
        auth::require_debug_scope(&ctx)?;
    }
    let branch_id = parse_branch(&body.branch_id)?;
    let filter = ObjectFilter {
        types: body.types.clone(),
        labels: body.label_filter.clone().into_filter(),
        status: body.status.clone(),
        ..Default::default()
    };
    let limit = state.config.resolve_page_limit(body.limit);
    let offset = body.offset.unwrap_or(0);

    let mut conn = state.pool.get().await.map_err(chronograph_storage::pg_error::from_pool)?;
    let (hits, has_more, debug_info) = search::hybrid_search(
        &mut conn,
        ctx.project_id,
        branch_id,
        body.query.as_deref(),
        body.vector.as_deref(),
        &filter,
        body.w_lex,
        body.w_vec,
        state.config.vector_probes,
        limit,
        offset,
        body.debug,
    )
    .await?;
    search::spawn_access_tracking(Arc::clone(&state.pool), hits.iter().map(|h| h.object.version_id).collect());

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "items": hits.into_iter().map(|h| serde_json::json!({
            "object": crate::dto::ObjectDto::from(h.object),
            "score": h.fused_score,
        })).collect::<Vec<_>>(),
        "has_more": has_more,
        "debug": debug_info,
    })))
}

#[derive(Debug, Deserialize)]
pub struct SearchWithNeighborsBody {
    #[serde(flatten)]
    pub search: SearchBody,
    #[serde(default = "default_neighbor_depth")]
    pub neighbor_depth: u32,
    #[serde(default)]
    pub rel_types: Vec<String>,
}

fn default_neighbor_depth() -> u32 {
    1
}

/// `POST /search-with-neighbors`: runs the same hybrid search, then expands
/// one hop (by default) from each hit so the response can be rendered as a
/// small subgraph -- the Search Engine (§4.3) and Traversal Engine (§4.4)
/// composed, not a new primitive of either.
pub async fn search_with_neighbors(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<SearchWithNeighborsBody>,
) -> ApiResult<HttpResponse> {
    let ctx = auth::extract(&req)?;
    if body.search.debug {
        auth::require_debug_scope(&ctx)?;
    }
    let branch_id = parse_branch(&body.search.branch_id)?;
    let filter = ObjectFilter {
        types: body.search.types.clone(),
        labels: body.search.label_filter.clone().into_filter(),
        status: body.search.status.clone(),
        ..Default::default()
    };
    let limit = state.config.resolve_page_limit(body.search.limit);
    let offset = body.search.offset.unwrap_or(0);

    let mut conn = state.pool.get().await.map_err(chronograph_storage::pg_error::from_pool)?;
    let (hits, has_more, _) = search::hybrid_search(
        &mut conn,
        ctx.project_id,
        branch_id,
        body.search.query.as_deref(),
        body.search.vector.as_deref(),
        &filter,
        body.search.w_lex,
        body.search.w_vec,
        state.config.vector_probes,
        limit,
        offset,
        false,
    )
    .await?;

    let root_ids: Vec<chronograph_core::ids::AnyId> =
        hits.iter().map(|h| h.object.entity_id.into()).collect();

    let neighbors = if root_ids.is_empty() {
        None
    } else {
        let expand_req = ExpandRequest {
            root_ids,
            direction: chronograph_core::model::Direction::Both,
            max_depth: body.neighbor_depth.max(1),
            rel_types: body.rel_types.clone(),
            ..Default::default()
        };
        Some(traversal::expand(&mut conn, ctx.project_id, branch_id, expand_req).await?)
    };

    search::spawn_access_tracking(Arc::clone(&state.pool), hits.iter().map(|h| h.object.version_id).collect());

    let hit_dtos: Vec<_> = hits
        .into_iter()
        .map(|h| serde_json::json!({"object": crate::dto::ObjectDto::from(h.object), "score": h.fused_score}))
        .collect();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "items": hit_dtos,
        "has_more": has_more,
        "neighbors": neighbors.map(|n| serde_json::json!({
            "nodes": n.nodes.into_iter().map(|node| ExpandedNodeDto {
                object: crate::dto::ObjectDto::from(node.object),
                depth: node.depth,
            }).collect::<Vec<_>>(),
            "edges": n.edges.into_iter().map(RelationshipDto::from).collect::<Vec<_>>(),
            "truncated": n.truncated,
        })),
    })))
}
