//! `GET/POST/PATCH/DELETE /relationships...` (§6 "symmetric CRUD plus
//! `/history`").

use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::{Map, Value};

use chronograph_core::ids::{AnyId, BranchId, EntityId};
use chronograph_core::ChronographError;
use chronograph_storage::gateway;
use chronograph_storage::versioning;

use crate::auth;
use crate::dto::{EdgeCreationDto, RelationshipDto};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn parse_any_id(raw: &str) -> Result<AnyId, ApiError> {
    AnyId::parse(raw)
        .ok_or_else(|| ApiError(ChronographError::bad_request(format!("malformed id: {raw}"))))
}

fn parse_entity_id(raw: &str) -> Result<EntityId, ApiError> {
    EntityId::parse(raw).ok_or_else(|| ApiError(ChronographError::bad_request(format!("malformed id: {raw}"))))
}

fn parse_branch(raw: Option<&str>) -> Result<Option<BranchId>, ApiError> {
    match raw {
        None => Ok(None),
        Some(s) => BranchId::parse(s)
            .map(Some)
            .ok_or_else(|| ApiError(ChronographError::bad_request(format!("malformed branch_id: {s}")))),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateRelationshipBody {
    #[serde(rename = "type")]
    pub relationship_type: String,
    pub src: String,
    pub dst: String,
    pub weight: Option<f64>,
    pub properties: Option<Map<String, Value>>,
    pub embedding: Option<Vec<f32>>,
    pub branch_id: Option<String>,
}

pub async fn create_relationship(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<CreateRelationshipBody>,
) -> ApiResult<HttpResponse> {
    let ctx = auth::extract(&req)?;
    let src = parse_any_id(&body.src)?;
    let dst = parse_any_id(&body.dst)?;
    let branch_id = parse_branch(body.branch_id.as_deref())?;

    let mut conn = state.pool.get().await.map_err(chronograph_storage::pg_error::from_pool)?;
    let created = versioning::create_relationship(
        &mut conn,
        Arc::clone(&state.pool),
        ctx.project_id,
        branch_id,
        &body.relationship_type,
        src,
        dst,
        body.weight,
        body.properties.clone(),
        body.embedding.clone(),
        state.inverse_types.as_ref(),
        Arc::clone(&state.embedder),
    )
    .await?;

    Ok(HttpResponse::Created().json(EdgeCreationDto {
        forward: RelationshipDto::from(created.forward),
        inverse: created.inverse.map(RelationshipDto::from),
    }))
}

pub async fn get_relationship(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let ctx = auth::extract(&req)?;
    let entity_id = parse_entity_id(&path)?;
    let mut conn = state.pool.get().await.map_err(chronograph_storage::pg_error::from_pool)?;
    let found = gateway::find_head_relationship_by_entity(&mut conn, ctx.project_id, entity_id).await?;
    Ok(HttpResponse::Ok().json(RelationshipDto::from(found)))
}

#[derive(Debug, Deserialize, Default)]
pub struct BranchQuery {
    pub branch_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PatchRelationshipBody {
    pub weight: Option<f64>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    pub branch_id: Option<String>,
}

/// Relationships don't expose a dedicated patch engine op (§4.2 only
/// describes object patch semantics); a relationship "patch" is a new
/// version carrying the merged `weight`/`properties`, built and written
/// directly against the gateway the same way the Versioning Engine's object
/// patch path does.
pub async fn patch_relationship(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<PatchRelationshipBody>,
) -> ApiResult<HttpResponse> {
    let ctx = auth::extract(&req)?;
    let entity_id = parse_entity_id(&path)?;
    let branch_id = parse_branch(body.branch_id.as_deref())?;
    let mut conn = state.pool.get().await.map_err(chronograph_storage::pg_error::from_pool)?;

    let prev = gateway::find_head_relationship_by_entity(&mut conn, ctx.project_id, entity_id).await?;
    let merged_properties = {
        let mut merged = prev.properties.clone().unwrap_or_default();
        for (k, v) in &body.properties {
            if v.is_null() {
                merged.remove(k);
            } else {
                merged.insert(k.clone(), v.clone());
            }
        }
        merged
    };
    let now = chrono::Utc::now().naive_utc();
    let next = chronograph_core::model::Relationship {
        version_id: chronograph_core::ids::VersionId::new(),
        entity_id: prev.entity_id,
        supersedes_id: None,
        version: prev.version + 1,
        project_id: prev.project_id,
        branch_id: branch_id.or(prev.branch_id),
        relationship_type: prev.relationship_type.clone(),
        src_entity_id: prev.src_entity_id,
        dst_entity_id: prev.dst_entity_id,
        weight: body.weight.or(prev.weight),
        content_hash: chronograph_core::canon::content_hash(Some(&merged_properties)),
        properties: Some(merged_properties),
        embedding: prev.embedding.clone(),
        deleted_at: prev.deleted_at,
        created_at: now,
        updated_at: now,
    };
    let written = gateway::create_relationship_version(&mut conn, &prev, &next).await?;
    Ok(HttpResponse::Ok().json(RelationshipDto::from(written)))
}

pub async fn relationship_history(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<BranchQuery>,
) -> ApiResult<HttpResponse> {
    let ctx = auth::extract(&req)?;
    let entity_id = parse_entity_id(&path)?;
    let branch_id = parse_branch(query.branch_id.as_deref())?;
    let mut conn = state.pool.get().await.map_err(chronograph_storage::pg_error::from_pool)?;
    let history = gateway::history_for_relationship(&mut conn, ctx.project_id, entity_id, branch_id).await?;
    Ok(HttpResponse::Ok().json(history.into_iter().map(RelationshipDto::from).collect::<Vec<_>>()))
}

pub async fn delete_relationship(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let ctx = auth::extract(&req)?;
    let entity_id = parse_entity_id(&path)?;
    let mut conn = state.pool.get().await.map_err(chronograph_storage::pg_error::from_pool)?;
    let prev = gateway::find_head_relationship_by_entity(&mut conn, ctx.project_id, entity_id).await?;
    if prev.deleted_at.is_some() {
        return Err(ApiError(ChronographError::bad_request("relationship is already deleted")));
    }
    let now = chrono::Utc::now().naive_utc();
    let next = chronograph_core::model::Relationship {
        version_id: chronograph_core::ids::VersionId::new(),
        supersedes_id: None,
        version: prev.version + 1,
        deleted_at: Some(now),
        created_at: now,
        updated_at: now,
        ..prev.clone()
    };
    let written = gateway::create_relationship_version(&mut conn, &prev, &next).await?;
    Ok(HttpResponse::Ok().json(RelationshipDto::from(written)))
}
