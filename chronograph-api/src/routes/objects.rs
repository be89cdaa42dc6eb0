//! `GET/POST/PATCH/DELETE /objects...` (§6).

use std::collections::BTreeSet;
use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use chronograph_core::filter::PropertyFilter;
use chronograph_core::ids::{AnyId, BranchId, EntityId, VersionId};
use chronograph_core::model::Direction;
use chronograph_core::ChronographError;
use chronograph_storage::gateway::{self, ObjectFilter, Order};
use chronograph_storage::search;
use chronograph_storage::versioning::{self, CreateObjectRequest, PatchRequest};

use crate::auth;
use crate::dto::{LabelFilterDto, ObjectDto, PageDto, RelationshipDto};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn parse_any_id(raw: &str) -> Result<AnyId, ApiError> {
    AnyId::parse(raw)
        .ok_or_else(|| ApiError(ChronographError::bad_request(format!("malformed id: {raw}"))))
}

fn parse_branch(raw: Option<&str>) -> Result<Option<BranchId>, ApiError> {
    match raw {
        None => Ok(None),
        Some(s) => BranchId::parse(s)
            .map(Some)
            .ok_or_else(|| ApiError(ChronographError::bad_request(format!("malformed branch_id: {s}")))),
    }
}

fn split_csv(raw: &Option<String>) -> Vec<String> {
    raw.as_deref()
        .map(|s| s.split(',').filter(|p| !p.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}

#[derive(Debug, Deserialize, Default)]
pub struct ListObjectsQuery {
    pub branch_id: Option<String>,
    pub types: Option<String>,
    pub status: Option<String>,
    pub key: Option<String>,
    pub ids: Option<String>,
    #[serde(flatten)]
    pub label_filter: LabelFilterDto,
    /// JSON-encoded `Vec<PropertyFilter>`, e.g. `[{"path":"a","op":"eq","value":1}]`.
    pub filters: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<i64>,
    pub order: Option<String>,
    pub include_deleted: Option<bool>,
}

fn parse_property_filters(raw: &Option<String>) -> Result<Vec<PropertyFilter>, ApiError> {
    match raw {
        None => Ok(Vec::new()),
        Some(s) => serde_json::from_str(s)
            .map_err(|e| ApiError(ChronographError::bad_request(format!("malformed filters: {e}")))),
    }
}

pub async fn list_objects(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<ListObjectsQuery>,
) -> ApiResult<HttpResponse> {
    let ctx = auth::extract(&req)?;
    let branch_id = parse_branch(query.branch_id.as_deref())?;
    let filter = ObjectFilter {
        types: split_csv(&query.types),
        labels: query.label_filter.clone().into_filter(),
        status: query.status.clone(),
        key: query.key.clone(),
        ids: query
            .ids
            .as_ref()
            .map(|s| s.split(',').filter(|p| !p.is_empty()).map(parse_any_id).collect::<Result<Vec<_>, _>>())
            .transpose()?,
        property_filters: parse_property_filters(&query.filters)?,
        include_deleted: query.include_deleted.unwrap_or(false),
    };
    let order = match query.order.as_deref() {
        Some("asc") => Order::Asc,
        _ => Order::Desc,
    };
    let cursor = query
        .cursor
        .as_ref()
        .map(|raw| chronograph_core::cursor::Cursor::decode(raw))
        .transpose()?
        .map(|c| (c.created_at, c.id));
    let limit = state.config.resolve_page_limit(query.limit);

    let mut conn = state.pool.get().await.map_err(chronograph_storage::pg_error::from_pool)?;
    let page = gateway::list_head_objects(&mut conn, ctx.project_id, branch_id, &filter, cursor, limit, order).await?;

    Ok(HttpResponse::Ok().json(PageDto {
        items: page.items.into_iter().map(ObjectDto::from).collect(),
        has_more: page.has_more,
    }))
}

pub async fn get_object(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let ctx = auth::extract(&req)?;
    let id = parse_any_id(&path)?;
    let mut conn = state.pool.get().await.map_err(chronograph_storage::pg_error::from_pool)?;
    let object = gateway::get_by_id(&mut conn, ctx.project_id, id).await?;
    Ok(HttpResponse::Ok().json(ObjectDto::from(object)))
}

#[derive(Debug, Deserialize)]
pub struct CreateObjectBody {
    #[serde(rename = "type")]
    pub object_type: String,
    pub key: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub embedding: Option<Vec<f32>>,
    pub branch_id: Option<String>,
    pub actor_id: Option<String>,
    pub actor_type: Option<String>,
}

pub async fn create_object(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<CreateObjectBody>,
) -> ApiResult<HttpResponse> {
    let ctx = auth::extract(&req)?;
    let branch_id = parse_branch(body.branch_id.as_deref())?;
    let body = body.into_inner();

    if let Some(schema_provider) = &state.schema_provider {
        if let Err(err) = schema_provider.validate(&ctx.project_id.to_string(), &body.object_type, &body.properties).await {
            tracing::warn!(error = %err, "schema validation failed, skipping (§7 degrade-with-warning)");
        }
    }

    let create_req = CreateObjectRequest {
        object_type: body.object_type,
        key: body.key,
        status: body.status,
        properties: body.properties,
        labels: body.labels,
        embedding: body.embedding,
        actor_id: body.actor_id.or(Some(ctx.user_id.clone())),
        actor_type: body.actor_type.or(Some("user".to_string())),
    };

    let mut conn = state.pool.get().await.map_err(chronograph_storage::pg_error::from_pool)?;
    let (object, created) = match &create_req.key {
        Some(key) => {
            let outcome = versioning::upsert_object(
                &mut conn,
                ctx.project_id,
                branch_id,
                &create_req.object_type,
                key,
                &create_req.properties,
                create_req.status.clone(),
                &create_req.labels,
                create_req.actor_id.clone(),
                create_req.actor_type.clone(),
            )
            .await?;
            let created = outcome.is_created();
            (outcome.into_inner(), created)
        }
        None => (versioning::create_object(&mut conn, ctx.project_id, branch_id, &create_req).await?, true),
    };
    let status = if created { HttpResponse::Created() } else { HttpResponse::Ok() };
    Ok(status.json(ObjectDto::from(object)))
}

#[derive(Debug, Deserialize, Default)]
pub struct PatchObjectBody {
    #[serde(default)]
    pub properties: Map<String, Value>,
    pub status: Option<String>,
    pub labels: Option<Vec<String>>,
    #[serde(default)]
    pub replace_labels: bool,
    pub branch_id: Option<String>,
    pub actor_id: Option<String>,
    pub actor_type: Option<String>,
}

pub async fn patch_object(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<PatchObjectBody>,
) -> ApiResult<HttpResponse> {
    let ctx = auth::extract(&req)?;
    let entity_id = parse_entity_id(&path)?;
    let branch_id = parse_branch(body.branch_id.as_deref())?;
    let body = body.into_inner();
    let patch = PatchRequest {
        properties_overlay: body.properties,
        status: body.status,
        labels_overlay: body.labels,
        replace_labels: body.replace_labels,
        actor_id: body.actor_id.or(Some(ctx.user_id.clone())),
        actor_type: body.actor_type.or(Some("user".to_string())),
    };
    let mut conn = state.pool.get().await.map_err(chronograph_storage::pg_error::from_pool)?;
    let outcome = versioning::patch_object(&mut conn, ctx.project_id, branch_id, entity_id, &patch).await?;
    Ok(HttpResponse::Ok().json(ObjectDto::from(outcome.into_inner())))
}

fn parse_entity_id(raw: &str) -> Result<EntityId, ApiError> {
    EntityId::parse(raw).ok_or_else(|| ApiError(ChronographError::bad_request(format!("malformed id: {raw}"))))
}

#[derive(Debug, Deserialize, Default)]
pub struct BranchQuery {
    pub branch_id: Option<String>,
}

pub async fn delete_object(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<BranchQuery>,
) -> ApiResult<HttpResponse> {
    let ctx = auth::extract(&req)?;
    let entity_id = parse_entity_id(&path)?;
    let branch_id = parse_branch(query.branch_id.as_deref())?;
    let mut conn = state.pool.get().await.map_err(chronograph_storage::pg_error::from_pool)?;
    let object = versioning::soft_delete_object(&mut conn, ctx.project_id, branch_id, entity_id).await?;
    Ok(HttpResponse::Ok().json(ObjectDto::from(object)))
}

pub async fn restore_object(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<BranchQuery>,
) -> ApiResult<HttpResponse> {
    let ctx = auth::extract(&req)?;
    let entity_id = parse_entity_id(&path)?;
    let branch_id = parse_branch(query.branch_id.as_deref())?;
    let mut conn = state.pool.get().await.map_err(chronograph_storage::pg_error::from_pool)?;
    let object = versioning::restore_object(&mut conn, ctx.project_id, branch_id, entity_id).await?;
    Ok(HttpResponse::Ok().json(ObjectDto::from(object)))
}

/// `GET /objects/{id}/history`: walks `supersedes_id` backwards from the
/// named version (or the HEAD, if `id` names an entity) to `version=1`,
/// descending (§8 E1: "`[O2, O1]` in version-descending order").
pub async fn object_history(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<BranchQuery>,
) -> ApiResult<HttpResponse> {
    let ctx = auth::extract(&req)?;
    let id = parse_any_id(&path)?;
    let branch_id = parse_branch(query.branch_id.as_deref())?;
    let mut conn = state.pool.get().await.map_err(chronograph_storage::pg_error::from_pool)?;

    let named = gateway::get_by_id(&mut conn, ctx.project_id, id).await?;
    let history = gateway::history_for_entity(&mut conn, ctx.project_id, named.entity_id, branch_id).await?;
    Ok(HttpResponse::Ok().json(history.into_iter().map(ObjectDto::from).collect::<Vec<_>>()))
}

pub async fn object_edges(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let ctx = auth::extract(&req)?;
    let id = parse_any_id(&path)?;
    let mut conn = state.pool.get().await.map_err(chronograph_storage::pg_error::from_pool)?;
    let object = gateway::get_by_id(&mut conn, ctx.project_id, id).await?;
    let edges = gateway::edges_for(&mut conn, ctx.project_id, object.entity_id, Direction::Both, &[]).await?;
    Ok(HttpResponse::Ok().json(edges.into_iter().map(RelationshipDto::from).collect::<Vec<_>>()))
}

#[derive(Debug, Deserialize, Default)]
pub struct SimilarQuery {
    #[serde(rename = "type")]
    pub object_type: Option<String>,
    pub key_prefix: Option<String>,
    #[serde(flatten)]
    pub label_filter: LabelFilterDto,
    pub max_distance: Option<f64>,
    pub limit: Option<i64>,
    pub branch_id: Option<String>,
}

pub async fn object_similar(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<SimilarQuery>,
) -> ApiResult<HttpResponse> {
    let ctx = auth::extract(&req)?;
    let id = parse_any_id(&path)?;
    let branch_id = parse_branch(query.branch_id.as_deref())?;
    let limit = state.config.resolve_page_limit(query.limit);
    let mut conn = state.pool.get().await.map_err(chronograph_storage::pg_error::from_pool)?;
    let hits = search::similar_objects(
        &mut conn,
        ctx.project_id,
        branch_id,
        id,
        query.object_type.as_deref(),
        query.key_prefix.as_deref(),
        query.label_filter.clone().into_filter(),
        query.max_distance,
        state.config.vector_probes,
        limit,
    )
    .await?;
    search::spawn_access_tracking(Arc::clone(&state.pool), hits.iter().map(|h| h.object.version_id).collect());
    Ok(HttpResponse::Ok().json(
        hits.into_iter().map(|h| (ObjectDto::from(h.object), h.score)).collect::<Vec<_>>(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct BulkUpdateStatusBody {
    pub ids: Vec<Uuid>,
    pub status: Option<String>,
    pub branch_id: Option<String>,
}

/// §5 "Bulk writes", applied to patches rather than creation: a bounded
/// worker pool patches each named entity's `status` independently so one
/// failure doesn't roll back the rest.
pub async fn bulk_update_status(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<BulkUpdateStatusBody>,
) -> ApiResult<HttpResponse> {
    let ctx = auth::extract(&req)?;
    let branch_id = parse_branch(body.branch_id.as_deref())?;
    const MAX_WORKERS: usize = 20;
    let semaphore = Arc::new(tokio::sync::Semaphore::new(MAX_WORKERS));
    let mut handles = Vec::with_capacity(body.ids.len());
    for id in &body.ids {
        let entity_id = EntityId(*id);
        let pool = Arc::clone(&state.pool);
        let semaphore = Arc::clone(&semaphore);
        let project_id = ctx.project_id;
        let status = body.status.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await.expect("semaphore not closed");
            let mut conn = pool.get().await.map_err(chronograph_storage::pg_error::from_pool)?;
            let req = PatchRequest { status, ..Default::default() };
            versioning::patch_object(&mut conn, project_id, branch_id, entity_id, &req).await
        }));
    }
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(match handle.await {
            Ok(Ok(outcome)) => Ok(ObjectDto::from(outcome.into_inner())),
            Ok(Err(err)) => Err(err.code().to_string()),
            Err(join_err) => Err(format!("worker panicked: {join_err}")),
        });
    }
    Ok(HttpResponse::Ok().json(results.into_iter().map(|r| match r {
        Ok(dto) => serde_json::json!({"ok": true, "object": dto}),
        Err(msg) => serde_json::json!({"ok": false, "error": msg}),
    }).collect::<Vec<_>>()))
}

/// `GET /objects/tags`: the distinct set of labels currently in use by HEAD
/// objects. Not a named Storage Gateway operation (§4.1) -- a convenience
/// aggregation built from `list_head_objects` rather than a new gateway
/// primitive, since it never needs more than what's already paged through.
pub async fn object_tags(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<ListObjectsQuery>,
) -> ApiResult<HttpResponse> {
    let ctx = auth::extract(&req)?;
    let branch_id = parse_branch(query.branch_id.as_deref())?;
    let filter = ObjectFilter { types: split_csv(&query.types), ..Default::default() };
    let mut conn = state.pool.get().await.map_err(chronograph_storage::pg_error::from_pool)?;

    let mut tags: BTreeSet<String> = BTreeSet::new();
    let mut cursor: Option<(NaiveDateTime, VersionId)> = None;
    loop {
        let page = gateway::list_head_objects(&mut conn, ctx.project_id, branch_id, &filter, cursor, 500, Order::Asc).await?;
        let last = page.items.last().map(|o| (o.created_at, o.version_id));
        for object in &page.items {
            tags.extend(object.labels.iter().cloned());
        }
        if !page.has_more || last.is_none() {
            break;
        }
        cursor = last;
    }
    Ok(HttpResponse::Ok().json(tags.into_iter().collect::<Vec<_>>()))
}

#[derive(Debug, Deserialize)]
pub struct FtsQuery {
    pub q: String,
    pub branch_id: Option<String>,
    pub types: Option<String>,
    #[serde(flatten)]
    pub label_filter: LabelFilterDto,
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn objects_fts(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<FtsQuery>,
) -> ApiResult<HttpResponse> {
    let ctx = auth::extract(&req)?;
    let branch_id = parse_branch(query.branch_id.as_deref())?;
    let filter = ObjectFilter {
        types: split_csv(&query.types),
        labels: query.label_filter.clone().into_filter(),
        status: query.status.clone(),
        ..Default::default()
    };
    let limit = state.config.resolve_page_limit(query.limit);
    let offset = query.offset.unwrap_or(0);
    let mut conn = state.pool.get().await.map_err(chronograph_storage::pg_error::from_pool)?;
    let (hits, has_more) = search::lexical_search(&mut conn, ctx.project_id, branch_id, &query.q, &filter, limit, offset).await?;
    search::spawn_access_tracking(Arc::clone(&state.pool), hits.iter().map(|h| h.object.version_id).collect());
    Ok(HttpResponse::Ok().json(PageDto {
        items: hits.into_iter().map(|h| serde_json::json!({"object": ObjectDto::from(h.object), "score": h.score})).collect::<Vec<_>>(),
        has_more,
    }))
}

#[derive(Debug, Deserialize)]
pub struct VectorSearchBody {
    pub vector: Vec<f32>,
    pub branch_id: Option<String>,
    pub types: Option<Vec<String>>,
    #[serde(flatten)]
    pub label_filter: LabelFilterDto,
    pub status: Option<String>,
    pub max_distance: Option<f64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn objects_vector_search(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<VectorSearchBody>,
) -> ApiResult<HttpResponse> {
    let ctx = auth::extract(&req)?;
    let branch_id = parse_branch(body.branch_id.as_deref())?;
    let filter = ObjectFilter {
        types: body.types.clone().unwrap_or_default(),
        labels: body.label_filter.clone().into_filter(),
        status: body.status.clone(),
        ..Default::default()
    };
    let limit = state.config.resolve_page_limit(body.limit);
    let offset = body.offset.unwrap_or(0);
    let mut conn = state.pool.get().await.map_err(chronograph_storage::pg_error::from_pool)?;
    let (hits, has_more) = search::vector_search(
        &mut conn,
        ctx.project_id,
        branch_id,
        &body.vector,
        &filter,
        body.max_distance,
        state.config.vector_probes,
        limit,
        offset,
    )
    .await?;
    search::spawn_access_tracking(Arc::clone(&state.pool), hits.iter().map(|h| h.object.version_id).collect());
    Ok(HttpResponse::Ok().json(PageDto {
        items: hits.into_iter().map(|h| serde_json::json!({"object": ObjectDto::from(h.object), "score": h.score})).collect::<Vec<_>>(),
        has_more,
    }))
}
