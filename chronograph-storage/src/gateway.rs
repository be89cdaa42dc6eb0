//! Storage Gateway (§4.1).
//!
//! Parameterised reads/writes against `objects`, `relationships`,
//! `branches`, `branch_lineage`. Every operation here takes an explicit
//! connection so callers control transaction scope (§4.1 "Atomic
//! Transactions" design note, grounded on the teacher's own note in
//! `tycho-storage::postgres::mod`: "direct connection to the database ...
//! isn't handled within these common-purpose implementations").

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use diesel_async::AsyncPgConnection;
use uuid::Uuid;

use chronograph_core::filter::PropertyFilter;
use chronograph_core::ids::{AnyId, BranchId, EntityId, ProjectId, VersionId};
use chronograph_core::model::{Branch, BranchLineageRow, Direction, LabelFilter, Object, Relationship};
use chronograph_core::ChronographError;

use crate::orm::{
    DemoteObject, DemoteRelationship, NewObject, NewRelationship, OrmBranch, OrmBranchLineage,
    OrmObject, OrmRelationship, SetRelationshipEmbedding, TouchObjectAccess,
};
use crate::pg_error::from_diesel;
use crate::schema::{branch_lineage, branches, objects, relationships};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectFilter {
    pub types: Vec<String>,
    pub labels: Option<LabelFilter>,
    pub status: Option<String>,
    pub key: Option<String>,
    pub ids: Option<Vec<AnyId>>,
    pub property_filters: Vec<PropertyFilter>,
    pub include_deleted: bool,
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
}

/// Builds the project/branch/type/status/key/id portion of an object query
/// as a boxed, reusable predicate. Property filters and label filters are
/// evaluated application-side after fetch, since they address nested JSONB
/// paths and a Postgres array respectively and are cheap to apply to a
/// page-sized result set; this mirrors the teacher's pattern of doing
/// structural filtering in SQL and leaving row-shaped decisions (see
/// `_decode_protocol_states`) to the application layer.
pub(crate) fn base_query<'a>(
    project_id: ProjectId,
    branch_id: Option<BranchId>,
    filter: &'a ObjectFilter,
) -> objects::BoxedQuery<'a, diesel::pg::Pg> {
    let mut query = objects::table
        .filter(objects::project_id.eq(project_id.0))
        .into_boxed();

    query = match branch_id {
        Some(b) => query.filter(objects::branch_id.eq(b.0)),
        None => query.filter(objects::branch_id.is_null()),
    };

    if !filter.include_deleted {
        query = query.filter(objects::deleted_at.is_null());
    }
    if !filter.types.is_empty() {
        query = query.filter(objects::object_type.eq_any(filter.types.clone()));
    }
    if let Some(status) = &filter.status {
        query = query.filter(objects::status.eq(status.clone()));
    }
    if let Some(key) = &filter.key {
        query = query.filter(objects::key.eq(key.clone()));
    }
    if let Some(ids) = &filter.ids {
        let uuids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        query = query.filter(
            objects::version_id
                .eq_any(uuids.clone())
                .or(objects::entity_id.eq_any(uuids)),
        );
    }
    query
}

/// `list_head_objects(filter, cursor, limit, order)` (§4.1). Returns at most
/// `limit + 1` rows so the caller can derive `has_more` without a second
/// round trip.
pub async fn list_head_objects(
    conn: &mut AsyncPgConnection,
    project_id: ProjectId,
    branch_id: Option<BranchId>,
    filter: &ObjectFilter,
    cursor: Option<(NaiveDateTime, VersionId)>,
    limit: i64,
    order: Order,
) -> Result<Page<Object>, ChronographError> {
    let mut query = base_query(project_id, branch_id, filter).filter(objects::supersedes_id.is_null());

    query = match (order, cursor) {
        (Order::Asc, Some((ts, id))) => query.filter(
            objects::created_at
                .gt(ts)
                .or(objects::created_at.eq(ts).and(objects::version_id.gt(id.0))),
        ),
        (Order::Desc, Some((ts, id))) => query.filter(
            objects::created_at
                .lt(ts)
                .or(objects::created_at.eq(ts).and(objects::version_id.lt(id.0))),
        ),
        _ => query,
    };

    query = match order {
        Order::Asc => query.order((objects::created_at.asc(), objects::version_id.asc())),
        Order::Desc => query.order((objects::created_at.desc(), objects::version_id.desc())),
    };

    let rows: Vec<OrmObject> = query
        .select(OrmObject::as_select())
        .limit(limit + 1)
        .load(conn)
        .await
        .map_err(|e| from_diesel(e, "Object", "list"))?;

    let mut objects: Vec<Object> = rows.into_iter().map(Object::from).collect();
    objects.retain(|o| {
        chronograph_core::filter::matches_all(&filter.property_filters, &o.properties)
            && filter.labels.as_ref().is_none_or(|l| l.matches(&o.labels))
    });

    let has_more = objects.len() as i64 > limit;
    objects.truncate(limit as usize);
    Ok(Page { items: objects, has_more })
}

/// `count_head_objects(filter)` (§4.1). Applies the same conjunction as
/// `list_head_objects`; since property/label filters run application-side,
/// this loads HEAD rows and counts matches rather than issuing `COUNT(*)`
/// directly -- acceptable for the HEAD-scoped working sets this store
/// targets, and kept symmetric with `list_head_objects`'s filter semantics.
pub async fn count_head_objects(
    conn: &mut AsyncPgConnection,
    project_id: ProjectId,
    branch_id: Option<BranchId>,
    filter: &ObjectFilter,
) -> Result<i64, ChronographError> {
    let query = base_query(project_id, branch_id, filter).filter(objects::supersedes_id.is_null());
    let rows: Vec<OrmObject> = query
        .select(OrmObject::as_select())
        .load(conn)
        .await
        .map_err(|e| from_diesel(e, "Object", "count"))?;
    let count = rows
        .into_iter()
        .map(Object::from)
        .filter(|o| {
            chronograph_core::filter::matches_all(&filter.property_filters, &o.properties)
                && filter.labels.as_ref().is_none_or(|l| l.matches(&o.labels))
        })
        .count();
    Ok(count as i64)
}

/// `get_by_id(project, id)` (§4.1): matches `version_id OR entity_id`; when
/// several rows match (an id that names an entity with history), prefers the
/// HEAD row.
pub async fn get_by_id(
    conn: &mut AsyncPgConnection,
    project_id: ProjectId,
    id: AnyId,
) -> Result<Object, ChronographError> {
    let mut rows: Vec<OrmObject> = objects::table
        .filter(objects::project_id.eq(project_id.0))
        .filter(
            objects::version_id
                .eq(id.as_uuid())
                .or(objects::entity_id.eq(id.as_uuid())),
        )
        .select(OrmObject::as_select())
        .load(conn)
        .await
        .map_err(|e| from_diesel(e, "Object", &id.to_string()))?;

    rows.sort_by_key(|r| r.supersedes_id.is_some());
    rows.into_iter()
        .next()
        .map(Object::from)
        .ok_or_else(|| ChronographError::not_found("Object", id.to_string()))
}

/// `get_head_by_entity(project, entity_id, branch)` (§4.1): strict HEAD
/// lookup, no fallback to non-HEAD rows.
pub async fn get_head_by_entity(
    conn: &mut AsyncPgConnection,
    project_id: ProjectId,
    entity_id: EntityId,
    branch_id: Option<BranchId>,
) -> Result<Object, ChronographError> {
    let mut query = objects::table
        .filter(objects::project_id.eq(project_id.0))
        .filter(objects::entity_id.eq(entity_id.0))
        .filter(objects::supersedes_id.is_null())
        .into_boxed();
    query = match branch_id {
        Some(b) => query.filter(objects::branch_id.eq(b.0)),
        None => query.filter(objects::branch_id.is_null()),
    };
    query
        .select(OrmObject::as_select())
        .first(conn)
        .await
        .map(Object::from)
        .map_err(|e| from_diesel(e, "Object", &entity_id.to_string()))
}

/// `find_head_by_type_key(project, branch, type, key)` (§4.1): nil (`None`)
/// is not an error, it just means no such HEAD exists yet.
pub async fn find_head_by_type_key(
    conn: &mut AsyncPgConnection,
    project_id: ProjectId,
    branch_id: Option<BranchId>,
    object_type: &str,
    key: &str,
) -> Result<Option<Object>, ChronographError> {
    let mut query = objects::table
        .filter(objects::project_id.eq(project_id.0))
        .filter(objects::object_type.eq(object_type))
        .filter(objects::key.eq(key))
        .filter(objects::supersedes_id.is_null())
        .into_boxed();
    query = match branch_id {
        Some(b) => query.filter(objects::branch_id.eq(b.0)),
        None => query.filter(objects::branch_id.is_null()),
    };
    query
        .select(OrmObject::as_select())
        .first(conn)
        .await
        .optional()
        .map(|opt| opt.map(Object::from))
        .map_err(|e| from_diesel(e, "Object", key))
}

/// `create(object)` (§4.1): first version of a fresh entity.
pub async fn create_object(conn: &mut AsyncPgConnection, object: &Object) -> Result<Object, ChronographError> {
    let new_row = NewObject::from(object);
    diesel::insert_into(objects::table)
        .values(&new_row)
        .execute(conn)
        .await
        .map_err(|e| from_diesel(e, "Object", &object.entity_id.to_string()))?;
    Ok(object.clone())
}

/// `create_version(prev_head, new_version)` (§4.1): demotes `prev_head`
/// then inserts `new_version` in that order, because the partial unique
/// index on `(project_id, type, key) WHERE supersedes_id IS NULL` would
/// otherwise reject the insert while both rows claim HEAD simultaneously.
/// Caller is responsible for having taken the relevant advisory lock and for
/// running this inside a transaction alongside any other writes for the
/// same logical operation (e.g. an inverse relationship).
pub async fn create_version(
    conn: &mut AsyncPgConnection,
    prev_head: &Object,
    new_version: &Object,
) -> Result<Object, ChronographError> {
    diesel::update(objects::table.filter(objects::version_id.eq(prev_head.version_id.0)))
        .set(DemoteObject { supersedes_id: Some(new_version.version_id.0) })
        .execute(conn)
        .await
        .map_err(|e| from_diesel(e, "Object", &prev_head.version_id.to_string()))?;

    create_object(conn, new_version).await
}

/// Advisory, not a new version (§3 "Lifecycle"): updates `last_accessed_at`
/// in place for a batch of HEAD rows after a search returns (§4.3 "Access
/// tracking"). Runs in its own detached task by convention (§5
/// "Cancellation"); failures are logged by the caller, not surfaced.
pub async fn touch_last_accessed(
    conn: &mut AsyncPgConnection,
    version_ids: &[VersionId],
) -> Result<(), ChronographError> {
    if version_ids.is_empty() {
        return Ok(());
    }
    let uuids: Vec<Uuid> = version_ids.iter().map(|v| v.0).collect();
    diesel::update(objects::table.filter(objects::version_id.eq_any(uuids)))
        .set(TouchObjectAccess { last_accessed_at: Some(Utc::now().naive_utc()) })
        .execute(conn)
        .await
        .map_err(|e| from_diesel(e, "Object", "touch_last_accessed"))?;
    Ok(())
}

/// `edges_for(entity, direction, types)` (§4.1): HEAD, non-deleted edges.
pub async fn edges_for(
    conn: &mut AsyncPgConnection,
    project_id: ProjectId,
    entity_id: EntityId,
    direction: Direction,
    types: &[String],
) -> Result<Vec<Relationship>, ChronographError> {
    let mut query = relationships::table
        .filter(relationships::project_id.eq(project_id.0))
        .filter(relationships::supersedes_id.is_null())
        .filter(relationships::deleted_at.is_null())
        .into_boxed();

    query = match direction {
        Direction::Out => query.filter(relationships::src_entity_id.eq(entity_id.0)),
        Direction::In => query.filter(relationships::dst_entity_id.eq(entity_id.0)),
        Direction::Both => query.filter(
            relationships::src_entity_id
                .eq(entity_id.0)
                .or(relationships::dst_entity_id.eq(entity_id.0)),
        ),
    };
    if !types.is_empty() {
        query = query.filter(relationships::relationship_type.eq_any(types.to_vec()));
    }

    let rows: Vec<OrmRelationship> = query
        .select(OrmRelationship::as_select())
        .load(conn)
        .await
        .map_err(|e| from_diesel(e, "Relationship", &entity_id.to_string()))?;
    Ok(rows.into_iter().map(Relationship::from).collect())
}

/// Bulk form of `edges_for` used by the Traversal Engine (§4.4 "Round" step
/// 1): fetches HEAD, non-deleted edges touching any entity in `frontier` in
/// one round trip instead of one query per frontier member.
pub async fn edges_for_many(
    conn: &mut AsyncPgConnection,
    project_id: ProjectId,
    frontier: &[EntityId],
    direction: Direction,
    types: &[String],
) -> Result<Vec<Relationship>, ChronographError> {
    if frontier.is_empty() {
        return Ok(Vec::new());
    }
    let uuids: Vec<Uuid> = frontier.iter().map(|e| e.0).collect();
    let mut query = relationships::table
        .filter(relationships::project_id.eq(project_id.0))
        .filter(relationships::supersedes_id.is_null())
        .filter(relationships::deleted_at.is_null())
        .into_boxed();

    query = match direction {
        Direction::Out => query.filter(relationships::src_entity_id.eq_any(uuids)),
        Direction::In => query.filter(relationships::dst_entity_id.eq_any(uuids)),
        Direction::Both => query.filter(
            relationships::src_entity_id
                .eq_any(uuids.clone())
                .or(relationships::dst_entity_id.eq_any(uuids)),
        ),
    };
    if !types.is_empty() {
        query = query.filter(relationships::relationship_type.eq_any(types.to_vec()));
    }

    let rows: Vec<OrmRelationship> = query
        .select(OrmRelationship::as_select())
        .load(conn)
        .await
        .map_err(|e| from_diesel(e, "Relationship", "edges_for_many"))?;
    Ok(rows.into_iter().map(Relationship::from).collect())
}

/// Bulk HEAD object fetch by `entity_id`, used by the Traversal Engine
/// (§4.4 "Round" step 4) to resolve a round's discovered neighbours in one
/// query. Rows are not deleted-filtered by default; callers that need
/// non-deleted-only neighbours filter the `include_deleted = false` case
/// themselves, mirroring `list_head_objects`'s own default.
pub async fn get_heads_by_entities(
    conn: &mut AsyncPgConnection,
    project_id: ProjectId,
    branch_id: Option<BranchId>,
    entities: &[EntityId],
) -> Result<Vec<Object>, ChronographError> {
    if entities.is_empty() {
        return Ok(Vec::new());
    }
    let uuids: Vec<Uuid> = entities.iter().map(|e| e.0).collect();
    let mut query = objects::table
        .filter(objects::project_id.eq(project_id.0))
        .filter(objects::entity_id.eq_any(uuids))
        .filter(objects::supersedes_id.is_null())
        .filter(objects::deleted_at.is_null())
        .into_boxed();
    query = match branch_id {
        Some(b) => query.filter(objects::branch_id.eq(b.0)),
        None => query.filter(objects::branch_id.is_null()),
    };
    let rows: Vec<OrmObject> = query
        .select(OrmObject::as_select())
        .load(conn)
        .await
        .map_err(|e| from_diesel(e, "Object", "get_heads_by_entities"))?;
    Ok(rows.into_iter().map(Object::from).collect())
}

/// `GET /objects/{id}/history` (§6, §8 E1): every version of `entity_id`,
/// newest first. Unlike every other object query, this deliberately does not
/// filter `supersedes_id IS NULL` or `deleted_at IS NULL` -- history means
/// the whole chain, including its tombstones.
pub async fn history_for_entity(
    conn: &mut AsyncPgConnection,
    project_id: ProjectId,
    entity_id: EntityId,
    branch_id: Option<BranchId>,
) -> Result<Vec<Object>, ChronographError> {
    let mut query = objects::table
        .filter(objects::project_id.eq(project_id.0))
        .filter(objects::entity_id.eq(entity_id.0))
        .into_boxed();
    query = match branch_id {
        Some(b) => query.filter(objects::branch_id.eq(b.0)),
        None => query.filter(objects::branch_id.is_null()),
    };
    let rows: Vec<OrmObject> = query
        .select(OrmObject::as_select())
        .order(objects::version.desc())
        .load(conn)
        .await
        .map_err(|e| from_diesel(e, "Object", &entity_id.to_string()))?;
    Ok(rows.into_iter().map(Object::from).collect())
}

/// All HEAD, non-deleted objects for a branch, unpaginated (§4.5 "Load HEAD
/// maps"). The Merge Analyser needs the complete set to classify every
/// `entity_id`, not a page of it.
pub async fn all_head_objects(
    conn: &mut AsyncPgConnection,
    project_id: ProjectId,
    branch_id: Option<BranchId>,
) -> Result<Vec<Object>, ChronographError> {
    let mut query = objects::table
        .filter(objects::project_id.eq(project_id.0))
        .filter(objects::supersedes_id.is_null())
        .filter(objects::deleted_at.is_null())
        .into_boxed();
    query = match branch_id {
        Some(b) => query.filter(objects::branch_id.eq(b.0)),
        None => query.filter(objects::branch_id.is_null()),
    };
    let rows: Vec<OrmObject> = query
        .select(OrmObject::as_select())
        .load(conn)
        .await
        .map_err(|e| from_diesel(e, "Object", "all_head_objects"))?;
    Ok(rows.into_iter().map(Object::from).collect())
}

/// All HEAD, non-deleted relationships for a branch, unpaginated (§4.5).
pub async fn all_head_relationships(
    conn: &mut AsyncPgConnection,
    project_id: ProjectId,
    branch_id: Option<BranchId>,
) -> Result<Vec<Relationship>, ChronographError> {
    let mut query = relationships::table
        .filter(relationships::project_id.eq(project_id.0))
        .filter(relationships::supersedes_id.is_null())
        .filter(relationships::deleted_at.is_null())
        .into_boxed();
    query = match branch_id {
        Some(b) => query.filter(relationships::branch_id.eq(b.0)),
        None => query.filter(relationships::branch_id.is_null()),
    };
    let rows: Vec<OrmRelationship> = query
        .select(OrmRelationship::as_select())
        .load(conn)
        .await
        .map_err(|e| from_diesel(e, "Relationship", "all_head_relationships"))?;
    Ok(rows.into_iter().map(Relationship::from).collect())
}

/// `validate_endpoints(project, src_arg, dst_arg)` (§4.1): resolves each
/// argument to a HEAD object, enforces invariants 5 and 6.
pub async fn validate_endpoints(
    conn: &mut AsyncPgConnection,
    project_id: ProjectId,
    src: AnyId,
    dst: AnyId,
) -> Result<(Object, Object), ChronographError> {
    let src_obj = get_by_id(conn, project_id, src).await?;
    let dst_obj = get_by_id(conn, project_id, dst).await?;

    if src_obj.is_tombstone() || dst_obj.is_tombstone() {
        return Err(ChronographError::bad_request("relationship endpoint is deleted"));
    }
    if src_obj.project_id != dst_obj.project_id {
        return Err(ChronographError::bad_request("relationship endpoints must share a project"));
    }
    if src_obj.entity_id == dst_obj.entity_id {
        return Err(ChronographError::bad_request("self-loops are not allowed"));
    }
    Ok((src_obj, dst_obj))
}

pub async fn create_relationship(
    conn: &mut AsyncPgConnection,
    relationship: &Relationship,
) -> Result<Relationship, ChronographError> {
    let new_row = NewRelationship::from(relationship);
    diesel::insert_into(relationships::table)
        .values(&new_row)
        .execute(conn)
        .await
        .map_err(|e| from_diesel(e, "Relationship", &relationship.entity_id.to_string()))?;
    Ok(relationship.clone())
}

pub async fn create_relationship_version(
    conn: &mut AsyncPgConnection,
    prev_head: &Relationship,
    new_version: &Relationship,
) -> Result<Relationship, ChronographError> {
    diesel::update(relationships::table.filter(relationships::version_id.eq(prev_head.version_id.0)))
        .set(DemoteRelationship { supersedes_id: Some(new_version.version_id.0) })
        .execute(conn)
        .await
        .map_err(|e| from_diesel(e, "Relationship", &prev_head.version_id.to_string()))?;

    create_relationship(conn, new_version).await
}

/// Fills in a relationship's embedding after the fact (§11 "Triplet text
/// generation"): the embedder call happens off the request's critical path,
/// so the row is inserted first with `embedding = NULL` and patched once the
/// embedder responds.
pub async fn set_relationship_embedding(
    conn: &mut AsyncPgConnection,
    version_id: VersionId,
    embedding: Vec<f32>,
) -> Result<(), ChronographError> {
    diesel::update(relationships::table.filter(relationships::version_id.eq(version_id.0)))
        .set(SetRelationshipEmbedding { embedding: Some(pgvector::Vector::from(embedding)) })
        .execute(conn)
        .await
        .map_err(|e| from_diesel(e, "Relationship", &version_id.to_string()))?;
    Ok(())
}

/// HEAD lookup for a relationship by its own `entity_id`, used by the HTTP
/// layer's get/patch/delete routes (§6) where the caller addresses a
/// relationship directly rather than by `(type, src, dst)`.
pub async fn find_head_relationship_by_entity(
    conn: &mut AsyncPgConnection,
    project_id: ProjectId,
    entity_id: EntityId,
) -> Result<Relationship, ChronographError> {
    relationships::table
        .filter(relationships::project_id.eq(project_id.0))
        .filter(relationships::entity_id.eq(entity_id.0))
        .filter(relationships::supersedes_id.is_null())
        .select(OrmRelationship::as_select())
        .first(conn)
        .await
        .optional()
        .map_err(|e| from_diesel(e, "Relationship", &entity_id.to_string()))?
        .map(Relationship::from)
        .ok_or_else(|| ChronographError::not_found("Relationship", entity_id.to_string()))
}

/// `GET /relationships/{id}/history` (§6): every version of `entity_id`,
/// newest first, tombstones included -- the relationship analogue of
/// `history_for_entity`.
pub async fn history_for_relationship(
    conn: &mut AsyncPgConnection,
    project_id: ProjectId,
    entity_id: EntityId,
    branch_id: Option<BranchId>,
) -> Result<Vec<Relationship>, ChronographError> {
    let mut query = relationships::table
        .filter(relationships::project_id.eq(project_id.0))
        .filter(relationships::entity_id.eq(entity_id.0))
        .into_boxed();
    query = match branch_id {
        Some(b) => query.filter(relationships::branch_id.eq(b.0)),
        None => query.filter(relationships::branch_id.is_null()),
    };
    let rows: Vec<OrmRelationship> = query
        .select(OrmRelationship::as_select())
        .order(relationships::version.desc())
        .load(conn)
        .await
        .map_err(|e| from_diesel(e, "Relationship", &entity_id.to_string()))?;
    Ok(rows.into_iter().map(Relationship::from).collect())
}

pub async fn find_head_relationship(
    conn: &mut AsyncPgConnection,
    project_id: ProjectId,
    relationship_type: &str,
    src_entity_id: EntityId,
    dst_entity_id: EntityId,
) -> Result<Option<Relationship>, ChronographError> {
    relationships::table
        .filter(relationships::project_id.eq(project_id.0))
        .filter(relationships::relationship_type.eq(relationship_type))
        .filter(relationships::src_entity_id.eq(src_entity_id.0))
        .filter(relationships::dst_entity_id.eq(dst_entity_id.0))
        .filter(relationships::supersedes_id.is_null())
        .select(OrmRelationship::as_select())
        .first(conn)
        .await
        .optional()
        .map(|opt| opt.map(Relationship::from))
        .map_err(|e| from_diesel(e, "Relationship", relationship_type))
}

/// §11 "Branch creation/closure-table maintenance": inserts the branch row
/// then the closure-table rows for every ancestor of the parent branch plus
/// the self-row at depth 0.
pub async fn create_branch(
    conn: &mut AsyncPgConnection,
    project_id: ProjectId,
    name: &str,
    parent_branch_id: Option<BranchId>,
) -> Result<Branch, ChronographError> {
    let branch = Branch {
        id: BranchId::new(),
        project_id,
        name: name.to_string(),
        parent_branch_id,
        created_at: Utc::now().naive_utc(),
    };
    let new_row = OrmBranch {
        id: branch.id.0,
        project_id: branch.project_id.0,
        name: branch.name.clone(),
        parent_branch_id: branch.parent_branch_id.map(Uuid::from),
        created_at: branch.created_at,
    };
    diesel::insert_into(branches::table)
        .values(&new_row)
        .execute(conn)
        .await
        .map_err(|e| from_diesel(e, "Branch", &branch.id.to_string()))?;

    let mut lineage_rows = vec![OrmBranchLineage {
        branch_id: branch.id.0,
        ancestor_branch_id: branch.id.0,
        depth: 0,
    }];
    if let Some(parent) = parent_branch_id {
        let parent_ancestors: Vec<OrmBranchLineage> = branch_lineage::table
            .filter(branch_lineage::branch_id.eq(parent.0))
            .select(OrmBranchLineage::as_select())
            .load(conn)
            .await
            .map_err(|e| from_diesel(e, "BranchLineage", &parent.to_string()))?;
        for ancestor in parent_ancestors {
            lineage_rows.push(OrmBranchLineage {
                branch_id: branch.id.0,
                ancestor_branch_id: ancestor.ancestor_branch_id,
                depth: ancestor.depth + 1,
            });
        }
    }
    diesel::insert_into(branch_lineage::table)
        .values(&lineage_rows)
        .execute(conn)
        .await
        .map_err(|e| from_diesel(e, "BranchLineage", &branch.id.to_string()))?;

    Ok(branch)
}

/// §9 "open questions": read by `IsAncestorBranch` but not consulted by
/// merge classification.
pub async fn is_ancestor_branch(
    conn: &mut AsyncPgConnection,
    branch_id: BranchId,
    candidate_ancestor: BranchId,
) -> Result<bool, ChronographError> {
    let exists: Option<OrmBranchLineage> = branch_lineage::table
        .filter(branch_lineage::branch_id.eq(branch_id.0))
        .filter(branch_lineage::ancestor_branch_id.eq(candidate_ancestor.0))
        .select(OrmBranchLineage::as_select())
        .first(conn)
        .await
        .optional()
        .map_err(|e| from_diesel(e, "BranchLineage", &branch_id.to_string()))?;
    Ok(exists.is_some())
}
