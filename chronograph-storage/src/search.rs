//! Search Engine (§4.3).
//!
//! Lexical search rides the database-generated `fts` column; vector search
//! rides `pgvector`'s cosine operator; hybrid search fuses both channels
//! with z-score normalisation and a sigmoid squash, entirely in this crate
//! (no SQL-side fusion) since the two channels come from structurally
//! different queries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use diesel::dsl::sql;
use diesel::prelude::*;
use diesel_async::pooled_connection::deadpool::Pool;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use diesel_full_text_search::{TsQuery, TsVector, TsVectorExtensions};
use pgvector::{Vector, VectorExpressionMethods};
use tracing::warn;

use chronograph_core::ids::{AnyId, BranchId, ProjectId, VersionId};
use chronograph_core::model::{LabelFilter, Object};
use chronograph_core::ChronographError;

use crate::gateway::{self, ObjectFilter};
use crate::orm::OrmObject;
use crate::pg_error::from_diesel;
use crate::schema::objects;
use crate::vector_probe::with_boosted_recall;

diesel::define_sql_function! {
    /// `websearch_to_tsquery('simple', query)` -- Postgres' web-search-style
    /// query parser, not modelled by `diesel_full_text_search` itself.
    fn websearch_to_tsquery(lang: diesel::sql_types::Text, query: diesel::sql_types::Text) -> TsQuery;
}

diesel::define_sql_function! {
    /// `ts_rank(doc, query)`.
    fn ts_rank(doc: TsVector, query: TsQuery) -> diesel::sql_types::Double;
}

/// One hit from either channel before fusion: the object plus its raw,
/// channel-native score (rank for lexical, similarity for vector).
#[derive(Debug, Clone)]
pub struct ScoredObject {
    pub object: Object,
    pub score: f64,
}

/// `Lexical.` `ts_rank(fts, websearch_to_tsquery('simple', q))` against
/// HEAD, not-deleted rows, ordered rank descending, paged with
/// `(limit, offset)` (§4.3).
pub async fn lexical_search(
    conn: &mut AsyncPgConnection,
    project_id: ProjectId,
    branch_id: Option<BranchId>,
    query_text: &str,
    filter: &ObjectFilter,
    limit: i64,
    offset: i64,
) -> Result<(Vec<ScoredObject>, bool), ChronographError> {
    let tsquery = websearch_to_tsquery("simple", query_text.to_string());
    let rank = ts_rank(objects::fts, websearch_to_tsquery("simple", query_text.to_string()));

    let query = gateway::base_query(project_id, branch_id, filter)
        .filter(objects::supersedes_id.is_null())
        .filter(objects::fts.matches(tsquery));

    let rows: Vec<(OrmObject, f64)> = query
        .select((OrmObject::as_select(), rank))
        .order(rank.desc())
        .offset(offset)
        .limit(limit + 1)
        .load(conn)
        .await
        .map_err(|e| from_diesel(e, "Object", "lexical_search"))?;

    let mut hits: Vec<ScoredObject> = rows
        .into_iter()
        .map(|(row, score)| ScoredObject { object: Object::from(row), score })
        .filter(|hit| {
            chronograph_core::filter::matches_all(&filter.property_filters, &hit.object.properties)
                && filter.labels.as_ref().is_none_or(|l| l.matches(&hit.object.labels))
        })
        .collect();

    let has_more = hits.len() as i64 > limit;
    hits.truncate(limit as usize);
    Ok((hits, has_more))
}

/// `Vector.` Cosine distance `embedding <=> q`; similarity reported as
/// `1 - distance`. Runs inside a probe-boosted read-only transaction
/// (§4.1 "Vector-recall tuning").
pub async fn vector_search(
    conn: &mut AsyncPgConnection,
    project_id: ProjectId,
    branch_id: Option<BranchId>,
    query_vector: &[f32],
    filter: &ObjectFilter,
    max_distance: Option<f64>,
    probes: u32,
    limit: i64,
    offset: i64,
) -> Result<(Vec<ScoredObject>, bool), ChronographError> {
    let query_vector = query_vector.to_vec();
    let project_id = project_id;
    let branch_id = branch_id;
    let filter = filter.clone();

    with_boosted_recall(conn, probes, move |conn| {
        Box::pin(async move {
            let distance = objects::embedding.cosine_distance(Vector::from(query_vector.clone()));
            let mut query = gateway::base_query(project_id, branch_id, &filter)
                .filter(objects::supersedes_id.is_null())
                .filter(objects::embedding.is_not_null())
                .into_boxed();
            if let Some(max_distance) = max_distance {
                query = query.filter(distance.le(max_distance));
            }

            let rows: Vec<(OrmObject, f64)> = query
                .select((OrmObject::as_select(), distance))
                .order(distance.asc())
                .offset(offset)
                .limit(limit + 1)
                .load(conn)
                .await
                .map_err(crate::pg_error::PgError::from)?;

            let mut hits: Vec<ScoredObject> = rows
                .into_iter()
                .map(|(row, distance)| ScoredObject { object: Object::from(row), score: 1.0 - distance })
                .filter(|hit| {
                    chronograph_core::filter::matches_all(&filter.property_filters, &hit.object.properties)
                        && filter.labels.as_ref().is_none_or(|l| l.matches(&hit.object.labels))
                })
                .collect();

            let has_more = hits.len() as i64 > limit;
            hits.truncate(limit as usize);
            Ok((hits, has_more))
        })
    })
    .await
}

/// Per-channel telemetry emitted when hybrid search runs with `debug=true`
/// (§4.3 "Hybrid fusion").
#[derive(Debug, Clone, Default)]
pub struct ChannelStats {
    pub mean: f64,
    pub std: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct HybridDebugInfo {
    pub lexical: Option<ChannelStats>,
    pub vector: Option<ChannelStats>,
    pub lexical_latency_ms: Option<f64>,
    pub vector_latency_ms: Option<f64>,
    pub fusion_latency_ms: f64,
}

#[derive(Debug, Clone)]
pub struct HybridHit {
    pub object: Object,
    pub fused_score: f64,
}

fn channel_stats(scores: &[f64]) -> ChannelStats {
    let count = scores.len();
    if count == 0 {
        return ChannelStats::default();
    }
    let mean = scores.iter().sum::<f64>() / count as f64;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / count as f64;
    ChannelStats { mean, std: variance.sqrt(), count }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// `z = (x - mean) / std`, then `sigmoid(z)`. A zero-variance channel (every
/// candidate scored identically) maps every item to `z = 0`, i.e.
/// `sigmoid(0) = 0.5`, rather than dividing by zero.
fn normalise(score: f64, stats: &ChannelStats) -> f64 {
    if stats.std == 0.0 {
        return sigmoid(0.0);
    }
    sigmoid((score - stats.mean) / stats.std)
}

/// Weights normalised to sum to 1 (defaults 0.5/0.5) (§4.3).
pub fn normalise_weights(w_lex: f64, w_vec: f64) -> (f64, f64) {
    let sum = w_lex + w_vec;
    if sum <= 0.0 {
        return (0.5, 0.5);
    }
    (w_lex / sum, w_vec / sum)
}

/// `Hybrid fusion` (§4.3). Fetches at most `3 * limit` candidates from each
/// available channel, z-score/sigmoid normalises per channel, fuses with
/// `w_lex * n_lex + w_vec * n_vec`, sorts descending, pages with
/// `(limit, offset)`.
#[allow(clippy::too_many_arguments)]
pub async fn hybrid_search(
    conn: &mut AsyncPgConnection,
    project_id: ProjectId,
    branch_id: Option<BranchId>,
    query_text: Option<&str>,
    query_vector: Option<&[f32]>,
    filter: &ObjectFilter,
    w_lex: f64,
    w_vec: f64,
    vector_probes: u32,
    limit: i64,
    offset: i64,
    debug: bool,
) -> Result<(Vec<HybridHit>, bool, Option<HybridDebugInfo>), ChronographError> {
    let fetch_limit = 3 * limit;
    let mut debug_info = HybridDebugInfo::default();

    let lexical_hits = if let Some(text) = query_text {
        let started = Instant::now();
        let (hits, _) = lexical_search(conn, project_id, branch_id, text, filter, fetch_limit, 0).await?;
        if debug {
            debug_info.lexical_latency_ms = Some(started.elapsed().as_secs_f64() * 1000.0);
        }
        Some(hits)
    } else {
        None
    };

    let vector_hits = if let Some(vector) = query_vector {
        let started = Instant::now();
        let (hits, _) =
            vector_search(conn, project_id, branch_id, vector, filter, None, vector_probes, fetch_limit, 0).await?;
        if debug {
            debug_info.vector_latency_ms = Some(started.elapsed().as_secs_f64() * 1000.0);
        }
        Some(hits)
    } else {
        None
    };

    let fusion_started = Instant::now();
    let lexical_stats = lexical_hits
        .as_ref()
        .map(|hits| channel_stats(&hits.iter().map(|h| h.score).collect::<Vec<_>>()));
    let vector_stats = vector_hits
        .as_ref()
        .map(|hits| channel_stats(&hits.iter().map(|h| h.score).collect::<Vec<_>>()));

    let (w_lex, w_vec) = normalise_weights(w_lex, w_vec);

    let mut by_version: HashMap<VersionId, (Object, f64, f64)> = HashMap::new();
    if let (Some(hits), Some(stats)) = (&lexical_hits, &lexical_stats) {
        for hit in hits {
            let n = normalise(hit.score, stats);
            by_version
                .entry(hit.object.version_id)
                .or_insert_with(|| (hit.object.clone(), 0.0, 0.0))
                .1 = n;
        }
    }
    if let (Some(hits), Some(stats)) = (&vector_hits, &vector_stats) {
        for hit in hits {
            let n = normalise(hit.score, stats);
            by_version
                .entry(hit.object.version_id)
                .or_insert_with(|| (hit.object.clone(), 0.0, 0.0))
                .2 = n;
        }
    }

    let mut fused: Vec<HybridHit> = by_version
        .into_values()
        .map(|(object, n_lex, n_vec)| HybridHit { fused_score: w_lex * n_lex + w_vec * n_vec, object })
        .collect();
    fused.sort_by(|a, b| b.fused_score.partial_cmp(&a.fused_score).unwrap_or(std::cmp::Ordering::Equal));

    let has_more = (fused.len() as i64).saturating_sub(offset) > limit;
    let page: Vec<HybridHit> = fused.into_iter().skip(offset.max(0) as usize).take(limit.max(0) as usize).collect();

    if debug {
        debug_info.lexical = lexical_stats;
        debug_info.vector = vector_stats;
        debug_info.fusion_latency_ms = fusion_started.elapsed().as_secs_f64() * 1000.0;
        Ok((page, has_more, Some(debug_info)))
    } else {
        Ok((page, has_more, None))
    }
}

/// `Similar-objects` (§4.3): look up `id`'s stored embedding; empty result
/// if it has none. Otherwise vector search excluding the source, with
/// optional type, key-prefix, `labels_all`/`labels_any`, and `max_distance`.
#[allow(clippy::too_many_arguments)]
pub async fn similar_objects(
    conn: &mut AsyncPgConnection,
    project_id: ProjectId,
    branch_id: Option<BranchId>,
    id: AnyId,
    object_type: Option<&str>,
    key_prefix: Option<&str>,
    labels: Option<LabelFilter>,
    max_distance: Option<f64>,
    vector_probes: u32,
    limit: i64,
) -> Result<Vec<ScoredObject>, ChronographError> {
    let source = gateway::get_by_id(conn, project_id, id).await?;
    let Some(embedding) = source.embedding.clone() else {
        return Ok(Vec::new());
    };

    let filter = ObjectFilter {
        types: object_type.map(|t| vec![t.to_string()]).unwrap_or_default(),
        labels,
        ..Default::default()
    };

    let query_vector = embedding;
    let project_id_inner = project_id;
    let branch_id_inner = branch_id;
    let key_prefix = key_prefix.map(str::to_string);
    let source_entity = source.entity_id;
    let source_version = source.version_id;

    with_boosted_recall(conn, vector_probes, move |conn| {
        Box::pin(async move {
            let distance = objects::embedding.cosine_distance(Vector::from(query_vector.clone()));
            let mut query = gateway::base_query(project_id_inner, branch_id_inner, &filter)
                .filter(objects::supersedes_id.is_null())
                .filter(objects::embedding.is_not_null())
                .filter(objects::entity_id.ne(source_entity.0))
                .filter(objects::version_id.ne(source_version.0))
                .into_boxed();
            if let Some(prefix) = &key_prefix {
                query = query.filter(sql::<diesel::sql_types::Bool>("key LIKE ").bind::<diesel::sql_types::Text, _>(format!("{prefix}%")));
            }
            if let Some(max_distance) = max_distance {
                query = query.filter(distance.le(max_distance));
            }

            let rows: Vec<(OrmObject, f64)> = query
                .select((OrmObject::as_select(), distance))
                .order(distance.asc())
                .limit(limit)
                .load(conn)
                .await
                .map_err(crate::pg_error::PgError::from)?;

            let hits: Vec<ScoredObject> = rows
                .into_iter()
                .map(|(row, distance)| ScoredObject { object: Object::from(row), score: 1.0 - distance })
                .filter(|hit| filter.labels.as_ref().is_none_or(|l| l.matches(&hit.object.labels)))
                .collect();
            Ok(hits)
        })
    })
    .await
}

/// `Access tracking` (§4.3): fires a detached best-effort update of
/// `last_accessed_at` for the returned HEAD rows after a search returns.
/// Runs with its own pooled connection so request cancellation doesn't
/// cancel it (§5 "Cancellation"). Failures are logged at `warn`, never
/// surfaced.
pub fn spawn_access_tracking(pool: Arc<Pool<AsyncPgConnection>>, version_ids: Vec<VersionId>) {
    if version_ids.is_empty() {
        return;
    }
    tokio::spawn(async move {
        let mut conn = match pool.get().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!(error = %err, "access tracking: failed to acquire connection");
                return;
            }
        };
        if let Err(err) = gateway::touch_last_accessed(&mut conn, &version_ids).await {
            warn!(error = %err, "access tracking: failed to update last_accessed_at");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn channel_stats_of_empty_is_zeroed() {
        let stats = channel_stats(&[]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.mean, 0.0);
    }

    #[test]
    fn channel_stats_computes_mean_and_std() {
        let stats = channel_stats(&[1.0, 2.0, 3.0]);
        assert_eq!(stats.count, 3);
        assert!((stats.mean - 2.0).abs() < 1e-9);
        assert!((stats.std - 0.816_496_580_927_726).abs() < 1e-9);
    }

    #[test]
    fn normalise_weights_defaults_when_both_zero() {
        assert_eq!(normalise_weights(0.0, 0.0), (0.5, 0.5));
    }

    #[test]
    fn normalise_weights_normalises_to_one() {
        let (lex, vec) = normalise_weights(0.7, 0.3);
        assert!((lex - 0.7).abs() < 1e-9);
        assert!((vec - 0.3).abs() < 1e-9);
    }

    #[test]
    fn zero_variance_channel_normalises_to_half() {
        let stats = ChannelStats { mean: 5.0, std: 0.0, count: 3 };
        assert_eq!(normalise(5.0, &stats), 0.5);
    }

    #[test]
    fn raising_lexical_weight_favours_above_mean_lexical_items() {
        // testable property 8: "Search monotone w.r.t. weight".
        let lex_stats = ChannelStats { mean: 0.5, std: 0.1, count: 10 };
        let vec_stats = ChannelStats { mean: 0.5, std: 0.1, count: 10 };
        let n_lex = normalise(0.7, &lex_stats); // above mean
        let n_vec = normalise(0.4, &vec_stats); // below mean

        let (w_lex_low, w_vec_low) = normalise_weights(0.3, 0.7);
        let (w_lex_high, w_vec_high) = normalise_weights(0.9, 0.1);

        let fused_low = w_lex_low * n_lex + w_vec_low * n_vec;
        let fused_high = w_lex_high * n_lex + w_vec_high * n_vec;
        assert!(fused_high > fused_low);
    }
}
