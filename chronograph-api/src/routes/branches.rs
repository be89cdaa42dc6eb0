//! `POST /branches/{target}/merge` (§4.5, §6).

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

use chronograph_core::ids::BranchId;
use chronograph_core::ChronographError;
use chronograph_storage::merge;

use crate::auth;
use crate::dto::{MergePreviewDto, MergeResultDto, MergeSummaryDto};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn parse_branch(raw: &str) -> Result<BranchId, ApiError> {
    BranchId::parse(raw).ok_or_else(|| ApiError(ChronographError::bad_request(format!("malformed branch id: {raw}"))))
}

#[derive(Debug, Deserialize)]
pub struct MergeBody {
    #[serde(rename = "sourceBranchId")]
    pub source_branch_id: String,
    #[serde(default)]
    pub execute: bool,
    pub limit: Option<usize>,
}

fn to_preview_dto(preview: merge::MergePreview) -> MergePreviewDto {
    MergePreviewDto {
        summaries: preview
            .summaries
            .into_iter()
            .map(|s| MergeSummaryDto {
                entity_id: s.entity_id.0,
                status: match s.status {
                    merge::MergeStatus::Conflict => "conflict",
                    merge::MergeStatus::FastForward => "fast_forward",
                    merge::MergeStatus::Added => "added",
                    merge::MergeStatus::Unchanged => "unchanged",
                },
                conflicts: s.conflicts,
                source_version_id: s.source.map(|h| h.version_id.0),
                target_version_id: s.target.map(|h| h.version_id.0),
            })
            .collect(),
        truncated: preview.truncated,
    }
}

/// `POST /branches/{target}/merge` (§4.5). Classification is always a dry
/// run; `execute=true` on an all-non-conflict result only flips
/// `execution_eligible`/`executed` in the response -- the core does not
/// clone rows onto the target branch (§9 open question, left unimplemented
/// per the spec's explicit instruction).
pub async fn merge_preview(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<MergeBody>,
) -> ApiResult<HttpResponse> {
    let ctx = auth::extract(&req)?;
    let target_branch = parse_branch(&path)?;
    let source_branch = parse_branch(&body.source_branch_id)?;
    let limit = body.limit.unwrap_or(state.config.merge_preview_limit).min(state.config.merge_preview_limit);

    let mut conn = state.pool.get().await.map_err(chronograph_storage::pg_error::from_pool)?;
    let objects = merge::analyse_object_merge(&mut conn, ctx.project_id, Some(source_branch), Some(target_branch), limit).await?;
    let relationships =
        merge::analyse_relationship_merge(&mut conn, ctx.project_id, Some(source_branch), Some(target_branch), limit).await?;

    let execution_eligible = merge::is_execution_eligible(&objects.summaries, &relationships.summaries);
    let executed = false;
    if body.execute && execution_eligible {
        tracing::warn!(
            target_branch = %target_branch,
            source_branch = %source_branch,
            "merge execute=true requested on a non-conflicting preview; execution is not implemented (§9 open question)"
        );
    }

    Ok(HttpResponse::Ok().json(MergeResultDto {
        objects: to_preview_dto(objects),
        relationships: to_preview_dto(relationships),
        execution_eligible,
        executed,
    }))
}
