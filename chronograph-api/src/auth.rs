//! Thin project-scope/user-identity extraction (§6: "every endpoint requires
//! the project identifier either from a validated token scope or from a
//! header, and a user identity. Debug mode on hybrid search requires an
//! explicit scope."). Full authentication and scope checking is out of scope
//! (§1 "Out of scope" -- "authentication and scope checking"); this stands
//! in for a gateway or reverse proxy that has already validated a token and
//! forwards its claims as headers.

use actix_web::HttpRequest;

use chronograph_core::ids::ProjectId;
use chronograph_core::ChronographError;

const PROJECT_HEADER: &str = "x-project-id";
const USER_HEADER: &str = "x-user-id";
const DEBUG_SCOPE_HEADER: &str = "x-debug-scope";

pub struct RequestContext {
    pub project_id: ProjectId,
    pub user_id: String,
    pub debug_scope: bool,
}

fn header_str<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

pub fn extract(req: &HttpRequest) -> Result<RequestContext, ChronographError> {
    let project_id = header_str(req, PROJECT_HEADER)
        .ok_or_else(|| ChronographError::bad_request("missing X-Project-Id header"))?;
    let project_id = ProjectId::parse(project_id)
        .ok_or_else(|| ChronographError::bad_request("malformed X-Project-Id header"))?;
    let user_id = header_str(req, USER_HEADER)
        .ok_or_else(|| ChronographError::bad_request("missing X-User-Id header"))?
        .to_string();
    let debug_scope = header_str(req, DEBUG_SCOPE_HEADER) == Some("true");
    Ok(RequestContext { project_id, user_id, debug_scope })
}

/// §6 "Debug mode on hybrid search requires an explicit scope".
pub fn require_debug_scope(ctx: &RequestContext) -> Result<(), ChronographError> {
    if ctx.debug_scope {
        Ok(())
    } else {
        Err(ChronographError::forbidden("hybrid search debug mode requires an explicit scope"))
    }
}
