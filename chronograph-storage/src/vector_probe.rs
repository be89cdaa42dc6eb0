//! Vector-recall tuning (§4.1 "Vector-recall tuning", §5 "Vector index
//! recall").
//!
//! Read-only vector search opens its own transaction and raises the
//! approximate index's probe count for the scope of that transaction only,
//! then commits even though nothing was written -- `SET LOCAL` only affects
//! the current transaction and is reset automatically, so there is no
//! cross-request leakage.

use diesel::sql_query;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};

use chronograph_core::ChronographError;

use crate::pg_error::{from_diesel, PgError};

/// Runs `body` inside a transaction with `ivfflat.probes` raised to
/// `probes`, then commits. Used by every vector and hybrid search path.
pub async fn with_boosted_recall<F, T>(
    conn: &mut AsyncPgConnection,
    probes: u32,
    body: F,
) -> Result<T, ChronographError>
where
    for<'c> F: FnOnce(
            &'c mut AsyncPgConnection,
        ) -> diesel_async::scoped_futures::ScopedBoxFuture<'static, 'c, Result<T, PgError>>
        + Send,
    T: Send,
{
    conn.transaction(|conn| {
        Box::pin(async move {
            sql_query(format!("SET LOCAL ivfflat.probes = {probes}"))
                .execute(conn)
                .await
                .map_err(|e| PgError(from_diesel(e, "ivfflat_probes", &probes.to_string())))?;
            body(conn).await
        })
    })
    .await
    .map_err(Into::into)
}
