//! Driver abstraction between the client and a concrete database backend.

use std::future::Future;
use std::sync::Arc;

use crate::dialect::SqlDialect;
use crate::error::SqlResult;
use crate::value::{ExecutableQuery, SqlRow};

/// A backend that can hold one logical connection and run compiled queries.
///
/// [`PostgresDriver`](crate::pg::PostgresDriver) is the production
/// implementation; [`FakeDriver`](crate::testing::FakeDriver) records queries
/// and replays scripted responses for tests. Drivers only manage the raw
/// connection; serialization of connect/close and the idle timeout are the
/// client's job.
pub trait SqlDriver: Send + Sync + 'static {
    /// The dialect used to compile queries for this backend.
    fn dialect(&self) -> Arc<dyn SqlDialect>;

    /// Establish the connection. A no-op when already live.
    fn connect(&self) -> impl Future<Output = SqlResult<()>> + Send;

    /// Tear the connection down. A no-op when not live.
    fn close(&self) -> impl Future<Output = SqlResult<()>> + Send;

    /// Whether a usable connection is currently held.
    fn is_live(&self) -> impl Future<Output = bool> + Send;

    /// Run one compiled query and return its rows.
    fn execute(
        &self,
        query: &ExecutableQuery,
    ) -> impl Future<Output = SqlResult<Vec<SqlRow>>> + Send;
}
