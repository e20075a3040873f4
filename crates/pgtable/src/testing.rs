//! Test support: a scripted in-memory driver.
//!
//! [`FakeDriver`] implements [`SqlDriver`] without any database. It records
//! every executed query and replays responses pushed ahead of time, so tests
//! can assert the exact SQL and parameter values a call produces.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::dialect::SqlDialect;
use crate::driver::SqlDriver;
use crate::error::{SqlError, SqlResult};
use crate::pg::PostgresDialect;
use crate::value::{ExecutableQuery, SqlRow};

enum Response {
    Rows(Vec<SqlRow>),
    Error(String),
}

struct FakeInner {
    dialect: Arc<PostgresDialect>,
    connected: AtomicBool,
    connect_calls: AtomicUsize,
    close_calls: AtomicUsize,
    queries: Mutex<VecDeque<ExecutableQuery>>,
    responses: Mutex<VecDeque<Response>>,
}

/// A driver that records queries and replays scripted responses.
///
/// Compiles through [`PostgresDialect`], so the recorded SQL matches what
/// [`PostgresDriver`](crate::pg::PostgresDriver) would send. With no scripted
/// response pending, queries succeed with zero rows.
#[derive(Clone)]
pub struct FakeDriver {
    inner: Arc<FakeInner>,
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FakeInner {
                dialect: Arc::new(PostgresDialect::new()),
                connected: AtomicBool::new(false),
                connect_calls: AtomicUsize::new(0),
                close_calls: AtomicUsize::new(0),
                queries: Mutex::new(VecDeque::new()),
                responses: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Script the next query to yield these rows.
    pub fn push_rows(&self, rows: Vec<SqlRow>) {
        lock(&self.inner.responses).push_back(Response::Rows(rows));
    }

    /// Script the next query to fail with a connection error.
    pub fn push_error(&self, message: impl Into<String>) {
        lock(&self.inner.responses).push_back(Response::Error(message.into()));
    }

    /// Pop the oldest recorded query.
    pub fn shift_query(&self) -> Option<ExecutableQuery> {
        lock(&self.inner.queries).pop_front()
    }

    /// Drain all recorded queries, oldest first.
    pub fn take_queries(&self) -> Vec<ExecutableQuery> {
        lock(&self.inner.queries).drain(..).collect()
    }

    /// How often `connect` actually opened the connection.
    pub fn connect_count(&self) -> usize {
        self.inner.connect_calls.load(Ordering::SeqCst)
    }

    /// How often `close` actually closed the connection.
    pub fn close_count(&self) -> usize {
        self.inner.close_calls.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }
}

impl SqlDriver for FakeDriver {
    fn dialect(&self) -> Arc<dyn SqlDialect> {
        self.inner.dialect.clone()
    }

    async fn connect(&self) -> SqlResult<()> {
        if !self.inner.connected.swap(true, Ordering::SeqCst) {
            self.inner.connect_calls.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn close(&self) -> SqlResult<()> {
        if self.inner.connected.swap(false, Ordering::SeqCst) {
            self.inner.close_calls.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn is_live(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    async fn execute(&self, query: &ExecutableQuery) -> SqlResult<Vec<SqlRow>> {
        lock(&self.inner.queries).push_back(query.clone());
        match lock(&self.inner.responses).pop_front() {
            None => Ok(Vec::new()),
            Some(Response::Rows(rows)) => Ok(rows),
            Some(Response::Error(message)) => Err(SqlError::connection(message)),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
