//! The client: connection lifecycle, query execution and the table registry.
//!
//! [`SqlClient`] wraps a [`SqlDriver`] and manages one logical connection:
//! `connect` and `close` are serialized through a single lifecycle lock, so
//! concurrent callers converge on one transition instead of racing the
//! driver. Every `connect` and `execute` (re)arms an idle timer that closes
//! the connection after [`SqlClientBuilder::idle_timeout`] without traffic.
//!
//! The client is cheaply cloneable; clones share the connection, the timer
//! and the table registry.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::dialect::SqlDialect;
use crate::driver::SqlDriver;
use crate::error::SqlResult;
use crate::schema::TableSchema;
use crate::table::SqlTable;
use crate::value::{ExecutableQuery, SqlRow};

/// Idle time after which the connection is closed automatically.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(45);

type QueryHook = Box<dyn Fn(&ExecutableQuery) + Send + Sync>;

/// Configures and builds a [`SqlClient`].
pub struct SqlClientBuilder<D> {
    driver: D,
    idle_timeout: Duration,
    record_queries: bool,
    query_hook: Option<QueryHook>,
}

impl<D: SqlDriver> SqlClientBuilder<D> {
    /// Close the connection after this long without a query.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Keep every executed query in an in-memory log, consumable through
    /// [`SqlClient::shift_query`] and [`SqlClient::take_queries`].
    pub fn record_queries(mut self, record: bool) -> Self {
        self.record_queries = record;
        self
    }

    /// Invoke a callback for every executed query, before it is sent.
    pub fn query_hook(mut self, hook: impl Fn(&ExecutableQuery) + Send + Sync + 'static) -> Self {
        self.query_hook = Some(Box::new(hook));
        self
    }

    pub fn build(self) -> SqlClient<D> {
        let dialect = self.driver.dialect();
        SqlClient {
            inner: Arc::new(ClientInner {
                driver: self.driver,
                dialect,
                idle_timeout: self.idle_timeout,
                lifecycle: tokio::sync::Mutex::new(()),
                idle_timer: tokio::sync::Mutex::new(None),
                query_hook: self.query_hook,
                record_queries: self.record_queries,
                query_log: std::sync::Mutex::new(VecDeque::new()),
                tables: std::sync::Mutex::new(Vec::new()),
            }),
        }
    }
}

/// A database client over one logical connection.
pub struct SqlClient<D: SqlDriver> {
    inner: Arc<ClientInner<D>>,
}

impl<D: SqlDriver> Clone for SqlClient<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct ClientInner<D> {
    driver: D,
    dialect: Arc<dyn SqlDialect>,
    idle_timeout: Duration,
    /// Serializes connect/close so concurrent callers see one transition.
    lifecycle: tokio::sync::Mutex<()>,
    /// Handle of the pending idle-close task, if any.
    idle_timer: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    query_hook: Option<QueryHook>,
    record_queries: bool,
    query_log: std::sync::Mutex<VecDeque<ExecutableQuery>>,
    tables: std::sync::Mutex<Vec<Arc<TableSchema>>>,
}

impl<D: SqlDriver> SqlClient<D> {
    /// Start building a client around the given driver.
    pub fn builder(driver: D) -> SqlClientBuilder<D> {
        SqlClientBuilder {
            driver,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            record_queries: false,
            query_hook: None,
        }
    }

    /// Build a client with default settings.
    pub fn new(driver: D) -> Self {
        Self::builder(driver).build()
    }

    /// The dialect queries are compiled with.
    pub fn dialect(&self) -> Arc<dyn SqlDialect> {
        self.inner.dialect.clone()
    }

    /// Whether the underlying connection is currently live.
    pub async fn is_live(&self) -> bool {
        self.inner.driver.is_live().await
    }

    /// Open the connection, arming the idle timer.
    ///
    /// A no-op (beyond re-arming the timer) when already live. Concurrent
    /// calls wait for the in-flight transition instead of connecting twice.
    pub async fn connect(&self) -> SqlResult<()> {
        let _guard = self.inner.lifecycle.lock().await;
        self.inner.arm_idle_timer().await;
        if self.inner.driver.is_live().await {
            return Ok(());
        }
        tracing::debug!("opening database connection");
        self.inner.driver.connect().await
    }

    /// Close the connection and cancel the idle timer.
    ///
    /// A no-op when not live; concurrent calls wait for the in-flight
    /// transition.
    pub async fn close(&self) -> SqlResult<()> {
        let _guard = self.inner.lifecycle.lock().await;
        if let Some(timer) = self.inner.idle_timer.lock().await.take() {
            timer.abort();
        }
        if !self.inner.driver.is_live().await {
            return Ok(());
        }
        tracing::debug!("closing database connection");
        self.inner.driver.close().await
    }

    /// Run one compiled query, connecting first when necessary.
    ///
    /// Each call pushes the idle close-down further into the future. Errors
    /// come back annotated with the SQL text of the failing query.
    pub async fn execute(&self, query: &ExecutableQuery) -> SqlResult<Vec<SqlRow>> {
        if self.inner.driver.is_live().await {
            self.inner.arm_idle_timer().await;
        } else {
            self.connect().await?;
        }
        if let Some(hook) = &self.inner.query_hook {
            hook(query);
        }
        if self.inner.record_queries {
            lock_unpoisoned(&self.inner.query_log).push_back(query.clone());
        }
        tracing::debug!(sql = %query.text, values = query.values.len(), "executing query");
        self.inner
            .driver
            .execute(query)
            .await
            .map_err(|err| err.with_query(&*query.text))
    }

    /// Register a table schema and get its facade.
    ///
    /// Registration order is the creation order of
    /// [`create_all_tables`](Self::create_all_tables); register referenced
    /// tables before the tables whose foreign keys point at them.
    pub fn table(&self, schema: TableSchema) -> SqlTable<D> {
        let schema = Arc::new(schema);
        lock_unpoisoned(&self.inner.tables).push(schema.clone());
        SqlTable::new(self.clone(), schema)
    }

    /// All registered table schemas, in registration order.
    pub fn tables(&self) -> Vec<Arc<TableSchema>> {
        lock_unpoisoned(&self.inner.tables).clone()
    }

    /// Drop a table schema from the registry. Returns whether it was present.
    pub fn remove_table(&self, name: &str) -> bool {
        let mut tables = lock_unpoisoned(&self.inner.tables);
        let before = tables.len();
        tables.retain(|schema| schema.name != name);
        tables.len() < before
    }

    /// Empty the table registry.
    pub fn reset_tables(&self) {
        lock_unpoisoned(&self.inner.tables).clear();
    }

    /// Create every registered table, in registration order.
    pub async fn create_all_tables(&self) -> SqlResult<()> {
        for schema in self.tables() {
            let query = self.inner.dialect.create_table_query(&schema)?;
            self.execute(&query).await?;
        }
        Ok(())
    }

    /// Drop every registered table, in reverse registration order.
    pub async fn drop_all_tables(&self) -> SqlResult<()> {
        for schema in self.tables().into_iter().rev() {
            let query = self.inner.dialect.drop_table_query(&schema);
            self.execute(&query).await?;
        }
        Ok(())
    }

    /// List the user tables that exist in the database.
    pub async fn list_tables(&self) -> SqlResult<Vec<SqlRow>> {
        self.execute(&self.inner.dialect.list_tables_query()).await
    }

    /// List the databases on the server.
    pub async fn list_databases(&self) -> SqlResult<Vec<SqlRow>> {
        self.execute(&self.inner.dialect.list_databases_query())
            .await
    }

    /// Pop the oldest recorded query, if query recording is enabled.
    pub fn shift_query(&self) -> Option<ExecutableQuery> {
        lock_unpoisoned(&self.inner.query_log).pop_front()
    }

    /// Drain all recorded queries, oldest first.
    pub fn take_queries(&self) -> Vec<ExecutableQuery> {
        lock_unpoisoned(&self.inner.query_log).drain(..).collect()
    }
}

impl<D: SqlDriver> ClientInner<D> {
    /// (Re)start the idle close-down countdown.
    ///
    /// The spawned task holds only a weak reference, so a dropped client
    /// never stays alive just because its timer is pending. When the timer
    /// fires it detaches its own handle before closing, so the close path's
    /// timer cancellation cannot abort the close in progress.
    async fn arm_idle_timer(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let timeout = self.idle_timeout;
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.idle_timer.lock().await.take();
            tracing::debug!(?timeout, "idle timeout reached, closing connection");
            let client = SqlClient { inner };
            if let Err(err) = client.close().await {
                tracing::debug!(error = %err, "idle close failed");
            }
        });
        if let Some(previous) = self.idle_timer.lock().await.replace(task) {
            previous.abort();
        }
    }
}

/// Lock a std mutex, recovering the data if a panicking thread poisoned it.
fn lock_unpoisoned<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
