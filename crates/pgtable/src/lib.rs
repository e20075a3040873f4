//! # pgtable
//!
//! Typed table definitions, compiled SQL conditions and a managed single
//! connection over tokio-postgres.
//!
//! ## Features
//!
//! - **Compiled conditions**: recursive AND/OR trees, IN lists, NULL tests
//!   and raw fragments compile to `$n`-parameterized WHERE clauses with
//!   strictly sequential placeholder numbering
//! - **Typed schemas**: declare tables as [`TableSchema`] values; CREATE and
//!   DROP are generated, never hand-written
//! - **Managed connection**: one logical connection, serialized connect and
//!   close, automatic close after an idle timeout
//! - **Safe defaults**: INSERT and UPDATE refuse an empty column set
//! - **Swappable driver**: [`SqlDriver`] seam with a tokio-postgres
//!   implementation and a scripted [`testing::FakeDriver`] for tests
//!
//! ## Example
//!
//! ```ignore
//! use pgtable::{Column, Condition, PostgresDriver, SetMap, SqlClient, TableSchema};
//!
//! let driver = PostgresDriver::from_url("postgres://postgres@localhost/app")?;
//! let client = SqlClient::builder(driver)
//!     .idle_timeout(std::time::Duration::from_secs(45))
//!     .build();
//!
//! let user = client.table(
//!     TableSchema::new("user")
//!         .column(Column::new("id", "serial").primary_key())
//!         .column(Column::new("name", "varchar").size(32).unique()),
//! );
//! client.create_all_tables().await?;
//!
//! user.insert(SetMap::new().set("name", "tester"), None).await?;
//! let row = user
//!     .select_one(None, Some(Condition::field("name", "tester")), &[])
//!     .await?;
//! ```

pub mod client;
pub mod condition;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod pg;
pub mod schema;
pub mod table;
pub mod testing;
pub mod value;

pub use client::{DEFAULT_IDLE_TIMEOUT, SqlClient, SqlClientBuilder};
pub use condition::{Condition, FieldRef, MergeOp, compile_condition};
pub use dialect::SqlDialect;
pub use driver::SqlDriver;
pub use error::{SqlError, SqlResult};
pub use pg::{PostgresDialect, PostgresDriver};
pub use schema::{
    Column, ColumnSelector, ForeignKey, JoinKind, SelectColumn, SqlJoin, TableSchema,
};
pub use table::SqlTable;
pub use value::{ExecutableQuery, SetMap, SqlRow, SqlValue};
