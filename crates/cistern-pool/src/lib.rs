//! # cistern-pool
//!
//! Pooled database-connection manager.
//!
//! The pool hands out reusable physical connections behind a wrapper that
//! intercepts release: closing a [`PooledConnection`] returns it to the pool
//! instead of closing the backing connection. Connections are validated when
//! they come back, stale idle connections are evicted, abandoned checkouts
//! are forcibly reclaimed, and systemic failure shows up in a
//! bad-connection counter surfaced through [`PoolMetrics`] and checkout
//! timeout errors.
//!
//! ## Features
//!
//! - Bounded waiting: acquire blocks until a release or the checkout timeout
//! - Validation on release with a configurable probe statement and timeout
//! - Reconfiguration detection via connection type codes
//! - Forced reclamation of overdue checkouts
//! - Occupancy and timing metrics for observability
//!
//! ## Example
//!
//! ```rust,ignore
//! use cistern_conn::ConnectOptions;
//! use cistern_pool::Pool;
//!
//! let pool = Pool::builder()
//!     .driver(driver)
//!     .options(ConnectOptions::from_connection_string(
//!         "url=postgres://localhost/mydb;user id=app;password=secret;",
//!     )?)
//!     .max_active(20)
//!     .max_idle(5)
//!     .probe_enabled(true)
//!     .probe_statement("SELECT 1")
//!     .build()?;
//!
//! let mut conn = pool.acquire().await?;
//! conn.execute("DELETE FROM sessions WHERE expired = 1").await?;
//! conn.release().await;
//!
//! let status = pool.status();
//! println!("pool utilization: {:.1}%", status.utilization());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;

mod conn;
mod pool;
mod prober;
mod state;

// Configuration
pub use config::{DEFAULT_PROBE_STATEMENT, PoolConfig};

// Error types
pub use error::{PoolError, Result};

// Pool types
pub use conn::PooledConnection;
pub use pool::{Pool, PoolBuilder};
pub use state::{PoolMetrics, PoolStatus};
