//! # cistern-conn
//!
//! Connection and driver abstractions for the cistern connection pool.
//!
//! This crate defines the seam between pooling logic and concrete database
//! drivers: the [`Connection`] trait (the operation surface of one physical
//! connection), the [`Driver`] trait (opens them), [`ConnectOptions`] (URL,
//! credentials, driver properties, and the auto-commit/isolation settings
//! applied to fresh connections), and [`UnpooledSource`], which opens one
//! configured connection per call.
//!
//! ## Example
//!
//! ```rust,ignore
//! use cistern_conn::{ConnectOptions, UnpooledSource};
//!
//! let options = ConnectOptions::from_connection_string(
//!     "url=postgres://localhost/mydb;user id=app;password=secret;",
//! )?;
//!
//! let source = UnpooledSource::new(driver, options);
//! let mut conn = source.connect().await?;
//! conn.execute("DELETE FROM sessions WHERE expired = 1").await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connection;
pub mod error;
pub mod isolation;
pub mod options;
pub mod unpooled;

// Re-export commonly used types
pub use connection::{Connection, Driver};
pub use error::{ConnError, Result};
pub use isolation::IsolationLevel;
pub use options::ConnectOptions;
pub use unpooled::UnpooledSource;
