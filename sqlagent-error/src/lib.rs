//! # sqlagent-error
//!
//! Unified error handling for the sqlagent workspace.
//!
//! - **ErrorKind**: what went wrong (e.g. `DatabaseUnavailable`, `InferenceFailed`)
//! - **ErrorStatus**: whether retrying could help (`Permanent`, `Temporary`, `Persistent`)
//! - **Context**: operation name plus key/value pairs for locating the cause
//! - **Source**: the wrapped underlying error, never leaked as a raw type
//!
//! ## Usage
//!
//! ```rust
//! use sqlagent_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::TableNotFound, "table 'Invoices' not found")
//!         .with_operation("database::table_info")
//!         .with_context("table", "Invoices"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All library functions return `Result<T, sqlagent_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent layers only append context
//! - `From<OtherError>` is reserved for `std::io::Error`

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using the sqlagent Error
pub type Result<T> = std::result::Result<T, Error>;
