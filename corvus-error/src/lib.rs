//! Error utilities shared across the `corvus` crate family.
//!
//! Local errors (bad argument, invalid handle, write to a closed socket) are
//! the first of the three error tiers the framework distinguishes: they are
//! returned synchronously and never propagate past the call that produced
//! them. This crate provides the building blocks for that tier.
//!
//! The other two tiers — HTTP/2 connection errors and stream errors — are
//! typed enums owned by `corvus-http2` (`Reason`, `proto::Error`), not boxed
//! through here: protocol code needs to match on the error to decide between
//! emitting `GOAWAY` or `RST_STREAM`, which a type-erased [`BoxError`] would
//! make awkward.
//!
//! # Type erasure
//!
//! [`BoxError`] is a boxed `std::error::Error` trait object, used at
//! abstraction boundaries where the concrete error type does not matter.
//!
//! # Context
//!
//! [`ErrorExt`] attaches context to any error convertible into a
//! [`BoxError`]; [`ErrorContext`] does the same directly on `Result`/`Option`.
//! Context is stored as fields and rendered logfmt-style, quoted and escaped
//! so values containing whitespace or commas stay unambiguous in logs.
//!
//! ```
//! use corvus_error::{ErrorContext, ErrorExt};
//!
//! fn parse(input: &str) -> Result<usize, std::num::ParseIntError> {
//!     input.parse()
//! }
//!
//! # fn main() -> Result<(), corvus_error::BoxError> {
//! let value = parse("42").context("parsing answer")?;
//! assert_eq!(value, 42);
//!
//! let err = parse("nope")
//!     .context_field("input", "nope")
//!     .with_context(|| "expected a number")
//!     .unwrap_err();
//!
//! let s = format!("{err}");
//! assert!(s.contains(r#"input="nope""#));
//! assert!(s.contains(r#""expected a number""#));
//! # Ok(())
//! # }
//! ```

use std::error::Error as StdError;

/// Alias for a type-erased error type.
pub type BoxError = Box<dyn StdError + Send + Sync>;

mod ext;
pub use ext::{ErrorContext, ErrorExt};
