//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the shipper: the
//! configuration blueprint, the `StreamSink` capability, the formatter
//! collaborator, credentials providers and the error type.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.

mod config;
mod credentials;
mod encoding;
mod error;
mod event;
mod region;
mod retry;
mod sink;

pub use config::*;
pub use credentials::*;
pub use encoding::Charset;
pub use error::*;
pub use event::*;
pub use region::{Region, DEFAULT_REGION, KNOWN_REGIONS};
pub use retry::RetryPolicy;
pub use sink::*;
