//! Convenience helpers on the transaction types.
//!
//! - [`RequestExt`]: header aliases, parameter lookup, host inspection
//! - [`ResponseExt`]: typed bodies, JSON, redirects, cookies, rendering

mod request;
mod response;

pub use request::RequestExt;
pub use response::{Body, ResponseExt};
