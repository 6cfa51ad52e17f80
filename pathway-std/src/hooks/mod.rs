//! Standard middleware.

mod logging;
#[cfg(feature = "timeout")]
mod timeout;
mod tracing;

pub use self::logging::Logger;
#[cfg(feature = "timeout")]
pub use self::timeout::{TimeoutError, TimeoutMiddleware};
pub use self::tracing::Traced;
