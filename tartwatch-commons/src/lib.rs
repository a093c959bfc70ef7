//! Shared traits and helper types reused across tartwatch crates. The goal
//! is to keep `tartwatch-core` and `tartwatch-config` free of ad-hoc retry
//! arithmetic and error sinks while still sharing common contracts.

pub mod backoff;
pub mod errors;
pub mod http;
pub mod reference;

pub use backoff::ExponentialBackoff;
pub use errors::{ErrorReporter, NoopErrorReporter, TracingErrorReporter};
pub use reference::MemoryErrorReporter;
