//! Shared tracing setup for apimon binaries.

mod subscriber;

pub use subscriber::{LogFormat, init};
