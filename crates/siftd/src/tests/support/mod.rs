//! Test doubles shared by the coordinator and monitor suites.

mod dispatcher;
mod logs;
mod plugin;

pub use dispatcher::{FetchOutcome, RecordingDispatcher, job, unavailable};
pub use logs::LogCapture;
pub use plugin::EchoPlugin;
