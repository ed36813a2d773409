//! Live interview: turn-taking, reply streaming and still-frame capture.

pub mod frame;
pub mod handlers;
pub mod orchestrator;
pub mod stream;
