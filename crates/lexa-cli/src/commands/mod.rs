pub mod common;
pub mod completions;
pub mod queue;
pub mod session;
pub mod stats;
pub mod status;
pub mod sync;
