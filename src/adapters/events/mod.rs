//! Event bus adapters.

mod in_process;
mod recording;

pub use in_process::InProcessEventBus;
pub use recording::RecordingHandler;
