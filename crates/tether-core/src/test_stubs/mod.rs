mod executor;
mod service;
mod stream;

pub use executor::ManualExecutor;
pub use service::RecordingService;
pub use stream::{Attempt, ScriptedStream, ScriptedStreamFactory};
