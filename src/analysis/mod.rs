pub mod pipeline;
pub mod progress;

pub use pipeline::Pipeline;
pub use progress::{ProgressEvent, ProgressSender, StepTracker};
