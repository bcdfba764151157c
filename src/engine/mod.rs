pub mod context;
pub mod dedup;
pub mod orchestrator;
pub mod outbound;
pub mod pipeline;
pub mod probe;

pub use dedup::deduplicate;
pub use orchestrator::Orchestrator;
pub use pipeline::{Pipeline, PipelineReport};
pub use probe::{LatencyProbe, ProbeSettings};
