pub mod launcher;
pub mod sink;
pub mod source;

pub use launcher::{CoreLauncher, CoreProcess};
pub use sink::{OutputStage, ResultSink};
pub use source::SubscriptionSource;
