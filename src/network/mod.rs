pub mod fetch;
pub mod retry;

pub use fetch::Subscriber;
pub use retry::RetryPolicy;
