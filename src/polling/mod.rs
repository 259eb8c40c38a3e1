pub mod scheduler;

pub use scheduler::{PollingMode, PollingScheduler, PollingState};
