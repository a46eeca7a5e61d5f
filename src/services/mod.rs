pub mod data_mover;
pub mod failure_monitor;
pub mod status_reporter;

pub use data_mover::{
    DataMover, InMemoryDataMover, PipelineError, PipelineEvent, PipelineReporter,
};
pub use failure_monitor::{FailureMonitor, NeverFailMonitor, PeerFailureSignal, WatchFailureMonitor};
pub use status_reporter::StatusReporter;
