pub mod backend;
pub mod config;
pub mod facade;
pub mod histogram;
mod http;
pub mod local;
pub mod noop;
pub mod queue;
pub mod remote_a;
pub mod remote_b;

pub use backend::{flatten_params, parse_selection, BackendKind, Metrics, Params, TrackerBackend};
pub use config::{RemoteConfig, TrackingConfig};
pub use facade::Tracker;
pub use histogram::Histogram;
pub use local::LocalTracker;
pub use noop::NoOpTracker;
pub use queue::QueuedBackend;
pub use remote_a::RemoteTrackerA;
pub use remote_b::RemoteTrackerB;
