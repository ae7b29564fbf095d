//! Optimizers, learning-rate schedules and the factory that builds them from
//! a `TrainingConfig`.

pub mod adam;
pub mod clip;
pub mod factory;
pub mod optimizer;
pub mod scheduler;
pub mod sgd;

pub use adam::Adam;
pub use clip::clip_grad_norm;
pub use factory::{make_optimizer, make_scheduler, OptimizerKind, SchedulerKind};
pub use optimizer::{Optimizer, OptimizerState};
pub use scheduler::Scheduler;
pub use sgd::Sgd;
