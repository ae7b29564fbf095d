pub mod early_stopping;
pub mod epoch_stats;
pub mod loop_fn;
pub mod train_config;
pub mod trainer;

pub use early_stopping::{EarlyStopping, Phase};
pub use epoch_stats::{EpochResult, TrainingHistory};
pub use loop_fn::{evaluate, train_epoch, PassStats, TrainPass};
pub use train_config::{SchedulerConfig, TrainingConfig};
pub use trainer::{run, StopReason, TestEvaluation, Trainer, TrainingReport};
