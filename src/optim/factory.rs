use std::str::FromStr;

use crate::error::ConfigError;
use crate::math::matrix::Matrix;
use crate::optim::adam::Adam;
use crate::optim::optimizer::Optimizer;
use crate::optim::scheduler::{CosineAnnealing, ReduceOnPlateau, Scheduler, StepDecay};
use crate::optim::sgd::Sgd;
use crate::train::train_config::TrainingConfig;

/// Optimizer selected by the `optimizer` config tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerKind {
    Sgd,
    Adam,
}

impl FromStr for OptimizerKind {
    type Err = ConfigError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "sgd" => Ok(OptimizerKind::Sgd),
            "adam" => Ok(OptimizerKind::Adam),
            _ => Err(ConfigError::UnknownOptimizer(tag.to_string())),
        }
    }
}

/// Scheduler selected by the `scheduler.kind` config tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerKind {
    None,
    Step,
    Cosine,
    Plateau,
}

impl FromStr for SchedulerKind {
    type Err = ConfigError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(SchedulerKind::None),
            "step" => Ok(SchedulerKind::Step),
            "cosine" => Ok(SchedulerKind::Cosine),
            "plateau" => Ok(SchedulerKind::Plateau),
            _ => Err(ConfigError::UnknownScheduler(tag.to_string())),
        }
    }
}

/// Builds the configured optimizer over `params`.
pub fn make_optimizer(
    params: &[(String, &Matrix)],
    config: &TrainingConfig,
) -> Result<Box<dyn Optimizer>, ConfigError> {
    let optimizer: Box<dyn Optimizer> = match config.optimizer.parse::<OptimizerKind>()? {
        OptimizerKind::Sgd => Box::new(Sgd::with_momentum(
            config.learning_rate,
            config.momentum,
            config.weight_decay,
        )),
        OptimizerKind::Adam => {
            Box::new(Adam::new(config.learning_rate, config.weight_decay).with_params(params))
        }
    };
    Ok(optimizer)
}

/// Builds the configured scheduler, or `None` when scheduling is disabled.
pub fn make_scheduler(
    optimizer: &dyn Optimizer,
    config: &TrainingConfig,
) -> Result<Option<Scheduler>, ConfigError> {
    let sched = &config.scheduler;
    let base_lr = optimizer.learning_rate();
    let scheduler = match sched.kind.parse::<SchedulerKind>()? {
        SchedulerKind::None => None,
        SchedulerKind::Step => Some(Scheduler::Step(StepDecay::new(base_lr, sched.step_size, sched.gamma))),
        SchedulerKind::Cosine => Some(Scheduler::Cosine(CosineAnnealing::new(
            base_lr,
            sched.min_lr,
            sched.t_max.unwrap_or(config.max_epochs),
        ))),
        SchedulerKind::Plateau => Some(Scheduler::Plateau(ReduceOnPlateau::new(
            sched.gamma,
            sched.plateau_patience,
            sched.min_lr,
        ))),
    };
    Ok(scheduler)
}
