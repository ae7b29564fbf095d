/// Where the monitored metric currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Improving,
    Plateaued,
    Stopped,
}

/// Patience-based stopping on a metric where higher is better.
///
/// `update` resets the counter on a strict improvement (`value > best +
/// min_delta`) and otherwise increments it by one. Once the counter reaches
/// `patience` the policy is `Stopped` for good.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    min_delta: f64,
    best: Option<f64>,
    counter: usize,
    phase: Phase,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        EarlyStopping {
            patience: patience.max(1),
            min_delta: 0.0,
            best: None,
            counter: 0,
            phase: Phase::Improving,
        }
    }

    pub fn with_min_delta(mut self, min_delta: f64) -> Self {
        self.min_delta = min_delta.max(0.0);
        self
    }

    /// Records one epoch's metric; returns `true` when training should stop.
    pub fn update(&mut self, value: f64) -> bool {
        if self.phase == Phase::Stopped {
            return true;
        }

        let improved = match self.best {
            None => !value.is_nan(),
            Some(best) => value > best + self.min_delta,
        };

        if improved {
            self.best = Some(value);
            self.counter = 0;
            self.phase = Phase::Improving;
        } else {
            self.counter += 1;
            self.phase = if self.counter >= self.patience { Phase::Stopped } else { Phase::Plateaued };
        }

        self.phase == Phase::Stopped
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn counter(&self) -> usize {
        self.counter
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    pub fn patience(&self) -> usize {
        self.patience
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_on_the_patience_th_non_improvement() {
        let mut es = EarlyStopping::new(3);
        assert!(!es.update(0.5));
        assert!(!es.update(0.4));
        assert_eq!(es.phase(), Phase::Plateaued);
        assert!(!es.update(0.5));
        assert!(es.update(0.45));
        assert_eq!(es.phase(), Phase::Stopped);
        assert_eq!(es.counter(), 3);
    }

    #[test]
    fn improvement_resets_counter() {
        let mut es = EarlyStopping::new(2);
        es.update(0.1);
        es.update(0.1);
        assert_eq!(es.counter(), 1);
        assert!(!es.update(0.2));
        assert_eq!(es.counter(), 0);
        assert_eq!(es.phase(), Phase::Improving);
        assert_eq!(es.best(), Some(0.2));
    }

    #[test]
    fn stopped_is_terminal() {
        let mut es = EarlyStopping::new(1);
        es.update(0.5);
        assert!(es.update(0.5));
        assert!(es.update(0.9));
        assert_eq!(es.best(), Some(0.5));
    }

    #[test]
    fn min_delta_requires_a_margin() {
        let mut es = EarlyStopping::new(5).with_min_delta(0.01);
        es.update(0.50);
        es.update(0.505);
        assert_eq!(es.counter(), 1);
        es.update(0.52);
        assert_eq!(es.counter(), 0);
    }
}
