//! Epoch-level training monitors: early stopping and learning-rate decay

/// Stops training once the monitored score has not improved for `patience`
/// epochs, remembering the best epoch so its weights can be restored
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best: f64,
    best_epoch: Option<usize>,
    wait: usize,
}

impl EarlyStopping {
    /// Monitors a score where higher is better
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best: f64::NEG_INFINITY,
            best_epoch: None,
            wait: 0,
        }
    }

    /// Record an epoch's score. Returns `true` if it is a new best.
    pub fn observe(&mut self, epoch: usize, score: f64) -> bool {
        if score > self.best {
            self.best = score;
            self.best_epoch = Some(epoch);
            self.wait = 0;
            true
        } else {
            self.wait += 1;
            false
        }
    }

    pub fn should_stop(&self) -> bool {
        self.wait >= self.patience
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }
}

/// Scales the learning rate by `factor` when the monitored loss plateaus
#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    factor: f64,
    patience: usize,
    min_delta: f64,
    min_lr: f64,
    best: f64,
    wait: usize,
}

impl ReduceLrOnPlateau {
    /// Monitors a loss where lower is better
    pub fn new(factor: f64, patience: usize, min_delta: f64, min_lr: f64) -> Self {
        Self {
            factor,
            patience,
            min_delta,
            min_lr,
            best: f64::INFINITY,
            wait: 0,
        }
    }

    /// Record an epoch's loss and return the learning rate to use next
    pub fn observe(&mut self, loss: f64, lr: f64) -> f64 {
        if loss < self.best - self.min_delta {
            self.best = loss;
            self.wait = 0;
            return lr;
        }
        self.wait += 1;
        if self.wait >= self.patience && lr > self.min_lr {
            self.wait = 0;
            return (lr * self.factor).max(self.min_lr);
        }
        lr
    }
}
