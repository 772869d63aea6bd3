//! Smooths jumpy progress/speed/eta samples into a display-friendly series
//! that a UI can redraw at a steady rate without visible jumps.

/// One of the three independently-smoothed display values.
#[derive(Debug, Clone, Copy, Default)]
struct Lane {
    display: f64,
    target: f64,
}

impl Lane {
    fn step(&mut self, factor: f64, max_change: f64, min_change: f64) -> bool {
        let delta = self.target - self.display;
        if delta.abs() <= min_change {
            let changed = self.display != self.target;
            self.display = self.target;
            return changed;
        }
        let step = (delta * factor).clamp(-max_change, max_change);
        self.display += step;
        true
    }
}

pub struct ProgressSmoother {
    progress: Lane,
    speed: Lane,
    eta: Lane,
    factor: f64,
    max_change_per_update: f64,
    min_change_threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedProgress {
    pub progress: f64,
    pub speed: f64,
    pub eta: f64,
}

impl ProgressSmoother {
    pub fn new(factor: f64, max_change_per_update: f64, min_change_threshold: f64) -> Self {
        Self {
            progress: Lane::default(),
            speed: Lane::default(),
            eta: Lane::default(),
            factor,
            max_change_per_update,
            min_change_threshold,
        }
    }

    pub fn set_target(&mut self, progress: f64, speed: f64, eta: f64) {
        self.progress.target = progress;
        self.speed.target = speed;
        self.eta.target = eta;
    }

    /// Advances all three lanes by one tick (intended to be called at
    /// roughly 60 Hz) and reports whether anything changed.
    pub fn tick(&mut self) -> bool {
        let a = self.progress.step(self.factor, self.max_change_per_update, self.min_change_threshold);
        let b = self.speed.step(self.factor, self.max_change_per_update, self.min_change_threshold);
        let c = self.eta.step(self.factor, self.max_change_per_update, self.min_change_threshold);
        a || b || c
    }

    pub fn current(&self) -> SmoothedProgress {
        SmoothedProgress {
            progress: self.progress.display,
            speed: self.speed.display,
            eta: self.eta.display,
        }
    }
}
