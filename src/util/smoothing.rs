//! Linear value smoothing for click-free parameter changes.

use super::general::lerp;

/// A linear segment generator ("ramp") which traverses from `0.0` to
/// `1.0` over a duration in milliseconds. Internal system for
/// [`Smoother`].
#[derive(Debug, Clone, Default)]
pub struct Ramp {
    steps_remaining: u32,
    step_size: f64,
    current_value: f64,

    duration_ms: f64,
    sample_rate: f64,
}

impl Ramp {
    /// Returns a new, finished `Ramp` with the provided duration.
    pub fn new(duration_ms: f64, sample_rate: f64) -> Self {
        Self {
            steps_remaining: 0,
            step_size: 0.0,
            current_value: 1.0,
            duration_ms,
            sample_rate,
        }
    }

    /// Restarts the ramp from `0.0`.
    pub fn restart(&mut self) {
        let steps = self.total_steps();
        self.steps_remaining = steps;
        self.step_size = f64::from(steps).recip();
        self.current_value = 0.0;
    }

    /// Restarts the ramp from position `t`, which is clamped to `[0, 1]`.
    pub fn restart_from(&mut self, t: f64) {
        let t = t.clamp(0.0, 1.0);
        let steps = self.total_steps();
        self.step_size = f64::from(steps).recip();
        self.steps_remaining = ((1.0 - t) * f64::from(steps)).round() as u32;
        self.current_value = t;
    }

    /// Forces the ramp to its target immediately.
    pub fn finish(&mut self) {
        self.steps_remaining = 0;
        self.current_value = 1.0;
    }

    /// Yields the next value, intended to be called once per sample.
    pub fn next(&mut self) -> f64 {
        self.skip(1)
    }

    /// Skips `num_steps` steps, returning the new value.
    pub fn skip(&mut self, num_steps: u32) -> f64 {
        if self.steps_remaining == 0 {
            return 1.0;
        }

        if self.steps_remaining <= num_steps {
            self.finish();
        }
        else {
            self.current_value += self.step_size * f64::from(num_steps);
            self.steps_remaining -= num_steps;
        }

        self.current_value
    }

    pub fn is_active(&self) -> bool {
        self.steps_remaining > 0
    }

    pub fn current_value(&self) -> f64 {
        self.current_value
    }

    /// Resets the smoothing period in milliseconds. Takes effect from the
    /// next restart.
    pub fn set_duration(&mut self, duration_ms: f64) {
        self.duration_ms = duration_ms;
    }

    pub fn reset_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    fn total_steps(&self) -> u32 {
        (self.duration_ms / 1000.0 * self.sample_rate).round().max(1.0) as u32
    }
}

/// A linear value smoother. Yields one interpolated value per call to
/// [`next()`][Self::next()]; retargeting restarts the segment from the
/// current value.
#[derive(Debug, Clone, Default)]
pub struct Smoother {
    ramp: Ramp,
    start_value: f64,
    target_value: f64,
    current_value: f64,
}

impl Smoother {
    pub fn new(duration_ms: f64, target_value: f64, sample_rate: f64) -> Self {
        Self {
            ramp: Ramp::new(duration_ms, sample_rate),
            start_value: target_value,
            target_value,
            current_value: target_value,
        }
    }

    /// Yields the next smoothed value, intended to be called per sample.
    pub fn next(&mut self) -> f64 {
        if !self.ramp.is_active() {
            self.current_value = self.target_value;
            return self.current_value;
        }

        let t = self.ramp.next();
        self.current_value = lerp(self.start_value, self.target_value, t);
        self.current_value
    }

    /// Computes a block of new elements and places them into `block`.
    pub fn next_block_exact(&mut self, block: &mut [f64]) {
        for x in block {
            *x = self.next();
        }
    }

    /// Sets the new target value. The starting value becomes the current
    /// value, so retargeting mid-ramp never jumps.
    pub fn set_target_value(&mut self, target_value: f64) {
        self.start_value = self.current_value;
        self.target_value = target_value;
        self.ramp.restart();
    }

    /// Forces the smoother to reach its target value immediately.
    pub fn finish(&mut self) {
        self.ramp.finish();
        self.current_value = self.target_value;
    }

    /// Jumps to `value` with no smoothing.
    pub fn reset_to(&mut self, value: f64) {
        self.start_value = value;
        self.target_value = value;
        self.current_value = value;
        self.ramp.finish();
    }

    pub fn current_value(&self) -> f64 {
        self.current_value
    }

    pub fn target_value(&self) -> f64 {
        self.target_value
    }

    pub fn is_active(&self) -> bool {
        self.ramp.is_active()
    }

    /// Resets the smoothing period in milliseconds.
    pub fn set_smoothing_period(&mut self, duration_ms: f64) {
        self.ramp.set_duration(duration_ms);
    }

    pub fn reset_sample_rate(&mut self, sample_rate: f64) {
        self.ramp.reset_sample_rate(sample_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::within_tolerance;

    #[test]
    fn ramp_reaches_target_in_duration() {
        // 10 ms at 1 kHz is ten steps
        let mut smoother = Smoother::new(10.0, 0.0, 1000.0);
        smoother.set_target_value(1.0);

        for _ in 0..9 {
            let v = smoother.next();
            assert!(v < 1.0);
        }
        assert!(within_tolerance(smoother.next(), 1.0, 1e-12));
        assert!(!smoother.is_active());
    }

    #[test]
    fn retarget_starts_from_current_value() {
        let mut smoother = Smoother::new(10.0, 0.0, 1000.0);
        smoother.set_target_value(1.0);
        smoother.next();
        smoother.next();
        let mid = smoother.current_value();

        smoother.set_target_value(0.0);
        let v = smoother.next();
        assert!(v <= mid);
    }

    #[test]
    fn finished_smoother_holds_target() {
        let mut smoother = Smoother::new(10.0, 0.25, 48_000.0);
        for _ in 0..4 {
            assert!(within_tolerance(smoother.next(), 0.25, 1e-12));
        }
    }
}
