use serde::{Deserialize, Serialize};

/// Time constants at or below this are treated as instantaneous.
pub const MIN_TIME_CONSTANT: f32 = 0.02;

/// One exponential smoothing step moving `previous` a fraction `dt / k` of
/// the way toward `target`.
///
/// Returns `target` unchanged when `k <= 0.02` or `dt <= 0`. The step
/// fraction saturates at 1, so a frame longer than `k` lands exactly on the
/// target.
#[inline]
pub fn lowpass(previous: f32, target: f32, k: f32, dt: f32) -> f32 {
    if k > MIN_TIME_CONSTANT && dt > 0.0 {
        let con = (dt / k).min(1.0);
        previous * (1.0 - con) + target * con
    } else {
        target
    }
}

/// A live value paired with the target it is filtered toward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Smoothed {
    pub value: f32,
    pub target: f32,
}

impl Smoothed {
    pub const fn new(value: f32, target: f32) -> Self {
        Self { value, target }
    }

    /// A value already resting on its target.
    pub const fn settled(value: f32) -> Self {
        Self::new(value, value)
    }

    pub fn step(&mut self, k: f32, dt: f32) -> f32 {
        self.value = lowpass(self.value, self.target, k, dt);
        self.value
    }

    /// Sets the target and filters toward it in one go.
    pub fn follow(&mut self, target: f32, k: f32, dt: f32) -> f32 {
        self.target = target;
        self.step(k, dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_target_for_tiny_time_constant_or_no_time() {
        assert_eq!(lowpass(3.0, 7.0, 0.02, 0.016), 7.0);
        assert_eq!(lowpass(3.0, 7.0, 0.0, 0.016), 7.0);
        assert_eq!(lowpass(3.0, 7.0, 0.3, 0.0), 7.0);
        assert_eq!(lowpass(3.0, 7.0, 0.3, -1.0), 7.0);
    }

    #[test]
    fn result_lies_strictly_between_endpoints() {
        for &(prev, target) in &[(0.0_f32, 1.0_f32), (5.0, -2.0), (-1.0, -0.5)] {
            let out = lowpass(prev, target, 0.3, 0.016);
            let (lo, hi) = if prev < target {
                (prev, target)
            } else {
                (target, prev)
            };
            assert!(out > lo && out < hi, "{out} not inside ({lo}, {hi})");
        }
    }

    #[test]
    fn converges_monotonically_without_overshoot() {
        let mut value = Smoothed::new(0.0, 1.0);
        let mut last = value.value;
        for _ in 0..500 {
            let next = value.step(0.1, 1.0 / 60.0);
            assert!(next >= last);
            assert!(next <= 1.0);
            last = next;
        }
        assert!((1.0 - last).abs() < 1e-4);
    }

    #[test]
    fn long_frames_land_on_target() {
        assert_eq!(lowpass(0.0, 2.0, 0.1, 5.0), 2.0);
    }

    #[test]
    fn follow_updates_target() {
        let mut value = Smoothed::settled(1.0);
        value.follow(0.0, 0.2, 0.05);
        assert_eq!(value.target, 0.0);
        assert!((value.value - 0.75).abs() < 1e-6);
    }
}
