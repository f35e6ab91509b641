//! Single-pole DC removal filter

/// Exponential bias tracker that subtracts slow drift from each sample
///
/// The first sample seeds the bias (output 0); after that
/// `bias ← bias + alpha·(sample − bias)`, output `sample − bias`.
/// Small alpha adapts slowly; alpha = 1 tracks every sample and outputs zero.
#[derive(Debug, Clone)]
pub struct DcFilter {
    alpha: f32,
    bias: f32,
    initialized: bool,
}

impl DcFilter {
    /// Create a filter with coefficient `alpha` in (0, 1]
    pub fn new(alpha: f32) -> Self {
        debug_assert!(alpha > 0.0 && alpha <= 1.0, "dc_alpha out of range");
        Self {
            alpha,
            bias: 0.0,
            initialized: false,
        }
    }

    /// Feed one raw sample, returning the debiased value
    pub fn update(&mut self, sample: f32) -> f32 {
        if self.initialized {
            self.bias += self.alpha * (sample - self.bias);
        } else {
            self.bias = sample;
            self.initialized = true;
        }
        sample - self.bias
    }

    /// Current bias estimate, 0 before the first sample
    pub fn bias(&self) -> f32 {
        self.bias
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Forget the bias estimate; the next sample seeds it again
    pub fn reset(&mut self) {
        self.bias = 0.0;
        self.initialized = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Residual after stepping from 0 to `value` and holding it for `steps` samples
    fn residual_after_step(alpha: f32, value: f32, steps: usize) -> f32 {
        let mut filter = DcFilter::new(alpha);
        filter.update(0.0);
        let mut out = 0.0;
        for _ in 0..steps {
            out = filter.update(value);
        }
        out
    }

    #[test]
    fn test_first_sample_seeds_bias() {
        let mut filter = DcFilter::new(0.01);
        assert_eq!(filter.update(1.02), 0.0);
        assert_eq!(filter.bias(), 1.02);
    }

    #[test]
    fn test_offset_removed_from_the_start() {
        // 1 g offset plus a small tone: no start-up transient
        let mut filter = DcFilter::new(0.01);
        for i in 0..200 {
            let t = i as f32 / 1000.0;
            let out = filter.update(1.0 + 0.05 * (2.0 * std::f32::consts::PI * 50.0 * t).sin());
            assert!(out.abs() < 0.06, "sample {} -> {}", i, out);
        }
    }

    #[test]
    fn test_step_converges_to_zero() {
        let early = residual_after_step(0.05, 1.0, 10);
        let late = residual_after_step(0.05, 1.0, 500);
        assert!(late.abs() < early.abs());
        assert!(late.abs() < 1e-6);
    }

    #[test]
    fn test_larger_alpha_converges_faster() {
        let slow = residual_after_step(0.01, 1.0, 100);
        let fast = residual_after_step(0.2, 1.0, 100);
        assert!(fast.abs() < slow.abs());
    }

    #[test]
    fn test_alpha_one_outputs_zero() {
        let mut filter = DcFilter::new(1.0);
        assert_eq!(filter.update(3.5), 0.0);
        assert_eq!(filter.update(-2.0), 0.0);
        assert_eq!(filter.bias(), -2.0);
    }

    #[test]
    fn test_second_update_follows_recurrence() {
        let mut filter = DcFilter::new(0.25);
        filter.update(0.0);
        let out = filter.update(4.0);
        assert_eq!(filter.bias(), 1.0);
        assert_eq!(out, 3.0);
    }

    #[test]
    fn test_reset_reseeds_from_next_sample() {
        let mut filter = DcFilter::new(0.5);
        filter.update(10.0);
        filter.reset();
        assert_eq!(filter.bias(), 0.0);
        assert_eq!(filter.update(-3.0), 0.0);
        assert_eq!(filter.bias(), -3.0);
    }
}
