/// Slot-indexed exponentially weighted moving average with window `W`.
///
/// Each slot a value is either decayed, `v ← (1 − 1/W)·v`, or blended with
/// a sample, `v ← (1 − 1/W)·v + (1/W)·x`. A window of 1 tracks the last
/// sample exactly; larger windows remember roughly `W` slots.
#[derive(Debug, Clone, Copy)]
pub struct SlotEwma {
    gain: f64,
}

impl SlotEwma {
    /// `window` must be positive; configuration validation guarantees it.
    pub fn new(window: u32) -> Self {
        debug_assert!(window > 0);
        Self {
            gain: 1.0 / f64::from(window),
        }
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn decay(&self, value: f64) -> f64 {
        (1.0 - self.gain) * value
    }

    pub fn blend(&self, value: f64, sample: f64) -> f64 {
        (1.0 - self.gain) * value + self.gain * sample
    }
}

/// Continuous-time EWMA for irregularly spaced samples.
///
/// A sample taken `dt` seconds after the previous one gets weight
/// `1 − exp(−dt/τ)`, so bursts of samples at nearly the same instant move
/// the estimate very little. The first sample initialises the estimate.
#[derive(Debug, Clone)]
pub struct DelayEwma {
    value: f64,
    time_constant: f64,
    last_sample_at: Option<f64>,
    samples: u64,
}

impl DelayEwma {
    pub fn new(time_constant: f64) -> Self {
        Self {
            value: 0.0,
            time_constant,
            last_sample_at: None,
            samples: 0,
        }
    }

    /// Feeds `sample` observed at time `now`.
    ///
    /// Non-finite samples are ignored so they cannot poison the estimate.
    pub fn update(&mut self, now: f64, sample: f64) {
        if !sample.is_finite() {
            return;
        }
        match self.last_sample_at {
            None => self.value = sample,
            Some(prev) => {
                let dt = (now - prev).max(0.0);
                let weight = 1.0 - (-dt / self.time_constant).exp();
                self.value = (1.0 - weight) * self.value + weight * sample;
            }
        }
        self.last_sample_at = Some(now);
        self.samples += 1;
    }

    /// Current estimate, `0.0` before the first sample.
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }
}
