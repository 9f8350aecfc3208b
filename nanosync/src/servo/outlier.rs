//! Peirce-criterion outlier rejection over a sliding sample window

use arrayvec::ArrayVec;

#[allow(unused_imports)]
use crate::float_polyfill::FloatPolyfill;

/// Window length of the moving statistics; also the table length of the
/// Peirce criterion.
const WINDOW: usize = 60;

/// Peirce's criterion (one doubtful observation): the maximum ratio of
/// deviation to standard deviation for sample counts 3..=60, after Gould's
/// tabulation. Below three samples no rejection is possible.
#[rustfmt::skip]
const PEIRCE_R: [f64; 58] = [
    1.196, 1.383, 1.509, 1.610, 1.693, 1.763, 1.824, 1.878, 1.925, 1.969,
    2.007, 2.043, 2.076, 2.106, 2.134, 2.161, 2.185, 2.209, 2.230, 2.251,
    2.271, 2.290, 2.307, 2.324, 2.341, 2.356, 2.371, 2.385, 2.399, 2.412,
    2.425, 2.438, 2.450, 2.461, 2.472, 2.483, 2.494, 2.504, 2.514, 2.524,
    2.533, 2.542, 2.551, 2.560, 2.568, 2.577, 2.585, 2.592, 2.600, 2.608,
    2.615, 2.622, 2.629, 2.636, 2.643, 2.649, 2.656, 2.662,
];

fn peirce_limit(n: usize) -> Option<f64> {
    match n {
        0..=2 => None,
        3..=WINDOW => Some(PEIRCE_R[n - 3]),
        _ => Some(PEIRCE_R[WINDOW - 3]),
    }
}

/// A bounded window of float samples with mean and standard deviation
#[derive(Debug, Default)]
struct MovingStatistics {
    samples: ArrayVec<f64, WINDOW>,
    next: usize,
}

impl MovingStatistics {
    fn push(&mut self, sample: f64) {
        if self.samples.is_full() {
            self.samples[self.next] = sample;
            self.next = (self.next + 1) % WINDOW;
        } else {
            self.samples.push(sample);
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }

    fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    fn stddev(&self) -> f64 {
        if self.samples.len() < 2 {
            return 0.0;
        }
        let mean = self.mean();
        let variance = self
            .samples
            .iter()
            .map(|s| (s - mean) * (s - mean))
            .sum::<f64>()
            / (self.samples.len() - 1) as f64;
        variance.sqrt()
    }

    fn clear(&mut self) {
        self.samples.clear();
        self.next = 0;
    }
}

/// Outlier filter configuration
#[derive(Debug, Clone, Copy)]
pub struct OutlierFilterConfig {
    /// Whether the filter runs at all
    pub enabled: bool,
    /// Multiplier on the Peirce acceptance band
    pub threshold: f64,
    /// Blend factor of replacement samples, in `[0.01, 2.0]`
    pub weight: f64,
    /// Replace rejected samples with the running mean instead of dropping
    /// them
    pub replace: bool,
    /// Walk the threshold automatically to hold the discard percentage
    pub autotune: bool,
    /// Lowest discard percentage considered healthy
    pub min_percent: u8,
    /// Highest discard percentage considered healthy
    pub max_percent: u8,
    /// Step of an autotune threshold adjustment
    pub threshold_step: f64,
    /// Lower bound of the autotuned threshold
    pub min_threshold: f64,
    /// Upper bound of the autotuned threshold
    pub max_threshold: f64,
    /// Block clock updates when a raw sample exceeds this (nanoseconds);
    /// zero disables step detection
    pub step_level: f64,
    /// Hysteresis around the step level
    pub step_threshold: f64,
}

impl Default for OutlierFilterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 1.0,
            weight: 1.0,
            replace: true,
            autotune: true,
            min_percent: 20,
            max_percent: 95,
            threshold_step: 0.1,
            min_threshold: 0.1,
            max_threshold: 5.0,
            step_level: 0.0,
            step_threshold: 0.0,
        }
    }
}

/// What to do with a sample that went through the filter
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum FilterDecision {
    /// Use the sample as is
    Accept(f64),
    /// The sample is an outlier; use this substitute instead
    Replace(f64),
    /// The sample is an outlier and must be discarded
    Discard,
    /// A clock step was detected; suspend updates entirely
    Block,
}

/// A Peirce-criterion outlier filter with threshold autotune and a
/// step-detection credit budget.
#[derive(Debug)]
pub(crate) struct OutlierFilter {
    config: OutlierFilterConfig,
    stats: MovingStatistics,
    threshold: f64,
    tune_samples: u32,
    tune_outliers: u32,
    step_credit: i32,
}

/// Credit spent per blocked sample; recharged once per full window
const STEP_CREDIT_MAX: i32 = WINDOW as i32;

impl OutlierFilter {
    pub(crate) fn new(config: OutlierFilterConfig) -> Self {
        Self {
            config,
            stats: MovingStatistics::default(),
            threshold: config.threshold,
            tune_samples: 0,
            tune_outliers: 0,
            step_credit: STEP_CREDIT_MAX,
        }
    }

    /// Run one sample (nanoseconds) through the filter
    pub(crate) fn feed(&mut self, sample: f64) -> FilterDecision {
        if !self.config.enabled {
            return FilterDecision::Accept(sample);
        }

        // Step detection runs on the raw value before any statistics
        if self.config.step_level > 0.0
            && sample.abs() > self.config.step_level - self.config.step_threshold
        {
            if self.step_credit > 0 {
                self.step_credit -= 1;
                return FilterDecision::Block;
            }
            // Out of credit: the level shift is apparently real, let it pass
            // and restart the statistics from it
            self.stats.clear();
        }

        let decision = match peirce_limit(self.stats.len()) {
            None => FilterDecision::Accept(sample),
            Some(limit) => {
                let mean = self.stats.mean();
                let max_deviation =
                    limit * self.stats.stddev() * self.threshold * self.config.weight;

                if (sample - mean).abs() <= max_deviation || max_deviation == 0.0 {
                    FilterDecision::Accept(sample)
                } else {
                    self.tune_outliers += 1;
                    if self.config.replace {
                        FilterDecision::Replace(mean)
                    } else {
                        FilterDecision::Discard
                    }
                }
            }
        };

        self.stats.push(sample);
        self.tune_samples += 1;

        if self.tune_samples >= WINDOW as u32 {
            self.autotune();
            self.step_credit = (self.step_credit + 1).min(STEP_CREDIT_MAX);
        }

        decision
    }

    /// One autotune round per full window: walk the threshold to keep the
    /// discard percentage inside the configured band.
    fn autotune(&mut self) {
        if self.config.autotune {
            let percentage = (self.tune_outliers * 100) / self.tune_samples.max(1);

            if percentage > self.config.max_percent as u32 {
                self.threshold += self.config.threshold_step;
            } else if percentage < self.config.min_percent as u32 {
                self.threshold -= self.config.threshold_step;
            }

            self.threshold = self
                .threshold
                .clamp(self.config.min_threshold, self.config.max_threshold);

            log::debug!(
                "outlier filter autotune: {} samples, {} outliers ({}%), threshold {:.02}",
                self.tune_samples,
                self.tune_outliers,
                percentage,
                self.threshold
            );
        }

        self.tune_samples = 0;
        self.tune_outliers = 0;
    }

    pub(crate) fn reset(&mut self) {
        self.stats.clear();
        self.threshold = self.config.threshold;
        self.tune_samples = 0;
        self.tune_outliers = 0;
        self.step_credit = STEP_CREDIT_MAX;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_config() -> OutlierFilterConfig {
        OutlierFilterConfig {
            enabled: true,
            autotune: false,
            ..Default::default()
        }
    }

    #[test]
    fn disabled_filter_accepts_everything() {
        let mut filter = OutlierFilter::new(OutlierFilterConfig::default());
        assert_eq!(filter.feed(1e9), FilterDecision::Accept(1e9));
    }

    #[test]
    fn spike_is_rejected_after_warmup() {
        let mut filter = OutlierFilter::new(enabled_config());

        for i in 0..20 {
            let sample = 1000.0 + (i % 5) as f64;
            filter.feed(sample);
        }

        match filter.feed(100_000.0) {
            FilterDecision::Replace(substitute) => {
                assert!((substitute - 1002.0).abs() < 10.0);
            }
            other => panic!("expected replacement, got {other:?}"),
        }
    }

    #[test]
    fn consistent_samples_pass() {
        let mut filter = OutlierFilter::new(enabled_config());

        for i in 0..100 {
            let sample = 1000.0 + (i % 7) as f64;
            assert!(matches!(filter.feed(sample), FilterDecision::Accept(_)));
        }
    }

    #[test]
    fn step_detection_blocks_until_credit_runs_out() {
        let config = OutlierFilterConfig {
            enabled: true,
            autotune: false,
            step_level: 1e6,
            step_threshold: 0.0,
            ..Default::default()
        };
        let mut filter = OutlierFilter::new(config);

        for _ in 0..STEP_CREDIT_MAX {
            assert_eq!(filter.feed(5e6), FilterDecision::Block);
        }

        // Credit exhausted: the shift is accepted as genuine
        assert!(matches!(filter.feed(5e6), FilterDecision::Accept(_)));
    }
}
