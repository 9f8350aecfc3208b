use crate::time::Duration;

/// The one-way-delay smoother: an exponential IIR whose stiffness grows from
/// zero to a configured maximum as samples accumulate, so the estimate
/// converges fast at startup and stays calm afterwards.
#[derive(Debug)]
pub(crate) struct DelayFilter {
    estimate: Option<Duration>,
    stiffness: u8,
    max_stiffness: u8,
}

impl DelayFilter {
    pub(crate) fn new(max_stiffness: u8) -> Self {
        Self {
            estimate: None,
            stiffness: 0,
            max_stiffness,
        }
    }

    /// Feed a raw delay sample, returning the smoothed estimate
    pub(crate) fn feed(&mut self, sample: Duration) -> Duration {
        let estimate = match self.estimate {
            None => sample,
            Some(current) => current + (sample - current) / (1i32 << self.stiffness.min(30)),
        };

        if self.stiffness < self.max_stiffness {
            self.stiffness += 1;
        }

        self.estimate = Some(estimate);
        estimate
    }

    /// The current estimate, if any sample arrived yet
    pub(crate) fn estimate(&self) -> Option<Duration> {
        self.estimate
    }

    pub(crate) fn reset(&mut self) {
        self.estimate = None;
        self.stiffness = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_passes_through() {
        let mut filter = DelayFilter::new(6);
        assert_eq!(filter.feed(Duration::from_micros(75)), Duration::from_micros(75));
    }

    #[test]
    fn smoothing_stiffens_over_time() {
        let mut filter = DelayFilter::new(2);

        filter.feed(Duration::from_nanos(1000));
        // stiffness 1: y += (2000 - 1000) / 2
        assert_eq!(filter.feed(Duration::from_nanos(2000)), Duration::from_nanos(1500));
        // stiffness 2: y += (3500 - 1500) / 4
        assert_eq!(filter.feed(Duration::from_nanos(3500)), Duration::from_nanos(2000));
        // stiffness capped at 2: y += (4000 - 2000) / 4
        assert_eq!(filter.feed(Duration::from_nanos(4000)), Duration::from_nanos(2500));
    }

    #[test]
    fn reset_forgets_the_estimate() {
        let mut filter = DelayFilter::new(6);
        filter.feed(Duration::from_nanos(1000));
        filter.reset();
        assert_eq!(filter.estimate(), None);
    }
}
