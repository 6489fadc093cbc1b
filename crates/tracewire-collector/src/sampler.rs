//! Before-the-fact trace sampling.
//!
//! A collector receives a trace incrementally and repeats the sampling
//! decision for every part, so the decision must be a pure function of
//! the trace ID and the rate: the same ID always lands on the same side
//! of the boundary, in any process holding the same rate.

use crate::CollectorError;

/// Accepts a configurable fraction of trace IDs, consistently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sampler {
    Always,
    Never,
    /// Accepts IDs whose magnitude falls below the boundary.
    Boundary(i64),
}

impl Sampler {
    /// Builds a sampler keeping `rate` of traces, where 1 keeps all and
    /// 0 keeps none. Rates outside `[0, 1]` are a configuration error.
    pub fn create(rate: f32) -> Result<Sampler, CollectorError> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(CollectorError::InvalidSampleRate(rate));
        }
        Ok(if rate == 0.0 {
            Sampler::Never
        } else if rate == 1.0 {
            Sampler::Always
        } else {
            Sampler::Boundary((rate as f64 * i64::MAX as f64) as i64)
        })
    }

    pub fn is_sampled(self, trace_id: i64) -> bool {
        match self {
            Sampler::Always => true,
            Sampler::Never => false,
            Sampler::Boundary(boundary) => {
                // the absolute value of i64::MIN overflows; give it the
                // same decision as i64::MAX
                let t = if trace_id == i64::MIN {
                    i64::MAX
                } else {
                    trace_id.abs()
                };
                t < boundary
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_zero_rejects_everything() {
        let sampler = Sampler::create(0.0).unwrap();
        for trace_id in [0, 1, -1, i64::MIN, i64::MAX] {
            assert!(!sampler.is_sampled(trace_id));
        }
    }

    #[test]
    fn rate_one_accepts_everything() {
        let sampler = Sampler::create(1.0).unwrap();
        for trace_id in [0, 1, -1, i64::MIN, i64::MAX] {
            assert!(sampler.is_sampled(trace_id));
        }
    }

    #[test]
    fn most_negative_id_matches_most_positive() {
        for rate in [0.001, 0.5, 0.999] {
            let sampler = Sampler::create(rate).unwrap();
            assert_eq!(
                sampler.is_sampled(i64::MIN),
                sampler.is_sampled(i64::MAX)
            );
        }
    }

    #[test]
    fn decisions_are_deterministic_across_instances() {
        let first = Sampler::create(0.01).unwrap();
        let second = Sampler::create(0.01).unwrap();
        for trace_id in [
            1_234_567_890_987_654_321,
            -42,
            0x00f0_67aa_0ba9_02b7_i64,
            i64::MIN,
        ] {
            assert_eq!(first.is_sampled(trace_id), second.is_sampled(trace_id));
            assert_eq!(first.is_sampled(trace_id), first.is_sampled(trace_id));
        }
    }

    #[test]
    fn boundary_separates_small_from_large_magnitudes() {
        let sampler = Sampler::create(0.5).unwrap();
        assert!(sampler.is_sampled(1));
        assert!(sampler.is_sampled(-1));
        assert!(!sampler.is_sampled(i64::MAX));
        assert!(!sampler.is_sampled(i64::MIN));
    }

    #[test]
    fn out_of_range_rates_fail_fast() {
        assert!(matches!(
            Sampler::create(1.1),
            Err(CollectorError::InvalidSampleRate(_))
        ));
        assert!(matches!(
            Sampler::create(-0.1),
            Err(CollectorError::InvalidSampleRate(_))
        ));
        assert!(matches!(
            Sampler::create(f32::NAN),
            Err(CollectorError::InvalidSampleRate(_))
        ));
    }
}
