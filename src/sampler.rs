/*!
 * Head-Based Sampling
 * Deterministic trace-id-ratio decision, fixed once per trace at the root
 */

use crate::config::Environment;
use crate::core::types::TraceId;

/// Upper bound of the comparison space (2^63). Rate 1.0 maps here, which
/// no 63-bit value can reach, so everything is accepted.
const MAX_THRESHOLD: u64 = 1 << 63;

/// Mask selecting the low 63 bits of a trace id
const LOW_63_MASK: u64 = MAX_THRESHOLD - 1;

/// Trace-id-ratio sampler.
///
/// The decision is a pure function of the trace id and the configured rate:
/// the low 63 bits of the id are compared against `rate * 2^63`. Any
/// downstream component recomputing the decision from the propagated trace
/// id agrees with the root.
#[derive(Debug, Clone, Copy)]
pub struct Sampler {
    rate: f64,
    threshold: u64,
}

impl Sampler {
    /// Create a sampler with the given rate, clamped to [0, 1]
    pub fn new(rate: f64) -> Self {
        let rate = rate.clamp(0.0, 1.0);
        Self {
            rate,
            threshold: (rate * MAX_THRESHOLD as f64) as u64,
        }
    }

    /// Sampler for a deployment environment profile
    pub fn for_environment(environment: Environment) -> Self {
        Self::new(environment.sample_rate())
    }

    /// Capture everything
    pub fn always() -> Self {
        Self::new(1.0)
    }

    /// Capture nothing
    pub fn never() -> Self {
        Self::new(0.0)
    }

    /// Decide whether the trace rooted at `trace_id` is sampled.
    ///
    /// Consulted exactly once per trace, at the root; descendants inherit
    /// the decision through context propagation.
    #[inline]
    pub fn decide(&self, trace_id: TraceId) -> bool {
        (trace_id.0 as u64 & LOW_63_MASK) < self.threshold
    }

    #[inline]
    pub fn rate(&self) -> f64 {
        self.rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rate_one_accepts_all() {
        let sampler = Sampler::always();
        for _ in 0..1000 {
            assert!(sampler.decide(TraceId::generate()));
        }
    }

    #[test]
    fn test_rate_zero_accepts_none() {
        let sampler = Sampler::never();
        for _ in 0..1000 {
            assert!(!sampler.decide(TraceId::generate()));
        }
    }

    #[test]
    fn test_decision_is_deterministic() {
        let sampler = Sampler::new(0.10);
        for _ in 0..100 {
            let id = TraceId::generate();
            let first = sampler.decide(id);
            for _ in 0..10 {
                assert_eq!(sampler.decide(id), first);
            }
        }
    }

    #[test]
    fn test_rate_clamped() {
        assert_eq!(Sampler::new(2.5).rate(), 1.0);
        assert_eq!(Sampler::new(-0.1).rate(), 0.0);
    }

    #[test]
    fn test_production_rate_is_roughly_one_in_ten() {
        let sampler = Sampler::for_environment(Environment::Production);
        let sampled = (0..10_000)
            .filter(|_| sampler.decide(TraceId::generate()))
            .count();
        // 10% +- generous tolerance for 10k uniform ids
        assert!((700..1300).contains(&sampled), "sampled {}", sampled);
    }

    proptest! {
        #[test]
        fn prop_same_id_same_decision(id in any::<u128>(), rate in 0.0f64..=1.0) {
            let sampler = Sampler::new(rate);
            let trace_id = TraceId(id);
            prop_assert_eq!(sampler.decide(trace_id), sampler.decide(trace_id));
        }

        #[test]
        fn prop_independent_sampler_instances_agree(id in any::<u128>(), rate in 0.0f64..=1.0) {
            let a = Sampler::new(rate);
            let b = Sampler::new(rate);
            prop_assert_eq!(a.decide(TraceId(id)), b.decide(TraceId(id)));
        }
    }
}
