//! Bernoulli beliefs stored as log-odds.
//!
//! Log-odds make the exponential-family product a sum and the quotient a
//! difference, which is exactly what message passing needs:
//! - product: `L = L_a + L_b`
//! - division (cavity): `L = L_a - L_b`
//!
//! Values are clamped to `[-MAX_LOG_ODDS, MAX_LOG_ODDS]` so that a saturated
//! belief can still be divided back out without producing `inf - inf`.

use serde::{Deserialize, Serialize};

use super::stable::{log_sigmoid, logit, sigmoid};

/// Clamp for stored log-odds. sigmoid(40) differs from 1 by about 4e-18.
pub const MAX_LOG_ODDS: f64 = 40.0;

/// Bernoulli belief over a boolean variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bernoulli {
    /// ln P(true) - ln P(false), clamped.
    pub log_odds: f64,
}

fn clamp(log_odds: f64) -> f64 {
    if log_odds.is_nan() {
        return 0.0;
    }
    log_odds.clamp(-MAX_LOG_ODDS, MAX_LOG_ODDS)
}

impl Bernoulli {
    pub fn from_log_odds(log_odds: f64) -> Self {
        Self {
            log_odds: clamp(log_odds),
        }
    }

    /// Belief with P(true) = p. Probabilities outside [0,1] map to uniform.
    pub fn from_prob(p: f64) -> Self {
        Self::from_log_odds(logit(p))
    }

    /// The (clamped) point mass on `value`.
    pub fn point_mass(value: bool) -> Self {
        if value {
            Self::from_log_odds(MAX_LOG_ODDS)
        } else {
            Self::from_log_odds(-MAX_LOG_ODDS)
        }
    }

    pub fn uniform() -> Self {
        Self { log_odds: 0.0 }
    }

    pub fn prob_true(&self) -> f64 {
        sigmoid(self.log_odds)
    }

    pub fn prob_false(&self) -> f64 {
        sigmoid(-self.log_odds)
    }

    pub fn log_prob_true(&self) -> f64 {
        log_sigmoid(self.log_odds)
    }

    pub fn log_prob_false(&self) -> f64 {
        log_sigmoid(-self.log_odds)
    }

    /// Bernoulli variance p(1-p).
    pub fn variance(&self) -> f64 {
        self.prob_true() * self.prob_false()
    }

    /// Normalized product of two messages over the same variable.
    pub fn product(&self, other: &Bernoulli) -> Self {
        Self::from_log_odds(self.log_odds + other.log_odds)
    }

    /// Quotient `self / other`, used to form cavity distributions.
    pub fn divide(&self, other: &Bernoulli) -> Self {
        Self::from_log_odds(self.log_odds - other.log_odds)
    }

    /// Absolute change in P(true), the convergence proxy used per sweep.
    pub fn prob_change(&self, other: &Bernoulli) -> f64 {
        (self.prob_true() - other.prob_true()).abs()
    }

    /// KL(self || other).
    pub fn kl_divergence(&self, other: &Bernoulli) -> f64 {
        let p = self.prob_true();
        let q = 1.0 - p;
        let mut kl = 0.0;
        if p > 0.0 {
            kl += p * (self.log_prob_true() - other.log_prob_true());
        }
        if q > 0.0 {
            kl += q * (self.log_prob_false() - other.log_prob_false());
        }
        kl.max(0.0)
    }
}

impl Default for Bernoulli {
    fn default() -> Self {
        Self::uniform()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        if a.is_nan() || b.is_nan() {
            return false;
        }
        (a - b).abs() <= tol
    }

    #[test]
    fn from_prob_round_trips() {
        for p in [0.01, 0.25, 0.5, 0.75, 0.99] {
            assert!(approx_eq(Bernoulli::from_prob(p).prob_true(), p, 1e-12));
        }
    }

    #[test]
    fn saturated_probabilities_are_clamped() {
        let b = Bernoulli::from_prob(1.0);
        assert_eq!(b.log_odds, MAX_LOG_ODDS);
        let z = Bernoulli::from_prob(0.0);
        assert_eq!(z.log_odds, -MAX_LOG_ODDS);
        assert!(b.divide(&b).log_odds.abs() < 1e-12);
    }

    #[test]
    fn invalid_probability_is_uniform() {
        assert_eq!(Bernoulli::from_prob(f64::NAN), Bernoulli::uniform());
        assert_eq!(Bernoulli::from_prob(2.0), Bernoulli::uniform());
    }

    #[test]
    fn product_matches_bayes_rule() {
        // prior 0.2, likelihood ratio 3:1 in favour of true
        let prior = Bernoulli::from_prob(0.2);
        let lik = Bernoulli::from_log_odds(3.0f64.ln());
        let post = prior.product(&lik);
        let expected = 0.2 * 3.0 / (0.2 * 3.0 + 0.8);
        assert!(approx_eq(post.prob_true(), expected, 1e-12));
    }

    #[test]
    fn divide_undoes_product() {
        let a = Bernoulli::from_prob(0.3);
        let b = Bernoulli::from_prob(0.9);
        let back = a.product(&b).divide(&b);
        assert!(approx_eq(back.prob_true(), 0.3, 1e-12));
    }

    #[test]
    fn kl_divergence() {
        let a = Bernoulli::from_prob(0.5);
        let b = Bernoulli::from_prob(0.9);
        assert!(approx_eq(a.kl_divergence(&a), 0.0, 1e-12));
        assert!(a.kl_divergence(&b) > 0.0);
    }
}
