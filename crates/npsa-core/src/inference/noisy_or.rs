//! Noisy-OR attribution factor.
//!
//! `hadBadSite_c = OR_s isBadSite_s`, and `isDetractor_c` is emitted with
//! probability `t` (true rate) when `hadBadSite_c` holds and `f` (false
//! rate) otherwise. With cavity beliefs `b_s` (site belief with this
//! customer's own message divided out) and `Q_-s = prod_{t != s} (1 - b_t)`,
//! the exact sum-product message to site `s` is
//!
//! ```text
//! m_s = ln e1 - ln(e0 Q_-s + e1 (1 - Q_-s))
//! ```
//!
//! where `e1 = P(y | hadBad)` and `e0 = P(y | !hadBad)`. The probability
//! that the OR is true given the observation and the cavities,
//! `rho = e1 (1 - Q) / (e1 (1 - Q) + e0 Q)`, splits each customer between
//! the true-rate and false-rate soft counts.
//!
//! Everything is evaluated in the log domain; a customer with no touched
//! sites has `Q = 1`, sends nothing and counts fully toward the false rate.

use npsa_math::{log_add_exp, log_sigmoid, Beta, MAX_LOG_ODDS};

/// Emission log-probabilities for one observed response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Emission {
    /// `ln P(y | hadBadSite)`.
    pub log_e1: f64,
    /// `ln P(y | !hadBadSite)`.
    pub log_e0: f64,
}

impl Emission {
    /// Emissions at the posterior means of the two rate beliefs.
    pub fn new(is_detractor: bool, true_rate: &Beta, false_rate: &Beta) -> Self {
        let (t, f) = (true_rate.mean(), false_rate.mean());
        if is_detractor {
            Self {
                log_e1: t.ln(),
                log_e0: f.ln(),
            }
        } else {
            Self {
                log_e1: (-t).ln_1p(),
                log_e0: (-f).ln_1p(),
            }
        }
    }
}

/// `ln(1 - exp(log_q))` for `log_q <= 0`; `-inf` at `log_q = 0`.
fn log_one_minus_exp(log_q: f64) -> f64 {
    if log_q >= 0.0 {
        f64::NEG_INFINITY
    } else {
        (-log_q.exp_m1()).ln()
    }
}

/// `ln P(site good)` under a cavity log-odds.
pub fn log_prob_good(cavity_log_odds: f64) -> f64 {
    log_sigmoid(-cavity_log_odds)
}

/// Message into one site given `ln Q_-s`, the log-probability that every
/// other touched site is good.
pub fn site_message(emission: Emission, log_q_others: f64) -> f64 {
    let log_q = log_q_others.min(0.0);
    let evidence = log_add_exp(
        emission.log_e0 + log_q,
        emission.log_e1 + log_one_minus_exp(log_q),
    );
    (emission.log_e1 - evidence).clamp(-MAX_LOG_ODDS, MAX_LOG_ODDS)
}

/// `P(hadBadSite | y, cavities)` given `ln Q` over all touched sites.
pub fn responsibility(emission: Emission, log_q: f64) -> f64 {
    let log_q = log_q.min(0.0);
    let bad = emission.log_e1 + log_one_minus_exp(log_q);
    if bad == f64::NEG_INFINITY {
        return 0.0;
    }
    let total = log_add_exp(bad, emission.log_e0 + log_q);
    (bad - total).exp().clamp(0.0, 1.0)
}

/// `1 - prod_s (1 - b_s)` from `ln prod_s (1 - b_s)`. Exactly 0 for an
/// empty product.
pub fn or_probability(log_q: f64) -> f64 {
    if log_q >= 0.0 {
        0.0
    } else {
        -log_q.exp_m1()
    }
}

/// Soft true/false-positive counts accumulated over customers.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateCounts {
    /// Detractors attributed to a bad site.
    pub true_positive: f64,
    /// Non-detractors despite a bad site.
    pub true_negative: f64,
    /// Detractors with no bad site.
    pub false_positive: f64,
    /// Non-detractors with no bad site.
    pub false_negative: f64,
}

impl RateCounts {
    pub fn add(&mut self, is_detractor: bool, rho: f64) {
        if is_detractor {
            self.true_positive += rho;
            self.false_positive += 1.0 - rho;
        } else {
            self.true_negative += rho;
            self.false_negative += 1.0 - rho;
        }
    }

    /// Conjugate updates of the two rate priors.
    pub fn posteriors(&self, true_prior: &Beta, false_prior: &Beta) -> Option<(Beta, Beta)> {
        Some((
            true_prior.with_soft_counts(self.true_positive, self.true_negative)?,
            false_prior.with_soft_counts(self.false_positive, self.false_negative)?,
        ))
    }
}
