//! Closed forms for the 1-compartment models

use super::MIN_RATE_SEPARATION;

/// IV bolus: C(t) = (D/v) e^(-k t)
pub(super) fn iv_bolus(t: f64, k: f64, v: f64, dose: f64) -> f64 {
    dose / v * (-k * t).exp()
}

/// First-order absorption:
/// C(t) = (D ka) / (v (ka - k)) (e^(-k t) - e^(-ka t))
///
/// When ka and k coincide the difference quotient degenerates; the limit
/// C(t) = (D k t / v) e^(-k t) is exact there and is used inside a small
/// relative band around ka = k.
pub(super) fn oral(t: f64, ka: f64, k: f64, v: f64, dose: f64) -> f64 {
    if (ka - k).abs() <= MIN_RATE_SEPARATION * ka.max(k) {
        dose * k * t / v * (-k * t).exp()
    } else {
        dose * ka / (v * (ka - k)) * ((-k * t).exp() - (-ka * t).exp())
    }
}

/// Constant-rate infusion over [0, duration]:
/// C(t) = R / (k v) (1 - e^(-k t))                   for t <= duration
/// C(t) = C(duration) e^(-k (t - duration))          afterwards
pub(super) fn infusion(t: f64, k: f64, v: f64, rate: f64, duration: f64) -> f64 {
    let kv = k * v;
    if t <= duration {
        rate / kv * (1.0 - (-k * t).exp())
    } else {
        let c_end = rate / kv * (1.0 - (-k * duration).exp());
        c_end * (-k * (t - duration)).exp()
    }
}
