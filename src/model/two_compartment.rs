//! Closed forms for the 2-compartment models
//!
//! Parameterized by clearances and volumes (cl, v1, q, v2), converted to
//! micro-rate constants before the exponential terms are assembled.

use super::{MIN_RATE_SEPARATION, ModelError};

/// Micro-rate constants from the clearance parameterization
pub(super) fn micro_rates(cl: f64, v1: f64, q: f64, v2: f64) -> (f64, f64, f64) {
    (cl / v1, q / v1, q / v2)
}

/// Disposition eigenvalues, alpha >= beta > 0
///
/// The discriminant equals (k10 - k21)^2 + k12^2 + 2 k12 (k10 + k21), which
/// is strictly positive for positive rates, so both roots are real.
pub(super) fn eigenvalues(k10: f64, k12: f64, k21: f64) -> (f64, f64) {
    let sum = k10 + k12 + k21;
    let root = (sum * sum - 4.0 * k10 * k21).sqrt();
    let alpha = (sum + root) / 2.0;
    let beta = (sum - root) / 2.0;
    (alpha, beta)
}

/// IV bolus, bi-exponential:
/// C(t) = D/v1 [ (alpha - k21)/(alpha - beta) e^(-alpha t)
///             + (k21 - beta)/(alpha - beta) e^(-beta t) ]
pub(super) fn iv_bolus(t: f64, cl: f64, v1: f64, q: f64, v2: f64, dose: f64) -> f64 {
    let (k10, k12, k21) = micro_rates(cl, v1, q, v2);
    let (alpha, beta) = eigenvalues(k10, k12, k21);
    let a = (alpha - k21) / (alpha - beta);
    let b = (k21 - beta) / (alpha - beta);
    dose / v1 * (a * (-alpha * t).exp() + b * (-beta * t).exp())
}

/// First-order absorption, tri-exponential by partial fractions:
/// C(t) = ka D / v1 [ (k21 - alpha) / ((ka - alpha)(beta - alpha)) e^(-alpha t)
///                  + (k21 - beta)  / ((ka - beta)(alpha - beta))  e^(-beta t)
///                  + (k21 - ka)    / ((alpha - ka)(beta - ka))    e^(-ka t) ]
///
/// The expansion is degenerate when ka collides with a disposition
/// eigenvalue, which is reported as a domain error rather than evaluated.
pub(super) fn oral(
    t: f64,
    ka: f64,
    cl: f64,
    v1: f64,
    q: f64,
    v2: f64,
    dose: f64,
) -> Result<f64, ModelError> {
    let (k10, k12, k21) = micro_rates(cl, v1, q, v2);
    let (alpha, beta) = eigenvalues(k10, k12, k21);

    for rate in [alpha, beta] {
        if (ka - rate).abs() <= MIN_RATE_SEPARATION * ka.max(rate) {
            return Err(ModelError::RateCoincidence { ka, rate });
        }
    }

    let term_alpha = (k21 - alpha) / ((ka - alpha) * (beta - alpha)) * (-alpha * t).exp();
    let term_beta = (k21 - beta) / ((ka - beta) * (alpha - beta)) * (-beta * t).exp();
    let term_ka = (k21 - ka) / ((alpha - ka) * (beta - ka)) * (-ka * t).exp();

    Ok(ka * dose / v1 * (term_alpha + term_beta + term_ka))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_eigenvalues_ordered_and_positive() {
        let (k10, k12, k21) = micro_rates(5.0, 20.0, 10.0, 50.0);
        let (alpha, beta) = eigenvalues(k10, k12, k21);
        assert!(alpha > beta);
        assert!(beta > 0.0);
        // trace and determinant identities
        assert_relative_eq!(alpha + beta, k10 + k12 + k21, max_relative = 1e-12);
        assert_relative_eq!(alpha * beta, k10 * k21, max_relative = 1e-12);
    }

    #[test]
    fn test_iv_bolus_initial_concentration() {
        // at t = 0 all the dose sits in the central compartment
        let c0 = iv_bolus(0.0, 5.0, 20.0, 10.0, 50.0, 100.0);
        assert_relative_eq!(c0, 100.0 / 20.0, max_relative = 1e-12);
    }

    #[test]
    fn test_iv_bolus_decays() {
        let c1 = iv_bolus(1.0, 5.0, 20.0, 10.0, 50.0, 100.0);
        let c4 = iv_bolus(4.0, 5.0, 20.0, 10.0, 50.0, 100.0);
        assert!(c1 > c4);
        assert!(c4 > 0.0);
    }

    #[test]
    fn test_oral_zero_at_origin() {
        let c0 = oral(0.0, 1.2, 5.0, 20.0, 10.0, 50.0, 100.0).unwrap();
        assert_relative_eq!(c0, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_oral_rejects_rate_coincidence() {
        let (k10, k12, k21) = micro_rates(5.0, 20.0, 10.0, 50.0);
        let (alpha, _) = eigenvalues(k10, k12, k21);
        assert!(matches!(
            oral(1.0, alpha, 5.0, 20.0, 10.0, 50.0, 100.0),
            Err(ModelError::RateCoincidence { .. })
        ));
    }

    #[test]
    fn test_oral_mass_balance_at_late_times() {
        // all exponents decay, concentration tends to zero
        let c = oral(500.0, 1.2, 5.0, 20.0, 10.0, 50.0, 100.0).unwrap();
        assert!(c.abs() < 1e-9);
    }
}
