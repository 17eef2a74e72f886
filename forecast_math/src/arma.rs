//! Helpers for autoregressive moving-average processes

/// Check that the AR polynomial `1 - phi_1 B - ... - phi_p B^p` has all roots outside
/// the unit circle.
///
/// Runs the Levinson-Durbin recursion backwards: the process is stationary exactly when
/// every implied partial autocorrelation lies strictly inside (-1, 1).
pub fn is_stationary_ar(coefficients: &[f64]) -> bool {
    if coefficients.iter().any(|c| !c.is_finite()) {
        return false;
    }

    let mut a = coefficients.to_vec();
    for k in (0..a.len()).rev() {
        let r = a[k];
        if !(r.abs() < 1.0) {
            return false;
        }
        if k == 0 {
            break;
        }
        let denom = 1.0 - r * r;
        a = (0..k).map(|j| (a[j] + r * a[k - 1 - j]) / denom).collect();
    }
    true
}

/// Check that the MA polynomial `1 + theta_1 B + ... + theta_q B^q` is invertible
pub fn is_invertible_ma(coefficients: &[f64]) -> bool {
    let negated: Vec<f64> = coefficients.iter().map(|c| -c).collect();
    is_stationary_ar(&negated)
}

/// Psi weights of an ARIMA(p, d, q) process, `psi_0 = 1`.
///
/// The h-step forecast error variance is `sigma^2 * sum(psi_j^2, j < h)`.
pub fn psi_weights(ar: &[f64], ma: &[f64], d: usize, count: usize) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }

    let mut psi = vec![0.0; count];
    psi[0] = 1.0;
    for j in 1..count {
        let mut value = ma.get(j - 1).copied().unwrap_or(0.0);
        for (i, phi) in ar.iter().enumerate() {
            if j > i {
                value += phi * psi[j - 1 - i];
            }
        }
        psi[j] = value;
    }

    // Each integration multiplies by 1 / (1 - B), a running sum of the weights
    for _ in 0..d {
        let mut running = 0.0;
        for w in psi.iter_mut() {
            running += *w;
            *w = running;
        }
    }

    psi
}
