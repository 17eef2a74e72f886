//! Derivative-free minimisation

use std::time::Instant;

/// Configuration for Nelder-Mead minimisation
#[derive(Debug, Clone, Copy)]
pub struct NelderMeadConfig {
    /// Maximum number of iterations
    pub max_iter: usize,
    /// Convergence tolerance on the spread of objective values
    pub tolerance: f64,
    /// Initial simplex step along each axis
    pub initial_step: f64,
    /// Stop unconverged once this instant has passed
    pub deadline: Option<Instant>,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        Self {
            max_iter: 500,
            tolerance: 1e-9,
            initial_step: 0.1,
            deadline: None,
        }
    }
}

/// Result of a Nelder-Mead run
#[derive(Debug, Clone)]
pub struct NelderMeadResult {
    /// Best point found
    pub point: Vec<f64>,
    /// Objective at `point`
    pub value: f64,
    /// Iterations used
    pub iterations: usize,
    /// Whether the simplex collapsed within tolerance before `max_iter`
    pub converged: bool,
}

/// Minimise `objective` starting from `initial`.
///
/// Points are clamped into `bounds` when given. Non-finite objective values are treated
/// as `+inf`, so the simplex walks away from them.
pub fn nelder_mead<F>(
    objective: F,
    initial: &[f64],
    bounds: Option<&[(f64, f64)]>,
    config: NelderMeadConfig,
) -> NelderMeadResult
where
    F: Fn(&[f64]) -> f64,
{
    let n = initial.len();
    let eval = |x: &[f64]| {
        let v = objective(x);
        if v.is_finite() {
            v
        } else {
            f64::INFINITY
        }
    };

    if n == 0 {
        let value = eval(initial);
        return NelderMeadResult {
            point: Vec::new(),
            value,
            iterations: 0,
            converged: value.is_finite(),
        };
    }

    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    simplex.push(clamp(initial.to_vec(), bounds));
    for i in 0..n {
        let mut vertex = initial.to_vec();
        vertex[i] += if initial[i].abs() > 1e-8 {
            config.initial_step * initial[i].abs().max(0.5)
        } else {
            config.initial_step
        };
        simplex.push(clamp(vertex, bounds));
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| eval(v)).collect();

    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.max_iter {
        if config.deadline.map_or(false, |d| Instant::now() >= d) {
            break;
        }
        iterations += 1;

        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| {
            values[a]
                .partial_cmp(&values[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        let spread = values[n] - values[0];
        let diameter = simplex
            .iter()
            .skip(1)
            .map(|v| distance(v, &simplex[0]))
            .fold(0.0, f64::max);
        if values[0].is_finite()
            && (spread.abs() <= config.tolerance * (1.0 + values[0].abs())
                || diameter <= config.tolerance)
        {
            converged = true;
            break;
        }

        let centroid: Vec<f64> = (0..n)
            .map(|j| simplex[..n].iter().map(|v| v[j]).sum::<f64>() / n as f64)
            .collect();

        let reflected = clamp(along(&centroid, &simplex[n], -1.0), bounds);
        let reflected_value = eval(&reflected);

        if reflected_value < values[0] {
            let expanded = clamp(along(&centroid, &simplex[n], -2.0), bounds);
            let expanded_value = eval(&expanded);
            if expanded_value < reflected_value {
                simplex[n] = expanded;
                values[n] = expanded_value;
            } else {
                simplex[n] = reflected;
                values[n] = reflected_value;
            }
            continue;
        }

        if reflected_value < values[n - 1] {
            simplex[n] = reflected;
            values[n] = reflected_value;
            continue;
        }

        let (contracted, contracted_value) = if reflected_value < values[n] {
            let c = clamp(along(&centroid, &simplex[n], -0.5), bounds);
            let v = eval(&c);
            (c, v)
        } else {
            let c = clamp(along(&centroid, &simplex[n], 0.5), bounds);
            let v = eval(&c);
            (c, v)
        };

        if contracted_value < values[n].min(reflected_value) {
            simplex[n] = contracted;
            values[n] = contracted_value;
            continue;
        }

        // Shrink towards the best vertex
        let best = simplex[0].clone();
        for i in 1..=n {
            let shrunk: Vec<f64> = simplex[i]
                .iter()
                .zip(best.iter())
                .map(|(x, b)| b + 0.5 * (x - b))
                .collect();
            simplex[i] = clamp(shrunk, bounds);
            values[i] = eval(&simplex[i]);
        }
    }

    let best = (0..=n)
        .min_by(|&a, &b| {
            values[a]
                .partial_cmp(&values[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(0);

    NelderMeadResult {
        point: simplex[best].clone(),
        value: values[best],
        iterations,
        converged,
    }
}

/// `centroid + t * (vertex - centroid)`
fn along(centroid: &[f64], vertex: &[f64], t: f64) -> Vec<f64> {
    centroid
        .iter()
        .zip(vertex.iter())
        .map(|(c, v)| c + t * (v - c))
        .collect()
}

fn clamp(mut point: Vec<f64>, bounds: Option<&[(f64, f64)]>) -> Vec<f64> {
    if let Some(bounds) = bounds {
        for (x, &(lo, hi)) in point.iter_mut().zip(bounds.iter()) {
            *x = x.clamp(lo, hi);
        }
    }
    point
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}
