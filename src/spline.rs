//! Cubic smoothing spline.
//!
//! Minimises `Σ (y_i - g(x_i))² + λ ∫ g''²` over the knots (Reinsch). The
//! penalty `λ` is chosen so the residual sum of squares matches a target
//! smoothing factor. The banded system is solved with an LDLᵀ factorisation,
//! so a fit costs O(n) per trial `λ`.

use crate::error::{CtgError, Result};

const LAMBDA_SEARCH_DECADES: (f64, f64) = (-8.0, 12.0);
const LAMBDA_SEARCH_STEPS: usize = 60;

#[derive(Debug, Clone)]
pub struct SmoothingSpline {
    knots: Vec<f64>,
    values: Vec<f64>,
    /// Second derivatives at the knots; zero at both ends (natural spline)
    curvature: Vec<f64>,
    lambda: f64,
}

/// Banded pieces of `Q` (n × n-2) and `R` ((n-2) × (n-2)).
struct Bands {
    q0: Vec<f64>,
    q1: Vec<f64>,
    q2: Vec<f64>,
    r_diag: Vec<f64>,
    r_off: Vec<f64>,
}

impl Bands {
    fn new(x: &[f64]) -> Self {
        let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
        let m = x.len() - 2;
        let mut bands = Bands {
            q0: Vec::with_capacity(m),
            q1: Vec::with_capacity(m),
            q2: Vec::with_capacity(m),
            r_diag: Vec::with_capacity(m),
            r_off: Vec::with_capacity(m),
        };
        for j in 0..m {
            bands.q0.push(1.0 / h[j]);
            bands.q1.push(-1.0 / h[j] - 1.0 / h[j + 1]);
            bands.q2.push(1.0 / h[j + 1]);
            bands.r_diag.push((h[j] + h[j + 1]) / 3.0);
            bands.r_off.push(h[j + 1] / 6.0);
        }
        bands
    }

    fn interior(&self) -> usize {
        self.q0.len()
    }

    /// Qᵀ v
    fn qt_mul(&self, v: &[f64]) -> Vec<f64> {
        (0..self.interior())
            .map(|j| self.q0[j] * v[j] + self.q1[j] * v[j + 1] + self.q2[j] * v[j + 2])
            .collect()
    }

    /// Q γ
    fn q_mul(&self, gamma: &[f64]) -> Vec<f64> {
        let m = self.interior();
        (0..m + 2)
            .map(|i| {
                let mut acc = 0.0;
                if i < m {
                    acc += self.q0[i] * gamma[i];
                }
                if (1..=m).contains(&i) {
                    acc += self.q1[i - 1] * gamma[i - 1];
                }
                if (2..=m + 1).contains(&i) {
                    acc += self.q2[i - 2] * gamma[i - 2];
                }
                acc
            })
            .collect()
    }

    /// Diagonals of `R + λ QᵀQ`.
    fn system(&self, lambda: f64) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let m = self.interior();
        let mut d0 = Vec::with_capacity(m);
        let mut d1 = Vec::with_capacity(m);
        let mut d2 = Vec::with_capacity(m);
        for j in 0..m {
            let qtq0 = self.q0[j].powi(2) + self.q1[j].powi(2) + self.q2[j].powi(2);
            d0.push(self.r_diag[j] + lambda * qtq0);
            let qtq1 = if j + 1 < m {
                self.q1[j] * self.q0[j + 1] + self.q2[j] * self.q1[j + 1]
            } else {
                0.0
            };
            d1.push(self.r_off[j] + lambda * qtq1);
            let qtq2 = if j + 2 < m {
                self.q2[j] * self.q0[j + 2]
            } else {
                0.0
            };
            d2.push(lambda * qtq2);
        }
        (d0, d1, d2)
    }

    /// Mean diagonal ratio of `R` to `QᵀQ`, where the two terms balance.
    fn lambda_scale(&self) -> f64 {
        let m = self.interior() as f64;
        let r: f64 = self.r_diag.iter().sum::<f64>() / m;
        let q: f64 = (0..self.interior())
            .map(|j| self.q0[j].powi(2) + self.q1[j].powi(2) + self.q2[j].powi(2))
            .sum::<f64>()
            / m;
        if q > 0.0 {
            r / q
        } else {
            1.0
        }
    }
}

/// Solve a symmetric positive-definite pentadiagonal system.
///
/// `d0` is the diagonal, `d1[i]` the (i, i+1) entry and `d2[i]` the (i, i+2) entry.
fn solve_pentadiagonal(d0: &[f64], d1: &[f64], d2: &[f64], rhs: &[f64]) -> Option<Vec<f64>> {
    let m = d0.len();
    let mut d = vec![0.0f64; m];
    let mut l1 = vec![0.0f64; m];
    let mut l2 = vec![0.0f64; m];

    for i in 0..m {
        let mut di = d0[i];
        if i >= 1 {
            di -= l1[i - 1].powi(2) * d[i - 1];
        }
        if i >= 2 {
            di -= l2[i - 2].powi(2) * d[i - 2];
        }
        if !(di > 0.0) || !di.is_finite() {
            return None;
        }
        d[i] = di;

        let mut e1 = d1[i];
        if i >= 1 {
            e1 -= l1[i - 1] * l2[i - 1] * d[i - 1];
        }
        l1[i] = e1 / di;
        l2[i] = d2[i] / di;
    }

    let mut z = vec![0.0; m];
    for i in 0..m {
        let mut zi = rhs[i];
        if i >= 1 {
            zi -= l1[i - 1] * z[i - 1];
        }
        if i >= 2 {
            zi -= l2[i - 2] * z[i - 2];
        }
        z[i] = zi;
    }
    for i in 0..m {
        z[i] /= d[i];
    }

    let mut x = vec![0.0; m];
    for i in (0..m).rev() {
        let mut xi = z[i];
        if i + 1 < m {
            xi -= l1[i] * x[i + 1];
        }
        if i + 2 < m {
            xi -= l2[i] * x[i + 2];
        }
        x[i] = xi;
    }
    Some(x)
}

struct Trial {
    values: Vec<f64>,
    gamma: Vec<f64>,
    rss: f64,
}

fn trial(bands: &Bands, y: &[f64], qty: &[f64], lambda: f64) -> Result<Trial> {
    let (d0, d1, d2) = bands.system(lambda);
    let gamma = solve_pentadiagonal(&d0, &d1, &d2, qty).ok_or_else(|| {
        CtgError::InsufficientData(format!(
            "smoothing spline system is not positive definite (lambda = {:e})",
            lambda
        ))
    })?;
    let q_gamma = bands.q_mul(&gamma);
    let values: Vec<f64> = y
        .iter()
        .zip(&q_gamma)
        .map(|(yi, qg)| yi - lambda * qg)
        .collect();
    let rss = q_gamma.iter().map(|qg| (lambda * qg).powi(2)).sum();
    Ok(Trial { values, gamma, rss })
}

impl SmoothingSpline {
    /// Fit a smoothing spline whose residual sum of squares is close to `smoothing`.
    ///
    /// # Arguments
    /// * `x` - Strictly increasing knot positions (at least 3)
    /// * `y` - Observed values at the knots
    /// * `smoothing` - Target residual sum of squares (0 interpolates)
    pub fn fit(x: &[f64], y: &[f64], smoothing: f64) -> Result<Self> {
        if x.len() != y.len() {
            return Err(CtgError::LengthMismatch {
                what: "spline values",
                expected: x.len(),
                actual: y.len(),
            });
        }
        if x.len() < 3 {
            return Err(CtgError::InsufficientData(format!(
                "smoothing spline needs at least 3 points, got {}",
                x.len()
            )));
        }
        if let Some(pos) = x.windows(2).position(|w| !(w[1] > w[0])) {
            return Err(CtgError::NonMonotonicTimestamps(pos + 1));
        }

        let bands = Bands::new(x);
        let qty = bands.qt_mul(y);
        let scale = bands.lambda_scale();
        let lambda_at = |e: f64| scale * 10f64.powf(e);

        let (mut lo, mut hi) = LAMBDA_SEARCH_DECADES;
        let stiffest = trial(&bands, y, &qty, lambda_at(hi))?;
        let (best, lambda) = if stiffest.rss <= smoothing {
            (stiffest, lambda_at(hi))
        } else {
            let loosest = trial(&bands, y, &qty, lambda_at(lo))?;
            if loosest.rss >= smoothing {
                (loosest, lambda_at(lo))
            } else {
                let mut best = loosest;
                let mut best_e = lo;
                for _ in 0..LAMBDA_SEARCH_STEPS {
                    let mid = (lo + hi) / 2.0;
                    let t = trial(&bands, y, &qty, lambda_at(mid))?;
                    if t.rss > smoothing {
                        hi = mid;
                    } else {
                        lo = mid;
                        best = t;
                        best_e = mid;
                    }
                }
                (best, lambda_at(best_e))
            }
        };

        log::debug!(
            "Smoothing spline over {} knots: lambda = {:e}, rss = {:.3} (target {:.3})",
            x.len(),
            lambda,
            best.rss,
            smoothing
        );

        let mut curvature = Vec::with_capacity(x.len());
        curvature.push(0.0);
        curvature.extend_from_slice(&best.gamma);
        curvature.push(0.0);

        Ok(Self {
            knots: x.to_vec(),
            values: best.values,
            curvature,
            lambda,
        })
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Fitted values at the knots.
    pub fn fitted(&self) -> &[f64] {
        &self.values
    }

    /// Evaluate the spline; beyond the end knots it continues linearly.
    pub fn evaluate(&self, t: f64) -> f64 {
        let x = &self.knots;
        let g = &self.values;
        let c = &self.curvature;
        let n = x.len();

        if t <= x[0] {
            let h = x[1] - x[0];
            let slope = (g[1] - g[0]) / h - h * c[1] / 6.0;
            return g[0] + slope * (t - x[0]);
        }
        if t >= x[n - 1] {
            let h = x[n - 1] - x[n - 2];
            let slope = (g[n - 1] - g[n - 2]) / h + h * c[n - 2] / 6.0;
            return g[n - 1] + slope * (t - x[n - 1]);
        }

        let i = x.partition_point(|&k| k <= t) - 1;
        let h = x[i + 1] - x[i];
        let a = (x[i + 1] - t) / h;
        let b = (t - x[i]) / h;
        a * g[i] + b * g[i + 1] + ((a.powi(3) - a) * c[i] + (b.powi(3) - b) * c[i + 1]) * h * h / 6.0
    }
}
