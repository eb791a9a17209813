//! Common stuffs for ensembles.
//!
//! An ensemble is an owned `members × state` array; members are rows.
//! All sample statistics use the unbiased (`N - 1`) denominator.

use nd::{Array, ArrayView, Axis, Ix1, Ix2, Zip};

use nac::{Error, Result};

/// Zero for an empty ensemble.
pub fn mean(ensemble: ArrayView<f64, Ix2>) -> Array<f64, Ix1> {
  ensemble
    .mean_axis(Axis(0))
    .unwrap_or_else(|| Array::zeros(ensemble.dim().1) )
}

pub fn sample_variance(y: ArrayView<f64, Ix1>) -> f64 {
  if y.len() < 2 { return 0.0; }
  y.var(1.0)
}

/// Square root of the state-averaged ensemble variance.
pub fn rms_spread(ensemble: ArrayView<f64, Ix2>) -> f64 {
  if ensemble.dim().0 < 2 { return 0.0; }
  ensemble.var_axis(Axis(0), 1.0)
    .mean()
    .unwrap_or(0.0)
    .sqrt()
}

/// RMS distance between the ensemble mean and `truth`.
pub fn rmse(ensemble: ArrayView<f64, Ix2>, truth: ArrayView<f64, Ix1>) -> f64 {
  let m = mean(ensemble);
  let sum = Zip::from(&m)
    .and(&truth)
    .fold(0.0, |acc, &m, &t| acc + (m - t) * (m - t) );
  (sum / m.len().max(1) as f64).sqrt()
}

/// Fraction of members having at least one component outside
/// `[lower, upper]`.
pub fn extreme_fraction(ensemble: ArrayView<f64, Ix2>,
                        lower: f64, upper: f64) -> f64 {
  let n = ensemble.dim().0;
  if n == 0 { return 0.0; }
  let extreme = ensemble
    .outer_iter()
    .filter(|member| member.iter().any(|&v| v > upper || v < lower ) )
    .count();
  extreme as f64 / n as f64
}

pub fn ensure_finite(ensemble: ArrayView<f64, Ix2>,
                     stage: &'static str) -> Result<()> {
  for ((member, component), v) in ensemble.indexed_iter() {
    if !v.is_finite() {
      return Err(Error::NumericDivergence {
        stage: stage,
        member: member,
        component: component,
      });
    }
  }
  Ok(())
}

/// First and second moments of a subset of the ensemble jointly with its
/// simulated observations.
#[derive(Debug, Clone)]
pub struct Moments {
  pub count: usize,
  pub state_mean: Array<f64, Ix1>,
  pub obs_mean: f64,
  pub obs_variance: f64,
  /// cov(x_j, y) for every state component j.
  pub cross_covariance: Array<f64, Ix1>,
}
impl Moments {
  /// `None` when fewer than two members are given.
  pub fn of_members(ensemble: ArrayView<f64, Ix2>,
                    sim: ArrayView<f64, Ix1>,
                    members: &[usize]) -> Option<Moments> {
    let n = members.len();
    if n < 2 { return None; }
    let n_e = n as f64;

    let mut state_mean: Array<f64, Ix1> = Array::zeros(ensemble.dim().1);
    let mut obs_mean = 0.0;
    for &i in members {
      state_mean += &ensemble.row(i);
      obs_mean += sim[i];
    }
    state_mean /= n_e;
    obs_mean /= n_e;

    let mut cross_covariance: Array<f64, Ix1> = Array::zeros(ensemble.dim().1);
    let mut obs_variance = 0.0;
    for &i in members {
      let dy = sim[i] - obs_mean;
      obs_variance += dy * dy;
      Zip::from(&mut cross_covariance)
        .and(ensemble.row(i))
        .and(&state_mean)
        .for_each(|c, &x, &m| *c += (x - m) * dy );
    }
    cross_covariance /= n_e - 1.0;
    obs_variance /= n_e - 1.0;

    Some(Moments {
      count: n,
      state_mean: state_mean,
      obs_mean: obs_mean,
      obs_variance: obs_variance,
      cross_covariance: cross_covariance,
    })
  }

  pub fn of_all(ensemble: ArrayView<f64, Ix2>,
                sim: ArrayView<f64, Ix1>) -> Option<Moments> {
    let members: Vec<usize> = (0..ensemble.dim().0).collect();
    Moments::of_members(ensemble, sim, &members)
  }

  pub fn innovation_variance(&self, sigma: f64) -> f64 {
    self.obs_variance + sigma * sigma
  }

  /// Kalman gain for every state component; `None` if the innovation
  /// variance isn't strictly positive.
  pub fn gain(&self, sigma: f64) -> Option<Array<f64, Ix1>> {
    let s = self.innovation_variance(sigma);
    if !(s > 0.0) { return None; }
    Some(self.cross_covariance.mapv(|c| c / s ))
  }
}
