//! Adaptive multiplicative inflation of the prior spread.
//!
//! The factor compares the observed innovation magnitude with what the
//! ensemble expects it to be:
//!
//! ```text
//! d    = mean_l (mean_i y_il - y_l)^2
//! sprd = mean_l var_i(y_il) + sigma^2
//! fac  = max(1, sqrt(d / sprd))
//! ```

use nd::{Array, ArrayView, ArrayViewMut, Axis, Ix1, Ix2, Zip};

use nac::{Error, Result};

use crate::ensemble;

/// `sim_obs` is `members × observed locations`, `observations` has one
/// value per observed location.
pub fn factor(sim_obs: ArrayView<f64, Ix2>,
              observations: ArrayView<f64, Ix1>,
              sigma: f64) -> Result<f64> {
  let (n, l) = sim_obs.dim();
  if l != observations.len() {
    return Err(nd::ShapeError::from_kind(nd::ErrorKind::IncompatibleShape).into());
  }
  if n < 2 || l == 0 {
    return Err(Error::config("inflation needs two members and one observation"));
  }
  ensemble::ensure_finite(sim_obs, "inflation")?;
  if observations.iter().any(|v| !v.is_finite() ) {
    return Err(Error::config("non-finite observation value"));
  }

  let ybar = ensemble::mean(sim_obs);
  let d = Zip::from(&ybar)
    .and(&observations)
    .fold(0.0, |acc, &m, &y| acc + (m - y) * (m - y) ) / l as f64;

  let sprd = sim_obs.var_axis(Axis(0), 1.0).sum() / l as f64 + sigma * sigma;
  if !(sprd > 0.0) {
    return Err(Error::DegenerateCovariance {
      location: 0,
      variance: sprd,
    });
  }

  Ok((d / sprd).sqrt().max(1.0))
}

/// `x_i = mean + factor * (x_i - mean)` for every member.
pub fn apply(mut ensemble: ArrayViewMut<f64, Ix2>, factor: f64) {
  let m = ensemble::mean(ensemble.view());
  ensemble
    .axis_iter_mut(Axis(0))
    .for_each(|member| {
      Zip::from(member)
        .and(&m)
        .for_each(|x, &m| *x = m + factor * (*x - m) );
    });
}

/// Inflate `prior` using the simulated observations at `locations`
/// (`sim_obs` covers the full state). Returns the inflated ensemble and the
/// factor that was used.
pub fn inflate(mut prior: Array<f64, Ix2>,
               locations: &[usize],
               sim_obs: ArrayView<f64, Ix2>,
               observations: ArrayView<f64, Ix1>,
               sigma: f64) -> Result<(Array<f64, Ix2>, f64)> {
  if sim_obs.dim() != prior.dim() {
    return Err(nd::ShapeError::from_kind(nd::ErrorKind::IncompatibleShape).into());
  }
  if let Some(&bad) = locations.iter().find(|&&l| l >= prior.dim().1 ) {
    return Err(Error::config(format!("observed location {} is off the grid", bad)));
  }

  let selected = sim_obs.select(Axis(1), locations);
  let fac = factor(selected.view(), observations, sigma)?;
  apply(prior.view_mut(), fac);

  debug!("inflation factor {:.4} over {} locations", fac, locations.len());

  Ok((prior, fac))
}
