//! The plain serial ensemble Kalman filter. Every member gets the same
//! linear correction; there is no perturbed-observation noise.

use nd::{Array, ArrayView, ArrayViewMut, Ix1, Ix2};

use nac::{Error, Result};

use crate::ensemble::Moments;
use super::{apply_gain, check_lengths, ScalarObservation};

/// Update `prior` against one observation. `sim` holds each member's
/// simulated observation at `obs.location`.
///
/// A zero innovation variance (no spread and a perfect observation) is the
/// caller's responsibility and comes back as `DegenerateCovariance`.
pub fn update(mut prior: Array<f64, Ix2>,
              sim: ArrayView<f64, Ix1>,
              obs: &ScalarObservation) -> Result<Array<f64, Ix2>> {
  update_in_place(prior.view_mut(), sim, obs)?;
  Ok(prior)
}

/// Returns the gain that was applied.
pub fn update_in_place(mut ensemble: ArrayViewMut<f64, Ix2>,
                       sim: ArrayView<f64, Ix1>,
                       obs: &ScalarObservation) -> Result<Array<f64, Ix1>> {
  check_lengths(&ensemble, sim.len())?;

  let moments = Moments::of_all(ensemble.view(), sim)
    .ok_or(Error::DegenerateCovariance {
      location: obs.location,
      variance: 0.0,
    })?;
  let gain = moments.gain(obs.sigma)
    .ok_or(Error::DegenerateCovariance {
      location: obs.location,
      variance: moments.innovation_variance(obs.sigma),
    })?;

  debug!("enkf @ {}: y = {:.3}, ybar = {:.3}, var = {:.4e}",
         obs.location, obs.value, moments.obs_mean, moments.obs_variance);

  let n = ensemble.dim().0;
  apply_gain(&mut ensemble, sim, 0..n, gain.view(), obs.value);

  Ok(gain)
}

#[cfg(test)]
mod test {
  use super::*;
  use nd::{Axis, arr2};

  use crate::ensemble;
  use crate::utils::PartialEqWithinTol;

  /// 100 members, one component, sample mean exactly `mu` and sample std
  /// exactly `std`.
  fn synthetic(n: usize, mu: f64, std: f64) -> Array<f64, Ix2> {
    let raw = Array::linspace(-1.0, 1.0, n);
    let s = ensemble::sample_variance(raw.view()).sqrt();
    let col = raw.mapv(|v| mu + std * v / s );
    col.insert_axis(Axis(1))
  }

  fn observe(x: &Array<f64, Ix2>, location: usize) -> Array<f64, Ix1> {
    x.column(location).to_owned()
  }

  #[test]
  fn huge_sigma_leaves_ensemble_alone() {
    let prior = arr2(&[[1.0, 4.0], [2.0, -1.0], [6.0, 0.5], [-3.0, 2.0]]);
    let sim = observe(&prior, 0);
    let obs = ScalarObservation { value: 40.0, sigma: 1e12, location: 0, };
    let post = update(prior.clone(), sim.view(), &obs).unwrap();
    assert!(post.view().partial_eq_within_tol(&prior.view(), 1e-12));
  }

  #[test]
  fn tiny_sigma_pulls_members_onto_observation() {
    let prior = arr2(&[[1.0, 4.0], [2.0, -1.0], [6.0, 0.5], [-3.0, 2.0]]);
    let sim = observe(&prior, 1);
    let obs = ScalarObservation { value: 0.75, sigma: 1e-6, location: 1, };
    let post = update(prior, sim.view(), &obs).unwrap();
    for v in post.column(1).iter() {
      assert!(v.partial_eq_within_tol(&0.75, 1e-8), "{} != 0.75", v);
    }
  }

  #[test]
  fn reduces_spread_and_keeps_mean() {
    let prior = synthetic(100, 5.0, 1.0);
    let sim = observe(&prior, 0);
    let prior_spread = ensemble::rms_spread(prior.view());
    assert!(prior_spread.partial_eq_within_tol(&1.0, 1e-12));

    let obs = ScalarObservation { value: 5.0, sigma: 1.0, location: 0, };
    let post = update(prior, sim.view(), &obs).unwrap();

    let m = ensemble::mean(post.view());
    assert!(m[0].partial_eq_within_tol(&5.0, 1e-12));
    let post_spread = ensemble::rms_spread(post.view());
    assert!(post_spread < prior_spread);
    // deterministic update shrinks by r^2 / (var + r^2)
    assert!(post_spread.partial_eq_within_tol(&0.5, 1e-12));
  }

  #[test]
  fn unobserved_components_move_with_covariance() {
    // second component is exactly minus the first
    let prior = arr2(&[[1.0, -1.0], [2.0, -2.0], [3.0, -3.0]]);
    let sim = observe(&prior, 0);
    let obs = ScalarObservation { value: 3.0, sigma: 1.0, location: 0, };
    let post = update(prior, sim.view(), &obs).unwrap();
    for row in post.outer_iter() {
      assert!(row[1].partial_eq_within_tol(&-row[0], 1e-12));
    }
  }

  #[test]
  fn zero_spread_and_perfect_obs_is_degenerate() {
    let prior = arr2(&[[1.0], [1.0], [1.0]]);
    let sim = observe(&prior, 0);
    let obs = ScalarObservation { value: 2.0, sigma: 0.0, location: 7, };
    match update(prior, sim.view(), &obs) {
      Err(Error::DegenerateCovariance { location: 7, .. }) => {},
      other => panic!("unexpected: {:?}", other),
    }
  }

  #[test]
  fn mismatched_sim_length_is_rejected() {
    let prior = arr2(&[[1.0], [2.0], [3.0]]);
    let sim = nd::arr1(&[1.0, 2.0]);
    let obs = ScalarObservation { value: 2.0, sigma: 1.0, location: 0, };
    match update(prior, sim.view(), &obs) {
      Err(Error::Shape(_)) => {},
      other => panic!("unexpected: {:?}", other),
    }
  }
}
