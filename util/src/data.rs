use nd::{Array, ArrayView, Axis, Ix1};
use rand::Rng;
use rand_distr::{Distribution, Normal};

use nac::{Error, ObservationOperator, Regime, Result};

/// Observe `truth` through `op` and add independent `N(0, sigma^2)` noise
/// to every value. Flags are derived from the noisy values.
pub fn simulate_truth_observation<O, R>(truth: ArrayView<f64, Ix1>,
                                        op: &O,
                                        sigma: f64,
                                        rand: &mut R)
  -> Result<(Array<f64, Ix1>, Array<Regime, Ix1>)>
  where O: ObservationOperator + ?Sized,
        R: Rng + ?Sized,
{
  if !sigma.is_finite() || sigma <= 0.0 {
    return Err(Error::config(format!("observation sigma must be positive, got {}",
                                     sigma)));
  }
  let dist = Normal::new(0.0, sigma)
    .map_err(|e| Error::config(format!("observation noise: {}", e)))?;

  let (mut obs, mut flags) = op.observe(truth.insert_axis(Axis(0)))?;
  for y in obs.iter_mut() {
    *y += dist.sample(&mut *rand);
  }
  op.flag_at(obs.view(), flags.view_mut())?;

  let obs = obs.index_axis_move(Axis(0), 0);
  let flags = flags.index_axis_move(Axis(0), 0);
  Ok((obs, flags))
}
