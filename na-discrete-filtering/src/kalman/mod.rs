//! Serial (one scalar observation at a time) ensemble filters.

use nd::{ArrayView, ArrayViewMut, ErrorKind, Ix1, Ix2, ShapeError};

use serde::{Deserialize, Serialize};

use nac::Result;

pub mod bigauss;
pub mod serial;

/// A single scalar observation of grid point `location`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalarObservation {
  pub value: f64,
  pub sigma: f64,
  pub location: usize,
}

fn check_lengths(ensemble: &ArrayViewMut<f64, Ix2>, len: usize) -> Result<()> {
  if ensemble.dim().0 != len {
    return Err(ShapeError::from_kind(ErrorKind::IncompatibleShape).into());
  }
  Ok(())
}

/// `x_i += gain * (value - sim_i)` for every listed member.
fn apply_gain<I>(ensemble: &mut ArrayViewMut<f64, Ix2>,
                 sim: ArrayView<f64, Ix1>,
                 members: I,
                 gain: ArrayView<f64, Ix1>,
                 value: f64)
  where I: IntoIterator<Item = usize>,
{
  for i in members {
    ensemble
      .row_mut(i)
      .scaled_add(value - sim[i], &gain);
  }
}
