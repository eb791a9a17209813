#[macro_use] extern crate log;
extern crate ndarray as nd;
extern crate ndarray_rand as nd_rand;
extern crate na_core as nac;
extern crate na_discrete_filtering as na_df;
extern crate na_quadrature as na_q;
extern crate rand;
extern crate rand_distr;
extern crate rand_isaac;
extern crate rayon;
extern crate serde;
extern crate util;

use nd::{ArrayView, ArrayViewMut, Ix1, Ix2, Zip};

use serde::{Deserialize, Serialize};

use nac::Model;

pub mod experiment;
pub mod observation;
pub mod setup;

pub const GRID_SIZE: usize = 40;
pub const FORCING: f64 = 8.0;
/// RK4 step size.
pub const DT: f64 = 0.025;
/// Steps used to relax white noise onto the attractor.
pub const SPINUP_STEPS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct L95Model {
  pub forcing: f64,
}
impl Default for L95Model {
  fn default() -> Self {
    L95Model {
      forcing: FORCING,
    }
  }
}
impl Model for L95Model {
  fn state_len(&self) -> usize { GRID_SIZE }
  fn derivative(&self,
                states: ArrayView<f64, Ix2>,
                mut rates: ArrayViewMut<f64, Ix2>) {
    let forcing = self.forcing;
    Zip::from(rates.rows_mut())
      .and(states.rows())
      .par_for_each(|out, x| lorenz95(forcing, x, out) );
  }
}

/// `dx_i/dt = (x_{i+1} - x_{i-2}) x_{i-1} - x_i + F` on a periodic ring.
pub fn lorenz95(forcing: f64, x: ArrayView<f64, Ix1>,
                mut out: ArrayViewMut<f64, Ix1>) {
  let n = x.len();
  debug_assert!(n >= 4);
  debug_assert!(out.len() == n);

  let i = (1..n+1).zip(n-2..n-2+n).zip(n-1..n-1+n);
  for (e, ((i1, i2), i3)) in i.enumerate() {
    out[e] = (x[i1 % n] - x[i2 % n]) * x[i3 % n] - x[e] + forcing;
  }
}
