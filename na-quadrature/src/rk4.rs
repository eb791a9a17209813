//! Classical fourth order Runge-Kutta with a fixed step.
//! Every stage is evaluated over the whole batch; the batch itself is only
//! written once all four stages of a step are done.

use nd::{Array, ArrayViewMut, Ix2, Zip};

use nac::{Model, ModelStats};

pub fn new(h: f64, dim: (usize, usize)) -> State {
  State::new(h, dim)
}

/// Advance `x` by `steps` RK4 steps of size `h`, allocating a fresh
/// workspace.
pub fn advance<M>(model: &mut ModelStats<M>, h: f64,
                  x: ArrayViewMut<f64, Ix2>, steps: u64)
  where M: Model,
{
  let mut state = new(h, x.dim());
  state.advance(model, x, steps);
}

#[derive(Debug, Clone)]
pub struct State {
  steps: u64,
  pub h: f64,

  k1: Array<f64, Ix2>,
  k2: Array<f64, Ix2>,
  k3: Array<f64, Ix2>,
  k4: Array<f64, Ix2>,
  stage: Array<f64, Ix2>,
}
impl State {
  pub fn new(h: f64, dim: (usize, usize)) -> State {
    State {
      steps: 0,
      h: h,

      k1: Array::zeros(dim),
      k2: Array::zeros(dim),
      k3: Array::zeros(dim),
      k4: Array::zeros(dim),
      stage: Array::zeros(dim),
    }
  }

  pub fn total_steps(&self) -> u64 { self.steps }

  fn ensure_dim(&mut self, dim: (usize, usize)) {
    if self.stage.dim() == dim { return; }

    debug!("resizing rk4 workspace {:?} -> {:?}", self.stage.dim(), dim);
    self.k1 = Array::zeros(dim);
    self.k2 = Array::zeros(dim);
    self.k3 = Array::zeros(dim);
    self.k4 = Array::zeros(dim);
    self.stage = Array::zeros(dim);
  }

  pub fn step<M>(&mut self, model: &mut ModelStats<M>,
                 mut x: ArrayViewMut<f64, Ix2>)
    where M: Model,
  {
    self.ensure_dim(x.dim());

    let h = self.h;
    let half_h = 0.5 * h;

    model.derivative(x.view(), self.k1.view_mut());

    Zip::from(&mut self.stage)
      .and(&x)
      .and(&self.k1)
      .par_for_each(|s, &x, &k| *s = x + half_h * k );
    model.derivative(self.stage.view(), self.k2.view_mut());

    Zip::from(&mut self.stage)
      .and(&x)
      .and(&self.k2)
      .par_for_each(|s, &x, &k| *s = x + half_h * k );
    model.derivative(self.stage.view(), self.k3.view_mut());

    Zip::from(&mut self.stage)
      .and(&x)
      .and(&self.k3)
      .par_for_each(|s, &x, &k| *s = x + h * k );
    model.derivative(self.stage.view(), self.k4.view_mut());

    Zip::from(&mut x)
      .and(&self.k1)
      .and(&self.k2)
      .and(&self.k3)
      .and(&self.k4)
      .par_for_each(|x, &k1, &k2, &k3, &k4| {
        *x += h * k1 / 6.0 + h * k2 / 3.0 + h * k3 / 3.0 + h * k4 / 6.0;
      });

    self.steps += 1;
  }

  pub fn advance<M>(&mut self, model: &mut ModelStats<M>,
                    mut x: ArrayViewMut<f64, Ix2>, steps: u64)
    where M: Model,
  {
    for _ in 0..steps {
      self.step(model, x.view_mut());
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use nd::{arr2, ArrayView};

  /// dx/dt = -x, applied row by row.
  struct Decay;
  impl Model for Decay {
    fn state_len(&self) -> usize { 2 }
    fn derivative(&self, x: ArrayView<f64, Ix2>,
                  mut out: ArrayViewMut<f64, Ix2>) {
      out.assign(&x);
      out.mapv_inplace(|v| -v );
    }
  }

  #[test]
  fn zero_step_is_identity() {
    let x0 = arr2(&[[1.0, -2.0], [3.5, 0.25]]);
    let mut x = x0.clone();
    let mut model = ModelStats::from(Decay);
    let mut state = new(0.0, x.dim());
    state.advance(&mut model, x.view_mut(), 7);
    assert_eq!(x, x0);
    assert_eq!(state.total_steps(), 7);
  }

  #[test]
  fn no_steps_leaves_batch_alone() {
    let x0 = arr2(&[[1.0, -2.0], [3.5, 0.25]]);
    let mut x = x0.clone();
    let mut model = ModelStats::from(Decay);
    advance(&mut model, 0.025, x.view_mut(), 0);
    assert_eq!(x, x0);
    assert_eq!(model.calls, 0);
  }

  #[test]
  fn matches_exponential_decay() {
    let mut x = arr2(&[[1.0, 2.0]]);
    let mut model = ModelStats::from(Decay);
    advance(&mut model, 0.025, x.view_mut(), 40);
    let expected = (-1.0f64).exp();
    assert!((x[[0, 0]] - expected).abs() < 1e-8);
    assert!((x[[0, 1]] - 2.0 * expected).abs() < 1e-8);
    // four stages per step, one row
    assert_eq!(model.calls, 4 * 40);
  }

  #[test]
  fn steps_are_additive() {
    let x0 = arr2(&[[0.3, -1.2], [2.0, 4.0], [-0.5, 0.5]]);
    let mut model = ModelStats::from(Decay);

    let mut once = x0.clone();
    advance(&mut model, 0.025, once.view_mut(), 5);

    let mut twice = x0.clone();
    let mut state = new(0.025, twice.dim());
    state.advance(&mut model, twice.view_mut(), 2);
    state.advance(&mut model, twice.view_mut(), 3);

    assert_eq!(once, twice);
  }
}
