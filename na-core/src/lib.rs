
extern crate ndarray as nd;
extern crate serde;
extern crate thiserror;

use nd::prelude::*;
use nd::{ErrorKind, ShapeError, Zip};

use serde::{Deserialize, Serialize};

pub use error::{Result, Error};

pub mod error;

/// A deterministic model, evaluated over a whole batch of states at once.
/// Rows of `states` are independent members; `rates` has the same shape.
pub trait Model: Send + Sync {
  fn state_len(&self) -> usize;
  fn derivative(&self,
                states: ArrayView<f64, Ix2>,
                rates: ArrayViewMut<f64, Ix2>);
}
#[derive(Debug)]
pub struct ModelStats<M> {
  pub model: M,
  /// Number of single-member derivative evaluations.
  pub calls: u64,
}
impl<M> From<M> for ModelStats<M> {
  fn from(v: M) -> ModelStats<M> {
    ModelStats {
      model: v,
      calls: 0,
    }
  }
}
impl<M> ModelStats<M>
  where M: Model,
{
  pub fn derivative(&mut self,
                    states: ArrayView<f64, Ix2>,
                    rates: ArrayViewMut<f64, Ix2>) {
    self.calls += states.dim().0 as u64;
    self.model.derivative(states, rates);
  }
}

/// Which branch of a non-linear observation transform a value falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize)]
pub enum Regime {
  Clear,
  Cloudy,
}
impl Regime {
  pub const ALL: [Regime; 2] = [Regime::Clear, Regime::Cloudy];
}
impl Default for Regime {
  fn default() -> Regime { Regime::Clear }
}

/// Pointwise observation operator: every state component maps to one
/// observed value and a regime flag derived from that value.
pub trait ObservationOperator: Send + Sync {
  fn transform(&self, x: f64) -> f64;
  fn regime(&self, y: f64) -> Regime;

  fn eval_at(&self, states: ArrayView<f64, Ix2>,
             obs: ArrayViewMut<f64, Ix2>,
             flags: ArrayViewMut<Regime, Ix2>) -> Result<()> {
    if states.dim() != obs.dim() || states.dim() != flags.dim() {
      return Err(ShapeError::from_kind(ErrorKind::IncompatibleShape).into());
    }

    Zip::from(obs)
      .and(flags)
      .and(&states)
      .par_for_each(|y, flag, &x| {
        *y = self.transform(x);
        *flag = self.regime(*y);
      });

    Ok(())
  }

  /// Regime flags of already observed values, e.g. after noise was added.
  fn flag_at(&self, obs: ArrayView<f64, Ix2>,
             flags: ArrayViewMut<Regime, Ix2>) -> Result<()> {
    if obs.dim() != flags.dim() {
      return Err(ShapeError::from_kind(ErrorKind::IncompatibleShape).into());
    }

    Zip::from(flags)
      .and(&obs)
      .par_for_each(|flag, &y| *flag = self.regime(y) );

    Ok(())
  }

  fn observe(&self, states: ArrayView<f64, Ix2>)
    -> Result<(Array<f64, Ix2>, Array<Regime, Ix2>)>
  {
    let mut obs = Array::zeros(states.dim());
    let mut flags = Array::from_elem(states.dim(), Regime::default());
    self.eval_at(states, obs.view_mut(), flags.view_mut())?;
    Ok((obs, flags))
  }
}
