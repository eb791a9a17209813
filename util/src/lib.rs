#[macro_use] extern crate log;
extern crate ndarray as nd;
extern crate na_core as nac;
extern crate na_discrete_filtering as na_df;
extern crate pbr;
extern crate rand;
extern crate rand_distr;
extern crate serde;

use nd::{Array, ArrayView, Axis, Ix1, Ix2, Ix3, s};

use serde::{Deserialize, Serialize};

use nac::{Error, Result};
use na_df::ensemble;

pub mod data;
pub mod progress;

/// Members with any component above this are counted as extreme.
pub const EXTREME_UPPER: f64 = 15.0;
/// Members with any component below this are counted as extreme.
pub const EXTREME_LOWER: f64 = -8.0;

/// Per-member `sqrt(mean_j rate_j^2)`.
pub fn rms_rates(rates: ArrayView<f64, Ix2>) -> Array<f64, Ix1> {
  let len = rates.dim().1.max(1) as f64;
  rates.map_axis(Axis(1), |member| {
    (member.fold(0.0, |acc, &r| acc + r * r ) / len).sqrt()
  })
}

/// Everything recorded for one run, indexed by cycle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateSteps {
  /// `cycles × members × state`, only kept when asked for.
  pub priors: Option<Array<f64, Ix3>>,
  pub posteriors: Option<Array<f64, Ix3>>,
  pub inflation: Array<f64, Ix1>,
  pub prior_rmse: Array<f64, Ix1>,
  pub prior_spread: Array<f64, Ix1>,
  pub posterior_rmse: Array<f64, Ix1>,
  pub posterior_spread: Array<f64, Ix1>,
  /// `cycles × members` RMS model derivative of the posterior.
  pub dxdt: Array<f64, Ix2>,
  pub extreme_fraction: Array<f64, Ix1>,
  pub degenerate_groups: Array<usize, Ix1>,
  /// Cycles stored so far; a diverged run stops short of the total.
  pub completed: usize,
}

/// One stored cycle, borrowed from the caller.
pub struct CycleRecord<'a> {
  pub prior: ArrayView<'a, f64, Ix2>,
  pub posterior: ArrayView<'a, f64, Ix2>,
  pub truth: ArrayView<'a, f64, Ix1>,
  /// Model derivative evaluated at `posterior`.
  pub rates: ArrayView<'a, f64, Ix2>,
  pub inflation: f64,
  pub degenerate_groups: usize,
}

impl StateSteps {
  pub fn new(cycles: usize, ensemble_count: usize, n: usize,
             store_ensembles: bool) -> StateSteps {
    let ensembles = || {
      if store_ensembles {
        Some(Array::zeros((cycles, ensemble_count, n)))
      } else {
        None
      }
    };
    StateSteps {
      priors: ensembles(),
      posteriors: ensembles(),
      inflation: Array::ones(cycles),
      prior_rmse: Array::zeros(cycles),
      prior_spread: Array::zeros(cycles),
      posterior_rmse: Array::zeros(cycles),
      posterior_spread: Array::zeros(cycles),
      dxdt: Array::zeros((cycles, ensemble_count)),
      extreme_fraction: Array::zeros(cycles),
      degenerate_groups: Array::zeros(cycles),
      completed: 0,
    }
  }

  pub fn cycles(&self) -> usize { self.inflation.len() }

  /// Cycles must be stored in order.
  pub fn store_cycle(&mut self, cycle: usize, rec: CycleRecord) -> Result<()> {
    if cycle != self.completed || cycle >= self.cycles() {
      return Err(Error::config(format!("cycle {} stored out of order (next is {} of {})",
                                       cycle, self.completed, self.cycles())));
    }
    if rec.posterior.dim() != rec.prior.dim() || rec.rates.dim() != rec.posterior.dim() ||
      rec.posterior.dim().0 != self.dxdt.dim().1
    {
      return Err(nd::ShapeError::from_kind(nd::ErrorKind::IncompatibleShape).into());
    }

    if let Some(ref mut priors) = self.priors {
      priors.index_axis_mut(Axis(0), cycle).assign(&rec.prior);
    }
    if let Some(ref mut posteriors) = self.posteriors {
      posteriors.index_axis_mut(Axis(0), cycle).assign(&rec.posterior);
    }

    self.inflation[cycle] = rec.inflation;
    self.prior_rmse[cycle] = ensemble::rmse(rec.prior, rec.truth);
    self.prior_spread[cycle] = ensemble::rms_spread(rec.prior);
    self.posterior_rmse[cycle] = ensemble::rmse(rec.posterior, rec.truth);
    self.posterior_spread[cycle] = ensemble::rms_spread(rec.posterior);
    self.dxdt
      .index_axis_mut(Axis(0), cycle)
      .assign(&rms_rates(rec.rates));
    self.extreme_fraction[cycle] =
      ensemble::extreme_fraction(rec.posterior, EXTREME_LOWER, EXTREME_UPPER);
    self.degenerate_groups[cycle] = rec.degenerate_groups;

    trace!("cycle {}: rmse {:.4} -> {:.4}, spread {:.4} -> {:.4}",
           cycle, self.prior_rmse[cycle], self.posterior_rmse[cycle],
           self.prior_spread[cycle], self.posterior_spread[cycle]);

    self.completed += 1;
    Ok(())
  }

  /// A run that never assimilates: prior and posterior are the same.
  pub fn store_free_run(&mut self, cycle: usize,
                        ensemble: ArrayView<f64, Ix2>,
                        truth: ArrayView<f64, Ix1>,
                        rates: ArrayView<f64, Ix2>) -> Result<()> {
    self.store_cycle(cycle, CycleRecord {
      prior: ensemble.view(),
      posterior: ensemble.view(),
      truth: truth.view(),
      rates: rates.view(),
      inflation: 1.0,
      degenerate_groups: 0,
    })
  }

  /// Time means over the completed cycles.
  pub fn summary(&self) -> RunSummary {
    let done = self.completed;
    let mean = |a: &Array<f64, Ix1>| {
      a.slice(s![..done]).mean().unwrap_or(::std::f64::NAN)
    };
    let mean_dxdt = self.dxdt
      .slice(s![..done, ..])
      .mean()
      .unwrap_or(::std::f64::NAN);

    RunSummary {
      cycles: done,
      prior_rmse: mean(&self.prior_rmse),
      posterior_rmse: mean(&self.posterior_rmse),
      prior_spread: mean(&self.prior_spread),
      posterior_spread: mean(&self.posterior_spread),
      inflation: mean(&self.inflation),
      dxdt: mean_dxdt,
      degenerate_groups: self.degenerate_groups.slice(s![..done]).sum(),
    }
  }
}

/// Time-mean diagnostics of one run. Means are NaN when no cycle completed.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
  pub cycles: usize,
  pub prior_rmse: f64,
  pub posterior_rmse: f64,
  pub prior_spread: f64,
  pub posterior_spread: f64,
  pub inflation: f64,
  pub dxdt: f64,
  pub degenerate_groups: usize,
}
