//! Bi-Gaussian (clustered) serial ensemble filter.
//!
//! The ensemble is split by the regime flag of each member's simulated
//! observation. Every regime group with enough members gets its own
//! Kalman correction, then a shift step reconciles the groups with each
//! other. Members never change group here; regimes are only re-evaluated
//! when the next observation is simulated.

use std::fmt;
use std::str::FromStr;

use nd::{Array, ArrayView, ArrayViewMut, ErrorKind, Ix1, Ix2, ShapeError};

use serde::{Deserialize, Serialize};

use nac::{Error, Regime, Result};

use crate::ensemble::Moments;
use super::{apply_gain, check_lengths, ScalarObservation};

/// How corrected groups are reconciled with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShiftAlgorithm {
  /// Move every group rigidly so the ensemble mean lands on the mixture
  /// posterior mean; the residual is shared out by group spread.
  Ddr2011,
  /// Blend each group's own correction with the correction computed from
  /// all corrected members together.
  LineComb,
}
impl ShiftAlgorithm {
  pub fn name(&self) -> &'static str {
    match self {
      &ShiftAlgorithm::Ddr2011 => "ddr2011",
      &ShiftAlgorithm::LineComb => "LineComb",
    }
  }
}
impl fmt::Display for ShiftAlgorithm {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.write_str(self.name())
  }
}
impl FromStr for ShiftAlgorithm {
  type Err = Error;
  fn from_str(s: &str) -> Result<ShiftAlgorithm> {
    match s {
      "ddr2011" => Ok(ShiftAlgorithm::Ddr2011),
      "LineComb" => Ok(ShiftAlgorithm::LineComb),
      _ => Err(Error::config(format!("unknown shift algorithm `{}`", s))),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiGaussParams {
  /// Groups smaller than this are left alone. Never less than two.
  pub min_group_size: usize,
  /// Widens (> 1) or narrows (< 1) the distance scale that decides how
  /// much a group keeps its own correction under `LineComb`.
  pub linecomb_scale: f64,
}
impl Default for BiGaussParams {
  fn default() -> Self {
    BiGaussParams {
      min_group_size: 2,
      linecomb_scale: 1.0,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupStatus {
  Corrected,
  TooFewMembers,
  ZeroSpread,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
  pub regime: Regime,
  pub members: usize,
  pub status: GroupStatus,
  pub prior_weight: f64,
  /// Mixture weight after seeing the observation; zero for groups that
  /// weren't corrected.
  pub posterior_weight: f64,
  /// Share of the residual (`Ddr2011`) or own-correction weight
  /// (`LineComb`); zero when no shift was applied to the group.
  pub shift_weight: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
  pub location: usize,
  pub groups: Vec<GroupReport>,
  /// Mixture posterior mean of the corrected members, when more than one
  /// group was corrected.
  pub mixture_mean: Option<Array<f64, Ix1>>,
}
impl Analysis {
  pub fn degenerate_groups(&self) -> usize {
    self.groups
      .iter()
      .filter(|g| g.status != GroupStatus::Corrected )
      .count()
  }
  pub fn is_degenerate(&self) -> bool { self.degenerate_groups() > 0 }
}

struct Corrected {
  report: usize,
  members: Vec<usize>,
  posterior_mean: Array<f64, Ix1>,
  obs_posterior_mean: f64,
  obs_posterior_variance: f64,
  log_likelihood: f64,
}

pub fn update(mut prior: Array<f64, Ix2>,
              sim: ArrayView<f64, Ix1>,
              obs: &ScalarObservation,
              flags: ArrayView<Regime, Ix1>,
              shift: ShiftAlgorithm,
              params: &BiGaussParams) -> Result<(Array<f64, Ix2>, Analysis)> {
  let analysis = update_in_place(prior.view_mut(), sim, obs, flags,
                                 shift, params)?;
  Ok((prior, analysis))
}

pub fn update_in_place(mut ensemble: ArrayViewMut<f64, Ix2>,
                       sim: ArrayView<f64, Ix1>,
                       obs: &ScalarObservation,
                       flags: ArrayView<Regime, Ix1>,
                       shift: ShiftAlgorithm,
                       params: &BiGaussParams) -> Result<Analysis> {
  check_lengths(&ensemble, sim.len())?;
  if flags.len() != sim.len() {
    return Err(ShapeError::from_kind(ErrorKind::IncompatibleShape).into());
  }

  let n = ensemble.dim().0;
  let min_group_size = params.min_group_size.max(2);
  let r2 = obs.sigma * obs.sigma;
  let prior = ensemble.to_owned();

  let mut reports = Vec::new();
  let mut corrected = Vec::new();

  for &regime in Regime::ALL.iter() {
    let members: Vec<usize> = (0..n)
      .filter(|&i| flags[i] == regime )
      .collect();
    if members.is_empty() { continue; }

    let mut report = GroupReport {
      regime: regime,
      members: members.len(),
      status: GroupStatus::TooFewMembers,
      prior_weight: members.len() as f64 / n as f64,
      posterior_weight: 0.0,
      shift_weight: 0.0,
    };

    let moments = if members.len() >= min_group_size {
      Moments::of_members(prior.view(), sim, &members)
    } else {
      None
    };
    let moments = match moments {
      Some(m) => m,
      None => {
        debug!("bigauss @ {}: {:?} group has {} member(s), left as is",
               obs.location, regime, members.len());
        reports.push(report);
        continue;
      },
    };
    let gain = if moments.obs_variance > 0.0 {
      moments.gain(obs.sigma)
    } else {
      None
    };
    let gain = match gain {
      Some(g) => g,
      None => {
        debug!("bigauss @ {}: {:?} group has no spread, left as is",
               obs.location, regime);
        report.status = GroupStatus::ZeroSpread;
        reports.push(report);
        continue;
      },
    };

    apply_gain(&mut ensemble, sim, members.iter().cloned(),
               gain.view(), obs.value);

    let innovation = moments.innovation_variance(obs.sigma);
    let kappa = moments.obs_variance / innovation;
    let mut posterior_mean = moments.state_mean.clone();
    posterior_mean.scaled_add(obs.value - moments.obs_mean, &gain);
    let d = obs.value - moments.obs_mean;

    report.status = GroupStatus::Corrected;
    corrected.push(Corrected {
      report: reports.len(),
      members: members,
      posterior_mean: posterior_mean,
      obs_posterior_mean: moments.obs_mean + kappa * d,
      obs_posterior_variance: moments.obs_variance * r2 / innovation,
      log_likelihood: -0.5 * innovation.ln() - 0.5 * d * d / innovation,
    });
    reports.push(report);
  }

  let mut analysis = Analysis {
    location: obs.location,
    groups: reports,
    mixture_mean: None,
  };

  if corrected.len() < 2 {
    for c in corrected.iter() {
      analysis.groups[c.report].posterior_weight = 1.0;
    }
    return Ok(analysis);
  }

  let n_c: usize = corrected.iter().map(|c| c.members.len() ).sum();
  let fractions: Vec<f64> = corrected
    .iter()
    .map(|c| c.members.len() as f64 / n_c as f64 )
    .collect();
  let weights = posterior_weights(&corrected, &fractions);

  let mut mixture_mean: Array<f64, Ix1> = Array::zeros(ensemble.dim().1);
  for (c, &w) in corrected.iter().zip(weights.iter()) {
    mixture_mean.scaled_add(w, &c.posterior_mean);
    analysis.groups[c.report].posterior_weight = w;
  }

  debug!("bigauss @ {}: {} corrected groups, weights = {:?}",
         obs.location, corrected.len(), weights);

  match shift {
    ShiftAlgorithm::Ddr2011 => {
      let shares = ddr2011(&mut ensemble, &corrected, &fractions,
                           mixture_mean.view());
      for (c, s) in corrected.iter().zip(shares.into_iter()) {
        analysis.groups[c.report].shift_weight = s;
      }
    },
    ShiftAlgorithm::LineComb => {
      let alphas = line_comb(&mut ensemble, prior.view(), sim, obs,
                             &corrected, params);
      for (c, a) in corrected.iter().zip(alphas.into_iter()) {
        analysis.groups[c.report].shift_weight = a;
      }
    },
  }

  analysis.mixture_mean = Some(mixture_mean);
  Ok(analysis)
}

/// Prior group fractions reweighted by the likelihood of the observation
/// under each group's predictive distribution.
fn posterior_weights(corrected: &[Corrected], fractions: &[f64]) -> Vec<f64> {
  let logs: Vec<f64> = corrected
    .iter()
    .zip(fractions.iter())
    .map(|(c, &f)| f.ln() + c.log_likelihood )
    .collect();
  let max = logs.iter().cloned().fold(::std::f64::NEG_INFINITY, f64::max);
  let mut w: Vec<f64> = logs.iter().map(|&l| (l - max).exp() ).collect();
  let total: f64 = w.iter().sum();
  if !(total > 0.0) || !total.is_finite() {
    return fractions.to_vec();
  }
  for v in w.iter_mut() {
    *v /= total;
  }
  w
}

fn ddr2011(ensemble: &mut ArrayViewMut<f64, Ix2>,
           corrected: &[Corrected],
           fractions: &[f64],
           mixture_mean: ArrayView<f64, Ix1>) -> Vec<f64> {
  // every corrected group's mean is exactly its posterior mean here
  let mut residual = mixture_mean.to_owned();
  for (c, &f) in corrected.iter().zip(fractions.iter()) {
    residual.scaled_add(-f, &c.posterior_mean);
  }

  let spreads: Vec<f64> = corrected
    .iter()
    .map(|c| c.obs_posterior_variance.sqrt() )
    .collect();
  let scale: f64 = spreads
    .iter()
    .zip(fractions.iter())
    .map(|(&s, &f)| s * f )
    .sum();

  let shares: Vec<f64> = spreads
    .iter()
    .map(|&s| if scale > 0.0 { s / scale } else { 1.0 } )
    .collect();

  for (c, &share) in corrected.iter().zip(shares.iter()) {
    for &i in c.members.iter() {
      ensemble.row_mut(i).scaled_add(share, &residual);
    }
  }

  shares
}

fn line_comb(ensemble: &mut ArrayViewMut<f64, Ix2>,
             prior: ArrayView<f64, Ix2>,
             sim: ArrayView<f64, Ix1>,
             obs: &ScalarObservation,
             corrected: &[Corrected],
             params: &BiGaussParams) -> Vec<f64> {
  let all: Vec<usize> = corrected
    .iter()
    .flat_map(|c| c.members.iter().cloned() )
    .collect();
  let global_gain = Moments::of_members(prior, sim, &all)
    .and_then(|m| m.gain(obs.sigma) );
  let global_gain = match global_gain {
    Some(g) => g,
    None => {
      debug!("bigauss @ {}: no global gain, keeping group corrections",
             obs.location);
      return vec![1.0; corrected.len()];
    },
  };

  let r2 = obs.sigma * obs.sigma;
  let scale = if params.linecomb_scale > 0.0 { params.linecomb_scale } else { 1.0 };

  let mut alphas = Vec::with_capacity(corrected.len());
  for c in corrected.iter() {
    let d = c.obs_posterior_mean - obs.value;
    let spread = scale * (c.obs_posterior_variance + r2);
    let alpha = if spread > 0.0 {
      (-0.5 * d * d / spread).exp()
    } else {
      1.0
    };
    let beta = 1.0 - alpha;

    for &i in c.members.iter() {
      let mut row = ensemble.row_mut(i);
      row *= alpha;
      row.scaled_add(beta, &prior.row(i));
      row.scaled_add(beta * (obs.value - sim[i]), &global_gain);
    }

    alphas.push(alpha);
  }

  alphas
}
