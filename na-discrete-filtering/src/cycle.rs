//! One assimilation cycle: optional inflation of the prior followed by the
//! serial sweep over the observed locations, each update feeding the next.

use std::fmt;

use nd::{Array, ArrayView, Ix1, Ix2};

use serde::{Deserialize, Serialize};

use nac::{Error, ObservationOperator, Regime, Result};

use crate::ensemble;
use crate::inflation;
use crate::kalman::{bigauss, serial, ScalarObservation};
use crate::kalman::bigauss::{BiGaussParams, ShiftAlgorithm};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterKind {
  EnKF,
  BiGauss(ShiftAlgorithm),
}
impl FilterKind {
  pub fn label(&self) -> &'static str {
    match self {
      &FilterKind::EnKF => "EnKF",
      &FilterKind::BiGauss(ShiftAlgorithm::Ddr2011) => "BGEnF_DDR",
      &FilterKind::BiGauss(ShiftAlgorithm::LineComb) => "BGEnF_EnS",
    }
  }
}
impl fmt::Display for FilterKind {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.write_str(self.label())
  }
}

/// The observations of one cycle, in the order they are assimilated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationSet {
  pub locations: Vec<usize>,
  pub values: Array<f64, Ix1>,
  pub sigma: f64,
}
impl ObservationSet {
  pub fn new(locations: Vec<usize>,
             values: Array<f64, Ix1>,
             sigma: f64) -> Result<ObservationSet> {
    if locations.len() != values.len() {
      return Err(Error::config(format!("{} locations but {} values",
                                       locations.len(), values.len())));
    }
    if !sigma.is_finite() || sigma <= 0.0 {
      return Err(Error::config(format!("observation sigma must be positive, got {}",
                                       sigma)));
    }
    Ok(ObservationSet {
      locations: locations,
      values: values,
      sigma: sigma,
    })
  }

  /// Every `stride`th value of a full observed field, starting at 0.
  pub fn from_stride(full: ArrayView<f64, Ix1>,
                     stride: usize,
                     sigma: f64) -> Result<ObservationSet> {
    if stride < 1 || stride > full.len() {
      return Err(Error::config(format!("observation stride {} outside [1, {}]",
                                       stride, full.len())));
    }
    let locations: Vec<usize> = (0..full.len()).step_by(stride).collect();
    let values = locations.iter().map(|&l| full[l] ).collect();
    ObservationSet::new(locations, values, sigma)
  }

  pub fn len(&self) -> usize { self.locations.len() }
  pub fn is_empty(&self) -> bool { self.locations.is_empty() }

  pub fn iter<'a>(&'a self) -> impl Iterator<Item = ScalarObservation> + 'a {
    let sigma = self.sigma;
    self.locations
      .iter()
      .zip(self.values.iter())
      .map(move |(&location, &value)| ScalarObservation {
        value: value,
        sigma: sigma,
        location: location,
      })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CycleConfig {
  pub filter: FilterKind,
  pub inflate: bool,
  pub bigauss: BiGaussParams,
}
impl CycleConfig {
  pub fn new(filter: FilterKind, inflate: bool) -> CycleConfig {
    CycleConfig {
      filter: filter,
      inflate: inflate,
      bigauss: Default::default(),
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleAnalysis {
  pub posterior: Array<f64, Ix2>,
  /// 1.0 when inflation is off.
  pub inflation: f64,
  /// Summed over every location of the bi-Gaussian sweep.
  pub degenerate_groups: usize,
  pub reports: Vec<bigauss::Analysis>,
}

pub fn assimilate<O>(prior: ArrayView<f64, Ix2>,
                     op: &O,
                     obs: &ObservationSet,
                     config: &CycleConfig) -> Result<CycleAnalysis>
  where O: ObservationOperator + ?Sized,
{
  let (n, len) = prior.dim();
  if n < 2 {
    return Err(Error::config(format!("ensemble of {} member(s)", n)));
  }
  if let Some(&bad) = obs.locations.iter().find(|&&l| l >= len ) {
    return Err(Error::config(format!("observed location {} is off the grid", bad)));
  }
  ensemble::ensure_finite(prior, "forecast")?;

  let mut x = prior.to_owned();
  let mut factor = 1.0;
  if config.inflate && !obs.is_empty() {
    let (sim, _) = op.observe(prior)?;
    let (inflated, f) = inflation::inflate(x, &obs.locations[..], sim.view(),
                                           obs.values.view(), obs.sigma)?;
    x = inflated;
    factor = f;
  }

  let mut degenerate_groups = 0;
  let mut reports = Vec::new();
  for o in obs.iter() {
    let sim = x.column(o.location).mapv(|v| op.transform(v) );

    match config.filter {
      FilterKind::EnKF => {
        serial::update_in_place(x.view_mut(), sim.view(), &o)?;
      },
      FilterKind::BiGauss(shift) => {
        let flags: Array<Regime, Ix1> = sim.mapv(|y| op.regime(y) );
        let analysis = bigauss::update_in_place(x.view_mut(), sim.view(), &o,
                                                flags.view(), shift,
                                                &config.bigauss)?;
        degenerate_groups += analysis.degenerate_groups();
        reports.push(analysis);
      },
    }

    ensemble::ensure_finite(x.view(), "analysis")?;
  }

  Ok(CycleAnalysis {
    posterior: x,
    inflation: factor,
    degenerate_groups: degenerate_groups,
    reports: reports,
  })
}

#[cfg(test)]
mod test {
  use super::*;
  use nd::{arr1, arr2, Axis};

  use crate::utils::PartialEqWithinTol;

  struct Identity;
  impl ObservationOperator for Identity {
    fn transform(&self, x: f64) -> f64 { x }
    fn regime(&self, y: f64) -> Regime {
      if y < 0.0 { Regime::Cloudy } else { Regime::Clear }
    }
  }

  fn prior() -> Array<f64, Ix2> {
    arr2(&[
      [ 1.0, 0.5, -2.0,  3.0],
      [ 2.0, 1.5, -1.0,  2.0],
      [-1.0, 0.0,  4.0, -1.0],
      [-2.0, 1.0,  3.0,  0.0],
      [ 0.5, 2.0, -3.0,  1.0],
    ])
  }

  #[test]
  fn stride_selects_locations() {
    let full = arr1(&[0.0, 1.0, 2.0, 3.0, 4.0]);
    let set = ObservationSet::from_stride(full.view(), 2, 1.0).unwrap();
    assert_eq!(set.locations, vec![0, 2, 4]);
    assert_eq!(set.values, arr1(&[0.0, 2.0, 4.0]));
    let obs: Vec<_> = set.iter().collect();
    assert_eq!(obs[1], ScalarObservation { value: 2.0, sigma: 1.0, location: 2, });

    assert!(ObservationSet::from_stride(full.view(), 0, 1.0).is_err());
    assert!(ObservationSet::from_stride(full.view(), 6, 1.0).is_err());
    assert!(ObservationSet::from_stride(full.view(), 1, 0.0).is_err());
  }

  #[test]
  fn labels() {
    assert_eq!(FilterKind::EnKF.label(), "EnKF");
    assert_eq!(FilterKind::BiGauss(ShiftAlgorithm::Ddr2011).label(), "BGEnF_DDR");
    assert_eq!(FilterKind::BiGauss(ShiftAlgorithm::LineComb).to_string(), "BGEnF_EnS");
  }

  #[test]
  fn enkf_sweep_matches_sequential_updates() {
    let x = prior();
    let obs = ObservationSet::new(vec![0, 2], arr1(&[0.3, 1.0]), 0.5).unwrap();
    let config = CycleConfig::new(FilterKind::EnKF, false);
    let out = assimilate(x.view(), &Identity, &obs, &config).unwrap();
    assert_eq!(out.inflation, 1.0);
    assert!(out.reports.is_empty());

    let mut expected = x.clone();
    for o in obs.iter() {
      let sim = expected.column(o.location).to_owned();
      expected = serial::update(expected, sim.view(), &o).unwrap();
    }
    assert!(out.posterior.view().partial_eq_within_tol(&expected.view(), 1e-12));
  }

  #[test]
  fn inflation_factor_is_reported() {
    let x = prior();
    // far from every member, so the factor exceeds one
    let obs = ObservationSet::new(vec![1], arr1(&[40.0]), 0.1).unwrap();
    let config = CycleConfig::new(FilterKind::EnKF, true);
    let out = assimilate(x.view(), &Identity, &obs, &config).unwrap();
    assert!(out.inflation > 1.0);
  }

  #[test]
  fn inflation_matches_the_standalone_factor() {
    let x = prior();
    let obs = ObservationSet::new(vec![1, 3], arr1(&[12.0, -9.0]), 0.5).unwrap();
    let config = CycleConfig::new(FilterKind::EnKF, true);
    let out = assimilate(x.view(), &Identity, &obs, &config).unwrap();

    let sim = x.select(Axis(1), &obs.locations[..]);
    let expected = inflation::factor(sim.view(), obs.values.view(), obs.sigma).unwrap();
    assert!(expected > 1.0);
    assert!((out.inflation - expected).abs() < 1e-12);

    // the sweep starts from the inflated prior
    let (inflated, _) = inflation::inflate(x.clone(), &obs.locations[..], x.view(),
                                           obs.values.view(), obs.sigma).unwrap();
    let mut swept = inflated;
    for o in obs.iter() {
      let sim = swept.column(o.location).to_owned();
      swept = serial::update(swept, sim.view(), &o).unwrap();
    }
    assert!(out.posterior.view().partial_eq_within_tol(&swept.view(), 1e-12));
  }

  #[test]
  fn bigauss_sweep_reports_every_location() {
    let x = prior();
    let obs = ObservationSet::new(vec![0, 2, 3], arr1(&[0.5, -0.5, 1.0]), 1.0).unwrap();
    for &shift in &[ShiftAlgorithm::Ddr2011, ShiftAlgorithm::LineComb] {
      let config = CycleConfig::new(FilterKind::BiGauss(shift), true);
      let out = assimilate(x.view(), &Identity, &obs, &config).unwrap();
      assert_eq!(out.reports.len(), 3);
      assert_eq!(out.posterior.dim(), x.dim());
      assert!(out.inflation >= 1.0);
      let counted: usize = out.reports.iter().map(|r| r.degenerate_groups() ).sum();
      assert_eq!(counted, out.degenerate_groups);
    }
  }

  #[test]
  fn non_finite_prior_is_divergence() {
    let mut x = prior();
    x[[3, 1]] = ::std::f64::INFINITY;
    let obs = ObservationSet::new(vec![0], arr1(&[0.0]), 1.0).unwrap();
    let config = CycleConfig::new(FilterKind::EnKF, true);
    match assimilate(x.view(), &Identity, &obs, &config) {
      Err(Error::NumericDivergence { member: 3, component: 1, .. }) => {},
      other => panic!("unexpected: {:?}", other),
    }
  }

  #[test]
  fn off_grid_location_is_rejected() {
    let x = prior();
    let obs = ObservationSet::new(vec![4], arr1(&[0.0]), 1.0).unwrap();
    let config = CycleConfig::new(FilterKind::EnKF, false);
    assert!(assimilate(x.view(), &Identity, &obs, &config).is_err());
  }
}
