//! Twin experiments: one truth, one set of observations, several filters
//! run side by side from the same initial ensemble, plus a free run that is
//! never assimilated.

use std::collections::HashSet;
use std::fmt;

use nd::{Array, ArrayView, Ix1, Ix2, s};
use rand::SeedableRng;
use rand_isaac::Isaac64Rng;
use rayon::prelude::*;

use serde::{Deserialize, Serialize};

use nac::{Error, ModelStats, ObservationOperator, Regime, Result};
use na_df::cycle::{assimilate, CycleConfig, FilterKind, ObservationSet};
use na_df::ensemble;
use na_df::kalman::bigauss::{BiGaussParams, ShiftAlgorithm};
use na_q::rk4;
use util::{CycleRecord, RunSummary, StateSteps};
use util::data::simulate_truth_observation;

use crate::{DT, GRID_SIZE, L95Model};
use crate::setup::{setup_ensemble_parallel, stream_seeds, NOISE_STREAM};

/// Identifies one assimilating run within an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunKey {
  pub filter: FilterKind,
  pub inflate: bool,
}
impl RunKey {
  pub fn new(filter: FilterKind, inflate: bool) -> RunKey {
    RunKey {
      filter: filter,
      inflate: inflate,
    }
  }
}
impl fmt::Display for RunKey {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}_Inflate{}", self.filter, if self.inflate { "T" } else { "F" })
  }
}

pub const FREE_RUN_LABEL: &'static str = "NoDA";

/// Pinned so the default setup gives the same ensemble on every machine.
pub const DEFAULT_WORKERS: usize = 4;

/// Names the artifacts of one experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExperimentId {
  pub cycle_steps: u64,
  pub obs_stride: usize,
  pub experiment: u32,
}
impl ExperimentId {
  /// `None` is the free run.
  pub fn stem(&self, key: Option<&RunKey>) -> String {
    let run = match key {
      Some(key) => key.to_string(),
      None => format!("{}_InflateF", FREE_RUN_LABEL),
    };
    format!("{}_non_stats_cycint{:02}_obsint{:02}_{:04}",
            run, self.cycle_steps, self.obs_stride, self.experiment)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSetup {
  pub n_members: usize,
  pub obs_sigma: f64,
  pub total_steps: u64,
  /// RK4 steps between analyses.
  pub cycle_steps: u64,
  /// Every `obs_stride`th grid point is observed.
  pub obs_stride: usize,
  pub seed: u64,
  /// Ensemble generation workers. The initial ensemble depends on this
  /// count; 0 uses the rayon pool size, which varies between machines.
  pub workers: usize,
  pub experiment: u32,
  pub runs: Vec<RunKey>,
  pub bigauss: BiGaussParams,
  /// Keep every prior and posterior ensemble, not just the diagnostics.
  pub store_ensembles: bool,
}
impl Default for ExperimentSetup {
  fn default() -> Self {
    ExperimentSetup {
      n_members: 800,
      obs_sigma: 1.0,
      total_steps: 800,
      cycle_steps: 5,
      obs_stride: 2,
      seed: 1,
      workers: DEFAULT_WORKERS,
      experiment: 1,
      runs: vec![
        RunKey::new(FilterKind::EnKF, true),
        RunKey::new(FilterKind::BiGauss(ShiftAlgorithm::Ddr2011), true),
        RunKey::new(FilterKind::BiGauss(ShiftAlgorithm::LineComb), true),
      ],
      bigauss: Default::default(),
      store_ensembles: false,
    }
  }
}
impl ExperimentSetup {
  pub fn validate(&self) -> Result<()> {
    if self.n_members < 2 {
      return Err(Error::config(format!("ensemble size {} is less than 2",
                                       self.n_members)));
    }
    if !self.obs_sigma.is_finite() || self.obs_sigma <= 0.0 {
      return Err(Error::config(format!("observation sigma must be positive, got {}",
                                       self.obs_sigma)));
    }
    if self.cycle_steps == 0 {
      return Err(Error::config("cycle length of zero steps"));
    }
    if self.cycles() == 0 {
      return Err(Error::config(format!("{} total steps is less than one cycle of {}",
                                       self.total_steps, self.cycle_steps)));
    }
    if self.obs_stride < 1 || self.obs_stride > GRID_SIZE {
      return Err(Error::config(format!("observation stride {} outside [1, {}]",
                                       self.obs_stride, GRID_SIZE)));
    }
    if !self.bigauss.linecomb_scale.is_finite() || self.bigauss.linecomb_scale <= 0.0 {
      return Err(Error::config(format!("LineComb scale must be positive, got {}",
                                       self.bigauss.linecomb_scale)));
    }
    let mut seen = HashSet::new();
    for key in self.runs.iter() {
      if !seen.insert(key) {
        return Err(Error::config(format!("run {} is listed twice", key)));
      }
    }
    Ok(())
  }

  pub fn cycles(&self) -> usize {
    if self.cycle_steps == 0 { return 0; }
    (self.total_steps / self.cycle_steps) as usize
  }

  pub fn locations(&self) -> Vec<usize> {
    (0..GRID_SIZE).step_by(self.obs_stride.max(1)).collect()
  }

  pub fn workers(&self) -> usize {
    if self.workers == 0 {
      rayon::current_num_threads()
    } else {
      self.workers
    }
  }

  pub fn id(&self) -> ExperimentId {
    ExperimentId {
      cycle_steps: self.cycle_steps,
      obs_stride: self.obs_stride,
      experiment: self.experiment,
    }
  }
}

/// Why and when a run stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
  pub cycle: usize,
  pub error: String,
}

struct Run {
  key: Option<RunKey>,
  config: Option<CycleConfig>,
  ensemble: Array<f64, Ix2>,
  rates: Array<f64, Ix2>,
  model: ModelStats<L95Model>,
  integrator: rk4::State,
  steps: StateSteps,
  failure: Option<RunFailure>,
}
impl Run {
  fn new(key: Option<RunKey>, setup: &ExperimentSetup,
         ensemble: Array<f64, Ix2>) -> Run {
    let config = key.map(|key| CycleConfig {
      filter: key.filter,
      inflate: key.inflate,
      bigauss: setup.bigauss,
    });
    let dim = ensemble.dim();
    Run {
      key: key,
      config: config,
      ensemble: ensemble,
      rates: Array::zeros(dim),
      model: From::from(L95Model::default()),
      integrator: rk4::new(DT, dim),
      steps: StateSteps::new(setup.cycles(), dim.0, dim.1, setup.store_ensembles),
      failure: None,
    }
  }

  fn label(&self) -> String {
    match self.key {
      Some(ref key) => key.to_string(),
      None => FREE_RUN_LABEL.to_string(),
    }
  }

  fn forecast(&mut self, steps: u64) {
    if self.failure.is_some() { return; }
    self.integrator.advance(&mut self.model, self.ensemble.view_mut(), steps);
  }

  fn analyse<O>(&mut self, cycle: usize,
                op: &O,
                obs: &ObservationSet,
                truth: ArrayView<f64, Ix1>) -> Result<()>
    where O: ObservationOperator + ?Sized,
  {
    match self.config {
      None => {
        ensemble::ensure_finite(self.ensemble.view(), "forecast")?;
        self.model.derivative(self.ensemble.view(), self.rates.view_mut());
        self.steps.store_free_run(cycle, self.ensemble.view(), truth,
                                  self.rates.view())
      },
      Some(config) => {
        let analysis = assimilate(self.ensemble.view(), op, obs, &config)?;
        self.model.derivative(analysis.posterior.view(), self.rates.view_mut());
        {
          let record = CycleRecord {
            prior: self.ensemble.view(),
            posterior: analysis.posterior.view(),
            truth: truth.view(),
            rates: self.rates.view(),
            inflation: analysis.inflation,
            degenerate_groups: analysis.degenerate_groups,
          };
          self.steps.store_cycle(cycle, record)?;
        }
        self.ensemble = analysis.posterior;
        Ok(())
      },
    }
  }

  fn step<O>(&mut self, cycle: usize,
             op: &O,
             obs: &ObservationSet,
             truth: ArrayView<f64, Ix1>)
    where O: ObservationOperator + ?Sized,
  {
    if self.failure.is_some() { return; }

    if let Err(e) = self.analyse(cycle, op, obs, truth) {
      warn!("{} stopped at cycle {}: {}", self.label(), cycle, e);
      self.failure = Some(RunFailure {
        cycle: cycle,
        error: e.to_string(),
      });
    }
  }

  fn finish(self, id: &ExperimentId) -> RunResult {
    RunResult {
      label: self.label(),
      stem: id.stem(self.key.as_ref()),
      key: self.key,
      summary: self.steps.summary(),
      steps: self.steps,
      failure: self.failure,
      model_calls: self.model.calls,
    }
  }
}

/// Posterior RMSE of every live run after one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleSummary {
  pub cycle: usize,
  pub cloudy_observations: usize,
  /// `None` once a run has stopped.
  pub rmse: Vec<(String, Option<f64>)>,
}
impl fmt::Display for CycleSummary {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "cycle {}, {} cloudy", self.cycle, self.cloudy_observations)?;
    for &(ref label, rmse) in self.rmse.iter() {
      match rmse {
        Some(rmse) => write!(f, ", {} {:.3}", label, rmse)?,
        None => write!(f, ", {} --", label)?,
      }
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
  pub label: String,
  pub stem: String,
  pub key: Option<RunKey>,
  pub steps: StateSteps,
  pub summary: RunSummary,
  pub failure: Option<RunFailure>,
  pub model_calls: u64,
}
impl RunResult {
  pub fn diverged(&self) -> bool { self.failure.is_some() }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExperimentResults {
  pub id: ExperimentId,
  pub setup: ExperimentSetup,
  pub locations: Vec<usize>,
  /// `cycles × state` truth at every analysis time.
  pub truth: Array<f64, Ix2>,
  /// `cycles × observed locations`.
  pub observations: Array<f64, Ix2>,
  pub observation_flags: Array<Regime, Ix2>,
  /// The free run comes first, then the runs in setup order.
  pub runs: Vec<RunResult>,
}
impl ExperimentResults {
  pub fn run(&self, key: &RunKey) -> Option<&RunResult> {
    self.runs.iter().find(|r| r.key.as_ref() == Some(key) )
  }
  pub fn free_run(&self) -> Option<&RunResult> {
    self.runs.iter().find(|r| r.key.is_none() )
  }
}

pub struct Experiment<O> {
  setup: ExperimentSetup,
  id: ExperimentId,
  op: O,
  locations: Vec<usize>,
  rand: Isaac64Rng,

  truth: Array<f64, Ix2>,
  truth_model: ModelStats<L95Model>,
  truth_integrator: rk4::State,

  truth_trajectory: Array<f64, Ix2>,
  observations: Array<f64, Ix2>,
  observation_flags: Array<Regime, Ix2>,

  runs: Vec<Run>,
  cycle: usize,
}

impl<O> Experiment<O>
  where O: ObservationOperator,
{
  /// Draws `n_members + 1` spun-up states; the first is the truth, the rest
  /// are the initial ensemble shared by every run.
  pub fn new(setup: ExperimentSetup, op: O) -> Result<Experiment<O>> {
    setup.validate()?;

    let workers = setup.workers();
    let states = setup_ensemble_parallel(&L95Model::default(),
                                         setup.n_members + 1,
                                         workers, setup.seed)?;
    let truth = states.slice(s![..1, ..]).to_owned();
    let initial = states.slice(s![1.., ..]).to_owned();

    let locations = setup.locations();
    let cycles = setup.cycles();

    let mut runs = Vec::with_capacity(setup.runs.len() + 1);
    runs.push(Run::new(None, &setup, initial.clone()));
    for &key in setup.runs.iter() {
      runs.push(Run::new(Some(key), &setup, initial.clone()));
    }

    info!("{} members, {} cycles of {} steps, {} observed locations, runs: {}",
          setup.n_members, cycles, setup.cycle_steps, locations.len(),
          runs.iter().map(|r| r.label() ).collect::<Vec<_>>().join(" "));

    Ok(Experiment {
      id: setup.id(),
      rand: Isaac64Rng::seed_from_u64(stream_seeds(setup.seed, 1)[NOISE_STREAM]),
      truth_integrator: rk4::new(DT, truth.dim()),
      truth_model: From::from(L95Model::default()),
      truth: truth,
      truth_trajectory: Array::zeros((cycles, GRID_SIZE)),
      observations: Array::zeros((cycles, locations.len())),
      observation_flags: Array::from_elem((cycles, locations.len()), Regime::default()),
      locations: locations,
      op: op,
      runs: runs,
      cycle: 0,
      setup: setup,
    })
  }

  pub fn setup(&self) -> &ExperimentSetup { &self.setup }
  pub fn id(&self) -> ExperimentId { self.id }
  pub fn cycles(&self) -> usize { self.setup.cycles() }
  pub fn current_cycle(&self) -> usize { self.cycle }

  /// Runs one cycle; `None` once every cycle is done. Only a broken truth
  /// stops the whole experiment, failing runs are recorded and skipped.
  pub fn step_cycle(&mut self) -> Result<Option<CycleSummary>> {
    let cycle = self.cycle;
    if cycle >= self.cycles() {
      return Ok(None);
    }

    let steps = self.setup.cycle_steps;
    if cycle > 0 {
      self.truth_integrator.advance(&mut self.truth_model,
                                    self.truth.view_mut(), steps);
      self.runs
        .par_iter_mut()
        .for_each(|run| run.forecast(steps) );
    }
    ensemble::ensure_finite(self.truth.view(), "truth forecast")?;

    let truth = self.truth.row(0);
    let (full, flags) = simulate_truth_observation(truth, &self.op,
                                                   self.setup.obs_sigma,
                                                   &mut self.rand)?;
    let values: Array<f64, Ix1> = self.locations.iter().map(|&l| full[l] ).collect();
    let obs = ObservationSet::new(self.locations.clone(), values,
                                  self.setup.obs_sigma)?;

    self.truth_trajectory.row_mut(cycle).assign(&truth);
    self.observations.row_mut(cycle).assign(&obs.values);
    let mut cloudy = 0;
    for (i, &l) in self.locations.iter().enumerate() {
      self.observation_flags[[cycle, i]] = flags[l];
      if flags[l] == Regime::Cloudy { cloudy += 1; }
    }

    let op = &self.op;
    self.runs
      .par_iter_mut()
      .for_each(|run| run.step(cycle, op, &obs, truth) );

    let rmse = self.runs
      .iter()
      .map(|run| {
        let rmse = if run.failure.is_some() {
          None
        } else {
          Some(run.steps.posterior_rmse[cycle])
        };
        (run.label(), rmse)
      })
      .collect();
    let summary = CycleSummary {
      cycle: cycle,
      cloudy_observations: cloudy,
      rmse: rmse,
    };
    debug!("{}", summary);

    self.cycle += 1;
    Ok(Some(summary))
  }

  /// Step through every remaining cycle, handing each summary to
  /// `on_cycle`.
  pub fn run<F>(mut self, mut on_cycle: F) -> Result<ExperimentResults>
    where F: FnMut(&CycleSummary),
  {
    while let Some(summary) = self.step_cycle()? {
      on_cycle(&summary);
    }
    Ok(self.finish())
  }

  pub fn finish(self) -> ExperimentResults {
    let id = self.id;
    let runs: Vec<RunResult> = self.runs
      .into_iter()
      .map(|run| run.finish(&id) )
      .collect();

    for run in runs.iter() {
      let s = &run.summary;
      match run.failure {
        Some(ref failure) => {
          warn!("{}: diverged at cycle {} ({})", run.stem, failure.cycle, failure.error);
        },
        None => {
          info!("{}: rmse {:.4} -> {:.4}, spread {:.4} -> {:.4}, inflation {:.3}",
                run.stem, s.prior_rmse, s.posterior_rmse,
                s.prior_spread, s.posterior_spread, s.inflation);
        },
      }
    }

    ExperimentResults {
      id: id,
      locations: self.locations,
      truth: self.truth_trajectory,
      observations: self.observations,
      observation_flags: self.observation_flags,
      runs: runs,
      setup: self.setup,
    }
  }
}
