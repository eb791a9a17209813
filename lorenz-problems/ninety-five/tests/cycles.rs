extern crate ndarray as nd;
extern crate na_core as nac;
extern crate na_discrete_filtering as na_df;
extern crate ninety_five as l95;

use nac::{ObservationOperator, Regime};
use na_df::cycle::FilterKind;
use na_df::kalman::bigauss::ShiftAlgorithm;

use l95::GRID_SIZE;
use l95::experiment::{Experiment, ExperimentSetup, RunKey};
use l95::observation::PseudoChannel8;

/// Observes the state directly.
struct Direct;
impl ObservationOperator for Direct {
  fn transform(&self, x: f64) -> f64 { x }
  fn regime(&self, y: f64) -> Regime {
    if y > 8.0 { Regime::Cloudy } else { Regime::Clear }
  }
}

/// Observes nothing useful.
struct Broken;
impl ObservationOperator for Broken {
  fn transform(&self, _: f64) -> f64 { ::std::f64::NAN }
  fn regime(&self, _: f64) -> Regime { Regime::Clear }
}

fn small_setup() -> ExperimentSetup {
  ExperimentSetup {
    n_members: 20,
    total_steps: 50,
    cycle_steps: 5,
    obs_stride: 4,
    workers: 2,
    ..Default::default()
  }
}

#[test]
fn ten_cycles_with_inflation() {
  let setup = small_setup();
  let results = Experiment::new(setup.clone(), Direct)
    .unwrap()
    .run(|_| {})
    .unwrap();

  assert_eq!(results.truth.dim(), (10, GRID_SIZE));
  assert_eq!(results.observations.dim(), (10, 10));
  assert_eq!(results.runs.len(), setup.runs.len() + 1);

  let enkf = results.run(&RunKey::new(FilterKind::EnKF, true)).unwrap();
  assert!(!enkf.diverged(), "{:?}", enkf.failure);
  assert_eq!(enkf.steps.completed, 10);

  for run in results.runs.iter() {
    let done = run.steps.completed;
    for &f in run.steps.inflation.iter().take(done) {
      assert!(f >= 1.0, "{}: inflation {}", run.label, f);
    }
  }

  let free = results.free_run().unwrap();
  assert_eq!(free.steps.completed, 10);
  assert!(free.steps.inflation.iter().all(|&f| f == 1.0 ));
  assert_eq!(free.steps.prior_rmse, free.steps.posterior_rmse);
}

#[test]
fn bigauss_runs_with_the_pseudo_channel() {
  let mut setup = small_setup();
  setup.runs = vec![
    RunKey::new(FilterKind::BiGauss(ShiftAlgorithm::Ddr2011), true),
    RunKey::new(FilterKind::BiGauss(ShiftAlgorithm::LineComb), false),
  ];
  setup.store_ensembles = true;
  let results = Experiment::new(setup, PseudoChannel8::default())
    .unwrap()
    .run(|_| {})
    .unwrap();

  for run in results.runs.iter() {
    let done = run.steps.completed;
    assert!(run.steps.inflation.iter().take(done).all(|&f| f >= 1.0 ));
    let priors = run.steps.priors.as_ref().unwrap();
    assert_eq!(priors.dim(), (10, 20, GRID_SIZE));
  }

  let no_inflation = results
    .run(&RunKey::new(FilterKind::BiGauss(ShiftAlgorithm::LineComb), false))
    .unwrap();
  let done = no_inflation.steps.completed;
  assert!(no_inflation.steps.inflation.iter().take(done).all(|&f| f == 1.0 ));
}

#[test]
fn failing_runs_do_not_stop_the_others() {
  let results = Experiment::new(small_setup(), Broken)
    .unwrap()
    .run(|_| {})
    .unwrap();

  for run in results.runs.iter() {
    match run.key {
      None => {
        assert!(!run.diverged());
        assert_eq!(run.steps.completed, 10);
      },
      Some(_) => {
        let failure = run.failure.as_ref().unwrap();
        assert_eq!(failure.cycle, 0);
        assert_eq!(run.steps.completed, 0);
        assert!(run.summary.posterior_rmse.is_nan());
      },
    }
  }
}

#[test]
fn same_seed_same_experiment() {
  let run = || {
    Experiment::new(small_setup(), Direct)
      .unwrap()
      .run(|_| {})
      .unwrap()
  };
  let a = run();
  let b = run();
  assert_eq!(a.truth, b.truth);
  assert_eq!(a.observations, b.observations);
  for (ra, rb) in a.runs.iter().zip(b.runs.iter()) {
    assert_eq!(ra.steps.posterior_rmse, rb.steps.posterior_rmse);
  }
}

#[test]
fn step_cycle_stops_after_the_last_cycle() {
  let mut setup = small_setup();
  setup.total_steps = 10;
  let mut experiment = Experiment::new(setup, Direct).unwrap();
  assert_eq!(experiment.cycles(), 2);

  let first = experiment.step_cycle().unwrap().unwrap();
  assert_eq!(first.cycle, 0);
  assert_eq!(first.rmse.len(), 4);
  assert_eq!(first.rmse[0].0, "NoDA");
  assert!(experiment.step_cycle().unwrap().is_some());
  assert!(experiment.step_cycle().unwrap().is_none());
  assert_eq!(experiment.current_cycle(), 2);
}

#[test]
fn consecutive_seeds_share_no_states() {
  let first_cycle = |seed| {
    let mut setup = small_setup();
    setup.total_steps = 5;
    setup.seed = seed;
    setup.runs.clear();
    setup.store_ensembles = true;
    Experiment::new(setup, Direct)
      .unwrap()
      .run(|_| {})
      .unwrap()
  };
  let a = first_cycle(1);
  let b = first_cycle(2);
  assert!(a.truth.row(0) != b.truth.row(0));
  assert!(a.observations.row(0) != b.observations.row(0));

  let pa = a.free_run().unwrap().steps.priors.as_ref().unwrap();
  let pb = b.free_run().unwrap().steps.priors.as_ref().unwrap();
  for member in pa.index_axis(nd::Axis(0), 0).outer_iter() {
    assert!(member != b.truth.row(0));
    for other in pb.index_axis(nd::Axis(0), 0).outer_iter() {
      assert!(member != other);
    }
  }
}
