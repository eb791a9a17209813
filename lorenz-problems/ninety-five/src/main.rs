#[macro_use] extern crate log;
extern crate env_logger;
extern crate na_core as nac;
extern crate ninety_five as l95;
extern crate util;

use std::process;

use env_logger::{Builder, Env, Target};

use nac::Result;

use l95::experiment::{Experiment, ExperimentSetup};
use l95::observation::PseudoChannel8;
use util::progress::CycleProgress;

const ENSEMBLE_SIZE: usize = 800;
const TOTAL_STEPS: u64 = 800;
const CYCLE_STEPS: u64 = 5;
const OBS_STRIDE: usize = 2;
const OBS_SIGMA: f64 = 1.0;
const RNG_SEED: u64 = 1;
const EXPERIMENT: u32 = 1;

fn run() -> Result<()> {
  let setup = ExperimentSetup {
    n_members: ENSEMBLE_SIZE,
    obs_sigma: OBS_SIGMA,
    total_steps: TOTAL_STEPS,
    cycle_steps: CYCLE_STEPS,
    obs_stride: OBS_STRIDE,
    seed: RNG_SEED,
    experiment: EXPERIMENT,
    ..Default::default()
  };

  let experiment = Experiment::new(setup, PseudoChannel8::default())?;
  let name = format!("cycint{:02}_obsint{:02}", CYCLE_STEPS, OBS_STRIDE);
  let mut progress = CycleProgress::new(experiment.cycles(), name.into());

  let results = experiment.run(|summary| progress.cycle_done(&summary.to_string()) )?;
  progress.finish();

  let diverged = results.runs.iter().filter(|r| r.diverged() ).count();
  if diverged > 0 {
    warn!("{} of {} runs diverged", diverged, results.runs.len());
  }
  Ok(())
}

fn main() {
  Builder::from_env(Env::default().default_filter_or("info"))
    .target(Target::Stderr)
    .init();

  if let Err(e) = run() {
    error!("{}", e);
    process::exit(1);
  }
}
