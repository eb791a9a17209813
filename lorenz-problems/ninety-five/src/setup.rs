//! Spun-up initial ensembles.

use std::time::Instant;

use nd::{Array, ArrayView, Axis, Ix2, s};
use nd_rand::RandomExt;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rand_isaac::Isaac64Rng;
use rayon::prelude::*;

use nac::{Error, Model, ModelStats, Result};
use na_q::rk4;

use crate::{DT, SPINUP_STEPS};

/// `n_members` standard normal states relaxed by `SPINUP_STEPS` RK4 steps.
pub fn setup_ensemble<M, R>(model: &mut ModelStats<M>,
                            n_members: usize,
                            rand: &mut R) -> Array<f64, Ix2>
  where M: Model,
        R: Rng + ?Sized,
{
  let len = model.model.state_len();
  let mut x = Array::random_using((n_members, len), StandardNormal, rand);
  rk4::advance(model, DT, x.view_mut(), SPINUP_STEPS);
  x
}

/// Stream of `stream_seeds` reserved for observation noise. Ensemble
/// workers take the streams after it.
pub const NOISE_STREAM: usize = 0;

/// The first `count` seeds drawn from a master `Isaac64Rng` seeded with
/// `base_seed`. Every random stream of an experiment is seeded from here, so
/// neighbouring base seeds give unrelated streams.
pub fn stream_seeds(base_seed: u64, count: usize) -> Vec<u64> {
  let mut master = Isaac64Rng::seed_from_u64(base_seed);
  (0..count).map(|_| master.gen::<u64>() ).collect()
}

/// Split generation over `n_workers` independent generators. Worker `w`
/// draws `ceil(n_members / n_workers)` members from an `Isaac64Rng` seeded
/// with stream `NOISE_STREAM + 1 + w` of `base_seed`; the parts are joined
/// in worker order and truncated.
pub fn setup_ensemble_parallel<M>(model: &M,
                                  n_members: usize,
                                  n_workers: usize,
                                  base_seed: u64) -> Result<Array<f64, Ix2>>
  where M: Model + Clone,
{
  if n_members == 0 {
    return Err(Error::config("empty ensemble requested"));
  }
  if n_workers == 0 {
    return Err(Error::config("at least one worker is needed"));
  }

  let per_worker = (n_members + n_workers - 1) / n_workers;
  let seeds = stream_seeds(base_seed, NOISE_STREAM + 1 + n_workers);
  let start = Instant::now();

  let parts: Vec<(Array<f64, Ix2>, u64)> = (0..n_workers)
    .into_par_iter()
    .map(|worker| {
      let mut rand = Isaac64Rng::seed_from_u64(seeds[NOISE_STREAM + 1 + worker]);
      let mut model: ModelStats<M> = From::from(model.clone());
      let x = setup_ensemble(&mut model, per_worker, &mut rand);
      (x, model.calls)
    })
    .collect();

  let calls: u64 = parts.iter().map(|&(_, calls)| calls ).sum();
  let views: Vec<ArrayView<f64, Ix2>> = parts
    .iter()
    .map(|&(ref x, _)| x.view() )
    .collect();
  let all = nd::concatenate(Axis(0), &views[..])?;
  let x = all.slice(s![..n_members, ..]).to_owned();

  info!("generated {} members on {} workers in {:.2?} ({} derivative calls)",
        n_members, n_workers, start.elapsed(), calls);

  Ok(x)
}
