
#[macro_use]
extern crate log;
extern crate ndarray as nd;
extern crate na_core as nac;
extern crate serde;

pub use nac::{Error, Result, Regime, ObservationOperator};

pub mod cycle;
pub mod ensemble;
pub mod inflation;
pub mod kalman;
pub mod utils;
