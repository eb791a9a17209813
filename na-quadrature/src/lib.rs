
#[macro_use]
extern crate log;
extern crate ndarray as nd;
extern crate na_core as nac;

pub mod rk4;
