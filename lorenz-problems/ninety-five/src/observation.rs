use serde::{Deserialize, Serialize};

use nac::{ObservationOperator, Regime};

/// A brightness-temperature-like channel: warm and slowly rising with the
/// state until a logistic "cloud top" kicks in, which drops the observed
/// value sharply. Values under `threshold` are flagged cloudy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PseudoChannel8 {
  pub clear_sky: f64,
  pub lapse: f64,
  pub cloud_drop: f64,
  pub onset: f64,
  pub width: f64,
  pub threshold: f64,
}
impl Default for PseudoChannel8 {
  fn default() -> Self {
    PseudoChannel8 {
      clear_sky: 270.0,
      lapse: 0.5,
      cloud_drop: 50.0,
      onset: 8.0,
      width: 1.0,
      threshold: 260.0,
    }
  }
}

impl ObservationOperator for PseudoChannel8 {
  fn transform(&self, x: f64) -> f64 {
    let cloud = 1.0 / (1.0 + (-(x - self.onset) / self.width).exp());
    self.clear_sky + self.lapse * x - self.cloud_drop * cloud
  }
  fn regime(&self, y: f64) -> Regime {
    if y < self.threshold {
      Regime::Cloudy
    } else {
      Regime::Clear
    }
  }
}
