
use thiserror::Error;

pub type Result<T> = ::std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
  /// A state became NaN or infinite somewhere in the ensemble.
  #[error("non-finite state after {stage} (member {member}, component {component})")]
  NumericDivergence {
    stage: &'static str,
    member: usize,
    component: usize,
  },
  /// The innovation variance at `location` is (numerically) zero, so the
  /// gain is undefined.
  #[error("degenerate covariance at location {location}: innovation variance {variance}")]
  DegenerateCovariance {
    location: usize,
    variance: f64,
  },
  #[error("invalid configuration: {0}")]
  Configuration(String),
  #[error(transparent)]
  Shape(#[from] nd::ShapeError),
}

impl Error {
  pub fn config<S>(msg: S) -> Error
    where S: Into<String>,
  {
    Error::Configuration(msg.into())
  }

  pub fn is_divergence(&self) -> bool {
    match self {
      &Error::NumericDivergence { .. } => true,
      _ => false,
    }
  }
}
