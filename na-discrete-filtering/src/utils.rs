use nd::{ArrayView, Axis, Ix1, Ix2};

pub trait PartialEqWithinTol<Rhs, Tol> {
  const STD_TOL: Tol;
  fn partial_eq_within_tol(&self, rhs: &Rhs, tol: Tol) -> bool;

  fn partial_neq_within_tol(&self, rhs: &Rhs, tol: Tol) -> bool {
    !self.partial_eq_within_tol(rhs, tol)
  }

  fn partial_eq_within_std_tol(&self, rhs: &Rhs) -> bool {
    self.partial_eq_within_tol(rhs, Self::STD_TOL)
  }
  fn partial_neq_within_std_tol(&self, rhs: &Rhs) -> bool {
    !self.partial_eq_within_std_tol(rhs)
  }
}

impl PartialEqWithinTol<f64, f64> for f64 {
  const STD_TOL: Self = ::std::f64::EPSILON;
  fn partial_eq_within_tol(&self, rhs: &f64, tol: f64) -> bool {
    (self - rhs).abs() <= tol
  }
}
impl<'a> PartialEqWithinTol<ArrayView<'a, f64, Ix1>, f64> for ArrayView<'a, f64, Ix1> {
  const STD_TOL: f64 = ::std::f64::EPSILON;
  fn partial_eq_within_tol(&self, rhs: &ArrayView<'a, f64, Ix1>, tol: f64) -> bool {
    self.len() == rhs.len() &&
      self.iter()
        .zip(rhs.iter())
        .all(|(l, r)| l.partial_eq_within_tol(r, tol) )
  }
}
impl<'a> PartialEqWithinTol<ArrayView<'a, f64, Ix2>, f64> for ArrayView<'a, f64, Ix2> {
  const STD_TOL: f64 = ::std::f64::EPSILON;
  fn partial_eq_within_tol(&self, rhs: &ArrayView<'a, f64, Ix2>, tol: f64) -> bool {
    self.dim() == rhs.dim() &&
      self.axis_iter(Axis(0))
        .zip(rhs.axis_iter(Axis(0)))
        .all(|(l, r)| l.partial_eq_within_tol(&r, tol) )
  }
}
