use derive_more::{Display, Error};
use faer::{Col, Mat};
use problemo::Problem;
use problemo::common::IntoCommonProblem;

use crate::settings::Settings;
use crate::{E, qp::prox::ProxQp};

pub mod precond;
pub mod prox;

/// Contract violations detected while building a [`QuadraticProgram`].
#[derive(Debug, Display, Error, PartialEq, Eq, Clone, Copy)]
pub enum ModelError {
    #[display("Objective dimensions do not match the number of variables")]
    ObjectiveDimensions,

    #[display("Constraint matrix dimensions do not match")]
    ConstraintDimensions,

    #[display("Bound dimensions do not match the number of inequality rows")]
    BoundDimensions,

    #[display("Hessian is not symmetric")]
    NotSymmetric,

    #[display("A lower bound exceeds its upper bound")]
    BoundsCrossed,
}

/// A convex quadratic program:
///
/// ```text
/// min  1/2 x^T H x + g^T x
/// s.t. A x = b
///      l <= C x <= u
/// ```
///
/// `H` must be symmetric positive semidefinite. Rows of `C` with `l == u`
/// behave as additional equalities (they stay pinned in the active set).
#[allow(non_snake_case)]
pub struct QuadraticProgram {
    /// Hessian of the objective (dense, symmetric).
    H: Mat<E>,
    /// Linear objective coefficients.
    g: Col<E>,
    /// Equality constraint matrix.
    A: Mat<E>,
    /// Right-hand side of the equality constraints.
    b: Col<E>,
    /// Inequality constraint matrix.
    C: Mat<E>,
    /// Lower bounds on `C x`.
    l: Col<E>,
    /// Upper bounds on `C x`.
    u: Col<E>,
}

#[allow(non_snake_case)]
impl QuadraticProgram {
    /// Creates a new quadratic program, validating all dimension and bound
    /// contracts up front.
    pub fn new(
        H: Mat<E>,
        g: Col<E>,
        A: Mat<E>,
        b: Col<E>,
        C: Mat<E>,
        l: Col<E>,
        u: Col<E>,
    ) -> Result<Self, ModelError> {
        let n = g.nrows();
        if H.nrows() != n || H.ncols() != n {
            return Err(ModelError::ObjectiveDimensions);
        }
        if A.ncols() != n || A.nrows() != b.nrows() {
            return Err(ModelError::ConstraintDimensions);
        }
        if C.ncols() != n {
            return Err(ModelError::ConstraintDimensions);
        }
        if l.nrows() != C.nrows() || u.nrows() != C.nrows() {
            return Err(ModelError::BoundDimensions);
        }
        if (&H - H.transpose()).norm_max() > 10. * E::EPSILON * (1. + H.norm_max()) {
            return Err(ModelError::NotSymmetric);
        }
        for i in 0..l.nrows() {
            if l[i] > u[i] {
                return Err(ModelError::BoundsCrossed);
            }
        }

        Ok(Self { H, g, A, b, C, l, u })
    }

    /// Returns the number of variables.
    pub fn get_dim(&self) -> usize {
        self.g.nrows()
    }

    /// Returns the number of equality constraints (rows of `A`).
    pub fn get_n_eq(&self) -> usize {
        self.b.nrows()
    }

    /// Returns the number of inequality constraints (rows of `C`).
    pub fn get_n_in(&self) -> usize {
        self.u.nrows()
    }

    /// Returns `(dim, n_eq, n_in)`.
    pub fn get_dims(&self) -> (usize, usize, usize) {
        (self.get_dim(), self.get_n_eq(), self.get_n_in())
    }

    pub fn get_hessian(&self) -> &Mat<E> {
        &self.H
    }

    pub fn get_linear_objective(&self) -> &Col<E> {
        &self.g
    }

    pub fn get_eq_matrix(&self) -> &Mat<E> {
        &self.A
    }

    pub fn get_eq_rhs(&self) -> &Col<E> {
        &self.b
    }

    pub fn get_in_matrix(&self) -> &Mat<E> {
        &self.C
    }

    pub fn get_lower_bounds(&self) -> &Col<E> {
        &self.l
    }

    pub fn get_upper_bounds(&self) -> &Col<E> {
        &self.u
    }

    pub fn solver_builder<'a>(&'a self) -> QpSolverBuilder<'a> {
        QpSolverBuilder::new().with_qp(self)
    }
}

/// Builder for the proximal augmented-Lagrangian solver.
pub struct QpSolverBuilder<'a> {
    qp: Option<&'a QuadraticProgram>,
    settings: Settings,
}

impl<'a> QpSolverBuilder<'a> {
    pub fn new() -> Self {
        Self {
            qp: None,
            settings: Settings::default(),
        }
    }

    pub fn with_qp(mut self, qp: &'a QuadraticProgram) -> Self {
        self.qp = Some(qp);
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Result<ProxQp<'a>, Problem> {
        let qp = self
            .qp
            .ok_or_else(|| "Quadratic program must be provided".gloss())?;
        Ok(ProxQp::new(qp, self.settings))
    }
}

impl<'a> Default for QpSolverBuilder<'a> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(n: usize) -> Mat<E> {
        Mat::from_fn(n, n, |i, j| if i == j { 1.0 } else { 0.0 })
    }

    #[test]
    fn dimension_contracts_are_enforced() {
        let qp = QuadraticProgram::new(
            identity(2),
            Col::zeros(3),
            Mat::zeros(0, 2),
            Col::zeros(0),
            Mat::zeros(0, 2),
            Col::zeros(0),
            Col::zeros(0),
        );
        assert!(matches!(qp, Err(ModelError::ObjectiveDimensions)));
    }

    #[test]
    fn crossed_bounds_are_rejected() {
        let qp = QuadraticProgram::new(
            identity(1),
            Col::zeros(1),
            Mat::zeros(0, 1),
            Col::zeros(0),
            identity(1),
            Col::from_fn(1, |_| 1.0),
            Col::from_fn(1, |_| -1.0),
        );
        assert!(matches!(qp, Err(ModelError::BoundsCrossed)));
    }

    #[test]
    fn asymmetric_hessian_is_rejected() {
        let mut h = identity(2);
        h[(0, 1)] = 0.5;
        let qp = QuadraticProgram::new(
            h,
            Col::zeros(2),
            Mat::zeros(0, 2),
            Col::zeros(0),
            Mat::zeros(0, 2),
            Col::zeros(0),
            Col::zeros(0),
        );
        assert!(matches!(qp, Err(ModelError::NotSymmetric)));
    }
}
