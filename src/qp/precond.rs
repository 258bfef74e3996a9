//! Problem scaling.
//!
//! The solver works on a scaled copy of the problem data; the
//! [`Preconditioner`] trait is the seam between the solver and the scaling
//! strategy. [`RuizEquilibration`] is the default: iterated infinity-norm
//! equilibration of the stacked `[H; A; C]` matrix together with a scalar
//! cost normalization.

use faer::{Col, Mat};

use crate::E;

/// Diagonal scaling applied to the problem data, with paired scale/unscale
/// operations for every variable and residual family.
///
/// Paired application is idempotent: `unscale(scale(v)) == v`.
pub trait Preconditioner {
    /// Scales the problem copies in place and records the scaling.
    #[allow(non_snake_case, clippy::too_many_arguments)]
    fn scale_qp_in_place(
        &mut self,
        H: &mut Mat<E>,
        g: &mut Col<E>,
        A: &mut Mat<E>,
        b: &mut Col<E>,
        C: &mut Mat<E>,
        l: &mut Col<E>,
        u: &mut Col<E>,
    );

    fn scale_primal_in_place(&self, x: &mut Col<E>);
    fn unscale_primal_in_place(&self, x: &mut Col<E>);
    fn scale_dual_eq_in_place(&self, y: &mut Col<E>);
    fn unscale_dual_eq_in_place(&self, y: &mut Col<E>);
    fn scale_dual_in_in_place(&self, z: &mut Col<E>);
    fn unscale_dual_in_in_place(&self, z: &mut Col<E>);

    fn unscale_primal_residual_eq_in_place(&self, r: &mut Col<E>);
    fn unscale_primal_residual_in_in_place(&self, r: &mut Col<E>);
    fn unscale_dual_residual_in_place(&self, r: &mut Col<E>);
}

/// Ruiz equilibration.
///
/// `delta` stacks the primal scaling (first `dim` entries), the equality-row
/// scaling and the inequality-row scaling; `c` is the cost scalar.
pub struct RuizEquilibration {
    delta: Col<E>,
    c: E,
    dim: usize,
    n_eq: usize,
    max_iter: usize,
    epsilon: E,
}

impl RuizEquilibration {
    pub fn new(dim: usize, n_eq: usize, n_in: usize) -> Self {
        Self {
            delta: Col::ones(dim + n_eq + n_in),
            c: 1.,
            dim,
            n_eq,
            max_iter: 10,
            epsilon: 1e-3,
        }
    }

    fn col_infty_norm(mat: &Mat<E>, j: usize) -> E {
        let mut norm = 0.;
        for i in 0..mat.nrows() {
            norm = mat[(i, j)].abs().max(norm);
        }
        norm
    }

    fn row_infty_norm(mat: &Mat<E>, i: usize) -> E {
        let mut norm = 0.;
        for j in 0..mat.ncols() {
            norm = mat[(i, j)].abs().max(norm);
        }
        norm
    }

    fn safe_inv_sqrt(aux: E) -> E {
        if aux == 0. { 1. } else { 1. / aux.sqrt() }
    }
}

impl Preconditioner for RuizEquilibration {
    #[allow(non_snake_case)]
    fn scale_qp_in_place(
        &mut self,
        H: &mut Mat<E>,
        g: &mut Col<E>,
        A: &mut Mat<E>,
        b: &mut Col<E>,
        C: &mut Mat<E>,
        l: &mut Col<E>,
        u: &mut Col<E>,
    ) {
        let (n, n_eq, n_in) = (self.dim, self.n_eq, self.delta.nrows() - self.dim - self.n_eq);
        let mut delta_iter = Col::<E>::ones(n + n_eq + n_in);

        for _ in 0..self.max_iter {
            for j in 0..n {
                let aux = Self::col_infty_norm(H, j)
                    .max(Self::col_infty_norm(A, j))
                    .max(Self::col_infty_norm(C, j));
                delta_iter[j] = Self::safe_inv_sqrt(aux);
            }
            for i in 0..n_eq {
                delta_iter[n + i] = Self::safe_inv_sqrt(Self::row_infty_norm(A, i));
            }
            for i in 0..n_in {
                delta_iter[n + n_eq + i] = Self::safe_inv_sqrt(Self::row_infty_norm(C, i));
            }

            for j in 0..n {
                for i in 0..n {
                    H[(i, j)] *= delta_iter[i] * delta_iter[j];
                }
                g[j] *= delta_iter[j];
            }
            for i in 0..n_eq {
                for j in 0..n {
                    A[(i, j)] *= delta_iter[n + i] * delta_iter[j];
                }
                b[i] *= delta_iter[n + i];
            }
            for i in 0..n_in {
                for j in 0..n {
                    C[(i, j)] *= delta_iter[n + n_eq + i] * delta_iter[j];
                }
                l[i] *= delta_iter[n + n_eq + i];
                u[i] *= delta_iter[n + n_eq + i];
            }

            let mut drift = 0.;
            for k in 0..n + n_eq + n_in {
                self.delta[k] *= delta_iter[k];
                drift = (1. - delta_iter[k]).abs().max(drift);
            }
            if drift <= self.epsilon {
                break;
            }
        }

        // Cost normalization.
        let mut mean_col_norm = 0.;
        for j in 0..n {
            mean_col_norm += Self::col_infty_norm(H, j);
        }
        if n > 0 {
            mean_col_norm /= n as E;
        }
        let aux = mean_col_norm.max(g.norm_max());
        let gamma = if aux == 0. { 1. } else { 1. / aux };
        for j in 0..n {
            for i in 0..n {
                H[(i, j)] *= gamma;
            }
            g[j] *= gamma;
        }
        self.c = gamma;
    }

    fn scale_primal_in_place(&self, x: &mut Col<E>) {
        for j in 0..self.dim {
            x[j] /= self.delta[j];
        }
    }

    fn unscale_primal_in_place(&self, x: &mut Col<E>) {
        for j in 0..self.dim {
            x[j] *= self.delta[j];
        }
    }

    fn scale_dual_eq_in_place(&self, y: &mut Col<E>) {
        for i in 0..self.n_eq {
            y[i] *= self.c / self.delta[self.dim + i];
        }
    }

    fn unscale_dual_eq_in_place(&self, y: &mut Col<E>) {
        for i in 0..self.n_eq {
            y[i] *= self.delta[self.dim + i] / self.c;
        }
    }

    fn scale_dual_in_in_place(&self, z: &mut Col<E>) {
        for i in 0..z.nrows() {
            z[i] *= self.c / self.delta[self.dim + self.n_eq + i];
        }
    }

    fn unscale_dual_in_in_place(&self, z: &mut Col<E>) {
        for i in 0..z.nrows() {
            z[i] *= self.delta[self.dim + self.n_eq + i] / self.c;
        }
    }

    fn unscale_primal_residual_eq_in_place(&self, r: &mut Col<E>) {
        for i in 0..self.n_eq {
            r[i] /= self.delta[self.dim + i];
        }
    }

    fn unscale_primal_residual_in_in_place(&self, r: &mut Col<E>) {
        for i in 0..r.nrows() {
            r[i] /= self.delta[self.dim + self.n_eq + i];
        }
    }

    fn unscale_dual_residual_in_place(&self, r: &mut Col<E>) {
        for j in 0..self.dim {
            r[j] /= self.delta[j] * self.c;
        }
    }
}

/// No-op scaling, useful to isolate the solver in tests.
pub struct IdentityPrecond;

impl Preconditioner for IdentityPrecond {
    #[allow(non_snake_case)]
    fn scale_qp_in_place(
        &mut self,
        _H: &mut Mat<E>,
        _g: &mut Col<E>,
        _A: &mut Mat<E>,
        _b: &mut Col<E>,
        _C: &mut Mat<E>,
        _l: &mut Col<E>,
        _u: &mut Col<E>,
    ) {
    }

    fn scale_primal_in_place(&self, _x: &mut Col<E>) {}
    fn unscale_primal_in_place(&self, _x: &mut Col<E>) {}
    fn scale_dual_eq_in_place(&self, _y: &mut Col<E>) {}
    fn unscale_dual_eq_in_place(&self, _y: &mut Col<E>) {}
    fn scale_dual_in_in_place(&self, _z: &mut Col<E>) {}
    fn unscale_dual_in_in_place(&self, _z: &mut Col<E>) {}
    fn unscale_primal_residual_eq_in_place(&self, _r: &mut Col<E>) {}
    fn unscale_primal_residual_in_in_place(&self, _r: &mut Col<E>) {}
    fn unscale_dual_residual_in_place(&self, _r: &mut Col<E>) {}
}
