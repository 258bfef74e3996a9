//! # Proximal augmented-Lagrangian QP solver
//!
//! Solves convex quadratic programs
//!
//! ```text
//!   min  1/2 x^T H x + g^T x
//!   s.t. A x = b
//!        l <= C x <= u
//! ```
//!
//! with a BCL outer loop (multiplier acceptance and penalty tightening) and a
//! semismooth-Newton inner loop. The inner loop discovers the active set on
//! the fly; the KKT factorization is kept synchronized with active-set
//! changes through incremental LDLᵀ updates instead of refactoring.
//!
//! ## Acknowledgment
//!
//! The algorithm follows the proximal method of multipliers for QPs described
//! in:
//!
//! > A. Bambade, S. El-Kazdadi, A. Taylor and J. Carpentier, "PROX-QP: Yet
//! > another Quadratic Programming Solver for Robotics and beyond",
//! > *Robotics: Science and Systems*, 2022.
//!
//! This module is an independent implementation written from scratch in Rust;
//! the algorithmic ideas and mathematical formulations used here are not
//! subject to copyright.

pub mod bcl;
pub mod kkt;
pub mod line_search;

use faer::dyn_stack::{MemBuffer, StackReq};
use faer::{Col, Mat};
use problemo::Problem;

use crate::callback::{Callback, ConvergenceOutput};
use crate::linalg::ldlt::Ldlt;
use crate::linalg::vector_ops::{negative_part, positive_part};
use crate::qp::QuadraticProgram;
use crate::qp::precond::{Preconditioner, RuizEquilibration};
use crate::qp::prox::bcl::{BclOutcome, BclState};
use crate::settings::{InitialGuess, Settings};
use crate::{E, I, Solver, SolverHooks, Status};

/// Iteration accounting for one solve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Number of outer (BCL) iterations.
    pub n_ext: I,
    /// Total number of inner (Newton) iterations.
    pub n_tot: I,
    /// Number of penalty tightenings.
    pub n_mu_updates: I,
}

/// Solver output and internal scalar state.
///
/// Between solves `x`, `y`, `z` hold the unscaled iterate; penalties are
/// stored both directly and inverted since the KKT diagonal carries the
/// inverses.
pub struct Results {
    pub x: Col<E>,
    pub y: Col<E>,
    pub z: Col<E>,

    pub mu_eq: E,
    pub mu_eq_inv: E,
    pub mu_in: E,
    pub mu_in_inv: E,
    /// Proximal weight.
    pub rho: E,
    /// Weight of the dual terms in the primal-dual merit function; setting
    /// it to zero falls back to the primal augmented-Lagrangian line search.
    pub nu: E,

    /// Number of inequality rows currently pinned in the factorization.
    pub n_c: usize,

    /// Unscaled primal residual at the last outer iteration.
    pub primal_residual: E,
    /// Unscaled dual residual at the last outer iteration.
    pub dual_residual: E,

    pub status: Status,
    pub stats: Stats,
}

impl Results {
    pub(crate) fn new(n: usize, n_eq: usize, n_in: usize, settings: &Settings) -> Self {
        Self {
            x: Col::zeros(n),
            y: Col::zeros(n_eq),
            z: Col::zeros(n_in),
            mu_eq: settings.cold_reset_mu_eq,
            mu_eq_inv: 1. / settings.cold_reset_mu_eq,
            mu_in: settings.cold_reset_mu_in,
            mu_in_inv: 1. / settings.cold_reset_mu_in,
            rho: 1e-6,
            nu: 1.,
            n_c: 0,
            primal_residual: E::INFINITY,
            dual_residual: E::INFINITY,
            status: Status::InProgress,
            stats: Stats::default(),
        }
    }

    fn set_mu_eq(&mut self, mu_eq: E) {
        self.mu_eq = mu_eq;
        self.mu_eq_inv = 1. / mu_eq;
    }

    fn set_mu_in(&mut self, mu_in: E) {
        self.mu_in = mu_in;
        self.mu_in_inv = 1. / mu_in;
    }
}

/// Mutable scratch state, allocated once per solver and reused across solves.
pub(crate) struct Workspace {
    pub h_scaled: Mat<E>,
    pub g_scaled: Col<E>,
    pub a_scaled: Mat<E>,
    pub b_scaled: Col<E>,
    pub c_scaled: Mat<E>,
    pub l_scaled: Col<E>,
    pub u_scaled: Col<E>,

    /// Proximal center and outer multiplier targets (scaled).
    pub x_prev: Col<E>,
    pub y_prev: Col<E>,
    pub z_prev: Col<E>,

    /// `H x + g + ρ(x − x_prev) + Aᵀ y + Cᵀ z`.
    pub dual_residual_scaled: Col<E>,
    /// `Cᵀ z`, kept alongside the dual residual for the line search.
    pub ctz: Col<E>,
    /// `A x − b`.
    pub primal_residual_eq_scaled: Col<E>,
    /// `C x − u + z_prev μ_in⁻¹`.
    pub primal_residual_in_scaled_up: Col<E>,
    /// `C x − l + z_prev μ_in⁻¹`.
    pub primal_residual_in_scaled_low: Col<E>,

    pub hdx: Col<E>,
    pub adx: Col<E>,
    pub cdx: Col<E>,
    /// Newton step `[Δx; Δy; Δz]` in original index order.
    pub dw_aug: Col<E>,
    pub rhs: Col<E>,

    pub active_inequalities: Vec<bool>,
    pub active_set_up: Vec<bool>,
    pub active_set_low: Vec<bool>,
    /// `current_bijection_map[i] < n_c` iff row `i` is pinned in the
    /// factorization, at slot `current_bijection_map[i]`.
    pub current_bijection_map: Vec<usize>,
    pub new_bijection_map: Vec<usize>,

    /// Sorted line-search breakpoints.
    pub alphas: Vec<E>,

    /// Dense staging area for full refactorizations.
    pub kkt_scratch: Mat<E>,
    pub ldl: Ldlt<E>,
    pub ldl_stack: MemBuffer,
}

impl Workspace {
    fn new<P: Preconditioner>(qp: &QuadraticProgram, precond: &mut P) -> Self {
        let (n, n_eq, n_in) = qp.get_dims();
        let n_tot = n + n_eq + n_in;

        let mut h_scaled = qp.get_hessian().clone();
        let mut g_scaled = qp.get_linear_objective().clone();
        let mut a_scaled = qp.get_eq_matrix().clone();
        let mut b_scaled = qp.get_eq_rhs().clone();
        let mut c_scaled = qp.get_in_matrix().clone();
        let mut l_scaled = qp.get_lower_bounds().clone();
        let mut u_scaled = qp.get_upper_bounds().clone();
        precond.scale_qp_in_place(
            &mut h_scaled,
            &mut g_scaled,
            &mut a_scaled,
            &mut b_scaled,
            &mut c_scaled,
            &mut l_scaled,
            &mut u_scaled,
        );

        let r = n_in.max(1);
        let ldl_stack = MemBuffer::new(StackReq::any_of(&[
            Ldlt::<E>::solve_in_place_scratch(n_tot),
            Ldlt::<E>::rank_r_update_scratch(n_tot, r),
            Ldlt::<E>::insert_block_at_scratch(n_tot, r),
            Ldlt::<E>::delete_at_scratch(n_tot),
            Ldlt::<E>::diagonal_update_scratch(n_tot, n_tot),
        ]));

        Self {
            h_scaled,
            g_scaled,
            a_scaled,
            b_scaled,
            c_scaled,
            l_scaled,
            u_scaled,

            x_prev: Col::zeros(n),
            y_prev: Col::zeros(n_eq),
            z_prev: Col::zeros(n_in),

            dual_residual_scaled: Col::zeros(n),
            ctz: Col::zeros(n),
            primal_residual_eq_scaled: Col::zeros(n_eq),
            primal_residual_in_scaled_up: Col::zeros(n_in),
            primal_residual_in_scaled_low: Col::zeros(n_in),

            hdx: Col::zeros(n),
            adx: Col::zeros(n_eq),
            cdx: Col::zeros(n_in),
            dw_aug: Col::zeros(n_tot),
            rhs: Col::zeros(n_tot),

            active_inequalities: vec![false; n_in],
            active_set_up: vec![false; n_in],
            active_set_low: vec![false; n_in],
            current_bijection_map: (0..n_in).collect(),
            new_bijection_map: (0..n_in).collect(),

            alphas: Vec::new(),

            kkt_scratch: Mat::zeros(n_tot, n_tot),
            ldl: Ldlt::new(),
            ldl_stack,
        }
    }

    pub(crate) fn dims(&self) -> (usize, usize, usize) {
        (
            self.g_scaled.nrows(),
            self.b_scaled.nrows(),
            self.u_scaled.nrows(),
        )
    }
}

/// Proximal augmented-Lagrangian solver for a [`QuadraticProgram`].
pub struct ProxQp<'a, P: Preconditioner = RuizEquilibration> {
    qp: &'a QuadraticProgram,
    pub settings: Settings,
    pub results: Results,
    work: Workspace,
    precond: P,
    bcl: BclState,
    /// Penalties scheduled by the last BCL tightening, applied at the start
    /// of the next inner loop.
    pending_mu: Option<(E, E)>,
    refactor_attempted: bool,
}

impl<'a> ProxQp<'a, RuizEquilibration> {
    pub fn new(qp: &'a QuadraticProgram, settings: Settings) -> Self {
        let (n, n_eq, n_in) = qp.get_dims();
        Self::with_preconditioner(qp, settings, RuizEquilibration::new(n, n_eq, n_in))
    }
}

impl<'a, P: Preconditioner> ProxQp<'a, P> {
    pub fn with_preconditioner(qp: &'a QuadraticProgram, settings: Settings, mut precond: P) -> Self {
        let (n, n_eq, n_in) = qp.get_dims();
        let work = Workspace::new(qp, &mut precond);
        let results = Results::new(n, n_eq, n_in, &settings);
        let bcl = BclState::new(&settings, results.mu_in_inv);
        Self {
            qp,
            settings,
            results,
            work,
            precond,
            bcl,
            pending_mu: None,
            refactor_attempted: false,
        }
    }

    /// Seeds the next solve with an unscaled iterate; effective with the
    /// warm-start initial-guess modes.
    pub fn warm_start(&mut self, x: Col<E>, y: Col<E>, z: Col<E>) {
        self.results.x = x;
        self.results.y = y;
        self.results.z = z;
    }

    /// Applies the initial-guess policy and builds the first factorization.
    fn setup(&mut self) -> Result<(), Status> {
        let (n, n_eq, n_in) = self.work.dims();
        let results = &mut self.results;
        let work = &mut self.work;

        results.stats = Stats::default();
        results.status = Status::InProgress;
        results.n_c = 0;
        self.refactor_attempted = false;
        self.pending_mu = None;

        match self.settings.initial_guess {
            InitialGuess::NoInitialGuess
            | InitialGuess::WarmStart
            | InitialGuess::WarmStartWithPreviousResult => {
                self.precond.scale_primal_in_place(&mut results.x);
                self.precond.scale_dual_eq_in_place(&mut results.y);
                self.precond.scale_dual_in_in_place(&mut results.z);
            }
            InitialGuess::ColdStart => {
                results.x = Col::zeros(n);
                results.y = Col::zeros(n_eq);
                results.z = Col::zeros(n_in);
                results.set_mu_eq(self.settings.cold_reset_mu_eq);
                results.set_mu_in(self.settings.cold_reset_mu_in);
            }
            InitialGuess::Unconstrained | InitialGuess::EqualityConstrained => {
                results.x = Col::zeros(n);
                results.y = Col::zeros(n_eq);
                results.z = Col::zeros(n_in);
            }
        }
        self.bcl = BclState::new(&self.settings, results.mu_in_inv);

        // Rows warm-started with a nonzero multiplier start in the active set.
        for i in 0..n_in {
            work.active_inequalities[i] = results.z[i] != 0.;
        }

        if kkt::setup_factorization(work, results).is_err() {
            results.rho = results.rho.max(self.settings.refactor_rho_threshold);
            kkt::setup_factorization(work, results).map_err(|_| Status::NumericFailure)?;
        }

        match self.settings.initial_guess {
            InitialGuess::Unconstrained => {
                let mut reg = work.h_scaled.clone();
                for j in 0..n {
                    reg[(j, j)] += results.rho;
                }
                let mut ldl = Ldlt::new();
                ldl.factorize(reg.as_ref())
                    .map_err(|_| Status::NumericFailure)?;
                let mut rhs = -1. * &work.g_scaled;
                ldl.solve_in_place(&mut rhs, faer::dyn_stack::MemStack::new(&mut work.ldl_stack));
                results.x = rhs;
            }
            InitialGuess::EqualityConstrained => {
                let mut rhs = Col::zeros(n + n_eq);
                for j in 0..n {
                    rhs[j] = -work.g_scaled[j];
                }
                for i in 0..n_eq {
                    rhs[n + i] = work.b_scaled[i];
                }
                work.ldl
                    .solve_in_place(&mut rhs, faer::dyn_stack::MemStack::new(&mut work.ldl_stack));
                for j in 0..n {
                    results.x[j] = rhs[j];
                }
                for i in 0..n_eq {
                    results.y[i] = rhs[n + i];
                }
            }
            _ => {}
        }

        work.x_prev.copy_from(&results.x);
        work.y_prev.copy_from(&results.y);
        work.z_prev.copy_from(&results.z);
        Ok(())
    }

    /// Recomputes the scaled residuals, the shifted inequality residuals and
    /// the candidate active set at the current iterate.
    fn refresh_residuals(&mut self) {
        let work = &mut self.work;
        let results = &self.results;
        let (_, _, n_in) = work.dims();

        work.ctz = work.c_scaled.transpose() * &results.z;
        work.dual_residual_scaled = &work.h_scaled * &results.x
            + &work.g_scaled
            + results.rho * (&results.x - &work.x_prev)
            + work.a_scaled.transpose() * &results.y
            + &work.ctz;
        work.primal_residual_eq_scaled = &work.a_scaled * &results.x - &work.b_scaled;

        let cx = &work.c_scaled * &results.x;
        work.primal_residual_in_scaled_up =
            &cx - &work.u_scaled + results.mu_in_inv * &work.z_prev;
        work.primal_residual_in_scaled_low =
            &cx - &work.l_scaled + results.mu_in_inv * &work.z_prev;

        for i in 0..n_in {
            work.active_set_up[i] = work.primal_residual_in_scaled_up[i] >= 0.;
            work.active_set_low[i] = work.primal_residual_in_scaled_low[i] <= 0.;
            work.active_inequalities[i] = work.active_set_up[i] || work.active_set_low[i];
        }
    }

    /// Infinity norm of the semismooth KKT residual of the inner subproblem.
    fn inner_residual_norm(&self) -> E {
        let work = &self.work;
        let results = &self.results;
        let (_, _, n_in) = work.dims();

        let mut err = work.dual_residual_scaled.norm_max();
        for i in 0..work.b_scaled.nrows() {
            let r = work.primal_residual_eq_scaled[i]
                - (results.y[i] - work.y_prev[i]) * results.mu_eq_inv;
            err = r.abs().max(err);
        }
        for i in 0..n_in {
            if work.active_inequalities[i] {
                let base = if work.active_set_up[i] {
                    work.primal_residual_in_scaled_up[i]
                } else {
                    work.primal_residual_in_scaled_low[i]
                };
                err = (base - results.z[i] * results.mu_in_inv).abs().max(err);
            } else {
                err = results.z[i].abs().max(err);
            }
        }
        err
    }

    /// Unscaled primal/dual residuals of the original problem, stored in the
    /// results.
    fn compute_global_residuals(&mut self) {
        let work = &self.work;
        let results = &mut self.results;

        let mut r_eq = &work.a_scaled * &results.x - &work.b_scaled;
        self.precond.unscale_primal_residual_eq_in_place(&mut r_eq);

        let cx = &work.c_scaled * &results.x;
        let mut up = &cx - &work.u_scaled;
        let mut low = &cx - &work.l_scaled;
        self.precond.unscale_primal_residual_in_in_place(&mut up);
        self.precond.unscale_primal_residual_in_in_place(&mut low);

        results.primal_residual = r_eq
            .norm_max()
            .max(positive_part(up.as_ref()).norm_max())
            .max(negative_part(low.as_ref()).norm_max());

        let mut r_dual = &work.h_scaled * &results.x
            + &work.g_scaled
            + work.a_scaled.transpose() * &results.y
            + work.c_scaled.transpose() * &results.z;
        self.precond.unscale_dual_residual_in_place(&mut r_dual);
        results.dual_residual = r_dual.norm_max();
    }

    /// Relative-accuracy scaling factors for the termination test, computed
    /// on the unscaled data.
    fn residual_rhs_norms(&self) -> (E, E) {
        if self.settings.eps_rel == 0. {
            return (0., 0.);
        }
        let mut x = self.results.x.clone();
        let mut y = self.results.y.clone();
        let mut z = self.results.z.clone();
        self.precond.unscale_primal_in_place(&mut x);
        self.precond.unscale_dual_eq_in_place(&mut y);
        self.precond.unscale_dual_in_in_place(&mut z);

        let primal = (self.qp.get_eq_matrix() * &x)
            .norm_max()
            .max(self.qp.get_eq_rhs().norm_max())
            .max((self.qp.get_in_matrix() * &x).norm_max())
            .max(self.qp.get_upper_bounds().norm_max())
            .max(self.qp.get_lower_bounds().norm_max());
        let dual = (self.qp.get_hessian() * &x)
            .norm_max()
            .max(self.qp.get_linear_objective().norm_max())
            .max((self.qp.get_eq_matrix().transpose() * &y).norm_max())
            .max((self.qp.get_in_matrix().transpose() * &z).norm_max());
        (primal, dual)
    }

    /// Checks the unbounded-ray infeasibility certificates on the current
    /// Newton direction.
    fn infeasibility_certificate(&self) -> Option<Status> {
        let work = &self.work;
        let settings = &self.settings;
        let (n, n_eq, n_in) = work.dims();

        let dx = work.dw_aug.subrows(0, n);
        let dy = work.dw_aug.subrows(n, n_eq);
        let dz = work.dw_aug.subrows(n + n_eq, n_in);

        let dual_ray_norm = dy.norm_max().max(dz.norm_max());
        if dual_ray_norm > 0. {
            let at_dy = work.a_scaled.transpose() * dy + work.c_scaled.transpose() * dz;
            let mut support = work.b_scaled.transpose() * dy;
            let mut ray_ok = true;
            for i in 0..n_in {
                if dz[i] > 0. {
                    if work.u_scaled[i].is_finite() {
                        support += work.u_scaled[i] * dz[i];
                    } else {
                        ray_ok = false;
                    }
                } else if dz[i] < 0. {
                    if work.l_scaled[i].is_finite() {
                        support += work.l_scaled[i] * dz[i];
                    } else {
                        ray_ok = false;
                    }
                }
            }
            if ray_ok
                && at_dy.norm_max() <= settings.eps_primal_inf * dual_ray_norm
                && support <= -settings.eps_primal_inf * dual_ray_norm
            {
                return Some(Status::PrimalInfeasible);
            }
        }

        let primal_ray_norm = dx.norm_max();
        if primal_ray_norm > 0. {
            let hdx_norm = (&work.h_scaled * dx).norm_max();
            let gdx = work.g_scaled.transpose() * dx;
            let adx_norm = (&work.a_scaled * dx).norm_max();
            let cdx = &work.c_scaled * dx;
            let mut in_ray_ok = true;
            for i in 0..n_in {
                if work.u_scaled[i].is_finite()
                    && cdx[i] > settings.eps_dual_inf * primal_ray_norm
                {
                    in_ray_ok = false;
                }
                if work.l_scaled[i].is_finite()
                    && cdx[i] < -settings.eps_dual_inf * primal_ray_norm
                {
                    in_ray_ok = false;
                }
            }
            if hdx_norm <= settings.eps_dual_inf * primal_ray_norm
                && adx_norm <= settings.eps_dual_inf * primal_ray_norm
                && in_ray_ok
                && gdx <= -settings.eps_dual_inf * primal_ray_norm
            {
                return Some(Status::DualInfeasible);
            }
        }
        None
    }

    /// Applies the Newton step with the given step length and projects the
    /// inequality multipliers onto their active-set signs.
    fn take_step(&mut self, alpha: E) {
        let (n, n_eq, n_in) = self.work.dims();
        let work = &mut self.work;
        let results = &mut self.results;

        for j in 0..n {
            results.x[j] += alpha * work.dw_aug[j];
        }
        for i in 0..n_eq {
            results.y[i] += alpha * work.dw_aug[n + i];
        }
        for i in 0..n_in {
            let z_new = results.z[i] + alpha * work.dw_aug[n + n_eq + i];
            results.z[i] = match (work.active_set_up[i], work.active_set_low[i]) {
                (true, true) => z_new,
                (true, false) => z_new.max(0.),
                (false, true) => z_new.min(0.),
                (false, false) => 0.,
            };
        }
    }

    /// One inner (semismooth-Newton) loop at fixed outer targets.
    ///
    /// Returns a terminal status when a certificate or a numeric failure is
    /// found.
    fn inner_loop(&mut self) -> Option<Status> {
        let first_ls_is_initial_guess =
            self.settings.initial_guess == InitialGuess::NoInitialGuess;

        if let Some((mu_eq, mu_in)) = self.pending_mu.take() {
            let refactor =
                self.results.dual_residual > self.settings.refactor_dual_feasibility_threshold;
            if refactor {
                self.results.set_mu_eq(mu_eq);
                self.results.set_mu_in(mu_in);
                if kkt::setup_factorization(&mut self.work, &mut self.results).is_err() {
                    return Some(Status::NumericFailure);
                }
            } else if kkt::mu_update(&mut self.work, &mut self.results, mu_eq, mu_in).is_err() {
                return self.recover(Status::NumericFailure);
            }
        }

        let mut eta = 0.;
        for it in 0..self.settings.max_iter_in {
            self.refresh_residuals();
            let err = self.inner_residual_norm();
            if it == 0 {
                // Ask for one order of magnitude of subproblem progress, but
                // never beyond the BCL schedule or the absolute target.
                eta = self.settings.eps_abs.max(self.bcl.eta_in.min(0.1 * err));
            }
            if err <= eta {
                break;
            }

            let step = kkt::active_set_change(&mut self.work, &mut self.results).and_then(|_| {
                kkt::solve_newton_step(&mut self.work, &mut self.results, &self.settings)
            });
            if step.is_err() {
                match self.recover(Status::NumericFailure) {
                    None => {
                        self.refresh_residuals();
                        if kkt::solve_newton_step(&mut self.work, &mut self.results, &self.settings)
                            .is_err()
                        {
                            return Some(Status::NumericFailure);
                        }
                    }
                    some => return some,
                }
            }

            if let Some(status) = self.infeasibility_certificate() {
                return Some(status);
            }

            let alpha = if it == 0 && first_ls_is_initial_guess {
                line_search::initial_guess_ls(&mut self.work, &self.results, &self.settings)
            } else if self.results.nu == 0. {
                line_search::correction_guess_ls(&mut self.work, &self.results)
            } else {
                line_search::primal_dual_ls(&mut self.work, &self.results)
            };

            self.take_step(alpha);
            self.results.stats.n_tot += 1;

            let step_norm = alpha * self.work.dw_aug.norm_max();
            if step_norm <= 1e-14 * (1. + self.results.x.norm_max()) {
                break;
            }
        }
        None
    }

    /// One-shot recovery from a factorization failure: bump the proximal
    /// weight and refactorize from scratch.
    fn recover(&mut self, fail: Status) -> Option<Status> {
        if self.refactor_attempted {
            return Some(fail);
        }
        self.refactor_attempted = true;
        self.results.rho = self.results.rho.max(self.settings.refactor_rho_threshold);
        match kkt::setup_factorization(&mut self.work, &mut self.results) {
            Ok(()) => None,
            Err(_) => Some(fail),
        }
    }

    fn finalize(&mut self, status: Status) -> Status {
        self.precond.unscale_primal_in_place(&mut self.results.x);
        self.precond.unscale_dual_eq_in_place(&mut self.results.y);
        self.precond.unscale_dual_in_in_place(&mut self.results.z);
        self.results.status = status;
        status
    }
}

impl<'a, P: Preconditioner> Solver for ProxQp<'a, P> {
    fn solve(&mut self, hooks: &mut SolverHooks) -> Result<Status, Problem> {
        let mut verbose_output = if self.settings.verbose {
            Some(ConvergenceOutput::new(&self.settings))
        } else {
            None
        };

        hooks.terminator.initialize();
        if let Err(status) = self.setup() {
            return Ok(self.finalize(status));
        }

        let mut status = Status::MaxIterReached;
        for iter in 0..self.settings.max_iter {
            self.results.stats.n_ext = iter + 1;

            self.compute_global_residuals();
            if let Some(output) = verbose_output.as_mut() {
                output.call(&self.results);
            }
            hooks.callback.call(&self.results);

            let (primal_rhs, dual_rhs) = self.residual_rhs_norms();
            let eps_primal = self.settings.eps_abs + self.settings.eps_rel * primal_rhs;
            let eps_dual = self.settings.eps_abs + self.settings.eps_rel * dual_rhs;
            if self.results.primal_residual <= eps_primal
                && self.results.dual_residual <= eps_dual
            {
                status = Status::Solved;
                break;
            }

            if let Some(hook_status) = hooks.terminator.terminate(&self.results) {
                status = hook_status;
                break;
            }

            if iter > 0 {
                let outcome = self.bcl.update(
                    &self.settings,
                    self.results.primal_residual,
                    self.results.mu_eq,
                    self.results.mu_in,
                );
                match outcome {
                    BclOutcome::Accept => {
                        self.work.y_prev.copy_from(&self.results.y);
                        self.work.z_prev.copy_from(&self.results.z);
                    }
                    BclOutcome::Tighten { mu_eq, mu_in } => {
                        if mu_eq != self.results.mu_eq || mu_in != self.results.mu_in {
                            self.results.stats.n_mu_updates += 1;
                            self.pending_mu = Some((mu_eq, mu_in));
                        }
                    }
                }
            }
            self.work.x_prev.copy_from(&self.results.x);

            if let Some(terminal) = self.inner_loop() {
                status = terminal;
                break;
            }
        }

        Ok(self.finalize(status))
    }
}

/// Solves a QP in one call, seeding the iterate from `x`, `y`, `z` and
/// writing the solution back into them.
pub fn qp_solve(
    qp: &QuadraticProgram,
    settings: &Settings,
    x: &mut Col<E>,
    y: &mut Col<E>,
    z: &mut Col<E>,
) -> Result<(Status, Stats), Problem> {
    let mut solver = ProxQp::new(qp, settings.clone());
    solver.warm_start(x.clone(), y.clone(), z.clone());
    let status = solver.solve(&mut SolverHooks::default())?;
    x.copy_from(&solver.results.x);
    y.copy_from(&solver.results.y);
    z.copy_from(&solver.results.z);
    Ok((status, solver.results.stats))
}
