//! Solver configuration.
//!
//! All knobs live in a single [`Settings`] struct with documented defaults;
//! construct one with [`Settings::default`] and override fields as needed.

use serde::{Deserialize, Serialize};

use crate::{E, I};

/// Controls whether and how `(x, y, z)` are reset at the start of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InitialGuess {
    /// Keep the caller-provided iterate untouched.
    NoInitialGuess,
    /// Initialize `x` from the unconstrained minimizer of the regularized
    /// objective, `(H + ρI) x = −g`.
    Unconstrained,
    /// Initialize `(x, y)` from the equality-constrained KKT system and set
    /// `z = 0`.
    #[default]
    EqualityConstrained,
    /// Reuse the iterate and penalties stored in the solver from the
    /// previous solve.
    WarmStartWithPreviousResult,
    /// Start from the caller-provided `(x, y, z)`.
    WarmStart,
    /// Zero the iterate and reset the penalties to their cold-reset values.
    ColdStart,
}

/// Solver options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Exponent of the BCL tolerance schedule used when the penalty is
    /// tightened without accepting the multipliers.
    pub alpha_bcl: E,
    /// Exponent of the BCL tolerance schedule used when the multipliers are
    /// accepted.
    pub beta_bcl: E,

    /// Upper bound on the equality penalty parameter `μ_eq`.
    pub mu_max_eq: E,
    /// Upper bound on the inequality penalty parameter `μ_in`.
    pub mu_max_in: E,
    /// Multiplicative factor applied to `μ_eq`/`μ_in` when the outer loop
    /// tightens the penalties.
    pub mu_update_factor: E,
    /// Equality penalty restored by a cold start.
    pub cold_reset_mu_eq: E,
    /// Inequality penalty restored by a cold start.
    pub cold_reset_mu_in: E,

    /// Proximal weight `ρ` used after a numeric failure forces a full
    /// refactorization.
    pub refactor_rho_threshold: E,
    /// Dual residual above which a penalty change triggers a full
    /// refactorization instead of an incremental diagonal update.
    pub refactor_dual_feasibility_threshold: E,

    /// Maximum number of outer iterations.
    pub max_iter: I,
    /// Maximum number of inner (Newton) iterations per outer iteration.
    pub max_iter_in: I,

    /// Absolute accuracy on the primal and dual residuals.
    pub eps_abs: E,
    /// Relative accuracy on the primal and dual residuals.
    pub eps_rel: E,
    /// Tolerance of the primal infeasibility certificate.
    pub eps_primal_inf: E,
    /// Tolerance of the dual infeasibility certificate.
    pub eps_dual_inf: E,

    /// Maximum number of iterative refinement passes per Newton solve.
    pub nb_iterative_refinement: I,

    /// Breakpoints with `|α|` beyond this bound are discarded by the
    /// initial-guess line search.
    pub r_breakpoint: E,

    /// Iterate reset policy.
    pub initial_guess: InitialGuess,

    /// Print one row per outer iteration.
    pub verbose: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            alpha_bcl: 0.1,
            beta_bcl: 0.9,

            mu_max_eq: 1e9,
            mu_max_in: 1e8,
            mu_update_factor: 10.,
            cold_reset_mu_eq: 1e3,
            cold_reset_mu_in: 1e1,

            refactor_rho_threshold: 1e-3,
            refactor_dual_feasibility_threshold: 1e-2,

            max_iter: 10_000,
            max_iter_in: 1_500,

            eps_abs: 1e-9,
            eps_rel: 0.,
            eps_primal_inf: 1e-4,
            eps_dual_inf: 1e-4,

            nb_iterative_refinement: 10,

            r_breakpoint: 1e6,

            initial_guess: InitialGuess::default(),

            verbose: false,
        }
    }
}
