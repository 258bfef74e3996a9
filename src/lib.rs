use faer::traits::RealField;
use faer::traits::num_traits::Float;
use problemo::Problem;

/// Scalar types the dense kernels are instantiated for (IEEE-754 32-bit and
/// 64-bit floats).
pub trait Scalar: RealField + Float {}
impl<T> Scalar for T where T: RealField + Float {}

pub type E = f64;
pub type I = usize;

pub mod callback;
pub mod linalg;
pub mod qp;
pub mod settings;
pub mod terminators;

#[cfg(test)]
pub mod tests;

pub use qp::prox::{ProxQp, Results, Stats, qp_solve};
pub use settings::{InitialGuess, Settings};

/// Status codes for optimization solvers.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum Status {
    #[default]
    /// The solver is still running.
    InProgress,
    /// An optimal solution was found within the requested accuracy.
    Solved,
    /// A primal infeasibility certificate was found.
    PrimalInfeasible,
    /// A dual infeasibility certificate was found.
    DualInfeasible,
    /// A factorization pivot became non-finite or vanished.
    NumericFailure,
    /// The solver stopped after `max_iter` outer iterations.
    MaxIterReached,
    /// The solver stopped due to a time limit.
    TimeLimit,
    /// The solver was interrupted (e.g., by user or signal).
    Interrupted,
}

impl Status {
    /// Whether the solver should keep iterating.
    pub fn is_in_progress(&self) -> bool {
        *self == Status::InProgress
    }
}

/// Trait for iterative optimization solvers.
///
/// Provides a standard interface for algorithms that proceed by repeated
/// iteration; hooks are invoked between outer iterations.
pub trait Solver {
    /// Run the solver until convergence, an iteration cap, or a hook stop.
    fn solve(&mut self, hooks: &mut SolverHooks) -> Result<Status, Problem>;
}

/// Per-iteration callback and termination hooks passed to [`Solver::solve`].
pub struct SolverHooks {
    pub callback: Box<dyn crate::callback::Callback>,
    pub terminator: Box<dyn crate::terminators::Terminator>,
}

impl SolverHooks {
    pub fn new(
        callback: Box<dyn crate::callback::Callback>,
        terminator: Box<dyn crate::terminators::Terminator>,
    ) -> Self {
        Self {
            callback,
            terminator,
        }
    }
}

impl Default for SolverHooks {
    fn default() -> Self {
        Self {
            callback: Box::new(crate::callback::NoOpCallback {}),
            terminator: Box::new(Vec::<Box<dyn crate::terminators::Terminator>>::new()),
        }
    }
}
