//! Stop conditions polled between outer iterations.
//!
//! The solver is not interruptible mid-iteration: after every outer
//! iteration it hands the current [`Results`] to a [`Terminator`], which may
//! end the solve early with the best-so-far iterate. Provided conditions:
//! - [`InterruptTerminator`]: Ctrl-C (SIGINT) or a programmatic interrupt.
//! - [`WallClockTerminator`]: a wall-clock budget.
//! - [`StallTerminator`]: primal/dual residuals that stop improving.
//!
//! A `Vec` of boxed terminators is itself a terminator; the first member to
//! fire decides the status.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::qp::prox::Results;
use crate::{E, Status};

/// Stop condition polled once per outer iteration with the current results.
pub trait Terminator {
    /// Called once when the solve starts.
    fn initialize(&mut self) {}

    /// Returns the status to stop with, if any.
    fn terminate(&mut self, results: &Results) -> Option<Status>;
}

/// Ends the solve on Ctrl-C (SIGINT) or a programmatic interrupt, reporting
/// [`Status::Interrupted`].
///
/// # Note
/// Construct at most once per process: the constructor installs the global
/// signal handler and panics if one is already registered.
pub struct InterruptTerminator {
    interrupted: Arc<AtomicBool>,
}

impl InterruptTerminator {
    pub fn new() -> Self {
        let interrupted = Arc::new(AtomicBool::new(false));
        let flag = interrupted.clone();
        ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
            .expect("Error setting Ctrl-C handler");
        Self { interrupted }
    }

    /// Requests a stop as if a signal had arrived.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }
}

impl Terminator for InterruptTerminator {
    fn terminate(&mut self, _results: &Results) -> Option<Status> {
        self.interrupted
            .load(Ordering::SeqCst)
            .then_some(Status::Interrupted)
    }
}

/// Ends the solve once a wall-clock budget is spent, reporting
/// [`Status::TimeLimit`].
pub struct WallClockTerminator {
    budget: Duration,
    deadline: Instant,
}

impl WallClockTerminator {
    pub fn new(budget: Duration) -> Self {
        Self {
            budget,
            deadline: Instant::now() + budget,
        }
    }
}

impl Terminator for WallClockTerminator {
    fn initialize(&mut self) {
        self.deadline = Instant::now() + self.budget;
    }

    fn terminate(&mut self, _results: &Results) -> Option<Status> {
        (Instant::now() >= self.deadline).then_some(Status::TimeLimit)
    }
}

/// Ends the solve when the outer residuals stall, reporting
/// [`Status::MaxIterReached`] with the best-so-far iterate.
///
/// An outer iteration counts as progress when it improves the best primal
/// or the best dual residual seen so far by at least the relative factor
/// `min_decrease`; `window` consecutive iterations without progress fire
/// the terminator.
pub struct StallTerminator {
    window: usize,
    min_decrease: E,
    best_primal: E,
    best_dual: E,
    stalled_for: usize,
}

impl StallTerminator {
    pub fn new(window: usize, min_decrease: E) -> Self {
        Self {
            window,
            min_decrease,
            best_primal: E::INFINITY,
            best_dual: E::INFINITY,
            stalled_for: 0,
        }
    }
}

impl Terminator for StallTerminator {
    fn initialize(&mut self) {
        self.best_primal = E::INFINITY;
        self.best_dual = E::INFINITY;
        self.stalled_for = 0;
    }

    fn terminate(&mut self, results: &Results) -> Option<Status> {
        let improved = results.primal_residual < self.best_primal * (1. - self.min_decrease)
            || results.dual_residual < self.best_dual * (1. - self.min_decrease);
        self.best_primal = self.best_primal.min(results.primal_residual);
        self.best_dual = self.best_dual.min(results.dual_residual);

        if improved {
            self.stalled_for = 0;
            None
        } else {
            self.stalled_for += 1;
            (self.stalled_for >= self.window).then_some(Status::MaxIterReached)
        }
    }
}

impl Terminator for Vec<Box<dyn Terminator>> {
    fn initialize(&mut self) {
        for terminator in self.iter_mut() {
            terminator.initialize();
        }
    }

    fn terminate(&mut self, results: &Results) -> Option<Status> {
        self.iter_mut()
            .find_map(|terminator| terminator.terminate(results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    fn results_with_residuals(primal: E, dual: E) -> Results {
        let mut results = Results::new(1, 0, 0, &Settings::default());
        results.primal_residual = primal;
        results.dual_residual = dual;
        results
    }

    #[test]
    fn interrupt_terminator_fires_after_interrupt() {
        let results = results_with_residuals(1.0, 1.0);
        let mut terminator = InterruptTerminator::new();
        assert_eq!(terminator.terminate(&results), None);
        terminator.interrupt();
        assert_eq!(terminator.terminate(&results), Some(Status::Interrupted));
    }

    #[test]
    fn wall_clock_terminator_respects_a_zero_budget() {
        let results = results_with_residuals(1.0, 1.0);
        let mut terminator = WallClockTerminator::new(Duration::from_secs(0));
        terminator.initialize();
        std::thread::sleep(Duration::from_millis(1));
        assert_eq!(terminator.terminate(&results), Some(Status::TimeLimit));
    }

    #[test]
    fn stall_terminator_fires_after_the_window() {
        let mut results = results_with_residuals(1.0, 1.0);
        let mut terminator = StallTerminator::new(3, 0.5);
        terminator.initialize();
        assert_eq!(terminator.terminate(&results), None);

        // Less than the requested 50% decrease three times in a row.
        results.primal_residual = 0.9;
        results.dual_residual = 0.9;
        assert_eq!(terminator.terminate(&results), None);
        assert_eq!(terminator.terminate(&results), None);
        assert_eq!(terminator.terminate(&results), Some(Status::MaxIterReached));
    }

    #[test]
    fn stall_terminator_resets_on_progress() {
        let mut results = results_with_residuals(1.0, 1.0);
        let mut terminator = StallTerminator::new(2, 0.5);
        terminator.initialize();
        assert_eq!(terminator.terminate(&results), None);
        assert_eq!(terminator.terminate(&results), None);

        // A large dual improvement clears the stall counter.
        results.dual_residual = 1e-3;
        assert_eq!(terminator.terminate(&results), None);
        assert_eq!(terminator.terminate(&results), None);
        assert_eq!(terminator.terminate(&results), Some(Status::MaxIterReached));
    }

    #[test]
    fn terminator_collections_fire_on_any_member() {
        let results = results_with_residuals(1.0, 1.0);
        let mut terminators: Vec<Box<dyn Terminator>> = vec![
            Box::new(StallTerminator::new(1, 0.5)),
            Box::new(WallClockTerminator::new(Duration::from_secs(3600))),
        ];
        terminators.initialize();
        assert_eq!(terminators.terminate(&results), None);
        assert_eq!(terminators.terminate(&results), Some(Status::MaxIterReached));
    }
}
