use crate::qp::prox::Results;
use crate::settings::Settings;

/// Hook invoked once per outer iteration for logging, monitoring, or early
/// stopping.
pub trait Callback {
    /// Creates a new callback from solver settings.
    fn new(settings: &Settings) -> Self
    where
        Self: Sized;

    /// Called at the top of each outer iteration with the current results.
    fn call(&mut self, results: &Results);
}

/// A callback that does nothing. Use when no per-iteration output is needed.
pub struct NoOpCallback {}

impl Callback for NoOpCallback {
    fn new(_settings: &Settings) -> Self {
        Self {}
    }

    fn call(&mut self, _results: &Results) {
        // Do nothing
    }
}

/// Prints penalties and primal/dual residuals to stdout each outer
/// iteration.
///
/// The solver runs this automatically when `settings.verbose` is set, in
/// addition to whatever callback the hooks carry.
pub struct ConvergenceOutput {
    header_printed: bool,
}

impl Callback for ConvergenceOutput {
    fn new(_settings: &Settings) -> Self {
        Self {
            header_printed: false,
        }
    }

    fn call(&mut self, results: &Results) {
        if !self.header_printed {
            println!(
                "| {:>4} | {:>8} | {:>8} | {:>8} | {:>8} | {:>8} |",
                "iter", "mu_eq", "mu_in", "rho", "prim res", "dual res"
            );
            self.header_printed = true;
        }
        println!(
            "| {:4} | {:<8.2e} | {:<8.2e} | {:<8.2e} | {:<8.2e} | {:<8.2e} |",
            results.stats.n_ext,
            results.mu_eq,
            results.mu_in,
            results.rho,
            results.primal_residual,
            results.dual_residual,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qp::prox::Results;

    fn sample_results() -> Results {
        let settings = Settings::default();
        let mut results = Results::new(2, 1, 1, &settings);
        results.primal_residual = 1e-3;
        results.dual_residual = 1e-4;
        results.stats.n_ext = 1;
        results
    }

    #[test]
    fn convergence_output_prints_header_then_rows() {
        let settings = Settings::default();
        let mut results = sample_results();
        let mut callback = ConvergenceOutput::new(&settings);

        callback.call(&results);
        assert!(callback.header_printed);
        results.stats.n_ext = 2;
        callback.call(&results);
    }

    #[test]
    fn noop_callback_is_silent() {
        let settings = Settings::default();
        let mut callback = NoOpCallback::new(&settings);
        callback.call(&sample_results());
    }
}
