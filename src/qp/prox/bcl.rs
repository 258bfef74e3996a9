//! BCL penalty and multiplier-acceptance schedule.
//!
//! The outer loop either accepts the current multipliers (when the primal
//! residual beats the current outer tolerance `eta_ext`) or tightens the
//! penalties, following the bound-constrained augmented-Lagrangian update
//! rule. Both tolerances shrink as `mu_in` grows.

use crate::E;
use crate::settings::Settings;

pub(crate) struct BclState {
    /// Outer (multiplier acceptance) tolerance.
    pub eta_ext: E,
    /// Inner (subproblem) tolerance.
    pub eta_in: E,
}

pub(crate) enum BclOutcome {
    /// Multipliers accepted; the caller promotes `(y, z)` to `(y_k, z_k)`.
    Accept,
    /// Multipliers rejected; the caller applies the returned penalties.
    Tighten { mu_eq: E, mu_in: E },
}

impl BclState {
    pub fn new(settings: &Settings, mu_in_inv: E) -> Self {
        Self {
            eta_ext: mu_in_inv.powf(settings.alpha_bcl),
            eta_in: 1.,
        }
    }

    /// One BCL decision, driven by the unscaled primal residual.
    pub fn update(
        &mut self,
        settings: &Settings,
        primal_residual: E,
        mu_eq: E,
        mu_in: E,
    ) -> BclOutcome {
        let mu_in_inv = 1. / mu_in;
        if primal_residual <= self.eta_ext {
            self.eta_ext *= mu_in_inv.powf(settings.beta_bcl);
            self.eta_in = (self.eta_in * mu_in_inv).max(settings.eps_abs);
            BclOutcome::Accept
        } else {
            let new_mu_eq = (mu_eq * settings.mu_update_factor).min(settings.mu_max_eq);
            let new_mu_in = (mu_in * settings.mu_update_factor).min(settings.mu_max_in);
            let new_mu_in_inv = 1. / new_mu_in;
            self.eta_ext = new_mu_in_inv.powf(settings.alpha_bcl);
            self.eta_in = new_mu_in_inv.max(settings.eps_abs);
            BclOutcome::Tighten {
                mu_eq: new_mu_eq,
                mu_in: new_mu_in,
            }
        }
    }
}
