//! KKT system assembly and active-set bookkeeping.
//!
//! The factorized matrix is
//!
//! ```text
//! K = [ H + ρI    Aᵀ          C_actᵀ    ]
//!     [ A        −μ_eq⁻¹ I     0        ]
//!     [ C_act     0          −μ_in⁻¹ I  ]
//! ```
//!
//! of dimension `n + n_eq + n_c`, where `C_act` holds the rows of `C`
//! currently pinned in the active set. `current_bijection_map` assigns each
//! inequality row a slot; rows with a slot below `n_c` are pinned, stored
//! contiguously in slots `[0, n_c)`. Active-set changes are routed through
//! the LDLᵀ row/column deletion and insertion kernels, penalty rescalings
//! through its diagonal-update kernel; the factorization is rebuilt from
//! scratch only on setup and on numeric-failure recovery.

use faer::dyn_stack::MemStack;
use faer::{Col, Mat};

use crate::E;
use crate::linalg::ldlt::FactorError;
use crate::qp::prox::{Results, Workspace};
use crate::settings::Settings;

/// Rebuilds the bijection map from the active flags and refactorizes the
/// full KKT matrix.
pub(crate) fn setup_factorization(
    work: &mut Workspace,
    results: &mut Results,
) -> Result<(), FactorError> {
    let (n, n_eq, n_in) = work.dims();

    let mut n_c = 0;
    for i in 0..n_in {
        if work.active_inequalities[i] {
            work.current_bijection_map[i] = n_c;
            n_c += 1;
        }
    }
    let mut parked = n_c;
    for i in 0..n_in {
        if !work.active_inequalities[i] {
            work.current_bijection_map[i] = parked;
            parked += 1;
        }
    }
    results.n_c = n_c;

    let dim = n + n_eq + n_c;
    for j in 0..dim {
        for i in 0..dim {
            work.kkt_scratch[(i, j)] = 0.;
        }
    }
    for j in 0..n {
        for i in 0..n {
            work.kkt_scratch[(i, j)] = work.h_scaled[(i, j)];
        }
        work.kkt_scratch[(j, j)] += results.rho;
    }
    for i in 0..n_eq {
        for j in 0..n {
            work.kkt_scratch[(n + i, j)] = work.a_scaled[(i, j)];
            work.kkt_scratch[(j, n + i)] = work.a_scaled[(i, j)];
        }
        work.kkt_scratch[(n + i, n + i)] = -results.mu_eq_inv;
    }
    for i in 0..n_in {
        let slot = work.current_bijection_map[i];
        if slot < n_c {
            let row = n + n_eq + slot;
            for j in 0..n {
                work.kkt_scratch[(row, j)] = work.c_scaled[(i, j)];
                work.kkt_scratch[(j, row)] = work.c_scaled[(i, j)];
            }
            work.kkt_scratch[(row, row)] = -results.mu_in_inv;
        }
    }

    work.ldl
        .factorize(work.kkt_scratch.as_ref().submatrix(0, 0, dim, dim))
}

/// Reconciles the factorization with the candidate active set.
///
/// Rows that left the active set are deleted one by one (and parked at slot
/// `n_in − 1`); rows that entered it are batched into a single block
/// insertion at the tail of the KKT matrix, each new column carrying the
/// corresponding row of `C` and `−μ_in⁻¹` on its own diagonal slot.
pub(crate) fn active_set_change(
    work: &mut Workspace,
    results: &mut Results,
) -> Result<(), FactorError> {
    let (n, n_eq, n_in) = work.dims();

    work.new_bijection_map.copy_from_slice(&work.current_bijection_map);
    let mut n_c_f = results.n_c;

    for i in 0..n_in {
        if work.current_bijection_map[i] < results.n_c && !work.active_inequalities[i] {
            let slot = work.new_bijection_map[i];
            work.ldl.delete_at(
                &[n + n_eq + slot],
                MemStack::new(&mut work.ldl_stack),
            )?;
            for j in 0..n_in {
                if work.new_bijection_map[j] > slot {
                    work.new_bijection_map[j] -= 1;
                }
            }
            n_c_f -= 1;
            work.new_bijection_map[i] = n_in - 1;
        }
    }

    let mut planned_to_add = Vec::new();
    let n_c_before = n_c_f;
    for i in 0..n_in {
        if work.active_inequalities[i] && work.new_bijection_map[i] >= n_c_f {
            planned_to_add.push(i);
            let slot = work.new_bijection_map[i];
            for j in 0..n_in {
                if work.new_bijection_map[j] < slot && work.new_bijection_map[j] >= n_c_f {
                    work.new_bijection_map[j] += 1;
                }
            }
            work.new_bijection_map[i] = n_c_f;
            n_c_f += 1;
        }
    }

    if !planned_to_add.is_empty() {
        let k = planned_to_add.len();
        let dim_new = n + n_eq + n_c_f;
        let mut new_cols = Mat::<E>::zeros(dim_new, k);
        for (kk, &index) in planned_to_add.iter().enumerate() {
            for j in 0..n {
                new_cols[(j, kk)] = work.c_scaled[(index, j)];
            }
            new_cols[(n + n_eq + n_c_before + kk, kk)] = -results.mu_in_inv;
        }
        work.ldl.insert_block_at(
            n + n_eq + n_c_before,
            new_cols.as_ref(),
            MemStack::new(&mut work.ldl_stack),
        )?;
    }

    results.n_c = n_c_f;
    work.current_bijection_map.copy_from_slice(&work.new_bijection_map);
    Ok(())
}

/// Routes a penalty rescaling through diagonal updates of the factorization.
///
/// The diagonal of the equality block changes by `μ_eq_old⁻¹ − μ_eq_new⁻¹`
/// on all `n_eq` rows, the active-inequality block analogously.
pub(crate) fn mu_update(
    work: &mut Workspace,
    results: &mut Results,
    new_mu_eq: E,
    new_mu_in: E,
) -> Result<(), FactorError> {
    let (n, n_eq, _) = work.dims();

    let delta_eq = results.mu_eq_inv - 1. / new_mu_eq;
    if n_eq > 0 && delta_eq != 0. {
        let mut indices: Vec<usize> = (n..n + n_eq).collect();
        let alpha = Col::from_fn(n_eq, |_| delta_eq);
        work.ldl.diagonal_update_clobber_indices(
            &mut indices,
            &alpha,
            MemStack::new(&mut work.ldl_stack),
        )?;
    }

    let delta_in = results.mu_in_inv - 1. / new_mu_in;
    if results.n_c > 0 && delta_in != 0. {
        let mut indices: Vec<usize> = (n + n_eq..n + n_eq + results.n_c).collect();
        let alpha = Col::from_fn(results.n_c, |_| delta_in);
        work.ldl.diagonal_update_clobber_indices(
            &mut indices,
            &alpha,
            MemStack::new(&mut work.ldl_stack),
        )?;
    }

    results.set_mu_eq(new_mu_eq);
    results.set_mu_in(new_mu_in);
    Ok(())
}

/// Structure-aware product `out = K v` for the current active set; `K` is
/// never materialized.
fn kkt_product(work: &Workspace, results: &Results, v: &Col<E>, out: &mut Col<E>) {
    let (n, n_eq, n_in) = work.dims();

    let vx = v.subrows(0, n);
    let vy = v.subrows(n, n_eq);

    let head = &work.h_scaled * vx + results.rho * vx + work.a_scaled.transpose() * vy;
    for j in 0..n {
        out[j] = head[j];
    }
    let eq = &work.a_scaled * vx;
    for i in 0..n_eq {
        out[n + i] = eq[i] - results.mu_eq_inv * vy[i];
    }
    for i in 0..n_in {
        let slot = work.current_bijection_map[i];
        if slot < results.n_c {
            let row = n + n_eq + slot;
            let coef = v[row];
            let mut dot = 0.;
            for j in 0..n {
                out[j] += work.c_scaled[(i, j)] * coef;
                dot += work.c_scaled[(i, j)] * vx[j];
            }
            out[row] = dot - results.mu_in_inv * coef;
        }
    }
}

/// Assembles the semismooth Newton right-hand side, solves through the LDLᵀ
/// with iterative refinement, and scatters the step into `dw_aug` (inactive
/// multiplier directions follow the projection rule `Δz_i = −z_i`).
pub(crate) fn solve_newton_step(
    work: &mut Workspace,
    results: &mut Results,
    settings: &Settings,
) -> Result<(), FactorError> {
    let (n, n_eq, n_in) = work.dims();
    let dim = n + n_eq + results.n_c;

    for j in 0..n {
        work.rhs[j] = -work.dual_residual_scaled[j];
    }
    for i in 0..n_eq {
        work.rhs[n + i] = -(work.primal_residual_eq_scaled[i]
            - (results.y[i] - work.y_prev[i]) * results.mu_eq_inv);
    }
    for i in 0..n_in {
        if work.active_inequalities[i] {
            let slot = work.current_bijection_map[i];
            let base = if work.active_set_up[i] {
                work.primal_residual_in_scaled_up[i]
            } else {
                work.primal_residual_in_scaled_low[i]
            };
            work.rhs[n + n_eq + slot] = -(base - results.z[i] * results.mu_in_inv);
        }
    }

    let mut sol = Col::from_fn(dim, |k| work.rhs[k]);
    work.ldl
        .solve_in_place(&mut sol, MemStack::new(&mut work.ldl_stack));

    let mut residual = Col::<E>::zeros(dim);
    for _ in 0..settings.nb_iterative_refinement {
        kkt_product(work, results, &sol, &mut residual);
        for k in 0..dim {
            residual[k] -= work.rhs[k];
        }
        if residual.norm_max() <= settings.eps_abs {
            break;
        }
        work.ldl
            .solve_in_place(&mut residual, MemStack::new(&mut work.ldl_stack));
        for k in 0..dim {
            sol[k] -= residual[k];
        }
    }

    for j in 0..n {
        work.dw_aug[j] = sol[j];
    }
    for i in 0..n_eq {
        work.dw_aug[n + i] = sol[n + i];
    }
    for i in 0..n_in {
        let slot = work.current_bijection_map[i];
        work.dw_aug[n + n_eq + i] = if slot < results.n_c {
            sol[n + n_eq + slot]
        } else {
            -results.z[i]
        };
    }

    work.hdx = &work.h_scaled * work.dw_aug.subrows(0, n);
    work.adx = &work.a_scaled * work.dw_aug.subrows(0, n);
    work.cdx = &work.c_scaled * work.dw_aug.subrows(0, n);
    Ok(())
}
