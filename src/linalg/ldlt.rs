//! # Dense LDLᵀ factorization with in-place updates
//!
//! This module maintains a factorization `P M Pᵀ = L D Lᵀ` of a dense
//! symmetric matrix that evolves without refactoring:
//! - [`Ldlt::factorize`]: full factorization with a diagonal-pivoting
//!   permutation chosen once up front.
//! - [`Ldlt::rank_r_update`]: `M ← M + W diag(α) Wᵀ` applied directly to the
//!   factors (Gill–Golub–Murray–Saunders rank-1 cascade).
//! - [`Ldlt::insert_block_at`] / [`Ldlt::delete_at`]: symmetric row/column
//!   insertion and deletion.
//! - [`Ldlt::diagonal_update_clobber_indices`]: sparse diagonal perturbation.
//!
//! Scratch space comes from a caller-provided [`MemStack`]; every operation
//! that needs scratch exposes a `*_scratch` query so the caller can size one
//! buffer per solve.
//!
//! ## Example usage
//! ```
//! use faer::Mat;
//! use faer::dyn_stack::{MemBuffer, MemStack};
//! use proxal::linalg::ldlt::Ldlt;
//!
//! let mat = Mat::<f64>::from_fn(3, 3, |i, j| if i == j { 2.0 } else { -0.5 });
//! let mut ldl = Ldlt::<f64>::new();
//! let mut mem = MemBuffer::new(Ldlt::<f64>::solve_in_place_scratch(3));
//! ldl.factorize(mat.as_ref()).unwrap();
//! let mut rhs = faer::Col::from_fn(3, |i| i as f64);
//! ldl.solve_in_place(&mut rhs, MemStack::new(&mut mem));
//! ```

use std::cmp::Ordering;

use derive_more::{Display, Error};
use faer::dyn_stack::{MemStack, StackReq};
use faer::linalg::{temp_mat_scratch, temp_mat_zeroed};
use faer::mat::AsMatMut;
use faer::prelude::ReborrowMut;
use faer::traits::num_traits::{Float, One, Zero};
use faer::{Col, Mat, MatRef};

use crate::Scalar;

/// Errors surfaced by the factorization and its update kernels.
#[derive(Debug, Display, Error, PartialEq, Eq, Clone, Copy)]
pub enum FactorError {
    /// A diagonal pivot vanished beyond the fixed tolerance.
    #[display("Pivot magnitude below tolerance")]
    ZeroPivot,

    /// A non-finite value appeared in the factors.
    #[display("Non-finite value encountered in factorization")]
    NonFinite,

    /// The operand dimensions do not match the factorization.
    #[display("Dimension mismatch")]
    DimensionMismatch,

    /// Update indices were unsorted or out of range.
    #[display("Invalid update indices")]
    InvalidIndices,
}

/// Dense LDLᵀ factorization that supports in-place structural updates.
///
/// The strictly lower part of `ld` stores `L` (unit diagonal implied) and the
/// diagonal stores `D`, in the internal (permuted) ordering. `perm` maps
/// internal positions to user-visible indices and `perm_inv` is its inverse.
/// Storage is allocated at capacity and never shrinks during a solve.
pub struct Ldlt<T: Scalar> {
    /// Factor storage of capacity `cap × cap`; only the leading `dim × dim`
    /// block is meaningful.
    ld: Mat<T>,
    dim: usize,
    /// Internal position → user index, `perm[perm_inv[i]] == i`.
    perm: Vec<usize>,
    perm_inv: Vec<usize>,
    // sorted on a best effort basis
    maybe_sorted_diag: Vec<T>,
}

impl<T: Scalar> Default for Ldlt<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar> Ldlt<T> {
    pub fn new() -> Self {
        Self {
            ld: Mat::zeros(0, 0),
            dim: 0,
            perm: Vec::new(),
            perm_inv: Vec::new(),
            maybe_sorted_diag: Vec::new(),
        }
    }

    /// Dimension of the currently factorized matrix.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Rounds a requested capacity up so that every column of the backing
    /// storage starts on a SIMD-vector boundary.
    fn adjusted_capacity(n: usize) -> usize {
        n.next_multiple_of(8)
    }

    /// Grows the backing storage to hold a `cap × cap` factorization.
    ///
    /// Existing columns are copied highest-first into their new offsets.
    /// Reservation never shrinks.
    pub fn reserve(&mut self, cap: usize) {
        let new_cap = Self::adjusted_capacity(cap);
        if new_cap <= self.ld.nrows() {
            return;
        }

        let mut new_ld = Mat::zeros(new_cap, new_cap);
        for j in (0..self.dim).rev() {
            for i in j..self.dim {
                new_ld[(i, j)] = self.ld[(i, j)];
            }
        }
        self.ld = new_ld;

        self.perm.reserve(new_cap - self.perm.len());
        self.perm_inv.reserve(new_cap - self.perm_inv.len());
        self.maybe_sorted_diag
            .reserve(new_cap - self.maybe_sorted_diag.len());
    }

    fn pivot_checked(d: T) -> Result<T, FactorError> {
        if !Float::is_finite(d) {
            return Err(FactorError::NonFinite);
        }
        if Float::abs(d) < T::min_positive_value() {
            return Err(FactorError::ZeroPivot);
        }
        Ok(d)
    }

    /// Factorizes the symmetric matrix `mat` in place.
    ///
    /// The permutation places the largest-magnitude diagonal entries first;
    /// no further pivoting is performed, so the caller is responsible for
    /// passing a matrix whose pivots stay away from zero (SPD or
    /// quasi-definite).
    pub fn factorize(&mut self, mat: MatRef<'_, T>) -> Result<(), FactorError> {
        if mat.nrows() != mat.ncols() {
            return Err(FactorError::DimensionMismatch);
        }
        let n = mat.nrows();
        self.reserve(n);
        self.dim = n;

        self.perm.clear();
        self.perm.extend(0..n);
        self.perm.sort_by(|&i, &j| {
            Float::abs(mat[(j, j)])
                .partial_cmp(&Float::abs(mat[(i, i)]))
                .unwrap_or(Ordering::Equal)
        });
        self.perm_inv.resize(n, 0);
        for i in 0..n {
            self.perm_inv[self.perm[i]] = i;
        }

        for j in 0..n {
            for i in j..n {
                self.ld[(i, j)] = mat[(self.perm[i], self.perm[j])];
            }
        }

        self.factorize_block_in_place(0)?;

        self.maybe_sorted_diag.resize(n, T::zero());
        for i in 0..n {
            self.maybe_sorted_diag[i] = self.ld[(i, i)];
        }

        Ok(())
    }

    /// Unblocked right-looking LDLᵀ on the trailing block `[start, dim)` of
    /// `ld`, assuming that block currently holds the (Schur-complemented)
    /// matrix to factor in its lower triangle.
    fn factorize_block_in_place(&mut self, start: usize) -> Result<(), FactorError> {
        let n = self.dim;
        for j in start..n {
            let d = Self::pivot_checked(self.ld[(j, j)])?;
            for i in (j + 1)..n {
                self.ld[(i, j)] = self.ld[(i, j)] / d;
            }
            for k in (j + 1)..n {
                let lkj_d = self.ld[(k, j)] * d;
                for i in k..n {
                    let delta = self.ld[(i, j)] * lkj_d;
                    self.ld[(i, k)] = self.ld[(i, k)] - delta;
                }
            }
        }
        Ok(())
    }

    pub fn solve_in_place_scratch(n: usize) -> StackReq {
        temp_mat_scratch::<T>(n, 1)
    }

    /// Solves `M x = rhs` in place using the current factorization.
    pub fn solve_in_place(&self, rhs: &mut Col<T>, stack: &mut MemStack) {
        let n = self.dim;
        debug_assert_eq!(rhs.nrows(), n);

        let (mut work, _) = temp_mat_zeroed::<T, _, _>(n, 1, stack);
        let mut work = work.as_mat_mut();

        for i in 0..n {
            work[(i, 0)] = rhs[self.perm[i]];
        }

        // L y = P rhs
        for j in 0..n {
            let xj = work[(j, 0)];
            for i in (j + 1)..n {
                let delta = self.ld[(i, j)] * xj;
                work[(i, 0)] = work[(i, 0)] - delta;
            }
        }
        // D z = y
        for j in 0..n {
            work[(j, 0)] = work[(j, 0)] / self.ld[(j, j)];
        }
        // Lᵀ w = z
        for j in (0..n).rev() {
            let mut xj = work[(j, 0)];
            for i in (j + 1)..n {
                xj = xj - self.ld[(i, j)] * work[(i, 0)];
            }
            work[(j, 0)] = xj;
        }

        for i in 0..n {
            rhs[i] = work[(self.perm_inv[i], 0)];
        }
    }

    pub fn rank_r_update_scratch(n: usize, r: usize) -> StackReq {
        temp_mat_scratch::<T>(n, r)
    }

    /// Updates the factorization to represent `M + W diag(α) Wᵀ`.
    ///
    /// `w` is given in user index order; its columns are permuted into the
    /// internal order before the rank-1 cascade runs once per column.
    pub fn rank_r_update(
        &mut self,
        w: MatRef<'_, T>,
        alpha: &Col<T>,
        stack: &mut MemStack,
    ) -> Result<(), FactorError> {
        let n = self.dim;
        let r = w.ncols();
        if r == 0 {
            return Ok(());
        }
        if w.nrows() != n || alpha.nrows() != r {
            return Err(FactorError::DimensionMismatch);
        }

        let (mut wp, _) = temp_mat_zeroed::<T, _, _>(n, r, stack);
        let mut wp = wp.as_mat_mut();
        for k in 0..r {
            let alpha_k = alpha[k];
            for i in 0..n {
                let wi = w[(self.perm[i], k)];
                wp[(i, k)] = wi;
                self.maybe_sorted_diag[i] = self.maybe_sorted_diag[i] + alpha_k * wi * wi;
            }
        }

        for k in 0..r {
            self.rank_1_cascade(0, wp.rb_mut().col_mut(k), alpha[k])?;
        }
        Ok(())
    }

    /// Rank-1 cascade on the trailing block `[start, dim)`, clobbering `w`.
    ///
    /// `w` is a full-length internal-order column whose entries before
    /// `start` must be zero.
    fn rank_1_cascade(
        &mut self,
        start: usize,
        mut w: faer::col::ColMut<'_, T>,
        alpha: T,
    ) -> Result<(), FactorError> {
        let n = self.dim;
        let mut alpha = alpha;
        for j in start..n {
            let p = w[j];
            if p == T::zero() {
                continue;
            }
            let d = self.ld[(j, j)];
            let d_new = Self::pivot_checked(d + alpha * p * p)?;
            let gamma = alpha * p / d_new;
            self.ld[(j, j)] = d_new;
            alpha = alpha * d / d_new;
            for i in (j + 1)..n {
                w[i] = w[i] - p * self.ld[(i, j)];
                self.ld[(i, j)] = self.ld[(i, j)] + gamma * w[i];
            }
        }
        Ok(())
    }

    pub fn diagonal_update_scratch(n: usize, r: usize) -> StackReq {
        temp_mat_scratch::<T>(n, r)
    }

    /// Adds `α_k` to the diagonal entry at user index `indices[k]`.
    ///
    /// Equivalent to a rank-r update with identity columns, but the cascade
    /// starts at the smallest affected internal position. `indices` is
    /// clobbered (remapped in place to internal positions).
    pub fn diagonal_update_clobber_indices(
        &mut self,
        indices: &mut [usize],
        alpha: &Col<T>,
        stack: &mut MemStack,
    ) -> Result<(), FactorError> {
        let n = self.dim;
        let r = indices.len();
        if r == 0 {
            return Ok(());
        }
        if alpha.nrows() != r || indices.iter().any(|&i| i >= n) {
            return Err(FactorError::InvalidIndices);
        }

        for idx in indices.iter_mut() {
            *idx = self.perm_inv[*idx];
        }
        let mut order: Vec<usize> = (0..r).collect();
        order.sort_by_key(|&k| indices[k]);
        let first = indices[order[0]];

        let (mut wp, _) = temp_mat_zeroed::<T, _, _>(n, r, stack);
        let mut wp = wp.as_mat_mut();
        for (k, &pos) in order.iter().enumerate() {
            wp[(indices[pos], k)] = T::one();
            let idx = indices[pos];
            self.maybe_sorted_diag[idx] = self.maybe_sorted_diag[idx] + alpha[pos];
        }

        for (k, &pos) in order.iter().enumerate() {
            self.rank_1_cascade(first, wp.rb_mut().col_mut(k), alpha[pos])?;
        }
        Ok(())
    }

    pub fn insert_block_at_scratch(n: usize, r: usize) -> StackReq {
        temp_mat_scratch::<T>(n + r, r)
    }

    /// Inserts `r` symmetric rows/columns at user-visible position `i`.
    ///
    /// `a` is the `(n + r) × r` extension in the post-insertion user order:
    /// row `i + k` of `a` holds the new diagonal block. The inserted
    /// rows/columns are appended at the end of the internal storage order
    /// while the permutation records position `i`.
    pub fn insert_block_at(
        &mut self,
        i: usize,
        a: MatRef<'_, T>,
        stack: &mut MemStack,
    ) -> Result<(), FactorError> {
        let n = self.dim;
        let r = a.ncols();
        if r == 0 {
            return Ok(());
        }
        if a.nrows() != n + r || i > n {
            return Err(FactorError::DimensionMismatch);
        }

        self.reserve(n + r);

        for p in self.perm.iter_mut() {
            if *p >= i {
                *p += r;
            }
        }
        for k in 0..r {
            self.perm.push(i + k);
            self.maybe_sorted_diag.push(a[(i + k, k)]);
        }
        self.perm_inv.resize(n + r, 0);
        for (t, &p) in self.perm.iter().enumerate() {
            self.perm_inv[p] = t;
        }

        let (mut ap, _) = temp_mat_zeroed::<T, _, _>(n + r, r, stack);
        let mut ap = ap.as_mat_mut();
        for k in 0..r {
            for t in 0..n + r {
                ap[(t, k)] = a[(self.perm[t], k)];
            }
        }

        // Forward-substitute the head rows: ap[..n] ← L⁻¹ ap[..n].
        for k in 0..r {
            for j in 0..n {
                let xj = ap[(j, k)];
                for t in (j + 1)..n {
                    let delta = self.ld[(t, j)] * xj;
                    ap[(t, k)] = ap[(t, k)] - delta;
                }
            }
        }

        // Schur complement of the new diagonal block.
        for k in 0..r {
            for kk in k..r {
                let mut s = ap[(n + kk, k)];
                for j in 0..n {
                    s = s - ap[(j, k)] * ap[(j, kk)] / self.ld[(j, j)];
                }
                self.ld[(n + kk, n + k)] = s;
            }
        }

        // New off-diagonal rows of L.
        for k in 0..r {
            for j in 0..n {
                self.ld[(n + k, j)] = ap[(j, k)] / self.ld[(j, j)];
            }
        }

        self.dim = n + r;
        self.factorize_block_in_place(n)
    }

    pub fn delete_at_scratch(n: usize) -> StackReq {
        temp_mat_scratch::<T>(n, 1)
    }

    /// Deletes the rows/columns at the given sorted user indices.
    pub fn delete_at(
        &mut self,
        sorted_indices: &[usize],
        stack: &mut MemStack,
    ) -> Result<(), FactorError> {
        if sorted_indices.is_empty() {
            return Ok(());
        }
        debug_assert!(sorted_indices.windows(2).all(|w| w[0] < w[1]));
        if sorted_indices.windows(2).any(|w| w[0] >= w[1])
            || sorted_indices.iter().any(|&i| i >= self.dim)
        {
            return Err(FactorError::InvalidIndices);
        }

        for &u in sorted_indices.iter().rev() {
            self.delete_one(self.perm_inv[u], stack)?;
        }
        Ok(())
    }

    /// Removes the row/column at internal position `p` and restores the
    /// factorization of the remaining matrix with a rank-1 correction on the
    /// trailing block.
    fn delete_one(&mut self, p: usize, stack: &mut MemStack) -> Result<(), FactorError> {
        let m = self.dim;
        let d = self.ld[(p, p)];

        let (mut w, _) = temp_mat_zeroed::<T, _, _>(m, 1, stack);
        let mut w = w.as_mat_mut();
        for t in (p + 1)..m {
            w[(t - 1, 0)] = self.ld[(t, p)];
        }

        // Shift the trailing rows up, then the trailing columns left.
        for j in 0..p {
            for t in p..m - 1 {
                self.ld[(t, j)] = self.ld[(t + 1, j)];
            }
        }
        for j in p..m - 1 {
            for t in j..m - 1 {
                self.ld[(t, j)] = self.ld[(t + 1, j + 1)];
            }
        }

        let u = self.perm[p];
        self.perm.remove(p);
        self.perm_inv.remove(u);
        self.maybe_sorted_diag.remove(p);
        for v in self.perm.iter_mut() {
            if *v > u {
                *v -= 1;
            }
        }
        for v in self.perm_inv.iter_mut() {
            if *v > p {
                *v -= 1;
            }
        }
        self.dim = m - 1;

        self.rank_1_cascade(p, w.rb_mut().col_mut(0), d)
    }

    /// Reconstructs the factorized matrix in user index order (test support).
    pub fn reconstructed(&self) -> Mat<T> {
        let n = self.dim;
        let mut internal = Mat::<T>::zeros(n, n);
        for i in 0..n {
            for j in 0..n {
                let mut s = T::zero();
                for k in 0..=i.min(j) {
                    let lik = if i == k { T::one() } else { self.ld[(i, k)] };
                    let ljk = if j == k { T::one() } else { self.ld[(j, k)] };
                    s = s + lik * self.ld[(k, k)] * ljk;
                }
                internal[(i, j)] = s;
            }
        }
        Mat::from_fn(n, n, |i, j| {
            internal[(self.perm_inv[i], self.perm_inv[j])]
        })
    }
}

#[cfg(test)]
mod tests {
    use faer::dyn_stack::{MemBuffer, MemStack};

    use super::*;

    fn random_spd(n: usize, seed: u64) -> Mat<f64> {
        // Small deterministic congruential stream, good enough for SPD
        // test fixtures.
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        let mut next = || {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 33) as f64 / (1u64 << 31) as f64) - 1.0
        };
        let b = Mat::<f64>::from_fn(n, n, |_, _| next());
        let mut m = &b * b.transpose();
        for i in 0..n {
            m[(i, i)] += n as f64;
        }
        m
    }

    fn solve_stack(n: usize) -> MemBuffer {
        MemBuffer::new(StackReq::all_of(&[
            Ldlt::<f64>::solve_in_place_scratch(n),
            Ldlt::<f64>::rank_r_update_scratch(n, 4),
            Ldlt::<f64>::insert_block_at_scratch(n, 4),
            Ldlt::<f64>::delete_at_scratch(n),
            Ldlt::<f64>::diagonal_update_scratch(n, 4),
        ]))
    }

    fn residual_norm(m: &Mat<f64>, ldl: &Ldlt<f64>, mem: &mut MemBuffer) -> f64 {
        let n = m.nrows();
        let b = Col::from_fn(n, |i| (i as f64 * 0.7).sin() + 1.0);
        let mut x = b.clone();
        ldl.solve_in_place(&mut x, MemStack::new(mem));
        (m * &x - &b).norm_max()
    }

    fn reconstruction_error(m: &Mat<f64>, ldl: &Ldlt<f64>) -> f64 {
        let rec = ldl.reconstructed();
        (&rec - m).norm_max()
    }

    #[test]
    fn factorize_and_solve_spd() {
        let n = 16;
        let m = random_spd(n, 3);
        let mut mem = solve_stack(n);
        let mut ldl = Ldlt::<f64>::new();
        ldl.factorize(m.as_ref()).unwrap();
        assert!(residual_norm(&m, &ldl, &mut mem) < 1e-10);
        assert!(reconstruction_error(&m, &ldl) < 1e-10);
    }

    #[test]
    fn factorize_and_solve_f32() {
        let n = 8;
        let m64 = random_spd(n, 11);
        let m = Mat::<f32>::from_fn(n, n, |i, j| m64[(i, j)] as f32);
        let mut mem = MemBuffer::new(Ldlt::<f32>::solve_in_place_scratch(n));
        let mut ldl = Ldlt::<f32>::new();
        ldl.factorize(m.as_ref()).unwrap();
        let b = Col::<f32>::from_fn(n, |i| i as f32 - 2.0);
        let mut x = b.clone();
        ldl.solve_in_place(&mut x, MemStack::new(&mut mem));
        assert!((&m * &x - &b).norm_max() < 1e-3);
    }

    #[test]
    fn factorize_indefinite_diagonal() {
        // Quasi-definite matrices factor without pivoting trouble.
        let mut m = random_spd(6, 5);
        for i in 3..6 {
            for j in 0..6 {
                m[(i, j)] = if i == j { -2.0 } else { 0.0 };
                m[(j, i)] = m[(i, j)];
            }
        }
        let mut mem = solve_stack(6);
        let mut ldl = Ldlt::<f64>::new();
        ldl.factorize(m.as_ref()).unwrap();
        assert!(residual_norm(&m, &ldl, &mut mem) < 1e-10);
    }

    #[test]
    fn zero_pivot_is_reported() {
        let m = Mat::<f64>::zeros(3, 3);
        let mut ldl = Ldlt::<f64>::new();
        assert_eq!(ldl.factorize(m.as_ref()), Err(FactorError::ZeroPivot));
    }

    #[test]
    fn rank_updates_track_the_matrix() {
        // 20 random rank-1 updates with mixed signs, keeping SPD.
        let n = 16;
        let mut m = random_spd(n, 7);
        let mut mem = solve_stack(n);
        let mut ldl = Ldlt::<f64>::new();
        ldl.factorize(m.as_ref()).unwrap();

        for step in 0..20 {
            let w = Mat::<f64>::from_fn(n, 1, |i, _| ((i + step) as f64 * 0.37).cos());
            let alpha = Col::from_fn(1, |_| if step % 2 == 0 { 0.5 } else { -0.01 });
            ldl.rank_r_update(w.as_ref(), &alpha, MemStack::new(&mut mem))
                .unwrap();
            for i in 0..n {
                for j in 0..n {
                    m[(i, j)] += alpha[0] * w[(i, 0)] * w[(j, 0)];
                }
            }
        }

        assert!(reconstruction_error(&m, &ldl) < 1e-9 * m.norm_max());
        assert!(residual_norm(&m, &ldl, &mut mem) < 1e-10);
    }

    #[test]
    fn rank_two_update_reconstructs() {
        let n = 10;
        let mut m = random_spd(n, 9);
        let mut mem = solve_stack(n);
        let mut ldl = Ldlt::<f64>::new();
        ldl.factorize(m.as_ref()).unwrap();

        let w = Mat::<f64>::from_fn(n, 2, |i, k| ((i * (k + 2)) as f64 * 0.21).sin());
        let alpha = Col::from_fn(2, |k| if k == 0 { 1.5 } else { -0.2 });
        ldl.rank_r_update(w.as_ref(), &alpha, MemStack::new(&mut mem))
            .unwrap();
        for k in 0..2 {
            for i in 0..n {
                for j in 0..n {
                    m[(i, j)] += alpha[k] * w[(i, k)] * w[(j, k)];
                }
            }
        }
        assert!(reconstruction_error(&m, &ldl) < 1e-10 * m.norm_max());
    }

    #[test]
    fn empty_updates_are_noops() {
        let n = 5;
        let m = random_spd(n, 13);
        let mut mem = solve_stack(n);
        let mut ldl = Ldlt::<f64>::new();
        ldl.factorize(m.as_ref()).unwrap();
        let before = ldl.reconstructed();

        let w = Mat::<f64>::zeros(n, 0);
        let alpha = Col::<f64>::zeros(0);
        ldl.rank_r_update(w.as_ref(), &alpha, MemStack::new(&mut mem))
            .unwrap();
        ldl.delete_at(&[], MemStack::new(&mut mem)).unwrap();
        ldl.diagonal_update_clobber_indices(&mut [], &alpha, MemStack::new(&mut mem))
            .unwrap();
        let ext = Mat::<f64>::zeros(n, 0);
        ldl.insert_block_at(2, ext.as_ref(), MemStack::new(&mut mem))
            .unwrap();

        assert_eq!(reconstruction_error(&before, &ldl), 0.0);
    }

    #[test]
    fn diagonal_update_matches_dense_rebuild() {
        let n = 12;
        let mut m = random_spd(n, 17);
        let mut mem = solve_stack(n);
        let mut ldl = Ldlt::<f64>::new();
        ldl.factorize(m.as_ref()).unwrap();

        let mut indices = [2usize, 9, 5];
        let alpha = Col::from_fn(3, |k| [0.7, -0.4, 2.5][k]);
        ldl.diagonal_update_clobber_indices(&mut indices, &alpha, MemStack::new(&mut mem))
            .unwrap();
        m[(2, 2)] += 0.7;
        m[(9, 9)] += -0.4;
        m[(5, 5)] += 2.5;

        assert!(reconstruction_error(&m, &ldl) < 1e-10 * m.norm_max());
        assert!(residual_norm(&m, &ldl, &mut mem) < 1e-10);
    }

    #[test]
    fn insert_then_delete_round_trips() {
        let n = 24;
        let r = 3;
        let pos = 7;
        let m = random_spd(n, 19);
        let mut mem = MemBuffer::new(StackReq::all_of(&[
            Ldlt::<f64>::solve_in_place_scratch(n + r),
            Ldlt::<f64>::insert_block_at_scratch(n, r),
            Ldlt::<f64>::delete_at_scratch(n + r),
        ]));
        let mut ldl = Ldlt::<f64>::new();
        ldl.factorize(m.as_ref()).unwrap();

        // Extension of the matrix with a block inserted at `pos`: rows in
        // post-insertion user order, diagonal block at rows pos..pos+r.
        let big = random_spd(n + r, 23);
        let ext = Mat::<f64>::from_fn(n + r, r, |i, k| {
            if (pos..pos + r).contains(&i) {
                big[(i, pos + k)]
            } else {
                0.3 * ((i * (k + 1)) as f64 * 0.11).sin()
            }
        });
        ldl.insert_block_at(pos, ext.as_ref(), MemStack::new(&mut mem))
            .unwrap();
        assert_eq!(ldl.dim(), n + r);

        // The reconstruction must embed the original matrix around the
        // inserted block.
        let rec = ldl.reconstructed();
        let mut expected = Mat::<f64>::zeros(n + r, n + r);
        let old = |t: usize| if t < pos { t } else { t - r };
        for i in 0..n + r {
            for j in 0..n + r {
                let bi = (pos..pos + r).contains(&i);
                let bj = (pos..pos + r).contains(&j);
                expected[(i, j)] = match (bi, bj) {
                    (true, _) => ext[(j, i - pos)],
                    (_, true) => ext[(i, j - pos)],
                    _ => m[(old(i), old(j))],
                };
            }
        }
        assert!((&rec - &expected).norm_max() < 1e-9 * expected.norm_max());

        // Solve against the extended matrix.
        let b = Col::from_fn(n + r, |i| 1.0 + (i as f64 * 0.3).cos());
        let mut x = b.clone();
        ldl.solve_in_place(&mut x, MemStack::new(&mut mem));
        assert!((&expected * &x - &b).norm_max() < 1e-10 * expected.norm_max());

        // Deleting the same rows restores the original factorization.
        let idx: Vec<usize> = (pos..pos + r).collect();
        ldl.delete_at(&idx, MemStack::new(&mut mem)).unwrap();
        assert_eq!(ldl.dim(), n);
        assert!(reconstruction_error(&m, &ldl) < 1e-9 * m.norm_max());
        assert!(residual_norm(&m, &ldl, &mut mem) < 1e-9);
    }

    #[test]
    fn delete_interior_rows() {
        let n = 9;
        let m = random_spd(n, 29);
        let mut mem = solve_stack(n);
        let mut ldl = Ldlt::<f64>::new();
        ldl.factorize(m.as_ref()).unwrap();

        ldl.delete_at(&[1, 4, 8], MemStack::new(&mut mem)).unwrap();
        assert_eq!(ldl.dim(), 6);

        let keep: Vec<usize> = (0..n).filter(|i| ![1, 4, 8].contains(i)).collect();
        let sub = Mat::<f64>::from_fn(6, 6, |i, j| m[(keep[i], keep[j])]);
        assert!(reconstruction_error(&sub, &ldl) < 1e-9 * sub.norm_max());
    }

    #[test]
    fn unsorted_deletion_is_rejected() {
        let n = 4;
        let m = random_spd(n, 31);
        let mut mem = solve_stack(n);
        let mut ldl = Ldlt::<f64>::new();
        ldl.factorize(m.as_ref()).unwrap();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            ldl.delete_at(&[2, 1], MemStack::new(&mut mem))
        }));
        match res {
            Ok(r) => assert_eq!(r, Err(FactorError::InvalidIndices)),
            // debug builds assert on sortedness first
            Err(_) => {}
        }
    }
}
