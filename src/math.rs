//! Small fixed-size matrices for uniform data.
//!
//! Matrices are row-major `f32` and [`bytemuck::Pod`], so they can be written
//! straight into a binding with [`crate::Kernel::write`].

use std::ops::{Add, Mul};

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix<const M: usize, const N: usize> {
    rows: [[f32; N]; M],
}

/// Column vector.
pub type Vector<const M: usize> = Matrix<M, 1>;

// Safety: a `#[repr(transparent)]` wrapper over nested `f32` arrays has no padding
// and every bit pattern is a valid value.
unsafe impl<const M: usize, const N: usize> bytemuck::Zeroable for Matrix<M, N> {}
unsafe impl<const M: usize, const N: usize> bytemuck::Pod for Matrix<M, N> {}

impl<const M: usize, const N: usize> Default for Matrix<M, N> {
    fn default() -> Self {
        Self::zeros()
    }
}

impl<const M: usize, const N: usize> Matrix<M, N> {
    pub const fn zeros() -> Self {
        Self {
            rows: [[0.0; N]; M],
        }
    }

    pub const fn from_rows(rows: [[f32; N]; M]) -> Self {
        Self { rows }
    }

    pub const fn dims() -> (usize, usize) {
        (M, N)
    }

    /// Element at row `m`, column `n`. Panics when out of range.
    pub fn at(&self, m: usize, n: usize) -> f32 {
        self.rows[m][n]
    }

    pub fn at_mut(&mut self, m: usize, n: usize) -> &mut f32 {
        &mut self.rows[m][n]
    }

    pub fn transpose(&self) -> Matrix<N, M> {
        let mut out = Matrix::<N, M>::zeros();
        for m in 0..M {
            for n in 0..N {
                out.rows[n][m] = self.rows[m][n];
            }
        }
        out
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

impl<const N: usize> Matrix<N, N> {
    pub fn identity() -> Self {
        let mut out = Self::zeros();
        for i in 0..N {
            out.rows[i][i] = 1.0;
        }
        out
    }
}

impl<const M: usize> Matrix<M, 1> {
    pub fn from_column(column: [f32; M]) -> Self {
        let mut out = Self::zeros();
        for (row, value) in out.rows.iter_mut().zip(column) {
            row[0] = value;
        }
        out
    }

    /// Euclidean length.
    pub fn length(&self) -> f32 {
        self.rows.iter().map(|row| row[0] * row[0]).sum::<f32>().sqrt()
    }
}

impl<const M: usize, const N: usize> Add for Matrix<M, N> {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        for (lhs_row, rhs_row) in self.rows.iter_mut().zip(rhs.rows) {
            for (lhs, rhs) in lhs_row.iter_mut().zip(rhs_row) {
                *lhs += rhs;
            }
        }
        self
    }
}

impl<const M: usize, const N: usize, const P: usize> Mul<Matrix<N, P>> for Matrix<M, N> {
    type Output = Matrix<M, P>;

    fn mul(self, rhs: Matrix<N, P>) -> Matrix<M, P> {
        let mut out = Matrix::<M, P>::zeros();
        for m in 0..M {
            for p in 0..P {
                out.rows[m][p] = (0..N).map(|n| self.rows[m][n] * rhs.rows[n][p]).sum();
            }
        }
        out
    }
}
