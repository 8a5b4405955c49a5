//! Row-major float matrices.

use std::ops::Deref;

use super::range::Range2D;
use super::vector::{Vector, VectorSlice};
use super::{CommandQueue, Device, ValueType};

/// A row-major float [`Vector`] with a `rows x columns` shape.
///
/// `rows * columns == len()` always holds. All [`Vector`] operations are
/// available through `Deref`.
#[derive(Debug)]
pub struct Matrix {
    vector: Vector,
    rows: usize,
    columns: usize,
}

impl Matrix {
    /// A zero-initialized matrix.
    pub fn new(device: &Device, rows: usize, columns: usize) -> Self {
        Self {
            vector: Vector::new(device, rows * columns, ValueType::Float),
            rows,
            columns,
        }
    }

    /// A matrix initialized from row-major host data.
    ///
    /// # Panics
    ///
    /// If `data` does not hold exactly `rows * columns` values.
    pub fn from_slice(device: &Device, rows: usize, columns: usize, data: &[f32]) -> Self {
        assert_eq!(
            rows * columns,
            data.len(),
            "{rows}x{columns} matrix initialized with {} values",
            data.len()
        );
        Self {
            vector: Vector::from_slice(device, data),
            rows,
            columns,
        }
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Row `i` as a borrowed window.
    #[must_use]
    pub fn row(&self, i: usize) -> VectorSlice<'_> {
        self.row_range(i, 1)
    }

    /// Rows `i..i + count` as one borrowed window.
    ///
    /// # Panics
    ///
    /// If the rows run past the end of the matrix.
    #[must_use]
    pub fn row_range(&self, i: usize, count: usize) -> VectorSlice<'_> {
        assert!(i < self.rows, "row {i} out of {} rows", self.rows);
        assert!(i + count <= self.rows, "rows {i}..{} out of {} rows", i + count, self.rows);
        self.vector.slice(i * self.columns, (i + count) * self.columns)
    }

    /// Overwrites the matrix with the identity pattern.
    pub fn identity(&self, queue: &CommandQueue) {
        let kernel = &self.device().tensor_kernels().matrix_identity;
        queue.enqueue_2d(
            &kernel.invoke().arg(self).arg(self.columns),
            Range2D::new([self.rows, self.columns]),
            None,
        );
    }

    /// Reallocates to a zeroed `rows x columns` matrix.
    pub fn resize(&mut self, rows: usize, columns: usize) {
        self.vector.resize(rows * columns);
        self.rows = rows;
        self.columns = columns;
    }

    /// The underlying vector.
    #[must_use]
    pub fn as_vector(&self) -> &Vector {
        &self.vector
    }
}

impl Deref for Matrix {
    type Target = Vector;

    fn deref(&self) -> &Vector {
        &self.vector
    }
}
