extern crate nalgebra as na;

use crate::vector::{Orientation, SharedVector};
use parking_lot::RwLock;
use std::sync::Arc;

/// A 2-D matrix stored as an ordered list of shared vector slots.
///
/// Depending on how it was loaded, each slot is either one full row
/// (row-major) or one full column (column-major). Load operations replace
/// the whole slot list; row-level tasks then mutate individual slots in
/// place through their own locks.
///
/// There is deliberately no cached orientation field. A row task may
/// transpose an individual vector without telling the matrix, so the only
/// trustworthy answer to "how is this matrix laid out right now" comes from
/// inspecting slot 0 — which is what [`SharedMatrix::orientation`] and
/// [`SharedMatrix::read_row_major`] do.
///
/// # Example
///
/// ```rust
/// use lae::matrix::SharedMatrix;
/// use nalgebra as na;
///
/// let m = SharedMatrix::new();
/// m.load_column_major(&na::DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
/// assert_eq!(m.len(), 3); // three column slots
/// assert_eq!(m.read_row_major()[(1, 2)], 6.0);
/// ```
pub struct SharedMatrix {
    slots: RwLock<Vec<Arc<SharedVector>>>,
}

impl SharedMatrix {
    /// Creates an empty matrix with no slots.
    pub fn new() -> Self {
        SharedMatrix {
            slots: RwLock::new(Vec::new()),
        }
    }

    /// Creates a matrix pre-loaded row-major from `matrix`.
    pub fn from_matrix(matrix: &na::DMatrix<f64>) -> Self {
        let shared = SharedMatrix::new();
        shared.load_row_major(matrix);
        shared
    }

    /// Replaces all slots so that each slot holds one full row.
    pub fn load_row_major(&self, matrix: &na::DMatrix<f64>) {
        let mut slots = Vec::with_capacity(matrix.nrows());
        for i in 0..matrix.nrows() {
            let row = na::DVector::from_fn(matrix.ncols(), |j, _| matrix[(i, j)]);
            slots.push(Arc::new(SharedVector::new(row, Orientation::Row)));
        }
        *self.slots.write() = slots;
    }

    /// Replaces all slots so that each slot holds one full column.
    ///
    /// This is an eager transpose-copy: the input is still given row-major,
    /// and every resulting slot is one contiguous column of it. Loading the
    /// right operand of a multiplication this way makes each row's result a
    /// plain dot product against a contiguous buffer.
    pub fn load_column_major(&self, matrix: &na::DMatrix<f64>) {
        let mut slots = Vec::with_capacity(matrix.ncols());
        for j in 0..matrix.ncols() {
            let column = na::DVector::from_fn(matrix.nrows(), |i, _| matrix[(i, j)]);
            slots.push(Arc::new(SharedVector::new(column, Orientation::Column)));
        }
        *self.slots.write() = slots;
    }

    /// Returns the slot at `index`, if any.
    pub fn get(&self, index: usize) -> Option<Arc<SharedVector>> {
        self.slots.read().get(index).cloned()
    }

    /// Returns a snapshot of the current slot list.
    pub fn vectors(&self) -> Vec<Arc<SharedVector>> {
        self.slots.read().clone()
    }

    /// Returns the number of stored slots.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Returns the actual orientation, derived from slot 0.
    ///
    /// An empty matrix reports [`Orientation::Row`].
    pub fn orientation(&self) -> Orientation {
        self.slots
            .read()
            .first()
            .map(|v| v.orientation())
            .unwrap_or(Orientation::Row)
    }

    /// Reconstructs the matrix as a row-major [`na::DMatrix`].
    ///
    /// Read locks on every slot are held for the whole reconstruction, so
    /// the result is a consistent snapshot even against concurrent writers;
    /// the guards are released on every path when they drop. The true
    /// layout is sampled from slot 0 rather than trusted from load time,
    /// because row tasks may have transposed the slots in the meantime: a
    /// row-oriented slot 0 means the slots can be copied out directly,
    /// while a column-oriented slot 0 means the data is transposed back
    /// into row-major form in memory.
    pub fn read_row_major(&self) -> na::DMatrix<f64> {
        let slots = self.slots.read();
        if slots.is_empty() {
            return na::DMatrix::zeros(0, 0);
        }

        let guards: Vec<_> = slots.iter().map(|v| v.read()).collect();

        match guards[0].orientation {
            Orientation::Row => {
                let rows = guards.len();
                let cols = guards[0].values.len();
                na::DMatrix::from_fn(rows, cols, |i, j| guards[i].values[j])
            }
            Orientation::Column => {
                let cols = guards.len();
                let rows = guards[0].values.len();
                na::DMatrix::from_fn(rows, cols, |i, j| guards[j].values[i])
            }
        }
    }
}

impl Default for SharedMatrix {
    fn default() -> Self {
        SharedMatrix::new()
    }
}
