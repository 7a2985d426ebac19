extern crate nalgebra as na;

use crate::error::EngineError;
use parking_lot::{RwLock, RwLockReadGuard};

/// Whether a one-dimensional buffer stands for a row slice or a column
/// slice of the logical matrix that owns it.
///
/// Orientation is a property of interpretation, not of storage: transposing
/// a vector flips this tag and never touches the numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Row,
    Column,
}

impl Orientation {
    pub fn flipped(self) -> Self {
        match self {
            Orientation::Row => Orientation::Column,
            Orientation::Column => Orientation::Row,
        }
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Orientation::Row => write!(f, "row"),
            Orientation::Column => write!(f, "column"),
        }
    }
}

pub(crate) struct VectorData {
    pub(crate) values: na::DVector<f64>,
    pub(crate) orientation: Orientation,
}

/// A fixed-length buffer of doubles behind one reader-writer lock.
///
/// Every accessor takes the read lock for the duration of the access and
/// every mutator takes the write lock, so many readers or exactly one
/// writer can touch the buffer at any time. Operations that involve a
/// second vector never hold two locks at once: the other side is snapshot
/// under its own read lock first and the arithmetic then runs against the
/// private copy. This keeps two vectors that concurrently write into each
/// other out of the deadlock business entirely.
///
/// # Example
///
/// ```rust
/// use lae::vector::{Orientation, SharedVector};
///
/// let v = SharedVector::from_slice(&[1.0, 2.0], Orientation::Row);
/// let w = SharedVector::from_slice(&[3.0, 4.0], Orientation::Row);
/// assert_eq!(v.dot(&w).unwrap(), 11.0);
/// ```
pub struct SharedVector {
    data: RwLock<VectorData>,
}

impl SharedVector {
    /// Creates a shared vector owning `values` with the given orientation.
    pub fn new(values: na::DVector<f64>, orientation: Orientation) -> Self {
        SharedVector {
            data: RwLock::new(VectorData { values, orientation }),
        }
    }

    /// Creates a shared vector from a plain slice.
    pub fn from_slice(values: &[f64], orientation: Orientation) -> Self {
        SharedVector::new(na::DVector::from_row_slice(values), orientation)
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, VectorData> {
        self.data.read()
    }

    /// Returns the element at `index`.
    ///
    /// # Returns
    ///
    /// * `Ok(f64)` - The element value
    /// * `Err(EngineError::IndexOutOfBounds)` - If `index` is past the end
    pub fn get(&self, index: usize) -> Result<f64, EngineError> {
        let data = self.data.read();
        if index >= data.values.len() {
            return Err(EngineError::IndexOutOfBounds {
                index,
                len: data.values.len(),
            });
        }
        Ok(data.values[index])
    }

    /// Returns the number of elements in the vector.
    pub fn len(&self) -> usize {
        self.data.read().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the current orientation tag.
    pub fn orientation(&self) -> Orientation {
        self.data.read().orientation
    }

    /// Returns a snapshot copy of the full buffer.
    ///
    /// The copy is taken under the read lock, so it is internally
    /// consistent, and the lock is released before the snapshot is handed
    /// back. Use this whenever a whole-row view is needed without holding
    /// the lock across subsequent work.
    pub fn values(&self) -> na::DVector<f64> {
        self.data.read().values.clone()
    }

    /// Flips the orientation tag in place.
    ///
    /// Transposition is a property of how the owning matrix interprets the
    /// vector; the underlying data is never reordered.
    pub fn transpose(&self) {
        let mut data = self.data.write();
        data.orientation = data.orientation.flipped();
    }

    /// Negates every element in place.
    pub fn negate(&self) {
        let mut data = self.data.write();
        data.values.neg_mut();
    }

    /// Adds `other` into this vector element-wise.
    ///
    /// `other` is snapshot under its read lock before this vector's write
    /// lock is taken, so at most one lock is ever held.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Elements accumulated in place
    /// * `Err(EngineError::DimensionMismatch)` - If lengths differ
    pub fn add(&self, other: &SharedVector) -> Result<(), EngineError> {
        let rhs = other.values();
        let mut data = self.data.write();
        if data.values.len() != rhs.len() {
            return Err(EngineError::dims(
                "vector add length",
                data.values.len(),
                rhs.len(),
            ));
        }
        data.values += &rhs;
        Ok(())
    }

    /// Computes the dot product of this vector with `other`.
    ///
    /// Symmetric in its operands: `a.dot(&b) == b.dot(&a)`.
    ///
    /// # Returns
    ///
    /// * `Ok(f64)` - The sum of element-wise products
    /// * `Err(EngineError::DimensionMismatch)` - If lengths differ
    pub fn dot(&self, other: &SharedVector) -> Result<f64, EngineError> {
        let rhs = other.values();
        let data = self.data.read();
        if data.values.len() != rhs.len() {
            return Err(EngineError::dims(
                "dot product length",
                data.values.len(),
                rhs.len(),
            ));
        }
        Ok(data.values.dot(&rhs))
    }

    /// Replaces this vector with `self (as a row) × matrix`.
    ///
    /// This vector is write-locked for the whole computation, so the caller
    /// must guarantee that it is not itself a slot of `matrix` (the engine
    /// always multiplies the left scratch matrix into the right one, never
    /// a matrix into itself).
    ///
    /// The operand's storage layout picks the strategy, and both strategies
    /// produce identical results for the same logical matrix:
    ///
    /// - Column slots: `result[j] = self · column_j`, one read-locked
    ///   column snapshot per column.
    /// - Row slots: `result += self[i] * row_i`, one read-locked snapshot
    ///   per row so the accumulation loop itself runs lock-free.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - This vector now holds the product row
    /// * `Err(EngineError::DimensionMismatch)` - If this vector's length
    ///   does not match the matrix's row count
    pub fn vec_mat_mul(&self, matrix: &crate::matrix::SharedMatrix) -> Result<(), EngineError> {
        let slots = matrix.vectors();
        let mut data = self.data.write();

        match matrix.orientation() {
            Orientation::Column => {
                let cols = slots.len();
                let mut result = na::DVector::zeros(cols);
                for (j, column) in slots.iter().enumerate() {
                    let column_values = column.values();
                    if column_values.len() != data.values.len() {
                        return Err(EngineError::dims(
                            "vector length vs matrix rows",
                            data.values.len(),
                            column_values.len(),
                        ));
                    }
                    result[j] = data.values.dot(&column_values);
                }
                data.values = result;
            }
            Orientation::Row => {
                let rows = slots.len();
                if rows == 0 {
                    return Ok(());
                }
                if data.values.len() != rows {
                    return Err(EngineError::dims(
                        "vector length vs matrix rows",
                        data.values.len(),
                        rows,
                    ));
                }
                let cols = slots[0].len();
                let mut result = na::DVector::zeros(cols);
                for (i, row) in slots.iter().enumerate() {
                    let scalar = data.values[i];
                    let row_values = row.values();
                    if row_values.len() != cols {
                        return Err(EngineError::dims("matrix row length", cols, row_values.len()));
                    }
                    result.axpy(scalar, &row_values, 1.0);
                }
                data.values = result;
            }
        }
        Ok(())
    }
}
