extern crate nalgebra as na;

use crate::error::EngineError;
use crate::executor::{Task, TiredExecutor};
use crate::matrix::SharedMatrix;
use crate::tree::{ComputationNode, OpKind};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Per-invocation scratch state: the two operand matrices a resolution
/// step loads, mutates row by row, and reads back.
///
/// Built fresh inside [`LinearAlgebraEngine::run`] so two runs can never
/// share (and corrupt) scratch buffers, and handed down explicitly instead
/// of living on the engine.
struct Scratch {
    left: Arc<SharedMatrix>,
    right: Arc<SharedMatrix>,
}

impl Scratch {
    fn new() -> Self {
        Scratch {
            left: Arc::new(SharedMatrix::new()),
            right: Arc::new(SharedMatrix::new()),
        }
    }
}

/// The evaluation engine: drives a computation tree to a single leaf by
/// repeatedly materializing the next resolvable node as row-parallel tasks
/// on the worker pool.
///
/// One resolution step loads the node's operands into scratch matrices,
/// builds one task per row, pushes the batch through the pool's barrier,
/// reads the consolidated result back and folds it into the tree. Shape
/// and arity are validated before any task is created, so dimension errors
/// surface synchronously and nothing half-computed is left behind.
///
/// `run` takes `&mut self`: an engine instance processes at most one tree
/// at a time, and the borrow checker enforces it.
///
/// # Example
///
/// ```rust
/// use lae::engine::LinearAlgebraEngine;
/// use lae::tree::{ComputationNode, OpKind};
/// use nalgebra as na;
///
/// let a = ComputationNode::leaf(na::DMatrix::from_row_slice(1, 2, &[1.0, 2.0]));
/// let b = ComputationNode::leaf(na::DMatrix::from_row_slice(1, 2, &[3.0, 4.0]));
/// let mut root = ComputationNode::operator(OpKind::Add, vec![a, b]);
/// root.associative_nesting().unwrap();
///
/// let mut engine = LinearAlgebraEngine::new(2);
/// engine.run(&mut root).unwrap();
/// assert_eq!(root.matrix().unwrap()[(0, 1)], 6.0);
/// engine.shutdown();
/// ```
pub struct LinearAlgebraEngine {
    executor: TiredExecutor,
}

impl LinearAlgebraEngine {
    /// Creates an engine backed by `num_workers` worker threads.
    ///
    /// # Panics
    ///
    /// Panics if `num_workers` is zero.
    pub fn new(num_workers: usize) -> Self {
        LinearAlgebraEngine {
            executor: TiredExecutor::new(num_workers),
        }
    }

    /// Resolves the tree in place until the root is a single leaf.
    ///
    /// The caller is expected to have normalized the tree with
    /// [`ComputationNode::associative_nesting`] first; un-nested n-ary
    /// operators are rejected here with an arity error.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The root is now a leaf carrying the final matrix
    /// * `Err(_)` - A shape, arity or task failure; remaining resolution is
    ///   aborted and the tree is left partially resolved. The engine stays
    ///   usable and must still be shut down.
    pub fn run(&mut self, root: &mut ComputationNode) -> Result<(), EngineError> {
        let scratch = Scratch::new();
        let started = Instant::now();

        while !root.is_leaf() {
            let node = root.find_resolvable().ok_or(EngineError::UnresolvableTree)?;
            self.load_and_compute(node, &scratch)?;
        }

        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "tree resolved");
        Ok(())
    }

    /// Resolves one operator node whose children are all leaves.
    fn load_and_compute(
        &self,
        node: &mut ComputationNode,
        scratch: &Scratch,
    ) -> Result<(), EngineError> {
        let ComputationNode::Operator { op, children } = &*node else {
            // find_resolvable never hands out leaves.
            return Err(EngineError::UnresolvableTree);
        };
        let op = *op;

        if children.len() != op.arity() {
            return Err(EngineError::Arity {
                op: op.name(),
                expected: op.arity(),
                found: children.len(),
            });
        }

        let left = children[0].matrix().ok_or(EngineError::UnresolvableTree)?;
        debug!(%op, rows = left.nrows(), cols = left.ncols(), "resolving node");

        // Dimension checks and the result shape, before anything is loaded
        // or scheduled.
        let result_shape = match op {
            OpKind::Add => {
                let right = children[1].matrix().ok_or(EngineError::UnresolvableTree)?;
                if left.shape() != right.shape() {
                    return Err(EngineError::dims(
                        "ADD operand shapes",
                        format!("{}x{}", left.nrows(), left.ncols()),
                        format!("{}x{}", right.nrows(), right.ncols()),
                    ));
                }
                left.shape()
            }
            OpKind::Multiply => {
                let right = children[1].matrix().ok_or(EngineError::UnresolvableTree)?;
                if left.ncols() != right.nrows() {
                    return Err(EngineError::dims(
                        "MULTIPLY left columns vs right rows",
                        left.ncols(),
                        right.nrows(),
                    ));
                }
                (left.nrows(), right.ncols())
            }
            OpKind::Negate => left.shape(),
            OpKind::Transpose => (left.ncols(), left.nrows()),
        };

        // A zero-row or zero-column result has no row tasks to run and
        // would read back from the empty scratch matrix as 0x0; resolve it
        // directly so the logical shape survives.
        let (result_rows, result_cols) = result_shape;
        if result_rows == 0 || result_cols == 0 {
            node.resolve(na::DMatrix::zeros(result_rows, result_cols));
            return Ok(());
        }

        let tasks = match op {
            OpKind::Add => {
                let right = children[1].matrix().ok_or(EngineError::UnresolvableTree)?;
                scratch.left.load_row_major(left);
                scratch.right.load_row_major(right);
                self.add_tasks(scratch)
            }
            OpKind::Multiply => {
                let right = children[1].matrix().ok_or(EngineError::UnresolvableTree)?;
                scratch.left.load_row_major(left);
                scratch.right.load_column_major(right);
                self.multiply_tasks(scratch)
            }
            OpKind::Negate => {
                scratch.left.load_row_major(left);
                self.negate_tasks(scratch)
            }
            OpKind::Transpose => {
                scratch.left.load_row_major(left);
                self.transpose_tasks(scratch)
            }
        };

        self.executor.submit_all(tasks)?;

        let result = scratch.left.read_row_major();
        node.resolve(result);
        Ok(())
    }

    /// One task per row: `left[i] += right[i]`.
    fn add_tasks(&self, scratch: &Scratch) -> Vec<Task> {
        let left = scratch.left.vectors();
        let right = scratch.right.vectors();
        left.into_iter()
            .zip(right)
            .map(|(row, other)| Box::new(move || row.add(&other)) as Task)
            .collect()
    }

    /// One task per row: `left[i] = left[i] × right`.
    fn multiply_tasks(&self, scratch: &Scratch) -> Vec<Task> {
        scratch
            .left
            .vectors()
            .into_iter()
            .map(|row| {
                let right = Arc::clone(&scratch.right);
                Box::new(move || row.vec_mat_mul(&right)) as Task
            })
            .collect()
    }

    /// One task per row: element-wise sign flip.
    fn negate_tasks(&self, scratch: &Scratch) -> Vec<Task> {
        scratch
            .left
            .vectors()
            .into_iter()
            .map(|row| {
                Box::new(move || {
                    row.negate();
                    Ok(())
                }) as Task
            })
            .collect()
    }

    /// One task per row: flip the row's orientation tag. The read-back in
    /// [`SharedMatrix::read_row_major`] then performs the physical
    /// transposition.
    fn transpose_tasks(&self, scratch: &Scratch) -> Vec<Task> {
        scratch
            .left
            .vectors()
            .into_iter()
            .map(|row| {
                Box::new(move || {
                    row.transpose();
                    Ok(())
                }) as Task
            })
            .collect()
    }

    /// Returns the executor's per-worker usage report.
    pub fn worker_report(&self) -> String {
        self.executor.worker_report()
    }

    /// Shuts the worker pool down, blocking until every worker has drained.
    pub fn shutdown(self) {
        self.executor.shutdown();
    }
}
