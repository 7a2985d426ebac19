//! lae
//!
//! This library implements a concurrent linear algebra engine. Matrices are
//! held as collections of individually lock-protected row (or column)
//! vectors, operations on them are decomposed into row-level tasks, and the
//! tasks are dispatched to a fixed pool of worker threads scheduled by a
//! custom "fatigue" policy that always hands the next task to the
//! least-worked idle worker.
//!
//! # Functionality
//!
//! - Shared, reader-writer-locked vectors and matrices
//! - Row-parallel add, multiply, negate and transpose
//! - A fatigue-weighted worker pool with a synchronous batch barrier
//! - Computation-tree normalization and bottom-up resolution
//! - Per-worker usage reporting
//!
//! The expected call sequence is: build a [`tree::ComputationNode`] (the
//! input parser lives outside this crate), normalize it with
//! [`tree::ComputationNode::associative_nesting`], then hand it to
//! [`engine::LinearAlgebraEngine::run`]. Once the root has collapsed into a
//! leaf, its matrix can be read out and written by whatever output layer
//! sits on top.

/// Engine orchestration: tree resolution driving the worker pool.
pub mod engine;

/// Error types shared across the crate.
pub mod error;

/// The fatigue-aware worker pool.
pub mod executor;

/// Shared matrices built from lock-protected vector slots.
pub mod matrix;

/// Computation trees of pending matrix operations.
pub mod tree;

/// Lock-protected shared vectors and their arithmetic.
pub mod vector;
