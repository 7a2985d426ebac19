//! Integration tests for the shared vector/matrix layer: locking-safe
//! arithmetic, orientation handling and the load/read round-trip laws.

extern crate nalgebra as na;

use std::sync::Arc;

use lae::error::EngineError;
use lae::matrix::SharedMatrix;
use lae::vector::{Orientation, SharedVector};

fn matrix(rows: usize, cols: usize, data: &[f64]) -> na::DMatrix<f64> {
    na::DMatrix::from_row_slice(rows, cols, data)
}

#[test]
fn vector_basic_operations() {
    let v1 = SharedVector::from_slice(&[1.0, 2.0, 3.0], Orientation::Row);
    let v2 = SharedVector::from_slice(&[4.0, 5.0, 6.0], Orientation::Row);

    // 1*4 + 2*5 + 3*6
    assert_eq!(v1.dot(&v2).unwrap(), 32.0);

    v1.add(&v2).unwrap();
    assert_eq!(v1.values().as_slice(), &[5.0, 7.0, 9.0]);

    v2.negate();
    assert_eq!(v2.values().as_slice(), &[-4.0, -5.0, -6.0]);
}

#[test]
fn add_is_commutative_elementwise() {
    let a = SharedVector::from_slice(&[1.5, -2.0, 0.25], Orientation::Row);
    let b = SharedVector::from_slice(&[4.0, 0.5, -8.0], Orientation::Row);
    let a2 = SharedVector::from_slice(&[1.5, -2.0, 0.25], Orientation::Row);
    let b2 = SharedVector::from_slice(&[4.0, 0.5, -8.0], Orientation::Row);

    a.add(&b).unwrap();
    b2.add(&a2).unwrap();
    assert_eq!(a.values(), b2.values());
}

#[test]
fn dot_is_commutative() {
    let a = SharedVector::from_slice(&[1.5, -2.0, 0.25], Orientation::Row);
    let b = SharedVector::from_slice(&[4.0, 0.5, -8.0], Orientation::Column);
    assert_eq!(a.dot(&b).unwrap(), b.dot(&a).unwrap());
}

#[test]
fn double_negation_restores_the_vector() {
    let v = SharedVector::from_slice(&[1.0, -2.0, 3.5], Orientation::Row);
    v.negate();
    v.negate();
    assert_eq!(v.values().as_slice(), &[1.0, -2.0, 3.5]);
}

#[test]
fn transpose_flips_only_the_orientation_tag() {
    let v = SharedVector::from_slice(&[1.0, 2.0], Orientation::Row);
    v.transpose();
    assert_eq!(v.orientation(), Orientation::Column);
    assert_eq!(v.values().as_slice(), &[1.0, 2.0]);

    v.transpose();
    assert_eq!(v.orientation(), Orientation::Row);
}

#[test]
fn get_checks_bounds() {
    let v = SharedVector::from_slice(&[1.0, 2.0], Orientation::Row);
    assert_eq!(v.get(1).unwrap(), 2.0);
    assert_eq!(
        v.get(2),
        Err(EngineError::IndexOutOfBounds { index: 2, len: 2 })
    );
}

#[test]
fn add_rejects_mismatched_lengths() {
    let v1 = SharedVector::from_slice(&[1.0, 2.0], Orientation::Row);
    let v2 = SharedVector::from_slice(&[1.0, 2.0, 3.0], Orientation::Row);
    assert!(matches!(
        v1.add(&v2),
        Err(EngineError::DimensionMismatch(_))
    ));
}

#[test]
fn row_major_load_and_read_round_trip() {
    let data = matrix(2, 2, &[1.0, 2.0, 3.0, 4.0]);
    let m = SharedMatrix::from_matrix(&data);

    assert_eq!(m.orientation(), Orientation::Row);
    assert_eq!(m.len(), 2);
    assert_eq!(m.read_row_major(), data);
}

#[test]
fn column_major_load_and_read_round_trip() {
    let data = matrix(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let m = SharedMatrix::new();
    m.load_column_major(&data);

    // Three column slots of length two.
    assert_eq!(m.orientation(), Orientation::Column);
    assert_eq!(m.len(), 3);
    assert_eq!(m.get(0).unwrap().len(), 2);

    assert_eq!(m.read_row_major(), data);
}

#[test]
fn empty_matrix_reads_back_empty() {
    let m = SharedMatrix::new();
    let result = m.read_row_major();
    assert_eq!(result.shape(), (0, 0));
}

#[test]
fn vec_mat_mul_with_column_major_matrix() {
    let v = SharedVector::from_slice(&[1.0, 2.0], Orientation::Row);
    let m = SharedMatrix::new();
    m.load_column_major(&matrix(2, 2, &[3.0, 4.0, 5.0, 6.0]));

    // [1,2]·[3,5] = 13 and [1,2]·[4,6] = 16
    v.vec_mat_mul(&m).unwrap();
    assert_eq!(v.values().as_slice(), &[13.0, 16.0]);
}

#[test]
fn vec_mat_mul_with_row_major_matrix() {
    let v = SharedVector::from_slice(&[1.0, 2.0], Orientation::Row);
    let m = SharedMatrix::new();
    m.load_row_major(&matrix(2, 2, &[3.0, 4.0, 5.0, 6.0]));

    v.vec_mat_mul(&m).unwrap();
    assert_eq!(v.values().as_slice(), &[13.0, 16.0]);
}

#[test]
fn vec_mat_mul_result_is_layout_independent() {
    let data = matrix(3, 4, &[
        0.5, -1.0, 2.0, 7.0, //
        3.0, 0.0, -2.5, 1.0, //
        4.0, 8.0, 1.5, -0.5,
    ]);

    let row_loaded = SharedMatrix::new();
    row_loaded.load_row_major(&data);
    let col_loaded = SharedMatrix::new();
    col_loaded.load_column_major(&data);

    let a = SharedVector::from_slice(&[1.0, -2.0, 0.5], Orientation::Row);
    let b = SharedVector::from_slice(&[1.0, -2.0, 0.5], Orientation::Row);

    a.vec_mat_mul(&row_loaded).unwrap();
    b.vec_mat_mul(&col_loaded).unwrap();
    assert_eq!(a.values(), b.values());
}

#[test]
fn vec_mat_mul_rejects_mismatched_dimensions() {
    let v = SharedVector::from_slice(&[1.0, 2.0, 3.0], Orientation::Row);
    let m = SharedMatrix::new();
    m.load_column_major(&matrix(2, 2, &[1.0, 2.0, 3.0, 4.0]));
    assert!(matches!(
        v.vec_mat_mul(&m),
        Err(EngineError::DimensionMismatch(_))
    ));
}

#[test]
fn matrix_orientation_is_derived_from_slot_zero() {
    let data = matrix(2, 2, &[1.0, 2.0, 3.0, 4.0]);
    let m = SharedMatrix::from_matrix(&data);
    assert_eq!(m.orientation(), Orientation::Row);

    // Row tasks may transpose individual slots behind the matrix's back;
    // the matrix must notice when reading back.
    for v in m.vectors() {
        v.transpose();
    }
    assert_eq!(m.orientation(), Orientation::Column);
    assert_eq!(m.read_row_major(), data.transpose());
}

#[test]
fn concurrent_row_adds_reach_the_expected_sum() {
    let target = Arc::new(SharedVector::from_slice(&[0.0; 64], Orientation::Row));
    let ones = Arc::new(SharedVector::from_slice(&[1.0; 64], Orientation::Row));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let target = Arc::clone(&target);
            let ones = Arc::clone(&ones);
            std::thread::spawn(move || {
                for _ in 0..100 {
                    target.add(&ones).unwrap();
                    // Snapshot reads interleave freely with the writers.
                    let _ = target.values();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(target.values().iter().all(|&x| x == 800.0));
}
