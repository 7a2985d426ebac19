extern crate nalgebra as na;

use crate::error::EngineError;

/// The matrix operation an operator node is waiting to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Add,
    Multiply,
    Negate,
    Transpose,
}

impl OpKind {
    /// Number of children the operator requires after normalization.
    pub fn arity(self) -> usize {
        match self {
            OpKind::Add | OpKind::Multiply => 2,
            OpKind::Negate | OpKind::Transpose => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OpKind::Add => "ADD",
            OpKind::Multiply => "MULTIPLY",
            OpKind::Negate => "NEGATE",
            OpKind::Transpose => "TRANSPOSE",
        }
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A node of the mutable expression tree the engine resolves in place.
///
/// A node is either a `Leaf` carrying a concrete matrix, or an `Operator`
/// carrying a pending operation and its ordered operand sub-trees.
/// Resolution is a one-way transition: once all of an operator's children
/// are leaves, the engine computes its value and the node becomes a leaf,
/// dropping the children. When the root itself is a leaf, the computation
/// is done.
///
/// The tree is a plain owned enum rather than an index arena: children are
/// owned by their parent, so the operator-to-leaf transition simply drops
/// them and no ownership cycles can arise.
///
/// # Example
///
/// ```rust
/// use lae::tree::{ComputationNode, OpKind};
/// use nalgebra as na;
///
/// let a = ComputationNode::leaf(na::DMatrix::from_row_slice(1, 2, &[1.0, 2.0]));
/// let b = ComputationNode::leaf(na::DMatrix::from_row_slice(1, 2, &[3.0, 4.0]));
/// let mut sum = ComputationNode::operator(OpKind::Add, vec![a, b]);
/// sum.associative_nesting().unwrap();
/// assert!(sum.find_resolvable().is_some());
/// ```
pub enum ComputationNode {
    Leaf(na::DMatrix<f64>),
    Operator {
        op: OpKind,
        children: Vec<ComputationNode>,
    },
}

impl ComputationNode {
    /// Creates a leaf node holding a concrete matrix.
    pub fn leaf(matrix: na::DMatrix<f64>) -> Self {
        ComputationNode::Leaf(matrix)
    }

    /// Creates an operator node over the given ordered operands.
    pub fn operator(op: OpKind, children: Vec<ComputationNode>) -> Self {
        ComputationNode::Operator { op, children }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, ComputationNode::Leaf(_))
    }

    /// Returns the matrix if this node is a leaf.
    pub fn matrix(&self) -> Option<&na::DMatrix<f64>> {
        match self {
            ComputationNode::Leaf(matrix) => Some(matrix),
            ComputationNode::Operator { .. } => None,
        }
    }

    /// Consumes the node, returning the matrix if it is a leaf.
    pub fn into_matrix(self) -> Option<na::DMatrix<f64>> {
        match self {
            ComputationNode::Leaf(matrix) => Some(matrix),
            ComputationNode::Operator { .. } => None,
        }
    }

    /// Rewrites every n-ary ADD/MULTIPLY into a left-deep binary chain.
    ///
    /// `op(a, b, c, d)` becomes `op(op(op(a, b), c), d)`, preserving the
    /// original left-to-right operand order — matrix multiplication is
    /// associative but not commutative, so the order must survive the
    /// rewrite. The pass is idempotent; an already binary tree comes out
    /// unchanged.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The whole tree is binary and arity-valid
    /// * `Err(EngineError::Arity)` - Some operator still has the wrong
    ///   child count (e.g. a unary ADD or a binary NEGATE)
    pub fn associative_nesting(&mut self) -> Result<(), EngineError> {
        self.nest();
        self.validate_arity()
    }

    fn nest(&mut self) {
        if let ComputationNode::Operator { op, children } = self {
            for child in children.iter_mut() {
                child.nest();
            }
            let binary = matches!(op, OpKind::Add | OpKind::Multiply);
            if binary && children.len() > 2 {
                let op = *op;
                let mut operands = std::mem::take(children).into_iter();
                let first = operands.next().expect("operand");
                let second = operands.next().expect("operand");
                let mut chain = ComputationNode::operator(op, vec![first, second]);
                for next in operands {
                    chain = ComputationNode::operator(op, vec![chain, next]);
                }
                *self = chain;
            }
        }
    }

    fn validate_arity(&self) -> Result<(), EngineError> {
        if let ComputationNode::Operator { op, children } = self {
            if children.len() != op.arity() {
                return Err(EngineError::Arity {
                    op: op.name(),
                    expected: op.arity(),
                    found: children.len(),
                });
            }
            for child in children {
                child.validate_arity()?;
            }
        }
        Ok(())
    }

    /// Finds the first operator node whose children are all leaves.
    ///
    /// The traversal is deterministic: depth-first, parent before children,
    /// children left to right. Returns `None` when the tree is a single
    /// leaf — or when no operator is resolvable, which for a well-formed
    /// tree cannot happen and is treated as an error by the engine.
    pub fn find_resolvable(&mut self) -> Option<&mut ComputationNode> {
        if self.is_resolvable() {
            return Some(self);
        }
        match self {
            ComputationNode::Leaf(_) => None,
            ComputationNode::Operator { children, .. } => {
                children.iter_mut().find_map(|child| child.find_resolvable())
            }
        }
    }

    fn is_resolvable(&self) -> bool {
        match self {
            ComputationNode::Leaf(_) => false,
            ComputationNode::Operator { children, .. } => {
                children.iter().all(|child| child.is_leaf())
            }
        }
    }

    /// Turns this operator node into a leaf carrying `matrix`.
    ///
    /// The children are dropped; the transition is irreversible.
    pub fn resolve(&mut self, matrix: na::DMatrix<f64>) {
        *self = ComputationNode::Leaf(matrix);
    }
}
