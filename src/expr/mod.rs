//! Condition expressions.
//!
//! An expression is parsed into an arena of [`ExprNode`]s owned by a
//! [`ConditionTree`]. Leaves arm threshold or fence watches through a
//! [`ConditionPort`]; when a watch fires the leaf flips and the change climbs
//! through the AND/OR combinators until one of them does not flip or the
//! root is reached.

pub mod builder;
mod geo;
mod leaf;
mod node;
pub mod parser;
mod port;
mod tree;

pub use geo::{CoordinateLeaf, FENCE_MARGIN_M};
pub use leaf::ConditionLeaf;
pub use node::{Combinator, ConditionKind, ConditionRef, ExprKind, ExprNode, NodeId, Operator};
pub use port::ConditionPort;
pub use tree::{ConditionTree, Disposition, Flavor, RootSignal};
