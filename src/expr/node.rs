//! Arena nodes of an expression tree.

use std::fmt;
use std::str::FromStr;

use sensewatch_types::MonitorId;
use tracing::warn;

use crate::schedule::Bound;

use super::geo::CoordinateLeaf;
use super::leaf::ConditionLeaf;

/// Index of a node in its tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Stable handle of an expression node across tasks.
///
/// Hubs key condition watches by this handle and hand it back on a crossing
/// so the event task can find the node again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConditionRef {
    pub tree: MonitorId,
    pub node: NodeId,
}

impl fmt::Display for ConditionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tree, self.node)
    }
}

/// Leaf condition types, with their wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionKind {
    /// Value moved by at least the threshold in either direction.
    Change = 1,
    /// Value rose by at least the threshold.
    UpThresh = 2,
    /// Value fell by at least the threshold.
    DownThresh = 3,
    /// Value reached or exceeded the threshold.
    MaxThresh = 4,
    /// Value reached or fell below the threshold.
    MinThresh = 5,
}

impl ConditionKind {
    pub const ALL: [ConditionKind; 5] = [
        ConditionKind::Change,
        ConditionKind::UpThresh,
        ConditionKind::DownThresh,
        ConditionKind::MaxThresh,
        ConditionKind::MinThresh,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            ConditionKind::Change => "CHANGE",
            ConditionKind::UpThresh => "UPTHRESH",
            ConditionKind::DownThresh => "DOWNTHRESH",
            ConditionKind::MaxThresh => "MAXTHRESH",
            ConditionKind::MinThresh => "MINTHRESH",
        }
    }
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConditionKind {
    type Err = ();

    /// Accepts the numeric code or the name, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|k| s.parse::<u8>().ok() == Some(k.code()) || s.eq_ignore_ascii_case(k.name()))
            .ok_or(())
    }
}

/// Boolean combinator of two sub-expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    And,
    Or,
}

impl Operator {
    pub fn name(self) -> &'static str {
        match self {
            Operator::And => "AND",
            Operator::Or => "OR",
        }
    }
}

impl FromStr for Operator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            t if t.eq_ignore_ascii_case("AND") => Ok(Operator::And),
            t if t.eq_ignore_ascii_case("OR") => Ok(Operator::Or),
            _ => Err(()),
        }
    }
}

const LEFT: u8 = 0b10;
const RIGHT: u8 = 0b01;

/// Internal node with exactly two children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combinator {
    pub op: Operator,
    pub left: NodeId,
    pub right: NodeId,
    /// Which children are currently true, `LEFT | RIGHT`.
    mask: u8,
}

impl Combinator {
    pub fn new(op: Operator, left: NodeId, right: NodeId) -> Self {
        Self {
            op,
            left,
            right,
            mask: 0,
        }
    }

    pub fn truth(&self) -> bool {
        match self.op {
            Operator::And => self.mask == LEFT | RIGHT,
            Operator::Or => self.mask != 0,
        }
    }

    pub fn child_state(&self, child: NodeId) -> Option<bool> {
        self.bit(child).map(|bit| self.mask & bit != 0)
    }

    fn bit(&self, child: NodeId) -> Option<u8> {
        if child == self.left {
            Some(LEFT)
        } else if child == self.right {
            Some(RIGHT)
        } else {
            None
        }
    }

    /// Record a child's new truth value.
    ///
    /// Returns the combinator's own new value only when it flipped.
    pub fn child_changed(&mut self, child: NodeId, triggered: bool) -> Option<bool> {
        let Some(bit) = self.bit(child) else {
            warn!(%child, "combinator notified by a node that is not its child");
            return None;
        };
        if !triggered && self.mask & bit == 0 {
            warn!(%child, "untrigger for a child that was not triggered");
            return None;
        }

        let before = self.truth();
        if triggered {
            self.mask |= bit;
        } else {
            self.mask &= !bit;
        }
        let after = self.truth();
        (before != after).then_some(after)
    }

    pub fn reset(&mut self) {
        self.mask = 0;
    }
}

/// What a node is.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Condition(ConditionLeaf),
    Coordinate(CoordinateLeaf),
    Combinator(Combinator),
}

/// One node of an expression tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprNode {
    pub active: bool,
    /// Current truth value of this sub-expression.
    pub state: bool,
    pub parent: Option<NodeId>,
    /// Evaluation cost; not used for scheduling yet.
    pub cost: u32,
    /// For a true scalar leaf, the side whose primary watch fired.
    pub fired: Option<Bound>,
    pub kind: ExprKind,
}

impl ExprNode {
    pub fn new(kind: ExprKind) -> Self {
        Self {
            active: false,
            state: false,
            parent: None,
            cost: 0,
            fired: None,
            kind,
        }
    }

    pub fn is_leaf(&self) -> bool {
        !matches!(self.kind, ExprKind::Combinator(_))
    }
}
