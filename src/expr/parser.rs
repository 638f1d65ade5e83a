//! Shift-reduce parser for condition expressions.
//!
//! ```text
//! expr  := leaf | geo | comb
//! leaf  := '[' condition ':' metric ':' threshold ']'
//! geo   := '[' condition ':' metric ':' lat ':' lon ':' radius ']'
//! comb  := '(' ('AND' | 'OR') ':' expr ':' expr ')'
//! ```
//!
//! Conditions are codes `1`-`5` or their names, metrics are catalogue ids or
//! names.

use sensewatch_types::{Coordinate, Metric, MetricKind, MetricValue};

use crate::error::ParseError;

use super::{
    Combinator, ConditionKind, ConditionLeaf, CoordinateLeaf, ExprKind, ExprNode, NodeId,
    Operator,
};

/// A parsed tree: the arena and the index of its root.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub nodes: Vec<ExprNode>,
    pub root: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open(char),
    Close(char),
    Word(String),
}

fn tokenize(input: &str) -> Vec<Token> {
    fn flush(word: &mut String, tokens: &mut Vec<Token>) {
        let trimmed = word.trim();
        if !trimmed.is_empty() {
            tokens.push(Token::Word(trimmed.to_string()));
        }
        word.clear();
    }

    let mut tokens = Vec::new();
    let mut word = String::new();
    for c in input.chars() {
        match c {
            '[' | '(' => {
                flush(&mut word, &mut tokens);
                tokens.push(Token::Open(c));
            }
            ']' | ')' => {
                flush(&mut word, &mut tokens);
                tokens.push(Token::Close(c));
            }
            ':' => flush(&mut word, &mut tokens),
            _ => word.push(c),
        }
    }
    flush(&mut word, &mut tokens);
    tokens
}

/// Item on the token stack.
#[derive(Debug)]
enum Shifted {
    Open(char),
    Word(String),
    /// A finished sub-expression; the node itself is on the node stack.
    Node,
}

/// Parse `input` into an expression arena.
///
/// `insertion` supplies the current value of a metric for relative
/// conditions; metrics without a value yet start from zero.
pub fn parse<F>(input: &str, insertion: F) -> Result<Parsed, ParseError>
where
    F: Fn(Metric) -> Option<MetricValue>,
{
    let tokens = tokenize(input);
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut arena: Vec<ExprNode> = Vec::new();
    let mut shifted: Vec<Shifted> = Vec::new();
    let mut built: Vec<NodeId> = Vec::new();

    for token in tokens {
        match token {
            Token::Open(c) => shifted.push(Shifted::Open(c)),
            Token::Word(w) => shifted.push(Shifted::Word(w)),
            Token::Close(']') => {
                let fields = pop_words(&mut shifted)?;
                let kind = build_leaf(&fields, &insertion)?;
                arena.push(ExprNode::new(kind));
                built.push(NodeId(arena.len() - 1));
                shifted.push(Shifted::Node);
            }
            Token::Close(_) => {
                let (op, left, right) = pop_combinator(&mut shifted, &mut built)?;
                let id = NodeId(arena.len());
                arena[left.0].parent = Some(id);
                arena[right.0].parent = Some(id);
                arena.push(ExprNode::new(ExprKind::Combinator(Combinator::new(
                    op, left, right,
                ))));
                built.push(id);
                shifted.push(Shifted::Node);
            }
        }
    }

    match shifted.as_slice() {
        [Shifted::Node] => {}
        items => {
            if let Some(Shifted::Open(c)) = items.iter().find(|s| matches!(s, Shifted::Open(_))) {
                return Err(ParseError::Unterminated(*c));
            }
            if let Some(Shifted::Word(w)) = items.iter().find(|s| matches!(s, Shifted::Word(_))) {
                return Err(ParseError::UnexpectedToken(w.clone()));
            }
            return Err(ParseError::LeftoverRoots(built.len()));
        }
    }

    let root = built.pop().ok_or(ParseError::Empty)?;
    Ok(Parsed { nodes: arena, root })
}

/// Pop the words of a leaf back to its opening bracket.
fn pop_words(shifted: &mut Vec<Shifted>) -> Result<Vec<String>, ParseError> {
    let start = match shifted.iter().rposition(|s| matches!(s, Shifted::Open(_))) {
        Some(i) if matches!(shifted[i], Shifted::Open('[')) => i,
        _ => return Err(ParseError::Unbalanced(']')),
    };

    let mut words = Vec::new();
    for item in shifted.drain(start..).skip(1) {
        match item {
            Shifted::Word(w) => words.push(w),
            _ => return Err(ParseError::UnexpectedToken("nested expression in leaf".into())),
        }
    }
    Ok(words)
}

/// Pop `( op node node` and return the operator and both children.
fn pop_combinator(
    shifted: &mut Vec<Shifted>,
    built: &mut Vec<NodeId>,
) -> Result<(Operator, NodeId, NodeId), ParseError> {
    let (second, first, keyword, open) = match (shifted.pop(), shifted.pop(), shifted.pop(), shifted.pop())
    {
        (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
        (None, ..) if built.is_empty() => return Err(ParseError::Unbalanced(')')),
        _ => return Err(ParseError::Underflow(')')),
    };

    match (open, keyword, first, second) {
        (Shifted::Open('('), Shifted::Word(word), Shifted::Node, Shifted::Node) => {
            let op = match word.parse::<Operator>() {
                Ok(op) => op,
                Err(()) => return Err(ParseError::UnknownOperator(word)),
            };
            let right = built.pop().ok_or(ParseError::Underflow(')'))?;
            let left = built.pop().ok_or(ParseError::Underflow(')'))?;
            Ok((op, left, right))
        }
        (Shifted::Open('['), ..) => Err(ParseError::Unterminated('[')),
        (_, Shifted::Word(w), _, _) if w.parse::<Operator>().is_err() => {
            Err(ParseError::UnknownOperator(w))
        }
        _ => Err(ParseError::Underflow(')')),
    }
}

fn build_leaf<F>(fields: &[String], insertion: &F) -> Result<ExprKind, ParseError>
where
    F: Fn(Metric) -> Option<MetricValue>,
{
    let (condition, metric) = match fields {
        [c, m, ..] => (c, m),
        _ => return Err(ParseError::LeafArity(fields.len())),
    };
    let condition: ConditionKind = condition
        .parse()
        .map_err(|_| ParseError::UnknownCondition(condition.clone()))?;
    let metric = Metric::lookup(metric).ok_or_else(|| ParseError::UnknownMetric(metric.clone()))?;
    let kind = metric
        .kind()
        .ok_or_else(|| ParseError::UnknownMetric(metric.to_string()))?;

    match (fields.len(), kind) {
        (3, MetricKind::Coordinate) | (5, MetricKind::Long)
        | (5, MetricKind::Int)
        | (5, MetricKind::Float)
        | (5, MetricKind::Double)
        | (5, MetricKind::Byte) => Err(ParseError::KindMismatch(metric)),
        (3, kind) => {
            let threshold = MetricValue::parse(kind, &fields[2])?;
            let base = insertion(metric)
                .filter(|v| v.kind() == kind)
                .unwrap_or(threshold - threshold);
            Ok(ExprKind::Condition(ConditionLeaf::new(
                condition, metric, threshold, base,
            )))
        }
        (5, _) => {
            let number = |s: &String| {
                s.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| ParseError::BadLiteral(s.clone()))
            };
            let center = Coordinate::new(number(&fields[2])?, number(&fields[3])?);
            let radius = number(&fields[4])?;
            if radius <= 0.0 {
                return Err(ParseError::BadLiteral(fields[4].clone()));
            }
            CoordinateLeaf::new(condition, metric, center, radius)
                .map(ExprKind::Coordinate)
                .ok_or(ParseError::UnsupportedGeoCondition(condition))
        }
        (n, _) => Err(ParseError::LeafArity(n)),
    }
}
