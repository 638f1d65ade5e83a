//! Error types for registration and expression parsing.

use sensewatch_types::{Metric, MetricGroup, ValueParseError};
use thiserror::Error;

use crate::expr::ConditionKind;

/// Errors from parsing a condition expression.
///
/// A failed parse never leaves a partial tree behind.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// Nothing to parse.
    #[error("Empty expression")]
    Empty,

    /// A closing bracket with no matching opening bracket.
    #[error("Unbalanced '{0}'")]
    Unbalanced(char),

    /// An opening bracket that was never closed.
    #[error("Unterminated '{0}'")]
    Unterminated(char),

    /// A reduction found fewer items than it needs.
    #[error("Stack underflow at '{0}'")]
    Underflow(char),

    /// A leaf with the wrong number of fields.
    #[error("Leaf has {0} fields, expected 3 or 5")]
    LeafArity(usize),

    /// A token where a sub-expression was expected, or vice versa.
    #[error("Unexpected token: {0}")]
    UnexpectedToken(String),

    #[error("Unknown condition: {0}")]
    UnknownCondition(String),

    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    /// A threshold or coordinate literal that does not parse.
    #[error("Bad literal: {0}")]
    BadLiteral(String),

    /// A scalar leaf on a coordinate metric, or a geo leaf on a scalar one.
    #[error("Leaf does not fit metric {0}")]
    KindMismatch(Metric),

    /// Geofences only support inside/outside conditions.
    #[error("Condition {0} is not supported on coordinates")]
    UnsupportedGeoCondition(ConditionKind),

    /// More than one expression at top level.
    #[error("Expected one root expression, found {0}")]
    LeftoverRoots(usize),
}

impl From<ValueParseError> for ParseError {
    fn from(err: ValueParseError) -> Self {
        ParseError::BadLiteral(err.literal)
    }
}

/// Errors reported synchronously by the registration API.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    #[error("Unknown metric: {0}")]
    UnknownMetric(Metric),

    /// The metric's kind cannot serve the request.
    #[error("Metric {0} does not support this request")]
    WrongKind(Metric),

    /// A published reading that is `NaN` or infinite.
    #[error("Non-finite reading for metric {0}")]
    NonFinite(Metric),

    #[error("Period must be positive")]
    ZeroPeriod,

    /// No acquisition source is configured for the metric's group.
    #[error("No service for metric group {0}")]
    Unsupported(MetricGroup),

    #[error("Invalid expression: {0}")]
    Parse(#[from] ParseError),

    /// The middleware tasks have shut down.
    #[error("Middleware stopped")]
    Stopped,
}

/// Errors from loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    /// A waveform keyed by a name that is not in the metric catalogue.
    #[error("Unknown metric in source settings: {0}")]
    UnknownMetric(String),

    /// The same group configured twice.
    #[error("Duplicate source for group {0}")]
    DuplicateGroup(MetricGroup),
}
