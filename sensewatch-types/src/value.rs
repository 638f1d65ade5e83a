//! Metric values.
//!
//! A reading is one of a closed set of scalar kinds, or a geographic
//! coordinate. Arithmetic and comparison are defined once on the sum type so
//! threshold offsets never need to inspect the concrete kind at the call
//! site.

use core::cmp::Ordering;
use core::fmt;
use core::ops::{Add, Sub};

use crate::MetricKind;

/// A scalar metric reading.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MetricValue {
    Long(i64),
    Int(i32),
    Float(f32),
    Double(f64),
    Byte(i8),
}

/// Error returned when a literal cannot be read as a given kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueParseError {
    pub kind: MetricKind,
    pub literal: String,
}

impl fmt::Display for ValueParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not a valid {:?} value", self.literal, self.kind)
    }
}

impl std::error::Error for ValueParseError {}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Long(_) => MetricKind::Long,
            MetricValue::Int(_) => MetricKind::Int,
            MetricValue::Float(_) => MetricKind::Float,
            MetricValue::Double(_) => MetricKind::Double,
            MetricValue::Byte(_) => MetricKind::Byte,
        }
    }

    /// The zero value of a scalar kind.
    pub fn zero(kind: MetricKind) -> Option<MetricValue> {
        Self::from_f64(kind, 0.0)
    }

    /// Parse a literal as the given kind.
    ///
    /// Integer kinds reject fractional literals; `Byte` rejects values outside
    /// `i8`. Floating kinds reject `NaN` and infinities.
    pub fn parse(kind: MetricKind, literal: &str) -> Result<MetricValue, ValueParseError> {
        let text = literal.trim();
        let parsed = match kind {
            MetricKind::Long => text.parse().ok().map(MetricValue::Long),
            MetricKind::Int => text.parse().ok().map(MetricValue::Int),
            MetricKind::Float => text.parse().ok().map(MetricValue::Float),
            MetricKind::Double => text.parse().ok().map(MetricValue::Double),
            MetricKind::Byte => text.parse().ok().map(MetricValue::Byte),
            MetricKind::Coordinate => None,
        };
        parsed.filter(MetricValue::is_finite).ok_or_else(|| ValueParseError {
            kind,
            literal: literal.to_string(),
        })
    }

    /// Convert an `f64` into a value of `kind`, saturating integer kinds.
    pub fn from_f64(kind: MetricKind, v: f64) -> Option<MetricValue> {
        match kind {
            MetricKind::Long => Some(MetricValue::Long(v as i64)),
            MetricKind::Int => Some(MetricValue::Int(v as i32)),
            MetricKind::Float => Some(MetricValue::Float(v as f32)),
            MetricKind::Double => Some(MetricValue::Double(v)),
            MetricKind::Byte => Some(MetricValue::Byte(v as i8)),
            MetricKind::Coordinate => None,
        }
    }

    /// False for `NaN` and infinite floating values.
    pub fn is_finite(&self) -> bool {
        match *self {
            MetricValue::Float(v) => v.is_finite(),
            MetricValue::Double(v) => v.is_finite(),
            _ => true,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            MetricValue::Long(v) => v as f64,
            MetricValue::Int(v) => v as f64,
            MetricValue::Float(v) => v as f64,
            MetricValue::Double(v) => v,
            MetricValue::Byte(v) => v as f64,
        }
    }

    fn coerce(self, kind: MetricKind) -> MetricValue {
        if self.kind() == kind {
            self
        } else {
            Self::from_f64(kind, self.as_f64()).unwrap_or(self)
        }
    }
}

/// `self + rhs`, in the kind of `self`. Integer kinds saturate.
impl Add for MetricValue {
    type Output = MetricValue;

    fn add(self, rhs: MetricValue) -> MetricValue {
        match (self, rhs.coerce(self.kind())) {
            (MetricValue::Long(a), MetricValue::Long(b)) => MetricValue::Long(a.saturating_add(b)),
            (MetricValue::Int(a), MetricValue::Int(b)) => MetricValue::Int(a.saturating_add(b)),
            (MetricValue::Byte(a), MetricValue::Byte(b)) => MetricValue::Byte(a.saturating_add(b)),
            (MetricValue::Float(a), MetricValue::Float(b)) => MetricValue::Float(a + b),
            (MetricValue::Double(a), MetricValue::Double(b)) => MetricValue::Double(a + b),
            (lhs, _) => lhs,
        }
    }
}

/// `self - rhs`, in the kind of `self`. Integer kinds saturate.
impl Sub for MetricValue {
    type Output = MetricValue;

    fn sub(self, rhs: MetricValue) -> MetricValue {
        match (self, rhs.coerce(self.kind())) {
            (MetricValue::Long(a), MetricValue::Long(b)) => MetricValue::Long(a.saturating_sub(b)),
            (MetricValue::Int(a), MetricValue::Int(b)) => MetricValue::Int(a.saturating_sub(b)),
            (MetricValue::Byte(a), MetricValue::Byte(b)) => MetricValue::Byte(a.saturating_sub(b)),
            (MetricValue::Float(a), MetricValue::Float(b)) => MetricValue::Float(a - b),
            (MetricValue::Double(a), MetricValue::Double(b)) => MetricValue::Double(a - b),
            (lhs, _) => lhs,
        }
    }
}

impl PartialEq for MetricValue {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for MetricValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (MetricValue::Long(a), MetricValue::Long(b)) => a.partial_cmp(b),
            (MetricValue::Int(a), MetricValue::Int(b)) => a.partial_cmp(b),
            (MetricValue::Float(a), MetricValue::Float(b)) => a.partial_cmp(b),
            (MetricValue::Double(a), MetricValue::Double(b)) => a.partial_cmp(b),
            (MetricValue::Byte(a), MetricValue::Byte(b)) => a.partial_cmp(b),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Long(v) => write!(f, "{}", v),
            MetricValue::Int(v) => write!(f, "{}", v),
            MetricValue::Float(v) => write!(f, "{}", v),
            MetricValue::Double(v) => write!(f, "{}", v),
            MetricValue::Byte(v) => write!(f, "{}", v),
        }
    }
}

/// Mean Earth radius used for distance computations.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance in meters (haversine).
    pub fn distance_m(&self, other: &Coordinate) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.lon - self.lon).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lon)
    }
}

/// Any value a metric can produce.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum SampleValue {
    Scalar(MetricValue),
    Coordinate(Coordinate),
}

impl SampleValue {
    pub fn as_scalar(&self) -> Option<MetricValue> {
        match self {
            SampleValue::Scalar(v) => Some(*v),
            SampleValue::Coordinate(_) => None,
        }
    }

    pub fn as_coordinate(&self) -> Option<Coordinate> {
        match self {
            SampleValue::Coordinate(c) => Some(*c),
            SampleValue::Scalar(_) => None,
        }
    }

    pub fn is_finite(&self) -> bool {
        match self {
            SampleValue::Scalar(v) => v.is_finite(),
            SampleValue::Coordinate(c) => c.lat.is_finite() && c.lon.is_finite(),
        }
    }

    /// Whether this value can be a reading of a metric of `kind`.
    pub fn fits(&self, kind: MetricKind) -> bool {
        match self {
            SampleValue::Scalar(v) => v.kind() == kind,
            SampleValue::Coordinate(_) => kind == MetricKind::Coordinate,
        }
    }
}

impl From<MetricValue> for SampleValue {
    fn from(v: MetricValue) -> Self {
        SampleValue::Scalar(v)
    }
}

impl From<Coordinate> for SampleValue {
    fn from(c: Coordinate) -> Self {
        SampleValue::Coordinate(c)
    }
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleValue::Scalar(v) => v.fmt(f),
            SampleValue::Coordinate(c) => c.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_respects_kind() {
        assert_eq!(
            MetricValue::parse(MetricKind::Long, "2000000"),
            Ok(MetricValue::Long(2_000_000))
        );
        assert!(MetricValue::parse(MetricKind::Int, "1.5").is_err());
        assert!(MetricValue::parse(MetricKind::Byte, "300").is_err());
        assert!(MetricValue::parse(MetricKind::Float, "abc").is_err());
        assert!(MetricValue::parse(MetricKind::Coordinate, "1").is_err());
    }

    #[test]
    fn parse_rejects_non_finite_floats() {
        for literal in ["NaN", "nan", "inf", "-inf", "infinity"] {
            assert!(MetricValue::parse(MetricKind::Float, literal).is_err(), "{}", literal);
            assert!(MetricValue::parse(MetricKind::Double, literal).is_err(), "{}", literal);
        }
        assert_eq!(
            MetricValue::parse(MetricKind::Double, "-0.25"),
            Ok(MetricValue::Double(-0.25))
        );
        assert!(!SampleValue::from(Coordinate::new(f64::NAN, 0.0)).is_finite());
        assert!(SampleValue::from(MetricValue::Long(i64::MAX)).is_finite());
    }

    #[test]
    fn arithmetic_keeps_lhs_kind() {
        let v = MetricValue::Float(125.0) + MetricValue::Float(5.0);
        assert_eq!(v, MetricValue::Float(130.0));
        assert_eq!(v.kind(), MetricKind::Float);

        let b = MetricValue::Byte(120) + MetricValue::Byte(20);
        assert_eq!(b, MetricValue::Byte(i8::MAX));

        let l = MetricValue::Long(10) - MetricValue::Int(3);
        assert_eq!(l.kind(), MetricKind::Long);
        assert_eq!(l, MetricValue::Long(7));
    }

    #[test]
    fn ordering_within_and_across_kinds() {
        assert!(MetricValue::Int(3) < MetricValue::Int(4));
        assert!(MetricValue::Long(5) > MetricValue::Double(4.5));
        assert_eq!(MetricValue::Byte(20), MetricValue::Int(20));
        assert_eq!(
            MetricValue::Double(f64::NAN).partial_cmp(&MetricValue::Double(1.0)),
            None
        );
    }

    #[test]
    fn haversine_distance() {
        let a = Coordinate::new(51.5007, -0.1246);
        let b = Coordinate::new(40.6892, -74.0445);
        let d = a.distance_m(&b);
        assert!((d - 5_574_840.0).abs() < 20_000.0, "{}", d);
        assert_eq!(a.distance_m(&a), 0.0);
    }

    #[test]
    fn sample_fits_kind() {
        assert!(SampleValue::from(MetricValue::Byte(1)).fits(MetricKind::Byte));
        assert!(!SampleValue::from(MetricValue::Byte(1)).fits(MetricKind::Int));
        assert!(SampleValue::from(Coordinate::new(0.0, 0.0)).fits(MetricKind::Coordinate));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_round_trip() {
        let v = SampleValue::from(MetricValue::Long(42));
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"{"long":42}"#);
        let back: SampleValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
