//! Runtime value model shared by expressions, storage hints, and the
//! catalog. Only the pieces the optimizer touches are represented here;
//! the execution engine owns the full datatype zoo.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A geographic point in lng/lat degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lng: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lng: f64, lat: f64) -> Self {
        GeoPoint { lng, lat }
    }
}

/// Geography shapes, WGS84 degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geography {
    Point(GeoPoint),
    LineString(Vec<GeoPoint>),
    Polygon(Vec<GeoPoint>),
}

impl Geography {
    pub fn is_point(&self) -> bool {
        matches!(self, Geography::Point(_))
    }

    /// Bounding box as (min_lng, min_lat, max_lng, max_lat).
    pub fn bounding_box(&self) -> (f64, f64, f64, f64) {
        let points: &[GeoPoint] = match self {
            Geography::Point(p) => std::slice::from_ref(p),
            Geography::LineString(ps) | Geography::Polygon(ps) => ps,
        };
        let mut bb = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        for p in points {
            bb.0 = bb.0.min(p.lng);
            bb.1 = bb.1.min(p.lat);
            bb.2 = bb.2.max(p.lng);
            bb.3 = bb.3.max(p.lat);
        }
        bb
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Geography(Geography),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    /// Whether the value coerces to a boolean in a filter position.
    pub fn is_implicit_bool(&self) -> bool {
        matches!(self, Value::Bool(_) | Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn is_str(&self) -> bool {
        matches!(self, Value::Str(_))
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_geography(&self) -> Option<&Geography> {
        match self {
            Value::Geography(g) => Some(g),
            _ => None,
        }
    }

    /// Total order within one scalar type, `None` across types. Numeric
    /// int/float mix compares through f64.
    pub fn partial_cmp_same_type(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                a.as_float().unwrap().partial_cmp(&b.as_float().unwrap())
            }
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}
