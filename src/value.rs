//! Bindable parameter values and their literal SQL rendering.

use std::fmt;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sea_orm::Value;

/// A date or time value bound to a placeholder.
///
/// Its canonical string form is chrono's `Display` output, e.g.
/// `2024-03-01 09:30:00 +00:00` for a zoned timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Temporal {
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeTz(DateTime<FixedOffset>),
}

impl fmt::Display for Temporal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Temporal::Date(d) => write!(f, "{}", d),
            Temporal::Time(t) => write!(f, "{}", t),
            Temporal::DateTime(dt) => write!(f, "{}", dt),
            Temporal::DateTimeTz(dt) => write!(f, "{}", dt),
        }
    }
}

/// An optional column value: `None` means the validity flag is false.
#[derive(Debug, Clone, PartialEq)]
pub enum Nullable {
    Text(Option<String>),
    Time(Option<Temporal>),
    Int(Option<i64>),
    UInt(Option<u64>),
    Float(Option<f64>),
    Bool(Option<bool>),
    Bytes(Option<Vec<u8>>),
}

impl Nullable {
    /// Whether the wrapper carries a value.
    pub fn is_valid(&self) -> bool {
        match self {
            Nullable::Text(v) => v.is_some(),
            Nullable::Time(v) => v.is_some(),
            Nullable::Int(v) => v.is_some(),
            Nullable::UInt(v) => v.is_some(),
            Nullable::Float(v) => v.is_some(),
            Nullable::Bool(v) => v.is_some(),
            Nullable::Bytes(v) => v.is_some(),
        }
    }
}

/// One argument bound to a positional placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bytes(Vec<u8>),
    Text(String),
    Time(Temporal),
    Nullable(Nullable),
    /// A value whose concrete type is not known to the renderer.
    Opaque,
}

impl SqlValue {
    /// Render this value as literal SQL text.
    ///
    /// Text and time values are single-quoted verbatim, without escaping.
    /// Invalid nullable wrappers and opaque values render as `NULL`.
    pub fn to_literal(&self) -> String {
        match self {
            SqlValue::Text(s) => quoted(s),
            SqlValue::Time(t) => quoted(t),
            SqlValue::Nullable(n) => match n {
                Nullable::Text(Some(s)) => quoted(s),
                Nullable::Time(Some(t)) => quoted(t),
                Nullable::Int(Some(i)) => i.to_string(),
                Nullable::UInt(Some(u)) => u.to_string(),
                Nullable::Float(Some(x)) => x.to_string(),
                Nullable::Bool(Some(b)) => b.to_string(),
                Nullable::Bytes(Some(b)) => format!("{:?}", b),
                _ => NULL.to_string(),
            },
            SqlValue::Bool(b) => b.to_string(),
            SqlValue::Int(i) => i.to_string(),
            SqlValue::UInt(u) => u.to_string(),
            SqlValue::Float(x) => x.to_string(),
            SqlValue::Bytes(b) => format!("{:?}", b),
            SqlValue::Opaque => NULL.to_string(),
        }
    }
}

const NULL: &str = "NULL";

fn quoted(value: impl fmt::Display) -> String {
    format!("'{}'", value)
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_literal())
    }
}

macro_rules! impl_from_scalar {
    ($variant:ident, $nullable:ident, $target:ty: $($source:ty),+) => {
        $(
            impl From<$source> for SqlValue {
                fn from(v: $source) -> Self {
                    SqlValue::$variant(<$target>::from(v))
                }
            }

            impl From<Option<$source>> for SqlValue {
                fn from(v: Option<$source>) -> Self {
                    SqlValue::Nullable(Nullable::$nullable(v.map(<$target>::from)))
                }
            }
        )+
    };
}

impl_from_scalar!(Bool, Bool, bool: bool);
impl_from_scalar!(Int, Int, i64: i8, i16, i32, i64);
impl_from_scalar!(UInt, UInt, u64: u8, u16, u32, u64);
impl_from_scalar!(Float, Float, f64: f32, f64);
impl_from_scalar!(Text, Text, String: String, &str, char);
impl_from_scalar!(Bytes, Bytes, Vec<u8>: Vec<u8>, &[u8]);
impl_from_scalar!(Time, Time, Temporal: NaiveDate, NaiveTime, NaiveDateTime, DateTime<FixedOffset>, DateTime<Utc>, DateTime<Local>);

impl From<NaiveDate> for Temporal {
    fn from(d: NaiveDate) -> Self {
        Temporal::Date(d)
    }
}

impl From<NaiveTime> for Temporal {
    fn from(t: NaiveTime) -> Self {
        Temporal::Time(t)
    }
}

impl From<NaiveDateTime> for Temporal {
    fn from(dt: NaiveDateTime) -> Self {
        Temporal::DateTime(dt)
    }
}

impl From<DateTime<FixedOffset>> for Temporal {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        Temporal::DateTimeTz(dt)
    }
}

impl From<DateTime<Utc>> for Temporal {
    fn from(dt: DateTime<Utc>) -> Self {
        Temporal::DateTimeTz(dt.fixed_offset())
    }
}

impl From<DateTime<Local>> for Temporal {
    fn from(dt: DateTime<Local>) -> Self {
        Temporal::DateTimeTz(dt.fixed_offset())
    }
}

/// SeaORM keeps every column value behind an `Option`, so each one maps onto
/// a [`Nullable`] case. Variants that only exist behind other SeaORM features
/// are [`SqlValue::Opaque`].
impl From<&Value> for SqlValue {
    fn from(value: &Value) -> Self {
        let nullable = match value {
            Value::Bool(v) => Nullable::Bool(*v),
            Value::TinyInt(v) => Nullable::Int(v.map(i64::from)),
            Value::SmallInt(v) => Nullable::Int(v.map(i64::from)),
            Value::Int(v) => Nullable::Int(v.map(i64::from)),
            Value::BigInt(v) => Nullable::Int(*v),
            Value::TinyUnsigned(v) => Nullable::UInt(v.map(u64::from)),
            Value::SmallUnsigned(v) => Nullable::UInt(v.map(u64::from)),
            Value::Unsigned(v) => Nullable::UInt(v.map(u64::from)),
            Value::BigUnsigned(v) => Nullable::UInt(*v),
            Value::Float(v) => Nullable::Float(v.map(f64::from)),
            Value::Double(v) => Nullable::Float(*v),
            Value::String(v) => Nullable::Text(v.as_deref().cloned()),
            Value::Char(v) => Nullable::Text(v.map(String::from)),
            Value::Bytes(v) => Nullable::Bytes(v.as_deref().cloned()),
            Value::ChronoDate(v) => Nullable::Time(v.as_deref().copied().map(Temporal::from)),
            Value::ChronoTime(v) => Nullable::Time(v.as_deref().copied().map(Temporal::from)),
            Value::ChronoDateTime(v) => {
                Nullable::Time(v.as_deref().copied().map(Temporal::from))
            }
            Value::ChronoDateTimeUtc(v) => {
                Nullable::Time(v.as_deref().copied().map(Temporal::from))
            }
            Value::ChronoDateTimeLocal(v) => {
                Nullable::Time(v.as_deref().copied().map(Temporal::from))
            }
            Value::ChronoDateTimeWithTimeZone(v) => {
                Nullable::Time(v.as_deref().copied().map(Temporal::from))
            }
            #[allow(unreachable_patterns)]
            _ => return SqlValue::Opaque,
        };
        SqlValue::Nullable(nullable)
    }
}

impl From<Value> for SqlValue {
    fn from(value: Value) -> Self {
        SqlValue::from(&value)
    }
}
