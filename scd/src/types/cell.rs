use std::fmt;

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use uuid::Uuid;

/// A single typed column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Numeric(BigDecimal),
    String(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Uuid(Uuid),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
}

/// Hashable form of a non-null [`Cell`] used for key matching and value comparison.
///
/// Integers of every width, integral numerics and integral floats collapse into
/// [`NormalizedValue::Int`] so that a key stored as `bigint` on one side matches the same
/// key stored as `integer` or `numeric` on the other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NormalizedValue {
    Bool(bool),
    Int(i64),
    /// Non-integral numeric in normalized decimal text form.
    Decimal(String),
    /// Bit pattern of a non-integral float, `-0.0` folded into `0.0`.
    Float(u64),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Uuid(Uuid),
    Json(String),
    Bytes(Vec<u8>),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Returns the normalized value, or `None` for [`Cell::Null`].
    pub fn normalized(&self) -> Option<NormalizedValue> {
        let value = match self {
            Cell::Null => return None,
            Cell::Bool(value) => NormalizedValue::Bool(*value),
            Cell::I16(value) => NormalizedValue::Int(i64::from(*value)),
            Cell::I32(value) => NormalizedValue::Int(i64::from(*value)),
            Cell::I64(value) => NormalizedValue::Int(*value),
            Cell::F32(value) => normalize_float(f64::from(*value)),
            Cell::F64(value) => normalize_float(*value),
            Cell::Numeric(value) => normalize_numeric(value),
            Cell::String(value) => NormalizedValue::Text(value.clone()),
            Cell::Date(value) => NormalizedValue::Date(*value),
            Cell::Time(value) => NormalizedValue::Time(*value),
            Cell::Timestamp(value) => NormalizedValue::Timestamp(*value),
            Cell::TimestampTz(value) => NormalizedValue::TimestampTz(*value),
            Cell::Uuid(value) => NormalizedValue::Uuid(*value),
            Cell::Json(value) => NormalizedValue::Json(value.to_string()),
            Cell::Bytes(value) => NormalizedValue::Bytes(value.clone()),
        };

        Some(value)
    }

    /// Null-aware inequality, with the semantics of SQL `is distinct from`.
    ///
    /// Two nulls are not distinct, a null and a value are distinct, and two values are
    /// distinct when their normalized forms differ.
    ///
    /// Only numeric widths are reconciled. A `timestamp` never equals a `timestamptz`, and a
    /// `json` value never equals its text rendering, so source and target columns holding
    /// such pairs report every matched row as changed. Align the column types, or cast in
    /// the source table, when a pair like this has to be compared.
    pub fn is_distinct_from(&self, other: &Cell) -> bool {
        self.normalized() != other.normalized()
    }
}

fn normalize_float(value: f64) -> NormalizedValue {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        return NormalizedValue::Int(value as i64);
    }

    let value = if value == 0.0 { 0.0 } else { value };
    NormalizedValue::Float(value.to_bits())
}

fn normalize_numeric(value: &BigDecimal) -> NormalizedValue {
    if value.is_integer() {
        if let Ok(int) = i64::try_from(value.with_scale(0).into_bigint_and_exponent().0) {
            return NormalizedValue::Int(int);
        }
    }

    NormalizedValue::Decimal(value.normalized().to_string())
}

/// Renders the value the way Postgres renders it as `text`, nulls render as an empty
/// string.
impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Bool(value) => write!(f, "{value}"),
            Cell::I16(value) => write!(f, "{value}"),
            Cell::I32(value) => write!(f, "{value}"),
            Cell::I64(value) => write!(f, "{value}"),
            Cell::F32(value) => write!(f, "{value}"),
            Cell::F64(value) => write!(f, "{value}"),
            Cell::Numeric(value) => write!(f, "{value}"),
            Cell::String(value) => f.write_str(value),
            Cell::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            Cell::Time(value) => write!(f, "{value}"),
            Cell::Timestamp(value) => write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S%.f")),
            Cell::TimestampTz(value) => {
                write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S%.f%:z"))
            }
            Cell::Uuid(value) => write!(f, "{value}"),
            Cell::Json(value) => write!(f, "{value}"),
            Cell::Bytes(value) => {
                f.write_str("\\x")?;
                for byte in value {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Cell::Bool(value)
    }
}

impl From<i32> for Cell {
    fn from(value: i32) -> Self {
        Cell::I32(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::I64(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::F64(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::String(value.to_owned())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::String(value)
    }
}

impl From<NaiveDate> for Cell {
    fn from(value: NaiveDate) -> Self {
        Cell::Date(value)
    }
}

impl<T> From<Option<T>> for Cell
where
    T: Into<Cell>,
{
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Null)
    }
}
