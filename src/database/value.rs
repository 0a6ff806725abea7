//! Result value hydration
//!
//! Turns positional Data API fields plus column metadata into labeled rows,
//! coercing decimals to numbers and date/time columns to UTC timestamps.

use super::error::HydrationError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use std::fmt;
use tracing::debug;

/// One wire value. Exactly one kind is present per field.
#[derive(Clone, Debug, PartialEq)]
pub enum Field {
    Blob(Vec<u8>),
    Double(f64),
    Null,
    Long(i64),
    String(String),
    Boolean(bool),
}

/// Declared column type, as far as hydration cares about it.
#[derive(Clone, Debug, PartialEq)]
pub enum DeclaredType {
    Decimal,
    Date,
    DateTime,
    Timestamp,
    Year,
    Other(String),
}

impl DeclaredType {
    pub fn from_type_name(type_name: &str) -> Self {
        match type_name.to_ascii_uppercase().as_str() {
            "DECIMAL" => DeclaredType::Decimal,
            "DATE" => DeclaredType::Date,
            "DATETIME" => DeclaredType::DateTime,
            "TIMESTAMP" => DeclaredType::Timestamp,
            "YEAR" => DeclaredType::Year,
            _ => DeclaredType::Other(type_name.to_string()),
        }
    }

    fn is_temporal(&self) -> bool {
        matches!(
            self,
            DeclaredType::Date | DeclaredType::DateTime | DeclaredType::Timestamp | DeclaredType::Year
        )
    }

    fn name(&self) -> &str {
        match self {
            DeclaredType::Decimal => "DECIMAL",
            DeclaredType::Date => "DATE",
            DeclaredType::DateTime => "DATETIME",
            DeclaredType::Timestamp => "TIMESTAMP",
            DeclaredType::Year => "YEAR",
            DeclaredType::Other(name) => name,
        }
    }
}

/// Column label and declared type, paired positionally with row fields.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDescriptor {
    pub label: String,
    pub declared_type: DeclaredType,
}

impl ColumnDescriptor {
    pub fn new(label: impl Into<String>, type_name: &str) -> Self {
        Self {
            label: label.into(),
            declared_type: DeclaredType::from_type_name(type_name),
        }
    }
}

/// Display-ready scalar.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Long(i64),
    Double(f64),
    Boolean(bool),
    Blob(Vec<u8>),
    Timestamp(DateTime<Utc>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::String(s) => write!(f, "{}", s),
            Value::Long(l) => write!(f, "{}", l),
            Value::Double(d) => write!(f, "{}", d),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Blob(bytes) => {
                write!(f, "0x")?;
                for byte in bytes {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }
}

/// A hydrated row: column label to value, in column order.
///
/// A label seen twice keeps its first position and takes the later value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HydratedRow {
    entries: Vec<(String, Value)>,
}

impl HydratedRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: &str, value: Value) {
        match self.entries.iter_mut().find(|(existing, _)| existing == label) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((label.to_string(), value)),
        }
    }

    #[cfg(test)]
    pub fn get(&self, label: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == label)
            .map(|(_, value)| value)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(label, _)| label.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, value)| value)
    }
}

/// Hydrate every record of a result set. The first bad field fails the whole call.
pub fn hydrate_records(
    records: &[Vec<Field>],
    columns: &[ColumnDescriptor],
) -> Result<Vec<HydratedRow>, HydrationError> {
    records
        .iter()
        .map(|record| hydrate_row(record, columns))
        .collect()
}

pub fn hydrate_row(
    record: &[Field],
    columns: &[ColumnDescriptor],
) -> Result<HydratedRow, HydrationError> {
    let mut row = HydratedRow::new();

    for (index, field) in record.iter().enumerate() {
        let column = columns.get(index).ok_or(HydrationError::MissingColumn {
            fields: record.len(),
            columns: columns.len(),
        })?;

        let value = coerce(extract(field), &column.declared_type);
        row.insert(&column.label, value);
    }

    Ok(row)
}

fn extract(field: &Field) -> Value {
    match field {
        Field::Blob(bytes) => Value::Blob(bytes.clone()),
        Field::Double(d) => Value::Double(*d),
        Field::Null => Value::Null,
        Field::Long(l) => Value::Long(*l),
        Field::String(s) => Value::String(s.clone()),
        Field::Boolean(b) => Value::Boolean(*b),
    }
}

fn coerce(value: Value, declared: &DeclaredType) -> Value {
    if value == Value::Null {
        return value;
    }

    match declared {
        DeclaredType::Decimal => to_number(value),
        t if t.is_temporal() => to_timestamp(value, t),
        _ => value,
    }
}

/// Unparseable decimals are kept as sent.
fn to_number(value: Value) -> Value {
    match value {
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(n) => Value::Double(n),
            Err(_) => {
                debug!(value = %s, "keeping unparseable DECIMAL as text");
                Value::String(s)
            }
        },
        Value::Boolean(b) => Value::Long(b as i64),
        other => other,
    }
}

/// Values that are not valid UTC timestamps (zero dates such as
/// `0000-00-00 00:00:00`) are kept as text.
fn to_timestamp(value: Value, declared: &DeclaredType) -> Value {
    let raw = match &value {
        Value::String(s) => s.clone(),
        Value::Long(l) => l.to_string(),
        _ => return value,
    };

    match parse_utc(&raw) {
        Some(ts) => Value::Timestamp(ts),
        None => {
            debug!(
                value = %raw,
                type_name = declared.name(),
                "keeping unparseable date/time as text"
            );
            Value::String(raw)
        }
    }
}

/// Interpret a server-formatted date/time string as UTC by appending a `Z`.
fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    let stamped = format!("{}Z", raw.trim());

    for format in ["%Y-%m-%d %H:%M:%S%.fZ", "%Y-%m-%dT%H:%M:%S%.fZ"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&stamped, format) {
            return Some(dt.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(&stamped, "%Y-%m-%dZ") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }

    // YEAR columns come back as a bare four digit year
    let year = stamped.strip_suffix('Z')?;
    if year.len() == 4 && year.bytes().all(|b| b.is_ascii_digit()) {
        let year: i32 = year.parse().ok()?;
        return NaiveDate::from_ymd_opt(year, 1, 1)?
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc());
    }

    None
}
