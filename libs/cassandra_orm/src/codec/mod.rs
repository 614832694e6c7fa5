//! Marshalling between declared column types and driver values
//!
//! Encoding takes a type spec (`text`, `set<int>`, `frozen<map<text,int>>`, ...)
//! and a [`PlainValue`] and produces the driver's [`CqlValue`]. Decoding is
//! total: every driver value maps back to a plain value, falling back to a
//! string form for categories without a dedicated representation.

mod literal;
mod record;
mod type_spec;
mod value;

pub use record::Record;
pub use type_spec::TypeSpec;
pub use value::{ConversionError, FromPlain, PlainValue, ToPlain};

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use scylla::value::{CqlDate, CqlTime, CqlTimestamp, CqlTimeuuid, CqlValue, Counter};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use uuid::Uuid;

use crate::common::TypeError;

/// Scalar names with a dedicated encoding; values of the wrong shape for
/// these are rejected instead of being passed through.
const KNOWN_SCALARS: &[&str] = &[
    "ascii", "bigint", "blob", "boolean", "counter", "date", "decimal", "double", "duration",
    "float", "inet", "int", "smallint", "text", "time", "timestamp", "timeuuid", "tinyint", "uuid",
    "varchar", "varint",
];

const NUMERIC_SCALARS: &[&str] = &[
    "bigint", "counter", "decimal", "double", "float", "int", "smallint", "tinyint", "varint",
];

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const CQL_DATE_EPOCH_OFFSET: i64 = 1 << 31;

static SHARED: Lazy<TypeCodec> = Lazy::new(TypeCodec::new);

/// Type codec with a cache of parsed type specs.
///
/// Type specs are static per field, so each distinct spec string is parsed
/// once and reused.
#[derive(Debug, Default)]
pub struct TypeCodec {
    specs: RwLock<HashMap<String, Arc<TypeSpec>>>,
}

impl TypeCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide codec instance
    pub fn shared() -> &'static TypeCodec {
        &SHARED
    }

    /// Parse `type_spec`, reusing a previous parse of the same string.
    pub fn parse(&self, type_spec: &str) -> Result<Arc<TypeSpec>, TypeError> {
        if let Some(spec) = self.specs.read().get(type_spec) {
            return Ok(Arc::clone(spec));
        }

        let spec = Arc::new(TypeSpec::parse(type_spec)?);
        self.specs
            .write()
            .insert(type_spec.to_string(), Arc::clone(&spec));
        Ok(spec)
    }

    pub fn encode(&self, type_spec: &str, value: &PlainValue) -> Result<CqlValue, TypeError> {
        let spec = self.parse(type_spec)?;
        encode(&spec, value)
    }

    pub fn cached_specs(&self) -> usize {
        self.specs.read().len()
    }
}

/// Encode `value` against a parsed type spec.
///
/// Already-native values pass through untouched at every nesting level,
/// except a bare `Uuid`/`Int` bound to a `timeuuid` or wider numeric column.
pub fn encode(spec: &TypeSpec, value: &PlainValue) -> Result<CqlValue, TypeError> {
    if let PlainValue::Native(native) = value {
        return match (spec, native) {
            // bare uuids and 32-bit ints arrive as natives; a sibling column
            // type re-encodes them
            (TypeSpec::Scalar(name), CqlValue::Uuid(_)) if name == "timeuuid" => {
                encode_scalar(name, &decode(native))
            }
            (TypeSpec::Scalar(name), CqlValue::Int(_))
                if name != "int" && NUMERIC_SCALARS.contains(&name.as_str()) =>
            {
                encode_scalar(name, &decode(native))
            }
            _ => Ok(native.clone()),
        };
    }
    if value.is_null() {
        return Err(TypeError::new(
            spec.to_string(),
            "null cannot be encoded; absent values must be omitted",
        ));
    }

    match spec {
        TypeSpec::Scalar(name) => encode_scalar(name, value),
        TypeSpec::Set(inner) => match value {
            PlainValue::List(items) => items
                .iter()
                .map(|item| encode(inner, item))
                .collect::<Result<Vec<_>, _>>()
                .map(CqlValue::Set),
            other => Err(shape_error(spec, "a list of values", other)),
        },
        TypeSpec::List(inner) => match value {
            PlainValue::List(items) => items
                .iter()
                .map(|item| encode(inner, item))
                .collect::<Result<Vec<_>, _>>()
                .map(CqlValue::List),
            other => Err(shape_error(spec, "a list of values", other)),
        },
        TypeSpec::Map(key_spec, value_spec) => match value {
            PlainValue::Map(entries) => entries
                .iter()
                .map(|(k, v)| Ok((encode(key_spec, k)?, encode(value_spec, v)?)))
                .collect::<Result<Vec<_>, TypeError>>()
                .map(CqlValue::Map),
            other => Err(shape_error(spec, "a map of key/value pairs", other)),
        },
    }
}

fn shape_error(spec: &TypeSpec, expected: &str, found: &PlainValue) -> TypeError {
    TypeError::new(
        spec.to_string(),
        format!("expected {expected}, found {}", found.kind()),
    )
}

fn encode_scalar(name: &str, value: &PlainValue) -> Result<CqlValue, TypeError> {
    let invalid = |details: String| TypeError::new(name, details);

    let encoded = match (name, value) {
        ("text" | "varchar", PlainValue::Text(s)) => CqlValue::Text(s.clone()),
        ("ascii", PlainValue::Text(s)) if s.is_ascii() => CqlValue::Ascii(s.clone()),
        ("uuid", PlainValue::Text(s)) => CqlValue::Uuid(parse_uuid(name, s)?),
        ("timeuuid", PlainValue::Text(s)) => {
            CqlValue::Timeuuid(CqlTimeuuid::from(parse_uuid(name, s)?))
        }
        ("int", PlainValue::Int(i)) => CqlValue::Int(
            i32::try_from(*i).map_err(|_| invalid(format!("{i} is out of range")))?,
        ),
        ("smallint", PlainValue::Int(i)) => CqlValue::SmallInt(
            i16::try_from(*i).map_err(|_| invalid(format!("{i} is out of range")))?,
        ),
        ("tinyint", PlainValue::Int(i)) => CqlValue::TinyInt(
            i8::try_from(*i).map_err(|_| invalid(format!("{i} is out of range")))?,
        ),
        ("bigint", PlainValue::Int(i)) => CqlValue::BigInt(*i),
        ("counter", PlainValue::Int(i)) => CqlValue::Counter(Counter(*i)),
        ("float", PlainValue::Float(f)) => CqlValue::Float(*f as f32),
        ("float", PlainValue::Int(i)) => CqlValue::Float(*i as f32),
        ("double", PlainValue::Float(f)) => CqlValue::Double(*f),
        ("double", PlainValue::Int(i)) => CqlValue::Double(*i as f64),
        ("varint", PlainValue::Int(i)) => CqlValue::Varint(literal::varint_from_i64(*i)),
        ("varint", PlainValue::Text(s)) => {
            CqlValue::Varint(literal::parse_varint(s).map_err(invalid)?)
        }
        ("decimal", PlainValue::Int(i)) => CqlValue::Decimal(literal::decimal_from_i64(*i)),
        ("decimal", PlainValue::Float(f)) if f.is_finite() => {
            CqlValue::Decimal(literal::parse_decimal(&f.to_string()).map_err(invalid)?)
        }
        ("decimal", PlainValue::Text(s)) => {
            CqlValue::Decimal(literal::parse_decimal(s).map_err(invalid)?)
        }
        ("duration", PlainValue::Text(s)) => {
            CqlValue::Duration(literal::parse_duration(s).map_err(invalid)?)
        }
        ("boolean", PlainValue::Bool(b)) => CqlValue::Boolean(*b),
        ("timestamp", PlainValue::Timestamp(ts)) => {
            CqlValue::Timestamp(CqlTimestamp(ts.timestamp_millis()))
        }
        ("timestamp", PlainValue::Int(millis)) => CqlValue::Timestamp(CqlTimestamp(*millis)),
        ("blob", PlainValue::Bytes(bytes)) => CqlValue::Blob(bytes.clone()),
        ("inet", PlainValue::Text(s)) => CqlValue::Inet(
            s.parse::<IpAddr>()
                .map_err(|e| invalid(format!("'{s}' is not an address: {e}")))?,
        ),
        ("date", PlainValue::Text(s)) => {
            let date = NaiveDate::parse_from_str(s, DATE_FORMAT)
                .map_err(|e| invalid(format!("'{s}' is not a date: {e}")))?;
            CqlValue::Date(encode_date(date))
        }
        ("time", PlainValue::Text(s)) => {
            let time = NaiveTime::parse_from_str(s, TIME_FORMAT)
                .map_err(|e| invalid(format!("'{s}' is not a time: {e}")))?;
            CqlValue::Time(encode_time(time))
        }
        (known, other) if KNOWN_SCALARS.contains(&known) => {
            return Err(invalid(format!("incompatible {} value", other.kind())));
        }
        (_, other) => to_native(other).map_err(|e| TypeError::new(name, e.message))?,
    };

    Ok(encoded)
}

fn parse_uuid(type_name: &str, raw: &str) -> Result<Uuid, TypeError> {
    Uuid::parse_str(raw)
        .map_err(|e| TypeError::new(type_name, format!("'{raw}' is not a uuid: {e}")))
}

fn encode_date(date: NaiveDate) -> CqlDate {
    let days = date.signed_duration_since(unix_epoch()).num_days();
    CqlDate((days + CQL_DATE_EPOCH_OFFSET) as u32)
}

fn encode_time(time: NaiveTime) -> CqlTime {
    let nanos = i64::from(time.num_seconds_from_midnight()) * 1_000_000_000
        + i64::from(time.nanosecond());
    CqlTime(nanos)
}

fn unix_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// Encode a value without a declared type, using the natural driver type
/// for each plain shape.
pub fn to_native(value: &PlainValue) -> Result<CqlValue, TypeError> {
    let native = match value {
        PlainValue::Native(native) => native.clone(),
        PlainValue::Null => {
            return Err(TypeError::new("<untyped>", "null has no native representation"));
        }
        PlainValue::Bool(b) => CqlValue::Boolean(*b),
        PlainValue::Int(i) => CqlValue::BigInt(*i),
        PlainValue::Float(f) => CqlValue::Double(*f),
        PlainValue::Text(s) => CqlValue::Text(s.clone()),
        PlainValue::Timestamp(ts) => CqlValue::Timestamp(CqlTimestamp(ts.timestamp_millis())),
        PlainValue::Bytes(bytes) => CqlValue::Blob(bytes.clone()),
        PlainValue::List(items) => {
            CqlValue::List(items.iter().map(to_native).collect::<Result<_, _>>()?)
        }
        PlainValue::Map(entries) => CqlValue::Map(
            entries
                .iter()
                .map(|(k, v)| Ok((to_native(k)?, to_native(v)?)))
                .collect::<Result<_, TypeError>>()?,
        ),
    };
    Ok(native)
}

/// Decode a driver value into a plain value. Never fails.
pub fn decode(native: &CqlValue) -> PlainValue {
    match native {
        CqlValue::Boolean(b) => PlainValue::Bool(*b),
        CqlValue::Timestamp(ts) => DateTime::from_timestamp_millis(ts.0)
            .map(PlainValue::Timestamp)
            .unwrap_or(PlainValue::Int(ts.0)),
        CqlValue::Map(entries) => PlainValue::Map(
            entries
                .iter()
                .map(|(k, v)| (decode(k), decode(v)))
                .collect(),
        ),
        CqlValue::Set(items) | CqlValue::List(items) => {
            PlainValue::List(items.iter().map(decode).collect())
        }
        other => decode_scalar(other),
    }
}

fn decode_optional(native: Option<&CqlValue>) -> PlainValue {
    native.map(decode).unwrap_or(PlainValue::Null)
}

fn decode_scalar(native: &CqlValue) -> PlainValue {
    match native {
        CqlValue::Ascii(s) | CqlValue::Text(s) => PlainValue::Text(s.clone()),
        CqlValue::Int(i) => PlainValue::Int(i64::from(*i)),
        CqlValue::BigInt(i) => PlainValue::Int(*i),
        CqlValue::SmallInt(i) => PlainValue::Int(i64::from(*i)),
        CqlValue::TinyInt(i) => PlainValue::Int(i64::from(*i)),
        CqlValue::Counter(counter) => PlainValue::Int(counter.0),
        CqlValue::Float(f) => PlainValue::Float(f64::from(*f)),
        CqlValue::Double(f) => PlainValue::Float(*f),
        CqlValue::Uuid(uuid) => PlainValue::Text(uuid.to_string()),
        CqlValue::Timeuuid(uuid) => PlainValue::Text(uuid.to_string()),
        CqlValue::Inet(addr) => PlainValue::Text(addr.to_string()),
        CqlValue::Blob(bytes) => PlainValue::Bytes(bytes.clone()),
        CqlValue::Varint(varint) => PlainValue::Text(literal::render_varint(varint)),
        CqlValue::Decimal(decimal) => PlainValue::Text(literal::render_decimal(decimal)),
        CqlValue::Duration(duration) => PlainValue::Text(literal::render_duration(duration)),
        CqlValue::Empty => PlainValue::Null,
        CqlValue::Date(date) => decode_date(date),
        CqlValue::Time(time) => decode_time(time),
        CqlValue::Tuple(items) => {
            PlainValue::List(items.iter().map(|item| decode_optional(item.as_ref())).collect())
        }
        CqlValue::UserDefinedType { fields, .. } => PlainValue::Map(
            fields
                .iter()
                .map(|(name, value)| {
                    (PlainValue::Text(name.clone()), decode_optional(value.as_ref()))
                })
                .collect(),
        ),
        other => PlainValue::Text(format!("{other:?}")),
    }
}

fn decode_date(date: &CqlDate) -> PlainValue {
    let days = i64::from(date.0) - CQL_DATE_EPOCH_OFFSET;
    unix_epoch()
        .checked_add_signed(chrono::Duration::days(days))
        .map(|d| PlainValue::Text(d.format(DATE_FORMAT).to_string()))
        .unwrap_or(PlainValue::Int(days))
}

fn decode_time(time: &CqlTime) -> PlainValue {
    let secs = time.0.div_euclid(1_000_000_000);
    let nanos = time.0.rem_euclid(1_000_000_000);
    u32::try_from(secs)
        .ok()
        .and_then(|secs| NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos as u32))
        .map(|t| PlainValue::Text(t.format(TIME_FORMAT).to_string()))
        .unwrap_or(PlainValue::Int(time.0))
}

/// Decode one result row into a column name → value record.
///
/// Null cells are kept as [`PlainValue::Null`] so the column still counts as
/// present for hydration.
pub fn decode_row(columns: &[String], row: &[Option<CqlValue>]) -> Record {
    columns
        .iter()
        .zip(row.iter())
        .map(|(column, cell)| (column.clone(), decode_optional(cell.as_ref())))
        .collect()
}
