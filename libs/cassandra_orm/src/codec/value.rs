use chrono::{DateTime, Utc};
use scylla::value::CqlValue;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::Hash;
use uuid::Uuid;

/// Application-side value exchanged with entities and records.
///
/// Decoding never produces [`PlainValue::Native`]; it only exists so callers
/// can hand an already-built driver value to the encoder unchanged. The
/// `From<Uuid>` and `From<i32>` conversions build native values so that
/// untyped query parameters keep their driver type.
#[derive(Debug, Clone, PartialEq)]
pub enum PlainValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Bytes(Vec<u8>),
    List(Vec<PlainValue>),
    /// Ordered key/value pairs
    Map(Vec<(PlainValue, PlainValue)>),
    Native(CqlValue),
}

impl PlainValue {
    pub fn is_null(&self) -> bool {
        matches!(self, PlainValue::Null)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PlainValue::Null => "null",
            PlainValue::Bool(_) => "bool",
            PlainValue::Int(_) => "int",
            PlainValue::Float(_) => "float",
            PlainValue::Text(_) => "text",
            PlainValue::Timestamp(_) => "timestamp",
            PlainValue::Bytes(_) => "bytes",
            PlainValue::List(_) => "list",
            PlainValue::Map(_) => "map",
            PlainValue::Native(_) => "native",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PlainValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PlainValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<&str> for PlainValue {
    fn from(value: &str) -> Self {
        PlainValue::Text(value.to_string())
    }
}

impl From<String> for PlainValue {
    fn from(value: String) -> Self {
        PlainValue::Text(value)
    }
}

impl From<i64> for PlainValue {
    fn from(value: i64) -> Self {
        PlainValue::Int(value)
    }
}

impl From<i32> for PlainValue {
    fn from(value: i32) -> Self {
        PlainValue::Native(CqlValue::Int(value))
    }
}

impl From<f64> for PlainValue {
    fn from(value: f64) -> Self {
        PlainValue::Float(value)
    }
}

impl From<bool> for PlainValue {
    fn from(value: bool) -> Self {
        PlainValue::Bool(value)
    }
}

impl From<Uuid> for PlainValue {
    fn from(value: Uuid) -> Self {
        PlainValue::Native(CqlValue::Uuid(value))
    }
}

impl From<CqlValue> for PlainValue {
    fn from(value: CqlValue) -> Self {
        PlainValue::Native(value)
    }
}

/// A plain value did not have the shape an entity field expects.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected {expected}, found {found}")]
pub struct ConversionError {
    pub expected: &'static str,
    pub found: String,
}

impl ConversionError {
    pub fn new(expected: &'static str, found: &PlainValue) -> Self {
        Self {
            expected,
            found: found.kind().to_string(),
        }
    }
}

/// Conversion from a decoded value into an entity field type.
pub trait FromPlain: Sized {
    fn from_plain(value: PlainValue) -> Result<Self, ConversionError>;
}

/// Conversion from an entity field into a plain value; `None` means the
/// field is absent and its column is not written.
pub trait ToPlain {
    fn to_plain(&self) -> Option<PlainValue>;
}

impl FromPlain for PlainValue {
    fn from_plain(value: PlainValue) -> Result<Self, ConversionError> {
        Ok(value)
    }
}

impl FromPlain for String {
    fn from_plain(value: PlainValue) -> Result<Self, ConversionError> {
        match value {
            PlainValue::Text(s) => Ok(s),
            other => Err(ConversionError::new("text", &other)),
        }
    }
}

impl FromPlain for i64 {
    fn from_plain(value: PlainValue) -> Result<Self, ConversionError> {
        match value {
            PlainValue::Int(i) => Ok(i),
            other => Err(ConversionError::new("int", &other)),
        }
    }
}

impl FromPlain for i32 {
    fn from_plain(value: PlainValue) -> Result<Self, ConversionError> {
        match value {
            PlainValue::Int(i) => i32::try_from(i).map_err(|_| ConversionError {
                expected: "32-bit int",
                found: i.to_string(),
            }),
            other => Err(ConversionError::new("int", &other)),
        }
    }
}

impl FromPlain for f64 {
    fn from_plain(value: PlainValue) -> Result<Self, ConversionError> {
        match value {
            PlainValue::Float(f) => Ok(f),
            PlainValue::Int(i) => Ok(i as f64),
            other => Err(ConversionError::new("float", &other)),
        }
    }
}

impl FromPlain for f32 {
    fn from_plain(value: PlainValue) -> Result<Self, ConversionError> {
        f64::from_plain(value).map(|f| f as f32)
    }
}

impl FromPlain for bool {
    fn from_plain(value: PlainValue) -> Result<Self, ConversionError> {
        match value {
            PlainValue::Bool(b) => Ok(b),
            other => Err(ConversionError::new("bool", &other)),
        }
    }
}

impl FromPlain for Uuid {
    fn from_plain(value: PlainValue) -> Result<Self, ConversionError> {
        match value {
            PlainValue::Text(s) => Uuid::parse_str(&s).map_err(|_| ConversionError {
                expected: "uuid",
                found: s,
            }),
            other => Err(ConversionError::new("uuid", &other)),
        }
    }
}

impl FromPlain for DateTime<Utc> {
    fn from_plain(value: PlainValue) -> Result<Self, ConversionError> {
        match value {
            PlainValue::Timestamp(ts) => Ok(ts),
            other => Err(ConversionError::new("timestamp", &other)),
        }
    }
}

impl<T: FromPlain> FromPlain for Option<T> {
    fn from_plain(value: PlainValue) -> Result<Self, ConversionError> {
        match value {
            PlainValue::Null => Ok(None),
            other => T::from_plain(other).map(Some),
        }
    }
}

impl<T: FromPlain> FromPlain for Vec<T> {
    fn from_plain(value: PlainValue) -> Result<Self, ConversionError> {
        match value {
            PlainValue::List(items) => items.into_iter().map(T::from_plain).collect(),
            PlainValue::Null => Ok(Vec::new()),
            other => Err(ConversionError::new("list", &other)),
        }
    }
}

impl<T: FromPlain + Ord> FromPlain for BTreeSet<T> {
    fn from_plain(value: PlainValue) -> Result<Self, ConversionError> {
        Vec::<T>::from_plain(value).map(|items| items.into_iter().collect())
    }
}

impl<T: FromPlain + Eq + Hash> FromPlain for HashSet<T> {
    fn from_plain(value: PlainValue) -> Result<Self, ConversionError> {
        Vec::<T>::from_plain(value).map(|items| items.into_iter().collect())
    }
}

fn map_entries<K: FromPlain, V: FromPlain>(
    value: PlainValue,
) -> Result<Vec<(K, V)>, ConversionError> {
    match value {
        PlainValue::Map(entries) => entries
            .into_iter()
            .map(|(k, v)| Ok((K::from_plain(k)?, V::from_plain(v)?)))
            .collect(),
        PlainValue::Null => Ok(Vec::new()),
        other => Err(ConversionError::new("map", &other)),
    }
}

impl<K: FromPlain + Ord, V: FromPlain> FromPlain for BTreeMap<K, V> {
    fn from_plain(value: PlainValue) -> Result<Self, ConversionError> {
        map_entries(value).map(|entries| entries.into_iter().collect())
    }
}

impl<K: FromPlain + Eq + Hash, V: FromPlain> FromPlain for HashMap<K, V> {
    fn from_plain(value: PlainValue) -> Result<Self, ConversionError> {
        map_entries(value).map(|entries| entries.into_iter().collect())
    }
}

macro_rules! to_plain_via_from {
    ($($ty:ty),*) => {
        $(
            impl ToPlain for $ty {
                fn to_plain(&self) -> Option<PlainValue> {
                    Some(PlainValue::from(self.clone()))
                }
            }
        )*
    };
}

to_plain_via_from!(String, i64, f64, bool);

// Entity fields stay plain; the declared column type picks the driver type.
impl ToPlain for i32 {
    fn to_plain(&self) -> Option<PlainValue> {
        Some(PlainValue::Int(i64::from(*self)))
    }
}

impl ToPlain for Uuid {
    fn to_plain(&self) -> Option<PlainValue> {
        Some(PlainValue::Text(self.to_string()))
    }
}

impl ToPlain for PlainValue {
    fn to_plain(&self) -> Option<PlainValue> {
        (!self.is_null()).then(|| self.clone())
    }
}

impl ToPlain for f32 {
    fn to_plain(&self) -> Option<PlainValue> {
        Some(PlainValue::Float(f64::from(*self)))
    }
}

impl ToPlain for DateTime<Utc> {
    fn to_plain(&self) -> Option<PlainValue> {
        Some(PlainValue::Timestamp(*self))
    }
}

impl ToPlain for CqlValue {
    fn to_plain(&self) -> Option<PlainValue> {
        Some(PlainValue::Native(self.clone()))
    }
}

impl<T: ToPlain> ToPlain for Option<T> {
    fn to_plain(&self) -> Option<PlainValue> {
        self.as_ref().and_then(|value| value.to_plain())
    }
}

fn list_of<'a, T: ToPlain + 'a>(items: impl Iterator<Item = &'a T>) -> PlainValue {
    PlainValue::List(items.filter_map(|item| item.to_plain()).collect())
}

fn map_of<'a, K: ToPlain + 'a, V: ToPlain + 'a>(
    entries: impl Iterator<Item = (&'a K, &'a V)>,
) -> PlainValue {
    PlainValue::Map(
        entries
            .filter_map(|(k, v)| Some((k.to_plain()?, v.to_plain()?)))
            .collect(),
    )
}

impl<T: ToPlain> ToPlain for Vec<T> {
    fn to_plain(&self) -> Option<PlainValue> {
        Some(list_of(self.iter()))
    }
}

impl<T: ToPlain> ToPlain for BTreeSet<T> {
    fn to_plain(&self) -> Option<PlainValue> {
        Some(list_of(self.iter()))
    }
}

impl<T: ToPlain> ToPlain for HashSet<T> {
    fn to_plain(&self) -> Option<PlainValue> {
        Some(list_of(self.iter()))
    }
}

impl<K: ToPlain, V: ToPlain> ToPlain for BTreeMap<K, V> {
    fn to_plain(&self) -> Option<PlainValue> {
        Some(map_of(self.iter()))
    }
}

impl<K: ToPlain, V: ToPlain> ToPlain for HashMap<K, V> {
    fn to_plain(&self) -> Option<PlainValue> {
        Some(map_of(self.iter()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_maps_null_to_none() {
        let value: Option<String> = FromPlain::from_plain(PlainValue::Null).unwrap();
        assert_eq!(value, None);
        assert_eq!(None::<String>.to_plain(), None);
    }

    #[test]
    fn test_uuid_travels_as_text() {
        let id = Uuid::new_v4();
        let plain = id.to_plain().unwrap();
        assert_eq!(plain, PlainValue::Text(id.to_string()));
        assert_eq!(Uuid::from_plain(plain).unwrap(), id);
    }

    #[test]
    fn test_bare_uuid_and_i32_convert_to_native() {
        let id = Uuid::new_v4();
        assert_eq!(PlainValue::from(id), PlainValue::Native(CqlValue::Uuid(id)));
        assert_eq!(PlainValue::from(36i32), PlainValue::Native(CqlValue::Int(36)));
        assert_eq!(36i32.to_plain(), Some(PlainValue::Int(36)));
    }

    #[test]
    fn test_collections() {
        let tags: BTreeSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        let plain = tags.to_plain().unwrap();
        assert_eq!(
            plain,
            PlainValue::List(vec!["a".into(), "b".into()])
        );
        assert_eq!(BTreeSet::<String>::from_plain(plain).unwrap(), tags);

        let scores: BTreeMap<String, i64> = [("x".to_string(), 1)].into_iter().collect();
        let plain = scores.to_plain().unwrap();
        assert_eq!(BTreeMap::<String, i64>::from_plain(plain).unwrap(), scores);
    }

    #[test]
    fn test_conversion_error_reports_kind() {
        let err = i64::from_plain(PlainValue::Text("x".into())).unwrap_err();
        assert_eq!(err.to_string(), "expected int, found text");
    }
}
