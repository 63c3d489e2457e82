//! Object flattening
//!
//! Turns whatever the caller wants to log into a flat set of JSON fields.
//! Three input shapes are supported:
//! - a mapping of field name to [`Field`]
//! - a domain object implementing [`Loggable`]
//! - a sequence of either, which stays a sequence in the output
//!
//! Date/times and UUIDs are rendered as strings on the way through so the
//! transport only ever sees plain JSON.

use chrono::{DateTime, NaiveDateTime, TimeZone};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Fixed rendering for every date/time that ends up in an event
pub const DATETIME_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

/// Insertion-ordered field name to JSON value
pub type FieldSet = IndexMap<String, Value>;

/// A value on its way into a field-set, before coercion
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    DateTime(NaiveDateTime),
    Uuid(Uuid),
    List(Vec<Field>),
    Map(IndexMap<String, Field>),
    Json(Value),
}

impl Field {
    /// Render to plain JSON, stringifying date/times and UUIDs at any depth
    pub fn coerce(&self) -> Value {
        match self {
            Field::DateTime(dt) => Value::String(dt.format(DATETIME_FORMAT).to_string()),
            Field::Uuid(id) => Value::String(id.to_string()),
            Field::List(items) => Value::Array(items.iter().map(Field::coerce).collect()),
            Field::Map(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), v.coerce())).collect()),
            Field::Json(v) => v.clone(),
        }
    }
}

impl From<NaiveDateTime> for Field {
    fn from(dt: NaiveDateTime) -> Self {
        Field::DateTime(dt)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Field {
    fn from(dt: DateTime<Tz>) -> Self {
        // Wall-clock time in the value's own zone, matching strftime on an aware datetime
        Field::DateTime(dt.naive_local())
    }
}

impl From<Uuid> for Field {
    fn from(id: Uuid) -> Self {
        Field::Uuid(id)
    }
}

impl From<Value> for Field {
    fn from(v: Value) -> Self {
        Field::Json(v)
    }
}

impl From<&str> for Field {
    fn from(s: &str) -> Self {
        Field::Json(Value::String(s.to_string()))
    }
}

impl From<String> for Field {
    fn from(s: String) -> Self {
        Field::Json(Value::String(s))
    }
}

macro_rules! json_field_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Field {
                fn from(v: $t) -> Self {
                    Field::Json(Value::from(v))
                }
            }
        )*
    };
}

json_field_from!(bool, i32, i64, u16, u32, u64, usize, f64);

impl<T: Into<Field>> From<Option<T>> for Field {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Field::Json(Value::Null),
        }
    }
}

impl<T: Into<Field>> From<Vec<T>> for Field {
    fn from(items: Vec<T>) -> Self {
        Field::List(items.into_iter().map(Into::into).collect())
    }
}

/// A domain type that knows how to present itself to the event pipeline.
///
/// Implement [`Loggable::fields`] to expose attributes that get the standard
/// coercion, or [`Loggable::to_canonical`] when the type already produces a
/// normalized field-set that should be used verbatim.
pub trait Loggable: Send + Sync {
    /// Public attributes. Names starting with `_` are treated as internal and skipped.
    fn fields(&self) -> Vec<(String, Field)> {
        Vec::new()
    }

    /// Self-serialized form, trusted as already normalized
    fn to_canonical(&self) -> Option<FieldSet> {
        None
    }
}

impl Loggable for FieldSet {
    fn to_canonical(&self) -> Option<FieldSet> {
        Some(self.clone())
    }
}

/// One loggable item
pub enum Element {
    Mapping(IndexMap<String, Field>),
    Object(Box<dyn Loggable>),
}

impl Element {
    pub fn mapping<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Field>,
    {
        Element::Mapping(entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn object<T: Loggable + 'static>(obj: T) -> Self {
        Element::Object(Box::new(obj))
    }

    fn flatten(&self) -> FieldSet {
        match self {
            Element::Object(obj) => match obj.to_canonical() {
                Some(canonical) => canonical,
                None => obj
                    .fields()
                    .into_iter()
                    .filter(|(name, _)| !name.starts_with('_'))
                    .map(|(name, field)| (name, field.coerce()))
                    .collect(),
            },
            Element::Mapping(map) => map.iter().map(|(k, v)| (k.clone(), v.coerce())).collect(),
        }
    }
}

/// The value handed to an event builder
#[derive(Default)]
pub enum Obj {
    /// No payload; fields are set directly on the builder instead
    #[default]
    None,
    One(Element),
    Sequence(Vec<Element>),
}

impl Obj {
    pub fn mapping<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Field>,
    {
        Obj::One(Element::mapping(entries))
    }

    pub fn object<T: Loggable + 'static>(obj: T) -> Self {
        Obj::One(Element::object(obj))
    }

    pub fn sequence<I: IntoIterator<Item = Element>>(items: I) -> Self {
        Obj::Sequence(items.into_iter().collect())
    }
}

impl From<IndexMap<String, Field>> for Obj {
    fn from(map: IndexMap<String, Field>) -> Self {
        Obj::One(Element::Mapping(map))
    }
}

impl From<Vec<Element>> for Obj {
    fn from(items: Vec<Element>) -> Self {
        Obj::Sequence(items)
    }
}

/// Flattened payload; the variant mirrors the shape of the input
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Single(FieldSet),
    Many(Vec<FieldSet>),
}

/// Flatten an input value.
///
/// Returns `None` for [`Obj::None`], telling the caller that no payload
/// shortcut was taken.
pub fn flatten(value: &Obj) -> Option<Payload> {
    match value {
        Obj::None => None,
        Obj::One(element) => Some(Payload::Single(element.flatten())),
        Obj::Sequence(items) => Some(Payload::Many(items.iter().map(Element::flatten).collect())),
    }
}
