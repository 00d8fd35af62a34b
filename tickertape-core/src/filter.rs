//! Allow-list filtered JSON decoding into a fixed-capacity document.
//!
//! This module provides:
//! - [`Filter`] - A declarative tree of JSON field paths to retain
//! - [`FilteredDocument`] - The retained values, with defaulting accessors
//! - [`decode`] - Streaming decode that applies a filter and a capacity
//!
//! Responses from the Web API carry far more than a display needs (market
//! lists alone run to kilobytes). Decoding streams straight off the socket and
//! unlisted fields are skipped without being buffered, so memory use is
//! bounded by what the filter keeps rather than by the response size.
//!
//! # Capacity accounting
//!
//! Every retained value costs [`SLOT_SIZE`] bytes, as does every array element
//! the filter drops (it is kept as `null` so indices stay stable). Every
//! retained string value and every retained member key additionally costs its
//! byte length plus one.
//! A decode whose retained size would exceed the capacity fails with
//! [`DecodeError::CapacityExceeded`].
//!
//! # Example
//!
//! ```rust
//! use tickertape_core::filter::{self, Filter};
//!
//! let filter = Filter::from_paths(["item.name", "item.artists[].name"]);
//! let body = br#"{"item":{"name":"Song","artists":[{"name":"A","id":"x"}],"album":{}}}"#;
//! let document = filter::decode(&body[..], &filter, 4000).unwrap();
//!
//! assert_eq!(document.str_at("/item/name"), "Song");
//! assert_eq!(document.str_at("/item/artists/0/name"), "A");
//! assert!(document.pointer("/item/album").is_none());
//! ```

use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;

use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde_json::error::Category;
use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Bytes charged for every retained value.
pub const SLOT_SIZE: usize = 16;

const CAPACITY_EXCEEDED: &str = "filtered document capacity exceeded";

/// Error type for filtered decoding.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The retained values do not fit in the document.
    #[error("document capacity of {capacity} bytes exceeded")]
    CapacityExceeded { capacity: usize },

    /// The input is not valid JSON.
    #[error("malformed JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The input ended before the document was complete.
    #[error("incomplete JSON input")]
    Incomplete,

    /// Reading from the stream failed.
    #[error("I/O error while decoding: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        match e.classify() {
            Category::Io => DecodeError::Io(e.into()),
            Category::Eof => DecodeError::Incomplete,
            Category::Syntax | Category::Data => DecodeError::Malformed(e),
        }
    }
}

/// A declarative set of JSON field paths to retain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Retain the value and everything below it.
    Allow,

    /// Retain an object, keeping only the listed members.
    Fields(BTreeMap<String, Filter>),

    /// Retain an array, applying the inner filter to every element.
    Elements(Box<Filter>),
}

impl Filter {
    /// A filter that retains everything.
    pub fn allow_all() -> Self {
        Filter::Allow
    }

    /// Build a filter from dotted paths.
    ///
    /// A segment ending in `[]` names an array whose elements are filtered by
    /// the rest of the path, e.g. `item.artists[].name`. A path that ends on
    /// an array (`genres[]`) keeps every element whole.
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut root = Filter::Fields(BTreeMap::new());
        for path in paths {
            root.insert(path.as_ref().split('.'));
        }
        root
    }

    fn insert<'p, I>(&mut self, mut segments: I)
    where
        I: Iterator<Item = &'p str>,
    {
        let Some(segment) = segments.next() else {
            *self = Filter::Allow;
            return;
        };

        let Filter::Fields(fields) = self else {
            // `Allow` already covers the path; a shape conflict is ignored.
            return;
        };

        match segment.strip_suffix("[]") {
            Some(name) => {
                let child = fields
                    .entry(name.to_string())
                    .or_insert_with(|| Filter::Elements(Box::new(Filter::Fields(BTreeMap::new()))));
                if let Filter::Elements(inner) = child {
                    inner.insert(segments);
                }
            }
            None => {
                fields
                    .entry(segment.to_string())
                    .or_insert_with(|| Filter::Fields(BTreeMap::new()))
                    .insert(segments);
            }
        }
    }

    fn keeps_scalars(&self) -> bool {
        matches!(self, Filter::Allow)
    }

    fn keeps_objects(&self) -> bool {
        matches!(self, Filter::Allow | Filter::Fields(_))
    }

    fn member(&self, key: &str) -> Option<&Filter> {
        match self {
            Filter::Allow => Some(self),
            Filter::Fields(fields) => fields.get(key),
            Filter::Elements(_) => None,
        }
    }

    fn element(&self) -> Option<&Filter> {
        match self {
            Filter::Allow => Some(self),
            Filter::Elements(inner) => Some(inner.as_ref()),
            Filter::Fields(_) => None,
        }
    }
}

/// The values retained by a filtered decode.
///
/// Accessors take JSON pointers (`/item/artists/0/name`) and fall back to a
/// default when the value is absent or of another type.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredDocument {
    value: Value,
    used: usize,
    capacity: usize,
}

impl FilteredDocument {
    /// The retained JSON value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Bytes of capacity consumed.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Capacity the document was decoded with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up a value by JSON pointer.
    ///
    /// Explicit `null`s read as absent.
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        self.value.pointer(pointer).filter(|v| !v.is_null())
    }

    /// String at `pointer`, or `""`.
    pub fn str_at(&self, pointer: &str) -> &str {
        self.pointer(pointer).and_then(Value::as_str).unwrap_or_default()
    }

    /// Integer at `pointer`, or `None`.
    pub fn i64_opt(&self, pointer: &str) -> Option<i64> {
        self.pointer(pointer).and_then(|v| {
            v.as_i64()
                .or_else(|| v.as_f64().map(|f| f as i64))
        })
    }

    /// Integer at `pointer`, or `0`.
    pub fn i64_at(&self, pointer: &str) -> i64 {
        self.i64_opt(pointer).unwrap_or(0)
    }

    /// Number at `pointer`, or `0.0`.
    pub fn f64_at(&self, pointer: &str) -> f64 {
        self.pointer(pointer).and_then(Value::as_f64).unwrap_or(0.0)
    }

    /// Boolean at `pointer`, or `false`.
    pub fn bool_at(&self, pointer: &str) -> bool {
        self.pointer(pointer).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Number of elements of the array at `pointer`, or `0`.
    pub fn len_at(&self, pointer: &str) -> usize {
        self.pointer(pointer)
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }
}

/// Decode one JSON document from `reader`, keeping only what `filter` allows.
///
/// Reading stops at the end of the document; trailing bytes are left in the
/// stream, so this is safe to call on a kept-alive socket.
pub fn decode<R: Read>(reader: R, filter: &Filter, capacity: usize) -> Result<FilteredDocument, DecodeError> {
    let pool = Pool::new(capacity);
    let mut deserializer = serde_json::Deserializer::from_reader(reader);

    match (FilterSeed { filter, pool: &pool }).deserialize(&mut deserializer) {
        Ok(value) => Ok(FilteredDocument {
            value,
            used: pool.used(),
            capacity,
        }),
        Err(_) if pool.exhausted.get() => Err(DecodeError::CapacityExceeded { capacity }),
        Err(e) => Err(e.into()),
    }
}

/// Tracks how much of the document capacity is left.
struct Pool {
    capacity: usize,
    remaining: Cell<usize>,
    exhausted: Cell<bool>,
}

impl Pool {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            remaining: Cell::new(capacity),
            exhausted: Cell::new(false),
        }
    }

    fn charge<E: de::Error>(&self, bytes: usize) -> Result<(), E> {
        match self.remaining.get().checked_sub(bytes) {
            Some(left) => {
                self.remaining.set(left);
                Ok(())
            }
            None => {
                self.exhausted.set(true);
                Err(E::custom(CAPACITY_EXCEEDED))
            }
        }
    }

    fn used(&self) -> usize {
        self.capacity - self.remaining.get()
    }
}

struct FilterSeed<'a> {
    filter: &'a Filter,
    pool: &'a Pool,
}

impl<'a> FilterSeed<'a> {
    fn child(&self, filter: &'a Filter) -> Self {
        Self {
            filter,
            pool: self.pool,
        }
    }

    fn scalar<E: de::Error>(&self, value: Value) -> Result<Value, E> {
        if !self.filter.keeps_scalars() {
            return Ok(Value::Null);
        }
        self.pool.charge(SLOT_SIZE)?;
        Ok(value)
    }

    fn string<E: de::Error>(&self, value: String) -> Result<Value, E> {
        if !self.filter.keeps_scalars() {
            return Ok(Value::Null);
        }
        self.pool.charge(SLOT_SIZE + value.len() + 1)?;
        Ok(Value::String(value))
    }
}

impl<'de> DeserializeSeed<'de> for FilterSeed<'_> {
    type Value = Value;

    fn deserialize<D>(self, deserializer: D) -> Result<Value, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for FilterSeed<'_> {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        self.scalar(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        self.scalar(Value::Number(v.into()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        self.scalar(Value::Number(v.into()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        self.scalar(Number::from_f64(v).map_or(Value::Null, Value::Number))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        self.string(v.to_string())
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        self.string(v)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let Some(element) = self.filter.element() else {
            while seq.next_element::<IgnoredAny>()?.is_some() {}
            return Ok(Value::Null);
        };

        self.pool.charge(SLOT_SIZE)?;
        let mut items = Vec::new();
        while let Some(item) = seq.next_element_seed(self.child(element))? {
            // Dropped elements keep their position, so they still take a slot.
            if item.is_null() {
                self.pool.charge(SLOT_SIZE)?;
            }
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A>(self, mut map: A) -> Result<Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        if !self.filter.keeps_objects() {
            while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
            return Ok(Value::Null);
        }

        self.pool.charge(SLOT_SIZE)?;
        let mut object = Map::new();
        while let Some(key) = map.next_key::<String>()? {
            match self.filter.member(&key) {
                Some(member) => {
                    self.pool.charge(key.len() + 1)?;
                    let value = map.next_value_seed(self.child(member))?;
                    object.insert(key, value);
                }
                None => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(Value::Object(object))
    }
}
