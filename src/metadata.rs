//! Request metadata: a small key/value map carried alongside async work.
//!
//! Keys are case-insensitive (stored lower-cased); values are dynamic JSON
//! values. A map is attached to a future with [`scope`] and read back anywhere
//! inside it with [`current`] and the typed readers.

use serde::{
    de::{MapAccess, Visitor},
    Deserialize, Deserializer, Serialize,
};
use serde_json::Value;
use std::{collections::HashMap, fmt, future::Future};

tokio::task_local! {
    static CURRENT: Metadata;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Metadata(HashMap<String, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map from key/value pairs. Later pairs win on duplicate keys.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        pairs.into_iter().collect()
    }

    /// Merges maps into a new one; values from later maps replace earlier ones.
    pub fn join<'a, I>(mds: I) -> Self
    where
        I: IntoIterator<Item = &'a Metadata>,
    {
        let mut out = Metadata::new();
        for md in mds {
            out.0
                .extend(md.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        out
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(&key.to_lowercase())
    }

    /// Stores a pair. Empty keys and empty string values are ignored.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        if key.is_empty() || value.as_str() == Some("") {
            return;
        }
        self.insert(key, value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(&key.to_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Visits pairs in unspecified order until `f` returns `false`.
    pub fn range<F>(&self, mut f: F)
    where
        F: FnMut(&str, &Value) -> bool,
    {
        for (k, v) in &self.0 {
            if !f(k, v) {
                break;
            }
        }
    }

    fn insert(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_lowercase(), value);
    }
}

impl<K, V> FromIterator<(K, V)> for Metadata
where
    K: AsRef<str>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut md = Metadata::new();
        md.extend(iter);
        md
    }
}

impl<K, V> Extend<(K, V)> for Metadata
where
    K: AsRef<str>,
    V: Into<Value>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k.as_ref(), v.into());
        }
    }
}

// Keys are lower-cased while reading, so among keys that differ only in case
// the last one in the input wins.
impl<'de> Deserialize<'de> for Metadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MetadataVisitor;

        impl<'de> Visitor<'de> for MetadataVisitor {
            type Value = Metadata;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of metadata values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Metadata, A::Error> {
                let mut map = HashMap::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    map.insert(key.to_lowercase(), value);
                }
                Ok(Metadata(map))
            }
        }

        deserializer.deserialize_map(MetadataVisitor)
    }
}

/// Runs `fut` with `md` as its current metadata.
pub async fn scope<F>(md: Metadata, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT.scope(md, fut).await
}

/// Copy of the metadata attached to the running future, if any.
pub fn current() -> Option<Metadata> {
    CURRENT.try_with(Metadata::clone).ok()
}

/// Copy of the current metadata (empty if none) for work that outlives the
/// caller, e.g. a task posted to a pool.
pub fn detached() -> Metadata {
    current().unwrap_or_default()
}

pub fn value(key: &str) -> Option<Value> {
    CURRENT
        .try_with(|md| md.get(key).cloned())
        .ok()
        .flatten()
}

pub fn string(key: &str) -> String {
    match value(key) {
        Some(Value::String(s)) => s,
        _ => String::new(),
    }
}

pub fn int64(key: &str) -> i64 {
    value(key).and_then(|v| v.as_i64()).unwrap_or(0)
}

/// Reads a boolean. Strings `1 t T TRUE true True` and `0 f F FALSE false False`
/// are parsed; anything else is `false`.
pub fn boolean(key: &str) -> bool {
    match value(key) {
        Some(Value::Bool(b)) => b,
        Some(Value::String(s)) => parse_bool(&s).unwrap_or(false),
        _ => false,
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
