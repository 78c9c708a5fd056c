//! Streaming JSON helpers.
//!
//! Both helpers walk the document with `serde_json`'s pull deserializer and skip everything
//! they don't need via `IgnoredAny`, so memory stays bounded by the largest *kept* value
//! rather than by the document size.

use std::fmt;
use std::io::Read;

use serde::de::{self, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde_json::{Map, Value};

/// Reads the named top-level fields of a JSON object.
pub fn read_fields<R: Read>(reader: R, keys: &[&str]) -> serde_json::Result<Map<String, Value>> {
    let mut de = serde_json::Deserializer::from_reader(reader);
    let out = FieldPicker { keys }.deserialize(&mut de)?;
    de.end()?;
    Ok(out)
}

/// Counts the elements of the array found at a dotted path of object keys.
///
/// Returns `Ok(None)` when a segment of the path is absent.
pub fn count_at<R: Read>(reader: R, path: &str) -> serde_json::Result<Option<u64>> {
    let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    let mut de = serde_json::Deserializer::from_reader(reader);
    let out = PathCounter { path: &segments }.deserialize(&mut de)?;
    de.end()?;
    Ok(out)
}

struct FieldPicker<'a> {
    keys: &'a [&'a str],
}

impl<'de, 'a> DeserializeSeed<'de> for FieldPicker<'a> {
    type Value = Map<String, Value>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, 'a> Visitor<'de> for FieldPicker<'a> {
    type Value = Map<String, Value>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut out = Map::new();
        while let Some(key) = map.next_key::<String>()? {
            if self.keys.contains(&key.as_str()) {
                let value = map.next_value::<Value>()?;
                out.insert(key, value);
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(out)
    }
}

struct PathCounter<'a> {
    path: &'a [&'a str],
}

impl<'de, 'a> DeserializeSeed<'de> for PathCounter<'a> {
    type Value = Option<u64>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        if self.path.is_empty() {
            deserializer.deserialize_seq(ElementCounter).map(Some)
        } else {
            deserializer.deserialize_map(self)
        }
    }
}

impl<'de, 'a> Visitor<'de> for PathCounter<'a> {
    type Value = Option<u64>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a JSON object containing {:?}", self.path.join("."))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let Some((head, rest)) = self.path.split_first() else {
            return Err(de::Error::custom("empty path"));
        };

        let mut found = None;
        while let Some(key) = map.next_key::<String>()? {
            if found.is_none() && key == *head {
                found = map.next_value_seed(PathCounter { path: rest })?;
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(found)
    }
}

struct ElementCounter;

impl<'de> Visitor<'de> for ElementCounter {
    type Value = u64;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON array")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut n = 0u64;
        while seq.next_element::<IgnoredAny>()?.is_some() {
            n += 1;
        }
        Ok(n)
    }
}
