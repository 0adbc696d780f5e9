//! Decoder for back-to-back JSON objects
//!
//! Batched property queries answer with one JSON object per property,
//! concatenated with no separator:
//!
//! ```text
//! {"pool":"rbd","pool_id":0,"size":1}{"pool":"rbd","pool_id":0,"min_size":1}...
//! ```
//!
//! The decoder reads objects greedily until the input is exhausted.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde_json::{Deserializer, Map, Value};

/// Decode every object in `buffer`, in order
pub fn decode_objects(buffer: &[u8]) -> Result<Vec<Map<String, Value>>> {
    let mut objects = Vec::new();

    for (index, item) in Deserializer::from_slice(buffer).into_iter::<Value>().enumerate() {
        let value = item.map_err(|e| Error::malformed(format!("object #{}", index), e))?;
        match value {
            Value::Object(object) => objects.push(object),
            other => {
                return Err(Error::malformed(
                    format!("object #{}", index),
                    format!("expected an object, found {}", other),
                ))
            }
        }
    }

    Ok(objects)
}

/// Decode and merge all objects into one map
///
/// Keys keep the position of their first appearance; later values for the
/// same key win.
pub fn merge_objects(buffer: &[u8]) -> Result<IndexMap<String, Value>> {
    let mut merged = IndexMap::new();
    for object in decode_objects(buffer)? {
        for (key, value) in object {
            merged.insert(key, value);
        }
    }
    Ok(merged)
}
