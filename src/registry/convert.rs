use serde_json::{Deserializer, Value};

use crate::error::{Error, Result};

/// Fields whose value arrives as a JSON document encoded into a string.
const ENCODED_FIELDS: [&str; 2] = ["csvJson", "spec"];

/// Parse a streamed reply made of zero or more concatenated JSON objects.
pub fn parse_list(reply: &str) -> Result<Vec<Value>> {
    Deserializer::from_str(reply)
        .into_iter::<Value>()
        .map(|item| -> Result<Value> {
            let mut value = item?;
            decode_fields(&mut value)?;
            Ok(value)
        })
        .collect()
}

/// Parse a reply expected to carry exactly one JSON object.
pub fn parse_single(reply: &str) -> Result<Value> {
    if reply.trim().is_empty() {
        return Err(Error::EmptyResponse);
    }
    parse_list(reply)?
        .into_iter()
        .next()
        .ok_or(Error::EmptyResponse)
}

/// Replace string-encoded documents with the values they encode.
fn decode_fields(value: &mut Value) -> Result<()> {
    let Some(object) = value.as_object_mut() else {
        return Ok(());
    };

    for key in ENCODED_FIELDS {
        if let Some(field) = object.get_mut(key) {
            decode_in_place(field)?;
        }
    }

    // `object` holds the bundle's manifests, one encoded document each.
    if let Some(Value::Array(items)) = object.get_mut("object") {
        for item in items.iter_mut() {
            decode_in_place(item)?;
        }
    }
    Ok(())
}

fn decode_in_place(field: &mut Value) -> Result<()> {
    let decoded = match field {
        Value::String(raw) if !raw.trim().is_empty() => serde_json::from_str(raw)?,
        _ => return Ok(()),
    };
    *field = decoded;
    Ok(())
}
