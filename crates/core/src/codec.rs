//! Per-kind document codecs.
//!
//! A codec turns a [`FieldStore`] into the bytes stored on disk and back, and
//! knows how to rebuild both sides of a conflicted file.

use serde_json::{Map, Value};
use tracing::debug;

use crate::conflict::markers::split_conflict;
use crate::errors::CodecError;
use crate::field::{FieldSpec, FieldStore, FieldValue};

/// Serialization capability for one document kind.
pub trait DocumentCodec: Send + Sync {
    /// Type tag carried by every document of this kind.
    fn kind(&self) -> &'static str;

    /// The fixed set of declared fields and their defaults.
    fn schema(&self) -> &'static [FieldSpec];

    /// Encode a store. Missing schema fields are filled with defaults, so an
    /// empty store still produces a valid payload.
    fn serialize(&self, fields: &FieldStore) -> Vec<u8>;

    /// Decode a payload into a store.
    fn deserialize(&self, bytes: &[u8]) -> Result<FieldStore, CodecError>;

    /// Rebuild the `(current, incoming)` stores of a file holding conflict
    /// markers.
    fn parse_conflict(&self, bytes: &[u8]) -> Result<(FieldStore, FieldStore), CodecError>;

    /// Whether `value` may be written to `key`: the key is declared and the
    /// value has the kind of its default.
    fn accepts(&self, key: &str, value: &FieldValue) -> bool {
        self.schema()
            .iter()
            .any(|spec| spec.name == key && spec.default.to_value().same_kind(value))
    }
}

/// JSON object codec with a fixed field schema.
#[derive(Debug)]
pub struct JsonCodec {
    kind: &'static str,
    schema: &'static [FieldSpec],
}

impl JsonCodec {
    pub const fn new(kind: &'static str, schema: &'static [FieldSpec]) -> Self {
        Self { kind, schema }
    }

    fn spec(&self, key: &str) -> Option<&FieldSpec> {
        self.schema.iter().find(|spec| spec.name == key)
    }

    fn decode_side(&self, side: &str, whole: &str, fragment: &str) -> Result<FieldStore, CodecError> {
        match self.deserialize(whole.as_bytes()) {
            Ok(store) => Ok(store),
            Err(first) => {
                // The markers may have swallowed the braces; retry on the
                // bare fragment wrapped as an object.
                let wrapped = format!("{{{}}}", fragment.trim().trim_end_matches(','));
                self.deserialize(wrapped.as_bytes()).map_err(|_| CodecError::InvalidSide {
                    side: side.to_string(),
                    detail: first.to_string(),
                })
            }
        }
    }
}

impl DocumentCodec for JsonCodec {
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn schema(&self) -> &'static [FieldSpec] {
        self.schema
    }

    fn serialize(&self, fields: &FieldStore) -> Vec<u8> {
        let map: Map<String, Value> = fields
            .filled(self.schema)
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect();
        let mut out = format!("{:#}", Value::Object(map));
        out.push('\n');
        out.into_bytes()
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<FieldStore, CodecError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| CodecError::InvalidJson(e.to_string()))?;
        let Value::Object(object) = value else {
            return Err(CodecError::NotAnObject);
        };

        let mut store = FieldStore::new();
        for (key, json) in object {
            let Some(spec) = self.spec(&key) else {
                // Undeclared keys are carried verbatim, null and nested values included.
                store.set(key, FieldValue::from_json(json));
                continue;
            };
            if json.is_null() {
                continue;
            }
            let value = FieldValue::from_json(json);
            let expected = spec.default.to_value();
            if !value.same_kind(&expected) {
                return Err(CodecError::TypeMismatch {
                    field: key,
                    expected: expected.kind_name().to_string(),
                });
            }
            store.set(key, value);
        }
        Ok(store)
    }

    fn parse_conflict(&self, bytes: &[u8]) -> Result<(FieldStore, FieldStore), CodecError> {
        let sides = split_conflict(bytes)?;
        let current = self.decode_side("current", &sides.current, &sides.current_fragment)?;
        let incoming = self.decode_side("incoming", &sides.incoming, &sides.incoming_fragment)?;
        debug!(kind = self.kind, hunks = sides.hunks, "parsed conflicted document");
        Ok((current, incoming))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::DefaultValue;

    const SCHEMA: &[FieldSpec] = &[
        FieldSpec {
            name: "contents",
            default: DefaultValue::String(""),
        },
        FieldSpec {
            name: "pinned",
            default: DefaultValue::Bool(false),
        },
    ];
    static CODEC: JsonCodec = JsonCodec::new("test", SCHEMA);

    #[test]
    fn test_serialize_empty_store_uses_defaults() {
        let bytes = CODEC.serialize(&FieldStore::new());
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["contents"], "");
        assert_eq!(value["pinned"], false);
    }

    #[test]
    fn test_unknown_keys_pass_through() {
        let store = CODEC
            .deserialize(br#"{"contents": "a", "color": "red", "rank": 2}"#)
            .unwrap();
        assert_eq!(store.get("color").and_then(|v| v.as_str()), Some("red"));

        let value: Value = serde_json::from_slice(&CODEC.serialize(&store)).unwrap();
        assert_eq!(value["color"], "red");
        assert!(value["rank"].is_u64());
        assert_eq!(value["rank"], 2);
    }

    #[test]
    fn test_nested_and_null_unknown_keys_round_trip() {
        let text = br#"{"contents": "x", "tags": ["a", {"b": 1}], "meta": null}"#;
        let store = CODEC.deserialize(text).unwrap();
        assert_eq!(
            store.get("tags"),
            Some(&FieldValue::Opaque(serde_json::json!(["a", {"b": 1}])))
        );
        assert_eq!(store.get("meta"), Some(&FieldValue::Opaque(Value::Null)));

        let written: Value = serde_json::from_slice(&CODEC.serialize(&store)).unwrap();
        let original: Value = serde_json::from_slice(text).unwrap();
        assert_eq!(written["tags"], original["tags"]);
        assert!(written.as_object().unwrap().contains_key("meta"));
        assert!(written["meta"].is_null());
    }

    #[test]
    fn test_large_integers_survive_rewrite() {
        let store = CODEC
            .deserialize(br#"{"contents": "x", "id": 9007199254740993, "rank": 2}"#)
            .unwrap();
        let text = String::from_utf8(CODEC.serialize(&store)).unwrap();
        assert!(text.contains("9007199254740993"));
        assert!(!text.contains("2.0"));

        let again = CODEC.deserialize(text.as_bytes()).unwrap();
        assert_eq!(again, store);
    }

    #[test]
    fn test_accepts_only_declared_kinds() {
        assert!(CODEC.accepts("contents", &FieldValue::from("x")));
        assert!(!CODEC.accepts("contents", &FieldValue::from(1i64)));
        assert!(!CODEC.accepts("contents", &FieldValue::Opaque(Value::Null)));
        assert!(!CODEC.accepts("color", &FieldValue::from("red")));
    }

    #[test]
    fn test_deserialize_errors() {
        assert!(matches!(
            CODEC.deserialize(b"not json"),
            Err(CodecError::InvalidJson(_))
        ));
        assert_eq!(CODEC.deserialize(b"[1, 2]"), Err(CodecError::NotAnObject));
        assert_eq!(
            CODEC.deserialize(br#"{"contents": 5}"#),
            Err(CodecError::TypeMismatch {
                field: "contents".into(),
                expected: "string".into(),
            })
        );
        assert_eq!(
            CODEC.deserialize(br#"{"pinned": ["a"]}"#),
            Err(CodecError::TypeMismatch {
                field: "pinned".into(),
                expected: "boolean".into(),
            })
        );
    }

    #[test]
    fn test_null_reads_as_absent() {
        let store = CODEC.deserialize(br#"{"contents": null}"#).unwrap();
        assert!(store.get("contents").is_none());
    }

    #[test]
    fn test_parse_conflict_with_context() {
        let text = "{\n<<<<<<< HEAD\n  \"contents\" : \"1\"\n=======\n  \"contents\" : \"tests\"\n>>>>>>> main\n}\n";
        let (current, incoming) = CODEC.parse_conflict(text.as_bytes()).unwrap();
        assert_eq!(current.get("contents").and_then(|v| v.as_str()), Some("1"));
        assert_eq!(incoming.get("contents").and_then(|v| v.as_str()), Some("tests"));
    }

    #[test]
    fn test_parse_conflict_wraps_bare_fragments() {
        // No surrounding braces, so only the wrapped fragment parses.
        let text = "<<<<<<< HEAD\n\"contents\": \"1\",\n=======\n\"contents\": \"2\",\n>>>>>>> main\n";
        let (current, incoming) = CODEC.parse_conflict(text.as_bytes()).unwrap();
        assert_eq!(current.get("contents").and_then(|v| v.as_str()), Some("1"));
        assert_eq!(incoming.get("contents").and_then(|v| v.as_str()), Some("2"));
    }

    #[test]
    fn test_parse_conflict_rejects_broken_side() {
        let text = "{\n<<<<<<< HEAD\n  \"contents\" : \"1\"\n=======\n  \"contents\" : \n>>>>>>> main\n}\n";
        assert!(matches!(
            CODEC.parse_conflict(text.as_bytes()),
            Err(CodecError::InvalidSide { ref side, .. }) if side == "incoming"
        ));
    }
}
