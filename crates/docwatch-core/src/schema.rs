//! Schema adapters.
//!
//! A schema adapter tells a watcher how to read the documents of one
//! collection: how to decode a stored document, which identifier it carries
//! and how to turn it into the domain model handlers work with. Nothing past
//! the decode step sees the stored representation.

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;
use crate::feed::RawDocument;

/// Per-document-type adapter injected into a watcher.
pub trait SchemaAdapter: Send + Sync + 'static {
    /// Stored representation of a document.
    type Document: DeserializeOwned + Send;
    /// Domain model handed to event handlers.
    type Model: Send + Sync + 'static;

    /// Stable unique identifier of a document.
    fn id(&self, document: &Self::Document) -> String;

    /// Convert a stored document to the domain model.
    fn to_model(&self, document: Self::Document) -> Self::Model;

    /// Decode a raw stored document.
    fn decode(&self, raw: RawDocument) -> Result<Self::Document, Error> {
        Ok(serde_json::from_value(raw)?)
    }
}

/// A schemaless JSON document with a mandatory identifier.
///
/// The identifier is read from `id` or `_id` and may be a string or an
/// integer; every other top-level field is kept as is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonDocument {
    /// Document identifier.
    #[serde(alias = "_id", deserialize_with = "deserialize_id")]
    pub id: String,
    /// Remaining fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl JsonDocument {
    /// Read a document from a JSON value.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        if !value.is_object() {
            return Err(Error::InvalidDocument(
                "document must be a JSON object".to_string(),
            ));
        }
        serde_json::from_value(value).map_err(|e| Error::InvalidDocument(e.to_string()))
    }

    /// The document as a JSON object, identifier under `id`.
    pub fn into_value(self) -> Value {
        let mut fields = self.fields;
        fields.insert("id".to_string(), Value::String(self.id));
        Value::Object(fields)
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(id) if !id.is_empty() => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(de::Error::custom(format!(
            "document id must be a non-empty string or a number, got {}",
            other
        ))),
    }
}

/// Adapter for collections of [`JsonDocument`]s, modeled as JSON values.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchema;

impl SchemaAdapter for JsonSchema {
    type Document = JsonDocument;
    type Model = Value;

    fn id(&self, document: &JsonDocument) -> String {
        document.id.clone()
    }

    fn to_model(&self, document: JsonDocument) -> Value {
        document.into_value()
    }
}
