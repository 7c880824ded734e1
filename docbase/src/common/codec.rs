use crate::collection::Document;
use crate::common::Value;
use crate::errors::{DataError, DataResult, ErrorKind};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serializes an entity into a [Document].
///
/// Field order follows the struct's declaration order. Anything that does
/// not serialize to a JSON object (a bare number, a list) is rejected with
/// [ErrorKind::EncodeError].
pub fn to_document<T: Serialize + ?Sized>(item: &T) -> DataResult<Document> {
    let json = serde_json::to_value(item).map_err(|err| {
        log::error!("Failed to encode value: {}", err);
        DataError::new(&format!("Failed to encode value: {}", err), ErrorKind::EncodeError)
    })?;
    match Value::from(json) {
        Value::Document(document) => Ok(document),
        other => {
            log::error!("Expected a document-shaped value, found {}", other.type_name());
            Err(DataError::new(
                &format!("Expected a document-shaped value, found {}", other.type_name()),
                ErrorKind::EncodeError,
            ))
        }
    }
}

/// Decodes a stored [Document] into the caller's type.
///
/// A shape mismatch fails with [ErrorKind::DecodeError], which signals a
/// schema bug rather than missing data.
pub fn from_document<T: DeserializeOwned>(document: &Document) -> DataResult<T> {
    serde_json::from_value(document.to_json()).map_err(|err| {
        log::error!("Failed to decode document {}: {}", document, err);
        DataError::new(&format!("Failed to decode document: {}", err), ErrorKind::DecodeError)
    })
}

/// Decodes a batch of documents, failing on the first mismatch.
pub fn from_documents<T: DeserializeOwned>(documents: &[Document]) -> DataResult<Vec<T>> {
    documents.iter().map(from_document).collect()
}
