//! Aggregation pipelines written as JSON text.
//!
//! A pipeline is either a single stage object, `{"$match": {...}}`, or an
//! array of stage objects, `[{"$match": {...}}, {"$sort": {...}}]`. Stage
//! order and the key order inside every stage are preserved exactly as
//! written; `$sort` and `$group` depend on it.

use crate::collection::Document;
use crate::common::Value;
use crate::errors::{DataError, DataResult, ErrorKind};
use std::fmt::{Display, Formatter};

/// One aggregation stage, an ordered document such as `{"$limit": 10}`.
pub type PipelineStage = Document;

/// An ordered sequence of aggregation stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<PipelineStage>,
}

impl Pipeline {
    pub fn new(stages: Vec<PipelineStage>) -> Self {
        Pipeline { stages }
    }

    /// Appends a stage.
    pub fn stage(mut self, stage: PipelineStage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stages(&self) -> &[PipelineStage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PipelineStage> {
        self.stages.iter()
    }
}

impl From<Vec<PipelineStage>> for Pipeline {
    fn from(stages: Vec<PipelineStage>) -> Self {
        Pipeline::new(stages)
    }
}

impl IntoIterator for Pipeline {
    type Item = PipelineStage;
    type IntoIter = std::vec::IntoIter<PipelineStage>;

    fn into_iter(self) -> Self::IntoIter {
        self.stages.into_iter()
    }
}

impl Display for Pipeline {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let stages: Vec<serde_json::Value> = self.stages.iter().map(|s| s.to_json()).collect();
        write!(f, "{}", serde_json::Value::Array(stages))
    }
}

/// Parses pipeline text into an ordered [Pipeline].
///
/// Leading and trailing whitespace is ignored. Text that does not start
/// with `[` is read as one stage. Malformed text, a top level that is
/// neither an object nor an array, and any non-object stage all fail with
/// [ErrorKind::ParseError].
///
/// ```rust
/// use docbase::pipeline::parse_pipeline;
///
/// let pipeline = parse_pipeline(r#"[{"$match": {"uid": 7}}, {"$limit": 5}]"#).unwrap();
/// assert_eq!(pipeline.len(), 2);
/// ```
pub fn parse_pipeline(text: &str) -> DataResult<Pipeline> {
    let text = text.trim();
    if text.starts_with('[') {
        let stages: Vec<serde_json::Value> = serde_json::from_str(text).map_err(|err| {
            log::error!("Failed to parse aggregation pipeline: {}", err);
            DataError::new(
                &format!("Failed to parse aggregation pipeline: {}", err),
                ErrorKind::ParseError,
            )
        })?;

        let mut pipeline = Vec::with_capacity(stages.len());
        for (position, stage) in stages.into_iter().enumerate() {
            pipeline.push(stage_from_json(stage, position)?);
        }
        Ok(Pipeline::new(pipeline))
    } else {
        let stage: serde_json::Value = serde_json::from_str(text).map_err(|err| {
            log::error!("Failed to parse aggregation stage: {}", err);
            DataError::new(
                &format!("Failed to parse aggregation stage: {}", err),
                ErrorKind::ParseError,
            )
        })?;
        Ok(Pipeline::new(vec![stage_from_json(stage, 0)?]))
    }
}

fn stage_from_json(stage: serde_json::Value, position: usize) -> DataResult<PipelineStage> {
    match Value::from(stage) {
        Value::Document(document) => Ok(document),
        other => {
            log::error!(
                "Aggregation stage {} must be an object, found {}",
                position,
                other.type_name()
            );
            Err(DataError::new(
                &format!(
                    "Aggregation stage {} must be an object, found {}",
                    position,
                    other.type_name()
                ),
                ErrorKind::ParseError,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn single_stage_without_brackets() {
        let pipeline = parse_pipeline(r#"{"$match": {"uid": 7}}"#).unwrap();
        assert_eq!(pipeline.len(), 1);
        assert_eq!(pipeline.stages()[0], doc! { "$match": { uid: 7 } });
    }

    #[test]
    fn stages_keep_their_order() {
        let pipeline =
            parse_pipeline(r#" [{"$match": {"a": 1}}, {"$group": {"_id": "$b", "n": {"$sum": 1}}}] "#)
                .unwrap();
        assert_eq!(pipeline.len(), 2);
        assert!(pipeline.stages()[0].contains_key("$match"));
        assert!(pipeline.stages()[1].contains_key("$group"));
    }

    #[test]
    fn keys_inside_a_stage_keep_their_order() {
        let pipeline = parse_pipeline(r#"{"$sort": {"z": -1, "a": 1, "m": -1}}"#).unwrap();
        let sort = pipeline.stages()[0].get("$sort").and_then(|v| v.as_document()).unwrap();
        let keys: Vec<&String> = sort.keys().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn unterminated_array_is_parse_error() {
        let err = parse_pipeline(r#"[{"$match": {"a": 1}}"#).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ParseError);
    }

    #[test]
    fn non_object_stage_is_parse_error() {
        assert!(parse_pipeline("[1, 2]").unwrap_err().is_parse_error());
        assert!(parse_pipeline("42").unwrap_err().is_parse_error());
        assert!(parse_pipeline("").unwrap_err().is_parse_error());
    }

    #[test]
    fn empty_array_is_empty_pipeline() {
        assert!(parse_pipeline("[]").unwrap().is_empty());
    }

    #[test]
    fn numbers_become_integers_when_they_fit() {
        let pipeline = parse_pipeline(r#"{"$limit": 10}"#).unwrap();
        assert_eq!(pipeline.stages()[0].get("$limit"), Some(&Value::I64(10)));
        let pipeline = parse_pipeline(r#"{"$match": {"score": 1.5}}"#).unwrap();
        let filter = pipeline.stages()[0].get("$match").and_then(|v| v.as_document()).unwrap();
        assert_eq!(filter.get("score"), Some(&Value::F64(1.5)));
    }

    #[test]
    fn display_renders_json_array() {
        let pipeline = Pipeline::new(vec![doc! { "$limit": 1 }]);
        assert_eq!(pipeline.to_string(), r#"[{"$limit":1}]"#);
    }
}
