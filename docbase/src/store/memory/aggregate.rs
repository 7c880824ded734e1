//! In-process execution of aggregation pipelines.
//!
//! Supported stages: `$match`, `$sort`, `$skip`, `$limit`, `$project`,
//! `$group` (with `$sum`, `$avg`, `$min`, `$max`, `$first`, `$last`,
//! `$push`) and `$count`. Any other stage fails with
//! [ErrorKind::ExecutionError](crate::errors::ErrorKind::ExecutionError).

use super::query::{add_numbers, execution_error, matches, sort_documents, unset_path};
use crate::collection::Document;
use crate::common::{CallContext, SortSpec, Value, DOC_ID, FIELD_SEPARATOR};
use crate::errors::DataResult;
use crate::pipeline::{Pipeline, PipelineStage};
use std::collections::BTreeMap;

pub(crate) fn run_pipeline(
    ctx: &CallContext,
    documents: Vec<Document>,
    pipeline: &Pipeline,
) -> DataResult<Vec<Document>> {
    let mut current = documents;
    for stage in pipeline.iter() {
        ctx.check()?;
        current = run_stage(current, stage)?;
    }
    Ok(current)
}

fn run_stage(documents: Vec<Document>, stage: &PipelineStage) -> DataResult<Vec<Document>> {
    let mut fields = stage.iter();
    let (name, spec) = match (fields.next(), fields.next()) {
        (Some(entry), None) => entry,
        _ => {
            return Err(execution_error(&format!(
                "A pipeline stage specification must contain exactly one field, found {}",
                stage.len()
            )));
        }
    };

    match name.as_str() {
        "$match" => {
            let filter = stage_document(name, spec)?;
            let mut matched = Vec::new();
            for document in documents {
                if matches(&document, filter)? {
                    matched.push(document);
                }
            }
            Ok(matched)
        }
        "$sort" => {
            let keys = SortSpec::from_document(stage_document(name, spec)?)
                .map_err(|err| execution_error(err.message()))?;
            if keys.is_empty() {
                return Err(execution_error("$sort stage must have at least one sort key"));
            }
            let mut sorted = documents;
            sort_documents(&mut sorted, &keys);
            Ok(sorted)
        }
        "$skip" => {
            let skip = stage_count(name, spec, true)?;
            Ok(documents.into_iter().skip(skip).collect())
        }
        "$limit" => {
            let limit = stage_count(name, spec, false)?;
            Ok(documents.into_iter().take(limit).collect())
        }
        "$project" => {
            let projection = Projection::parse(stage_document(name, spec)?)?;
            documents.iter().map(|d| projection.apply(d)).collect()
        }
        "$group" => group(documents, stage_document(name, spec)?),
        "$count" => {
            let field = spec
                .as_str()
                .filter(|f| !f.is_empty() && !f.starts_with('$') && !f.contains(FIELD_SEPARATOR))
                .ok_or_else(|| {
                    execution_error("$count requires a non-empty field name without '$' or '.'")
                })?;
            if documents.is_empty() {
                return Ok(Vec::new());
            }
            let mut result = Document::new();
            result.put(field, documents.len());
            Ok(vec![result])
        }
        other => Err(execution_error(&format!(
            "Unrecognized pipeline stage name: '{}'",
            other
        ))),
    }
}

fn stage_document<'a>(name: &str, spec: &'a Value) -> DataResult<&'a Document> {
    spec.as_document().ok_or_else(|| {
        execution_error(&format!(
            "The {} stage specification must be an object, found {}",
            name,
            spec.type_name()
        ))
    })
}

fn stage_count(name: &str, spec: &Value, allow_zero: bool) -> DataResult<usize> {
    match spec.as_i64() {
        Some(n) if n > 0 || (allow_zero && n == 0) => Ok(n as usize),
        _ => Err(execution_error(&format!(
            "Invalid argument to {} stage: {}",
            name, spec
        ))),
    }
}

/// Evaluates an expression against a document. `"$path"` reads a field,
/// a document is evaluated field by field, anything else is a literal.
/// Returns `None` when a referenced field is missing.
fn evaluate(document: &Document, expression: &Value) -> DataResult<Option<Value>> {
    match expression {
        Value::String(text) if text.starts_with('$') => {
            Ok(document.get_path(&text[1..]).cloned())
        }
        Value::Document(fields) => {
            let mut result = Document::new();
            for (key, sub) in fields.iter() {
                if key.starts_with('$') {
                    return Err(execution_error(&format!(
                        "Unsupported expression operator: {}",
                        key
                    )));
                }
                if let Some(value) = evaluate(document, sub)? {
                    result.put(key.clone(), value);
                }
            }
            Ok(Some(Value::Document(result)))
        }
        literal => Ok(Some(literal.clone())),
    }
}

enum ProjectionField {
    Include,
    Exclude,
    Computed(Value),
}

struct Projection {
    include_id: bool,
    fields: Vec<(String, ProjectionField)>,
    exclusion: bool,
}

impl Projection {
    fn parse(spec: &Document) -> DataResult<Projection> {
        let mut include_id = true;
        let mut fields = Vec::new();
        let mut has_inclusion = false;
        let mut has_exclusion = false;

        for (field, value) in spec.iter() {
            let kind = match value {
                Value::Bool(flag) => flag_field(*flag),
                Value::I64(_) | Value::F64(_) => flag_field(value.as_f64() != Some(0.0)),
                other => ProjectionField::Computed(other.clone()),
            };
            if field == DOC_ID {
                match kind {
                    ProjectionField::Exclude => include_id = false,
                    ProjectionField::Include => {}
                    computed => {
                        has_inclusion = true;
                        fields.push((field.clone(), computed));
                    }
                }
                continue;
            }
            match kind {
                ProjectionField::Exclude => has_exclusion = true,
                _ => has_inclusion = true,
            }
            fields.push((field.clone(), kind));
        }

        if has_inclusion && has_exclusion {
            return Err(execution_error(
                "Cannot mix inclusion and exclusion in a $project stage",
            ));
        }
        if fields.is_empty() && include_id {
            return Err(execution_error("$project requires at least one output field"));
        }
        Ok(Projection {
            include_id,
            fields,
            exclusion: has_exclusion || !has_inclusion,
        })
    }

    fn apply(&self, document: &Document) -> DataResult<Document> {
        if self.exclusion {
            let mut projected = document.clone();
            for (field, _) in &self.fields {
                unset_path(&mut projected, field);
            }
            if !self.include_id {
                projected.remove(DOC_ID);
            }
            return Ok(projected);
        }

        let mut projected = Document::new();
        if self.include_id {
            if let Some(id) = document.id() {
                projected.put(DOC_ID, id.clone());
            }
        }
        for (field, kind) in &self.fields {
            let value = match kind {
                ProjectionField::Include => document.get_path(field).cloned(),
                ProjectionField::Computed(expression) => evaluate(document, expression)?,
                ProjectionField::Exclude => None,
            };
            if let Some(value) = value {
                projected.set_path(field, value);
            }
        }
        Ok(projected)
    }
}

fn flag_field(include: bool) -> ProjectionField {
    if include {
        ProjectionField::Include
    } else {
        ProjectionField::Exclude
    }
}

#[derive(Clone, Copy)]
enum Accumulator {
    Sum,
    Avg,
    Min,
    Max,
    First,
    Last,
    Push,
}

impl Accumulator {
    fn parse(name: &str) -> DataResult<Accumulator> {
        match name {
            "$sum" => Ok(Accumulator::Sum),
            "$avg" => Ok(Accumulator::Avg),
            "$min" => Ok(Accumulator::Min),
            "$max" => Ok(Accumulator::Max),
            "$first" => Ok(Accumulator::First),
            "$last" => Ok(Accumulator::Last),
            "$push" => Ok(Accumulator::Push),
            other => Err(execution_error(&format!("Unknown group operator '{}'", other))),
        }
    }

    fn start(&self) -> AccumulatorState {
        match self {
            Accumulator::Sum => AccumulatorState::Sum(Value::I64(0)),
            Accumulator::Avg => AccumulatorState::Avg { total: 0.0, count: 0 },
            Accumulator::Min => AccumulatorState::Min(None),
            Accumulator::Max => AccumulatorState::Max(None),
            Accumulator::First => AccumulatorState::First(None),
            Accumulator::Last => AccumulatorState::Last(Value::Null),
            Accumulator::Push => AccumulatorState::Push(Vec::new()),
        }
    }
}

enum AccumulatorState {
    Sum(Value),
    Avg { total: f64, count: u64 },
    Min(Option<Value>),
    Max(Option<Value>),
    First(Option<Value>),
    Last(Value),
    Push(Vec<Value>),
}

impl AccumulatorState {
    fn accept(&mut self, value: Option<Value>) {
        match self {
            AccumulatorState::Sum(sum) => {
                if let Some(next) = value.as_ref().and_then(|v| add_numbers(sum, v)) {
                    *sum = next;
                }
            }
            AccumulatorState::Avg { total, count } => {
                if let Some(number) = value.as_ref().and_then(|v| v.as_f64()) {
                    *total += number;
                    *count += 1;
                }
            }
            AccumulatorState::Min(current) => {
                if let Some(v) = value.filter(|v| !v.is_null()) {
                    if current.as_ref().map_or(true, |c| v < *c) {
                        *current = Some(v);
                    }
                }
            }
            AccumulatorState::Max(current) => {
                if let Some(v) = value.filter(|v| !v.is_null()) {
                    if current.as_ref().map_or(true, |c| v > *c) {
                        *current = Some(v);
                    }
                }
            }
            AccumulatorState::First(current) => {
                if current.is_none() {
                    *current = Some(value.unwrap_or_default());
                }
            }
            AccumulatorState::Last(current) => *current = value.unwrap_or_default(),
            AccumulatorState::Push(items) => {
                if let Some(v) = value {
                    items.push(v);
                }
            }
        }
    }

    fn finish(self) -> Value {
        match self {
            AccumulatorState::Sum(sum) => sum,
            AccumulatorState::Avg { total, count } => {
                if count == 0 {
                    Value::Null
                } else {
                    Value::F64(total / count as f64)
                }
            }
            AccumulatorState::Min(v) | AccumulatorState::Max(v) | AccumulatorState::First(v) => {
                v.unwrap_or_default()
            }
            AccumulatorState::Last(v) => v,
            AccumulatorState::Push(items) => Value::Array(items),
        }
    }
}

/// Groups documents by the `_id` expression. Groups are emitted in the
/// order their key was first seen.
fn group(documents: Vec<Document>, spec: &Document) -> DataResult<Vec<Document>> {
    let id_expression = spec
        .get(DOC_ID)
        .ok_or_else(|| execution_error("A group specification must include an _id"))?;

    let mut outputs = Vec::new();
    for (field, definition) in spec.iter() {
        if field == DOC_ID {
            continue;
        }
        if field.contains(FIELD_SEPARATOR) {
            return Err(execution_error(&format!(
                "The group field name '{}' cannot contain '.'",
                field
            )));
        }
        let operator = definition.as_document().filter(|d| d.len() == 1).ok_or_else(|| {
            execution_error(&format!("The field '{}' must be an accumulator object", field))
        })?;
        for (name, expression) in operator.iter() {
            outputs.push((field.clone(), Accumulator::parse(name)?, expression.clone()));
        }
    }

    let mut positions: BTreeMap<Value, usize> = BTreeMap::new();
    let mut groups: Vec<(Value, Vec<AccumulatorState>)> = Vec::new();
    for document in &documents {
        let key = evaluate(document, id_expression)?.unwrap_or_default();
        let position = match positions.get(&key) {
            Some(position) => *position,
            None => {
                positions.insert(key.clone(), groups.len());
                groups.push((key, outputs.iter().map(|(_, acc, _)| acc.start()).collect()));
                groups.len() - 1
            }
        };
        for (index, (_, _, expression)) in outputs.iter().enumerate() {
            let value = evaluate(document, expression)?;
            groups[position].1[index].accept(value);
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, states)| {
            let mut result = Document::new();
            result.put(DOC_ID, key);
            for ((field, _, _), state) in outputs.iter().zip(states) {
                result.put(field.clone(), state.finish());
            }
            result
        })
        .collect())
}
