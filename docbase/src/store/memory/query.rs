//! Query evaluation shared by the in-memory collection and its aggregation
//! engine: filter matching, sorting, projection and update operators.

use crate::collection::Document;
use crate::common::{SortOrder, SortSpec, Value, DOC_ID, FIELD_SEPARATOR, SET_OPERATOR};
use crate::errors::{DataError, DataResult, ErrorKind};
use std::cmp::Ordering;

pub(crate) fn execution_error(message: &str) -> DataError {
    log::error!("{}", message);
    DataError::new(message, ErrorKind::ExecutionError)
}

/// Evaluates `filter` against `document`.
///
/// Plain values match by equality (an array field matches when any element
/// is equal). A missing field matches `null`. Field conditions may use the
/// comparison operators `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`,
/// `$nin` and `$exists`; filters may be combined with `$and`, `$or` and
/// `$nor`.
pub(crate) fn matches(document: &Document, filter: &Document) -> DataResult<bool> {
    for (field, condition) in filter.iter() {
        let matched = match field.as_str() {
            "$and" => logical_operands(field, condition)?
                .iter()
                .map(|sub| matches(document, sub))
                .collect::<DataResult<Vec<bool>>>()?
                .into_iter()
                .all(|m| m),
            "$or" => logical_operands(field, condition)?
                .iter()
                .map(|sub| matches(document, sub))
                .collect::<DataResult<Vec<bool>>>()?
                .into_iter()
                .any(|m| m),
            "$nor" => !logical_operands(field, condition)?
                .iter()
                .map(|sub| matches(document, sub))
                .collect::<DataResult<Vec<bool>>>()?
                .into_iter()
                .any(|m| m),
            name if name.starts_with('$') => {
                return Err(execution_error(&format!("Unknown top level operator: {}", name)));
            }
            _ => field_matches(document.get_path(field), condition)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn logical_operands<'a>(operator: &str, condition: &'a Value) -> DataResult<Vec<&'a Document>> {
    let items = condition.as_array().filter(|items| !items.is_empty()).ok_or_else(|| {
        execution_error(&format!("{} must be a nonempty array", operator))
    })?;
    items
        .iter()
        .map(|item| {
            item.as_document().ok_or_else(|| {
                execution_error(&format!("{} entries must be documents", operator))
            })
        })
        .collect()
}

fn is_operator_document(condition: &Value) -> bool {
    match condition.as_document() {
        Some(document) => !document.is_empty() && document.keys().all(|k| k.starts_with('$')),
        None => false,
    }
}

fn field_matches(actual: Option<&Value>, condition: &Value) -> DataResult<bool> {
    if !is_operator_document(condition) {
        return Ok(equals(actual, condition));
    }

    if let Some(operators) = condition.as_document() {
        for (operator, operand) in operators.iter() {
            let matched = match operator.as_str() {
                "$eq" => equals(actual, operand),
                "$ne" => !equals(actual, operand),
                "$gt" => compares(actual, operand, |o| o == Ordering::Greater),
                "$gte" => compares(actual, operand, |o| o != Ordering::Less),
                "$lt" => compares(actual, operand, |o| o == Ordering::Less),
                "$lte" => compares(actual, operand, |o| o != Ordering::Greater),
                "$in" => in_list(actual, operator, operand)?,
                "$nin" => !in_list(actual, operator, operand)?,
                "$exists" => {
                    let wanted = operand.as_bool().unwrap_or_else(|| operand.as_i64() != Some(0));
                    actual.is_some() == wanted
                }
                other => {
                    return Err(execution_error(&format!("Unknown operator: {}", other)));
                }
            };
            if !matched {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(Value::Array(items)) if !matches!(expected, Value::Array(_)) => {
            items.iter().any(|item| item == expected)
        }
        Some(value) => value == expected,
    }
}

fn same_class(a: &Value, b: &Value) -> bool {
    (a.is_number() && b.is_number()) || a.type_name() == b.type_name()
}

fn compares(actual: Option<&Value>, operand: &Value, accept: fn(Ordering) -> bool) -> bool {
    match actual {
        None => false,
        Some(Value::Array(items)) if !matches!(operand, Value::Array(_)) => items
            .iter()
            .any(|item| same_class(item, operand) && accept(item.cmp(operand))),
        Some(value) => same_class(value, operand) && accept(value.cmp(operand)),
    }
}

fn in_list(actual: Option<&Value>, operator: &str, operand: &Value) -> DataResult<bool> {
    let candidates = operand
        .as_array()
        .ok_or_else(|| execution_error(&format!("{} needs an array", operator)))?;
    Ok(candidates.iter().any(|candidate| equals(actual, candidate)))
}

/// Stable sort by every field of `spec`. A missing field sorts before any
/// present value.
pub(crate) fn sort_documents(documents: &mut [Document], spec: &SortSpec) {
    documents.sort_by(|a, b| {
        for (field, order) in spec.fields() {
            let ordering = a.get_path(field).cmp(&b.get_path(field));
            let ordering = match order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// Keeps `_id` and the named fields.
pub(crate) fn project(document: &Document, fields: &[String]) -> Document {
    let mut projected = Document::new();
    if let Some(id) = document.id() {
        projected.put(DOC_ID, id.clone());
    }
    for field in fields {
        if field == DOC_ID {
            continue;
        }
        if let Some(value) = document.get_path(field) {
            projected.set_path(field, value.clone());
        }
    }
    projected
}

/// Removes a field by dotted path.
pub(crate) fn unset_path(document: &mut Document, path: &str) -> Option<Value> {
    if document.contains_key(path) {
        return document.remove(path);
    }
    let (head, rest) = path.split_once(FIELD_SEPARATOR)?;
    document
        .get_mut(head)
        .and_then(|value| value.as_document_mut())
        .and_then(|nested| unset_path(nested, rest))
}

/// Values of the index fields, `null` for missing ones.
pub(crate) fn index_key(document: &Document, keys: &SortSpec) -> Vec<Value> {
    keys.fields()
        .iter()
        .map(|(field, _)| document.get_path(field).cloned().unwrap_or_default())
        .collect()
}

/// Adds two numbers, staying integral while both sides are integers and
/// the sum fits.
pub(crate) fn add_numbers(a: &Value, b: &Value) -> Option<Value> {
    match (a, b) {
        (Value::I64(x), Value::I64(y)) => Some(
            x.checked_add(*y)
                .map(Value::I64)
                .unwrap_or(Value::F64(*x as f64 + *y as f64)),
        ),
        _ => Some(Value::F64(a.as_f64()? + b.as_f64()?)),
    }
}

/// Rejects update documents that are empty or contain anything other than
/// the supported operators (`$set`, `$unset`, `$inc`) with document
/// arguments.
pub(crate) fn validate_update(update: &Document) -> DataResult<()> {
    if update.is_empty() {
        return Err(execution_error("Update document must not be empty"));
    }
    for (operator, arguments) in update.iter() {
        if !operator.starts_with('$') {
            return Err(execution_error(&format!(
                "Update document requires atomic operators, found field {}",
                operator
            )));
        }
        if !matches!(operator.as_str(), SET_OPERATOR | "$unset" | "$inc") {
            return Err(execution_error(&format!("Unknown update operator: {}", operator)));
        }
        if arguments.as_document().is_none() {
            return Err(execution_error(&format!(
                "Modifiers for {} must be a document",
                operator
            )));
        }
    }
    Ok(())
}

/// Applies a validated update document to a copy of `document`.
///
/// The `_id` field is immutable; an update that would change it fails.
pub(crate) fn apply_update(document: &Document, update: &Document) -> DataResult<Document> {
    let mut updated = document.clone();
    for (operator, arguments) in update.iter() {
        let Some(arguments) = arguments.as_document() else {
            continue;
        };
        for (path, value) in arguments.iter() {
            match operator.as_str() {
                SET_OPERATOR => updated.set_path(path, value.clone()),
                "$unset" => {
                    unset_path(&mut updated, path);
                }
                "$inc" => {
                    let current = updated.get_path(path).cloned().unwrap_or(Value::I64(0));
                    let sum = add_numbers(&current, value).ok_or_else(|| {
                        execution_error(&format!(
                            "Cannot apply $inc to {} of type {}",
                            path,
                            current.type_name()
                        ))
                    })?;
                    updated.set_path(path, sum);
                }
                _ => {}
            }
        }
    }

    if updated.id() != document.id() {
        return Err(execution_error("Performing an update on the path '_id' would modify the immutable field '_id'"));
    }
    Ok(updated)
}
