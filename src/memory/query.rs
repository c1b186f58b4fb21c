use std::cmp::Ordering;

use super::command::{Failure, Reply};
use crate::{
    bson::{Bson, Document},
    bson_util::{compare, get_path, same_type_bracket, values_equal},
};

/// Whether `document` matches the query `filter`.
pub(super) fn matches(document: &Document, filter: &Document) -> Reply<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => clauses(key, condition)?
                .iter()
                .try_fold(true, |acc, clause| Ok::<_, Failure>(acc && matches(document, clause)?))?,
            "$or" => {
                let mut any = false;
                for clause in clauses(key, condition)? {
                    if matches(document, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for clause in clauses(key, condition)? {
                    if matches(document, clause)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            other if other.starts_with('$') => {
                return Err(Failure::bad_value(format!(
                    "unknown top level operator: {}",
                    other
                )))
            }
            path => field_matches(get_path(document, path), condition)?,
        };

        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(operator: &str, condition: &'a Bson) -> Reply<Vec<&'a Document>> {
    let not_an_array = || {
        Failure::bad_value(format!(
            "{} must be a nonempty array of objects",
            operator
        ))
    };
    match condition {
        Bson::Array(clauses) if !clauses.is_empty() => clauses
            .iter()
            .map(|clause| clause.as_document().ok_or_else(not_an_array))
            .collect(),
        _ => Err(not_an_array()),
    }
}

fn is_operator_document(condition: &Bson) -> bool {
    matches!(condition, Bson::Document(doc) if doc.keys().next().is_some_and(|k| k.starts_with('$')))
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> Reply<bool> {
    let operators = match condition {
        Bson::Document(operators) if is_operator_document(condition) => operators,
        _ => return Ok(equals(value, condition)),
    };

    for (operator, operand) in operators {
        let matched = match operator.as_str() {
            "$eq" => equals(value, operand),
            "$ne" => !equals(value, operand),
            "$gt" => compares(value, operand, |o| o == Ordering::Greater),
            "$gte" => compares(value, operand, |o| o != Ordering::Less),
            "$lt" => compares(value, operand, |o| o == Ordering::Less),
            "$lte" => compares(value, operand, |o| o != Ordering::Greater),
            "$in" => in_array(value, operand, "$in")?,
            "$nin" => !in_array(value, operand, "$nin")?,
            "$exists" => value.is_some() == truthy(operand),
            other => {
                return Err(Failure::bad_value(format!("unknown operator: {}", other)));
            }
        };

        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Equality as the server applies it to a field: a missing field equals `null`, and an array
/// field matches if it equals the operand or any of its elements does.
fn equals(value: Option<&Bson>, operand: &Bson) -> bool {
    match value {
        None => matches!(operand, Bson::Null),
        Some(value) if values_equal(value, operand) => true,
        Some(Bson::Array(elements)) => elements.iter().any(|e| values_equal(e, operand)),
        Some(_) => false,
    }
}

fn compares(value: Option<&Bson>, operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    let check = |v: &Bson| same_type_bracket(v, operand) && accept(compare(v, operand));
    match value {
        None => false,
        Some(Bson::Array(elements)) if !matches!(operand, Bson::Array(_)) => {
            elements.iter().any(check)
        }
        Some(value) => check(value),
    }
}

fn in_array(value: Option<&Bson>, operand: &Bson, operator: &str) -> Reply<bool> {
    match operand {
        Bson::Array(candidates) => Ok(candidates.iter().any(|c| equals(value, c))),
        _ => Err(Failure::bad_value(format!("{} needs an array", operator))),
    }
}

pub(super) fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null | Bson::Undefined => false,
        other => crate::bson_util::get_f64(other).map_or(true, |n| n != 0.0),
    }
}
