use std::cmp::Ordering;

use super::{
    command::{Failure, Reply},
    query,
};
use crate::{
    bson::{Bson, Document},
    bson_util::{compare, get_int, get_path},
};

/// Stages that produce their own input and so may start a database-level pipeline.
pub(super) const COLLECTIONLESS_STAGES: &[&str] = &["$listLocalSessions"];

/// Runs `pipeline` over `input`. `sessions` supplies the output of `$listLocalSessions`.
pub(super) fn run(
    pipeline: &[Document],
    mut input: Vec<Document>,
    sessions: impl Fn() -> Vec<Document>,
) -> Reply<Vec<Document>> {
    for (index, stage) in pipeline.iter().enumerate() {
        let (name, spec) = match (stage.len(), stage.iter().next()) {
            (1, Some(entry)) => entry,
            _ => {
                return Err(Failure::new(
                    40323,
                    "Location40323",
                    "A pipeline stage specification object must contain exactly one field.",
                ))
            }
        };

        input = match name.as_str() {
            "$match" => {
                let filter = stage_document(name, spec)?;
                let mut matched = Vec::with_capacity(input.len());
                for document in input {
                    if query::matches(&document, filter)? {
                        matched.push(document);
                    }
                }
                matched
            }
            "$limit" => {
                let limit = get_int(spec)
                    .filter(|n| *n > 0)
                    .ok_or_else(|| Failure::bad_value("the limit must be positive"))?;
                input
                    .into_iter()
                    .take(usize::try_from(limit).unwrap_or(usize::MAX))
                    .collect()
            }
            "$skip" => {
                let skip = get_int(spec)
                    .filter(|n| *n >= 0)
                    .ok_or_else(|| Failure::bad_value("the skip must be a non-negative number"))?;
                input
                    .into_iter()
                    .skip(usize::try_from(skip).unwrap_or(usize::MAX))
                    .collect()
            }
            "$sort" => {
                sort(&mut input, stage_document(name, spec)?)?;
                input
            }
            "$project" => {
                let projection = stage_document(name, spec)?;
                input
                    .iter()
                    .map(|document| project(document, projection))
                    .collect::<Reply<_>>()?
            }
            "$addFields" | "$set" => {
                let fields = stage_document(name, spec)?;
                input
                    .into_iter()
                    .map(|mut document| {
                        for (path, expression) in fields {
                            if let Some(value) = evaluate(expression, &document) {
                                set_path(&mut document, path, value);
                            }
                        }
                        document
                    })
                    .collect()
            }
            "$unset" => {
                let paths = unset_paths(spec)?;
                input
                    .into_iter()
                    .map(|mut document| {
                        for path in &paths {
                            remove_path(&mut document, path);
                        }
                        document
                    })
                    .collect()
            }
            "$count" => {
                let field = match spec {
                    Bson::String(field)
                        if !field.is_empty() && !field.starts_with('$') && !field.contains('.') =>
                    {
                        field
                    }
                    _ => {
                        return Err(Failure::bad_value(
                            "the count field must be a non-empty string without '$' or '.'",
                        ))
                    }
                };
                if input.is_empty() {
                    Vec::new()
                } else {
                    let mut result = Document::new();
                    result.insert(field.as_str(), i32::try_from(input.len()).unwrap_or(i32::MAX));
                    vec![result]
                }
            }
            "$listLocalSessions" if index == 0 => sessions(),
            "$listLocalSessions" => {
                return Err(Failure::new(
                    40602,
                    "Location40602",
                    "$listLocalSessions is only valid as the first stage in a pipeline.",
                ))
            }
            other => {
                return Err(Failure::new(
                    40324,
                    "Location40324",
                    format!("Unrecognized pipeline stage name: '{}'", other),
                ))
            }
        };
    }

    Ok(input)
}

fn stage_document<'a>(name: &str, spec: &'a Bson) -> Reply<&'a Document> {
    spec.as_document().ok_or_else(|| {
        Failure::new(
            14,
            "TypeMismatch",
            format!("the {} stage specification must be an object", name),
        )
    })
}

/// Sorts in place by a `{ path: 1 | -1 }` specification. Missing fields sort as `null`.
pub(super) fn sort(documents: &mut [Document], specification: &Document) -> Reply<()> {
    let mut keys = Vec::with_capacity(specification.len());
    for (path, direction) in specification {
        match get_int(direction) {
            Some(1) => keys.push((path.as_str(), false)),
            Some(-1) => keys.push((path.as_str(), true)),
            _ => {
                return Err(Failure::bad_value(
                    "$sort key ordering must be 1 (for ascending) or -1 (for descending)",
                ))
            }
        }
    }
    if keys.is_empty() {
        return Err(Failure::bad_value("$sort stage must have at least one sort key"));
    }

    documents.sort_by(|a, b| {
        keys.iter()
            .map(|(path, descending)| {
                let (x, y) = (
                    get_path(a, path).unwrap_or(&Bson::Null),
                    get_path(b, path).unwrap_or(&Bson::Null),
                );
                let ordering = compare(x, y);
                if *descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            })
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
    Ok(())
}

/// Applies an inclusion or exclusion projection. Values other than numbers and booleans are
/// expressions whose result becomes the projected field.
pub(super) fn project(document: &Document, projection: &Document) -> Reply<Document> {
    let mut include_id = true;
    let mut inclusions = Vec::new();
    let mut exclusions = Vec::new();
    let mut computed = Vec::new();

    for (path, value) in projection {
        match value {
            Bson::Boolean(_) | Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => {
                if path == "_id" {
                    include_id = query::truthy(value);
                } else if query::truthy(value) {
                    inclusions.push(path.as_str());
                } else {
                    exclusions.push(path.as_str());
                }
            }
            expression => computed.push((path.as_str(), expression)),
        }
    }

    let inclusion_mode = !inclusions.is_empty() || !computed.is_empty();
    if inclusion_mode && !exclusions.is_empty() {
        return Err(Failure::new(
            31254,
            "Location31254",
            format!(
                "Invalid $project :: caused by :: Cannot do exclusion on field {} in inclusion \
                 projection",
                exclusions[0]
            ),
        ));
    }

    if !inclusion_mode {
        let mut projected = document.clone();
        for path in exclusions {
            remove_path(&mut projected, path);
        }
        if !include_id {
            projected.remove("_id");
        }
        return Ok(projected);
    }

    let mut projected = Document::new();
    if include_id {
        if let Some(id) = document.get("_id") {
            projected.insert("_id", id.clone());
        }
    }
    for path in inclusions {
        if let Some(value) = get_path(document, path) {
            set_path(&mut projected, path, value.clone());
        }
    }
    for (path, expression) in computed {
        if let Some(value) = evaluate(expression, document) {
            set_path(&mut projected, path, value);
        }
    }
    Ok(projected)
}

/// Evaluates an aggregation expression against `document`. `"$path"` reads a field and
/// `{ $literal: v }` yields `v`; other values are taken literally. `None` means the result is
/// missing and no field should be written.
fn evaluate(expression: &Bson, document: &Document) -> Option<Bson> {
    match expression {
        Bson::String(path) if path.starts_with('$') && !path.starts_with("$$") => {
            get_path(document, &path[1..]).cloned()
        }
        Bson::Document(object) => match object.get("$literal") {
            Some(literal) if object.len() == 1 => Some(literal.clone()),
            _ => Some(Bson::Document(
                object
                    .iter()
                    .filter_map(|(k, v)| evaluate(v, document).map(|v| (k.clone(), v)))
                    .collect(),
            )),
        },
        literal => Some(literal.clone()),
    }
}

fn unset_paths(spec: &Bson) -> Reply<Vec<String>> {
    let invalid =
        || Failure::bad_value("$unset specification must be a string or an array of strings");
    match spec {
        Bson::String(path) => Ok(vec![path.clone()]),
        Bson::Array(paths) if !paths.is_empty() => paths
            .iter()
            .map(|path| path.as_str().map(String::from).ok_or_else(invalid))
            .collect(),
        _ => Err(invalid()),
    }
}

/// Writes `value` at a dotted path, creating intermediate documents as needed.
fn set_path(document: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(document.get(head), Some(Bson::Document(_))) {
                document.insert(head, Document::new());
            }
            if let Some(Bson::Document(child)) = document.get_mut(head) {
                set_path(child, rest, value);
            }
        }
    }
}

fn remove_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(child)) = document.get_mut(head) {
                remove_path(child, rest);
            }
        }
    }
}
