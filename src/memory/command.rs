use std::collections::VecDeque;

use super::{
    pipeline::{self, COLLECTIONLESS_STAGES},
    query,
    store::{take_batch, CollectionState, Store},
};
use crate::{
    bson::{doc, oid::ObjectId, Bson, DateTime, Document},
    bson_util::{self, get_int, values_equal},
};

const MAX_BSON_OBJECT_SIZE: i32 = 16 * 1024 * 1024;
const MAX_MESSAGE_SIZE_BYTES: i32 = 48_000_000;
const MAX_WRITE_BATCH_SIZE: i32 = 100_000;
const LOGICAL_SESSION_TIMEOUT_MINUTES: i32 = 30;
const SERVER_VERSION: &str = "7.0.0";

pub(super) type Reply<T> = std::result::Result<T, Failure>;

/// A command failure, rendered as an `ok: 0` reply.
#[derive(Debug)]
pub(super) struct Failure {
    pub(super) code: i32,
    code_name: &'static str,
    message: String,
}

impl Failure {
    pub(super) fn new(code: i32, code_name: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            code_name,
            message: message.into(),
        }
    }

    pub(super) fn bad_value(message: impl Into<String>) -> Self {
        Self::new(2, "BadValue", message)
    }

    fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(14, "TypeMismatch", message)
    }

    fn namespace_not_found(message: impl Into<String>) -> Self {
        Self::new(26, "NamespaceNotFound", message)
    }

    fn invalid_namespace(message: impl Into<String>) -> Self {
        Self::new(73, "InvalidNamespace", message)
    }

    fn into_reply(self) -> Document {
        doc! {
            "ok": 0.0,
            "errmsg": self.message,
            "code": self.code,
            "codeName": self.code_name,
        }
    }
}

/// Runs `command` against `db` and renders its reply.
pub(super) fn run(store: &mut Store, db: &str, command: Document) -> Document {
    if let Ok(lsid) = command.get_document("lsid") {
        store.touch_session(lsid);
    }

    let name = bson_util::first_key(&command).unwrap_or_default().to_string();
    let result = match name.as_str() {
        "ping" => Ok(Document::new()),
        "buildInfo" | "buildinfo" => Ok(build_info()),
        "hello" | "isMaster" | "ismaster" => Ok(hello(&name)),
        "listDatabases" => list_databases(store, db, &command),
        "dropDatabase" => {
            store.databases.remove(db);
            Ok(doc! { "dropped": db })
        }
        "create" => create(store, db, &command),
        "drop" => drop_collection(store, db, &command),
        "listCollections" => list_collections(store, db, &command),
        "validate" => validate(store, db, &command),
        "insert" => insert(store, db, &command),
        "find" => find(store, db, &command),
        "getMore" => get_more(store, db, &command),
        "killCursors" => kill_cursors(store, db, &command),
        "delete" => delete(store, db, &command),
        "aggregate" => aggregate(store, db, &command),
        "endSessions" => end_sessions(store, &command),
        other => Err(Failure::new(
            59,
            "CommandNotFound",
            format!("no such command: '{}'", other),
        )),
    };

    match result {
        Ok(mut reply) => {
            reply.insert("ok", 1.0);
            reply
        }
        Err(failure) => failure.into_reply(),
    }
}

fn build_info() -> Document {
    doc! {
        "version": SERVER_VERSION,
        "gitVersion": "memory",
        "versionArray": [7, 0, 0, 0],
        "bits": 64,
        "debug": false,
        "maxBsonObjectSize": MAX_BSON_OBJECT_SIZE,
        "storageEngines": ["memory"],
    }
}

fn hello(name: &str) -> Document {
    let mut reply = Document::new();
    if name == "hello" {
        reply.insert("isWritablePrimary", true);
    } else {
        reply.insert("ismaster", true);
    }
    reply.extend(doc! {
        "maxBsonObjectSize": MAX_BSON_OBJECT_SIZE,
        "maxMessageSizeBytes": MAX_MESSAGE_SIZE_BYTES,
        "maxWriteBatchSize": MAX_WRITE_BATCH_SIZE,
        "localTime": DateTime::now(),
        "logicalSessionTimeoutMinutes": LOGICAL_SESSION_TIMEOUT_MINUTES,
        "minWireVersion": 0,
        "maxWireVersion": 21,
        "readOnly": false,
    });
    reply
}

fn string_arg<'a>(command: &'a Document, key: &str) -> Reply<&'a str> {
    command
        .get_str(key)
        .map_err(|_| Failure::type_mismatch(format!("'{}' must be of type string", key)))
}

fn optional_document<'a>(command: &'a Document, key: &str) -> Reply<Option<&'a Document>> {
    match command.get(key) {
        None | Some(Bson::Null) => Ok(None),
        Some(Bson::Document(document)) => Ok(Some(document)),
        Some(_) => Err(Failure::type_mismatch(format!(
            "'{}' must be of type object",
            key
        ))),
    }
}

fn documents_arg<'a>(command: &'a Document, key: &str) -> Reply<Vec<&'a Document>> {
    let invalid = || Failure::type_mismatch(format!("'{}' must be an array of objects", key));
    command
        .get_array(key)
        .map_err(|_| invalid())?
        .iter()
        .map(|value| value.as_document().ok_or_else(invalid))
        .collect()
}

fn batch_size_arg(value: Option<&Bson>) -> Reply<Option<usize>> {
    match value {
        None => Ok(None),
        Some(value) => get_int(value)
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| Failure::bad_value("batchSize must be a non-negative number")),
    }
}

fn validate_collection_name(db: &str, coll: &str) -> Reply<()> {
    if coll.is_empty() || coll.contains('$') || coll.contains('\0') || coll.starts_with('.') {
        return Err(Failure::invalid_namespace(format!(
            "Invalid collection name: {}.{}",
            db, coll
        )));
    }
    Ok(())
}

fn list_databases(store: &Store, db: &str, command: &Document) -> Reply<Document> {
    if db != "admin" {
        return Err(Failure::new(
            13,
            "Unauthorized",
            "listDatabases may only be run against the admin database.",
        ));
    }
    let name_only = command.get("nameOnly").is_some_and(query::truthy);

    let databases: Vec<Bson> = store
        .databases
        .iter()
        .map(|(name, state)| {
            if name_only {
                return Bson::Document(doc! { "name": name.as_str() });
            }
            let size: usize = state
                .collections
                .values()
                .flat_map(|c| c.documents.iter())
                .map(document_size)
                .sum();
            Bson::Document(doc! {
                "name": name.as_str(),
                "sizeOnDisk": i64::try_from(size).unwrap_or(i64::MAX),
                "empty": size == 0,
            })
        })
        .collect();

    let mut reply = doc! { "databases": databases };
    if !name_only {
        let total: usize = store
            .databases
            .values()
            .flat_map(|d| d.collections.values())
            .flat_map(|c| c.documents.iter())
            .map(document_size)
            .sum();
        reply.insert("totalSize", i64::try_from(total).unwrap_or(i64::MAX));
    }
    Ok(reply)
}

fn document_size(document: &Document) -> usize {
    let mut bytes = Vec::new();
    match document.to_writer(&mut bytes) {
        Ok(()) => bytes.len(),
        Err(_) => 0,
    }
}

fn create(store: &mut Store, db: &str, command: &Document) -> Reply<Document> {
    let name = string_arg(command, "create")?;
    validate_collection_name(db, name)?;
    if store.collection(db, name).is_some() {
        return Err(Failure::new(
            48,
            "NamespaceExists",
            format!("Collection {}.{} already exists.", db, name),
        ));
    }

    let mut options = Document::new();
    for key in ["capped", "size", "max", "validator"] {
        if let Some(value) = command.get(key) {
            options.insert(key, value.clone());
        }
    }
    if options.get("capped").is_some_and(query::truthy) && !options.contains_key("size") {
        return Err(Failure::new(
            72,
            "InvalidOptions",
            "the 'size' field is required when 'capped' is true",
        ));
    }

    store
        .databases
        .entry(db.to_string())
        .or_default()
        .collections
        .insert(name.to_string(), CollectionState::new(options));
    Ok(Document::new())
}

fn drop_collection(store: &mut Store, db: &str, command: &Document) -> Reply<Document> {
    let name = string_arg(command, "drop")?;
    match store.drop_collection(db, name) {
        Some(_) => Ok(doc! { "nIndexesWas": 1, "ns": format!("{}.{}", db, name) }),
        None => Err(Failure::namespace_not_found("ns not found")),
    }
}

fn list_collections(store: &mut Store, db: &str, command: &Document) -> Reply<Document> {
    let filter = optional_document(command, "filter")?.cloned().unwrap_or_default();
    let name_only = command.get("nameOnly").is_some_and(query::truthy);
    let batch_size = match optional_document(command, "cursor")? {
        Some(cursor) => batch_size_arg(cursor.get("batchSize"))?,
        None => None,
    };

    let mut specifications = VecDeque::new();
    if let Some(database) = store.databases.get(db) {
        for (name, collection) in &database.collections {
            let specification = collection.specification(name);
            if query::matches(&specification, &filter)? {
                specifications.push_back(if name_only {
                    doc! { "name": name.as_str(), "type": "collection" }
                } else {
                    specification
                });
            }
        }
    }

    let cursor = store.open_cursor(
        format!("{}.$cmd.listCollections", db),
        specifications,
        batch_size,
        false,
    );
    Ok(doc! { "cursor": cursor })
}

fn validate(store: &Store, db: &str, command: &Document) -> Reply<Document> {
    let name = string_arg(command, "validate")?;
    let collection = store.collection(db, name).ok_or_else(|| {
        Failure::namespace_not_found(format!(
            "Collection '{}.{}' does not exist to validate.",
            db, name
        ))
    })?;

    let mut errors = Vec::new();
    for (index, document) in collection.documents.iter().enumerate() {
        match document.get("_id") {
            None => errors.push(Bson::String(format!("document {} has no _id", index))),
            Some(id) => {
                let duplicated = collection.documents[..index]
                    .iter()
                    .filter_map(|d| d.get("_id"))
                    .any(|other| values_equal(other, id));
                if duplicated {
                    errors.push(Bson::String(format!("duplicate _id {}", id)));
                }
            }
        }
    }

    let n = i64::try_from(collection.documents.len()).unwrap_or(i64::MAX);
    Ok(doc! {
        "ns": format!("{}.{}", db, name),
        "nrecords": n,
        "nIndexes": 1,
        "keysPerIndex": { "_id_": n },
        "valid": errors.is_empty(),
        "warnings": [],
        "errors": errors,
    })
}

fn insert(store: &mut Store, db: &str, command: &Document) -> Reply<Document> {
    let name = string_arg(command, "insert")?;
    validate_collection_name(db, name)?;
    let documents = documents_arg(command, "documents")?;
    let ordered = command.get("ordered").map_or(true, query::truthy);

    let collection = store.collection_or_create(db, name);
    let mut inserted = 0;
    let mut write_errors = Vec::new();

    for (index, document) in documents.into_iter().enumerate() {
        match insert_one(collection, db, name, document.clone()) {
            Ok(()) => inserted += 1,
            Err(failure) => {
                write_errors.push(Bson::Document(doc! {
                    "index": i32::try_from(index).unwrap_or(i32::MAX),
                    "code": failure.code,
                    "errmsg": failure.message,
                }));
                if ordered {
                    break;
                }
            }
        }
    }

    let mut reply = doc! { "n": inserted };
    if !write_errors.is_empty() {
        reply.insert("writeErrors", write_errors);
    }
    Ok(reply)
}

fn insert_one(
    collection: &mut CollectionState,
    db: &str,
    name: &str,
    mut document: Document,
) -> Reply<()> {
    let id = match document.get("_id") {
        Some(id) => id.clone(),
        None => {
            let id = Bson::ObjectId(ObjectId::new());
            let mut with_id = doc! { "_id": id.clone() };
            with_id.extend(document);
            document = with_id;
            id
        }
    };

    if collection
        .documents
        .iter()
        .filter_map(|d| d.get("_id"))
        .any(|existing| values_equal(existing, &id))
    {
        return Err(Failure::new(
            11000,
            "DuplicateKey",
            format!(
                "E11000 duplicate key error collection: {}.{} index: _id_ dup key: {{ _id: {} }}",
                db, name, id
            ),
        ));
    }

    if let Some(validator) = collection.validator() {
        if !query::matches(&document, validator)? {
            return Err(Failure::new(
                121,
                "DocumentValidationFailure",
                "Document failed validation",
            ));
        }
    }

    collection.documents.push(document);
    if let Some(max) = collection.max_documents() {
        let excess = collection.documents.len().saturating_sub(max);
        collection.documents.drain(..excess);
    }
    Ok(())
}

fn find(store: &mut Store, db: &str, command: &Document) -> Reply<Document> {
    let name = string_arg(command, "find")?;
    validate_collection_name(db, name)?;
    let filter = optional_document(command, "filter")?.cloned().unwrap_or_default();
    let batch_size = batch_size_arg(command.get("batchSize"))?;
    let single_batch = command.get("singleBatch").is_some_and(query::truthy);

    let mut documents = Vec::new();
    if let Some(collection) = store.collection(db, name) {
        for document in &collection.documents {
            if query::matches(document, &filter)? {
                documents.push(document.clone());
            }
        }
    }

    if let Some(sort) = optional_document(command, "sort")? {
        if !sort.is_empty() {
            pipeline::sort(&mut documents, sort)?;
        }
    }
    if let Some(skip) = command.get("skip") {
        let skip = get_int(skip)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| Failure::bad_value("skip value must be non-negative"))?;
        documents.drain(..skip.min(documents.len()));
    }
    if let Some(limit) = command.get("limit") {
        let limit = get_int(limit)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| Failure::bad_value("limit value must be non-negative"))?;
        if limit > 0 {
            documents.truncate(limit);
        }
    }
    if let Some(projection) = optional_document(command, "projection")? {
        documents = documents
            .iter()
            .map(|document| pipeline::project(document, projection))
            .collect::<Reply<_>>()?;
    }

    let cursor = store.open_cursor(
        format!("{}.{}", db, name),
        documents.into(),
        batch_size,
        single_batch,
    );
    Ok(doc! { "cursor": cursor })
}

fn get_more(store: &mut Store, db: &str, command: &Document) -> Reply<Document> {
    let id = command
        .get("getMore")
        .and_then(get_int)
        .ok_or_else(|| Failure::type_mismatch("'getMore' must be of type long"))?;
    let collection = string_arg(command, "collection")?;
    let batch_size = batch_size_arg(command.get("batchSize"))?.unwrap_or(0);
    let ns = format!("{}.{}", db, collection);

    let cursor = match store.cursors.get_mut(&id) {
        Some(cursor) if cursor.ns == ns => cursor,
        Some(cursor) => {
            return Err(Failure::new(
                13,
                "Unauthorized",
                format!(
                    "Requested getMore on namespace '{}', but cursor belongs to a different \
                     namespace {}",
                    ns, cursor.ns
                ),
            ))
        }
        None => {
            return Err(Failure::new(
                43,
                "CursorNotFound",
                format!("cursor id {} not found", id),
            ))
        }
    };

    let next_batch = take_batch(&mut cursor.documents, batch_size);
    let next_id = if cursor.documents.is_empty() {
        store.cursors.remove(&id);
        0
    } else {
        id
    };

    Ok(doc! { "cursor": { "nextBatch": next_batch, "id": next_id, "ns": ns } })
}

fn kill_cursors(store: &mut Store, db: &str, command: &Document) -> Reply<Document> {
    let collection = string_arg(command, "killCursors")?;
    let ns = format!("{}.{}", db, collection);
    let ids = command
        .get_array("cursors")
        .map_err(|_| Failure::type_mismatch("'cursors' must be an array"))?;

    let mut killed = Vec::new();
    let mut not_found = Vec::new();
    for id in ids.iter().filter_map(get_int) {
        match store.cursors.get(&id) {
            Some(cursor) if cursor.ns == ns => {
                store.cursors.remove(&id);
                killed.push(id);
            }
            _ => not_found.push(id),
        }
    }

    Ok(doc! {
        "cursorsKilled": killed,
        "cursorsNotFound": not_found,
        "cursorsAlive": [],
        "cursorsUnknown": [],
    })
}

fn delete(store: &mut Store, db: &str, command: &Document) -> Reply<Document> {
    let name = string_arg(command, "delete")?;
    let deletes = documents_arg(command, "deletes")?;

    let mut deleted = 0;
    if let Some(collection) = store.collection_mut(db, name) {
        for statement in deletes {
            let query = statement.get_document("q").map_err(|_| {
                Failure::type_mismatch("delete statement requires 'q' of type object")
            })?;
            let limit = statement.get("limit").and_then(get_int).unwrap_or(0);
            if limit != 0 && limit != 1 {
                return Err(Failure::bad_value(
                    "The limit field in delete objects must be 0 or 1",
                ));
            }

            let mut index = 0;
            while index < collection.documents.len() {
                if query::matches(&collection.documents[index], query)? {
                    collection.documents.remove(index);
                    deleted += 1;
                    if limit == 1 {
                        break;
                    }
                } else {
                    index += 1;
                }
            }
        }
    }

    Ok(doc! { "n": deleted })
}

fn aggregate(store: &mut Store, db: &str, command: &Document) -> Reply<Document> {
    let stages = documents_arg(command, "pipeline")?;
    let stages: Vec<Document> = stages.into_iter().cloned().collect();
    let cursor_options = command
        .get_document("cursor")
        .map_err(|_| Failure::bad_value("The 'cursor' option is required"))?;
    let batch_size = batch_size_arg(cursor_options.get("batchSize"))?;

    let (ns, input) = match command.get("aggregate") {
        Some(Bson::String(name)) => {
            validate_collection_name(db, name)?;
            let input = store
                .collection(db, name)
                .map(|c| c.documents.clone())
                .unwrap_or_default();
            (format!("{}.{}", db, name), input)
        }
        Some(target) if get_int(target) == Some(1) => {
            let first_stage = stages.first().and_then(bson_util::first_key);
            if !first_stage.is_some_and(|stage| COLLECTIONLESS_STAGES.contains(&stage)) {
                return Err(Failure::invalid_namespace(format!(
                    "{{aggregate: 1}} is not valid for '{}'; a collection is required.",
                    first_stage.unwrap_or("an empty pipeline")
                )));
            }
            (format!("{}.$cmd.aggregate", db), Vec::new())
        }
        _ => {
            return Err(Failure::type_mismatch(
                "'aggregate' must be a string or the number 1",
            ))
        }
    };

    let sessions = || {
        store
            .sessions
            .values()
            .map(|session| doc! { "_id": session.lsid.clone(), "lastUse": session.last_use })
            .collect()
    };
    let output = pipeline::run(&stages, input, sessions)?;

    let cursor = store.open_cursor(ns, output.into(), batch_size, false);
    Ok(doc! { "cursor": cursor })
}

fn end_sessions(store: &mut Store, command: &Document) -> Reply<Document> {
    for lsid in documents_arg(command, "endSessions")? {
        store.end_session(lsid);
    }
    Ok(Document::new())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::run;
    use crate::{
        bson::{doc, Bson, Document},
        memory::store::Store,
    };

    fn ok(reply: &Document) -> bool {
        reply.get_f64("ok") == Ok(1.0)
    }

    #[test]
    fn unknown_command() {
        let mut store = Store::default();
        let reply = run(&mut store, "db", doc! { "frobnicate": 1 });
        assert_eq!(reply.get_i32("code"), Ok(59));
        assert_eq!(reply.get_str("codeName"), Ok("CommandNotFound"));
    }

    #[test]
    fn create_twice_reports_namespace_exists() {
        let mut store = Store::default();
        assert!(ok(&run(&mut store, "db", doc! { "create": "c" })));
        let reply = run(&mut store, "db", doc! { "create": "c" });
        assert_eq!(reply.get_i32("code"), Ok(48));
    }

    #[test]
    fn duplicate_ids_are_write_errors() {
        let mut store = Store::default();
        let reply = run(
            &mut store,
            "db",
            doc! { "insert": "c", "documents": [{ "_id": 1 }, { "_id": 1 }, { "_id": 2 }] },
        );
        assert!(ok(&reply));
        assert_eq!(reply.get_i32("n"), Ok(1));
        let errors = reply.get_array("writeErrors").unwrap();
        assert_eq!(errors.len(), 1);
        let error = errors[0].as_document().unwrap();
        assert_eq!(error.get_i32("code"), Ok(11000));
        assert_eq!(error.get_i32("index"), Ok(1));
    }

    #[test]
    fn unordered_insert_continues_after_error() {
        let mut store = Store::default();
        let reply = run(
            &mut store,
            "db",
            doc! {
                "insert": "c",
                "documents": [{ "_id": 1 }, { "_id": 1 }, { "_id": 2 }],
                "ordered": false,
            },
        );
        assert_eq!(reply.get_i32("n"), Ok(2));
    }

    #[test]
    fn find_batches_through_get_more() {
        let mut store = Store::default();
        let documents: Vec<Bson> = (0..5).map(|i| Bson::Document(doc! { "_id": i })).collect();
        run(&mut store, "db", doc! { "insert": "c", "documents": documents });

        let reply = run(&mut store, "db", doc! { "find": "c", "batchSize": 2 });
        let cursor = reply.get_document("cursor").unwrap();
        assert_eq!(cursor.get_array("firstBatch").unwrap().len(), 2);
        let id = cursor.get_i64("id").unwrap();
        assert_ne!(id, 0);

        let reply = run(
            &mut store,
            "db",
            doc! { "getMore": id, "collection": "c", "batchSize": 2 },
        );
        let cursor = reply.get_document("cursor").unwrap();
        assert_eq!(cursor.get_array("nextBatch").unwrap().len(), 2);
        assert_eq!(cursor.get_i64("id"), Ok(id));

        let reply = run(&mut store, "db", doc! { "getMore": id, "collection": "c" });
        let cursor = reply.get_document("cursor").unwrap();
        assert_eq!(cursor.get_array("nextBatch").unwrap().len(), 1);
        assert_eq!(cursor.get_i64("id"), Ok(0));

        let reply = run(&mut store, "db", doc! { "getMore": id, "collection": "c" });
        assert_eq!(reply.get_i32("code"), Ok(43));
    }

    #[test]
    fn database_aggregate_requires_collectionless_stage() {
        let mut store = Store::default();
        let reply = run(
            &mut store,
            "db",
            doc! { "aggregate": 1, "pipeline": [{ "$match": {} }], "cursor": {} },
        );
        assert_eq!(reply.get_i32("code"), Ok(73));
    }

    #[test]
    fn capped_collections_evict_oldest() {
        let mut store = Store::default();
        run(
            &mut store,
            "db",
            doc! { "create": "c", "capped": true, "size": 4096, "max": 2 },
        );
        run(
            &mut store,
            "db",
            doc! { "insert": "c", "documents": [{ "_id": 1 }, { "_id": 2 }, { "_id": 3 }] },
        );
        let reply = run(&mut store, "db", doc! { "find": "c" });
        let batch = reply
            .get_document("cursor")
            .unwrap()
            .get_array("firstBatch")
            .unwrap()
            .clone();
        assert_eq!(
            batch,
            vec![Bson::Document(doc! { "_id": 2 }), Bson::Document(doc! { "_id": 3 })]
        );
    }

    #[test]
    fn validator_rejects_documents() {
        let mut store = Store::default();
        run(
            &mut store,
            "db",
            doc! { "create": "c", "validator": { "n": { "$gte": 0 } } },
        );
        let reply = run(
            &mut store,
            "db",
            doc! { "insert": "c", "documents": [{ "n": -1 }] },
        );
        let errors = reply.get_array("writeErrors").unwrap();
        assert_eq!(errors[0].as_document().unwrap().get_i32("code"), Ok(121));
    }
}
