use std::{borrow::Borrow, marker::PhantomData, sync::Arc};

use derive_where::derive_where;
use serde::{de::DeserializeOwned, Serialize};

use super::{
    db::{aggregate_command, append_read_preference, append_write_concern},
    Client,
    Cursor,
    Database,
};
use crate::{
    bson::{doc, oid::ObjectId, Bson, Document},
    bson_util,
    codec::CodecOptions,
    coll::{
        options::{AggregateOptions, CollectionOptions, FindOneOptions, FindOptions, InsertManyOptions},
        Namespace,
    },
    concern::WriteConcern,
    error::{Error, Result},
    read_preference::ReadPreference,
    results::{DeleteResult, InsertManyResult, InsertOneResult},
    serde_util,
};

/// `Collection` is the client-side abstraction of a MongoDB collection. It can be used to perform
/// collection-level operations such as CRUD operations. A `Collection` can be obtained through a
/// [`Database`](struct.Database.html) by calling either
/// [`Database::collection`](struct.Database.html#method.collection) or
/// [`Database::get_collection`](struct.Database.html#method.get_collection).
///
/// A `Collection` can be parameterized with any type that implements the `Serialize` and
/// `Deserialize` traits from the [`serde`](https://serde.rs/) crate, including `Document`.
///
/// `Collection` uses [`std::sync::Arc`] internally, so it can safely be shared across threads.
#[derive_where(Clone, Debug)]
pub struct Collection<T> {
    inner: Arc<CollectionInner>,
    #[derive_where(skip)]
    _phantom: PhantomData<fn() -> T>,
}

#[derive(Debug)]
struct CollectionInner {
    db: Database,
    name: String,
    codec_options: CodecOptions,
    read_preference: ReadPreference,
    write_concern: WriteConcern,
}

impl<T> Collection<T> {
    pub(crate) fn new(db: Database, name: &str, options: Option<CollectionOptions>) -> Self {
        let options = options.unwrap_or_default();

        Self {
            inner: Arc::new(CollectionInner {
                codec_options: options
                    .codec_options
                    .unwrap_or_else(|| db.codec_options().clone()),
                read_preference: options
                    .read_preference
                    .unwrap_or_else(|| db.read_preference().clone()),
                write_concern: options
                    .write_concern
                    .unwrap_or_else(|| db.write_concern().clone()),
                name: name.to_string(),
                db,
            }),
            _phantom: PhantomData,
        }
    }

    /// Gets a clone of the `Collection` with a different type `U`.
    pub fn clone_with_type<U>(&self) -> Collection<U> {
        Collection {
            inner: self.inner.clone(),
            _phantom: PhantomData,
        }
    }

    /// Gets the `Client` that this collection descended from.
    pub fn client(&self) -> &Client {
        self.inner.db.client()
    }

    /// Gets the `Database` that this collection belongs to.
    pub fn database(&self) -> &Database {
        &self.inner.db
    }

    /// Gets the name of the `Collection`.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Gets the namespace of the `Collection`.
    pub fn namespace(&self) -> Namespace {
        Namespace::new(self.inner.db.name(), self.name())
    }

    /// Gets the codec options of the `Collection`.
    pub fn codec_options(&self) -> &CodecOptions {
        &self.inner.codec_options
    }

    /// Gets the read preference of the `Collection`.
    pub fn read_preference(&self) -> &ReadPreference {
        &self.inner.read_preference
    }

    /// Gets the write concern of the `Collection`.
    pub fn write_concern(&self) -> &WriteConcern {
        &self.inner.write_concern
    }

    fn run_command(&self, command: Document) -> Result<Document> {
        self.client().execute_command(self.inner.db.name(), command)
    }

    /// Drops the collection, deleting all data and indexes stored in it.
    pub fn drop(&self) -> Result<()> {
        self.inner.db.drop_collection(self.name())
    }

    /// Deletes up to one document found matching `query`.
    pub fn delete_one(&self, query: Document) -> Result<DeleteResult> {
        self.delete(query, 1)
    }

    /// Deletes all documents stored in the collection matching `query`.
    pub fn delete_many(&self, query: Document) -> Result<DeleteResult> {
        self.delete(query, 0)
    }

    fn delete(&self, query: Document, limit: i32) -> Result<DeleteResult> {
        let mut command = doc! {
            "delete": self.name(),
            "deletes": [{ "q": query, "limit": limit }],
            "ordered": true,
        };
        append_write_concern(&mut command, self.write_concern())?;

        let reply = self.run_command(command)?;
        crate::bson::from_document(reply).map_err(Error::from)
    }

    /// Gets the number of documents matching `filter`.
    pub fn count_documents(&self, filter: impl Into<Option<Document>>) -> Result<u64> {
        let pipeline = vec![
            doc! { "$match": filter.into().unwrap_or_default() },
            doc! { "$count": "n" },
        ];
        let mut cursor = self.aggregate(pipeline, None)?;

        match cursor.next().transpose()? {
            Some(result) => result
                .get("n")
                .and_then(bson_util::get_u64)
                .ok_or_else(|| Error::invalid_response("count result is missing `n`")),
            None => Ok(0),
        }
    }

    /// Runs an aggregation operation over the collection.
    pub fn aggregate(
        &self,
        pipeline: impl IntoIterator<Item = Document>,
        options: impl Into<Option<AggregateOptions>>,
    ) -> Result<Cursor<Document>> {
        let options = options.into().unwrap_or_default();
        let command = aggregate_command(
            Bson::String(self.name().to_string()),
            pipeline,
            &options,
            self.read_preference(),
        )?;
        let reply = self.run_command(command)?;
        Cursor::from_reply(
            self.client().clone(),
            self.inner.db.name(),
            &reply,
            options.batch_size,
        )
    }
}

impl<T> Collection<T>
where
    T: DeserializeOwned,
{
    /// Finds the documents in the collection matching `filter`.
    pub fn find(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<FindOptions>>,
    ) -> Result<Cursor<T>> {
        let options = options.into().unwrap_or_default();
        let mut command = doc! {
            "find": self.name(),
            "filter": filter.into().unwrap_or_default(),
        };
        command.extend(serde_util::to_command_fields(&options)?);

        // A negative limit asks for a single batch of at most |limit| documents.
        if let Some(limit) = options.limit.filter(|limit| *limit < 0) {
            command.insert("limit", limit.saturating_abs());
            command.insert("singleBatch", true);
        }
        append_read_preference(
            &mut command,
            options
                .read_preference
                .as_ref()
                .unwrap_or_else(|| self.read_preference()),
        )?;

        let reply = self.run_command(command)?;
        Cursor::from_reply(
            self.client().clone(),
            self.inner.db.name(),
            &reply,
            options.batch_size,
        )
    }

    /// Finds a single document in the collection matching `filter`.
    pub fn find_one(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<FindOneOptions>>,
    ) -> Result<Option<T>> {
        let options: FindOptions = options.into().unwrap_or_default().into();
        self.find(filter, options)?.next().transpose()
    }
}

impl<T> Collection<T>
where
    T: Serialize,
{
    /// Inserts `doc` into the collection. If the document has no `_id`, one is generated.
    ///
    /// Note that either an owned or borrowed value can be inserted here, so the input document
    /// does not need to be cloned to be passed in.
    pub fn insert_one(&self, doc: impl Borrow<T>) -> Result<InsertOneResult> {
        self.insert_many(std::iter::once(doc), None)
            .map(InsertOneResult::from_insert_many_result)
    }

    /// Inserts the documents in `docs` into the collection, generating an `_id` for each
    /// document that lacks one.
    pub fn insert_many(
        &self,
        docs: impl IntoIterator<Item = impl Borrow<T>>,
        options: impl Into<Option<InsertManyOptions>>,
    ) -> Result<InsertManyResult> {
        let options = options.into().unwrap_or_default();
        let mut result = InsertManyResult::new();
        let mut documents = Vec::new();

        for (index, doc) in docs.into_iter().enumerate() {
            let doc = crate::bson::to_document(doc.borrow())?;
            let (id, doc) = ensure_id(doc);
            result.inserted_ids.insert(index, id);
            documents.push(Bson::Document(doc));
        }

        if documents.is_empty() {
            return Err(Error::invalid_argument("No documents provided to insert_many"));
        }

        let mut command = doc! {
            "insert": self.name(),
            "documents": documents,
            "ordered": options.ordered.unwrap_or(true),
        };
        if let Some(comment) = options.comment {
            command.insert("comment", comment);
        }
        append_write_concern(&mut command, self.write_concern())?;

        self.run_command(command)?;
        Ok(result)
    }
}

/// Returns the document's `_id`, prepending a fresh `ObjectId` if it has none.
fn ensure_id(doc: Document) -> (Bson, Document) {
    if let Some(id) = doc.get("_id") {
        return (id.clone(), doc);
    }

    let id = Bson::ObjectId(ObjectId::new());
    let mut with_id = doc! { "_id": id.clone() };
    with_id.extend(doc);
    (id, with_id)
}
