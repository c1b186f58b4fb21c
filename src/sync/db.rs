use std::sync::Arc;

use super::{Client, Collection, Cursor};
use crate::{
    bson::{doc, Bson, Document},
    client::options::validate_database_name,
    codec::CodecOptions,
    coll::options::{AggregateOptions, CollectionOptions},
    concern::WriteConcern,
    db::options::{CreateCollectionOptions, DatabaseOptions, ValidateOptions},
    error::{Error, ErrorKind, Result},
    read_preference::ReadPreference,
    serde_util,
};

/// `Database` is the client-side abstraction of a MongoDB database. It can be used to perform
/// database-level operations or to obtain handles to specific collections within the database. A
/// `Database` can only be obtained through a [`Client`](struct.Client.html) by calling either
/// [`Client::database`](struct.Client.html#method.database) or
/// [`Client::database_with_options`](struct.Client.html#method.database_with_options).
///
/// `Database` uses [`std::sync::Arc`] internally, so it can safely be shared across threads and
/// cloned cheaply.
#[derive(Clone, Debug)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

#[derive(Debug)]
struct DatabaseInner {
    client: Client,
    name: String,
    codec_options: CodecOptions,
    read_preference: ReadPreference,
    write_concern: WriteConcern,
}

impl Database {
    pub(crate) fn new(client: Client, name: &str, options: Option<DatabaseOptions>) -> Result<Self> {
        validate_database_name(name)?;
        let options = options.unwrap_or_default();

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                codec_options: options
                    .codec_options
                    .unwrap_or_else(|| client.codec_options().clone()),
                read_preference: options
                    .read_preference
                    .unwrap_or_else(|| client.read_preference().clone()),
                write_concern: options
                    .write_concern
                    .unwrap_or_else(|| client.write_concern().clone()),
                name: name.to_string(),
                client,
            }),
        })
    }

    /// Gets the [`Client`] that this database was obtained from.
    pub fn client(&self) -> &Client {
        &self.inner.client
    }

    /// Gets the name of the `Database`.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Gets the codec options of the `Database`.
    pub fn codec_options(&self) -> &CodecOptions {
        &self.inner.codec_options
    }

    /// Gets the read preference of the `Database`.
    pub fn read_preference(&self) -> &ReadPreference {
        &self.inner.read_preference
    }

    /// Gets the write concern of the `Database`.
    pub fn write_concern(&self) -> &WriteConcern {
        &self.inner.write_concern
    }

    /// Gets a handle to a collection with type `T` specified by `name` of the database. The
    /// `Collection` options (e.g. read preference and write concern) will default to those of the
    /// `Database`.
    ///
    /// This method does not send anything to the server; collections are created implicitly on
    /// first write.
    pub fn collection<T>(&self, name: &str) -> Collection<T> {
        Collection::new(self.clone(), name, None)
    }

    /// Gets a handle to a collection with type `T` specified by `name`. Options set in `options`
    /// replace the `Database`'s; the rest are inherited.
    pub fn get_collection<T>(
        &self,
        name: &str,
        options: impl Into<Option<CollectionOptions>>,
    ) -> Collection<T> {
        Collection::new(self.clone(), name, options.into())
    }

    /// Gets a new handle to this database, sharing its client, with the options set in `options`
    /// replacing this handle's.
    pub fn with_options(&self, options: DatabaseOptions) -> Database {
        Self {
            inner: Arc::new(DatabaseInner {
                client: self.inner.client.clone(),
                name: self.inner.name.clone(),
                codec_options: options
                    .codec_options
                    .unwrap_or_else(|| self.inner.codec_options.clone()),
                read_preference: options
                    .read_preference
                    .unwrap_or_else(|| self.inner.read_preference.clone()),
                write_concern: options
                    .write_concern
                    .unwrap_or_else(|| self.inner.write_concern.clone()),
            }),
        }
    }

    /// Runs a database-level command and returns the server's reply.
    ///
    /// Note that no inspection is done on `command`, so the command will not use the database's
    /// default read preference or write concern.
    pub fn run_command(&self, command: Document) -> Result<Document> {
        self.client().execute_command(self.name(), command)
    }

    /// Runs a database-level aggregation, such as one starting with `$listLocalSessions`.
    pub fn aggregate(
        &self,
        pipeline: impl IntoIterator<Item = Document>,
        options: impl Into<Option<AggregateOptions>>,
    ) -> Result<Cursor<Document>> {
        let options = options.into().unwrap_or_default();
        let command = aggregate_command(Bson::Int32(1), pipeline, &options, self.read_preference())?;
        let reply = self.run_command(command)?;
        Cursor::from_reply(self.client().clone(), self.name(), &reply, options.batch_size)
    }

    /// Creates a new collection in the database with the given `name` and `options`.
    ///
    /// Fails with [`ErrorKind::CollectionInvalid`] if the collection already exists.
    pub fn create_collection(
        &self,
        name: &str,
        options: impl Into<Option<CreateCollectionOptions>>,
    ) -> Result<Collection<Document>> {
        let options = options.into().unwrap_or_default();
        let mut command = doc! { "create": name };
        command.extend(serde_util::to_command_fields(&options)?);
        let write_concern = options
            .write_concern
            .as_ref()
            .unwrap_or_else(|| self.write_concern());
        append_write_concern(&mut command, write_concern)?;

        match self.run_command(command) {
            Ok(_) => Ok(self.collection(name)),
            Err(error) if error.is_ns_exists() => Err(ErrorKind::CollectionInvalid {
                message: format!("collection {} already exists", name),
            }
            .into()),
            Err(error) => Err(error),
        }
    }

    /// Drops the collection `name`. Dropping a collection that does not exist is not an error.
    pub fn drop_collection(&self, name: &str) -> Result<()> {
        let mut command = doc! { "drop": name };
        append_write_concern(&mut command, self.write_concern())?;

        match self.run_command(command) {
            Err(error) if !error.is_ns_not_found() => Err(error),
            _ => Ok(()),
        }
    }

    /// Gets the specification of each collection in the database, optionally restricted to those
    /// matching `filter`.
    pub fn list_collections(&self, filter: impl Into<Option<Document>>) -> Result<Vec<Document>> {
        self.list_collections_command(filter.into(), false)?
            .collect()
    }

    /// Gets the names of the collections in the database, optionally restricted to those matching
    /// `filter`.
    pub fn list_collection_names(&self, filter: impl Into<Option<Document>>) -> Result<Vec<String>> {
        self.list_collections_command(filter.into(), true)?
            .map(|spec| {
                spec?
                    .get_str("name")
                    .map(String::from)
                    .map_err(|_| Error::invalid_response("collection specification is missing `name`"))
            })
            .collect()
    }

    fn list_collections_command(
        &self,
        filter: Option<Document>,
        name_only: bool,
    ) -> Result<Cursor<Document>> {
        let mut command = doc! { "listCollections": 1, "cursor": {} };
        if let Some(filter) = filter {
            command.insert("filter", filter);
        }
        if name_only {
            command.insert("nameOnly", true);
        }
        let reply = self.run_command(command)?;
        Cursor::from_reply(self.client().clone(), self.name(), &reply, None)
    }

    /// Validates the collection `name` and returns the server's validation report.
    ///
    /// Fails with a command error if the collection does not exist, and with
    /// [`ErrorKind::CollectionInvalid`] if the server reports the collection as invalid.
    pub fn validate_collection(
        &self,
        name: &str,
        options: impl Into<Option<ValidateOptions>>,
    ) -> Result<Document> {
        let mut command = doc! { "validate": name };
        if let Some(options) = options.into() {
            command.extend(serde_util::to_command_fields(&options)?);
        }
        let reply = self.run_command(command)?;

        if let Ok(false) = reply.get_bool("valid") {
            let errors = reply
                .get_array("errors")
                .map(|errors| {
                    errors
                        .iter()
                        .map(|e| e.as_str().map(String::from).unwrap_or_else(|| e.to_string()))
                        .collect::<Vec<_>>()
                        .join("; ")
                })
                .unwrap_or_default();
            return Err(ErrorKind::CollectionInvalid {
                message: format!("collection {}.{} is invalid: {}", self.name(), name, errors),
            }
            .into());
        }

        Ok(reply)
    }

    /// Drops the database, deleting all of its collections.
    pub fn drop(&self) -> Result<()> {
        let mut command = doc! { "dropDatabase": 1 };
        append_write_concern(&mut command, self.write_concern())?;
        self.run_command(command).map(|_| ())
    }
}

pub(super) fn append_write_concern(command: &mut Document, write_concern: &WriteConcern) -> Result<()> {
    if let Some(write_concern) = write_concern.to_command_field()? {
        command.insert("writeConcern", write_concern);
    }
    Ok(())
}

pub(super) fn append_read_preference(
    command: &mut Document,
    read_preference: &ReadPreference,
) -> Result<()> {
    if let Some(read_preference) = read_preference.to_command_field()? {
        command.insert("$readPreference", read_preference);
    }
    Ok(())
}

/// Builds an `aggregate` command against `target`, which is a collection name or `1` for a
/// database-level aggregation.
pub(super) fn aggregate_command(
    target: Bson,
    pipeline: impl IntoIterator<Item = Document>,
    options: &AggregateOptions,
    default_read_preference: &ReadPreference,
) -> Result<Document> {
    let pipeline: Vec<Bson> = pipeline.into_iter().map(Bson::Document).collect();
    let mut cursor = Document::new();
    if let Some(batch_size) = options.batch_size {
        cursor.insert("batchSize", i64::from(batch_size));
    }

    let mut command = doc! { "aggregate": target, "pipeline": pipeline, "cursor": cursor };
    command.extend(serde_util::to_command_fields(options)?);
    append_read_preference(
        &mut command,
        options
            .read_preference
            .as_ref()
            .unwrap_or(default_read_preference),
    )?;
    Ok(command)
}
