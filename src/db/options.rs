use serde::Serialize;
use serde_with::skip_serializing_none;
use typed_builder::TypedBuilder;

use crate::{
    bson::Document,
    codec::CodecOptions,
    concern::WriteConcern,
    read_preference::ReadPreference,
    serde_util,
};

/// These are the valid options for creating a [`Database`](../struct.Database.html) with
/// [`Client::database_with_options`](../struct.Client.html#method.database_with_options) or
/// deriving one with [`Database::with_options`](../struct.Database.html#method.with_options).
///
/// Fields left unset inherit the value of the handle they are derived from.
#[derive(Clone, Debug, Default, PartialEq, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct DatabaseOptions {
    /// The default codec options for collections obtained from the database.
    pub codec_options: Option<CodecOptions>,

    /// The default read preference for operations.
    pub read_preference: Option<ReadPreference>,

    /// The default write concern for operations.
    pub write_concern: Option<WriteConcern>,
}

/// These are the valid options for creating a collection with
/// [`Database::create_collection`](../struct.Database.html#method.create_collection).
#[skip_serializing_none]
#[derive(Clone, Debug, Default, TypedBuilder, Serialize)]
#[serde(rename_all = "camelCase")]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct CreateCollectionOptions {
    /// Whether the collection should be capped. If true, `size` must also be set.
    pub capped: Option<bool>,

    /// The maximum size (in bytes) for a capped collection. This option is ignored if `capped` is
    /// not set to true.
    #[serde(serialize_with = "serde_util::serialize_u64_option_as_i64")]
    pub size: Option<u64>,

    /// The maximum number of documents in a capped collection. The `size` limit takes precedence
    /// over this option. If a capped collection reaches the size limit before it reaches the
    /// maximum number of documents, MongoDB removes old documents.
    #[serde(serialize_with = "serde_util::serialize_u64_option_as_i64")]
    pub max: Option<u64>,

    /// Specifies a validator to restrict the schema of documents which can exist in the
    /// collection.
    pub validator: Option<Document>,

    /// The write concern for the operation. Defaults to the database's write concern.
    #[serde(skip)]
    pub write_concern: Option<WriteConcern>,
}

/// These are the valid options for validating a collection with
/// [`Database::validate_collection`](../struct.Database.html#method.validate_collection).
#[skip_serializing_none]
#[derive(Clone, Debug, Default, TypedBuilder, Serialize)]
#[serde(rename_all = "camelCase")]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct ValidateOptions {
    /// Whether to perform a more thorough but slower validation.
    pub full: Option<bool>,

    /// Whether to scan the collection's data rather than only its metadata. Only honored by
    /// servers that distinguish the two.
    pub scandata: Option<bool>,

    /// Whether to validate in the background without blocking other operations.
    pub background: Option<bool>,
}
