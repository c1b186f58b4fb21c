//! This crate provides an asynchronous API over a blocking MongoDB driver. It uses the [`bson`]
//! crate for BSON support and [`tokio`](https://crates.io/crates/tokio) to run blocking calls.
//!
//! Every blocking operation of the [`sync`] driver is re-exposed as an `async fn` on
//! [`Client`], [`Database`] or [`Collection`]. Calling one dispatches the blocking call to a
//! bounded worker pool owned by the client and resolves with its result or error once it
//! completes. Queries and aggregations return a lazy [`Cursor`] whose reads are dispatched the
//! same way.
//!
//! The driver reaches a deployment through the [`sync::Connection`] trait. The crate ships an
//! in-process implementation, [`memory::MemoryServer`], which answers the commands the driver
//! sends without a running server.
//!
//! # Example Usage
//!
//! ```rust
//! # async fn run() -> mongodb_motor::error::Result<()> {
//! use mongodb_motor::{bson::{doc, Document}, Client};
//!
//! let client = Client::in_memory();
//! let db = client.database("mydb")?;
//!
//! let coll = db.collection::<Document>("books");
//! coll.insert_many(
//!     vec![
//!         doc! { "title": "1984", "author": "George Orwell" },
//!         doc! { "title": "Animal Farm", "author": "George Orwell" },
//!     ],
//!     None,
//! )
//! .await?;
//!
//! let mut cursor = coll.find(doc! { "author": "George Orwell" }, None);
//! for book in cursor.to_list(None).await? {
//!     println!("title: {}", book.get_str("title").unwrap_or_default());
//! }
//!
//! for name in db.list_collection_names(None).await? {
//!     println!("{}", name);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! A [`Client`] takes its defaults from
//! [`ClientOptions`](options/struct.ClientOptions.html), which can be built directly or parsed
//! from a `mongodb://` connection string. Databases and collections inherit those defaults unless
//! overridden with [`DatabaseOptions`](options/struct.DatabaseOptions.html) or
//! [`CollectionOptions`](options/struct.CollectionOptions.html).
//!
//! The number of blocking calls a client runs at once is set by
//! [`ClientOptions::max_workers`](options/struct.ClientOptions.html#structfield.max_workers). When
//! it is unset, the [`MONGODB_MOTOR_MAX_WORKERS`](runtime::MAX_WORKERS_ENV_VAR) environment
//! variable is consulted, and otherwise `min(32, available_parallelism + 4)` is used.
//!
//! # Tracing
//!
//! Command lifecycle events are emitted with [`tracing`](https://crates.io/crates/tracing) at
//! `debug` level under the `mongodb_motor::command` target; worker pool dispatch is emitted at
//! `trace` level under `mongodb_motor::executor`.

#![warn(missing_docs)]
#![warn(clippy::cast_possible_truncation)]
#![warn(clippy::cast_possible_wrap)]
#![allow(
    clippy::unreadable_literal,
    clippy::cognitive_complexity,
    clippy::float_cmp,
    clippy::match_like_matches_macro,
    clippy::derive_partial_eq_without_eq
)]

pub use ::bson;

mod bson_util;
mod client;
mod codec;
mod coll;
mod concern;
mod cursor;
mod db;
pub mod error;
pub mod memory;
pub mod options;
mod read_preference;
pub mod results;
pub mod runtime;
mod serde_util;
pub mod sync;
#[cfg(test)]
mod test;
mod trace;

pub use crate::{
    client::Client,
    coll::{Collection, Namespace},
    cursor::Cursor,
    db::{CollectionTarget, Database},
};
