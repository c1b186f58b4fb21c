use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::bson::{doc, spec::BinarySubtype, Binary, Bson, DateTime, Document};

/// The documents returned to a client in the first batch when it does not ask for a size.
pub(super) const DEFAULT_FIRST_BATCH_SIZE: usize = 101;

#[derive(Debug)]
pub(super) struct Store {
    pub(super) databases: BTreeMap<String, DatabaseState>,
    pub(super) cursors: HashMap<i64, CursorState>,
    pub(super) sessions: BTreeMap<String, SessionRecord>,
    next_cursor_id: i64,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            databases: BTreeMap::new(),
            cursors: HashMap::new(),
            sessions: BTreeMap::new(),
            next_cursor_id: 1,
        }
    }
}

#[derive(Debug, Default)]
pub(super) struct DatabaseState {
    pub(super) collections: BTreeMap<String, CollectionState>,
}

#[derive(Debug)]
pub(super) struct CollectionState {
    pub(super) uuid: Binary,
    pub(super) options: Document,
    pub(super) documents: Vec<Document>,
}

impl CollectionState {
    pub(super) fn new(options: Document) -> Self {
        Self {
            uuid: Binary {
                subtype: BinarySubtype::Uuid,
                bytes: uuid::Uuid::new_v4().as_bytes().to_vec(),
            },
            options,
            documents: Vec::new(),
        }
    }

    pub(super) fn validator(&self) -> Option<&Document> {
        self.options.get_document("validator").ok()
    }

    /// The document limit of a capped collection.
    pub(super) fn max_documents(&self) -> Option<usize> {
        if !self.options.get_bool("capped").unwrap_or(false) {
            return None;
        }
        self.options
            .get("max")
            .and_then(crate::bson_util::get_u64)
            .filter(|max| *max > 0)
            .and_then(|max| usize::try_from(max).ok())
    }

    /// The entry describing this collection in a `listCollections` reply.
    pub(super) fn specification(&self, name: &str) -> Document {
        doc! {
            "name": name,
            "type": "collection",
            "options": self.options.clone(),
            "info": { "readOnly": false, "uuid": self.uuid.clone() },
            "idIndex": { "v": 2, "key": { "_id": 1 }, "name": "_id_" },
        }
    }
}

#[derive(Debug)]
pub(super) struct CursorState {
    pub(super) ns: String,
    pub(super) documents: VecDeque<Document>,
}

#[derive(Debug)]
pub(super) struct SessionRecord {
    pub(super) lsid: Document,
    pub(super) last_use: DateTime,
}

impl Store {
    pub(super) fn collection(&self, db: &str, coll: &str) -> Option<&CollectionState> {
        self.databases.get(db)?.collections.get(coll)
    }

    pub(super) fn collection_mut(&mut self, db: &str, coll: &str) -> Option<&mut CollectionState> {
        self.databases.get_mut(db)?.collections.get_mut(coll)
    }

    /// Gets a collection, creating it and its database if needed.
    pub(super) fn collection_or_create(&mut self, db: &str, coll: &str) -> &mut CollectionState {
        self.databases
            .entry(db.to_string())
            .or_default()
            .collections
            .entry(coll.to_string())
            .or_insert_with(|| CollectionState::new(Document::new()))
    }

    pub(super) fn drop_collection(&mut self, db: &str, coll: &str) -> Option<CollectionState> {
        let database = self.databases.get_mut(db)?;
        let dropped = database.collections.remove(coll);
        if database.collections.is_empty() {
            self.databases.remove(db);
        }
        dropped
    }

    /// Hands out the first batch of `documents` and parks the remainder under a new cursor id.
    /// Returns the `cursor` field of the reply.
    pub(super) fn open_cursor(
        &mut self,
        ns: String,
        mut documents: VecDeque<Document>,
        batch_size: Option<usize>,
        single_batch: bool,
    ) -> Document {
        // An explicit size of 0 opens the cursor without returning anything yet.
        let first_batch = match batch_size {
            Some(0) => Vec::new(),
            size => take_batch(&mut documents, size.unwrap_or(DEFAULT_FIRST_BATCH_SIZE)),
        };

        let id = if single_batch || documents.is_empty() {
            0
        } else {
            let id = self.next_cursor_id;
            self.next_cursor_id += 1;
            self.cursors.insert(
                id,
                CursorState {
                    ns: ns.clone(),
                    documents,
                },
            );
            id
        };

        doc! { "firstBatch": first_batch, "id": id, "ns": ns }
    }

    pub(super) fn touch_session(&mut self, lsid: &Document) {
        let key = Bson::Document(lsid.clone()).into_relaxed_extjson().to_string();
        self.sessions.insert(
            key,
            SessionRecord {
                lsid: lsid.clone(),
                last_use: DateTime::now(),
            },
        );
    }

    pub(super) fn end_session(&mut self, lsid: &Document) {
        let key = Bson::Document(lsid.clone()).into_relaxed_extjson().to_string();
        self.sessions.remove(&key);
    }
}

/// Removes up to `size` documents from the front of `documents`. A size of 0 means no limit.
pub(super) fn take_batch(documents: &mut VecDeque<Document>, size: usize) -> Vec<Bson> {
    let size = if size == 0 { documents.len() } else { size.min(documents.len()) };
    documents.drain(..size).map(Bson::Document).collect()
}
