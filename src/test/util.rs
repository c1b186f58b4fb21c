use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
        Mutex,
    },
    time::Duration,
};

use crate::{
    bson::Document,
    error::Result,
    memory::MemoryServer,
    options::ClientOptions,
    sync::Connection,
    Client,
    Collection,
};

#[derive(Clone, Debug)]
pub(crate) struct TestClient {
    client: Client,
}

impl std::ops::Deref for TestClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

impl TestClient {
    pub(crate) fn new() -> Self {
        Self::with_options(ClientOptions::default())
    }

    pub(crate) fn with_options(options: ClientOptions) -> Self {
        Self {
            client: Client::with_options(MemoryServer::new(), options),
        }
    }

    /// Gets a handle to `db_name.coll_name`, dropping the collection first.
    pub(crate) async fn init_db_and_coll(
        &self,
        db_name: &str,
        coll_name: &str,
    ) -> Collection<Document> {
        let coll = self
            .database(db_name)
            .unwrap()
            .collection::<Document>(coll_name);
        coll.drop().await.unwrap();
        coll
    }

    pub(crate) fn into_client(self) -> Client {
        self.client
    }
}

/// A [`Connection`] over a [`MemoryServer`] that records the commands it is sent and how many
/// of them ran at once, optionally sleeping before answering each one.
#[derive(Clone, Debug, Default)]
pub(crate) struct CountingConnection {
    server: MemoryServer,
    delay: Duration,
    stats: Arc<Stats>,
}

#[derive(Debug, Default)]
struct Stats {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    completed: AtomicUsize,
    commands: Mutex<Vec<String>>,
}

impl CountingConnection {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub(crate) fn client(&self, options: ClientOptions) -> Client {
        Client::with_options(self.clone(), options)
    }

    /// The most commands that were ever running at the same time.
    pub(crate) fn max_in_flight(&self) -> usize {
        self.stats.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn completed(&self) -> usize {
        self.stats.completed.load(Ordering::SeqCst)
    }

    /// The names of the commands sent so far, in order.
    pub(crate) fn command_names(&self) -> Vec<String> {
        self.stats.commands.lock().unwrap().clone()
    }

    pub(crate) fn count_of(&self, command_name: &str) -> usize {
        self.command_names()
            .iter()
            .filter(|name| name.as_str() == command_name)
            .count()
    }
}

impl Connection for CountingConnection {
    fn send_command(&self, db: &str, command: Document) -> Result<Document> {
        let name = command.keys().next().cloned().unwrap_or_default();
        self.stats.commands.lock().unwrap().push(name);

        let in_flight = self.stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats
            .max_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let reply = self.server.send_command(db, command);

        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.stats.completed.fetch_add(1, Ordering::SeqCst);
        reply
    }
}
