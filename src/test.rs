mod client;
mod coll;
mod cursor;
mod runtime;
mod util;

pub(crate) use self::util::{CountingConnection, TestClient};
