use approx::assert_ulps_eq;
use pretty_assertions::assert_eq;

use crate::{
    bson::{doc, Bson, Document},
    error::ErrorKind,
    memory::MemoryServer,
    options::{ClientOptions, ReadPreference, WriteConcern},
    test::{CountingConnection, TestClient},
    Client,
};

#[tokio::test]
async fn server_info() {
    let client = TestClient::new();
    let info = client.server_info().await.unwrap();
    assert!(info.get_str("version").is_ok());
    assert_ulps_eq!(info.get_f64("ok").unwrap(), 1.0);
}

#[tokio::test]
#[function_name::named]
async fn list_and_drop_databases() {
    let client = TestClient::new();
    let coll = client.init_db_and_coll(function_name!(), "coll").await;
    coll.insert_one(doc! { "x": 1 }).await.unwrap();

    let names = client.list_database_names().await.unwrap();
    assert!(names.iter().any(|name| name == function_name!()));

    client.drop_database(function_name!()).await.unwrap();
    let names = client.list_database_names().await.unwrap();
    assert!(!names.iter().any(|name| name == function_name!()));
}

#[tokio::test]
async fn invalid_database_name() {
    let client = TestClient::new();
    for name in ["", "has space", "has.dot", "has$dollar"] {
        let error = client.database(name).unwrap_err();
        assert!(
            matches!(*error.kind, ErrorKind::InvalidArgument { .. }),
            "{:?} gave {:?}",
            name,
            error
        );
    }
}

#[tokio::test]
async fn default_database_from_uri() {
    let client = Client::with_uri_str(
        "mongodb://localhost/reports?w=majority&readPreference=secondary",
        MemoryServer::new(),
    )
    .unwrap();

    let db = client.default_database().unwrap().unwrap();
    assert_eq!(db.name(), "reports");
    assert_eq!(db.write_concern(), &WriteConcern::majority());
    assert_eq!(db.read_preference(), &ReadPreference::secondary());

    assert!(TestClient::new().default_database().is_none());
}

#[tokio::test]
async fn max_workers_from_options() {
    let client = TestClient::with_options(ClientOptions::builder().max_workers(3usize).build());
    assert_eq!(client.max_workers(), 3);

    let client = Client::with_uri_str("mongodb://localhost/?maxWorkers=7", MemoryServer::new())
        .unwrap();
    assert_eq!(client.max_workers(), 7);
}

#[tokio::test]
async fn call_by_name() {
    let client = TestClient::new();

    let info = client.call("server_info", Vec::new()).await.unwrap();
    assert!(matches!(info, Bson::Document(_)));

    let names = client.call("list_database_names", Vec::new()).await.unwrap();
    assert!(matches!(names, Bson::Array(_)));

    let error = client
        .call("drop_database", vec![Bson::Int32(5)])
        .await
        .unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::InvalidType { .. }));

    let error = client.call("foo", Vec::new()).await.unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::NoSuchMethod { .. }));
    assert!(error.to_string().contains("no such method exists"));
}

#[tokio::test]
async fn close_rejects_new_operations() {
    let client = TestClient::new();
    client.server_info().await.unwrap();
    assert!(!client.is_closed());

    client.close().await;
    assert!(client.is_closed());

    let error = client.server_info().await.unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::Shutdown));

    let error = client
        .database("db")
        .unwrap()
        .command(doc! { "ping": 1 })
        .await
        .unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::Shutdown));

    // Closing twice is a no-op.
    client.close().await;
}

#[tokio::test]
async fn close_ends_implicit_session() {
    let connection = CountingConnection::new();
    let first = connection.client(ClientOptions::default());
    let second = connection.client(ClientOptions::default());

    first.server_info().await.unwrap();
    assert_eq!(local_sessions(&second).await.len(), 2);

    first.close().await;
    assert_eq!(connection.count_of("endSessions"), 1);

    let sessions = local_sessions(&second).await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(
        sessions[0].get_document("_id").unwrap(),
        second.delegate().session_id()
    );
}

async fn local_sessions(client: &Client) -> Vec<Document> {
    client
        .database("admin")
        .unwrap()
        .aggregate(vec![doc! { "$listLocalSessions": {} }], None)
        .to_list(None)
        .await
        .unwrap()
}

#[tokio::test]
async fn handles_share_the_client() {
    let client = TestClient::new().into_client();
    let db = client.database("db").unwrap();
    let coll = db.collection::<Document>("coll");

    client.close().await;
    assert!(db.client().is_closed());
    assert!(coll.client().is_closed());
}
