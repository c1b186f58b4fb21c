use std::time::Duration;

use futures::stream::{StreamExt, TryStreamExt};
use pretty_assertions::assert_eq;

use crate::{
    bson::{doc, Document},
    error::ErrorKind,
    options::{AggregateOptions, ClientOptions, FindOptions},
    test::{CountingConnection, TestClient},
    Client,
    Collection,
};

async fn populated(client: &Client, name: &str, n: i32) -> Collection<Document> {
    let coll = client.database(name).unwrap().collection::<Document>("coll");
    coll.drop().await.unwrap();
    coll.insert_many((0..n).map(|i| doc! { "_id": i }), None)
        .await
        .unwrap();
    coll
}

fn ids(docs: &[Document]) -> Vec<i32> {
    docs.iter().map(|doc| doc.get_i32("_id").unwrap()).collect()
}

#[tokio::test]
#[function_name::named]
async fn batches_are_fetched_with_get_more() {
    let connection = CountingConnection::new();
    let client = connection.client(ClientOptions::default());
    let coll = populated(&client, function_name!(), 10).await;

    let mut cursor = coll.find(None, FindOptions::builder().batch_size(3u32).build());
    let docs = cursor.to_list(None).await.unwrap();
    assert_eq!(ids(&docs), (0..10).collect::<Vec<_>>());
    assert_eq!(connection.count_of("find"), 1);
    assert_eq!(connection.count_of("getMore"), 3);

    let mut cursor = coll.aggregate(
        vec![doc! { "$sort": { "_id": -1 } }],
        AggregateOptions::builder().batch_size(4u32).build(),
    );
    let docs = cursor.to_list(None).await.unwrap();
    assert_eq!(ids(&docs), (0..10).rev().collect::<Vec<_>>());
    assert_eq!(connection.count_of("getMore"), 5);
}

#[tokio::test]
#[function_name::named]
async fn commands_are_lazy() {
    let connection = CountingConnection::new();
    let client = connection.client(ClientOptions::default());
    let coll = populated(&client, function_name!(), 3).await;

    let cursor = coll.find(None, None);
    let aggregate = coll.aggregate(vec![doc! { "$match": {} }], None);
    assert_eq!(connection.count_of("find"), 0);
    assert_eq!(connection.count_of("aggregate"), 0);

    drop(cursor);
    drop(aggregate);
    assert_eq!(connection.count_of("find"), 0);
    assert_eq!(connection.count_of("killCursors"), 0);
}

#[tokio::test]
#[function_name::named]
async fn to_list_length() {
    let client = TestClient::new();
    let coll = populated(&client, function_name!(), 5).await;

    let mut cursor = coll.find(None, FindOptions::builder().batch_size(2u32).build());
    assert!(cursor.to_list(0).await.unwrap().is_empty());
    assert_eq!(ids(&cursor.to_list(3).await.unwrap()), vec![0, 1, 2]);
    assert_eq!(ids(&cursor.to_list(None).await.unwrap()), vec![3, 4]);
    assert!(cursor.to_list(None).await.unwrap().is_empty());
}

#[tokio::test]
#[function_name::named]
async fn to_list_zero_still_runs_the_command() {
    let client = TestClient::new();
    let coll = populated(&client, function_name!(), 1).await;

    let mut cursor = coll.find(doc! { "$where": "true" }, None);
    let error = cursor.to_list(0).await.unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::Command(_)));

    // A failed cursor stays exhausted.
    assert!(cursor.to_list(None).await.unwrap().is_empty());
    assert_eq!(cursor.try_next().await.unwrap(), None);
}

#[tokio::test]
#[function_name::named]
async fn try_next() {
    let client = TestClient::new();
    let coll = populated(&client, function_name!(), 4).await;

    let mut cursor = coll.find(None, FindOptions::builder().batch_size(1u32).build());
    let mut seen = Vec::new();
    while let Some(doc) = cursor.try_next().await.unwrap() {
        seen.push(doc);
    }
    assert_eq!(ids(&seen), vec![0, 1, 2, 3]);
    assert_eq!(cursor.try_next().await.unwrap(), None);
}

#[tokio::test]
#[function_name::named]
async fn into_stream() {
    let client = TestClient::new();
    let coll = populated(&client, function_name!(), 6).await;

    let docs: Vec<Document> = coll
        .find(doc! { "_id": { "$lt": 4 } }, FindOptions::builder().batch_size(2u32).build())
        .into_stream()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(ids(&docs), vec![0, 1, 2, 3]);

    let count = coll.find(None, None).into_stream().count().await;
    assert_eq!(count, 6);
}

#[tokio::test]
#[function_name::named]
async fn close_kills_server_cursor() {
    let connection = CountingConnection::new();
    let client = connection.client(ClientOptions::default());
    let coll = populated(&client, function_name!(), 5).await;

    let mut cursor = coll.find(None, FindOptions::builder().batch_size(2u32).build());
    assert_eq!(ids(&cursor.to_list(1).await.unwrap()), vec![0]);

    cursor.close().await.unwrap();
    assert_eq!(connection.count_of("killCursors"), 1);
    assert!(cursor.to_list(None).await.unwrap().is_empty());

    // Closing a cursor that was never started sends nothing.
    let mut unstarted = coll.find(None, None);
    unstarted.close().await.unwrap();
    assert_eq!(connection.count_of("find"), 1);
    drop(unstarted);
    drop(cursor);
    assert_eq!(connection.count_of("killCursors"), 1);
}

#[tokio::test]
#[function_name::named]
async fn drop_kills_server_cursor() {
    let connection = CountingConnection::new();
    let client = connection.client(ClientOptions::default());
    let coll = populated(&client, function_name!(), 5).await;

    let mut cursor = coll.find(None, FindOptions::builder().batch_size(2u32).build());
    cursor.try_next().await.unwrap();
    drop(cursor);

    for _ in 0..100 {
        if connection.count_of("killCursors") == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(connection.count_of("killCursors"), 1);

    // An exhausted cursor has nothing to kill.
    let mut cursor = coll.find(None, None);
    cursor.to_list(None).await.unwrap();
    drop(cursor);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(connection.count_of("killCursors"), 1);
}

#[tokio::test]
#[function_name::named]
async fn single_batch_limit() {
    let connection = CountingConnection::new();
    let client = connection.client(ClientOptions::default());
    let coll = populated(&client, function_name!(), 5).await;

    let docs = coll
        .find(None, FindOptions::builder().limit(-2i64).build())
        .to_list(None)
        .await
        .unwrap();
    assert_eq!(ids(&docs), vec![0, 1]);
    assert_eq!(connection.count_of("getMore"), 0);
}

#[tokio::test]
#[function_name::named]
async fn debug_reports_state() {
    let client = TestClient::new();
    let coll = populated(&client, function_name!(), 2).await;

    let mut cursor = coll.find(None, None);
    assert!(format!("{:?}", cursor).contains("pending"));
    cursor.to_list(None).await.unwrap();
    assert!(format!("{:?}", cursor).contains("exhausted"));
}
