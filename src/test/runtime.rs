use std::time::Duration;

use futures::future::join_all;
use pretty_assertions::assert_eq;

use crate::{
    bson::doc,
    error::ErrorKind,
    options::ClientOptions,
    runtime::{default_max_workers, WorkerPool},
    test::CountingConnection,
};

#[tokio::test]
async fn pool_bounds_concurrent_calls() {
    let connection = CountingConnection::with_delay(Duration::from_millis(50));
    let client = connection.client(ClientOptions::builder().max_workers(2usize).build());
    let db = client.database("bounded").unwrap();

    let pings = (0..6).map(|_| db.command(doc! { "ping": 1 }));
    for reply in join_all(pings).await {
        reply.unwrap();
    }

    assert_eq!(connection.completed(), 6);
    assert_eq!(connection.max_in_flight(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pool_is_shared_by_handles() {
    let connection = CountingConnection::with_delay(Duration::from_millis(20));
    let client = connection.client(ClientOptions::builder().max_workers(1usize).build());
    let db = client.database("shared").unwrap();
    let coll = db.collection::<crate::bson::Document>("coll");

    let mut tasks = Vec::new();
    for i in 0..4 {
        let coll = coll.clone();
        let db = db.clone();
        tasks.push(tokio::spawn(async move {
            coll.insert_one(doc! { "i": i }).await?;
            db.command(doc! { "ping": 1 }).await.map(|_| ())
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(connection.max_in_flight(), 1);
    assert_eq!(coll.count_documents(None).await.unwrap(), 4);
}

#[tokio::test]
async fn abandoned_call_still_completes() {
    let connection = CountingConnection::with_delay(Duration::from_millis(200));
    let client = connection.client(ClientOptions::default());
    let coll = client
        .database("abandoned")
        .unwrap()
        .collection::<crate::bson::Document>("coll");

    let timed_out = tokio::time::timeout(
        Duration::from_millis(20),
        coll.insert_one(doc! { "_id": 1 }),
    )
    .await;
    assert!(timed_out.is_err());

    for _ in 0..50 {
        if connection.completed() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(connection.completed(), 1);

    // The write went through even though nobody awaited its result.
    let error = coll.insert_one(doc! { "_id": 1 }).await.unwrap_err();
    assert_eq!(error.code(), Some(11000));
}

#[tokio::test]
async fn close_lets_running_calls_finish() {
    let connection = CountingConnection::with_delay(Duration::from_millis(100));
    let client = connection.client(ClientOptions::default());
    let db = client.database("closing").unwrap();

    let running = tokio::spawn({
        let db = db.clone();
        async move { db.command(doc! { "ping": 1 }).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    client.close().await;
    assert!(running.await.unwrap().is_ok());

    let error = db.command(doc! { "ping": 1 }).await.unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::Shutdown));
}

#[tokio::test]
async fn pool_size() {
    assert_eq!(WorkerPool::new(0).max_workers(), 1);
    assert_eq!(WorkerPool::new(8).max_workers(), 8);

    if std::env::var(crate::runtime::MAX_WORKERS_ENV_VAR).is_err() {
        let default = default_max_workers();
        assert!((5..=32).contains(&default), "default was {}", default);
    }
}

#[tokio::test]
async fn closed_pool_rejects_calls() {
    let pool = WorkerPool::new(1);
    assert_eq!(pool.execute("first", || Ok(1)).await.unwrap(), 1);

    pool.close();
    assert!(pool.is_closed());
    let error = pool.execute("second", || Ok(2)).await.unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::Shutdown));
}

#[tokio::test]
async fn call_errors_are_returned() {
    let pool = WorkerPool::new(2);
    let error = pool
        .execute::<_, ()>("failing", || Err(crate::error::Error::internal("boom")))
        .await
        .unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::Internal { .. }));
}
