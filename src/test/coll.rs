use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};

use crate::{
    bson::{doc, oid::ObjectId, Bson, Document},
    error::{ErrorKind, WriteFailure},
    options::{CreateCollectionOptions, FindOneOptions, InsertManyOptions},
    test::TestClient,
    Namespace,
};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
struct Item {
    name: String,
    qty: i32,
}

fn item(name: &str, qty: i32) -> Item {
    Item {
        name: name.to_string(),
        qty,
    }
}

#[tokio::test]
#[function_name::named]
async fn namespace() {
    let client = TestClient::new();
    let coll = client.init_db_and_coll(function_name!(), "coll").await;

    assert_eq!(coll.namespace(), Namespace::new(function_name!(), "coll"));
    assert_eq!(coll.namespace().to_string(), format!("{}.coll", function_name!()));
    assert_eq!(coll.database().name(), function_name!());
    assert_eq!(coll.delegate().name(), "coll");
}

#[tokio::test]
#[function_name::named]
async fn insert_and_find_typed() {
    let client = TestClient::new();
    let coll = client
        .init_db_and_coll(function_name!(), "items")
        .await
        .clone_with_type::<Item>();

    let result = coll.insert_one(item("pen", 10)).await.unwrap();
    assert!(matches!(result.inserted_id, Bson::ObjectId(_)));

    let result = coll
        .insert_many([item("pad", 3), item("ink", 7)], None)
        .await
        .unwrap();
    assert_eq!(result.inserted_ids.len(), 2);

    let found = coll.find_one(doc! { "name": "pad" }, None).await.unwrap();
    assert_eq!(found, Some(item("pad", 3)));

    let missing = coll.find_one(doc! { "name": "cap" }, None).await.unwrap();
    assert_eq!(missing, None);

    let largest = coll
        .find_one(
            None,
            FindOneOptions::builder().sort(doc! { "qty": -1 }).build(),
        )
        .await
        .unwrap();
    assert_eq!(largest, Some(item("pen", 10)));

    let mut names: Vec<String> = coll
        .find(doc! { "qty": { "$gte": 5 } }, None)
        .to_list(None)
        .await
        .unwrap()
        .into_iter()
        .map(|item| item.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["ink", "pen"]);
}

#[tokio::test]
#[function_name::named]
async fn insert_keeps_given_id() {
    let client = TestClient::new();
    let coll = client.init_db_and_coll(function_name!(), "coll").await;

    let id = ObjectId::new();
    let result = coll.insert_one(doc! { "_id": id, "x": 1 }).await.unwrap();
    assert_eq!(result.inserted_id, Bson::ObjectId(id));

    let result = coll
        .insert_many(vec![doc! { "_id": "a" }, doc! { "x": 2 }], None)
        .await
        .unwrap();
    assert_eq!(result.inserted_ids.get(&0), Some(&Bson::String("a".into())));
    assert!(matches!(result.inserted_ids.get(&1), Some(Bson::ObjectId(_))));
}

#[tokio::test]
#[function_name::named]
async fn duplicate_key() {
    let client = TestClient::new();
    let coll = client.init_db_and_coll(function_name!(), "coll").await;

    coll.insert_one(doc! { "_id": 1 }).await.unwrap();
    let error = coll.insert_one(doc! { "_id": 1 }).await.unwrap_err();
    match *error.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref write_error)) => {
            assert_eq!(write_error.code, 11000);
        }
        ref other => panic!("expected a write error, got {:?}", other),
    }
    assert_eq!(error.code(), Some(11000));
}

#[tokio::test]
#[function_name::named]
async fn insert_many_ordering() {
    let client = TestClient::new();
    let coll = client.init_db_and_coll(function_name!(), "coll").await;
    let docs = vec![
        doc! { "_id": 1 },
        doc! { "_id": 1 },
        doc! { "_id": 2 },
    ];

    let error = coll.insert_many(docs.clone(), None).await.unwrap_err();
    assert_eq!(error.code(), Some(11000));
    assert_eq!(coll.count_documents(None).await.unwrap(), 1);

    coll.drop().await.unwrap();
    let error = coll
        .insert_many(docs, InsertManyOptions::builder().ordered(false).build())
        .await
        .unwrap_err();
    assert_eq!(error.code(), Some(11000));
    assert_eq!(coll.count_documents(None).await.unwrap(), 2);

    let error = coll
        .insert_many(Vec::<Document>::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::InvalidArgument { .. }));
}

#[tokio::test]
#[function_name::named]
async fn validator_rejects_documents() {
    let client = TestClient::new();
    let db = client.database(function_name!()).unwrap();
    let coll = db
        .create_collection(
            "positive",
            CreateCollectionOptions::builder()
                .validator(doc! { "x": { "$gt": 0 } })
                .build(),
        )
        .await
        .unwrap();

    coll.insert_one(doc! { "x": 1 }).await.unwrap();
    let error = coll.insert_one(doc! { "x": -1 }).await.unwrap_err();
    assert_eq!(error.code(), Some(121));
    assert_eq!(coll.count_documents(None).await.unwrap(), 1);
}

#[tokio::test]
#[function_name::named]
async fn capped_collection_evicts_oldest() {
    let client = TestClient::new();
    let db = client.database(function_name!()).unwrap();
    let coll = db
        .create_collection(
            "capped",
            CreateCollectionOptions::builder()
                .capped(true)
                .size(4096u64)
                .max(2u64)
                .build(),
        )
        .await
        .unwrap();

    for i in 0..3 {
        coll.insert_one(doc! { "_id": i }).await.unwrap();
    }
    let ids: Vec<_> = coll
        .find(None, None)
        .to_list(None)
        .await
        .unwrap()
        .into_iter()
        .map(|doc| doc.get_i32("_id").unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
#[function_name::named]
async fn delete() {
    let client = TestClient::new();
    let coll = client.init_db_and_coll(function_name!(), "coll").await;
    coll.insert_many((0..5).map(|i| doc! { "x": i % 2 }), None)
        .await
        .unwrap();

    let result = coll.delete_one(doc! { "x": 0 }).await.unwrap();
    assert_eq!(result.deleted_count, 1);
    assert_eq!(coll.count_documents(doc! { "x": 0 }).await.unwrap(), 2);

    let result = coll.delete_many(doc! { "x": 1 }).await.unwrap();
    assert_eq!(result.deleted_count, 2);

    let result = coll.delete_many(doc! { "x": 1 }).await.unwrap();
    assert_eq!(result.deleted_count, 0);
    assert_eq!(coll.count_documents(None).await.unwrap(), 2);
}

#[tokio::test]
#[function_name::named]
async fn find_options() {
    let client = TestClient::new();
    let coll = client.init_db_and_coll(function_name!(), "coll").await;
    coll.insert_many((0..10).map(|i| doc! { "_id": i, "x": i * 10 }), None)
        .await
        .unwrap();

    let options = crate::options::FindOptions::builder()
        .sort(doc! { "_id": -1 })
        .skip(2u64)
        .limit(3i64)
        .projection(doc! { "_id": 0, "x": 1 })
        .build();
    let docs = coll.find(None, options).to_list(None).await.unwrap();
    assert_eq!(
        docs,
        vec![doc! { "x": 70 }, doc! { "x": 60 }, doc! { "x": 50 }]
    );

    let docs = coll
        .find(
            doc! { "$or": [{ "_id": 1 }, { "x": { "$in": [80, 90] } }] },
            None,
        )
        .to_list(None)
        .await
        .unwrap();
    assert_eq!(docs.len(), 3);

    let error = coll
        .find(doc! { "$where": "true" }, None)
        .to_list(None)
        .await
        .unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::Command(_)));
}

#[tokio::test]
#[function_name::named]
async fn aggregate() {
    let client = TestClient::new();
    let coll = client.init_db_and_coll(function_name!(), "coll").await;
    coll.insert_many((0..6).map(|i| doc! { "x": i }), None)
        .await
        .unwrap();

    let results = coll
        .aggregate(
            vec![
                doc! { "$match": { "x": { "$gte": 2 } } },
                doc! { "$count": "total" },
            ],
            None,
        )
        .to_list(None)
        .await
        .unwrap();
    assert_eq!(results, vec![doc! { "total": 4 }]);

    let error = coll
        .aggregate(vec![doc! { "$bogus": {} }], None)
        .to_list(None)
        .await
        .unwrap_err();
    assert_eq!(error.code(), Some(40324));
}

#[tokio::test]
#[function_name::named]
async fn drop() {
    let client = TestClient::new();
    let coll = client.init_db_and_coll(function_name!(), "coll").await;
    coll.insert_one(doc! { "x": 1 }).await.unwrap();

    coll.drop().await.unwrap();
    assert_eq!(coll.count_documents(None).await.unwrap(), 0);
    assert!(coll
        .database()
        .list_collection_names(None)
        .await
        .unwrap()
        .is_empty());

    // Dropping again is not an error.
    coll.drop().await.unwrap();
}
