//! Transaction semantics: savepoint bracketing, FIFO serialization under
//! concurrent fan-out, rollback on error.

mod common;

use common::{blog_schema, StubDriver, WireEvent};
use futures_util::future::join_all;
use std::sync::Arc;
use viborm::prelude::*;
use viborm::Dialect;

fn client() -> Client<StubDriver> {
    Client::new(
        StubDriver::new(Dialect::PostgreSQL),
        blog_schema(),
        Arc::new(viborm_postgres::PostgresAdapter::new()),
    )
}

#[tokio::test]
async fn commit_on_success_rollback_on_error() {
    let client1 = client();
    client1
        .transaction(async |tc| {
            tc.execute_raw("UPDATE \"user\" SET \"name\" = NULL", vec![]).await?;
            Ok(())
        })
        .await
        .unwrap();
    let events = client1.driver().events();
    assert!(matches!(events.first(), Some(WireEvent::Begin)));
    assert!(matches!(events.last(), Some(WireEvent::Commit)));

    let client2 = client();
    let result: viborm::Result<()> = client2
        .transaction(async |_tc| {
            Err(viborm::Error::Unexpected {
                context: "forced".into(),
            })
        })
        .await;
    assert!(result.is_err());
    let events = client2.driver().events();
    assert!(matches!(events.last(), Some(WireEvent::Rollback)));
}

#[tokio::test]
async fn nested_transactions_compile_to_savepoints() {
    let client = client();
    client
        .transaction(async |tc| {
            tc.transaction(async |inner| {
                inner.execute_raw("SELECT 1", vec![]).await?;
                Ok(())
            })
            .await
        })
        .await
        .unwrap();

    let statements = client.driver().statements();
    assert_eq!(
        statements,
        vec![
            "SAVEPOINT sp_1".to_string(),
            "SELECT 1".to_string(),
            "RELEASE SAVEPOINT sp_1".to_string(),
        ]
    );
}

#[tokio::test]
async fn failed_savepoint_rolls_back_without_killing_the_outer_scope() {
    let client = client();
    client
        .transaction(async |tc| {
            let failed: viborm::Result<()> = tc
                .transaction(async |_inner| {
                    Err(viborm::Error::Unexpected {
                        context: "boom".into(),
                    })
                })
                .await;
            assert!(failed.is_err());

            // The outer scope keeps working.
            tc.execute_raw("SELECT 2", vec![]).await?;
            Ok(())
        })
        .await
        .unwrap();

    let statements = client.driver().statements();
    assert_eq!(
        statements,
        vec![
            "SAVEPOINT sp_1".to_string(),
            "ROLLBACK TO SAVEPOINT sp_1".to_string(),
            "RELEASE SAVEPOINT sp_1".to_string(),
            "SELECT 2".to_string(),
        ]
    );
    let events = client.driver().events();
    assert!(matches!(events.last(), Some(WireEvent::Commit)));
}

#[tokio::test]
async fn concurrent_nested_transactions_serialize_in_launch_order() {
    let client = client();
    let results = client
        .transaction(async |tc| {
            // Three savepoint scopes launched together: the wire must show
            // each SAVEPOINT/RELEASE bracket completed before the next
            // begins, in launch order.
            let tasks = (1..=3).map(|n| {
                let tc = &tc;
                async move {
                    tc.transaction(async |inner| {
                        inner
                            .execute_raw(&format!("SELECT {n}"), vec![])
                            .await?;
                        Ok(n)
                    })
                    .await
                }
            });
            let results: Vec<viborm::Result<i32>> = join_all(tasks).await;
            results.into_iter().collect::<viborm::Result<Vec<i32>>>()
        })
        .await
        .unwrap();

    // Results preserve launch order.
    assert_eq!(results, vec![1, 2, 3]);

    let statements = client.driver().statements();
    assert_eq!(
        statements,
        vec![
            "SAVEPOINT sp_1".to_string(),
            "SELECT 1".to_string(),
            "RELEASE SAVEPOINT sp_1".to_string(),
            "SAVEPOINT sp_2".to_string(),
            "SELECT 2".to_string(),
            "RELEASE SAVEPOINT sp_2".to_string(),
            "SAVEPOINT sp_3".to_string(),
            "SELECT 3".to_string(),
            "RELEASE SAVEPOINT sp_3".to_string(),
        ]
    );
}

#[tokio::test]
async fn savepoint_brackets_are_lifo_when_truly_nested() {
    let client = client();
    client
        .transaction(async |tc| {
            tc.transaction(async |level1| {
                level1
                    .transaction(async |level2| {
                        level2.execute_raw("SELECT 9", vec![]).await?;
                        Ok(())
                    })
                    .await
            })
            .await
        })
        .await
        .unwrap();

    let statements = client.driver().statements();
    assert_eq!(
        statements,
        vec![
            "SAVEPOINT sp_1".to_string(),
            "SAVEPOINT sp_2".to_string(),
            "SELECT 9".to_string(),
            "RELEASE SAVEPOINT sp_2".to_string(),
            "RELEASE SAVEPOINT sp_1".to_string(),
        ]
    );
}

#[tokio::test]
async fn model_operations_inside_a_transaction_use_the_same_connection() {
    let client = client();
    client.driver().respond_rows(Vec::new());
    client
        .transaction(async |tc| {
            let users = tc.model("user")?;
            users.find_many(FindArgs::default()).await?;
            Ok(())
        })
        .await
        .unwrap();

    let events = client.driver().events();
    assert!(matches!(events.first(), Some(WireEvent::Begin)));
    assert!(matches!(events.last(), Some(WireEvent::Commit)));
    let statements = client.driver().statements();
    assert_eq!(statements.len(), 1);
    assert!(statements[0].starts_with("SELECT"));
}
