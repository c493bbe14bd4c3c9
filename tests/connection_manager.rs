#![allow(missing_docs)]

mod support;

use std::sync::Arc;
use std::time::Duration;

use graphgate::backend::{BackendError, Statement};
use graphgate::GatewayError;
use tokio::task::JoinSet;

use support::{count_row, Script};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_use_connects_once() {
    let script = Script::new();
    script.delay_connect(Duration::from_millis(50));
    let manager = script.manager(Duration::from_secs(5));

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let manager = Arc::clone(&manager);
        tasks.spawn(async move {
            manager
                .run_once("probe", &Statement::new("RETURN 1 AS one"))
                .await
                .map(|rows| rows.len())
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap().unwrap();
    }

    assert_eq!(script.connects(), 1);
    assert_eq!(script.statements().len(), 8);
    assert!(manager.is_connected().await);
}

#[tokio::test]
async fn failed_initialization_is_retried_by_next_caller() {
    let script = Script::new();
    script.fail_connects(1);
    let manager = script.manager(Duration::from_secs(5));

    let err = manager
        .run_once("probe", &Statement::new("RETURN 1"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Internal(_)));
    assert!(!manager.is_connected().await);

    manager
        .run_once("probe", &Statement::new("RETURN 1"))
        .await
        .unwrap();
    assert_eq!(script.connects(), 2);
    assert!(manager.is_connected().await);
}

#[tokio::test]
async fn units_of_work_release_on_every_exit_path() {
    let script = Script::new();
    script.fail(BackendError::Rejected("constraint violated".into()));
    script.respond(vec![count_row("count", 1)]);
    let manager = script.manager(Duration::from_secs(5));

    let err = manager
        .run_once("probe", &Statement::new("CREATE (n:Unique {k: 1})"))
        .await
        .unwrap_err();
    assert_eq!(err.public_message(), "Database error: constraint violated");
    assert_eq!(script.live_sessions(), 0);

    {
        let mut unit = manager.acquire().await.unwrap();
        assert_eq!(script.live_sessions(), 1);
        let row = unit
            .first(&Statement::new("MATCH (n) RETURN count(n) AS count"))
            .await
            .unwrap();
        assert!(row.is_some());
        assert_eq!(unit.statements(), 1);
    }
    assert_eq!(script.live_sessions(), 0);
}

#[tokio::test]
async fn slow_statements_time_out() {
    let script = Script::new();
    script.delay_statements(Duration::from_millis(500));
    let manager = script.manager(Duration::from_millis(20));

    let err = manager
        .run_once("probe", &Statement::new("CALL apoc.util.sleep(500)"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Timeout(_)));
    assert_eq!(script.live_sessions(), 0);
}

#[tokio::test]
async fn shutdown_releases_the_handle_once() {
    let script = Script::new();
    let manager = script.manager(Duration::from_secs(5));
    manager
        .run_once("probe", &Statement::new("RETURN 1"))
        .await
        .unwrap();

    manager.shutdown().await;
    manager.shutdown().await;
    assert!(!manager.is_connected().await);

    let err = manager.acquire().await.err().unwrap();
    assert!(matches!(err, GatewayError::Internal(_)));
    assert_eq!(script.connects(), 1);
}
