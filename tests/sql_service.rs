use rust_sqlite_wire::service::is_fatal;
use rust_sqlite_wire::{Batch, BatchResponse, Routed, Session, SqlService, SqliteConfig, StateMachine};
use tempfile::TempDir;

fn create_service() -> (SqlService, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let service = SqlService::open(SqliteConfig::new(dir.path().join("sqlite.db"))).unwrap();
    (service, dir)
}

fn single(response: BatchResponse) -> rust_sqlite_wire::ResultSet {
    match response {
        BatchResponse::Single(set) => set,
        other => panic!("expected single response, got {other:?}"),
    }
}

#[tokio::test]
async fn test_exec_then_query() {
    let (service, _dir) = create_service();
    service
        .exec(r#"["CREATE TABLE kv (k TEXT PRIMARY KEY, v TEXT)", "INSERT INTO kv VALUES ('a', '1')"]"#)
        .await
        .unwrap();

    let set = single(service.query(r#""SELECT v FROM kv WHERE k = 'a'""#).await.unwrap());
    assert_eq!(set.column_names(), vec!["v"]);
    assert_eq!(set.text(0, 0).as_deref(), Some("1"));
}

#[tokio::test]
async fn test_query_rejects_writes() {
    let (service, _dir) = create_service();
    service.exec(r#""CREATE TABLE t (a)""#).await.unwrap();

    let err = service.query(r#""INSERT INTO t VALUES (1)""#).await.unwrap_err();
    assert!(err.to_string().contains("write statement on read path"));
    let set = single(service.query(r#""SELECT count(*) FROM t""#).await.unwrap());
    assert_eq!(set.text(0, 0).as_deref(), Some("0"));
}

#[tokio::test]
async fn test_sql_errors_are_not_fatal() {
    let (service, _dir) = create_service();
    let err = service.exec(r#""SELEC 1""#).await.unwrap_err();
    assert!(!is_fatal(&err));
    let err = service.exec("not json").await.unwrap_err();
    assert!(err.to_string().contains("invalid request body"));
}

#[tokio::test]
async fn test_snapshot_restore_and_tick() {
    let (service, _dir) = create_service();
    service
        .exec(r#"["CREATE TABLE t (a)", "INSERT INTO t VALUES (1)"]"#)
        .await
        .unwrap();
    service.tick().await;

    let image = service.snapshot().await.unwrap();
    service.exec(r#""INSERT INTO t VALUES (2)""#).await.unwrap();
    service.restore(&image).await.unwrap();

    let set = single(service.query(r#""SELECT count(*) FROM t""#).await.unwrap());
    assert_eq!(set.text(0, 0).as_deref(), Some("1"));
}

#[tokio::test]
async fn test_closed_service() {
    let (service, _dir) = create_service();
    service.close().await.unwrap();
    let err = service.query(r#""SELECT 1""#).await.unwrap_err();
    assert_eq!(err.to_string(), "database is closed");
    assert!(service.close().await.is_err());
}

#[tokio::test]
async fn test_session_routes_into_service() {
    let (service, _dir) = create_service();
    let mut session = Session::new().unwrap();

    let Routed::Write(batch) = session.submit("CREATE TABLE t (a)").unwrap() else {
        panic!("create must be a write");
    };
    service.exec(&batch.to_json().unwrap()).await.unwrap();

    session.begin().unwrap();
    assert!(session.in_transaction());
    assert_eq!(session.submit("INSERT INTO t VALUES (1)").unwrap(), Routed::Queued);
    assert_eq!(session.submit("SELECT * FROM t").unwrap(), Routed::Queued);
    let batch = match session.end(true).unwrap() {
        Routed::Write(batch) => batch,
        other => panic!("mixed transaction must be a write, got {other:?}"),
    };
    assert_eq!(
        batch,
        Batch::Transaction(vec!["INSERT INTO t VALUES (1)".to_string(), "SELECT * FROM t".to_string()])
    );
    let BatchResponse::Transaction(results) = service.exec(&batch.to_json().unwrap()).await.unwrap() else {
        panic!("expected transaction response");
    };
    assert_eq!(results[1].as_ref().unwrap().text(0, 0).as_deref(), Some("1"));

    let Routed::Read(batch) = session.submit("SELECT a FROM t").unwrap() else {
        panic!("select must be a read");
    };
    let set = single(service.query(&batch.to_json().unwrap()).await.unwrap());
    assert_eq!(set.rows.len(), 1);
}

#[test]
fn test_session_transaction_state() {
    let mut session = Session::new().unwrap();
    assert!(session.end(true).is_err());

    session.begin().unwrap();
    let err = session.begin().unwrap_err();
    assert_eq!(err.to_string(), "nested transactions are not supported");

    session.submit("INSERT INTO t VALUES (1)").unwrap();
    assert_eq!(session.end(false).unwrap(), Routed::Discarded);
    assert!(!session.in_transaction());

    session.begin().unwrap();
    session.submit("SELECT 1").unwrap();
    session.submit("SELECT * FROM t").unwrap();
    assert_eq!(
        session.end(true).unwrap(),
        Routed::Read(Batch::Transaction(vec!["SELECT 1".to_string(), "SELECT * FROM t".to_string()]))
    );

    let err = session.end(true).unwrap_err();
    assert_eq!(err.to_string(), "transaction not started");
    assert!(session.submit("SELECT 1; DROP TABLE t").is_err());

    let err = session
        .submit("INSERT INTO t VALUES (1); INSERT INTO t VALUES (2)")
        .unwrap_err();
    assert_eq!(err.to_string(), "too much input");
    session.begin().unwrap();
    assert!(session.submit("SELECT * FROM t; DROP TABLE t").is_err());
    assert_eq!(session.end(false).unwrap(), Routed::Discarded);
}
