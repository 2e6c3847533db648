//! Integration tests for the statement builder against SQLite.
//!
//! Tests verify that:
//! - insert/update/delete report generated keys and affected rows
//! - Row, record and scalar selects map results correctly
//! - append_in expands membership tests
//! - Sessions close, reopen and log statements in dev mode

use chrono::{NaiveDateTime, Utc};
use simple_db::{DbConfig, DbError, Session, SimpleDb, Value, impl_record, params};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Debug, Default, Clone, PartialEq)]
struct Article {
    id: i64,
    title: String,
    body: String,
    created_date: Option<NaiveDateTime>,
    modified_date: Option<NaiveDateTime>,
    is_blind: bool,
}

impl_record!(Article {
    id,
    title,
    body,
    created_date => "createdDate",
    modified_date => "modifiedDate",
    is_blind => "isBlind",
});

/// Create a SQLite database with six articles ("제목1".."제목6").
async fn setup_db() -> (SimpleDb, TempDir) {
    let dir = TempDir::new().unwrap();
    let db = SimpleDb::open(DbConfig::sqlite(dir.path().join("simple_db.sqlite")))
        .await
        .unwrap();

    let mut session = db.session();
    session
        .run(
            "CREATE TABLE article (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                body TEXT,
                createdDate DATETIME NOT NULL,
                modifiedDate DATETIME NOT NULL,
                isBlind BOOLEAN NOT NULL
            )",
        )
        .await
        .unwrap();

    for no in 1..=6 {
        session
            .run_with(
                "INSERT INTO article (title, body, createdDate, modifiedDate, isBlind)
                 VALUES (?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP, ?)",
                &params![format!("제목{}", no), format!("내용{}", no), false],
            )
            .await
            .unwrap();
    }
    session.close().await.unwrap();

    (db, dir)
}

async fn count_articles(session: &mut Session) -> i64 {
    session
        .gen_sql()
        .append("SELECT COUNT(*) FROM article")
        .select_long()
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_insert_returns_generated_key() {
    let (db, _dir) = setup_db().await;
    let mut session = db.session();

    let new_id = session
        .gen_sql()
        .append("INSERT INTO article")
        .append("(title, body, createdDate, modifiedDate, isBlind)")
        .append_with("VALUES (?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP, ?)", params!["새 제목", "새 내용", false])
        .insert()
        .await
        .unwrap();
    assert_eq!(new_id, 7);

    let article: Article = session
        .gen_sql()
        .append_with("SELECT * FROM article WHERE id = ?", [new_id])
        .select_row_as()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(article.id, new_id);
    assert_eq!(article.title, "새 제목");
    assert_eq!(article.body, "새 내용");
    assert!(!article.is_blind);
}

#[tokio::test]
async fn test_insert_without_generated_key_fails() {
    let (db, _dir) = setup_db().await;
    let mut session = db.session();

    let err = session
        .gen_sql()
        .append("INSERT INTO article (title, createdDate, modifiedDate, isBlind)")
        .append("SELECT title, createdDate, modifiedDate, isBlind FROM article WHERE id < 0")
        .insert()
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Execution { .. }));
}

#[tokio::test]
async fn test_update_returns_affected_rows() {
    let (db, _dir) = setup_db().await;
    let mut session = db.session();

    let affected = session
        .gen_sql()
        .append("UPDATE article")
        .append_with("SET title = ?", ["수정된 제목"])
        .append_in("WHERE id IN (?)", [0, 1, 2, 3])
        .update()
        .await
        .unwrap();
    assert_eq!(affected, 3);

    let title = session
        .gen_sql()
        .append("SELECT title FROM article WHERE id = 2")
        .select_string()
        .await
        .unwrap();
    assert_eq!(title.as_deref(), Some("수정된 제목"));
}

#[tokio::test]
async fn test_delete_returns_affected_rows() {
    let (db, _dir) = setup_db().await;
    let mut session = db.session();

    let affected = session
        .gen_sql()
        .append("DELETE FROM article")
        .append_in("WHERE id IN (?)", [0, 1, 3])
        .delete()
        .await
        .unwrap();
    assert_eq!(affected, 2);
    assert_eq!(count_articles(&mut session).await, 4);
}

#[tokio::test]
async fn test_select_rows_reflects_result_columns() {
    let (db, _dir) = setup_db().await;
    let mut session = db.session();

    let rows = session
        .gen_sql()
        .append("SELECT id, title, isBlind, createdDate FROM article")
        .append("ORDER BY id ASC")
        .append("LIMIT 3")
        .select_rows()
        .await
        .unwrap();

    assert_eq!(rows.len(), 3);
    for (i, row) in rows.iter().enumerate() {
        let no = i as i64 + 1;
        let columns: Vec<&str> = row.columns().collect();
        assert_eq!(columns, vec!["id", "title", "isBlind", "createdDate"]);
        assert_eq!(row.get("id"), Some(&Value::Int(no)));
        assert_eq!(row.get_as::<String>("title").unwrap(), Some(format!("제목{}", no)));
        assert_eq!(row.get("isBlind"), Some(&Value::Bool(false)));
        assert!(matches!(row.get("createdDate"), Some(Value::DateTime(_))));
    }
}

#[tokio::test]
async fn test_select_row() {
    let (db, _dir) = setup_db().await;
    let mut session = db.session();

    let row = session
        .gen_sql()
        .append("SELECT * FROM article WHERE id = 1")
        .select_row()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get_as::<i64>("id").unwrap(), Some(1));
    assert_eq!(row.get_as::<String>("body").unwrap().as_deref(), Some("내용1"));
    assert_eq!(row.len(), 6);

    let missing = session
        .gen_sql()
        .append("SELECT * FROM article WHERE id = 999")
        .select_row()
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_select_row_keeps_last_of_many() {
    let (db, _dir) = setup_db().await;
    let mut session = db.session();

    let row = session
        .gen_sql()
        .append("SELECT id FROM article ORDER BY id ASC")
        .select_row()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get("id"), Some(&Value::Int(6)));
}

#[tokio::test]
async fn test_select_rows_as_records() {
    let (db, _dir) = setup_db().await;
    let mut session = db.session();

    let articles: Vec<Article> = session
        .gen_sql()
        .append("SELECT * FROM article ORDER BY id ASC")
        .select_rows_as()
        .await
        .unwrap();

    assert_eq!(articles.len(), 6);
    for (i, article) in articles.iter().enumerate() {
        let no = i as i64 + 1;
        assert_eq!(article.id, no);
        assert_eq!(article.title, format!("제목{}", no));
        assert_eq!(article.body, format!("내용{}", no));
        assert!(article.created_date.is_some());
        assert!(article.modified_date.is_some());
        assert!(!article.is_blind);
    }
}

#[tokio::test]
async fn test_select_row_as_absent_is_none() {
    let (db, _dir) = setup_db().await;
    let mut session = db.session();

    let article: Option<Article> = session
        .gen_sql()
        .append_with("SELECT * FROM article WHERE id = ?", [999])
        .select_row_as()
        .await
        .unwrap();
    assert_eq!(article, None);
}

#[tokio::test]
async fn test_record_mapping_uses_column_labels() {
    let (db, _dir) = setup_db().await;
    let mut session = db.session();

    let article: Article = session
        .gen_sql()
        .append("SELECT id, title AS body, 'extra' AS unknownColumn FROM article WHERE id = 2")
        .select_row_as()
        .await
        .unwrap()
        .unwrap();

    assert_eq!(article.id, 2);
    assert_eq!(article.body, "제목2");
    assert_eq!(article.title, "");
    assert_eq!(article.created_date, None);
}

#[tokio::test]
async fn test_null_column_keeps_record_default() {
    let (db, _dir) = setup_db().await;
    let mut session = db.session();

    let id = session
        .gen_sql()
        .append("INSERT INTO article (title, body, createdDate, modifiedDate, isBlind)")
        .append_with("VALUES (?, NULL, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP, ?)", params!["본문 없음", true])
        .insert()
        .await
        .unwrap();

    let article: Article = session
        .gen_sql()
        .append_with("SELECT * FROM article WHERE id = ?", [id])
        .select_row_as()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(article.body, "");
    assert!(article.is_blind);

    let body = session
        .gen_sql()
        .append_with("SELECT body FROM article WHERE id = ?", [id])
        .select_string()
        .await
        .unwrap();
    assert_eq!(body, None);
}

#[tokio::test]
async fn test_select_long_and_longs() {
    let (db, _dir) = setup_db().await;
    let mut session = db.session();

    assert_eq!(count_articles(&mut session).await, 6);

    let id = session
        .gen_sql()
        .append("SELECT id FROM article WHERE id = 3")
        .select_long()
        .await
        .unwrap();
    assert_eq!(id, Some(3));

    let none = session
        .gen_sql()
        .append("SELECT id FROM article WHERE id = 999")
        .select_long()
        .await
        .unwrap();
    assert_eq!(none, None);

    let ids = session
        .gen_sql()
        .append("SELECT id FROM article")
        .append_in("WHERE id IN (?)", [1, 2, 3])
        .append("ORDER BY id DESC")
        .select_longs()
        .await
        .unwrap();
    assert_eq!(ids, vec![3, 2, 1]);

    let empty = session
        .gen_sql()
        .append("SELECT id FROM article WHERE id < 0")
        .select_longs()
        .await
        .unwrap();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn test_select_string_boolean_datetime() {
    let (db, _dir) = setup_db().await;
    let mut session = db.session();

    let title = session
        .gen_sql()
        .append("SELECT title FROM article WHERE id = 1")
        .select_string()
        .await
        .unwrap();
    assert_eq!(title.as_deref(), Some("제목1"));

    let blind = session
        .gen_sql()
        .append("SELECT isBlind FROM article WHERE id = 1")
        .select_boolean()
        .await
        .unwrap();
    assert_eq!(blind, Some(false));

    let truth = session
        .gen_sql()
        .append("SELECT 1 = 1")
        .select_boolean()
        .await
        .unwrap();
    assert_eq!(truth, Some(true));

    let now = session
        .gen_sql()
        .append("SELECT datetime('now')")
        .select_datetime()
        .await
        .unwrap()
        .unwrap();
    let drift = (Utc::now().naive_utc() - now).num_seconds().abs();
    assert!(drift < 60, "database clock differs by {}s", drift);
}

#[tokio::test]
async fn test_select_column_by_name() {
    let (db, _dir) = setup_db().await;
    let mut session = db.session();

    let created: Option<NaiveDateTime> = session
        .gen_sql()
        .append("SELECT id, createdDate FROM article WHERE id = 1")
        .select_column("createdDate")
        .await
        .unwrap();
    assert!(created.is_some());

    let err = session
        .gen_sql()
        .append("SELECT id FROM article WHERE id = 1")
        .select_column::<String>("title")
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Mapping { .. }));
}

#[tokio::test]
async fn test_incompatible_value_is_mapping_error() {
    let (db, _dir) = setup_db().await;
    let mut session = db.session();

    let err = session
        .gen_sql()
        .append("SELECT title FROM article WHERE id = 1")
        .select_long()
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Mapping { .. }));
}

#[tokio::test]
async fn test_invalid_append_in_fails_before_execution() {
    let (db, _dir) = setup_db().await;
    let mut session = db.session();

    let err = session
        .gen_sql()
        .append("DELETE FROM article")
        .append_in("WHERE id IN (1, 2)", [1])
        .delete()
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidInput { .. }));

    // nothing ran and no connection was needed
    assert_eq!(session.connection_serial(), None);
    assert_eq!(count_articles(&mut session).await, 6);
}

#[tokio::test]
async fn test_placeholder_count_mismatch_is_execution_error() {
    let (db, _dir) = setup_db().await;
    let mut session = db.session();
    session.begin_transaction().await.unwrap();
    session
        .run_with("UPDATE article SET title = ? WHERE id = ?", &params!["거래 중", 1])
        .await
        .unwrap();

    let too_few = session
        .gen_sql()
        .append_with("SELECT * FROM article WHERE id = ? AND title = ?", [1])
        .select_rows()
        .await
        .unwrap_err();
    assert!(matches!(too_few, DbError::Execution { .. }));

    let too_many = session
        .gen_sql()
        .append_with("SELECT * FROM article WHERE id = ?", params![1, 2])
        .select_rows()
        .await
        .unwrap_err();
    assert!(matches!(too_many, DbError::Execution { .. }));

    let raw = session
        .run_with("DELETE FROM article WHERE id = ?", &[])
        .await
        .unwrap_err();
    assert!(matches!(raw, DbError::Execution { .. }));

    // the transaction and its earlier write are untouched
    assert!(session.in_transaction());
    assert_eq!(count_articles(&mut session).await, 6);
    let title = session
        .gen_sql()
        .append("SELECT title FROM article WHERE id = 1")
        .select_string()
        .await
        .unwrap();
    assert_eq!(title.as_deref(), Some("거래 중"));
    session.rollback().await.unwrap();
}

#[tokio::test]
async fn test_close_and_reopen() {
    let (db, _dir) = setup_db().await;
    let mut session = db.session();

    assert_eq!(count_articles(&mut session).await, 6);
    let first = session.connection_serial().unwrap();
    assert_eq!(db.live_connections(), 1);

    session.close().await.unwrap();
    session.close().await.unwrap();
    assert_eq!(db.live_connections(), 0);

    assert_eq!(count_articles(&mut session).await, 6);
    let second = session.connection_serial().unwrap();
    assert_ne!(first, second);

    drop(session);
    assert_eq!(db.live_connections(), 0);
}

// =============================================================================
// Dev-mode logging
// =============================================================================

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[tokio::test]
async fn test_dev_mode_logs_statements_and_params() {
    let (db, _dir) = setup_db().await;
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();
    // current-thread runtime: every poll happens on this thread
    let _guard = tracing::subscriber::set_default(subscriber);

    let mut session = db.session();
    session
        .gen_sql()
        .append("SELECT COUNT(*) FROM article")
        .select_long()
        .await
        .unwrap();
    assert!(!logs.contents().contains("SELECT COUNT(*)"));

    db.set_dev_mode(true);
    session.begin_transaction().await.unwrap();
    session
        .gen_sql()
        .append("UPDATE article")
        .append_with("SET title = ?", ["로그 제목"])
        .append_in("WHERE id IN (?)", [1, 2])
        .update()
        .await
        .unwrap();
    session.rollback().await.unwrap();
    session.close().await.unwrap();

    let output = logs.contents();
    assert!(output.contains("simple_db::sql"));
    assert!(output.contains("UPDATE article SET title = ? WHERE id IN (?,?)"));
    assert!(output.contains("['로그 제목', 1, 2]"));
    assert!(output.contains("Transaction started"));
    assert!(output.contains("Transaction rolled back"));
    assert!(output.contains("Connection closed"));
}
