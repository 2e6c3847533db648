//! Statement building.
//!
//! [`Statement`] accumulates SQL text and positional parameters without
//! touching the database. [`Sql`] pairs a statement with the [`Session`]
//! that will run it and offers the terminal operations; every terminal
//! consumes the builder, so a statement runs at most once.

use crate::db::session::Session;
use crate::error::{DbError, DbResult};
use crate::models::{FromValue, Record, Row, Value};
use chrono::NaiveDateTime;
use tracing::warn;

/// SQL text plus the values bound to its `?` placeholders, in order.
///
/// Misuse of [`append_in`](Self::append_in) is recorded rather than raised
/// so the builder chain stays fluent; it surfaces as
/// [`DbError::InvalidInput`] when the statement is taken for execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<Value>,
    invalid: Option<String>,
}

impl Statement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw text, separated from earlier text by one space.
    pub fn append(&mut self, fragment: &str) -> &mut Self {
        self.push_text(fragment);
        self
    }

    /// Append text and the values for the placeholders it contains.
    pub fn append_with<I, V>(&mut self, fragment: &str, params: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_text(fragment);
        self.params.extend(params.into_iter().map(Into::into));
        self
    }

    /// Append a membership fragment, expanding its single `?` to one
    /// placeholder per value.
    ///
    /// `"WHERE id IN (?)"` with three values becomes `"WHERE id IN (?,?,?)"`.
    /// The fragment must hold exactly one `?` outside quoted text, and at
    /// least one value must be given.
    pub fn append_in<I, V>(&mut self, fragment: &str, params: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let params: Vec<Value> = params.into_iter().map(Into::into).collect();
        let positions = placeholder_positions(fragment);

        if positions.len() != 1 {
            self.reject(format!(
                "append_in expects exactly one '?' placeholder, found {} in \"{}\"",
                positions.len(),
                fragment
            ));
            return self;
        }
        if params.is_empty() {
            self.reject(format!(
                "append_in requires at least one value for \"{}\"",
                fragment
            ));
            return self;
        }

        let at = positions[0];
        let expanded = vec!["?"; params.len()].join(",");
        let text = format!("{}{}{}", &fragment[..at], expanded, &fragment[at + 1..]);
        self.push_text(&text);
        self.params.extend(params);
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// Number of `?` placeholders outside quoted text.
    pub fn placeholder_count(&self) -> usize {
        placeholder_positions(&self.sql).len()
    }

    /// Take the text and parameters for execution.
    pub fn into_parts(self) -> DbResult<(String, Vec<Value>)> {
        if let Some(message) = self.invalid {
            return Err(DbError::invalid_input(message));
        }
        if self.sql.trim().is_empty() {
            return Err(DbError::invalid_input("statement is empty"));
        }
        Ok((self.sql, self.params))
    }

    fn push_text(&mut self, fragment: &str) {
        if !self.sql.is_empty() {
            self.sql.push(' ');
        }
        self.sql.push_str(fragment);
    }

    fn reject(&mut self, message: String) {
        // keep the first problem; later ones are usually knock-on effects
        self.invalid.get_or_insert(message);
    }
}

/// Byte offsets of `?` placeholders that sit outside '...', "..." and `...`
/// and outside `--` and `/* */` comments.
///
/// Doubled quotes and backslash escapes inside string literals are skipped.
pub(crate) fn placeholder_positions(sql: &str) -> Vec<usize> {
    let bytes = sql.as_bytes();
    let mut positions = Vec::new();
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' && q != b'`' {
                    i += 2;
                    continue;
                }
                if b == q {
                    if bytes.get(i + 1) == Some(&q) {
                        i += 2;
                        continue;
                    }
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' | b'`' => quote = Some(b),
                b'?' => positions.push(i),
                b'-' if bytes.get(i + 1) == Some(&b'-') => {
                    i = bytes[i..]
                        .iter()
                        .position(|&c| c == b'\n')
                        .map_or(bytes.len(), |end| i + end);
                    continue;
                }
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    i = bytes[i + 2..]
                        .windows(2)
                        .position(|w| w == b"*/")
                        .map_or(bytes.len(), |end| i + 2 + end + 2);
                    continue;
                }
                _ => {}
            },
        }
        i += 1;
    }
    positions
}

/// Fluent statement builder bound to a session.
///
/// ```no_run
/// # async fn demo(db: simple_db::SimpleDb) -> simple_db::DbResult<()> {
/// let mut session = db.session();
/// let titles = session
///     .gen_sql()
///     .append("SELECT title FROM article")
///     .append_in("WHERE id IN (?)", [1, 2, 3])
///     .append("ORDER BY id")
///     .select_rows()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Sql<'s> {
    session: &'s mut Session,
    statement: Statement,
}

impl<'s> Sql<'s> {
    pub(crate) fn new(session: &'s mut Session) -> Self {
        Self {
            session,
            statement: Statement::new(),
        }
    }

    /// See [`Statement::append`].
    pub fn append(mut self, fragment: &str) -> Self {
        self.statement.append(fragment);
        self
    }

    /// See [`Statement::append_with`].
    pub fn append_with<I, V>(mut self, fragment: &str, params: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.statement.append_with(fragment, params);
        self
    }

    /// See [`Statement::append_in`].
    pub fn append_in<I, V>(mut self, fragment: &str, params: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.statement.append_in(fragment, params);
        self
    }

    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    /// Run an INSERT and return the key it generated.
    ///
    /// Fails with [`DbError::Execution`] when the backend reports no key.
    pub async fn insert(self) -> DbResult<i64> {
        let outcome = self.execute().await?;
        outcome.generated_key.ok_or_else(|| {
            DbError::execution(
                "statement did not generate a key",
                None,
                "insert() needs a table with an auto-generated primary key; use update() otherwise",
            )
        })
    }

    /// Run an UPDATE and return the number of affected rows.
    pub async fn update(self) -> DbResult<u64> {
        Ok(self.execute().await?.rows_affected)
    }

    /// Run a DELETE and return the number of affected rows.
    pub async fn delete(self) -> DbResult<u64> {
        Ok(self.execute().await?.rows_affected)
    }

    /// Run a query and return every row with the result's own column labels.
    pub async fn select_rows(self) -> DbResult<Vec<Row>> {
        self.fetch().await
    }

    /// Run a query and return one row, or `None` when nothing matched.
    ///
    /// When several rows come back the last one is returned.
    pub async fn select_row(self) -> DbResult<Option<Row>> {
        let mut rows = self.fetch().await?;
        if rows.len() > 1 {
            warn!(
                rows = rows.len(),
                "Single-row select matched several rows, keeping the last"
            );
        }
        Ok(rows.pop())
    }

    /// Run a query and map every row onto `T`.
    pub async fn select_rows_as<T: Record>(self) -> DbResult<Vec<T>> {
        self.fetch()
            .await?
            .into_iter()
            .map(Row::into_record)
            .collect()
    }

    /// Run a query and map its row onto `T`, or return `None` when nothing matched.
    pub async fn select_row_as<T: Record>(self) -> DbResult<Option<T>> {
        self.select_row().await?.map(Row::into_record).transpose()
    }

    /// First column as an integer (`None` for no row or NULL).
    pub async fn select_long(self) -> DbResult<Option<i64>> {
        self.select_first().await
    }

    /// First column of every row as integers.
    pub async fn select_longs(self) -> DbResult<Vec<i64>> {
        self.fetch()
            .await?
            .into_iter()
            .filter_map(Row::into_first)
            .map(i64::from_value)
            .collect()
    }

    /// First column as text (`None` for no row or NULL).
    pub async fn select_string(self) -> DbResult<Option<String>> {
        self.select_first().await
    }

    /// First column as a boolean; integers are true when non-zero.
    pub async fn select_boolean(self) -> DbResult<Option<bool>> {
        self.select_first().await
    }

    /// First column as a datetime (`None` for no row or NULL).
    pub async fn select_datetime(self) -> DbResult<Option<NaiveDateTime>> {
        self.select_first().await
    }

    /// Named column of the selected row converted to `T`.
    ///
    /// `None` when no row matched or the value is NULL; a missing column is
    /// a [`DbError::Mapping`] error.
    pub async fn select_column<T: FromValue>(self, column: &str) -> DbResult<Option<T>> {
        let Some(row) = self.select_row().await? else {
            return Ok(None);
        };
        if row.get(column).is_none() {
            return Err(DbError::mapping(format!(
                "column '{}' not in result (columns: {})",
                column,
                row.columns().collect::<Vec<_>>().join(", ")
            )));
        }
        row.get_as(column)
    }

    async fn select_first<T: FromValue>(self) -> DbResult<Option<T>> {
        match self.select_row().await?.and_then(Row::into_first) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::from_value(value).map(Some),
        }
    }

    async fn execute(self) -> DbResult<crate::db::executor::WriteOutcome> {
        let (sql, params) = self.statement.into_parts()?;
        self.session.execute(&sql, &params).await
    }

    async fn fetch(self) -> DbResult<Vec<Row>> {
        let (sql, params) = self.statement.into_parts()?;
        self.session.fetch(&sql, &params).await
    }
}
