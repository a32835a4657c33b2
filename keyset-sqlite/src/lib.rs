//! SQLite fetcher for keyset pagination.
//!
//! Renders the bounded query handed out by [`keyset::paginate`] into a single
//! `SELECT ... WHERE ... ORDER BY ... LIMIT` statement. Every value is bound as
//! a parameter and every identifier is quoted. Coalesced columns render as
//! `COALESCE(column, ?)` in both ORDER BY and the boundary predicate so the
//! two always agree.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use keyset::{ColumnExpr, CompareOp, OrderedSource, PaginationError, PaginationResult, Predicate, Row, Value};
use r2d2_sqlite::rusqlite::types::{FromSqlError, ToSqlOutput, Type, ValueRef};
use r2d2_sqlite::rusqlite::{self, params_from_iter, Connection, ToSql};
use tracing::trace;

const DATE_FORMAT: &str = "%Y-%m-%d";
// Fixed-width fractions keep text timestamps ordered like the instants they hold.
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.9fZ";
const NAIVE_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.9f";

/// How a column stored as INTEGER or TEXT should be read back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Bool,
    Date,
    DateTime,
    NaiveDateTime,
}

/// Extra `WHERE` condition applied before the boundary predicate
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFilter {
    /// SQL fragment using `?` placeholders
    pub clause: String,
    pub params: Vec<Value>,
}

/// The table (and optional projection and filter) to page over.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    table: String,
    projection: Option<Vec<String>>,
    filter: Option<SqlFilter>,
    kinds: BTreeMap<String, ColumnKind>,
}

impl SqlQuery {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            projection: None,
            filter: None,
            kinds: BTreeMap::new(),
        }
    }

    /// Select only these columns instead of `*`.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter(mut self, clause: impl Into<String>, params: Vec<Value>) -> Self {
        self.filter = Some(SqlFilter {
            clause: clause.into(),
            params,
        });
        self
    }

    pub fn column_kind(mut self, column: impl Into<String>, kind: ColumnKind) -> Self {
        self.kinds.insert(column.into(), kind);
        self
    }
}

/// Binds a [`Value`] as a SQLite parameter.
///
/// Temporal values bind as canonical ISO-8601 text.
#[derive(Debug, Clone, Copy)]
pub struct SqlValue<'a>(pub &'a Value);

impl ToSql for SqlValue<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Owned;

        Ok(match self.0 {
            Value::Null => ToSqlOutput::Owned(Owned::Null),
            Value::Bool(b) => ToSqlOutput::Owned(Owned::Integer(i64::from(*b))),
            Value::Int(i) => ToSqlOutput::Owned(Owned::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Owned(Owned::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::Date(d) => ToSqlOutput::Owned(Owned::Text(d.format(DATE_FORMAT).to_string())),
            Value::DateTime(dt) => {
                ToSqlOutput::Owned(Owned::Text(dt.format(DATETIME_FORMAT).to_string()))
            }
            Value::NaiveDateTime(dt) => {
                ToSqlOutput::Owned(Owned::Text(dt.format(NAIVE_DATETIME_FORMAT).to_string()))
            }
        })
    }
}

/// Quote an identifier for SQLite.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Renders the bounded query to SQL plus its parameters, in placeholder order.
pub fn render(query: &OrderedSource<SqlQuery>) -> PaginationResult<(String, Vec<Value>)> {
    let source = query.source();

    if let Some(projection) = &source.projection {
        if let Some(term) = query.order().iter().find(|t| t.column.coalesce.is_some()) {
            return Err(PaginationError::UnsupportedQueryShape {
                reason: format!(
                    "custom projection ({}) cannot be combined with null coalescing on `{}`",
                    projection.join(", "),
                    term.column.column
                ),
            });
        }
    }

    let mut sql = String::from("SELECT ");
    let mut params = Vec::new();

    match &source.projection {
        Some(columns) if !columns.is_empty() => {
            let columns: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
            sql.push_str(&columns.join(", "));
        }
        _ => sql.push('*'),
    }
    sql.push_str(&format!(" FROM {}", quote_ident(&source.table)));

    let mut conditions = Vec::new();
    if let Some(filter) = &source.filter {
        conditions.push(format!("({})", filter.clause));
        params.extend(filter.params.iter().cloned());
    }
    if let Some(predicate) = query.predicate() {
        let mut clause = String::new();
        render_predicate(predicate, &mut clause, &mut params);
        conditions.push(clause);
    }
    if !conditions.is_empty() {
        sql.push_str(&format!(" WHERE {}", conditions.join(" AND ")));
    }

    let order: Vec<String> = query
        .order()
        .iter()
        .map(|term| {
            let mut expr = String::new();
            render_column(&term.column, &mut expr, &mut params);
            format!("{} {}", expr, term.direction.as_sql())
        })
        .collect();
    if !order.is_empty() {
        sql.push_str(&format!(" ORDER BY {}", order.join(", ")));
    }

    sql.push_str(&format!(" LIMIT {}", query.limit()));

    Ok((sql, params))
}

fn render_column(column: &ColumnExpr, sql: &mut String, params: &mut Vec<Value>) {
    match &column.coalesce {
        Some(value) => {
            sql.push_str(&format!("COALESCE({}, ?)", quote_ident(&column.column)));
            params.push(value.clone());
        }
        None => sql.push_str(&quote_ident(&column.column)),
    }
}

fn render_predicate(predicate: &Predicate, sql: &mut String, params: &mut Vec<Value>) {
    match predicate {
        Predicate::Compare { column, op, value } => {
            // NULL never satisfies `<` or `>`, so uncoalesced NULL rows are
            // admitted and left for the assembler to reject.
            let admit_null = column.coalesce.is_none() && *op != CompareOp::Eq;
            if admit_null {
                sql.push('(');
            }
            render_column(column, sql, params);
            sql.push_str(&format!(" {} ?", op.as_sql()));
            params.push(value.clone());
            if admit_null {
                sql.push_str(&format!(" OR {} IS NULL)", quote_ident(&column.column)));
            }
        }
        Predicate::And(lhs, rhs) => render_binary(lhs, "AND", rhs, sql, params),
        Predicate::Or(lhs, rhs) => render_binary(lhs, "OR", rhs, sql, params),
    }
}

fn render_binary(
    lhs: &Predicate,
    op: &str,
    rhs: &Predicate,
    sql: &mut String,
    params: &mut Vec<Value>,
) {
    sql.push('(');
    render_predicate(lhs, sql, params);
    sql.push_str(&format!(" {op} "));
    render_predicate(rhs, sql, params);
    sql.push(')');
}

/// Runs bounded page queries against a SQLite connection or transaction.
pub struct SqliteFetcher<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteFetcher<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Fetch function for [`keyset::paginate`].
    pub fn fetch(&self, query: OrderedSource<SqlQuery>) -> PaginationResult<Vec<Row>> {
        let (sql, params) = render(&query)?;
        trace!(%sql, params = params.len(), "fetching page");

        let kinds = &query.source().kinds;

        let mut stmt = self.conn.prepare(&sql).map_err(PaginationError::fetch)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let rows = stmt
            .query_map(params_from_iter(params.iter().map(SqlValue)), |row| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(idx, name)| -> rusqlite::Result<(String, Value)> {
                        let value = read_value(row.get_ref(idx)?, kinds.get(name).copied())
                            .map_err(|e| {
                                rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
                            })?;
                        Ok((name.clone(), value))
                    })
                    .collect::<rusqlite::Result<Row>>()
            })
            .map_err(PaginationError::fetch)?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(PaginationError::fetch)
    }
}

fn read_value(value: ValueRef<'_>, kind: Option<ColumnKind>) -> Result<Value, FromSqlError> {
    Ok(match (value, kind) {
        (ValueRef::Null, _) => Value::Null,
        (ValueRef::Integer(i), Some(ColumnKind::Bool)) => Value::Bool(i != 0),
        (ValueRef::Integer(i), _) => Value::Int(i),
        (ValueRef::Real(f), _) => Value::Float(f),
        (ValueRef::Text(_), Some(ColumnKind::Date)) => {
            let text = value.as_str()?;
            NaiveDate::parse_from_str(text, DATE_FORMAT)
                .map(Value::Date)
                .map_err(|e| FromSqlError::Other(Box::new(e)))?
        }
        (ValueRef::Text(_), Some(ColumnKind::DateTime)) => {
            let text = value.as_str()?;
            DateTime::parse_from_rfc3339(text)
                .map(|dt| Value::DateTime(dt.with_timezone(&Utc)))
                .map_err(|e| FromSqlError::Other(Box::new(e)))?
        }
        (ValueRef::Text(_), Some(ColumnKind::NaiveDateTime)) => {
            let text = value.as_str()?;
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .map(Value::NaiveDateTime)
                .map_err(|e| FromSqlError::Other(Box::new(e)))?
        }
        (ValueRef::Text(_), _) => Value::Text(value.as_str()?.to_string()),
        (ValueRef::Blob(b), _) => Value::Bytes(b.to_vec()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyset::{Boundary, FetchPlan, KeyTuple, NullCoalesceMap, PageLimit, SortInput, SortSpec};

    fn bounded(
        source: SqlQuery,
        limit: PageLimit,
        cursor: Option<(Boundary, KeyTuple)>,
        coalesce: &NullCoalesceMap,
    ) -> OrderedSource<SqlQuery> {
        let spec = SortSpec::normalize(&[SortInput::asc("first_name")], Some("id")).unwrap();
        let plan = FetchPlan::new(&spec, limit);
        let predicate =
            cursor.map(|(boundary, key)| Predicate::build(&spec, boundary, &key, coalesce).unwrap());
        OrderedSource::new(source, plan.order_terms(coalesce), predicate, plan.limit)
    }

    fn key(first_name: &str, id: i64) -> KeyTuple {
        KeyTuple::new(vec![
            ("first_name".to_string(), Value::from(first_name)),
            ("id".to_string(), Value::Int(id)),
        ])
    }

    #[test]
    fn test_render_without_cursor() {
        let query = bounded(
            SqlQuery::table("people"),
            PageLimit::First(3),
            None,
            &NullCoalesceMap::new(),
        );
        let (sql, params) = render(&query).unwrap();
        assert_eq!(
            sql,
            r#"SELECT * FROM "people" ORDER BY "first_name" ASC, "id" ASC LIMIT 4"#
        );
        assert!(params.is_empty());
    }

    #[test]
    fn test_render_backward_with_cursor_and_filter() {
        let query = bounded(
            SqlQuery::table("people").filter("\"last_name\" = ?", vec![Value::from("Doe")]),
            PageLimit::Last(2),
            Some((Boundary::Before, key("Bea", 4))),
            &NullCoalesceMap::new(),
        );
        let (sql, params) = render(&query).unwrap();
        assert_eq!(
            sql,
            concat!(
                r#"SELECT * FROM "people" WHERE ("last_name" = ?) AND "#,
                r#"(("first_name" < ? OR "first_name" IS NULL) OR "#,
                r#"("first_name" = ? AND ("id" < ? OR "id" IS NULL))) "#,
                r#"ORDER BY "first_name" DESC, "id" DESC LIMIT 3"#
            )
        );
        assert_eq!(
            params,
            vec![
                Value::from("Doe"),
                Value::from("Bea"),
                Value::from("Bea"),
                Value::Int(4),
            ]
        );
    }

    #[test]
    fn test_render_coalesces_order_and_predicate() {
        let coalesce = NullCoalesceMap::from([("first_name".to_string(), Value::from(""))]);
        let query = bounded(
            SqlQuery::table("people"),
            PageLimit::First(1),
            Some((Boundary::After, key("", 2))),
            &coalesce,
        );
        let (sql, params) = render(&query).unwrap();
        assert_eq!(
            sql,
            concat!(
                r#"SELECT * FROM "people" WHERE (COALESCE("first_name", ?) > ? OR "#,
                r#"(COALESCE("first_name", ?) = ? AND ("id" > ? OR "id" IS NULL))) "#,
                r#"ORDER BY COALESCE("first_name", ?) ASC, "id" ASC LIMIT 2"#
            )
        );
        assert_eq!(params.len(), 6);
    }

    #[test]
    fn test_projection_with_coalesce_is_unsupported() {
        let coalesce = NullCoalesceMap::from([("first_name".to_string(), Value::from(""))]);
        let query = bounded(
            SqlQuery::table("people").select(["id", "first_name"]),
            PageLimit::First(1),
            None,
            &coalesce,
        );
        let err = render(&query).unwrap_err();
        assert!(matches!(err, PaginationError::UnsupportedQueryShape { .. }));

        let query = bounded(
            SqlQuery::table("people").select(["id", "first_name"]),
            PageLimit::First(1),
            None,
            &NullCoalesceMap::new(),
        );
        let (sql, _) = render(&query).unwrap();
        assert!(sql.starts_with(r#"SELECT "id", "first_name" FROM "people""#));
    }

    #[test]
    fn test_identifiers_are_quoted() {
        assert_eq!(quote_ident("id"), r#""id""#);
        assert_eq!(quote_ident(r#"we"ird"#), r#""we""ird""#);
    }

    #[test]
    fn test_temporal_values_round_trip_through_text() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE events (id INTEGER PRIMARY KEY, at TEXT NOT NULL, day TEXT NOT NULL, done INTEGER NOT NULL)")
            .unwrap();

        let at = DateTime::parse_from_rfc3339("2022-05-06T07:08:09.123456789Z")
            .unwrap()
            .with_timezone(&Utc);
        let day = NaiveDate::from_ymd_opt(2022, 5, 6).unwrap();
        let values = [Value::Int(1), Value::DateTime(at), Value::Date(day), Value::Bool(true)];
        conn.execute(
            "INSERT INTO events (id, at, day, done) VALUES (?, ?, ?, ?)",
            params_from_iter(values.iter().map(SqlValue)),
        )
        .unwrap();

        let source = SqlQuery::table("events")
            .column_kind("at", ColumnKind::DateTime)
            .column_kind("day", ColumnKind::Date)
            .column_kind("done", ColumnKind::Bool);
        let query = OrderedSource::new(source, Vec::new(), None, 10);
        let rows = SqliteFetcher::new(&conn).fetch(query).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["at"], Value::DateTime(at));
        assert_eq!(rows[0]["day"], Value::Date(day));
        assert_eq!(rows[0]["done"], Value::Bool(true));
    }
}
