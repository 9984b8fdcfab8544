//! Compiles a [`QuerySpec`] into a parameterized `SELECT`.
//!
//! Column names come only from the static field allow-lists and values are
//! always bound, never interpolated.

use std::fmt::Write;

use sqlx::{postgres::PgArguments, postgres::PgRow, FromRow, Postgres};

use crate::query::{FieldKind, FilterValue, QuerySpec};

#[derive(Debug, Clone, PartialEq)]
pub struct Compiled<'a> {
    pub sql: String,
    pub params: Vec<&'a FilterValue>,
}

/// `SELECT * FROM {source}` narrowed by `standing` (a fixed condition such
/// as `"active" = TRUE`) and by the query's predicates, ordered and paged.
pub fn select<'a>(source: &str, standing: Option<&str>, spec: &'a QuerySpec) -> Compiled<'a> {
    let mut sql = format!("SELECT * FROM {source}");
    let mut params = Vec::with_capacity(spec.filters.len());
    let mut conditions: Vec<String> = standing.map(str::to_string).into_iter().collect();

    for p in &spec.filters {
        params.push(&p.value);
        conditions.push(format!(
            "{} {} ${}",
            column_expr(p.field.column, p.field.kind),
            p.op.to_sql(),
            params.len()
        ));
    }

    if !conditions.is_empty() {
        let _ = write!(sql, " WHERE {}", conditions.join(" AND "));
    }

    if !spec.sort.is_empty() {
        let keys: Vec<String> = spec
            .sort
            .iter()
            .map(|k| format!("\"{}\" {}", k.field.column, k.direction.to_sql()))
            .collect();
        let _ = write!(sql, " ORDER BY {}", keys.join(", "));
    }

    let _ = write!(
        sql,
        " LIMIT {} OFFSET {}",
        spec.page.take(),
        spec.page.skip()
    );

    Compiled { sql, params }
}

/// Enum-typed columns compare as text so the bound parameter can stay a string.
fn column_expr(column: &str, kind: FieldKind) -> String {
    match kind {
        FieldKind::Choice(_) => format!("\"{column}\"::text"),
        _ => format!("\"{column}\""),
    }
}

impl Compiled<'_> {
    pub async fn fetch_all<'e, O, E>(&self, executor: E) -> Result<Vec<O>, sqlx::Error>
    where
        O: for<'r> FromRow<'r, PgRow> + Send + Unpin,
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let mut q = sqlx::query_as::<_, O>(&self.sql);
        for v in &self.params {
            q = bind_value(q, *v);
        }
        q.fetch_all(executor).await
    }
}

fn bind_value<'q, O>(
    q: sqlx::query::QueryAs<'q, Postgres, O, PgArguments>,
    v: &'q FilterValue,
) -> sqlx::query::QueryAs<'q, Postgres, O, PgArguments>
where
    O: for<'r> FromRow<'r, PgRow>,
{
    match v {
        FilterValue::Text(s) => q.bind(s.as_str()),
        FilterValue::Number(n) => q.bind(*n),
        FilterValue::Integer(i) => q.bind(*i),
        FilterValue::Bool(b) => q.bind(*b),
        FilterValue::Timestamp(t) => q.bind(*t),
        FilterValue::Uuid(u) => q.bind(*u),
    }
}
