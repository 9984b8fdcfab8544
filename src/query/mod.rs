//! Translation of a request's query string into a typed [`QuerySpec`].
//!
//! Building a query never touches the store: the output is a descriptor that
//! the Postgres compiler (`store::postgres::sql`) or the in-memory evaluator
//! executes. Every field named by the client must be on the entity's
//! allow-list.

mod fields;

pub use fields::{lookup, Field, FieldKind, FilterValue};

use std::cmp::Ordering;

use thiserror::Error;

use crate::error::AppError;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 100;
/// Largest `limit` a client may request.
pub const MAX_LIMIT: u32 = 1000;

const RESERVED: [&str; 4] = ["page", "sort", "limit", "fields"];

#[derive(Debug, Error, PartialEq)]
pub enum QueryError {
    #[error("Unknown field '{0}'")]
    UnknownField(String),

    #[error("Field '{0}' cannot be used to filter or sort")]
    NotComparable(String),

    #[error("Unsupported operator '{0}'")]
    UnsupportedOperator(String),

    #[error("Invalid value '{value}' for field '{field}'")]
    InvalidValue { field: String, value: String },

    #[error("'{0}' must be a positive integer")]
    InvalidPaging(&'static str),

    #[error("'limit' cannot exceed {0}")]
    LimitTooLarge(u32),

    #[error("Field selection cannot mix included and excluded fields")]
    MixedProjection,
}

impl From<QueryError> for AppError {
    fn from(e: QueryError) -> Self {
        AppError::Validation(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    fn from_suffix(op: &str) -> Option<Self> {
        match op {
            "gt" => Some(CompareOp::Gt),
            "gte" => Some(CompareOp::Gte),
            "lt" => Some(CompareOp::Lt),
            "lte" => Some(CompareOp::Lte),
            _ => None,
        }
    }

    /// Whether `actual.cmp(expected) == ord` satisfies the operator.
    pub fn holds(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Gte => ord != Ordering::Less,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Lte => ord != Ordering::Greater,
        }
    }

    pub fn to_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: &'static Field,
    pub op: CompareOp,
    pub value: FilterValue,
}

impl Predicate {
    pub fn eq(field: &'static Field, value: FilterValue) -> Self {
        Self {
            field,
            op: CompareOp::Eq,
            value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SortKey {
    pub field: &'static Field,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Projection {
    #[default]
    All,
    Include(Vec<&'static Field>),
    Exclude(Vec<&'static Field>),
}

impl Projection {
    /// Restrict a serialized document to the selected fields. `id` is always kept.
    pub fn apply(&self, mut doc: serde_json::Value) -> serde_json::Value {
        if let Some(map) = doc.as_object_mut() {
            match self {
                Projection::All => {}
                Projection::Include(keep) => {
                    map.retain(|k, _| k == "id" || keep.iter().any(|f| f.name == k));
                }
                Projection::Exclude(drop) => {
                    map.retain(|k, _| k == "id" || !drop.iter().any(|f| f.name == k));
                }
            }
        }
        doc
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Page {
    pub fn skip(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    pub fn take(&self) -> u64 {
        u64::from(self.limit)
    }
}

/// Pre-validated filter, sort, projection and pagination for a list request.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub filters: Vec<Predicate>,
    pub sort: Vec<SortKey>,
    pub projection: Projection,
    pub page: Page,
}

impl QuerySpec {
    /// Build a query from raw query-string pairs against `fields`.
    ///
    /// `base` predicates (e.g. scoping reviews to a tour) come first.
    pub fn build(
        params: &[(String, String)],
        fields: &'static [Field],
        base: Vec<Predicate>,
    ) -> Result<Self, QueryError> {
        let mut spec = QuerySpec {
            filters: base,
            sort: Vec::new(),
            projection: Projection::All,
            page: Page::default(),
        };

        for (key, raw) in params {
            match key.as_str() {
                "page" => spec.page.page = positive(raw, "page")?,
                "limit" => spec.page.limit = limit(raw)?,
                "sort" => spec.sort = parse_sort(raw, fields)?,
                "fields" => spec.projection = parse_projection(raw, fields)?,
                _ => spec.filters.push(parse_filter(key, raw, fields)?),
            }
        }

        if spec.sort.is_empty() {
            spec.sort = default_sort(fields);
        }

        Ok(spec)
    }

    /// Every match of `base`, newest first, without paging or client input.
    pub fn scoped(fields: &'static [Field], base: Vec<Predicate>) -> Self {
        QuerySpec {
            filters: base,
            sort: default_sort(fields),
            projection: Projection::All,
            page: Page {
                page: 1,
                limit: u32::MAX,
            },
        }
    }
}

fn default_sort(fields: &'static [Field]) -> Vec<SortKey> {
    lookup(fields, "createdAt")
        .map(|field| SortKey {
            field,
            direction: SortDirection::Desc,
        })
        .into_iter()
        .collect()
}

fn positive(raw: &str, name: &'static str) -> Result<u32, QueryError> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or(QueryError::InvalidPaging(name))
}

fn limit(raw: &str) -> Result<u32, QueryError> {
    let n = positive(raw, "limit")?;
    if n > MAX_LIMIT {
        return Err(QueryError::LimitTooLarge(MAX_LIMIT));
    }
    Ok(n)
}

/// `price[gte]` -> (`price`, Some(`gte`)); `price` -> (`price`, None).
fn split_key(key: &str) -> (&str, Option<&str>) {
    match key.split_once('[') {
        Some((name, rest)) => match rest.strip_suffix(']') {
            Some(op) => (name, Some(op)),
            None => (key, None),
        },
        None => (key, None),
    }
}

fn comparable(fields: &'static [Field], name: &str) -> Result<&'static Field, QueryError> {
    let field = lookup(fields, name).ok_or_else(|| QueryError::UnknownField(name.to_string()))?;
    if !field.is_comparable() {
        return Err(QueryError::NotComparable(name.to_string()));
    }
    Ok(field)
}

fn parse_filter(key: &str, raw: &str, fields: &'static [Field]) -> Result<Predicate, QueryError> {
    debug_assert!(!RESERVED.contains(&key));
    let (name, op) = split_key(key);
    let field = comparable(fields, name)?;
    let op = match op {
        None => CompareOp::Eq,
        Some(suffix) => CompareOp::from_suffix(suffix)
            .ok_or_else(|| QueryError::UnsupportedOperator(suffix.to_string()))?,
    };
    let value = field
        .parse_value(raw)
        .ok_or_else(|| QueryError::InvalidValue {
            field: name.to_string(),
            value: raw.to_string(),
        })?;
    Ok(Predicate { field, op, value })
}

fn parse_sort(raw: &str, fields: &'static [Field]) -> Result<Vec<SortKey>, QueryError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|part| {
            let (name, direction) = match part.strip_prefix('-') {
                Some(name) => (name, SortDirection::Desc),
                None => (part, SortDirection::Asc),
            };
            Ok(SortKey {
                field: comparable(fields, name)?,
                direction,
            })
        })
        .collect()
}

fn parse_projection(raw: &str, fields: &'static [Field]) -> Result<Projection, QueryError> {
    let mut include = Vec::new();
    let mut exclude = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (name, excluded) = match part.strip_prefix('-') {
            Some(name) => (name, true),
            None => (part, false),
        };
        let field =
            lookup(fields, name).ok_or_else(|| QueryError::UnknownField(name.to_string()))?;
        if excluded {
            exclude.push(field);
        } else {
            include.push(field);
        }
    }
    match (include.is_empty(), exclude.is_empty()) {
        (true, true) => Ok(Projection::All),
        (false, true) => Ok(Projection::Include(include)),
        (true, false) => Ok(Projection::Exclude(exclude)),
        (false, false) => Err(QueryError::MixedProjection),
    }
}
