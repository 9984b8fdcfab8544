use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

/// The storage type of a queryable field. It decides how raw query-string
/// values are parsed and how they are bound by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Integer,
    Bool,
    Timestamp,
    Uuid,
    /// Text restricted to a fixed set of values (stored as an enum type).
    Choice(&'static [&'static str]),
    /// Arrays: selectable, but neither filterable nor sortable.
    List,
}

/// One entry of an entity's field allow-list.
#[derive(Debug, PartialEq, Eq)]
pub struct Field {
    /// Name as seen by API clients (camelCase).
    pub name: &'static str,
    /// Column name in the relational store.
    pub column: &'static str,
    pub kind: FieldKind,
}

impl Field {
    pub const fn new(name: &'static str, column: &'static str, kind: FieldKind) -> Self {
        Self { name, column, kind }
    }

    pub fn is_comparable(&self) -> bool {
        !matches!(self.kind, FieldKind::List)
    }

    /// Parse a raw query-string value according to the field's kind.
    pub fn parse_value(&self, raw: &str) -> Option<FilterValue> {
        let raw = raw.trim();
        match self.kind {
            FieldKind::Text => Some(FilterValue::Text(raw.to_string())),
            FieldKind::Number => raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(FilterValue::Number),
            FieldKind::Integer => raw.parse::<i64>().ok().map(FilterValue::Integer),
            FieldKind::Bool => match raw {
                "true" => Some(FilterValue::Bool(true)),
                "false" => Some(FilterValue::Bool(false)),
                _ => None,
            },
            FieldKind::Timestamp => OffsetDateTime::parse(raw, &Rfc3339)
                .ok()
                .map(FilterValue::Timestamp),
            FieldKind::Uuid => Uuid::parse_str(raw).ok().map(FilterValue::Uuid),
            FieldKind::Choice(allowed) => allowed
                .contains(&raw)
                .then(|| FilterValue::Text(raw.to_string())),
            FieldKind::List => None,
        }
    }
}

/// A typed comparison operand.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Number(f64),
    Integer(i64),
    Bool(bool),
    Timestamp(OffsetDateTime),
    Uuid(Uuid),
}

/// Look up a field by its API name.
pub fn lookup(fields: &'static [Field], name: &str) -> Option<&'static Field> {
    fields.iter().find(|f| f.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIFFICULTY: Field = Field::new(
        "difficulty",
        "difficulty",
        FieldKind::Choice(&["easy", "medium", "difficult"]),
    );

    #[test]
    fn parses_values_by_kind() {
        let price = Field::new("price", "price", FieldKind::Number);
        assert_eq!(price.parse_value("99.5"), Some(FilterValue::Number(99.5)));
        assert_eq!(price.parse_value("cheap"), None);
        assert_eq!(price.parse_value("NaN"), None);

        let secret = Field::new("secretTour", "secret_tour", FieldKind::Bool);
        assert_eq!(secret.parse_value("true"), Some(FilterValue::Bool(true)));
        assert_eq!(secret.parse_value("1"), None);
    }

    #[test]
    fn choices_reject_unknown_values() {
        assert_eq!(
            DIFFICULTY.parse_value("easy"),
            Some(FilterValue::Text("easy".into()))
        );
        assert_eq!(DIFFICULTY.parse_value("'; DROP TABLE tours; --"), None);
    }

    #[test]
    fn lists_are_not_comparable() {
        let images = Field::new("images", "images", FieldKind::List);
        assert!(!images.is_comparable());
        assert_eq!(images.parse_value("a.jpg"), None);
    }
}
