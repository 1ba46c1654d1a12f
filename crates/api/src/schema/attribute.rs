//! Attribute metadata and the scalar values that flow between records,
//! request payloads and SQL parameters.

use rusqlite::types::{Null, ToSql, ToSqlOutput};
use serde_json::Value;

/// Storage/value kind of a single attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    /// UTF-8 text.
    Text,
    /// Signed 64-bit integer.
    Integer,
}

impl AttrKind {
    /// Name used in type-mismatch messages.
    pub const fn name(self) -> &'static str {
        match self {
            AttrKind::Text => "string",
            AttrKind::Integer => "integer",
        }
    }

    /// Column type used in the bootstrap DDL.
    pub const fn sql_type(self) -> &'static str {
        match self {
            AttrKind::Text => "TEXT",
            AttrKind::Integer => "INTEGER",
        }
    }
}

/// A single scalar attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Null,
    Integer(i64),
    Text(String),
}

impl AttrValue {
    /// Convert a JSON payload value into an attribute of `kind`.
    ///
    /// Returns `None` when no conversion rule exists. Integers accept only
    /// JSON numbers that fit in `i64`; text accepts only JSON strings.
    pub fn from_json(kind: AttrKind, value: &Value) -> Option<Self> {
        match (kind, value) {
            (AttrKind::Text, Value::String(s)) => Some(AttrValue::Text(s.clone())),
            (AttrKind::Integer, Value::Number(n)) => n.as_i64().map(AttrValue::Integer),
            _ => None,
        }
    }
}

impl ToSql for AttrValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            AttrValue::Null => ToSqlOutput::from(Null),
            AttrValue::Integer(i) => ToSqlOutput::from(*i),
            AttrValue::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

/// Metadata for one attribute of record type `R`.
///
/// `get` and `set` are plain function pointers so a schema can live in a
/// `static` and be shared by every component without runtime inspection.
pub struct Attribute<R> {
    /// Key used in JSON payloads and query parameters.
    pub key: &'static str,
    /// Storage column name.
    pub column: &'static str,
    pub kind: AttrKind,
    /// Store-assigned identity. Never written from a payload.
    pub identity: bool,
    /// Excluded from INSERT column lists.
    pub skip_on_create: bool,
    /// May appear in list filters and `sortby` clauses.
    pub filterable: bool,
    pub get: fn(&R) -> AttrValue,
    /// Setters ignore values of the wrong kind.
    pub set: fn(&mut R, AttrValue),
}

impl<R> std::fmt::Debug for Attribute<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attribute")
            .field("key", &self.key)
            .field("column", &self.column)
            .field("kind", &self.kind)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

/// Ordered attribute table for one record type.
///
/// # Invariants
///
/// Checked when the schema is constructed (at compile time for `static`
/// schemas):
/// - the first attribute is the identity and is skipped on create;
/// - no other attribute is an identity;
/// - payload keys are unique.
#[derive(Debug)]
pub struct AttributeSchema<R: 'static> {
    /// Singular entity name used in messages (e.g. `"teacher"`).
    pub entity: &'static str,
    /// Storage table name.
    pub table: &'static str,
    pub attributes: &'static [Attribute<R>],
}

impl<R: 'static> AttributeSchema<R> {
    /// Build a schema, panicking (at compile time in `static` context) if the
    /// attribute table violates the schema invariants.
    pub const fn new(
        entity: &'static str,
        table: &'static str,
        attributes: &'static [Attribute<R>],
    ) -> Self {
        assert!(!attributes.is_empty(), "schema has no attributes");
        assert!(attributes[0].identity, "first attribute must be the identity");
        assert!(attributes[0].skip_on_create, "identity must be skipped on create");

        let mut i = 1;
        while i < attributes.len() {
            assert!(!attributes[i].identity, "schema has more than one identity");
            i += 1;
        }

        let mut i = 0;
        while i < attributes.len() {
            let mut j = i + 1;
            while j < attributes.len() {
                assert!(
                    !str_eq(attributes[i].key, attributes[j].key),
                    "duplicate payload key in schema"
                );
                j += 1;
            }
            i += 1;
        }

        Self {
            entity,
            table,
            attributes,
        }
    }

    /// The identity attribute.
    pub fn identity(&self) -> &'static Attribute<R> {
        &self.attributes[0]
    }

    /// Look up an attribute by payload key.
    pub fn find(&self, key: &str) -> Option<&'static Attribute<R>> {
        self.attributes.iter().find(|a| a.key == key)
    }

    /// Look up a filterable attribute by payload key.
    pub fn filterable(&self, key: &str) -> Option<&'static Attribute<R>> {
        self.find(key).filter(|a| a.filterable)
    }

    /// Attributes that appear in INSERT statements, in schema order.
    pub fn insertable(&self) -> impl Iterator<Item = &'static Attribute<R>> {
        self.attributes
            .iter()
            .filter(|a| !a.identity && !a.skip_on_create)
    }

    /// Attributes written by a full-record UPDATE, in schema order.
    pub fn updatable(&self) -> impl Iterator<Item = &'static Attribute<R>> {
        self.attributes.iter().filter(|a| !a.identity)
    }
}

const fn str_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}
