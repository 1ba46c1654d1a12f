//! Parameterized SQL construction driven by [`AttributeSchema`] metadata.
//!
//! Values never enter SQL text. Filters contribute a `column = ?` clause and
//! push the value onto [`Statement::args`]; only column names taken from the
//! schema and the fixed `ASC`/`DESC` keywords are ever spliced into the text.

use std::fmt::Write as _;

use url::form_urlencoded;

use crate::schema::{AttrValue, AttributeSchema};

/// Query-string key carrying `field:direction` sort pairs.
pub const SORT_PARAM: &str = "sortby";

/// A SQL statement with its positional arguments, in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<AttrValue>,
}

/// Sort direction accepted in `sortby` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// Parse the exact lowercase words `asc` / `desc`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }

    fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Recognized filter and sort parameters for a list request.
///
/// Built only from whitelisted (filterable) schema keys, so every column
/// stored here is a schema-declared column name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    filters: Vec<(&'static str, String)>,
    sorts: Vec<(&'static str, SortDirection)>,
}

impl ListQuery {
    /// Recognize filters and sorts from raw `(key, value)` parameters.
    ///
    /// - A filterable key with a non-empty value becomes an equality filter;
    ///   only its first occurrence counts.
    /// - Every `sortby=field:direction` pair is kept in client order if the
    ///   field is filterable and the direction is `asc` or `desc`.
    /// - Everything else is ignored.
    pub fn from_pairs<R: 'static, I, K, V>(schema: &AttributeSchema<R>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut query = ListQuery::default();

        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());

            if key == SORT_PARAM {
                if let Some(sort) = parse_sort(schema, value) {
                    query.sorts.push(sort);
                }
                continue;
            }

            if value.is_empty() {
                continue;
            }
            if let Some(attr) = schema.filterable(key) {
                if !query.filters.iter().any(|(col, _)| *col == attr.column) {
                    query.filters.push((attr.column, value.to_owned()));
                }
            }
        }

        query
    }

    /// Recognize filters and sorts from a raw, percent-encoded query string.
    pub fn from_query_string<R: 'static>(schema: &AttributeSchema<R>, raw: &str) -> Self {
        Self::from_pairs(schema, form_urlencoded::parse(raw.as_bytes()))
    }

    #[cfg(test)]
    pub fn filters(&self) -> &[(&'static str, String)] {
        &self.filters
    }

    #[cfg(test)]
    pub fn sorts(&self) -> &[(&'static str, SortDirection)] {
        &self.sorts
    }
}

fn parse_sort<R: 'static>(
    schema: &AttributeSchema<R>,
    param: &str,
) -> Option<(&'static str, SortDirection)> {
    let parts: Vec<&str> = param.split(':').collect();
    let [field, direction] = parts.as_slice() else {
        return None;
    };
    let attr = schema.filterable(field)?;
    let direction = SortDirection::parse(direction)?;
    Some((attr.column, direction))
}

/// Builder that extends a base read query with filters and ordering.
///
/// The base query must already contain a `WHERE` clause (e.g. `WHERE 1=1`)
/// so that filters can be appended with `AND`.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    base: String,
    filters: Vec<(&'static str, AttrValue)>,
    sorts: Vec<(&'static str, SortDirection)>,
}

impl QueryBuilder {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            filters: Vec::new(),
            sorts: Vec::new(),
        }
    }

    /// Add an equality filter on a schema column.
    pub fn filter(mut self, column: &'static str, value: AttrValue) -> Self {
        self.filters.push((column, value));
        self
    }

    /// Add an ordering term on a schema column.
    pub fn sort(mut self, column: &'static str, direction: SortDirection) -> Self {
        self.sorts.push((column, direction));
        self
    }

    /// Add every filter and sort recognized in `query`.
    pub fn apply(mut self, query: &ListQuery) -> Self {
        for &(column, ref value) in &query.filters {
            self = self.filter(column, AttrValue::Text(value.clone()));
        }
        for &(column, direction) in &query.sorts {
            self = self.sort(column, direction);
        }
        self
    }

    pub fn build(self) -> Statement {
        let mut sql = self.base;
        let mut args = Vec::with_capacity(self.filters.len());

        for (column, value) in self.filters {
            let _ = write!(sql, " AND {column} = ?");
            args.push(value);
        }

        for (i, (column, direction)) in self.sorts.iter().enumerate() {
            sql.push_str(if i == 0 { " ORDER BY " } else { ", " });
            let _ = write!(sql, "{column} {}", direction.as_sql());
        }

        Statement { sql, args }
    }
}

fn column_list<'a>(columns: impl Iterator<Item = &'a str>) -> String {
    columns.collect::<Vec<_>>().join(", ")
}

fn all_columns<R: 'static>(schema: &AttributeSchema<R>) -> String {
    column_list(schema.attributes.iter().map(|a| a.column))
}

/// `SELECT <every column> FROM <table> WHERE 1=1`, ready for [`QueryBuilder`].
pub fn select_all<R: 'static>(schema: &AttributeSchema<R>) -> String {
    format!("SELECT {} FROM {} WHERE 1=1", all_columns(schema), schema.table)
}

/// Point lookup by identity; one `?` parameter.
pub fn select_by_id<R: 'static>(schema: &AttributeSchema<R>) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} = ?",
        all_columns(schema),
        schema.table,
        schema.identity().column
    )
}

/// `INSERT` over the insertable columns in schema order.
pub fn insert<R: 'static>(schema: &AttributeSchema<R>) -> String {
    let columns: Vec<&str> = schema.insertable().map(|a| a.column).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        schema.table,
        columns.join(", "),
        placeholders
    )
}

/// Full-record `UPDATE` of every non-identity column, keyed by identity.
pub fn update_by_id<R: 'static>(schema: &AttributeSchema<R>) -> String {
    let assignments: Vec<String> = schema
        .updatable()
        .map(|a| format!("{} = ?", a.column))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE {} = ?",
        schema.table,
        assignments.join(", "),
        schema.identity().column
    )
}

pub fn delete_by_id<R: 'static>(schema: &AttributeSchema<R>) -> String {
    format!(
        "DELETE FROM {} WHERE {} = ?",
        schema.table,
        schema.identity().column
    )
}

/// Bootstrap DDL for a fresh database. Existing tables are left untouched.
pub fn create_table<R: 'static>(schema: &AttributeSchema<R>) -> String {
    let mut columns = Vec::with_capacity(schema.attributes.len());
    for attr in schema.attributes {
        if attr.identity {
            columns.push(format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", attr.column));
        } else {
            let default = match attr.kind {
                crate::schema::AttrKind::Text => "''",
                crate::schema::AttrKind::Integer => "0",
            };
            columns.push(format!(
                "{} {} NOT NULL DEFAULT {}",
                attr.column,
                attr.kind.sql_type(),
                default
            ));
        }
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        schema.table,
        columns.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::teacher::TEACHER_SCHEMA;

    fn list(pairs: &[(&str, &str)]) -> ListQuery {
        ListQuery::from_pairs(&TEACHER_SCHEMA, pairs.iter().copied())
    }

    fn build(pairs: &[(&str, &str)]) -> Statement {
        QueryBuilder::new(select_all(&TEACHER_SCHEMA))
            .apply(&list(pairs))
            .build()
    }

    #[test]
    fn base_query_selects_every_column() {
        assert_eq!(
            select_all(&TEACHER_SCHEMA),
            "SELECT id, first_name, last_name, email, class, subject FROM teachers WHERE 1=1"
        );
    }

    #[test]
    fn filters_become_placeholders() {
        let stmt = build(&[("first_name", "Robert'); DROP TABLE teachers;--"), ("class", "9A")]);
        assert_eq!(
            stmt.sql,
            "SELECT id, first_name, last_name, email, class, subject FROM teachers WHERE 1=1 \
             AND first_name = ? AND class = ?"
        );
        assert_eq!(
            stmt.args,
            vec![
                AttrValue::Text("Robert'); DROP TABLE teachers;--".into()),
                AttrValue::Text("9A".into())
            ]
        );
        assert!(!stmt.sql.contains("Robert"));
    }

    #[test]
    fn unknown_and_empty_filters_are_ignored() {
        let stmt = build(&[("id", "1"), ("password", "x"), ("email", "")]);
        assert_eq!(stmt.sql, select_all(&TEACHER_SCHEMA));
        assert!(stmt.args.is_empty());
    }

    #[test]
    fn first_filter_occurrence_wins() {
        let q = list(&[("email", "a@b.c"), ("email", "d@e.f")]);
        assert_eq!(q.filters(), &[("email", "a@b.c".to_owned())]);
    }

    #[test]
    fn sorts_keep_client_order() {
        let stmt = build(&[("sortby", "last_name:asc"), ("sortby", "email:desc")]);
        assert!(stmt.sql.ends_with(" ORDER BY last_name ASC, email DESC"));
    }

    #[test]
    fn invalid_sort_pairs_are_dropped() {
        let stmt = build(&[
            ("sortby", "last_name:sideways"),
            ("sortby", "salary:asc"),
            ("sortby", "email"),
            ("sortby", "email:asc:extra"),
            ("sortby", "first_name:desc"),
        ]);
        assert!(stmt.sql.ends_with(" ORDER BY first_name DESC"));
    }

    #[test]
    fn no_valid_sort_means_no_order_by() {
        let stmt = build(&[("sortby", "nope:asc"), ("sortby", "email:ASC")]);
        assert!(!stmt.sql.contains("ORDER BY"));
    }

    #[test]
    fn filters_precede_ordering() {
        let stmt = build(&[("sortby", "class:asc"), ("subject", "Math")]);
        assert!(stmt
            .sql
            .ends_with(" AND subject = ? ORDER BY class ASC"));
        assert_eq!(stmt.args, vec![AttrValue::Text("Math".into())]);
    }

    #[test]
    fn query_string_is_decoded() {
        let q = ListQuery::from_query_string(&TEACHER_SCHEMA, "last_name=O%27Neil&sortby=email%3Adesc");
        assert_eq!(q.filters(), &[("last_name", "O'Neil".to_owned())]);
        assert_eq!(q.sorts(), &[("email", SortDirection::Desc)]);
    }

    #[test]
    fn insert_skips_identity() {
        assert_eq!(
            insert(&TEACHER_SCHEMA),
            "INSERT INTO teachers (first_name, last_name, email, class, subject) VALUES (?, ?, ?, ?, ?)"
        );
    }

    #[test]
    fn update_writes_every_attribute() {
        assert_eq!(
            update_by_id(&TEACHER_SCHEMA),
            "UPDATE teachers SET first_name = ?, last_name = ?, email = ?, class = ?, subject = ? WHERE id = ?"
        );
    }

    #[test]
    fn point_statements_use_identity_column() {
        assert!(select_by_id(&TEACHER_SCHEMA).ends_with("FROM teachers WHERE id = ?"));
        assert_eq!(delete_by_id(&TEACHER_SCHEMA), "DELETE FROM teachers WHERE id = ?");
    }

    #[test]
    fn create_table_declares_identity_key() {
        let ddl = create_table(&TEACHER_SCHEMA);
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS teachers (id INTEGER PRIMARY KEY AUTOINCREMENT, "));
        assert!(ddl.contains("email TEXT NOT NULL DEFAULT ''"));
    }
}
