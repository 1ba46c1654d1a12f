//! The `Teacher` record and its attribute schema.

use serde::{Deserialize, Serialize};

use crate::schema::{AttrKind, AttrValue, Attribute, AttributeSchema, Record};

/// A teacher as stored and exchanged over the API.
///
/// `id` is output-only: it defaults to `0` when absent from a create payload
/// and is always overwritten with the store-assigned identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Teacher {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub class: String,
    pub subject: String,
}

macro_rules! text_attribute {
    ($field:ident) => {
        Attribute {
            key: stringify!($field),
            column: stringify!($field),
            kind: AttrKind::Text,
            identity: false,
            skip_on_create: false,
            filterable: true,
            get: |t: &Teacher| AttrValue::Text(t.$field.clone()),
            set: |t: &mut Teacher, v: AttrValue| {
                if let AttrValue::Text(s) = v {
                    t.$field = s;
                }
            },
        }
    };
}

const TEACHER_ATTRIBUTES: &[Attribute<Teacher>] = &[
    Attribute {
        key: "id",
        column: "id",
        kind: AttrKind::Integer,
        identity: true,
        skip_on_create: true,
        filterable: false,
        get: |t: &Teacher| AttrValue::Integer(t.id),
        set: |t: &mut Teacher, v: AttrValue| {
            if let AttrValue::Integer(id) = v {
                t.id = id;
            }
        },
    },
    text_attribute!(first_name),
    text_attribute!(last_name),
    text_attribute!(email),
    text_attribute!(class),
    text_attribute!(subject),
];

/// Schema for the `teachers` table.
pub static TEACHER_SCHEMA: AttributeSchema<Teacher> =
    AttributeSchema::new("teacher", "teachers", TEACHER_ATTRIBUTES);

impl Record for Teacher {
    fn schema() -> &'static AttributeSchema<Self> {
        &TEACHER_SCHEMA
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_orders_identity_first() {
        let keys: Vec<_> = TEACHER_SCHEMA.attributes.iter().map(|a| a.key).collect();
        assert_eq!(keys, ["id", "first_name", "last_name", "email", "class", "subject"]);
        assert_eq!(TEACHER_SCHEMA.identity().column, "id");
    }

    #[test]
    fn identity_is_not_insertable() {
        let cols: Vec<_> = TEACHER_SCHEMA.insertable().map(|a| a.column).collect();
        assert!(!cols.contains(&"id"));
        assert_eq!(cols.len(), 5);
    }

    #[test]
    fn record_identity_accessors() {
        let mut t = Teacher::default();
        assert_eq!(t.id, 0);
        t.set_id(42);
        assert_eq!(t.id, 42);
    }

    #[test]
    fn update_values_end_with_identity() {
        let t = Teacher {
            id: 5,
            first_name: "Ada".into(),
            ..Teacher::default()
        };
        let values = t.update_values();
        assert_eq!(values.len(), 6);
        assert_eq!(values[0], AttrValue::Text("Ada".into()));
        assert_eq!(values[5], AttrValue::Integer(5));
    }

    #[test]
    fn omitted_fields_deserialize_empty() {
        let t: Teacher = serde_json::from_value(json!({"first_name": "A", "last_name": "B"})).unwrap();
        assert_eq!(t.id, 0);
        assert_eq!(t.email, "");
    }
}
