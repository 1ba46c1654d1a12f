//! Declarative record metadata and partial-update projection.
//!
//! # Responsibilities
//!
//! - Describe each record type once, as a `static` [`AttributeSchema`]:
//!   payload key, storage column, value kind, identity and create/filter rules.
//! - Merge arbitrary partial-update payloads into records by matching payload
//!   keys against that schema ([`projector`]).
//!
//! # Module invariants
//!
//! - **No storage dependencies.** Nothing here opens connections or builds
//!   SQL text; the store layer consumes these types.
//! - Schemas are read-only at runtime.

pub mod attribute;
pub mod projector;

pub use attribute::{AttrKind, AttrValue, Attribute, AttributeSchema};
pub use projector::{project, Projection, ProjectionError};

/// A record type with a declared attribute schema.
///
/// `Default` provides the blank record that row decoding fills in, attribute
/// by attribute, through the schema setters.
pub trait Record: Default + Clone + Send + Sync + 'static {
    /// The schema shared by every instance of this record type.
    fn schema() -> &'static AttributeSchema<Self>;

    /// Overwrite the identity. Only the store calls this.
    fn set_id(&mut self, id: i64) {
        (Self::schema().identity().set)(self, AttrValue::Integer(id));
    }

    /// Values of the insertable attributes, in schema order.
    fn insert_values(&self) -> Vec<AttrValue> {
        Self::schema().insertable().map(|a| (a.get)(self)).collect()
    }

    /// Values of the updatable attributes followed by the identity, matching
    /// the parameter order of a full-record `UPDATE ... WHERE id = ?`.
    fn update_values(&self) -> Vec<AttrValue> {
        let schema = Self::schema();
        schema
            .updatable()
            .map(|a| (a.get)(self))
            .chain(std::iter::once((schema.identity().get)(self)))
            .collect()
    }
}
