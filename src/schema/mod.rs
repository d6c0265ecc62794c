//! Schema layer: field declarations, config classes and class declaration files.

mod class;
mod field;
pub mod spec;

pub use class::{ClassBuilder, ClassCheck, ConfigClass, JSON_SCHEMA_DRAFT, SlotValidator};
pub use field::{
    CheckStatus, DEFAULT_BOUND, FieldBuilder, FieldKind, FieldSchema, Validator, required,
    same_value,
};
pub use spec::{ClassSpec, FieldSpec, FieldSpecKind, register_specs};
