//! Statement metadata: compiled SQL, mapped statements and result maps

pub mod bound;
pub mod result;
pub mod statement;

pub use bound::{BoundSql, ParameterMapping, ParameterMode};
pub use result::{
	CollectionKind, NestedColumn, NestedSelect, ResultKind, ResultMap, ResultMapping, TargetType,
	underscore_to_camel_case,
};
pub use statement::{MappedStatement, RowBounds, StatementKind, StatementType};
