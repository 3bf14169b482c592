//! Dynamic SQL: template trees, evaluation context and compilation

pub mod context;
pub mod node;
pub mod property;
pub mod source;
pub mod template;
pub mod token;

pub use context::{DATABASE_ID_KEY, DynamicContext, PARAMETER_OBJECT_KEY};
pub use node::{ForEachNode, SqlNode, TrimNode};
pub use property::PropertyParser;
pub use source::{SqlSource, compile};
pub use template::{
	BranchSpec, CompiledMapper, MapperSpec, NodeSpec, ResultMapSpec, ResultMappingSpec, StatementSpec, TemplateBuilder,
	TemplateSpec,
};
