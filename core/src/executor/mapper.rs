use super::result::Row;
use crate::error::MapperResult;
use crate::mapping::{NestedColumn, ResultKind, ResultMap, ResultMapping, underscore_to_camel_case};
use crate::types::{SqlValue, TypeHandler, TypeHandlerRegistry};
use crate::value::{PropertyPath, Record, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Turns backend rows into result values for one result map
#[derive(Debug, Clone)]
pub struct RowMapper {
	result_map: Arc<ResultMap>,
	handlers: Arc<TypeHandlerRegistry>,
	camel_case: bool,
}

impl RowMapper {
	pub fn new(result_map: Arc<ResultMap>, handlers: Arc<TypeHandlerRegistry>, camel_case: bool) -> Self {
		Self {
			result_map,
			handlers,
			camel_case,
		}
	}

	pub fn result_map(&self) -> &ResultMap {
		&self.result_map
	}

	pub fn map_row(&self, row: &Row) -> MapperResult<Value> {
		match self.result_map.kind {
			ResultKind::Scalar(ty) => match row.values().first() {
				Some(value) => self.handlers.handler(ty).from_sql(value),
				None => Ok(Value::Null),
			},
			ResultKind::Record => self.map_record(row).map(Value::Record),
		}
	}

	fn map_record(&self, row: &Row) -> MapperResult<Record> {
		let record = Record::new();

		for mapping in &self.result_map.mappings {
			let Some(column) = &mapping.column else {
				continue;
			};
			let Some(raw) = row.get(column) else {
				continue;
			};
			let value = self.handler_for(mapping)?.from_sql(raw)?;
			PropertyPath::parse(&mapping.property)?.set(&record, value)?;
		}

		if self.result_map.auto_mapping {
			let claimed: HashSet<String> = self.result_map.mapped_columns().into_iter().collect();
			let fallback = self.handlers.handler(None);
			for (column, raw) in row.iter() {
				if claimed.contains(&column.to_ascii_uppercase()) {
					continue;
				}
				let property = if self.camel_case {
					underscore_to_camel_case(column)
				} else {
					column.to_string()
				};
				if !record.contains_key(&property) {
					record.set(property, fallback.from_sql(raw)?);
				}
			}
		}

		Ok(record)
	}

	/// Parameter object for a nested select, or null when every source
	/// column is null.
	pub fn nested_parameter(&self, row: &Row, column: &NestedColumn) -> MapperResult<Value> {
		let fallback = self.handlers.handler(None);
		let read = |name: &str| fallback.from_sql(row.get(name).unwrap_or(&SqlValue::Null));

		match column {
			NestedColumn::Single(name) => read(name),
			NestedColumn::Composite(pairs) => {
				let record = Record::new();
				let mut found = false;
				for (property, name) in pairs {
					let value = read(name)?;
					found |= !value.is_null();
					record.set(property.clone(), value);
				}
				Ok(if found { Value::Record(record) } else { Value::Null })
			}
		}
	}

	fn handler_for(&self, mapping: &ResultMapping) -> MapperResult<Arc<dyn TypeHandler>> {
		match &mapping.type_handler {
			Some(name) => self.handlers.named(name),
			None => Ok(self
				.handlers
				.handler(mapping.java_type.or_else(|| mapping.jdbc_type.and_then(|t| t.value_type())))),
		}
	}
}
