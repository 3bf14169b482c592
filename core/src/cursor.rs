//! Forward-only, single-consumer result streaming

use crate::error::{MapperError, MapperResult};
use crate::executor::{RowMapper, RowSource};
use crate::mapping::RowBounds;
use crate::value::Value;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStatus {
	/// No row fetched yet
	Created,
	Open,
	/// Closed before the rows ran out
	Closed,
	/// Every row within bounds was read; implies closed
	Consumed,
}

/// Lazily maps rows from an open statement.
///
/// Offset rows are read and dropped without mapping. The cursor closes
/// itself once the rows run out or `offset + limit` rows have been read;
/// otherwise the caller must [`close`](Cursor::close) it.
pub struct Cursor {
	source: Box<dyn RowSource>,
	bounds: RowBounds,
	mapper: RowMapper,
	status: CursorStatus,
	rows_read: usize,
	current_index: Option<usize>,
	iterator_retrieved: bool,
}

impl Cursor {
	pub fn new(source: Box<dyn RowSource>, bounds: RowBounds, mapper: RowMapper) -> Self {
		Self {
			source,
			bounds,
			mapper,
			status: CursorStatus::Created,
			rows_read: 0,
			current_index: None,
			iterator_retrieved: false,
		}
	}

	pub fn status(&self) -> CursorStatus {
		self.status
	}

	pub fn is_open(&self) -> bool {
		self.status == CursorStatus::Open
	}

	pub fn is_consumed(&self) -> bool {
		self.status == CursorStatus::Consumed
	}

	pub fn is_closed(&self) -> bool {
		matches!(self.status, CursorStatus::Closed | CursorStatus::Consumed)
	}

	/// Offset-adjusted position of the last row handed out
	pub fn current_index(&self) -> Option<usize> {
		self.current_index
	}

	/// The one iterator over this cursor.
	pub fn iter(&mut self) -> MapperResult<CursorIter<'_>> {
		if self.iterator_retrieved {
			return Err(MapperError::IteratorReused);
		}
		if self.is_closed() {
			return Err(MapperError::CursorClosed);
		}
		self.iterator_retrieved = true;
		Ok(CursorIter { cursor: self })
	}

	/// Release the row source. Safe to call repeatedly; release errors are
	/// logged and dropped.
	pub fn close(&mut self) {
		if self.is_closed() {
			return;
		}
		if let Err(e) = self.source.close() {
			debug!(error = %e, "Ignoring failure while closing cursor");
		}
		self.status = CursorStatus::Closed;
	}

	fn consume(&mut self) {
		self.close();
		self.status = CursorStatus::Consumed;
	}

	fn fetch_next(&mut self) -> MapperResult<Option<Value>> {
		loop {
			if self.is_closed() {
				return Ok(None);
			}
			if self.rows_read >= self.bounds.end() {
				self.consume();
				return Ok(None);
			}

			let row = match self.source.next_row() {
				Ok(Some(row)) => row,
				Ok(None) => {
					self.consume();
					return Ok(None);
				}
				Err(e) => {
					self.close();
					return Err(e);
				}
			};
			self.status = CursorStatus::Open;
			self.rows_read += 1;
			if self.rows_read <= self.bounds.offset {
				continue;
			}

			let value = match self.mapper.map_row(&row) {
				Ok(value) => value,
				Err(e) => {
					self.close();
					return Err(e);
				}
			};
			self.current_index = Some(self.rows_read - 1);
			if self.rows_read >= self.bounds.end() {
				self.consume();
			}
			return Ok(Some(value));
		}
	}
}

impl fmt::Debug for Cursor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Cursor")
			.field("bounds", &self.bounds)
			.field("status", &self.status)
			.field("current_index", &self.current_index)
			.finish()
	}
}

pub struct CursorIter<'a> {
	cursor: &'a mut Cursor,
}

impl Iterator for CursorIter<'_> {
	type Item = MapperResult<Value>;

	fn next(&mut self) -> Option<Self::Item> {
		self.cursor.fetch_next().transpose()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::mapping::ResultMap;
	use crate::testing::{VecRowSource, row};
	use crate::types::{SqlValue, TypeHandlerRegistry};
	use pretty_assertions::assert_eq;
	use std::sync::Arc;
	use std::sync::atomic::Ordering;

	fn rows(n: i64) -> Vec<crate::executor::Row> {
		(0..n).map(|i| row(&["id"], vec![SqlValue::BigInt(i)])).collect()
	}

	fn cursor(source: VecRowSource, bounds: RowBounds) -> Cursor {
		let mapper = RowMapper::new(
			Arc::new(ResultMap::auto("t")),
			Arc::new(TypeHandlerRegistry::default()),
			false,
		);
		Cursor::new(Box::new(source), bounds, mapper)
	}

	fn id(value: Value) -> Value {
		value.as_record().and_then(|r| r.get("id")).unwrap_or(Value::Null)
	}

	#[test]
	fn test_offset_and_limit() {
		let source = VecRowSource::new(rows(5));
		let closes = source.close_counter();
		let fetched = source.fetched_counter();
		let mut cursor = cursor(source, RowBounds::new(2, 2));
		assert_eq!(cursor.status(), CursorStatus::Created);
		assert_eq!(cursor.current_index(), None);

		let ids: Vec<Value> = cursor.iter().unwrap().map(|r| id(r.unwrap())).collect();
		assert_eq!(ids, vec![Value::Int(2), Value::Int(3)]);
		assert!(cursor.is_consumed());
		assert_eq!(cursor.current_index(), Some(3));
		assert_eq!(fetched.load(Ordering::SeqCst), 4);
		assert_eq!(closes.load(Ordering::SeqCst), 1);

		assert!(matches!(cursor.iter(), Err(MapperError::IteratorReused)));
	}

	#[test]
	fn test_exhaustion_consumes() {
		let mut cursor = cursor(VecRowSource::new(rows(3)), RowBounds::DEFAULT);
		let mut iter = cursor.iter().unwrap();
		assert_eq!(iter.next().map(|r| id(r.unwrap())), Some(Value::Int(0)));
		assert_eq!(iter.by_ref().count(), 2);
		assert!(iter.next().is_none());
		drop(iter);

		assert!(cursor.is_consumed());
		assert_eq!(cursor.current_index(), Some(2));
	}

	#[test]
	fn test_zero_limit_reads_nothing() {
		let source = VecRowSource::new(rows(3));
		let fetched = source.fetched_counter();
		let mut cursor = cursor(source, RowBounds::new(0, 0));
		assert_eq!(cursor.iter().unwrap().count(), 0);
		assert!(cursor.is_consumed());
		assert_eq!(fetched.load(Ordering::SeqCst), 0);
	}

	#[test]
	fn test_closed_cursor_rejects_iteration() {
		let source = VecRowSource::new(rows(3)).fail_close();
		let closes = source.close_counter();
		let mut cursor = cursor(source, RowBounds::DEFAULT);

		cursor.close();
		cursor.close();
		assert_eq!(cursor.status(), CursorStatus::Closed);
		assert_eq!(closes.load(Ordering::SeqCst), 1);
		assert!(matches!(cursor.iter(), Err(MapperError::CursorClosed)));
	}

	#[test]
	fn test_source_error_is_yielded_once() {
		let mut cursor = cursor(VecRowSource::new(rows(3)).fail_at(1), RowBounds::DEFAULT);
		let results: Vec<_> = cursor.iter().unwrap().collect();
		assert_eq!(results.len(), 2);
		assert!(results[0].is_ok());
		assert!(results[1].is_err());
		assert_eq!(cursor.status(), CursorStatus::Closed);
	}
}
