//! sqlmap - SQL mapping execution core
//!
//! Dynamic statement templates, a two-level result cache and the session
//! API that ties them to a pluggable database transaction.

pub mod cache;
pub mod config;
pub mod cursor;
pub mod error;
pub mod executor;
pub mod expr;
pub mod mapping;
pub mod plugin;
pub mod scripting;
pub mod session;
pub mod types;
pub mod value;

#[cfg(test)]
mod testing;

pub use cache::{Cache, CacheConfig, CacheKey};
pub use config::{Configuration, ConfigurationBuilder, LocalCacheScope, Settings};
pub use cursor::Cursor;
pub use error::{MapperError, MapperResult};
pub use executor::{Executor, Row, RowSource, Transaction, TransactionFactory};
pub use mapping::{MappedStatement, RowBounds};
pub use plugin::{Interceptor, Operation};
pub use scripting::MapperSpec;
pub use session::{SqlSession, SqlSessionFactory};
pub use value::{Record, Value};
