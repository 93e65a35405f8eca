//! # LumaDB Entity Mapper
//!
//! Typed entity mapping and query layer for DynamoDB-compatible stores:
//! - **Coercion Engine** - schema-driven conversion between application
//!   values and wire attribute values
//! - **Collection Gateway** - one physical table, its key schemas and CRUD
//! - **Query Builder** - chainable conditions, automatic scan/query routing
//!   and lazy pagination
//! - **Command Layer** - entity create/update/delete/get
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Adapter                              │
//! │              Mapper │ Command<E> │ Query<E>                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     Coercion Engine                          │
//! │          Schema │ Converter │ Value ⇄ AttributeValue         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   Collection Gateway                         │
//! │            KeySchema cache │ identity │ pagination           │
//! ├─────────────────────────────────────────────────────────────┤
//! │                       StoreClient                            │
//! │         MemoryStore │ Deadline │ wire JSON translator        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod adapter;
pub mod coercer;
pub mod collection;
pub mod command;
pub mod config;
pub mod core;
pub mod error;
pub mod query;
pub mod schema;
pub mod storage;
pub mod translator;
pub mod value;

// Re-export core types
pub use core::{
    AttributeValue, ComparisonOperator, Condition, KeySchema, Number, QueryOptions, Record,
    ResponsePage, StoreClient, StoreError, TableDescription,
};

// Re-export the mapping layer
pub use adapter::{Adapter, Mapper};
pub use coercer::Coercer;
pub use collection::Collection;
pub use command::Command;
pub use query::{Operation, Query};
pub use schema::{AttributeType, Schema};
pub use value::{Attributes, Document, Entity, FromValue, Value};

pub use config::Config;
pub use error::{MapperError, Result};
pub use storage::{Deadline, MemoryStore};
