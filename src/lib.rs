//! Typed document mapping for DynamoDB.
//!
//! Declare a [`Schema`] once, bind it to a table with a [`Model`], and work
//! with plain [`Document`]s. Conditions, updates and expectations are written
//! with portable shorthands (`$gt`, `$between`, `$inc`, `$exists`, ...) or typed
//! builders and compiled against the schema before anything is sent. Item
//! operations create the table on first use and wait until it is active.
//!
//! ```no_run
//! use std::sync::Arc;
//! use dynomodel::{
//!     ClientConfig, FieldSpec, Model, ModelOptions, Schema, TableRegistry, Updates, document,
//! };
//!
//! # async fn run() -> dynomodel::Result<()> {
//! let schema = Schema::new([
//!     ("id", FieldSpec::text().hash_key()),
//!     ("count", FieldSpec::number()),
//! ])?;
//! let transport = Arc::new(dynomodel::client::connect(&ClientConfig::from_env()).await);
//! let registry = Arc::new(TableRegistry::new());
//! let users = Model::new("users", schema, transport, registry, ModelOptions::from_env())?;
//!
//! users.put_item(&document([("id", "a")]))?.await?;
//! let key = document([("id", "a")]);
//! users.update_item(&key, &Updates::new().increment("count", 1))?.await?;
//! let found = users.get_item(&key)?.await?;
//! println!("{:?}", found.item);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod conversions;
pub mod errors;
pub mod expression;
pub mod logging;
pub mod model;
pub mod query;
pub mod readiness;
pub mod schema;
pub mod table_operations;
pub mod transport;
pub mod value;

pub use client::ClientConfig;
pub use config::ModelOptions;
pub use conversions::{FieldType, MapperRegistry, TypeSpec, TypeTag, WireTag};
pub use errors::{Error, Result, TransportError};
pub use expression::{
    Conditions, Expectations, OperatorCompiler, Updates, parse_conditions, parse_expectations,
    parse_updates,
};
pub use model::Model;
pub use query::{Capability, QueryCursor, QueryOutput};
pub use readiness::{Readiness, TableRegistry};
pub use schema::{FieldDefault, FieldSpec, KeyRole, Schema};
pub use transport::{SdkTransport, TableDescription, Throughput, Transport};
pub use value::{Document, Value, WireDocument, document};
