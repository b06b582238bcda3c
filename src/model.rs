//! Table-bound models.
//!
//! A [`Model`] ties a table name to a [`Schema`], a [`Transport`] and a shared
//! [`TableRegistry`]. Each operation compiles its arguments immediately and
//! returns a [`QueryCursor`]; item, query and scan cursors wait for the table
//! to be active (creating it if needed) before they run.

use std::sync::Arc;
use std::time::Duration;

use crate::config::ModelOptions;
use crate::errors::{Error, Result};
use crate::expression::{Conditions, OperatorCompiler, Updates};
use crate::query::{Operation, QueryCursor};
use crate::readiness::TableRegistry;
use crate::schema::Schema;
use crate::table_operations::create_table_params;
use crate::transport::{CreateTableParams, Throughput, Transport};
use crate::value::Document;

#[derive(Clone)]
pub struct Model {
    table_name: String,
    schema: Arc<Schema>,
    transport: Arc<dyn Transport>,
    registry: Arc<TableRegistry>,
    options: ModelOptions,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("table_name", &self.table_name)
            .field("schema", &self.schema)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Model {
    pub fn new(
        table_name: impl Into<String>,
        schema: impl Into<Arc<Schema>>,
        transport: Arc<dyn Transport>,
        registry: Arc<TableRegistry>,
        options: ModelOptions,
    ) -> Result<Self> {
        let table_name = table_name.into();
        if table_name.trim().is_empty() {
            return Err(Error::validation("table name is required"));
        }
        Ok(Model {
            table_name,
            schema: schema.into(),
            transport,
            registry,
            options,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn options(&self) -> &ModelOptions {
        &self.options
    }

    /// Make the table available ahead of the first data operation.
    ///
    /// Runs the same shared readiness sequence data operations wait on, so
    /// later operations on this table find it settled.
    pub async fn warm_up(&self) -> Result<()> {
        self.registry
            .ensure_active(
                self.transport.clone(),
                self.create_params(None),
                self.options.poll_interval,
                None,
            )
            .await
    }

    fn compiler(&self) -> OperatorCompiler<'_> {
        OperatorCompiler::new(&self.schema)
    }

    fn create_params(&self, throughput: Option<Throughput>) -> CreateTableParams {
        create_table_params(
            &self.table_name,
            &self.schema,
            throughput.unwrap_or(self.options.throughput),
        )
    }

    fn cursor(&self, operation: Operation) -> QueryCursor {
        QueryCursor::new(
            operation,
            self.table_name.clone(),
            self.transport.clone(),
            self.schema.clone(),
        )
    }

    /// Cursor that waits for the table before running.
    fn data_cursor(&self, operation: Operation) -> QueryCursor {
        self.cursor(operation).requiring_active_table(
            self.registry.clone(),
            self.create_params(None),
            self.options.poll_interval,
        )
    }

    /// Fetch one item by key. Attributes other than the key are ignored.
    pub fn get_item(&self, key: &Document) -> Result<QueryCursor> {
        let key = self.schema.encode_key(key)?;
        let cursor = self.data_cursor(Operation::GetItem { key });
        Ok(self.apply_read_consistency(cursor))
    }

    /// Store a whole item. The item must carry its key attributes.
    pub fn put_item(&self, item: &Document) -> Result<QueryCursor> {
        self.schema.encode_key(item)?;
        let item = self.schema.encode(item)?;
        Ok(self.data_cursor(Operation::PutItem {
            item,
            expected: None,
        }))
    }

    /// Update attributes of one item. Updates that compile to no attribute
    /// changes, such as `{"$set": {}}`, are rejected.
    pub fn update_item(&self, key: &Document, updates: &Updates) -> Result<QueryCursor> {
        let key = self.schema.encode_key(key)?;
        let updates = self.compiler().compile_updates(updates)?;
        if updates.is_empty() {
            return Err(Error::validation("updates are required"));
        }
        Ok(self.data_cursor(Operation::UpdateItem {
            key,
            updates,
            expected: None,
        }))
    }

    pub fn delete_item(&self, key: &Document) -> Result<QueryCursor> {
        let key = self.schema.encode_key(key)?;
        Ok(self.data_cursor(Operation::DeleteItem {
            key,
            expected: None,
        }))
    }

    /// Query by key conditions.
    pub fn query(&self, key_conditions: &Conditions) -> Result<QueryCursor> {
        if key_conditions.is_empty() {
            return Err(Error::validation("key conditions are required"));
        }
        let key_conditions = self.compiler().compile_conditions(key_conditions)?;
        let cursor = self.data_cursor(Operation::Query {
            key_conditions,
            filter: None,
        });
        Ok(self.apply_read_consistency(cursor))
    }

    /// Scan the table, optionally filtered.
    pub fn scan(&self, filter: Option<&Conditions>) -> Result<QueryCursor> {
        let filter = match filter {
            Some(conditions) if !conditions.is_empty() => {
                Some(self.compiler().compile_conditions(conditions)?)
            }
            _ => None,
        };
        Ok(self.data_cursor(Operation::Scan { filter }))
    }

    pub fn describe_table(&self) -> Result<QueryCursor> {
        Ok(self.cursor(Operation::DescribeTable))
    }

    /// Create the table from the schema's key fields, with `throughput` or the
    /// model's default capacity.
    pub fn create_table(&self, throughput: Option<Throughput>) -> Result<QueryCursor> {
        Ok(self.cursor(Operation::CreateTable(self.create_params(throughput))))
    }

    pub fn update_table(&self, throughput: Option<Throughput>) -> Result<QueryCursor> {
        let throughput = throughput.unwrap_or(self.options.throughput);
        Ok(self.cursor(Operation::UpdateTable(throughput)))
    }

    pub fn delete_table(&self) -> Result<QueryCursor> {
        Ok(self.cursor(Operation::DeleteTable))
    }

    /// Describe, create if missing, and poll until active.
    ///
    /// Unlike item operations this always talks to the backend; the outcome is
    /// not cached in the registry.
    pub fn wait_for_active_table(&self, poll_interval: Option<Duration>) -> Result<QueryCursor> {
        Ok(self.cursor(Operation::WaitForActive {
            create: self.create_params(None),
            poll_interval: poll_interval.unwrap_or(self.options.poll_interval),
        }))
    }

    fn apply_read_consistency(&self, cursor: QueryCursor) -> QueryCursor {
        if self.options.consistent_read {
            cursor.consistent_read(true)
        } else {
            cursor
        }
    }
}
