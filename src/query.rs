//! Executable operation cursors.
//!
//! Every [`Model`](crate::Model) operation returns a [`QueryCursor`]: the
//! request is compiled up front, optional parameters are set through chainable
//! builder methods, and nothing is sent until [`QueryCursor::exec`] (or `.await`).
//! Query and scan cursors keep their continuation key so [`QueryCursor::next`]
//! can fetch the following page.

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use aws_sdk_dynamodb::types::{
    ReturnConsumedCapacity, ReturnItemCollectionMetrics, ReturnValue, Select,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::{Error, Result};
use crate::expression::{Conditions, Expectations, OperatorCompiler};
use crate::readiness::TableRegistry;
use crate::schema::Schema;
use crate::table_operations::wait_for_table_active;
use crate::transport::{
    CreateTableParams, DeleteItemParams, GetItemParams, ItemOutput, PageOutput, PutItemParams,
    QueryParams, RequestOptions, ScanParams, TableDescription, Throughput, Transport,
    UpdateItemParams, UpdateTableParams, WireConditionMap, WireExpectationMap, WireUpdateMap,
};
use crate::value::{Document, WireDocument};

/// Optional request parameters a cursor may accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Select,
    ConsistentRead,
    ReturnConsumedCapacity,
    ReturnItemCollectionMetrics,
    ReturnValues,
    Index,
    ScanDirection,
    Limit,
    Count,
    Filter,
    Expected,
}

/// The backend operation a cursor is bound to, with its compiled arguments.
#[derive(Debug, Clone)]
pub(crate) enum Operation {
    GetItem {
        key: WireDocument,
    },
    PutItem {
        item: WireDocument,
        expected: Option<WireExpectationMap>,
    },
    UpdateItem {
        key: WireDocument,
        updates: WireUpdateMap,
        expected: Option<WireExpectationMap>,
    },
    DeleteItem {
        key: WireDocument,
        expected: Option<WireExpectationMap>,
    },
    Query {
        key_conditions: WireConditionMap,
        filter: Option<WireConditionMap>,
    },
    Scan {
        filter: Option<WireConditionMap>,
    },
    DescribeTable,
    CreateTable(CreateTableParams),
    UpdateTable(Throughput),
    DeleteTable,
    WaitForActive {
        create: CreateTableParams,
        poll_interval: Duration,
    },
}

impl Operation {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Operation::GetItem { .. } => "get_item",
            Operation::PutItem { .. } => "put_item",
            Operation::UpdateItem { .. } => "update_item",
            Operation::DeleteItem { .. } => "delete_item",
            Operation::Query { .. } => "query",
            Operation::Scan { .. } => "scan",
            Operation::DescribeTable => "describe_table",
            Operation::CreateTable(_) => "create_table",
            Operation::UpdateTable(_) => "update_table",
            Operation::DeleteTable => "delete_table",
            Operation::WaitForActive { .. } => "wait_for_active_table",
        }
    }

    fn capabilities(&self) -> &'static [Capability] {
        use Capability as C;
        match self {
            Operation::GetItem { .. } => &[C::Select, C::ConsistentRead, C::ReturnConsumedCapacity],
            Operation::PutItem { .. }
            | Operation::UpdateItem { .. }
            | Operation::DeleteItem { .. } => &[
                C::ReturnConsumedCapacity,
                C::ReturnItemCollectionMetrics,
                C::ReturnValues,
                C::Expected,
            ],
            Operation::Query { .. } => &[
                C::Select,
                C::ConsistentRead,
                C::ReturnConsumedCapacity,
                C::Index,
                C::ScanDirection,
                C::Limit,
                C::Count,
                C::Filter,
            ],
            Operation::Scan { .. } => &[
                C::Select,
                C::ConsistentRead,
                C::ReturnConsumedCapacity,
                C::Index,
                C::Limit,
                C::Count,
                C::Filter,
            ],
            Operation::DescribeTable
            | Operation::CreateTable(_)
            | Operation::UpdateTable(_)
            | Operation::DeleteTable
            | Operation::WaitForActive { .. } => &[],
        }
    }

    pub(crate) fn allows(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

/// Decoded result of one execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    /// The fetched item for get, or the returned attributes of a write.
    pub item: Option<Document>,
    /// Items of a query or scan page.
    pub items: Vec<Document>,
    pub count: usize,
    /// Decoded continuation key, when the backend returned one.
    pub last_key: Option<Document>,
    pub consumed_capacity: Option<f64>,
    /// Table description for table-admin operations.
    pub table: Option<TableDescription>,
}

#[derive(Clone)]
struct ReadinessCheck {
    registry: Arc<TableRegistry>,
    create: CreateTableParams,
    poll_interval: Duration,
}

/// A compiled, not-yet-executed operation.
pub struct QueryCursor {
    operation: Operation,
    table_name: String,
    options: RequestOptions,
    transport: Arc<dyn Transport>,
    schema: Arc<Schema>,
    readiness: Option<ReadinessCheck>,
    cancel: Option<CancellationToken>,
    last_key: Option<WireDocument>,
    has_more: bool,
    invalid: Option<Error>,
}

impl std::fmt::Debug for QueryCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCursor")
            .field("operation", &self.operation.name())
            .field("table_name", &self.table_name)
            .field("options", &self.options)
            .field("has_more", &self.has_more)
            .finish_non_exhaustive()
    }
}

impl QueryCursor {
    pub(crate) fn new(
        operation: Operation,
        table_name: impl Into<String>,
        transport: Arc<dyn Transport>,
        schema: Arc<Schema>,
    ) -> Self {
        QueryCursor {
            operation,
            table_name: table_name.into(),
            options: RequestOptions::default(),
            transport,
            schema,
            readiness: None,
            cancel: None,
            last_key: None,
            has_more: true,
            invalid: None,
        }
    }

    /// Require the table to be active before the operation runs.
    pub(crate) fn requiring_active_table(
        mut self,
        registry: Arc<TableRegistry>,
        create: CreateTableParams,
        poll_interval: Duration,
    ) -> Self {
        self.readiness = Some(ReadinessCheck {
            registry,
            create,
            poll_interval,
        });
        self
    }

    pub fn operation_name(&self) -> &'static str {
        self.operation.name()
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.operation.allows(capability)
    }

    /// False once an execution returned no continuation key.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Options that will be sent with the next execution.
    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    /// Record a validation failure if the operation does not take `capability`.
    fn allow(&mut self, capability: Capability, setter: &str) -> bool {
        if self.operation.allows(capability) {
            return true;
        }
        if self.invalid.is_none() {
            self.invalid = Some(unsupported(&self.operation, setter));
        }
        false
    }

    /// Project the given attributes; an empty list selects all attributes.
    pub fn select<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.allow(Capability::Select, "select") {
            let attributes: Vec<String> = attributes.into_iter().map(Into::into).collect();
            if attributes.is_empty() {
                self.options.attributes_to_get = None;
                self.options.select = Some(Select::AllAttributes);
            } else {
                self.options.attributes_to_get = Some(attributes);
                self.options.select = Some(Select::SpecificAttributes);
            }
        }
        self
    }

    pub fn consistent_read(mut self, enabled: bool) -> Self {
        if self.allow(Capability::ConsistentRead, "consistent_read") {
            self.options.consistent_read = Some(enabled);
        }
        self
    }

    pub fn return_consumed_capacity(mut self, enabled: bool) -> Self {
        if self.allow(Capability::ReturnConsumedCapacity, "return_consumed_capacity") {
            self.options.return_consumed_capacity = Some(if enabled {
                ReturnConsumedCapacity::Total
            } else {
                ReturnConsumedCapacity::None
            });
        }
        self
    }

    pub fn return_item_collection_metrics(mut self, enabled: bool) -> Self {
        if self.allow(
            Capability::ReturnItemCollectionMetrics,
            "return_item_collection_metrics",
        ) {
            self.options.return_item_collection_metrics = Some(if enabled {
                ReturnItemCollectionMetrics::Size
            } else {
                ReturnItemCollectionMetrics::None
            });
        }
        self
    }

    pub fn return_values(mut self, values: ReturnValue) -> Self {
        if self.allow(Capability::ReturnValues, "return_values") {
            self.options.return_values = Some(values);
        }
        self
    }

    pub fn index(mut self, index_name: impl Into<String>) -> Self {
        if self.allow(Capability::Index, "index") {
            self.options.index_name = Some(index_name.into());
        }
        self
    }

    pub fn scan_forward(mut self, forward: bool) -> Self {
        if self.allow(Capability::ScanDirection, "scan_forward") {
            self.options.scan_index_forward = Some(forward);
        }
        self
    }

    pub fn descending(self) -> Self {
        self.scan_forward(false)
    }

    pub fn limit(mut self, limit: i32) -> Self {
        if self.allow(Capability::Limit, "limit") {
            self.options.limit = Some(limit);
        }
        self
    }

    /// Return only the number of matching items.
    pub fn count(mut self) -> Self {
        if self.allow(Capability::Count, "count") {
            self.options.attributes_to_get = None;
            self.options.select = Some(Select::Count);
        }
        self
    }

    /// Add a query filter or scan filter.
    pub fn filter(mut self, conditions: &Conditions) -> Result<Self> {
        if !self.operation.allows(Capability::Filter) {
            return Err(unsupported(&self.operation, "filter"));
        }
        let compiled = OperatorCompiler::new(&self.schema).compile_conditions(conditions)?;
        if let Operation::Query { filter, .. } | Operation::Scan { filter } = &mut self.operation {
            *filter = (!compiled.is_empty()).then_some(compiled);
        }
        Ok(self)
    }

    /// Make a write conditional on the current item.
    pub fn expecting(mut self, expectations: &Expectations) -> Result<Self> {
        if !self.operation.allows(Capability::Expected) {
            return Err(unsupported(&self.operation, "expecting"));
        }
        let compiled =
            OperatorCompiler::new(&self.schema).compile_expectations(Some(expectations))?;
        if let Operation::PutItem { expected, .. }
        | Operation::UpdateItem { expected, .. }
        | Operation::DeleteItem { expected, .. } = &mut self.operation
        {
            *expected = compiled.filter(|c| !c.is_empty());
        }
        Ok(self)
    }

    /// Abandon readiness and table waits when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run the operation, waiting for the table first when required.
    pub async fn exec(&mut self) -> Result<QueryOutput> {
        if let Some(err) = &self.invalid {
            return Err(err.clone());
        }

        if let Some(check) = &self.readiness {
            check
                .registry
                .ensure_active(
                    self.transport.clone(),
                    check.create.clone(),
                    check.poll_interval,
                    self.cancel.as_ref(),
                )
                .await?;
        }

        let start = Instant::now();
        let output = self.dispatch().await?;
        debug!(
            table = %self.table_name,
            operation = self.operation.name(),
            count = output.count,
            has_more = self.has_more,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "executed operation"
        );
        Ok(output)
    }

    /// Fetch the page after the last one returned.
    pub async fn next(&mut self) -> Result<QueryOutput> {
        let Some(key) = self.last_key.clone() else {
            return Err(Error::State(
                "there is no more data to retrieve, last execution did not yield a continuation key"
                    .to_string(),
            ));
        };
        self.options.exclusive_start_key = Some(key);
        self.exec().await
    }

    async fn dispatch(&mut self) -> Result<QueryOutput> {
        let table_name = self.table_name.clone();
        let options = self.options.clone();
        let transport = self.transport.clone();

        let output = match &self.operation {
            Operation::GetItem { key } => {
                let out = transport
                    .get_item(GetItemParams {
                        table_name,
                        key: key.clone(),
                        options,
                    })
                    .await?;
                let count = usize::from(out.item.is_some());
                QueryOutput {
                    item: self.schema.decode(out.item.as_ref())?,
                    count,
                    consumed_capacity: out.consumed_capacity,
                    ..QueryOutput::default()
                }
            }
            Operation::PutItem { item, expected } => {
                let out = transport
                    .put_item(PutItemParams {
                        table_name,
                        item: item.clone(),
                        expected: expected.clone(),
                        options,
                    })
                    .await?;
                self.write_output(out)?
            }
            Operation::UpdateItem {
                key,
                updates,
                expected,
            } => {
                let out = transport
                    .update_item(UpdateItemParams {
                        table_name,
                        key: key.clone(),
                        attribute_updates: updates.clone(),
                        expected: expected.clone(),
                        options,
                    })
                    .await?;
                self.write_output(out)?
            }
            Operation::DeleteItem { key, expected } => {
                let out = transport
                    .delete_item(DeleteItemParams {
                        table_name,
                        key: key.clone(),
                        expected: expected.clone(),
                        options,
                    })
                    .await?;
                self.write_output(out)?
            }
            Operation::Query {
                key_conditions,
                filter,
            } => {
                let page = transport
                    .query(QueryParams {
                        table_name,
                        key_conditions: key_conditions.clone(),
                        query_filter: filter.clone(),
                        options,
                    })
                    .await?;
                return self.page_output(page);
            }
            Operation::Scan { filter } => {
                let page = transport
                    .scan(ScanParams {
                        table_name,
                        scan_filter: filter.clone(),
                        options,
                    })
                    .await?;
                return self.page_output(page);
            }
            Operation::DescribeTable => table_output(transport.describe_table(&table_name).await?),
            Operation::CreateTable(params) => {
                table_output(transport.create_table(params.clone()).await?)
            }
            Operation::UpdateTable(throughput) => table_output(
                transport
                    .update_table(UpdateTableParams {
                        table_name,
                        throughput: *throughput,
                    })
                    .await?,
            ),
            Operation::DeleteTable => table_output(transport.delete_table(&table_name).await?),
            Operation::WaitForActive {
                create,
                poll_interval,
            } => {
                let cancel = self.cancel.clone().unwrap_or_default();
                table_output(
                    wait_for_table_active(transport.as_ref(), create, *poll_interval, &cancel).await?,
                )
            }
        };

        self.last_key = None;
        self.has_more = false;
        Ok(output)
    }

    fn write_output(&self, out: ItemOutput) -> Result<QueryOutput> {
        let item = match &out.item {
            Some(attributes) if !attributes.is_empty() => {
                Some(self.schema.decode_present(attributes)?)
            }
            _ => None,
        };
        Ok(QueryOutput {
            count: usize::from(item.is_some()),
            item,
            consumed_capacity: out.consumed_capacity,
            ..QueryOutput::default()
        })
    }

    fn page_output(&mut self, page: PageOutput) -> Result<QueryOutput> {
        let items = page
            .items
            .iter()
            .map(|wire| {
                self.schema
                    .decode(Some(wire))
                    .map(|doc| doc.unwrap_or_default())
            })
            .collect::<Result<Vec<_>>>()?;
        let last_key = page
            .last_evaluated_key
            .as_ref()
            .filter(|key| !key.is_empty())
            .map(|key| self.schema.decode_present(key))
            .transpose()?;

        self.last_key = page.last_evaluated_key.filter(|key| !key.is_empty());
        self.has_more = self.last_key.is_some();

        Ok(QueryOutput {
            count: usize::try_from(page.count).unwrap_or(items.len()),
            items,
            last_key,
            consumed_capacity: page.consumed_capacity,
            ..QueryOutput::default()
        })
    }
}

fn unsupported(operation: &Operation, setter: &str) -> Error {
    Error::validation(format!("{} does not support {}", operation.name(), setter))
}

fn table_output(description: TableDescription) -> QueryOutput {
    QueryOutput {
        table: Some(description),
        ..QueryOutput::default()
    }
}

impl IntoFuture for QueryCursor {
    type Output = Result<QueryOutput>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(mut self) -> Self::IntoFuture {
        Box::pin(async move { self.exec().await })
    }
}
