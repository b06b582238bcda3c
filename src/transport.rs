//! Backend capability set and its request/response structures.
//!
//! [`Transport`] is the seam between the mapper and the wire. Requests carry
//! already-encoded attribute values and compiled operator structures, so a
//! transport only moves data. The SDK-backed implementation talks to DynamoDB
//! through `aws_sdk_dynamodb::Client`.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::{
    AttributeAction, AttributeDefinition, AttributeValue, AttributeValueUpdate, ComparisonOperator,
    Condition, ConsumedCapacity, ExpectedAttributeValue, KeySchemaElement, KeyType,
    ProvisionedThroughput, ReturnConsumedCapacity, ReturnItemCollectionMetrics, ReturnValue,
    ScalarAttributeType, Select, TableStatus,
};
use serde::Deserialize;
use tracing::debug;

use crate::errors::{TransportError, map_sdk_error};
use crate::value::WireDocument;

/// A compiled condition: comparison operator plus encoded operands.
#[derive(Debug, Clone, PartialEq)]
pub struct WireCondition {
    pub operator: ComparisonOperator,
    pub values: Vec<AttributeValue>,
}

/// A compiled attribute update.
#[derive(Debug, Clone, PartialEq)]
pub struct WireUpdate {
    pub action: AttributeAction,
    pub value: Option<AttributeValue>,
}

/// A compiled expectation: either an existence check or an equality check.
#[derive(Debug, Clone, PartialEq)]
pub struct WireExpectation {
    pub exists: Option<bool>,
    pub value: Option<AttributeValue>,
}

pub type WireConditionMap = HashMap<String, WireCondition>;
pub type WireUpdateMap = HashMap<String, WireUpdate>;
pub type WireExpectationMap = HashMap<String, WireExpectation>;

/// Provisioned capacity for a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Throughput {
    pub read_capacity: i64,
    pub write_capacity: i64,
}

impl Default for Throughput {
    fn default() -> Self {
        Throughput {
            read_capacity: 10,
            write_capacity: 5,
        }
    }
}

/// Optional request parameters shared by item and read operations.
///
/// Which of these an operation honours is decided by the cursor's allow-list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub attributes_to_get: Option<Vec<String>>,
    pub consistent_read: Option<bool>,
    pub return_consumed_capacity: Option<ReturnConsumedCapacity>,
    pub return_item_collection_metrics: Option<ReturnItemCollectionMetrics>,
    pub return_values: Option<ReturnValue>,
    pub index_name: Option<String>,
    pub scan_index_forward: Option<bool>,
    pub limit: Option<i32>,
    pub select: Option<Select>,
    pub exclusive_start_key: Option<WireDocument>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetItemParams {
    pub table_name: String,
    pub key: WireDocument,
    pub options: RequestOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PutItemParams {
    pub table_name: String,
    pub item: WireDocument,
    pub expected: Option<WireExpectationMap>,
    pub options: RequestOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateItemParams {
    pub table_name: String,
    pub key: WireDocument,
    pub attribute_updates: WireUpdateMap,
    pub expected: Option<WireExpectationMap>,
    pub options: RequestOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteItemParams {
    pub table_name: String,
    pub key: WireDocument,
    pub expected: Option<WireExpectationMap>,
    pub options: RequestOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryParams {
    pub table_name: String,
    pub key_conditions: WireConditionMap,
    pub query_filter: Option<WireConditionMap>,
    pub options: RequestOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanParams {
    pub table_name: String,
    pub scan_filter: Option<WireConditionMap>,
    pub options: RequestOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableParams {
    pub table_name: String,
    pub key_schema: Vec<(String, KeyType)>,
    pub attribute_definitions: Vec<(String, ScalarAttributeType)>,
    pub throughput: Throughput,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateTableParams {
    pub table_name: String,
    pub throughput: Throughput,
}

/// Result of a single-item operation.
///
/// `item` is the fetched item for get, or the returned attributes for put,
/// update and delete.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemOutput {
    pub item: Option<WireDocument>,
    pub consumed_capacity: Option<f64>,
}

/// One page of a query or scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageOutput {
    pub items: Vec<WireDocument>,
    pub count: i32,
    pub last_evaluated_key: Option<WireDocument>,
    pub consumed_capacity: Option<f64>,
}

/// The parts of a table description the mapper cares about.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescription {
    pub table_name: String,
    pub status: TableStatus,
    pub item_count: Option<i64>,
    pub throughput: Option<Throughput>,
}

impl TableDescription {
    pub fn is_active(&self) -> bool {
        self.status == TableStatus::Active
    }
}

/// Table-admin, item and read operations of a DynamoDB-like backend.
///
/// Implementations must report a missing table as [`TransportError::NotFound`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_item(&self, params: GetItemParams) -> Result<ItemOutput, TransportError>;
    async fn put_item(&self, params: PutItemParams) -> Result<ItemOutput, TransportError>;
    async fn update_item(&self, params: UpdateItemParams) -> Result<ItemOutput, TransportError>;
    async fn delete_item(&self, params: DeleteItemParams) -> Result<ItemOutput, TransportError>;
    async fn query(&self, params: QueryParams) -> Result<PageOutput, TransportError>;
    async fn scan(&self, params: ScanParams) -> Result<PageOutput, TransportError>;
    async fn describe_table(&self, table_name: &str) -> Result<TableDescription, TransportError>;
    async fn create_table(
        &self,
        params: CreateTableParams,
    ) -> Result<TableDescription, TransportError>;
    async fn update_table(
        &self,
        params: UpdateTableParams,
    ) -> Result<TableDescription, TransportError>;
    async fn delete_table(&self, table_name: &str) -> Result<TableDescription, TransportError>;
}

// ========== SDK TRANSPORT ==========

/// [`Transport`] over the AWS SDK DynamoDB client.
#[derive(Debug, Clone)]
pub struct SdkTransport {
    client: Client,
}

impl SdkTransport {
    pub fn new(client: Client) -> Self {
        SdkTransport { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

fn build_error(what: &str, err: impl std::fmt::Display) -> TransportError {
    TransportError::Other(format!("failed to build {}: {}", what, err))
}

fn to_sdk_conditions(
    conditions: Option<WireConditionMap>,
) -> Result<Option<HashMap<String, Condition>>, TransportError> {
    let Some(conditions) = conditions else {
        return Ok(None);
    };
    let mut out = HashMap::with_capacity(conditions.len());
    for (field, condition) in conditions {
        let sdk = Condition::builder()
            .comparison_operator(condition.operator)
            .set_attribute_value_list(Some(condition.values))
            .build()
            .map_err(|e| build_error("condition", e))?;
        out.insert(field, sdk);
    }
    Ok(Some(out))
}

fn to_sdk_expected(
    expected: Option<WireExpectationMap>,
) -> Option<HashMap<String, ExpectedAttributeValue>> {
    expected.map(|map| {
        map.into_iter()
            .map(|(field, exp)| {
                let sdk = ExpectedAttributeValue::builder()
                    .set_exists(exp.exists)
                    .set_value(exp.value)
                    .build();
                (field, sdk)
            })
            .collect()
    })
}

fn to_sdk_updates(updates: WireUpdateMap) -> HashMap<String, AttributeValueUpdate> {
    updates
        .into_iter()
        .map(|(field, update)| {
            let sdk = AttributeValueUpdate::builder()
                .action(update.action)
                .set_value(update.value)
                .build();
            (field, sdk)
        })
        .collect()
}

fn to_sdk_throughput(throughput: Throughput) -> Result<ProvisionedThroughput, TransportError> {
    ProvisionedThroughput::builder()
        .read_capacity_units(throughput.read_capacity)
        .write_capacity_units(throughput.write_capacity)
        .build()
        .map_err(|e| build_error("provisioned throughput", e))
}

fn capacity_units(consumed: Option<&ConsumedCapacity>) -> Option<f64> {
    consumed.and_then(|c| c.capacity_units())
}

fn from_sdk_description(
    table_name: &str,
    description: Option<aws_sdk_dynamodb::types::TableDescription>,
) -> Result<TableDescription, TransportError> {
    let description = description.ok_or_else(|| {
        TransportError::Other(format!("no table description returned for '{}'", table_name))
    })?;
    let throughput = description.provisioned_throughput().and_then(|p| {
        Some(Throughput {
            read_capacity: p.read_capacity_units()?,
            write_capacity: p.write_capacity_units()?,
        })
    });
    Ok(TableDescription {
        table_name: description.table_name().unwrap_or(table_name).to_string(),
        status: description
            .table_status()
            .cloned()
            .unwrap_or(TableStatus::Creating),
        item_count: description.item_count(),
        throughput,
    })
}

#[async_trait]
impl Transport for SdkTransport {
    async fn get_item(&self, params: GetItemParams) -> Result<ItemOutput, TransportError> {
        let opts = params.options;
        let start = Instant::now();
        let output = self
            .client
            .get_item()
            .table_name(&params.table_name)
            .set_key(Some(params.key))
            .set_attributes_to_get(opts.attributes_to_get)
            .set_consistent_read(opts.consistent_read)
            .set_return_consumed_capacity(opts.return_consumed_capacity)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, Some(&params.table_name)))?;
        debug!(
            table = %params.table_name,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "get_item"
        );

        Ok(ItemOutput {
            consumed_capacity: capacity_units(output.consumed_capacity()),
            item: output.item,
        })
    }

    async fn put_item(&self, params: PutItemParams) -> Result<ItemOutput, TransportError> {
        let opts = params.options;
        let output = self
            .client
            .put_item()
            .table_name(&params.table_name)
            .set_item(Some(params.item))
            .set_expected(to_sdk_expected(params.expected))
            .set_return_values(opts.return_values)
            .set_return_consumed_capacity(opts.return_consumed_capacity)
            .set_return_item_collection_metrics(opts.return_item_collection_metrics)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, Some(&params.table_name)))?;

        Ok(ItemOutput {
            consumed_capacity: capacity_units(output.consumed_capacity()),
            item: output.attributes,
        })
    }

    async fn update_item(&self, params: UpdateItemParams) -> Result<ItemOutput, TransportError> {
        let opts = params.options;
        let output = self
            .client
            .update_item()
            .table_name(&params.table_name)
            .set_key(Some(params.key))
            .set_attribute_updates(Some(to_sdk_updates(params.attribute_updates)))
            .set_expected(to_sdk_expected(params.expected))
            .set_return_values(opts.return_values)
            .set_return_consumed_capacity(opts.return_consumed_capacity)
            .set_return_item_collection_metrics(opts.return_item_collection_metrics)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, Some(&params.table_name)))?;

        Ok(ItemOutput {
            consumed_capacity: capacity_units(output.consumed_capacity()),
            item: output.attributes,
        })
    }

    async fn delete_item(&self, params: DeleteItemParams) -> Result<ItemOutput, TransportError> {
        let opts = params.options;
        let output = self
            .client
            .delete_item()
            .table_name(&params.table_name)
            .set_key(Some(params.key))
            .set_expected(to_sdk_expected(params.expected))
            .set_return_values(opts.return_values)
            .set_return_consumed_capacity(opts.return_consumed_capacity)
            .set_return_item_collection_metrics(opts.return_item_collection_metrics)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, Some(&params.table_name)))?;

        Ok(ItemOutput {
            consumed_capacity: capacity_units(output.consumed_capacity()),
            item: output.attributes,
        })
    }

    async fn query(&self, params: QueryParams) -> Result<PageOutput, TransportError> {
        let opts = params.options;
        let output = self
            .client
            .query()
            .table_name(&params.table_name)
            .set_key_conditions(to_sdk_conditions(Some(params.key_conditions))?)
            .set_query_filter(to_sdk_conditions(params.query_filter)?)
            .set_index_name(opts.index_name)
            .set_scan_index_forward(opts.scan_index_forward)
            .set_limit(opts.limit)
            .set_select(opts.select)
            .set_attributes_to_get(opts.attributes_to_get)
            .set_consistent_read(opts.consistent_read)
            .set_return_consumed_capacity(opts.return_consumed_capacity)
            .set_exclusive_start_key(opts.exclusive_start_key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, Some(&params.table_name)))?;

        Ok(PageOutput {
            consumed_capacity: capacity_units(output.consumed_capacity()),
            count: output.count,
            items: output.items.unwrap_or_default(),
            last_evaluated_key: output.last_evaluated_key,
        })
    }

    async fn scan(&self, params: ScanParams) -> Result<PageOutput, TransportError> {
        let opts = params.options;
        let output = self
            .client
            .scan()
            .table_name(&params.table_name)
            .set_scan_filter(to_sdk_conditions(params.scan_filter)?)
            .set_index_name(opts.index_name)
            .set_limit(opts.limit)
            .set_select(opts.select)
            .set_attributes_to_get(opts.attributes_to_get)
            .set_consistent_read(opts.consistent_read)
            .set_return_consumed_capacity(opts.return_consumed_capacity)
            .set_exclusive_start_key(opts.exclusive_start_key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, Some(&params.table_name)))?;

        Ok(PageOutput {
            consumed_capacity: capacity_units(output.consumed_capacity()),
            count: output.count,
            items: output.items.unwrap_or_default(),
            last_evaluated_key: output.last_evaluated_key,
        })
    }

    async fn describe_table(&self, table_name: &str) -> Result<TableDescription, TransportError> {
        let output = self
            .client
            .describe_table()
            .table_name(table_name)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, Some(table_name)))?;
        from_sdk_description(table_name, output.table)
    }

    async fn create_table(
        &self,
        params: CreateTableParams,
    ) -> Result<TableDescription, TransportError> {
        let key_schema = params
            .key_schema
            .into_iter()
            .map(|(name, key_type)| {
                KeySchemaElement::builder()
                    .attribute_name(name)
                    .key_type(key_type)
                    .build()
                    .map_err(|e| build_error("key schema", e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let definitions = params
            .attribute_definitions
            .into_iter()
            .map(|(name, attribute_type)| {
                AttributeDefinition::builder()
                    .attribute_name(name)
                    .attribute_type(attribute_type)
                    .build()
                    .map_err(|e| build_error("attribute definition", e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let output = self
            .client
            .create_table()
            .table_name(&params.table_name)
            .set_key_schema(Some(key_schema))
            .set_attribute_definitions(Some(definitions))
            .provisioned_throughput(to_sdk_throughput(params.throughput)?)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, Some(&params.table_name)))?;
        from_sdk_description(&params.table_name, output.table_description)
    }

    async fn update_table(
        &self,
        params: UpdateTableParams,
    ) -> Result<TableDescription, TransportError> {
        let output = self
            .client
            .update_table()
            .table_name(&params.table_name)
            .provisioned_throughput(to_sdk_throughput(params.throughput)?)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, Some(&params.table_name)))?;
        from_sdk_description(&params.table_name, output.table_description)
    }

    async fn delete_table(&self, table_name: &str) -> Result<TableDescription, TransportError> {
        let output = self
            .client
            .delete_table()
            .table_name(table_name)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, Some(table_name)))?;
        from_sdk_description(table_name, output.table_description)
    }
}
