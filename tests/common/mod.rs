//! In-memory transport shared by the integration tests.
//!
//! Implements enough of DynamoDB's legacy-parameter semantics to exercise the
//! mapper end to end: table lifecycle with a configurable number of CREATING
//! polls, item writes with expectations and attribute updates, and query/scan
//! pagination through `Limit` and `ExclusiveStartKey`.

#![allow(dead_code)]

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{
    AttributeAction, AttributeValue, ComparisonOperator, KeyType, ReturnValue, Select, TableStatus,
};
use dynomodel::TransportError;
use dynomodel::transport::{
    CreateTableParams, DeleteItemParams, GetItemParams, ItemOutput, PageOutput, PutItemParams,
    QueryParams, ScanParams, TableDescription, Throughput, Transport, UpdateItemParams,
    UpdateTableParams, WireCondition, WireConditionMap, WireExpectationMap,
};
use dynomodel::value::WireDocument;

struct MemoryTable {
    key_names: Vec<String>,
    range_key: Option<String>,
    creating_polls_left: usize,
    throughput: Throughput,
    items: Vec<WireDocument>,
}

impl MemoryTable {
    fn status(&self) -> TableStatus {
        if self.creating_polls_left > 0 {
            TableStatus::Creating
        } else {
            TableStatus::Active
        }
    }

    fn describe(&self, name: &str) -> TableDescription {
        TableDescription {
            table_name: name.to_string(),
            status: self.status(),
            item_count: Some(self.items.len() as i64),
            throughput: Some(self.throughput),
        }
    }

    fn key_of(&self, item: &WireDocument) -> WireDocument {
        self.key_names
            .iter()
            .filter_map(|k| item.get(k).map(|v| (k.clone(), v.clone())))
            .collect()
    }

    fn position(&self, key: &WireDocument) -> Option<usize> {
        self.items.iter().position(|item| &self.key_of(item) == key)
    }
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<String, MemoryTable>,
    describe_failure: Option<TransportError>,
    last_get: Option<GetItemParams>,
    last_query: Option<QueryParams>,
    last_scan: Option<ScanParams>,
}

/// A [`Transport`] backed by in-process tables.
#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
    creating_polls: usize,
    describe_delay: Option<Duration>,
    pub describe_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub item_calls: AtomicUsize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables created through the transport report CREATING for `polls` describes.
    pub fn with_creating_polls(mut self, polls: usize) -> Self {
        self.creating_polls = polls;
        self
    }

    /// Delay every describe call, so concurrent callers overlap.
    pub fn with_describe_delay(mut self, delay: Duration) -> Self {
        self.describe_delay = Some(delay);
        self
    }

    /// Register an already-active table.
    pub fn with_table(self, name: &str, hash_key: &str, range_key: Option<&str>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let mut key_names = vec![hash_key.to_string()];
            key_names.extend(range_key.map(str::to_string));
            state.tables.insert(
                name.to_string(),
                MemoryTable {
                    key_names,
                    range_key: range_key.map(str::to_string),
                    creating_polls_left: 0,
                    throughput: Throughput::default(),
                    items: Vec::new(),
                },
            );
        }
        self
    }

    /// Make every describe call fail with `err`.
    pub fn fail_describe(&self, err: TransportError) {
        self.state.lock().unwrap().describe_failure = Some(err);
    }

    pub fn describes(&self) -> usize {
        self.describe_calls.load(AtomicOrdering::SeqCst)
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(AtomicOrdering::SeqCst)
    }

    pub fn item_requests(&self) -> usize {
        self.item_calls.load(AtomicOrdering::SeqCst)
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.state.lock().unwrap().tables.contains_key(name)
    }

    pub fn items(&self, table: &str) -> Vec<WireDocument> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .map(|t| t.items.clone())
            .unwrap_or_default()
    }

    pub fn last_get(&self) -> Option<GetItemParams> {
        self.state.lock().unwrap().last_get.clone()
    }

    pub fn last_query(&self) -> Option<QueryParams> {
        self.state.lock().unwrap().last_query.clone()
    }

    pub fn last_scan(&self) -> Option<ScanParams> {
        self.state.lock().unwrap().last_scan.clone()
    }

    fn with_table_mut<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut MemoryTable) -> Result<T, TransportError>,
    ) -> Result<T, TransportError> {
        self.item_calls.fetch_add(1, AtomicOrdering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let table = state
            .tables
            .get_mut(name)
            .ok_or_else(|| TransportError::NotFound(format!("table '{}' not found", name)))?;
        f(table)
    }
}

pub fn s(v: &str) -> AttributeValue {
    AttributeValue::S(v.to_string())
}

pub fn n(v: &str) -> AttributeValue {
    AttributeValue::N(v.to_string())
}

fn compare(a: &AttributeValue, b: &AttributeValue) -> Option<Ordering> {
    match (a, b) {
        (AttributeValue::S(a), AttributeValue::S(b)) => Some(a.cmp(b)),
        (AttributeValue::N(a), AttributeValue::N(b)) => {
            a.parse::<f64>().ok()?.partial_cmp(&b.parse::<f64>().ok()?)
        }
        (AttributeValue::B(a), AttributeValue::B(b)) => Some(a.as_ref().cmp(b.as_ref())),
        _ => None,
    }
}

fn condition_matches(actual: Option<&AttributeValue>, condition: &WireCondition) -> bool {
    let first = condition.values.first();
    let cmp = || match (actual, first) {
        (Some(a), Some(b)) => compare(a, b),
        _ => None,
    };
    match condition.operator {
        ComparisonOperator::Eq => actual.is_some() && actual == first,
        ComparisonOperator::Ne => actual != first,
        ComparisonOperator::Lt => cmp() == Some(Ordering::Less),
        ComparisonOperator::Le => matches!(cmp(), Some(Ordering::Less | Ordering::Equal)),
        ComparisonOperator::Gt => cmp() == Some(Ordering::Greater),
        ComparisonOperator::Ge => matches!(cmp(), Some(Ordering::Greater | Ordering::Equal)),
        ComparisonOperator::BeginsWith => match (actual, first) {
            (Some(AttributeValue::S(a)), Some(AttributeValue::S(p))) => a.starts_with(p.as_str()),
            _ => false,
        },
        ComparisonOperator::Between => match (actual, condition.values.as_slice()) {
            (Some(a), [low, high]) => {
                matches!(compare(a, low), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(compare(a, high), Some(Ordering::Less | Ordering::Equal))
            }
            _ => false,
        },
        ComparisonOperator::In => actual.is_some_and(|a| condition.values.contains(a)),
        ComparisonOperator::Null => actual.is_none(),
        ComparisonOperator::NotNull => actual.is_some(),
        _ => false,
    }
}

fn all_match(item: &WireDocument, conditions: Option<&WireConditionMap>) -> bool {
    conditions.is_none_or(|conds| {
        conds
            .iter()
            .all(|(field, cond)| condition_matches(item.get(field), cond))
    })
}

fn check_expected(
    current: Option<&WireDocument>,
    expected: Option<&WireExpectationMap>,
) -> Result<(), TransportError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    for (field, expectation) in expected {
        let actual = current.and_then(|item| item.get(field));
        let ok = match (&expectation.value, expectation.exists) {
            (Some(value), _) => actual == Some(value),
            (None, Some(exists)) => actual.is_some() == exists,
            (None, None) => true,
        };
        if !ok {
            return Err(TransportError::Service {
                code: "ConditionalCheckFailedException".to_string(),
                message: "The conditional request failed".to_string(),
            });
        }
    }
    Ok(())
}

fn add_values(
    current: Option<&AttributeValue>,
    delta: &AttributeValue,
) -> Result<AttributeValue, TransportError> {
    match (current, delta) {
        (None, v) => Ok(v.clone()),
        (Some(AttributeValue::N(a)), AttributeValue::N(b)) => {
            match (a.parse::<i64>(), b.parse::<i64>()) {
                (Ok(a), Ok(b)) => Ok(AttributeValue::N((a + b).to_string())),
                _ => {
                    let a: f64 = a.parse().unwrap_or_default();
                    let b: f64 = b.parse().unwrap_or_default();
                    Ok(AttributeValue::N((a + b).to_string()))
                }
            }
        }
        (Some(AttributeValue::Ss(a)), AttributeValue::Ss(b)) => {
            let mut merged = a.clone();
            merged.extend(b.iter().filter(|v| !a.contains(v)).cloned());
            Ok(AttributeValue::Ss(merged))
        }
        _ => Err(TransportError::Service {
            code: "ValidationException".to_string(),
            message: "type mismatch for ADD".to_string(),
        }),
    }
}

fn page(
    table: &MemoryTable,
    mut items: Vec<WireDocument>,
    options: &dynomodel::transport::RequestOptions,
) -> PageOutput {
    if let Some(start) = &options.exclusive_start_key {
        if let Some(pos) = items.iter().position(|item| &table.key_of(item) == start) {
            items.drain(..=pos);
        }
    }
    let mut last_evaluated_key = None;
    if let Some(limit) = options.limit.and_then(|l| usize::try_from(l).ok()) {
        if items.len() > limit {
            items.truncate(limit);
            last_evaluated_key = items.last().map(|item| table.key_of(item));
        }
    }
    let count = items.len() as i32;
    if options.select == Some(Select::Count) {
        items.clear();
    } else if let Some(attributes) = &options.attributes_to_get {
        for item in &mut items {
            item.retain(|k, _| attributes.contains(k));
        }
    }
    PageOutput {
        items,
        count,
        last_evaluated_key,
        consumed_capacity: options.return_consumed_capacity.as_ref().map(|_| 1.0),
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn get_item(&self, params: GetItemParams) -> Result<ItemOutput, TransportError> {
        self.state.lock().unwrap().last_get = Some(params.clone());
        self.with_table_mut(&params.table_name, |table| {
            let item = table.position(&params.key).map(|i| {
                let mut item = table.items[i].clone();
                if let Some(attributes) = &params.options.attributes_to_get {
                    item.retain(|k, _| attributes.contains(k));
                }
                item
            });
            Ok(ItemOutput {
                item,
                consumed_capacity: None,
            })
        })
    }

    async fn put_item(&self, params: PutItemParams) -> Result<ItemOutput, TransportError> {
        self.with_table_mut(&params.table_name, |table| {
            let key = table.key_of(&params.item);
            let existing = table.position(&key);
            check_expected(
                existing.map(|i| &table.items[i]),
                params.expected.as_ref(),
            )?;
            let old = match existing {
                Some(i) => Some(std::mem::replace(&mut table.items[i], params.item.clone())),
                None => {
                    table.items.push(params.item.clone());
                    None
                }
            };
            let item = match params.options.return_values {
                Some(ReturnValue::AllOld) => old,
                _ => None,
            };
            Ok(ItemOutput {
                item,
                consumed_capacity: None,
            })
        })
    }

    async fn update_item(&self, params: UpdateItemParams) -> Result<ItemOutput, TransportError> {
        self.with_table_mut(&params.table_name, |table| {
            let existing = table.position(&params.key);
            check_expected(
                existing.map(|i| &table.items[i]),
                params.expected.as_ref(),
            )?;
            let mut item = existing
                .map(|i| table.items[i].clone())
                .unwrap_or_else(|| params.key.clone());
            for (field, update) in &params.attribute_updates {
                match (&update.action, &update.value) {
                    (AttributeAction::Put, Some(value)) => {
                        item.insert(field.clone(), value.clone());
                    }
                    (AttributeAction::Add, Some(value)) => {
                        let sum = add_values(item.get(field), value)?;
                        item.insert(field.clone(), sum);
                    }
                    (AttributeAction::Delete, _) => {
                        item.remove(field);
                    }
                    _ => {}
                }
            }
            match existing {
                Some(i) => table.items[i] = item.clone(),
                None => table.items.push(item.clone()),
            }
            let item = match params.options.return_values {
                Some(ReturnValue::AllNew) => Some(item),
                _ => None,
            };
            Ok(ItemOutput {
                item,
                consumed_capacity: None,
            })
        })
    }

    async fn delete_item(&self, params: DeleteItemParams) -> Result<ItemOutput, TransportError> {
        self.with_table_mut(&params.table_name, |table| {
            let existing = table.position(&params.key);
            check_expected(
                existing.map(|i| &table.items[i]),
                params.expected.as_ref(),
            )?;
            let old = existing.map(|i| table.items.remove(i));
            let item = match params.options.return_values {
                Some(ReturnValue::AllOld) => old,
                _ => None,
            };
            Ok(ItemOutput {
                item,
                consumed_capacity: None,
            })
        })
    }

    async fn query(&self, params: QueryParams) -> Result<PageOutput, TransportError> {
        self.state.lock().unwrap().last_query = Some(params.clone());
        self.with_table_mut(&params.table_name, |table| {
            let mut items: Vec<WireDocument> = table
                .items
                .iter()
                .filter(|item| all_match(item, Some(&params.key_conditions)))
                .filter(|item| all_match(item, params.query_filter.as_ref()))
                .cloned()
                .collect();
            if let Some(range) = &table.range_key {
                items.sort_by(|a, b| match (a.get(range), b.get(range)) {
                    (Some(a), Some(b)) => compare(a, b).unwrap_or(Ordering::Equal),
                    _ => Ordering::Equal,
                });
            }
            if params.options.scan_index_forward == Some(false) {
                items.reverse();
            }
            Ok(page(table, items, &params.options))
        })
    }

    async fn scan(&self, params: ScanParams) -> Result<PageOutput, TransportError> {
        self.state.lock().unwrap().last_scan = Some(params.clone());
        self.with_table_mut(&params.table_name, |table| {
            let items = table
                .items
                .iter()
                .filter(|item| all_match(item, params.scan_filter.as_ref()))
                .cloned()
                .collect();
            Ok(page(table, items, &params.options))
        })
    }

    async fn describe_table(&self, table_name: &str) -> Result<TableDescription, TransportError> {
        self.describe_calls.fetch_add(1, AtomicOrdering::SeqCst);
        if let Some(delay) = self.describe_delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        if let Some(err) = &state.describe_failure {
            return Err(err.clone());
        }
        let table = state
            .tables
            .get_mut(table_name)
            .ok_or_else(|| TransportError::NotFound(format!("table '{}' not found", table_name)))?;
        let description = table.describe(table_name);
        table.creating_polls_left = table.creating_polls_left.saturating_sub(1);
        Ok(description)
    }

    async fn create_table(
        &self,
        params: CreateTableParams,
    ) -> Result<TableDescription, TransportError> {
        self.create_calls.fetch_add(1, AtomicOrdering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if state.tables.contains_key(&params.table_name) {
            return Err(TransportError::Service {
                code: "ResourceInUseException".to_string(),
                message: format!("table '{}' already exists", params.table_name),
            });
        }
        let range_key = params
            .key_schema
            .iter()
            .find(|(_, kind)| *kind == KeyType::Range)
            .map(|(name, _)| name.clone());
        let table = MemoryTable {
            key_names: params.key_schema.iter().map(|(name, _)| name.clone()).collect(),
            range_key,
            creating_polls_left: self.creating_polls,
            throughput: params.throughput,
            items: Vec::new(),
        };
        let mut description = table.describe(&params.table_name);
        description.status = TableStatus::Creating;
        state.tables.insert(params.table_name, table);
        Ok(description)
    }

    async fn update_table(
        &self,
        params: UpdateTableParams,
    ) -> Result<TableDescription, TransportError> {
        let mut state = self.state.lock().unwrap();
        let table = state.tables.get_mut(&params.table_name).ok_or_else(|| {
            TransportError::NotFound(format!("table '{}' not found", params.table_name))
        })?;
        table.throughput = params.throughput;
        Ok(table.describe(&params.table_name))
    }

    async fn delete_table(&self, table_name: &str) -> Result<TableDescription, TransportError> {
        let mut state = self.state.lock().unwrap();
        let table = state
            .tables
            .remove(table_name)
            .ok_or_else(|| TransportError::NotFound(format!("table '{}' not found", table_name)))?;
        let mut description = table.describe(table_name);
        description.status = TableStatus::Deleting;
        Ok(description)
    }
}
