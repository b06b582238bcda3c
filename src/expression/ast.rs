//! Tagged expression types.

use aws_sdk_dynamodb::types::{AttributeAction, ComparisonOperator};

use crate::value::Value;

/// Portable comparison shorthands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shorthand {
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    BeginsWith,
    Between,
    In,
}

impl Shorthand {
    /// Parse a `$`-prefixed shorthand keyword.
    pub fn parse(keyword: &str) -> Option<Shorthand> {
        match keyword {
            "$gt" => Some(Shorthand::GreaterThan),
            "$gte" => Some(Shorthand::GreaterOrEqual),
            "$lt" => Some(Shorthand::LessThan),
            "$lte" => Some(Shorthand::LessOrEqual),
            "$begins" => Some(Shorthand::BeginsWith),
            "$between" => Some(Shorthand::Between),
            "$in" => Some(Shorthand::In),
            _ => None,
        }
    }

    pub fn operator(&self) -> ComparisonOperator {
        match self {
            Shorthand::GreaterThan => ComparisonOperator::Gt,
            Shorthand::GreaterOrEqual => ComparisonOperator::Ge,
            Shorthand::LessThan => ComparisonOperator::Lt,
            Shorthand::LessOrEqual => ComparisonOperator::Le,
            Shorthand::BeginsWith => ComparisonOperator::BeginsWith,
            Shorthand::Between => ComparisonOperator::Between,
            Shorthand::In => ComparisonOperator::In,
        }
    }
}

/// One field's condition.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionExpr {
    Equals(Value),
    Shorthand(Shorthand, Value),
    Native(ComparisonOperator, Value),
}

/// Ordered field conditions, used for key conditions and filters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions {
    entries: Vec<(String, ConditionExpr)>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, expr: ConditionExpr) -> Self {
        self.entries.push((field.into(), expr));
        self
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, ConditionExpr::Equals(value.into()))
    }

    fn shorthand(self, field: impl Into<String>, op: Shorthand, value: Value) -> Self {
        self.with(field, ConditionExpr::Shorthand(op, value))
    }

    pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.shorthand(field, Shorthand::GreaterThan, value.into())
    }

    pub fn gte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.shorthand(field, Shorthand::GreaterOrEqual, value.into())
    }

    pub fn lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.shorthand(field, Shorthand::LessThan, value.into())
    }

    pub fn lte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.shorthand(field, Shorthand::LessOrEqual, value.into())
    }

    pub fn begins_with(self, field: impl Into<String>, prefix: impl Into<Value>) -> Self {
        self.shorthand(field, Shorthand::BeginsWith, prefix.into())
    }

    pub fn between(
        self,
        field: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.shorthand(field, Shorthand::Between, Value::List(vec![low.into(), high.into()]))
    }

    pub fn is_in<I, V>(self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let list = values.into_iter().map(Into::into).collect();
        self.shorthand(field, Shorthand::In, Value::List(list))
    }

    pub fn native(
        self,
        field: impl Into<String>,
        operator: ComparisonOperator,
        value: impl Into<Value>,
    ) -> Self {
        self.with(field, ConditionExpr::Native(operator, value.into()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConditionExpr)> {
        self.entries.iter().map(|(f, e)| (f.as_str(), e))
    }
}

/// Portable update markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateShorthand {
    Set,
    Unset,
    Increment,
}

impl UpdateShorthand {
    pub fn parse(keyword: &str) -> Option<UpdateShorthand> {
        match keyword {
            "$set" => Some(UpdateShorthand::Set),
            "$unset" => Some(UpdateShorthand::Unset),
            "$inc" | "$increment" => Some(UpdateShorthand::Increment),
            _ => None,
        }
    }

    pub fn action(&self) -> AttributeAction {
        match self {
            UpdateShorthand::Set => AttributeAction::Put,
            UpdateShorthand::Unset => AttributeAction::Delete,
            UpdateShorthand::Increment => AttributeAction::Add,
        }
    }
}

/// One top-level update entry.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateExpr {
    /// `{"$set": {field: value, ...}}` and friends.
    Shorthand(UpdateShorthand, Vec<(String, Value)>),
    /// `{field: {"ADD": value}}`. A `Null` value sends no value.
    Native {
        field: String,
        action: AttributeAction,
        value: Value,
    },
    /// `{field: value}`, compiled as a put.
    Assign { field: String, value: Value },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Updates {
    entries: Vec<UpdateExpr>,
}

impl Updates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, expr: UpdateExpr) -> Self {
        self.entries.push(expr);
        self
    }

    fn shorthand(self, op: UpdateShorthand, field: impl Into<String>, value: Value) -> Self {
        self.with(UpdateExpr::Shorthand(op, vec![(field.into(), value)]))
    }

    pub fn set(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.shorthand(UpdateShorthand::Set, field, value.into())
    }

    pub fn unset(self, field: impl Into<String>) -> Self {
        self.shorthand(UpdateShorthand::Unset, field, Value::Null)
    }

    pub fn increment(self, field: impl Into<String>, by: impl Into<Value>) -> Self {
        self.shorthand(UpdateShorthand::Increment, field, by.into())
    }

    pub fn assign(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(UpdateExpr::Assign {
            field: field.into(),
            value: value.into(),
        })
    }

    pub fn native(
        self,
        field: impl Into<String>,
        action: AttributeAction,
        value: impl Into<Value>,
    ) -> Self {
        self.with(UpdateExpr::Native {
            field: field.into(),
            action,
            value: value.into(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UpdateExpr> {
        self.entries.iter()
    }
}

/// One field's expectation for a conditional write.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpectExpr {
    Exists(bool),
    Equals(Value),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expectations {
    entries: Vec<(String, ExpectExpr)>,
}

impl Expectations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, expr: ExpectExpr) -> Self {
        self.entries.push((field.into(), expr));
        self
    }

    pub fn exists(self, field: impl Into<String>) -> Self {
        self.with(field, ExpectExpr::Exists(true))
    }

    pub fn not_exists(self, field: impl Into<String>) -> Self {
        self.with(field, ExpectExpr::Exists(false))
    }

    pub fn equals(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, ExpectExpr::Equals(value.into()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExpectExpr)> {
        self.entries.iter().map(|(f, e)| (f.as_str(), e))
    }
}
