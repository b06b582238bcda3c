//! Compile tagged expressions into wire operator structures.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use aws_sdk_dynamodb::types::{AttributeAction, AttributeValue, ComparisonOperator};

use super::ast::{ConditionExpr, Conditions, ExpectExpr, Expectations, UpdateExpr, Updates};
use crate::errors::{Error, Result};
use crate::schema::Schema;
use crate::transport::{
    WireCondition, WireConditionMap, WireExpectation, WireExpectationMap, WireUpdate,
    WireUpdateMap,
};
use crate::value::Value;

/// Encodes operands through a schema while translating operators.
#[derive(Debug, Clone, Copy)]
pub struct OperatorCompiler<'a> {
    schema: &'a Schema,
}

impl<'a> OperatorCompiler<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        OperatorCompiler { schema }
    }

    fn encode(&self, field: &str, value: &Value) -> Result<AttributeValue> {
        self.schema
            .field_type(field)?
            .encode(value)
            .map_err(|e| match e {
                Error::Validation(msg) => {
                    Error::Validation(format!("field \"{}\": {}", field, msg))
                }
                other => other,
            })
    }

    pub fn compile_conditions(&self, conditions: &Conditions) -> Result<WireConditionMap> {
        let mut compiled = WireConditionMap::new();
        for (field, expr) in conditions.iter() {
            // Unknown fields fail before operand checks.
            self.schema.field_type(field)?;

            let (operator, operand) = match expr {
                ConditionExpr::Equals(value) => (ComparisonOperator::Eq, value),
                ConditionExpr::Shorthand(op, value) => (op.operator(), value),
                ConditionExpr::Native(op, value) => (op.clone(), value),
            };
            let values = self.compile_operands(field, &operator, operand)?;
            insert_once(&mut compiled, field, WireCondition { operator, values })?;
        }
        Ok(compiled)
    }

    fn compile_operands(
        &self,
        field: &str,
        operator: &ComparisonOperator,
        operand: &Value,
    ) -> Result<Vec<AttributeValue>> {
        match (operator, operand) {
            (ComparisonOperator::Between, Value::List(items)) if items.len() == 2 => items
                .iter()
                .map(|item| self.encode(field, item))
                .collect(),
            (ComparisonOperator::Between, _) => Err(Error::validation(format!(
                "BETWEEN operator on \"{}\" must have an array of two elements as the comparison value",
                field
            ))),
            (ComparisonOperator::In, Value::List(items)) => items
                .iter()
                .map(|item| self.encode(field, item))
                .collect(),
            (ComparisonOperator::In, _) => Err(Error::validation(format!(
                "IN operator on \"{}\" must have an array as the comparison value",
                field
            ))),
            (ComparisonOperator::Null | ComparisonOperator::NotNull, _) => Ok(Vec::new()),
            (op, Value::List(_)) => Err(Error::validation(format!(
                "{} operator on \"{}\" does not support array values",
                op.as_str(),
                field
            ))),
            (_, value) => Ok(vec![self.encode(field, value)?]),
        }
    }

    pub fn compile_updates(&self, updates: &Updates) -> Result<WireUpdateMap> {
        let mut compiled = WireUpdateMap::new();
        for expr in updates.iter() {
            match expr {
                UpdateExpr::Shorthand(op, fields) => {
                    let action = op.action();
                    for (field, value) in fields {
                        self.schema.field_type(field)?;
                        let value = match action {
                            AttributeAction::Delete => None,
                            _ => Some(self.encode(field, value)?),
                        };
                        insert_once(
                            &mut compiled,
                            field,
                            WireUpdate {
                                action: action.clone(),
                                value,
                            },
                        )?;
                    }
                }
                UpdateExpr::Native {
                    field,
                    action,
                    value,
                } => {
                    self.schema.field_type(field)?;
                    let value = match value {
                        Value::Null => None,
                        value => Some(self.encode(field, value)?),
                    };
                    insert_once(
                        &mut compiled,
                        field,
                        WireUpdate {
                            action: action.clone(),
                            value,
                        },
                    )?;
                }
                UpdateExpr::Assign { field, value } => {
                    let value = self.encode(field, value)?;
                    insert_once(
                        &mut compiled,
                        field,
                        WireUpdate {
                            action: AttributeAction::Put,
                            value: Some(value),
                        },
                    )?;
                }
            }
        }
        Ok(compiled)
    }

    pub fn compile_expectations(
        &self,
        expectations: Option<&Expectations>,
    ) -> Result<Option<WireExpectationMap>> {
        let Some(expectations) = expectations else {
            return Ok(None);
        };
        let mut compiled = WireExpectationMap::new();
        for (field, expr) in expectations.iter() {
            let expectation = match expr {
                ExpectExpr::Exists(exists) => {
                    self.schema.field_type(field)?;
                    WireExpectation {
                        exists: Some(*exists),
                        value: None,
                    }
                }
                ExpectExpr::Equals(value) => WireExpectation {
                    exists: None,
                    value: Some(self.encode(field, value)?),
                },
            };
            insert_once(&mut compiled, field, expectation)?;
        }
        Ok(Some(compiled))
    }
}

/// The wire maps hold one entry per attribute, so a second entry for a field
/// is rejected rather than replacing the first.
fn insert_once<T>(compiled: &mut HashMap<String, T>, field: &str, entry: T) -> Result<()> {
    match compiled.entry(field.to_string()) {
        Entry::Occupied(_) => Err(Error::validation(format!(
            "field \"{}\" appears more than once",
            field
        ))),
        Entry::Vacant(slot) => {
            slot.insert(entry);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversions::TypeTag;
    use crate::expression::parser::{parse_conditions, parse_expectations, parse_updates};
    use crate::schema::FieldSpec;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new([
            ("id", FieldSpec::text().hash_key()),
            ("age", FieldSpec::number().range_key()),
            ("name", FieldSpec::text()),
            ("counter", FieldSpec::number()),
            ("tags", FieldSpec::set_of(TypeTag::Text)),
        ])
        .unwrap()
    }

    fn n(v: &str) -> AttributeValue {
        AttributeValue::N(v.into())
    }

    fn s(v: &str) -> AttributeValue {
        AttributeValue::S(v.into())
    }

    #[test]
    fn test_should_default_to_equal_with_single_operand() {
        let schema = schema();
        let compiled = OperatorCompiler::new(&schema)
            .compile_conditions(&Conditions::new().eq("id", "a"))
            .unwrap();
        assert_eq!(
            compiled["id"],
            WireCondition {
                operator: ComparisonOperator::Eq,
                values: vec![s("a")]
            }
        );
    }

    #[test]
    fn test_should_compile_between_into_two_operands() {
        let schema = schema();
        let compiled = OperatorCompiler::new(&schema)
            .compile_conditions(&parse_conditions(&json!({"age": {"$between": [1, 5]}})).unwrap())
            .unwrap();
        assert_eq!(
            compiled["age"],
            WireCondition {
                operator: ComparisonOperator::Between,
                values: vec![n("1"), n("5")]
            }
        );
    }

    #[test]
    fn test_should_reject_between_without_two_elements() {
        let schema = schema();
        let compiler = OperatorCompiler::new(&schema);
        for operand in [json!([1]), json!([1, 2, 3]), json!(4)] {
            let conditions = parse_conditions(&json!({"age": {"$between": operand}})).unwrap();
            assert!(matches!(
                compiler.compile_conditions(&conditions),
                Err(Error::Validation(_))
            ));
        }
    }

    #[test]
    fn test_should_compile_in_with_each_operand_encoded() {
        let schema = schema();
        let compiled = OperatorCompiler::new(&schema)
            .compile_conditions(&Conditions::new().is_in("name", ["a", "b", "c"]))
            .unwrap();
        assert_eq!(compiled["name"].operator, ComparisonOperator::In);
        assert_eq!(compiled["name"].values, vec![s("a"), s("b"), s("c")]);
    }

    #[test]
    fn test_should_reject_sequences_for_scalar_operators() {
        let schema = schema();
        let conditions = parse_conditions(&json!({"age": {"$gt": [1, 2]}})).unwrap();
        assert!(matches!(
            OperatorCompiler::new(&schema).compile_conditions(&conditions),
            Err(Error::Validation(_))
        ));
        let conditions = parse_conditions(&json!({"name": {"$in": "a"}})).unwrap();
        assert!(matches!(
            OperatorCompiler::new(&schema).compile_conditions(&conditions),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_should_map_shorthands_to_native_operators() {
        let schema = schema();
        let conditions = parse_conditions(&json!({
            "age": {"$gte": 3},
            "name": {"$begins": "jo"},
            "counter": {"$lt": 0}
        }))
        .unwrap();
        let compiled = OperatorCompiler::new(&schema).compile_conditions(&conditions).unwrap();
        assert_eq!(compiled["age"].operator, ComparisonOperator::Ge);
        assert_eq!(compiled["name"].operator, ComparisonOperator::BeginsWith);
        assert_eq!(compiled["counter"].operator, ComparisonOperator::Lt);
        assert_eq!(compiled["counter"].values, vec![n("0")]);
    }

    #[test]
    fn test_should_send_no_operands_for_null_checks() {
        let schema = schema();
        let conditions = parse_conditions(&json!({"name": {"NOT_NULL": true}})).unwrap();
        let compiled = OperatorCompiler::new(&schema).compile_conditions(&conditions).unwrap();
        assert!(compiled["name"].values.is_empty());
    }

    #[test]
    fn test_should_reject_conditions_on_unknown_fields() {
        let schema = schema();
        let err = OperatorCompiler::new(&schema)
            .compile_conditions(&Conditions::new().eq("ghost", 1))
            .unwrap_err();
        assert_eq!(err, Error::UnknownField("ghost".into()));
    }

    #[test]
    fn test_should_compile_increment_and_unset() {
        let schema = schema();
        let compiler = OperatorCompiler::new(&schema);
        let compiled = compiler
            .compile_updates(&parse_updates(&json!({"$inc": {"counter": 1}})).unwrap())
            .unwrap();
        assert_eq!(
            compiled["counter"],
            WireUpdate {
                action: AttributeAction::Add,
                value: Some(n("1"))
            }
        );

        let compiled = compiler
            .compile_updates(&parse_updates(&json!({"$unset": {"counter": true}})).unwrap())
            .unwrap();
        assert_eq!(
            compiled["counter"],
            WireUpdate {
                action: AttributeAction::Delete,
                value: None
            }
        );
    }

    #[test]
    fn test_should_compile_direct_updates() {
        let schema = schema();
        let updates = parse_updates(&json!({"name": "x", "tags": {"ADD": ["a", "b"]}})).unwrap();
        let compiled = OperatorCompiler::new(&schema).compile_updates(&updates).unwrap();
        assert_eq!(
            compiled["name"],
            WireUpdate {
                action: AttributeAction::Put,
                value: Some(s("x"))
            }
        );
        assert_eq!(
            compiled["tags"],
            WireUpdate {
                action: AttributeAction::Add,
                value: Some(AttributeValue::Ss(vec!["a".into(), "b".into()]))
            }
        );
    }

    #[test]
    fn test_should_reject_updates_on_unknown_fields() {
        let schema = schema();
        let compiler = OperatorCompiler::new(&schema);
        let err = compiler
            .compile_updates(&Updates::new().set("ghost", 1))
            .unwrap_err();
        assert_eq!(err, Error::UnknownField("ghost".into()));
        let err = compiler
            .compile_updates(&Updates::new().assign("ghost", 1))
            .unwrap_err();
        assert_eq!(err, Error::UnknownField("ghost".into()));
    }

    #[test]
    fn test_should_accept_zero_and_empty_updates() {
        let schema = schema();
        let compiled = OperatorCompiler::new(&schema)
            .compile_updates(&Updates::new().set("counter", 0).set("name", ""))
            .unwrap();
        assert_eq!(compiled["counter"].value, Some(n("0")));
        assert_eq!(compiled["name"].value, Some(s("")));
    }

    #[test]
    fn test_should_compile_expectations() {
        let schema = schema();
        let compiler = OperatorCompiler::new(&schema);
        assert_eq!(compiler.compile_expectations(None).unwrap(), None);

        let expectations = parse_expectations(&json!({
            "id": {"$exists": false},
            "counter": 2
        }))
        .unwrap();
        let compiled = compiler
            .compile_expectations(Some(&expectations))
            .unwrap()
            .unwrap();
        assert_eq!(
            compiled["id"],
            WireExpectation {
                exists: Some(false),
                value: None
            }
        );
        assert_eq!(
            compiled["counter"],
            WireExpectation {
                exists: None,
                value: Some(n("2"))
            }
        );
    }

    #[test]
    fn test_should_reject_repeated_condition_fields() {
        let schema = schema();
        let conditions = Conditions::new().eq("id", "a").gte("age", 2).lte("age", 4);
        let err = OperatorCompiler::new(&schema)
            .compile_conditions(&conditions)
            .unwrap_err();
        assert_eq!(
            err,
            Error::Validation("field \"age\" appears more than once".into())
        );
    }

    #[test]
    fn test_should_reject_repeated_update_fields() {
        let schema = schema();
        let compiler = OperatorCompiler::new(&schema);
        let err = compiler
            .compile_updates(&Updates::new().set("counter", 1).increment("counter", 2))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(msg) if msg.contains("counter")));

        let updates = parse_updates(&json!({"$set": {"name": "a"}, "name": "b"})).unwrap();
        assert!(matches!(
            compiler.compile_updates(&updates),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_should_reject_repeated_expectation_fields() {
        let schema = schema();
        let expectations = Expectations::new().exists("counter").equals("counter", 1);
        assert!(matches!(
            OperatorCompiler::new(&schema).compile_expectations(Some(&expectations)),
            Err(Error::Validation(_))
        ));
    }
}
