//! Parse caller-supplied JSON expressions into tagged expression types.
//!
//! A single-key object names an operator; anything else is an operand.
//! Keywords starting with `$` are portable shorthands, other keywords are
//! native backend keywords checked against the operators the backend knows.

use aws_sdk_dynamodb::types::{AttributeAction, ComparisonOperator};
use serde_json::{Map, Value as JsonValue};

use super::ast::{
    ConditionExpr, Conditions, ExpectExpr, Expectations, Shorthand, UpdateExpr, UpdateShorthand,
    Updates,
};
use crate::errors::{Error, Result};
use crate::value::Value;

/// Marker key for existence expectations.
pub const EXISTS_MARKER: &str = "$exists";

fn as_object<'a>(json: &'a JsonValue, what: &str) -> Result<&'a Map<String, JsonValue>> {
    json.as_object()
        .ok_or_else(|| Error::validation(format!("{} must be a JSON object", what)))
}

/// The only entry of a single-key object, if it is one.
fn single_entry(json: &JsonValue) -> Option<(&String, &JsonValue)> {
    match json {
        JsonValue::Object(map) if map.len() == 1 => map.iter().next(),
        _ => None,
    }
}

fn parse_native_operator(keyword: &str) -> Result<ComparisonOperator> {
    if ComparisonOperator::values().iter().any(|known| *known == keyword) {
        Ok(ComparisonOperator::from(keyword))
    } else {
        Err(Error::UnsupportedOperator(keyword.to_string()))
    }
}

fn parse_native_action(keyword: &str) -> Result<AttributeAction> {
    if AttributeAction::values().iter().any(|known| *known == keyword) {
        Ok(AttributeAction::from(keyword))
    } else {
        Err(Error::UnsupportedOperator(keyword.to_string()))
    }
}

/// Parse `{field: operand | {operator: operand}}`.
pub fn parse_conditions(json: &JsonValue) -> Result<Conditions> {
    let object = as_object(json, "conditions")?;
    let mut conditions = Conditions::new();
    for (field, raw) in object {
        let expr = match single_entry(raw) {
            Some((keyword, operand)) if keyword.starts_with('$') => {
                let op = Shorthand::parse(keyword)
                    .ok_or_else(|| Error::UnsupportedOperator(keyword.clone()))?;
                ConditionExpr::Shorthand(op, Value::from_json(operand))
            }
            Some((keyword, operand)) => {
                ConditionExpr::Native(parse_native_operator(keyword)?, Value::from_json(operand))
            }
            None => ConditionExpr::Equals(Value::from_json(raw)),
        };
        conditions = conditions.with(field.clone(), expr);
    }
    Ok(conditions)
}

/// Parse `{"$set": {field: value}, field: value, field: {ACTION: value}}`.
///
/// Field mappings must have exactly one key; ambiguous mappings are rejected.
pub fn parse_updates(json: &JsonValue) -> Result<Updates> {
    let object = as_object(json, "updates")?;
    let mut updates = Updates::new();
    for (key, raw) in object {
        if key.starts_with('$') {
            let op = UpdateShorthand::parse(key)
                .ok_or_else(|| Error::UnsupportedOperator(key.clone()))?;
            let nested = as_object(raw, &format!("operand of \"{}\"", key))?;
            let fields = nested
                .iter()
                .map(|(field, value)| (field.clone(), Value::from_json(value)))
                .collect();
            updates = updates.with(UpdateExpr::Shorthand(op, fields));
            continue;
        }

        let expr = match raw {
            JsonValue::Object(map) => {
                let Some((action, operand)) = single_entry(raw) else {
                    return Err(Error::validation(format!(
                        "update for field \"{}\" must have exactly one action, got {}",
                        key,
                        map.len()
                    )));
                };
                UpdateExpr::Native {
                    field: key.clone(),
                    action: parse_native_action(action)?,
                    value: Value::from_json(operand),
                }
            }
            other => UpdateExpr::Assign {
                field: key.clone(),
                value: Value::from_json(other),
            },
        };
        updates = updates.with(expr);
    }
    Ok(updates)
}

/// Parse `{field: value | {"$exists": bool}}`.
pub fn parse_expectations(json: &JsonValue) -> Result<Expectations> {
    let object = as_object(json, "expectations")?;
    let mut expectations = Expectations::new();
    for (field, raw) in object {
        let expr = match raw {
            JsonValue::Object(map) => {
                let Some((keyword, operand)) = single_entry(raw) else {
                    return Err(Error::validation(format!(
                        "expectation for field \"{}\" must have exactly one key, got {}",
                        field,
                        map.len()
                    )));
                };
                if keyword != EXISTS_MARKER {
                    return Err(Error::UnsupportedOperator(keyword.clone()));
                }
                let exists = operand.as_bool().ok_or_else(|| {
                    Error::validation(format!("\"{}\" expects true or false", EXISTS_MARKER))
                })?;
                ExpectExpr::Exists(exists)
            }
            other => ExpectExpr::Equals(Value::from_json(other)),
        };
        expectations = expectations.with(field.clone(), expr);
    }
    Ok(expectations)
}
