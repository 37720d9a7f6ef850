//! Field-rule validation of request bodies.
//!
//! A rule set maps a field name to `true` (the field is required) or `false`
//! (the field is forbidden). Rules are checked in field-name order so the
//! reported violation is deterministic.

use crate::error::DispatchError;
use crate::message::Body;
use serde_json::Value;
use std::collections::BTreeMap;

pub type FieldRules = BTreeMap<String, bool>;

/// Builds rules that forbid every listed field.
pub fn forbidden<'a>(fields: impl IntoIterator<Item = &'a str>) -> FieldRules {
    fields.into_iter().map(|f| (f.to_string(), false)).collect()
}

/// Reads rules from interceptor extras, which must be a JSON object of booleans.
pub fn rules_from_value(extras: &Value) -> Result<FieldRules, DispatchError> {
    let Value::Object(map) = extras else {
        return Err(DispatchError::Internal(
            "Input field validator expects 'extras' to be the expected/unexpected field map."
                .into(),
        ));
    };
    map.iter()
        .map(|(field, rule)| match rule {
            Value::Bool(required) => Ok((field.clone(), *required)),
            _ => Err(DispatchError::Internal(format!(
                "Rule for field '{}' must be a boolean.",
                field
            ))),
        })
        .collect()
}

/// Fails on the first required field that is missing or forbidden field that is present.
pub fn validate_input_fields(rules: &FieldRules, data: &Body) -> Result<(), DispatchError> {
    for (field, &required) in rules {
        if data.contains_key(field) == required {
            continue;
        }
        let message = if required {
            format!("Input must contain '{}' field.", field)
        } else {
            format!("Input cannot contain '{}' field.", field)
        };
        return Err(DispatchError::BadRequest(message));
    }
    Ok(())
}

/// Like [`validate_input_fields`], and also rejects fields the rules do not mention.
pub fn validate_exact_input_fields(rules: &FieldRules, data: &Body) -> Result<(), DispatchError> {
    validate_input_fields(rules, data)?;
    match data.keys().find(|field| !rules.contains_key(*field)) {
        Some(field) => Err(DispatchError::BadRequest(format!(
            "Unexpected field '{}'.",
            field
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> Body {
        value.as_object().cloned().unwrap()
    }

    fn rules(value: Value) -> FieldRules {
        rules_from_value(&value).unwrap()
    }

    #[test]
    fn test_required_and_forbidden_fields() {
        let rules = rules(json!({"email": true, "_id": false}));

        assert!(validate_input_fields(&rules, &body(json!({"email": "a@b.com", "x": 1}))).is_ok());
        assert_eq!(
            validate_input_fields(&rules, &body(json!({"x": 1}))),
            Err(DispatchError::BadRequest("Input must contain 'email' field.".into()))
        );
        assert_eq!(
            validate_input_fields(&rules, &body(json!({"email": "e", "_id": "1"}))),
            Err(DispatchError::BadRequest("Input cannot contain '_id' field.".into()))
        );
    }

    #[test]
    fn test_exact_rejects_unknown_fields() {
        let rules = rules(json!({"email": true, "password": true}));

        assert!(validate_exact_input_fields(
            &rules,
            &body(json!({"email": "e", "password": "p"}))
        )
        .is_ok());
        assert_eq!(
            validate_exact_input_fields(
                &rules,
                &body(json!({"email": "e", "password": "p", "admin": true}))
            ),
            Err(DispatchError::BadRequest("Unexpected field 'admin'.".into()))
        );
    }

    #[test]
    fn test_forbidden_helper() {
        let rules = forbidden(["_id", "createdAt"]);
        assert_eq!(rules.len(), 2);
        assert!(rules.values().all(|required| !required));
    }

    #[test]
    fn test_rules_from_value_requires_object_of_booleans() {
        assert!(matches!(
            rules_from_value(&Value::Null),
            Err(DispatchError::Internal(_))
        ));
        assert!(matches!(
            rules_from_value(&json!({"a": "yes"})),
            Err(DispatchError::Internal(_))
        ));
    }
}
