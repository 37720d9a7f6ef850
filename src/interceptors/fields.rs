use crate::classify::segments;
use crate::error::DispatchError;
use crate::message::Body;
use crate::providers::RESULTS_FIELD;
use crate::registry::{Interception, Interceptor, InterceptorInput};
use crate::validator::{rules_from_value, validate_exact_input_fields, validate_input_fields};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Checks the request body against rules passed as extras, e.g.
/// `{"email": true, "_roles": false}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct InputFieldValidator {
    exact: bool,
}

impl InputFieldValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also rejects body fields the rules do not mention.
    pub fn exact() -> Self {
        Self { exact: true }
    }
}

#[async_trait]
impl Interceptor for InputFieldValidator {
    async fn intercept(&self, input: InterceptorInput) -> Result<Interception, DispatchError> {
        let rules = rules_from_value(&input.extras)?;
        if self.exact {
            validate_exact_input_fields(&rules, &input.request.body)?;
        } else {
            validate_input_fields(&rules, &input.request.body)?;
        }
        Ok(Interception::pass())
    }

    fn name(&self) -> &str {
        if self.exact {
            "ExactInputFieldValidator"
        } else {
            "InputFieldValidator"
        }
    }
}

/// Removes configured fields, per class, from outgoing bodies.
///
/// Query replies are filtered element by element inside their `results` list.
#[derive(Debug, Default, Clone)]
pub struct FieldFilter {
    fields: HashMap<String, Vec<String>>,
}

impl FieldFilter {
    pub fn new(fields: HashMap<String, Vec<String>>) -> Self {
        Self { fields }
    }

    fn strip(fields: &[String], item: &mut Body) {
        for field in fields {
            item.remove(field);
        }
    }
}

#[async_trait]
impl Interceptor for FieldFilter {
    async fn intercept(&self, input: InterceptorInput) -> Result<Interception, DispatchError> {
        let class = segments(&input.request.path).and_then(|parts| parts.first().copied());
        let Some(fields) = class.and_then(|class| self.fields.get(class)) else {
            return Ok(Interception::pass());
        };

        let mut response = input.response;
        if let Some(Value::Array(results)) = response.body.get_mut(RESULTS_FIELD) {
            for item in results.iter_mut() {
                if let Value::Object(item) = item {
                    Self::strip(fields, item);
                }
            }
        } else {
            Self::strip(fields, &mut response.body);
        }
        Ok(Interception::pass().with_response(response))
    }

    fn name(&self) -> &str {
        "FieldFilter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Command, Message};
    use crate::providers::mock::MockStorage;
    use crate::scope::RequestScope;
    use serde_json::json;
    use std::sync::Arc;

    fn input(request: Message, response: Message, extras: Value) -> InterceptorInput {
        InterceptorInput {
            scope: RequestScope::new(),
            extras,
            request,
            response,
            storage: Arc::new(MockStorage::new()),
        }
    }

    fn body(value: Value) -> Body {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_input_field_validator_uses_extras() {
        let request = Message::request(Command::Post, "/users")
            .with_body(body(json!({"email": "a@b.com", "admin": true})));
        let rules = json!({"email": true, "password": false});

        assert!(InputFieldValidator::new()
            .intercept(input(request.clone(), Message::default(), rules.clone()))
            .await
            .is_ok());
        assert_eq!(
            InputFieldValidator::exact()
                .intercept(input(request.clone(), Message::default(), rules))
                .await
                .unwrap_err(),
            DispatchError::BadRequest("Unexpected field 'admin'.".into())
        );
        assert!(matches!(
            InputFieldValidator::new()
                .intercept(input(request, Message::default(), Value::Null))
                .await,
            Err(DispatchError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn test_field_filter_strips_items_and_results() {
        let filter = FieldFilter::new(HashMap::from([(
            "users".to_string(),
            vec!["password".to_string()],
        )]));

        let item = Message::response(200, body(json!({"name": "a", "password": "x"})));
        let filtered = filter
            .intercept(input(Message::request(Command::Get, "/users/1"), item, Value::Null))
            .await
            .unwrap()
            .response
            .unwrap();
        assert_eq!(filtered.body, body(json!({"name": "a"})));

        let list = Message::response(
            200,
            body(json!({"results": [{"name": "a", "password": "x"}, {"name": "b"}]})),
        );
        let filtered = filter
            .intercept(input(Message::request(Command::Get, "/users"), list, Value::Null))
            .await
            .unwrap()
            .response
            .unwrap();
        assert_eq!(filtered.body["results"], json!([{"name": "a"}, {"name": "b"}]));
    }

    #[tokio::test]
    async fn test_field_filter_ignores_other_classes() {
        let filter = FieldFilter::new(HashMap::from([(
            "users".to_string(),
            vec!["password".to_string()],
        )]));
        let response = Message::response(200, body(json!({"password": "kept"})));
        let interception = filter
            .intercept(input(Message::request(Command::Get, "/widgets/1"), response, Value::Null))
            .await
            .unwrap();
        assert!(interception.response.is_none());
    }
}
