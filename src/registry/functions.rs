//! Function endpoints.
//!
//! A function is a custom handler bound to a path template and a single
//! method. It replaces the generic CRUD executor for every request it matches.

use super::compile;
use crate::error::{DispatchError, RegistryError};
use crate::message::{Command, Message};
use crate::pattern::PathPattern;
use crate::providers::StorageProvider;
use crate::scope::RequestScope;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Everything a function handler receives. All of it is owned by the handler.
pub struct FunctionInput {
    pub request: Message,
    /// A copy of the request scope with the path parameters injected.
    pub scope: RequestScope,
    pub extras: Value,
    pub storage: Arc<dyn StorageProvider>,
}

/// What a function handler produces.
#[derive(Debug, Default)]
pub struct FunctionReply {
    pub response: Message,
    /// Replaces the parameter-seeded scope when present and non-empty.
    pub scope: Option<RequestScope>,
}

impl FunctionReply {
    pub fn response(response: Message) -> Self {
        Self {
            response,
            scope: None,
        }
    }

    pub fn with_scope(mut self, scope: RequestScope) -> Self {
        self.scope = Some(scope);
        self
    }
}

#[async_trait]
pub trait FunctionHandler: Send + Sync {
    async fn call(&self, input: FunctionInput) -> Result<FunctionReply, DispatchError>;
}

/// Adapts an async closure into a [`FunctionHandler`].
pub struct FnHandler<F>(F);

pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(FunctionInput) -> Fut + Send + Sync,
    Fut: Future<Output = Result<FunctionReply, DispatchError>> + Send,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> FunctionHandler for FnHandler<F>
where
    F: Fn(FunctionInput) -> Fut + Send + Sync,
    Fut: Future<Output = Result<FunctionReply, DispatchError>> + Send,
{
    async fn call(&self, input: FunctionInput) -> Result<FunctionReply, DispatchError> {
        (self.0)(input).await
    }
}

pub struct FunctionRegistration {
    pattern: PathPattern,
    method: Command,
    handler: Arc<dyn FunctionHandler>,
    extras: Value,
}

impl FunctionRegistration {
    pub fn pattern(&self) -> &str {
        self.pattern.source()
    }

    pub fn method(&self) -> Command {
        self.method
    }

    fn matches(&self, path: &str, command: Option<Command>) -> bool {
        command == Some(self.method) && self.pattern.matches(path)
    }
}

#[derive(Default)]
pub struct FunctionRegistry {
    registrations: Vec<FunctionRegistration>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles `pattern` and appends the registration. `method` is parsed case-insensitively.
    pub fn register(
        &mut self,
        pattern: &str,
        method: &str,
        handler: impl FunctionHandler + 'static,
        extras: Value,
    ) -> Result<(), RegistryError> {
        let method: Command = method
            .parse()
            .map_err(|_| RegistryError::InvalidMethod(method.to_string()))?;
        let pattern = compile(pattern)?;
        debug!(pattern = pattern.source(), %method, "Function registered");
        self.registrations.push(FunctionRegistration {
            pattern,
            method,
            handler: Arc::new(handler),
            extras,
        });
        Ok(())
    }

    /// True iff some registration matches both `path` and `command`.
    pub fn matches(&self, path: &str, command: Option<Command>) -> bool {
        self.find(path, command).is_some()
    }

    /// True iff some registration matches `path`, whatever its method.
    pub fn matches_path(&self, path: &str) -> bool {
        self.registrations.iter().any(|r| r.pattern.matches(path))
    }

    /// The first registration matching `path` and `command`.
    pub fn find(&self, path: &str, command: Option<Command>) -> Option<&FunctionRegistration> {
        self.registrations.iter().find(|r| r.matches(path, command))
    }

    /// Runs the first matching function.
    ///
    /// The handler gets a copy of `scope` with the path parameters injected; the
    /// caller's scope is left untouched. The returned scope is the handler's own
    /// scope if it produced a non-empty one, else the parameter-seeded copy.
    ///
    /// # Panics
    ///
    /// Panics when nothing matches. Callers check [`FunctionRegistry::matches`] first.
    pub async fn invoke(
        &self,
        request: Message,
        scope: &RequestScope,
        storage: Arc<dyn StorageProvider>,
    ) -> Result<(Message, RequestScope), DispatchError> {
        let Some(registration) = self.find(&request.path, request.command) else {
            panic!(
                "no function registered for {} {}",
                request.command_str(),
                request.path
            );
        };

        let mut seeded = scope.copy();
        seeded.extend(registration.pattern.params(&request.path));

        let reply = registration
            .handler
            .call(FunctionInput {
                request,
                scope: seeded.clone(),
                extras: registration.extras.clone(),
                storage,
            })
            .await?;

        let scope = match reply.scope {
            Some(edited) if !edited.is_empty() => edited,
            _ => seeded,
        };
        Ok((reply.response, scope))
    }

    /// Registered templates, in registration order.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.registrations.iter().map(|r| r.pattern.source())
    }

    pub(crate) fn append(&mut self, other: FunctionRegistry) {
        self.registrations.extend(other.registrations);
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockStorage;
    use serde_json::json;

    fn storage() -> Arc<dyn StorageProvider> {
        Arc::new(MockStorage::new())
    }

    fn echo_id() -> impl FunctionHandler {
        handler_fn(|input: FunctionInput| async move {
            let id = input.scope.get_str("id").unwrap_or_default().to_string();
            let body = json!({ "id": id }).as_object().cloned().unwrap_or_default();
            Ok(FunctionReply::response(Message::response(200, body)))
        })
    }

    #[test]
    fn test_matches_requires_method_and_path() {
        let mut registry = FunctionRegistry::new();
        registry
            .register("/{id}/convert", "POST", echo_id(), Value::Null)
            .unwrap();

        assert!(registry.matches("/abc/convert", Some(Command::Post)));
        assert!(!registry.matches("/abc/convert", Some(Command::Get)));
        assert!(!registry.matches("/abc/convert", None));
        assert!(!registry.matches("/abc", Some(Command::Post)));
        assert!(registry.matches_path("/abc/convert"));
    }

    #[test]
    fn test_register_rejects_bad_input() {
        let mut registry = FunctionRegistry::new();
        assert!(matches!(
            registry.register("/x", "patch", echo_id(), Value::Null),
            Err(RegistryError::InvalidMethod(_))
        ));
        assert!(matches!(
            registry.register("/{id:[}", "post", echo_id(), Value::Null),
            Err(RegistryError::InvalidPattern { .. })
        ));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_invoke_injects_params_into_a_copy() {
        let mut registry = FunctionRegistry::new();
        registry
            .register("/{id}/convert", "post", echo_id(), Value::Null)
            .unwrap();

        let caller_scope = RequestScope::new();
        let request = Message::request(Command::Post, "/abc123/convert");
        let (response, scope) = registry
            .invoke(request, &caller_scope, storage())
            .await
            .unwrap();

        assert_eq!(response.body["id"], "abc123");
        assert_eq!(scope.get_str("id"), Some("abc123"));
        assert!(!caller_scope.contains("id"));
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        let mut registry = FunctionRegistry::new();
        registry
            .register(
                "/first/{x}",
                "get",
                handler_fn(|_| async { Ok(FunctionReply::response(Message::response(201, Default::default()))) }),
                Value::Null,
            )
            .unwrap();
        registry
            .register(
                "/{a}/{b}",
                "get",
                handler_fn(|_| async { Ok(FunctionReply::response(Message::response(202, Default::default()))) }),
                Value::Null,
            )
            .unwrap();

        let request = Message::request(Command::Get, "/first/1");
        let (response, _) = registry
            .invoke(request, &RequestScope::new(), storage())
            .await
            .unwrap();
        assert_eq!(response.status, 201);
    }

    #[tokio::test]
    async fn test_handler_scope_replaces_seeded_copy() {
        let mut registry = FunctionRegistry::new();
        registry
            .register(
                "/{id}/tag",
                "put",
                handler_fn(|input: FunctionInput| async move {
                    let mut edited = RequestScope::new();
                    edited.set("tagged", input.extras["tag"].as_str().unwrap_or("").to_string());
                    Ok(FunctionReply::response(Message::default()).with_scope(edited))
                }),
                json!({"tag": "blue"}),
            )
            .unwrap();

        let request = Message::request(Command::Put, "/x/tag");
        let (_, scope) = registry
            .invoke(request, &RequestScope::new(), storage())
            .await
            .unwrap();
        assert_eq!(scope.get_str("tagged"), Some("blue"));
        assert!(!scope.contains("id"));
    }

    #[tokio::test]
    #[should_panic(expected = "no function registered")]
    async fn test_invoke_without_match_panics() {
        let registry = FunctionRegistry::new();
        let _ = registry
            .invoke(
                Message::request(Command::Get, "/nothing"),
                &RequestScope::new(),
                storage(),
            )
            .await;
    }
}
