use crate::error::DispatchError;
use crate::providers::{AuthProvider, KeyProvider};
use crate::registry::{Interception, Interceptor, InterceptorInput};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Scope key set to `true` when a valid master key authorized the request.
pub const GRANTED_BY_KEY_SCOPE_KEY: &str = "grantedByKey";
/// Scope key holding the resolved user (`serde_json::Value`).
pub const USER_SCOPE_KEY: &str = "user";

/// Lets a request through when it carries a valid master key or its user is
/// granted by the auth provider.
///
/// An invalid master key fails with Unauthorized straight away. Without a key
/// the user is resolved (possibly anonymous), stored in the scope under
/// [`USER_SCOPE_KEY`], and checked with [`AuthProvider::is_granted`].
pub struct Authorization {
    keys: Arc<dyn KeyProvider>,
    auth: Arc<dyn AuthProvider>,
}

impl Authorization {
    pub fn new(keys: Arc<dyn KeyProvider>, auth: Arc<dyn AuthProvider>) -> Self {
        Self { keys, auth }
    }
}

#[async_trait]
impl Interceptor for Authorization {
    async fn intercept(&self, input: InterceptorInput) -> Result<Interception, DispatchError> {
        let mut scope = input.scope;

        if self.keys.check_key_permissions(&input.request.headers)? {
            scope.set(GRANTED_BY_KEY_SCOPE_KEY, true);
            return Ok(Interception::pass().with_scope(scope));
        }

        let user = self.auth.get_user(&input.request).await?;
        if !self.auth.is_granted(user.as_ref(), &input.request).await? {
            debug!(anonymous = user.is_none(), "Not granted");
            return Err(DispatchError::Unauthorized("Unauthorized".into()));
        }

        if let Some(user) = user {
            scope.set(USER_SCOPE_KEY, user);
        }
        Ok(Interception::pass().with_scope(scope))
    }

    fn name(&self) -> &str {
        "Authorization"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Body, Command, Message};
    use crate::providers::keys::{StaticKeyProvider, DEFAULT_MASTER_KEY_HEADER};
    use crate::providers::mock::MockStorage;
    use crate::scope::RequestScope;
    use serde_json::{json, Value};

    /// Bearer token "t-<name>" identifies user <name>; only "admin" may delete.
    struct TokenAuth;

    #[async_trait]
    impl AuthProvider for TokenAuth {
        async fn get_user(&self, request: &Message) -> Result<Option<Value>, DispatchError> {
            Ok(request
                .header("Authorization")
                .and_then(|h| h.strip_prefix("Bearer t-"))
                .map(|name| json!({ "name": name })))
        }

        async fn generate_auth_data(&self, _user: &Value) -> Result<Body, DispatchError> {
            Ok(Body::new())
        }

        async fn is_granted(
            &self,
            user: Option<&Value>,
            request: &Message,
        ) -> Result<bool, DispatchError> {
            Ok(request.command != Some(Command::Delete)
                || user.is_some_and(|u| u["name"] == "admin"))
        }
    }

    fn interceptor() -> Authorization {
        Authorization::new(
            Arc::new(StaticKeyProvider::new(Some("secret".into()), DEFAULT_MASTER_KEY_HEADER)),
            Arc::new(TokenAuth),
        )
    }

    async fn run(request: Message) -> Result<Interception, DispatchError> {
        interceptor()
            .intercept(InterceptorInput {
                scope: RequestScope::new(),
                extras: Value::Null,
                request,
                response: Message::default(),
                storage: Arc::new(MockStorage::new()),
            })
            .await
    }

    #[tokio::test]
    async fn test_master_key_grants() {
        let request = Message::request(Command::Delete, "/users/1").with_header("Master-Key", "secret");
        let scope = run(request).await.unwrap().scope.unwrap();
        assert_eq!(scope.get::<bool>(GRANTED_BY_KEY_SCOPE_KEY), Some(&true));
        assert!(!scope.contains(USER_SCOPE_KEY));
    }

    #[tokio::test]
    async fn test_invalid_master_key_is_unauthorized() {
        let request = Message::request(Command::Get, "/users").with_header("Master-Key", "nope");
        assert_eq!(
            run(request).await.unwrap_err(),
            DispatchError::Unauthorized("Master key is not valid.".into())
        );
    }

    #[tokio::test]
    async fn test_user_is_resolved_and_checked() {
        let request =
            Message::request(Command::Delete, "/users/1").with_header("Authorization", "Bearer t-admin");
        let scope = run(request).await.unwrap().scope.unwrap();
        assert_eq!(scope.get::<Value>(USER_SCOPE_KEY), Some(&json!({"name": "admin"})));

        let request =
            Message::request(Command::Delete, "/users/1").with_header("Authorization", "Bearer t-bob");
        assert!(matches!(
            run(request).await,
            Err(DispatchError::Unauthorized(_))
        ));

        let anonymous_read = Message::request(Command::Get, "/users/1");
        assert!(run(anonymous_read).await.is_ok());
    }
}
