//! # Resource Dispatch Demo
//!
//! Starts a [`Backend`] with the actor tree enabled and walks through a small
//! account workflow:
//!
//! 1. Register a user through the `POST /users` function (token issued, password hidden).
//! 2. Try to register the same email again (409).
//! 3. Create and read a widget through the generic executor.
//! 4. Read a missing widget (404) and delete without credentials (401).
//!
//! Pass a TOML file to override the built-in configuration:
//!
//! ```bash
//! RUST_LOG=info cargo run -- backend.toml
//! ```

use async_trait::async_trait;
use resource_dispatch::config::{load_config, Config};
use resource_dispatch::error::DispatchError;
use resource_dispatch::interceptors::{Authorization, InputFieldValidator};
use resource_dispatch::lifecycle::{setup_tracing, Backend, StartError};
use resource_dispatch::message::{Body, Command, Message, Parameters};
use resource_dispatch::providers::{AuthProvider, RESULTS_FIELD};
use resource_dispatch::registry::{
    interceptor_fn, FunctionHandler, FunctionInput, FunctionReply, Interception, Registry, Stage,
};
use resource_dispatch::scope::RequestScope;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

const USERS_CLASS: &str = "users";

/// Bearer tokens issued at registration, held in memory.
#[derive(Default)]
struct SessionAuth {
    sessions: Mutex<HashMap<String, Value>>,
}

#[async_trait]
impl AuthProvider for SessionAuth {
    async fn get_user(&self, request: &Message) -> Result<Option<Value>, DispatchError> {
        let Some(token) = request
            .header("Authorization")
            .and_then(|h| h.strip_prefix("Bearer "))
        else {
            return Ok(None);
        };
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        match sessions.get(token) {
            Some(user) => Ok(Some(user.clone())),
            None => Err(DispatchError::Unauthorized("Invalid access token.".into())),
        }
    }

    async fn generate_auth_data(&self, user: &Value) -> Result<Body, DispatchError> {
        let bytes: [u8; 16] = rand::random();
        let token = hex::encode(bytes);
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.clone(), user.clone());

        let mut auth = Body::new();
        auth.insert("accessToken".into(), Value::String(token));
        Ok(auth)
    }

    /// Anyone may read and write; deleting needs a signed-in user.
    async fn is_granted(
        &self,
        user: Option<&Value>,
        request: &Message,
    ) -> Result<bool, DispatchError> {
        Ok(request.command != Some(Command::Delete) || user.is_some())
    }
}

/// Creates an account, refusing duplicate emails, and signs the new user in.
struct RegisterUser {
    auth: Arc<SessionAuth>,
}

#[async_trait]
impl FunctionHandler for RegisterUser {
    async fn call(&self, input: FunctionInput) -> Result<FunctionReply, DispatchError> {
        let body = input.request.body;
        let email = body
            .get("email")
            .and_then(Value::as_str)
            .ok_or_else(|| DispatchError::BadRequest("Field 'email' must be a string.".into()))?;

        let mut params = Parameters::new();
        params.insert("where".into(), vec![json!({ "email": email }).to_string()]);
        let existing = input.storage.query(USERS_CLASS, &params).await?;
        let taken = existing
            .get(RESULTS_FIELD)
            .and_then(Value::as_array)
            .is_some_and(|results| !results.is_empty());
        if taken {
            return Err(DispatchError::Conflict(
                "Account already exists for this email.".into(),
            ));
        }

        let created = input.storage.create(USERS_CLASS, body.clone()).await?;
        let mut user = body;
        user.extend(created);
        user.remove("password");

        let auth = self.auth.generate_auth_data(&Value::Object(user.clone())).await?;
        user.extend(auth);
        Ok(FunctionReply::response(Message::response(201, user)))
    }
}

fn demo_config() -> Config {
    let mut config = Config::default();
    config.actor_tree.enabled = true;
    config.allowed_paths = vec!["/widgets".into(), "/widgets/{id}".into(), "/users/{id}".into()];
    config
        .filtered_fields
        .insert(USERS_CLASS.into(), vec!["password".into()]);
    config
}

#[tokio::main]
async fn main() -> Result<(), StartError> {
    setup_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => load_config(Path::new(&path))?,
        None => demo_config(),
    };

    let auth = Arc::new(SessionAuth::default());
    let backend = Backend::start(&config, |collaborators| {
        Registry::builder()
            .interceptor(
                "*",
                "*",
                Stage::BeforeExec,
                Authorization::new(collaborators.keys.clone(), auth.clone()),
                Value::Null,
            )?
            .interceptor(
                "/users",
                "post",
                Stage::BeforeExec,
                InputFieldValidator::new(),
                json!({ "email": true, "password": true, "_roles": false }),
            )?
            .function(
                "/users",
                "post",
                RegisterUser { auth: auth.clone() },
                Value::Null,
            )?
            .interceptor(
                "*",
                "*",
                Stage::Final,
                interceptor_fn(|input| async move {
                    info!(path = %input.request.path, status = input.response.status, "Audit");
                    Ok(Interception::pass())
                }),
                Value::Null,
            )
    })?;

    let credentials = json!({ "email": "alice@example.com", "password": "s3cret" });
    let register = || {
        Message::request(Command::Post, "/users")
            .with_body(credentials.as_object().cloned().unwrap_or_default())
    };

    let registered = backend.handle(register(), RequestScope::new()).await.into_response();
    info!(status = registered.status, body = %serde_json::Value::Object(registered.body.clone()), "Registered");

    let duplicate = backend.handle(register(), RequestScope::new()).await.into_response();
    info!(status = duplicate.status, body = %serde_json::Value::Object(duplicate.body), "Registered again");

    let widget = json!({ "name": "gear", "teeth": 12 });
    let created = backend
        .handle(
            Message::request(Command::Post, "/widgets")
                .with_body(widget.as_object().cloned().unwrap_or_default()),
            RequestScope::new(),
        )
        .await
        .into_response();
    info!(status = created.status, "Widget created");

    if let Some(id) = created.body.get("_id").and_then(Value::as_str) {
        let fetched = backend
            .handle(
                Message::request(Command::Get, format!("/widgets/{id}")),
                RequestScope::new(),
            )
            .await
            .into_response();
        info!(status = fetched.status, body = %serde_json::Value::Object(fetched.body), "Widget fetched");
    }

    let missing = backend
        .handle(Message::request(Command::Get, "/widgets/999"), RequestScope::new())
        .await
        .into_response();
    info!(status = missing.status, "Missing widget");

    let anonymous_delete = backend
        .handle(Message::request(Command::Delete, "/widgets/1"), RequestScope::new())
        .await
        .into_response();
    if anonymous_delete.status != 401 {
        warn!(status = anonymous_delete.status, "Anonymous delete was not rejected");
    }

    if let Some(live) = backend.live_actors() {
        info!(live, "Path actors running");
    }

    backend.shutdown().await;
    info!("Demo completed");
    Ok(())
}
