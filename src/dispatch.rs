//! # Dispatch Orchestrator
//!
//! [`Dispatcher::handle_request`] drives one request through the pipeline:
//!
//! ```text
//!   BEFORE_EXEC ──short-circuit──────────────────────────────▶ reply
//!       │ ok                         │ error
//!       ▼                            ▼
//!   function or executor ──error──▶ ON_ERROR (scope["error"] = error)
//!       │ ok                         │
//!       ▼                            │
//!   AFTER_EXEC ─────────────────────┴──▶ reply, FINAL spawned (not awaited)
//! ```
//!
//! The outcome is a [`Dispatched`] value holding the final response, scope and
//! error. [`Dispatched::into_response`] turns it into what the client sees.

use crate::classify::ResourceKind;
use crate::error::DispatchError;
use crate::executor::ResourceExecutor;
use crate::message::Message;
use crate::providers::StorageProvider;
use crate::registry::{Registry, Stage, StageOutcome};
use crate::scope::RequestScope;
use http::StatusCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn, Instrument};

/// Scope key under which the ON_ERROR stage finds the error being handled.
pub const ERROR_SCOPE_KEY: &str = "error";

/// The result of dispatching one request.
#[derive(Debug)]
pub struct Dispatched {
    pub response: Message,
    pub scope: RequestScope,
    /// The error to report, if any. Kept even when ON_ERROR recovered, for status derivation.
    pub error: Option<DispatchError>,
    /// ON_ERROR produced a response that replaces the error body.
    pub recovered: bool,
}

impl Dispatched {
    fn ok(outcome: StageOutcome) -> Self {
        Self {
            response: outcome.response,
            scope: outcome.scope,
            error: None,
            recovered: false,
        }
    }

    /// A request that failed before reaching the pipeline.
    pub fn failed(error: DispatchError, scope: RequestScope) -> Self {
        Self {
            response: Message::default(),
            scope,
            error: Some(error),
            recovered: false,
        }
    }

    /// HTTP status the client will receive.
    pub fn status(&self) -> u16 {
        match (&self.error, self.recovered) {
            (Some(error), false) => error.status().as_u16(),
            (Some(error), true) if self.response.status == 0 => error.status().as_u16(),
            (None, _) if self.response.status == 0 => StatusCode::OK.as_u16(),
            _ => self.response.status,
        }
    }

    /// The message to write back to the client.
    pub fn into_response(self) -> Message {
        let status = self.status();
        match self.error {
            Some(error) if !self.recovered => Message::response(status, error.to_body()),
            _ => self.response.with_status(status),
        }
    }
}

/// Runs requests through interceptors, functions and the generic executor.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    executor: Arc<ResourceExecutor>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<Registry>,
        storage: Arc<dyn StorageProvider>,
        files_class: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            executor: Arc::new(ResourceExecutor::new(storage, files_class)),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    fn storage(&self) -> &Arc<dyn StorageProvider> {
        self.executor.storage()
    }

    #[instrument(skip_all, fields(path = %request.path, command = request.command_str()))]
    pub async fn handle_request(&self, request: Message, scope: RequestScope) -> Dispatched {
        let start = Instant::now();
        info!(client_ip = %request.client_ip, "Received request");

        let before = self
            .registry
            .interceptors()
            .execute(
                Stage::BeforeExec,
                request,
                Message::default(),
                scope,
                self.storage(),
            )
            .await;

        let (request, dispatched) = match before {
            Ok(outcome) if outcome.short_circuited => {
                info!(
                    status = outcome.response.status,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Short-circuited"
                );
                return Dispatched::ok(outcome);
            }
            Ok(StageOutcome { request, scope, .. }) => {
                let dispatched = match self.execute(&request, &scope).await {
                    Ok((response, scope)) => self.after_exec(&request, response, scope).await,
                    Err(error) => self.recover(&request, scope, error).await,
                };
                (request, dispatched)
            }
            Err(abort) => {
                let request = abort.partial.request;
                let dispatched = self.recover(&request, abort.partial.scope, abort.error).await;
                (request, dispatched)
            }
        };

        self.spawn_final(request, &dispatched);

        match &dispatched.error {
            Some(error) => info!(
                status = dispatched.status(),
                recovered = dispatched.recovered,
                error = %error,
                duration_ms = start.elapsed().as_millis() as u64,
                "Responded with error"
            ),
            None => info!(
                status = dispatched.status(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Responded"
            ),
        }
        dispatched
    }

    /// Runs the matching function, or the generic executor when no function owns the path.
    async fn execute(
        &self,
        request: &Message,
        scope: &RequestScope,
    ) -> Result<(Message, RequestScope), DispatchError> {
        let functions = self.registry.functions();
        let kind = ResourceKind::of(&request.path, functions);
        debug!(%kind, "Dispatching");

        if kind == ResourceKind::Function {
            if !functions.matches(&request.path, request.command) {
                return Err(DispatchError::MethodNotAllowed(
                    "Method not allowed on the resource type.".into(),
                ));
            }
            functions
                .invoke(request.clone(), scope, self.storage().clone())
                .await
        } else {
            let response = self.executor.execute(request).await?;
            Ok((response, scope.clone()))
        }
    }

    async fn after_exec(
        &self,
        request: &Message,
        response: Message,
        scope: RequestScope,
    ) -> Dispatched {
        let after = self
            .registry
            .interceptors()
            .execute(
                Stage::AfterExec,
                request.clone(),
                response,
                scope,
                self.storage(),
            )
            .await;
        match after {
            Ok(outcome) => Dispatched::ok(outcome),
            Err(abort) => Dispatched {
                response: abort.partial.response,
                scope: abort.partial.scope,
                error: Some(abort.error),
                recovered: false,
            },
        }
    }

    async fn recover(
        &self,
        request: &Message,
        mut scope: RequestScope,
        error: DispatchError,
    ) -> Dispatched {
        debug!(error = %error, "Running ON_ERROR");
        scope.set(ERROR_SCOPE_KEY, error.clone());

        let on_error = self
            .registry
            .interceptors()
            .execute(
                Stage::OnError,
                request.clone(),
                Message::default(),
                scope,
                self.storage(),
            )
            .await;
        match on_error {
            Ok(outcome) => {
                let recovered = !outcome.response.is_empty();
                if recovered {
                    info!(error = %error, "Recovered by ON_ERROR");
                }
                Dispatched {
                    response: outcome.response,
                    scope: outcome.scope,
                    error: Some(error),
                    recovered,
                }
            }
            Err(abort) => Dispatched {
                response: Message::default(),
                scope: abort.partial.scope,
                error: Some(abort.error),
                recovered: false,
            },
        }
    }

    /// Fires the FINAL stage on its own task. Failures are logged and dropped.
    fn spawn_final(&self, request: Message, dispatched: &Dispatched) {
        let interceptors = self.registry.interceptors();
        if interceptors
            .get(&request.path, request.command, Stage::Final)
            .is_empty()
        {
            return;
        }

        let registry = self.registry.clone();
        let storage = self.storage().clone();
        let response = dispatched.response.clone();
        let scope = dispatched.scope.clone();
        tokio::spawn(
            async move {
                let result = registry
                    .interceptors()
                    .execute(Stage::Final, request, response, scope, &storage)
                    .await;
                if let Err(abort) = result {
                    warn!(error = %abort.error, "FINAL stage failed");
                }
            }
            .in_current_span(),
        );
    }
}
