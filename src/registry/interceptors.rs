//! # Interceptor Registry & Executor
//!
//! Interceptors are hooks bound to a path template, a method filter and a
//! [`Stage`]. For each stage of a request the executor runs every matching
//! interceptor in registration order, threading a running request, response
//! and scope through them:
//!
//! 1. path parameters captured by the interceptor's template are merged into
//!    the running scope,
//! 2. the handler runs with owned copies of the running values and its extras,
//! 3. an error aborts the stage,
//! 4. a non-empty request, response or scope in the [`Interception`] replaces
//!    the running one.
//!
//! In [`Stage::BeforeExec`] a non-empty response also ends the stage and marks
//! the outcome as short-circuited: the dispatcher answers with it and never
//! reaches the resource.

use super::compile;
use crate::error::{DispatchError, RegistryError};
use crate::message::{Command, Message};
use crate::pattern::{PathPattern, ANY};
use crate::providers::StorageProvider;
use crate::scope::RequestScope;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

// =============================================================================
// STAGES AND METHOD FILTERS
// =============================================================================

/// When an interceptor runs, in request order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    BeforeExec,
    AfterExec,
    OnError,
    Final,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::BeforeExec => "BEFORE_EXEC",
            Stage::AfterExec => "AFTER_EXEC",
            Stage::OnError => "ON_ERROR",
            Stage::Final => "FINAL",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodFilter {
    Any,
    Only(Command),
}

impl MethodFilter {
    /// `"*"` matches every method; anything else must name a command.
    pub fn parse(method: &str) -> Result<Self, RegistryError> {
        if method == ANY {
            return Ok(MethodFilter::Any);
        }
        method
            .parse()
            .map(MethodFilter::Only)
            .map_err(|_| RegistryError::InvalidMethod(method.to_string()))
    }

    pub fn accepts(&self, command: Option<Command>) -> bool {
        match self {
            MethodFilter::Any => true,
            MethodFilter::Only(expected) => command == Some(*expected),
        }
    }
}

// =============================================================================
// INTERCEPTOR TRAIT
// =============================================================================

/// Owned inputs handed to an interceptor.
pub struct InterceptorInput {
    pub scope: RequestScope,
    pub extras: Value,
    pub request: Message,
    pub response: Message,
    pub storage: Arc<dyn StorageProvider>,
}

/// Proposed overrides. `None` and empty values both mean "unchanged".
#[derive(Debug, Default)]
pub struct Interception {
    pub request: Option<Message>,
    pub response: Option<Message>,
    pub scope: Option<RequestScope>,
}

impl Interception {
    /// No overrides.
    pub fn pass() -> Self {
        Self::default()
    }

    pub fn with_request(mut self, request: Message) -> Self {
        self.request = Some(request);
        self
    }

    pub fn with_response(mut self, response: Message) -> Self {
        self.response = Some(response);
        self
    }

    pub fn with_scope(mut self, scope: RequestScope) -> Self {
        self.scope = Some(scope);
        self
    }
}

#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(&self, input: InterceptorInput) -> Result<Interception, DispatchError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Adapts an async closure into an [`Interceptor`].
pub struct FnInterceptor<F>(F);

pub fn interceptor_fn<F, Fut>(f: F) -> FnInterceptor<F>
where
    F: Fn(InterceptorInput) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Interception, DispatchError>> + Send,
{
    FnInterceptor(f)
}

#[async_trait]
impl<F, Fut> Interceptor for FnInterceptor<F>
where
    F: Fn(InterceptorInput) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Interception, DispatchError>> + Send,
{
    async fn intercept(&self, input: InterceptorInput) -> Result<Interception, DispatchError> {
        (self.0)(input).await
    }

    fn name(&self) -> &str {
        "closure"
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

pub struct InterceptorRegistration {
    pattern: PathPattern,
    method: MethodFilter,
    stage: Stage,
    handler: Arc<dyn Interceptor>,
    extras: Value,
}

impl InterceptorRegistration {
    pub fn pattern(&self) -> &str {
        self.pattern.source()
    }

    pub fn method(&self) -> MethodFilter {
        self.method
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn extras(&self) -> &Value {
        &self.extras
    }

    fn matches(&self, path: &str, command: Option<Command>, stage: Stage) -> bool {
        self.stage == stage && self.method.accepts(command) && self.pattern.matches(path)
    }
}

/// Result of running one stage to completion.
#[derive(Debug)]
pub struct StageOutcome {
    pub request: Message,
    pub response: Message,
    pub scope: RequestScope,
    /// A BEFORE_EXEC interceptor produced a response.
    pub short_circuited: bool,
}

/// A stage aborted by an interceptor error, with the running values at that point.
#[derive(Debug)]
pub struct StageAbort {
    pub error: DispatchError,
    pub partial: StageOutcome,
}

#[derive(Default)]
pub struct InterceptorRegistry {
    registrations: Vec<InterceptorRegistration>,
}

impl InterceptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles `pattern` (`"*"` for every path) and appends the registration.
    pub fn register(
        &mut self,
        pattern: &str,
        method: &str,
        stage: Stage,
        handler: impl Interceptor + 'static,
        extras: Value,
    ) -> Result<(), RegistryError> {
        let method = MethodFilter::parse(method)?;
        let pattern = compile(pattern)?;
        debug!(
            pattern = pattern.source(),
            ?method,
            %stage,
            interceptor = handler.name(),
            "Interceptor registered"
        );
        self.registrations.push(InterceptorRegistration {
            pattern,
            method,
            stage,
            handler: Arc::new(handler),
            extras,
        });
        Ok(())
    }

    /// Every registration matching `(path, command, stage)`, in registration order.
    pub fn get(
        &self,
        path: &str,
        command: Option<Command>,
        stage: Stage,
    ) -> Vec<&InterceptorRegistration> {
        self.registrations
            .iter()
            .filter(|r| r.matches(path, command, stage))
            .collect()
    }

    /// Runs every interceptor of `stage` that matches the request's path and command.
    pub async fn execute(
        &self,
        stage: Stage,
        request: Message,
        response: Message,
        scope: RequestScope,
        storage: &Arc<dyn StorageProvider>,
    ) -> Result<StageOutcome, StageAbort> {
        let path = request.path.clone();
        let command = request.command;
        let matched = self.get(&path, command, stage);

        let mut running = StageOutcome {
            request,
            response,
            scope,
            short_circuited: false,
        };
        if matched.is_empty() {
            return Ok(running);
        }
        debug!(%stage, %path, count = matched.len(), "Running interceptors");

        for registration in matched {
            running.scope.extend(registration.pattern.params(&path));

            let input = InterceptorInput {
                scope: running.scope.clone(),
                extras: registration.extras.clone(),
                request: running.request.clone(),
                response: running.response.clone(),
                storage: storage.clone(),
            };
            let interception = match registration.handler.intercept(input).await {
                Ok(interception) => interception,
                Err(error) => {
                    warn!(
                        %stage,
                        interceptor = registration.handler.name(),
                        pattern = registration.pattern(),
                        error = %error,
                        "Interceptor failed"
                    );
                    return Err(StageAbort {
                        error,
                        partial: running,
                    });
                }
            };

            if let Some(request) = interception.request.filter(|m| !m.is_empty()) {
                running.request = request;
            }
            if let Some(response) = interception.response.filter(|m| !m.is_empty()) {
                running.response = response;
                if stage == Stage::BeforeExec {
                    debug!(
                        interceptor = registration.handler.name(),
                        pattern = registration.pattern(),
                        "Short-circuit"
                    );
                    running.short_circuited = true;
                    return Ok(running);
                }
            }
            if let Some(scope) = interception.scope.filter(|s| !s.is_empty()) {
                running.scope = scope;
            }
        }

        Ok(running)
    }

    pub(crate) fn append(&mut self, other: InterceptorRegistry) {
        self.registrations.extend(other.registrations);
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}
