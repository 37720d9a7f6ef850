//! # Registry
//!
//! Functions and interceptors are registered once at startup through a
//! [`RegistryBuilder`], then frozen into an immutable [`Registry`] that is shared
//! (behind `Arc`) by every request. Nothing registers after serving begins, so
//! reads need no locks.
//!
//! ```rust
//! use resource_dispatch::registry::{handler_fn, FunctionReply, Registry};
//! use resource_dispatch::message::Message;
//! use serde_json::Value;
//!
//! # fn main() -> Result<(), resource_dispatch::error::RegistryError> {
//! let registry = Registry::builder()
//!     .function(
//!         "/{id}/convert",
//!         "post",
//!         handler_fn(|_input| async { Ok(FunctionReply::response(Message::default())) }),
//!         Value::Null,
//!     )?
//!     .build();
//!
//! assert_eq!(registry.functions().len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! Matching is a linear scan in registration order: first match wins for
//! functions, and every match runs (in order) for interceptors.

mod functions;
mod interceptors;

pub use functions::{
    handler_fn, FnHandler, FunctionHandler, FunctionInput, FunctionRegistration, FunctionRegistry,
    FunctionReply,
};
pub use interceptors::{
    interceptor_fn, FnInterceptor, Interception, Interceptor, InterceptorInput,
    InterceptorRegistration, InterceptorRegistry, MethodFilter, Stage, StageAbort, StageOutcome,
};

use crate::error::RegistryError;
use crate::pattern::PathPattern;
use serde_json::Value;
use std::sync::Arc;

/// Read-only registrations shared by the dispatcher and the built-in interceptors.
#[derive(Default)]
pub struct Registry {
    functions: FunctionRegistry,
    interceptors: InterceptorRegistry,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// A registry with nothing registered: every request goes to the generic executor.
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn interceptors(&self) -> &InterceptorRegistry {
        &self.interceptors
    }
}

/// Collects registrations before serving begins.
#[derive(Default)]
pub struct RegistryBuilder {
    functions: FunctionRegistry,
    interceptors: InterceptorRegistry,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a function endpoint. See [`FunctionRegistry::register`].
    pub fn function(
        mut self,
        pattern: &str,
        method: &str,
        handler: impl FunctionHandler + 'static,
        extras: Value,
    ) -> Result<Self, RegistryError> {
        self.functions.register(pattern, method, handler, extras)?;
        Ok(self)
    }

    /// Registers an interceptor. See [`InterceptorRegistry::register`].
    pub fn interceptor(
        mut self,
        pattern: &str,
        method: &str,
        stage: Stage,
        handler: impl Interceptor + 'static,
        extras: Value,
    ) -> Result<Self, RegistryError> {
        self.interceptors
            .register(pattern, method, stage, handler, extras)?;
        Ok(self)
    }

    /// Functions registered so far.
    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Appends every registration of `other` after the ones already collected.
    pub fn merge(mut self, other: RegistryBuilder) -> Self {
        self.functions.append(other.functions);
        self.interceptors.append(other.interceptors);
        self
    }

    /// Freezes the registrations.
    pub fn build(self) -> Arc<Registry> {
        tracing::info!(
            functions = self.functions.len(),
            interceptors = self.interceptors.len(),
            "Registry built"
        );
        Arc::new(Registry {
            functions: self.functions,
            interceptors: self.interceptors,
        })
    }
}

pub(crate) fn compile(pattern: &str) -> Result<PathPattern, RegistryError> {
    PathPattern::compile(pattern).map_err(|source| RegistryError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}
