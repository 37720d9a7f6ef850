use crate::error::DispatchError;
use crate::registry::{Interception, Interceptor, InterceptorInput};
use async_trait::async_trait;

/// Refuses every matching request with 405. Registered on a path and method to
/// switch that combination off.
#[derive(Debug, Default, Clone, Copy)]
pub struct MethodNotAllowed;

#[async_trait]
impl Interceptor for MethodNotAllowed {
    async fn intercept(&self, _input: InterceptorInput) -> Result<Interception, DispatchError> {
        Err(DispatchError::MethodNotAllowed("Method Not Allowed".into()))
    }

    fn name(&self) -> &str {
        "MethodNotAllowed"
    }
}

/// Answers every matching request with 404, hiding the resource.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotFound;

#[async_trait]
impl Interceptor for NotFound {
    async fn intercept(&self, _input: InterceptorInput) -> Result<Interception, DispatchError> {
        Err(DispatchError::NotFound("Not Found".into()))
    }

    fn name(&self) -> &str {
        "NotFound"
    }
}
