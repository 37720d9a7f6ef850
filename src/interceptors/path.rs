use crate::error::{DispatchError, RegistryError};
use crate::pattern::PathPattern;
use crate::registry::{compile, Interception, Interceptor, InterceptorInput};
use async_trait::async_trait;
use tracing::debug;

/// Rejects paths that match none of the allowed templates.
///
/// Function patterns are usually passed in alongside the configured templates
/// so function endpoints stay reachable.
#[derive(Debug, Clone)]
pub struct PathValidator {
    allowed: Vec<PathPattern>,
}

impl PathValidator {
    pub fn new<I, S>(templates: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = templates
            .into_iter()
            .map(|template| compile(template.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { allowed })
    }

    pub fn allows(&self, path: &str) -> bool {
        self.allowed.iter().any(|pattern| pattern.matches(path))
    }
}

#[async_trait]
impl Interceptor for PathValidator {
    async fn intercept(&self, input: InterceptorInput) -> Result<Interception, DispatchError> {
        if self.allows(&input.request.path) {
            return Ok(Interception::pass());
        }
        debug!(path = %input.request.path, "Path rejected");
        Err(DispatchError::BadRequest("Path is not valid.".into()))
    }

    fn name(&self) -> &str {
        "PathValidator"
    }
}
