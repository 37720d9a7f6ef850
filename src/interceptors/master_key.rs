use crate::error::DispatchError;
use crate::providers::keys::{truncate_key, MASTER_KEY};
use crate::providers::KeyProvider;
use crate::registry::{Interception, Interceptor, InterceptorInput};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Rejects every request that does not carry a valid master key.
pub struct RequireMasterKey {
    keys: Arc<dyn KeyProvider>,
}

impl RequireMasterKey {
    pub fn new(keys: Arc<dyn KeyProvider>) -> Self {
        Self { keys }
    }
}

#[async_trait]
impl Interceptor for RequireMasterKey {
    async fn intercept(&self, input: InterceptorInput) -> Result<Interception, DispatchError> {
        let key = input
            .request
            .header(self.keys.master_key_header())
            .filter(|key| self.keys.is_key_valid(MASTER_KEY, key))
            .ok_or_else(|| DispatchError::Forbidden("Forbidden".into()))?;

        warn!(master_key = %truncate_key(key), "Request contains a valid master key.");
        Ok(Interception::pass())
    }

    fn name(&self) -> &str {
        "RequireMasterKey"
    }
}
