//! # Collaborators
//!
//! The dispatch core does not know how data is stored, how users are
//! authenticated, or how privileged keys are checked. It talks to those concerns
//! through the traits in this module. Implementations are resolved once at startup
//! and injected into the [`Dispatcher`](crate::dispatch::Dispatcher) and the
//! built-in interceptors.
//!
//! - [`StorageProvider`] - CRUD plus file storage, keyed by class (collection name).
//! - [`AuthProvider`] - resolves the caller and evaluates permissions.
//! - [`KeyProvider`] - validates the master key that bypasses authorization.
//!
//! Implementations shipped with the crate:
//!
//! - [`memory::MemoryStorage`] - an actor-backed in-memory store.
//! - [`keys::StaticKeyProvider`] - a fixed master key.
//! - [`mock::MockStorage`] - expectation-driven storage for tests, which also counts calls.

pub mod keys;
pub mod memory;
pub mod mock;

use crate::error::DispatchError;
use crate::message::{Body, Headers, Message, Parameters};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

/// Field holding an object's identifier.
pub const ID_FIELD: &str = "_id";
/// Field holding an object's access-control list.
pub const ACL_FIELD: &str = "_acl";
/// Field holding a user's roles.
pub const ROLES_FIELD: &str = "_roles";
pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";
/// Field under which query results are listed.
pub const RESULTS_FIELD: &str = "results";

/// Persistent storage for classes of objects and for files.
///
/// Writes must assign a unique identifier and creation/update timestamps and
/// return them to the caller.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    async fn create(&self, class: &str, data: Body) -> Result<Body, DispatchError>;

    async fn get(&self, class: &str, id: &str) -> Result<Body, DispatchError>;

    /// Query parameters (`where`, `sort`, `limit`, `skip`, ...) are interpreted by the storage.
    async fn query(&self, class: &str, params: &Parameters) -> Result<Body, DispatchError>;

    async fn update(&self, class: &str, id: &str, data: Body) -> Result<Body, DispatchError>;

    async fn delete(&self, class: &str, id: &str) -> Result<Body, DispatchError>;

    async fn create_file(&self, data: Bytes) -> Result<Body, DispatchError>;

    async fn get_file(&self, id: &str) -> Result<Bytes, DispatchError>;
}

/// Resolves callers and evaluates their permissions.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The user identified by the request's credentials, `None` for anonymous callers.
    async fn get_user(&self, request: &Message) -> Result<Option<Value>, DispatchError>;

    /// Credentials (e.g. an access token) to hand back to a freshly authenticated user.
    async fn generate_auth_data(&self, user: &Value) -> Result<Body, DispatchError>;

    /// Whether `user` may perform `request`.
    async fn is_granted(
        &self,
        user: Option<&Value>,
        request: &Message,
    ) -> Result<bool, DispatchError>;
}

/// Validates privileged keys presented in request headers.
pub trait KeyProvider: Send + Sync {
    /// Whether `key` is the registered value for `name`.
    fn is_key_valid(&self, name: &str, key: &str) -> bool;

    /// `Ok(false)` when no master key is presented, `Ok(true)` when a valid one is,
    /// and an error when an invalid one is.
    fn check_key_permissions(&self, headers: &Headers) -> Result<bool, DispatchError>;

    /// Header carrying the master key.
    fn master_key_header(&self) -> &str;
}
