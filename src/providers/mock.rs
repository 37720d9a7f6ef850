//! # Mock Storage
//!
//! Expectation-driven [`StorageProvider`] for testing the pipeline without a
//! real store.
//!
//! ```ignore
//! let mock = MockStorage::new();
//! mock.expect_get("widgets", "999")
//!     .return_err(DispatchError::NotFound("Item not found.".into()));
//!
//! let storage: Arc<dyn StorageProvider> = Arc::new(mock.clone());
//! // Drive the dispatcher with `storage`...
//! mock.verify(); // Ensures all expectations were met
//! ```
//!
//! Every call is recorded, matched or not, so the mock doubles as a spy:
//! [`MockStorage::call_count`] and [`MockStorage::calls`] show what reached storage.

use super::StorageProvider;
use crate::error::DispatchError;
use crate::message::{Body, Parameters};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// =============================================================================
// RECORDED CALLS
// =============================================================================

/// Storage operation names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOp {
    Create,
    Get,
    Query,
    Update,
    Delete,
    CreateFile,
    GetFile,
}

impl fmt::Display for StorageOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One call that reached the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageCall {
    pub op: StorageOp,
    pub class: Option<String>,
    pub id: Option<String>,
    pub data: Option<Body>,
}

// =============================================================================
// EXPECTATION BUILDER API
// =============================================================================

enum Reply {
    Body(Result<Body, DispatchError>),
    Bytes(Result<Bytes, DispatchError>),
}

struct Expectation {
    op: StorageOp,
    class: Option<String>,
    id: Option<String>,
    reply: Reply,
}

#[derive(Default)]
struct State {
    expectations: VecDeque<Expectation>,
    calls: Vec<StorageCall>,
    unexpected: Vec<String>,
}

/// A storage mock with expectation tracking for fluent testing.
#[derive(Clone, Default)]
pub struct MockStorage {
    state: Arc<Mutex<State>>,
}

impl MockStorage {
    /// Creates a new mock with no expectations.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn expect(&self, op: StorageOp, class: Option<&str>, id: Option<&str>) -> ExpectationBuilder {
        ExpectationBuilder {
            op,
            class: class.map(str::to_string),
            id: id.map(str::to_string),
            state: self.state.clone(),
        }
    }

    /// Expects a `create` on `class`.
    pub fn expect_create(&self, class: &str) -> ExpectationBuilder {
        self.expect(StorageOp::Create, Some(class), None)
    }

    /// Expects a `get` of `id` from `class`.
    pub fn expect_get(&self, class: &str, id: &str) -> ExpectationBuilder {
        self.expect(StorageOp::Get, Some(class), Some(id))
    }

    /// Expects a `query` on `class`.
    pub fn expect_query(&self, class: &str) -> ExpectationBuilder {
        self.expect(StorageOp::Query, Some(class), None)
    }

    /// Expects an `update` of `id` in `class`.
    pub fn expect_update(&self, class: &str, id: &str) -> ExpectationBuilder {
        self.expect(StorageOp::Update, Some(class), Some(id))
    }

    /// Expects a `delete` of `id` from `class`.
    pub fn expect_delete(&self, class: &str, id: &str) -> ExpectationBuilder {
        self.expect(StorageOp::Delete, Some(class), Some(id))
    }

    pub fn expect_create_file(&self) -> ExpectationBuilder {
        self.expect(StorageOp::CreateFile, None, None)
    }

    pub fn expect_get_file(&self, id: &str) -> ExpectationBuilder {
        self.expect(StorageOp::GetFile, None, Some(id))
    }

    /// Number of calls received, matched or not.
    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Every call received, in order.
    pub fn calls(&self) -> Vec<StorageCall> {
        self.lock().calls.clone()
    }

    /// Verifies that all expectations were met and nothing unexpected arrived.
    ///
    /// # Panics
    ///
    /// Panics when an expectation is left over or a call did not match.
    pub fn verify(&self) {
        let state = self.lock();
        if !state.unexpected.is_empty() {
            panic!("Unexpected storage calls: {:?}", state.unexpected);
        }
        if !state.expectations.is_empty() {
            panic!(
                "Not all expectations were met. {} remaining",
                state.expectations.len()
            );
        }
    }

    fn record(&self, call: StorageCall) -> Result<Reply, DispatchError> {
        let mut state = self.lock();
        state.calls.push(call.clone());

        let matches = state.expectations.front().is_some_and(|e| {
            e.op == call.op
                && (e.class.is_none() || e.class == call.class)
                && (e.id.is_none() || e.id == call.id)
        });
        if matches {
            if let Some(expectation) = state.expectations.pop_front() {
                return Ok(expectation.reply);
            }
        }

        let description = format!("{} {:?} {:?}", call.op, call.class, call.id);
        state.unexpected.push(description.clone());
        Err(DispatchError::Internal(format!(
            "Unexpected storage call: {}",
            description
        )))
    }

    fn body_call(&self, call: StorageCall) -> Result<Body, DispatchError> {
        match self.record(call)? {
            Reply::Body(result) => result,
            Reply::Bytes(_) => Err(DispatchError::Internal(
                "Expectation configured with a file reply".into(),
            )),
        }
    }
}

/// Builder returned by the `expect_*` methods.
pub struct ExpectationBuilder {
    op: StorageOp,
    class: Option<String>,
    id: Option<String>,
    state: Arc<Mutex<State>>,
}

impl ExpectationBuilder {
    fn push(self, reply: Reply) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.expectations.push_back(Expectation {
            op: self.op,
            class: self.class,
            id: self.id,
            reply,
        });
    }

    /// Sets the expectation to return a successful result.
    pub fn return_ok(self, body: Body) {
        self.push(Reply::Body(Ok(body)));
    }

    /// Sets the expectation to return file contents.
    pub fn return_bytes(self, data: Bytes) {
        self.push(Reply::Bytes(Ok(data)));
    }

    /// Sets the expectation to return an error.
    pub fn return_err(self, error: DispatchError) {
        let reply = match self.op {
            StorageOp::GetFile => Reply::Bytes(Err(error)),
            _ => Reply::Body(Err(error)),
        };
        self.push(reply);
    }
}

// =============================================================================
// STORAGE PROVIDER IMPLEMENTATION
// =============================================================================

fn call(op: StorageOp, class: Option<&str>, id: Option<&str>, data: Option<Body>) -> StorageCall {
    StorageCall {
        op,
        class: class.map(str::to_string),
        id: id.map(str::to_string),
        data,
    }
}

#[async_trait]
impl StorageProvider for MockStorage {
    async fn create(&self, class: &str, data: Body) -> Result<Body, DispatchError> {
        self.body_call(call(StorageOp::Create, Some(class), None, Some(data)))
    }

    async fn get(&self, class: &str, id: &str) -> Result<Body, DispatchError> {
        self.body_call(call(StorageOp::Get, Some(class), Some(id), None))
    }

    async fn query(&self, class: &str, _params: &Parameters) -> Result<Body, DispatchError> {
        self.body_call(call(StorageOp::Query, Some(class), None, None))
    }

    async fn update(&self, class: &str, id: &str, data: Body) -> Result<Body, DispatchError> {
        self.body_call(call(StorageOp::Update, Some(class), Some(id), Some(data)))
    }

    async fn delete(&self, class: &str, id: &str) -> Result<Body, DispatchError> {
        self.body_call(call(StorageOp::Delete, Some(class), Some(id), None))
    }

    async fn create_file(&self, _data: Bytes) -> Result<Body, DispatchError> {
        self.body_call(call(StorageOp::CreateFile, None, None, None))
    }

    async fn get_file(&self, id: &str) -> Result<Bytes, DispatchError> {
        match self.record(call(StorageOp::GetFile, None, Some(id), None))? {
            Reply::Bytes(result) => result,
            Reply::Body(_) => Err(DispatchError::Internal(
                "Expectation configured with a body reply".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_returns_expected_replies_in_order() {
        let mock = MockStorage::new();
        let created = json!({"_id": "w1"}).as_object().cloned().unwrap();
        mock.expect_create("widgets").return_ok(created.clone());
        mock.expect_get("widgets", "999")
            .return_err(DispatchError::NotFound("Item not found.".into()));

        assert_eq!(mock.create("widgets", Body::new()).await, Ok(created));
        assert!(matches!(
            mock.get("widgets", "999").await,
            Err(DispatchError::NotFound(_))
        ));
        assert_eq!(mock.call_count(), 2);
        mock.verify();
    }

    #[tokio::test]
    async fn test_unexpected_call_is_recorded() {
        let mock = MockStorage::new();
        let result = mock.delete("widgets", "1").await;
        assert!(matches!(result, Err(DispatchError::Internal(_))));
        assert_eq!(mock.calls()[0].op, StorageOp::Delete);
    }

    #[tokio::test]
    #[should_panic(expected = "Unexpected storage calls")]
    async fn test_verify_fails_on_unexpected_call() {
        let mock = MockStorage::new();
        let _ = mock.get("widgets", "1").await;
        mock.verify();
    }

    #[test]
    #[should_panic(expected = "Not all expectations were met")]
    fn test_verify_fails_on_leftover_expectation() {
        let mock = MockStorage::new();
        mock.expect_query("widgets").return_ok(Body::new());
        mock.verify();
    }

    #[tokio::test]
    async fn test_file_expectations() {
        let mock = MockStorage::new();
        mock.expect_get_file("f1").return_bytes(Bytes::from_static(b"data"));
        assert_eq!(
            mock.get_file("f1").await,
            Ok(Bytes::from_static(b"data"))
        );
        mock.verify();
    }
}
