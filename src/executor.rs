//! # Generic Resource Executor
//!
//! Maps a classified request onto a storage operation:
//!
//! | Resource | Command | Storage call | Status |
//! |---|---|---|---|
//! | collection | POST | `create` (`create_file` for the files class) | 201 |
//! | collection | GET | `query` with the raw query parameters | 200 |
//! | item | GET | `get` (`get_file` for the files class) | 200 |
//! | item | PUT | `update` | 200 |
//! | item | DELETE | `delete` | 204 |
//!
//! Anything else fails with MethodNotAllowed before storage is touched. Bodies
//! are checked against the restricted-field sets first, so clients can never
//! supply identifiers or timestamps.

use crate::classify::{segments, ResourceKind};
use crate::error::DispatchError;
use crate::message::{Command, Message};
use crate::providers::{
    StorageProvider, ACL_FIELD, CREATED_AT_FIELD, ID_FIELD, ROLES_FIELD, UPDATED_AT_FIELD,
};
use crate::validator::{forbidden, validate_input_fields, FieldRules};
use http::StatusCode;
use std::sync::Arc;
use tracing::debug;

/// Class whose items are raw files rather than structured objects.
pub const DEFAULT_FILES_CLASS: &str = "files";

pub struct ResourceExecutor {
    storage: Arc<dyn StorageProvider>,
    files_class: String,
    restricted_on_create: FieldRules,
    restricted_on_update: FieldRules,
}

impl ResourceExecutor {
    pub fn new(storage: Arc<dyn StorageProvider>, files_class: impl Into<String>) -> Self {
        Self {
            storage,
            files_class: files_class.into(),
            restricted_on_create: forbidden([ID_FIELD, CREATED_AT_FIELD, UPDATED_AT_FIELD]),
            restricted_on_update: forbidden([
                ID_FIELD,
                ACL_FIELD,
                ROLES_FIELD,
                CREATED_AT_FIELD,
                UPDATED_AT_FIELD,
            ]),
        }
    }

    pub fn storage(&self) -> &Arc<dyn StorageProvider> {
        &self.storage
    }

    pub async fn execute(&self, request: &Message) -> Result<Message, DispatchError> {
        let kind = ResourceKind::structural(&request.path);
        let parts = match (kind, segments(&request.path)) {
            (ResourceKind::Collection | ResourceKind::Item, Some(parts)) => parts,
            _ => {
                return Err(DispatchError::MethodNotAllowed(
                    "Invalid resource schema.".into(),
                ))
            }
        };
        let command = request
            .command
            .filter(|c| kind.allows(*c))
            .ok_or_else(|| {
                DispatchError::MethodNotAllowed("Method not allowed on the resource type.".into())
            })?;

        let class = parts[0];
        let id = parts.get(1).copied();
        let is_files = class.eq_ignore_ascii_case(&self.files_class);
        debug!(%class, ?id, %command, %kind, "Executing");

        match (command, id) {
            (Command::Post, None) => {
                validate_input_fields(&self.restricted_on_create, &request.body)?;
                let created = if is_files {
                    let data = request.raw_body.clone().ok_or_else(|| {
                        DispatchError::BadRequest("File body is required.".into())
                    })?;
                    self.storage.create_file(data).await?
                } else {
                    self.storage.create(class, request.body.clone()).await?
                };
                Ok(Message::response(StatusCode::CREATED.as_u16(), created))
            }
            (Command::Get, None) => {
                let results = self.storage.query(class, &request.parameters).await?;
                Ok(Message::response(StatusCode::OK.as_u16(), results))
            }
            (Command::Get, Some(id)) if is_files => {
                let data = self.storage.get_file(id).await?;
                Ok(Message::default()
                    .with_status(StatusCode::OK.as_u16())
                    .with_raw_body(data))
            }
            (Command::Get, Some(id)) => {
                let object = self.storage.get(class, id).await?;
                Ok(Message::response(StatusCode::OK.as_u16(), object))
            }
            (Command::Put, Some(id)) => {
                validate_input_fields(&self.restricted_on_update, &request.body)?;
                let updated = self
                    .storage
                    .update(class, id, request.body.clone())
                    .await?;
                Ok(Message::response(StatusCode::OK.as_u16(), updated))
            }
            (Command::Delete, Some(id)) => {
                let deleted = self.storage.delete(class, id).await?;
                Ok(Message::response(StatusCode::NO_CONTENT.as_u16(), deleted))
            }
            _ => Err(DispatchError::MethodNotAllowed(
                "Method not allowed on the resource type.".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Body;
    use crate::providers::mock::MockStorage;
    use bytes::Bytes;
    use serde_json::{json, Value};

    fn body(value: Value) -> Body {
        value.as_object().cloned().unwrap()
    }

    fn executor(mock: &MockStorage) -> ResourceExecutor {
        ResourceExecutor::new(Arc::new(mock.clone()), DEFAULT_FILES_CLASS)
    }

    #[tokio::test]
    async fn test_invalid_paths_never_reach_storage() {
        let mock = MockStorage::new();
        let executor = executor(&mock);

        for path in ["/", "/a/b/c", "/a//b", "relative"] {
            let result = executor.execute(&Message::request(Command::Get, path)).await;
            assert_eq!(
                result,
                Err(DispatchError::MethodNotAllowed("Invalid resource schema.".into())),
                "{}",
                path
            );
        }
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_disallowed_methods_never_reach_storage() {
        let mock = MockStorage::new();
        let executor = executor(&mock);

        let put_collection = Message::request(Command::Put, "/widgets");
        let post_item = Message::request(Command::Post, "/widgets/1");
        let no_command = Message {
            path: "/widgets".into(),
            ..Message::default()
        };
        for request in [put_collection, post_item, no_command] {
            assert!(matches!(
                executor.execute(&request).await,
                Err(DispatchError::MethodNotAllowed(_))
            ));
        }
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_create_sets_created_status() {
        let mock = MockStorage::new();
        mock.expect_create("widgets")
            .return_ok(body(json!({"_id": "w1", "createdAt": "now"})));

        let request = Message::request(Command::Post, "/widgets").with_body(body(json!({"n": 1})));
        let response = executor(&mock).execute(&request).await.unwrap();

        assert_eq!(response.status, 201);
        assert_eq!(response.body["_id"], "w1");
        assert_eq!(mock.calls()[0].data, Some(body(json!({"n": 1}))));
        mock.verify();
    }

    #[tokio::test]
    async fn test_restricted_fields_are_rejected_before_storage() {
        let mock = MockStorage::new();
        let executor = executor(&mock);

        let create = Message::request(Command::Post, "/widgets")
            .with_body(body(json!({"createdAt": "yesterday"})));
        assert_eq!(
            executor.execute(&create).await,
            Err(DispatchError::BadRequest("Input cannot contain 'createdAt' field.".into()))
        );

        let update = Message::request(Command::Put, "/users/1").with_body(body(json!({"_roles": []})));
        assert_eq!(
            executor.execute(&update).await,
            Err(DispatchError::BadRequest("Input cannot contain '_roles' field.".into()))
        );
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_query_get_update_delete_routing() {
        let mock = MockStorage::new();
        mock.expect_query("widgets").return_ok(body(json!({"results": []})));
        mock.expect_get("widgets", "7").return_ok(body(json!({"_id": "7"})));
        mock.expect_update("widgets", "7")
            .return_ok(body(json!({"updatedAt": "now"})));
        mock.expect_delete("widgets", "7").return_ok(Body::new());
        let executor = executor(&mock);

        let query = Message::request(Command::Get, "/widgets").with_parameter("limit", "5");
        assert_eq!(executor.execute(&query).await.unwrap().body["results"], json!([]));

        let get = Message::request(Command::Get, "/widgets/7");
        assert_eq!(executor.execute(&get).await.unwrap().body["_id"], "7");

        let put = Message::request(Command::Put, "/widgets/7").with_body(body(json!({"n": 2})));
        assert_eq!(executor.execute(&put).await.unwrap().status, 200);

        let delete = Message::request(Command::Delete, "/widgets/7");
        assert_eq!(executor.execute(&delete).await.unwrap().status, 204);

        mock.verify();
    }

    #[tokio::test]
    async fn test_files_class_uses_file_storage() {
        let mock = MockStorage::new();
        mock.expect_create_file().return_ok(body(json!({"_id": "f1"})));
        mock.expect_get_file("f1").return_bytes(Bytes::from_static(b"png"));
        let executor = executor(&mock);

        let missing_body = Message::request(Command::Post, "/files");
        assert!(matches!(
            executor.execute(&missing_body).await,
            Err(DispatchError::BadRequest(_))
        ));

        let upload = Message::request(Command::Post, "/Files").with_raw_body("png");
        assert_eq!(executor.execute(&upload).await.unwrap().status, 201);

        let download = Message::request(Command::Get, "/files/f1");
        let response = executor.execute(&download).await.unwrap();
        assert_eq!(response.raw_body, Some(Bytes::from_static(b"png")));
        assert!(response.body.is_empty());
        mock.verify();
    }

    #[tokio::test]
    async fn test_storage_errors_propagate() {
        let mock = MockStorage::new();
        mock.expect_get("widgets", "999")
            .return_err(DispatchError::NotFound("Item not found.".into()));

        let request = Message::request(Command::Get, "/widgets/999");
        let result = executor(&mock).execute(&request).await;
        assert_eq!(result, Err(DispatchError::NotFound("Item not found.".into())));
    }
}
