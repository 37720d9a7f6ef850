//! # In-Memory Storage Actor
//!
//! [`StorageActor`] owns every stored object and file and processes requests
//! from its mailbox one at a time, so the store needs no locks. [`MemoryStorage`]
//! is the cloneable client half: it implements [`StorageProvider`] by sending a
//! [`StorageRequest`] and awaiting the reply on a oneshot channel.
//!
//! ```rust
//! use resource_dispatch::providers::memory::StorageActor;
//! use resource_dispatch::providers::StorageProvider;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (actor, storage) = StorageActor::with_counter_ids(16);
//!     tokio::spawn(actor.run());
//!
//!     let data = json!({"name": "widget"}).as_object().cloned().unwrap();
//!     let created = storage.create("widgets", data).await.unwrap();
//!     let id = created["_id"].as_str().unwrap();
//!     let fetched = storage.get("widgets", id).await.unwrap();
//!     assert_eq!(fetched["name"], "widget");
//! }
//! ```
//!
//! The store is intended for tests, demos and single-process deployments; it
//! keeps nothing across restarts.

use super::{StorageProvider, CREATED_AT_FIELD, ID_FIELD, RESULTS_FIELD, UPDATED_AT_FIELD};
use crate::error::DispatchError;
use crate::message::{Body, Parameters};
use async_trait::async_trait;
use bytes::Bytes;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

/// One-shot reply channel used by the storage actor.
pub type Response<T> = oneshot::Sender<Result<T, DispatchError>>;

/// Messages understood by the [`StorageActor`], one per [`StorageProvider`] operation.
#[derive(Debug)]
pub enum StorageRequest {
    Create {
        class: String,
        data: Body,
        respond_to: Response<Body>,
    },
    Get {
        class: String,
        id: String,
        respond_to: Response<Body>,
    },
    Query {
        class: String,
        params: Parameters,
        respond_to: Response<Body>,
    },
    Update {
        class: String,
        id: String,
        data: Body,
        respond_to: Response<Body>,
    },
    Delete {
        class: String,
        id: String,
        respond_to: Response<Body>,
    },
    CreateFile {
        data: Bytes,
        respond_to: Response<Body>,
    },
    GetFile {
        id: String,
        respond_to: Response<Bytes>,
    },
}

/// The server half: owns the objects and files.
pub struct StorageActor {
    receiver: mpsc::Receiver<StorageRequest>,
    classes: HashMap<String, IndexMap<String, Body>>,
    files: HashMap<String, Bytes>,
    next_id_fn: Box<dyn Fn() -> String + Send + Sync>,
}

impl StorageActor {
    pub fn new(
        buffer_size: usize,
        next_id_fn: impl Fn() -> String + Send + Sync + 'static,
    ) -> (Self, MemoryStorage) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = Self {
            receiver,
            classes: HashMap::new(),
            files: HashMap::new(),
            next_id_fn: Box::new(next_id_fn),
        };
        (actor, MemoryStorage { sender })
    }

    /// Uses sequential identifiers (`"1"`, `"2"`, ...).
    pub fn with_counter_ids(buffer_size: usize) -> (Self, MemoryStorage) {
        let counter = Arc::new(AtomicU64::new(1));
        Self::new(buffer_size, move || {
            counter.fetch_add(1, Ordering::SeqCst).to_string()
        })
    }

    /// Processes requests until every client has been dropped.
    pub async fn run(mut self) {
        info!("Storage actor started");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                StorageRequest::Create {
                    class,
                    data,
                    respond_to,
                } => {
                    debug!(%class, ?data, "Create");
                    let id = (self.next_id_fn)();
                    let now = timestamp();
                    let mut object = data;
                    object.insert(ID_FIELD.into(), Value::String(id.clone()));
                    object.insert(CREATED_AT_FIELD.into(), Value::String(now.clone()));
                    object.insert(UPDATED_AT_FIELD.into(), Value::String(now.clone()));

                    let objects = self.classes.entry(class.clone()).or_default();
                    objects.insert(id.clone(), object);
                    info!(%class, %id, size = objects.len(), "Created");

                    let mut reply = Body::new();
                    reply.insert(ID_FIELD.into(), Value::String(id));
                    reply.insert(CREATED_AT_FIELD.into(), Value::String(now));
                    let _ = respond_to.send(Ok(reply));
                }
                StorageRequest::Get {
                    class,
                    id,
                    respond_to,
                } => {
                    let item = self.classes.get(&class).and_then(|o| o.get(&id)).cloned();
                    debug!(%class, %id, found = item.is_some(), "Get");
                    let result = item.ok_or_else(|| {
                        DispatchError::NotFound(format!(
                            "Object from '{}' with id '{}' not found.",
                            class, id
                        ))
                    });
                    let _ = respond_to.send(result);
                }
                StorageRequest::Query {
                    class,
                    params,
                    respond_to,
                } => {
                    debug!(%class, ?params, "Query");
                    let empty = IndexMap::new();
                    let objects = self.classes.get(&class).unwrap_or(&empty);
                    let result = run_query(objects, &params);
                    if let Err(e) = &result {
                        warn!(%class, error = %e, "Query failed");
                    }
                    let _ = respond_to.send(result);
                }
                StorageRequest::Update {
                    class,
                    id,
                    data,
                    respond_to,
                } => {
                    debug!(%class, %id, ?data, "Update");
                    match self.classes.get_mut(&class).and_then(|o| o.get_mut(&id)) {
                        Some(object) => {
                            let now = timestamp();
                            object.extend(data);
                            object.insert(UPDATED_AT_FIELD.into(), Value::String(now.clone()));
                            info!(%class, %id, "Updated");
                            let mut reply = Body::new();
                            reply.insert(UPDATED_AT_FIELD.into(), Value::String(now));
                            let _ = respond_to.send(Ok(reply));
                        }
                        None => {
                            warn!(%class, %id, "Not found");
                            let _ = respond_to
                                .send(Err(DispatchError::NotFound("Item not found.".into())));
                        }
                    }
                }
                StorageRequest::Delete {
                    class,
                    id,
                    respond_to,
                } => {
                    debug!(%class, %id, "Delete");
                    match self.classes.get_mut(&class).and_then(|o| o.shift_remove(&id)) {
                        Some(_) => {
                            info!(%class, %id, "Deleted");
                            let _ = respond_to.send(Ok(Body::new()));
                        }
                        None => {
                            warn!(%class, %id, "Not found");
                            let _ = respond_to
                                .send(Err(DispatchError::NotFound("Item not found.".into())));
                        }
                    }
                }
                StorageRequest::CreateFile { data, respond_to } => {
                    let id = (self.next_id_fn)();
                    let now = timestamp();
                    info!(%id, bytes = data.len(), "File created");
                    self.files.insert(id.clone(), data);
                    let mut reply = Body::new();
                    reply.insert(ID_FIELD.into(), Value::String(id));
                    reply.insert(CREATED_AT_FIELD.into(), Value::String(now));
                    let _ = respond_to.send(Ok(reply));
                }
                StorageRequest::GetFile { id, respond_to } => {
                    let file = self.files.get(&id).cloned();
                    debug!(%id, found = file.is_some(), "GetFile");
                    let result =
                        file.ok_or_else(|| DispatchError::NotFound("File not found.".into()));
                    let _ = respond_to.send(result);
                }
            }
        }

        let objects: usize = self.classes.values().map(IndexMap::len).sum();
        info!(objects, files = self.files.len(), "Storage actor shutdown");
    }
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Applies `where` (JSON object, top-level equality), `skip` and `limit`.
fn run_query(objects: &IndexMap<String, Body>, params: &Parameters) -> Result<Body, DispatchError> {
    let filter: Option<Body> = match first(params, "where") {
        Some(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Some(map),
            _ => {
                return Err(DispatchError::BadRequest(
                    "Parameter 'where' must be a JSON object.".into(),
                ))
            }
        },
        None => None,
    };
    let skip = parse_count(params, "skip")?.unwrap_or(0);
    let limit = parse_count(params, "limit")?.unwrap_or(usize::MAX);

    let results: Vec<Value> = objects
        .values()
        .filter(|object| {
            filter
                .as_ref()
                .map(|f| f.iter().all(|(k, v)| object.get(k) == Some(v)))
                .unwrap_or(true)
        })
        .skip(skip)
        .take(limit)
        .map(|object| Value::Object(object.clone()))
        .collect();

    let mut reply = Body::new();
    reply.insert(RESULTS_FIELD.into(), Value::Array(results));
    Ok(reply)
}

fn first<'a>(params: &'a Parameters, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.first()).map(String::as_str)
}

fn parse_count(params: &Parameters, key: &str) -> Result<Option<usize>, DispatchError> {
    first(params, key)
        .map(|raw| {
            raw.parse::<usize>().map_err(|_| {
                DispatchError::BadRequest(format!(
                    "Parameter '{}' must be a non-negative integer.",
                    key
                ))
            })
        })
        .transpose()
}

/// Cloneable client for a running [`StorageActor`].
#[derive(Clone)]
pub struct MemoryStorage {
    sender: mpsc::Sender<StorageRequest>,
}

impl MemoryStorage {
    async fn call<T>(
        &self,
        build: impl FnOnce(Response<T>) -> StorageRequest,
    ) -> Result<T, DispatchError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(build(respond_to))
            .await
            .map_err(|_| DispatchError::Internal("Storage actor closed".into()))?;
        response.await.map_err(|_| {
            DispatchError::Internal("Storage actor dropped response channel".into())
        })?
    }
}

#[async_trait]
impl StorageProvider for MemoryStorage {
    #[instrument(skip(self, data))]
    async fn create(&self, class: &str, data: Body) -> Result<Body, DispatchError> {
        self.call(|respond_to| StorageRequest::Create {
            class: class.to_string(),
            data,
            respond_to,
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get(&self, class: &str, id: &str) -> Result<Body, DispatchError> {
        self.call(|respond_to| StorageRequest::Get {
            class: class.to_string(),
            id: id.to_string(),
            respond_to,
        })
        .await
    }

    #[instrument(skip(self))]
    async fn query(&self, class: &str, params: &Parameters) -> Result<Body, DispatchError> {
        self.call(|respond_to| StorageRequest::Query {
            class: class.to_string(),
            params: params.clone(),
            respond_to,
        })
        .await
    }

    #[instrument(skip(self, data))]
    async fn update(&self, class: &str, id: &str, data: Body) -> Result<Body, DispatchError> {
        self.call(|respond_to| StorageRequest::Update {
            class: class.to_string(),
            id: id.to_string(),
            data,
            respond_to,
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete(&self, class: &str, id: &str) -> Result<Body, DispatchError> {
        self.call(|respond_to| StorageRequest::Delete {
            class: class.to_string(),
            id: id.to_string(),
            respond_to,
        })
        .await
    }

    #[instrument(skip(self, data))]
    async fn create_file(&self, data: Bytes) -> Result<Body, DispatchError> {
        self.call(|respond_to| StorageRequest::CreateFile { data, respond_to })
            .await
    }

    #[instrument(skip(self))]
    async fn get_file(&self, id: &str) -> Result<Bytes, DispatchError> {
        self.call(|respond_to| StorageRequest::GetFile {
            id: id.to_string(),
            respond_to,
        })
        .await
    }
}
