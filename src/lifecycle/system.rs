use crate::actors::ActorTree;
use crate::config::{Config, ConfigError};
use crate::dispatch::{Dispatched, Dispatcher};
use crate::error::RegistryError;
use crate::interceptors::{FieldFilter, PathValidator};
use crate::message::Message;
use crate::pattern::ANY;
use crate::providers::keys::StaticKeyProvider;
use crate::providers::memory::StorageActor;
use crate::providers::{KeyProvider, StorageProvider};
use crate::registry::{RegistryBuilder, Stage};
use crate::scope::RequestScope;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

const STORAGE_MAILBOX_SIZE: usize = 256;

/// Errors that prevent the backend from starting.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Collaborators handed to the application while it registers its functions
/// and interceptors.
#[derive(Clone)]
pub struct Collaborators {
    pub storage: Arc<dyn StorageProvider>,
    pub keys: Arc<dyn KeyProvider>,
}

/// The running backend: storage actor, dispatcher and optional actor tree.
///
/// # Example
///
/// ```ignore
/// let backend = Backend::start(&config, |collaborators| {
///     Registry::builder().interceptor(
///         "*",
///         "*",
///         Stage::BeforeExec,
///         RequireMasterKey::new(collaborators.keys.clone()),
///         Value::Null,
///     )
/// })?;
///
/// let reply = backend.handle(request, RequestScope::new()).await;
/// backend.shutdown().await;
/// ```
pub struct Backend {
    dispatcher: Dispatcher,
    tree: Option<ActorTree>,
    keys: Arc<StaticKeyProvider>,
    storage_handle: JoinHandle<()>,
}

impl Backend {
    /// Starts every actor and freezes the registry.
    ///
    /// 1. Spawns the in-memory storage actor and builds the key provider.
    /// 2. Lets `configure` register the application's functions and interceptors.
    /// 3. Wraps them with the built-in path validator (first) and field filter (last)
    ///    when the configuration asks for them.
    /// 4. Spawns the actor tree when enabled.
    pub fn start<F>(config: &Config, configure: F) -> Result<Self, StartError>
    where
        F: FnOnce(&Collaborators) -> Result<RegistryBuilder, RegistryError>,
    {
        config.validate()?;

        let (storage_actor, storage) = StorageActor::with_counter_ids(STORAGE_MAILBOX_SIZE);
        let storage_handle = tokio::spawn(storage_actor.run());
        let keys = Arc::new(StaticKeyProvider::new(
            config.keys.master_key.clone(),
            config.keys.master_key_header.clone(),
        ));
        let collaborators = Collaborators {
            storage: Arc::new(storage),
            keys: keys.clone(),
        };

        let application = match configure(&collaborators) {
            Ok(application) => application,
            Err(e) => {
                storage_handle.abort();
                return Err(e.into());
            }
        };
        let registry = match assemble(config, application) {
            Ok(builder) => builder.build(),
            Err(e) => {
                storage_handle.abort();
                return Err(e.into());
            }
        };

        let dispatcher = Dispatcher::new(
            registry,
            collaborators.storage.clone(),
            config.files_class.clone(),
        );
        let tree = config
            .actor_tree
            .enabled
            .then(|| ActorTree::spawn(dispatcher.clone(), config.actor_tree.settings()));

        info!(
            files_class = %config.files_class,
            actor_tree = tree.is_some(),
            "Backend started"
        );
        Ok(Self {
            dispatcher,
            tree,
            keys,
            storage_handle,
        })
    }

    /// Dispatches one request, through the actor tree when it is enabled.
    pub async fn handle(&self, request: Message, scope: RequestScope) -> Dispatched {
        match &self.tree {
            Some(tree) => match tree.send(request, scope).await {
                Ok(dispatched) => dispatched,
                Err(e) => {
                    error!(error = %e, "Actor tree failed to dispatch");
                    Dispatched::failed(e, RequestScope::new())
                }
            },
            None => self.dispatcher.handle_request(request, scope).await,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn master_key(&self) -> &str {
        self.keys.master_key()
    }

    /// Number of running path actors, `None` when the actor tree is disabled.
    pub fn live_actors(&self) -> Option<usize> {
        self.tree.as_ref().map(ActorTree::live_actors)
    }

    /// Gracefully shuts down the backend.
    ///
    /// The actor tree drains first, then the storage actor stops once the last
    /// handle to it is gone.
    pub async fn shutdown(self) {
        info!("Shutting down backend...");

        if let Some(tree) = self.tree {
            tree.shutdown().await;
        }

        // FINAL-stage tasks may still hold storage handles; the storage actor
        // stops once they finish.
        drop(self.dispatcher);
        if let Err(e) = self.storage_handle.await {
            error!(error = %e, "Storage actor task failed");
        }

        info!("Backend shutdown complete.");
    }
}

/// Places the configured built-in interceptors around the application's registrations.
fn assemble(config: &Config, application: RegistryBuilder) -> Result<RegistryBuilder, RegistryError> {
    let mut builder = RegistryBuilder::new();

    if !config.allowed_paths.is_empty() {
        let templates: Vec<String> = config
            .allowed_paths
            .iter()
            .cloned()
            .chain(application.functions().patterns().map(str::to_string))
            .collect();
        builder = builder.interceptor(
            ANY,
            ANY,
            Stage::BeforeExec,
            PathValidator::new(templates)?,
            Value::Null,
        )?;
    }

    builder = builder.merge(application);

    if !config.filtered_fields.is_empty() {
        builder = builder.interceptor(
            ANY,
            ANY,
            Stage::AfterExec,
            FieldFilter::new(config.filtered_fields.clone()),
            Value::Null,
        )?;
    }
    Ok(builder)
}
