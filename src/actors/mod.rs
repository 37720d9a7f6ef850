//! # Actor Tree
//!
//! An optional concurrency substrate that serializes requests per resource path.
//!
//! Every path gets its own actor with a bounded mailbox. The root actor (`/`)
//! receives every request and forwards it one segment at a time:
//!
//! ```text
//! /  ──▶  /users  ──▶  /users/42
//!    └─▶  /widgets
//! ```
//!
//! Each actor dispatches the requests addressed to its own path one after the
//! other, so two requests for `/users/42` never run at the same time while
//! `/users/42` and `/widgets` run in parallel.
//!
//! ## Eviction
//!
//! A child whose mailbox stays empty for [`TreeSettings::idle_timeout`] closes
//! its mailbox, serves what was already queued and exits. Its parent notices the
//! closed mailbox on the next request for that path and spawns a fresh child, so
//! the tree only holds actors for recently used paths. The root is never evicted.
//!
//! ## Backpressure
//!
//! Parents never wait on a child's mailbox. When a child's mailbox is full, the
//! forward is parked in a background task chained behind the child's earlier
//! parked forwards, so per-path order holds while the parent keeps routing
//! requests for other subtrees. Callers see the backpressure as a slower reply.

mod node;

use crate::dispatch::{Dispatched, Dispatcher};
use crate::error::DispatchError;
use crate::message::Message;
use crate::scope::RequestScope;
use node::{PathActor, ROOT_PATH};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, instrument};

/// A request travelling down the tree, with the channel for its reply.
#[derive(Debug)]
pub struct Envelope {
    pub request: Message,
    pub scope: RequestScope,
    pub respond_to: oneshot::Sender<Dispatched>,
}

#[derive(Debug, Clone, Copy)]
pub struct TreeSettings {
    pub mailbox_size: usize,
    pub idle_timeout: Duration,
}

impl Default for TreeSettings {
    fn default() -> Self {
        Self {
            mailbox_size: 64,
            idle_timeout: Duration::from_secs(30),
        }
    }
}

/// Client handle for a running actor tree.
pub struct ActorTree {
    sender: mpsc::Sender<Envelope>,
    handle: JoinHandle<()>,
    live: Arc<AtomicUsize>,
}

impl ActorTree {
    /// Spawns the root actor.
    pub fn spawn(dispatcher: Dispatcher, settings: TreeSettings) -> Self {
        let live = Arc::new(AtomicUsize::new(0));
        let (sender, handle) =
            PathActor::spawn(ROOT_PATH.to_string(), dispatcher, settings, live.clone());
        info!(
            mailbox_size = settings.mailbox_size,
            idle_timeout_ms = settings.idle_timeout.as_millis() as u64,
            "Actor tree started"
        );
        Self {
            sender,
            handle,
            live,
        }
    }

    /// Routes a request to the actor owning its path and waits for the reply.
    #[instrument(skip_all, fields(path = %request.path))]
    pub async fn send(
        &self,
        request: Message,
        scope: RequestScope,
    ) -> Result<Dispatched, DispatchError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(Envelope {
                request,
                scope,
                respond_to,
            })
            .await
            .map_err(|_| DispatchError::Internal("Actor tree closed".into()))?;
        response
            .await
            .map_err(|_| DispatchError::Internal("Actor dropped response channel".into()))
    }

    /// Number of actors currently running, root included.
    pub fn live_actors(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Stops accepting requests and waits until every actor has drained its mailbox.
    pub async fn shutdown(self) {
        drop(self.sender);
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Root actor panicked");
        }
        info!("Actor tree stopped");
    }
}
