//! One actor per resource path.

use super::{Envelope, TreeSettings};
use crate::classify::segments;
use crate::dispatch::{Dispatched, Dispatcher};
use crate::error::DispatchError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{
    self,
    error::{SendError, TrySendError},
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub(crate) const ROOT_PATH: &str = "/";

struct Child {
    sender: mpsc::Sender<Envelope>,
    handle: JoinHandle<()>,
    /// Latest forward still waiting for room in a full mailbox. Later messages
    /// for this child queue behind it.
    backlog: Option<JoinHandle<()>>,
}

/// Owns the mailbox for one path and the senders of its direct children.
///
/// Messages addressed to this path are dispatched one at a time. Messages for
/// deeper paths go to the child owning the next segment, spawned on demand.
pub(crate) struct PathActor {
    path: String,
    receiver: mpsc::Receiver<Envelope>,
    children: HashMap<String, Child>,
    dispatcher: Dispatcher,
    settings: TreeSettings,
    live: Arc<AtomicUsize>,
}

impl PathActor {
    /// Spawns an actor for `path` and returns its mailbox.
    pub(crate) fn spawn(
        path: String,
        dispatcher: Dispatcher,
        settings: TreeSettings,
        live: Arc<AtomicUsize>,
    ) -> (mpsc::Sender<Envelope>, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(settings.mailbox_size);
        live.fetch_add(1, Ordering::SeqCst);
        let actor = Self {
            path,
            receiver,
            children: HashMap::new(),
            dispatcher,
            settings,
            live,
        };
        (sender, tokio::spawn(actor.run()))
    }

    fn is_root(&self) -> bool {
        self.path == ROOT_PATH
    }

    async fn run(mut self) {
        debug!(path = %self.path, "Actor started");

        loop {
            let next = if self.is_root() {
                self.receiver.recv().await
            } else {
                match tokio::time::timeout(self.settings.idle_timeout, self.receiver.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        self.evict().await;
                        break;
                    }
                }
            };
            let Some(envelope) = next else { break };
            self.handle(envelope).await;
        }

        // Children drain their mailboxes once their senders are gone.
        let children: Vec<Child> = self.children.drain().map(|(_, child)| child).collect();
        for child in children {
            if let Some(backlog) = child.backlog {
                let _ = backlog.await;
            }
            drop(child.sender);
            if let Err(e) = child.handle.await {
                warn!(path = %self.path, error = %e, "Child actor panicked");
            }
        }

        self.live.fetch_sub(1, Ordering::SeqCst);
        debug!(path = %self.path, "Actor stopped");
    }

    /// Closes the mailbox and serves whatever was already queued.
    async fn evict(&mut self) {
        info!(path = %self.path, idle_ms = self.settings.idle_timeout.as_millis() as u64, "Evicting idle actor");
        self.receiver.close();
        while let Some(envelope) = self.receiver.recv().await {
            self.handle(envelope).await;
        }
    }

    async fn handle(&mut self, envelope: Envelope) {
        match child_path(&self.path, &envelope.request.path) {
            Some(child) => self.forward(child, envelope).await,
            None => {
                let Envelope {
                    request,
                    scope,
                    respond_to,
                } = envelope;
                let dispatched = self.dispatcher.handle_request(request, scope).await;
                if respond_to.send(dispatched).is_err() {
                    debug!(path = %self.path, "Requester went away");
                }
            }
        }
    }

    /// Hands `envelope` to the child owning the next segment.
    ///
    /// Never waits for mailbox space: a busy subtree must not hold up requests
    /// bound for its siblings.
    async fn forward(&mut self, child: String, envelope: Envelope) {
        let Err(envelope) = self.try_forward(&child, envelope).await else {
            return;
        };

        // The child closed its mailbox between our lookup and the send.
        debug!(path = %child, "Child evicted, respawning");
        if let Err(envelope) = self.try_forward(&child, envelope).await {
            reply_unavailable(&child, envelope);
        }
    }

    /// Gives the envelope back only when the child's mailbox is closed.
    async fn try_forward(&mut self, path: &str, envelope: Envelope) -> Result<(), Envelope> {
        let child = self.child(path).await;
        let pending = child.backlog.take().filter(|task| !task.is_finished());
        let envelope = match pending {
            Some(_) => envelope,
            None => match child.sender.try_send(envelope) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Closed(envelope)) => return Err(envelope),
                Err(TrySendError::Full(envelope)) => envelope,
            },
        };

        debug!(path, "Mailbox full, queueing forward");
        let sender = child.sender.clone();
        let path = path.to_string();
        child.backlog = Some(tokio::spawn(async move {
            if let Some(previous) = pending {
                let _ = previous.await;
            }
            if let Err(SendError(envelope)) = sender.send(envelope).await {
                reply_unavailable(&path, envelope);
            }
        }));
        Ok(())
    }

    /// The live child for `path`, spawning one if it is missing or evicted.
    ///
    /// An evicted child is awaited first so it finishes its queued messages
    /// before its replacement starts: a path never has two active actors.
    async fn child(&mut self, path: &str) -> &mut Child {
        if self
            .children
            .get(path)
            .is_some_and(|child| child.sender.is_closed())
        {
            if let Some(stale) = self.children.remove(path) {
                drop(stale.sender);
                if let Err(e) = stale.handle.await {
                    warn!(path, error = %e, "Evicted actor panicked");
                }
            }
        }

        self.children.entry(path.to_string()).or_insert_with(|| {
            let (sender, handle) = PathActor::spawn(
                path.to_string(),
                self.dispatcher.clone(),
                self.settings,
                self.live.clone(),
            );
            debug!(parent = %self.path, path, "Child spawned");
            Child {
                sender,
                handle,
                backlog: None,
            }
        })
    }
}

fn reply_unavailable(path: &str, envelope: Envelope) {
    warn!(path, "Child actor unavailable");
    let failed = Dispatched::failed(
        DispatchError::Internal("Actor unavailable".into()),
        envelope.scope,
    );
    let _ = envelope.respond_to.send(failed);
}

/// The path of the direct child of `own` on the way to `target`.
///
/// `None` when `own` should handle `target` itself: the target is `own`, or it is
/// not a well-formed path below it.
pub(crate) fn child_path(own: &str, target: &str) -> Option<String> {
    let target_parts = segments(target)?;
    let own_parts = if own == ROOT_PATH {
        Vec::new()
    } else {
        segments(own)?
    };
    if target_parts.len() <= own_parts.len() || !target_parts.starts_with(&own_parts) {
        return None;
    }
    Some(format!("/{}", target_parts[..=own_parts.len()].join("/")))
}
