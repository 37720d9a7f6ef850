//! # Resource Dispatch
//!
//! > **A resource-oriented request pipeline for backends.**
//!
//! Every request is a command (`GET`, `POST`, `PUT`, `DELETE`) on a resource path.
//! Paths are classified structurally: one segment is a collection (`/users`) and
//! two segments are an item (`/users/42`). Deeper paths such as `/users/42/books`
//! are invalid unless an application function claims them; registered functions
//! win over the structural kinds at any depth. Collections and items go to a
//! generic executor that turns the request into storage calls. Around that core,
//! registered interceptors run in four stages:
//!
//! | Stage | Runs | Can |
//! |---|---|---|
//! | `BEFORE_EXEC` | before the function or executor | rewrite the request, short-circuit with a response, abort |
//! | `AFTER_EXEC` | after a successful execution | rewrite the response |
//! | `ON_ERROR` | after any failure | replace the error with a response |
//! | `FINAL` | after the reply, in the background | observe |
//!
//! ## 🏗️ Design Philosophy
//!
//! ### Registration once, reads without locks
//! Functions and interceptors go into a [`RegistryBuilder`](registry::RegistryBuilder) at
//! startup and are frozen into an `Arc<Registry>`. Matching is a linear scan in
//! registration order, so the order you register in is the order things run in.
//!
//! ### Collaborators behind traits
//! Storage, authentication and master-key checks are the
//! [`StorageProvider`](providers::StorageProvider), [`AuthProvider`](providers::AuthProvider)
//! and [`KeyProvider`](providers::KeyProvider) traits. The crate ships an actor-backed
//! in-memory storage and a mock storage for tests.
//!
//! ### Per-request state
//! A [`RequestScope`](scope::RequestScope) is created per request and threaded through
//! every stage. Path parameters (`/{id}/convert` ⇒ `id`) land in it, interceptors add
//! to it, and `ON_ERROR` finds the error under `"error"`.
//!
//! ### Per-path serialization
//! The optional [`actors`] tree gives every resource path its own actor. Requests
//! for the same path are processed one at a time; different paths run in parallel.
//!
//! ## 🗺️ Module Tour
//!
//! - **Data**: [`message`], [`scope`], [`error`].
//! - **Matching**: [`pattern`] (path templates), [`classify`] (resource kinds and allowed commands).
//! - **Pipeline**: [`registry`], [`executor`], [`dispatch`], [`validator`].
//! - **Collaborators**: [`providers`] and the built-in [`interceptors`].
//! - **Runtime**: [`actors`], [`config`], [`lifecycle`].
//!
//! ## 🚀 Quick Start
//!
//! ```rust
//! use resource_dispatch::dispatch::Dispatcher;
//! use resource_dispatch::message::{Command, Message};
//! use resource_dispatch::providers::memory::StorageActor;
//! use resource_dispatch::registry::Registry;
//! use resource_dispatch::scope::RequestScope;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let (actor, storage) = StorageActor::with_counter_ids(16);
//! tokio::spawn(actor.run());
//!
//! let dispatcher = Dispatcher::new(Registry::empty(), Arc::new(storage), "files");
//! let reply = dispatcher
//!     .handle_request(Message::request(Command::Get, "/widgets/999"), RequestScope::new())
//!     .await
//!     .into_response();
//!
//! assert_eq!(reply.status, 404);
//! # }
//! ```
//!
//! ### Running the Demo
//!
//! ```bash
//! RUST_LOG=info cargo run
//! ```

pub mod actors;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod interceptors;
pub mod lifecycle;
pub mod message;
pub mod pattern;
pub mod providers;
pub mod registry;
pub mod scope;
pub mod validator;
