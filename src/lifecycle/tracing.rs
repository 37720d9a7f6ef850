//! # Observability & Tracing
//!
//! [`setup_tracing`] installs a compact `tracing-subscriber` formatter filtered by
//! `RUST_LOG` (default `info`). Module paths are hidden (`with_target(false)`)
//! because every event already carries its own structured fields.
//!
//! ## What Gets Traced
//!
//! - **Requests**: one `handle_request` span per request with `path` and `command`,
//!   closed by a `Responded` event carrying `status` and `duration_ms`.
//! - **Interceptors**: `stage` and `interceptor` name for every interceptor that runs
//!   (debug), and failures (info). FINAL-stage failures are logged at warn.
//! - **Actors**: storage and path actors log startup, eviction and shutdown.
//! - **Keys**: requests presenting a valid master key are logged at warn with the
//!   key truncated.
//!
//! ## Usage Examples
//!
//! ```bash
//! # Request summaries (default)
//! RUST_LOG=info cargo run
//!
//! # Every interceptor, storage call and actor spawn
//! RUST_LOG=debug cargo run
//!
//! # Only the actor tree
//! RUST_LOG=resource_dispatch::actors=debug cargo run
//! ```
//!
//! With `RUST_LOG=info` a request through the demo looks like:
//!
//! ```text
//! INFO handle_request{path=/users command=POST}: Received request client_ip=127.0.0.1
//! INFO Created class=users id=1 size=1
//! INFO handle_request{path=/users command=POST}: Responded status=201 duration_ms=0
//! ```

use tracing_subscriber::EnvFilter;

pub fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
