//! HTTP mock server.
//!
//! Mocks are JSON definitions loaded from a directory. Each inbound request is
//! matched against the live snapshot in declaration order; the first match
//! has its helpers resolved, optional JavaScript hooks run, its templates
//! rendered and its declared latency applied. Follow-up requests declared on
//! the mock fire in the background once the response is built.

pub mod actions;
pub mod admin_api;
pub mod backends;
pub mod config;
pub mod engine;
pub mod helpers;
pub mod logging;
pub mod matcher;
pub mod mock;
pub mod request;
pub mod response;
pub mod scripting;
pub mod server;
pub mod store;
pub mod template;

pub use config::Config;
pub use engine::{MockEngine, ReloadSummary};
pub use request::MockRequest;
pub use response::MockResponse;
pub use server::{AppState, MockServer};
pub use store::{create_store, KeyValueStore};
