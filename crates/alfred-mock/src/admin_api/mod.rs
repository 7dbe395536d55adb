//! Administrative endpoints, served on the mock listener.
//!
//! - `POST /logger` changes the log level at runtime
//! - `GET /alfred/health` and `GET /alfred/mocks` describe the live snapshot
//! - `PATCH /alfred` deep-merges a partial definition into one mock
//! - `POST /alfred/delay` adds a temporary global latency offset
//! - `POST /alfred/reload` re-reads the mocks directory
//! - `DELETE /alfred/db` empties the key-value store
//!
//! These routes are checked before mock matching, so a mock can never shadow
//! them.

mod handlers;
mod router;
mod types;

pub use router::route_admin;
pub use types::{HealthResponse, MockSummary};
