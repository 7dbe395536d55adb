//! Route dispatch for the administrative endpoints.

use crate::admin_api::handlers::{delay, logger, mocks, system};
use crate::server::AppState;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Method, Response};
use tracing::debug;

/// Administrative routes
#[derive(Debug, PartialEq, Eq)]
enum AdminRoute {
    Logger,
    Health,
    Mocks,
    Patch,
    Delay,
    Reload,
    ClearStore,
}

impl AdminRoute {
    fn parse(method: &Method, path: &str) -> Option<Self> {
        let path = match path.strip_suffix('/') {
            Some(trimmed) if !trimmed.is_empty() => trimmed,
            _ => path,
        };

        match (method, path) {
            (&Method::POST, "/logger") => Some(AdminRoute::Logger),
            (&Method::GET, "/alfred/health") => Some(AdminRoute::Health),
            (&Method::GET, "/alfred/mocks") => Some(AdminRoute::Mocks),
            (&Method::PATCH, "/alfred") => Some(AdminRoute::Patch),
            (&Method::POST, "/alfred/delay") => Some(AdminRoute::Delay),
            (&Method::POST, "/alfred/reload") => Some(AdminRoute::Reload),
            (&Method::DELETE, "/alfred/db") => Some(AdminRoute::ClearStore),
            _ => None,
        }
    }
}

/// Serve an administrative request. `None` means the request is not
/// administrative and goes to mock matching.
pub async fn route_admin(
    method: &Method,
    path: &str,
    body: &Bytes,
    state: &AppState,
) -> Option<Response<Full<Bytes>>> {
    let route = AdminRoute::parse(method, path)?;
    debug!("Admin request: {} {}", method, path);

    let response = match route {
        AdminRoute::Logger => logger::handle_set_level(body, &state.log_level),
        AdminRoute::Health => system::handle_health(&state.engine),
        AdminRoute::Mocks => mocks::handle_list(&state.engine),
        AdminRoute::Patch => mocks::handle_patch(body, &state.engine).await,
        AdminRoute::Delay => delay::handle_delay(body, &state.engine),
        AdminRoute::Reload => system::handle_reload(&state.engine).await,
        AdminRoute::ClearStore => system::handle_clear_store(&state.engine),
    };
    Some(response)
}
