//! Auxiliary static file server for a single deployment.
//!
//! One server is spawned per deployment on the first free TCP port starting at 8000; failures
//! to bind are swallowed (logged) rather than failing the deployment. This crate does not try to reuse servers across
//! deployments — the spec flags that choice as an open question; the per-deployment
//! server is the simpler reading and is recorded as the decision in the project's design notes.

use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::record::ServerInfo;

const FIRST_PORT: u16 = 8000;
const PORT_SCAN_LIMIT: u16 = 200;

/// Tries to bind `127.0.0.1:<port>` for `port` in `8000..8000+200`, then spawns a fire-and-forget
/// static file server over `dir` on the bound socket. Returns `None` (logging a warning) if no
/// port in the scan range is free.
pub async fn try_start(dir: std::path::PathBuf) -> Option<ServerInfo> {
    for offset in 0..PORT_SCAN_LIMIT {
        let port = FIRST_PORT + offset;
        let addr: SocketAddr = ([127, 0, 0, 1], port).into();
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                let app = axum::Router::new()
                    .fallback_service(tower_http::services::ServeDir::new(dir.clone()));
                tokio::spawn(async move {
                    if let Err(e) = axum::serve(listener, app).await {
                        tracing::warn!(error = %e, "deployment aux server exited");
                    }
                });
                return Some(ServerInfo {
                    pid: std::process::id(),
                    port,
                    status: "running".to_string(),
                });
            }
            Err(_) => continue,
        }
    }
    tracing::warn!("no free port found for deployment aux server in scan range");
    None
}
