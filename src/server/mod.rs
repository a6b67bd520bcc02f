//! HTTP surface for the persona engine.
//!
//! A plain hyper accept loop: one spawned task per connection, a
//! `service_fn` that routes on method and path. No framework layer is
//! needed for eleven endpoints.

mod handlers;
mod routes;
mod wire;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::aggregate::AudienceAggregator;
use crate::audit::AuditLogger;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::monitor::HealthMonitor;
use crate::store::{AssignmentStore, AuditStore, ConfigStore, Database};

/// Shared state handed to every request handler.
pub struct AppState {
    pub config_store: ConfigStore,
    pub assignments: AssignmentStore,
    pub audit_store: AuditStore,
    pub audit: AuditLogger,
    pub monitor: HealthMonitor,
    pub aggregator: AudienceAggregator,
    /// Actor recorded for automatic (rule-driven) changes.
    pub system_actor: String,
    /// Actor recorded for administrative changes when the caller
    /// sends no X-Changed-By header.
    pub admin_actor: String,
}

impl AppState {
    pub fn new(config: &EngineConfig, db: Database) -> Self {
        let audit_store = AuditStore::new(db.clone());
        Self {
            config_store: ConfigStore::new(db.clone()),
            assignments: AssignmentStore::new(db.clone()),
            audit: AuditLogger::spawn(audit_store.clone()),
            audit_store,
            monitor: HealthMonitor::new(db.clone()),
            aggregator: AudienceAggregator::new(db),
            system_actor: config.engine.system_actor.clone(),
            admin_actor: config.engine.admin_actor.clone(),
        }
    }
}

/// Run the server until ctrl-c, then drain the audit channel and
/// return.
pub async fn serve(config: &EngineConfig, db: Database) -> Result<()> {
    let addr: SocketAddr = config
        .server
        .bind_addr
        .parse()
        .map_err(|e| crate::error::Error::Config(format!("invalid bind address: {e}")))?;

    let state = Arc::new(AppState::new(config, db));
    let listener = TcpListener::bind(addr).await?;
    info!("listening on http://{}", addr);

    let grace = Duration::from_secs(config.server.shutdown_grace_secs);
    let accept_state = Arc::clone(&state);

    let accept_loop = async move {
        loop {
            let (stream, remote_addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("accept error: {}", e);
                    continue;
                }
            };

            let state = Arc::clone(&accept_state);
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { routes::route(state, req).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(remote = %remote_addr, "connection error: {}", e);
                }
            });
        }
    };

    tokio::select! {
        _ = accept_loop => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("failed to listen for shutdown signal: {}", e);
            }
            info!("shutdown signal received, draining audit writes");
        }
    }

    // Give the audit writer a bounded window to drain.
    if tokio::time::timeout(grace, state.audit.flush()).await.is_err() {
        warn!(
            dropped = state.audit.dropped_count(),
            "audit drain timed out after {:?}", grace
        );
    }

    info!("server stopped");
    Ok(())
}
