use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::info;

use cowork::engine::Engine;
use cowork::notify::NotifyHub;
use cowork::seed::Seed;
use cowork::wire::{self, CoworkFactory};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("COWORK_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    cowork::observability::init(metrics_port)?;

    let port = std::env::var("COWORK_PORT").unwrap_or_else(|_| "5433".into());
    let bind = std::env::var("COWORK_BIND").unwrap_or_else(|_| "0.0.0.0".into());
    let seed_path = std::env::var("COWORK_SEED").ok();
    let max_connections: usize = std::env::var("COWORK_MAX_CONNECTIONS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(256);

    let tls_cert = std::env::var("COWORK_TLS_CERT").ok();
    let tls_key = std::env::var("COWORK_TLS_KEY").ok();
    let tls_acceptor =
        cowork::tls::load_tls_acceptor(tls_cert.as_deref(), tls_key.as_deref())?;

    let seed = match &seed_path {
        Some(path) => Seed::from_path(Path::new(path))?,
        None => Seed::bundled()?,
    };
    let engine = Arc::new(Engine::new(Arc::new(NotifyHub::new())));
    let directory = Arc::new(seed.load_into(&engine).await?);
    let factory = Arc::new(CoworkFactory::new(engine, directory));
    let semaphore = Arc::new(Semaphore::new(max_connections));

    let addr = format!("{bind}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("cowork listening on {addr}");
    info!("  seed: {}", seed_path.as_deref().unwrap_or("bundled"));
    info!("  max_connections: {max_connections}");
    info!("  tls: {}", if tls_acceptor.is_some() { "enabled" } else { "disabled" });
    info!("  metrics: {}", metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    // Stop accepting on SIGTERM/ctrl-c, then drain in-flight connections
    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (socket, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!("accept error: {e}");
                        continue;
                    }
                };

                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!("connection limit reached, rejecting {peer}");
                        metrics::counter!(cowork::observability::CONNECTIONS_REJECTED_TOTAL).increment(1);
                        drop(socket);
                        continue;
                    }
                };

                info!("connection from {peer}");
                metrics::counter!(cowork::observability::CONNECTIONS_TOTAL).increment(1);
                metrics::gauge!(cowork::observability::CONNECTIONS_ACTIVE).increment(1.0);
                let factory = factory.clone();
                let tls = tls_acceptor.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = wire::process_connection(socket, factory, tls).await {
                        tracing::error!("connection error from {peer}: {e}");
                    }
                    metrics::gauge!(cowork::observability::CONNECTIONS_ACTIVE).decrement(1.0);
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }

    // Up to 10s for open sessions to finish
    info!("draining connections...");
    let drain_deadline = tokio::time::sleep(std::time::Duration::from_secs(10));
    tokio::pin!(drain_deadline);

    loop {
        if semaphore.available_permits() == max_connections {
            info!("all connections drained");
            break;
        }
        tokio::select! {
            _ = &mut drain_deadline => {
                let remaining = max_connections - semaphore.available_permits();
                tracing::warn!("drain timeout, {remaining} connections still open");
                break;
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {}
        }
    }

    info!("cowork stopped");
    Ok(())
}
