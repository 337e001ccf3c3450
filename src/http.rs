//! HTTP server for the Prometheus metrics endpoint.
//!
//! The monitor loop is plain blocking code, so the server gets its own thread
//! with a single-threaded tokio runtime.

use crate::logger::{Event, SharedLogger};
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::thread;

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

/// Serves `/metrics` on `0.0.0.0:port` from a background thread.
///
/// The thread is never joined; it dies with the process.
pub fn spawn_metrics_server(port: u16, logger: SharedLogger) -> Result<(), String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("cannot build HTTP runtime: {}", e))?;

    thread::Builder::new()
        .name("metrics-http".to_string())
        .spawn(move || runtime.block_on(run_http_server(port, logger)))
        .map_err(|e| format!("cannot spawn HTTP thread: {}", e))?;

    Ok(())
}

async fn run_http_server(port: u16, logger: SharedLogger) {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            logger.log(&Event::Warning {
                message: &format!("Failed to bind metrics endpoint on {}: {}", addr, e),
            });
            return;
        }
    };

    logger.log(&Event::Info {
        message: &format!("Prometheus metrics at http://{}/metrics", addr),
    });

    if let Err(e) = axum::serve(listener, app).await {
        logger.log(&Event::Warning {
            message: &format!("Metrics endpoint stopped: {}", e),
        });
    }
}
