//! Development server: static files from the output tree plus the live
//! reload socket on the same port.

mod lifecycle;
mod path;
mod response;
mod upgrade;

pub use lifecycle::{DevServer, ServeContext};

use anyhow::Result;
use tiny_http::{Method, Request, Server};

use crate::config::ProjectConfig;
use crate::{actor::Coordinator, log};

/// `serve`: watch, build, serve, rebuild on change until Ctrl+C.
pub fn run_serve(config: ProjectConfig) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = crossbeam::channel::unbounded::<()>();
    crate::core::register_shutdown(shutdown_tx);

    crate::cli::build::runtime()?.block_on(
        Coordinator::with_config(config)
            .with_shutdown_signal(shutdown_rx)
            .run(),
    )
}

fn run_request_loop(server: &Server, pool: &rayon::ThreadPool, context: &std::sync::Arc<ServeContext>) {
    for request in server.incoming_requests() {
        let context = std::sync::Arc::clone(context);
        pool.spawn(move || {
            if let Err(e) = handle_request(request, &context) {
                log!("serve"; "request error: {e:#}");
            }
        });
    }
}

/// Handle a single HTTP request
fn handle_request(request: Request, context: &ServeContext) -> Result<()> {
    if crate::core::is_shutdown() {
        return response::respond_unavailable(request);
    }

    if !matches!(request.method(), Method::Get | Method::Head) {
        return response::respond_method_not_allowed(request);
    }

    if path::url_path(request.url()) == upgrade::WS_PATH {
        return upgrade::respond_upgrade(request, &context.ws_tx);
    }

    match path::resolve_path(request.url(), &context.output_root) {
        Some(file) => response::respond_file(request, &file),
        None => response::respond_not_found(request),
    }
}
