//! Tool Server (C7) entry point: loads configuration, wires C1-C6, starts
//! the Prometheus exporter, then drives the stdio JSON-RPC loop until
//! stdin closes. Exit codes per §6: 0 on a clean shutdown, non-zero
//! on a fatal startup failure (key generation, model load, or
//! non-writable audit directory).

use facegate_config::load_settings;
use facegate_server::{run_stdio_loop, App};
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _, Layer as _};

#[tokio::main]
async fn main() {
    let env = std::env::var("FACEGATE_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("fatal: failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(&settings);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting facegate-server");

    if settings.observability.metrics_enabled {
        let addr = std::net::SocketAddr::from(([127, 0, 0, 1], settings.server.metrics_port));
        match metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
        {
            Ok(()) => tracing::info!(%addr, "Prometheus exporter listening"),
            Err(e) => tracing::warn!(error = %e, "failed to start Prometheus exporter; continuing without it"),
        }
    }

    let app = match App::build(&settings) {
        Ok(app) => app,
        Err(e) => {
            tracing::error!(error = %e, "fatal startup failure");
            std::process::exit(1);
        }
    };

    tracing::info!("ready; reading JSON-RPC requests from stdin");
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    if let Err(e) = run_stdio_loop(&app.tool_server, stdin, stdout).await {
        tracing::error!(error = %e, "stdio loop terminated with an I/O error");
        std::process::exit(1);
    }

    tracing::info!("stdin closed; shutting down");
}

fn init_tracing(settings: &facegate_config::Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("facegate_server={}", settings.observability.log_level).into());

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}
