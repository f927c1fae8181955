use std::sync::Arc;

use anyhow::Context;
use pdfgate::probe::{ChromiumProbe, ExecutableProbe};
use pdfgate::{Config, DataProvider, Gate};
use pdfgate_server::browser::{ChromiumFactory, ChromiumRenderer};
use pdfgate_server::registry::load_registry;
use pdfgate_server::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env();
    log::info!("starting with {:?}", config);

    let mut probe = ChromiumProbe::new(config.chrome_path.clone());
    if config.skip_version_check {
        probe = probe.with_version_check(None);
    }

    let executable = probe.locate_executable()?;
    log::info!("using browser at {}", executable.display());

    let provider: Option<Arc<dyn DataProvider>> = match &config.registry_file {
        Some(path) => Some(Arc::new(load_registry(path)?)),
        None => None,
    };

    let gate = Gate::from_config(ChromiumFactory::new(executable), &config);
    let state = AppState::new(gate, ChromiumRenderer::default(), provider);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("binding port {}", config.port))?;
    log::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(err) = state.gate().shutdown().await {
        log::warn!("browser did not shut down cleanly: {}", err);
    }

    log::info!("stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for ctrl-c: {}", err);
            futures::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                log::error!("failed to listen for SIGTERM: {}", err);
                futures::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = futures::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => (),
        _ = terminate => (),
    }

    log::info!("shutdown signal received, draining requests");
}
