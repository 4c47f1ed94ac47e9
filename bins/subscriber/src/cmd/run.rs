use std::sync::Arc;

use broker::{MqttConnector, SessionManager, Supervisor};
use dialog_sink::{DialogDispatcher, FileSink};
use subscriber_api::{MessageHandler, SecretsDir, SystemClock, TokioSleeper};
use tokio_util::sync::CancellationToken;

use crate::config::{RunArgs, SubscriberConfig};
use crate::error::AppError;

pub async fn run(args: RunArgs) -> Result<(), AppError> {
    tracing::info!("dialog-subscriber starting");

    // --- Load config ---
    let config = SubscriberConfig::load(&args.config)?;
    let params = Arc::new(config.to_params());
    tracing::info!(config = %args.config, ?params, "loaded config");

    // --- Routing + sink ---
    let routes = config.routing_table()?;
    for (id, prefix) in routes.iter() {
        tracing::info!(dialog_id = %id, %prefix, "route enabled");
    }

    let sink = FileSink::new(&config.output_dir, Arc::new(SystemClock));
    sink.ensure_dir().map_err(AppError::Output)?;
    tracing::info!(dir = %sink.dir().display(), "output directory ready");

    let handler: Arc<dyn MessageHandler> = Arc::new(DialogDispatcher::new(routes, sink));

    // --- Broker session ---
    let mut manager = SessionManager::new(
        params,
        Arc::new(MqttConnector),
        Arc::new(SecretsDir::new(&config.secrets_dir)),
    );
    let supervisor = Supervisor::new(config.retry_delay(), Arc::new(TokioSleeper));

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();
    let shutdown = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("shutting down...");
                shutdown.cancel();
            }
            Err(e) => tracing::error!(error = %e, "ctrl_c listener failed"),
        }
    });

    supervisor.run(&mut manager, handler, token).await;

    tracing::info!("shutdown complete");
    Ok(())
}
