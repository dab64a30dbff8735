use machine_job_server::config::Config;
use machine_job_server::job_control::{
    BroadcastSink, JobOrderController, JobTicker, LogSink, Notifier,
};
use machine_job_server::{opcua_server, ws_bridge};
use std::sync::Arc;
use tokio::sync::broadcast;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::new();
    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Starting {} with job order control", config.application_name);

    // Job status events fan out to the WebSocket bridge
    let (events_tx, _events_rx) = broadcast::channel(100);

    let (controller, changes) = JobOrderController::in_memory();
    let controller = Arc::new(controller);

    let notifier = Notifier::new()
        .with_sink(Arc::new(LogSink))
        .with_sink(Arc::new(BroadcastSink::new(events_tx.clone())));
    let notifier_task = tokio::spawn(notifier.run(changes));

    let ticker = if config.auto_progress() {
        let ticker = JobTicker::new(controller.clone(), config.ticker_config());
        tokio::spawn(async move { ticker.run().await })
    } else {
        tracing::info!("Auto-progression disabled");
        tokio::spawn(std::future::pending::<()>())
    };

    let ws_state = ws_bridge::AppState {
        events: events_tx,
        job_list: controller.subscribe_job_list(),
    };
    let ws_port = config.ws_port;
    let ws_server = tokio::spawn(async move {
        if let Err(e) = ws_bridge::start_ws_server(ws_port, ws_state).await {
            tracing::error!("WebSocket server error: {}", e);
        }
    });

    let opcua_config = config.clone();
    let opcua_controller = controller.clone();
    let opcua_task = tokio::spawn(async move {
        if let Err(e) = opcua_server::start_job_server(opcua_config, opcua_controller).await {
            tracing::error!("OPC UA server error: {}", e);
        }
    });

    tracing::info!("Backend initialized:");
    tracing::info!("  - OPC UA Server on port {}", config.opcua_port);
    tracing::info!("  - WebSocket on port {}", config.ws_port);
    if config.auto_progress() {
        tracing::info!(
            "  - Job ticker every {} ms, auto-stop after {} ms",
            config.tick_interval_ms,
            config.auto_stop_after_ms
        );
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        _ = ws_server => {
            tracing::info!("WebSocket server terminated");
        }
        _ = opcua_task => {
            tracing::info!("OPC UA server terminated");
        }
        _ = ticker => {
            tracing::info!("Job ticker terminated");
        }
        _ = notifier_task => {
            tracing::info!("Notifier terminated");
        }
    }

    tracing::info!("Shutting down");
}
