use std::{error::Error, sync::Arc, time::Instant};

use tracing::{error, info};

use chainfeed::{
	api::{self, ApiState},
	bootstrap,
	models::IndexerSettings,
	utils::setup_logging,
};

#[tokio::main]
async fn main() {
	if let Err(e) = run().await {
		eprintln!("Startup failed: {}", e);
		std::process::exit(1);
	}
}

async fn run() -> Result<(), Box<dyn Error + Send + Sync>> {
	setup_logging()?;

	let settings = IndexerSettings::from_env();
	let services = bootstrap::initialize_services(settings).await?;

	// Dispatcher consumer first, so nothing enqueued is left waiting.
	let consumer = services.dispatcher.start();

	services.supervisor.start_all().await?;
	let reload_loop = services.supervisor.spawn_reload_loop();

	let port: u16 = std::env::var("PORT")
		.ok()
		.and_then(|p| p.parse().ok())
		.unwrap_or(3000);
	let api_state = Arc::new(ApiState {
		supervisor: services.supervisor.clone(),
		contracts: services.contracts.clone(),
		started_at: Instant::now(),
	});
	let server = api::create_api_server(format!("0.0.0.0:{}", port), api_state)?;
	let server_handle = server.handle();
	let server_task = tokio::spawn(server);

	info!("Service started on port {}. Press Ctrl+C to shut down", port);
	wait_for_shutdown_signal().await;
	info!("Shutdown signal received, stopping services");

	services.supervisor.shutdown().await;
	reload_loop.abort();

	server_handle.stop(true).await;
	if let Err(e) = server_task.await {
		error!("Operator API shutdown error: {}", e);
	}
	if let Err(e) = consumer.await {
		error!("Dispatcher shutdown error: {}", e);
	}

	info!("Shutdown complete");
	Ok(())
}

async fn wait_for_shutdown_signal() {
	#[cfg(unix)]
	{
		let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(signal) => signal,
			Err(e) => {
				error!("Failed to install SIGTERM handler: {}", e);
				let _ = tokio::signal::ctrl_c().await;
				return;
			}
		};
		tokio::select! {
			_ = tokio::signal::ctrl_c() => {}
			_ = sigterm.recv() => {}
		}
	}
	#[cfg(not(unix))]
	{
		let _ = tokio::signal::ctrl_c().await;
	}
}
