//! Operator HTTP surface.
//!
//! A thin actix-web layer over the supervisor and the configuration store:
//! status snapshots, per-chain restart and strategy switching, bulk listener
//! control, contract enable/disable toggles, and process health.

use actix_web::middleware::NormalizePath;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use serde::Deserialize;
use std::{sync::Arc, time::Instant};
use tracing::info;

use crate::{
	models::IngestStrategy,
	repositories::ContractConfigRepositoryTrait,
	services::supervisor::{Supervisor, SupervisorError},
};

/// Shared state handed to every route.
pub struct ApiState {
	pub supervisor: Arc<Supervisor>,
	pub contracts: Arc<dyn ContractConfigRepositoryTrait>,
	pub started_at: Instant,
}

pub type ApiStateData = web::Data<Arc<ApiState>>;

fn supervisor_error_response(err: SupervisorError) -> HttpResponse {
	match err {
		SupervisorError::ChainNotFound(id) => {
			HttpResponse::NotFound().json(serde_json::json!({ "error": format!("chain {} not found", id) }))
		}
		other => HttpResponse::InternalServerError()
			.json(serde_json::json!({ "error": other.to_string() })),
	}
}

async fn status_handler(state: ApiStateData) -> impl Responder {
	HttpResponse::Ok().json(state.supervisor.status().await)
}

async fn chain_status_handler(state: ApiStateData, path: web::Path<i64>) -> impl Responder {
	match state.supervisor.chain_status(path.into_inner()).await {
		Ok(snapshot) => HttpResponse::Ok().json(snapshot),
		Err(e) => supervisor_error_response(e),
	}
}

async fn restart_chain_handler(state: ApiStateData, path: web::Path<i64>) -> impl Responder {
	let chain_id = path.into_inner();
	match state.supervisor.restart_listener(chain_id).await {
		Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "restarted": chain_id })),
		Err(e) => supervisor_error_response(e),
	}
}

#[derive(Debug, Deserialize)]
struct StrategyBody {
	strategy: IngestStrategy,
}

async fn switch_strategy_handler(
	state: ApiStateData,
	path: web::Path<i64>,
	body: web::Json<StrategyBody>,
) -> impl Responder {
	let chain_id = path.into_inner();
	match state
		.supervisor
		.switch_strategy(chain_id, body.strategy)
		.await
	{
		Ok(()) => HttpResponse::Ok().json(serde_json::json!({
			"chain_id": chain_id,
			"strategy": body.strategy.to_string(),
		})),
		Err(e) => supervisor_error_response(e),
	}
}

async fn listeners_start_handler(state: ApiStateData) -> impl Responder {
	match state.supervisor.start_all().await {
		Ok(started) => HttpResponse::Ok().json(serde_json::json!({ "started": started })),
		Err(e) => supervisor_error_response(e),
	}
}

async fn listeners_stop_handler(state: ApiStateData) -> impl Responder {
	state.supervisor.stop_all().await;
	HttpResponse::Ok().json(serde_json::json!({ "stopped": true }))
}

async fn contracts_by_symbol_handler(
	state: ApiStateData,
	path: web::Path<String>,
) -> impl Responder {
	match state.contracts.get_by_symbol(&path.into_inner()).await {
		Ok(contracts) => HttpResponse::Ok().json(contracts),
		Err(e) => HttpResponse::InternalServerError()
			.json(serde_json::json!({ "error": e.to_string() })),
	}
}

async fn toggle_symbol(state: &ApiState, symbol: &str, enabled: bool) -> HttpResponse {
	match state.contracts.set_enabled_by_symbol(symbol, enabled).await {
		Ok(updated) => HttpResponse::Ok().json(serde_json::json!({ "updated": updated })),
		Err(e) => HttpResponse::InternalServerError()
			.json(serde_json::json!({ "error": e.to_string() })),
	}
}

async fn enable_symbol_handler(state: ApiStateData, path: web::Path<String>) -> impl Responder {
	toggle_symbol(&state, &path.into_inner(), true).await
}

async fn disable_symbol_handler(state: ApiStateData, path: web::Path<String>) -> impl Responder {
	toggle_symbol(&state, &path.into_inner(), false).await
}

async fn toggle_chain(state: &ApiState, chain_id: i64, enabled: bool) -> HttpResponse {
	match state.contracts.set_enabled_for_chain(chain_id, enabled).await {
		Ok(updated) => HttpResponse::Ok().json(serde_json::json!({ "updated": updated })),
		Err(e) => HttpResponse::InternalServerError()
			.json(serde_json::json!({ "error": e.to_string() })),
	}
}

async fn enable_chain_handler(state: ApiStateData, path: web::Path<i64>) -> impl Responder {
	toggle_chain(&state, path.into_inner(), true).await
}

async fn disable_chain_handler(state: ApiStateData, path: web::Path<i64>) -> impl Responder {
	toggle_chain(&state, path.into_inner(), false).await
}

async fn health_handler(state: ApiStateData) -> impl Responder {
	let memory_bytes = sysinfo::get_current_pid().ok().and_then(|pid| {
		let mut system = sysinfo::System::new();
		system.refresh_all();
		system.process(pid).map(|p| p.memory())
	});

	HttpResponse::Ok().json(serde_json::json!({
		"status": "ok",
		"uptime_secs": state.started_at.elapsed().as_secs(),
		"memory_bytes": memory_bytes,
	}))
}

/// Creates the operator HTTP server.
pub fn create_api_server(
	bind_address: String,
	state: Arc<ApiState>,
) -> std::io::Result<actix_web::dev::Server> {
	info!("Starting operator API on {}", bind_address);

	Ok(HttpServer::new(move || {
		App::new()
			.wrap(NormalizePath::trim())
			.app_data(web::Data::new(state.clone()))
			.route("/blockchain/status", web::get().to(status_handler))
			.route(
				"/blockchain/chains/{id}/status",
				web::get().to(chain_status_handler),
			)
			.route(
				"/blockchain/chains/{id}/restart",
				web::post().to(restart_chain_handler),
			)
			.route(
				"/blockchain/chains/{id}/strategy",
				web::post().to(switch_strategy_handler),
			)
			.route(
				"/blockchain/listeners/start",
				web::post().to(listeners_start_handler),
			)
			.route(
				"/blockchain/listeners/stop",
				web::post().to(listeners_stop_handler),
			)
			.route(
				"/blockchain/contracts/symbol/{sym}",
				web::get().to(contracts_by_symbol_handler),
			)
			.route(
				"/blockchain/contracts/enable-symbol/{sym}",
				web::post().to(enable_symbol_handler),
			)
			.route(
				"/blockchain/contracts/disable-symbol/{sym}",
				web::post().to(disable_symbol_handler),
			)
			.route(
				"/blockchain/contracts/enable-chain/{id}",
				web::post().to(enable_chain_handler),
			)
			.route(
				"/blockchain/contracts/disable-chain/{id}",
				web::post().to(disable_chain_handler),
			)
			.route("/worker/health", web::get().to(health_handler))
	})
	.workers(2)
	.bind(bind_address)?
	.shutdown_timeout(5)
	.run())
}
