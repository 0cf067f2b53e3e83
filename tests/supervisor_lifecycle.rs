//! Supervisor scenarios: strategy switching, reconciliation against the
//! configuration store, status snapshots and failure isolation.

mod common;

use common::*;
use std::{sync::Arc, time::Duration};
use web3::types::U256;

use chainfeed::{
	models::IngestStrategy,
	repositories::{ChainConfigRepositoryTrait, InMemoryChainConfigRepository},
	services::supervisor::{Supervisor, SupervisorError},
};

const USDC_ADDR: u64 = 0xaa;

async fn supervised_harness(
	strategy: IngestStrategy,
	with_stream: bool,
	head: u64,
) -> (Harness, Arc<InMemoryChainConfigRepository>, Arc<Supervisor>) {
	let chain = chain_config(56, strategy, with_stream);
	let contract = erc20_contract(56, &addr(USDC_ADDR), "USDC", 6, true);
	let h = harness(chain.clone(), vec![contract], head, with_stream).await;

	let chain_repo = Arc::new(InMemoryChainConfigRepository::with_chains(vec![chain]).await);
	let supervisor = Supervisor::new(chain_repo.clone(), h.ctx.clone());
	(h, chain_repo, supervisor)
}

#[tokio::test(start_paused = true)]
async fn strategy_switch_push_to_pull_loses_nothing() {
	let (h, chain_repo, supervisor) = supervised_harness(IngestStrategy::Push, true, 200).await;
	let stream = h.stream.clone().unwrap();

	supervisor
		.adopt_chain(
			Arc::new(chain_repo.get(56).await.unwrap().unwrap()),
			h.adapter.clone(),
		)
		.await
		.unwrap();
	assert!(
		wait_until(
			|| async { stream.subscription_count().await == 1 },
			Duration::from_secs(5)
		)
		.await
	);

	// One event arrives over push before the switch.
	assert!(
		stream
			.emit_log(parse_log(&transfer_log_json(
				&addr(USDC_ADDR),
				150,
				0,
				&tx_hash(1),
				&addr(1),
				&addr(2),
				U256::from(100u64),
			)))
			.await
	);
	assert!(
		wait_until(
			|| async { h.dispatcher.queue_size().await == 1 },
			Duration::from_secs(5)
		)
		.await
	);

	// Switch to pull with the head at 200.
	supervisor
		.switch_strategy(56, IngestStrategy::Pull)
		.await
		.unwrap();

	let status = supervisor.chain_status(56).await.unwrap();
	assert_eq!(status.strategy, "pull");
	assert!(status.is_running);

	// New blocks appear after the switch; pull must capture them starting
	// right above head-at-switch.
	h.rpc.set_head(205);
	h.rpc.push_log(transfer_log_json(
		&addr(USDC_ADDR),
		203,
		0,
		&tx_hash(2),
		&addr(1),
		&addr(2),
		U256::from(100u64),
	));

	assert!(
		wait_until(
			|| async { h.dispatcher.queue_size().await >= 2 },
			Duration::from_secs(30)
		)
		.await
	);
	h.dispatcher.drain_pending().await;

	// Exactly two events total: one from push, one from pull, no
	// duplicates from the switchover window.
	let events = h.events.all_events().await;
	assert_eq!(events.len(), 2);
	assert_eq!(events[0].transaction_hash, tx_hash(1));
	assert_eq!(events[1].transaction_hash, tx_hash(2));

	supervisor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn switch_to_push_without_stream_degrades_to_pull() {
	let (h, chain_repo, supervisor) = supervised_harness(IngestStrategy::Pull, false, 100).await;

	supervisor
		.adopt_chain(
			Arc::new(chain_repo.get(56).await.unwrap().unwrap()),
			h.adapter.clone(),
		)
		.await
		.unwrap();

	// No streaming transport: the requested push strategy falls back to
	// pull instead of failing the chain.
	supervisor
		.switch_strategy(56, IngestStrategy::Push)
		.await
		.unwrap();

	let status = supervisor.chain_status(56).await.unwrap();
	assert_eq!(status.strategy, "pull");
	assert!(status.is_running);
	supervisor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reconcile_stops_disabled_chains() {
	let (h, chain_repo, supervisor) = supervised_harness(IngestStrategy::Pull, false, 100).await;

	supervisor
		.adopt_chain(
			Arc::new(chain_repo.get(56).await.unwrap().unwrap()),
			h.adapter.clone(),
		)
		.await
		.unwrap();
	assert_eq!(supervisor.status().await.chains.len(), 1);

	chain_repo.set_enabled(56, false).await.unwrap();
	supervisor.reconcile_chains().await;

	assert_eq!(supervisor.status().await.chains.len(), 0);
	assert!(matches!(
		supervisor.chain_status(56).await,
		Err(SupervisorError::ChainNotFound(56))
	));
	supervisor.shutdown().await;
}

#[tokio::test]
async fn restart_unknown_chain_reports_not_found() {
	let (_h, _chain_repo, supervisor) = supervised_harness(IngestStrategy::Pull, false, 100).await;
	assert!(matches!(
		supervisor.restart_listener(999).await,
		Err(SupervisorError::ChainNotFound(999))
	));
}

#[tokio::test(start_paused = true)]
async fn status_snapshot_reflects_pool_state() {
	let (h, chain_repo, supervisor) = supervised_harness(IngestStrategy::Pull, false, 100).await;

	let status = supervisor.status().await;
	assert_eq!(status.enabled_chains, 1);
	assert!(status.chains.is_empty());
	assert_eq!(status.handler_count, 1);

	supervisor
		.adopt_chain(
			Arc::new(chain_repo.get(56).await.unwrap().unwrap()),
			h.adapter.clone(),
		)
		.await
		.unwrap();

	let status = supervisor.status().await;
	assert_eq!(status.chains.len(), 1);
	assert_eq!(status.chains[0].chain_id, 56);
	assert!(status.chains[0].is_running);
	assert_eq!(status.chains[0].strategy, "pull");
	assert_eq!(status.queue_size, 0);

	let chain_status = supervisor.chain_status(56).await.unwrap();
	assert_eq!(chain_status.latest_block, Some(100));

	supervisor.shutdown().await;
	let status = supervisor.status().await;
	assert!(status.chains.is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_all_survives_individual_failures() {
	let (h, chain_repo, supervisor) = supervised_harness(IngestStrategy::Pull, false, 100).await;
	supervisor
		.adopt_chain(
			Arc::new(chain_repo.get(56).await.unwrap().unwrap()),
			h.adapter.clone(),
		)
		.await
		.unwrap();

	// A downed transport must not block shutdown.
	h.rpc.fail_method("eth_blockNumber");
	supervisor.shutdown().await;
	assert!(supervisor.status().await.chains.is_empty());
}
