// Copyright 2023-2024 Genesis DAO Foundation
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
// You may obtain a copy of the License at the root of this project source code

//! Subcommand implementations.

use std::{sync::Arc, time::Duration};

use rand::RngCore;
use substrate_prometheus_endpoint::Registry;

use gdao_chain_client::{
	retry::{with_retry, RetryContext},
	ChainRpcClient,
};
use gdao_ingest::{
	metadata::HttpMetadataClient, start_ingestor, sync_initial_accounts, IngestorParams,
};
use gdao_storage::cache::{Cache, CHALLENGE_KEY};

use crate::{config::Config, ServiceError, LOG_TARGET};

async fn connect_chain(config: &Config) -> Result<ChainRpcClient, ServiceError> {
	let client = with_retry(
		"connecting to chain node",
		RetryContext::default(),
		&config.retry_delays,
		|| ChainRpcClient::connect(&config.blockchain_url, &config.type_registry_preset),
	)
	.await?;
	Ok(client)
}

/// Start the ingestor and serve until interrupted. The loop exits at the next
/// tick boundary on ctrl-c; an open pipeline transaction rolls back.
pub async fn listen(config: Config) -> Result<(), ServiceError> {
	let hash_algorithm = config.hash_algorithm()?;
	let pool = gdao_storage::connect(&config.database_url).await?;
	let chain = Arc::new(connect_chain(&config).await?);

	let seeded = sync_initial_accounts(chain.as_ref(), &pool).await?;
	log::info!(target: LOG_TARGET, "Seeded {seeded} chain accounts");

	let registry = match config.prometheus_port {
		Some(port) => {
			let registry = Registry::new_custom(Some("gdao".into()), None)
				.map_err(|err| ServiceError::Config(err.to_string()))?;
			let addr: std::net::SocketAddr = ([0, 0, 0, 0], port).into();
			let endpoint_registry = registry.clone();
			tokio::spawn(async move {
				if let Err(err) =
					substrate_prometheus_endpoint::init_prometheus(addr, endpoint_registry).await
				{
					log::error!(target: LOG_TARGET, "Prometheus endpoint failed: {err:?}");
				}
			});
			Some(registry)
		},
		None => None,
	};

	let params = IngestorParams {
		chain,
		pool,
		cache: Cache::new(),
		metadata_client: Arc::new(HttpMetadataClient::default()),
		hash_algorithm,
		block_interval: Duration::from_secs(config.block_creation_interval),
		retry_delays: config.retry_delays.clone(),
		prometheus_registry: registry,
	};

	tokio::select! {
		result = start_ingestor(params) => result.map_err(Into::into),
		_ = tokio::signal::ctrl_c() => {
			log::info!(target: LOG_TARGET, "Interrupted, shutting down");
			Ok(())
		},
	}
}

/// One-shot projection wipe and account reseed.
pub async fn resync(config: Config) -> Result<(), ServiceError> {
	let pool = gdao_storage::connect(&config.database_url).await?;
	let chain = connect_chain(&config).await?;

	gdao_storage::clear_all(&pool).await?;
	let seeded = sync_initial_accounts(&chain, &pool).await?;
	log::info!(target: LOG_TARGET, "Projection cleared, reseeded {seeded} accounts");
	Ok(())
}

/// Rotate the process-wide signature challenge token until interrupted.
pub async fn refresh_challenge(config: Config) -> Result<(), ServiceError> {
	log::info!(target: LOG_TARGET, "Challenge refresher started.");
	let cache = Cache::new();
	let lifetime = Duration::from_secs(config.challenge_lifetime);

	loop {
		let mut token = [0u8; 64];
		rand::thread_rng().fill_bytes(&mut token);
		cache.set_with_ttl(
			CHALLENGE_KEY,
			serde_json::Value::String(hex::encode(token)),
			lifetime,
		);

		tokio::select! {
			_ = tokio::time::sleep(lifetime) => {},
			_ = tokio::signal::ctrl_c() => {
				log::info!(target: LOG_TARGET, "Interrupted, shutting down");
				return Ok(());
			},
		}
	}
}
