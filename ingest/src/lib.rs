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

//! The Genesis DAO block ingestor.
//!
//! A single long-lived worker follows the chain head, persists each block's
//! envelope and projects its effects onto the relational view inside one
//! transaction per block. Blocks apply in strict height order; divergence
//! between chain and database triggers a full resync.

use std::{sync::Arc, time::Duration};

use sqlx::SqlitePool;
use substrate_prometheus_endpoint::Registry;

use gdao_chain_client::ChainApi;
use gdao_storage::cache::Cache;

mod error;
pub mod metadata;
mod metrics;
pub mod pipeline;
#[cfg(test)]
mod tests;
mod worker;

pub use error::IngestError;
pub use metadata::{HashAlgorithm, MetadataClient};
pub use worker::{sync_initial_accounts, Ingestor};

pub(crate) const LOG_TARGET: &str = "gdao::ingest";

/// Ingestor initialization parameters.
pub struct IngestorParams<C: ChainApi> {
	/// Chain RPC access.
	pub chain: Arc<C>,
	/// Projection database handle.
	pub pool: SqlitePool,
	/// In-process cache receiving the current block broadcast.
	pub cache: Cache,
	/// Off-core metadata downloader.
	pub metadata_client: Arc<dyn MetadataClient>,
	/// Content hash used to verify downloaded metadata.
	pub hash_algorithm: HashAlgorithm,
	/// Expected block production interval; each tick takes at least this long.
	pub block_interval: Duration,
	/// Retry delay schedule for outbound chain calls, in seconds.
	pub retry_delays: Vec<u64>,
	/// Prometheus metric registry.
	pub prometheus_registry: Option<Registry>,
}

/// Start the ingestor worker.
///
/// This is a thin shim around building and running an [`Ingestor`]; it only
/// returns on an unrecoverable error.
pub async fn start_ingestor<C: ChainApi + 'static>(
	params: IngestorParams<C>,
) -> Result<(), IngestError> {
	let metrics = params.prometheus_registry.as_ref().and_then(|registry| {
		match metrics::Metrics::register(registry) {
			Ok(metrics) => {
				log::debug!(target: LOG_TARGET, "Registered ingestor metrics");
				Some(metrics)
			},
			Err(err) => {
				log::debug!(target: LOG_TARGET, "Failed to register metrics: {err:?}");
				None
			},
		}
	});

	let worker = Ingestor::new(params, metrics);
	worker.run().await
}
