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

//! The ingestion worker loop.
//!
//! One tick: re-run a still unexecuted last block, fetch the chain head,
//! compare against the local high-water mark and either wait, apply the next
//! block, or catch up block-by-block. Divergence (local ahead of chain, or a
//! number claimed by a different hash) wipes the projection and reseeds it.

use std::{sync::Arc, time::Duration};

use sqlx::SqlitePool;
use tokio::time::Instant;

use gdao_chain_client::{
	retry::{with_retry, RetryContext, ALERTS_TARGET},
	ChainApi,
};
use gdao_primitives::{envelope::BlockEnvelope, BlockNumber};
use gdao_storage::{blocks, cache::Cache, clear_all, models::BlockRow, projection::accounts};

use crate::{
	metadata::{self, HashAlgorithm, MetadataClient},
	metric_inc, metric_set,
	metrics::Metrics,
	pipeline, IngestError, IngestorParams, LOG_TARGET,
};

/// Seed the accounts table from the chain's account map. Conflicts are
/// ignored, re-seeding an existing projection is safe.
pub async fn sync_initial_accounts<C: ChainApi>(
	chain: &C,
	pool: &SqlitePool,
) -> Result<usize, IngestError> {
	let addresses = chain.query_accounts().await?;
	let mut conn = pool.acquire().await.map_err(gdao_storage::StorageError::from)?;
	accounts::insert_ignore(&mut conn, &addresses).await?;
	Ok(addresses.len())
}

/// The long-lived ingestion worker. One instance per service process.
pub struct Ingestor<C: ChainApi> {
	chain: Arc<C>,
	pool: SqlitePool,
	cache: Cache,
	metadata_client: Arc<dyn MetadataClient>,
	hash_algorithm: HashAlgorithm,
	block_interval: Duration,
	retry_delays: Vec<u64>,
	metrics: Option<Metrics>,
}

impl<C: ChainApi + 'static> Ingestor<C> {
	pub(crate) fn new(params: IngestorParams<C>, metrics: Option<Metrics>) -> Self {
		let IngestorParams {
			chain,
			pool,
			cache,
			metadata_client,
			hash_algorithm,
			block_interval,
			retry_delays,
			prometheus_registry: _,
		} = params;

		Ingestor {
			chain,
			pool,
			cache,
			metadata_client,
			hash_algorithm,
			block_interval,
			retry_delays,
			metrics,
		}
	}

	/// Main loop. Runs until an unrecoverable error; a failed pipeline only
	/// skips to the next tick, where the block is retried once before the
	/// loop gives up on it.
	pub async fn run(mut self) -> Result<(), IngestError> {
		log::debug!(target: LOG_TARGET, "run ingestor, tick interval: {:?}", self.block_interval);
		loop {
			let started = Instant::now();
			match self.tick().await {
				Ok(()) => {},
				Err(IngestError::OutOfSync) => self.resync().await?,
				Err(IngestError::ParseBlock { number }) => {
					log::error!(
						target: LOG_TARGET,
						"Failed executing block #{number}, retrying on next tick"
					);
				},
				Err(err) => return Err(err),
			}
			self.sleep_remaining(started).await;
		}
	}

	/// One pass of the loop: recover a stuck block, fetch the head, dispatch
	/// on the head/local distance.
	pub(crate) async fn tick(&mut self) -> Result<(), IngestError> {
		let last = {
			let mut conn = self.pool.acquire().await.map_err(gdao_storage::StorageError::from)?;
			blocks::latest(&mut conn).await?
		};

		// a block persisted but never executed blocks the stream until it applies
		if let Some(block) = &last {
			if !block.executed {
				log::error!(
					target: LOG_TARGET,
					"Last Block was not executed. Retrying... number: {} | hash: {}",
					block.number,
					block.hash,
				);
				if self.execute_block(block).await.is_err() {
					log::error!(
						target: ALERTS_TARGET,
						"Block not executable. number: {} | hash: {}",
						block.number,
						block.hash,
					);
					return Err(IngestError::NotExecutable {
						number: block.number,
						hash: block.hash.clone(),
					});
				}
			}
		}
		let last_number = last.as_ref().map(|block| block.number).unwrap_or(-1);

		let current = self.fetch_block(None).await?;

		if current.number < last_number {
			// local projection is ahead of the chain, nothing to salvage
			return Err(IngestError::OutOfSync);
		}
		if current.number == last_number {
			if let Some(block) = &last {
				if block.hash != current.hash {
					log::error!(
						target: ALERTS_TARGET,
						"DB and chain are unrecoverably out of sync!"
					);
					return Err(IngestError::OutOfSync);
				}
			}
			log::info!(
				target: LOG_TARGET,
				"Waiting for new block | number {} | hash: {}",
				current.number,
				current.hash,
			);
			return Ok(());
		}
		if current.number == last_number + 1 {
			log::info!(
				target: LOG_TARGET,
				"Processing latest block | number: {} | hash: {}",
				current.number,
				current.hash,
			);
			return self.apply_block(&current).await;
		}

		// the head ran ahead, fetch the backlog by explicit number. Blocks are
		// persisted only when their turn comes, so the store never holds an
		// executed block with an unexecuted predecessor.
		let mut last_number = last_number;
		while last_number < current.number {
			let next_number = last_number + 1;
			log::info!(target: LOG_TARGET, "Catching up | number: {next_number}");
			if next_number == current.number {
				self.apply_block(&current).await?;
			} else {
				let next = self.fetch_block(Some(next_number)).await?;
				self.apply_block(&next).await?;
			}
			last_number = next_number;
		}
		Ok(())
	}

	/// Fetch a block envelope: the chain head when `number` is `None`, by
	/// explicit number otherwise. A block already persisted locally is reused
	/// instead of re-fetched, which makes re-applying after a crash cheap.
	pub(crate) async fn fetch_block(
		&self,
		number: Option<BlockNumber>,
	) -> Result<BlockEnvelope, IngestError> {
		if let Some(number) = number {
			let mut conn =
				self.pool.acquire().await.map_err(gdao_storage::StorageError::from)?;
			if let Some(row) = blocks::get_by_number(&mut conn, number).await? {
				return Ok(row.envelope());
			}
		}

		with_retry(
			"fetching block from chain",
			RetryContext::block(number, None),
			&self.retry_delays,
			|| async move { self.chain.get_block(None, number).await.map_err(IngestError::from) },
		)
		.await
	}

	/// Persist an envelope (reusing an identical stored row) and run the
	/// pipeline on it. A number already claimed by a different hash means
	/// chain and database diverged.
	async fn apply_block(&self, envelope: &BlockEnvelope) -> Result<(), IngestError> {
		let row = {
			let mut conn =
				self.pool.acquire().await.map_err(gdao_storage::StorageError::from)?;
			match blocks::get_by_hash(&mut conn, &envelope.hash).await? {
				Some(existing) => existing,
				None => match blocks::create(&mut conn, envelope).await {
					Ok(row) => row,
					Err(err) if err.is_unique_violation() => {
						log::error!(
							target: ALERTS_TARGET,
							"DB and chain are unrecoverably out of sync!"
						);
						return Err(IngestError::OutOfSync);
					},
					Err(err) => return Err(err.into()),
				},
			}
		};
		self.execute_block(&row).await
	}

	/// Run the pipeline on a block and dispatch its deferred metadata jobs.
	async fn execute_block(&self, block: &BlockRow) -> Result<(), IngestError> {
		match pipeline::execute_block(&self.pool, block, &self.cache).await {
			Ok(jobs) => {
				metric_inc!(self, gdao_blocks_executed);
				metric_set!(self, gdao_last_executed_block, block.number);
				metadata::spawn_jobs(
					&self.pool,
					&self.metadata_client,
					self.hash_algorithm,
					jobs,
				);
				Ok(())
			},
			Err(err) => {
				metric_inc!(self, gdao_parse_block_failures);
				Err(err)
			},
		}
	}

	/// Wipe the projection, reseed accounts from the chain and give the node
	/// one block interval of air before the loop restarts cold.
	async fn resync(&mut self) -> Result<(), IngestError> {
		log::info!(target: ALERTS_TARGET, "DB and chain are out of sync! Recreating DB...");
		metric_inc!(self, gdao_resyncs);

		clear_all(&self.pool).await?;
		let chain = self.chain.as_ref();
		let pool = &self.pool;
		with_retry(
			"fetching accounts from chain",
			RetryContext::default(),
			&self.retry_delays,
			|| async move { sync_initial_accounts(chain, pool).await },
		)
		.await?;
		self.cache.remove(gdao_storage::cache::CURRENT_BLOCK_KEY);

		tokio::time::sleep(self.block_interval).await;
		Ok(())
	}

	/// Stretch a tick to at least the block production interval.
	async fn sleep_remaining(&self, started: Instant) {
		let elapsed = started.elapsed();
		if elapsed < self.block_interval {
			tokio::time::sleep(self.block_interval - elapsed).await;
		}
	}
}
