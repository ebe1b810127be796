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

//! Websocket implementation of [`ChainApi`].

use async_trait::async_trait;
use jsonrpsee::{
	core::client::ClientT,
	rpc_params,
	ws_client::{WsClient, WsClientBuilder},
};
use serde_json::Value;

use gdao_primitives::{
	envelope::{BlockEnvelope, RawBlock, RawEvent},
	Address, BlockNumber,
};

use crate::{error::ChainError, ChainApi, LOG_TARGET};

/// Client over the node's decoded JSON-RPC surface.
///
/// The node decodes extrinsics and events with its own type registry; the
/// configured preset is recorded here for operator visibility only.
pub struct ChainRpcClient {
	client: WsClient,
	type_registry_preset: String,
}

impl ChainRpcClient {
	/// Connect to the node at `url` (`ws://` or `wss://`).
	pub async fn connect(url: &str, type_registry_preset: &str) -> Result<Self, ChainError> {
		log::info!(
			target: LOG_TARGET,
			"Connecting to chain node at {url} (type registry: {type_registry_preset})"
		);
		let client = WsClientBuilder::default().build(url).await?;
		Ok(Self { client, type_registry_preset: type_registry_preset.into() })
	}

	pub fn type_registry_preset(&self) -> &str {
		&self.type_registry_preset
	}

	/// Submit an already signed extrinsic. Passthrough for external tooling,
	/// the ingestion loop never writes to the chain.
	pub async fn submit_signed_extrinsic(&self, extrinsic: &str) -> Result<String, ChainError> {
		let hash = self.client.request("submit_extrinsic", rpc_params![extrinsic]).await?;
		Ok(hash)
	}

	async fn get_events(&self, block_hash: &str) -> Result<Vec<RawEvent>, ChainError> {
		let events: Option<Vec<RawEvent>> =
			self.client.request("get_events", rpc_params![block_hash]).await?;
		events.ok_or(ChainError::EmptyResponse("get_events"))
	}
}

#[async_trait]
impl ChainApi for ChainRpcClient {
	async fn get_block(
		&self,
		hash: Option<&str>,
		number: Option<BlockNumber>,
	) -> Result<BlockEnvelope, ChainError> {
		// the node wants block_hash xor block_number, hash takes priority
		let number = if hash.is_some() { None } else { number };
		let block: Option<RawBlock> =
			self.client.request("get_block", rpc_params![hash, number]).await?;
		let block = block.ok_or(ChainError::EmptyResponse("get_block"))?;

		let events = self.get_events(&block.header.hash).await?;
		Ok(BlockEnvelope::from_raw(block, events))
	}

	async fn query_accounts(&self) -> Result<Vec<Address>, ChainError> {
		// entries are (address, account info) pairs, only the key matters here
		let entries: Vec<(Address, Value)> =
			self.client.request("query_map", rpc_params!["System", "Account"]).await?;
		Ok(entries.into_iter().map(|(address, _)| address).collect())
	}
}
