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

//! Client for the Genesis DAO chain node.
//!
//! Wraps the node's decoded JSON-RPC surface behind [`ChainApi`] so the
//! ingestor (and its tests) stay independent of the websocket transport.

use async_trait::async_trait;

use gdao_primitives::{envelope::BlockEnvelope, Address, BlockNumber};

pub mod call;
mod client;
mod error;
pub mod retry;

pub use client::ChainRpcClient;
pub use error::{ChainError, TransientKind};

pub(crate) const LOG_TARGET: &str = "gdao::chain";

/// Chain access as required by the ingestion loop.
#[async_trait]
pub trait ChainApi: Send + Sync {
	/// Fetch a block by hash or number; with neither set the node returns the chain head.
	/// Hash takes priority when both are given. Events are fetched by the
	/// returned hash in a second call and merged into the envelope.
	async fn get_block(
		&self,
		hash: Option<&str>,
		number: Option<BlockNumber>,
	) -> Result<BlockEnvelope, ChainError>;

	/// All account addresses currently known to the chain, used to seed the projection.
	async fn query_accounts(&self) -> Result<Vec<Address>, ChainError>;
}
