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

//! Ingestor error taxonomy.

use gdao_chain_client::{retry::RetryClassify, ChainError};
use gdao_primitives::BlockNumber;
use gdao_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
	#[error(transparent)]
	Chain(#[from] ChainError),
	#[error(transparent)]
	Storage(#[from] StorageError),
	/// The local database cannot be reconciled with the chain; a full resync
	/// is the only way forward.
	#[error("DB and chain are unrecoverably out of sync")]
	OutOfSync,
	/// A failure inside the pipeline transaction. The block stays un-executed
	/// and is retried on the next tick.
	#[error("failed parsing block #{number}")]
	ParseBlock { number: BlockNumber },
	/// A persisted block still failed after its retry.
	#[error("block not executable. number: {number} | hash: {hash}")]
	NotExecutable { number: BlockNumber, hash: String },
}

impl RetryClassify for IngestError {
	fn retry_class(&self) -> &'static str {
		match self {
			IngestError::Chain(chain) => chain.retry_class(),
			_ => "Unexpected error",
		}
	}
}
