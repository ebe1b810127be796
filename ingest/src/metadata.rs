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

//! Off-core metadata fetching.
//!
//! The chain only carries (url, hash) pairs; the JSON content is downloaded
//! outside the block transaction, verified against the announced hash and
//! stored when it matches. A mismatch is an operator alert, never a
//! projection failure: the announced coordinates stay recorded, the content
//! column stays null.

use std::{str::FromStr, sync::Arc};

use async_trait::async_trait;
use sha2::Digest;
use sqlx::SqlitePool;

use gdao_chain_client::retry::ALERTS_TARGET;
use gdao_primitives::{DaoId, ProposalId};
use gdao_storage::{projection::daos, projection::proposals, StorageError};

use crate::LOG_TARGET;

/// Content hash algorithms accepted for metadata verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
	Sha3_256,
	Sha2_256,
}

impl HashAlgorithm {
	pub fn digest_hex(&self, data: &[u8]) -> String {
		match self {
			HashAlgorithm::Sha3_256 => hex::encode(sha3::Sha3_256::digest(data)),
			HashAlgorithm::Sha2_256 => hex::encode(sha2::Sha256::digest(data)),
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			HashAlgorithm::Sha3_256 => "sha3_256",
			HashAlgorithm::Sha2_256 => "sha256",
		}
	}
}

impl FromStr for HashAlgorithm {
	type Err = gdao_primitives::UnknownVariant;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"sha3_256" => Ok(HashAlgorithm::Sha3_256),
			"sha256" | "sha2_256" => Ok(HashAlgorithm::Sha2_256),
			other => {
				Err(gdao_primitives::UnknownVariant { kind: "HashAlgorithm", value: other.into() })
			},
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
	#[error("metadata fetch failed: {0}")]
	Fetch(String),
	#[error("metadata hash mismatch for {url}")]
	HashMismatch { url: String },
	#[error("metadata is not valid json: {0}")]
	Json(#[from] serde_json::Error),
	#[error(transparent)]
	Storage(#[from] StorageError),
}

/// Downloader seam; the worker only needs bytes back.
#[async_trait]
pub trait MetadataClient: Send + Sync {
	async fn fetch(&self, url: &str) -> Result<Vec<u8>, MetadataError>;
}

/// reqwest-backed downloader used in production.
#[derive(Default)]
pub struct HttpMetadataClient {
	client: reqwest::Client,
}

#[async_trait]
impl MetadataClient for HttpMetadataClient {
	async fn fetch(&self, url: &str) -> Result<Vec<u8>, MetadataError> {
		let response = self
			.client
			.get(url)
			.send()
			.await
			.and_then(reqwest::Response::error_for_status)
			.map_err(|err| MetadataError::Fetch(err.to_string()))?;
		let body = response.bytes().await.map_err(|err| MetadataError::Fetch(err.to_string()))?;
		Ok(body.to_vec())
	}
}

/// Work deferred by the pipeline's metadata stages, one job per block.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataJob {
	/// DAO ids with their announced (url, hash) pairs.
	Dao { entries: std::collections::BTreeMap<DaoId, (String, String)> },
	/// Proposals whose coordinates were recorded in-transaction.
	Proposal { ids: Vec<ProposalId> },
}

/// Dispatch deferred jobs onto the runtime, outside the block transaction.
pub fn spawn_jobs(
	pool: &SqlitePool,
	client: &Arc<dyn MetadataClient>,
	algorithm: HashAlgorithm,
	jobs: Vec<MetadataJob>,
) {
	for job in jobs {
		let pool = pool.clone();
		let client = client.clone();
		tokio::spawn(async move {
			if let Err(err) = run_job(&pool, client.as_ref(), algorithm, job).await {
				log::error!(target: ALERTS_TARGET, "Metadata task failed: {err}");
			}
		});
	}
}

pub async fn run_job(
	pool: &SqlitePool,
	client: &dyn MetadataClient,
	algorithm: HashAlgorithm,
	job: MetadataJob,
) -> Result<(), MetadataError> {
	match job {
		MetadataJob::Dao { entries } => update_dao_metadata(pool, client, algorithm, entries).await,
		MetadataJob::Proposal { ids } => {
			update_proposal_metadata(pool, client, algorithm, &ids).await
		},
	}
}

async fn download(
	client: &dyn MetadataClient,
	algorithm: HashAlgorithm,
	url: &str,
	expected_hash: &str,
) -> Result<serde_json::Value, MetadataError> {
	let body = client.fetch(url).await?;
	if algorithm.digest_hex(&body) != expected_hash {
		return Err(MetadataError::HashMismatch { url: url.into() });
	}
	Ok(serde_json::from_slice(&body)?)
}

/// Update DAOs whose announced hash differs from what is stored. The
/// coordinates are recorded even when the download fails verification.
async fn update_dao_metadata(
	pool: &SqlitePool,
	client: &dyn MetadataClient,
	algorithm: HashAlgorithm,
	entries: std::collections::BTreeMap<DaoId, (String, String)>,
) -> Result<(), MetadataError> {
	let ids: Vec<DaoId> = entries.keys().cloned().collect();
	let mut conn = pool.acquire().await.map_err(StorageError::from)?;
	for dao in daos::by_ids(&mut conn, &ids).await? {
		let (url, hash) = &entries[&dao.id];
		if dao.metadata_hash.as_deref() == Some(hash.as_str()) {
			log::debug!(target: LOG_TARGET, "metadata for dao {} already current", dao.id);
			continue;
		}
		let metadata = match download(client, algorithm, url, hash).await {
			Ok(metadata) => Some(metadata),
			Err(MetadataError::HashMismatch { .. }) => {
				log::error!(
					target: ALERTS_TARGET,
					"Hash mismatch while fetching DAO metadata from provided url."
				);
				None
			},
			Err(err) => {
				log::error!(
					target: ALERTS_TARGET,
					"Unexpected error while fetching DAO metadata from provided url: {err}"
				);
				None
			},
		};
		daos::set_metadata(&mut conn, &dao.id, url, hash, metadata.as_ref()).await?;
	}
	Ok(())
}

/// Fetch content for proposals whose coordinates were already stored by the
/// pipeline; only verified downloads are written.
async fn update_proposal_metadata(
	pool: &SqlitePool,
	client: &dyn MetadataClient,
	algorithm: HashAlgorithm,
	ids: &[ProposalId],
) -> Result<(), MetadataError> {
	let mut conn = pool.acquire().await.map_err(StorageError::from)?;
	for proposal in proposals::by_ids(&mut conn, ids).await? {
		let (Some(url), Some(hash)) = (&proposal.metadata_url, &proposal.metadata_hash) else {
			continue;
		};
		match download(client, algorithm, url, hash).await {
			Ok(metadata) => {
				proposals::set_metadata_content(&mut conn, &proposal.id, &metadata).await?;
			},
			Err(MetadataError::HashMismatch { .. }) => {
				log::error!(
					target: ALERTS_TARGET,
					"Hash mismatch while fetching Proposal metadata from provided url."
				);
			},
			Err(err) => {
				log::error!(
					target: ALERTS_TARGET,
					"Unexpected error while fetching Proposal metadata from provided url: {err}"
				);
			},
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn digest_hex_matches_known_vectors() {
		// sha3-256("") and sha256("")
		assert_eq!(
			HashAlgorithm::Sha3_256.digest_hex(b""),
			"a7ffc6f8bf1ed76651c14756a061d62745dfdc091f294129a7b54edf5a1a1e17"
		);
		assert_eq!(
			HashAlgorithm::Sha2_256.digest_hex(b""),
			"e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
		);
	}

	#[test]
	fn unknown_algorithm_is_rejected() {
		assert!(HashAlgorithm::from_str("sha3_256").is_ok());
		assert!(HashAlgorithm::from_str("md5").is_err());
	}
}
