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

//! Row types of the projection and block stores.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::types::Json;

use gdao_primitives::{
	envelope::{BlockEnvelope, SectionMap},
	Address, AssetId, Balance, BlockNumber, DaoId, GovernanceType, ProposalId, ProposalStatus,
	TransactionStatus, UnknownVariant,
};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BlockRow {
	pub hash: String,
	pub number: BlockNumber,
	pub parent_hash: Option<String>,
	pub extrinsic_data: Json<SectionMap>,
	pub event_data: Json<SectionMap>,
	pub executed: bool,
}

impl BlockRow {
	/// The envelope view the handler pipeline consumes.
	pub fn envelope(&self) -> BlockEnvelope {
		BlockEnvelope {
			number: self.number,
			hash: self.hash.clone(),
			parent_hash: self.parent_hash.clone(),
			extrinsics: self.extrinsic_data.0.clone(),
			events: self.event_data.0.clone(),
		}
	}
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccountRow {
	pub address: Address,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DaoRow {
	pub id: DaoId,
	pub name: Option<String>,
	pub creator_id: Address,
	pub owner_id: Address,
	pub metadata_url: Option<String>,
	pub metadata_hash: Option<String>,
	pub metadata: Option<Json<serde_json::Value>>,
	pub setup_complete: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AssetRow {
	pub id: AssetId,
	pub total_supply: Balance,
	pub owner_id: Address,
	pub dao_id: DaoId,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AssetHoldingRow {
	pub id: i64,
	pub asset_id: AssetId,
	pub owner_id: Address,
	pub balance: Balance,
	pub delegated_to: Option<Address>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GovernanceRow {
	pub id: i64,
	pub dao_id: DaoId,
	pub proposal_duration: i64,
	pub proposal_token_deposit: Balance,
	pub minimum_majority: i64,
	#[sqlx(rename = "type")]
	pub governance_type: String,
}

impl GovernanceRow {
	pub fn governance_type(&self) -> Result<GovernanceType, UnknownVariant> {
		GovernanceType::from_str(&self.governance_type)
	}
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProposalRow {
	pub id: ProposalId,
	pub dao_id: DaoId,
	pub creator_id: Option<Address>,
	pub status: String,
	pub fault: Option<String>,
	pub birth_block_number: BlockNumber,
	pub metadata_url: Option<String>,
	pub metadata_hash: Option<String>,
	pub metadata: Option<Json<serde_json::Value>>,
	pub title: Option<String>,
	pub setup_complete: bool,
}

impl ProposalRow {
	pub fn status(&self) -> Result<ProposalStatus, UnknownVariant> {
		ProposalStatus::from_str(&self.status)
	}
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VoteRow {
	pub id: i64,
	pub proposal_id: ProposalId,
	pub voter_id: Address,
	pub in_favor: Option<bool>,
	pub voting_power: Balance,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MultiSigRow {
	pub address: Address,
	pub dao_id: Option<DaoId>,
	pub signatories: Option<Json<Vec<Address>>>,
	pub threshold: Option<i64>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MultiSigTransactionRow {
	pub id: i64,
	pub multisig_address: Address,
	pub call_hash: String,
	pub call: Option<Json<serde_json::Value>>,
	pub call_function: Option<String>,
	pub timepoint: Option<Json<serde_json::Value>>,
	pub approvers: Json<Vec<Address>>,
	pub canceled_by: Option<Address>,
	pub status: String,
	pub executed_at: Option<DateTime<Utc>>,
	pub asset_id: Option<AssetId>,
	pub dao_id: Option<DaoId>,
	pub proposal_id: Option<ProposalId>,
}

impl MultiSigTransactionRow {
	pub fn status(&self) -> Result<TransactionStatus, UnknownVariant> {
		TransactionStatus::from_str(&self.status)
	}
}

/// A holding joined with the DAO owning its asset, for voter snapshots.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DaoHoldingRow {
	pub dao_id: DaoId,
	pub owner_id: Address,
	pub delegated_to: Option<Address>,
	pub balance: Balance,
}
