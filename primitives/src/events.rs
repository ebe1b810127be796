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

//! Typed views over the chain's event and extrinsic families.
//!
//! Each family the pipeline consumes is a plain struct deserialized from the
//! envelope's attribute maps; decoding failures reject the block at the edge
//! instead of leaking dynamic lookups into the handlers.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::{
	envelope::CallDetail,
	types::{Address, AssetId, Balance, DaoId, ProposalId},
};

/// Proposal ids are reported as integers by some node versions, normalize to string.
fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
	match Value::deserialize(deserializer)? {
		Value::String(s) => Ok(s),
		Value::Number(n) => Ok(n.to_string()),
		other => Err(serde::de::Error::custom(format!("expected string or number id, got {other}"))),
	}
}

// --- System ---

#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
	pub account: Address,
}

// --- DaoCore ---

#[derive(Debug, Clone, Deserialize)]
pub struct DaoCreated {
	pub dao_id: DaoId,
	pub owner: Address,
}

/// `DaoCore.create_dao` extrinsic arguments.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDao {
	pub dao_id: DaoId,
	pub dao_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DaoOwnerChanged {
	pub dao_id: DaoId,
	pub new_owner: Address,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DaoDestroyed {
	pub dao_id: DaoId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DaoMetadataSet {
	pub dao_id: DaoId,
}

/// `DaoCore.set_metadata` extrinsic arguments.
#[derive(Debug, Clone, Deserialize)]
pub struct SetDaoMetadata {
	pub dao_id: DaoId,
	pub meta: String,
	pub hash: String,
}

// --- Assets ---

#[derive(Debug, Clone, Deserialize)]
pub struct AssetIssued {
	pub asset_id: AssetId,
	pub owner: Address,
	pub total_supply: Balance,
}

/// `Assets.MetadataSet`; the `symbol` field carries the owning DAO id.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetMetadataSet {
	pub asset_id: AssetId,
	pub symbol: DaoId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetTransferred {
	pub asset_id: AssetId,
	pub amount: Balance,
	pub from: Address,
	pub to: Address,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetDelegated {
	pub asset_id: AssetId,
	pub from: Address,
	pub to: Address,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DelegationRevoked {
	pub asset_id: AssetId,
	pub delegated_by: Address,
	pub revoked_from: Address,
}

// --- Votes ---

#[derive(Debug, Clone, Deserialize)]
pub struct GovernanceMajorityVoteSet {
	pub dao_id: DaoId,
	pub proposal_duration: i64,
	pub proposal_token_deposit: Balance,
	pub minimum_majority_per_1024: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposalCreated {
	#[serde(deserialize_with = "id_string")]
	pub proposal_id: ProposalId,
	pub dao_id: DaoId,
	pub creator: Address,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposalMetadataSet {
	#[serde(deserialize_with = "id_string")]
	pub proposal_id: ProposalId,
}

/// `Votes.set_metadata` extrinsic arguments.
#[derive(Debug, Clone, Deserialize)]
pub struct SetProposalMetadata {
	#[serde(deserialize_with = "id_string")]
	pub proposal_id: ProposalId,
	pub meta: String,
	pub hash: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteCast {
	#[serde(deserialize_with = "id_string")]
	pub proposal_id: ProposalId,
	pub voter: Address,
	pub in_favor: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposalAccepted {
	#[serde(deserialize_with = "id_string")]
	pub proposal_id: ProposalId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposalRejected {
	#[serde(deserialize_with = "id_string")]
	pub proposal_id: ProposalId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposalFaulted {
	#[serde(deserialize_with = "id_string")]
	pub proposal_id: ProposalId,
	pub reason: String,
}

// --- Multisig ---

#[derive(Debug, Clone, Deserialize)]
pub struct NewMultisig {
	pub call_hash: String,
	pub multisig: Address,
	pub approving: Address,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MultisigApproval {
	pub call_hash: String,
	pub multisig: Address,
	pub approving: Address,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MultisigExecuted {
	pub call_hash: String,
	pub multisig: Address,
	pub approving: Address,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MultisigCancelled {
	pub call_hash: String,
	pub multisig: Address,
	pub cancelling: Address,
}

/// `Multisig.as_multi` extrinsic arguments; carries the wrapped call in clear.
#[derive(Debug, Clone, Deserialize)]
pub struct AsMulti {
	pub call: CallDetail,
	#[serde(default)]
	pub maybe_timepoint: Value,
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn proposal_ids_accept_numbers_and_strings() {
		let from_number: ProposalCreated =
			serde_json::from_value(json!({ "proposal_id": 1, "dao_id": "DAO1", "creator": "acc1" }))
				.unwrap();
		let from_string: ProposalCreated =
			serde_json::from_value(json!({ "proposal_id": "1", "dao_id": "DAO1", "creator": "acc1" }))
				.unwrap();

		assert_eq!(from_number.proposal_id, "1");
		assert_eq!(from_string.proposal_id, "1");
	}

	#[test]
	fn vote_cast_requires_boolean() {
		assert!(serde_json::from_value::<VoteCast>(
			json!({ "proposal_id": "1", "voter": "acc1", "in_favor": "aye" })
		)
		.is_err());
	}

	#[test]
	fn as_multi_decodes_nested_call() {
		let as_multi: AsMulti = serde_json::from_value(json!({
			"call": {
				"call_module": "DaoCore",
				"call_function": "change_owner",
				"call_args": [
					{ "name": "dao_id", "value": "DAO1" },
					{ "name": "new_owner", "value": "acc2" },
				],
			},
			"maybe_timepoint": { "height": 5, "index": 1 },
		}))
		.unwrap();

		assert_eq!(as_multi.call.call_function, "change_owner");
		assert_eq!(as_multi.call.args_map()["new_owner"], "acc2");
	}
}
