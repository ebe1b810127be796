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

//! Multisig call inspection.
//!
//! `Multisig` events announce wrapped calls only by hash; the actual call
//! travels in clear inside the `as_multi` extrinsic. Recomputing the hash here
//! lets the pipeline join the two, and [`parse_call_data`] resolves the
//! projection rows a call refers to.

use codec::Encode;
use serde_json::Value;
use sp_core_hashing::blake2_256;

use gdao_primitives::{envelope::AttrMap, AssetId, DaoId, ProposalId};

/// Hash of a dispatchable call, matching the chain's own call hashing so it
/// can be joined against event-announced hashes.
///
/// The argument map serializes with sorted keys, making the encoding canonical
/// for any argument order the node reports.
pub fn compute_call_hash(module: &str, function: &str, args: &AttrMap) -> String {
	let canonical_args =
		serde_json::to_string(args).expect("attribute maps are valid json; qed");
	let payload = (module, function, canonical_args).encode();
	format!("0x{}", hex::encode(blake2_256(&payload)))
}

/// Projection ids referenced by a multisig call, as far as its arguments reveal them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallIds {
	pub asset_id: Option<AssetId>,
	pub dao_id: Option<DaoId>,
	pub proposal_id: Option<ProposalId>,
}

/// Resolve asset/dao/proposal ids from call arguments. The `Assets` module
/// names its asset argument `id`; an explicit `asset_id` always wins.
pub fn parse_call_data(module: &str, args: &AttrMap) -> CallIds {
	let asset_id = args
		.get("asset_id")
		.and_then(Value::as_i64)
		.or_else(|| {
			if module == "Assets" {
				args.get("id").and_then(Value::as_i64)
			} else {
				None
			}
		});

	CallIds {
		asset_id,
		dao_id: args.get("dao_id").and_then(Value::as_str).map(Into::into),
		proposal_id: args.get("proposal_id").map(|value| match value {
			Value::String(s) => s.clone(),
			other => other.to_string(),
		}),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn args(value: Value) -> AttrMap {
		value.as_object().unwrap().clone()
	}

	#[test]
	fn call_hash_is_deterministic_and_order_insensitive() {
		let a = args(json!({ "dao_id": "DAO1", "new_owner": "acc2" }));
		let b = args(json!({ "new_owner": "acc2", "dao_id": "DAO1" }));

		let hash = compute_call_hash("DaoCore", "change_owner", &a);
		assert!(hash.starts_with("0x"));
		assert_eq!(hash.len(), 2 + 64);
		assert_eq!(hash, compute_call_hash("DaoCore", "change_owner", &b));
	}

	#[test]
	fn call_hash_depends_on_module_function_and_args() {
		let a = args(json!({ "dao_id": "DAO1" }));
		let b = args(json!({ "dao_id": "DAO2" }));

		assert_ne!(
			compute_call_hash("DaoCore", "change_owner", &a),
			compute_call_hash("DaoCore", "change_owner", &b)
		);
		assert_ne!(
			compute_call_hash("DaoCore", "change_owner", &a),
			compute_call_hash("DaoCore", "destroy_dao", &a)
		);
	}

	#[test]
	fn parses_plain_ids() {
		let ids = parse_call_data("some_module", &args(json!({ "dao_id": "DAO1" })));
		assert_eq!(ids, CallIds { dao_id: Some("DAO1".into()), ..Default::default() });

		let ids = parse_call_data(
			"some_module",
			&args(json!({ "asset_id": 1, "dao_id": "DAO1", "proposal_id": 1 })),
		);
		assert_eq!(
			ids,
			CallIds {
				asset_id: Some(1),
				dao_id: Some("DAO1".into()),
				proposal_id: Some("1".into())
			}
		);
	}

	#[test]
	fn assets_module_maps_id_to_asset_id() {
		let ids = parse_call_data("Assets", &args(json!({ "id": 1 })));
		assert_eq!(ids.asset_id, Some(1));

		// an explicit asset_id wins over the module-local id
		let ids = parse_call_data("Assets", &args(json!({ "asset_id": 1, "id": 2 })));
		assert_eq!(ids.asset_id, Some(1));

		// outside the Assets module a bare id means nothing
		let ids = parse_call_data("some_module", &args(json!({ "id": 1 })));
		assert_eq!(ids.asset_id, None);
	}
}
