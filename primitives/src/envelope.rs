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

//! The serializable record of a chain block as consumed by the ingestor.
//!
//! The node reports extrinsics and events as flat lists; the envelope regroups
//! them as `module -> function -> [arg map]` and `module -> event -> [attr map]`
//! so the handler pipeline can join across families without rescanning.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::types::{BlockHash, BlockNumber};

/// Named arguments of a call or event, keyed by attribute name.
pub type AttrMap = serde_json::Map<String, Value>;

/// Extrinsics or events of one block, grouped by module and call/event name.
pub type SectionMap = BTreeMap<String, BTreeMap<String, Vec<AttrMap>>>;

/// A block as fetched from the chain, decoded and regrouped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockEnvelope {
	pub number: BlockNumber,
	pub hash: BlockHash,
	pub parent_hash: Option<BlockHash>,
	pub extrinsics: SectionMap,
	pub events: SectionMap,
}

impl BlockEnvelope {
	/// Regroup the node's raw block and event lists into an envelope.
	pub fn from_raw(block: RawBlock, events: Vec<RawEvent>) -> Self {
		let mut extrinsics = SectionMap::new();
		for extrinsic in block.extrinsics {
			let call = extrinsic.value.call;
			extrinsics
				.entry(call.call_module)
				.or_default()
				.entry(call.call_function)
				.or_default()
				.push(args_to_map(call.call_args));
		}

		let mut event_map = SectionMap::new();
		for event in events {
			event_map
				.entry(event.value.module_id)
				.or_default()
				.entry(event.value.event_id)
				.or_default()
				.push(event.value.attributes);
		}

		BlockEnvelope {
			number: block.header.number,
			hash: block.header.hash,
			parent_hash: block.header.parent_hash,
			extrinsics,
			events: event_map,
		}
	}

	/// Raw attribute maps of all `module.event` events in this block.
	pub fn events(&self, module: &str, event: &str) -> &[AttrMap] {
		self.events.get(module).and_then(|events| events.get(event)).map(Vec::as_slice).unwrap_or(&[])
	}

	/// Raw argument maps of all `module.function` extrinsics in this block.
	pub fn extrinsics(&self, module: &str, function: &str) -> &[AttrMap] {
		self.extrinsics
			.get(module)
			.and_then(|calls| calls.get(function))
			.map(Vec::as_slice)
			.unwrap_or(&[])
	}

	/// Decode all `module.event` events into their typed representation.
	pub fn decode_events<T: DeserializeOwned>(
		&self,
		module: &str,
		event: &str,
	) -> Result<Vec<T>, EnvelopeError> {
		decode_attr_maps(self.events(module, event), module, event)
	}

	/// Decode all `module.function` extrinsic argument maps into their typed representation.
	pub fn decode_extrinsics<T: DeserializeOwned>(
		&self,
		module: &str,
		function: &str,
	) -> Result<Vec<T>, EnvelopeError> {
		decode_attr_maps(self.extrinsics(module, function), module, function)
	}
}

fn decode_attr_maps<T: DeserializeOwned>(
	maps: &[AttrMap],
	module: &str,
	name: &str,
) -> Result<Vec<T>, EnvelopeError> {
	maps.iter()
		.map(|attrs| {
			serde_json::from_value(Value::Object(attrs.clone())).map_err(|source| {
				EnvelopeError::Decode { module: module.into(), name: name.into(), source }
			})
		})
		.collect()
}

fn args_to_map(args: Vec<CallArg>) -> AttrMap {
	args.into_iter().map(|arg| (arg.name, arg.value)).collect()
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
	#[error("failed decoding {module}.{name}: {source}")]
	Decode {
		module: String,
		name: String,
		#[source]
		source: serde_json::Error,
	},
}

/// Block shape reported by the node's `get_block` RPC.
#[derive(Debug, Clone, Deserialize)]
pub struct RawBlock {
	pub header: RawHeader,
	#[serde(default)]
	pub extrinsics: Vec<RawExtrinsic>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawHeader {
	pub number: BlockNumber,
	pub hash: BlockHash,
	#[serde(rename = "parentHash")]
	pub parent_hash: Option<BlockHash>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawExtrinsic {
	pub value: RawExtrinsicValue,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawExtrinsicValue {
	pub call: CallDetail,
}

/// A dispatchable call: module, function, and named arguments.
///
/// Also the shape of the nested `call` argument of `Multisig.as_multi`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallDetail {
	pub call_module: String,
	pub call_function: String,
	#[serde(default)]
	pub call_args: Vec<CallArg>,
}

impl CallDetail {
	/// Collapse the named argument list into a map.
	pub fn args_map(&self) -> AttrMap {
		self.call_args.iter().map(|arg| (arg.name.clone(), arg.value.clone())).collect()
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallArg {
	pub name: String,
	pub value: Value,
}

/// Event shape reported by the node's `get_events` RPC.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
	pub value: RawEventValue,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEventValue {
	pub module_id: String,
	pub event_id: String,
	#[serde(default)]
	pub attributes: AttrMap,
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn raw_block() -> RawBlock {
		serde_json::from_value(json!({
			"header": { "number": 7, "hash": "0xabc", "parentHash": "0xdef" },
			"extrinsics": [
				{ "value": { "call": {
					"call_module": "DaoCore",
					"call_function": "create_dao",
					"call_args": [
						{ "name": "dao_id", "value": "DAO1" },
						{ "name": "dao_name", "value": "First" },
					],
				}}},
				{ "value": { "call": {
					"call_module": "DaoCore",
					"call_function": "create_dao",
					"call_args": [
						{ "name": "dao_id", "value": "DAO2" },
						{ "name": "dao_name", "value": "Second" },
					],
				}}},
			],
		}))
		.unwrap()
	}

	fn raw_events() -> Vec<RawEvent> {
		serde_json::from_value(json!([
			{ "value": {
				"module_id": "System",
				"event_id": "NewAccount",
				"attributes": { "account": "acc1" },
			}},
			{ "value": {
				"module_id": "DaoCore",
				"event_id": "DaoCreated",
				"attributes": { "dao_id": "DAO1", "owner": "acc1" },
			}},
		]))
		.unwrap()
	}

	#[test]
	fn groups_extrinsics_by_module_and_function() {
		let envelope = BlockEnvelope::from_raw(raw_block(), raw_events());

		assert_eq!(envelope.number, 7);
		assert_eq!(envelope.hash, "0xabc");
		assert_eq!(envelope.parent_hash.as_deref(), Some("0xdef"));

		let calls = envelope.extrinsics("DaoCore", "create_dao");
		assert_eq!(calls.len(), 2);
		assert_eq!(calls[0]["dao_id"], "DAO1");
		assert_eq!(calls[1]["dao_name"], "Second");
		assert!(envelope.extrinsics("DaoCore", "destroy_dao").is_empty());
	}

	#[test]
	fn groups_events_by_module_and_name() {
		let envelope = BlockEnvelope::from_raw(raw_block(), raw_events());

		assert_eq!(envelope.events("System", "NewAccount").len(), 1);
		assert_eq!(envelope.events("DaoCore", "DaoCreated")[0]["owner"], "acc1");
		assert!(envelope.events("Assets", "Issued").is_empty());
	}

	#[test]
	fn decode_surfaces_bad_shapes() {
		#[derive(serde::Deserialize)]
		struct Created {
			#[allow(dead_code)]
			dao_id: String,
			#[allow(dead_code)]
			owner: String,
		}

		let envelope = BlockEnvelope::from_raw(raw_block(), raw_events());
		assert_eq!(envelope.decode_events::<Created>("DaoCore", "DaoCreated").unwrap().len(), 1);
		assert!(envelope.decode_events::<Created>("System", "NewAccount").is_err());
	}
}
