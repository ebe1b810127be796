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

//! In-process cache for transient values.
//!
//! The ingestor publishes the most recently executed block here; the HTTP
//! layer reads it to attach `Block-Number`/`Block-Hash` response headers.
//! Signature challenges live under per-address keys with a TTL.

use std::{
	collections::HashMap,
	sync::Arc,
	time::{Duration, Instant},
};

use parking_lot::RwLock;
use serde_json::Value;

use gdao_primitives::{BlockHash, BlockNumber};

/// Key under which the most recently executed block is published.
pub const CURRENT_BLOCK_KEY: &str = "current_block";

/// Key under which the rotating process-wide challenge token is published.
pub const CHALLENGE_KEY: &str = "challenge";

#[derive(Clone)]
struct Entry {
	value: Value,
	expires_at: Option<Instant>,
}

/// Cheaply clonable shared cache handle.
#[derive(Clone, Default)]
pub struct Cache {
	entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl Cache {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set(&self, key: &str, value: Value) {
		self.entries.write().insert(key.into(), Entry { value, expires_at: None });
	}

	pub fn set_with_ttl(&self, key: &str, value: Value, ttl: Duration) {
		self.entries
			.write()
			.insert(key.into(), Entry { value, expires_at: Some(Instant::now() + ttl) });
	}

	pub fn get(&self, key: &str) -> Option<Value> {
		let entries = self.entries.read();
		let entry = entries.get(key)?;
		match entry.expires_at {
			Some(expires_at) if expires_at <= Instant::now() => {
				drop(entries);
				self.entries.write().remove(key);
				None
			},
			_ => Some(entry.value.clone()),
		}
	}

	pub fn remove(&self, key: &str) {
		self.entries.write().remove(key);
	}

	/// Publish the latest executed block for the response-header middleware.
	pub fn set_current_block(&self, number: BlockNumber, hash: &str) {
		self.set(CURRENT_BLOCK_KEY, serde_json::json!([number, hash]));
	}

	pub fn current_block(&self) -> Option<(BlockNumber, BlockHash)> {
		let value = self.get(CURRENT_BLOCK_KEY)?;
		let number = value.get(0)?.as_i64()?;
		let hash = value.get(1)?.as_str()?.to_string();
		Some((number, hash))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn current_block_round_trips() {
		let cache = Cache::new();
		assert!(cache.current_block().is_none());

		cache.set_current_block(7, "0xabc");
		assert_eq!(cache.current_block(), Some((7, "0xabc".to_string())));

		// later blocks overwrite, readers see stale-but-consistent pairs
		cache.set_current_block(8, "0xdef");
		assert_eq!(cache.current_block(), Some((8, "0xdef".to_string())));
	}

	#[test]
	fn ttl_entries_expire() {
		let cache = Cache::new();
		cache.set_with_ttl("addr1", Value::String("token".into()), Duration::from_millis(0));
		std::thread::sleep(Duration::from_millis(5));
		assert!(cache.get("addr1").is_none());

		cache.set_with_ttl("addr2", Value::String("token".into()), Duration::from_secs(60));
		assert_eq!(cache.get("addr2"), Some(Value::String("token".into())));
	}
}
