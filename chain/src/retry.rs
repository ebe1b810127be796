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

//! Retry harness for outbound chain calls.
//!
//! Operations are retried over a configurable delay schedule; every failed
//! attempt is reported on the operator alert channel. When the schedule is
//! exhausted the final error propagates to the caller.

use std::{fmt, future::Future, time::Duration};

use crate::error::ChainError;

/// Target of the operator alert channel. Handlers route it to the paging sink.
pub const ALERTS_TARGET: &str = "alerts";

/// Classify an error for alert messages: either a recognized transient fault
/// name or `Unexpected error`.
pub trait RetryClassify {
	fn retry_class(&self) -> &'static str;
}

impl RetryClassify for ChainError {
	fn retry_class(&self) -> &'static str {
		self.transient_kind().map(|kind| kind.as_str()).unwrap_or("Unexpected error")
	}
}

/// Block coordinates attached to retry alerts when known.
#[derive(Debug, Clone, Default)]
pub struct RetryContext {
	pub block_number: Option<i64>,
	pub block_hash: Option<String>,
}

impl RetryContext {
	pub fn block(number: Option<i64>, hash: Option<&str>) -> Self {
		Self { block_number: number, block_hash: hash.map(Into::into) }
	}
}

impl fmt::Display for RetryContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if let Some(number) = self.block_number {
			write!(f, " Block number: {number}.")?;
		}
		if let Some(hash) = &self.block_hash {
			write!(f, " Block hash: {hash}.")?;
		}
		Ok(())
	}
}

/// Run `op`, retrying once per entry of `delays` (so `delays.len() + 1`
/// attempts in total) and sleeping the configured delay between attempts.
pub async fn with_retry<T, E, F, Fut>(
	description: &str,
	context: RetryContext,
	delays: &[u64],
	mut op: F,
) -> Result<T, E>
where
	E: RetryClassify + fmt::Display,
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
{
	for delay in delays {
		match op().await {
			Ok(value) => return Ok(value),
			Err(err) => {
				log::error!(
					target: ALERTS_TARGET,
					"{} while {description}.{context} Retrying in {delay}s ...",
					err.retry_class(),
				);
				log::debug!(target: crate::LOG_TARGET, "retried failure was: {err}");
				tokio::time::sleep(Duration::from_secs(*delay)).await;
			},
		}
	}
	op().await
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	#[tokio::test]
	async fn returns_first_success() {
		let attempts = AtomicUsize::new(0);
		let result: Result<u32, ChainError> =
			with_retry("fetching block from chain", RetryContext::default(), &[0, 0], || {
				let n = attempts.fetch_add(1, Ordering::SeqCst);
				async move {
					if n < 1 {
						Err(ChainError::EmptyResponse("get_block"))
					} else {
						Ok(42)
					}
				}
			})
			.await;

		assert_eq!(result.unwrap(), 42);
		assert_eq!(attempts.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn exhausts_schedule_then_propagates() {
		let attempts = AtomicUsize::new(0);
		let result: Result<u32, ChainError> =
			with_retry("fetching block from chain", RetryContext::block(Some(1), Some("0xa")), &[0, 0, 0], || {
				attempts.fetch_add(1, Ordering::SeqCst);
				async { Err(ChainError::EmptyResponse("get_block")) }
			})
			.await;

		assert!(result.is_err());
		// one attempt per configured delay plus the final one
		assert_eq!(attempts.load(Ordering::SeqCst), 4);
	}
}
