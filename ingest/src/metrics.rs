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

//! Ingestor Prometheus metrics definition

use substrate_prometheus_endpoint::{register, Counter, Gauge, PrometheusError, Registry, U64};

/// Ingestor metrics exposed through Prometheus
pub(crate) struct Metrics {
	/// Number of the most recently executed block
	pub gdao_last_executed_block: Gauge<U64>,
	/// Total number of blocks executed by this worker
	pub gdao_blocks_executed: Counter<U64>,
	/// Total number of blocks that failed inside the pipeline transaction
	pub gdao_parse_block_failures: Counter<U64>,
	/// Total number of full projection resyncs
	pub gdao_resyncs: Counter<U64>,
}

impl Metrics {
	pub(crate) fn register(registry: &Registry) -> Result<Self, PrometheusError> {
		Ok(Self {
			gdao_last_executed_block: register(
				Gauge::new("gdao_last_executed_block", "Number of the most recently executed block.")?,
				registry,
			)?,
			gdao_blocks_executed: register(
				Counter::new("gdao_blocks_executed", "Number of blocks executed by this worker")?,
				registry,
			)?,
			gdao_parse_block_failures: register(
				Counter::new(
					"gdao_parse_block_failures",
					"Number of blocks that failed inside the pipeline transaction",
				)?,
				registry,
			)?,
			gdao_resyncs: register(
				Counter::new("gdao_resyncs", "Number of full projection resyncs")?,
				registry,
			)?,
		})
	}
}

// Note: we use the `format` macro to convert an expr into a `u64`. This will fail,
// if expr does not derive `Display`.
#[macro_export]
macro_rules! metric_set {
	($self:ident, $m:ident, $v:expr) => {{
		let val: u64 = format!("{}", $v).parse().unwrap();

		if let Some(metrics) = $self.metrics.as_ref() {
			metrics.$m.set(val);
		}
	}};
}

#[macro_export]
macro_rules! metric_inc {
	($self:ident, $m:ident) => {{
		if let Some(metrics) = $self.metrics.as_ref() {
			metrics.$m.inc();
		}
	}};
}
