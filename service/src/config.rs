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

//! Service configuration, environment-driven with flag overrides.

use std::str::FromStr;

use gdao_ingest::HashAlgorithm;

/// Closed set of logo upload backends; the upload service itself lives behind
/// the HTTP API, only the selector is validated here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum UploadDriver {
	Local,
	S3,
}

/// One named logo rendition, parsed from `name=WxH`.
#[derive(Debug, Clone, PartialEq)]
pub struct LogoSize {
	pub name: String,
	pub width: u32,
	pub height: u32,
}

impl FromStr for LogoSize {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let (name, dimensions) =
			s.split_once('=').ok_or_else(|| format!("expected name=WxH, got '{s}'"))?;
		let (width, height) = dimensions
			.split_once('x')
			.ok_or_else(|| format!("expected name=WxH, got '{s}'"))?;
		Ok(LogoSize {
			name: name.to_string(),
			width: width.parse().map_err(|_| format!("bad width in '{s}'"))?,
			height: height.parse().map_err(|_| format!("bad height in '{s}'"))?,
		})
	}
}

#[derive(Debug, Clone, clap::Args)]
pub struct Config {
	/// Websocket endpoint of the chain node.
	#[arg(long, env = "BLOCKCHAIN_URL")]
	pub blockchain_url: String,

	/// Type registry preset the node decodes with.
	#[arg(long, env = "TYPE_REGISTRY_PRESET", default_value = "polkadot")]
	pub type_registry_preset: String,

	/// Projection database.
	#[arg(long, env = "DATABASE_URL", default_value = "sqlite://gdao.db")]
	pub database_url: String,

	/// Expected block production interval in seconds.
	#[arg(long, env = "BLOCK_CREATION_INTERVAL", default_value_t = 6)]
	pub block_creation_interval: u64,

	/// Retry delay schedule for chain calls, in seconds.
	#[arg(long, env = "RETRY_DELAYS", value_delimiter = ',', default_values_t = [5, 10, 30, 60, 120])]
	pub retry_delays: Vec<u64>,

	/// Content hash algorithm for metadata verification.
	#[arg(long, env = "ENCRYPTION_ALGORITHM", default_value = "sha3_256")]
	pub encryption_algorithm: String,

	/// Logo upload backend selector.
	#[arg(long, env = "FILE_UPLOAD_CLASS", value_enum, default_value = "local")]
	pub file_upload_class: UploadDriver,

	/// Seconds a signature challenge stays valid.
	#[arg(long, env = "CHALLENGE_LIFETIME", default_value_t = 60)]
	pub challenge_lifetime: u64,

	/// Logo renditions as name=WxH pairs.
	#[arg(
		long,
		env = "LOGO_SIZES",
		value_delimiter = ',',
		default_values_t = [
			LogoSize { name: "small".into(), width: 88, height: 88 },
			LogoSize { name: "medium".into(), width: 104, height: 104 },
			LogoSize { name: "large".into(), width: 124, height: 124 },
		]
	)]
	pub logo_sizes: Vec<LogoSize>,

	/// Upper bound on uploaded logo size in bytes.
	#[arg(long, env = "MAX_LOGO_SIZE", default_value_t = 2_000_000)]
	pub max_logo_size: u64,

	/// Deposit required to create a DAO, surfaced by the API.
	#[arg(long, env = "DEPOSIT_TO_CREATE_DAO", default_value_t = 10_000_000_000_000)]
	pub deposit_to_create_dao: u128,

	/// Deposit required to create a proposal, surfaced by the API.
	#[arg(long, env = "DEPOSIT_TO_CREATE_PROPOSAL", default_value_t = 1_000_000_000_000)]
	pub deposit_to_create_proposal: u128,

	/// Log filter, e.g. `info` or `gdao::ingest=debug`.
	#[arg(long, env = "LOG_LEVEL", default_value = "info")]
	pub log_level: String,

	/// Expose Prometheus metrics on this port when set.
	#[arg(long, env = "PROMETHEUS_PORT")]
	pub prometheus_port: Option<u16>,
}

impl Config {
	/// Resolve the configured hash algorithm; unknown names are fatal.
	pub fn hash_algorithm(&self) -> Result<HashAlgorithm, crate::ServiceError> {
		HashAlgorithm::from_str(&self.encryption_algorithm).map_err(|_| {
			crate::ServiceError::Config(format!(
				"'{}' is not a supported hash algorithm",
				self.encryption_algorithm
			))
		})
	}
}

impl std::fmt::Display for LogoSize {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}={}x{}", self.name, self.width, self.height)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn logo_sizes_parse_and_display() {
		let size: LogoSize = "small=88x88".parse().unwrap();
		assert_eq!(size, LogoSize { name: "small".into(), width: 88, height: 88 });
		assert_eq!(size.to_string(), "small=88x88");
		assert!("small".parse::<LogoSize>().is_err());
		assert!("small=88".parse::<LogoSize>().is_err());
	}

	#[test]
	fn unknown_hash_algorithm_is_fatal() {
		use clap::Parser;

		#[derive(clap::Parser)]
		struct TestCli {
			#[clap(flatten)]
			config: Config,
		}

		let cli = TestCli::parse_from([
			"gdao-service",
			"--blockchain-url",
			"ws://localhost:9944",
			"--encryption-algorithm",
			"md5",
		]);
		assert!(cli.config.hash_algorithm().is_err());

		let cli = TestCli::parse_from(["gdao-service", "--blockchain-url", "ws://localhost:9944"]);
		assert_eq!(cli.config.hash_algorithm().unwrap(), HashAlgorithm::Sha3_256);
	}
}
