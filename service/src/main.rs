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

//! Genesis DAO backend service entry point.

use clap::Parser;

mod cli;
mod command;
mod config;

pub(crate) const LOG_TARGET: &str = "gdao::service";

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
	#[error(transparent)]
	Chain(#[from] gdao_chain_client::ChainError),
	#[error(transparent)]
	Storage(#[from] gdao_storage::StorageError),
	#[error(transparent)]
	Ingest(#[from] gdao_ingest::IngestError),
	#[error("configuration error: {0}")]
	Config(String),
}

#[tokio::main]
async fn main() -> Result<(), ServiceError> {
	let cli = cli::Cli::parse();
	env_logger::Builder::new().parse_filters(&cli.config.log_level).init();

	match cli.subcommand {
		cli::Subcommand::Listen => command::listen(cli.config).await,
		cli::Subcommand::Resync => command::resync(cli.config).await,
		cli::Subcommand::RefreshChallenge => command::refresh_challenge(cli.config).await,
	}
}
