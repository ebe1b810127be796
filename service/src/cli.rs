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

use crate::config::Config;

#[derive(Debug, clap::Parser)]
#[command(name = "gdao-service", about = "Genesis DAO backend service")]
pub struct Cli {
	#[command(subcommand)]
	pub subcommand: Subcommand,

	#[clap(flatten)]
	pub config: Config,
}

#[derive(Debug, clap::Subcommand)]
pub enum Subcommand {
	/// Start the block ingestor and follow the chain head.
	Listen,

	/// Wipe the projection and reseed accounts from the chain.
	Resync,

	/// Rotate the process-wide signature challenge token.
	RefreshChallenge,
}
