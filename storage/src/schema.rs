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

//! Idempotent schema bootstrap, run once at startup.

use sqlx::SqlitePool;

use crate::StorageError;

const TABLES: &[&str] = &[
	"CREATE TABLE IF NOT EXISTS accounts (
		address TEXT PRIMARY KEY,
		created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
		updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
	)",
	"CREATE TABLE IF NOT EXISTS daos (
		id TEXT PRIMARY KEY,
		name TEXT,
		creator_id TEXT NOT NULL REFERENCES accounts(address) ON DELETE CASCADE,
		owner_id TEXT NOT NULL REFERENCES accounts(address) ON DELETE CASCADE,
		metadata_url TEXT,
		metadata_hash TEXT,
		metadata TEXT,
		setup_complete INTEGER NOT NULL DEFAULT 0,
		created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
		updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
	)",
	"CREATE TABLE IF NOT EXISTS assets (
		id INTEGER PRIMARY KEY,
		total_supply INTEGER NOT NULL,
		owner_id TEXT NOT NULL REFERENCES accounts(address) ON DELETE CASCADE,
		dao_id TEXT NOT NULL UNIQUE REFERENCES daos(id) ON DELETE CASCADE,
		created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
		updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
	)",
	"CREATE TABLE IF NOT EXISTS asset_holdings (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		asset_id INTEGER NOT NULL REFERENCES assets(id) ON DELETE CASCADE,
		owner_id TEXT NOT NULL REFERENCES accounts(address) ON DELETE CASCADE,
		balance INTEGER NOT NULL,
		delegated_to TEXT REFERENCES accounts(address),
		created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
		updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
		UNIQUE (asset_id, owner_id)
	)",
	"CREATE TABLE IF NOT EXISTS governances (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		dao_id TEXT NOT NULL UNIQUE REFERENCES daos(id) ON DELETE CASCADE,
		proposal_duration INTEGER NOT NULL,
		proposal_token_deposit INTEGER NOT NULL,
		minimum_majority INTEGER NOT NULL,
		type TEXT NOT NULL,
		created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
		updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
	)",
	"CREATE TABLE IF NOT EXISTS proposals (
		id TEXT PRIMARY KEY,
		dao_id TEXT NOT NULL REFERENCES daos(id) ON DELETE CASCADE,
		creator_id TEXT REFERENCES accounts(address) ON DELETE CASCADE,
		status TEXT NOT NULL DEFAULT 'RUNNING',
		fault TEXT,
		birth_block_number INTEGER NOT NULL,
		metadata_url TEXT,
		metadata_hash TEXT,
		metadata TEXT,
		title TEXT,
		setup_complete INTEGER NOT NULL DEFAULT 0,
		created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
		updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
	)",
	"CREATE TABLE IF NOT EXISTS votes (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		proposal_id TEXT NOT NULL REFERENCES proposals(id) ON DELETE CASCADE,
		voter_id TEXT NOT NULL REFERENCES accounts(address) ON DELETE CASCADE,
		in_favor INTEGER,
		voting_power INTEGER NOT NULL,
		created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
		updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
		UNIQUE (proposal_id, voter_id)
	)",
	"CREATE TABLE IF NOT EXISTS multisigs (
		address TEXT PRIMARY KEY REFERENCES accounts(address) ON DELETE CASCADE,
		dao_id TEXT REFERENCES daos(id) ON DELETE SET NULL,
		signatories TEXT,
		threshold INTEGER,
		created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
		updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
	)",
	"CREATE TABLE IF NOT EXISTS multisig_transactions (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		multisig_address TEXT NOT NULL REFERENCES multisigs(address) ON DELETE CASCADE,
		call_hash TEXT NOT NULL,
		call TEXT,
		call_function TEXT,
		timepoint TEXT,
		approvers TEXT NOT NULL DEFAULT '[]',
		canceled_by TEXT,
		status TEXT NOT NULL DEFAULT 'PENDING',
		executed_at TEXT,
		asset_id INTEGER,
		dao_id TEXT,
		proposal_id TEXT,
		created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
		updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
	)",
	"CREATE TABLE IF NOT EXISTS blocks (
		hash TEXT PRIMARY KEY,
		number INTEGER NOT NULL UNIQUE,
		parent_hash TEXT,
		extrinsic_data TEXT NOT NULL DEFAULT '{}',
		event_data TEXT NOT NULL DEFAULT '{}',
		executed INTEGER NOT NULL DEFAULT 0,
		created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
		updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
	)",
	"CREATE INDEX IF NOT EXISTS idx_blocks_executed ON blocks (executed)",
	"CREATE INDEX IF NOT EXISTS idx_holdings_asset ON asset_holdings (asset_id)",
	"CREATE INDEX IF NOT EXISTS idx_votes_proposal ON votes (proposal_id)",
	"CREATE INDEX IF NOT EXISTS idx_multisig_tx_key ON multisig_transactions (call_hash, multisig_address)",
];

pub(crate) async fn init(pool: &SqlitePool) -> Result<(), StorageError> {
	let mut tx = pool.begin().await?;
	for statement in TABLES {
		sqlx::query(statement).execute(&mut *tx).await?;
	}
	tx.commit().await?;
	Ok(())
}
