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

//! Persistence for the Genesis DAO projection.
//!
//! Two stores share one SQLite database: the block store holds raw block
//! envelopes, the projection store holds the materialized entities. All
//! repository functions take a `&mut SqliteConnection` so the pipeline can
//! compose them inside a single transaction; the in-process [`cache::Cache`]
//! carries transient values (current block, auth challenges) that never touch
//! the database.

use std::str::FromStr;

use sqlx::{
	sqlite::{SqliteConnectOptions, SqlitePoolOptions},
	SqlitePool,
};

pub mod blocks;
pub mod cache;
pub mod models;
pub mod projection;
mod schema;

pub(crate) const LOG_TARGET: &str = "gdao::storage";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
	#[error("database failure: {0}")]
	Db(#[from] sqlx::Error),
	/// A stored status column holds a value outside its closed set.
	#[error(transparent)]
	Variant(#[from] gdao_primitives::UnknownVariant),
}

impl StorageError {
	/// A uniqueness constraint rejected a write. On the blocks table this is
	/// the divergence signal that triggers a resync.
	pub fn is_unique_violation(&self) -> bool {
		matches!(
			self,
			StorageError::Db(sqlx::Error::Database(db))
				if db.kind() == sqlx::error::ErrorKind::UniqueViolation
		)
	}
}

/// Open the connection pool and bootstrap the schema.
pub async fn connect(database_url: &str) -> Result<SqlitePool, StorageError> {
	let options = SqliteConnectOptions::from_str(database_url)?
		.create_if_missing(true)
		.foreign_keys(true);
	// a single connection keeps in-memory databases coherent across acquires
	let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
	let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
	schema::init(&pool).await?;
	log::debug!(target: LOG_TARGET, "schema ready at {database_url}");
	Ok(pool)
}

/// Truncate the entire projection, blocks included. Used by the resync path
/// when chain and database are unrecoverably out of sync.
pub async fn clear_all(pool: &SqlitePool) -> Result<(), StorageError> {
	let mut tx = pool.begin().await?;
	// children before parents, foreign keys are enforced
	for table in [
		"votes",
		"proposals",
		"governances",
		"asset_holdings",
		"assets",
		"multisig_transactions",
		"multisigs",
		"daos",
		"accounts",
		"blocks",
	] {
		sqlx::query(&format!("DELETE FROM {table}")).execute(&mut *tx).await?;
	}
	tx.commit().await?;
	Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
	connect("sqlite::memory:").await.expect("in-memory pool")
}
