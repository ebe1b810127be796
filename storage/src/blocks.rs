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

//! Raw block envelope store.
//!
//! `number` is unique: a second block arriving with a known number but a
//! different hash fails with a unique violation, which the ingestor treats as
//! unrecoverable divergence between chain and database.

use sqlx::{types::Json, SqliteConnection};

use gdao_primitives::{envelope::BlockEnvelope, BlockNumber};

use crate::{models::BlockRow, StorageError};

pub async fn get_by_hash(
	conn: &mut SqliteConnection,
	hash: &str,
) -> Result<Option<BlockRow>, StorageError> {
	let row = sqlx::query_as::<_, BlockRow>(
		"SELECT hash, number, parent_hash, extrinsic_data, event_data, executed
		 FROM blocks WHERE hash = ?",
	)
	.bind(hash)
	.fetch_optional(conn)
	.await?;
	Ok(row)
}

pub async fn get_by_number(
	conn: &mut SqliteConnection,
	number: BlockNumber,
) -> Result<Option<BlockRow>, StorageError> {
	let row = sqlx::query_as::<_, BlockRow>(
		"SELECT hash, number, parent_hash, extrinsic_data, event_data, executed
		 FROM blocks WHERE number = ?",
	)
	.bind(number)
	.fetch_optional(conn)
	.await?;
	Ok(row)
}

/// The highest block known to the store, executed or not.
pub async fn latest(conn: &mut SqliteConnection) -> Result<Option<BlockRow>, StorageError> {
	let row = sqlx::query_as::<_, BlockRow>(
		"SELECT hash, number, parent_hash, extrinsic_data, event_data, executed
		 FROM blocks ORDER BY number DESC LIMIT 1",
	)
	.fetch_optional(conn)
	.await?;
	Ok(row)
}

/// The highest block whose projection has been applied.
pub async fn latest_executed(
	conn: &mut SqliteConnection,
) -> Result<Option<BlockRow>, StorageError> {
	let row = sqlx::query_as::<_, BlockRow>(
		"SELECT hash, number, parent_hash, extrinsic_data, event_data, executed
		 FROM blocks WHERE executed = 1 ORDER BY number DESC LIMIT 1",
	)
	.fetch_optional(conn)
	.await?;
	Ok(row)
}

pub async fn create(
	conn: &mut SqliteConnection,
	envelope: &BlockEnvelope,
) -> Result<BlockRow, StorageError> {
	sqlx::query(
		"INSERT INTO blocks (hash, number, parent_hash, extrinsic_data, event_data, executed)
		 VALUES (?, ?, ?, ?, ?, 0)",
	)
	.bind(&envelope.hash)
	.bind(envelope.number)
	.bind(&envelope.parent_hash)
	.bind(Json(&envelope.extrinsics))
	.bind(Json(&envelope.events))
	.execute(&mut *conn)
	.await?;

	Ok(BlockRow {
		hash: envelope.hash.clone(),
		number: envelope.number,
		parent_hash: envelope.parent_hash.clone(),
		extrinsic_data: Json(envelope.extrinsics.clone()),
		event_data: Json(envelope.events.clone()),
		executed: false,
	})
}

/// Delete any row sharing this envelope's hash or number, then insert afresh.
pub async fn replace(
	conn: &mut SqliteConnection,
	envelope: &BlockEnvelope,
) -> Result<BlockRow, StorageError> {
	sqlx::query("DELETE FROM blocks WHERE hash = ? OR number = ?")
		.bind(&envelope.hash)
		.bind(envelope.number)
		.execute(&mut *conn)
		.await?;
	create(conn, envelope).await
}

/// Flip a block to executed. No-op when the row is already executed.
pub async fn mark_executed(conn: &mut SqliteConnection, hash: &str) -> Result<(), StorageError> {
	sqlx::query(
		"UPDATE blocks SET executed = 1, updated_at = CURRENT_TIMESTAMP
		 WHERE hash = ? AND executed = 0",
	)
	.bind(hash)
	.execute(conn)
	.await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use gdao_primitives::envelope::SectionMap;

	fn envelope(number: BlockNumber, hash: &str) -> BlockEnvelope {
		BlockEnvelope {
			number,
			hash: hash.into(),
			parent_hash: (number > 0).then(|| format!("hash {}", number - 1)),
			extrinsics: SectionMap::new(),
			events: SectionMap::new(),
		}
	}

	#[tokio::test]
	async fn create_and_fetch_round_trip() {
		let pool = crate::test_pool().await;
		let mut conn = pool.acquire().await.unwrap();

		create(&mut conn, &envelope(0, "hash 0")).await.unwrap();
		create(&mut conn, &envelope(1, "hash 1")).await.unwrap();

		let by_hash = get_by_hash(&mut conn, "hash 0").await.unwrap().unwrap();
		assert_eq!(by_hash.number, 0);
		assert!(!by_hash.executed);

		let by_number = get_by_number(&mut conn, 1).await.unwrap().unwrap();
		assert_eq!(by_number.hash, "hash 1");
		assert_eq!(by_number.parent_hash.as_deref(), Some("hash 0"));

		assert_eq!(latest(&mut conn).await.unwrap().unwrap().number, 1);
		assert!(latest_executed(&mut conn).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn same_number_different_hash_is_a_unique_violation() {
		let pool = crate::test_pool().await;
		let mut conn = pool.acquire().await.unwrap();

		create(&mut conn, &envelope(5, "hash 5")).await.unwrap();
		let err = create(&mut conn, &envelope(5, "other hash")).await.unwrap_err();
		assert!(err.is_unique_violation());
	}

	#[tokio::test]
	async fn replace_clears_conflicting_rows() {
		let pool = crate::test_pool().await;
		let mut conn = pool.acquire().await.unwrap();

		create(&mut conn, &envelope(5, "hash 5")).await.unwrap();
		replace(&mut conn, &envelope(5, "other hash")).await.unwrap();

		let row = get_by_number(&mut conn, 5).await.unwrap().unwrap();
		assert_eq!(row.hash, "other hash");
		assert!(get_by_hash(&mut conn, "hash 5").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn mark_executed_is_idempotent() {
		let pool = crate::test_pool().await;
		let mut conn = pool.acquire().await.unwrap();

		create(&mut conn, &envelope(0, "hash 0")).await.unwrap();
		mark_executed(&mut conn, "hash 0").await.unwrap();
		mark_executed(&mut conn, "hash 0").await.unwrap();

		assert!(get_by_hash(&mut conn, "hash 0").await.unwrap().unwrap().executed);
		assert_eq!(latest_executed(&mut conn).await.unwrap().unwrap().number, 0);
	}
}
