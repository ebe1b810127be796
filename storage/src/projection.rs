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

//! Repositories over the materialized entities.
//!
//! Handlers read whole row sets in one query, mutate in memory and write the
//! results back, so a block costs a bounded number of statements regardless of
//! how many events it carries. Every function takes a `&mut SqliteConnection`;
//! the pipeline passes its open transaction through.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{types::Json, QueryBuilder, Sqlite, SqliteConnection};

use gdao_primitives::{
	Address, AssetId, Balance, BlockNumber, DaoId, GovernanceType, ProposalId, ProposalStatus,
	TransactionStatus,
};

use crate::{
	models::{
		AssetHoldingRow, DaoHoldingRow, DaoRow, MultiSigRow, MultiSigTransactionRow, ProposalRow,
		VoteRow,
	},
	StorageError,
};

pub struct NewDao {
	pub id: DaoId,
	pub name: Option<String>,
	pub creator: Address,
	pub owner: Address,
}

pub struct NewAsset {
	pub id: AssetId,
	pub dao_id: DaoId,
	pub owner: Address,
	pub total_supply: Balance,
}

pub struct NewHolding {
	pub asset_id: AssetId,
	pub owner: Address,
	pub balance: Balance,
}

pub struct NewGovernance {
	pub dao_id: DaoId,
	pub proposal_duration: i64,
	pub proposal_token_deposit: Balance,
	pub minimum_majority: i64,
	pub governance_type: GovernanceType,
}

pub struct NewProposal {
	pub id: ProposalId,
	pub dao_id: DaoId,
	pub creator: Address,
	pub birth_block_number: BlockNumber,
}

pub struct NewVote {
	pub proposal_id: ProposalId,
	pub voter: Address,
	pub voting_power: Balance,
}

pub struct NewMultiSigTransaction {
	pub multisig: Address,
	pub call_hash: String,
	pub approvers: Vec<Address>,
}

/// Field set applied when a multisig transaction is executed on chain.
pub struct ExecutedTransaction {
	pub id: i64,
	pub approvers: Vec<Address>,
	pub call: Option<Value>,
	pub call_function: Option<String>,
	pub timepoint: Option<Value>,
	pub asset_id: Option<AssetId>,
	pub dao_id: Option<DaoId>,
	pub proposal_id: Option<ProposalId>,
	pub executed_at: DateTime<Utc>,
}

pub mod accounts {
	use super::*;

	pub async fn insert_ignore(
		conn: &mut SqliteConnection,
		addresses: &[Address],
	) -> Result<(), StorageError> {
		if addresses.is_empty() {
			return Ok(());
		}
		let mut qb = QueryBuilder::<Sqlite>::new("INSERT INTO accounts (address) ");
		qb.push_values(addresses, |mut row, address| {
			row.push_bind(address);
		});
		qb.push(" ON CONFLICT (address) DO NOTHING");
		qb.build().execute(conn).await?;
		Ok(())
	}

	pub async fn count(conn: &mut SqliteConnection) -> Result<i64, StorageError> {
		let count: (i64,) =
			sqlx::query_as("SELECT COUNT(*) FROM accounts").fetch_one(conn).await?;
		Ok(count.0)
	}

	pub async fn all_addresses(
		conn: &mut SqliteConnection,
	) -> Result<Vec<Address>, StorageError> {
		let rows: Vec<(Address,)> =
			sqlx::query_as("SELECT address FROM accounts ORDER BY address").fetch_all(conn).await?;
		Ok(rows.into_iter().map(|(address,)| address).collect())
	}
}

pub mod daos {
	use super::*;

	pub async fn create(
		conn: &mut SqliteConnection,
		daos: &[NewDao],
	) -> Result<(), StorageError> {
		if daos.is_empty() {
			return Ok(());
		}
		let mut qb =
			QueryBuilder::<Sqlite>::new("INSERT INTO daos (id, name, creator_id, owner_id) ");
		qb.push_values(daos, |mut row, dao| {
			row.push_bind(&dao.id).push_bind(&dao.name).push_bind(&dao.creator).push_bind(&dao.owner);
		});
		qb.build().execute(conn).await?;
		Ok(())
	}

	pub async fn by_ids(
		conn: &mut SqliteConnection,
		ids: &[DaoId],
	) -> Result<Vec<DaoRow>, StorageError> {
		if ids.is_empty() {
			return Ok(Vec::new());
		}
		let mut qb = QueryBuilder::<Sqlite>::new(
			"SELECT id, name, creator_id, owner_id, metadata_url, metadata_hash, metadata, setup_complete
			 FROM daos WHERE id IN (",
		);
		let mut sep = qb.separated(", ");
		for id in ids {
			sep.push_bind(id);
		}
		qb.push(")");
		Ok(qb.build_query_as::<DaoRow>().fetch_all(conn).await?)
	}

	/// Transfer ownership; an owner change also completes the DAO's setup.
	pub async fn change_owners(
		conn: &mut SqliteConnection,
		changes: &[(DaoId, Address)],
	) -> Result<(), StorageError> {
		for (dao_id, new_owner) in changes {
			sqlx::query(
				"UPDATE daos SET owner_id = ?, setup_complete = 1, updated_at = CURRENT_TIMESTAMP
				 WHERE id = ?",
			)
			.bind(new_owner)
			.bind(dao_id)
			.execute(&mut *conn)
			.await?;
		}
		Ok(())
	}

	pub async fn delete(
		conn: &mut SqliteConnection,
		ids: &[DaoId],
	) -> Result<(), StorageError> {
		if ids.is_empty() {
			return Ok(());
		}
		let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM daos WHERE id IN (");
		let mut sep = qb.separated(", ");
		for id in ids {
			sep.push_bind(id);
		}
		qb.push(")");
		qb.build().execute(conn).await?;
		Ok(())
	}

	/// Record announced metadata coordinates and, when verified, the content.
	pub async fn set_metadata(
		conn: &mut SqliteConnection,
		dao_id: &str,
		url: &str,
		hash: &str,
		metadata: Option<&Value>,
	) -> Result<(), StorageError> {
		sqlx::query(
			"UPDATE daos SET metadata_url = ?, metadata_hash = ?, metadata = ?,
			 updated_at = CURRENT_TIMESTAMP WHERE id = ?",
		)
		.bind(url)
		.bind(hash)
		.bind(metadata.map(Json))
		.bind(dao_id)
		.execute(conn)
		.await?;
		Ok(())
	}
}

pub mod assets {
	use super::*;

	pub async fn create(
		conn: &mut SqliteConnection,
		assets: &[NewAsset],
	) -> Result<(), StorageError> {
		if assets.is_empty() {
			return Ok(());
		}
		let mut qb =
			QueryBuilder::<Sqlite>::new("INSERT INTO assets (id, dao_id, owner_id, total_supply) ");
		qb.push_values(assets, |mut row, asset| {
			row.push_bind(asset.id)
				.push_bind(&asset.dao_id)
				.push_bind(&asset.owner)
				.push_bind(asset.total_supply);
		});
		qb.build().execute(conn).await?;
		Ok(())
	}
}

pub mod holdings {
	use super::*;

	pub async fn create(
		conn: &mut SqliteConnection,
		holdings: &[NewHolding],
	) -> Result<(), StorageError> {
		if holdings.is_empty() {
			return Ok(());
		}
		let mut qb = QueryBuilder::<Sqlite>::new(
			"INSERT INTO asset_holdings (asset_id, owner_id, balance) ",
		);
		qb.push_values(holdings, |mut row, holding| {
			row.push_bind(holding.asset_id).push_bind(&holding.owner).push_bind(holding.balance);
		});
		qb.build().execute(conn).await?;
		Ok(())
	}

	/// Load every holding matching any `(asset, one of owners)` pair in one query.
	pub async fn by_asset_owners(
		conn: &mut SqliteConnection,
		pairs: &[(AssetId, Vec<Address>)],
	) -> Result<Vec<AssetHoldingRow>, StorageError> {
		if pairs.is_empty() {
			return Ok(Vec::new());
		}
		let mut qb = QueryBuilder::<Sqlite>::new(
			"SELECT id, asset_id, owner_id, balance, delegated_to FROM asset_holdings WHERE ",
		);
		for (index, (asset_id, owners)) in pairs.iter().enumerate() {
			if index > 0 {
				qb.push(" OR ");
			}
			qb.push("(asset_id = ").push_bind(*asset_id).push(" AND owner_id IN (");
			let mut sep = qb.separated(", ");
			for owner in owners {
				sep.push_bind(owner);
			}
			qb.push("))");
		}
		Ok(qb.build_query_as::<AssetHoldingRow>().fetch_all(conn).await?)
	}

	pub async fn update_balances(
		conn: &mut SqliteConnection,
		updates: &[(i64, Balance)],
	) -> Result<(), StorageError> {
		for (id, balance) in updates {
			sqlx::query(
				"UPDATE asset_holdings SET balance = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
			)
			.bind(balance)
			.bind(id)
			.execute(&mut *conn)
			.await?;
		}
		Ok(())
	}

	pub async fn delegate(
		conn: &mut SqliteConnection,
		updates: &[(i64, Address)],
	) -> Result<(), StorageError> {
		for (id, delegate) in updates {
			sqlx::query(
				"UPDATE asset_holdings SET delegated_to = ?, updated_at = CURRENT_TIMESTAMP
				 WHERE id = ?",
			)
			.bind(delegate)
			.bind(id)
			.execute(&mut *conn)
			.await?;
		}
		Ok(())
	}

	/// Null out delegations matching `(asset, owner, delegated_to)` exactly.
	pub async fn revoke_delegations(
		conn: &mut SqliteConnection,
		keys: &[(AssetId, Address, Address)],
	) -> Result<(), StorageError> {
		if keys.is_empty() {
			return Ok(());
		}
		let mut qb = QueryBuilder::<Sqlite>::new(
			"UPDATE asset_holdings SET delegated_to = NULL, updated_at = CURRENT_TIMESTAMP WHERE ",
		);
		for (index, (asset_id, owner, delegated_to)) in keys.iter().enumerate() {
			if index > 0 {
				qb.push(" OR ");
			}
			qb.push("(asset_id = ")
				.push_bind(*asset_id)
				.push(" AND owner_id = ")
				.push_bind(owner)
				.push(" AND delegated_to = ")
				.push_bind(delegated_to)
				.push(")");
		}
		qb.build().execute(conn).await?;
		Ok(())
	}

	/// Holdings of every asset owned by the given DAOs, tagged with the DAO id.
	pub async fn dao_holdings(
		conn: &mut SqliteConnection,
		dao_ids: &[DaoId],
	) -> Result<Vec<DaoHoldingRow>, StorageError> {
		if dao_ids.is_empty() {
			return Ok(Vec::new());
		}
		let mut qb = QueryBuilder::<Sqlite>::new(
			"SELECT assets.dao_id AS dao_id, holdings.owner_id AS owner_id,
			        holdings.delegated_to AS delegated_to, holdings.balance AS balance
			 FROM asset_holdings holdings
			 JOIN assets ON assets.id = holdings.asset_id
			 WHERE assets.dao_id IN (",
		);
		let mut sep = qb.separated(", ");
		for dao_id in dao_ids {
			sep.push_bind(dao_id);
		}
		qb.push(")");
		Ok(qb.build_query_as::<DaoHoldingRow>().fetch_all(conn).await?)
	}
}

pub mod governances {
	use super::*;

	/// Replace the governance of each DAO: the old row is deleted, not updated.
	pub async fn replace(
		conn: &mut SqliteConnection,
		governances: &[NewGovernance],
	) -> Result<(), StorageError> {
		if governances.is_empty() {
			return Ok(());
		}
		let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM governances WHERE dao_id IN (");
		let mut sep = qb.separated(", ");
		for governance in governances {
			sep.push_bind(&governance.dao_id);
		}
		qb.push(")");
		qb.build().execute(&mut *conn).await?;

		let mut qb = QueryBuilder::<Sqlite>::new(
			"INSERT INTO governances
			 (dao_id, proposal_duration, proposal_token_deposit, minimum_majority, type) ",
		);
		qb.push_values(governances, |mut row, governance| {
			row.push_bind(&governance.dao_id)
				.push_bind(governance.proposal_duration)
				.push_bind(governance.proposal_token_deposit)
				.push_bind(governance.minimum_majority)
				.push_bind(governance.governance_type.as_str());
		});
		qb.build().execute(conn).await?;
		Ok(())
	}

	pub async fn by_dao_id(
		conn: &mut SqliteConnection,
		dao_id: &str,
	) -> Result<Option<crate::models::GovernanceRow>, StorageError> {
		let row = sqlx::query_as::<_, crate::models::GovernanceRow>(
			"SELECT id, dao_id, proposal_duration, proposal_token_deposit, minimum_majority, type
			 FROM governances WHERE dao_id = ?",
		)
		.bind(dao_id)
		.fetch_optional(conn)
		.await?;
		Ok(row)
	}
}

pub mod proposals {
	use super::*;

	pub async fn create(
		conn: &mut SqliteConnection,
		proposals: &[NewProposal],
	) -> Result<(), StorageError> {
		if proposals.is_empty() {
			return Ok(());
		}
		let mut qb = QueryBuilder::<Sqlite>::new(
			"INSERT INTO proposals (id, dao_id, creator_id, birth_block_number) ",
		);
		qb.push_values(proposals, |mut row, proposal| {
			row.push_bind(&proposal.id)
				.push_bind(&proposal.dao_id)
				.push_bind(&proposal.creator)
				.push_bind(proposal.birth_block_number);
		});
		qb.build().execute(conn).await?;
		Ok(())
	}

	pub async fn by_ids(
		conn: &mut SqliteConnection,
		ids: &[ProposalId],
	) -> Result<Vec<ProposalRow>, StorageError> {
		if ids.is_empty() {
			return Ok(Vec::new());
		}
		let mut qb = QueryBuilder::<Sqlite>::new(
			"SELECT id, dao_id, creator_id, status, fault, birth_block_number, metadata_url,
			        metadata_hash, metadata, title, setup_complete
			 FROM proposals WHERE id IN (",
		);
		let mut sep = qb.separated(", ");
		for id in ids {
			sep.push_bind(id);
		}
		qb.push(")");
		Ok(qb.build_query_as::<ProposalRow>().fetch_all(conn).await?)
	}

	/// Record announced metadata coordinates; setting them completes setup.
	pub async fn set_metadata_coords(
		conn: &mut SqliteConnection,
		updates: &[(ProposalId, String, String)],
	) -> Result<(), StorageError> {
		for (id, url, hash) in updates {
			sqlx::query(
				"UPDATE proposals SET metadata_url = ?, metadata_hash = ?, setup_complete = 1,
				 updated_at = CURRENT_TIMESTAMP WHERE id = ?",
			)
			.bind(url)
			.bind(hash)
			.bind(id)
			.execute(&mut *conn)
			.await?;
		}
		Ok(())
	}

	pub async fn set_metadata_content(
		conn: &mut SqliteConnection,
		id: &str,
		metadata: &Value,
	) -> Result<(), StorageError> {
		sqlx::query(
			"UPDATE proposals SET metadata = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
		)
		.bind(Json(metadata))
		.bind(id)
		.execute(conn)
		.await?;
		Ok(())
	}

	pub async fn set_status(
		conn: &mut SqliteConnection,
		ids: &[ProposalId],
		status: ProposalStatus,
	) -> Result<(), StorageError> {
		if ids.is_empty() {
			return Ok(());
		}
		let mut qb = QueryBuilder::<Sqlite>::new("UPDATE proposals SET status = ");
		qb.push_bind(status.as_str());
		qb.push(", updated_at = CURRENT_TIMESTAMP WHERE id IN (");
		let mut sep = qb.separated(", ");
		for id in ids {
			sep.push_bind(id);
		}
		qb.push(")");
		qb.build().execute(conn).await?;
		Ok(())
	}

	pub async fn set_faults(
		conn: &mut SqliteConnection,
		faults: &[(ProposalId, String)],
	) -> Result<(), StorageError> {
		for (id, reason) in faults {
			sqlx::query(
				"UPDATE proposals SET status = ?, fault = ?, updated_at = CURRENT_TIMESTAMP
				 WHERE id = ?",
			)
			.bind(ProposalStatus::Faulted.as_str())
			.bind(reason)
			.bind(id)
			.execute(&mut *conn)
			.await?;
		}
		Ok(())
	}
}

pub mod votes {
	use super::*;

	pub async fn create(
		conn: &mut SqliteConnection,
		votes: &[NewVote],
	) -> Result<(), StorageError> {
		if votes.is_empty() {
			return Ok(());
		}
		let mut qb = QueryBuilder::<Sqlite>::new(
			"INSERT INTO votes (proposal_id, voter_id, voting_power) ",
		);
		qb.push_values(votes, |mut row, vote| {
			row.push_bind(&vote.proposal_id).push_bind(&vote.voter).push_bind(vote.voting_power);
		});
		qb.build().execute(conn).await?;
		Ok(())
	}

	pub async fn by_proposal_voters(
		conn: &mut SqliteConnection,
		pairs: &[(ProposalId, Vec<Address>)],
	) -> Result<Vec<VoteRow>, StorageError> {
		if pairs.is_empty() {
			return Ok(Vec::new());
		}
		let mut qb = QueryBuilder::<Sqlite>::new(
			"SELECT id, proposal_id, voter_id, in_favor, voting_power FROM votes WHERE ",
		);
		for (index, (proposal_id, voters)) in pairs.iter().enumerate() {
			if index > 0 {
				qb.push(" OR ");
			}
			qb.push("(proposal_id = ").push_bind(proposal_id).push(" AND voter_id IN (");
			let mut sep = qb.separated(", ");
			for voter in voters {
				sep.push_bind(voter);
			}
			qb.push("))");
		}
		Ok(qb.build_query_as::<VoteRow>().fetch_all(conn).await?)
	}

	pub async fn by_proposal(
		conn: &mut SqliteConnection,
		proposal_id: &str,
	) -> Result<Vec<VoteRow>, StorageError> {
		let rows = sqlx::query_as::<_, VoteRow>(
			"SELECT id, proposal_id, voter_id, in_favor, voting_power FROM votes
			 WHERE proposal_id = ? ORDER BY voter_id",
		)
		.bind(proposal_id)
		.fetch_all(conn)
		.await?;
		Ok(rows)
	}

	pub async fn set_in_favor(
		conn: &mut SqliteConnection,
		updates: &[(i64, bool)],
	) -> Result<(), StorageError> {
		for (id, in_favor) in updates {
			sqlx::query(
				"UPDATE votes SET in_favor = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
			)
			.bind(in_favor)
			.bind(id)
			.execute(&mut *conn)
			.await?;
		}
		Ok(())
	}
}

pub mod multisigs {
	use super::*;

	pub async fn insert_ignore(
		conn: &mut SqliteConnection,
		addresses: &[Address],
	) -> Result<(), StorageError> {
		if addresses.is_empty() {
			return Ok(());
		}
		let mut qb = QueryBuilder::<Sqlite>::new("INSERT INTO multisigs (address) ");
		qb.push_values(addresses, |mut row, address| {
			row.push_bind(address);
		});
		qb.push(" ON CONFLICT (address) DO NOTHING");
		qb.build().execute(conn).await?;
		Ok(())
	}

	pub async fn by_addresses(
		conn: &mut SqliteConnection,
		addresses: &[Address],
	) -> Result<Vec<MultiSigRow>, StorageError> {
		if addresses.is_empty() {
			return Ok(Vec::new());
		}
		let mut qb = QueryBuilder::<Sqlite>::new(
			"SELECT address, dao_id, signatories, threshold FROM multisigs WHERE address IN (",
		);
		let mut sep = qb.separated(", ");
		for address in addresses {
			sep.push_bind(address);
		}
		qb.push(")");
		Ok(qb.build_query_as::<MultiSigRow>().fetch_all(conn).await?)
	}

	/// Point multisig accounts at the DAO they now own.
	pub async fn link_daos(
		conn: &mut SqliteConnection,
		links: &[(Address, DaoId)],
	) -> Result<(), StorageError> {
		for (address, dao_id) in links {
			sqlx::query(
				"UPDATE multisigs SET dao_id = ?, updated_at = CURRENT_TIMESTAMP WHERE address = ?",
			)
			.bind(dao_id)
			.bind(address)
			.execute(&mut *conn)
			.await?;
		}
		Ok(())
	}
}

pub mod multisig_transactions {
	use super::*;

	pub async fn create(
		conn: &mut SqliteConnection,
		transactions: &[NewMultiSigTransaction],
	) -> Result<(), StorageError> {
		if transactions.is_empty() {
			return Ok(());
		}
		let mut qb = QueryBuilder::<Sqlite>::new(
			"INSERT INTO multisig_transactions (multisig_address, call_hash, approvers) ",
		);
		qb.push_values(transactions, |mut row, transaction| {
			row.push_bind(&transaction.multisig)
				.push_bind(&transaction.call_hash)
				.push_bind(Json(&transaction.approvers));
		});
		qb.build().execute(conn).await?;
		Ok(())
	}

	/// Non-executed transactions matching any `(call_hash, multisig)` key,
	/// newest first so callers can pick the most recent row per key.
	pub async fn pending_by_keys(
		conn: &mut SqliteConnection,
		keys: &[(String, Address)],
	) -> Result<Vec<MultiSigTransactionRow>, StorageError> {
		if keys.is_empty() {
			return Ok(Vec::new());
		}
		let mut qb = QueryBuilder::<Sqlite>::new(
			"SELECT id, multisig_address, call_hash, call, call_function, timepoint, approvers,
			        canceled_by, status, executed_at, asset_id, dao_id, proposal_id
			 FROM multisig_transactions WHERE executed_at IS NULL AND (",
		);
		for (index, (call_hash, multisig)) in keys.iter().enumerate() {
			if index > 0 {
				qb.push(" OR ");
			}
			qb.push("(call_hash = ")
				.push_bind(call_hash)
				.push(" AND multisig_address = ")
				.push_bind(multisig)
				.push(")");
		}
		qb.push(") ORDER BY id DESC");
		Ok(qb.build_query_as::<MultiSigTransactionRow>().fetch_all(conn).await?)
	}

	pub async fn set_approvers(
		conn: &mut SqliteConnection,
		updates: &[(i64, Vec<Address>)],
	) -> Result<(), StorageError> {
		for (id, approvers) in updates {
			sqlx::query(
				"UPDATE multisig_transactions SET approvers = ?, updated_at = CURRENT_TIMESTAMP
				 WHERE id = ?",
			)
			.bind(Json(approvers))
			.bind(id)
			.execute(&mut *conn)
			.await?;
		}
		Ok(())
	}

	pub async fn mark_executed(
		conn: &mut SqliteConnection,
		updates: &[ExecutedTransaction],
	) -> Result<(), StorageError> {
		for update in updates {
			sqlx::query(
				"UPDATE multisig_transactions
				 SET approvers = ?, call = ?, call_function = ?, timepoint = ?, asset_id = ?,
				     dao_id = ?, proposal_id = ?, status = ?, executed_at = ?,
				     updated_at = CURRENT_TIMESTAMP
				 WHERE id = ?",
			)
			.bind(Json(&update.approvers))
			.bind(update.call.as_ref().map(Json))
			.bind(&update.call_function)
			.bind(update.timepoint.as_ref().map(Json))
			.bind(update.asset_id)
			.bind(&update.dao_id)
			.bind(&update.proposal_id)
			.bind(TransactionStatus::Executed.as_str())
			.bind(update.executed_at)
			.bind(update.id)
			.execute(&mut *conn)
			.await?;
		}
		Ok(())
	}

	pub async fn cancel(
		conn: &mut SqliteConnection,
		updates: &[(i64, Address)],
	) -> Result<(), StorageError> {
		for (id, cancelled_by) in updates {
			sqlx::query(
				"UPDATE multisig_transactions
				 SET canceled_by = ?, status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
			)
			.bind(cancelled_by)
			.bind(TransactionStatus::Cancelled.as_str())
			.bind(id)
			.execute(&mut *conn)
			.await?;
		}
		Ok(())
	}
}
