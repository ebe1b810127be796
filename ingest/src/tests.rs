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

use std::{
	collections::{HashMap, VecDeque},
	sync::{Arc, Mutex},
	time::Duration,
};

use async_trait::async_trait;
use serde_json::json;
use sqlx::SqlitePool;

use gdao_chain_client::{call::compute_call_hash, ChainApi, ChainError};
use gdao_primitives::{
	envelope::{AttrMap, BlockEnvelope},
	Address, Balance, BlockNumber, ProposalStatus, TransactionStatus,
};
use gdao_storage::{
	blocks,
	cache::Cache,
	models::BlockRow,
	projection::{
		accounts, assets, daos, holdings, multisig_transactions, proposals, votes, NewAsset,
		NewDao, NewHolding,
	},
};

use crate::{
	metadata::{self, HashAlgorithm, MetadataClient, MetadataError, MetadataJob},
	pipeline, worker::sync_initial_accounts, IngestError, Ingestor, IngestorParams,
};

fn envelope(
	number: BlockNumber,
	extrinsics: serde_json::Value,
	events: serde_json::Value,
) -> BlockEnvelope {
	BlockEnvelope {
		number,
		hash: format!("hash {number}"),
		parent_hash: (number > 0).then(|| format!("hash {}", number - 1)),
		extrinsics: serde_json::from_value(extrinsics).expect("test extrinsics are well formed"),
		events: serde_json::from_value(events).expect("test events are well formed"),
	}
}

fn empty_block(number: BlockNumber) -> BlockEnvelope {
	envelope(number, json!({}), json!({}))
}

async fn pool() -> SqlitePool {
	gdao_storage::connect("sqlite::memory:").await.expect("in-memory pool")
}

async fn store_block(pool: &SqlitePool, envelope: &BlockEnvelope) -> BlockRow {
	let mut conn = pool.acquire().await.unwrap();
	blocks::create(&mut conn, envelope).await.unwrap()
}

async fn run_block(pool: &SqlitePool, envelope: &BlockEnvelope) -> Vec<MetadataJob> {
	let block = store_block(pool, envelope).await;
	pipeline::execute_block(pool, &block, &Cache::new()).await.unwrap()
}

async fn seed_accounts(pool: &SqlitePool, names: &[&str]) {
	let mut conn = pool.acquire().await.unwrap();
	let addresses: Vec<Address> = names.iter().map(|name| name.to_string()).collect();
	accounts::insert_ignore(&mut conn, &addresses).await.unwrap();
}

async fn seed_dao_with_asset(pool: &SqlitePool, dao_id: &str, asset_id: i64, owner: &str) {
	let mut conn = pool.acquire().await.unwrap();
	daos::create(
		&mut conn,
		&[NewDao { id: dao_id.into(), name: None, creator: owner.into(), owner: owner.into() }],
	)
	.await
	.unwrap();
	assets::create(
		&mut conn,
		&[NewAsset { id: asset_id, dao_id: dao_id.into(), owner: owner.into(), total_supply: 0 }],
	)
	.await
	.unwrap();
}

async fn seed_holding(pool: &SqlitePool, asset_id: i64, owner: &str, balance: Balance) {
	let mut conn = pool.acquire().await.unwrap();
	holdings::create(
		&mut conn,
		&[NewHolding { asset_id, owner: owner.into(), balance }],
	)
	.await
	.unwrap();
}

async fn balances(pool: &SqlitePool, asset_owner_pairs: &[(i64, &str)]) -> Vec<Balance> {
	let mut conn = pool.acquire().await.unwrap();
	let pairs: Vec<(i64, Vec<Address>)> =
		asset_owner_pairs.iter().map(|(asset, owner)| (*asset, vec![owner.to_string()])).collect();
	let rows = holdings::by_asset_owners(&mut conn, &pairs).await.unwrap();
	asset_owner_pairs
		.iter()
		.map(|(asset, owner)| {
			rows.iter()
				.find(|row| row.asset_id == *asset && row.owner_id == *owner)
				.map(|row| row.balance)
				.unwrap_or(-1)
		})
		.collect()
}

// --- pipeline scenarios ---

#[tokio::test]
async fn new_accounts_are_projected() {
	let pool = pool().await;
	let block = envelope(
		1,
		json!({}),
		json!({ "System": { "NewAccount": [ { "account": "acc1" }, { "account": "acc2" } ] } }),
	);
	run_block(&pool, &block).await;

	let mut conn = pool.acquire().await.unwrap();
	assert_eq!(
		accounts::all_addresses(&mut conn).await.unwrap(),
		vec!["acc1".to_string(), "acc2".into()]
	);
	assert!(blocks::get_by_hash(&mut conn, "hash 1").await.unwrap().unwrap().executed);
}

#[tokio::test]
async fn dao_creation_requires_a_matching_event() {
	let pool = pool().await;
	let block = envelope(
		1,
		json!({ "DaoCore": { "create_dao": [
			{ "dao_id": "dao1", "dao_name": "dao1 name" },
			{ "dao_id": "dao2", "dao_name": "dao2 name" },
			{ "dao_id": "dao3", "dao_name": "dao3 name" },
		] } }),
		json!({
			"System": { "NewAccount": [ { "account": "acc1" }, { "account": "acc2" } ] },
			"DaoCore": { "DaoCreated": [
				{ "dao_id": "dao1", "owner": "acc1" },
				{ "dao_id": "dao2", "owner": "acc2" },
			] },
		}),
	);
	run_block(&pool, &block).await;

	let mut conn = pool.acquire().await.unwrap();
	let rows = daos::by_ids(
		&mut conn,
		&["dao1".to_string(), "dao2".into(), "dao3".into()],
	)
	.await
	.unwrap();
	assert_eq!(rows.len(), 2);
	let dao1 = rows.iter().find(|dao| dao.id == "dao1").unwrap();
	assert_eq!(dao1.owner_id, "acc1");
	assert_eq!(dao1.creator_id, "acc1");
	assert_eq!(dao1.name.as_deref(), Some("dao1 name"));
	assert!(!dao1.setup_complete);
	assert!(rows.iter().all(|dao| dao.id != "dao3"));
}

#[tokio::test]
async fn asset_transfer_totals_are_order_insensitive() {
	let pool = pool().await;
	seed_accounts(&pool, &["acc1", "acc2", "acc3"]).await;
	for (dao, asset, owner) in
		[("DAO1", 1, "acc1"), ("DAO2", 2, "acc2"), ("DAO3", 3, "acc2"), ("DAO4", 4, "acc3")]
	{
		seed_dao_with_asset(&pool, dao, asset, owner).await;
	}
	for (asset, owner, balance) in [
		(1, "acc1", 100),
		(1, "acc3", 50),
		(2, "acc2", 200),
		(2, "acc3", 50),
		(3, "acc2", 50),
		(3, "acc3", 300),
		(4, "acc3", 400),
	] {
		seed_holding(&pool, asset, owner, balance).await;
	}

	// shuffled relative to any per-asset ordering
	let block = envelope(
		1,
		json!({}),
		json!({ "Assets": { "Transferred": [
			{ "asset_id": 2, "amount": 20, "from": "acc2", "to": "acc1" },
			{ "asset_id": 1, "amount": 10, "from": "acc1", "to": "acc2" },
			{ "asset_id": 3, "amount": 50, "from": "acc3", "to": "acc2" },
			{ "asset_id": 1, "amount": 25, "from": "acc3", "to": "acc2" },
			{ "asset_id": 1, "amount": 15, "from": "acc1", "to": "acc2" },
		] } }),
	);
	run_block(&pool, &block).await;

	assert_eq!(
		balances(
			&pool,
			&[
				(1, "acc1"),
				(1, "acc2"),
				(1, "acc3"),
				(2, "acc1"),
				(2, "acc2"),
				(2, "acc3"),
				(3, "acc2"),
				(3, "acc3"),
				(4, "acc3"),
			]
		)
		.await,
		vec![75, 50, 25, 20, 180, 50, 100, 250, 400]
	);
}

#[tokio::test]
async fn transfer_from_unknown_holding_fails_the_block() {
	let pool = pool().await;
	seed_accounts(&pool, &["acc1", "acc2"]).await;
	seed_dao_with_asset(&pool, "DAO1", 1, "acc1").await;

	let block = envelope(
		1,
		json!({}),
		json!({ "Assets": { "Transferred": [
			{ "asset_id": 1, "amount": 10, "from": "acc1", "to": "acc2" },
		] } }),
	);
	let row = store_block(&pool, &block).await;
	let err = pipeline::execute_block(&pool, &row, &Cache::new()).await.unwrap_err();
	assert!(matches!(err, IngestError::ParseBlock { number: 1 }));

	let mut conn = pool.acquire().await.unwrap();
	assert!(!blocks::get_by_hash(&mut conn, "hash 1").await.unwrap().unwrap().executed);
}

#[tokio::test]
async fn proposal_snapshot_honours_delegation() {
	let pool = pool().await;
	seed_accounts(&pool, &["A", "B", "C"]).await;
	seed_dao_with_asset(&pool, "DAO1", 1, "A").await;
	{
		let mut conn = pool.acquire().await.unwrap();
		holdings::create(
			&mut conn,
			&[
				NewHolding { asset_id: 1, owner: "A".into(), balance: 30 },
				NewHolding { asset_id: 1, owner: "B".into(), balance: 70 },
				NewHolding { asset_id: 1, owner: "C".into(), balance: 0 },
			],
		)
		.await
		.unwrap();
	}
	// A delegates to C
	run_block(
		&pool,
		&envelope(
			1,
			json!({}),
			json!({ "Assets": { "Delegated": [
				{ "asset_id": 1, "from": "A", "to": "C" },
			] } }),
		),
	)
	.await;

	run_block(
		&pool,
		&envelope(
			2,
			json!({}),
			json!({ "Votes": { "ProposalCreated": [
				{ "proposal_id": "PROP1", "dao_id": "DAO1", "creator": "A" },
			] } }),
		),
	)
	.await;

	let mut conn = pool.acquire().await.unwrap();
	let rows = votes::by_proposal(&mut conn, "PROP1").await.unwrap();
	let snapshot: Vec<(Address, Balance, Option<bool>)> =
		rows.iter().map(|row| (row.voter_id.clone(), row.voting_power, row.in_favor)).collect();
	assert_eq!(snapshot, vec![("B".to_string(), 70, None), ("C".to_string(), 30, None)]);

	let proposal =
		proposals::by_ids(&mut conn, &["PROP1".to_string()]).await.unwrap().remove(0);
	assert_eq!(proposal.birth_block_number, 2);
	assert_eq!(proposal.status().unwrap(), ProposalStatus::Running);
}

#[tokio::test]
async fn votes_finalization_and_faults_update_status() {
	let pool = pool().await;
	seed_accounts(&pool, &["A", "B"]).await;
	seed_dao_with_asset(&pool, "DAO1", 1, "A").await;
	seed_holding(&pool, 1, "A", 60).await;
	seed_holding(&pool, 1, "B", 40).await;

	run_block(
		&pool,
		&envelope(
			1,
			json!({}),
			json!({ "Votes": { "ProposalCreated": [
				{ "proposal_id": "P1", "dao_id": "DAO1", "creator": "A" },
				{ "proposal_id": "P2", "dao_id": "DAO1", "creator": "A" },
				{ "proposal_id": "P3", "dao_id": "DAO1", "creator": "B" },
			] } }),
		),
	)
	.await;

	run_block(
		&pool,
		&envelope(
			2,
			json!({}),
			json!({ "Votes": {
				"VoteCast": [
					{ "proposal_id": "P1", "voter": "A", "in_favor": true },
					{ "proposal_id": "P1", "voter": "B", "in_favor": false },
				],
				"ProposalAccepted": [ { "proposal_id": "P1" } ],
				"ProposalRejected": [ { "proposal_id": "P2" } ],
				"ProposalFaulted": [ { "proposal_id": "P3", "reason": "spam" } ],
			} }),
		),
	)
	.await;

	let mut conn = pool.acquire().await.unwrap();
	let p1_votes = votes::by_proposal(&mut conn, "P1").await.unwrap();
	assert_eq!(
		p1_votes.iter().map(|vote| (vote.voter_id.as_str(), vote.in_favor)).collect::<Vec<_>>(),
		vec![("A", Some(true)), ("B", Some(false))]
	);

	let by_id: HashMap<String, (ProposalStatus, Option<String>)> = proposals::by_ids(
		&mut conn,
		&["P1".to_string(), "P2".into(), "P3".into()],
	)
	.await
	.unwrap()
	.into_iter()
	.map(|proposal| {
		let status = proposal.status().unwrap();
		(proposal.id, (status, proposal.fault))
	})
	.collect();
	assert_eq!(by_id["P1"], (ProposalStatus::Pending, None));
	assert_eq!(by_id["P2"], (ProposalStatus::Rejected, None));
	assert_eq!(by_id["P3"], (ProposalStatus::Faulted, Some("spam".to_string())));
}

#[tokio::test]
async fn multisig_full_flow_in_one_block() {
	let pool = pool().await;
	seed_accounts(&pool, &["acc2"]).await;

	let call_args: AttrMap = json!({ "dao_id": "DAO1", "new_owner": "acc2" })
		.as_object()
		.unwrap()
		.clone();
	let call_hash = compute_call_hash("DaoCore", "change_owner", &call_args);

	let block = envelope(
		1,
		json!({ "Multisig": { "as_multi": [ {
			"call": {
				"call_module": "DaoCore",
				"call_function": "change_owner",
				"call_args": [
					{ "name": "dao_id", "value": "DAO1" },
					{ "name": "new_owner", "value": "acc2" },
				],
			},
			"maybe_timepoint": { "height": 1, "index": 0 },
		} ] } }),
		json!({ "Multisig": {
			"NewMultisig": [
				{ "call_hash": call_hash.clone(), "multisig": "msig", "approving": "alice" },
			],
			"MultisigApproval": [
				{ "call_hash": call_hash.clone(), "multisig": "msig", "approving": "bob" },
			],
			"MultisigExecuted": [
				{ "call_hash": call_hash.clone(), "multisig": "msig", "approving": "carol" },
			],
		} }),
	);
	run_block(&pool, &block).await;

	let mut conn = pool.acquire().await.unwrap();
	let rows = sqlx::query_as::<_, gdao_storage::models::MultiSigTransactionRow>(
		"SELECT id, multisig_address, call_hash, call, call_function, timepoint, approvers,
		        canceled_by, status, executed_at, asset_id, dao_id, proposal_id
		 FROM multisig_transactions",
	)
	.fetch_all(&mut *conn)
	.await
	.unwrap();
	assert_eq!(rows.len(), 1);
	let transaction = &rows[0];
	assert_eq!(transaction.multisig_address, "msig");
	assert_eq!(
		transaction.approvers.0,
		vec!["alice".to_string(), "bob".into(), "carol".into()]
	);
	assert_eq!(transaction.status().unwrap(), TransactionStatus::Executed);
	assert!(transaction.executed_at.is_some());
	assert_eq!(transaction.call_function.as_deref(), Some("change_owner"));
	assert_eq!(transaction.dao_id.as_deref(), Some("DAO1"));
	assert_eq!(transaction.asset_id, None);
	let call = transaction.call.as_ref().unwrap();
	assert_eq!(call.0["hash"], serde_json::Value::String(call_hash.clone()));
}

#[tokio::test]
async fn multisig_cancellation_marks_the_pending_row() {
	let pool = pool().await;
	run_block(
		&pool,
		&envelope(
			1,
			json!({}),
			json!({ "Multisig": { "NewMultisig": [
				{ "call_hash": "0xfeed", "multisig": "msig", "approving": "alice" },
			] } }),
		),
	)
	.await;
	run_block(
		&pool,
		&envelope(
			2,
			json!({}),
			json!({ "Multisig": { "MultisigCancelled": [
				{ "call_hash": "0xfeed", "multisig": "msig", "cancelling": "alice" },
			] } }),
		),
	)
	.await;

	let mut conn = pool.acquire().await.unwrap();
	let keys = vec![("0xfeed".to_string(), "msig".to_string())];
	let rows = multisig_transactions::pending_by_keys(&mut conn, &keys).await.unwrap();
	assert_eq!(rows.len(), 1);
	assert_eq!(rows[0].status().unwrap(), TransactionStatus::Cancelled);
	assert_eq!(rows[0].canceled_by.as_deref(), Some("alice"));
}

#[tokio::test]
async fn dao_ownership_transfer_links_multisigs() {
	let pool = pool().await;
	seed_accounts(&pool, &["acc1"]).await;
	seed_dao_with_asset(&pool, "DAO1", 1, "acc1").await;
	// the multisig account announced itself in an earlier block
	run_block(
		&pool,
		&envelope(
			1,
			json!({}),
			json!({ "Multisig": { "NewMultisig": [
				{ "call_hash": "0xabcd", "multisig": "msig", "approving": "alice" },
			] } }),
		),
	)
	.await;

	run_block(
		&pool,
		&envelope(
			2,
			json!({}),
			json!({ "DaoCore": { "DaoOwnerChanged": [
				{ "dao_id": "DAO1", "new_owner": "msig" },
			] } }),
		),
	)
	.await;

	let mut conn = pool.acquire().await.unwrap();
	let dao = daos::by_ids(&mut conn, &["DAO1".to_string()]).await.unwrap().remove(0);
	assert_eq!(dao.owner_id, "msig");
	assert!(dao.setup_complete);

	let multisig = gdao_storage::projection::multisigs::by_addresses(
		&mut conn,
		&["msig".to_string()],
	)
	.await
	.unwrap()
	.remove(0);
	assert_eq!(multisig.dao_id.as_deref(), Some("DAO1"));
}

#[tokio::test]
async fn asset_creation_joins_issued_with_metadata() {
	let pool = pool().await;
	seed_accounts(&pool, &["acc1", "acc2"]).await;
	{
		let mut conn = pool.acquire().await.unwrap();
		daos::create(
			&mut conn,
			&[
				NewDao { id: "DAO1".into(), name: None, creator: "acc1".into(), owner: "acc1".into() },
				NewDao { id: "DAO2".into(), name: None, creator: "acc2".into(), owner: "acc2".into() },
			],
		)
		.await
		.unwrap();
	}

	// asset 2 has no same-block metadata and is dropped
	run_block(
		&pool,
		&envelope(
			1,
			json!({}),
			json!({ "Assets": {
				"Issued": [
					{ "asset_id": 1, "owner": "acc1", "total_supply": 1000 },
					{ "asset_id": 2, "owner": "acc2", "total_supply": 500 },
				],
				"MetadataSet": [
					{ "asset_id": 1, "symbol": "DAO1" },
				],
			} }),
		),
	)
	.await;

	assert_eq!(balances(&pool, &[(1, "acc1"), (2, "acc2")]).await, vec![1000, -1]);
}

#[tokio::test]
async fn executed_blocks_are_not_reapplied() {
	let pool = pool().await;
	let block = envelope(
		1,
		json!({}),
		json!({ "System": { "NewAccount": [ { "account": "acc1" } ] } }),
	);
	run_block(&pool, &block).await;

	let mut conn = pool.acquire().await.unwrap();
	let executed = blocks::get_by_hash(&mut conn, "hash 1").await.unwrap().unwrap();
	drop(conn);

	// a second run is a no-op, not a duplicate-insert failure
	let jobs = pipeline::execute_block(&pool, &executed, &Cache::new()).await.unwrap();
	assert!(jobs.is_empty());

	let mut conn = pool.acquire().await.unwrap();
	assert_eq!(accounts::all_addresses(&mut conn).await.unwrap(), vec!["acc1".to_string()]);
}

#[tokio::test]
async fn failed_stage_rolls_back_the_whole_block() {
	let pool = pool().await;
	// creator account never announced: the DAO insert violates its FK
	let block = envelope(
		1,
		json!({ "DaoCore": { "create_dao": [ { "dao_id": "dao1", "dao_name": "x" } ] } }),
		json!({
			"System": { "NewAccount": [ { "account": "acc1" } ] },
			"DaoCore": { "DaoCreated": [ { "dao_id": "dao1", "owner": "ghost" } ] },
		}),
	);
	let row = store_block(&pool, &block).await;
	let err = pipeline::execute_block(&pool, &row, &Cache::new()).await.unwrap_err();
	assert!(matches!(err, IngestError::ParseBlock { number: 1 }));

	let mut conn = pool.acquire().await.unwrap();
	// the account insert from the earlier stage rolled back too
	assert!(accounts::all_addresses(&mut conn).await.unwrap().is_empty());
	assert!(!blocks::get_by_hash(&mut conn, "hash 1").await.unwrap().unwrap().executed);
}

#[tokio::test]
async fn current_block_is_broadcast_after_commit() {
	let pool = pool().await;
	let cache = Cache::new();
	let block = store_block(&pool, &empty_block(9)).await;
	pipeline::execute_block(&pool, &block, &cache).await.unwrap();

	assert_eq!(cache.current_block(), Some((9, "hash 9".to_string())));
}

// --- metadata jobs ---

struct StaticMetadata {
	bodies: HashMap<String, Vec<u8>>,
}

#[async_trait]
impl MetadataClient for StaticMetadata {
	async fn fetch(&self, url: &str) -> Result<Vec<u8>, MetadataError> {
		self.bodies
			.get(url)
			.cloned()
			.ok_or_else(|| MetadataError::Fetch(format!("no body for {url}")))
	}
}

#[tokio::test]
async fn dao_metadata_round_trip_verifies_the_hash() {
	let pool = pool().await;
	seed_accounts(&pool, &["acc1", "acc2"]).await;
	{
		let mut conn = pool.acquire().await.unwrap();
		daos::create(
			&mut conn,
			&[
				NewDao { id: "DAO1".into(), name: None, creator: "acc1".into(), owner: "acc1".into() },
				NewDao { id: "DAO2".into(), name: None, creator: "acc2".into(), owner: "acc2".into() },
			],
		)
		.await
		.unwrap();
	}

	let body = br#"{"description":"a dao"}"#.to_vec();
	let good_hash = HashAlgorithm::Sha3_256.digest_hex(&body);

	let jobs = run_block(
		&pool,
		&envelope(
			1,
			json!({ "DaoCore": { "set_metadata": [
				{ "dao_id": "DAO1", "meta": "https://meta/dao1.json", "hash": good_hash },
				{ "dao_id": "DAO2", "meta": "https://meta/dao2.json", "hash": "not the hash" },
			] } }),
			json!({ "DaoCore": { "DaoMetadataSet": [
				{ "dao_id": "DAO1" },
				{ "dao_id": "DAO2" },
			] } }),
		),
	)
	.await;
	assert_eq!(jobs.len(), 1);

	let client = StaticMetadata {
		bodies: HashMap::from([
			("https://meta/dao1.json".to_string(), body.clone()),
			("https://meta/dao2.json".to_string(), body),
		]),
	};
	for job in jobs {
		metadata::run_job(&pool, &client, HashAlgorithm::Sha3_256, job).await.unwrap();
	}

	let mut conn = pool.acquire().await.unwrap();
	let rows = daos::by_ids(&mut conn, &["DAO1".to_string(), "DAO2".into()]).await.unwrap();
	let dao1 = rows.iter().find(|dao| dao.id == "DAO1").unwrap();
	assert_eq!(dao1.metadata_url.as_deref(), Some("https://meta/dao1.json"));
	assert!(dao1.metadata.is_some());

	// mismatch: coordinates recorded, content stays null
	let dao2 = rows.iter().find(|dao| dao.id == "DAO2").unwrap();
	assert_eq!(dao2.metadata_url.as_deref(), Some("https://meta/dao2.json"));
	assert!(dao2.metadata.is_none());
}

#[tokio::test]
async fn proposal_metadata_is_recorded_in_block_and_fetched_after() {
	let pool = pool().await;
	seed_accounts(&pool, &["acc1"]).await;
	seed_dao_with_asset(&pool, "DAO1", 1, "acc1").await;
	seed_holding(&pool, 1, "acc1", 10).await;
	run_block(
		&pool,
		&envelope(
			1,
			json!({}),
			json!({ "Votes": { "ProposalCreated": [
				{ "proposal_id": "P1", "dao_id": "DAO1", "creator": "acc1" },
			] } }),
		),
	)
	.await;

	let body = br#"{"title":"do the thing"}"#.to_vec();
	let hash = HashAlgorithm::Sha3_256.digest_hex(&body);
	let jobs = run_block(
		&pool,
		&envelope(
			2,
			json!({ "Votes": { "set_metadata": [
				{ "proposal_id": "P1", "meta": "https://meta/p1.json", "hash": hash },
			] } }),
			json!({ "Votes": { "ProposalMetadataSet": [ { "proposal_id": "P1" } ] } }),
		),
	)
	.await;

	{
		// coordinates and setup_complete are written by the stage itself
		let mut conn = pool.acquire().await.unwrap();
		let proposal =
			proposals::by_ids(&mut conn, &["P1".to_string()]).await.unwrap().remove(0);
		assert!(proposal.setup_complete);
		assert_eq!(proposal.metadata_url.as_deref(), Some("https://meta/p1.json"));
		assert!(proposal.metadata.is_none());
	}

	let client = StaticMetadata {
		bodies: HashMap::from([("https://meta/p1.json".to_string(), body)]),
	};
	for job in jobs {
		metadata::run_job(&pool, &client, HashAlgorithm::Sha3_256, job).await.unwrap();
	}

	let mut conn = pool.acquire().await.unwrap();
	let proposal = proposals::by_ids(&mut conn, &["P1".to_string()]).await.unwrap().remove(0);
	assert!(proposal.metadata.is_some());
}

// --- worker loop ---

struct ScriptedChain {
	heads: Mutex<VecDeque<BlockEnvelope>>,
	by_number: Mutex<HashMap<BlockNumber, BlockEnvelope>>,
	accounts: Vec<Address>,
	number_calls: Mutex<Vec<BlockNumber>>,
}

impl ScriptedChain {
	fn new(heads: Vec<BlockEnvelope>, by_number: Vec<BlockEnvelope>) -> Arc<Self> {
		Arc::new(Self {
			heads: Mutex::new(heads.into()),
			by_number: Mutex::new(
				by_number.into_iter().map(|block| (block.number, block)).collect(),
			),
			accounts: Vec::new(),
			number_calls: Mutex::new(Vec::new()),
		})
	}

	fn with_accounts(heads: Vec<BlockEnvelope>, accounts: &[&str]) -> Arc<Self> {
		let mut chain = Self::new(heads, Vec::new());
		Arc::get_mut(&mut chain).unwrap().accounts =
			accounts.iter().map(|account| account.to_string()).collect();
		chain
	}
}

#[async_trait]
impl ChainApi for ScriptedChain {
	async fn get_block(
		&self,
		hash: Option<&str>,
		number: Option<BlockNumber>,
	) -> Result<BlockEnvelope, ChainError> {
		assert!(hash.is_none(), "tests fetch by head or number only");
		match number {
			None => self
				.heads
				.lock()
				.unwrap()
				.pop_front()
				.ok_or(ChainError::EmptyResponse("get_block")),
			Some(number) => {
				self.number_calls.lock().unwrap().push(number);
				self.by_number
					.lock()
					.unwrap()
					.get(&number)
					.cloned()
					.ok_or(ChainError::EmptyResponse("get_block"))
			},
		}
	}

	async fn query_accounts(&self) -> Result<Vec<Address>, ChainError> {
		Ok(self.accounts.clone())
	}
}

struct NoMetadata;

#[async_trait]
impl MetadataClient for NoMetadata {
	async fn fetch(&self, url: &str) -> Result<Vec<u8>, MetadataError> {
		Err(MetadataError::Fetch(format!("no metadata in tests: {url}")))
	}
}

fn ingestor(chain: Arc<ScriptedChain>, pool: SqlitePool, cache: Cache) -> Ingestor<ScriptedChain> {
	Ingestor::new(
		IngestorParams {
			chain,
			pool,
			cache,
			metadata_client: Arc::new(NoMetadata),
			hash_algorithm: HashAlgorithm::Sha3_256,
			block_interval: Duration::ZERO,
			retry_delays: Vec::new(),
			prometheus_registry: None,
		},
		None,
	)
}

/// The scripted head list eventually runs dry; the loop then surfaces the
/// empty response, which the assertions use as the stop signal.
fn assert_stopped(result: Result<(), IngestError>) {
	assert!(matches!(result, Err(IngestError::Chain(ChainError::EmptyResponse(_)))));
}

#[tokio::test]
async fn catches_up_from_a_gap_block_by_block() {
	let pool = pool().await;
	let cache = Cache::new();
	run_block(&pool, &empty_block(0)).await;

	let chain = ScriptedChain::new(
		vec![empty_block(3)],
		vec![empty_block(1), empty_block(2)],
	);
	let result = ingestor(chain.clone(), pool.clone(), cache.clone()).run().await;
	assert_stopped(result);

	// blocks 1 and 2 were fetched by explicit number; 3 came from the head fetch
	assert_eq!(*chain.number_calls.lock().unwrap(), vec![1, 2]);

	let mut conn = pool.acquire().await.unwrap();
	let latest = blocks::latest_executed(&mut conn).await.unwrap().unwrap();
	assert_eq!(latest.number, 3);
	for number in 0..=3 {
		assert!(blocks::get_by_number(&mut conn, number).await.unwrap().unwrap().executed);
	}
	assert_eq!(cache.current_block(), Some((3, "hash 3".to_string())));
}

#[tokio::test]
async fn waits_when_head_equals_last() {
	let pool = pool().await;
	run_block(&pool, &empty_block(0)).await;

	let chain = ScriptedChain::new(vec![empty_block(0)], Vec::new());
	let result = ingestor(chain, pool.clone(), Cache::new()).run().await;
	assert_stopped(result);

	let mut conn = pool.acquire().await.unwrap();
	assert_eq!(blocks::latest_executed(&mut conn).await.unwrap().unwrap().number, 0);
}

#[tokio::test]
async fn chain_behind_local_state_triggers_resync() {
	let pool = pool().await;
	let cache = Cache::new();
	run_block(&pool, &empty_block(0)).await;
	run_block(&pool, &empty_block(1)).await;
	cache.set_current_block(1, "hash 1");

	// the head is a block the store already knows, well behind the local tip
	let chain = ScriptedChain::with_accounts(vec![empty_block(0)], &["acc1", "acc2"]);
	let result = ingestor(chain, pool.clone(), cache.clone()).run().await;
	assert_stopped(result);

	let mut conn = pool.acquire().await.unwrap();
	assert!(blocks::latest(&mut conn).await.unwrap().is_none());
	assert_eq!(
		accounts::all_addresses(&mut conn).await.unwrap(),
		vec!["acc1".to_string(), "acc2".into()]
	);
	assert_eq!(cache.current_block(), None);
}

#[tokio::test]
async fn number_claimed_by_different_hash_triggers_resync() {
	let pool = pool().await;
	run_block(&pool, &empty_block(0)).await;

	let conflicting = BlockEnvelope { hash: "forked hash".into(), ..empty_block(0) };
	let chain = ScriptedChain::with_accounts(vec![conflicting], &["acc1"]);
	let result = ingestor(chain, pool.clone(), Cache::new()).run().await;
	assert_stopped(result);

	let mut conn = pool.acquire().await.unwrap();
	assert!(blocks::latest(&mut conn).await.unwrap().is_none());
	assert_eq!(accounts::all_addresses(&mut conn).await.unwrap(), vec!["acc1".to_string()]);
}

#[tokio::test]
async fn unexecuted_last_block_is_retried_first() {
	let pool = pool().await;
	let block = envelope(
		0,
		json!({}),
		json!({ "System": { "NewAccount": [ { "account": "acc1" } ] } }),
	);
	store_block(&pool, &block).await;

	let chain = ScriptedChain::new(Vec::new(), Vec::new());
	let result = ingestor(chain, pool.clone(), Cache::new()).run().await;
	assert_stopped(result);

	let mut conn = pool.acquire().await.unwrap();
	assert!(blocks::get_by_number(&mut conn, 0).await.unwrap().unwrap().executed);
	assert_eq!(accounts::all_addresses(&mut conn).await.unwrap(), vec!["acc1".to_string()]);
}

#[tokio::test]
async fn block_that_keeps_failing_is_not_executable() {
	let pool = pool().await;
	// references an account that never exists, fails on every attempt
	let block = envelope(
		0,
		json!({ "DaoCore": { "create_dao": [ { "dao_id": "dao1", "dao_name": "x" } ] } }),
		json!({ "DaoCore": { "DaoCreated": [ { "dao_id": "dao1", "owner": "ghost" } ] } }),
	);
	store_block(&pool, &block).await;

	let chain = ScriptedChain::new(Vec::new(), Vec::new());
	let result = ingestor(chain, pool.clone(), Cache::new()).run().await;
	assert!(matches!(
		result,
		Err(IngestError::NotExecutable { number: 0, ref hash }) if hash == "hash 0"
	));
}

#[tokio::test]
async fn initial_account_sync_is_idempotent() {
	let pool = pool().await;
	seed_accounts(&pool, &["acc1"]).await;

	let chain = ScriptedChain::with_accounts(Vec::new(), &["acc1", "acc2"]);
	let seeded = sync_initial_accounts(chain.as_ref(), &pool).await.unwrap();
	assert_eq!(seeded, 2);

	let mut conn = pool.acquire().await.unwrap();
	assert_eq!(
		accounts::all_addresses(&mut conn).await.unwrap(),
		vec!["acc1".to_string(), "acc2".into()]
	);
}
