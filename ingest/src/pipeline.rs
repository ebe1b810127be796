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

//! The block action pipeline.
//!
//! A block applies as a fixed ordered sequence of stages inside one database
//! transaction; later stages may rely on rows written by earlier ones within
//! the same block (accounts before DAOs, DAOs before assets, holdings before
//! proposal vote snapshots). The ordering contract lives in [`BLOCK_STAGES`].
//!
//! Any stage failure rolls the whole transaction back and leaves the block
//! un-executed for the next tick to retry.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use gdao_chain_client::call::{compute_call_hash, parse_call_data};
use gdao_primitives::{
	envelope::{BlockEnvelope, EnvelopeError},
	events,
	Address, AssetId, Balance, DaoId, GovernanceType, ProposalId, ProposalStatus,
};
use gdao_storage::{
	blocks,
	cache::Cache,
	models::BlockRow,
	projection::{
		accounts, assets, daos, governances, holdings, multisig_transactions, multisigs,
		proposals, votes, ExecutedTransaction, NewAsset, NewDao, NewGovernance, NewHolding,
		NewMultiSigTransaction, NewProposal, NewVote,
	},
	StorageError,
};

use crate::{metadata::MetadataJob, IngestError, LOG_TARGET};

/// One step of the block pipeline. The enum is dispatch data, not behavior:
/// execution order is exactly the order of [`BLOCK_STAGES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
	InstantiateContracts,
	CreateAccounts,
	CreateDaos,
	TransferDaoOwnerships,
	DeleteDaos,
	CreateAssets,
	TransferAssets,
	DelegateAssets,
	RevokeAssetDelegations,
	SetDaoMetadata,
	SetDaoGovernances,
	CreateProposals,
	SetProposalMetadata,
	RegisterVotes,
	FinalizeProposals,
	FaultProposals,
	HandleNewTransactions,
	ApproveTransactions,
	ExecuteTransactions,
	CancelTransactions,
}

/// The load-bearing stage order.
pub const BLOCK_STAGES: [Stage; 20] = [
	Stage::InstantiateContracts,
	Stage::CreateAccounts,
	Stage::CreateDaos,
	Stage::TransferDaoOwnerships,
	Stage::DeleteDaos,
	Stage::CreateAssets,
	Stage::TransferAssets,
	Stage::DelegateAssets,
	Stage::RevokeAssetDelegations,
	Stage::SetDaoMetadata,
	Stage::SetDaoGovernances,
	Stage::CreateProposals,
	Stage::SetProposalMetadata,
	Stage::RegisterVotes,
	Stage::FinalizeProposals,
	Stage::FaultProposals,
	Stage::HandleNewTransactions,
	Stage::ApproveTransactions,
	Stage::ExecuteTransactions,
	Stage::CancelTransactions,
];

#[derive(Debug, thiserror::Error)]
pub(crate) enum StageError {
	#[error(transparent)]
	Storage(#[from] StorageError),
	#[error(transparent)]
	Envelope(#[from] EnvelopeError),
	/// A transfer references a sending holding the projection does not know.
	#[error("no holding for asset {asset_id} and sender {owner}")]
	MissingSenderHolding { asset_id: AssetId, owner: Address },
}

/// Apply a block's state changes in one transaction and mark it executed.
///
/// Re-running on an already executed block is a no-op. On success the block
/// broadcast is published and the deferred metadata jobs collected by the
/// metadata stages are returned for off-transaction dispatch.
pub async fn execute_block(
	pool: &SqlitePool,
	block: &BlockRow,
	cache: &Cache,
) -> Result<Vec<MetadataJob>, IngestError> {
	if block.executed {
		log::debug!(target: LOG_TARGET, "Skipping already executed block #{}", block.number);
		return Ok(Vec::new());
	}

	let envelope = block.envelope();
	let mut deferred = Vec::new();
	let mut tx = pool.begin().await.map_err(StorageError::from)?;

	for stage in BLOCK_STAGES {
		if let Err(err) = apply_stage(stage, &mut tx, &envelope, &mut deferred).await {
			let class = match err {
				StageError::Storage(StorageError::Db(_)) => "Database error",
				_ => "Unexpected error",
			};
			log::error!(
				target: gdao_chain_client::retry::ALERTS_TARGET,
				"{class} while parsing Block #{}: {err} ({stage:?})",
				envelope.number,
			);
			// the transaction rolls back on drop
			return Err(IngestError::ParseBlock { number: envelope.number });
		}
	}

	blocks::mark_executed(&mut tx, &envelope.hash).await?;
	tx.commit().await.map_err(StorageError::from)?;

	cache.set_current_block(envelope.number, &envelope.hash);
	Ok(deferred)
}

async fn apply_stage(
	stage: Stage,
	conn: &mut SqliteConnection,
	block: &BlockEnvelope,
	deferred: &mut Vec<MetadataJob>,
) -> Result<(), StageError> {
	match stage {
		Stage::InstantiateContracts => instantiate_contracts(block),
		Stage::CreateAccounts => create_accounts(conn, block).await,
		Stage::CreateDaos => create_daos(conn, block).await,
		Stage::TransferDaoOwnerships => transfer_dao_ownerships(conn, block).await,
		Stage::DeleteDaos => delete_daos(conn, block).await,
		Stage::CreateAssets => create_assets(conn, block).await,
		Stage::TransferAssets => transfer_assets(conn, block).await,
		Stage::DelegateAssets => delegate_assets(conn, block).await,
		Stage::RevokeAssetDelegations => revoke_asset_delegations(conn, block).await,
		Stage::SetDaoMetadata => set_dao_metadata(block, deferred),
		Stage::SetDaoGovernances => set_dao_governances(conn, block).await,
		Stage::CreateProposals => create_proposals(conn, block).await,
		Stage::SetProposalMetadata => set_proposal_metadata(conn, block, deferred).await,
		Stage::RegisterVotes => register_votes(conn, block).await,
		Stage::FinalizeProposals => finalize_proposals(conn, block).await,
		Stage::FaultProposals => fault_proposals(conn, block).await,
		Stage::HandleNewTransactions => handle_new_transactions(conn, block).await,
		Stage::ApproveTransactions => approve_transactions(conn, block).await,
		Stage::ExecuteTransactions => execute_transactions(conn, block).await,
		Stage::CancelTransactions => cancel_transactions(conn, block).await,
	}
}

/// Passive hook: contract events have no projection yet, surface them in the log.
fn instantiate_contracts(block: &BlockEnvelope) -> Result<(), StageError> {
	for event in block.events("Contracts", "ContractEmitted") {
		log::debug!(target: LOG_TARGET, "contract event emitted: {event:?}");
	}
	Ok(())
}

async fn create_accounts(
	conn: &mut SqliteConnection,
	block: &BlockEnvelope,
) -> Result<(), StageError> {
	let addresses: Vec<Address> = block
		.decode_events::<events::NewAccount>("System", "NewAccount")?
		.into_iter()
		.map(|event| event.account)
		.collect();
	accounts::insert_ignore(conn, &addresses).await?;
	Ok(())
}

/// Join `create_dao` extrinsics against `DaoCreated` events on dao id; the
/// first matching event wins, extrinsics without one are skipped.
async fn create_daos(conn: &mut SqliteConnection, block: &BlockEnvelope) -> Result<(), StageError> {
	let created = block.decode_events::<events::DaoCreated>("DaoCore", "DaoCreated")?;
	let mut new_daos = Vec::new();
	for extrinsic in block.decode_extrinsics::<events::CreateDao>("DaoCore", "create_dao")? {
		if let Some(event) = created.iter().find(|event| event.dao_id == extrinsic.dao_id) {
			new_daos.push(NewDao {
				id: extrinsic.dao_id,
				name: Some(extrinsic.dao_name),
				creator: event.owner.clone(),
				owner: event.owner.clone(),
			});
		}
	}
	daos::create(conn, &new_daos).await?;
	Ok(())
}

/// An owner change also completes the DAO's setup. New owners may be multisig
/// accounts that never emitted `System.NewAccount`, so they are lazily created
/// here, and existing multisig rows get their DAO linkage refreshed.
async fn transfer_dao_ownerships(
	conn: &mut SqliteConnection,
	block: &BlockEnvelope,
) -> Result<(), StageError> {
	let mut new_owner_by_dao: BTreeMap<DaoId, Address> = BTreeMap::new();
	for event in block.decode_events::<events::DaoOwnerChanged>("DaoCore", "DaoOwnerChanged")? {
		new_owner_by_dao.insert(event.dao_id, event.new_owner);
	}
	if new_owner_by_dao.is_empty() {
		return Ok(());
	}

	let dao_ids: Vec<DaoId> = new_owner_by_dao.keys().cloned().collect();
	let existing = daos::by_ids(conn, &dao_ids).await?;
	if existing.is_empty() {
		return Ok(());
	}

	let new_owners: Vec<Address> = new_owner_by_dao.values().cloned().collect();
	accounts::insert_ignore(conn, &new_owners).await?;

	let changes: Vec<(DaoId, Address)> = existing
		.iter()
		.map(|dao| (dao.id.clone(), new_owner_by_dao[&dao.id].clone()))
		.collect();
	daos::change_owners(conn, &changes).await?;

	let dao_by_owner: HashMap<&Address, &DaoId> =
		new_owner_by_dao.iter().map(|(dao_id, owner)| (owner, dao_id)).collect();
	let links: Vec<(Address, DaoId)> = multisigs::by_addresses(conn, &new_owners)
		.await?
		.into_iter()
		.filter_map(|multisig| {
			dao_by_owner
				.get(&multisig.address)
				.map(|dao_id| (multisig.address.clone(), (*dao_id).clone()))
		})
		.collect();
	multisigs::link_daos(conn, &links).await?;
	Ok(())
}

async fn delete_daos(conn: &mut SqliteConnection, block: &BlockEnvelope) -> Result<(), StageError> {
	let dao_ids: Vec<DaoId> = block
		.decode_events::<events::DaoDestroyed>("DaoCore", "DaoDestroyed")?
		.into_iter()
		.map(|event| event.dao_id)
		.collect();
	daos::delete(conn, &dao_ids).await?;
	Ok(())
}

/// Join `Assets.Issued` against `Assets.MetadataSet` on asset id; the metadata
/// `symbol` names the owning DAO. An issue without same-block metadata is
/// dropped. The issuer starts out holding the full supply.
async fn create_assets(
	conn: &mut SqliteConnection,
	block: &BlockEnvelope,
) -> Result<(), StageError> {
	let metadata = block.decode_events::<events::AssetMetadataSet>("Assets", "MetadataSet")?;
	let mut new_assets = Vec::new();
	let mut new_holdings = Vec::new();
	for issued in block.decode_events::<events::AssetIssued>("Assets", "Issued")? {
		if let Some(meta) = metadata.iter().find(|meta| meta.asset_id == issued.asset_id) {
			new_assets.push(NewAsset {
				id: meta.asset_id,
				dao_id: meta.symbol.clone(),
				owner: issued.owner.clone(),
				total_supply: issued.total_supply,
			});
			new_holdings.push(NewHolding {
				asset_id: meta.asset_id,
				owner: issued.owner,
				balance: issued.total_supply,
			});
		}
	}
	assets::create(conn, &new_assets).await?;
	holdings::create(conn, &new_holdings).await?;
	Ok(())
}

/// Apply transfers in event order against holdings loaded in one query.
///
/// Senders must already hold the asset; receivers fall back to a row created
/// earlier in the same batch, then an existing row, then a fresh row.
async fn transfer_assets(
	conn: &mut SqliteConnection,
	block: &BlockEnvelope,
) -> Result<(), StageError> {
	let transfers = block.decode_events::<events::AssetTransferred>("Assets", "Transferred")?;
	if transfers.is_empty() {
		return Ok(());
	}

	let mut owners_by_asset: BTreeMap<AssetId, BTreeSet<Address>> = BTreeMap::new();
	for transfer in &transfers {
		let owners = owners_by_asset.entry(transfer.asset_id).or_default();
		owners.insert(transfer.from.clone());
		owners.insert(transfer.to.clone());
	}
	let pairs: Vec<(AssetId, Vec<Address>)> = owners_by_asset
		.into_iter()
		.map(|(asset_id, owners)| (asset_id, owners.into_iter().collect()))
		.collect();

	// (asset, owner) -> (row id, balance) for everything the block touches
	let mut existing: HashMap<(AssetId, Address), (i64, Balance)> =
		holdings::by_asset_owners(conn, &pairs)
			.await?
			.into_iter()
			.map(|row| ((row.asset_id, row.owner_id), (row.id, row.balance)))
			.collect();

	// insertion-order-stable batch of rows to create
	let mut to_create: Vec<NewHolding> = Vec::new();
	let mut create_index: HashMap<(AssetId, Address), usize> = HashMap::new();

	for transfer in &transfers {
		let sender_key = (transfer.asset_id, transfer.from.clone());
		let sender = existing.get_mut(&sender_key).ok_or(StageError::MissingSenderHolding {
			asset_id: transfer.asset_id,
			owner: transfer.from.clone(),
		})?;
		sender.1 -= transfer.amount;

		let receiver_key = (transfer.asset_id, transfer.to.clone());
		if let Some(index) = create_index.get(&receiver_key) {
			to_create[*index].balance += transfer.amount;
		} else if let Some(receiver) = existing.get_mut(&receiver_key) {
			receiver.1 += transfer.amount;
		} else {
			create_index.insert(receiver_key, to_create.len());
			to_create.push(NewHolding {
				asset_id: transfer.asset_id,
				owner: transfer.to.clone(),
				balance: transfer.amount,
			});
		}
	}

	let updates: Vec<(i64, Balance)> =
		existing.into_values().map(|(id, balance)| (id, balance)).collect();
	holdings::update_balances(conn, &updates).await?;
	holdings::create(conn, &to_create).await?;
	Ok(())
}

async fn delegate_assets(
	conn: &mut SqliteConnection,
	block: &BlockEnvelope,
) -> Result<(), StageError> {
	let mut delegate_by_key: BTreeMap<(AssetId, Address), Address> = BTreeMap::new();
	for event in block.decode_events::<events::AssetDelegated>("Assets", "Delegated")? {
		delegate_by_key.insert((event.asset_id, event.from), event.to);
	}
	if delegate_by_key.is_empty() {
		return Ok(());
	}

	let pairs: Vec<(AssetId, Vec<Address>)> = delegate_by_key
		.keys()
		.map(|(asset_id, owner)| (*asset_id, vec![owner.clone()]))
		.collect();
	let updates: Vec<(i64, Address)> = holdings::by_asset_owners(conn, &pairs)
		.await?
		.into_iter()
		.filter_map(|row| {
			delegate_by_key
				.get(&(row.asset_id, row.owner_id.clone()))
				.map(|delegate| (row.id, delegate.clone()))
		})
		.collect();
	holdings::delegate(conn, &updates).await?;
	Ok(())
}

async fn revoke_asset_delegations(
	conn: &mut SqliteConnection,
	block: &BlockEnvelope,
) -> Result<(), StageError> {
	let keys: Vec<(AssetId, Address, Address)> = block
		.decode_events::<events::DelegationRevoked>("Assets", "DelegationRevoked")?
		.into_iter()
		.map(|event| (event.asset_id, event.delegated_by, event.revoked_from))
		.collect();
	holdings::revoke_delegations(conn, &keys).await?;
	Ok(())
}

/// Record which DAOs announced metadata and defer the fetch: downloading and
/// verifying the JSON happens outside the block transaction.
fn set_dao_metadata(
	block: &BlockEnvelope,
	deferred: &mut Vec<MetadataJob>,
) -> Result<(), StageError> {
	let set_calls =
		block.decode_extrinsics::<events::SetDaoMetadata>("DaoCore", "set_metadata")?;
	let mut entries: BTreeMap<DaoId, (String, String)> = BTreeMap::new();
	for event in block.decode_events::<events::DaoMetadataSet>("DaoCore", "DaoMetadataSet")? {
		for call in &set_calls {
			if call.dao_id == event.dao_id {
				entries.insert(event.dao_id.clone(), (call.meta.clone(), call.hash.clone()));
			}
		}
	}
	if !entries.is_empty() {
		deferred.push(MetadataJob::Dao { entries });
	}
	Ok(())
}

/// Governance is replaced wholesale per DAO; a later event in the same block
/// wins over an earlier one.
async fn set_dao_governances(
	conn: &mut SqliteConnection,
	block: &BlockEnvelope,
) -> Result<(), StageError> {
	let mut by_dao: BTreeMap<DaoId, NewGovernance> = BTreeMap::new();
	for event in block
		.decode_events::<events::GovernanceMajorityVoteSet>("Votes", "SetGovernanceMajorityVote")?
	{
		by_dao.insert(
			event.dao_id.clone(),
			NewGovernance {
				dao_id: event.dao_id,
				proposal_duration: event.proposal_duration,
				proposal_token_deposit: event.proposal_token_deposit,
				minimum_majority: event.minimum_majority_per_1024,
				governance_type: GovernanceType::MajorityVote,
			},
		);
	}
	let governances: Vec<NewGovernance> = by_dao.into_values().collect();
	governances::replace(conn, &governances).await?;
	Ok(())
}

/// Insert proposals and pre-create one vote per effective voter of the DAO's
/// asset: each holding credits its balance to `delegated_to` if set, else to
/// its owner, snapshotting voting power at proposal birth.
async fn create_proposals(
	conn: &mut SqliteConnection,
	block: &BlockEnvelope,
) -> Result<(), StageError> {
	let created = block.decode_events::<events::ProposalCreated>("Votes", "ProposalCreated")?;
	if created.is_empty() {
		return Ok(());
	}

	let mut dao_ids: Vec<DaoId> = Vec::new();
	let new_proposals: Vec<NewProposal> = created
		.into_iter()
		.map(|event| {
			if !dao_ids.contains(&event.dao_id) {
				dao_ids.push(event.dao_id.clone());
			}
			NewProposal {
				id: event.proposal_id,
				dao_id: event.dao_id,
				creator: event.creator,
				birth_block_number: block.number,
			}
		})
		.collect();

	let mut power_by_dao: HashMap<DaoId, BTreeMap<Address, Balance>> = HashMap::new();
	for holding in holdings::dao_holdings(conn, &dao_ids).await? {
		let voter = holding.delegated_to.unwrap_or(holding.owner_id);
		*power_by_dao.entry(holding.dao_id).or_default().entry(voter).or_insert(0) +=
			holding.balance;
	}

	proposals::create(conn, &new_proposals).await?;

	let mut new_votes = Vec::new();
	for proposal in &new_proposals {
		if let Some(powers) = power_by_dao.get(&proposal.dao_id) {
			for (voter, power) in powers {
				new_votes.push(NewVote {
					proposal_id: proposal.id.clone(),
					voter: voter.clone(),
					voting_power: *power,
				});
			}
		}
	}
	votes::create(conn, &new_votes).await?;
	Ok(())
}

/// Join `ProposalMetadataSet` against `Votes.set_metadata` extrinsics, record
/// the announced coordinates and defer the content fetch.
async fn set_proposal_metadata(
	conn: &mut SqliteConnection,
	block: &BlockEnvelope,
	deferred: &mut Vec<MetadataJob>,
) -> Result<(), StageError> {
	let set_calls =
		block.decode_extrinsics::<events::SetProposalMetadata>("Votes", "set_metadata")?;
	let mut coords: BTreeMap<ProposalId, (String, String)> = BTreeMap::new();
	for event in
		block.decode_events::<events::ProposalMetadataSet>("Votes", "ProposalMetadataSet")?
	{
		for call in &set_calls {
			if call.proposal_id == event.proposal_id {
				coords.insert(event.proposal_id.clone(), (call.meta.clone(), call.hash.clone()));
			}
		}
	}
	if coords.is_empty() {
		return Ok(());
	}

	let ids: Vec<ProposalId> = coords.keys().cloned().collect();
	let existing = proposals::by_ids(conn, &ids).await?;
	let updates: Vec<(ProposalId, String, String)> = existing
		.iter()
		.map(|proposal| {
			let (url, hash) = &coords[&proposal.id];
			(proposal.id.clone(), url.clone(), hash.clone())
		})
		.collect();
	proposals::set_metadata_coords(conn, &updates).await?;

	deferred.push(MetadataJob::Proposal { ids });
	Ok(())
}

async fn register_votes(
	conn: &mut SqliteConnection,
	block: &BlockEnvelope,
) -> Result<(), StageError> {
	let mut votes_by_key: BTreeMap<(ProposalId, Address), bool> = BTreeMap::new();
	for event in block.decode_events::<events::VoteCast>("Votes", "VoteCast")? {
		votes_by_key.insert((event.proposal_id, event.voter), event.in_favor);
	}
	if votes_by_key.is_empty() {
		return Ok(());
	}

	let mut voters_by_proposal: BTreeMap<ProposalId, Vec<Address>> = BTreeMap::new();
	for (proposal_id, voter) in votes_by_key.keys() {
		voters_by_proposal.entry(proposal_id.clone()).or_default().push(voter.clone());
	}
	let pairs: Vec<(ProposalId, Vec<Address>)> = voters_by_proposal.into_iter().collect();

	let updates: Vec<(i64, bool)> = votes::by_proposal_voters(conn, &pairs)
		.await?
		.into_iter()
		.filter_map(|row| {
			votes_by_key
				.get(&(row.proposal_id.clone(), row.voter_id.clone()))
				.map(|in_favor| (row.id, *in_favor))
		})
		.collect();
	votes::set_in_favor(conn, &updates).await?;
	Ok(())
}

async fn finalize_proposals(
	conn: &mut SqliteConnection,
	block: &BlockEnvelope,
) -> Result<(), StageError> {
	let accepted: BTreeSet<ProposalId> = block
		.decode_events::<events::ProposalAccepted>("Votes", "ProposalAccepted")?
		.into_iter()
		.map(|event| event.proposal_id)
		.collect();
	let accepted: Vec<ProposalId> = accepted.into_iter().collect();
	proposals::set_status(conn, &accepted, ProposalStatus::Pending).await?;

	let rejected: BTreeSet<ProposalId> = block
		.decode_events::<events::ProposalRejected>("Votes", "ProposalRejected")?
		.into_iter()
		.map(|event| event.proposal_id)
		.collect();
	let rejected: Vec<ProposalId> = rejected.into_iter().collect();
	proposals::set_status(conn, &rejected, ProposalStatus::Rejected).await?;
	Ok(())
}

async fn fault_proposals(
	conn: &mut SqliteConnection,
	block: &BlockEnvelope,
) -> Result<(), StageError> {
	let mut reason_by_id: BTreeMap<ProposalId, String> = BTreeMap::new();
	for event in block.decode_events::<events::ProposalFaulted>("Votes", "ProposalFaulted")? {
		reason_by_id.insert(event.proposal_id, event.reason);
	}
	if reason_by_id.is_empty() {
		return Ok(());
	}

	let ids: Vec<ProposalId> = reason_by_id.keys().cloned().collect();
	let faults: Vec<(ProposalId, String)> = proposals::by_ids(conn, &ids)
		.await?
		.into_iter()
		.map(|proposal| {
			let reason = reason_by_id[&proposal.id].clone();
			(proposal.id, reason)
		})
		.collect();
	proposals::set_faults(conn, &faults).await?;
	Ok(())
}

/// `NewMultisig` either notes a first approval on an already tracked
/// transaction or starts tracking a new one, lazily creating the multisig
/// account row.
async fn handle_new_transactions(
	conn: &mut SqliteConnection,
	block: &BlockEnvelope,
) -> Result<(), StageError> {
	let mut approver_by_key: BTreeMap<(String, Address), Address> = BTreeMap::new();
	for event in block.decode_events::<events::NewMultisig>("Multisig", "NewMultisig")? {
		approver_by_key.insert((event.call_hash, event.multisig), event.approving);
	}
	if approver_by_key.is_empty() {
		return Ok(());
	}

	let keys: Vec<(String, Address)> = approver_by_key.keys().cloned().collect();
	let mut updates: Vec<(i64, Vec<Address>)> = Vec::new();
	for row in latest_per_key(multisig_transactions::pending_by_keys(conn, &keys).await?) {
		if let Some(approver) =
			approver_by_key.remove(&(row.call_hash.clone(), row.multisig_address.clone()))
		{
			let mut approvers = row.approvers.0.clone();
			approvers.push(approver);
			updates.push((row.id, approvers));
		}
	}
	multisig_transactions::set_approvers(conn, &updates).await?;

	// whatever was not an update starts a new transaction
	if !approver_by_key.is_empty() {
		let multisig_addresses: Vec<Address> =
			approver_by_key.keys().map(|(_, multisig)| multisig.clone()).collect();
		accounts::insert_ignore(conn, &multisig_addresses).await?;
		multisigs::insert_ignore(conn, &multisig_addresses).await?;

		let new_transactions: Vec<NewMultiSigTransaction> = approver_by_key
			.into_iter()
			.map(|((call_hash, multisig), approver)| NewMultiSigTransaction {
				multisig,
				call_hash,
				approvers: vec![approver],
			})
			.collect();
		multisig_transactions::create(conn, &new_transactions).await?;
	}
	Ok(())
}

async fn approve_transactions(
	conn: &mut SqliteConnection,
	block: &BlockEnvelope,
) -> Result<(), StageError> {
	let mut approvers_by_key: BTreeMap<(String, Address), Vec<Address>> = BTreeMap::new();
	for event in block.decode_events::<events::MultisigApproval>("Multisig", "MultisigApproval")? {
		approvers_by_key
			.entry((event.call_hash, event.multisig))
			.or_default()
			.push(event.approving);
	}
	if approvers_by_key.is_empty() {
		return Ok(());
	}

	let keys: Vec<(String, Address)> = approvers_by_key.keys().cloned().collect();
	let mut updates: Vec<(i64, Vec<Address>)> = Vec::new();
	for row in latest_per_key(multisig_transactions::pending_by_keys(conn, &keys).await?) {
		if let Some(new_approvers) =
			approvers_by_key.get(&(row.call_hash.clone(), row.multisig_address.clone()))
		{
			let mut approvers = row.approvers.0.clone();
			approvers.extend(new_approvers.iter().cloned());
			updates.push((row.id, approvers));
		}
	}
	multisig_transactions::set_approvers(conn, &updates).await?;
	Ok(())
}

/// Join `MultisigExecuted` events with `as_multi` extrinsics by recomputing
/// the wrapped call's hash; a match reveals the call, its timepoint and any
/// projection ids its arguments carry. The final approver is appended and the
/// transaction is stamped executed.
async fn execute_transactions(
	conn: &mut SqliteConnection,
	block: &BlockEnvelope,
) -> Result<(), StageError> {
	let mut approver_by_key: BTreeMap<(String, Address), Address> = BTreeMap::new();
	for event in block.decode_events::<events::MultisigExecuted>("Multisig", "MultisigExecuted")? {
		approver_by_key.insert((event.call_hash, event.multisig), event.approving);
	}
	if approver_by_key.is_empty() {
		return Ok(());
	}

	struct CallData {
		module: String,
		function: String,
		args: gdao_primitives::envelope::AttrMap,
		timepoint: serde_json::Value,
		hash: String,
	}

	let mut call_by_hash: HashMap<String, CallData> = HashMap::new();
	for as_multi in block.decode_extrinsics::<events::AsMulti>("Multisig", "as_multi")? {
		let args = as_multi.call.args_map();
		let hash =
			compute_call_hash(&as_multi.call.call_module, &as_multi.call.call_function, &args);
		call_by_hash.insert(
			hash.clone(),
			CallData {
				module: as_multi.call.call_module,
				function: as_multi.call.call_function,
				args,
				timepoint: as_multi.maybe_timepoint,
				hash,
			},
		);
	}

	let keys: Vec<(String, Address)> = approver_by_key.keys().cloned().collect();
	let now = Utc::now();
	let mut updates: Vec<ExecutedTransaction> = Vec::new();
	for row in latest_per_key(multisig_transactions::pending_by_keys(conn, &keys).await?) {
		let Some(final_approver) =
			approver_by_key.get(&(row.call_hash.clone(), row.multisig_address.clone()))
		else {
			continue;
		};

		let mut approvers = row.approvers.0.clone();
		approvers.push(final_approver.clone());

		let mut update = ExecutedTransaction {
			id: row.id,
			approvers,
			call: None,
			call_function: None,
			timepoint: None,
			asset_id: None,
			dao_id: None,
			proposal_id: None,
			executed_at: now,
		};
		if let Some(call) = call_by_hash.get(&row.call_hash) {
			let ids = parse_call_data(&call.module, &call.args);
			update.call = Some(serde_json::json!({
				"module": &call.module,
				"function": &call.function,
				"args": &call.args,
				"timepoint": &call.timepoint,
				"hash": &call.hash,
			}));
			update.call_function = Some(call.function.clone());
			update.timepoint = Some(call.timepoint.clone());
			update.asset_id = ids.asset_id;
			update.dao_id = ids.dao_id;
			update.proposal_id = ids.proposal_id;
		}
		updates.push(update);
	}
	multisig_transactions::mark_executed(conn, &updates).await?;
	Ok(())
}

async fn cancel_transactions(
	conn: &mut SqliteConnection,
	block: &BlockEnvelope,
) -> Result<(), StageError> {
	let mut canceller_by_key: BTreeMap<(String, Address), Address> = BTreeMap::new();
	for event in block.decode_events::<events::MultisigCancelled>("Multisig", "MultisigCancelled")?
	{
		canceller_by_key.insert((event.call_hash, event.multisig), event.cancelling);
	}
	if canceller_by_key.is_empty() {
		return Ok(());
	}

	let keys: Vec<(String, Address)> = canceller_by_key.keys().cloned().collect();
	let mut updates: Vec<(i64, Address)> = Vec::new();
	for row in latest_per_key(multisig_transactions::pending_by_keys(conn, &keys).await?) {
		if let Some(canceller) =
			canceller_by_key.get(&(row.call_hash.clone(), row.multisig_address.clone()))
		{
			updates.push((row.id, canceller.clone()));
		}
	}
	multisig_transactions::cancel(conn, &updates).await?;
	Ok(())
}

/// Only the most recent non-executed row per `(call_hash, multisig)` is a
/// mutation target. Rows arrive newest first.
fn latest_per_key(
	rows: Vec<gdao_storage::models::MultiSigTransactionRow>,
) -> Vec<gdao_storage::models::MultiSigTransactionRow> {
	let mut seen: BTreeSet<(String, Address)> = BTreeSet::new();
	rows.into_iter()
		.filter(|row| seen.insert((row.call_hash.clone(), row.multisig_address.clone())))
		.collect()
}
