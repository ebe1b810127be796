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

//! Common types across the chain client, storage, and ingestion crates

pub use types::*;

pub mod envelope;
pub mod events;

pub mod types {
	/// An index to a block.
	pub type BlockNumber = i64;

	/// Hex encoded block hash as reported by the chain node.
	pub type BlockHash = String;

	/// ss58 encoded address identifying an account on the chain.
	pub type Address = String;

	/// Id used for identifying assets.
	pub type AssetId = i64;

	/// Id of a DAO, chosen by its creator at creation time.
	pub type DaoId = String;

	/// Id of a proposal within a DAO.
	pub type ProposalId = String;

	/// Token balance of an account, also used for total supply and voting power.
	pub type Balance = i64;

	/// The governance flavours a DAO can run.
	///
	/// Closed set, unknown values coming from the chain are rejected at the edge.
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub enum GovernanceType {
		MajorityVote,
	}

	impl GovernanceType {
		pub fn as_str(&self) -> &'static str {
			match self {
				GovernanceType::MajorityVote => "MAJORITY_VOTE",
			}
		}
	}

	impl std::str::FromStr for GovernanceType {
		type Err = UnknownVariant;

		fn from_str(s: &str) -> Result<Self, Self::Err> {
			match s {
				"MAJORITY_VOTE" => Ok(GovernanceType::MajorityVote),
				other => Err(UnknownVariant { kind: "GovernanceType", value: other.into() }),
			}
		}
	}

	/// Lifecycle of a proposal as projected from chain events.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
	pub enum ProposalStatus {
		/// Voting is open, the default state after creation.
		#[default]
		Running,
		/// Accepted on-chain, awaiting finalization.
		Pending,
		Rejected,
		/// Flagged by the community with a fault reason.
		Faulted,
	}

	impl ProposalStatus {
		pub fn as_str(&self) -> &'static str {
			match self {
				ProposalStatus::Running => "RUNNING",
				ProposalStatus::Pending => "PENDING",
				ProposalStatus::Rejected => "REJECTED",
				ProposalStatus::Faulted => "FAULTED",
			}
		}
	}

	impl std::str::FromStr for ProposalStatus {
		type Err = UnknownVariant;

		fn from_str(s: &str) -> Result<Self, Self::Err> {
			match s {
				"RUNNING" => Ok(ProposalStatus::Running),
				"PENDING" => Ok(ProposalStatus::Pending),
				"REJECTED" => Ok(ProposalStatus::Rejected),
				"FAULTED" => Ok(ProposalStatus::Faulted),
				other => Err(UnknownVariant { kind: "ProposalStatus", value: other.into() }),
			}
		}
	}

	/// Lifecycle of a multisig transaction.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
	pub enum TransactionStatus {
		#[default]
		Pending,
		Approved,
		Cancelled,
		Executed,
	}

	impl TransactionStatus {
		pub fn as_str(&self) -> &'static str {
			match self {
				TransactionStatus::Pending => "PENDING",
				TransactionStatus::Approved => "APPROVED",
				TransactionStatus::Cancelled => "CANCELLED",
				TransactionStatus::Executed => "EXECUTED",
			}
		}
	}

	impl std::str::FromStr for TransactionStatus {
		type Err = UnknownVariant;

		fn from_str(s: &str) -> Result<Self, Self::Err> {
			match s {
				"PENDING" => Ok(TransactionStatus::Pending),
				"APPROVED" => Ok(TransactionStatus::Approved),
				"CANCELLED" => Ok(TransactionStatus::Cancelled),
				"EXECUTED" => Ok(TransactionStatus::Executed),
				other => Err(UnknownVariant { kind: "TransactionStatus", value: other.into() }),
			}
		}
	}

	/// A stored value does not belong to the closed set of a status enum.
	#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
	#[error("unknown {kind} variant: {value}")]
	pub struct UnknownVariant {
		pub kind: &'static str,
		pub value: String,
	}
}

#[cfg(test)]
mod tests {
	use super::types::*;
	use std::str::FromStr;

	#[test]
	fn status_round_trips() {
		for status in
			[ProposalStatus::Running, ProposalStatus::Pending, ProposalStatus::Rejected, ProposalStatus::Faulted]
		{
			assert_eq!(ProposalStatus::from_str(status.as_str()).unwrap(), status);
		}
		for status in [
			TransactionStatus::Pending,
			TransactionStatus::Approved,
			TransactionStatus::Cancelled,
			TransactionStatus::Executed,
		] {
			assert_eq!(TransactionStatus::from_str(status.as_str()).unwrap(), status);
		}
		assert_eq!(GovernanceType::from_str("MAJORITY_VOTE").unwrap(), GovernanceType::MajorityVote);
	}

	#[test]
	fn unknown_variants_are_rejected() {
		assert!(ProposalStatus::from_str("DRAFT").is_err());
		assert!(TransactionStatus::from_str("pending").is_err());
		assert!(GovernanceType::from_str("QUADRATIC").is_err());
	}
}
