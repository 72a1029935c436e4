use crate::*;
use futures::future::{BoxFuture, FutureExt};
use num_enum::TryFromPrimitive;
use std::convert::TryFrom;

/// Lifecycle of a proposal as reported by the voting contract
#[derive(Serialize, Deserialize, TryFromPrimitive, Copy, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ProposalStatus {
    Pending = 0,
    Active = 1,
    Ended = 2,
    Published = 3,
}

impl ProposalStatus {
    /// Decode the contract's numeric status code
    pub fn from_code(code: u8) -> Result<Self, Error> {
        ProposalStatus::try_from(code).map_err(|_| Error::UnknownStatus(code))
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Active => "active",
            ProposalStatus::Ended => "ended",
            ProposalStatus::Published => "published",
        };
        write!(f, "{}", name)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ProposalMetadata {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub options: Vec<String>,
    pub start_time: u64,
    pub end_time: u64,
    pub results_published: bool,
    pub creator: Address,
}

/// Plaintext tallies revealed on-chain, one per option.
///
/// Only meaningful once the proposal is `Published`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PublishedResults {
    pub tallies: Vec<u64>,

    #[serde(with = "hex_serde")]
    pub proof: Vec<u8>,
    pub reveal_time: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Confirmed,
    Reverted(String),
}

/// The outcome of a broadcast transaction once it lands in a block.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub tx: TxRef,
    pub block: u64,
    pub status: ReceiptStatus,
}

/// A contract invocation ready to be signed and broadcast
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ContractCall {
    pub to: Address,

    #[serde(with = "hex_serde")]
    pub data: Vec<u8>,
}

/// Call data for casting a ballot
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct VoteCall {
    pub proposal: u64,
    pub ballot: EncryptedBallot,
}

impl VoteCall {
    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        Ok(serde_cbor::from_slice(data)?)
    }
}

/// Read/write view of the voting contract on one network.
pub trait Ledger: Send + Sync {
    /// Address of the voting contract this ledger talks to
    fn contract(&self) -> Address;

    fn network(&self) -> NetworkId;

    /// Build the call that casts `ballot` on `proposal`.
    fn vote_call(&self, proposal: u64, ballot: &EncryptedBallot) -> Result<ContractCall, Error> {
        let data = serde_cbor::to_vec(&VoteCall {
            proposal,
            ballot: ballot.clone(),
        })?;
        Ok(ContractCall {
            to: self.contract(),
            data,
        })
    }

    /// Have the agent sign and broadcast a vote. Resolves once broadcast, not once confirmed.
    ///
    /// Ballots bound to another contract, voter or network are refused before
    /// the agent is asked to sign.
    fn submit_encrypted_ballot<'a>(
        &'a self,
        agent: &'a dyn SigningAgent,
        proposal: u64,
        ballot: &'a EncryptedBallot,
    ) -> BoxFuture<'a, Result<TxRef, Error>> {
        async move {
            let sender = agent.address().await?;
            let expected = BallotBinding::new(self.contract(), sender, self.network());
            if ballot.binding != expected {
                return Err(Error::BindingMismatch(format!(
                    "ballot for {} on {} (network {}) cannot be cast by {} on {} (network {})",
                    ballot.binding.voter,
                    ballot.binding.contract,
                    ballot.binding.network,
                    expected.voter,
                    expected.contract,
                    expected.network
                )));
            }

            let call = self.vote_call(proposal, ballot)?;
            agent.send_transaction(call.to, call.data).await
        }
        .boxed()
    }

    fn wait_for_receipt(&self, tx: TxRef) -> BoxFuture<'_, Result<Receipt, Error>>;

    fn proposal_metadata(&self, proposal: u64) -> BoxFuture<'_, Result<ProposalMetadata, Error>>;

    fn proposal_status(&self, proposal: u64) -> BoxFuture<'_, Result<ProposalStatus, Error>>;

    /// Encrypted per-option totals, in option order
    fn encrypted_aggregate(&self, proposal: u64) -> BoxFuture<'_, Result<Vec<Handle>, Error>>;

    fn published_results(&self, proposal: u64) -> BoxFuture<'_, Result<PublishedResults, Error>>;

    fn participant_vote_count(
        &self,
        proposal: u64,
        participant: Address,
    ) -> BoxFuture<'_, Result<u32, Error>>;

    fn max_votes_per_participant(&self, proposal: u64) -> BoxFuture<'_, Result<u32, Error>>;
}

/// Whether a voter may cast another ballot on a proposal
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
pub struct Eligibility {
    pub status: ProposalStatus,
    pub votes_cast: u32,
    pub max_votes: u32,
}

impl Eligibility {
    pub fn can_vote(&self) -> bool {
        self.status == ProposalStatus::Active && self.votes_cast < self.max_votes
    }

    pub fn votes_remaining(&self) -> u32 {
        self.max_votes.saturating_sub(self.votes_cast)
    }
}

pub async fn check_eligibility(
    ledger: &dyn Ledger,
    session: &Session,
    proposal: u64,
) -> Result<Eligibility, Error> {
    let (status, votes_cast, max_votes) = futures::try_join!(
        ledger.proposal_status(proposal),
        ledger.participant_vote_count(proposal, session.voter),
        ledger.max_votes_per_participant(proposal),
    )?;

    Ok(Eligibility {
        status,
        votes_cast,
        max_votes,
    })
}
