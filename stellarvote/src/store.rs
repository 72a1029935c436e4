use crate::*;
use futures::future::{BoxFuture, FutureExt};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

struct Proposal {
    metadata: ProposalMetadata,
    status: ProposalStatus,
    max_votes: u32,
    votes: HashMap<Address, u32>,
    ballots: Vec<EncryptedBallot>,
    aggregate: Vec<Handle>,
    results: Option<PublishedResults>,
}

#[derive(Default)]
struct State {
    proposals: BTreeMap<u64, Proposal>,
    pending: HashMap<TxRef, SignedCall>,
    receipts: HashMap<TxRef, Receipt>,
    height: u64,
}

/// A voting contract simulated in memory.
///
/// Broadcast calls are held until someone waits for their receipt, at which
/// point they are included in the next block and executed.
pub struct MemLedger {
    network: NetworkId,
    contract: Address,
    state: Mutex<State>,
}

impl MemLedger {
    pub fn new(network: NetworkId, contract: Address) -> Self {
        MemLedger {
            network,
            contract,
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a proposal. It starts out `Active`.
    pub fn add_proposal(&self, metadata: ProposalMetadata, max_votes: u32) {
        let id = metadata.id;
        self.state().proposals.insert(
            id,
            Proposal {
                metadata,
                status: ProposalStatus::Active,
                max_votes,
                votes: HashMap::new(),
                ballots: Vec::new(),
                aggregate: Vec::new(),
                results: None,
            },
        );
    }

    pub fn set_status(&self, proposal: u64, status: ProposalStatus) -> Result<(), Error> {
        let mut state = self.state();
        let proposal = state
            .proposals
            .get_mut(&proposal)
            .ok_or(Error::ProposalNotFound(proposal))?;
        proposal.status = status;
        Ok(())
    }

    /// Set the encrypted per-option totals the contract would have accumulated.
    pub fn set_encrypted_aggregate(&self, proposal: u64, handles: Vec<Handle>) -> Result<(), Error> {
        let mut state = self.state();
        let proposal = state
            .proposals
            .get_mut(&proposal)
            .ok_or(Error::ProposalNotFound(proposal))?;
        proposal.aggregate = handles;
        Ok(())
    }

    /// Reveal plaintext results. Moves the proposal to `Published`.
    pub fn publish_results(&self, proposal: u64, results: PublishedResults) -> Result<(), Error> {
        let mut state = self.state();
        let proposal = state
            .proposals
            .get_mut(&proposal)
            .ok_or(Error::ProposalNotFound(proposal))?;
        proposal.status = ProposalStatus::Published;
        proposal.metadata.results_published = true;
        proposal.results = Some(results);
        Ok(())
    }

    /// Ballots accepted so far, in inclusion order
    pub fn ballots(&self, proposal: u64) -> Vec<EncryptedBallot> {
        self.state()
            .proposals
            .get(&proposal)
            .map(|p| p.ballots.clone())
            .unwrap_or_default()
    }

    pub fn height(&self) -> u64 {
        self.state().height
    }

    fn with_proposal<T>(&self, proposal: u64, f: impl FnOnce(&Proposal) -> Result<T, Error>) -> Result<T, Error> {
        let state = self.state();
        let found = state
            .proposals
            .get(&proposal)
            .ok_or(Error::ProposalNotFound(proposal))?;
        f(found)
    }

    // Execute a vote call against the current state. Err is the revert reason.
    fn execute(&self, state: &mut State, call: &SignedCall) -> Result<(), String> {
        let sender = call.verify().map_err(|_| "invalid call signature".to_owned())?;
        if call.to != self.contract {
            return Err(format!("call sent to {} instead of {}", call.to, self.contract));
        }

        let VoteCall { proposal, ballot } =
            VoteCall::decode(&call.data).map_err(|e| format!("malformed call data: {}", e))?;

        let expected = BallotBinding::new(self.contract, sender, self.network);
        if ballot.binding != expected {
            return Err("ballot is bound to a different contract, voter or network".to_owned());
        }

        let found = state
            .proposals
            .get_mut(&proposal)
            .ok_or_else(|| format!("unknown proposal {}", proposal))?;
        if found.status != ProposalStatus::Active {
            return Err(format!("proposal {} is {}", proposal, found.status));
        }
        if ballot.handles.len() != found.metadata.options.len() {
            return Err(format!(
                "ballot has {} handles for {} options",
                ballot.handles.len(),
                found.metadata.options.len()
            ));
        }

        let votes = found.votes.entry(sender).or_insert(0);
        if *votes >= found.max_votes {
            return Err(format!("{} has no votes left on proposal {}", sender, proposal));
        }
        *votes += 1;
        found.ballots.push(ballot);

        Ok(())
    }

    fn confirm(&self, tx: TxRef) -> Result<Receipt, Error> {
        let mut state = self.state();
        if let Some(receipt) = state.receipts.get(&tx) {
            return Ok(receipt.clone());
        }

        let call = state
            .pending
            .remove(&tx)
            .ok_or_else(|| Error::TransportError(format!("unknown transaction {}", tx)))?;

        state.height += 1;
        let status = match self.execute(&mut state, &call) {
            Ok(()) => ReceiptStatus::Confirmed,
            Err(reason) => {
                warn!("transaction {} reverted: {}", tx, reason);
                ReceiptStatus::Reverted(reason)
            }
        };

        let receipt = Receipt {
            tx,
            block: state.height,
            status,
        };
        state.receipts.insert(tx, receipt.clone());
        Ok(receipt)
    }
}

impl Broadcast for MemLedger {
    fn broadcast(&self, call: SignedCall) -> BoxFuture<'_, Result<TxRef, Error>> {
        async move {
            let tx = call.tx_ref()?;
            let mut state = self.state();
            if state.pending.contains_key(&tx) || state.receipts.contains_key(&tx) {
                return Err(Error::TransportError(format!("transaction {} already known", tx)));
            }
            debug!("accepted transaction {} for {}", tx, call.to);
            state.pending.insert(tx, call);
            Ok(tx)
        }
        .boxed()
    }
}

impl Ledger for MemLedger {
    fn contract(&self) -> Address {
        self.contract
    }

    fn network(&self) -> NetworkId {
        self.network
    }

    fn wait_for_receipt(&self, tx: TxRef) -> BoxFuture<'_, Result<Receipt, Error>> {
        async move { self.confirm(tx) }.boxed()
    }

    fn proposal_metadata(&self, proposal: u64) -> BoxFuture<'_, Result<ProposalMetadata, Error>> {
        async move { self.with_proposal(proposal, |p| Ok(p.metadata.clone())) }.boxed()
    }

    fn proposal_status(&self, proposal: u64) -> BoxFuture<'_, Result<ProposalStatus, Error>> {
        async move { self.with_proposal(proposal, |p| Ok(p.status)) }.boxed()
    }

    fn encrypted_aggregate(&self, proposal: u64) -> BoxFuture<'_, Result<Vec<Handle>, Error>> {
        async move { self.with_proposal(proposal, |p| Ok(p.aggregate.clone())) }.boxed()
    }

    fn published_results(&self, proposal: u64) -> BoxFuture<'_, Result<PublishedResults, Error>> {
        async move {
            self.with_proposal(proposal, |p| match (&p.status, &p.results) {
                (ProposalStatus::Published, Some(results)) => Ok(results.clone()),
                _ => Err(Error::ResultsUnavailable(p.status)),
            })
        }
        .boxed()
    }

    fn participant_vote_count(
        &self,
        proposal: u64,
        participant: Address,
    ) -> BoxFuture<'_, Result<u32, Error>> {
        async move {
            self.with_proposal(proposal, |p| {
                Ok(p.votes.get(&participant).copied().unwrap_or_default())
            })
        }
        .boxed()
    }

    fn max_votes_per_participant(&self, proposal: u64) -> BoxFuture<'_, Result<u32, Error>> {
        async move { self.with_proposal(proposal, |p| Ok(p.max_votes)) }.boxed()
    }
}
