use crate::*;
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::future::{AbortHandle, Abortable, Aborted};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

/// Which step of a vote attempt failed
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Encode,
    Sign,
    Chain,
    Cancelled,
}

/// Phase of a vote attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum SubmissionState {
    Idle,
    Encrypting { progress: String },
    AwaitingSignature,
    Pending { tx: TxRef },
    Succeeded { tx: TxRef, block: u64 },
    Failed { kind: FailureKind, error: Error },
}

impl SubmissionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubmissionState::Succeeded { .. } | SubmissionState::Failed { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            SubmissionState::Idle => "idle",
            SubmissionState::Encrypting { .. } => "encrypting",
            SubmissionState::AwaitingSignature => "awaiting_signature",
            SubmissionState::Pending { .. } => "pending",
            SubmissionState::Succeeded { .. } => "succeeded",
            SubmissionState::Failed { .. } => "failed",
        }
    }
}

impl Default for SubmissionState {
    fn default() -> Self {
        SubmissionState::Idle
    }
}

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
pub struct SubmissionConfig {
    /// How long to wait for a broadcast vote to confirm
    pub confirmation_timeout: Duration,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        SubmissionConfig {
            confirmation_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Default)]
struct Inner {
    state: SubmissionState,
    attempt: Option<Uuid>,
    abort: Option<AbortHandle>,
    observers: Vec<UnboundedSender<SubmissionState>>,
}

impl Inner {
    fn label(&self) -> String {
        self.attempt.map(|id| id.to_string()).unwrap_or_default()
    }

    fn is_current(&self, attempt: Uuid) -> bool {
        self.attempt == Some(attempt) && !self.state.is_terminal()
    }

    // What a finished or superseded attempt ended as. Only cancellation can
    // finish an attempt behind the back of its `start` future.
    fn outcome_of(&self, attempt: Uuid) -> SubmissionState {
        if self.attempt == Some(attempt) {
            return self.state.clone();
        }
        SubmissionState::Failed {
            kind: FailureKind::Cancelled,
            error: Error::Cancelled,
        }
    }

    fn transition(&mut self, next: SubmissionState) {
        debug!(
            "vote attempt {}: {} -> {}",
            self.label(),
            self.state.name(),
            next.name()
        );
        self.state = next;
        let state = &self.state;
        self.observers
            .retain(|observer| observer.unbounded_send(state.clone()).is_ok());
    }
}

// Settles an attempt whose `start` future is dropped before it finishes.
struct AttemptGuard<'a> {
    machine: &'a SubmissionMachine,
    attempt: Uuid,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.machine.lock();
        if !inner.is_current(self.attempt) {
            return;
        }

        let (kind, error) = match &inner.state {
            SubmissionState::Pending { tx } => (
                FailureKind::Chain,
                Error::ChainError(ChainFailure::Abandoned(*tx)),
            ),
            _ => (FailureKind::Cancelled, Error::Cancelled),
        };
        warn!(
            "vote attempt {} dropped during {}",
            inner.label(),
            inner.state.name()
        );
        if let Some(abort) = inner.abort.take() {
            abort.abort();
        }
        inner.transition(SubmissionState::Failed { kind, error });
    }
}

/// Drives one vote from choice to confirmation:
/// encrypt, have the agent sign and broadcast, then wait for the receipt.
///
/// Only one attempt runs at a time. A finished attempt stays visible until
/// `reset` is called.
pub struct SubmissionMachine {
    encoder: BallotEncoder,
    ledger: Arc<dyn Ledger>,
    session: Session,
    proposal: u64,
    options: usize,
    contract: Address,
    config: SubmissionConfig,
    inner: Mutex<Inner>,
}

impl SubmissionMachine {
    pub fn new(
        encoder: BallotEncoder,
        ledger: Arc<dyn Ledger>,
        session: Session,
        proposal: u64,
        options: usize,
    ) -> Result<Self, Error> {
        let contract = encoder.cache().networks().contract_for(session.network)?;
        if ledger.contract() != contract {
            return Err(Error::Config(format!(
                "ledger targets {} but network {} uses {}",
                ledger.contract(),
                session.network,
                contract
            )));
        }

        Ok(SubmissionMachine {
            encoder,
            ledger,
            session,
            proposal,
            options,
            contract,
            config: SubmissionConfig::default(),
            inner: Mutex::new(Inner::default()),
        })
    }

    pub fn with_config(mut self, config: SubmissionConfig) -> Self {
        self.config = config;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> SubmissionState {
        self.lock().state.clone()
    }

    /// Id of the current attempt, used to correlate log lines
    pub fn attempt(&self) -> Option<Uuid> {
        self.lock().attempt
    }

    /// Receive every state change from now on, starting with the current state.
    pub fn subscribe(&self) -> UnboundedReceiver<SubmissionState> {
        let (sender, receiver) = mpsc::unbounded();
        let mut inner = self.lock();
        if sender.unbounded_send(inner.state.clone()).is_ok() {
            inner.observers.push(sender);
        }
        receiver
    }

    /// Run a vote attempt for `choice` to a terminal state and return that state.
    ///
    /// Refused without any transition unless the machine is `Idle`. Dropping the
    /// returned future settles the attempt: as cancelled before broadcast, as
    /// an abandoned chain wait after.
    pub async fn start(&self, choice: usize) -> Result<SubmissionState, Error> {
        let (attempt, registration) = {
            let mut inner = self.lock();
            if inner.state != SubmissionState::Idle {
                return Err(Error::AttemptInFlight(inner.state.name()));
            }
            let attempt = Uuid::new_v4();
            let (handle, registration) = AbortHandle::new_pair();
            inner.abort = Some(handle);
            inner.attempt = Some(attempt);
            inner.transition(SubmissionState::Encrypting {
                progress: "validating choice".to_owned(),
            });
            (attempt, registration)
        };
        let _guard = AttemptGuard {
            machine: self,
            attempt,
        };

        let tx = match Abortable::new(self.encode_and_submit(attempt, choice), registration).await {
            Ok(Ok(tx)) => tx,
            Ok(Err((kind, error))) => return Ok(self.settle(attempt, kind, error)),
            Err(Aborted) => return Ok(self.settle(attempt, FailureKind::Cancelled, Error::Cancelled)),
        };

        let timeout = self.config.confirmation_timeout;
        let outcome = match tokio::time::timeout(timeout, self.ledger.wait_for_receipt(tx)).await {
            Err(_) => Err(Error::ChainError(ChainFailure::Timeout {
                after_secs: timeout.as_secs(),
            })),
            Ok(Err(e)) => Err(e),
            Ok(Ok(receipt)) => match receipt.status {
                ReceiptStatus::Confirmed => Ok(receipt.block),
                ReceiptStatus::Reverted(reason) => Err(Error::ChainError(ChainFailure::Reverted(reason))),
            },
        };

        match outcome {
            Ok(block) => {
                info!("vote {} confirmed in block {}", tx, block);
                Ok(self.advance(attempt, SubmissionState::Succeeded { tx, block }))
            }
            Err(error) => Ok(self.settle(attempt, FailureKind::Chain, error)),
        }
    }

    // Everything up to and including the broadcast. Dropped wholesale on cancel.
    async fn encode_and_submit(&self, attempt: Uuid, choice: usize) -> Result<TxRef, (FailureKind, Error)> {
        let encode_failed = |e| (FailureKind::Encode, e);
        let network = self.session.network;

        OneHotVector::new(choice, self.options).map_err(encode_failed)?;

        self.progress(attempt, "fetching encryption keys")?;
        self.encoder.cache().resolve(network).await.map_err(encode_failed)?;

        self.progress(attempt, "encrypting ballot")?;
        let ballot = self
            .encoder
            .encode(self.contract, self.session.voter, choice, self.options, network)
            .await
            .map_err(encode_failed)?;

        self.step(attempt, SubmissionState::AwaitingSignature)?;

        let tx = self
            .ledger
            .submit_encrypted_ballot(self.session.agent.as_ref(), self.proposal, &ballot)
            .await
            .map_err(|e| (FailureKind::Sign, e))?;

        // Broadcast happened, so the attempt can no longer be cancelled
        let mut inner = self.lock();
        if !inner.is_current(attempt) {
            warn!("vote {} was broadcast after its attempt was cancelled", tx);
            return Err((FailureKind::Cancelled, Error::Cancelled));
        }
        inner.abort = None;
        inner.transition(SubmissionState::Pending { tx });
        Ok(tx)
    }

    fn progress(&self, attempt: Uuid, message: &str) -> Result<(), (FailureKind, Error)> {
        self.step(
            attempt,
            SubmissionState::Encrypting {
                progress: message.to_owned(),
            },
        )
    }

    // Move a live attempt forward. Fails once the attempt was cancelled.
    fn step(&self, attempt: Uuid, next: SubmissionState) -> Result<(), (FailureKind, Error)> {
        let mut inner = self.lock();
        if !inner.is_current(attempt) {
            return Err((FailureKind::Cancelled, Error::Cancelled));
        }
        inner.transition(next);
        Ok(())
    }

    fn advance(&self, attempt: Uuid, next: SubmissionState) -> SubmissionState {
        let mut inner = self.lock();
        if !inner.is_current(attempt) {
            return inner.outcome_of(attempt);
        }
        inner.transition(next);
        inner.state.clone()
    }

    fn settle(&self, attempt: Uuid, kind: FailureKind, error: Error) -> SubmissionState {
        let mut inner = self.lock();
        if !inner.is_current(attempt) {
            return inner.outcome_of(attempt);
        }
        warn!(
            "vote attempt {} failed during {}: {}",
            inner.label(),
            inner.state.name(),
            error
        );
        inner.abort = None;
        inner.transition(SubmissionState::Failed { kind, error });
        inner.state.clone()
    }

    /// Abandon the attempt if it has not been broadcast yet.
    ///
    /// The machine moves to `Failed{Cancelled}` right away, whether or not
    /// anyone is still polling `start`. Outstanding key fetches and signature
    /// prompts are dropped. Returns false once the vote is broadcast.
    pub fn cancel(&self) -> bool {
        let mut inner = self.lock();
        if !matches!(
            inner.state,
            SubmissionState::Encrypting { .. } | SubmissionState::AwaitingSignature
        ) {
            return false;
        }
        let abort = match inner.abort.take() {
            Some(abort) => abort,
            None => return false,
        };

        abort.abort();
        info!("vote attempt {} cancelled during {}", inner.label(), inner.state.name());
        inner.transition(SubmissionState::Failed {
            kind: FailureKind::Cancelled,
            error: Error::Cancelled,
        });
        true
    }

    /// Return a finished machine to `Idle` so a new attempt can start.
    pub fn reset(&self) -> Result<(), Error> {
        let mut inner = self.lock();
        if inner.state == SubmissionState::Idle {
            return Ok(());
        }
        if !inner.state.is_terminal() {
            return Err(Error::AttemptInFlight(inner.state.name()));
        }
        inner.transition(SubmissionState::Idle);
        inner.attempt = None;
        Ok(())
    }
}
