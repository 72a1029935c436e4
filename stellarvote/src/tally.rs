use crate::*;
use indexmap::IndexMap;
use std::sync::Arc;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TallyEntry {
    pub option: String,
    pub count: u64,
}

/// Where the counts in a tally came from
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum TallySource {
    /// Revealed on-chain by the contract
    Published {
        reveal_time: u64,

        #[serde(with = "hex_serde")]
        proof: Vec<u8>,
    },

    /// Recovered from the encrypted aggregate through user decryption
    Decrypted,
}

/// Per-option vote counts for one proposal
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Tally {
    pub proposal: u64,
    pub title: String,
    pub entries: Vec<TallyEntry>,
    pub source: TallySource,
}

impl Tally {
    /// Pair counts with option labels by position.
    pub fn new(
        metadata: &ProposalMetadata,
        counts: &[u64],
        source: TallySource,
    ) -> Result<Self, Error> {
        if counts.len() != metadata.options.len() {
            return Err(Error::TallyMismatch {
                expected: metadata.options.len(),
                found: counts.len(),
            });
        }

        let entries = metadata
            .options
            .iter()
            .zip(counts)
            .map(|(option, count)| TallyEntry {
                option: option.clone(),
                count: *count,
            })
            .collect();

        Ok(Tally {
            proposal: metadata.id,
            title: metadata.title.clone(),
            entries,
            source,
        })
    }

    pub fn count_for(&self, option: usize) -> Option<u64> {
        self.entries.get(option).map(|entry| entry.count)
    }

    pub fn total(&self) -> u64 {
        self.entries.iter().map(|entry| entry.count).sum()
    }

    /// The first option with the highest count
    pub fn winner(&self) -> Option<&TallyEntry> {
        let mut winner: Option<&TallyEntry> = None;
        for entry in &self.entries {
            match winner {
                Some(best) if best.count >= entry.count => {}
                _ => winner = Some(entry),
            }
        }
        winner
    }

    pub fn by_label(&self) -> IndexMap<String, u64> {
        self.entries
            .iter()
            .map(|entry| (entry.option.clone(), entry.count))
            .collect()
    }
}

/// Reads results for a proposal, decrypting them when they are not yet published.
pub struct TallyReader {
    ledger: Arc<dyn Ledger>,
    authorizer: DecryptionAuthorizer,
}

impl TallyReader {
    pub fn new(ledger: Arc<dyn Ledger>, authorizer: DecryptionAuthorizer) -> Self {
        TallyReader { ledger, authorizer }
    }

    pub async fn read(&self, session: &Session, proposal: u64) -> Result<Tally, Error> {
        let (metadata, status) = futures::try_join!(
            self.ledger.proposal_metadata(proposal),
            self.ledger.proposal_status(proposal),
        )?;

        match status {
            ProposalStatus::Published => {
                let results = self.ledger.published_results(proposal).await?;
                Tally::new(
                    &metadata,
                    &results.tallies,
                    TallySource::Published {
                        reveal_time: results.reveal_time,
                        proof: results.proof,
                    },
                )
            }
            ProposalStatus::Ended => {
                let handles = self.ledger.encrypted_aggregate(proposal).await?;
                if handles.len() != metadata.options.len() {
                    return Err(Error::TallyMismatch {
                        expected: metadata.options.len(),
                        found: handles.len(),
                    });
                }
                let counts = self
                    .authorizer
                    .request_aggregate(session, self.ledger.contract(), &handles)
                    .await?;
                Tally::new(&metadata, &counts, TallySource::Decrypted)
            }
            ProposalStatus::Pending | ProposalStatus::Active => {
                Err(Error::ResultsUnavailable(status))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::*;

    #[test]
    fn winner_prefers_the_first_of_equal_counts() {
        let tally = Tally::new(&test_metadata(), &[4, 9, 9], TallySource::Decrypted).unwrap();

        assert_eq!(tally.winner().unwrap().option, "Bravo");
        assert_eq!(tally.total(), 22);
        assert_eq!(tally.count_for(2), Some(9));
        assert_eq!(tally.count_for(3), None);
        assert_eq!(
            tally.by_label().keys().collect::<Vec<_>>(),
            vec!["Alpha", "Bravo", "Charlie"]
        );
    }

    #[test]
    fn counts_must_match_options() {
        assert_eq!(
            Tally::new(&test_metadata(), &[1, 2], TallySource::Decrypted).unwrap_err(),
            Error::TallyMismatch {
                expected: 3,
                found: 2
            }
        );
    }

    #[tokio::test]
    async fn active_proposals_have_no_results() {
        let ledger = test_ledger();
        let reader = TallyReader::new(ledger, test_authorizer(Arc::new(FakeKeyService::new())));

        assert_eq!(
            reader.read(&test_session(), TEST_PROPOSAL).await.unwrap_err(),
            Error::ResultsUnavailable(ProposalStatus::Active)
        );
    }

    #[tokio::test]
    async fn published_results_are_read_without_decryption() {
        let ledger = test_ledger();
        ledger
            .publish_results(
                TEST_PROPOSAL,
                PublishedResults {
                    tallies: vec![3, 1, 0],
                    proof: vec![1, 2],
                    reveal_time: 99,
                },
            )
            .unwrap();
        let service = Arc::new(FakeKeyService::new());
        let reader = TallyReader::new(ledger, test_authorizer(service.clone()));

        let tally = reader.read(&test_session(), TEST_PROPOSAL).await.unwrap();

        assert_eq!(tally.winner().unwrap().option, "Alpha");
        assert_eq!(
            tally.source,
            TallySource::Published {
                reveal_time: 99,
                proof: vec![1, 2]
            }
        );
        assert_eq!(service.decrypt_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
