use super::*;
use crate::fakes::*;
use futures::StreamExt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[tokio::test]
async fn end_to_end_vote_and_tally() {
    let service = Arc::new(FakeKeyService::new());
    let ledger = test_ledger();

    // Encoder and authorizer share one key cache
    let cache = Arc::new(test_cache(service.clone()));
    let encoder = BallotEncoder::new(cache.clone(), Arc::new(MockEngine::new()));
    let authorizer =
        DecryptionAuthorizer::new(cache.clone(), AuthorizationPolicy::default()).with_clock(fixed_clock);

    // Check the voter may vote
    let session = test_session_on(&ledger);
    let eligibility = check_eligibility(ledger.as_ref(), &session, TEST_PROPOSAL)
        .await
        .unwrap();
    assert!(eligibility.can_vote());
    let options = ledger.proposal_metadata(TEST_PROPOSAL).await.unwrap().options.len();

    // Vote for the second option
    let machine =
        SubmissionMachine::new(encoder, ledger.clone(), session.clone(), TEST_PROPOSAL, options)
            .unwrap();
    let states = machine.subscribe();
    let outcome = machine.start(1).await.unwrap();
    assert!(matches!(outcome, SubmissionState::Succeeded { block: 1, .. }));

    drop(machine);
    let mut phases: Vec<&'static str> = states.map(|s| s.name()).collect().await;
    phases.dedup();
    assert_eq!(
        phases,
        vec!["idle", "encrypting", "awaiting_signature", "pending", "succeeded"]
    );

    // The contract holds one ballot with a handle per option, bound to this voter
    let ballots = ledger.ballots(TEST_PROPOSAL);
    assert_eq!(ballots.len(), 1);
    assert_eq!(ballots[0].handles.len(), 3);
    assert_eq!(ballots[0].binding, test_binding());
    assert!(!check_eligibility(ledger.as_ref(), &session, TEST_PROPOSAL)
        .await
        .unwrap()
        .can_vote());

    // Voting ends and the contract exposes its encrypted totals
    let aggregate = vec![Handle([0xa0; 32]), Handle([0xa1; 32]), Handle([0xa2; 32])];
    service.set_plaintext(aggregate[0], 12);
    service.set_plaintext(aggregate[1], 45);
    service.set_plaintext(aggregate[2], 3);
    ledger.set_encrypted_aggregate(TEST_PROPOSAL, aggregate).unwrap();
    ledger.set_status(TEST_PROPOSAL, ProposalStatus::Ended).unwrap();

    let reader = TallyReader::new(ledger.clone(), authorizer);
    let tally = reader.read(&session, TEST_PROPOSAL).await.unwrap();

    assert_eq!(tally.source, TallySource::Decrypted);
    assert_eq!(
        tally.entries.iter().map(|e| e.count).collect::<Vec<_>>(),
        vec![12, 45, 3]
    );
    assert_eq!(tally.count_for(1), Some(45));
    assert_eq!(tally.winner().unwrap().option, "Bravo");

    // Key material was fetched exactly once for both vote and tally
    assert_eq!(service.directory_calls.load(Ordering::SeqCst), 1);
    assert_eq!(service.download_calls.load(Ordering::SeqCst), 2);
    assert_eq!(service.decrypt_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unsupported_network_fails_before_any_traffic() {
    let service = Arc::new(FakeKeyService::new());
    let cache = Arc::new(test_cache(service.clone()));
    let elsewhere = NetworkId(1);
    let session = Session::new(elsewhere, test_voter(), Arc::new(test_signer()));

    let encoder = BallotEncoder::new(cache.clone(), Arc::new(MockEngine::new()));
    assert_eq!(
        encoder.encode_for(&session, 0, 2).await.unwrap_err(),
        Error::UnsupportedNetwork(elsewhere)
    );
    assert_eq!(
        encoder
            .encode(test_contract(), test_voter(), 0, 2, elsewhere)
            .await
            .unwrap_err(),
        Error::UnsupportedNetwork(elsewhere)
    );

    let authorizer = DecryptionAuthorizer::new(cache.clone(), AuthorizationPolicy::default());
    assert_eq!(
        authorizer
            .request_aggregate(&session, test_contract(), &[Handle([1; 32])])
            .await
            .unwrap_err(),
        Error::UnsupportedNetwork(elsewhere)
    );

    let machine = SubmissionMachine::new(encoder, test_ledger(), session, TEST_PROPOSAL, 3);
    assert_eq!(machine.err(), Some(Error::UnsupportedNetwork(elsewhere)));

    assert_eq!(service.directory_calls.load(Ordering::SeqCst), 0);
    assert_eq!(service.download_calls.load(Ordering::SeqCst), 0);
    assert_eq!(service.decrypt_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn key_fetch_failure_lands_in_failed_state() {
    let service = Arc::new(FakeKeyService::new().failing_at(FetchStage::PublicKey));
    let ledger = test_ledger();
    let machine = test_machine(&ledger, service.clone());

    let outcome = machine.start(0).await.unwrap();

    match outcome {
        SubmissionState::Failed { kind, error } => {
            assert_eq!(kind, FailureKind::Encode);
            assert!(matches!(
                error,
                Error::KeyFetchFailed {
                    stage: FetchStage::PublicKey,
                    cause: ServiceError::Transport(_),
                }
            ));
            assert!(error.is_transient());
        }
        other => panic!("unexpected state {:?}", other),
    }
    assert_eq!(ledger.height(), 0);

    // No automatic retry: the caller resets and tries again
    service.stop_failing();
    machine.reset().unwrap();
    assert!(matches!(
        machine.start(0).await.unwrap(),
        SubmissionState::Succeeded { .. }
    ));
    assert_eq!(service.directory_calls.load(Ordering::SeqCst), 2);
}
