//! Listing controls across a persona's cards

mod common;

use std::time::Duration;

use cardctl_audit::AuditAction;
use cardctl_engine::{labels, PartialFailurePolicy};
use cardctl_types::{ControlType, DownstreamStatus, ErrorKind, TokenizedCardNumber};

use common::{init_tracing, pan_of, Harness, PAN_DISCOVER, PAN_MASTERCARD, PAN_VISA};

async fn two_cards(h: &Harness) -> (TokenizedCardNumber, TokenizedCardNumber) {
    let visa = h.add_card("tok-visa", PAN_VISA).await;
    let mastercard = h.add_card("tok-mc", PAN_MASTERCARD).await;
    (visa, mastercard)
}

#[tokio::test]
async fn lists_every_entitled_card() {
    init_tracing();
    let h = Harness::new();
    let (visa, mastercard) = two_cards(&h).await;
    h.engine
        .set_controls(&h.ctx, &visa, &[ControlType::Gambling, ControlType::Global])
        .await
        .unwrap();

    let listed = h.engine.list_controls(&h.ctx).await.unwrap();

    assert_eq!(listed.cards.len(), 2);
    assert!(listed.omitted.is_empty());
    let visa_view = listed.card(&visa).unwrap();
    assert!(visa_view.control(ControlType::Gambling).is_some());
    assert_eq!(visa_view.global.len(), 1);
    assert!(listed.card(&mastercard).unwrap().is_empty());
}

#[tokio::test]
async fn ineligible_card_is_omitted_without_failing_the_list() {
    let h = Harness::new();
    let (visa, mastercard) = two_cards(&h).await;
    h.eligibility.deny_all(mastercard.clone()).await;

    let listed = h.engine.list_controls(&h.ctx).await.unwrap();

    assert_eq!(listed.cards.len(), 1);
    assert!(listed.card(&visa).is_some());
    assert_eq!(listed.omitted, vec![mastercard]);
}

#[tokio::test]
async fn failed_query_yields_an_empty_placeholder() {
    let h = Harness::new();
    let (visa, mastercard) = two_cards(&h).await;
    h.engine
        .set_controls(&h.ctx, &mastercard, &[ControlType::Dining])
        .await
        .unwrap();
    h.store
        .fail_queries_for(pan_of(PAN_MASTERCARD), DownstreamStatus::Unavailable)
        .await;

    let listed = h.engine.list_controls(&h.ctx).await.unwrap();

    assert_eq!(listed.cards.len(), 2);
    assert!(listed.card(&visa).is_some());
    let placeholder = listed.card(&mastercard).unwrap();
    assert!(placeholder.is_empty());
    assert!(placeholder.document_id.is_none());
    assert!(listed.omitted.is_empty());
}

#[tokio::test]
async fn omit_failed_policy_drops_placeholders() {
    let h = Harness::new();
    let (visa, mastercard) = two_cards(&h).await;
    h.store
        .fail_queries_for(pan_of(PAN_MASTERCARD), DownstreamStatus::Internal)
        .await;

    let listed = h
        .engine
        .list_controls_with_policy(&h.ctx, PartialFailurePolicy::OmitFailed)
        .await
        .unwrap();

    assert_eq!(listed.cards.keys().collect::<Vec<_>>(), vec![&visa]);
    assert_eq!(listed.omitted, vec![mastercard]);
}

#[tokio::test]
async fn fail_fast_policy_surfaces_the_first_failure() {
    let h = Harness::with_toml("[list]\nfailure_policy = \"fail_fast\"\n");
    two_cards(&h).await;
    h.store
        .fail_queries_for(pan_of(PAN_VISA), DownstreamStatus::Unavailable)
        .await;

    let err = h.engine.list_controls(&h.ctx).await.unwrap_err();

    assert_eq!(err.operation(), Some(labels::LIST));
    assert_eq!(err.kind(), ErrorKind::DownstreamFailure);
    assert!(err.is_retriable());
}

#[tokio::test]
async fn slow_card_is_omitted_after_its_deadline() {
    let h = Harness::with_toml("[list]\nper_card_timeout_ms = 50\n");
    let (visa, mastercard) = two_cards(&h).await;
    h.store
        .delay_queries_for(pan_of(PAN_MASTERCARD), Duration::from_millis(500))
        .await;

    let listed = h.engine.list_controls(&h.ctx).await.unwrap();

    assert!(listed.card(&visa).is_some());
    assert!(listed.card(&mastercard).is_none());
    assert_eq!(listed.omitted, vec![mastercard]);
}

#[tokio::test]
async fn slow_card_fails_the_list_under_fail_fast() {
    let h = Harness::with_toml("[list]\nper_card_timeout_ms = 50\n");
    two_cards(&h).await;
    h.store
        .delay_queries_for(pan_of(PAN_VISA), Duration::from_millis(500))
        .await;

    let err = h
        .engine
        .list_controls_with_policy(&h.ctx, PartialFailurePolicy::FailFast)
        .await
        .unwrap_err();

    assert_eq!(err.downstream_status(), Some(DownstreamStatus::DeadlineExceeded));
    assert!(err.is_retriable());
}

#[tokio::test]
async fn deadline_starts_once_a_unit_holds_a_permit() {
    let h = Harness::with_toml("[list]\nmax_concurrency = 1\nper_card_timeout_ms = 300\n");
    let (visa, mastercard) = two_cards(&h).await;
    for pan in [PAN_VISA, PAN_MASTERCARD] {
        h.store
            .delay_queries_for(pan_of(pan), Duration::from_millis(200))
            .await;
    }

    let listed = h.engine.list_controls(&h.ctx).await.unwrap();

    assert!(listed.card(&visa).is_some());
    assert!(listed.card(&mastercard).is_some());
    assert!(listed.omitted.is_empty());
}

#[tokio::test]
async fn card_unknown_to_the_tokenizer_is_omitted() {
    let h = Harness::new();
    let visa = h.add_card("tok-visa", PAN_VISA).await;
    let orphan = TokenizedCardNumber::parse("tok-orphan").unwrap();
    h.entitlements
        .grant(h.ctx.persona.clone(), orphan.clone(), "acct-orphan".into())
        .await;

    let listed = h.engine.list_controls(&h.ctx).await.unwrap();

    assert!(listed.card(&visa).is_some());
    assert_eq!(listed.omitted, vec![orphan]);
}

#[tokio::test]
async fn card_held_through_two_accounts_is_listed_once() {
    let h = Harness::new();
    let visa = h.add_card("tok-visa", PAN_VISA).await;
    h.entitlements
        .grant(h.ctx.persona.clone(), visa.clone(), "acct-joint".into())
        .await;

    let listed = h.engine.list_controls(&h.ctx).await.unwrap();

    assert_eq!(listed.cards.len(), 1);
    assert_eq!(h.store.query_calls(), 1);
}

#[tokio::test]
async fn persona_without_cards_lists_nothing() {
    let h = Harness::new();
    h.tokenizer.fail_batches(true);

    let listed = h.engine.list_controls(&h.ctx).await.unwrap();

    assert!(listed.cards.is_empty());
    assert!(listed.omitted.is_empty());
}

#[tokio::test]
async fn batch_detokenization_failure_fails_the_list() {
    let h = Harness::new();
    two_cards(&h).await;
    h.tokenizer.fail_batches(true);

    let err = h.engine.list_controls(&h.ctx).await.unwrap_err();

    assert_eq!(err.operation(), Some(labels::LIST));
    assert_eq!(err.kind(), ErrorKind::DownstreamFailure);
    assert_eq!(h.store.query_calls(), 0);
}

#[tokio::test]
async fn entitlement_listing_failure_fails_the_list() {
    let h = Harness::new();
    two_cards(&h).await;
    h.entitlements.fail_listing(true);

    let err = h.engine.list_controls(&h.ctx).await.unwrap_err();

    assert_eq!(err.operation(), Some(labels::LIST));
    assert!(err.is_retriable());
}

#[tokio::test]
async fn list_is_audited_without_a_card() {
    let h = Harness::new();
    h.add_card("tok-visa", PAN_VISA).await;
    h.add_card("tok-disc", PAN_DISCOVER).await;

    h.engine.list_controls(&h.ctx).await.unwrap();

    let entries = h.audit.entries().await;
    assert_eq!(entries.len(), 1);
    let record = &entries[0].record;
    assert_eq!(record.action, AuditAction::ListControls);
    assert!(record.card.is_none());
    assert_eq!(record.service_data["failure_policy"], "isolate");
    assert!(record.response["cards"]["tok-disc"].is_object());
}
