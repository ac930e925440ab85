//! Integration tests for work creation, confirmation, moderation, editing
//! and merging

mod helpers;

use chrono::Duration;
use helpers::{draft, full_draft, TestCatalog};
use libris_core::activation::TokenPurpose;
use libris_core::audit::{AuditAction, AuditTarget};
use libris_core::identifiers::RawIdentifier;
use libris_core::lifecycle::Confirmation;
use libris_core::models::{EntityKind, ModerationState, WorkPatch};
use libris_core::privileges::{Capability, Role};
use libris_core::{CoreError, ErrorKind};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Creation outcomes
// ============================================================================

#[tokio::test]
async fn test_default_actor_create_is_pending_and_hidden() {
    let t = TestCatalog::new().await;
    let reader = t.actor("reader", Role::Default).await;

    let outcome = t.catalog.create_work(full_draft("A Wizard of Earthsea"), &reader).await.unwrap();

    assert_eq!(outcome.state, ModerationState::Pending);
    assert!(!outcome.visible);
    assert!(!outcome.work.enabled);
    assert!(outcome.activation_link.is_none());
    assert!(!t.index.contains(outcome.work.id).await);

    let history = t.catalog.history(AuditTarget::new(EntityKind::Work, outcome.work.id)).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, AuditAction::Create);
    assert_eq!(history[0].actor_id, Some(reader.id));
    assert_eq!(history[0].moderation_state, Some(ModerationState::Pending));
}

#[tokio::test]
async fn test_elevated_create_is_approved_and_indexed() {
    let t = TestCatalog::new().await;
    let contributor = t.actor("contrib", Role::Contributor).await;

    let outcome = t.catalog.create_work(draft("Neuromancer"), &contributor).await.unwrap();

    assert_eq!(outcome.state, ModerationState::Approved);
    assert!(outcome.visible);
    assert!(t.index.contains(outcome.work.id).await);
}

#[tokio::test]
async fn test_custom_grant_elevates_default_actor() {
    let t = TestCatalog::new().await;
    let trusted = t
        .actor_with_grants("trusted", Role::Default, &[Capability::ElevatedCreate])
        .await;

    let outcome = t.catalog.create_work(draft("Hyperion"), &trusted).await.unwrap();
    assert_eq!(outcome.state, ModerationState::Approved);
}

#[tokio::test]
async fn test_segments_nest_under_earlier_segment() {
    let t = TestCatalog::new().await;
    let contributor = t.actor("contrib", Role::Contributor).await;

    let outcome = t
        .catalog
        .create_work(helpers::segmented_draft("Middlemarch"), &contributor)
        .await
        .unwrap();

    let segments = t.catalog.segments(outcome.work.id).await.unwrap();
    assert_eq!(segments.len(), 3);
    assert_eq!(segments[0].parent_id, None);
    assert_eq!(segments[1].parent_id, Some(segments[0].id));
    assert_eq!(segments[2].parent_id, None);

    // one work cover plus one image per segment
    assert_eq!(t.catalog.images(outcome.work.id).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_invalid_draft_writes_nothing() {
    let t = TestCatalog::new().await;
    let reader = t.actor("reader", Role::Default).await;

    let err = t.catalog.create_work(draft("   "), &reader).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailure);

    let mut bad_isbn = draft("Snow Crash");
    bad_isbn.identifiers = vec![RawIdentifier::new("isbn13", "9780306406158")];
    let err = t.catalog.create_work(bad_isbn, &reader).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailure);

    assert_eq!(t.count("SELECT COUNT(*) FROM works").await, 0);
    assert_eq!(t.count("SELECT COUNT(*) FROM moderation_log").await, 0);
}

// ============================================================================
// Blocking duplicates
// ============================================================================

#[tokio::test]
async fn test_exact_duplicate_rejected_without_write() {
    let t = TestCatalog::new().await;
    let reader = t.actor("reader", Role::Default).await;

    let first = t.catalog.create_work(draft("Dune"), &reader).await.unwrap();
    let err = t.catalog.create_work(draft("  DUNE "), &reader).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DuplicateExact);
    match err {
        CoreError::DuplicateExact { existing } => assert_eq!(existing, first.work.id),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(t.count("SELECT COUNT(*) FROM works").await, 1);
}

#[tokio::test]
async fn test_exact_match_treats_missing_fields_as_wildcards() {
    let t = TestCatalog::new().await;
    let reader = t.actor("reader", Role::Default).await;

    let mut english = draft("Solaris");
    english.language = Some("en".to_string());
    t.catalog.create_work(english, &reader).await.unwrap();

    // No language on the draft matches any language
    let err = t.catalog.create_work(draft("Solaris"), &reader).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateExact);

    // A different language is a different work
    let mut polish = draft("Solaris");
    polish.language = Some("pl".to_string());
    let outcome = t.catalog.create_work(polish, &reader).await.unwrap();
    assert_eq!(outcome.work.language.as_deref(), Some("pl"));
}

#[tokio::test]
async fn test_shared_identifier_rejected() {
    let t = TestCatalog::new().await;
    let reader = t.actor("reader", Role::Default).await;

    let mut first = draft("Foundation");
    first.identifiers = vec![RawIdentifier::new("isbn13", "9780306406157")];
    let first = t.catalog.create_work(first, &reader).await.unwrap();

    let mut second = draft("Second Foundation");
    second.identifiers = vec![RawIdentifier::new("ISBN-13", "978-0-306-40615-7")];
    let err = t.catalog.create_work(second, &reader).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DuplicateIdentifier);
    match err {
        CoreError::DuplicateIdentifier { identifier, existing } => {
            assert_eq!(identifier, "isbn13:9780306406157");
            assert_eq!(existing, vec![first.work.id]);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(t.count("SELECT COUNT(*) FROM works").await, 1);
}

#[tokio::test]
async fn test_asin_identity_includes_region() {
    let t = TestCatalog::new().await;
    let reader = t.actor("reader", Role::Default).await;

    let mut us = draft("Project Hail Mary");
    us.identifiers = vec![RawIdentifier::new("audible-asin", "B08G9PRS1K").with_region("us")];
    t.catalog.create_work(us, &reader).await.unwrap();

    let mut uk = draft("Project Hail Mary (UK)");
    uk.identifiers = vec![RawIdentifier::new("audible-asin", "b08g9prs1k").with_region("UK")];
    t.catalog.create_work(uk, &reader).await.unwrap();

    let mut us_again = draft("Project Hail Mary Unabridged");
    us_again.identifiers = vec![RawIdentifier::new("audible-asin", "B08G9PRS1K").with_region("us")];
    let err = t.catalog.create_work(us_again, &reader).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateIdentifier);
}

// ============================================================================
// Fuzzy duplicates and confirmation
// ============================================================================

#[tokio::test]
async fn test_fuzzy_hit_then_confirm() {
    let t = TestCatalog::new().await;
    let contributor = t.actor("contrib", Role::Contributor).await;
    let reader = t.actor("reader", Role::Default).await;

    let original = t.catalog.create_work(draft("The Name of the Wind"), &contributor).await.unwrap();
    let outcome = t.catalog.create_work(draft("The Name of the Wnd"), &reader).await.unwrap();

    assert_eq!(outcome.state, ModerationState::DuplicateFound);
    assert!(!outcome.visible);
    assert_eq!(outcome.fuzzy_matches[0].work_id, original.work.id);

    let link = outcome.activation_link.expect("duplicate outcome carries a link");
    assert!(link.url.contains("/activate?token="));
    let ttl = link.expires_at - libris_common::time::now();
    assert!(ttl > Duration::hours(23) && ttl <= Duration::hours(24));

    let confirmed = t.catalog.confirm(&link.token).await.unwrap();
    assert!(matches!(confirmed, Confirmation::Approved(_)));
    assert_eq!(confirmed.work().moderation_state, ModerationState::Approved);
    assert!(confirmed.work().enabled);
    assert!(t.index.contains(outcome.work.id).await);

    // Following the link again is benign
    let repeat = t.catalog.confirm(&link.token).await.unwrap();
    assert!(matches!(repeat, Confirmation::AlreadyEnabled(_)));
    assert_eq!(repeat.message(), "Record already enabled");

    let history = t.catalog.history(AuditTarget::new(EntityKind::Work, outcome.work.id)).await.unwrap();
    let actions: Vec<AuditAction> = history.iter().map(|r| r.action).collect();
    assert_eq!(actions, vec![AuditAction::Create, AuditAction::Confirm]);
    assert_eq!(history[1].actor_id, Some(reader.id));
}

#[tokio::test]
async fn test_confirm_rejects_foreign_tokens() {
    let t = TestCatalog::new().await;
    let reader = t.actor("reader", Role::Default).await;
    let work = t.catalog.create_work(draft("Kindred"), &reader).await.unwrap().work;

    let login = t.catalog.tokens().issue_login_link(reader.id);
    let err = t.catalog.confirm(&login.token).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TokenInvalid);

    // Claims for one work spliced onto the signature of another
    let genuine = t
        .catalog
        .tokens()
        .issue(EntityKind::Work, uuid::Uuid::new_v4(), TokenPurpose::CreateConfirm, 60);
    let wanted = t
        .catalog
        .tokens()
        .issue(EntityKind::Work, work.id, TokenPurpose::CreateConfirm, 60);
    let genuine_parts: Vec<&str> = genuine.token.split('.').collect();
    let wanted_parts: Vec<&str> = wanted.token.split('.').collect();
    let forged = format!("{}.{}.{}", wanted_parts[0], wanted_parts[1], genuine_parts[2]);
    let err = t.catalog.confirm(&forged).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TokenInvalid);
    assert_eq!(err.to_string(), "Activation link expired or has an invalid signature");
}

#[tokio::test]
async fn test_confirm_pending_work_is_not_found() {
    let t = TestCatalog::new().await;
    let reader = t.actor("reader", Role::Default).await;
    let work = t.catalog.create_work(draft("Beloved"), &reader).await.unwrap().work;

    let link = t.catalog.tokens().issue_confirm_link(EntityKind::Work, work.id);
    let err = t.catalog.confirm(&link.token).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ============================================================================
// Moderation
// ============================================================================

#[tokio::test]
async fn test_moderator_approve_and_reject() {
    let t = TestCatalog::new().await;
    let reader = t.actor("reader", Role::Default).await;
    let moderator = t.actor("mod", Role::Moderator).await;

    let a = t.catalog.create_work(draft("Ubik"), &reader).await.unwrap().work;
    let b = t.catalog.create_work(draft("Valis"), &reader).await.unwrap().work;

    let approved = t.catalog.moderator_approve(a.id, &moderator).await.unwrap();
    assert_eq!(approved.moderation_state, ModerationState::Approved);
    assert!(approved.enabled);
    assert!(t.index.contains(a.id).await);

    let rejected = t.catalog.moderator_reject(b.id, &moderator).await.unwrap();
    assert_eq!(rejected.moderation_state, ModerationState::Rejected);
    assert!(!rejected.enabled);
    assert!(!t.index.contains(b.id).await);

    // Terminal states accept no further moderation
    let err = t.catalog.moderator_reject(a.id, &moderator).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_moderation_requires_capability() {
    let t = TestCatalog::new().await;
    let reader = t.actor("reader", Role::Default).await;
    let work = t.catalog.create_work(draft("Gormenghast"), &reader).await.unwrap().work;

    let err = t.catalog.moderator_approve(work.id, &reader).await.unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(Capability::Moderate)));

    let reloaded = t.catalog.load_work(work.id).await.unwrap().unwrap();
    assert_eq!(reloaded.moderation_state, ModerationState::Pending);
}

#[tokio::test]
async fn test_flag_duplicate_then_confirm() {
    let t = TestCatalog::new().await;
    let reader = t.actor("reader", Role::Default).await;
    let moderator = t.actor("mod", Role::Moderator).await;
    let work = t.catalog.create_work(draft("Titus Groan"), &reader).await.unwrap().work;

    let flagged = t.catalog.moderator_flag_duplicate(work.id, &moderator).await.unwrap();
    assert_eq!(flagged.work.moderation_state, ModerationState::PendingDuplicate);

    // Only pending works can be flagged
    let err = t.catalog.moderator_flag_duplicate(work.id, &moderator).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let confirmed = t.catalog.confirm(&flagged.activation_link.token).await.unwrap();
    assert_eq!(confirmed.work().moderation_state, ModerationState::Approved);
}

// ============================================================================
// Editing
// ============================================================================

#[tokio::test]
async fn test_update_without_changes_writes_no_record() {
    let t = TestCatalog::new().await;
    let contributor = t.actor("contrib", Role::Contributor).await;
    let work = t.catalog.create_work(draft("Piranesi"), &contributor).await.unwrap().work;

    let patch = WorkPatch {
        title: Some(" Piranesi ".to_string()),
        ..Default::default()
    };
    let outcome = t.catalog.update_work(work.id, patch, &contributor).await.unwrap();

    assert!(!outcome.changed());
    let history = t.catalog.history(AuditTarget::new(EntityKind::Work, work.id)).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_update_records_field_diff() {
    let t = TestCatalog::new().await;
    let contributor = t.actor("contrib", Role::Contributor).await;
    let work = t.catalog.create_work(draft("Jonathan Strange"), &contributor).await.unwrap().work;

    let patch = WorkPatch {
        subtitle: Some(Some("& Mr Norrell".to_string())),
        publisher: Some(Some("Bloomsbury".to_string())),
        ..Default::default()
    };
    let outcome = t.catalog.update_work(work.id, patch, &contributor).await.unwrap();

    let record = outcome.record.expect("changed update is recorded");
    assert_eq!(record.action, AuditAction::Update);
    assert_eq!(record.changes["subtitle"]["from"], serde_json::Value::Null);
    assert_eq!(record.changes["subtitle"]["to"], "& Mr Norrell");
    assert!(record.changes.get("publisher_id").is_some());
    assert!(record.changes.get("title").is_none());

    let reloaded = t.catalog.load_work(work.id).await.unwrap().unwrap();
    assert_eq!(reloaded.subtitle.as_deref(), Some("& Mr Norrell"));
    assert!(reloaded.publisher_id.is_some());
}

#[tokio::test]
async fn test_submitter_may_edit_own_draft_only() {
    let t = TestCatalog::new().await;
    let author = t.actor("author", Role::Default).await;
    let other = t.actor("other", Role::Default).await;
    let moderator = t.actor("mod", Role::Moderator).await;
    let work = t.catalog.create_work(draft("Lud-in-the-Mist"), &author).await.unwrap().work;

    let patch = WorkPatch {
        description: Some(Some("A fairy tale".to_string())),
        ..Default::default()
    };
    assert!(t.catalog.update_work(work.id, patch.clone(), &author).await.is_ok());

    let err = t.catalog.update_work(work.id, patch.clone(), &other).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    // Approval ends the submitter's draft rights
    t.catalog.moderator_approve(work.id, &moderator).await.unwrap();
    let err = t.catalog.update_work(work.id, patch, &author).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

// ============================================================================
// Merging and cancellation
// ============================================================================

#[tokio::test]
async fn test_merge_moves_associations_and_tombstones_source() {
    let t = TestCatalog::new().await;
    let contributor = t.actor("contrib", Role::Contributor).await;
    let moderator = t.actor("mod", Role::Moderator).await;

    let mut source = full_draft("The Tombs of Atuan");
    source.identifiers = vec![RawIdentifier::new("isbn10", "0-306-40615-2")];
    let source = t.catalog.create_work(source, &contributor).await.unwrap().work;
    let target = t.catalog.create_work(draft("Atuan"), &contributor).await.unwrap().work;

    let outcome = t.catalog.merge_works(source.id, target.id, &moderator).await.unwrap();

    assert!(outcome.associations_copied >= 4);
    assert_eq!(outcome.source.merged_into, Some(target.id));
    assert!(!outcome.source.is_live());
    assert_eq!(outcome.tombstone.images, 1);
    assert!(!t.index.contains(source.id).await);

    let mut conn = t.pool().acquire().await.unwrap();
    let keys = libris_core::store::identifiers::keys_for_work(&mut conn, target.id).await.unwrap();
    assert_eq!(keys, vec!["isbn10:0306406152".to_string()]);

    let err = t.catalog.merge_works(target.id, target.id, &moderator).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailure);
}

#[tokio::test]
async fn test_merged_source_cannot_be_restored() {
    let t = TestCatalog::new().await;
    let contributor = t.actor("contrib", Role::Contributor).await;
    let moderator = t.actor("mod", Role::Moderator).await;

    let mut source = draft("The Word for World Is Forest");
    source.identifiers = vec![RawIdentifier::new("isbn13", "978-0-306-40615-7")];
    let source = t.catalog.create_work(source, &contributor).await.unwrap().work;
    let target = t.catalog.create_work(draft("Word for World"), &contributor).await.unwrap().work;
    t.catalog.merge_works(source.id, target.id, &moderator).await.unwrap();

    let err = t.catalog.cascade().restore_work(source.id, &moderator).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // Still merged away, and the identifier belongs to the target alone
    let reloaded = t.catalog.load_work(source.id).await.unwrap().unwrap();
    assert!(!reloaded.is_live());
    assert_eq!(reloaded.merged_into, Some(target.id));
    let live_owners = t
        .count(
            "SELECT COUNT(*) FROM work_identifiers wi JOIN works w ON w.id = wi.work_id \
             WHERE w.deleted_at IS NULL",
        )
        .await;
    assert_eq!(live_owners, 1);

    let history = t.catalog.history(AuditTarget::new(EntityKind::Work, source.id)).await.unwrap();
    assert_eq!(history.last().map(|r| r.action), Some(AuditAction::Merge));
}

#[tokio::test]
async fn test_cancelled_create_rolls_back() {
    let t = TestCatalog::new().await;
    let reader = t.actor("reader", Role::Default).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = t
        .catalog
        .create_work_cancellable(full_draft("The Left Hand of Darkness"), &reader, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Cancelled));
    assert_eq!(t.count("SELECT COUNT(*) FROM works").await, 0);
    assert_eq!(t.count("SELECT COUNT(*) FROM genres").await, 0);
    assert_eq!(t.count("SELECT COUNT(*) FROM moderation_log").await, 0);
}
