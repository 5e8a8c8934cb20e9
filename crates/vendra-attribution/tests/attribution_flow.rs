//! Integration tests for the attribution engine against a live Postgres.
//!
//! These tests require a database and are ignored by default.
//! Run with: `DATABASE_URL=postgres://... cargo test -p vendra-attribution -- --ignored`

use sqlx::PgPool;

use vendra_attribution::{
    AttributionError, AttributionExecutor, ConsistencyAuditor, ReconciliationEngine, RejectReason,
};
use vendra_db::models::{Client, SimCard, SimStatus};

async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for ignored tests");
    let pool = vendra_db::connect(&url).await.expect("connect to database");
    vendra_db::run_migrations(&pool).await.expect("migrations");
    pool
}

fn unique_number(prefix: &str) -> String {
    format!(
        "{prefix}-{}",
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    )
}

/// Full scenario: attribute, conflict naming the holder, orphan healing.
#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_attribution_scenario() {
    let pool = test_pool().await;
    let executor = AttributionExecutor::new(pool.clone());
    let engine = ReconciliationEngine::new(pool.clone());

    let holder = Client::create(&pool, "Acme Telecom", Some("V-001"))
        .await
        .unwrap();
    let rival = Client::create(&pool, "Borealis SARL", Some("V-002"))
        .await
        .unwrap();
    let number = unique_number("sim");
    SimCard::create(&pool, &number, None).await.unwrap();

    // Attribution succeeds and both sides agree.
    executor.attribute(holder.id, &number, None).await.unwrap();
    let sim = SimCard::find_by_number(&pool, &number).await.unwrap().unwrap();
    assert_eq!(sim.status, SimStatus::Assigned);
    assert_eq!(sim.owner_client_id, Some(holder.id));
    assert_eq!(sim.vendor_code.as_deref(), Some("V-001"));
    let refreshed = Client::find_by_id(&pool, holder.id).await.unwrap().unwrap();
    assert_eq!(refreshed.sim_number.as_deref(), Some(number.as_str()));

    // Re-attribution to the same client is idempotent.
    executor.attribute(holder.id, &number, None).await.unwrap();

    // A rival is rejected with a reason naming the holder.
    let err = executor.attribute(rival.id, &number, None).await.unwrap_err();
    match err {
        AttributionError::Rejected(RejectReason::SimAlreadyAssigned { holder: name, .. }) => {
            assert_eq!(name, "Acme Telecom");
        }
        other => panic!("expected SimAlreadyAssigned, got {other:?}"),
    }

    // Soft-deleting the holder orphans the card; reconcile heals it.
    Client::soft_delete(&pool, holder.id).await.unwrap();
    let stats = engine.reconcile().await.unwrap();
    assert!(stats.orphans_released >= 1);

    let sim = SimCard::find_by_number(&pool, &number).await.unwrap().unwrap();
    assert_eq!(sim.status, SimStatus::Available);
    assert_eq!(sim.owner_client_id, None);
}

/// A client holding one card may not be attributed a second.
#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_second_sim_rejected() {
    let pool = test_pool().await;
    let executor = AttributionExecutor::new(pool.clone());

    let client = Client::create(&pool, "Cassiopeia GmbH", None).await.unwrap();
    let first = unique_number("sim-a");
    let second = unique_number("sim-b");
    SimCard::create(&pool, &first, None).await.unwrap();
    SimCard::create(&pool, &second, None).await.unwrap();

    executor.attribute(client.id, &first, None).await.unwrap();
    let err = executor
        .attribute(client.id, &second, None)
        .await
        .unwrap_err();
    match err {
        AttributionError::Rejected(RejectReason::ClientAlreadyHasSim { current }) => {
            assert_eq!(current, first);
        }
        other => panic!("expected ClientAlreadyHasSim, got {other:?}"),
    }
}

/// Release clears both sides and is a no-op when the client holds nothing.
#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_release_is_symmetric_and_idempotent() {
    let pool = test_pool().await;
    let executor = AttributionExecutor::new(pool.clone());

    let client = Client::create(&pool, "Deneb SAS", Some("V-009")).await.unwrap();
    let number = unique_number("sim");
    SimCard::create(&pool, &number, None).await.unwrap();

    executor.attribute(client.id, &number, None).await.unwrap();
    executor.release(client.id).await.unwrap();

    let sim = SimCard::find_by_number(&pool, &number).await.unwrap().unwrap();
    assert_eq!(sim.status, SimStatus::Available);
    assert_eq!(sim.owner_client_id, None);
    assert_eq!(sim.assigned_at, None);
    let refreshed = Client::find_by_id(&pool, client.id).await.unwrap().unwrap();
    assert_eq!(refreshed.sim_number, None);

    // Second release has nothing to do and still succeeds.
    executor.release(client.id).await.unwrap();
}

/// A second reconcile pass over unchanged state applies zero corrections.
#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_reconcile_idempotent() {
    let pool = test_pool().await;
    let executor = AttributionExecutor::new(pool.clone());
    let engine = ReconciliationEngine::new(pool.clone());

    let client = Client::create(&pool, "Eltanin BV", Some("V-011")).await.unwrap();
    let number = unique_number("sim");
    SimCard::create(&pool, &number, None).await.unwrap();
    executor.attribute(client.id, &number, None).await.unwrap();

    // Disturb one side directly, the way buggy glue code would.
    SimCard::release(&pool, &number).await.unwrap();

    let first = engine.reconcile().await.unwrap();
    assert!(first.total() >= 1);

    let second = engine.reconcile().await.unwrap();
    assert_eq!(second.total(), 0, "second pass must have nothing to repair");
}

/// A restored client with a stale SIM reference must not steal the card
/// back from the client now holding it consistently.
#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_reconcile_restored_client_does_not_steal_card() {
    let pool = test_pool().await;
    let executor = AttributionExecutor::new(pool.clone());
    let engine = ReconciliationEngine::new(pool.clone());

    let first = Client::create(&pool, "Gacrux SA", Some("V-021")).await.unwrap();
    let second = Client::create(&pool, "Hadar AG", Some("V-022")).await.unwrap();
    let number = unique_number("sim");
    SimCard::create(&pool, &number, None).await.unwrap();

    // First client holds the card, then is deleted; reconcile frees the
    // card and the second client picks it up.
    executor.attribute(first.id, &number, None).await.unwrap();
    Client::soft_delete(&pool, first.id).await.unwrap();
    engine.reconcile().await.unwrap();
    executor.attribute(second.id, &number, None).await.unwrap();

    // Restoring the first client brings its stale reference back: two
    // active clients now reference the same card.
    let cutoff = chrono::Utc::now() - chrono::Duration::hours(1);
    assert!(Client::restore(&pool, first.id, cutoff).await.unwrap());
    let stale = Client::find_by_id(&pool, first.id).await.unwrap().unwrap();
    assert_eq!(stale.sim_number.as_deref(), Some(number.as_str()));

    // The consistent pair wins; the stale reference is cleared.
    engine.reconcile().await.unwrap();
    let sim = SimCard::find_by_number(&pool, &number).await.unwrap().unwrap();
    assert_eq!(sim.owner_client_id, Some(second.id));
    let first = Client::find_by_id(&pool, first.id).await.unwrap().unwrap();
    assert_eq!(first.sim_number, None);
    let second = Client::find_by_id(&pool, second.id).await.unwrap().unwrap();
    assert_eq!(second.sim_number.as_deref(), Some(number.as_str()));

    // A further pass leaves the pair alone instead of flip-flopping.
    engine.reconcile().await.unwrap();
    let sim = SimCard::find_by_number(&pool, &number).await.unwrap().unwrap();
    assert_eq!(sim.owner_client_id, Some(second.id));
}

/// Targeted repair releases the cards of a deleted client.
#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_reconcile_one_releases_deleted_clients_card() {
    let pool = test_pool().await;
    let executor = AttributionExecutor::new(pool.clone());
    let engine = ReconciliationEngine::new(pool.clone());

    let client = Client::create(&pool, "Izar Oy", None).await.unwrap();
    let number = unique_number("sim");
    SimCard::create(&pool, &number, None).await.unwrap();
    executor.attribute(client.id, &number, None).await.unwrap();

    Client::soft_delete(&pool, client.id).await.unwrap();
    engine.reconcile_one(client.id).await.unwrap();

    let sim = SimCard::find_by_number(&pool, &number).await.unwrap().unwrap();
    assert_eq!(sim.status, SimStatus::Available);
    assert_eq!(sim.owner_client_id, None);
}

/// Targeted repair clears dangling references and forces existing cards
/// to match the client.
#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_reconcile_one_repairs_client_reference() {
    let pool = test_pool().await;
    let engine = ReconciliationEngine::new(pool.clone());

    let client = Client::create(&pool, "Jabbah SpA", Some("V-031")).await.unwrap();

    // Reference to a card that does not exist is cleared.
    let missing = unique_number("sim-missing");
    Client::set_sim_number(&pool, client.id, Some(&missing)).await.unwrap();
    engine.reconcile_one(client.id).await.unwrap();
    let refreshed = Client::find_by_id(&pool, client.id).await.unwrap().unwrap();
    assert_eq!(refreshed.sim_number, None);

    // Reference to a real but unassigned card is forced onto the card,
    // vendor code included.
    let number = unique_number("sim");
    SimCard::create(&pool, &number, None).await.unwrap();
    Client::set_sim_number(&pool, client.id, Some(&number)).await.unwrap();
    engine.reconcile_one(client.id).await.unwrap();

    let sim = SimCard::find_by_number(&pool, &number).await.unwrap().unwrap();
    assert_eq!(sim.status, SimStatus::Assigned);
    assert_eq!(sim.owner_client_id, Some(client.id));
    assert_eq!(sim.vendor_code.as_deref(), Some("V-031"));
}

/// Two concurrent attributions for the same client admit exactly one card.
#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_concurrent_attributions_same_client() {
    let pool = test_pool().await;
    let executor = AttributionExecutor::new(pool.clone());

    let client = Client::create(&pool, "Kochab KK", None).await.unwrap();
    let first = unique_number("sim-a");
    let second = unique_number("sim-b");
    SimCard::create(&pool, &first, None).await.unwrap();
    SimCard::create(&pool, &second, None).await.unwrap();

    let a = executor.clone();
    let b = executor.clone();
    let (left, right) = tokio::join!(
        a.attribute(client.id, &first, None),
        b.attribute(client.id, &second, None),
    );

    // Exactly one request wins; the loser gets the business rejection.
    assert!(left.is_ok() != right.is_ok(), "exactly one attribution must win");
    let loser = if left.is_ok() { right } else { left };
    match loser.unwrap_err() {
        AttributionError::Rejected(RejectReason::ClientAlreadyHasSim { current }) => {
            assert!(current == first || current == second);
        }
        other => panic!("expected ClientAlreadyHasSim, got {other:?}"),
    }

    // The client holds exactly the winning card; the other stays available.
    let refreshed = Client::find_by_id(&pool, client.id).await.unwrap().unwrap();
    let held = refreshed.sim_number.expect("winner must be recorded");
    let (won, lost) = if held == first {
        (&first, &second)
    } else {
        (&second, &first)
    };
    let winner = SimCard::find_by_number(&pool, won).await.unwrap().unwrap();
    assert_eq!(winner.status, SimStatus::Assigned);
    assert_eq!(winner.owner_client_id, Some(client.id));
    let loser = SimCard::find_by_number(&pool, lost).await.unwrap().unwrap();
    assert_eq!(loser.status, SimStatus::Available);
    assert_eq!(loser.owner_client_id, None);
}

/// The auditor observes drift without repairing it.
#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_audit_reports_without_mutating() {
    let pool = test_pool().await;
    let executor = AttributionExecutor::new(pool.clone());
    let auditor = ConsistencyAuditor::new(pool.clone());

    let client = Client::create(&pool, "Fomalhaut Ltd", None).await.unwrap();
    let number = unique_number("sim");
    SimCard::create(&pool, &number, None).await.unwrap();
    executor.attribute(client.id, &number, None).await.unwrap();

    Client::soft_delete(&pool, client.id).await.unwrap();

    let report = auditor.audit().await.unwrap();
    assert!(report.orphaned_sims >= 1);
    assert!(report.orphan_samples.iter().any(|n| n == &number));

    // Still drifted: the audit must not have repaired anything.
    let sim = SimCard::find_by_number(&pool, &number).await.unwrap().unwrap();
    assert_eq!(sim.status, SimStatus::Assigned);
}
