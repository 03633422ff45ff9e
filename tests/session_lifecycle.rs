//! Integration tests for the session registry's concurrency guarantees.
//!
//! Uses the in-memory gateway's create gate to script interleavings:
//! holding creations open pins every start in its in-flight state, so races
//! between starts, ends, and failures can be exercised deterministically.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use session_aide::adapters::memory::{InMemoryChannelGateway, RecordingReplySink, ReplyEvent};
use session_aide::application::{
    Participant, SessionAction, SessionCommand, SessionError, SessionRegistry,
};
use session_aide::domain::{ChannelId, ContainerId, GuildId, UserId};
use session_aide::ports::{ChannelGateway, GatewayError, ReplySink};

const GUILD: u64 = 1;
const CONTAINER: u64 = 555;

fn registry_with_gateway() -> (Arc<SessionRegistry>, Arc<InMemoryChannelGateway>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let gateway = Arc::new(InMemoryChannelGateway::new());
    let registry = Arc::new(SessionRegistry::new(
        GuildId::new(GUILD),
        ContainerId::new(CONTAINER),
        "session",
        Arc::clone(&gateway) as Arc<dyn ChannelGateway>,
    ));
    (registry, gateway)
}

fn command(
    action: SessionAction,
    issuer: (u64, &str),
    target: (u64, &str),
    sink: &Arc<RecordingReplySink>,
) -> SessionCommand {
    SessionCommand {
        action,
        guild: GuildId::new(GUILD),
        issuer: Participant::new(issuer.0, issuer.1),
        target: Participant::new(target.0, target.1),
        origin_channel: None,
        reply: Arc::clone(sink) as Arc<dyn ReplySink>,
    }
}

fn self_start(user: u64, sink: &Arc<RecordingReplySink>) -> SessionCommand {
    command(SessionAction::Start, (user, "user"), (user, "user"), sink)
}

fn self_end(user: u64, sink: &Arc<RecordingReplySink>) -> SessionCommand {
    command(SessionAction::End, (user, "user"), (user, "user"), sink)
}

fn counted<'a>(
    sinks: impl IntoIterator<Item = &'a Arc<RecordingReplySink>>,
    needle: &str,
) -> usize {
    sinks
        .into_iter()
        .filter(|sink| {
            sink.final_text()
                .map(|text| text.contains(needle))
                .unwrap_or(false)
        })
        .count()
}

// Scenario A: a fresh start creates a channel, an immediate second start for
// the same user reports the existing one.
#[tokio::test]
async fn start_then_second_start_reports_existing_session() {
    let (registry, gateway) = registry_with_gateway();

    let first = Arc::new(RecordingReplySink::new());
    registry.start(&self_start(42, &first)).await.unwrap();

    assert_eq!(gateway.create_calls().len(), 1);
    assert_eq!(gateway.create_calls()[0].name, "session-1");
    assert_eq!(
        first.events(),
        vec![
            ReplyEvent::Deferred { ephemeral: false },
            ReplyEvent::Edited {
                text: "Your new session is ready: <#1001>".to_string()
            },
        ]
    );

    let second = Arc::new(RecordingReplySink::new());
    registry.start(&self_start(42, &second)).await.unwrap();

    assert_eq!(gateway.create_calls().len(), 1);
    assert_eq!(
        second.events(),
        vec![ReplyEvent::Replied {
            text: "You already have an active session: <#1001>".to_string(),
            ephemeral: true,
        }]
    );
}

// Scenario B: an admin start and a self start race; exactly one channel is
// created, exactly one caller is told "new", both point at the same channel.
#[tokio::test]
async fn concurrent_starts_for_the_same_user_create_one_channel() {
    let (registry, gateway) = registry_with_gateway();
    gateway.hold_creates(true);

    let admin_sink = Arc::new(RecordingReplySink::new());
    let user_sink = Arc::new(RecordingReplySink::new());

    let admin_task = {
        let registry = Arc::clone(&registry);
        let cmd = command(SessionAction::Start, (7, "mod"), (42, "dax"), &admin_sink);
        tokio::spawn(async move { registry.start(&cmd).await })
    };
    let user_task = {
        let registry = Arc::clone(&registry);
        let cmd = self_start(42, &user_sink);
        tokio::spawn(async move { registry.start(&cmd).await })
    };

    // Both commands are in flight; the single creation is parked.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(gateway.create_calls().is_empty());

    gateway.hold_creates(false);
    admin_task.await.unwrap().unwrap();
    user_task.await.unwrap().unwrap();

    assert_eq!(gateway.create_calls().len(), 1);
    assert_eq!(gateway.create_calls()[0].name, "session-1");

    let sinks = [&admin_sink, &user_sink];
    assert_eq!(counted(sinks, "new session is ready"), 1);
    assert_eq!(counted(sinks, "already ha"), 1);
    // Both acknowledgments reference the same channel.
    assert_eq!(counted(sinks, "<#1001>"), 2);
}

// Scenario C: two concurrent ends; exactly one delete reaches the gateway.
#[tokio::test]
async fn concurrent_ends_delete_exactly_once() {
    let (registry, gateway) = registry_with_gateway();

    let setup = Arc::new(RecordingReplySink::new());
    registry.start(&self_start(42, &setup)).await.unwrap();

    let first = Arc::new(RecordingReplySink::new());
    let second = Arc::new(RecordingReplySink::new());

    let tasks = [&first, &second].map(|sink| {
        let registry = Arc::clone(&registry);
        let cmd = self_end(42, sink);
        tokio::spawn(async move { registry.end(&cmd).await })
    });
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(gateway.delete_calls().len(), 1);
    let sinks = [&first, &second];
    assert_eq!(counted(sinks, "successfully ended"), 1);
    assert_eq!(counted(sinks, "do not have an active session"), 1);
}

// Scenario D: a failed creation is reported, clears the slot, and a retry
// succeeds with a strictly greater counter value.
#[tokio::test]
async fn failed_creation_clears_the_slot_and_allows_retry() {
    let (registry, gateway) = registry_with_gateway();
    gateway.fail_next_create(GatewayError::rejected("missing permission"));

    let failed = Arc::new(RecordingReplySink::new());
    let err = registry.start(&self_start(42, &failed)).await.unwrap_err();
    assert!(matches!(err, SessionError::Gateway(_)));
    assert_eq!(
        failed.final_text().as_deref(),
        Some("Something went wrong while creating the session. Please try again.")
    );
    assert_eq!(registry.active_sessions(), 0);

    let retry = Arc::new(RecordingReplySink::new());
    registry.start(&self_start(42, &retry)).await.unwrap();

    // The counter is never reused: the retry's channel carries a greater value.
    assert_eq!(gateway.create_calls().len(), 1);
    assert_eq!(gateway.create_calls()[0].name, "session-2");
    assert!(retry
        .final_text()
        .unwrap()
        .contains("new session is ready"));
}

// A creation failure is broadcast: the racing caller that lost the insert is
// also told about the failure, not left hanging.
#[tokio::test]
async fn creation_failure_reaches_concurrent_waiters() {
    let (registry, gateway) = registry_with_gateway();
    gateway.hold_creates(true);
    gateway.fail_next_create(GatewayError::transport("connection reset"));

    let winner = Arc::new(RecordingReplySink::new());
    let loser = Arc::new(RecordingReplySink::new());

    let winner_task = {
        let registry = Arc::clone(&registry);
        let cmd = self_start(42, &winner);
        tokio::spawn(async move { registry.start(&cmd).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let loser_task = {
        let registry = Arc::clone(&registry);
        let cmd = self_start(42, &loser);
        tokio::spawn(async move { registry.start(&cmd).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    gateway.hold_creates(false);
    assert!(winner_task.await.unwrap().is_err());
    assert!(loser_task.await.unwrap().is_err());

    for sink in [&winner, &loser] {
        assert!(sink.final_text().unwrap().contains("Something went wrong"));
    }
    assert_eq!(registry.active_sessions(), 0);
}

// Ending a session whose in-flight creation fails deletes nothing: the
// issuer is told there is no active session and the gateway error surfaces.
#[tokio::test]
async fn end_against_a_failed_creation_deletes_nothing() {
    let (registry, gateway) = registry_with_gateway();
    gateway.hold_creates(true);
    gateway.fail_next_create(GatewayError::rejected("missing permission"));

    let start_sink = Arc::new(RecordingReplySink::new());
    let start_task = {
        let registry = Arc::clone(&registry);
        let cmd = self_start(42, &start_sink);
        tokio::spawn(async move { registry.start(&cmd).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let end_sink = Arc::new(RecordingReplySink::new());
    let end_task = {
        let registry = Arc::clone(&registry);
        let cmd = self_end(42, &end_sink);
        tokio::spawn(async move { registry.end(&cmd).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    gateway.hold_creates(false);
    assert!(start_task.await.unwrap().is_err());
    let err = end_task.await.unwrap().unwrap_err();
    assert!(matches!(err, SessionError::Gateway(_)));

    assert!(gateway.delete_calls().is_empty());
    assert_eq!(
        end_sink.final_text().as_deref(),
        Some("You do not have an active session")
    );
    assert_eq!(registry.active_sessions(), 0);
}

// Ending a session whose creation is still in flight waits for the channel
// id and deletes it; nothing is orphaned.
#[tokio::test]
async fn end_during_in_flight_creation_deletes_the_created_channel() {
    let (registry, gateway) = registry_with_gateway();
    gateway.hold_creates(true);

    let start_sink = Arc::new(RecordingReplySink::new());
    let start_task = {
        let registry = Arc::clone(&registry);
        let cmd = self_start(42, &start_sink);
        tokio::spawn(async move { registry.start(&cmd).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let end_sink = Arc::new(RecordingReplySink::new());
    let end_task = {
        let registry = Arc::clone(&registry);
        let cmd = self_end(42, &end_sink);
        tokio::spawn(async move { registry.end(&cmd).await })
    };

    // The end removed the entry but must not delete before creation resolves.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(gateway.delete_calls().is_empty());

    gateway.hold_creates(false);
    start_task.await.unwrap().unwrap();
    end_task.await.unwrap().unwrap();

    let created = gateway.create_calls()[0].channel;
    assert_eq!(gateway.delete_calls().len(), 1);
    assert_eq!(gateway.delete_calls()[0].channel, created);
    assert!(!gateway.channel_exists(created));
    assert_eq!(registry.active_sessions(), 0);
}

// Users never block on each other's gateway latency.
#[tokio::test]
async fn other_users_progress_while_a_creation_is_parked() {
    let (registry, gateway) = registry_with_gateway();
    gateway.hold_creates(true);

    let parked_sink = Arc::new(RecordingReplySink::new());
    let parked = {
        let registry = Arc::clone(&registry);
        let cmd = self_start(1, &parked_sink);
        tokio::spawn(async move { registry.start(&cmd).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    // An unrelated user's end completes while user 1's creation is parked.
    let other_sink = Arc::new(RecordingReplySink::new());
    tokio::time::timeout(
        Duration::from_secs(1),
        registry.end(&self_end(2, &other_sink)),
    )
    .await
    .expect("end for an unrelated user must not wait on the parked creation")
    .unwrap();
    assert_eq!(
        other_sink.final_text().as_deref(),
        Some("You do not have an active session")
    );

    gateway.hold_creates(false);
    parked.await.unwrap().unwrap();
}

// Replying into the channel that was just deleted is suppressed.
#[tokio::test]
async fn acknowledgment_is_suppressed_when_issued_from_the_deleted_channel() {
    let (registry, gateway) = registry_with_gateway();

    let setup = Arc::new(RecordingReplySink::new());
    registry.start(&self_start(42, &setup)).await.unwrap();
    let channel = gateway.create_calls()[0].channel;

    let sink = Arc::new(RecordingReplySink::new());
    let mut cmd = self_end(42, &sink);
    cmd.origin_channel = Some(channel);
    registry.end(&cmd).await.unwrap();

    assert_eq!(gateway.delete_calls().len(), 1);
    // Deferred, but never edited: the target channel is gone.
    assert_eq!(sink.events(), vec![ReplyEvent::Deferred { ephemeral: false }]);
}

// A failed delete is reported and the entry stays removed.
#[tokio::test]
async fn failed_delete_reports_and_keeps_the_entry_removed() {
    let (registry, gateway) = registry_with_gateway();

    let setup = Arc::new(RecordingReplySink::new());
    registry.start(&self_start(42, &setup)).await.unwrap();

    gateway.fail_next_delete(GatewayError::transport("connection reset"));
    let sink = Arc::new(RecordingReplySink::new());
    let err = registry.end(&self_end(42, &sink)).await.unwrap_err();
    assert!(matches!(err, SessionError::Gateway(_)));
    assert_eq!(
        sink.final_text().as_deref(),
        Some("Something went wrong while ending the session.")
    );

    // Deletion is not retried; the user no longer has a session entry.
    let again = Arc::new(RecordingReplySink::new());
    registry.end(&self_end(42, &again)).await.unwrap();
    assert_eq!(
        again.final_text().as_deref(),
        Some("You do not have an active session")
    );
}

// Seeding indexes pre-existing channels by owner; a start then reports the
// existing session without touching the gateway.
#[tokio::test]
async fn seeding_indexes_existing_channels_by_owner() {
    let (registry, gateway) = registry_with_gateway();
    gateway.add_existing_channel(
        ContainerId::new(CONTAINER),
        ChannelId::new(900),
        UserId::new(42),
    );

    registry.seed().await;
    assert_eq!(registry.active_sessions(), 1);

    let sink = Arc::new(RecordingReplySink::new());
    registry.start(&self_start(42, &sink)).await.unwrap();
    assert!(gateway.create_calls().is_empty());
    assert_eq!(
        sink.final_text().as_deref(),
        Some("You already have an active session: <#900>")
    );
}

// Two listed channels claiming the same owner: the first one seen wins and
// the user still holds exactly one session.
#[tokio::test]
async fn seeding_keeps_one_entry_per_owner_on_duplicates() {
    let (registry, gateway) = registry_with_gateway();
    gateway.add_existing_channel(
        ContainerId::new(CONTAINER),
        ChannelId::new(900),
        UserId::new(42),
    );
    gateway.add_existing_channel(
        ContainerId::new(CONTAINER),
        ChannelId::new(901),
        UserId::new(42),
    );

    registry.seed().await;
    assert_eq!(registry.active_sessions(), 1);

    let sink = Arc::new(RecordingReplySink::new());
    registry.start(&self_start(42, &sink)).await.unwrap();
    assert!(gateway.create_calls().is_empty());
    assert!(sink
        .final_text()
        .unwrap()
        .contains("You already have an active session"));
}

// An end after a completed start deletes the channel, and the next start
// gets a strictly greater counter value.
#[tokio::test]
async fn restart_after_end_creates_a_fresh_channel() {
    let (registry, gateway) = registry_with_gateway();

    let sinks: Vec<_> = (0..3).map(|_| Arc::new(RecordingReplySink::new())).collect();
    registry.start(&self_start(42, &sinks[0])).await.unwrap();
    registry.end(&self_end(42, &sinks[1])).await.unwrap();
    registry.start(&self_start(42, &sinks[2])).await.unwrap();

    let calls = gateway.create_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].name, "session-1");
    assert_eq!(calls[1].name, "session-2");
    assert_ne!(calls[0].channel, calls[1].channel);
    assert!(!gateway.channel_exists(calls[0].channel));
    assert!(gateway.channel_exists(calls[1].channel));
}

// Audit reasons name the issuer, and the target when acting on their behalf.
#[tokio::test]
async fn gateway_calls_carry_audit_reasons() {
    let (registry, gateway) = registry_with_gateway();

    let start_sink = Arc::new(RecordingReplySink::new());
    let cmd = command(
        SessionAction::Start,
        (7, "mod"),
        (42, "dax"),
        &start_sink,
    );
    registry.start(&cmd).await.unwrap();
    assert_eq!(
        gateway.create_calls()[0].reason,
        "Requested by mod (7) on behalf of dax (42)"
    );

    let end_sink = Arc::new(RecordingReplySink::new());
    registry.end(&self_end(42, &end_sink)).await.unwrap();
    assert_eq!(gateway.delete_calls()[0].reason, "Requested by user (42)");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    // For any set of users each issuing several concurrent starts, exactly
    // one channel is created per user and exactly one caller per user is
    // told "new".
    #[test]
    fn concurrent_start_batches_create_one_channel_per_user(
        starts_per_user in proptest::collection::vec(1usize..4, 1..6),
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let (registry, gateway) = registry_with_gateway();
            gateway.hold_creates(true);

            let mut tasks = Vec::new();
            let mut sinks: Vec<(u64, Vec<Arc<RecordingReplySink>>)> = Vec::new();

            for (index, count) in starts_per_user.iter().enumerate() {
                let user = 100 + index as u64;
                let mut user_sinks = Vec::new();
                for _ in 0..*count {
                    let sink = Arc::new(RecordingReplySink::new());
                    let cmd = self_start(user, &sink);
                    let registry = Arc::clone(&registry);
                    tasks.push(tokio::spawn(async move { registry.start(&cmd).await }));
                    user_sinks.push(sink);
                }
                sinks.push((user, user_sinks));
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
            gateway.hold_creates(false);
            for outcome in futures::future::join_all(tasks).await {
                outcome.unwrap().unwrap();
            }

            assert_eq!(gateway.create_calls().len(), starts_per_user.len());
            for (user, user_sinks) in &sinks {
                let fresh = counted(user_sinks.iter(), "new session is ready");
                assert_eq!(fresh, 1, "user {user} must get exactly one fresh session");
            }
        });
    }
}
