//! Dialog flow: echo, background replies, reconnects, isolation.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use goja_server::models::outbound::Outbound;
use goja_server::models::record::Role;

use super::test_helpers::{
    assert_silent, connect, coordinator_without_cases, recv, CannedAgent, DownAgent, EchoAgent,
};

fn expect_utterance(message: Outbound) -> (Role, String) {
    match message {
        Outbound::Utterance { role, content } => (role, content),
        other => panic!("expected utterance, got {other:?}"),
    }
}

#[tokio::test]
async fn utterance_is_echoed_then_answered() {
    let (coordinator, channels) = coordinator_without_cases(CannedAgent::instant("hi there"));
    let participant = coordinator.begin().await.unwrap();
    let (channel, mut rx) = connect(&channels).await;
    coordinator
        .bind_channel(&participant, channel)
        .await
        .unwrap();

    coordinator
        .send_utterance(&participant, "hello")
        .await
        .unwrap();

    let (role, content) = expect_utterance(recv(&mut rx).await);
    assert_eq!(role, Role::User);
    assert_eq!(content, "hello");

    let (role, content) = expect_utterance(recv(&mut rx).await);
    assert_eq!(role, Role::Assistant);
    assert_eq!(content, "hi there");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn late_reply_lands_on_the_rebound_channel() {
    let agent = CannedAgent::slow("delayed reply", Duration::from_millis(200));
    let (coordinator, channels) = coordinator_without_cases(agent);
    let participant = coordinator.begin().await.unwrap();

    let (old_channel, mut old_rx) = connect(&channels).await;
    coordinator
        .bind_channel(&participant, old_channel)
        .await
        .unwrap();
    coordinator
        .send_utterance(&participant, "hello")
        .await
        .unwrap();

    // The echo goes to the old channel before the reconnect.
    let (role, _) = expect_utterance(recv(&mut old_rx).await);
    assert_eq!(role, Role::User);

    // Reconnect while the agent is still thinking.
    let (new_channel, mut new_rx) = connect(&channels).await;
    coordinator
        .bind_channel(&participant, new_channel)
        .await
        .unwrap();

    let (role, content) = expect_utterance(recv(&mut new_rx).await);
    assert_eq!(role, Role::Assistant);
    assert_eq!(content, "delayed reply");
    assert_silent(&mut old_rx);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_participants_have_isolated_transcripts() {
    let (coordinator, channels) = coordinator_without_cases(Arc::new(EchoAgent));

    let mut handles = Vec::new();
    for turn in 0..4_usize {
        let coordinator = Arc::clone(&coordinator);
        let channels = Arc::clone(&channels);
        handles.push(tokio::spawn(async move {
            let participant = coordinator.begin().await.unwrap();
            let (channel, mut rx) = connect(&channels).await;
            coordinator
                .bind_channel(&participant, channel)
                .await
                .unwrap();
            let text = format!("message from participant {turn}");
            coordinator.send_utterance(&participant, &text).await.unwrap();

            let (_, echoed) = expect_utterance(recv(&mut rx).await);
            assert_eq!(echoed, text);
            let (role, reply) = expect_utterance(recv(&mut rx).await);
            assert_eq!(role, Role::Assistant);
            assert_eq!(reply, format!("echo: {text}"), "reply reflects only this transcript");
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn history_replays_in_conversation_order() {
    let (coordinator, channels) = coordinator_without_cases(CannedAgent::instant("reply"));
    let participant = coordinator.begin().await.unwrap();
    let (channel, mut rx) = connect(&channels).await;
    coordinator
        .bind_channel(&participant, channel)
        .await
        .unwrap();

    coordinator
        .send_utterance(&participant, "first")
        .await
        .unwrap();
    // Drain echo + reply so the transcript is settled.
    let _ = recv(&mut rx).await;
    let _ = recv(&mut rx).await;

    coordinator.request_history(&participant).await.unwrap();
    let (role, content) = expect_utterance(recv(&mut rx).await);
    assert_eq!((role, content.as_str()), (Role::User, "first"));
    let (role, content) = expect_utterance(recv(&mut rx).await);
    assert_eq!((role, content.as_str()), (Role::Assistant, "reply"));
}

#[tokio::test(start_paused = true)]
async fn agent_failure_retries_once_then_gives_up() {
    let agent = Arc::new(DownAgent::default());
    let (coordinator, channels) = coordinator_without_cases(Arc::clone(&agent) as _);
    let participant = coordinator.begin().await.unwrap();
    let (channel, mut rx) = connect(&channels).await;
    coordinator
        .bind_channel(&participant, channel)
        .await
        .unwrap();

    coordinator
        .send_utterance(&participant, "anyone there?")
        .await
        .unwrap();
    let (role, _) = expect_utterance(recv(&mut rx).await);
    assert_eq!(role, Role::User);

    // Let the background task run through its single retry (virtual time).
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(agent.calls.load(Ordering::SeqCst), 2, "exactly one retry");
    assert_silent(&mut rx);

    // The transcript holds only the user entry; no phantom assistant turn.
    coordinator.request_history(&participant).await.unwrap();
    let (role, _) = expect_utterance(recv(&mut rx).await);
    assert_eq!(role, Role::User);
    assert_silent(&mut rx);
}

#[tokio::test(start_paused = true)]
async fn reply_with_no_bound_channel_is_dropped_not_queued() {
    let (coordinator, channels) = coordinator_without_cases(CannedAgent::instant("reply"));
    let participant = coordinator.begin().await.unwrap();

    // No bind_channel: echo and reply have nowhere to go. Virtual time
    // drives the background reply task to completion before the bind.
    coordinator
        .send_utterance(&participant, "hello")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    // A channel bound afterwards receives nothing until history is asked for.
    let (channel, mut rx) = connect(&channels).await;
    coordinator
        .bind_channel(&participant, channel)
        .await
        .unwrap();
    assert_silent(&mut rx);

    coordinator.request_history(&participant).await.unwrap();
    let (role, _) = expect_utterance(recv(&mut rx).await);
    assert_eq!(role, Role::User);
    let (role, content) = expect_utterance(recv(&mut rx).await);
    assert_eq!((role, content.as_str()), (Role::Assistant, "reply"));
}
