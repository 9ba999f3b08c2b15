//! Line-delimited JSON bridge protocol tests.

use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::time::timeout;

use goja_server::ipc;

use super::test_helpers::{coordinator_without_cases, CannedAgent};

struct BridgeClient {
    writer: DuplexStream,
    reader: Lines<BufReader<DuplexStream>>,
}

impl BridgeClient {
    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap();
    }

    async fn read(&mut self) -> Value {
        let line = timeout(Duration::from_secs(5), self.reader.next_line())
            .await
            .expect("timed out waiting for bridge output")
            .expect("bridge read failed")
            .expect("bridge closed");
        serde_json::from_str(&line).expect("bridge emits valid json lines")
    }
}

fn start_bridge() -> BridgeClient {
    let (coordinator, _channels) = coordinator_without_cases(CannedAgent::instant("sure"));
    let (client_writer, server_reader) = tokio::io::duplex(4096);
    let (server_writer, client_reader) = tokio::io::duplex(4096);

    tokio::spawn(async move {
        let _ = ipc::run_bridge(&coordinator, BufReader::new(server_reader), server_writer).await;
    });

    BridgeClient {
        writer: client_writer,
        reader: BufReader::new(client_reader).lines(),
    }
}

#[tokio::test]
async fn begin_returns_a_participant_id() {
    let mut client = start_bridge();
    client.send(r#"{"event": "begin"}"#).await;
    let reply = client.read().await;
    assert_eq!(reply["ok"], true);
    assert!(reply["participant"].is_string());
}

#[tokio::test]
async fn status_probe_answers_ok() {
    let mut client = start_bridge();
    client.send(r#"{"event": "status"}"#).await;
    let reply = client.read().await;
    assert_eq!(reply["ok"], true);
    assert_eq!(reply["data"], "ok");
}

#[tokio::test]
async fn advance_emits_channel_addressed_redirect() {
    let mut client = start_bridge();
    client.send(r#"{"event": "begin"}"#).await;
    let reply = client.read().await;
    let participant = reply["participant"].as_str().unwrap().to_owned();

    client
        .send(&format!(
            r#"{{"event": "bind_channel", "participant": "{participant}"}}"#
        ))
        .await;
    client
        .send(&format!(
            r#"{{"event": "advance_stage", "participant": "{participant}"}}"#
        ))
        .await;

    let message = client.read().await;
    assert_eq!(message["event"], "redirect");
    assert_eq!(
        message["target"],
        format!("?participant={participant}")
    );
    assert!(message["channel"].is_string(), "outbound lines carry the channel id");
}

#[tokio::test]
async fn utterance_round_trip_over_the_bridge() {
    let mut client = start_bridge();
    client.send(r#"{"event": "begin"}"#).await;
    let participant = client.read().await["participant"]
        .as_str()
        .unwrap()
        .to_owned();

    client
        .send(&format!(
            r#"{{"event": "bind_channel", "participant": "{participant}"}}"#
        ))
        .await;
    client
        .send(&format!(
            r#"{{"event": "send_utterance", "participant": "{participant}", "text": "hello"}}"#
        ))
        .await;

    let echo = client.read().await;
    assert_eq!(echo["event"], "utterance");
    assert_eq!(echo["role"], "user");
    assert_eq!(echo["content"], "hello");

    let reply = client.read().await;
    assert_eq!(reply["event"], "utterance");
    assert_eq!(reply["role"], "assistant");
    assert_eq!(reply["content"], "sure");
}

#[tokio::test]
async fn stale_participant_ids_get_an_error_reply() {
    let mut client = start_bridge();
    client
        .send(r#"{"event": "advance_stage", "participant": "stale-id"}"#)
        .await;
    let reply = client.read().await;
    assert_eq!(reply["ok"], false);
    assert!(reply["error"]
        .as_str()
        .unwrap()
        .contains("unknown participant"));
}

#[tokio::test]
async fn malformed_lines_are_rejected_without_closing_the_bridge() {
    let mut client = start_bridge();
    client.send("this is not json").await;
    let reply = client.read().await;
    assert_eq!(reply["ok"], false);

    // The bridge keeps serving afterwards.
    client.send(r#"{"event": "status"}"#).await;
    let reply = client.read().await;
    assert_eq!(reply["ok"], true);
}
