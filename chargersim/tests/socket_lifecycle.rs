//! End-to-end transaction lifecycle over the socket transport: a stub
//! central system accepts the WebSocket connection, answers the
//! simulator's calls and issues the remote start/stop commands.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use chargersim::ocpp::{Action, Frame};
use chargersim::{ChargerSimulator, SimulatorConfig};

#[derive(Debug)]
enum Event {
    /// A call issued by the charge point.
    Call(Action, Value),
    /// The charge point's reply to one of our commands.
    Reply(Value),
}

fn canned_reply(action: Action) -> Value {
    match action {
        Action::BootNotification => json!({
            "status": "Accepted",
            "currentTime": "2026-03-01T00:00:00Z",
            "interval": 300,
        }),
        Action::StartTransaction => json!({"transactionId": 99}),
        Action::Heartbeat => json!({"currentTime": "2026-03-01T00:00:00Z"}),
        _ => json!({}),
    }
}

/// Accept one connection and run the central system's side of the
/// scenario: boot, remote start, two meter samples, remote stop.
async fn run_central_system(
    listener: tokio::net::TcpListener,
    events: mpsc::UnboundedSender<Event>,
) {
    let (stream, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

    let mut meter_samples = 0usize;
    let mut started = false;

    while let Some(message) = ws.next().await {
        let text = match message.unwrap() {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        match Frame::parse(&text).unwrap() {
            Frame::Call {
                message_id,
                action,
                payload,
            } => {
                events.send(Event::Call(action, payload)).unwrap();
                let reply = Frame::result(message_id, canned_reply(action));
                ws.send(Message::Text(reply.encode().unwrap())).await.unwrap();

                match action {
                    Action::BootNotification => {
                        let command = Frame::call(
                            Action::RemoteStartTransaction,
                            json!({"connectorId": 1, "idTag": "123456"}),
                        );
                        ws.send(Message::Text(command.encode().unwrap())).await.unwrap();
                    }
                    Action::StartTransaction => started = true,
                    Action::MeterValues if started => {
                        meter_samples += 1;
                        if meter_samples == 2 {
                            let command = Frame::call(
                                Action::RemoteStopTransaction,
                                json!({"transactionId": 99}),
                            );
                            ws.send(Message::Text(command.encode().unwrap())).await.unwrap();
                        }
                    }
                    Action::StopTransaction => return,
                    _ => {}
                }
            }
            Frame::CallResult { payload, .. } => {
                events.send(Event::Reply(payload)).unwrap();
            }
            Frame::CallError { description, .. } => {
                panic!("unexpected error frame: {description}");
            }
        }
    }
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("central system stub ended early")
}

/// Drain events until the next charge-point call of the given action,
/// skipping heartbeats and collecting command replies on the side.
async fn next_call_of(
    events: &mut mpsc::UnboundedReceiver<Event>,
    wanted: Action,
    replies: &mut Vec<Value>,
) -> Value {
    loop {
        match next_event(events).await {
            Event::Call(action, payload) if action == wanted => return payload,
            Event::Call(Action::Heartbeat, _) | Event::Call(Action::MeterValues, _) => {}
            Event::Reply(payload) => replies.push(payload),
            Event::Call(action, _) => panic!("unexpected call {action}"),
        }
    }
}

#[tokio::test]
async fn remote_lifecycle_over_socket() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let (event_tx, mut events) = mpsc::unbounded_channel();

    let central_system = tokio::spawn(run_central_system(listener, event_tx));

    let config = SimulatorConfig::new(format!("ws://{address}"), "test")
        .with_delays(Duration::ZERO, Duration::ZERO)
        .with_meter_interval(Duration::from_millis(30))
        .with_heartbeat_interval(Duration::from_secs(300))
        .without_traffic_log();
    let mut simulator = ChargerSimulator::new(config);
    simulator.start().await.unwrap();

    let mut replies = Vec::new();

    // Boot happens on start; its payload carries vendor and model.
    let boot = next_call_of(&mut events, Action::BootNotification, &mut replies).await;
    assert_eq!(boot["chargePointVendor"], "Test");
    assert_eq!(boot["chargePointModel"], "1");

    // The remote start triggers exactly one StartTransaction with a fresh
    // meter.
    let start = next_call_of(&mut events, Action::StartTransaction, &mut replies).await;
    assert_eq!(start["connectorId"], 1);
    assert_eq!(start["idTag"], "123456");
    assert_eq!(start["meterStart"], 0);

    // After two samples the stub stops the transaction; the accumulated
    // energy arrives in meterStop.
    let stop = next_call_of(&mut events, Action::StopTransaction, &mut replies).await;
    assert_eq!(stop["transactionId"], 99);
    // Two samples of 20 or 30 Wh, with room for one more tick landing
    // before the stop is processed.
    let meter_stop = stop["meterStop"].as_i64().unwrap();
    assert!(
        (40..=90).contains(&meter_stop),
        "accumulated energy out of range: {meter_stop}"
    );

    // Both remote commands were answered with Accepted.
    central_system.await.unwrap();
    while let Ok(event) = events.try_recv() {
        if let Event::Reply(payload) = event {
            replies.push(payload);
        }
    }
    assert_eq!(replies.len(), 2, "one reply per remote command");
    for reply in replies {
        assert_eq!(reply, json!({"status": "Accepted"}));
    }

    simulator.disconnect();
}
