//! # Socket Flows
//!
//! Socket buses over in-memory channels. The wired tests connect a client
//! bus and a server bus back to back, forwarding every text frame.
//!
//! ## Flows Tested:
//!
//! 1. **Wire round trip**: JSON frames in both directions
//! 2. **Socket error**: in-flight calls reject with `MessageBusError`, bus stays usable
//! 3. **Socket close**: in-flight calls reject with `MessageBusClosed`
//! 4. **Frame filtering**: oversized and malformed frames are dropped

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use rpc_bus::{BusConfig, CallFactory, MessageBus, SocketBus, SocketPeer};
    use rpc_types::{Empty, Envelope, ErrorCode, FixedClock};
    use serde_json::json;
    use std::sync::Arc;
    use tokio::task::JoinHandle;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    enum Frame {
        ToServer(String),
        ToClient(String),
    }

    /// Forward every frame one bus writes into the other bus.
    fn wire(mut client: SocketPeer, mut server: SocketPeer) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    Some(text) = client.next_sent() => Frame::ToServer(text),
                    Some(text) = server.next_sent() => Frame::ToClient(text),
                    else => break,
                };
                let delivered = match frame {
                    Frame::ToServer(text) => server.push_text(text),
                    Frame::ToClient(text) => client.push_text(text),
                };
                if !delivered {
                    break;
                }
            }
        })
    }

    struct Wired {
        client_bus: Arc<SocketBus>,
        server_bus: Arc<SocketBus>,
        client: CallFactory,
        forwarder: JoinHandle<()>,
    }

    fn wired() -> Wired {
        let (client_bus, client_peer) = SocketBus::channel();
        let (server_bus, server_peer) = SocketBus::channel();
        serve_all(server_bus.clone());
        let forwarder = wire(client_peer, server_peer);
        Wired {
            client: CallFactory::new(client_bus.clone()),
            client_bus,
            server_bus,
            forwarder,
        }
    }

    // =============================================================================
    // WIRE ROUND TRIP
    // =============================================================================

    #[tokio::test]
    async fn test_round_trip_over_wire() {
        let wired = wired();

        let stats = wired.client.client::<Statistics>().call(Empty {}).await.unwrap();
        assert_eq!(stats.uptime, 1234);

        let err = wired
            .client
            .client::<ModelLoad>()
            .call(ModelLoadRequest {
                model_id: String::new(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.error_id(), MODEL_ID_INVALID);

        assert_eq!(wired.client_bus.listener_count(), 0);
        assert_eq!(wired.server_bus.listener_count(), 3);
        assert_ne!(wired.client_bus.connection_id(), wired.server_bus.connection_id());
        wired.forwarder.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_concurrent_calls_over_wire() {
        let wired = wired();
        let echo = wired.client.client::<Echo>();

        let handles: Vec<_> = (0..50u64)
            .map(|seq| {
                let echo = echo.clone();
                tokio::spawn(async move {
                    echo.call(EchoRequest {
                        seq,
                        delay_ms: seq % 7,
                    })
                    .await
                })
            })
            .collect();

        for (seq, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap().unwrap().seq, seq as u64);
        }
        assert_eq!(wired.client_bus.listener_count(), 0);
        wired.forwarder.abort();
    }

    // =============================================================================
    // TRANSPORT FAILURES
    // =============================================================================

    #[tokio::test]
    async fn test_socket_error_rejects_in_flight_calls() {
        let (bus, mut peer) = SocketBus::channel();
        let client = CallFactory::new(bus.clone());
        let unanswered = client.client::<Unanswered>();

        let call = unanswered.clone();
        let pending = tokio::spawn(async move { call.call(Empty {}).await });
        let request = peer.next_envelope().await.expect("request");

        peer.push_error("connection reset by peer");
        let err = pending.await.unwrap().unwrap_err();

        assert_eq!(err.code(), Some(ErrorCode::MessageBusError));
        assert_eq!(err.message(), "Message bus error.");
        assert_eq!(err.request_id, request.request_id);
        assert_eq!(err.thrown_by.as_deref(), Some("connection reset by peer"));
        assert!(!bus.is_closed());

        // Still writable after the error
        let call = unanswered.clone();
        let pending = tokio::spawn(async move { call.call(Empty {}).await });
        let next = peer.next_envelope().await.expect("request");
        assert!(next.is_request("Unanswered"));
        assert_ne!(next.request_id, request.request_id);
        pending.abort();
    }

    #[tokio::test]
    async fn test_socket_close_rejects_in_flight_calls() {
        let (bus, mut peer) = SocketBus::channel();
        let client = CallFactory::new(bus.clone());

        let call = client.client::<Unanswered>();
        let pending = tokio::spawn(async move { call.call(Empty {}).await });
        peer.next_envelope().await.expect("request");

        peer.push_close();
        let err = pending.await.unwrap().unwrap_err();

        assert_eq!(err.code(), Some(ErrorCode::MessageBusClosed));
        assert!(bus.is_closed());
        assert_eq!(bus.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_oversized_and_malformed_frames_dropped() {
        let config = BusConfig {
            max_message_size: 256,
            ..BusConfig::default()
        };
        let (bus, mut peer) = SocketBus::channel_with_config(&config);
        let client = CallFactory::new(bus.clone()).with_config(config);

        let call = client.client::<ModelLoad>();
        let pending = tokio::spawn(async move {
            call.call(ModelLoadRequest {
                model_id: "alpha".to_string(),
            })
            .await
        });
        let request = peer.next_envelope().await.expect("request");
        let clock = FixedClock::new(1_700_000_000_000);

        let oversized = Envelope::response(
            "ModelLoad",
            &request.request_id,
            json!({"modelID": "x".repeat(512)}),
            &clock,
        );
        peer.push_envelope(&oversized);
        peer.push_text("not json at all");
        peer.push_envelope(&Envelope::response(
            "ModelLoad",
            &request.request_id,
            json!({"modelID": "alpha"}),
            &clock,
        ));

        let response = pending.await.unwrap().unwrap();
        assert_eq!(response.model_id, "alpha");
    }
}
