//! # Loopback Flows
//!
//! Client and server on the two halves of a linked in-process pair.
//!
//! ## Flows Tested:
//!
//! 1. **Round trip**: typed request in, typed response out
//! 2. **Failures**: structured errors verbatim, anything else as `InternalServerError`
//! 3. **Timeout**: unanswered calls reject after the default 5 seconds
//! 4. **Shutdown**: closing the client bus rejects every call in flight

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use parking_lot::Mutex;
    use rpc_bus::{BusConfig, CallFactory, LinkedPair, Listener, LoopbackBus, MessageBus};
    use rpc_types::{Empty, Envelope, ErrorCode, ErrorData};
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn served_pair() -> (LinkedPair, CallFactory) {
        let pair = LoopbackBus::linked_pair();
        serve_all(pair.server_bus.clone());
        let client = CallFactory::new(pair.client_bus.clone());
        (pair, client)
    }

    // =============================================================================
    // ROUND TRIP
    // =============================================================================

    #[tokio::test]
    async fn test_statistics_round_trip() {
        let (pair, client) = served_pair();

        let stats = client.client::<Statistics>().call(Empty {}).await.unwrap();

        assert_eq!(
            stats,
            StatisticsResponse {
                uptime: 1234,
                framerate: 60
            }
        );
        // Pending listener removed, server listeners untouched
        assert_eq!(pair.client_bus.listener_count(), 0);
        assert_eq!(pair.server_bus.listener_count(), 3);
    }

    #[tokio::test]
    async fn test_sequential_calls_reuse_the_bus() {
        let (_pair, client) = served_pair();
        let load = client.client::<ModelLoad>();

        for id in ["alpha", "beta", "gamma"] {
            let response = load
                .call(ModelLoadRequest {
                    model_id: id.to_string(),
                })
                .await
                .unwrap();
            assert_eq!(response.model_id, id);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_interleaved_replies_reach_their_callers() {
        let (pair, client) = served_pair();
        let echo = client.client::<Echo>();

        // Later requests answer first
        let calls = (0..5u64).map(|seq| {
            let echo = echo.clone();
            async move {
                echo.call(EchoRequest {
                    seq,
                    delay_ms: 500 - seq * 100,
                })
                .await
            }
        });
        let results = futures::future::join_all(calls).await;

        for (seq, result) in results.into_iter().enumerate() {
            assert_eq!(result.unwrap().seq, seq as u64);
        }
        assert_eq!(pair.client_bus.listener_count(), 0);
    }

    // =============================================================================
    // FAILURES
    // =============================================================================

    #[tokio::test]
    async fn test_structured_failure_reaches_caller_verbatim() {
        let (_pair, client) = served_pair();

        let err = client
            .client::<ModelLoad>()
            .call(ModelLoadRequest {
                model_id: String::new(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.data, ErrorData::new(MODEL_ID_INVALID, "Model ID invalid"));
        assert_eq!(err.request_id.len(), 16);
        assert!(err
            .to_string()
            .starts_with("Model ID invalid (Error Code: 153 Unknown) (Request ID: "));
    }

    #[tokio::test]
    async fn test_unstructured_failure_becomes_internal_server_error() {
        let (_pair, client) = served_pair();

        let err = client
            .client::<ModelLoad>()
            .call(ModelLoadRequest {
                model_id: "crash".to_string(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), Some(ErrorCode::InternalServerError));
        assert_eq!(err.message(), "renderer crashed");
    }

    // =============================================================================
    // TIMEOUT
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_call_times_out_after_five_seconds() {
        let (pair, client) = served_pair();
        let started = tokio::time::Instant::now();

        let err = client.client::<Unanswered>().call(Empty {}).await.unwrap_err();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(5000));
        assert!(elapsed < Duration::from_millis(5100));
        assert!(err.is_timeout());
        assert_eq!(err.error_id(), -1);
        assert_eq!(pair.client_bus.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_handler_loses_to_configured_timeout() {
        let (_pair, client) = served_pair();
        let client = client.with_config(BusConfig {
            request_timeout: Duration::from_millis(100),
            ..BusConfig::default()
        });

        let err = client
            .client::<Echo>()
            .call(EchoRequest {
                seq: 1,
                delay_ms: 1000,
            })
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        // The late reply arrives and finds nobody listening
        tokio::time::sleep(Duration::from_millis(1000)).await;
    }

    // =============================================================================
    // SHUTDOWN
    // =============================================================================

    #[tokio::test]
    async fn test_close_rejects_all_in_flight_calls() {
        let (pair, client) = served_pair();
        let unanswered = client.client::<Unanswered>();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let call = unanswered.clone();
                tokio::spawn(async move { call.call(Empty {}).await })
            })
            .collect();
        while pair.client_bus.dispatcher().pending_count() < 4 {
            tokio::task::yield_now().await;
        }

        pair.client_bus.close();

        let mut ids = HashSet::new();
        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert_eq!(err.code(), Some(ErrorCode::MessageBusClosed));
            assert_eq!(err.message(), "Message bus closed.");
            ids.insert(err.request_id);
        }
        assert_eq!(ids.len(), 4);
        assert_eq!(pair.client_bus.listener_count(), 0);
        assert_eq!(pair.client_bus.dispatcher().stats().force_terminated(), 4);

        // Closed buses reject at once
        let err = unanswered.call(Empty {}).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::MessageBusClosed));
    }

    // =============================================================================
    // DISPATCH SEMANTICS
    // =============================================================================

    #[tokio::test]
    async fn test_duplicate_server_registration_settles_call_once() {
        let pair = LoopbackBus::linked_pair();
        let handlers = serve_all(pair.server_bus.clone());
        // Register the Statistics handler a second time
        pair.server_bus.register(Arc::clone(&handlers[0]));

        let replies = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&replies);
        pair.client_bus.register(Listener::new(move |msg: &Envelope| {
            sink.lock().push(msg.request_id.clone());
        }));

        let client = CallFactory::new(pair.client_bus.clone());
        let stats = client.client::<Statistics>().call(Empty {}).await.unwrap();
        assert_eq!(stats.framerate, 60);

        while replies.lock().len() < 2 {
            tokio::task::yield_now().await;
        }
        let replies = replies.lock();
        assert_eq!(replies[0], replies[1]);
        // Only the observer remains
        assert_eq!(pair.client_bus.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_flows_with_telemetry_installed() {
        let config = rpc_telemetry::TelemetryConfig {
            log_level: "rpc_bus=trace".to_string(),
            console_output: false,
            ..rpc_telemetry::TelemetryConfig::default()
        };
        // Another test binary may already own the global subscriber.
        let _ = rpc_telemetry::init_telemetry(&config);

        let (_pair, client) = served_pair();
        let response = client
            .client::<Echo>()
            .call(EchoRequest { seq: 9, delay_ms: 0 })
            .await
            .unwrap();
        assert_eq!(response.seq, 9);
    }

    #[tokio::test]
    async fn test_unregistered_server_stops_answering() {
        let pair = LoopbackBus::linked_pair();
        let handlers = serve_all(pair.server_bus.clone());
        for handler in &handlers {
            pair.server_bus.unregister(handler);
        }
        assert_eq!(pair.server_bus.listener_count(), 0);

        let client = CallFactory::new(pair.client_bus.clone()).with_config(BusConfig {
            request_timeout: Duration::from_millis(50),
            ..BusConfig::default()
        });
        let err = client.client::<Statistics>().call(Empty {}).await.unwrap_err();
        assert!(err.is_timeout());
    }
}
