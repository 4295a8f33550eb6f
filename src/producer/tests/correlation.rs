//! Tests for reply correlation under concurrency

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use crate::producer::tests::{fast_settings, shared, spawn_responder};
    use crate::producer::ResponseBroker;
    use crate::transport::{MemoryTransport, MessageAttributes, QueueTransport, SIGNATURE_ATTRIBUTE};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_receive_their_own_replies() {
        let transport = MemoryTransport::new();
        let target = transport.create_queue("twoways").await.unwrap();
        let broker = ResponseBroker::start(shared(&transport), fast_settings()).await;
        let response_url = broker.response_queue_url().unwrap();
        let responder = spawn_responder(transport.clone(), target.clone(), 2, |b| b.to_string());

        let (a, b) = tokio::join!(
            broker.send_and_await(&target, "A", Duration::from_secs(5)),
            broker.send_and_await(&target, "B", Duration::from_secs(5)),
        );

        assert_eq!(a.unwrap().as_deref(), Some("A"));
        assert_eq!(b.unwrap().as_deref(), Some("B"));
        assert_eq!(transport.max_concurrent_receives(&response_url), 1);
        assert_eq!(transport.deleted_receipts(&response_url).len(), 2);
        responder.await.unwrap();
        broker.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_interleaved_requests_never_cross() {
        const CALLERS: usize = 40;
        let transport = MemoryTransport::new();
        let target = transport.create_queue("twoways").await.unwrap();
        let broker = ResponseBroker::start(shared(&transport), fast_settings()).await;
        let response_url = broker.response_queue_url().unwrap();
        let responder = spawn_responder(transport.clone(), target.clone(), CALLERS, |b| {
            format!("reply-to-{}", b)
        });

        let callers: Vec<_> = (0..CALLERS)
            .map(|i| {
                let broker = broker.clone();
                let target = target.clone();
                tokio::spawn(async move {
                    let body = format!("request-{}", i);
                    let reply = broker
                        .send_and_await(&target, &body, Duration::from_secs(10))
                        .await
                        .unwrap();
                    (body, reply)
                })
            })
            .collect();

        for caller in callers {
            let (body, reply) = caller.await.unwrap();
            assert_eq!(reply, Some(format!("reply-to-{}", body)));
        }
        assert_eq!(transport.max_concurrent_receives(&response_url), 1);
        responder.await.unwrap();
        broker.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_mixed_answered_and_unanswered_requests() {
        let transport = MemoryTransport::new();
        let target = transport.create_queue("twoways").await.unwrap();
        let broker = ResponseBroker::start(shared(&transport), fast_settings()).await;
        let response_url = broker.response_queue_url().unwrap();

        let mut tokens = HashMap::new();
        for i in 0..6 {
            let token = broker
                .send_for_response(&target, &format!("r{}", i))
                .await
                .unwrap();
            tokens.insert(i, token);
        }
        // Answer only the even requests
        for i in (0..6).step_by(2) {
            let mut attributes = MessageAttributes::new();
            attributes.insert(SIGNATURE_ATTRIBUTE.to_string(), tokens[&i].to_string());
            transport
                .send(&response_url, &format!("answer{}", i), &attributes)
                .await
                .unwrap();
        }

        let waits: Vec<_> = (0..6)
            .map(|i| {
                let broker = broker.clone();
                let token = tokens[&i].clone();
                tokio::spawn(async move {
                    (i, broker.receive_response(&token, Duration::from_millis(500)).await)
                })
            })
            .collect();

        for wait in waits {
            let (i, reply) = wait.await.unwrap();
            if i % 2 == 0 {
                assert_eq!(reply, Some(format!("answer{}", i)));
            } else {
                assert_eq!(reply, None);
            }
        }
        assert_eq!(broker.pending_requests(), 0);
        broker.shutdown().await;
    }

    #[tokio::test]
    async fn test_poller_exits_when_nobody_waits() {
        let transport = MemoryTransport::new();
        let target = transport.create_queue("twoways").await.unwrap();
        let broker = ResponseBroker::start(shared(&transport), fast_settings()).await;
        let response_url = broker.response_queue_url().unwrap();

        let reply = broker
            .send_and_await(&target, "x", Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(reply, None);

        // The in-progress long poll (1s) finishes, then the poller sees no waiters
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let calls = transport.receive_calls(&response_url);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(transport.receive_calls(&response_url), calls);
        broker.shutdown().await;
    }

    #[tokio::test]
    async fn test_abandoned_wait_releases_request_and_poller() {
        let transport = MemoryTransport::new();
        let target = transport.create_queue("twoways").await.unwrap();
        let broker = ResponseBroker::start(shared(&transport), fast_settings()).await;
        let response_url = broker.response_queue_url().unwrap();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(100),
            broker.send_and_await(&target, "x", Duration::from_secs(2)),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(broker.pending_requests(), 0);

        // The in-progress long poll (1s) finishes, then the poller stops
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let calls = transport.receive_calls(&response_url);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(transport.receive_calls(&response_url), calls);
        broker.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancelled_token_releases_poller() {
        let transport = MemoryTransport::new();
        let target = transport.create_queue("twoways").await.unwrap();
        let broker = ResponseBroker::start(shared(&transport), fast_settings()).await;
        let response_url = broker.response_queue_url().unwrap();

        let token = broker.send_for_response(&target, "never collected").await.unwrap();
        assert_eq!(broker.pending_requests(), 1);
        assert!(broker.cancel_response(&token));
        assert!(!broker.cancel_response(&token));
        assert_eq!(broker.pending_requests(), 0);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let calls = transport.receive_calls(&response_url);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(transport.receive_calls(&response_url), calls);
        broker.shutdown().await;
    }

    #[tokio::test]
    async fn test_late_reply_after_timeout_is_not_delivered_to_next_request() {
        let transport = MemoryTransport::new();
        let target = transport.create_queue("twoways").await.unwrap();
        let broker = ResponseBroker::start(shared(&transport), fast_settings()).await;
        let response_url = broker.response_queue_url().unwrap();

        let first = broker.send_for_response(&target, "first").await.unwrap();
        assert_eq!(
            broker
                .receive_response(&first, Duration::from_millis(50))
                .await,
            None
        );

        let mut attributes = MessageAttributes::new();
        attributes.insert(SIGNATURE_ATTRIBUTE.to_string(), first.to_string());
        transport
            .send(&response_url, "late for first", &attributes)
            .await
            .unwrap();

        let second = broker.send_for_response(&target, "second").await.unwrap();
        let reply = broker
            .receive_response(&second, Duration::from_millis(300))
            .await;
        assert_eq!(reply, None);
        broker.shutdown().await;
    }
}
