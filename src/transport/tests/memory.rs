//! Tests for the in-memory transport

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::transport::{
        MemoryTransport, MessageAttributes, QueueTransport, TransportError, MEMORY_URL_PREFIX,
        SIGNATURE_ATTRIBUTE,
    };

    fn attrs(signature: &str) -> MessageAttributes {
        let mut attributes = MessageAttributes::new();
        attributes.insert(SIGNATURE_ATTRIBUTE.to_string(), signature.to_string());
        attributes
    }

    #[tokio::test]
    async fn test_create_queue_returns_prefixed_url() {
        let transport = MemoryTransport::new();
        let url = transport.create_queue("orders").await.unwrap();

        assert_eq!(url, format!("{}orders", MEMORY_URL_PREFIX));
        assert!(transport.queue_exists(&url));
        assert_eq!(
            transport.get_queue_url("orders").await.unwrap(),
            Some(url.clone())
        );
        assert_eq!(transport.get_queue_url("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_create_queue_rejects_invalid_names() {
        let transport = MemoryTransport::new();

        assert!(transport.create_queue("").await.is_err());
        assert!(transport.create_queue("has space").await.is_err());
        assert!(transport.create_queue(&"x".repeat(81)).await.is_err());
        assert!(transport.create_queue(&"x".repeat(80)).await.is_ok());
    }

    #[tokio::test]
    async fn test_messages_are_delivered_in_order_with_attributes() {
        let transport = MemoryTransport::new();
        let url = transport.create_queue("ordered").await.unwrap();

        transport.send(&url, "first", &attrs("a")).await.unwrap();
        transport.send(&url, "second", &attrs("b")).await.unwrap();

        let batch = transport.receive(&url, 10, 0).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].body, "first");
        assert_eq!(batch[0].signature(), Some("a"));
        assert_eq!(batch[1].body, "second");
        assert_ne!(batch[0].receipt_handle, batch[1].receipt_handle);
    }

    #[tokio::test]
    async fn test_receive_honors_batch_limit() {
        let transport = MemoryTransport::new();
        let url = transport.create_queue("batched").await.unwrap();
        for i in 0..15 {
            transport
                .send(&url, &format!("m{}", i), &MessageAttributes::new())
                .await
                .unwrap();
        }

        assert_eq!(transport.receive(&url, 3, 0).await.unwrap().len(), 3);
        // Requests above the service maximum are clamped
        assert_eq!(transport.receive(&url, 50, 0).await.unwrap().len(), 10);
        assert_eq!(transport.receive(&url, 10, 0).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delivered_messages_stay_in_flight_until_deleted() {
        let transport = MemoryTransport::new();
        let url = transport.create_queue("visibility").await.unwrap();
        transport
            .send(&url, "payload", &MessageAttributes::new())
            .await
            .unwrap();

        let batch = transport.receive(&url, 1, 0).await.unwrap();
        assert_eq!(transport.ready_count(&url), 0);
        assert_eq!(transport.in_flight_count(&url), 1);

        transport
            .delete_message(&url, &batch[0].receipt_handle)
            .await
            .unwrap();
        assert_eq!(transport.in_flight_count(&url), 0);
        assert_eq!(
            transport.deleted_receipts(&url),
            vec![batch[0].receipt_handle.clone()]
        );

        // A receipt handle is only good once
        assert!(transport
            .delete_message(&url, &batch[0].receipt_handle)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_redelivery_returns_undeleted_messages() {
        let transport = MemoryTransport::new();
        let url = transport.create_queue("redeliver").await.unwrap();
        transport
            .send(&url, "again", &MessageAttributes::new())
            .await
            .unwrap();

        let first = transport.receive(&url, 1, 0).await.unwrap();
        assert_eq!(transport.redeliver_in_flight(&url), 1);

        let second = transport.receive(&url, 1, 0).await.unwrap();
        assert_eq!(second[0].body, "again");
        assert_ne!(first[0].receipt_handle, second[0].receipt_handle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_poll_times_out_empty() {
        let transport = MemoryTransport::new();
        let url = transport.create_queue("quiet").await.unwrap();

        let started = tokio::time::Instant::now();
        let batch = transport.receive(&url, 10, 20).await.unwrap();

        assert!(batch.is_empty());
        assert!(started.elapsed() >= Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_long_poll_wakes_on_send() {
        let transport = MemoryTransport::new();
        let url = transport.create_queue("wakeup").await.unwrap();

        let receiver = {
            let transport = transport.clone();
            let url = url.clone();
            tokio::spawn(async move { transport.receive(&url, 10, 20).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        transport
            .send(&url, "late", &MessageAttributes::new())
            .await
            .unwrap();

        let batch = tokio::time::timeout(Duration::from_secs(2), receiver)
            .await
            .expect("receive should wake on send")
            .unwrap()
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].body, "late");
    }

    #[tokio::test]
    async fn test_operations_on_missing_queue_fail() {
        let transport = MemoryTransport::new();
        let url = format!("{}ghost", MEMORY_URL_PREFIX);

        let err = transport
            .send(&url, "x", &MessageAttributes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Send { .. }));
        assert_eq!(err.queue(), Some(url.as_str()));

        assert!(matches!(
            transport.receive(&url, 1, 0).await.unwrap_err(),
            TransportError::Poll { .. }
        ));
        assert!(matches!(
            transport.delete_queue(&url).await.unwrap_err(),
            TransportError::QueueRemoval { .. }
        ));
    }

    #[tokio::test]
    async fn test_injected_faults_are_consumed() {
        let transport = MemoryTransport::new();
        transport.fail_next_creates(1);
        assert!(transport.create_queue("flaky").await.is_err());
        let url = transport.create_queue("flaky").await.unwrap();

        transport.fail_next_sends(&url, 1);
        assert!(transport
            .send(&url, "x", &MessageAttributes::new())
            .await
            .is_err());
        transport
            .send(&url, "y", &MessageAttributes::new())
            .await
            .unwrap();

        transport.fail_next_receives(&url, 2);
        assert!(transport.receive(&url, 1, 0).await.is_err());
        assert!(transport.receive(&url, 1, 0).await.is_err());
        let batch = transport.receive(&url, 1, 0).await.unwrap();
        assert_eq!(batch[0].body, "y");
        assert_eq!(transport.receive_calls(&url), 3);

        transport.fail_next_deletes(1);
        assert!(transport
            .delete_message(&url, &batch[0].receipt_handle)
            .await
            .is_err());
        transport
            .delete_message(&url, &batch[0].receipt_handle)
            .await
            .unwrap();

        // Only successful sends land in the call log
        assert_eq!(transport.sent_messages(&url).len(), 1);
    }

    #[tokio::test]
    async fn test_delete_queue_wakes_pending_receive() {
        let transport = MemoryTransport::new();
        let url = transport.create_queue("doomed").await.unwrap();

        let receiver = {
            let transport = transport.clone();
            let url = url.clone();
            tokio::spawn(async move { transport.receive(&url, 10, 20).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        transport.delete_queue(&url).await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), receiver)
            .await
            .expect("receive should notice the deletion")
            .unwrap();
        assert!(result.is_err());
        assert_eq!(transport.removed_queues(), vec![url]);
    }
}
