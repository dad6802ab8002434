//! Fan-out of guest arrivals to a resident's live channels.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;

use super::events::GuestArrival;
use super::registry::ConnectionRegistry;

/// Outcome of one `route` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteReport {
    pub delivered: usize,
    pub dropped: usize,
}

#[derive(Clone)]
pub struct EventRouter {
    registry: Arc<ConnectionRegistry>,
    push_timeout: Duration,
}

impl EventRouter {
    pub fn new(registry: Arc<ConnectionRegistry>, push_timeout: Duration) -> Self {
        Self {
            registry,
            push_timeout,
        }
    }

    /// Deliver `event` once to every live channel of its resident.
    ///
    /// Pushes run concurrently against a snapshot taken before the first
    /// push. A channel whose push fails is unregistered; the failure never
    /// reaches the caller or the sibling channels. Returns once every push
    /// has completed or failed.
    pub async fn route(&self, event: GuestArrival) -> RouteReport {
        let resident_id = event.resident_id;
        let channels = self.registry.channels_for(resident_id);
        if channels.is_empty() {
            tracing::debug!(resident_id, guest_id = event.guest_id, "no live channels for resident");
            return RouteReport::default();
        }

        let event = Arc::new(event);
        let results = join_all(channels.iter().map(|channel| {
            let event = event.clone();
            async move { channel.push(event, self.push_timeout).await }
        }))
        .await;

        let mut report = RouteReport::default();
        for (channel, result) in channels.iter().zip(results) {
            match result {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    tracing::warn!(
                        channel_id = %channel.id(),
                        resident_id,
                        error = %err,
                        "push failed, dropping channel"
                    );
                    self.registry.unregister_channel(channel);
                    report.dropped += 1;
                }
            }
        }

        tracing::info!(
            resident_id,
            guest_id = event.guest_id,
            delivered = report.delivered,
            dropped = report.dropped,
            "guest arrival routed"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::channel::Channel;
    use crate::gateway::transport::{ChannelSink, PushError, QueueSink};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use gatehouse_common::Plate;
    use tokio::sync::mpsc::Receiver;

    struct FailingSink(PushError);

    #[async_trait]
    impl ChannelSink for FailingSink {
        async fn push(&self, _event: Arc<GuestArrival>, _timeout: Duration) -> Result<(), PushError> {
            Err(self.0)
        }
    }

    fn arrival(resident_id: i64, guest_id: i64) -> GuestArrival {
        GuestArrival {
            guest_id,
            resident_id,
            plate: Plate::parse("ABC123").unwrap(),
            occurred_at: Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap(),
        }
    }

    fn queue_channel(id: &str, resident_id: i64) -> (Arc<Channel>, Receiver<Arc<GuestArrival>>) {
        let (sink, rx) = QueueSink::bounded(8);
        let ch = Arc::new(Channel::with_id(id.into(), resident_id, Arc::new(sink)));
        (ch, rx)
    }

    fn router(registry: &Arc<ConnectionRegistry>) -> EventRouter {
        EventRouter::new(registry.clone(), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn resident_without_channels_gets_nothing() {
        let registry = ConnectionRegistry::new();
        let report = router(&registry).route(arrival(7, 1)).await;
        assert_eq!(report, RouteReport::default());
    }

    #[tokio::test]
    async fn every_channel_receives_exactly_once() {
        let registry = ConnectionRegistry::new();
        let (c1, mut rx1) = queue_channel("c1", 42);
        let (c2, mut rx2) = queue_channel("c2", 42);
        let (other, mut rx_other) = queue_channel("o1", 9);
        let _h1 = registry.register(c1);
        let _h2 = registry.register(c2);
        let _h3 = registry.register(other);

        let report = router(&registry).route(arrival(42, 5)).await;
        assert_eq!(report.delivered, 2);
        assert_eq!(report.dropped, 0);

        for rx in [&mut rx1, &mut rx2] {
            let got = rx.try_recv().unwrap();
            assert_eq!(got.notification().time, "2025-01-01T10:00:00Z");
            assert_eq!(got.guest_id, 5);
            assert!(rx.try_recv().is_err());
        }
        assert!(rx_other.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregistered_channel_is_skipped() {
        let registry = ConnectionRegistry::new();
        let (c1, mut rx1) = queue_channel("c1", 42);
        let (c2, mut rx2) = queue_channel("c2", 42);
        let _h1 = registry.register(c1);
        let h2 = registry.register(c2);
        h2.close();

        let report = router(&registry).route(arrival(42, 5)).await;
        assert_eq!(report.delivered, 1);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn failing_push_drops_only_that_channel() {
        let registry = ConnectionRegistry::new();
        let (good, mut rx) = queue_channel("good", 42);
        let bad = Arc::new(Channel::with_id(
            "bad".into(),
            42,
            Arc::new(FailingSink(PushError::Write)),
        ));
        let _good = registry.register(good);
        let _bad = registry.register(bad);

        let report = router(&registry).route(arrival(42, 1)).await;
        assert_eq!(report, RouteReport { delivered: 1, dropped: 1 });
        assert!(rx.try_recv().is_ok());

        let remaining: Vec<_> = registry.channels_for(42).iter().map(|c| c.id().to_string()).collect();
        assert_eq!(remaining, vec!["good".to_string()]);
    }

    #[tokio::test]
    async fn full_queue_counts_as_failure() {
        let registry = ConnectionRegistry::new();
        let (sink, _rx) = QueueSink::bounded(1);
        let ch = Arc::new(Channel::with_id("slow".into(), 42, Arc::new(sink)));
        let _h = registry.register(ch);
        let router = router(&registry);

        assert_eq!(router.route(arrival(42, 1)).await.delivered, 1);
        assert_eq!(router.route(arrival(42, 2)).await.dropped, 1);
        assert!(registry.channels_for(42).is_empty());
    }

    #[tokio::test]
    async fn per_channel_order_follows_route_order() {
        let registry = ConnectionRegistry::new();
        let (c1, mut rx) = queue_channel("c1", 42);
        let _h = registry.register(c1);
        let router = router(&registry);

        for guest_id in 1..=5 {
            router.route(arrival(42, guest_id)).await;
        }
        let got: Vec<i64> = (0..5).map(|_| rx.try_recv().unwrap().guest_id).collect();
        assert_eq!(got, vec![1, 2, 3, 4, 5]);
    }
}
