use std::sync::Arc;

use dashmap::DashMap;
use prometheus::{IntCounter, IntGauge};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::models::booking::Booking;
use crate::notify::{ChangeNotifier, Subscription};

/// In-process change feed: one broadcast channel per subscribed booking.
pub struct BroadcastNotifier {
    channels: Arc<DashMap<Uuid, broadcast::Sender<Booking>>>,
    buffer_size: usize,
    active_subscriptions: IntGauge,
    notifications_total: IntCounter,
}

impl BroadcastNotifier {
    pub fn new(
        buffer_size: usize,
        active_subscriptions: IntGauge,
        notifications_total: IntCounter,
    ) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            buffer_size: buffer_size.max(1),
            active_subscriptions,
            notifications_total,
        }
    }

    /// Number of booking ids that currently have at least one channel.
    pub fn watched_bookings(&self) -> usize {
        self.channels.len()
    }
}

impl ChangeNotifier for BroadcastNotifier {
    fn subscribe(&self, booking_id: Uuid) -> Subscription {
        let rx = self
            .channels
            .entry(booking_id)
            .or_insert_with(|| broadcast::channel(self.buffer_size).0)
            .subscribe();

        self.active_subscriptions.inc();
        debug!(%booking_id, "subscription opened");

        let channels = self.channels.clone();
        let gauge = self.active_subscriptions.clone();
        Subscription::new(
            booking_id,
            rx,
            Box::new(move || {
                gauge.dec();
                channels.remove_if(&booking_id, |_, tx| tx.receiver_count() == 0);
                debug!(%booking_id, "subscription released");
            }),
        )
    }

    fn publish(&self, booking: &Booking) {
        let Some(tx) = self.channels.get(&booking.id) else {
            return;
        };

        if let Ok(delivered) = tx.send(booking.clone()) {
            self.notifications_total.inc_by(delivered as u64);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime, Utc};
    use prometheus::{IntCounter, IntGauge};
    use uuid::Uuid;

    use super::BroadcastNotifier;
    use crate::models::booking::{Booking, BookingStatus, CustomerContact};
    use crate::notify::ChangeNotifier;

    fn notifier() -> BroadcastNotifier {
        BroadcastNotifier::new(
            16,
            IntGauge::new("test_active", "test").unwrap(),
            IntCounter::new("test_notifications", "test").unwrap(),
        )
    }

    fn booking(seed: u128, lat: f64) -> Booking {
        Booking {
            id: Uuid::from_u128(seed),
            code: format!("RW-{seed:06}"),
            customer: CustomerContact {
                name: "Lee".to_string(),
                email: "lee@example.com".to_string(),
                phone: "555-0102".to_string(),
                address: "1 Beach Pl".to_string(),
            },
            scheduled_date: NaiveDate::from_ymd_opt(2026, 7, 4).unwrap(),
            scheduled_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            services: vec![],
            notes: None,
            total_cents: 0,
            status: BookingStatus::OnTheWay,
            lat: Some(lat),
            lng: Some(-80.0),
            position_updated_at: Some(Utc::now()),
            eta_minutes: None,
            tracking_enabled: true,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let notifier = notifier();
        let mut sub = notifier.subscribe(Uuid::from_u128(1));

        notifier.publish(&booking(1, 26.0));
        notifier.publish(&booking(1, 26.5));

        assert_eq!(sub.recv().await.unwrap().lat, Some(26.0));
        assert_eq!(sub.recv().await.unwrap().lat, Some(26.5));
    }

    #[tokio::test]
    async fn other_bookings_are_filtered_out() {
        let notifier = notifier();
        let mut sub = notifier.subscribe(Uuid::from_u128(1));
        let _other = notifier.subscribe(Uuid::from_u128(2));

        notifier.publish(&booking(2, 10.0));
        notifier.publish(&booking(1, 11.0));

        assert_eq!(sub.recv().await.unwrap().lat, Some(11.0));
    }

    #[test]
    fn no_replay_before_subscribe() {
        let notifier = notifier();
        notifier.publish(&booking(1, 26.0));

        let mut sub = notifier.subscribe(Uuid::from_u128(1));
        let rx = sub.rx.as_mut().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropping_last_subscription_releases_channel() {
        let notifier = notifier();
        let first = notifier.subscribe(Uuid::from_u128(1));
        let second = notifier.subscribe(Uuid::from_u128(1));
        assert_eq!(notifier.watched_bookings(), 1);
        assert_eq!(notifier.active_subscriptions.get(), 2);

        drop(first);
        assert_eq!(notifier.watched_bookings(), 1);

        drop(second);
        assert_eq!(notifier.watched_bookings(), 0);
        assert_eq!(notifier.active_subscriptions.get(), 0);
    }

    #[tokio::test]
    async fn lagging_subscriber_gets_latest_snapshot() {
        let notifier = BroadcastNotifier::new(
            2,
            IntGauge::new("lag_active", "test").unwrap(),
            IntCounter::new("lag_notifications", "test").unwrap(),
        );
        let mut sub = notifier.subscribe(Uuid::from_u128(1));

        for i in 0..5 {
            notifier.publish(&booking(1, i as f64));
        }

        // Buffer of 2 keeps the two newest snapshots.
        assert_eq!(sub.recv().await.unwrap().lat, Some(3.0));
        assert_eq!(sub.recv().await.unwrap().lat, Some(4.0));
    }
}
