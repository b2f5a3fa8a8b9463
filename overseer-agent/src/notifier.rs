//! Notification sink
//!
//! Each `notify` call runs three phases in order:
//! 1. discover chats that wrote to the bot since the last call
//! 2. merge them into the persisted subscriber set
//! 3. deliver the message to every subscriber
//!
//! A failed delivery only affects its own recipient. A failed merge aborts the
//! call before anything is sent.

use crate::error::Result;
use crate::store::{SubscriberSet, SubscriberStore};
use crate::telegram::{ChatTransport, Update};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Upper bound on `getUpdates` pages fetched per notification.
pub const MAX_DISCOVERY_PAGES: usize = 100;

/// Outcome of one delivery round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

pub struct NotificationSink {
    transport: Arc<dyn ChatTransport>,
    store: SubscriberStore,
    subscribers: SubscriberSet,
}

impl NotificationSink {
    /// Load the persisted subscribers and wrap `transport`.
    pub async fn open(transport: Arc<dyn ChatTransport>, store: SubscriberStore) -> Result<Self> {
        let subscribers = store.load().await?;
        info!(
            "Notification sink ready with {} known subscriber(s)",
            subscribers.len()
        );

        Ok(Self {
            transport,
            store,
            subscribers,
        })
    }

    pub fn subscribers(&self) -> &SubscriberSet {
        &self.subscribers
    }

    /// Discover, persist, then deliver `message`.
    ///
    /// Only persistence failures are returned; transport problems are logged.
    pub async fn notify(&mut self, message: &str) -> Result<DeliveryReport> {
        let discovered = self.discover().await;
        let before = self.subscribers.len();

        self.subscribers = self
            .store
            .merge_and_persist(&self.subscribers, &discovered)
            .await?;
        if self.subscribers.len() > before {
            info!("{} new subscriber(s)", self.subscribers.len() - before);
        }

        let report = self.deliver(message).await;
        info!(
            "Notification delivered to {}/{} subscriber(s)",
            report.delivered,
            self.subscribers.len()
        );
        Ok(report)
    }

    /// Page through pending updates and collect the chats they came from.
    ///
    /// Stops at an empty page, on any transport error, when the cursor stops
    /// advancing, or after `MAX_DISCOVERY_PAGES` pages.
    async fn discover(&self) -> SubscriberSet {
        let mut found = SubscriberSet::new();
        let mut offset = 0i64;

        for _ in 0..MAX_DISCOVERY_PAGES {
            let page = match self.transport.get_updates(offset).await {
                Ok(page) => page,
                Err(e) => {
                    warn!("Subscriber discovery stopped: {}", e);
                    break;
                }
            };

            let Some(last_id) = page.iter().map(|update| update.update_id).max() else {
                break;
            };
            found.extend(page.iter().filter_map(Update::chat_id));

            let next = last_id + 1;
            if next <= offset {
                warn!("Update cursor did not advance past {}, stopping discovery", offset);
                break;
            }
            offset = next;
        }

        debug!("Discovered {} chat(s)", found.len());
        found
    }

    async fn deliver(&self, message: &str) -> DeliveryReport {
        let sends = self.subscribers.iter().map(|&chat_id| {
            let transport = Arc::clone(&self.transport);
            async move { (chat_id, transport.send_message(chat_id, message).await) }
        });

        let mut report = DeliveryReport::default();
        for (chat_id, outcome) in join_all(sends).await {
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!("Delivery to chat {} failed: {}", chat_id, e);
                }
            }
        }
        report
    }
}
