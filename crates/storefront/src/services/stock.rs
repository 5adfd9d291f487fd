//! Live stock updates.
//!
//! A background task polls the backend for stock levels and publishes the
//! differences on a broadcast channel. Handlers that change stock locally
//! (placing an order) publish too. `/events/stock` forwards the channel to
//! browsers as server-sent events.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use verdant_backend::BackendClient;
use verdant_core::ProductId;
use verdant_core::cart::{StockChange, StockLevel};

use crate::services::catalog::CatalogService;

/// Buffered changes per subscriber before it starts lagging.
const CHANNEL_CAPACITY: usize = 256;

/// Publishes [`StockChange`]s to every subscriber.
#[derive(Clone)]
pub struct StockWatcher {
    sender: broadcast::Sender<StockChange>,
    snapshot: Arc<Mutex<Snapshot>>,
}

/// Last known sellable stock per product.
#[derive(Default)]
struct Snapshot {
    levels: HashMap<ProductId, u32>,
    /// Set once a full poll has been folded in.
    seeded: bool,
}

impl Default for StockWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl StockWatcher {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            snapshot: Arc::new(Mutex::new(Snapshot::default())),
        }
    }

    /// Receive future changes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StockChange> {
        self.sender.subscribe()
    }

    /// Publish a change made locally and fold it into the snapshot so the
    /// next poll does not announce it twice.
    pub fn publish(&self, change: StockChange) {
        if let Ok(mut snapshot) = self.snapshot.lock() {
            snapshot.levels.insert(change.product_id, change.stock);
        }
        // No receivers is not an error.
        let _ = self.sender.send(change);
    }

    /// Apply a fresh poll: returns the changes and updates the snapshot.
    ///
    /// The very first poll only seeds the snapshot, even if it is empty or
    /// something was published before it.
    pub fn observe(&self, levels: &[StockLevel]) -> Vec<StockChange> {
        let Ok(mut snapshot) = self.snapshot.lock() else {
            return Vec::new();
        };
        let changes = if snapshot.seeded {
            diff(&snapshot.levels, levels)
        } else {
            Vec::new()
        };
        snapshot.levels = levels
            .iter()
            .map(|level| (level.product_id, sellable(level)))
            .collect();
        snapshot.seeded = true;
        changes
    }

    /// Spawn the polling task.
    pub fn spawn_poller(
        &self,
        backend: BackendClient,
        catalog: CatalogService,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let watcher = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::info!(interval_secs = interval.as_secs(), "Stock watcher started");

            loop {
                ticker.tick().await;
                match backend.stock_levels(None).await {
                    Ok(levels) => {
                        for change in watcher.observe(&levels) {
                            tracing::debug!(
                                product_id = %change.product_id,
                                stock = change.stock,
                                "Stock changed"
                            );
                            catalog.invalidate_product(change.product_id);
                            let _ = watcher.sender.send(change);
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Stock poll failed"),
                }
            }
        })
    }
}

/// Units a customer can buy: unpublished products count as zero.
const fn sellable(level: &StockLevel) -> u32 {
    if level.active { level.stock } else { 0 }
}

/// Differences between the last snapshot and a new poll.
///
/// Products that disappear are reported with zero stock.
fn diff(previous: &HashMap<ProductId, u32>, current: &[StockLevel]) -> Vec<StockChange> {
    let mut changes: Vec<StockChange> = current
        .iter()
        .filter(|level| previous.get(&level.product_id) != Some(&sellable(level)))
        .map(|level| StockChange {
            product_id: level.product_id,
            stock: sellable(level),
        })
        .collect();

    let mut gone: Vec<StockChange> = previous
        .iter()
        .filter(|(id, stock)| **stock > 0 && !current.iter().any(|l| l.product_id == **id))
        .map(|(id, _)| StockChange {
            product_id: *id,
            stock: 0,
        })
        .collect();
    gone.sort_by_key(|c| c.product_id);
    changes.append(&mut gone);
    changes
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn level(id: i64, stock: u32, active: bool) -> StockLevel {
        StockLevel {
            product_id: ProductId::new(id),
            stock,
            active,
        }
    }

    #[test]
    fn test_first_poll_only_seeds() {
        let watcher = StockWatcher::new();
        assert!(watcher.observe(&[level(1, 5, true)]).is_empty());
    }

    #[test]
    fn test_publish_before_first_poll_does_not_skip_seeding() {
        let watcher = StockWatcher::new();
        watcher.publish(StockChange {
            product_id: ProductId::new(1),
            stock: 4,
        });

        let catalog: Vec<StockLevel> = (1..=5).map(|id| level(id, 10, true)).collect();
        assert!(watcher.observe(&catalog).is_empty());
        assert!(watcher.observe(&catalog).is_empty());
    }

    #[test]
    fn test_empty_first_poll_still_seeds() {
        let watcher = StockWatcher::new();
        assert!(watcher.observe(&[]).is_empty());

        let changes = watcher.observe(&[level(1, 5, true)]);
        assert_eq!(
            changes,
            vec![StockChange {
                product_id: ProductId::new(1),
                stock: 5
            }]
        );
    }

    #[test]
    fn test_reports_changed_levels() {
        let watcher = StockWatcher::new();
        watcher.observe(&[level(1, 5, true), level(2, 3, true)]);

        let changes = watcher.observe(&[level(1, 4, true), level(2, 3, true)]);
        assert_eq!(
            changes,
            vec![StockChange {
                product_id: ProductId::new(1),
                stock: 4
            }]
        );
    }

    #[test]
    fn test_deactivated_product_reads_as_zero() {
        let watcher = StockWatcher::new();
        watcher.observe(&[level(1, 5, true)]);
        let changes = watcher.observe(&[level(1, 5, false)]);
        assert_eq!(changes[0].stock, 0);
    }

    #[test]
    fn test_deleted_product_reported_once() {
        let watcher = StockWatcher::new();
        watcher.observe(&[level(1, 5, true), level(2, 2, true)]);

        let changes = watcher.observe(&[level(1, 5, true)]);
        assert_eq!(
            changes,
            vec![StockChange {
                product_id: ProductId::new(2),
                stock: 0
            }]
        );
        assert!(watcher.observe(&[level(1, 5, true)]).is_empty());
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribers_and_snapshot() {
        let watcher = StockWatcher::new();
        watcher.observe(&[level(1, 5, true)]);
        let mut rx = watcher.subscribe();

        let change = StockChange {
            product_id: ProductId::new(1),
            stock: 2,
        };
        watcher.publish(change);

        assert_eq!(rx.recv().await.unwrap(), change);
        // The poller sees the same value and stays quiet.
        assert!(watcher.observe(&[level(1, 2, true)]).is_empty());
    }
}
