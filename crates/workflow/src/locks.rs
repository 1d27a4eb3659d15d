use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use procure_core::domain::order::OrderId;

/// Per-order async mutexes that serialize decisions on the same order.
///
/// The map only holds weak references; a lock disappears once no guard or waiter
/// refers to it, and dead slots are pruned on the next acquisition.
#[derive(Default)]
pub struct OrderLocks {
    slots: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl OrderLocks {
    pub async fn acquire(&self, order_id: &OrderId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut slots = match self.slots.lock() {
                Ok(slots) => slots,
                Err(poisoned) => poisoned.into_inner(),
            };
            slots.retain(|_, slot| slot.strong_count() > 0);

            match slots.get(&order_id.0).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(AsyncMutex::new(()));
                    slots.insert(order_id.0.clone(), Arc::downgrade(&lock));
                    lock
                }
            }
        };

        lock.lock_owned().await
    }

    /// Number of orders that currently have a live lock.
    #[cfg(test)]
    fn tracked(&self) -> usize {
        let slots = match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots.values().filter(|slot| slot.strong_count() > 0).count()
    }
}
