//! Order generator: the intake's only producer and only closer.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::event::{EventKind, EventLog};
use crate::handoff;
use crate::model::{WorkId, WorkItem};
use crate::telemetry::metrics;

/// Emits orders 1..=N at random intervals.
pub struct Generator {
    orders: u64,
    interval: Duration,
    max_items: usize,
    customers: Vec<String>,
    catalog: Vec<String>,
    rng: StdRng,
    events: Arc<EventLog>,
}

impl Generator {
    /// Fails with [`Error::Config`](crate::error::Error::Config) if the
    /// config does not validate, e.g. an empty catalog or customer list.
    pub fn new(config: &PipelineConfig, rng: StdRng, events: Arc<EventLog>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            orders: config.orders,
            interval: config.generation_interval(),
            max_items: config.max_items_per_order.max(1),
            customers: config.customers.clone(),
            catalog: config.catalog.clone(),
            rng,
            events,
        })
    }

    /// Generate every order, handing each to a worker, then close the
    /// intake. Returns how many orders were generated.
    pub async fn run(mut self, intake: handoff::Sender<WorkItem>) -> Result<u64> {
        let generated = metrics::orders_generated();

        for n in 1..=self.orders {
            let delay = self.next_delay();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let item = self.next_item(WorkId(n));
            self.events.emit(EventKind::generated(&item));
            generated.add(1, &[]);
            debug!(id = %item.id, customer = %item.customer, "order generated");

            // Suspends until a worker takes the order.
            intake.send(item).await?;
        }

        intake.close()?;
        info!(orders = self.orders, "generator finished, intake closed");
        Ok(self.orders)
    }

    fn next_delay(&mut self) -> Duration {
        if self.interval.is_zero() {
            Duration::ZERO
        } else {
            self.rng.gen_range(Duration::ZERO..self.interval)
        }
    }

    fn next_item(&mut self, id: WorkId) -> WorkItem {
        let customer = self
            .customers
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_default();
        let count = self.rng.gen_range(1..=self.max_items);
        let items = (0..count)
            .filter_map(|_| self.catalog.choose(&mut self.rng).cloned())
            .collect();
        let total_amount = self.rng.gen_range(100..1000) as f64 + self.rng.r#gen::<f64>();

        WorkItem {
            id,
            customer,
            items,
            total_amount,
        }
    }
}
