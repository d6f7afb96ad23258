use std::sync::Arc;

use crate::error::Result;
use crate::host::Host;
use crate::sample_collector::{SampleCollector, Trigger};
use crate::scheduler::Scheduler;

/// Samples on object allocation, through the host's allocation notifier.
pub struct AllocationScheduler {
    host: Arc<dyn Host>,
    interval: usize,
    subscribed: bool,
}

/// Handed to the host on subscription. The host calls
/// [`AllocationHook::on_allocation`] once per created object.
///
/// Allocation callbacks run at a point where walking the stack is safe, so the
/// sample is taken synchronously instead of being deferred.
#[derive(Clone)]
pub struct AllocationHook {
    collector: Arc<SampleCollector>,
    interval: usize,
}

impl AllocationHook {
    pub(crate) fn new(collector: Arc<SampleCollector>, interval: usize) -> Self {
        Self { collector, interval }
    }

    pub fn on_allocation(&self) {
        self.collector.on_allocation(self.interval);
    }
}

impl AllocationScheduler {
    pub fn new(host: Arc<dyn Host>, interval: usize) -> Self {
        Self {
            host,
            interval,
            subscribed: false,
        }
    }
}

impl Scheduler for AllocationScheduler {
    fn start(&mut self, trigger: Trigger) -> Result<()> {
        self.host.subscribe(trigger.allocation_hook(self.interval));
        self.subscribed = true;
        log::debug!("Subscribed to allocation events (every {} allocations)", self.interval);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.subscribed {
            self.host.unsubscribe();
            self.subscribed = false;
            log::debug!("Unsubscribed from allocation events");
        }
        Ok(())
    }
}
