//! Transport ownership and CDN failover.
//!
//! The manager owns the active transport handle and the index of the CDN it
//! was built from. Consecutive dial failures are tracked in an atomic counter
//! shared by all connection handlers; crossing the threshold rotates to the
//! next CDN. The counter and the handle are deliberately separate
//! synchronization domains so relay attempts never serialize behind a
//! transport swap — a rotation decision may act on a slightly stale count
//! under heavy concurrency, which only shifts failover timing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use log::{info, warn};

use crate::cdn::CdnConfig;
use crate::transport::{Transport, TransportConfig, TransportFactory};

/// Consecutive dial failures before rotating to the next CDN.
pub const MAX_DIAL_FAILURES: u32 = 5;

struct Active {
    transport: Arc<dyn Transport>,
    index: usize,
}

pub struct TransportManager {
    configs: Vec<CdnConfig>,
    ice_addresses: Vec<String>,
    utls_client_id: String,
    factory: Box<dyn TransportFactory>,
    active: Mutex<Option<Active>>,
    dial_failures: AtomicU32,
}

impl TransportManager {
    pub fn new(
        configs: Vec<CdnConfig>,
        ice_addresses: Vec<String>,
        utls_client_id: String,
        factory: Box<dyn TransportFactory>,
    ) -> Self {
        TransportManager {
            configs,
            ice_addresses,
            utls_client_id,
            factory,
            active: Mutex::new(None),
            dial_failures: AtomicU32::new(0),
        }
    }

    /// Builds a transport from the CDN at `index`.
    fn create_transport(&self, index: usize) -> Result<Arc<dyn Transport>> {
        let cdn = &self.configs[index];
        if cdn.amp_cache_url.is_empty() {
            info!(
                "Using CDN {}/{}: broker={} fronts={:?}",
                index + 1,
                self.configs.len(),
                cdn.broker_url,
                cdn.front_domains
            );
        } else {
            info!(
                "Using CDN {}/{}: amp_cache={} broker={} fronts={:?}",
                index + 1,
                self.configs.len(),
                cdn.amp_cache_url,
                cdn.broker_url,
                cdn.front_domains
            );
        }
        self.factory.create(&TransportConfig {
            broker_url: cdn.broker_url.clone(),
            amp_cache_url: cdn.amp_cache_url.clone(),
            front_domains: cdn.front_domains.clone(),
            ice_addresses: self.ice_addresses.clone(),
            max_peers: 3,
            utls_client_id: self.utls_client_id.clone(),
            utls_remove_sni: true,
        })
    }

    /// Tries each CDN in order until a transport comes up. All failing is
    /// fatal to startup.
    pub fn init(&self) -> Result<()> {
        let mut last_err = anyhow!("no CDN configs");
        for index in 0..self.configs.len() {
            match self.create_transport(index) {
                Ok(transport) => {
                    let mut active = self.active.lock().unwrap();
                    *active = Some(Active { transport, index });
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "CDN {}/{} failed to init: {:#}, trying next",
                        index + 1,
                        self.configs.len(),
                        e
                    );
                    last_err = e;
                }
            }
        }
        Err(last_err.context("all CDN configs failed"))
    }

    /// The active transport handle.
    pub fn current(&self) -> Result<Arc<dyn Transport>> {
        let active = self.active.lock().unwrap();
        match active.as_ref() {
            Some(a) => Ok(a.transport.clone()),
            None => bail!("transport not initialized"),
        }
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active.lock().unwrap().as_ref().map(|a| a.index)
    }

    /// Records one failed dial; crossing the threshold rotates to the next
    /// CDN. Failures are per-manager, so a burst of concurrent dial failures
    /// triggers at most one rotation per threshold crossing.
    pub fn record_failure(&self) {
        let failures = self.dial_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= MAX_DIAL_FAILURES {
            self.rotate();
        }
    }

    pub fn record_success(&self) {
        self.dial_failures.store(0, Ordering::Relaxed);
    }

    /// Swaps to the next CDN. On failure the previous transport stays active
    /// and the counter is left alone, so the next failed dial re-triggers
    /// the threshold check.
    fn rotate(&self) {
        let mut active = self.active.lock().unwrap();
        let current = match active.as_ref() {
            Some(a) => a.index,
            None => return,
        };
        let next = (current + 1) % self.configs.len();
        info!(
            "CDN {} failed after {} attempts, rotating to CDN {}/{}",
            current + 1,
            MAX_DIAL_FAILURES,
            next + 1,
            self.configs.len()
        );
        match self.create_transport(next) {
            Ok(transport) => {
                *active = Some(Active {
                    transport,
                    index: next,
                });
                self.dial_failures.store(0, Ordering::Relaxed);
            }
            Err(e) => {
                warn!("Failed to create transport for CDN {}: {:#}", next + 1, e);
            }
        }
    }
}
