//! Simulation parameters.

use std::time::Duration;

/// The smallest topology the generator accepts.
pub const MIN_NODES: usize = 2;
/// The largest topology the generator accepts.
pub const MAX_NODES: usize = 50;
/// Route request identifiers are drawn from `[1, MAX_REQUEST_ID]`.
pub const MAX_REQUEST_ID: u32 = 10_000;

/// Network-wide settings, fixed for the lifetime of a [`Network`](crate::Network) except for the
/// propagation delay which can be changed at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// The delay applied to every packet hand-off, initially.
    pub propagation_delay: Duration,
    /// How long a node waits on its mailbox before checking whether it was asked to stop.
    pub poll_interval: Duration,
    /// How long stopping waits for each node task before aborting it.
    pub stop_grace_period: Duration,
    /// The number of packets a node's mailbox can hold before deliveries to it are dropped.
    pub mailbox_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            propagation_delay: Duration::from_millis(500),
            poll_interval: Duration::from_millis(100),
            stop_grace_period: Duration::from_secs(1),
            mailbox_capacity: 1024,
        }
    }
}

impl Config {
    /// A configuration without propagation delay, useful when the pacing of steps is irrelevant.
    pub fn instant() -> Self {
        Self {
            propagation_delay: Duration::ZERO,
            ..Default::default()
        }
    }
}
