//! Heartbeat leases for in-flight messages.
//!
//! While a handler runs, [`HeartBeatWorker`] periodically renews the
//! message's lease through [`SendHeartBeat`]. If a worker dies the lease goes
//! stale, and [`HeartBeatMonitor`] eventually runs [`ResetHeartBeat`] to
//! return the message to the waiting state so another worker can pick it up.
//!
//! Ownership is arbitrated by the transport: both renewing and resetting are
//! conditional updates, so a reset never steals a lease that was renewed in
//! the meantime and two concurrent sweeps never both reset the same message.

mod monitor;
mod reset;
mod send;
mod worker;

pub use monitor::HeartBeatMonitor;
pub use reset::{ResetHeartBeat, ResetHeartBeatOutput};
pub use send::SendHeartBeat;
pub use worker::{HeartBeatHandle, HeartBeatWorker};

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
