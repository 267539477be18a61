//! Message pipeline.
//!
//! Every inbound message from any channel flows through [`Monitor::handle`]:
//! skip → command → normalize + match → avatar → render → publish.

pub mod dedup;
pub mod monitor;

pub use dedup::RecentIds;
pub use monitor::{Monitor, MonitorDeps, Outcome};
