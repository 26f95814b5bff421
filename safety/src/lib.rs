//! Safety interlocks for the Skylid observatory enclosure.
//!
//! Every operator action flows through an interlock chain that snapshots
//! the other devices' live state and vetoes, permits or augments the
//! action. The emergency closure sequencer parks and seals the enclosure
//! on its own when the weather turns dangerous.

pub mod chain;
pub mod context;
pub mod curtains_actions;
pub mod emergency;
pub mod roof_actions;
pub mod switch_actions;
pub mod telescope_actions;
pub mod weather_actions;

#[cfg(test)]
pub(crate) mod testkit;

pub use context::{Observatory, SharedObservatory};
