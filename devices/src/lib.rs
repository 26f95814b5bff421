//! Device state machines for the Skylid observatory enclosure.
//!
//! Each module wraps one piece of hardware behind a driver trait: the
//! telescope mount (connection polling, job queue, pointing-zone
//! classification), the roof actuator, the two wind-curtains, the
//! weather feed evaluator and the mains switch bank. Driver traits keep
//! the brand-specific backends out of tree; `sim` provides the bench
//! implementations used by tests and the default configuration.

pub mod astro;
pub mod curtain;
pub mod error;
pub mod roof;
pub mod sim;
pub mod switch;
pub mod telescope;
pub mod weather;

pub use error::{DeviceError, DeviceResult};
