//! The synchronization engine: public API, scenario lifecycle, flush driver
//! and UI notices.

mod driver;
mod notice;
mod sync;

pub use notice::{Notifier, SyncNotice};
pub use sync::SyncEngine;
