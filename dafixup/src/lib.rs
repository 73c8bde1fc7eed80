//! Launch-time binary patch resolution for the DiskArbitrationAgent
//! unreadable-disk dialog.
//!
//! The flow mirrors how the patch is applied on a live system: at module
//! init the host calls [`agent::register`], which reads the target binary
//! once, resolves the wildcard byte of the find/replace templates against
//! the real instruction stream, and hands fully concrete patch descriptors
//! to the load-time interception service. Everything after that point (the
//! actual memory patch of the launching process) belongs to the service.

pub mod agent;
pub mod config;
pub mod definitions;
pub mod descriptor;
pub mod dispatch;
pub mod host;
pub mod resolver;
pub mod template;

pub mod scanner {
    pub use dafixup_scanner::*;
}
