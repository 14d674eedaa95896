//! Utility functions shared across the crate: cropping helpers and logging
//! setup.

pub mod bbox_crop;

pub use bbox_crop::{BBoxCrop, CropOutcome};

/// Installs a global `tracing` subscriber.
///
/// The filter is read from `RUST_LOG`; events are written by the default
/// formatter. Call once, at program start.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();
}
