mod controller;
mod error;
mod metrics;
mod resolver;

pub mod reconciler;
pub mod settings;
pub mod telemetry;

pub use crate::controller::{Context, KubeletConfigController};
pub use crate::error::{Error, Result};
pub use crate::metrics::ReconcileMetrics;
pub use crate::reconciler::{KubeletConfigReconciler, ReconcileOutcome};
pub use crate::settings::ReconcilerSettings;
