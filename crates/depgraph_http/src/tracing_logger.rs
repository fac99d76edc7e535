//! Bridges the orchestrator's borrowed `Logger` seam onto `tracing`, the way
//! the HTTP layer logs everything else in this binary. `depgraph_core` itself
//! stays ignorant of `tracing` — it only ever sees `impl Logger`.

use logger::Logger;

#[derive(Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for &TracingLogger {
    fn log(&self, message: impl Into<String>) {
        tracing::info!("{}", message.into());
    }

    fn warn(&self, message: impl Into<String>) {
        tracing::warn!("{}", message.into());
    }

    fn error(&self, message: impl Into<String>) {
        tracing::error!("{}", message.into());
    }
}
