use tracing_subscriber::{fmt, EnvFilter};

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

#[derive(Debug, Clone)]
pub struct RequestMetrics {
    pub method: String,
    pub path: String,
    pub status: u16,
    pub duration_us: u128,
}

impl RequestMetrics {
    pub fn log(&self) {
        const REQUEST_BUDGET_US: u128 = 250_000;
        if self.duration_us > REQUEST_BUDGET_US {
            tracing::warn!(
                method = %self.method,
                path = %self.path,
                status = self.status,
                duration_us = self.duration_us,
                "request exceeded budget ({}us > {}us)",
                self.duration_us,
                REQUEST_BUDGET_US
            );
        } else {
            tracing::debug!(
                method = %self.method,
                path = %self.path,
                status = self.status,
                duration_us = self.duration_us,
                "request completed"
            );
        }
    }
}
