use azmon_cloud::MonitorCollector;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub collector: Arc<MonitorCollector>,
}

impl AppState {
    pub fn new(collector: MonitorCollector) -> Self {
        Self {
            collector: Arc::new(collector),
        }
    }
}
