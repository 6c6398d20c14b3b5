//! Per-service scaling configuration, extracted from Swarm service labels.

use std::collections::HashMap;

use svp_config::AutoscalerSettings;

pub const LABEL_ENABLED: &str = "svp.autoscaler.enabled";
pub const LABEL_PRIORITY: &str = "svp.autoscaler.priority";
pub const LABEL_MIN: &str = "svp.autoscaler.min-replicas";
pub const LABEL_MAX: &str = "svp.autoscaler.max-replicas";
pub const LABEL_METRIC: &str = "svp.autoscaler.metric";
pub const LABEL_CUSTOM_QUERY: &str = "svp.autoscaler.custom-query";
pub const LABEL_UP: &str = "svp.autoscaler.threshold-up";
pub const LABEL_DOWN: &str = "svp.autoscaler.threshold-down";
pub const LABEL_STACK: &str = "com.docker.stack.namespace";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    fn parse(raw: &str) -> Self {
        match raw {
            "high" => Priority::High,
            "low" => Priority::Low,
            _ => Priority::Medium,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ServiceMetric {
    #[default]
    Cpu,
    Memory,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ServiceConfig {
    pub service_name: String,
    pub priority: Priority,
    pub min_replicas: u64,
    /// `-1` = unlimited / on-demand.
    pub max_replicas: i64,
    pub metric: ServiceMetric,
    pub custom_query: Option<String>,
    pub threshold_up: f64,
    pub threshold_down: f64,
}

impl ServiceConfig {
    pub fn is_on_demand(&self) -> bool {
        self.max_replicas < 0
    }
}

/// Extract the scaling config for one service. Returns `None` when the
/// service is not enabled or belongs to a different stack.
pub fn extract(
    service_name: &str,
    service_labels: &HashMap<String, String>,
    settings: &AutoscalerSettings,
) -> Option<ServiceConfig> {
    let enabled = service_labels
        .get(LABEL_ENABLED)
        .map(|raw| raw.to_lowercase() == "true")
        .unwrap_or(false);
    if !enabled {
        return None;
    }

    if !settings.stack_name.is_empty() {
        let stack = service_labels
            .get(LABEL_STACK)
            .map(String::as_str)
            .unwrap_or("");
        if stack != settings.stack_name {
            return None;
        }
    }

    let max_replicas = match service_labels.get(LABEL_MAX).map(String::as_str) {
        Some("on-demand") | Some("unlimited") | Some("-1") => -1,
        Some(raw) => raw.parse().unwrap_or(settings.default_max_replicas),
        None => settings.default_max_replicas,
    };

    Some(ServiceConfig {
        service_name: service_name.to_string(),
        priority: service_labels
            .get(LABEL_PRIORITY)
            .map(|raw| Priority::parse(raw))
            .unwrap_or_default(),
        min_replicas: service_labels
            .get(LABEL_MIN)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(settings.default_min_replicas),
        max_replicas,
        metric: match service_labels.get(LABEL_METRIC).map(String::as_str) {
            Some("memory") => ServiceMetric::Memory,
            _ => ServiceMetric::Cpu,
        },
        custom_query: service_labels.get(LABEL_CUSTOM_QUERY).cloned(),
        threshold_up: service_labels
            .get(LABEL_UP)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(75.0),
        threshold_down: service_labels
            .get(LABEL_DOWN)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(25.0),
    })
}
