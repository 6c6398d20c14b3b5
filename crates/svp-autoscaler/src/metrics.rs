//! Prometheus metric sampling.

use serde_json::Value;
use svp_config::AutoscalerSettings;
use tracing::warn;

use crate::labels::{ServiceConfig, ServiceMetric};

/// Build the PromQL expression for one service: a custom query wins,
/// otherwise CPU rate or memory ratio over the configured window.
pub fn build_query(config: &ServiceConfig, settings: &AutoscalerSettings) -> String {
    if let Some(custom) = &config.custom_query {
        return custom.clone();
    }

    let window = format!("{}s", settings.metric_window_secs);
    match config.metric {
        ServiceMetric::Cpu => format!(
            "avg(rate(container_cpu_usage_seconds_total{{\
             job=\"cadvisor\",\
             container_label_com_docker_swarm_service_name=\"{}\",\
             cpu=\"total\"\
             }}[{window}])) * 100",
            config.service_name
        ),
        ServiceMetric::Memory => format!(
            "avg(container_memory_usage_bytes{{\
             job=\"cadvisor\",\
             container_label_com_docker_swarm_service_name=\"{}\"\
             }} / container_spec_memory_limit_bytes * 100)",
            config.service_name
        ),
    }
}

/// Sample the metric for one service. `None` when Prometheus is
/// unreachable or the query matched nothing; the monitor skips the
/// service for this tick.
pub async fn sample(
    http: &reqwest::Client,
    config: &ServiceConfig,
    settings: &AutoscalerSettings,
) -> Option<f64> {
    let query = build_query(config, settings);
    let response = http
        .get(format!("{}/api/v1/query", settings.prometheus_url))
        .query(&[("query", query.as_str())])
        .send()
        .await;

    let body: Value = match response {
        Ok(response) => match response.error_for_status() {
            Ok(response) => response.json().await.ok()?,
            Err(err) => {
                warn!(service = %config.service_name, %err, "prometheus returned an error");
                return None;
            }
        },
        Err(err) => {
            warn!(service = %config.service_name, %err, "prometheus unreachable");
            return None;
        }
    };

    // {"data": {"result": [{"value": [<ts>, "<float>"]}]}}
    body.get("data")?
        .get("result")?
        .get(0)?
        .get("value")?
        .get(1)?
        .as_str()?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::Priority;

    fn settings() -> AutoscalerSettings {
        AutoscalerSettings {
            check_interval_secs: 30,
            cooldown_period_secs: 120,
            metric_window_secs: 60,
            prometheus_url: "http://prometheus:9090".into(),
            stack_name: String::new(),
            default_min_replicas: 1,
            default_max_replicas: 3,
        }
    }

    fn config(metric: ServiceMetric, custom: Option<&str>) -> ServiceConfig {
        ServiceConfig {
            service_name: "svp_worker".into(),
            priority: Priority::Medium,
            min_replicas: 1,
            max_replicas: 3,
            metric,
            custom_query: custom.map(str::to_string),
            threshold_up: 75.0,
            threshold_down: 25.0,
        }
    }

    #[test]
    fn cpu_query_uses_rate_over_the_window() {
        let query = build_query(&config(ServiceMetric::Cpu, None), &settings());
        assert!(query.contains("rate(container_cpu_usage_seconds_total"));
        assert!(query.contains("[60s]"));
        assert!(query.contains("svp_worker"));
        assert!(query.ends_with("* 100"));
    }

    #[test]
    fn memory_query_divides_by_the_limit() {
        let query = build_query(&config(ServiceMetric::Memory, None), &settings());
        assert!(query.contains("container_memory_usage_bytes"));
        assert!(query.contains("container_spec_memory_limit_bytes"));
    }

    #[test]
    fn custom_query_wins() {
        let query = build_query(
            &config(ServiceMetric::Cpu, Some("my_queue_depth > 10")),
            &settings(),
        );
        assert_eq!(query, "my_queue_depth > 10");
    }
}
