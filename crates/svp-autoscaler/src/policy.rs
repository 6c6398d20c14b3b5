//! Pure scaling decisions, separated from the orchestrator client so the
//! policy is testable without Docker.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::labels::{Priority, ServiceConfig};

// ---------------------------------------------------------------------------
// Replica-gap policy
// ---------------------------------------------------------------------------

/// What to do about replicas the orchestrator wants but is not running.
#[derive(Clone, Debug, PartialEq)]
pub enum GapAction {
    /// High priority + high load: refill the gap immediately, cooldown or
    /// not.
    EmergencyScaleUp { target: u64, reason: String },
    /// Medium priority: kill the failed tasks so the orchestrator
    /// reschedules them.
    TerminateFailedTasks,
    /// Low priority: leave it to the orchestrator.
    None,
}

pub fn decide_gap_action(
    config: &ServiceConfig,
    running_replicas: u64,
    current_replicas: u64,
    metric_value: f64,
) -> GapAction {
    let gap = current_replicas.saturating_sub(running_replicas);
    if gap == 0 {
        return GapAction::None;
    }

    match config.priority {
        Priority::High if metric_value > config.threshold_up => {
            // Refill min(gap, max - current); a service already at or past
            // its cap gets no extra replicas. On-demand services have no
            // cap exemption here, only in the threshold step.
            let headroom = (config.max_replicas - current_replicas as i64).max(0) as u64;
            let target = current_replicas + gap.min(headroom);
            GapAction::EmergencyScaleUp {
                target,
                reason: format!(
                    "high priority emergency scale-up ({gap} down, load={metric_value:.1}%)"
                ),
            }
        }
        Priority::Medium => GapAction::TerminateFailedTasks,
        _ => GapAction::None,
    }
}

// ---------------------------------------------------------------------------
// Threshold scaling
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub enum ScalingDecision {
    Up { target: u64, reason: String },
    Down { target: u64, reason: String },
    AtMaxReplicas,
    None,
}

/// ±1 scaling against the thresholds. `cooldown_ok` is whether the
/// per-service cooldown has elapsed; high-priority services above the up
/// threshold bypass it.
pub fn decide_scaling(
    config: &ServiceConfig,
    current_replicas: u64,
    metric_value: f64,
    cooldown_ok: bool,
) -> ScalingDecision {
    let ignore_cooldown =
        config.priority == Priority::High && metric_value > config.threshold_up;
    if !(cooldown_ok || ignore_cooldown) {
        return ScalingDecision::None;
    }

    if metric_value > config.threshold_up {
        if config.is_on_demand() || (current_replicas as i64) < config.max_replicas {
            let metric = metric_name(config);
            let mut reason =
                format!("{metric}={metric_value:.1}% > {}%", config.threshold_up);
            if ignore_cooldown && !cooldown_ok {
                reason = format!("{reason} | cooldown bypassed (high priority)");
            }
            return ScalingDecision::Up {
                target: current_replicas + 1,
                reason,
            };
        }
        return ScalingDecision::AtMaxReplicas;
    }

    if metric_value < config.threshold_down && current_replicas > config.min_replicas {
        let metric = metric_name(config);
        return ScalingDecision::Down {
            target: current_replicas - 1,
            reason: format!("{metric}={metric_value:.1}% < {}%", config.threshold_down),
        };
    }

    ScalingDecision::None
}

fn metric_name(config: &ServiceConfig) -> &'static str {
    match config.metric {
        crate::labels::ServiceMetric::Cpu => "cpu",
        crate::labels::ServiceMetric::Memory => "memory",
    }
}

// ---------------------------------------------------------------------------
// Cooldown records
// ---------------------------------------------------------------------------

/// Last-scaled timestamps per service.
#[derive(Default)]
pub struct CooldownTracker {
    records: HashMap<String, Instant>,
    period: Duration,
}

impl CooldownTracker {
    pub fn new(period: Duration) -> Self {
        Self {
            records: HashMap::new(),
            period,
        }
    }

    pub fn can_scale(&self, service_name: &str) -> bool {
        match self.records.get(service_name) {
            Some(last) => last.elapsed() >= self.period,
            None => true,
        }
    }

    pub fn record_scale(&mut self, service_name: &str) {
        self.records.insert(service_name.to_string(), Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::ServiceMetric;

    fn config(priority: Priority) -> ServiceConfig {
        ServiceConfig {
            service_name: "svc".into(),
            priority,
            min_replicas: 1,
            max_replicas: 5,
            metric: ServiceMetric::Cpu,
            custom_query: None,
            threshold_up: 75.0,
            threshold_down: 25.0,
        }
    }

    #[test]
    fn high_priority_gap_under_load_scales_up_immediately() {
        let action = decide_gap_action(&config(Priority::High), 2, 4, 90.0);
        match action {
            GapAction::EmergencyScaleUp { target, .. } => assert_eq!(target, 5),
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn high_priority_gap_is_capped_by_max_replicas() {
        let mut cfg = config(Priority::High);
        cfg.max_replicas = 4;
        let action = decide_gap_action(&cfg, 1, 4, 90.0);
        // Gap of 3, but no headroom: target stays at current.
        assert_eq!(
            action,
            GapAction::EmergencyScaleUp {
                target: 4,
                reason: "high priority emergency scale-up (3 down, load=90.0%)".into()
            }
        );
    }

    #[test]
    fn emergency_refill_follows_min_of_gap_and_headroom() {
        // Gap of 2, headroom of 2 (max 5, current 3): refill the full gap.
        let action = decide_gap_action(&config(Priority::High), 1, 3, 90.0);
        assert_eq!(
            action,
            GapAction::EmergencyScaleUp {
                target: 5,
                reason: "high priority emergency scale-up (2 down, load=90.0%)".into()
            }
        );

        // On-demand (max = -1) gets no emergency headroom; the unlimited
        // cap only applies to threshold scaling.
        let mut cfg = config(Priority::High);
        cfg.max_replicas = -1;
        let action = decide_gap_action(&cfg, 1, 3, 90.0);
        assert_eq!(
            action,
            GapAction::EmergencyScaleUp {
                target: 3,
                reason: "high priority emergency scale-up (2 down, load=90.0%)".into()
            }
        );
    }

    #[test]
    fn medium_priority_gap_terminates_failed_tasks() {
        assert_eq!(
            decide_gap_action(&config(Priority::Medium), 1, 3, 10.0),
            GapAction::TerminateFailedTasks
        );
    }

    #[test]
    fn low_priority_gap_takes_no_action() {
        assert_eq!(
            decide_gap_action(&config(Priority::Low), 1, 3, 90.0),
            GapAction::None
        );
    }

    #[test]
    fn no_gap_means_no_gap_action() {
        assert_eq!(
            decide_gap_action(&config(Priority::High), 3, 3, 90.0),
            GapAction::None
        );
    }

    #[test]
    fn scale_up_respects_max_replicas() {
        let decision = decide_scaling(&config(Priority::Medium), 5, 90.0, true);
        assert_eq!(decision, ScalingDecision::AtMaxReplicas);

        let decision = decide_scaling(&config(Priority::Medium), 3, 90.0, true);
        assert!(matches!(decision, ScalingDecision::Up { target: 4, .. }));
    }

    #[test]
    fn on_demand_ignores_max_replicas() {
        let mut cfg = config(Priority::Medium);
        cfg.max_replicas = -1;
        let decision = decide_scaling(&cfg, 50, 90.0, true);
        assert!(matches!(decision, ScalingDecision::Up { target: 51, .. }));
    }

    #[test]
    fn scale_down_floors_at_min_replicas() {
        let decision = decide_scaling(&config(Priority::Medium), 1, 5.0, true);
        assert_eq!(decision, ScalingDecision::None);

        let decision = decide_scaling(&config(Priority::Medium), 2, 5.0, true);
        assert!(matches!(decision, ScalingDecision::Down { target: 1, .. }));
    }

    #[test]
    fn cooldown_blocks_all_but_high_priority_under_load() {
        let decision = decide_scaling(&config(Priority::Medium), 3, 90.0, false);
        assert_eq!(decision, ScalingDecision::None);

        let decision = decide_scaling(&config(Priority::High), 3, 90.0, false);
        assert!(matches!(decision, ScalingDecision::Up { .. }));
    }

    #[test]
    fn cooldown_tracker_gates_until_period_elapses() {
        let mut tracker = CooldownTracker::new(Duration::from_secs(3600));
        assert!(tracker.can_scale("svc"));
        tracker.record_scale("svc");
        assert!(!tracker.can_scale("svc"));
        assert!(tracker.can_scale("other"));
    }
}
