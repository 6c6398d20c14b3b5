//! Control loop over the Docker Engine API.

use std::collections::HashMap;
use std::time::Duration;

use bollard::service::{ListServicesOptions, UpdateServiceOptions};
use bollard::Docker;
use svp_config::AutoscalerSettings;
use tracing::{debug, error, info, warn};

use crate::labels::{self, ServiceConfig};
use crate::metrics;
use crate::policy::{decide_gap_action, decide_scaling, CooldownTracker, GapAction, ScalingDecision};

pub struct Monitor {
    docker: Docker,
    http: reqwest::Client,
    settings: AutoscalerSettings,
    cooldowns: CooldownTracker,
}

impl Monitor {
    pub fn new(docker: Docker, settings: AutoscalerSettings) -> Self {
        let cooldowns = CooldownTracker::new(Duration::from_secs(settings.cooldown_period_secs));
        Self {
            docker,
            http: reqwest::Client::new(),
            settings,
            cooldowns,
        }
    }

    /// Poll forever; each tick evaluates every enabled service. Errors on
    /// one service never stop the loop.
    pub async fn run(&mut self) {
        info!("autoscaler started");
        loop {
            if let Err(err) = self.tick().await {
                error!(%err, "autoscaler tick failed");
            }
            tokio::time::sleep(Duration::from_secs(self.settings.check_interval_secs)).await;
        }
    }

    pub async fn tick(&mut self) -> Result<(), bollard::errors::Error> {
        let services = self
            .docker
            .list_services(None::<ListServicesOptions<String>>)
            .await?;
        debug!(count = services.len(), "services listed");

        for service in services {
            let Some(spec) = &service.spec else { continue };
            let Some(name) = spec.name.clone() else { continue };
            let service_labels = spec.labels.clone().unwrap_or_default();

            let Some(config) = labels::extract(&name, &service_labels, &self.settings) else {
                continue;
            };

            if let Err(err) = self.evaluate(&service, &config).await {
                error!(service = %name, %err, "error evaluating service");
            }
        }
        Ok(())
    }

    async fn evaluate(
        &mut self,
        service: &bollard::models::Service,
        config: &ServiceConfig,
    ) -> Result<(), bollard::errors::Error> {
        let Some(metric_value) = metrics::sample(&self.http, config, &self.settings).await else {
            debug!(service = %config.service_name, "no valid metrics, skipping");
            return Ok(());
        };

        let current = current_replicas(service);
        let running = self.running_replicas(&config.service_name).await?;

        match decide_gap_action(config, running, current, metric_value) {
            GapAction::EmergencyScaleUp { target, reason } => {
                warn!(service = %config.service_name, %reason, "replica gap detected");
                self.scale(service, config, target, &reason).await?;
            }
            GapAction::TerminateFailedTasks => {
                self.terminate_failed_tasks(&config.service_name).await?;
            }
            GapAction::None => {}
        }

        let cooldown_ok = self.cooldowns.can_scale(&config.service_name);
        match decide_scaling(config, current, metric_value, cooldown_ok) {
            ScalingDecision::Up { target, reason } | ScalingDecision::Down { target, reason } => {
                self.scale(service, config, target, &reason).await?;
            }
            ScalingDecision::AtMaxReplicas => {
                warn!(
                    service = %config.service_name,
                    max_replicas = config.max_replicas,
                    "service at max replicas"
                );
            }
            ScalingDecision::None => {
                debug!(service = %config.service_name, "no action required");
            }
        }
        Ok(())
    }

    /// Count this service's tasks currently in the `running` state.
    async fn running_replicas(&self, service_name: &str) -> Result<u64, bollard::errors::Error> {
        let mut filters = HashMap::new();
        filters.insert("service".to_string(), vec![service_name.to_string()]);
        let tasks = self
            .docker
            .list_tasks(Some(bollard::task::ListTasksOptions { filters }))
            .await?;

        Ok(tasks
            .iter()
            .filter(|task| {
                task.status
                    .as_ref()
                    .and_then(|status| status.state.as_ref())
                    .map(|state| *state == bollard::models::TaskState::RUNNING)
                    .unwrap_or(false)
            })
            .count() as u64)
    }

    async fn scale(
        &mut self,
        service: &bollard::models::Service,
        config: &ServiceConfig,
        target_replicas: u64,
        reason: &str,
    ) -> Result<(), bollard::errors::Error> {
        let current = current_replicas(service);
        let version = service
            .version
            .as_ref()
            .and_then(|version| version.index)
            .unwrap_or_default();

        let mut spec = service.spec.clone().unwrap_or_default();
        if let Some(mode) = spec.mode.as_mut() {
            if let Some(replicated) = mode.replicated.as_mut() {
                replicated.replicas = Some(target_replicas as i64);
            }
        }

        self.docker
            .update_service(
                &config.service_name,
                spec,
                UpdateServiceOptions {
                    version,
                    ..Default::default()
                },
                None,
            )
            .await?;

        let direction = if target_replicas > current { "UP" } else { "DOWN" };
        info!(
            service = %config.service_name,
            %direction,
            from = current,
            to = target_replicas,
            %reason,
            "service scaled"
        );
        self.cooldowns.record_scale(&config.service_name);
        Ok(())
    }

    /// Medium-priority gap handling: kill the containers of tasks that are
    /// neither running nor starting so the orchestrator reschedules them.
    async fn terminate_failed_tasks(
        &self,
        service_name: &str,
    ) -> Result<(), bollard::errors::Error> {
        let mut filters = HashMap::new();
        filters.insert("service".to_string(), vec![service_name.to_string()]);
        let tasks = self
            .docker
            .list_tasks(Some(bollard::task::ListTasksOptions { filters }))
            .await?;

        for task in tasks {
            let state = task.status.as_ref().and_then(|status| status.state.as_ref());
            let live = matches!(
                state,
                Some(bollard::models::TaskState::RUNNING)
                    | Some(bollard::models::TaskState::STARTING)
            );
            if live {
                continue;
            }

            let container_id = task
                .status
                .as_ref()
                .and_then(|status| status.container_status.as_ref())
                .and_then(|container| container.container_id.clone());
            let Some(container_id) = container_id else { continue };

            info!(
                service = %service_name,
                task_id = task.id.as_deref().unwrap_or(""),
                state = ?state,
                "terminating failed task"
            );
            if let Err(err) = self
                .docker
                .kill_container(
                    &container_id,
                    None::<bollard::container::KillContainerOptions<String>>,
                )
                .await
            {
                error!(%container_id, %err, "failed to terminate task container");
            }
        }
        Ok(())
    }
}

fn current_replicas(service: &bollard::models::Service) -> u64 {
    service
        .spec
        .as_ref()
        .and_then(|spec| spec.mode.as_ref())
        .and_then(|mode| mode.replicated.as_ref())
        .and_then(|replicated| replicated.replicas)
        .unwrap_or(0) as u64
}
