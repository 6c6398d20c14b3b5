//! Broker topology: one topic exchange, four durable queues.

use svp_schemas::{MessagingParams, QueueBinding};

use crate::{env_or, BrokerSettings};

/// Exchange + queue/binding layout declared by every broker participant.
/// Declaration is idempotent, so workers, publishers and gateways all call
/// it on startup without coordination.
#[derive(Clone, Debug)]
pub struct Topology {
    pub exchange: String,
    pub queue_schemas: QueueBinding,
    pub queue_validations: QueueBinding,
    pub queue_schemas_results: QueueBinding,
    pub queue_validations_results: QueueBinding,
}

impl Topology {
    pub fn from_env() -> Self {
        Self {
            exchange: env_or("SVP_BROKER_EXCHANGE", "svp.exchange"),
            queue_schemas: QueueBinding {
                queue: env_or("SVP_QUEUE_SCHEMAS", "svp.schemas.queue"),
                routing_key: env_or("SVP_ROUTING_KEY_SCHEMAS", "schemas.*"),
                durable: true,
            },
            queue_validations: QueueBinding {
                queue: env_or("SVP_QUEUE_VALIDATIONS", "svp.validations.queue"),
                routing_key: env_or("SVP_ROUTING_KEY_VALIDATIONS", "validation.*"),
                durable: true,
            },
            queue_schemas_results: QueueBinding {
                queue: env_or("SVP_QUEUE_SCHEMAS_RESULTS", "svp.schemas.results.queue"),
                routing_key: env_or("SVP_ROUTING_KEY_SCHEMAS_RESULTS", "schemas.result.*"),
                durable: true,
            },
            queue_validations_results: QueueBinding {
                queue: env_or(
                    "SVP_QUEUE_VALIDATIONS_RESULTS",
                    "svp.validations.results.queue",
                ),
                routing_key: env_or("SVP_ROUTING_KEY_VALIDATIONS_RESULTS", "validation.result.*"),
                durable: true,
            },
        }
    }

    pub fn bindings(&self) -> [&QueueBinding; 4] {
        [
            &self.queue_schemas,
            &self.queue_validations,
            &self.queue_schemas_results,
            &self.queue_validations_results,
        ]
    }

    /// The shareable parameter set served by the messaging gateway.
    /// The broker password deliberately stays out of it.
    pub fn messaging_params(&self, broker: &BrokerSettings) -> MessagingParams {
        MessagingParams {
            host: broker.host.clone(),
            port: broker.port,
            virtual_host: broker.virtual_host.clone(),
            username: broker.username.clone(),
            exchange: self.exchange.clone(),
            queues: self.bindings().into_iter().cloned().collect(),
        }
    }
}

/// Routing key the publisher stamps on outbound requests.
pub fn publisher_routing_key(kind: svp_schemas::TaskKind) -> &'static str {
    match kind {
        svp_schemas::TaskKind::Schemas => "schemas.update",
        svp_schemas::TaskKind::Validation => "validation.request",
    }
}

/// Routing key workers use to publish results.
pub fn result_routing_key(kind: svp_schemas::TaskKind) -> &'static str {
    match kind {
        svp_schemas::TaskKind::Schemas => "schemas.result.update",
        svp_schemas::TaskKind::Validation => "validation.result.request",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svp_schemas::TaskKind;

    /// Topic-exchange match: `*` matches exactly one dot-delimited word.
    fn topic_matches(pattern: &str, key: &str) -> bool {
        let pattern: Vec<&str> = pattern.split('.').collect();
        let key: Vec<&str> = key.split('.').collect();
        pattern.len() == key.len()
            && pattern
                .iter()
                .zip(&key)
                .all(|(p, k)| *p == "*" || p == k)
    }

    #[test]
    fn publisher_keys_land_in_request_queues_only() {
        let topology = Topology::from_env();
        let schemas_key = publisher_routing_key(TaskKind::Schemas);

        assert!(topic_matches(
            &topology.queue_schemas.routing_key,
            schemas_key
        ));
        assert!(!topic_matches(
            &topology.queue_schemas_results.routing_key,
            schemas_key
        ));
    }

    #[test]
    fn result_keys_land_in_result_queues_only() {
        let topology = Topology::from_env();
        let key = result_routing_key(TaskKind::Validation);

        assert!(topic_matches(
            &topology.queue_validations_results.routing_key,
            key
        ));
        assert!(!topic_matches(
            &topology.queue_validations.routing_key,
            key
        ));
    }
}
