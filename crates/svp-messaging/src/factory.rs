//! Broker connection factory and topology declaration.

use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, ExchangeKind};
use svp_config::{BrokerSettings, Topology};
use tracing::debug;

/// Creates broker connections and declares the exchange/queue/binding
/// layout. Connections are handed out by value: every worker and publisher
/// owns its connection for its whole lifetime (the client is not shared
/// across tasks).
#[derive(Clone)]
pub struct BrokerFactory {
    uri: String,
    topology: Topology,
}

impl BrokerFactory {
    pub fn new(settings: &BrokerSettings, topology: Topology) -> Self {
        Self {
            uri: settings.amqp_uri(),
            topology,
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub async fn connect(&self) -> Result<Connection, lapin::Error> {
        Connection::connect(&self.uri, ConnectionProperties::default()).await
    }

    pub async fn open_channel(&self, connection: &Connection) -> Result<Channel, lapin::Error> {
        connection.create_channel().await
    }

    /// Declare the topic exchange, every durable queue, and its binding.
    /// Safe to call from every participant on every (re)connect.
    pub async fn setup_infrastructure(&self, channel: &Channel) -> Result<(), lapin::Error> {
        channel
            .exchange_declare(
                &self.topology.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        for binding in self.topology.bindings() {
            channel
                .queue_declare(
                    &binding.queue,
                    QueueDeclareOptions {
                        durable: binding.durable,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await?;
            channel
                .queue_bind(
                    &binding.queue,
                    &self.topology.exchange,
                    &binding.routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
            debug!(
                queue = %binding.queue,
                routing_key = %binding.routing_key,
                "queue declared and bound"
            );
        }
        Ok(())
    }

    /// Connect, open a channel and declare the topology in one step.
    pub async fn connect_with_channel(&self) -> Result<(Connection, Channel), lapin::Error> {
        let connection = self.connect().await?;
        let channel = self.open_channel(&connection).await?;
        self.setup_infrastructure(&channel).await?;
        Ok((connection, channel))
    }
}
