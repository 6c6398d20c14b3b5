//! Shared state for the edge process.

use tokio::sync::Mutex;

use svp_client::DataGatewayClient;
use svp_messaging::Publisher;

pub struct ApiState {
    /// Publisher owns one broker channel; publishes are serialized.
    pub publisher: Mutex<Publisher>,
    pub client: DataGatewayClient,
    /// Static bearer token; `None` disables the auth check (dev mode).
    pub auth_token: Option<String>,
}

impl ApiState {
    pub fn new(
        publisher: Publisher,
        client: DataGatewayClient,
        auth_token: Option<String>,
    ) -> Self {
        Self {
            publisher: Mutex::new(publisher),
            client,
            auth_token,
        }
    }
}
