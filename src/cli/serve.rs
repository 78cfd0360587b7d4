// src/cli/serve.rs — Start the HTTP chat bridge

use std::sync::Arc;

use crate::api::{self, gateway::ChatGateway, ApiState};
use crate::infra::config::Config;

pub async fn run_serve(config: &Config, gateway: Arc<ChatGateway>) -> anyhow::Result<()> {
    let state = ApiState { gateway };
    api::start_server(&config.api, state).await
}
