//! `switchboard serve` — Start the HTTP gateway.

use switchboard_config::AppConfig;
use switchboard_gateway::bootstrap;

pub async fn run(mut config: AppConfig, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }
    if !config.has_api_key() {
        tracing::warn!("No API key set (SWITCHBOARD_API_KEY or OPENAI_API_KEY); completions may be rejected");
    }

    println!("Switchboard gateway");
    println!("   Listening: http://{}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:     {}", config.default_model);
    println!("   Agents:    {}", config.agents.len());

    let state = bootstrap::build_state(&config).await?;
    switchboard_gateway::serve(state, &config.gateway).await?;
    Ok(())
}
