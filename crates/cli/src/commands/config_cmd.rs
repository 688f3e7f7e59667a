//! `switchboard config` — Configuration management commands.

use std::path::Path;

use switchboard_config::AppConfig;

pub fn show(config: &AppConfig) -> anyhow::Result<()> {
    println!("{}", redacted_toml(config)?);
    Ok(())
}

fn redacted_toml(config: &AppConfig) -> anyhow::Result<String> {
    let mut config = config.clone();
    if config.api_key.is_some() {
        config.api_key = Some("***".into());
    }
    for server in &mut config.capability_servers {
        server.env.values_mut().for_each(|v| *v = "***".into());
        server.headers.values_mut().for_each(|v| *v = "***".into());
    }
    Ok(toml::to_string_pretty(&config)?)
}

pub fn validate(path: &Path) -> anyhow::Result<()> {
    println!("Validating {}", path.display());
    let config = match AppConfig::load_from(path) {
        Ok(config) => config.with_env_overrides(),
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   Config parsed successfully");

    if !config.has_api_key() {
        println!("   Warning: no API key set (SWITCHBOARD_API_KEY or OPENAI_API_KEY)");
    }

    println!();
    println!("   API URL:             {}", config.api_url);
    println!("   Model:               {}", config.default_model);
    println!("   Gateway:             {}:{}", config.gateway.host, config.gateway.port);
    println!("   Capability servers:  {}", config.capability_servers.len());
    println!("   Agents:              {}", config.agents.len());
    Ok(())
}

pub fn init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, AppConfig::default_toml())?;
    println!("Wrote {}", path.display());
    Ok(())
}
