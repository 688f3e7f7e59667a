//! `switchboard agents` — List the agents the configuration defines.

use switchboard_config::AppConfig;
use switchboard_gateway::bootstrap::agent_definition;

pub fn run(config: &AppConfig, json: bool) -> anyhow::Result<()> {
    if json {
        let cards: Vec<_> = config
            .agents
            .iter()
            .map(|agent| agent_definition(config, agent).card())
            .collect();
        println!("{}", serde_json::to_string_pretty(&cards)?);
    } else {
        print!("{}", render(config));
    }
    Ok(())
}

fn render(config: &AppConfig) -> String {
    if config.agents.is_empty() {
        return "No agents configured. Add [[agents]] entries to the config file.\n".into();
    }

    let mut out = String::new();
    for agent in &config.agents {
        let definition = agent_definition(config, agent);
        out.push_str(&format!("{}  ({})\n", definition.id, definition.name));
        out.push_str(&format!("   Model:  {}\n", definition.model));
        if let Some(server) = &agent.capability_server {
            let tools = match &agent.allowed_tools {
                Some(allowed) => {
                    let mut names: Vec<&str> = allowed.iter().map(String::as_str).collect();
                    names.sort_unstable();
                    names.join(", ")
                }
                None => "all".into(),
            };
            out.push_str(&format!("   Tools:  {server} [{tools}]\n"));
        }
        if !definition.description.is_empty() {
            out.push_str(&format!("   {}\n", definition.description));
        }
    }
    out
}
