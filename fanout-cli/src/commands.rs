//! CLI subcommand handlers.

use crate::{Commands, ConfigAction, Options};
use fanout_core::gateway::AppState;
use fanout_core::{
    FanOutCandidate, FanOutConfig, FanOutRequest, Pipeline, ToolResponse,
    validate_result,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, options: &Options) -> anyhow::Result<()> {
    match command {
        Commands::Serve { host, port } => handle_serve(options, host, port).await,
        Commands::Generate {
            keyword,
            content,
            file,
            fan_out,
        } => handle_generate(options, keyword, content, file.as_deref(), fan_out).await,
        Commands::Check { file } => handle_check(&file),
        Commands::Config { action } => handle_config(action, options),
    }
}

/// Load layered configuration and apply the global CLI overrides.
fn load(options: &Options) -> anyhow::Result<FanOutConfig> {
    let mut config =
        fanout_core::load_config(Some(&options.workspace), options.config_file.as_deref())
            .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    if let Some(model) = &options.model {
        config.llm.model = model.clone();
    }
    for warning in config.validate() {
        warn!("{}", warning);
    }
    Ok(config)
}

async fn handle_serve(
    options: &Options,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let mut config = load(options)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let pipeline = Pipeline::from_env(&config)?;
    let state = Arc::new(AppState::new(pipeline, &config.server)?);
    fanout_core::gateway::run(&config.server, state).await?;
    Ok(())
}

async fn handle_generate(
    options: &Options,
    keyword: String,
    content: Option<String>,
    file: Option<&Path>,
    fan_out: bool,
) -> anyhow::Result<()> {
    let mut config = load(options)?;
    if fan_out {
        config.pipeline.force_fan_out = true;
    }

    let mut request = FanOutRequest::new(keyword, content);
    if let Some(path) = file {
        let bytes = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        request.append_upload(&filename, &bytes)?;
    }

    let pipeline = Pipeline::from_env(&config)?;
    let response = pipeline.run_tool(&request).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    match response {
        ToolResponse::Result(result) => {
            info!(blocks = result.blocks.len(), "Generation complete");
            Ok(())
        }
        ToolResponse::Error(message) => anyhow::bail!(message),
    }
}

fn handle_check(file: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file.display(), e))?;
    let candidate: FanOutCandidate = serde_json::from_str(&text)?;
    match validate_result(&candidate) {
        Ok(result) => {
            println!(
                "OK: {} answer blocks for '{}'",
                result.blocks.len(),
                result.main_keyword
            );
            Ok(())
        }
        Err(e) => anyhow::bail!("Invalid result: {}", e),
    }
}

fn handle_config(action: ConfigAction, options: &Options) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = options.workspace.join(".fanout");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            std::fs::write(&config_path, FanOutConfig::default().to_toml()?)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load(options)?;
            println!("{}", config.to_toml()?);
            Ok(())
        }
    }
}
