use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::output::{Formatter, get_formatter};
use crate::models::{Config, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Write a config file with default values")]
    Init {
        #[arg(long, help = "Force overwrite existing config")]
        force: bool,
    },
    #[command(about = "Show the effective configuration (file + environment)")]
    Show,
    #[command(about = "Show the configuration file path")]
    Path,
    #[command(about = "Set a single value, e.g. `pipeline.workers 8`")]
    Set {
        #[arg(help = "Dotted key such as pipeline.workers")]
        key: String,
        #[arg(help = "New value")]
        value: String,
    },
}

pub async fn handle_config(cmd: ConfigCommand, format: OutputFormat, _verbose: bool) -> Result<()> {
    let formatter = get_formatter(format);

    match cmd {
        ConfigCommand::Init { force } => handle_init(force, formatter.as_ref()),
        ConfigCommand::Show => handle_show(format),
        ConfigCommand::Path => handle_path(),
        ConfigCommand::Set { key, value } => handle_set(&key, &value, formatter.as_ref()),
    }
}

fn config_path() -> Result<std::path::PathBuf> {
    Config::config_path().ok_or_else(|| anyhow::anyhow!("could not determine config directory"))
}

fn handle_init(force: bool, formatter: &dyn Formatter) -> Result<()> {
    let path = config_path()?;
    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at: {}\nUse --force to overwrite.",
            path.display()
        );
    }

    Config::default()
        .save_to(&path)
        .context("failed to write config")?;
    print!(
        "{}",
        formatter.format_message(&format!("Created config at: {}", path.display()))
    );
    Ok(())
}

fn handle_show(format: OutputFormat) -> Result<()> {
    let mut config = Config::load()?;
    if config.embedding.api_key.is_some() {
        config.embedding.api_key = Some("********".to_string());
    }
    if config.vector_store.api_key.is_some() {
        config.vector_store.api_key = Some("********".to_string());
    }

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    if let Some(path) = Config::config_path().filter(|p| p.exists()) {
        println!("# Config file: {}", path.display());
        println!();
    }
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn handle_path() -> Result<()> {
    let path = config_path()?;
    let state = if path.exists() { "active" } else { "would be" };
    println!("Config file ({}): {}", state, path.display());

    if let Ok(cwd) = std::env::current_dir() {
        let env_path = cwd.join(".env");
        if env_path.exists() {
            println!(".env file (active): {}", env_path.display());
        }
    }
    Ok(())
}

fn handle_set(key: &str, value: &str, formatter: &dyn Formatter) -> Result<()> {
    let path = config_path()?;
    let mut config = if path.exists() {
        Config::load_from(&path).context("failed to read config")?
    } else {
        Config::default()
    };

    config
        .set_value(key, value)
        .with_context(|| format!("cannot set {}", key))?;
    config.save_to(&path).context("failed to write config")?;

    print!(
        "{}",
        formatter.format_message(&format!("Set {} = {} in {}", key, value, path.display()))
    );
    Ok(())
}
