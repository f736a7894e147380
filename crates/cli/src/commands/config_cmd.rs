//! `ferrocode config` — Configuration management commands.

use clap::Subcommand;
use ferrocode_config::AppConfig;

use super::{CmdResult, GlobalOpts};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the default configuration as TOML
    Default,
    /// Print the effective configuration (keys redacted)
    Show,
    /// Print the config file path
    Path,
    /// Load and validate the configuration
    Validate,
}

pub fn run(opts: &GlobalOpts, action: Option<ConfigAction>) -> CmdResult {
    match action.unwrap_or(ConfigAction::Default) {
        ConfigAction::Default => {
            print!("{}", AppConfig::default_toml());
            Ok(())
        }
        ConfigAction::Show => show(opts),
        ConfigAction::Path => {
            println!("{}", config_path(opts).display());
            Ok(())
        }
        ConfigAction::Validate => validate(opts),
    }
}

fn config_path(opts: &GlobalOpts) -> std::path::PathBuf {
    opts.config
        .clone()
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

fn show(opts: &GlobalOpts) -> CmdResult {
    let config = opts.load_config()?;
    println!("{}", toml::to_string_pretty(&redacted(config))?);
    Ok(())
}

/// Replace every API key with a placeholder.
fn redacted(mut config: AppConfig) -> AppConfig {
    if config.api_key.is_some() {
        config.api_key = Some("***".into());
    }
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some("***".into());
        }
    }
    config
}

fn validate(opts: &GlobalOpts) -> CmdResult {
    println!("Validating {}", config_path(opts).display());
    let config = match opts.load_config() {
        Ok(config) => config,
        Err(e) => {
            println!("   ✗ {e}");
            return Err(e);
        }
    };
    println!("   ✓ Config parsed and validated");

    let mut warnings = Vec::new();
    if let Err(e) = ferrocode_providers::build_client(&config) {
        warnings.push(format!("Provider: {e}"));
    }
    let root = config.workspace_root();
    if !root.is_dir() {
        warnings.push(format!("Workspace root {} is not a directory", root.display()));
    }
    for extra in &config.extra_roots {
        if !extra.is_dir() {
            warnings.push(format!("Extra root {} is not a directory", extra.display()));
        }
    }

    if warnings.is_empty() {
        println!("   ✓ All checks passed");
    } else {
        for w in &warnings {
            println!("   ⚠ {w}");
        }
    }

    println!();
    println!("   Provider:   {}", config.provider);
    println!("   Model:      {}", config.model);
    println!("   Workspace:  {}", root.display());
    println!("   Iterations: {}", config.agent.max_iterations);
    println!(
        "   Timeouts:   tool {}s, llm {}s, run {}s",
        config.agent.tool_timeout_secs, config.agent.llm_timeout_secs, config.agent.run_timeout_secs
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrocode_config::ProviderConfig;

    #[test]
    fn redaction_hides_every_key() {
        let mut config = AppConfig::default();
        config.api_key = Some("sk-secret".into());
        config.providers.insert(
            "openrouter".into(),
            ProviderConfig {
                api_key: Some("sk-or-secret".into()),
                ..ProviderConfig::default()
            },
        );
        let rendered = toml::to_string_pretty(&redacted(config)).unwrap();
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn explicit_path_wins() {
        let opts = GlobalOpts {
            config: Some("/tmp/custom.toml".into()),
            workspace: None,
        };
        assert_eq!(config_path(&opts), std::path::PathBuf::from("/tmp/custom.toml"));
    }
}
