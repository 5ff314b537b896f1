//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::{
    config::{BackgroundFill, ServiceConfig},
    credits::{CreditStore, JsonFileCreditStore},
};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Convert CLI arguments into library configuration
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the service configuration
    ///
    /// Starts from `--config` (or defaults), then applies command line
    /// overrides on top.
    pub(crate) fn from_cli(cli: &Cli) -> Result<ServiceConfig> {
        let mut config = match &cli.config {
            Some(path) => ServiceConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => ServiceConfig::default(),
        };

        if let Some(background) = &cli.background {
            config.background = Self::parse_background(background)?;
        }
        if let Some(max_size) = cli.max_size {
            config.limits.max_file_size = max_size;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Credit store: `--credits-file` or the per-user default location
    pub(crate) fn credit_store(cli: &Cli) -> Result<Arc<dyn CreditStore>> {
        let store = match &cli.credits_file {
            Some(path) => JsonFileCreditStore::new(path),
            None => JsonFileCreditStore::default_location()
                .context("Failed to resolve default credit file location")?,
        };
        tracing::debug!(path = %store.path().display(), "Using credit store");
        Ok(Arc::new(store))
    }

    pub(crate) fn parse_background(value: &str) -> Result<BackgroundFill> {
        BackgroundFill::parse(value).with_context(|| {
            format!(
                "Invalid background '{}': expected 'transparent', #RRGGBB or #RGB",
                value
            )
        })
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if let Some(background) = &cli.background {
            Self::parse_background(background)?;
        }
        if cli.max_size == Some(0) {
            anyhow::bail!("--max-size must be at least 1 byte");
        }
        if let Some(pattern) = &cli.pattern {
            glob::Pattern::new(pattern)
                .with_context(|| format!("Invalid file pattern '{}'", pattern))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackgroundColor;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("bgstrip").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_without_overrides() {
        let cli = parse(&["photo.png"]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = parse(&["photo.png", "--background", "#10b981", "--max-size", "2048"]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        assert_eq!(
            config.background,
            BackgroundFill::Solid(BackgroundColor::new(0x10, 0xb9, 0x81))
        );
        assert_eq!(config.limits.max_file_size, 2048);
    }

    #[test]
    fn test_config_file_then_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bgstrip.json");
        std::fs::write(
            &path,
            r#"{"classifier": {"brightness_threshold": 180}, "limits": {"max_file_size": 4096}}"#,
        )
        .unwrap();

        let cli = parse(&["a.png", "--config", path.to_str().unwrap(), "--max-size", "100"]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(config.classifier.brightness_threshold, 180);
        assert_eq!(config.classifier.channel_tolerance, 30);
        assert_eq!(config.limits.max_file_size, 100);
    }

    #[test]
    fn test_cli_validation() {
        assert!(CliConfigBuilder::validate_cli(&parse(&["a.png"])).is_ok());
        assert!(CliConfigBuilder::validate_cli(&parse(&["a.png", "--background", "teal"])).is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&["a.png", "--max-size", "0"])).is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&["dir", "--pattern", "[*.png"])).is_err());
    }

    #[test]
    fn test_credit_store_from_flag() {
        let cli = parse(&["a.png", "--credits-file", "/tmp/bgstrip-test/credits.json"]);
        assert!(CliConfigBuilder::credit_store(&cli).is_ok());
    }
}
