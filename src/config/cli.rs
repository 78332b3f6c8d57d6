use crate::config::toml_config::ExplainerKind;
use crate::utils::error::Result;
use crate::utils::validation::{validate_path, validate_positive_number, Validate};
use clap::Parser;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "local-explain")]
#[command(about = "Counterfactual and LIME explanations for a single prediction")]
pub struct CliConfig {
    #[arg(long, short = 'c', help = "Path to the TOML job file")]
    pub config: String,

    #[arg(long, value_enum, help = "Override the explainer chosen in the job file")]
    pub explainer: Option<ExplainerKind>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,

    #[arg(long, help = "Cancel the run after this many milliseconds")]
    pub timeout: Option<u64>,
}

impl CliConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_millis)
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_path("config", &self.config)?;
        if let Some(timeout) = self.timeout {
            validate_positive_number("timeout", timeout as usize, 1)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arguments() {
        let cli = CliConfig::parse_from([
            "local-explain",
            "--config",
            "job.toml",
            "--explainer",
            "lime",
            "--timeout",
            "500",
        ]);
        assert_eq!(cli.config, "job.toml");
        assert_eq!(cli.explainer, Some(ExplainerKind::Lime));
        assert_eq!(cli.timeout(), Some(Duration::from_millis(500)));
        assert!(!cli.verbose);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_is_invalid() {
        let cli = CliConfig::parse_from(["local-explain", "-c", "job.toml", "--timeout", "0"]);
        assert!(cli.validate().is_err());
    }
}
