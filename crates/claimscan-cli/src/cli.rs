use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "claimscan")]
#[command(
    author,
    version,
    about = "Scan healthcare claims for fraud and billing discrepancies with declarative rules"
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "claimscan.yaml")]
    pub config: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply rules to a claims file
    Run(RunArgs),

    /// Parse every rule and report problems without reading claims
    CheckRules {
        /// Rules file (csv, json, yaml)
        #[arg(short, long)]
        rules: PathBuf,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Rules file (csv, json, yaml)
    #[arg(short, long)]
    pub rules: PathBuf,

    /// Claims file (csv, json)
    #[arg(long)]
    pub claims: PathBuf,

    /// Write the violation table (csv or json)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Write the de-duplicated report (csv, or json with per-rule sections)
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Write summary statistics as json
    #[arg(long)]
    pub stats: Option<PathBuf>,

    /// Write the hash-chained audit trail as json
    #[arg(long)]
    pub audit: Option<PathBuf>,

    /// Write Prometheus metrics in text exposition format
    #[arg(long)]
    pub metrics: Option<PathBuf>,

    /// Fail rules that reference columns missing from the claims
    #[arg(long)]
    pub strict_columns: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "claimscan",
            "run",
            "--rules",
            "rules.csv",
            "--claims",
            "claims.csv",
            "--strict-columns",
            "--log-format",
            "json",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.config, "claimscan.yaml");
        match cli.command {
            Commands::Run(args) => {
                assert!(args.strict_columns);
                assert_eq!(args.claims, PathBuf::from("claims.csv"));
                assert!(args.output.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_check_rules() {
        let cli = Cli::try_parse_from(["claimscan", "check-rules", "-r", "rules.yaml"]).unwrap();
        assert!(matches!(cli.command, Commands::CheckRules { .. }));
        assert!(Cli::try_parse_from(["claimscan", "run", "--rules", "r.csv"]).is_err());
    }
}
