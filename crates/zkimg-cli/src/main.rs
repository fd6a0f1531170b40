//! # zkimg CLI entry point
//!
//! Parses arguments, sets up tracing and dispatches to the subcommand
//! handlers in `zkimg_cli`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use zkimg_cli::inspect::{run_inspect, InspectArgs};
use zkimg_cli::verify::VerifyArgs;
use zkimg_cli::warm::WarmArgs;
use zkimg_cli::{load_config, run_service_command, ServiceCommand};

/// zkimg: zero-knowledge image provenance tooling.
///
/// Verifies proof chains and tile proof sets, warms the circuit artifact
/// store, and inspects what a bundle discloses.
#[derive(Parser, Debug)]
#[command(name = "zkimg", version, about, long_about = None)]
struct Cli {
    /// Verbose output. Repeat for more (-v, -vv, -vvv). Ignored when
    /// RUST_LOG is set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// YAML configuration file, layered under ZKIMG_* variables.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Verify a chain bundle or tile proof set. Exits 1 when invalid.
    Verify(VerifyArgs),

    /// Precompile a circuit into the artifact store.
    Warm(WarmArgs),

    /// Print the disclosed commitments and circuit keys of a bundle.
    Inspect(InspectArgs),
}

fn filter_for(verbose: u8) -> EnvFilter {
    if std::env::var_os("RUST_LOG").is_some() {
        return EnvFilter::from_default_env();
    }
    match verbose {
        0 => EnvFilter::new("info"),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(filter_for(cli.verbose))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Inspect(args) => run_inspect(&args),
        Commands::Verify(args) => run(ServiceCommand::Verify(args), cli.config).await,
        Commands::Warm(args) => run(ServiceCommand::Warm(args), cli.config).await,
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(command: ServiceCommand, config: Option<PathBuf>) -> anyhow::Result<u8> {
    let config = load_config(config.as_deref())?;
    run_service_command(&command, &config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_verify() {
        let cli = Cli::try_parse_from(["zkimg", "verify", "bundle.json"]).unwrap();
        let Commands::Verify(args) = cli.command else {
            panic!("expected verify");
        };
        assert_eq!(args.bundle, PathBuf::from("bundle.json"));
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn parse_warm_with_params() {
        let cli = Cli::try_parse_from([
            "zkimg",
            "-vv",
            "warm",
            "--kind",
            "crop",
            "--param",
            "orig_width=64",
            "--param",
            "orig_height=48",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Warm(args) = cli.command else {
            panic!("expected warm");
        };
        assert_eq!(args.kind, "crop");
        assert_eq!(
            args.params,
            vec![("orig_width".to_string(), 64), ("orig_height".to_string(), 48)]
        );
    }

    #[test]
    fn bad_param_is_a_parse_error() {
        assert!(Cli::try_parse_from(["zkimg", "warm", "--kind", "crop", "--param", "width"]).is_err());
    }

    #[test]
    fn global_config_flag() {
        let cli = Cli::try_parse_from(["zkimg", "inspect", "b.json", "--config", "zkimg.yaml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("zkimg.yaml")));
    }
}
