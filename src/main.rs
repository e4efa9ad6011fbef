use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;

use vcprobe::collector::TelegrafCollector;
use vcprobe::config::{LogLevel, SettingsLoader};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(
    name = "vcprobe",
    version,
    about = "Gather one vSphere metric and write its value to metrics.txt"
)]
struct Args {
    /// Optional TOML file with operational overrides
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logging level (overrides the configured one)
    #[arg(short, long, value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut loader = SettingsLoader::new();
    if let Some(path) = &args.config {
        loader = loader.add_file(path);
    }

    let settings = match loader.load() {
        Ok(settings) => {
            vcprobe::init_logging(&args.log_level.unwrap_or(settings.options.log_level));
            settings
        }
        Err(e) => {
            // Initialize logger with default level for error reporting
            vcprobe::init_logging(&args.log_level.unwrap_or(LogLevel::Error));
            return Err(e.into());
        }
    };

    info!("vcprobe {} starting", vcprobe::VERSION);

    let collector = TelegrafCollector::new(settings.options.telegraf_bin.clone());
    vcprobe::probe::run(&collector, &settings, None).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_flags() {
        let args = Args::parse_from(["vcprobe", "-c", "probe.toml", "--log-level", "debug"]);

        assert_eq!(args.config, Some(PathBuf::from("probe.toml")));
        assert_eq!(args.log_level, Some(LogLevel::Debug));
    }

    #[tokio::test]
    async fn test_unloadable_settings_fail_the_run() {
        let args = Args::parse_from([
            "vcprobe",
            "--config",
            "/nonexistent/vcprobe.toml",
            "--log-level",
            "error",
        ]);

        assert!(run(args).await.is_err());
    }
}
