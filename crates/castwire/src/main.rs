mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::exit::{CliError, INTERNAL};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "castwire", version, about = "Talk to cast receivers over CASTV2")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("failed to start runtime: {err}")))
        .and_then(|runtime| runtime.block_on(cmd::run(cli.command, format)));

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_with_defaults() {
        let cli = Cli::try_parse_from(["castwire", "status", "192.168.1.20"])
            .expect("status args should parse");

        let Command::Status(args) = cli.command else {
            panic!("expected status");
        };
        assert_eq!(args.device.addr, "192.168.1.20");
        assert_eq!(args.device.sender_id, "sender-0");
        assert_eq!(args.device.receiver_id, "receiver-0");
        assert_eq!(args.device.timeout, "5s");
    }

    #[test]
    fn volume_requires_exactly_one_change() {
        let err = Cli::try_parse_from(["castwire", "volume", "tv"])
            .expect_err("a change is required");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);

        let err = Cli::try_parse_from(["castwire", "volume", "tv", "--mute", "--level", "0.3"])
            .expect_err("changes conflict");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);

        let cli = Cli::try_parse_from(["castwire", "volume", "tv", "--level", "0.3"])
            .expect("level should parse");
        assert!(matches!(cli.command, Command::Volume(ref args) if args.level == Some(0.3)));
    }

    #[test]
    fn rejects_out_of_range_level() {
        let err = Cli::try_parse_from(["castwire", "volume", "tv", "--level", "2"])
            .expect_err("level above 1 is invalid");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_load_with_global_format() {
        let cli = Cli::try_parse_from([
            "castwire",
            "load",
            "tv:8009",
            "--url",
            "http://example.test/live.m3u8",
            "--live",
            "--format",
            "json",
        ])
        .expect("load args should parse");

        assert_eq!(cli.format, Some(OutputFormat::Json));
        let Command::Load(args) = cli.command else {
            panic!("expected load");
        };
        assert!(args.live);
        assert_eq!(args.app_id, "CC1AD845");
        assert_eq!(args.content_type, "video/mp4");
    }

    #[test]
    fn stop_requires_session_id() {
        let err = Cli::try_parse_from(["castwire", "stop", "tv"])
            .expect_err("session id is required");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
