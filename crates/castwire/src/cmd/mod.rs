use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use castwire_ctrl::DEFAULT_MEDIA_RECEIVER;
use castwire_mux::{DEFAULT_PORT, DEFAULT_RECEIVER_ID, DEFAULT_SENDER_ID};
use clap::{ArgGroup, Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod launch;
pub mod load;
pub mod session;
pub mod status;
pub mod stop;
pub mod version;
pub mod volume;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show receiver status: running applications and volume.
    Status(StatusArgs),
    /// Change the receiver volume or mute state.
    Volume(VolumeArgs),
    /// Launch a receiver application.
    Launch(LaunchArgs),
    /// Stop a running application session.
    Stop(StopArgs),
    /// Launch a media receiver and start playing a URL.
    Load(LoadArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Status(args) => status::run(args, format).await,
        Command::Volume(args) => volume::run(args, format).await,
        Command::Launch(args) => launch::run(args, format).await,
        Command::Stop(args) => stop::run(args, format).await,
        Command::Load(args) => load::run(args, format).await,
        Command::Version(args) => version::run(args),
    }
}

/// Connection options shared by every device command.
#[derive(Args, Debug, Clone)]
pub struct DeviceArgs {
    /// Receiver address: host, host:port or ip (port defaults to 8009).
    #[arg(env = "CASTWIRE_ADDR")]
    pub addr: String,
    /// Source id used for outgoing messages.
    #[arg(long, env = "CASTWIRE_SENDER_ID", default_value = DEFAULT_SENDER_ID)]
    pub sender_id: String,
    /// Destination id of the receiver platform.
    #[arg(long, env = "CASTWIRE_RECEIVER_ID", default_value = DEFAULT_RECEIVER_ID)]
    pub receiver_id: String,
    /// Connect and per-request timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// Heartbeat interval (e.g. 5s).
    #[arg(long, default_value = "5s")]
    pub heartbeat: String,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("change").required(true).args(["level", "mute", "unmute"])))]
pub struct VolumeArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Volume level between 0.0 and 1.0.
    #[arg(long, value_parser = parse_level)]
    pub level: Option<f64>,
    /// Mute the receiver.
    #[arg(long)]
    pub mute: bool,
    /// Unmute the receiver.
    #[arg(long)]
    pub unmute: bool,
}

#[derive(Args, Debug)]
pub struct LaunchArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Application id to launch.
    #[arg(long, default_value = DEFAULT_MEDIA_RECEIVER)]
    pub app_id: String,
}

#[derive(Args, Debug)]
pub struct StopArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Session id of the application to stop.
    #[arg(long)]
    pub session_id: String,
}

#[derive(Args, Debug)]
pub struct LoadArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Media URL.
    #[arg(long)]
    pub url: String,
    /// MIME type of the media.
    #[arg(long, default_value = "video/mp4")]
    pub content_type: String,
    /// Title shown on the receiver.
    #[arg(long)]
    pub title: Option<String>,
    /// Media receiver application to launch.
    #[arg(long, default_value = DEFAULT_MEDIA_RECEIVER)]
    pub app_id: String,
    /// Mark the stream as live.
    #[arg(long)]
    pub live: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn parse_level(input: &str) -> Result<f64, String> {
    let level: f64 = input
        .parse()
        .map_err(|_| format!("invalid volume level: {input}"))?;
    if !(0.0..=1.0).contains(&level) {
        return Err(format!("volume level must be within 0.0..=1.0, got {level}"));
    }
    Ok(level)
}

/// Parse `500ms`, `5s` or bare seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(num) => (num, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Append the cast port when `addr` has none.
pub fn with_default_port(addr: &str) -> String {
    if addr.parse::<SocketAddr>().is_ok() {
        return addr.to_string();
    }
    if let Ok(ip) = addr.parse::<IpAddr>() {
        return SocketAddr::new(ip, DEFAULT_PORT).to_string();
    }
    match addr.rsplit_once(':') {
        Some((_, port)) if port.parse::<u16>().is_ok() => addr.to_string(),
        _ => format!("{addr}:{DEFAULT_PORT}"),
    }
}
