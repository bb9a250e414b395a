use std::io::IsTerminal;

use castwire_ctrl::{MediaStatus, ReceiverStatus};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_receiver_status(status: &ReceiverStatus, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(status),
        OutputFormat::Table => {
            println!("{}", applications_table(status));
            println!("Volume: {}", volume_summary(status));
        }
        OutputFormat::Pretty => {
            println!("volume={}", volume_summary(status));
            if status.applications.is_empty() {
                println!("no running applications");
            }
            for app in &status.applications {
                println!(
                    "app={} name={:?} session={} transport={} status={:?}",
                    or_dash(app.app_id.as_deref()),
                    app.display_name.as_deref().unwrap_or_default(),
                    or_dash(app.session_id.as_deref()),
                    or_dash(app.transport_id.as_deref()),
                    app.status_text.as_deref().unwrap_or_default(),
                );
            }
        }
    }
}

pub fn print_media_status(status: &[MediaStatus], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(status),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SESSION", "STATE", "POSITION", "CONTENT"]);
            for entry in status {
                table.add_row(vec![
                    entry.media_session_id.to_string(),
                    entry.player_state.clone(),
                    format!("{:.1}s", entry.current_time),
                    content_id(entry).to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for entry in status {
                println!(
                    "session={} state={} position={:.1}s content={}",
                    entry.media_session_id,
                    entry.player_state,
                    entry.current_time,
                    content_id(entry),
                );
            }
        }
    }
}

fn applications_table(status: &ReceiverStatus) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["APP", "NAME", "SESSION", "TRANSPORT", "STATUS"]);
    for app in &status.applications {
        table.add_row(vec![
            or_dash(app.app_id.as_deref()),
            or_dash(app.display_name.as_deref()),
            or_dash(app.session_id.as_deref()),
            or_dash(app.transport_id.as_deref()),
            or_dash(app.status_text.as_deref()),
        ]);
    }
    table
}

fn volume_summary(status: &ReceiverStatus) -> String {
    let Some(volume) = status.volume else {
        return "unknown".to_string();
    };
    let level = volume
        .level
        .map(|level| format!("{:.0}%", level * 100.0))
        .unwrap_or_else(|| "-".to_string());
    if volume.muted == Some(true) {
        format!("{level} (muted)")
    } else {
        level
    }
}

fn content_id(status: &MediaStatus) -> &str {
    status
        .media
        .as_ref()
        .map(|media| media.content_id.as_str())
        .unwrap_or("-")
}

fn or_dash(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}
