//! Operator console for a running station.
//!
//! One command per line, parsed with clap in multicall mode so the first word
//! is the command name:
//!
//! ```text
//! setfreq 30
//! recoverData 2024/03/01 09:00:00 2024/03/01 12:00:00
//! abort
//! connect | disconnect
//! status
//! ```

use clap::{Parser, Subcommand};
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

use crate::clock::{LocalZone, Timestamp};
use crate::error::AppResult;
use crate::pipeline::PipelineHandle;

#[derive(Parser, Debug)]
#[command(multicall = true)]
struct ConsoleLine {
    #[command(subcommand)]
    command: ConsoleCommand,
}

/// A parsed console command.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Set data storage frequency
    #[command(name = "setfreq")]
    SetFreq {
        /// Data storage frequency, in seconds
        secs: u64,
    },

    /// Send all journaled data within the timestamp range to the database
    #[command(name = "recoverData")]
    RecoverData {
        /// Start date, YYYY/MM/DD
        start_date: String,
        /// Start time, HH:MM:SS
        start_time: String,
        /// End date, YYYY/MM/DD
        end_date: String,
        /// End time, HH:MM:SS
        end_time: String,
    },

    /// Stop the running recovery after its current line
    Abort,

    /// Mark the uplink session usable
    Connect,

    /// Mark the uplink session unusable
    Disconnect,

    /// Show recent status messages
    Status,
}

impl ConsoleCommand {
    /// Parse one console line. `Ok(None)` for a blank line.
    ///
    /// Parse failures (including `help`) carry clap's rendered message.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        if line.trim().is_empty() {
            return Ok(None);
        }
        ConsoleLine::try_parse_from(line.split_whitespace())
            .map(|parsed| Some(parsed.command))
            .map_err(|e| e.render().to_string())
    }
}

/// Parse a `recoverData` range given as local date and time words.
fn local_range(
    zone: LocalZone,
    start_date: &str,
    start_time: &str,
    end_date: &str,
    end_time: &str,
) -> AppResult<(Timestamp, Timestamp)> {
    let start = zone.parse(&format!("{start_date} {start_time}"))?;
    let end = zone.parse(&format!("{end_date} {end_time}"))?;
    Ok((start, end))
}

/// Run `command` against `handle`, returning the text to show the operator.
pub fn execute(handle: &PipelineHandle, zone: LocalZone, command: &ConsoleCommand) -> AppResult<String> {
    match command {
        ConsoleCommand::SetFreq { secs } => {
            handle.set_sample_interval(Duration::from_secs(*secs))?;
            Ok(format!("Changing data storage frequency to {secs}"))
        }
        ConsoleCommand::RecoverData {
            start_date,
            start_time,
            end_date,
            end_time,
        } => {
            let (start, end) = local_range(zone, start_date, start_time, end_date, end_time)?;
            let task = handle.spawn_replay(start, end)?;
            tokio::spawn(async move {
                match task.await {
                    Ok(Ok(report)) => info!(?report, "Recovery finished"),
                    Ok(Err(e)) => warn!(error = %e, "Recovery failed"),
                    Err(e) => warn!(error = %e, "Recovery task failed"),
                }
            });
            Ok(format!(
                "Sending data stored between {} and {}",
                zone.format(start).unwrap_or_else(|| start.to_string()),
                zone.format(end).unwrap_or_else(|| end.to_string()),
            ))
        }
        ConsoleCommand::Abort => {
            handle.abort_replay();
            Ok("Recovery abort requested".to_string())
        }
        ConsoleCommand::Connect => {
            handle.session().connect();
            Ok("Session usable".to_string())
        }
        ConsoleCommand::Disconnect => {
            handle.session().disconnect();
            Ok("Session unusable".to_string())
        }
        ConsoleCommand::Status => {
            let stats = handle.upload_stats();
            let mut out = format!(
                "session: {}, delivered: {}, dropped: {}",
                handle.session().state().label(),
                stats.delivered(),
                stats.dropped()
            );
            for entry in handle.status().snapshot().iter().rev().take(10) {
                out.push('\n');
                out.push_str(&entry.to_string());
            }
            Ok(out)
        }
    }
}

/// Execute commands read from `input`, printing replies, until `stop`
/// resolves.
///
/// Closed input keeps waiting on `stop`; a read error ends the loop at once.
/// Either way the caller still holds `handle` and shuts it down.
pub async fn serve<R>(
    handle: &PipelineHandle,
    zone: LocalZone,
    input: R,
    stop: impl Future<Output = ()>,
) where
    R: AsyncBufRead + Unpin,
{
    tokio::pin!(stop);
    let mut lines = input.lines();
    loop {
        tokio::select! {
            _ = &mut stop => break,
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        // no more input: keep running headless
                        stop.as_mut().await;
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Console input failed, stopping");
                        break;
                    }
                };
                match ConsoleCommand::parse(&line) {
                    Ok(Some(command)) => match execute(handle, zone, &command) {
                        Ok(reply) => println!("{reply}"),
                        Err(e) => println!("{e}"),
                    },
                    Ok(None) => {}
                    Err(usage) => println!("{usage}"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StationError;

    #[test]
    fn parses_setfreq() {
        assert_eq!(
            ConsoleCommand::parse("setfreq 30").unwrap(),
            Some(ConsoleCommand::SetFreq { secs: 30 })
        );
    }

    #[test]
    fn blank_line_is_nothing() {
        assert_eq!(ConsoleCommand::parse("   ").unwrap(), None);
    }

    #[test]
    fn unknown_command_is_an_error() {
        assert!(ConsoleCommand::parse("wificonf ap home secret").is_err());
        assert!(ConsoleCommand::parse("setfreq fast").is_err());
    }

    #[test]
    fn recover_range_in_local_time() {
        let zone = LocalZone::from_offset_minutes(-240).unwrap();
        let (start, end) =
            local_range(zone, "2024/03/01", "10:00:00", "2024/03/01", "11:00:00").unwrap();
        assert_eq!(start, 1_709_301_600);
        assert_eq!(end, 1_709_305_200);
    }

    #[test]
    fn malformed_recover_timestamp_is_an_error() {
        let cmd = ConsoleCommand::parse("recoverData 2024/13/01 10:00:00 2024/03/01 11:00:00")
            .unwrap()
            .unwrap();
        let ConsoleCommand::RecoverData {
            start_date,
            start_time,
            end_date,
            end_time,
        } = &cmd
        else {
            panic!("expected recoverData, got {cmd:?}");
        };
        assert!(matches!(
            local_range(LocalZone::utc(), start_date, start_time, end_date, end_time),
            Err(StationError::Decode(_))
        ));
    }
}
