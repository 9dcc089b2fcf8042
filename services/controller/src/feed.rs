//! Newline-delimited JSON notification feed.
//!
//! Each line is one [`Notification`]:
//!
//! ```text
//! {"action":"update","object":{...},"oldObject":{...}}
//! ```
//!
//! Malformed lines and untranslatable notifications are logged and skipped.
//! The feed stops at end of input or when a lane is closed.

use podeip_events::Notification;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{error, info, warn};

use crate::handler::{Handler, HandlerError};

/// Counters for one feed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub lines: u64,
    pub accepted: u64,
    pub rejected: u64,
}

/// Read notifications from `reader` until end of input.
pub async fn run<R>(reader: R, handler: &Handler) -> FeedStats
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = FeedStats::default();
    let mut lines = reader.lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "Failed to read notification feed");
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }
        stats.lines += 1;

        let notification: Notification = match serde_json::from_str(&line) {
            Ok(notification) => notification,
            Err(e) => {
                warn!(line = stats.lines, error = %e, "Skipping malformed notification");
                stats.rejected += 1;
                continue;
            }
        };

        match handler.handle_notification(&notification).await {
            Ok(()) => stats.accepted += 1,
            Err(HandlerError::Translate(_)) => stats.rejected += 1,
            Err(HandlerError::Dispatch(e)) => {
                error!(error = %e, "Dispatcher rejected event, stopping feed");
                stats.rejected += 1;
                break;
            }
        }
    }

    info!(
        lines = stats.lines,
        accepted = stats.accepted,
        rejected = stats.rejected,
        "Notification feed ended"
    );
    stats
}
