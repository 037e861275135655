use warden_core::{is_time_lock_complete, time_lock_progress};
use warden_engine::{Clock, SystemClock};

use crate::OutputFormat;

pub(crate) fn cmd_progress(release_time: u64, lock: u64, now: Option<u64>, output: OutputFormat) {
    let now = now.unwrap_or_else(|| SystemClock.now());
    let progress = time_lock_progress(release_time, lock, now);
    let complete = is_time_lock_complete(release_time, lock, now);

    match output {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({ "progress": progress, "complete": complete, "now": now })
        ),
        OutputFormat::Text => {
            if complete {
                println!("{:.1}% (time lock elapsed)", progress);
            } else {
                println!(
                    "{:.1}% ({}s remaining)",
                    progress,
                    release_time.saturating_sub(now)
                );
            }
        }
    }
}
