//! Process environment reader.
//!
//! Recovers launch-context tags from `/proc/<pid>/environ`. This read
//! races against the process: a window-creation event may arrive after
//! the process already exited or exec'd, so callers must treat a failed
//! read as "ownership unknown", never as an error to propagate.

use std::collections::HashMap;
use std::io;

/// Read a process's environment as key/value pairs.
pub async fn read_process_env(pid: i32) -> io::Result<HashMap<String, String>> {
    let raw = tokio::fs::read(format!("/proc/{pid}/environ")).await?;
    Ok(parse_environ(&raw))
}

/// Split a raw `environ` buffer (NUL-delimited `KEY=VALUE` entries) into
/// a map. Entries without `=` are skipped.
pub fn parse_environ(raw: &[u8]) -> HashMap<String, String> {
    raw.split(|&b| b == 0)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let text = String::from_utf8_lossy(entry);
            text.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
        })
        .collect()
}
