use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;

/// How much of each exchange the message log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLogMode {
    /// Requests, commands and response bodies.
    Full,
    /// Requests, commands and response status only.
    StatusOnly,
}

/// Append-only NDJSON record of API traffic. Paths are logged without the
/// query string, so the API key never reaches the file.
pub(crate) struct MessageLogger {
    mode: MessageLogMode,
    file: File,
}

impl MessageLogger {
    pub fn new(mode: MessageLogMode, path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self { mode, file })
    }

    pub fn log_request(&mut self, method: &str, path: &str, body: Option<&Value>) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "req",
            "method": method,
            "path": path,
            "body": body,
        });
        self.write_line(&entry);
    }

    pub fn log_command(&mut self, action: &str, pod: &str, body: &Value) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "cmd",
            "action": action,
            "pod": pod,
            "body": body,
        });
        self.write_line(&entry);
    }

    pub fn log_response(&mut self, path: &str, status: u16, body: &str) {
        let mut entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "resp",
            "path": path,
            "status": status,
        });
        if self.mode == MessageLogMode::Full {
            entry["body"] = serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()));
        }
        self.write_line(&entry);
    }

    fn write_line(&mut self, entry: &Value) {
        if let Ok(line) = serde_json::to_string(entry)
            && let Err(e) = writeln!(self.file, "{line}")
        {
            warn!("failed to write log entry: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::NamedTempFile;

    fn read_lines(path: &str) -> Vec<Value> {
        let mut contents = String::new();
        std::fs::File::open(path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn log_request_writes_ndjson() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Full, path).unwrap();
        logger.log_request("GET", "/users/me/pods", None);

        let lines = read_lines(path);
        assert_eq!(lines[0]["dir"], "req");
        assert_eq!(lines[0]["method"], "GET");
        assert!(lines[0]["ts"].as_str().is_some());
    }

    #[test]
    fn full_mode_keeps_response_body() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Full, path).unwrap();
        logger.log_response("/pods/AAA/measurements", 200, r#"{"result": [{"temperature": 22.5}]}"#);
        logger.log_response("/pods/AAA/measurements", 502, "Bad Gateway");

        let lines = read_lines(path);
        assert_eq!(lines[0]["body"]["result"][0]["temperature"], 22.5);
        assert_eq!(lines[1]["status"], 502);
        assert_eq!(lines[1]["body"], "Bad Gateway");
    }

    #[test]
    fn status_only_mode_drops_body() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::StatusOnly, path).unwrap();
        logger.log_response("/users/me/pods", 200, r#"{"result": []}"#);

        let lines = read_lines(path);
        assert_eq!(lines[0]["dir"], "resp");
        assert_eq!(lines[0]["status"], 200);
        assert!(lines[0].get("body").is_none());
    }

    #[test]
    fn log_command_captures_pod() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Full, path).unwrap();
        logger.log_command("set_ac_state", "AAA", &json!({"acState": {"on": true}}));

        let lines = read_lines(path);
        assert_eq!(lines[0]["dir"], "cmd");
        assert_eq!(lines[0]["action"], "set_ac_state");
        assert_eq!(lines[0]["pod"], "AAA");
    }
}
