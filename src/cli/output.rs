//! Output formatting for CLI commands

use serde::Serialize;

use crate::relay::SessionStatus;

/// Format output as JSON
pub fn format_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

/// Format session status as JSON or human-readable text based on --json flag
pub fn format_status(status: &SessionStatus, json: bool) -> String {
    if json {
        format_json(status)
    } else {
        status.render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_status_json() {
        let status = SessionStatus {
            active: true,
            info: None,
            context: None,
        };
        let json = format_status(&status, true);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["active"], true);
        assert!(value["context"].is_null());
    }
}
