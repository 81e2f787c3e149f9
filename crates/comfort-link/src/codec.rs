//! Line codec for the board's text protocol
//!
//! Stateless: one inbound line decodes to at most one typed [`Frame`], one
//! outbound command encodes to one newline-terminated line. Frame kinds are
//! matched in priority order:
//!
//! 1. `T:<float>,H:<float>`: sensor reading
//! 2. `USER_FEEDBACK:<float>,<float>,<word>`: feedback-button event
//! 3. `Status:<text>` / `Action:<text>`: peer announcements
//! 4. anything else: free-text diagnostic, except echoes of our own
//!    outbound commands, which are dropped to keep them out of the log loop

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Default substring marking the firmware's echo of an outbound command
pub const DEFAULT_ECHO_FILTER: &str = "Received command from Python";

/// One decoded sensor reading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorFrame {
    /// Temperature in the board's native unit (°C)
    pub temperature: f64,
    /// Relative humidity, 0–100
    pub humidity: f64,
    pub received_at: DateTime<Utc>,
}

/// One feedback-button event with the conditions it was pressed under
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackFrame {
    pub temperature: f64,
    pub humidity: f64,
    /// Reported feeling: `hot`, `cold` or `comfortable`
    pub feeling: String,
}

/// A decoded, typed unit produced from one line of the wire protocol
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum Frame {
    Sensor(SensorFrame),
    Feedback(FeedbackFrame),
    /// Full `Status:` line as received
    Status(String),
    /// Full `Action:` line as received
    Action(String),
    /// Free-text diagnostic line
    Info(String),
}

/// Error type for decode failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed sensor line {line:?}: {detail}")]
    MalformedSensor { line: String, detail: String },

    #[error("malformed feedback line {line:?}: {detail}")]
    MalformedFeedback { line: String, detail: String },
}

/// Stateless decoder/encoder for the line protocol
#[derive(Debug, Clone)]
pub struct ProtocolCodec {
    echo_filter: String,
}

impl Default for ProtocolCodec {
    fn default() -> Self {
        Self {
            echo_filter: DEFAULT_ECHO_FILTER.to_string(),
        }
    }
}

impl ProtocolCodec {
    /// Codec with the default echo filter
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec suppressing lines that contain `echo_filter` instead of the
    /// default firmware echo text
    pub fn with_echo_filter(echo_filter: impl Into<String>) -> Self {
        Self {
            echo_filter: echo_filter.into(),
        }
    }

    /// Decode one stripped line.
    ///
    /// `Ok(None)` means the line is deliberately ignored (echoes of our own
    /// commands, feedback lines with the wrong field count); an error means
    /// the line matched a frame kind but its payload would not parse. Either
    /// way the caller just moves on to the next line.
    pub fn decode(&self, line: &str) -> Result<Option<Frame>, DecodeError> {
        if line.starts_with("T:") && line.contains(",H:") {
            return self.decode_sensor(line).map(Some);
        }

        if let Some(rest) = line.strip_prefix("USER_FEEDBACK:") {
            return self.decode_feedback(line, rest);
        }

        if line.starts_with("Status:") {
            return Ok(Some(Frame::Status(line.to_string())));
        }

        if line.starts_with("Action:") {
            return Ok(Some(Frame::Action(line.to_string())));
        }

        if line.contains(&self.echo_filter) {
            return Ok(None);
        }

        Ok(Some(Frame::Info(line.to_string())))
    }

    /// Encode an outbound command as one wire line
    pub fn encode(&self, command: &str) -> String {
        format!("{command}\n")
    }

    fn decode_sensor(&self, line: &str) -> Result<Frame, DecodeError> {
        let malformed = |detail: &str| DecodeError::MalformedSensor {
            line: line.to_string(),
            detail: detail.to_string(),
        };

        let mut parts = line.split(',');
        let temperature = parse_tagged_float(parts.next().unwrap_or_default())
            .ok_or_else(|| malformed("bad temperature field"))?;
        let humidity = parse_tagged_float(parts.next().unwrap_or_default())
            .ok_or_else(|| malformed("bad humidity field"))?;

        Ok(Frame::Sensor(SensorFrame {
            temperature,
            humidity,
            received_at: Utc::now(),
        }))
    }

    fn decode_feedback(&self, line: &str, rest: &str) -> Result<Option<Frame>, DecodeError> {
        let fields: Vec<&str> = rest.split(',').collect();

        // Wrong field count is lenient-parsing policy, not an error.
        if fields.len() != 3 {
            return Ok(None);
        }

        let malformed = |detail: &str| DecodeError::MalformedFeedback {
            line: line.to_string(),
            detail: detail.to_string(),
        };

        let temperature: f64 = fields[0]
            .trim()
            .parse()
            .map_err(|_| malformed("bad temperature field"))?;
        let humidity: f64 = fields[1]
            .trim()
            .parse()
            .map_err(|_| malformed("bad humidity field"))?;

        Ok(Some(Frame::Feedback(FeedbackFrame {
            temperature,
            humidity,
            feeling: fields[2].trim().to_string(),
        })))
    }
}

/// Parse the value side of a `T:25.6`-style field
fn parse_tagged_float(field: &str) -> Option<f64> {
    let (_, value) = field.split_once(':')?;
    value.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(line: &str) -> Result<Option<Frame>, DecodeError> {
        ProtocolCodec::new().decode(line)
    }

    #[test]
    fn test_sensor_line_decodes() {
        match decode("T:25.6,H:45.2").unwrap() {
            Some(Frame::Sensor(frame)) => {
                assert_eq!(frame.temperature, 25.6);
                assert_eq!(frame.humidity, 45.2);
            }
            other => panic!("expected sensor frame, got {other:?}"),
        }
    }

    #[test]
    fn test_sensor_line_with_negative_temperature() {
        match decode("T:-3.5,H:80").unwrap() {
            Some(Frame::Sensor(frame)) => {
                assert_eq!(frame.temperature, -3.5);
                assert_eq!(frame.humidity, 80.0);
            }
            other => panic!("expected sensor frame, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_sensor_lines_fail_without_panicking() {
        assert!(decode("T:abc,H:45.2").is_err());
        assert!(decode("T:25.6,H:").is_err());
        assert!(decode("T:25.6,H:wet").is_err());
    }

    #[test]
    fn test_sensor_line_without_humidity_tag_is_info() {
        // No ",H:" tag, so it falls through to the free-text rule.
        assert_eq!(
            decode("T:25.6").unwrap(),
            Some(Frame::Info("T:25.6".to_string()))
        );
    }

    #[test]
    fn test_feedback_line_decodes() {
        assert_eq!(
            decode("USER_FEEDBACK:22.5,48,hot").unwrap(),
            Some(Frame::Feedback(FeedbackFrame {
                temperature: 22.5,
                humidity: 48.0,
                feeling: "hot".to_string(),
            }))
        );
    }

    #[test]
    fn test_feedback_feeling_is_trimmed() {
        match decode("USER_FEEDBACK:22.5,48, cold ").unwrap() {
            Some(Frame::Feedback(frame)) => assert_eq!(frame.feeling, "cold"),
            other => panic!("expected feedback frame, got {other:?}"),
        }
    }

    #[test]
    fn test_feedback_with_wrong_field_count_is_ignored() {
        assert_eq!(decode("USER_FEEDBACK:22.5,48").unwrap(), None);
        assert_eq!(decode("USER_FEEDBACK:22.5,48,hot,extra").unwrap(), None);
    }

    #[test]
    fn test_feedback_with_bad_numbers_fails() {
        assert!(decode("USER_FEEDBACK:warm,48,hot").is_err());
    }

    #[test]
    fn test_status_and_action_keep_full_line() {
        assert_eq!(
            decode("Status:ready").unwrap(),
            Some(Frame::Status("Status:ready".to_string()))
        );
        assert_eq!(
            decode("Action:fan_on").unwrap(),
            Some(Frame::Action("Action:fan_on".to_string()))
        );
    }

    #[test]
    fn test_free_text_is_info() {
        assert_eq!(
            decode("booting v2.1").unwrap(),
            Some(Frame::Info("booting v2.1".to_string()))
        );
    }

    #[test]
    fn test_command_echo_is_suppressed() {
        assert_eq!(
            decode("Received command from Python: hot").unwrap(),
            None
        );
        assert_eq!(
            decode("log: Received command from Python echoed").unwrap(),
            None
        );
    }

    #[test]
    fn test_custom_echo_filter() {
        let codec = ProtocolCodec::with_echo_filter("HOST_ECHO");
        assert_eq!(codec.decode("HOST_ECHO hot").unwrap(), None);
        assert_eq!(
            codec.decode("Received command from Python").unwrap(),
            Some(Frame::Info("Received command from Python".to_string()))
        );
    }

    #[test]
    fn test_encode_appends_terminator() {
        assert_eq!(ProtocolCodec::new().encode("hot"), "hot\n");
    }
}
