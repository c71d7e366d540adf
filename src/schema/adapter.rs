//! Parsing and batch validation for host event streams

use crate::error::VibeflowError;
use crate::schema::host_event::*;

/// Adapter for reading recorded or streamed host events
pub struct HostEventAdapter;

impl HostEventAdapter {
    /// Parse a JSON string containing an array of HostEvents
    pub fn parse_array(json: &str) -> Result<Vec<HostEvent>, VibeflowError> {
        let events: Vec<HostEvent> = serde_json::from_str(json)?;
        Ok(events)
    }

    /// Parse NDJSON (newline-delimited JSON) containing HostEvents
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<HostEvent>, VibeflowError> {
        let mut events = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            events.push(Self::parse_line(trimmed).map_err(|e| {
                VibeflowError::ParseError(format!("Failed to parse line {}: {}", line_num + 1, e))
            })?);
        }
        Ok(events)
    }

    /// Parse a single NDJSON record
    pub fn parse_line(line: &str) -> Result<HostEvent, VibeflowError> {
        Ok(serde_json::from_str::<HostEvent>(line.trim())?)
    }

    /// Validate a batch of events, returning only the failures
    pub fn validate_events(events: &[HostEvent]) -> Vec<ValidationResult> {
        events
            .iter()
            .enumerate()
            .filter_map(|(idx, event)| {
                event.validate().err().map(|error| ValidationResult {
                    index: idx,
                    kind: event.kind,
                    error,
                })
            })
            .collect()
    }

    /// Check that timestamps never go backwards; returns offending indices
    pub fn out_of_order(events: &[HostEvent]) -> Vec<usize> {
        events
            .windows(2)
            .enumerate()
            .filter(|(_, pair)| pair[1].timestamp < pair[0].timestamp)
            .map(|(idx, _)| idx + 1)
            .collect()
    }
}

/// One failed validation
#[derive(Debug)]
pub struct ValidationResult {
    pub index: usize,
    pub kind: EventKind,
    pub error: ValidationError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SubChange;
    use chrono::{Duration, TimeZone, Utc};

    fn create_test_events() -> Vec<HostEvent> {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap();
        vec![
            HostEvent::text_change(start, vec![SubChange::new("fn", 0)]),
            HostEvent::tick(start + Duration::seconds(1)),
            HostEvent::focus(start + Duration::seconds(2), false),
            HostEvent::command(start + Duration::seconds(3), Command::ToggleAssist),
        ]
    }

    #[test]
    fn test_parse_ndjson() {
        let ndjson = create_test_events()
            .iter()
            .map(|e| serde_json::to_string(e).unwrap())
            .collect::<Vec<_>>()
            .join("\n\n");

        let events = HostEventAdapter::parse_ndjson(&ndjson).unwrap();
        assert_eq!(events, create_test_events());
    }

    #[test]
    fn test_parse_ndjson_reports_line() {
        let ndjson = "{\"timestamp\":\"2024-01-15T14:00:00Z\",\"kind\":\"tick\"}\nnot json\n";
        let err = HostEventAdapter::parse_ndjson(ndjson).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_parse_array() {
        let json = serde_json::to_string(&create_test_events()).unwrap();
        assert_eq!(HostEventAdapter::parse_array(&json).unwrap().len(), 4);
    }

    #[test]
    fn test_validate_events() {
        let mut events = create_test_events();
        events[1].kind = EventKind::Focus;

        let failures = HostEventAdapter::validate_events(&events);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 1);
        assert_eq!(failures[0].kind, EventKind::Focus);
    }

    #[test]
    fn test_out_of_order() {
        let mut events = create_test_events();
        events.swap(1, 2);
        assert_eq!(HostEventAdapter::out_of_order(&events), vec![2]);
        assert!(HostEventAdapter::out_of_order(&create_test_events()).is_empty());
    }
}
