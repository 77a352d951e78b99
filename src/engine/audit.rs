use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Security-event classes the engine records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    NewUser,
    RateLimitExceeded,
    ConfigurationChange,
}

impl AuditKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new_user" => Some(AuditKind::NewUser),
            "rate_limit_exceeded" => Some(AuditKind::RateLimitExceeded),
            "configuration_change" => Some(AuditKind::ConfigurationChange),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::NewUser => "new_user",
            AuditKind::RateLimitExceeded => "rate_limit_exceeded",
            AuditKind::ConfigurationChange => "configuration_change",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: AuditKind,
    pub identity: String,
    pub endpoint: String,
    pub tier: String,
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Any subset of fields may be set; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub identity: Option<String>,
    pub kind: Option<AuditKind>,
    pub start_time: Option<i64>,
}

/// Bounded in-memory ring of audit events, oldest dropped first.
///
/// Process-local and best-effort. When disabled, appends are no-ops but
/// queries still answer (with an empty history).
pub struct AuditLog {
    enabled: bool,
    max_events: usize,
    events: Mutex<VecDeque<AuditEvent>>,
}

impl AuditLog {
    pub fn new(enabled: bool, max_events: usize) -> Self {
        Self {
            enabled,
            max_events,
            events: Mutex::new(VecDeque::new()),
        }
    }

    pub fn append(&self, event: AuditEvent) {
        if !self.enabled {
            return;
        }
        metrics::counter!("limiter_audit_events_total", "type" => event.kind.as_str())
            .increment(1);

        let mut events = self.events.lock().unwrap();
        if events.len() == self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }

    pub fn query(&self, filter: &AuditFilter) -> Vec<AuditEvent> {
        let events = self.events.lock().unwrap();
        events
            .iter()
            .filter(|e| {
                filter.identity.as_deref().is_none_or(|id| e.identity == id)
                    && filter.kind.is_none_or(|k| e.kind == k)
                    && filter.start_time.is_none_or(|t| e.timestamp >= t)
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: AuditKind, identity: &str, timestamp: i64) -> AuditEvent {
        AuditEvent {
            timestamp,
            kind,
            identity: identity.to_string(),
            endpoint: "/api/search".to_string(),
            tier: "free".to_string(),
            region: "US".to_string(),
            detail: None,
        }
    }

    #[test]
    fn test_append_and_query_all() {
        let log = AuditLog::new(true, 10);
        log.append(event(AuditKind::NewUser, "u1", 100));
        log.append(event(AuditKind::RateLimitExceeded, "u1", 101));
        assert_eq!(log.query(&AuditFilter::default()).len(), 2);
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let log = AuditLog::new(true, 3);
        for i in 0..5 {
            log.append(event(AuditKind::RateLimitExceeded, "u1", i));
        }
        let events = log.query(&AuditFilter::default());
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].timestamp, 2);
        assert_eq!(events[2].timestamp, 4);
    }

    #[test]
    fn test_query_filters() {
        let log = AuditLog::new(true, 10);
        log.append(event(AuditKind::NewUser, "u1", 100));
        log.append(event(AuditKind::RateLimitExceeded, "u2", 110));
        log.append(event(AuditKind::RateLimitExceeded, "u1", 120));

        let by_identity = log.query(&AuditFilter {
            identity: Some("u1".to_string()),
            ..Default::default()
        });
        assert_eq!(by_identity.len(), 2);

        let by_kind = log.query(&AuditFilter {
            kind: Some(AuditKind::RateLimitExceeded),
            ..Default::default()
        });
        assert_eq!(by_kind.len(), 2);

        let since = log.query(&AuditFilter {
            start_time: Some(110),
            ..Default::default()
        });
        assert_eq!(since.len(), 2);

        let combined = log.query(&AuditFilter {
            identity: Some("u1".to_string()),
            kind: Some(AuditKind::RateLimitExceeded),
            start_time: Some(110),
        });
        assert_eq!(combined.len(), 1);
        assert_eq!(combined[0].timestamp, 120);
    }

    #[test]
    fn test_disabled_log_is_a_noop() {
        let log = AuditLog::new(false, 10);
        log.append(event(AuditKind::NewUser, "u1", 100));
        assert!(log.query(&AuditFilter::default()).is_empty());
    }

    #[test]
    fn test_kind_parse_roundtrip() {
        for kind in [
            AuditKind::NewUser,
            AuditKind::RateLimitExceeded,
            AuditKind::ConfigurationChange,
        ] {
            assert_eq!(AuditKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(AuditKind::parse("bogus"), None);
    }
}
