use serde::{Serialize, Serializer};
use std::fmt;

/// Caller tier. Selects a policy row; unknown names coerce to `Free`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Free,
    Premium,
    Enterprise,
    Unlimited,
}

impl Tier {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("premium") {
            Tier::Premium
        } else if s.eq_ignore_ascii_case("enterprise") {
            Tier::Enterprise
        } else if s.eq_ignore_ascii_case("unlimited") {
            Tier::Unlimited
        } else {
            Tier::Free
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Premium => "premium",
            Tier::Enterprise => "enterprise",
            Tier::Unlimited => "unlimited",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized request descriptor consumed by the engine.
#[derive(Debug, Clone)]
pub struct CheckRequest {
    pub identity: String,
    pub endpoint: String,
    pub tier: Tier,
    pub region: String,
    /// Tokens this admission consumes. Clamped to >= 1 by the engine.
    pub cost: u64,
}

/// Whole tokens left after the operation. `Unbounded` is the unlimited-tier
/// (and fail-open) sentinel; it renders as the string `"unlimited"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    Finite(u64),
    Unbounded,
}

impl Remaining {
    pub fn as_finite(&self) -> Option<u64> {
        match self {
            Remaining::Finite(n) => Some(*n),
            Remaining::Unbounded => None,
        }
    }
}

// Display and Serialize agree: a number, or the literal "unlimited".
impl fmt::Display for Remaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Remaining::Finite(n) => write!(f, "{}", n),
            Remaining::Unbounded => f.write_str("unlimited"),
        }
    }
}

impl Serialize for Remaining {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Remaining::Finite(n) => serializer.serialize_u64(*n),
            Remaining::Unbounded => serializer.serialize_str("unlimited"),
        }
    }
}

/// The engine's answer for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    pub remaining: Remaining,
    pub retry_after_seconds: u64,
    pub cost: u64,
}

impl Decision {
    /// Unlimited-tier and fail-open form.
    pub fn unbounded_allow(cost: u64) -> Self {
        Self {
            allowed: true,
            remaining: Remaining::Unbounded,
            retry_after_seconds: 0,
            cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_parse() {
        assert_eq!(Tier::parse("free"), Tier::Free);
        assert_eq!(Tier::parse("Premium"), Tier::Premium);
        assert_eq!(Tier::parse("ENTERPRISE"), Tier::Enterprise);
        assert_eq!(Tier::parse("unlimited"), Tier::Unlimited);
        assert_eq!(Tier::parse("gold"), Tier::Free);
        assert_eq!(Tier::parse(""), Tier::Free);
    }

    #[test]
    fn test_remaining_serialization() {
        assert_eq!(serde_json::to_string(&Remaining::Finite(7)).unwrap(), "7");
        assert_eq!(
            serde_json::to_string(&Remaining::Unbounded).unwrap(),
            r#""unlimited""#
        );
    }

    #[test]
    fn test_decision_serialization() {
        let d = Decision::unbounded_allow(1);
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["allowed"], true);
        assert_eq!(json["remaining"], "unlimited");
        assert_eq!(json["retry_after_seconds"], 0);
    }
}
