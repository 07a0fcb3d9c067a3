//! Resilience — the ordered parse chain behind structured-output recovery.
//!
//! A model reply is parsed by progressively more forgiving strategies. The
//! chain runs them in declaration order and keeps the first one that yields
//! records; nothing after it runs. The result remembers which strategy won
//! and why the stricter ones were skipped, so the parser can report the tier
//! without knowing how any tier works.
//!
//! ```text
//! strict ──ok──▶ Full     (confidence 1.0, no warnings)
//!   │ err
//! brace_escape ──ok──▶ Partial  (its confidence, one warning per failed tier)
//!   │ err
//! regex_salvage ──ok──▶ Partial
//!   │ err
//! Unavailable   (payload None, served_by "none")
//! ```

use serde::{Deserialize, Serialize};

/// How far the chain had to fall back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationLevel {
    /// Parsed by the strictest tier.
    Full,
    /// Parsed, but only by a lenient tier.
    Partial,
    /// No tier could parse the input.
    Unavailable,
}

impl DegradationLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Partial => "partial",
            Self::Unavailable => "unavailable",
        }
    }
}

impl std::fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one run of a [`FallbackChain`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradedResponse<T> {
    pub payload: T,
    pub level: DegradationLevel,
    /// Trust placed in the winning tier, 0.0 when nothing parsed.
    pub confidence: f64,
    /// Winning tier name, `"none"` when every tier failed.
    pub served_by: String,
    /// Why each stricter tier was passed over.
    pub warnings: Vec<String>,
}

impl<T> DegradedResponse<T> {
    pub fn is_full(&self) -> bool {
        self.level == DegradationLevel::Full
    }

    pub fn is_degraded(&self) -> bool {
        !self.is_full()
    }
}

/// A named parse strategy and how far its output is trusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackTier {
    pub name: String,
    pub confidence: f64,
}

/// Parse strategies, strictest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackChain {
    /// Prefix for warnings, e.g. `structured_output`.
    pub name: String,
    pub tiers: Vec<FallbackTier>,
}

impl FallbackChain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tiers: Vec::new(),
        }
    }

    /// Append a strategy; confidence is clamped into 0.0–1.0.
    pub fn add_tier(mut self, name: impl Into<String>, confidence: f64) -> Self {
        self.tiers.push(FallbackTier {
            name: name.into(),
            confidence: confidence.clamp(0.0, 1.0),
        });
        self
    }

    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    /// Call `parse` with each tier name until one returns `Ok`.
    pub fn execute<T, F>(&self, mut parse: F) -> DegradedResponse<Option<T>>
    where
        F: FnMut(&str) -> Result<T, String>,
    {
        let mut skipped = Vec::new();
        for (position, tier) in self.tiers.iter().enumerate() {
            let reason = match parse(&tier.name) {
                Ok(records) => {
                    let level = if position == 0 {
                        DegradationLevel::Full
                    } else {
                        skipped.push(format!("{}: recovered by '{}'", self.name, tier.name));
                        DegradationLevel::Partial
                    };
                    return DegradedResponse {
                        payload: Some(records),
                        level,
                        confidence: if position == 0 { 1.0 } else { tier.confidence },
                        served_by: tier.name.clone(),
                        warnings: skipped,
                    };
                }
                Err(reason) => reason,
            };
            skipped.push(format!("{} '{}' failed: {}", self.name, tier.name, reason));
        }

        skipped.push(format!(
            "{}: no tier parsed the input ({} tried)",
            self.name,
            self.tiers.len()
        ));
        DegradedResponse {
            payload: None,
            level: DegradationLevel::Unavailable,
            confidence: 0.0,
            served_by: "none".to_string(),
            warnings: skipped,
        }
    }
}
