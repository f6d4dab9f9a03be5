use crate::{ContingencyId, RaoError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Instants in chronological order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Instant {
    Preventive,
    Outage,
    Auto,
    Curative,
}

impl Instant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Instant::Preventive => "preventive",
            Instant::Outage => "outage",
            Instant::Auto => "auto",
            Instant::Curative => "curative",
        }
    }
}

impl FromStr for Instant {
    type Err = RaoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "preventive" => Ok(Instant::Preventive),
            "outage" => Ok(Instant::Outage),
            "auto" => Ok(Instant::Auto),
            "curative" => Ok(Instant::Curative),
            other => Err(RaoError::Parse(format!("unknown instant '{}'", other))),
        }
    }
}

/// A (contingency, instant) pair. The preventive state has no contingency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateId {
    #[serde(default)]
    pub contingency: Option<ContingencyId>,
    pub instant: Instant,
}

impl StateId {
    pub fn preventive() -> Self {
        Self {
            contingency: None,
            instant: Instant::Preventive,
        }
    }

    pub fn after(contingency: impl Into<ContingencyId>, instant: Instant) -> Self {
        Self {
            contingency: Some(contingency.into()),
            instant,
        }
    }

    pub fn is_preventive(&self) -> bool {
        self.instant == Instant::Preventive
    }
}

impl FromStr for StateId {
    type Err = RaoError;

    /// Parses the `Display` form: `preventive` or `<contingency> - <instant>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("preventive") {
            return Ok(StateId::preventive());
        }
        let (contingency, instant) = s
            .rsplit_once(" - ")
            .ok_or_else(|| RaoError::Parse(format!("malformed state '{}'", s)))?;
        Ok(StateId::after(contingency, instant.parse()?))
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.contingency {
            None => f.write_str(self.instant.as_str()),
            Some(co) => write!(f, "{} - {}", co, self.instant.as_str()),
        }
    }
}
