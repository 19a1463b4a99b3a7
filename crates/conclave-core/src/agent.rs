use crate::error::ConclaveError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The closed set of agent types Conclave knows how to route.
///
/// Every `match` over this enum is exhaustive, so introducing a new agent
/// type forces the routing table, tier table and profiles to be updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    /// Clinical reasoning over patient data.
    Clinical,
    /// Coding and billing questions.
    Billing,
    /// Regulatory and policy checks.
    Compliance,
    /// Imaging report interpretation.
    Radiology,
    /// Fast intake triage.
    Triage,
    /// Note and summary drafting.
    Documentation,
}

/// Latency/quality classification of an agent type.
///
/// Reported alongside results; never used to reorder scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Small, fast model expected to answer within a couple of seconds.
    RealTime,
    /// Large model where answer quality matters more than latency.
    HighQuality,
}

impl AgentType {
    /// Every agent type, in declaration order.
    pub const ALL: [AgentType; 6] = [
        AgentType::Clinical,
        AgentType::Billing,
        AgentType::Compliance,
        AgentType::Radiology,
        AgentType::Triage,
        AgentType::Documentation,
    ];

    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Clinical => "clinical",
            AgentType::Billing => "billing",
            AgentType::Compliance => "compliance",
            AgentType::Radiology => "radiology",
            AgentType::Triage => "triage",
            AgentType::Documentation => "documentation",
        }
    }

    /// The tier this agent type is served at.
    pub fn tier(&self) -> Tier {
        match self {
            AgentType::Clinical | AgentType::Radiology | AgentType::Documentation => {
                Tier::HighQuality
            }
            AgentType::Billing | AgentType::Compliance | AgentType::Triage => Tier::RealTime,
        }
    }

    /// Header used for this agent's section in aggregated output.
    pub fn section_title(&self) -> &'static str {
        match self {
            AgentType::Clinical => "Clinical Assessment",
            AgentType::Billing => "Billing & Coding",
            AgentType::Compliance => "Compliance Review",
            AgentType::Radiology => "Radiology Findings",
            AgentType::Triage => "Triage",
            AgentType::Documentation => "Documentation",
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = ConclaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        AgentType::ALL
            .into_iter()
            .find(|a| a.as_str() == lower)
            .ok_or_else(|| ConclaveError::UnknownAgentType(s.to_string()))
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::RealTime => write!(f, "real_time"),
            Tier::HighQuality => write!(f, "high_quality"),
        }
    }
}
