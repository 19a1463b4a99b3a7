use conclave_core::{AgentType, Tier};
use serde::Serialize;

/// Default call parameters for one agent type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentProfile {
    pub agent_type: AgentType,
    pub tier: Tier,
    pub system_prompt: &'static str,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Profiles for every agent type, in declaration order.
pub fn default_profiles() -> Vec<AgentProfile> {
    AgentType::ALL.into_iter().map(profile_for).collect()
}

/// The profile of a single agent type.
pub fn profile_for(agent_type: AgentType) -> AgentProfile {
    let (system_prompt, max_tokens, temperature) = match agent_type {
        AgentType::Clinical => (CLINICAL_PROMPT, 1024, 0.2),
        AgentType::Radiology => (RADIOLOGY_PROMPT, 1024, 0.1),
        AgentType::Documentation => (DOCUMENTATION_PROMPT, 2048, 0.3),
        AgentType::Billing => (BILLING_PROMPT, 512, 0.0),
        AgentType::Compliance => (COMPLIANCE_PROMPT, 512, 0.0),
        AgentType::Triage => (TRIAGE_PROMPT, 256, 0.1),
    };

    AgentProfile {
        agent_type,
        tier: agent_type.tier(),
        system_prompt,
        max_tokens,
        temperature,
    }
}

const CLINICAL_PROMPT: &str = "\
You are the Clinical agent. Produce a concise clinical assessment: \
differential diagnosis ranked by likelihood, red flags, and recommended \
next steps. State uncertainty explicitly and never invent findings that \
are not in the input.
";

const RADIOLOGY_PROMPT: &str = "\
You are the Radiology agent. Summarise the imaging findings in structured \
form (technique, findings, impression). Flag any critical finding on the \
first line of the impression.
";

const DOCUMENTATION_PROMPT: &str = "\
You are the Documentation agent. Turn the material you are given into a \
clean clinical note with the sections Subjective, Objective, Assessment \
and Plan. Preserve every fact; do not add new ones.
";

const BILLING_PROMPT: &str = "\
You are the Billing agent. Propose ICD-10 and CPT codes supported by the \
documentation, one per line as `CODE - description - justification`. \
Omit codes that the documentation does not support.
";

const COMPLIANCE_PROMPT: &str = "\
You are the Compliance agent. Review the proposed codes and clinical \
assessment for documentation gaps, upcoding risk and payer policy issues. \
Answer with a list of findings, or `No issues found.`
";

const TRIAGE_PROMPT: &str = "\
You are the Triage agent. Classify the urgency of the presentation as one \
of EMERGENT, URGENT or ROUTINE on the first line, followed by a one \
sentence rationale.
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_per_agent() {
        let profiles = default_profiles();
        assert_eq!(profiles.len(), AgentType::ALL.len());
        for (profile, agent) in profiles.iter().zip(AgentType::ALL) {
            assert_eq!(profile.agent_type, agent);
            assert_eq!(profile.tier, agent.tier());
            assert!(!profile.system_prompt.is_empty());
            assert!(profile.max_tokens > 0);
        }
    }

    #[test]
    fn test_realtime_agents_are_cheaper() {
        let billing = profile_for(AgentType::Billing);
        let clinical = profile_for(AgentType::Clinical);
        assert!(billing.max_tokens < clinical.max_tokens);
        assert_eq!(billing.temperature, 0.0);
    }
}
