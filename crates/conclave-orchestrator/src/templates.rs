use conclave_core::{AgentType, ConclaveError, ConclaveResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One agent step of a workflow template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateStep {
    pub agent_type: AgentType,
    /// Agent types (steps of the same template) whose output this step needs.
    #[serde(default)]
    pub after: Vec<AgentType>,
    /// Prompt with `{{field}}` context placeholders.
    pub prompt: String,
}

impl TemplateStep {
    pub fn new(agent_type: AgentType, prompt: impl Into<String>) -> Self {
        Self {
            agent_type,
            after: Vec::new(),
            prompt: prompt.into(),
        }
    }

    pub fn after(mut self, deps: &[AgentType]) -> Self {
        self.after = deps.to_vec();
        self
    }
}

/// A named workflow: participating agent types, their ordering constraints
/// and the context fields a request must carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskGraphTemplate {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required_context: Vec<String>,
    pub steps: Vec<TemplateStep>,
}

impl TaskGraphTemplate {
    pub fn agent_types(&self) -> Vec<AgentType> {
        self.steps.iter().map(|s| s.agent_type).collect()
    }

    pub fn describe(&self) -> WorkflowDescriptor {
        WorkflowDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            required_context: self.required_context.clone(),
            agent_types: self.agent_types(),
        }
    }

    /// Structural checks: at least one step, one step per agent type, and
    /// `after` only naming steps of this template.
    fn validate(&self) -> ConclaveResult<()> {
        if self.steps.is_empty() {
            return Err(ConclaveError::Config(format!(
                "workflow template '{}' has no steps",
                self.name
            )));
        }
        let mut seen = BTreeSet::new();
        for step in &self.steps {
            if !seen.insert(step.agent_type) {
                return Err(ConclaveError::Config(format!(
                    "workflow template '{}' lists agent type '{}' twice",
                    self.name, step.agent_type
                )));
            }
        }
        for step in &self.steps {
            if let Some(missing) = step.after.iter().find(|dep| !seen.contains(*dep)) {
                return Err(ConclaveError::Config(format!(
                    "workflow template '{}': step '{}' depends on '{}', which is not part of the template",
                    self.name, step.agent_type, missing
                )));
            }
        }
        Ok(())
    }
}

/// Public listing entry for `GET /v1/workflows/types`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDescriptor {
    pub name: String,
    pub description: String,
    pub required_context: Vec<String>,
    pub agent_types: Vec<AgentType>,
}

/// Static lookup of workflow templates by name.
#[derive(Debug, Clone)]
pub struct WorkflowTemplateRegistry {
    templates: BTreeMap<String, TaskGraphTemplate>,
}

impl WorkflowTemplateRegistry {
    /// A registry holding no templates.
    pub fn empty() -> Self {
        Self {
            templates: BTreeMap::new(),
        }
    }

    /// The built-in templates.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for template in builtin_templates() {
            registry.templates.insert(template.name.clone(), template);
        }
        registry
    }

    /// Add or replace a template.
    pub fn register(&mut self, template: TaskGraphTemplate) -> ConclaveResult<()> {
        template.validate()?;
        self.templates.insert(template.name.clone(), template);
        Ok(())
    }

    pub fn resolve(&self, workflow_type: &str) -> ConclaveResult<&TaskGraphTemplate> {
        self.templates
            .get(workflow_type)
            .ok_or_else(|| ConclaveError::UnknownWorkflowType(workflow_type.to_string()))
    }

    /// Every template, sorted by name.
    pub fn list(&self) -> Vec<WorkflowDescriptor> {
        self.templates.values().map(TaskGraphTemplate::describe).collect()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl Default for WorkflowTemplateRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn template(
    name: &str,
    description: &str,
    required_context: &[&str],
    steps: Vec<TemplateStep>,
) -> TaskGraphTemplate {
    TaskGraphTemplate {
        name: name.to_string(),
        description: description.to_string(),
        required_context: required_context.iter().map(|s| s.to_string()).collect(),
        steps,
    }
}

fn builtin_templates() -> Vec<TaskGraphTemplate> {
    use AgentType::*;

    vec![
        template(
            "clinical_billing",
            "Clinical assessment and billing codes, run in parallel",
            &["patient_summary"],
            vec![
                TemplateStep::new(
                    Clinical,
                    "Assess the following patient.\n\n{{patient_summary}}",
                ),
                TemplateStep::new(
                    Billing,
                    "Propose billing codes for this encounter.\n\n{{patient_summary}}",
                ),
            ],
        ),
        template(
            "patient_intake",
            "Triage, clinical assessment, then a documented intake note",
            &["chief_complaint", "history"],
            vec![
                TemplateStep::new(
                    Triage,
                    "Chief complaint: {{chief_complaint}}\nHistory: {{history}}",
                ),
                TemplateStep::new(
                    Clinical,
                    "Assess this patient given the triage outcome.\n\nChief complaint: {{chief_complaint}}\nHistory: {{history}}",
                )
                .after(&[Triage]),
                TemplateStep::new(
                    Documentation,
                    "Write the intake note for this encounter.\n\nChief complaint: {{chief_complaint}}",
                )
                .after(&[Clinical]),
            ],
        ),
        template(
            "claim_review",
            "Clinical and billing review of a claim, then a compliance check",
            &["claim", "patient_summary"],
            vec![
                TemplateStep::new(
                    Clinical,
                    "Summarise the clinical picture relevant to this claim.\n\n{{patient_summary}}",
                ),
                TemplateStep::new(Billing, "Validate the codes on this claim.\n\n{{claim}}"),
                TemplateStep::new(
                    Compliance,
                    "Review the claim against the clinical and billing findings.\n\n{{claim}}",
                )
                .after(&[Clinical, Billing]),
            ],
        ),
        template(
            "imaging_consult",
            "Radiology read followed by a clinical interpretation",
            &["imaging_findings"],
            vec![
                TemplateStep::new(Radiology, "Report on these findings.\n\n{{imaging_findings}}"),
                TemplateStep::new(
                    Clinical,
                    "Interpret the radiology report in clinical context.",
                )
                .after(&[Radiology]),
            ],
        ),
    ]
}
