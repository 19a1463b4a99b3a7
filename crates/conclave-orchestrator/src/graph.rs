use crate::templates::TaskGraphTemplate;
use crate::types::AgentTask;
use conclave_core::{AgentType, ConclaveError, ConclaveResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// A caller-supplied task, as accepted in `custom_tasks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomTask {
    /// Task id; generated as `{agent_type}_{n}` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub agent_type: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl CustomTask {
    pub fn new(agent_type: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: None,
            agent_type: agent_type.into(),
            prompt: prompt.into(),
            system_prompt: None,
            max_tokens: None,
            temperature: None,
            depends_on: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }
}

/// What a graph is built from.
#[derive(Debug, Clone, Copy)]
pub enum GraphSource<'a> {
    Template(&'a TaskGraphTemplate),
    Custom(&'a [CustomTask]),
}

/// A validated, acyclic set of tasks in graph order.
///
/// Graph order is template step order (or the order custom tasks were
/// supplied in); it is the order results are reported in.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    workflow_type: String,
    tasks: Vec<AgentTask>,
    index: HashMap<String, usize>,
    /// Direct predecessors of each task, as indices in graph order.
    predecessors: Vec<Vec<usize>>,
}

impl TaskGraph {
    pub fn workflow_type(&self) -> &str {
        &self.workflow_type
    }

    pub fn tasks(&self) -> &[AgentTask] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&AgentTask> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    /// Position of a task in graph order.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Direct predecessors of the task at `idx`, in graph order.
    pub fn predecessors(&self, idx: usize) -> &[usize] {
        self.predecessors.get(idx).map(Vec::as_slice).unwrap_or(&[])
    }

    fn from_tasks(workflow_type: &str, tasks: Vec<AgentTask>) -> ConclaveResult<Self> {
        let mut index = HashMap::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            if index.insert(task.id.clone(), i).is_some() {
                return Err(ConclaveError::InvalidContext(format!(
                    "duplicate task id '{}'",
                    task.id
                )));
            }
        }

        let mut predecessors = Vec::with_capacity(tasks.len());
        for task in &tasks {
            let mut preds = Vec::with_capacity(task.depends_on.len());
            for dep in &task.depends_on {
                match index.get(dep) {
                    Some(&i) => preds.push(i),
                    None => {
                        return Err(ConclaveError::UnknownDependency {
                            task: task.id.clone(),
                            dependency: dep.clone(),
                        })
                    }
                }
            }
            preds.sort_unstable();
            predecessors.push(preds);
        }

        let graph = Self {
            workflow_type: workflow_type.to_string(),
            tasks,
            index,
            predecessors,
        };
        graph.check_acyclic()?;
        Ok(graph)
    }

    /// Three-colour DFS over dependency edges.
    fn check_acyclic(&self) -> ConclaveResult<()> {
        let mut colour = vec![0u8; self.tasks.len()];
        for start in 0..self.tasks.len() {
            if let Some(at) = self.dfs_cycle(start, &mut colour) {
                return Err(ConclaveError::DependencyCycle(self.tasks[at].id.clone()));
            }
        }
        Ok(())
    }

    fn dfs_cycle(&self, idx: usize, colour: &mut [u8]) -> Option<usize> {
        match colour[idx] {
            1 => return Some(idx), // back edge
            2 => return None,
            _ => {}
        }
        colour[idx] = 1;
        for &dep in &self.predecessors[idx] {
            if let Some(at) = self.dfs_cycle(dep, colour) {
                return Some(at);
            }
        }
        colour[idx] = 2;
        None
    }
}

/// Turns a template or a custom task list plus a context object into a
/// [`TaskGraph`]. Every validation error surfaces here, before dispatch.
pub struct DependencyGraphBuilder;

impl DependencyGraphBuilder {
    pub fn build(
        source: GraphSource<'_>,
        workflow_type: &str,
        context: &Value,
    ) -> ConclaveResult<TaskGraph> {
        let context = context_object(context)?;
        let tasks = match source {
            GraphSource::Template(template) => Self::from_template(template, &context)?,
            GraphSource::Custom(custom) => Self::from_custom(custom, &context)?,
        };
        TaskGraph::from_tasks(workflow_type, tasks)
    }

    fn from_template(
        template: &TaskGraphTemplate,
        context: &Map<String, Value>,
    ) -> ConclaveResult<Vec<AgentTask>> {
        let missing: Vec<&str> = template
            .required_context
            .iter()
            .filter(|field| context.get(*field).map_or(true, Value::is_null))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(ConclaveError::InvalidContext(format!(
                "missing required context field(s) for '{}': {}",
                template.name,
                missing.join(", ")
            )));
        }

        let mut ids = IdSequence::default();
        let by_agent: BTreeMap<AgentType, String> = template
            .steps
            .iter()
            .map(|step| (step.agent_type, ids.next(step.agent_type)))
            .collect();

        template
            .steps
            .iter()
            .map(|step| -> ConclaveResult<AgentTask> {
                let id = by_agent
                    .get(&step.agent_type)
                    .cloned()
                    .unwrap_or_else(|| step.agent_type.to_string());
                let deps = step
                    .after
                    .iter()
                    .map(|dep| {
                        by_agent.get(dep).cloned().ok_or_else(|| {
                            ConclaveError::UnknownDependency {
                                task: id.clone(),
                                dependency: dep.to_string(),
                            }
                        })
                    })
                    .collect::<ConclaveResult<Vec<String>>>()?;
                Ok(
                    AgentTask::new(id, step.agent_type, render_prompt(&step.prompt, context))
                        .with_dependencies(deps),
                )
            })
            .collect()
    }

    fn from_custom(
        custom: &[CustomTask],
        context: &Map<String, Value>,
    ) -> ConclaveResult<Vec<AgentTask>> {
        if custom.is_empty() {
            return Err(ConclaveError::InvalidContext(
                "custom_tasks must contain at least one task".into(),
            ));
        }

        let mut ids = IdSequence::default();
        custom
            .iter()
            .map(|spec| -> ConclaveResult<AgentTask> {
                let agent_type: AgentType = spec.agent_type.parse()?;
                let id = match spec.id.as_deref().map(str::trim) {
                    Some("") => {
                        return Err(ConclaveError::InvalidContext(
                            "task id must not be empty".into(),
                        ))
                    }
                    Some(id) => id.to_string(),
                    None => ids.next(agent_type),
                };
                let mut task = AgentTask::new(id, agent_type, render_prompt(&spec.prompt, context))
                    .with_limits(spec.max_tokens, spec.temperature)
                    .with_dependencies(spec.depends_on.iter().cloned());
                if let Some(system_prompt) = &spec.system_prompt {
                    task.system_prompt = Some(system_prompt.clone());
                }
                Ok(task)
            })
            .collect()
    }
}

/// Per-agent-type counters for `{agent_type}_{n}` ids.
#[derive(Default)]
struct IdSequence {
    counters: HashMap<AgentType, usize>,
}

impl IdSequence {
    fn next(&mut self, agent_type: AgentType) -> String {
        let n = self.counters.entry(agent_type).or_insert(0);
        *n += 1;
        format!("{}_{}", agent_type, n)
    }
}

fn context_object(context: &Value) -> ConclaveResult<Map<String, Value>> {
    match context {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map.clone()),
        other => Err(ConclaveError::InvalidContext(format!(
            "context must be a JSON object, got {}",
            json_type(other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Substitute `{{field}}` placeholders from `context`.
///
/// `{{context}}` renders the whole object as pretty JSON. String values are
/// inserted verbatim, other values as JSON. Unknown placeholders are left
/// in place. Substituted text is not rescanned.
pub fn render_prompt(template: &str, context: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}") else {
            break;
        };
        let name = rest[open + 2..open + 2 + close].trim();
        out.push_str(&rest[..open]);

        let replacement = if name == "context" {
            serde_json::to_string_pretty(context).ok()
        } else {
            context.get(name).map(|value| match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        };
        match replacement {
            Some(text) => out.push_str(&text),
            None => out.push_str(&rest[open..open + 4 + close]),
        }
        rest = &rest[open + 4 + close..];
    }
    out.push_str(rest);
    out
}
