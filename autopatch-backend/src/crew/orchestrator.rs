//! Sequential crew execution

use super::agent::Agent;
use super::types::{AgentRole, CrewOutput, TaskOutput, TaskSpec};
use crate::scan::ScanLogger;
use crate::tools::ToolContext;
use std::collections::{HashMap, HashSet};

/// Agents plus an ordered task list whose context references point backwards
#[derive(Debug)]
pub struct Crew {
    agents: HashMap<AgentRole, Agent>,
    tasks: Vec<TaskSpec>,
}

impl Crew {
    pub fn new(agents: Vec<Agent>, tasks: Vec<TaskSpec>) -> Result<Self, String> {
        if tasks.is_empty() {
            return Err("A crew needs at least one task".to_string());
        }

        let agents: HashMap<AgentRole, Agent> = agents.into_iter().map(|a| (a.role(), a)).collect();
        let mut earlier: HashSet<&str> = HashSet::new();

        for task in &tasks {
            if earlier.contains(task.id.as_str()) {
                return Err(format!("Duplicate task id '{}'", task.id));
            }
            if !agents.contains_key(&task.agent) {
                return Err(format!(
                    "Task '{}' is assigned to {}, who is not part of the crew",
                    task.id,
                    task.agent.display_name()
                ));
            }
            for dep in &task.context {
                if !earlier.contains(dep.as_str()) {
                    return Err(format!(
                        "Task '{}' uses context from '{}', which is not an earlier task",
                        task.id, dep
                    ));
                }
            }
            earlier.insert(task.id.as_str());
        }

        Ok(Self { agents, tasks })
    }

    pub fn tasks(&self) -> &[TaskSpec] {
        &self.tasks
    }

    /// Run every task in order, stopping at the first failure
    pub async fn kickoff(
        &self,
        tool_context: &ToolContext,
        logger: &ScanLogger,
    ) -> Result<CrewOutput, String> {
        log::info!("[CREW] Kickoff with {} task(s)", self.tasks.len());
        let mut outputs: Vec<TaskOutput> = Vec::with_capacity(self.tasks.len());

        for task in &self.tasks {
            // Validated in new()
            let Some(agent) = self.agents.get(&task.agent) else {
                return Err(format!("Task '{}' has no agent", task.id));
            };
            let context: Vec<&TaskOutput> = task
                .context
                .iter()
                .filter_map(|id| outputs.iter().find(|o| &o.task_id == id))
                .collect();

            let raw = agent
                .execute_task(task, &context, tool_context, logger)
                .await
                .map_err(|e| {
                    log::error!("[CREW] Task '{}' failed: {}", task.id, e);
                    format!("Task '{}' failed: {}", task.id, e)
                })?;

            outputs.push(TaskOutput {
                task_id: task.id.clone(),
                agent: task.agent,
                description: task.description.clone(),
                raw,
            });
        }

        let raw = outputs.last().map(|o| o.raw.clone()).unwrap_or_default();
        log::info!("[CREW] All {} task(s) completed", outputs.len());
        Ok(CrewOutput { tasks: outputs, raw })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AiResponse;
    use crate::ai::scripted::ScriptedModel;
    use crate::browser::fake::FakeSite;
    use crate::crew::presets::default_presets;
    use crate::crew::AgentFactory;
    use crate::tools::builtin::test_support::context_for;
    use crate::tools::create_default_registry;
    use std::sync::Arc;

    fn factory(model: Arc<ScriptedModel>) -> AgentFactory {
        AgentFactory::new(model, Arc::new(create_default_registry()), default_presets(), 3)
    }

    fn agents(factory: &AgentFactory, roles: &[AgentRole]) -> Vec<Agent> {
        roles.iter().map(|r| factory.build(*r).unwrap()).collect()
    }

    #[test]
    fn test_rejects_invalid_task_graphs() {
        let f = factory(Arc::new(ScriptedModel::new(vec![])));
        let fixer = || agents(&f, &[AgentRole::Fixer]);

        assert!(Crew::new(fixer(), vec![]).is_err());

        let dup = vec![
            TaskSpec::new("a", AgentRole::Fixer, "x", "y"),
            TaskSpec::new("a", AgentRole::Fixer, "x", "y"),
        ];
        assert!(Crew::new(fixer(), dup).unwrap_err().contains("Duplicate task id 'a'"));

        let missing_agent = vec![TaskSpec::new("a", AgentRole::Crawler, "x", "y")];
        assert!(Crew::new(fixer(), missing_agent).unwrap_err().contains("not part of the crew"));

        let forward = vec![
            TaskSpec::new("a", AgentRole::Fixer, "x", "y").with_context(&["b"]),
            TaskSpec::new("b", AgentRole::Fixer, "x", "y"),
        ];
        assert!(Crew::new(fixer(), forward).unwrap_err().contains("not an earlier task"));

        let self_ref = vec![TaskSpec::new("a", AgentRole::Fixer, "x", "y").with_context(&["a"])];
        assert!(Crew::new(fixer(), self_ref).is_err());
    }

    #[tokio::test]
    async fn test_kickoff_passes_context_in_order() {
        let model = Arc::new(ScriptedModel::new(vec![
            AiResponse::text("first output"),
            AiResponse::text("second output"),
            AiResponse::text("third output"),
        ]));
        let f = factory(model.clone());
        let crew = Crew::new(
            agents(&f, &[AgentRole::Fixer]),
            vec![
                TaskSpec::new("one", AgentRole::Fixer, "Task one", "out"),
                TaskSpec::new("two", AgentRole::Fixer, "Task two", "out"),
                TaskSpec::new("three", AgentRole::Fixer, "Task three", "out").with_context(&["one"]),
            ],
        )
        .unwrap();
        let (logger, _rx) = ScanLogger::channel();

        let output = crew.kickoff(&context_for(&FakeSite::new()), &logger).await.unwrap();
        assert_eq!(output.raw, "third output");
        let ids: Vec<&str> = output.tasks.iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(ids, vec!["one", "two", "three"]);

        let calls = model.calls();
        let third_prompt = &calls[2].messages[1].content;
        assert!(third_prompt.contains("first output"));
        assert!(!third_prompt.contains("second output"));
        assert!(!calls[1].messages[1].content.contains("first output"));
    }

    #[tokio::test]
    async fn test_first_failure_aborts_crew() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        model.push_error("provider down");
        let f = factory(model.clone());
        let crew = Crew::new(
            agents(&f, &[AgentRole::Fixer]),
            vec![
                TaskSpec::new("one", AgentRole::Fixer, "Task one", "out"),
                TaskSpec::new("two", AgentRole::Fixer, "Task two", "out"),
            ],
        )
        .unwrap();
        let (logger, _rx) = ScanLogger::channel();

        let err = crew.kickoff(&context_for(&FakeSite::new()), &logger).await.unwrap_err();
        assert_eq!(err, "Task 'one' failed: provider down");
        assert_eq!(model.calls().len(), 1);
    }
}
