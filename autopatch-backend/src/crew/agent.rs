//! A role-specialized agent driving a native tool-calling loop

use super::types::{AgentPreset, AgentRole, TaskOutput, TaskSpec};
use crate::ai::{ChatModel, Message, ToolCall, ToolHistoryEntry, ToolResponse};
use crate::browser::html::truncate_chars;
use crate::scan::ScanLogger;
use crate::tools::{Tool, ToolContext, ToolDefinition};
use std::sync::Arc;

/// Longest tool output echoed into the scan log
const LOGGED_OUTPUT_CHARS: usize = 500;

pub struct Agent {
    preset: AgentPreset,
    llm: Arc<dyn ChatModel>,
    tools: Vec<Arc<dyn Tool>>,
    max_iterations: usize,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("role", &self.preset.role)
            .field("model", &self.llm.model_name())
            .field("tools", &self.tool_names())
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}

impl Agent {
    pub fn new(
        preset: AgentPreset,
        llm: Arc<dyn ChatModel>,
        tools: Vec<Arc<dyn Tool>>,
        max_iterations: usize,
    ) -> Self {
        Self {
            preset,
            llm,
            tools,
            max_iterations: max_iterations.max(1),
        }
    }

    pub fn role(&self) -> AgentRole {
        self.preset.role
    }

    pub fn name(&self) -> &'static str {
        self.preset.role.display_name()
    }

    pub fn preset(&self) -> &AgentPreset {
        &self.preset
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    fn system_prompt(&self) -> String {
        let mut prompt = format!(
            "You are {}. {}\nYour personal goal is: {}",
            self.name(),
            self.preset.backstory,
            self.preset.goal
        );
        if self.tools.is_empty() {
            prompt.push_str("\nYou have no tools. Answer from the context you are given.");
        } else {
            prompt.push_str("\nYou ONLY have access to the following tools:\n");
            for def in self.tool_definitions() {
                prompt.push_str(&format!("- {}: {}\n", def.name, def.description));
            }
            prompt.push_str(
                "Call tools as needed. When you have enough information, reply without calling \
                 any tool; that reply is your final answer.",
            );
        }
        prompt
    }

    fn task_prompt(task: &TaskSpec, context: &[&TaskOutput]) -> String {
        let mut prompt = format!(
            "Current Task: {}\n\nThis is the expected criteria for your final answer: {}\n\
             You MUST return the actual complete content as the final answer, not a summary.",
            task.description, task.expected_output
        );
        if !context.is_empty() {
            prompt.push_str("\n\nThis is the context you're working with:\n");
            let parts: Vec<String> = context
                .iter()
                .map(|out| format!("[{} / {}]\n{}", out.agent.display_name(), out.task_id, out.raw))
                .collect();
            prompt.push_str(&parts.join("\n\n"));
        }
        prompt
    }

    /// Run one task to its final answer
    pub async fn execute_task(
        &self,
        task: &TaskSpec,
        context: &[&TaskOutput],
        tool_context: &ToolContext,
        logger: &ScanLogger,
    ) -> Result<String, String> {
        log::info!(
            "[AGENT] {} starting task '{}' with {} tool(s)",
            self.name(),
            task.id,
            self.tools.len()
        );
        logger.log(format!("# Agent: {}", self.name()));
        logger.log(format!("## Task: {}", task.description));

        let messages = vec![
            Message::system(self.system_prompt()),
            Message::user(Self::task_prompt(task, context)),
        ];

        let answer = if self.tools.is_empty() {
            self.llm.generate_text(messages).await?
        } else {
            self.run_tool_loop(messages, tool_context, logger).await?
        };

        let answer = answer.trim().to_string();
        if answer.is_empty() {
            return Err(format!("{} returned an empty final answer", self.name()));
        }

        logger.log(format!("## Final Answer: {}", answer));
        log::info!("[AGENT] {} finished task '{}'", self.name(), task.id);
        Ok(answer)
    }

    async fn run_tool_loop(
        &self,
        mut messages: Vec<Message>,
        tool_context: &ToolContext,
        logger: &ScanLogger,
    ) -> Result<String, String> {
        let tools = self.tool_definitions();
        let mut tool_history: Vec<ToolHistoryEntry> = Vec::new();

        for iteration in 1..=self.max_iterations {
            log::debug!("[AGENT] {} iteration {}", self.name(), iteration);

            let response = self
                .llm
                .generate_with_tools(messages.clone(), tool_history.clone(), tools.clone())
                .await?;

            if !response.is_tool_use() {
                return Ok(response.content);
            }

            let thought = response.content.trim();
            if self.preset.verbose && !thought.is_empty() {
                logger.log(format!("## Thought: {}", thought));
            }

            let responses = self.execute_tool_calls(&response.tool_calls, tool_context, logger).await;
            tool_history.push(ToolHistoryEntry::new(response.tool_calls, responses));
        }

        log::warn!(
            "[AGENT] {} reached {} tool iterations, asking for a final answer",
            self.name(),
            self.max_iterations
        );
        let nudge = Message::user(
            "You have used all of your tool calls. Give your best final answer now, based only on \
             the tool results you already have.",
        );
        match tool_history.last_mut() {
            Some(last) => last.follow_up = Some(nudge),
            None => messages.push(nudge),
        }
        let response = self.llm.generate_with_tools(messages, tool_history, vec![]).await?;
        Ok(response.content)
    }

    async fn execute_tool_calls(
        &self,
        calls: &[ToolCall],
        tool_context: &ToolContext,
        logger: &ScanLogger,
    ) -> Vec<ToolResponse> {
        let mut responses = Vec::with_capacity(calls.len());

        for call in calls {
            if self.preset.verbose {
                logger.log(format!("## Using tool: {}", call.name));
                logger.log(format!("## Tool Input: {}", call.arguments));
            }

            let Some(tool) = self.tools.iter().find(|t| t.name() == call.name) else {
                log::warn!("[AGENT] {} called unavailable tool '{}'", self.name(), call.name);
                let message = format!(
                    "Tool '{}' is not available to {}. Available tools: {}",
                    call.name,
                    self.name(),
                    self.tool_names().join(", ")
                );
                if self.preset.verbose {
                    logger.log(format!("## Tool Output: {}", message));
                }
                responses.push(ToolResponse::error(call.id.clone(), message));
                continue;
            };

            let start = std::time::Instant::now();
            let result = tool.execute(call.arguments.clone(), tool_context).await;
            log::info!(
                "[TOOL] {} -> {} in {}ms",
                call.name,
                if result.success { "ok" } else { "error" },
                start.elapsed().as_millis()
            );

            if self.preset.verbose {
                logger.log(format!(
                    "## Tool Output: {}",
                    truncate_chars(&result.content, LOGGED_OUTPUT_CHARS)
                ));
            }

            responses.push(if result.success {
                ToolResponse::success(call.id.clone(), result.content)
            } else {
                ToolResponse::error(call.id.clone(), result.content)
            });
        }

        responses
    }
}
