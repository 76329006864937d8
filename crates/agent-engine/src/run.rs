//! Run - bookkeeping for one agent execution
//!
//! A Run collects what happened across turns so the orchestrator can build
//! the closing summary and the single history entry written when the run
//! finishes.

/// Per-run ledger owned by the orchestrator
#[derive(Debug, Clone, Default)]
pub struct Run {
    /// Turns started so far
    pub turns: u32,

    /// Narrative text of each turn that produced any, in order
    pub reasoning_trace: Vec<String>,

    /// Tool invocation counts in first-use order
    pub tool_usage: Vec<(String, u32)>,

    /// Answer from the last turn, once the model stops calling tools
    pub final_answer: Option<String>,
}

impl Run {
    /// Create an empty run
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a turn's narrative text
    pub fn record_turn_text(&mut self, text: &str) {
        if !text.is_empty() {
            self.reasoning_trace.push(text.to_string());
        }
    }

    /// Count one invocation of `tool`
    pub fn record_tool_use(&mut self, tool: &str) {
        match self.tool_usage.iter_mut().find(|(name, _)| name == tool) {
            Some((_, count)) => *count += 1,
            None => self.tool_usage.push((tool.to_string(), 1)),
        }
    }

    /// Close the run with the text of a turn that requested no tools.
    ///
    /// That text is the answer, so it never enters the reasoning trace.
    pub fn finish_with_answer(&mut self, text: &str) {
        if !text.is_empty() {
            self.final_answer = Some(text.to_string());
        }
    }

    /// Collapsible markdown block with tool usage and reasoning trace
    pub fn summary_markdown(&self) -> Option<String> {
        if self.tool_usage.is_empty() && self.reasoning_trace.is_empty() {
            return None;
        }

        let mut summary = String::from(
            "\n\n<details><summary>Click to view reasoning and tool usage</summary>\n\n",
        );

        if !self.tool_usage.is_empty() {
            summary.push_str("#### Tool Usage\n");
            for (tool, count) in &self.tool_usage {
                summary.push_str(&format!("- **{}**: {}\n", tool, count));
            }
            summary.push('\n');
        }

        if !self.reasoning_trace.is_empty() {
            summary.push_str("#### Reasoning Trace\n");
            for (i, step) in self.reasoning_trace.iter().enumerate() {
                summary.push_str(&format!("{}. {}\n\n", i + 1, step));
            }
        }

        summary.push_str("</details>");
        Some(summary)
    }

    /// Text persisted for the run: final answer followed by the summary
    pub fn history_text(&self, summary: Option<&str>) -> Option<String> {
        let mut text = self.final_answer.clone().unwrap_or_default();
        if let Some(summary) = summary {
            text.push_str(summary);
        }
        (!text.is_empty()).then_some(text)
    }
}
