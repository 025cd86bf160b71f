//! LLM-as-judge grading of generated answers against reference solutions.
//!
//! The judge replies with a raw label. Labels are mapped to verdicts by exact
//! string equality: `"1"` correct, `"0"` undecided, `"-1"` incorrect. Anything
//! else, including a missing reply, is a judge error.

use crate::error::{RagEvalError, Result};
use crate::llm::{CompletionOracle, Message, Prompts, Role};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Label for an answer judged correct.
pub const CORRECT_LABEL: &str = "1";
/// Label for an answer the judge could not decide on.
pub const UNDECIDED_LABEL: &str = "0";
/// Label for an answer judged incorrect.
pub const INCORRECT_LABEL: &str = "-1";
/// Label recorded, without calling the judge, when no answer was generated.
pub const GENERATION_FAILED_LABEL: &str = INCORRECT_LABEL;

/// Categorical outcome of judging one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Correct,
    Undecided,
    Incorrect,
    /// Unrecognised or missing judge output.
    #[serde(rename = "wrong_evaluator")]
    JudgeError,
}

impl Verdict {
    /// Map a raw label to a verdict. Only the exact tokens are recognised.
    pub fn from_label(label: Option<&str>) -> Self {
        match label {
            Some(CORRECT_LABEL) => Verdict::Correct,
            Some(UNDECIDED_LABEL) => Verdict::Undecided,
            Some(INCORRECT_LABEL) => Verdict::Incorrect,
            _ => Verdict::JudgeError,
        }
    }
}

/// Grades answers with a completion oracle.
pub struct Judge {
    oracle: Arc<dyn CompletionOracle>,
    model: String,
    temperature: f32,
    system_prompt: Message,
}

impl Judge {
    /// Create a judge with the default system prompt.
    pub fn new(oracle: Arc<dyn CompletionOracle>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            oracle,
            model: model.into(),
            temperature,
            system_prompt: Message::system(Prompts::judge_system()),
        }
    }

    /// Replace the system prompt.
    pub fn with_system_prompt(mut self, prompt: Message) -> Self {
        self.system_prompt = prompt;
        self
    }

    /// Load a system prompt from a YAML file holding a single `{role, content}` message.
    pub fn load_system_prompt(path: &Path) -> Result<Message> {
        let content = std::fs::read_to_string(path).map_err(|e| RagEvalError::io(path, e))?;
        let message: Message = serde_yaml::from_str(&content).map_err(|e| {
            RagEvalError::Config(format!(
                "Failed to parse judge prompt '{}': {}",
                path.display(),
                e
            ))
        })?;

        if message.role != Role::System {
            return Err(RagEvalError::Config(format!(
                "Judge prompt '{}' must have role 'system'",
                path.display()
            )));
        }
        Ok(message)
    }

    /// Messages sent for one comparison.
    pub fn build_messages(&self, solution: &str, answer: &str) -> Vec<Message> {
        vec![
            self.system_prompt.clone(),
            Message::user(Prompts::judge_user(solution, answer)),
        ]
    }

    /// Grade `answer` against `solution`. Returns the raw label, or `None` if
    /// the oracle call failed.
    pub async fn judge(&self, solution: &str, answer: &str) -> Option<String> {
        let messages = self.build_messages(solution, answer);

        match self
            .oracle
            .complete(&messages, &self.model, self.temperature)
            .await
        {
            Ok(label) => Some(label),
            Err(e) => {
                warn!(error = %e, "judge oracle failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Replies with a fixed label, or fails if none is set.
    struct FixedOracle(Option<&'static str>);

    #[async_trait]
    impl CompletionOracle for FixedOracle {
        async fn complete(&self, _: &[Message], _: &str, _: f32) -> Result<String> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| RagEvalError::Oracle("judge unavailable".to_string()))
        }
    }

    #[test]
    fn test_verdict_mapping_is_exact() {
        assert_eq!(Verdict::from_label(Some("1")), Verdict::Correct);
        assert_eq!(Verdict::from_label(Some("0")), Verdict::Undecided);
        assert_eq!(Verdict::from_label(Some("-1")), Verdict::Incorrect);
        assert_eq!(Verdict::from_label(Some("bad")), Verdict::JudgeError);
        assert_eq!(Verdict::from_label(Some(" 1")), Verdict::JudgeError);
        assert_eq!(Verdict::from_label(Some("1.")), Verdict::JudgeError);
        assert_eq!(Verdict::from_label(Some("")), Verdict::JudgeError);
        assert_eq!(Verdict::from_label(None), Verdict::JudgeError);
    }

    #[test]
    fn test_generation_failure_label_counts_as_incorrect() {
        assert_eq!(
            Verdict::from_label(Some(GENERATION_FAILED_LABEL)),
            Verdict::Incorrect
        );
    }

    #[test]
    fn test_verdict_serialization_names() {
        assert_eq!(
            serde_json::to_string(&Verdict::JudgeError).unwrap(),
            "\"wrong_evaluator\""
        );
        assert_eq!(serde_json::to_string(&Verdict::Correct).unwrap(), "\"correct\"");
    }

    #[test]
    fn test_judge_returns_raw_label() {
        let judge = Judge::new(Arc::new(FixedOracle(Some("0"))), "judge", 0.0);
        let label = tokio_test::block_on(judge.judge("solution", "answer"));
        assert_eq!(label.as_deref(), Some("0"));
    }

    #[test]
    fn test_judge_failure_is_absent_label() {
        let judge = Judge::new(Arc::new(FixedOracle(None)), "judge", 0.0);
        let label = tokio_test::block_on(judge.judge("solution", "answer"));
        assert!(label.is_none());
        assert_eq!(Verdict::from_label(label.as_deref()), Verdict::JudgeError);
    }

    #[test]
    fn test_load_system_prompt_from_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("judge.yaml");
        std::fs::write(&path, "role: system\ncontent: Grade strictly.\n").unwrap();

        let prompt = Judge::load_system_prompt(&path).unwrap();
        assert_eq!(prompt.content, "Grade strictly.");

        let judge = Judge::new(Arc::new(FixedOracle(Some("1"))), "judge", 0.0)
            .with_system_prompt(prompt);
        let messages = judge.build_messages("s", "a");
        assert_eq!(messages[0].content, "Grade strictly.");
        assert_eq!(messages[1].role, Role::User);
    }

    #[test]
    fn test_load_system_prompt_rejects_user_role() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("judge.yaml");
        std::fs::write(&path, "role: user\ncontent: hi\n").unwrap();
        assert!(matches!(
            Judge::load_system_prompt(&path),
            Err(RagEvalError::Config(_))
        ));
    }
}
