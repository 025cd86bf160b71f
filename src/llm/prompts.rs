//! Prompts for answer generation and judging.

use crate::chunker::ChunkId;

/// Collection of prompts used by the answer generator and the judge.
pub struct Prompts;

impl Prompts {
    /// System instruction for answering a question from retrieved context.
    pub fn answer_system() -> &'static str {
        r#"You are a helpful assistant answering questions about course material.

You are given a question and a set of context passages retrieved from the course documents, most relevant first. Answer the question using the passages. If the passages do not contain enough information, answer as best you can and say what is missing.

Give a complete, self-contained answer. Do not refer to the passages by number."#
    }

    /// User message carrying the retrieved passages (in retrieval order) and the question.
    pub fn answer_user<'a>(
        question: &str,
        passages: impl IntoIterator<Item = (ChunkId, &'a str)>,
    ) -> String {
        let mut content = String::from("<context>\n");
        for (id, text) in passages {
            content.push_str(&format!("<passage id=\"{}\">\n{}\n</passage>\n", id, text));
        }
        content.push_str("</context>\n\n");
        content.push_str(&format!("<question>\n{}\n</question>\n", question));
        content
    }

    /// Default judge system prompt.
    ///
    /// The verdict vocabulary (`1`, `0`, `-1`) is fixed here; any other reply is
    /// counted as a judge error.
    pub fn judge_system() -> &'static str {
        r#"You are a strict grader. You are given the reference solution to a question and an answer produced by a student.

Compare the answer with the reference solution and reply with exactly one token:
1 if the answer is correct and consistent with the solution,
0 if you cannot decide whether the answer is correct,
-1 if the answer is incorrect or contradicts the solution.

Reply with the token only, without punctuation, explanation or surrounding whitespace."#
    }

    /// User message comparing the reference solution and the generated answer.
    pub fn judge_user(solution: &str, answer: &str) -> String {
        format!(
            "<question_solution>\n{}\n</question_solution>\n\n<answer>\n{}\n</answer>\n\n",
            solution, answer
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_are_not_empty() {
        assert!(!Prompts::answer_system().is_empty());
        assert!(!Prompts::judge_system().is_empty());
    }

    #[test]
    fn test_answer_user_keeps_retrieval_order() {
        let content = Prompts::answer_user("Why?", vec![(7, "second best"), (2, "third")]);
        let first = content.find("id=\"7\"").unwrap();
        let second = content.find("id=\"2\"").unwrap();
        assert!(first < second);
        assert!(content.ends_with("<question>\nWhy?\n</question>\n"));
    }

    #[test]
    fn test_judge_user_places_solution_and_answer() {
        let content = Prompts::judge_user("the reference", "the attempt");
        assert!(content.starts_with("<question_solution>\nthe reference\n</question_solution>"));
        assert!(content.contains("<answer>\nthe attempt\n</answer>"));
    }
}
