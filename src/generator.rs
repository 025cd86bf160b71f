//! Answer generation from retrieved context.
//!
//! Oracle failures are not retried and never abort a batch: they come back as
//! an absent answer. Retrieval failures (bad k, dimension mismatch, degenerate
//! vectors) are data or configuration errors and do propagate.

use crate::chunker::Index;
use crate::error::{RagEvalError, Result};
use crate::llm::{CompletionOracle, Message, Prompts};
use crate::retriever::Retriever;
use crate::store::Ranking;
use std::sync::Arc;
use tracing::{debug, warn};

/// Answer for one query together with the exact context the model saw.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAnswer {
    /// `None` when the generation oracle failed.
    pub answer: Option<String>,
    /// Chunks placed in the prompt, in prompt order.
    pub retrieved: Ranking,
}

/// Retrieves context for a question and asks the generation oracle to answer.
pub struct AnswerGenerator {
    retriever: Arc<Retriever>,
    index: Arc<Index>,
    oracle: Arc<dyn CompletionOracle>,
    model: String,
    temperature: f32,
}

impl AnswerGenerator {
    pub fn new(
        retriever: Arc<Retriever>,
        index: Arc<Index>,
        oracle: Arc<dyn CompletionOracle>,
        model: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Self {
            retriever,
            index,
            oracle,
            model: model.into(),
            temperature,
        }
    }

    /// The retriever used for context.
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Prompt for `question` with the ranked chunks' text in retrieval order.
    pub fn build_messages(&self, question: &str, ranking: &Ranking) -> Result<Vec<Message>> {
        let passages = ranking
            .hits
            .iter()
            .map(|hit| {
                self.index
                    .get(hit.id)
                    .map(|chunk| (hit.id, chunk.text.as_str()))
                    .ok_or_else(|| {
                        RagEvalError::DataIntegrity(format!(
                            "retrieved chunk {} is not in the index",
                            hit.id
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(vec![
            Message::system(Prompts::answer_system()),
            Message::user(Prompts::answer_user(question, passages)),
        ])
    }

    /// Ask the oracle once. An oracle failure yields `Ok(None)`.
    pub async fn answer(&self, question: &str, ranking: &Ranking) -> Result<Option<String>> {
        let messages = self.build_messages(question, ranking)?;

        match self
            .oracle
            .complete(&messages, &self.model, self.temperature)
            .await
        {
            Ok(answer) => {
                debug!(chars = answer.len(), "generated answer");
                Ok(Some(answer))
            }
            Err(e) => {
                warn!(error = %e, "generation oracle failed; answer marked absent");
                Ok(None)
            }
        }
    }

    /// Retrieve context for one question and answer it.
    pub async fn generate(&self, question: &str) -> Result<GeneratedAnswer> {
        let retrieved = self.retriever.retrieve_one(question).await?;
        let answer = self.answer(question, &retrieved).await?;
        Ok(GeneratedAnswer { answer, retrieved })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::{ChunkConfig, IndexBuilder};
    use crate::embeddings::{EmbeddingGateway, EmbeddingMatrix};
    use crate::llm::Role;
    use crate::store::VectorStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Embeds by counting occurrences of 'x', 'y' and 'z'.
    struct XyzGateway;

    #[async_trait]
    impl EmbeddingGateway for XyzGateway {
        async fn embed(&self, texts: &[String], _: &str, _: usize) -> Result<EmbeddingMatrix> {
            EmbeddingMatrix::from_rows(
                texts
                    .iter()
                    .map(|t| {
                        ['x', 'y', 'z']
                            .iter()
                            .map(|c| t.matches(*c).count() as f32 + 0.01)
                            .collect()
                    })
                    .collect(),
            )
        }
    }

    /// Records prompts; fails when the question mentions "fail".
    #[derive(Default)]
    struct RecordingOracle {
        prompts: Mutex<Vec<Vec<Message>>>,
    }

    #[async_trait]
    impl CompletionOracle for RecordingOracle {
        async fn complete(&self, messages: &[Message], model: &str, _: f32) -> Result<String> {
            self.prompts.lock().unwrap().push(messages.to_vec());
            if messages[1].content.contains("fail") {
                return Err(RagEvalError::Oracle("simulated outage".to_string()));
            }
            Ok(format!("answer from {}", model))
        }
    }

    async fn generator(oracle: Arc<RecordingOracle>) -> AnswerGenerator {
        let mut builder = IndexBuilder::new(ChunkConfig {
            chunk_size: 4,
            chunk_overlap: 0,
        })
        .unwrap();
        builder.add_document("doc.txt", "xxxxyyyyzzzz");
        let index = Arc::new(builder.build());

        let gateway: Arc<dyn EmbeddingGateway> = Arc::new(XyzGateway);
        let matrix = gateway.embed(&index.texts(), "xyz", 8).await.unwrap();
        let store = Arc::new(VectorStore::load_for_index(matrix, &index).unwrap());
        let retriever = Arc::new(Retriever::new(store, gateway, "xyz", 8, 2).unwrap());

        AnswerGenerator::new(retriever, index, oracle, "gen-model", 0.0)
    }

    #[tokio::test]
    async fn test_generate_uses_retrieved_context_in_order() {
        let oracle = Arc::new(RecordingOracle::default());
        let generator = generator(oracle.clone()).await;

        let generated = generator.generate("zz y?").await.unwrap();
        assert_eq!(generated.answer.as_deref(), Some("answer from gen-model"));
        assert_eq!(generated.retrieved.ids(), vec![2, 1]);

        let prompts = oracle.prompts.lock().unwrap();
        let messages = &prompts[0];
        assert_eq!(messages[0].role, Role::System);
        let user = &messages[1].content;
        assert!(user.find("zzzz").unwrap() < user.find("yyyy").unwrap());
        assert!(!user.contains("xxxx"));
    }

    #[tokio::test]
    async fn test_oracle_failure_yields_absent_answer() {
        let oracle = Arc::new(RecordingOracle::default());
        let generator = generator(oracle).await;

        let mut answers = Vec::new();
        for question in ["x", "fail y", "z"] {
            answers.push(generator.generate(question).await.unwrap());
        }

        assert!(answers[0].answer.is_some());
        assert!(answers[1].answer.is_none());
        assert_eq!(answers[1].retrieved.len(), 2);
        assert!(answers[2].answer.is_some());
    }

    #[test]
    fn test_unknown_chunk_is_integrity_error() {
        let generator = tokio_test::block_on(generator(Arc::new(RecordingOracle::default())));
        let ranking = Ranking {
            hits: vec![crate::store::ScoredChunk { id: 99, score: 1.0 }],
        };
        assert!(matches!(
            generator.build_messages("q", &ranking),
            Err(RagEvalError::DataIntegrity(_))
        ));
    }
}
