//! Grounded prompt assembly.
//!
//! The generator receives a fixed instruction block and a context block
//! enumerating the ranked chunks as `[Source N: <document name>]`, best first.

use serde::{Deserialize, Serialize};

use crate::document::ScoredChunk;

/// The answer returned whenever the retrieved context cannot support one.
///
/// Callers detect "no answer" by exact comparison with this string.
pub const FALLBACK_ANSWER: &str =
    "I don't have enough information in the uploaded documents to answer this question.";

/// Fixed grounding policy sent as the system message.
pub const INSTRUCTIONS: &str = r#"You answer questions about a private document collection using ONLY the context provided below.

Rules:
1. Use only the supplied context. Do not draw on outside knowledge.
2. When several sources are present and the question asks for a comparison, address every source individually before drawing a conclusion.
3. Never conclude that information is missing until you have checked each source for it.
4. If the context as a whole does not contain enough information, the answer must be exactly: "I don't have enough information in the uploaded documents to answer this question."
5. Reply with a single JSON object and nothing else, shaped as:
   {"answer": string, "sources": [{"documentName": string, "snippet": string}]}
   No other fields, no markdown, no code fences. Each snippet must be copied verbatim from the context."#;

/// Instruction and context blocks for one question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptPayload {
    /// The fixed grounding policy.
    pub instructions: String,
    /// Enumerated source passages.
    pub context: String,
    /// The user's question.
    pub question: String,
}

impl PromptPayload {
    /// Render the user message: context, then the question.
    pub fn user_message(&self) -> String {
        format!(
            "Context from documents:\n\n{}\n\n---\n\nQuestion: {}\n\nReturn JSON only.",
            self.context, self.question
        )
    }
}

/// Build the payload for `question` over `scored_chunks`, preserving their order.
///
/// The caller must not send a payload built from zero chunks; an empty
/// ranking short-circuits to [`FALLBACK_ANSWER`] instead.
pub fn assemble(question: &str, scored_chunks: &[ScoredChunk]) -> PromptPayload {
    let context = scored_chunks
        .iter()
        .enumerate()
        .map(|(i, scored)| {
            format!("[Source {}: {}]\n{}", i + 1, scored.chunk.document_name, scored.chunk.text)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    PromptPayload {
        instructions: INSTRUCTIONS.to_string(),
        context,
        question: question.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Chunk;

    fn scored(name: &str, text: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id: format!("{name}_0"),
                document_id: name.to_string(),
                document_name: name.to_string(),
                index: 0,
                text: text.to_string(),
                embedding: vec![1.0],
            },
            score,
            highlight: None,
        }
    }

    #[test]
    fn context_labels_sources_in_rank_order() {
        let payload = assemble(
            "  Compare refunds  ",
            &[scored("a.txt", "Refunds in 30 days.", 0.9), scored("b.txt", "No refunds.", 0.8)],
        );
        assert_eq!(
            payload.context,
            "[Source 1: a.txt]\nRefunds in 30 days.\n\n[Source 2: b.txt]\nNo refunds."
        );
        assert_eq!(payload.question, "Compare refunds");
        assert!(payload.user_message().ends_with("Question: Compare refunds\n\nReturn JSON only."));
    }

    #[test]
    fn instructions_embed_the_fallback_sentence() {
        assert!(INSTRUCTIONS.contains(FALLBACK_ANSWER));
        assert_eq!(assemble("q", &[]).instructions, INSTRUCTIONS);
    }
}
