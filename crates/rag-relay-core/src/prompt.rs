//! Prompt text for grounded answer synthesis.

/// Builds the system and user prompts sent to the chat model.
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn system_prompt() -> String {
        "You are a helpful assistant that answers questions based on provided documents.

IMPORTANT:
1. Answer based ONLY on the provided context
2. If information is not in context, say \"I don't have that information\"
3. Be concise and accurate
4. Cite sources when appropriate"
            .to_string()
    }

    pub fn user_prompt(query: &str, context: &str) -> String {
        format!(
            "Based on the following context, answer the question.

CONTEXT:
{context}

QUESTION:
{query}

Provide a direct answer with citations to the source documents."
        )
    }
}
