//! Prompt templates for answer generation and OCR.
//!
//! Placeholders use `{name}` and are filled with [`fill`].

/// Collection of prompts used by the RAG pipeline and the OCR reader.
pub struct Prompts;

impl Prompts {
    /// Answer a question from retrieved context and prior conversation.
    ///
    /// Placeholders: `{context}`, `{chat_history}`, `{question}`.
    pub fn rag_answer() -> &'static str {
        r#"To generate your answer:
 - Carefully analyze the question and identify the key information needed to address it
 - Locate the specific parts of each context that contain this key information
 - Concisely summarize the relevant information from the  context(s) in your own words
 - Provide a direct answer to the question
 - Give detailed and accurate responses for things like 'write a blog' or long-form questions.
 - For greeting messages, please greet the user appropriately.
 - Please refrain from inventing responses.
 - If the `Question` is not related to the provided `Context` and `Chat History`  then kindly RESPOND with 'I'm sorry, but that topic is beyond what I currently know.'.
Use the following context to answer the question:
 ------

Context:
{context}

Chat History:
{chat_history}

Question: {question}
Answer:"#
    }

    /// Rewrite a follow-up question so it can be used for retrieval on its own.
    ///
    /// Placeholders: `{chat_history}`, `{question}`.
    pub fn condense_question() -> &'static str {
        r#"Given the following conversation and a follow up question, rephrase the follow up question to be a standalone question, in its original language.

Chat History:
{chat_history}
Follow Up Input: {question}
Standalone question:"#
    }

    /// Instruction sent with every page image to the OCR vision model.
    pub fn ocr_extract() -> &'static str {
        "Please extract all text from this image. Return only the extracted text without any additional formatting or explanation."
    }
}

/// Replace each `{key}` in `template` with its value, in a single pass so
/// substituted text is never re-scanned.
pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let matched = values.iter().find(|(key, _)| {
            tail.len() > key.len() + 1
                && tail[1..].starts_with(key)
                && tail[1 + key.len()..].starts_with('}')
        });
        match matched {
            Some((key, value)) => {
                out.push_str(value);
                rest = &tail[key.len() + 2..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rag_prompt_has_placeholders() {
        let prompt = Prompts::rag_answer();
        assert!(prompt.contains("{context}"));
        assert!(prompt.contains("{chat_history}"));
        assert!(prompt.contains("{question}"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn test_fill_replaces_every_key() {
        let filled = fill(
            Prompts::condense_question(),
            &[("chat_history", "Human: hi"), ("question", "What next?")],
        );
        assert!(filled.contains("Human: hi"));
        assert!(filled.contains("Follow Up Input: What next?"));
        assert!(!filled.contains('{'));
    }

    #[test]
    fn test_fill_does_not_rescan_values() {
        let filled = fill("{a} and {b}", &[("a", "{b}"), ("b", "x")]);
        assert_eq!(filled, "{b} and x");
    }
}
