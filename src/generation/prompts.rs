//! Prompt contracts for answering and summarizing.

use super::GenerationRequest;

const ANSWER_SYSTEM: &str =
    "You are a helpful assistant that provides accurate information based on the context.";

const SUMMARY_SYSTEM: &str = "You are an expert summarizer. Create a concise summary that captures the key information in the document. Focus on the main topics, key findings, and important details.";

/// Build the request answering `question` from `context` only.
pub fn answer_request(context: &[String], question: &str) -> GenerationRequest {
    let context_str = context
        .iter()
        .map(|passage| passage.trim())
        .filter(|passage| !passage.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    GenerationRequest {
        system: ANSWER_SYSTEM.to_string(),
        prompt: format!(
            "Context information is below.\n\
             ---------------------\n\
             {context_str}\n\
             ---------------------\n\
             Given the context information and not prior knowledge, answer the question: {question}"
        ),
        temperature: 0.1,
        max_tokens: None,
    }
}

/// Build the request summarizing `text` in `max_sentences` sentences or fewer.
pub fn summary_request(text: &str, max_sentences: usize) -> GenerationRequest {
    let lower = max_sentences.saturating_sub(1).max(1);
    GenerationRequest {
        system: SUMMARY_SYSTEM.to_string(),
        prompt: format!(
            "Please summarize the following document in {lower}-{max_sentences} sentences:\n\n{text}"
        ),
        temperature: 0.3,
        max_tokens: Some(250),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_prompt_forbids_outside_knowledge() {
        let request = answer_request(&["Alpha.".into(), "  ".into(), "Beta.".into()], "Why?");
        assert!(request.prompt.contains("Alpha.\n\nBeta."));
        assert!(request.prompt.contains("not prior knowledge"));
        assert!(request.prompt.ends_with("answer the question: Why?"));
    }

    #[test]
    fn summary_prompt_requests_four_to_five_sentences() {
        let request = summary_request("Body", 5);
        assert!(request.prompt.starts_with("Please summarize the following document in 4-5 sentences"));
        assert_eq!(request.max_tokens, Some(250));
    }
}
