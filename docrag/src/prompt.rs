//! Grounded prompt assembly.

use crate::document::ScoredChunk;

const CHUNK_SEPARATOR: &str = "\n\n";

/// Build the prompt sent to the LLM for `query` over `chunks`.
///
/// Chunks are included in the given (ranked) order and joined by a blank
/// line. A chunk that would push the context past `max_context_chars` is
/// left out along with everything after it, except that the top chunk is
/// always included, truncated if necessary.
///
/// Returns the prompt and how many leading `chunks` made it into it.
pub fn build_prompt(
    query: &str,
    chunks: &[ScoredChunk],
    max_context_chars: usize,
) -> (String, usize) {
    let (context, included) = assemble_context(chunks, max_context_chars);
    let prompt = format!(
        "You are a helpful assistant. Use the following context to answer the question \
         accurately and concisely.\n\n\
         Context:\n{context}\n\n\
         Question: {query}\n\n\
         Answer: Provide a clear, informative answer based on the context above. \
         If the context doesn't contain enough information, say so."
    );
    (prompt, included)
}

/// Concatenate chunk texts within a character budget.
///
/// Returns the context and the number of leading chunks it contains.
pub fn assemble_context(chunks: &[ScoredChunk], max_context_chars: usize) -> (String, usize) {
    let mut context = String::new();
    let mut used = 0;
    let mut included = 0;

    for (i, chunk) in chunks.iter().enumerate() {
        let text = chunk.record.text.as_str();
        let len = text.chars().count();
        let separator = if i == 0 { 0 } else { CHUNK_SEPARATOR.len() };

        if used + separator + len <= max_context_chars {
            if i > 0 {
                context.push_str(CHUNK_SEPARATOR);
            }
            context.push_str(text);
            used += separator + len;
            included += 1;
        } else {
            if i == 0 && max_context_chars > 0 {
                context.extend(text.chars().take(max_context_chars));
                included = 1;
            }
            break;
        }
    }
    (context, included)
}
