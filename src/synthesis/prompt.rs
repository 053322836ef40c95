use crate::retrieval::RetrievedPassage;
use std::collections::HashMap;

const PASSAGE_SEPARATOR: &str = "\n\n---\n\n";

/// Label each passage so the model can cite it unambiguously
///
/// A passage is labeled by its source name. When several passages share a
/// source, each gets a `(part N)` suffix taken from its chunk position.
pub fn passage_labels(passages: &[RetrievedPassage]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for passage in passages {
        *counts.entry(passage.source.as_str()).or_default() += 1;
    }

    passages
        .iter()
        .map(|passage| {
            if counts.get(passage.source.as_str()).copied().unwrap_or(0) > 1 {
                format!("{} (part {})", passage.source, passage.chunk_ordinal + 1)
            } else {
                passage.source.clone()
            }
        })
        .collect()
}

/// Assemble the instruction prompt sent to the generative model
pub fn build_prompt(query: &str, passages: &[RetrievedPassage], labels: &[String]) -> String {
    let context = passages
        .iter()
        .zip(labels)
        .map(|(passage, label)| format!("Source [{}]:\n{}", label, passage.text))
        .collect::<Vec<_>>()
        .join(PASSAGE_SEPARATOR);

    format!(
        r#"You are a helpful legal assistant. Carefully read the following legal excerpts, each prefixed with a source identifier (like "Source [file_name]:"). Based *only* on this context, answer the user's question.

Context:
{context}

Question:
{query}

Provide your answer in the following JSON format. Include citations for *each distinct piece of information* you use from the context to form your answer. For each citation, provide the exact snippet from the context that supports that part of your answer and its corresponding source identifier from the "Source [...]" prefix of that snippet.

Ensure the citation snippets *come directly from the provided Context* and the source is extracted from the "Source [...]" prefix immediately preceding the snippet in the context.

Respond in the following JSON format only:

```json
{{
  "answer": "Your concise answer here, directly supported by the context.",
  "citations": [
    {{
      "text": "exact snippet 1 from context",
      "source": "source_identifier_from_prefix_for_snippet_1"
    }},
    {{
      "text": "exact snippet 2 from context",
      "source": "source_identifier_from_prefix_for_snippet_2"
    }}
  ]
}}
```
If the provided context does not contain sufficient information to answer the question accurately and completely based *only* on the context, respond in the JSON format stating clearly that you cannot find the information in the provided documents. In this case, the "citations" array should be empty.
"#
    )
}
