//! Document chunking for ingestion.
//!
//! Splits raw text into sentence-accumulated chunks of roughly `chunk_size`
//! characters with a small tail overlap, after stripping fenced code blocks
//! and inline metadata fragments. Chunks shorter than the minimum are dropped.

/// Minimum chunk length kept; shorter fragments carry no useful content.
const MIN_CHUNK_LEN: usize = 50;

/// Splits a document into chunks suitable for embedding.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let text = remove_code_blocks(text);
    let text = remove_metadata(&text);

    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in text.split(". ") {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }

        current.push_str(sentence);
        current.push_str(". ");

        if current.len() >= chunk_size {
            let chunk = current.trim();
            if chunk.len() > MIN_CHUNK_LEN {
                chunks.push(chunk.to_string());
            }
            // Seed the next chunk with the tail of the last sentence.
            current = tail_chars(sentence, overlap);
        }
    }

    let chunk = current.trim();
    if chunk.len() > MIN_CHUNK_LEN {
        chunks.push(chunk.to_string());
    }

    chunks
}

/// Returns the last `n` characters of a string (char-safe).
fn tail_chars(s: &str, n: usize) -> String {
    let count = s.chars().count();
    if count <= n {
        s.to_string()
    } else {
        s.chars().skip(count - n).collect()
    }
}

/// Strips leftover ingestion metadata: brace-delimited fragments that are
/// source annotations (`{.. source ..}`) or follow a `"metadata":` key.
fn remove_metadata(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = text[i..].find('}') {
                let span = &text[i..i + end + 1];
                let before = out.trim_end();
                if span.contains("source") || before.ends_with("\"metadata\":") {
                    if let Some(stripped) = out.trim_end().strip_suffix("\"metadata\":") {
                        out = stripped.to_string();
                    }
                    i += end + 1;
                    continue;
                }
            }
        }
        let ch = text[i..].chars().next().unwrap_or('\u{0}');
        out.push(ch);
        i += ch.len_utf8();
    }

    out
}

/// Strips fenced code blocks (``` ... ```) from the text.
fn remove_code_blocks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_fence = false;

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if !in_fence {
            out.push_str(line);
            out.push('\n');
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_accumulate_sentences() {
        let text = "Blood pressure is the force of blood against artery walls. \
                    A normal reading is around 120 over 80. \
                    High readings over time indicate hypertension. \
                    Lifestyle changes and medication can lower it.";
        let chunks = chunk_text(text, 120, 20);

        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.len() > MIN_CHUNK_LEN);
        }
        let joined = chunks.join(" ");
        assert!(joined.contains("120 over 80"));
    }

    #[test]
    fn test_short_fragments_dropped() {
        let chunks = chunk_text("Too short.", 300, 50);
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_code_blocks_removed() {
        let text = "Useful medical sentence that is long enough to keep around for the test. \
                    ```\nlet x = 1;\n```\n\
                    Another useful medical sentence that is also long enough to matter here.";
        let chunks = chunk_text(text, 80, 10);

        let joined = chunks.join(" ");
        assert!(!joined.contains("let x = 1"));
        assert!(joined.contains("Useful medical sentence"));
    }

    #[test]
    fn test_metadata_fragments_removed() {
        let text = "Hypertension affects a large share of adults over forty worldwide. \
                    \"metadata\": {\"page\": 3} \
                    Treatment usually combines lifestyle changes with medication. \
                    {\"source\": \"bp.md\"} Regular monitoring is recommended for patients.";
        let chunks = chunk_text(text, 80, 10);

        let joined = chunks.join(" ");
        assert!(!joined.contains("bp.md"));
        assert!(!joined.contains("metadata"));
        assert!(joined.contains("Hypertension affects"));
    }

    #[test]
    fn test_tail_chars() {
        assert_eq!(tail_chars("abcdef", 3), "def");
        assert_eq!(tail_chars("ab", 5), "ab");
    }
}
