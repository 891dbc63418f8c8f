use crate::models::RetrievedRecord;
use regex::Regex;
use std::sync::OnceLock;

const UNKNOWN_SOURCE: &str = "unknown";
const UNKNOWN_PAGE: &str = "?";

/// Renders retrieved records as numbered blocks, numbered in the given order.
pub fn format_citations(results: &[RetrievedRecord]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(position, hit)| {
            let source = hit
                .record
                .source_path
                .as_deref()
                .unwrap_or(UNKNOWN_SOURCE);
            let page = hit
                .record
                .page_number
                .map(|page| page.to_string())
                .unwrap_or_else(|| UNKNOWN_PAGE.to_string());
            format!(
                "[{}] (Source: {source}, p.{page})\n{}",
                position + 1,
                hit.record.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn citation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[(\d+(?:\s*,\s*\d+)*)\]").expect("static citation regex"))
}

/// Bracketed citation numbers used in `answer`, deduplicated, in first-use
/// order. Handles `[2]` and `[1, 3]`.
pub fn cited_numbers(answer: &str) -> Vec<usize> {
    let mut numbers = Vec::new();
    for capture in citation_pattern().captures_iter(answer) {
        let Some(group) = capture.get(1) else {
            continue;
        };
        for number in group.as_str().split(',').filter_map(|n| n.trim().parse::<usize>().ok()) {
            if number > 0 && !numbers.contains(&number) {
                numbers.push(number);
            }
        }
    }
    numbers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IndexedRecord;

    fn hit(rank: usize, text: &str, source: Option<&str>, page: Option<u32>) -> RetrievedRecord {
        RetrievedRecord {
            rank,
            score: 1.0,
            record: IndexedRecord {
                vector: Vec::new(),
                text: text.to_string(),
                source_path: source.map(String::from),
                page_number: page,
                chunk_index: None,
            },
        }
    }

    #[test]
    fn two_records_render_exactly() {
        let results = vec![
            hit(1, "Alpha", Some("a.pdf"), Some(3)),
            hit(2, "Beta", Some("b.pdf"), Some(5)),
        ];

        assert_eq!(
            format_citations(&results),
            "[1] (Source: a.pdf, p.3)\nAlpha\n\n[2] (Source: b.pdf, p.5)\nBeta"
        );
    }

    #[test]
    fn missing_metadata_uses_placeholders() {
        let results = vec![hit(1, "Gamma", None, None)];
        assert_eq!(format_citations(&results), "[1] (Source: unknown, p.?)\nGamma");
    }

    #[test]
    fn empty_input_is_empty_string() {
        assert_eq!(format_citations(&[]), "");
    }

    #[test]
    fn citation_numbers_are_extracted_in_order() {
        let answer = "Pumps fail under load [2]. Valves help [1, 3] and again [2]. See [x] and [0].";
        assert_eq!(cited_numbers(answer), vec![2, 1, 3]);
        assert!(cited_numbers("I don't know.").is_empty());
    }
}
