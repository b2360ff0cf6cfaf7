//! Recursive text chunker.
//!
//! Splits a document into overlapping windows, preferring semantic
//! boundaries in this order: paragraph break → sentence boundary →
//! whitespace → hard cut. Fragment spans index the source text, so
//! concatenating windows with overlap regions removed reconstructs the
//! source exactly.

use crate::config::ChunkConfig;
use crate::models::Fragment;

/// Windows may exceed the target by at most a quarter.
fn hard_max(window: usize) -> usize {
    window + window / 4
}

/// Chunk `text` into fragments for `doc_id`.
///
/// Guarantees: ordinals form a dense 0-based sequence, no window is
/// empty after trimming, and every window is at most 1.25× the target.
pub fn chunk_text(doc_id: &str, text: &str, config: &ChunkConfig) -> Vec<Fragment> {
    let bytes = text.len();
    let mut fragments = Vec::new();
    if text.trim().is_empty() {
        return fragments;
    }

    let window = config.window.max(1);
    let overlap = config.overlap.min(window.saturating_sub(1));
    let max_len = hard_max(window);

    let mut ordinal = 0;
    let mut start = 0;

    while start < bytes {
        let end = if bytes - start <= max_len {
            bytes
        } else {
            pick_break(text, start, start + window, start + max_len)
        };

        let slice = &text[start..end];
        if !slice.trim().is_empty() {
            fragments.push(Fragment::new(doc_id, ordinal, slice.to_string(), (start, end)));
            ordinal += 1;
        }

        if end >= bytes {
            break;
        }

        // Step back for overlap, but always make forward progress.
        let mut next = end.saturating_sub(overlap);
        if next <= start {
            next = end;
        }
        start = align_to_char(text, next);
    }

    fragments
}

/// Choose a break point in (target, limit], preferring a paragraph
/// break, then a sentence end, then any whitespace. The search floor is
/// half a window back from the target so tiny fragments are not produced.
fn pick_break(text: &str, start: usize, target: usize, limit: usize) -> usize {
    let floor = align_to_char(text, start + (target - start) / 2);
    let limit = align_to_char(text, limit.min(text.len()));
    let scan = &text[floor..limit];

    if let Some(pos) = scan.rfind("\n\n") {
        return floor + pos + 2;
    }
    if let Some(pos) = rfind_sentence_end(scan) {
        return floor + pos;
    }
    if let Some((pos, ch)) = scan
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
    {
        return floor + pos + ch.len_utf8();
    }
    align_to_char(text, target)
}

/// Position just past the last ". " / ".\n" in `scan`, if any.
fn rfind_sentence_end(scan: &str) -> Option<usize> {
    let bytes = scan.as_bytes();
    for i in (1..bytes.len()).rev() {
        if bytes[i - 1] == b'.' && (bytes[i] == b' ' || bytes[i] == b'\n') {
            return Some(i + 1);
        }
    }
    None
}

/// Snap a byte offset forward to the next char boundary.
fn align_to_char(text: &str, mut pos: usize) -> usize {
    while pos < text.len() && !text.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(window: usize, overlap: usize) -> ChunkConfig {
        ChunkConfig { window, overlap }
    }

    /// Reconstruct the source from fragments by dropping each window's
    /// overlap with its successor, then compare modulo whitespace runs.
    fn reconstruct(text: &str, fragments: &[Fragment]) -> String {
        let mut out = String::new();
        for (i, frag) in fragments.iter().enumerate() {
            let end = if i + 1 < fragments.len() {
                fragments[i + 1].char_span.0
            } else {
                frag.char_span.1
            };
            out.push_str(&text[frag.char_span.0..end]);
        }
        out
    }

    fn squash_ws(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn sample_text(paragraphs: usize) -> String {
        (0..paragraphs)
            .map(|i| {
                format!(
                    "Párrafo {i}: el contratista deberá presentar la garantía de fiel \
                     cumplimiento dentro del plazo establecido. La entidad verificará \
                     los documentos habilitantes antes de la adjudicación."
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[test]
    fn empty_text_yields_no_fragments() {
        assert!(chunk_text("d", "", &config(1000, 200)).is_empty());
        assert!(chunk_text("d", "   \n\n  ", &config(1000, 200)).is_empty());
    }

    #[test]
    fn short_text_is_single_fragment() {
        let frags = chunk_text("d", "Texto corto de prueba.", &config(1000, 200));
        assert_eq!(frags.len(), 1);
        assert_eq!(frags[0].char_span, (0, 22));
    }

    #[test]
    fn ordinals_are_dense_and_zero_based() {
        let text = sample_text(40);
        let frags = chunk_text("d", &text, &config(500, 100));
        assert!(frags.len() > 1);
        for (i, frag) in frags.iter().enumerate() {
            assert_eq!(frag.ordinal, i);
        }
    }

    #[test]
    fn windows_respect_hard_limit() {
        let text = sample_text(50);
        let frags = chunk_text("d", &text, &config(1000, 200));
        for frag in &frags {
            assert!(
                frag.text.len() <= 1250,
                "window of {} bytes exceeds 1.25x target",
                frag.text.len()
            );
            assert!(!frag.text.trim().is_empty());
        }
    }

    #[test]
    fn consecutive_windows_overlap() {
        let text = sample_text(30);
        let frags = chunk_text("d", &text, &config(600, 150));
        for pair in frags.windows(2) {
            assert!(
                pair[1].char_span.0 < pair[0].char_span.1,
                "windows {} and {} do not overlap",
                pair[0].ordinal,
                pair[1].ordinal
            );
        }
    }

    #[test]
    fn reconstruction_is_exact_modulo_whitespace() {
        let text = sample_text(35);
        let frags = chunk_text("d", &text, &config(700, 180));
        let rebuilt = reconstruct(&text, &frags);
        assert_eq!(squash_ws(&rebuilt), squash_ws(&text));
    }

    #[test]
    fn reconstruction_handles_text_without_boundaries() {
        // No paragraph/sentence/space breaks at all: forces hard cuts.
        let text = "x".repeat(5_000);
        let frags = chunk_text("d", &text, &config(1000, 200));
        assert!(frags.len() > 1);
        let rebuilt = reconstruct(&text, &frags);
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn prefers_paragraph_breaks() {
        let text = sample_text(12);
        let frags = chunk_text("d", &text, &config(400, 80));
        // At least one non-final window should end right at a paragraph
        // separator (the break lands just past the blank line).
        let on_paragraph = frags
            .iter()
            .take(frags.len().saturating_sub(1))
            .any(|f| f.text.ends_with("\n\n"));
        assert!(on_paragraph);
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "garantía económica técnica ñandú ".repeat(200);
        let frags = chunk_text("d", &text, &config(300, 60));
        for frag in &frags {
            // Slicing would have panicked on a bad boundary; also verify
            // the stored text matches its span.
            assert_eq!(frag.text, &text[frag.char_span.0..frag.char_span.1]);
        }
    }
}
