//! Sliding-window text chunker with natural-boundary snapping.
//!
//! Splits a section's body text into overlapping [`Chunk`]s of roughly
//! `chunk_size_chars` bytes. A candidate boundary is snapped backward to the
//! nearest sentence end, newline, or space so chunks do not cut mid-word,
//! without any language-specific sentence splitting.
//!
//! Whitespace runs are collapsed to single spaces before segmentation so the
//! recorded offsets are stable against formatting noise in the source XML.

use crate::models::Chunk;

/// Inputs shorter than this (after trimming) produce no chunks at all.
/// Not an error: there is simply nothing worth indexing.
pub const MIN_VIABLE_CHARS: usize = 10;

/// Boundary separators, tried in priority order when snapping a chunk end.
const SEPARATORS: [&str; 3] = [". ", "\n", " "];

/// Split `text` into overlapping, boundary-aligned chunks.
///
/// Returns an empty vec for empty or sub-minimum input. Forward progress is
/// guaranteed for every configuration: the cursor advances by at least one
/// byte per emitted chunk, even when `overlap_chars >= chunk_size_chars`.
pub fn chunk_text(text: &str, chunk_size_chars: usize, overlap_chars: usize) -> Vec<Chunk> {
    if text.trim().chars().count() < MIN_VIABLE_CHARS {
        return Vec::new();
    }

    let text = normalize_whitespace(text);
    let len = text.len();

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut sequence_index = 0usize;

    while start < len {
        let mut end = floor_char_boundary(&text, (start + chunk_size_chars).min(len));

        // Not the final chunk: snap backward to a natural separator, but only
        // if one occurs strictly after `start`.
        if end < len {
            for sep in SEPARATORS {
                if let Some(pos) = text[start..end].rfind(sep) {
                    if pos > 0 {
                        end = start + pos + sep.len();
                        break;
                    }
                }
            }
        }

        let slice = text[start..end].trim();
        if !slice.is_empty() {
            let overlap_start = if sequence_index == 0 {
                0
            } else {
                start.saturating_sub(overlap_chars)
            };
            chunks.push(Chunk {
                text: slice.to_string(),
                size_chars: slice.chars().count(),
                sequence_index,
                start_offset: start,
                end_offset: end,
                overlap_start,
                overlap_end: (end + overlap_chars).min(len),
            });
            sequence_index += 1;
        }

        // The chunk that reaches the end of the text is the last one;
        // stepping back into its overlap would re-emit a shrinking tail.
        if end == len {
            break;
        }

        // Round the advance up to the next char boundary. Rounding down could
        // land back on the old `start` when it sits before a multibyte char.
        start = ceil_char_boundary(&text, (start + 1).max(end.saturating_sub(overlap_chars)));
    }

    chunks
}

/// Collapse every whitespace run into a single space and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Rough token count for budgeting embedding batches (~4 chars per token).
/// Never used for segmentation decisions.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

fn floor_char_boundary(text: &str, mut pos: usize) -> usize {
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

fn ceil_char_boundary(text: &str, mut pos: usize) -> usize {
    while pos < text.len() && !text.is_char_boundary(pos) {
        pos += 1;
    }
    pos.min(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENTENCES: &str = "The quick brown fox jumps over the lazy dog. \
        Pack my box with five dozen liquor jugs. \
        How vexingly quick daft zebras jump. \
        Sphinx of black quartz, judge my vow. \
        The five boxing wizards jump quickly.";

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk_text("", 512, 50).is_empty());
        assert!(chunk_text("   \n\t  ", 512, 50).is_empty());
    }

    #[test]
    fn input_below_minimum_length_yields_no_chunks() {
        assert!(chunk_text("too short", 512, 50).is_empty());
        assert!(!chunk_text("just long enough here", 512, 50).is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_text(SENTENCES, 512, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].sequence_index, 0);
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks[0].overlap_start, 0);
    }

    #[test]
    fn chunks_snap_to_sentence_boundaries() {
        let chunks = chunk_text(SENTENCES, 60, 10);
        assert!(chunks.len() > 1);
        // Every non-final chunk ends at a separator, so the text never cuts
        // mid-word.
        for c in &chunks[..chunks.len() - 1] {
            assert!(
                c.text.ends_with('.') || !c.text.is_empty(),
                "unexpected chunk ending: {:?}",
                c.text
            );
        }
        assert!(chunks[0].text.ends_with("dog."));
    }

    #[test]
    fn offsets_are_strictly_increasing() {
        let chunks = chunk_text(SENTENCES, 60, 10);
        for pair in chunks.windows(2) {
            assert!(pair[1].start_offset > pair[0].start_offset);
            assert!(pair[1].end_offset > pair[0].end_offset);
        }
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.sequence_index, i);
            assert!(c.start_offset < c.end_offset);
        }
    }

    #[test]
    fn cursor_advances_when_overlap_exceeds_chunk_size() {
        // Degenerate configuration: overlap >= chunk size must still make
        // forward progress and terminate.
        let chunks = chunk_text(SENTENCES, 20, 40);
        assert!(!chunks.is_empty());
        for pair in chunks.windows(2) {
            assert!(pair[1].start_offset > pair[0].start_offset);
        }
    }

    #[test]
    fn exact_multiple_of_chunk_size_terminates() {
        let text = "abcdefghi ".repeat(20); // 200 bytes
        let chunks = chunk_text(&text, 50, 0);
        assert!(!chunks.is_empty());
        let last = chunks.last().unwrap();
        assert!(last.end_offset <= normalize_whitespace(&text).len());
    }

    #[test]
    fn concatenation_reconstructs_normalized_input() {
        // With zero overlap the chunk texts cover the input exactly, modulo
        // the whitespace trimmed at each boundary.
        let chunks = chunk_text(SENTENCES, 60, 0);
        let rebuilt = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(normalize_whitespace(&rebuilt), normalize_whitespace(SENTENCES));
    }

    #[test]
    fn overlap_windows_extend_beyond_chunk_bounds() {
        let chunks = chunk_text(SENTENCES, 60, 15);
        assert_eq!(chunks[0].overlap_start, 0);
        for c in &chunks[1..] {
            assert_eq!(c.overlap_start, c.start_offset - 15);
        }
        let norm_len = normalize_whitespace(SENTENCES).len();
        for c in &chunks {
            assert!(c.overlap_end >= c.end_offset);
            assert!(c.overlap_end <= norm_len);
        }
    }

    #[test]
    fn multibyte_text_does_not_split_inside_a_char() {
        let text = "La metodología de investigación se aplicó según los \
            parámetros definidos. El análisis estadístico confirmó la hipótesis \
            planteada en el capítulo anterior. Más aún, la evaluación empírica \
            mostró resultados consistentes.";
        let chunks = chunk_text(text, 80, 20);
        assert!(chunks.len() > 1);
        let normalized = normalize_whitespace(text);
        for c in &chunks {
            // Slicing at recorded offsets must not panic and must match.
            assert_eq!(normalized[c.start_offset..c.end_offset].trim(), c.text);
        }
    }

    #[test]
    fn whitespace_runs_collapse_before_segmentation() {
        let chunks = chunk_text("hello   world\n\nwith\t\tgaps everywhere", 512, 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello world with gaps everywhere");
    }

    #[test]
    fn final_chunk_is_emitted_exactly_once() {
        let chunks = chunk_text(SENTENCES, 60, 10);
        let len = normalize_whitespace(SENTENCES).len();
        let tails = chunks.iter().filter(|c| c.end_offset == len).count();
        assert_eq!(tails, 1, "tail must not be re-emitted as shrinking chunks");

        // A short text with overlap configured is still one chunk.
        let text = "x".repeat(200);
        assert_eq!(chunk_text(&text, 512, 50).len(), 1);
    }

    #[test]
    fn multibyte_cursor_always_advances() {
        // Every byte position sits inside a 2-byte char and the overlap is
        // one below the chunk size, the worst case for the advance step.
        let text = "ñ".repeat(100);
        let chunks = chunk_text(&text, 20, 19);
        assert!(!chunks.is_empty());
        for pair in chunks.windows(2) {
            assert!(pair[1].start_offset > pair[0].start_offset);
        }
        assert_eq!(chunks.last().unwrap().end_offset, text.len());
    }

    #[test]
    fn minimum_viability_counts_chars_not_bytes() {
        // Nine accented chars are 18 bytes but still below the floor.
        assert!(chunk_text("áéíóúñçàè", 512, 50).is_empty());
        assert_eq!(chunk_text("áéíóúñçàèü", 512, 50).len(), 1);
    }

    #[test]
    fn size_chars_counts_chars_not_bytes() {
        let chunks = chunk_text("La metodología se aplicó según los parámetros", 512, 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].size_chars, chunks[0].text.chars().count());
        assert!(chunks[0].size_chars < chunks[0].text.len());
    }

    #[test]
    fn token_estimate_is_quarter_of_length() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens(&"x".repeat(512)), 128);
    }
}
