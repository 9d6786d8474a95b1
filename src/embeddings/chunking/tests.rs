use super::*;

/// Whether the chunks can be laid over the text, in order, leaving only whitespace uncovered.
fn covers_without_gaps(text: &str, chunks: &[String]) -> bool {
    let mut covered_until = 0;

    for chunk in chunks {
        let placement = text
            .char_indices()
            .map(|(i, _)| i)
            .filter(|&i| text.get(i..).is_some_and(|rest| rest.starts_with(chunk.as_str())))
            .filter(|&i| {
                i <= covered_until
                    || text
                        .get(covered_until..i)
                        .is_some_and(|gap| gap.trim().is_empty())
            })
            .last();

        let Some(start) = placement else {
            return false;
        };
        covered_until = covered_until.max(start + chunk.len());
    }

    text.get(covered_until..)
        .is_some_and(|rest| rest.trim().is_empty())
}

#[test]
fn short_text_is_a_single_identical_chunk() {
    let text = "  Short text, kept exactly as given.  ";
    assert_eq!(chunk_text(text, 1000, 200), vec![text.to_string()]);
}

#[test]
fn text_exactly_one_window_long_is_not_split() {
    let text = "x".repeat(50);
    assert_eq!(chunk_text(&text, 50, 10), vec![text]);
}

#[test]
fn three_sentence_scenario() {
    let chunks = chunk_text("A cat sat. A dog ran. A bird flew.", 15, 5);
    assert_eq!(chunks, vec!["A cat sat.", "A dog ran.", "A bird flew."]);
}

#[test]
fn windows_without_terminators_overlap() {
    let text: String = ('a'..='z').collect();
    let chunks = chunk_text(&text, 10, 3);

    assert_eq!(
        chunks,
        vec!["abcdefghij", "hijklmnopq", "opqrstuvwx", "vwxyz"]
    );
    assert!(covers_without_gaps(&text, &chunks));
}

#[test]
fn long_prose_is_covered_without_gaps() {
    let text = "The relay reads bytes. Lines are reassembled before decoding. "
        .repeat(40);
    let chunks = chunk_text(&text, 200, 50);

    assert!(chunks.len() > 1);
    assert!(chunks.iter().all(|chunk| !chunk.trim().is_empty()));
    assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 200));
    assert!(covers_without_gaps(&text, &chunks));
}

#[test]
fn early_sentence_break_does_not_skip_following_text() {
    let text = "Hi. abcdefghijklmnopqrstuvwxyz";
    let chunks = chunk_text(text, 10, 2);

    assert_eq!(chunks.first().map(String::as_str), Some("Hi."));
    assert_eq!(chunks.get(1).map(String::as_str), Some("abcdefghi"));
    assert!(covers_without_gaps(text, &chunks));
}

#[test]
fn chunks_end_on_sentence_boundaries_when_possible() {
    let text = "First sentence here. Second sentence follows. ".repeat(10);
    let chunks = chunk_text(&text, 60, 10);

    let (last, rest) = chunks.split_last().expect("should produce chunks");
    assert!(rest.iter().all(|chunk| chunk.ends_with('.')));
    assert!(last.ends_with('.'));
}

#[test]
fn counts_characters_not_bytes() {
    let text = "é".repeat(30);
    let chunks = chunk_text(&text, 10, 2);

    let lengths: Vec<usize> = chunks.iter().map(|chunk| chunk.chars().count()).collect();
    assert_eq!(lengths, vec![10, 10, 10, 6]);
}

#[test]
fn overlap_not_smaller_than_window_still_progresses() {
    let text = "abcdefghijklmnop";
    let chunks = chunk_text(text, 4, 10);

    assert!(!chunks.is_empty());
    assert!(covers_without_gaps(text, &chunks));
    assert_eq!(chunks.last().map(String::as_str), Some("mnop"));
}

#[test]
fn whitespace_only_windows_are_skipped() {
    let text = format!("start.{}end.", " ".repeat(40));
    let chunks = chunk_text(&text, 10, 0);

    assert!(chunks.iter().all(|chunk| !chunk.is_empty()));
    assert_eq!(chunks.first().map(String::as_str), Some("start."));
    assert_eq!(chunks.last().map(String::as_str), Some("end."));
}

#[test]
fn config_defaults() {
    let config = ChunkingConfig::default();
    assert_eq!(config.window_size, 1000);
    assert_eq!(config.overlap, 200);
    assert_eq!(config.chunk("tiny"), vec!["tiny".to_string()]);
}
