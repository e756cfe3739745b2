//! Property tests for section-aware chunking.

use docqa_rag::chunking::split_sections;
use docqa_rag::{Chunker, SectionChunker};
use proptest::prelude::*;

/// Window parameters with `overlap < size`.
fn arb_window() -> impl Strategy<Value = (usize, usize)> {
    (2usize..60).prop_flat_map(|size| (Just(size), 0..size))
}

/// Rebuild a single section from its windows by dropping each later window's overlap.
fn stitch(windows: &[String], overlap: usize) -> String {
    let mut out = String::new();
    for (i, window) in windows.iter().enumerate() {
        if i == 0 {
            out.push_str(window);
        } else {
            out.extend(window.chars().skip(overlap));
        }
    }
    out
}

/// Stitching the windows of marker-free text reproduces it exactly.
mod prop_chunk_reconstruction {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn windows_stitch_back_to_the_source(
            text in "[a-zé .,\n]{1,400}",
            (size, overlap) in arb_window(),
        ) {
            prop_assume!(!text.trim().is_empty());
            let chunker = SectionChunker::new(size, overlap).unwrap();
            let windows = chunker.chunk(&text);

            prop_assert!(!windows.is_empty());
            prop_assert_eq!(stitch(&windows, overlap), text);
        }

        #[test]
        fn consecutive_windows_share_exactly_the_overlap(
            text in "[a-z ]{1,400}",
            (size, overlap) in arb_window(),
        ) {
            prop_assume!(!text.trim().is_empty());
            let chunker = SectionChunker::new(size, overlap).unwrap();
            let windows = chunker.chunk(&text);

            for window in &windows {
                prop_assert!(window.chars().count() <= size);
            }
            for pair in windows.windows(2) {
                let prev: Vec<char> = pair[0].chars().collect();
                let next: Vec<char> = pair[1].chars().collect();
                prop_assert_eq!(prev.len(), size);
                prop_assert!(next.len() > overlap);
                prop_assert_eq!(&prev[size - overlap..], &next[..overlap]);
            }
        }
    }
}

/// No window spans a section boundary.
mod prop_section_boundaries {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn windows_stay_within_one_section(
            bodies in proptest::collection::vec("[a-z .]{1,80}", 1..6),
            (size, overlap) in arb_window(),
        ) {
            let text: String = bodies
                .iter()
                .enumerate()
                .map(|(i, body)| format!("# Heading {i}\n{body}\n"))
                .collect();
            let chunker = SectionChunker::new(size, overlap).unwrap();
            let windows = chunker.chunk(&text);

            for window in &windows {
                let markers = window.matches('#').count();
                prop_assert!(markers <= 1);
                if markers == 1 {
                    prop_assert!(window.starts_with('#'));
                }
            }

            let sections = split_sections(&text);
            prop_assert_eq!(sections.len(), bodies.len());
            prop_assert_eq!(sections.concat(), text.clone());

            let per_section: usize = sections.iter().map(|s| chunker.chunk(s).len()).sum();
            prop_assert_eq!(per_section, windows.len());
        }
    }
}

proptest! {
    #[test]
    fn rechunking_identical_text_is_identical(text in "(# [a-z]{1,8}\n)?[a-z .\n]{0,300}") {
        let chunker = SectionChunker::new(40, 10).unwrap();
        prop_assert_eq!(chunker.chunk(&text), chunker.chunk(&text.clone()));
    }
}

#[test]
fn blank_documents_have_no_chunks() {
    let chunker = SectionChunker::default();
    assert!(chunker.chunk("").is_empty());
    assert!(chunker.chunk("\n\n   \t").is_empty());
}

#[test]
fn section_marker_starts_a_new_window() {
    let chunker = SectionChunker::new(400, 100).unwrap();
    let text = "Handbook overview.\nSECTION: Leave\n\
                Employees are entitled to 15 days of paid vacation per year.\n";
    let chunks = chunker.chunk(text);
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0], "Handbook overview.\n");
    assert!(chunks[1].starts_with("SECTION: Leave"));
}
