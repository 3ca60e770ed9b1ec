use crate::blocks::{Block, BlockType};
use std::collections::HashMap;

pub const DEFAULT_LINE_THRESHOLD: f64 = 0.01;
pub const PAGE_BREAK: &str = "\n--- Page Break ---\n\n";

/// Absorbs f64 subtraction error so a gap of exactly the threshold merges anywhere on the page.
const BOUNDARY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructedText {
    pub text: String,
    pub page_count: usize,
}

/// Turns an unordered bag of OCR blocks into text in reading order.
pub struct TextReconstructor {
    line_threshold: f64,
}

impl Default for TextReconstructor {
    fn default() -> Self {
        Self::new(DEFAULT_LINE_THRESHOLD)
    }
}

impl TextReconstructor {
    pub fn new(line_threshold: f64) -> Self {
        Self { line_threshold }
    }

    pub fn reconstruct(&self, blocks: &[Block]) -> ReconstructedText {
        let block_map: HashMap<&str, &Block> =
            blocks.iter().map(|b| (b.id.as_str(), b)).collect();

        let pages: Vec<&Block> = blocks
            .iter()
            .filter(|b| b.block_type == BlockType::Page)
            .collect();

        let mut page_texts = Vec::with_capacity(pages.len());
        for page in &pages {
            // Unresolvable child ids are dropped silently.
            let children: Vec<&Block> = page
                .child_ids()
                .filter_map(|id| block_map.get(id).copied())
                .collect();

            let page_text = self.layout_page(children);
            if !page_text.is_empty() {
                page_texts.push(page_text);
            }
        }

        let output = if pages.len() > 1 {
            page_texts.join(PAGE_BREAK)
        } else {
            page_texts.concat()
        };

        log::debug!(
            "Reconstructed {} pages into {} bytes of text",
            pages.len(),
            output.trim().len()
        );

        ReconstructedText {
            text: output.trim().to_string(),
            page_count: pages.len(),
        }
    }

    fn layout_page(&self, mut children: Vec<&Block>) -> String {
        children.sort_by(|a, b| a.top().total_cmp(&b.top()));

        let mut output = String::new();
        let mut current_line: Vec<&Block> = Vec::new();
        let mut current_top = 0.0;

        for block in children {
            let block_top = block.top();

            if current_line.is_empty() || self.same_line(block_top, current_top) {
                current_line.push(block);
            } else {
                flush_line(&mut current_line, &mut output);
                current_line.push(block);
            }
            // The anchor follows the last block added, so a line may drift.
            current_top = block_top;
        }

        if !current_line.is_empty() {
            flush_line(&mut current_line, &mut output);
        }

        output
    }

    fn same_line(&self, top: f64, anchor: f64) -> bool {
        (top - anchor).abs() <= self.line_threshold + BOUNDARY_EPSILON
    }
}

fn flush_line(line: &mut Vec<&Block>, output: &mut String) {
    line.sort_by(|a, b| a.left().total_cmp(&b.left()));

    let words: Vec<&str> = line
        .iter()
        .filter_map(|b| b.text.as_deref())
        .filter(|text| !text.is_empty())
        .collect();

    output.push_str(&words.join(" "));
    output.push('\n');
    line.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{BoundingBox, Geometry, Relationship, RelationshipType};

    fn page(id: &str, children: &[&str]) -> Block {
        Block {
            id: id.to_string(),
            block_type: BlockType::Page,
            text: None,
            confidence: None,
            page: None,
            geometry: None,
            relationships: vec![Relationship {
                kind: RelationshipType::Child,
                ids: children.iter().map(|c| c.to_string()).collect(),
            }],
        }
    }

    fn line(id: &str, top: f64, left: f64, text: &str) -> Block {
        Block {
            id: id.to_string(),
            block_type: BlockType::Line,
            text: Some(text.to_string()),
            confidence: None,
            page: None,
            geometry: Some(Geometry {
                bounding_box: Some(BoundingBox {
                    top,
                    left,
                    width: 0.1,
                    height: 0.01,
                }),
            }),
            relationships: Vec::new(),
        }
    }

    fn reconstruct(blocks: &[Block]) -> String {
        TextReconstructor::default().reconstruct(blocks).text
    }

    #[test]
    fn merges_close_blocks_left_to_right() {
        let blocks = vec![
            page("p", &["l1", "l2"]),
            line("l1", 0.10, 0.05, "Item"),
            line("l2", 0.101, 0.30, "Price"),
        ];
        assert_eq!(reconstruct(&blocks), "Item Price");
    }

    #[test]
    fn one_line_per_top_cluster_in_ascending_order() {
        let blocks = vec![
            page("p", &["c", "a", "b"]),
            line("a", 0.50, 0.1, "third"),
            line("b", 0.10, 0.1, "first"),
            line("c", 0.30, 0.1, "second"),
        ];
        assert_eq!(reconstruct(&blocks), "first\nsecond\nthird");
    }

    #[test]
    fn orders_words_by_left_regardless_of_input_order() {
        let blocks = vec![
            page("p", &["w3", "w1", "w2"]),
            line("w3", 0.2, 0.70, "gamma"),
            line("w1", 0.2, 0.10, "alpha"),
            line("w2", 0.2, 0.40, "beta"),
        ];
        assert_eq!(reconstruct(&blocks), "alpha beta gamma");
    }

    #[test]
    fn threshold_is_inclusive() {
        let blocks = vec![
            page("p", &["a", "b"]),
            line("a", 0.0, 0.5, "right"),
            line("b", 0.01, 0.1, "left"),
        ];
        assert_eq!(reconstruct(&blocks), "left right");
    }

    #[test]
    fn just_past_threshold_splits() {
        let blocks = vec![
            page("p", &["a", "b"]),
            line("a", 0.0, 0.5, "upper"),
            line("b", 0.0101, 0.1, "lower"),
        ];
        assert_eq!(reconstruct(&blocks), "upper\nlower");
    }

    #[test]
    fn threshold_gap_merges_at_any_height() {
        for (upper, lower) in [(0.30, 0.31), (0.50, 0.51), (0.70, 0.71), (0.93, 0.94)] {
            let blocks = vec![
                page("p", &["a", "b"]),
                line("a", upper, 0.5, "right"),
                line("b", lower, 0.1, "left"),
            ];
            assert_eq!(reconstruct(&blocks), "left right", "tops {upper}/{lower}");
        }
    }

    #[test]
    fn gap_just_past_threshold_splits_at_any_height() {
        for (upper, lower) in [(0.30, 0.3101), (0.50, 0.5101), (0.70, 0.7101)] {
            let blocks = vec![
                page("p", &["a", "b"]),
                line("a", upper, 0.5, "upper"),
                line("b", lower, 0.1, "lower"),
            ];
            assert_eq!(reconstruct(&blocks), "upper\nlower", "tops {upper}/{lower}");
        }
    }

    #[test]
    fn anchor_drifts_with_last_block() {
        // Each step is within the threshold, the total spread is not.
        let blocks = vec![
            page("p", &["a", "b", "c"]),
            line("a", 0.100, 0.3, "c3"),
            line("b", 0.108, 0.2, "c2"),
            line("c", 0.116, 0.1, "c1"),
        ];
        assert_eq!(reconstruct(&blocks), "c1 c2 c3");
    }

    #[test]
    fn two_pages_get_single_marker() {
        let blocks = vec![
            page("p1", &["a"]),
            page("p2", &["b"]),
            line("a", 0.1, 0.1, "first page"),
            line("b", 0.1, 0.1, "second page"),
        ];
        let result = TextReconstructor::default().reconstruct(&blocks);
        assert_eq!(
            result.text,
            "first page\n\n--- Page Break ---\n\nsecond page"
        );
        assert_eq!(result.page_count, 2);
    }

    #[test]
    fn n_pages_get_n_minus_one_markers() {
        let mut blocks = Vec::new();
        for i in 0..4 {
            blocks.push(page(&format!("p{i}"), &[&format!("l{i}")]));
            blocks.push(line(&format!("l{i}"), 0.1, 0.1, &format!("page {i}")));
        }
        let text = reconstruct(&blocks);
        assert_eq!(text.matches("--- Page Break ---").count(), 3);
        assert!(text.starts_with("page 0"));
        assert!(text.ends_with("page 3"));
    }

    #[test]
    fn missing_geometry_sorts_first() {
        let mut untitled = line("n", 0.0, 0.0, "origin");
        untitled.geometry = None;
        let blocks = vec![
            page("p", &["a", "n"]),
            line("a", 0.5, 0.5, "later"),
            untitled,
        ];
        assert_eq!(reconstruct(&blocks), "origin\nlater");
    }

    #[test]
    fn missing_geometry_sorts_first_within_line() {
        let mut untitled = line("n", 0.0, 0.0, "origin");
        untitled.geometry = None;
        let blocks = vec![
            page("p", &["b", "n", "a"]),
            line("a", 0.004, 0.6, "far"),
            line("b", 0.008, 0.2, "near"),
            untitled,
        ];
        assert_eq!(reconstruct(&blocks), "origin near far");
    }

    #[test]
    fn textless_blocks_still_group() {
        let mut blank = line("b", 0.108, 0.5, "");
        blank.text = None;
        let blocks = vec![
            page("p", &["a", "b", "c"]),
            line("a", 0.100, 0.1, "one"),
            blank,
            line("c", 0.116, 0.9, "two"),
        ];
        // Without the blank block bridging the gap, "two" would start a new line.
        assert_eq!(reconstruct(&blocks), "one two");
    }

    #[test]
    fn unresolved_children_and_empty_pages_are_ignored() {
        let mut bare = page("p0", &[]);
        bare.relationships.clear();
        let blocks = vec![
            bare,
            page("p1", &["missing", "a"]),
            line("a", 0.2, 0.2, "kept"),
        ];
        let result = TextReconstructor::default().reconstruct(&blocks);
        assert_eq!(result.text, "kept");
        assert_eq!(result.page_count, 2);
    }
}
