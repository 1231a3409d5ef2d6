//! Section chunking.
//!
//! A section at or under `max_tokens` becomes one chunk, however small.
//! Larger sections are split on blank lines and paragraphs are packed
//! greedily until the next one would overflow. A paragraph that alone
//! exceeds `max_tokens` stands as its own oversized chunk. A trailing chunk
//! under `min_tokens` takes paragraphs from the end of its predecessor while
//! both stay within bounds. Only the tail is rebalanced: an interior chunk
//! stays under `min_tokens` when a large neighbour leaves no room to merge,
//! so `min_tokens` is a target rather than a guarantee. Chunks never span
//! sections.

use std::sync::Arc;
use wayfinder_core::knowledge::{Chunk, Section};
use wayfinder_core::token::{CharEstimate, TokenCounter};

const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Splits sections into bounded chunks.
#[derive(Clone)]
pub struct Chunker {
    max_tokens: usize,
    min_tokens: usize,
    counter: Arc<dyn TokenCounter>,
}

impl Chunker {
    pub fn new(max_tokens: usize, min_tokens: usize) -> Self {
        Self {
            max_tokens,
            min_tokens,
            counter: Arc::new(CharEstimate),
        }
    }

    pub fn with_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn min_tokens(&self) -> usize {
        self.min_tokens
    }

    /// Split one section. Blank sections produce no chunks.
    pub fn chunk(&self, section: &Section) -> Vec<Chunk> {
        let text = section.content.trim();
        if text.is_empty() {
            return Vec::new();
        }

        if self.counter.count(text) <= self.max_tokens {
            return vec![self.make_chunk(section, 0, text.to_string())];
        }

        let mut groups: Vec<Vec<String>> = Vec::new();
        let mut current: Vec<String> = Vec::new();

        for paragraph in paragraphs(text) {
            if !current.is_empty() {
                let candidate = format!("{}{PARAGRAPH_SEPARATOR}{paragraph}", join(&current));
                if self.counter.count(&candidate) > self.max_tokens {
                    groups.push(std::mem::take(&mut current));
                }
            }
            current.push(paragraph);
        }
        if !current.is_empty() {
            groups.push(current);
        }

        self.rebalance_tail(&mut groups);

        groups
            .iter()
            .enumerate()
            .map(|(i, group)| self.make_chunk(section, i, join(group)))
            .collect()
    }

    /// Split many sections, preserving section order.
    pub fn chunk_all(&self, sections: &[Section]) -> Vec<Chunk> {
        sections.iter().flat_map(|s| self.chunk(s)).collect()
    }

    /// Shift paragraphs from the second-to-last group into an under-min tail.
    fn rebalance_tail(&self, groups: &mut [Vec<String>]) {
        let n = groups.len();
        if n < 2 {
            return;
        }
        let (head, tail) = groups.split_at_mut(n - 1);
        let (prev, last) = (&mut head[n - 2], &mut tail[0]);

        while self.counter.count(&join(last)) < self.min_tokens && prev.len() > 1 {
            let moved = &prev[prev.len() - 1];
            let new_last = format!("{moved}{PARAGRAPH_SEPARATOR}{}", join(last));
            let new_prev = join(&prev[..prev.len() - 1]);
            if self.counter.count(&new_last) > self.max_tokens
                || self.counter.count(&new_prev) < self.min_tokens
            {
                break;
            }
            if let Some(paragraph) = prev.pop() {
                last.insert(0, paragraph);
            }
        }
    }

    fn make_chunk(&self, section: &Section, index: usize, content: String) -> Chunk {
        Chunk {
            token_count: self.counter.count(&content),
            content,
            section: section.name.clone(),
            index,
        }
    }
}

fn join(paragraphs: &[String]) -> String {
    paragraphs.join(PARAGRAPH_SEPARATOR)
}

/// Paragraphs of `text`: runs of non-blank lines, joined by `\n`.
fn paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut lines: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !lines.is_empty() {
                out.push(lines.join("\n"));
                lines.clear();
            }
        } else {
            lines.push(line.trim_end());
        }
    }
    if !lines.is_empty() {
        out.push(lines.join("\n"));
    }
    out
}

/// Split a markdown document into sections on `#` headers.
///
/// Sections are named by their header path: a level-1 header stands alone,
/// deeper headers are prefixed with the enclosing level-1 header as
/// `"H1 › H2"`. Text before the first header is named `fallback_name`.
/// Sections with no body text are skipped.
pub fn sections_from_markdown(text: &str, fallback_name: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut h1: Option<String> = None;
    let mut name = fallback_name.to_string();
    let mut body: Vec<&str> = Vec::new();

    for line in text.lines() {
        match parse_header(line) {
            Some((level, title)) => {
                flush(&name, &mut body, &mut sections);
                if level == 1 {
                    h1 = Some(title.to_string());
                    name = title.to_string();
                } else {
                    name = match &h1 {
                        Some(parent) => format!("{parent} › {title}"),
                        None => title.to_string(),
                    };
                }
            }
            None => body.push(line),
        }
    }
    flush(&name, &mut body, &mut sections);

    sections
}

fn flush(name: &str, body: &mut Vec<&str>, sections: &mut Vec<Section>) {
    let content = body.join("\n").trim().to_string();
    if !content.is_empty() {
        sections.push(Section::new(name, content));
    }
    body.clear();
}

/// `(level, title)` for an ATX header line such as `## Experience`.
fn parse_header(line: &str) -> Option<(usize, &str)> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &line[level..];
    if !rest.starts_with([' ', '\t']) {
        return None;
    }
    let title = rest.trim();
    (!title.is_empty()).then_some((level, title))
}
