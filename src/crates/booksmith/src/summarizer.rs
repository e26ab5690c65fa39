//! Rolling context digest of completed chapters
//!
//! A chapter is written against a digest of the chapters before it: short excerpts of
//! the most recent ones and a one-line synopsis of each earlier one. The digest is
//! bounded no matter how many chapters have been written.

use crate::model::ChapterRecord;
use serde::{Deserialize, Serialize};

/// Longest chapter title carried into a digest
const MAX_TITLE_CHARS: usize = 120;

/// Longest opening sentence carried into a synopsis line
const MAX_OPENING_CHARS: usize = 240;

/// Closing passage of a recent chapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterExcerpt {
    pub number: u32,
    pub title: String,
    pub excerpt: String,
}

/// Bounded summary handed to chapter generation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextDigest {
    /// Chapters taken into account, ascending
    pub covered: Vec<u32>,

    /// One line per earlier chapter, oldest lines dropped first
    pub synopsis: Vec<String>,

    /// Excerpts of the most recent chapters, ascending
    pub recent: Vec<ChapterExcerpt>,
}

impl ContextDigest {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.synopsis.is_empty() && self.recent.is_empty()
    }

    /// Text form used inside prompts
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.synopsis.is_empty() {
            out.push_str("Earlier chapters:\n");
            for line in &self.synopsis {
                out.push_str(line);
                out.push('\n');
            }
        }
        for excerpt in &self.recent {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!(
                "End of chapter {} ({}):\n{}\n",
                excerpt.number, excerpt.title, excerpt.excerpt
            ));
        }
        out
    }
}

/// Derives a [`ContextDigest`] from completed chapters
///
/// Implementations must be deterministic: the same chapters give the same digest.
pub trait ContextSummarizer: Send + Sync {
    /// `completed` holds chapters with text, in ascending order
    fn digest(&self, completed: &[&ChapterRecord]) -> ContextDigest;
}

/// Summarizer that quotes the chapters themselves instead of calling the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractiveSummarizer {
    /// Chapters quoted as excerpts
    pub recent_chapters: usize,

    /// Excerpt length limit, in characters
    pub excerpt_chars: usize,

    /// Synopsis length limit, in characters
    pub synopsis_chars: usize,
}

impl Default for ExtractiveSummarizer {
    fn default() -> Self {
        Self {
            recent_chapters: 2,
            excerpt_chars: 1200,
            synopsis_chars: 1500,
        }
    }
}

impl ExtractiveSummarizer {
    pub fn new(recent_chapters: usize, excerpt_chars: usize, synopsis_chars: usize) -> Self {
        Self {
            recent_chapters,
            excerpt_chars,
            synopsis_chars,
        }
    }

    fn synopsis_line(chapter: &ChapterRecord) -> String {
        let opening = chapter
            .best_text()
            .map(opening_sentence)
            .unwrap_or_default();
        format!(
            "Chapter {} ({}): {}",
            chapter.number,
            truncate_chars(&chapter.title, MAX_TITLE_CHARS),
            opening
        )
    }
}

impl ContextSummarizer for ExtractiveSummarizer {
    fn digest(&self, completed: &[&ChapterRecord]) -> ContextDigest {
        let mut chapters: Vec<&ChapterRecord> = completed
            .iter()
            .copied()
            .filter(|c| c.best_text().is_some())
            .collect();
        chapters.sort_by_key(|c| c.number);

        let split = chapters.len().saturating_sub(self.recent_chapters);
        let (earlier, recent) = chapters.split_at(split);

        let recent = recent
            .iter()
            .map(|c| ChapterExcerpt {
                number: c.number,
                title: truncate_chars(&c.title, MAX_TITLE_CHARS),
                excerpt: tail_chars(c.best_text().unwrap_or_default(), self.excerpt_chars),
            })
            .collect();

        // Walk newest to oldest so the oldest lines are the ones left out.
        let mut synopsis = Vec::new();
        let mut used = 0;
        for chapter in earlier.iter().rev() {
            let line = truncate_chars(&Self::synopsis_line(chapter), self.synopsis_chars);
            let cost = line.chars().count() + 1;
            if used + cost > self.synopsis_chars {
                break;
            }
            used += cost;
            synopsis.push(line);
        }
        synopsis.reverse();

        ContextDigest {
            covered: chapters.iter().map(|c| c.number).collect(),
            synopsis,
            recent,
        }
    }
}

/// First sentence of `text`, capped in length
fn opening_sentence(text: &str) -> String {
    let text = text.trim_start();
    let end = text
        .char_indices()
        .find(|(_, c)| matches!(c, '.' | '!' | '?' | '\n'))
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(text.len());
    truncate_chars(text[..end].trim(), MAX_OPENING_CHARS)
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut short: String = text.chars().take(limit.saturating_sub(3)).collect();
    short.push_str("...");
    short
}

/// Last `limit` characters of `text`, starting at a word boundary when one is near
fn tail_chars(text: &str, limit: usize) -> String {
    let text = text.trim_end();
    let total = text.chars().count();
    if total <= limit {
        return text.trim_start().to_string();
    }
    let start = text
        .char_indices()
        .nth(total - limit)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let tail = &text[start..];
    match tail.find(char::is_whitespace) {
        Some(space) if space < tail.len() / 4 => tail[space..].trim_start().to_string(),
        _ => tail.to_string(),
    }
}
