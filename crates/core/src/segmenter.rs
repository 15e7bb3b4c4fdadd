//! Sentence segmentation
//!
//! Splits text into sentences for backends that can only synthesize a whole
//! utterance at a time. Synthesizing sentence by sentence gets the first audio
//! out long before the full text would have finished as a single unit.
//!
//! Rules:
//! - whitespace runs collapse to a single space, ends are trimmed
//! - a boundary is a run of `.`, `!`, `?` or `…` (plus closing quotes or
//!   brackets) followed by whitespace or the end of the text
//! - punctuation stays with the sentence it ends
//! - fragments without any letters or digits merge into a neighbour
//! - the last sentence may lack terminal punctuation
//!
//! Joining the sentences with single spaces gives back the normalized text.

use serde::{Deserialize, Serialize};

/// One sentence of the input text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    /// Position in the sequence, starting at 0
    pub index: usize,
    pub text: String,
}

impl Sentence {
    /// Whether the text has anything to pronounce (a letter or digit)
    pub fn is_speakable(&self) -> bool {
        has_speech(&self.text)
    }
}

/// Stateless sentence splitter
#[derive(Debug, Clone, Copy, Default)]
pub struct SentenceSegmenter {
    max_chars: Option<usize>,
}

impl SentenceSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap sentence length; run-on text is cut at a nearby space
    pub fn with_max_chars(max_chars: Option<usize>) -> Self {
        Self {
            max_chars: max_chars.filter(|&m| m > 0),
        }
    }

    /// Lazy iterator over the sentences of `text`
    pub fn sentences(&self, text: &str) -> Sentences {
        Sentences {
            text: normalize_whitespace(text),
            pos: 0,
            index: 0,
            max_chars: self.max_chars,
        }
    }

    pub fn segment(&self, text: &str) -> Vec<Sentence> {
        self.sentences(text).collect()
    }
}

/// Collapse whitespace runs and trim
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Iterator returned by [`SentenceSegmenter::sentences`]
#[derive(Debug, Clone)]
pub struct Sentences {
    text: String,
    pos: usize,
    index: usize,
    max_chars: Option<usize>,
}

impl Iterator for Sentences {
    type Item = Sentence;

    fn next(&mut self) -> Option<Sentence> {
        if self.pos >= self.text.len() {
            return None;
        }

        let text = self.text.as_str();
        let start = self.pos;
        let mut end = boundary(text, start);

        while end < text.len() {
            let next_start = skip_space(text, end);
            let next_end = boundary(text, next_start);
            if has_speech(&text[start..end]) && has_speech(&text[next_start..next_end]) {
                break;
            }
            end = next_end;
        }

        if let Some(max) = self.max_chars {
            end = clamp(text, start, end, max);
        }

        let sentence = Sentence {
            index: self.index,
            text: text[start..end].trim_end().to_string(),
        };
        self.pos = skip_space(text, end);
        self.index += 1;

        Some(sentence)
    }
}

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '…')
}

fn is_closer(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']' | '}' | '»' | '”' | '’')
}

fn has_speech(s: &str) -> bool {
    s.chars().any(char::is_alphanumeric)
}

fn skip_space(text: &str, at: usize) -> usize {
    if text[at..].starts_with(' ') {
        at + 1
    } else {
        at
    }
}

/// Byte offset just past the first sentence boundary at or after `from`
fn boundary(text: &str, from: usize) -> usize {
    let mut chars = text[from..].char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !is_terminal(c) {
            continue;
        }

        let mut end = from + i + c.len_utf8();
        while let Some(&(j, n)) = chars.peek() {
            if is_terminal(n) || is_closer(n) {
                end = from + j + n.len_utf8();
                chars.next();
            } else {
                break;
            }
        }

        match chars.peek() {
            None => return end,
            Some(&(_, n)) if n.is_whitespace() => return end,
            // "3.14", "e.g.x": not a boundary
            _ => {}
        }
    }

    text.len()
}

/// Shorten `start..end` to at most `max` chars, preferring a space within
/// `max + 20` chars
fn clamp(text: &str, start: usize, end: usize, max: usize) -> usize {
    let span = &text[start..end];
    let Some((limit, _)) = span.char_indices().nth(max) else {
        return end;
    };

    let area_end = span
        .char_indices()
        .nth(max + 20)
        .map(|(i, _)| i)
        .unwrap_or(span.len());

    match span[..area_end].rfind(' ') {
        Some(space) if space > 0 => start + space,
        _ => start + limit,
    }
}
