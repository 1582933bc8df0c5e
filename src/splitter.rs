//! Rendered-length-aware text splitter (C3).
//!
//! Input text may contain inline markup of the form `[TARGET|RENDERED]`
//! where `TARGET` is a source-side link identifier (never shown to the
//! reader) and `RENDERED` is what the reader sees. Characters that make up
//! `TARGET|` and the surrounding brackets are not counted towards rendered
//! length, and a split is never allowed to fall inside a markup block — the
//! whole bracketed construct must survive intact so the caller can replace
//! it with a platform hyperlink afterwards.
//!
//! Splitting prefers the latest whitespace character at or before the
//! target rendered length, searched within a bounded window (mirroring
//! `examples/original_source/helper_funcs.go`'s `findIndexToCut`, which
//! looks back up to 100 runes). If no whitespace is available in that
//! window, the split falls back to the nearest valid (non-markup) boundary
//! at or before the target length. In the rare case where a single markup
//! block spans past the target with no earlier boundary, the chunk grows
//! past `target` rather than tearing the markup apart — this is the
//! documented best-effort exception.

use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

static MARKUP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\[\]|]+)\|([^\[\]|]+)\]").unwrap());

const MAX_CHARS_TO_SKIP: usize = 100;

/// A cut point: rendered length accumulated up to (but not including) the
/// character starting at `byte_offset`, and whether that character is
/// whitespace (a preferred place to cut, matching the reference
/// implementation's behavior of leaving the separator as the first
/// character of the next chunk).
#[derive(Debug, Clone, Copy)]
struct Boundary {
    byte_offset: usize,
    rendered_len: usize,
    is_whitespace: bool,
}

/// One output chunk: the byte range it occupies in the original text and
/// its rendered length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub byte_range: Range<usize>,
    pub rendered_len: usize,
}

impl Chunk {
    pub fn as_str<'a>(&self, text: &'a str) -> &'a str {
        &text[self.byte_range.clone()]
    }
}

/// Rendered length of `text`, counting markup blocks as their `RENDERED`
/// part only.
pub fn rendered_len(text: &str) -> usize {
    boundaries(text).last().map(|b| b.rendered_len).unwrap_or(0)
}

fn boundaries(text: &str) -> Vec<Boundary> {
    let mut out = Vec::new();
    let mut rendered = 0usize;
    let mut cursor = 0usize;

    for m in MARKUP.find_iter(text) {
        // Plain-text run before this markup block.
        push_plain_boundaries(&text[cursor..m.start()], cursor, &mut rendered, &mut out);

        out.push(Boundary {
            byte_offset: m.start(),
            rendered_len: rendered,
            is_whitespace: false,
        });

        let caps = MARKUP.captures(m.as_str()).unwrap();
        let rendered_part = caps.get(2).unwrap().as_str();
        rendered += rendered_part.chars().count();

        out.push(Boundary {
            byte_offset: m.end(),
            rendered_len: rendered,
            is_whitespace: false,
        });

        cursor = m.end();
    }
    push_plain_boundaries(&text[cursor..], cursor, &mut rendered, &mut out);
    out.push(Boundary {
        byte_offset: text.len(),
        rendered_len: rendered,
        is_whitespace: false,
    });
    out
}

fn push_plain_boundaries(segment: &str, base: usize, rendered: &mut usize, out: &mut Vec<Boundary>) {
    for (i, ch) in segment.char_indices() {
        out.push(Boundary {
            byte_offset: base + i,
            rendered_len: *rendered,
            is_whitespace: ch.is_whitespace(),
        });
        *rendered += 1;
    }
}

/// Replaces every `[target|rendered]` markup block in `chunk` with the
/// platform's native hyperlink syntax. Called at send time, once a chunk's
/// boundaries are already fixed, so the substitution never affects splitting.
pub fn render_markup_as_html(chunk: &str) -> String {
    MARKUP
        .replace_all(chunk, |caps: &regex::Captures| {
            format!("<a href='{}'>{}</a>", &caps[1], &caps[2])
        })
        .into_owned()
}

/// Splits `text` into consecutive chunks, each of rendered length `<=
/// target` (except the rare pathological case described above).
pub fn split(text: &str, target: usize) -> Vec<Chunk> {
    if target == 0 || text.is_empty() {
        return if text.is_empty() {
            Vec::new()
        } else {
            vec![Chunk {
                byte_range: 0..text.len(),
                rendered_len: rendered_len(text),
            }]
        };
    }

    let boundaries = boundaries(text);
    let total_rendered = boundaries.last().unwrap().rendered_len;
    if total_rendered <= target {
        return vec![Chunk {
            byte_range: 0..text.len(),
            rendered_len: total_rendered,
        }];
    }

    let mut chunks = Vec::new();
    let mut start = &boundaries[0]; // rendered_len 0, byte_offset 0
    let mut start_idx = 0usize;

    loop {
        let window_target = start.rendered_len + target;
        if boundaries.last().unwrap().rendered_len - start.rendered_len <= target {
            let end = boundaries.last().unwrap();
            chunks.push(Chunk {
                byte_range: start.byte_offset..end.byte_offset,
                rendered_len: end.rendered_len - start.rendered_len,
            });
            break;
        }

        // Find the boundary with the largest rendered_len <= window_target.
        let mut best_idx = start_idx;
        for (i, b) in boundaries.iter().enumerate().skip(start_idx) {
            if b.rendered_len <= window_target {
                best_idx = i;
            } else {
                break;
            }
        }
        // Prefer the latest whitespace boundary within the lookback window.
        let mut cut_idx = best_idx;
        let mut i = best_idx;
        while i > start_idx {
            let b = boundaries[i];
            if window_target - b.rendered_len > MAX_CHARS_TO_SKIP {
                break;
            }
            if b.is_whitespace {
                cut_idx = i;
                break;
            }
            i -= 1;
        }

        if cut_idx == start_idx {
            // No progress possible at this boundary set (a markup block
            // spans past the window); advance to the next boundary after
            // start that makes progress, even past target.
            cut_idx = start_idx + 1;
        }

        let cut = &boundaries[cut_idx];
        chunks.push(Chunk {
            byte_range: start.byte_offset..cut.byte_offset,
            rendered_len: cut.rendered_len - start.rendered_len,
        });
        start_idx = cut_idx;
        start = &boundaries[start_idx];
    }

    chunks
}
