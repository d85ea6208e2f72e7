//! Flat extraction of `<name>content</name>` spans from model output.
//!
//! Tag names are runs of alphanumerics and `_`. Content runs up to the
//! first matching close tag, may span lines and is returned trimmed.
//! Spans are found left to right without overlap; a different-named tag
//! inside content stays part of that content. An opening tag with no
//! matching close is skipped and scanning resumes right after its `<`.

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub content: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self { name: name.into(), content: content.into() }
    }
}

/// All top-level tags in document order.
pub fn parse_tags(text: &str) -> Vec<Tag> {
    let mut tags = Vec::new();
    let mut cursor = 0;

    while let Some((tag, next)) = next_tag(text, cursor) {
        tags.push(tag);
        cursor = next;
    }

    tags
}

/// The first tag only, for single-action callers.
pub fn first_tag(text: &str) -> Option<Tag> {
    next_tag(text, 0).map(|(tag, _)| tag)
}

/// Finds the leftmost complete tag starting at or after `from`, returning it
/// with the byte offset just past its close tag.
fn next_tag(text: &str, from: usize) -> Option<(Tag, usize)> {
    let mut search = from;

    while let Some(offset) = text[search..].find('<') {
        let open = search + offset;
        if let Some(found) = tag_at(text, open) {
            return Some(found);
        }
        search = open + 1;
    }

    None
}

fn tag_at(text: &str, open: usize) -> Option<(Tag, usize)> {
    let after_bracket = &text[open + 1..];
    let name_len = after_bracket
        .char_indices()
        .find(|(_, ch)| !is_name_char(*ch))
        .map(|(index, _)| index)
        .unwrap_or(after_bracket.len());
    if name_len == 0 {
        return None;
    }

    let name = &after_bracket[..name_len];
    if !after_bracket[name_len..].starts_with('>') {
        return None;
    }

    let content_start = open + 1 + name_len + 1;
    let close = format!("</{name}>");
    let content_len = text[content_start..].find(&close)?;
    let content = &text[content_start..content_start + content_len];

    Some((Tag::new(name, content.trim()), content_start + content_len + close.len()))
}

fn is_name_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}
