//! Delimited token scanning (`${...}`, `#{...}`)
//!
//! A backslash directly before the opening marker escapes it, and a backslash
//! before the closing marker inside a token keeps the marker as content. A
//! token with no closing marker is left as literal text.

use crate::error::Result;

/// A piece of scanned text
#[derive(Debug, Clone, PartialEq)]
pub enum TokenPart {
    Literal(String),
    /// Token content with escapes resolved
    Token(String),
}

/// Split `text` into literal runs and `open ... close` tokens
///
/// Adjacent literal text is merged, so literals and tokens alternate.
pub fn tokenize(text: &str, open: &str, close: &str) -> Vec<TokenPart> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut rest = text;

    while let Some(start) = rest.find(open) {
        if start > 0 && rest.as_bytes()[start - 1] == b'\\' {
            literal.push_str(&rest[..start - 1]);
            literal.push_str(open);
            rest = &rest[start + open.len()..];
            continue;
        }

        let Some((content, remaining)) = scan_token(&rest[start + open.len()..], close) else {
            break;
        };
        literal.push_str(&rest[..start]);
        if !literal.is_empty() {
            parts.push(TokenPart::Literal(std::mem::take(&mut literal)));
        }
        parts.push(TokenPart::Token(content));
        rest = remaining;
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        parts.push(TokenPart::Literal(literal));
    }
    parts
}

/// Replace every `open ... close` token in `text` with the handler's output
pub fn replace_tokens<F>(text: &str, open: &str, close: &str, mut handler: F) -> Result<String>
where
    F: FnMut(&str) -> Result<String>,
{
    let mut out = String::with_capacity(text.len());
    for part in tokenize(text, open, close) {
        match part {
            TokenPart::Literal(literal) => out.push_str(&literal),
            TokenPart::Token(content) => out.push_str(&handler(&content)?),
        }
    }
    Ok(out)
}

/// Whether `text` contains at least one complete, unescaped token
pub fn contains_token(text: &str, open: &str, close: &str) -> bool {
    tokenize(text, open, close)
        .iter()
        .any(|part| matches!(part, TokenPart::Token(_)))
}

/// Token content up to the first unescaped `close`, plus the text after it
fn scan_token<'a>(mut input: &'a str, close: &str) -> Option<(String, &'a str)> {
    let mut content = String::new();
    loop {
        let end = input.find(close)?;
        if end > 0 && input.as_bytes()[end - 1] == b'\\' {
            content.push_str(&input[..end - 1]);
            content.push_str(close);
            input = &input[end + close.len()..];
        } else {
            content.push_str(&input[..end]);
            return Some((content, &input[end + close.len()..]));
        }
    }
}
