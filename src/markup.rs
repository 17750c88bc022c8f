//! Allowlist sanitizer for model-produced HTML.
//!
//! Output is rebuilt token by token: allowed tags are re-emitted bare, every
//! other tag is dropped, and a `<` or `>` that does not belong to a well-formed
//! tag is escaped. Nothing the input splits apart can reassemble into a tag.

const ALLOWED_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "div", "ul", "ol", "li", "table", "thead", "tbody",
    "tr", "th", "td", "strong", "em", "b", "i", "br",
];

/// Elements whose content is dropped along with the tags.
const DROPPED_BLOCKS: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "noscript", "template", "svg", "math",
    "textarea", "title",
];

#[derive(Debug, PartialEq, Eq)]
enum Tag {
    /// Comment, doctype or processing instruction.
    Ignored,
    Element {
        name: String,
        closing: bool,
        self_closing: bool,
    },
}

/// Parse the tag at the start of `s` (which begins with `<`). Returns the tag
/// and its byte length, or `None` when the `<` does not open a tag.
fn parse_tag(s: &str) -> Option<(Tag, usize)> {
    if s.starts_with("<!--") {
        let len = s[4..].find("-->").map_or(s.len(), |end| end + 7);
        return Some((Tag::Ignored, len));
    }
    if s.starts_with("<!") || s.starts_with("<?") {
        return s.find('>').map(|end| (Tag::Ignored, end + 1));
    }

    let bytes = s.as_bytes();
    let closing = bytes.get(1) == Some(&b'/');
    let name_start = if closing { 2 } else { 1 };

    let name_len = bytes[name_start..]
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric())
        .count();
    if name_len == 0 || !bytes[name_start].is_ascii_alphabetic() {
        return None;
    }
    let name_end = name_start + name_len;
    match bytes.get(name_end) {
        Some(b) if b.is_ascii_whitespace() || *b == b'/' || *b == b'>' => {}
        _ => return None,
    }

    // Find the closing `>`, skipping quoted attribute values.
    let mut pos = name_end;
    let mut quote = None;
    let end = loop {
        let b = *bytes.get(pos)?;
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => break pos,
            None => {}
        }
        pos += 1;
    };

    Some((
        Tag::Element {
            name: s[name_start..name_end].to_ascii_lowercase(),
            closing,
            self_closing: bytes[end - 1] == b'/',
        },
        end + 1,
    ))
}

/// Remainder of `rest` after the closing tag of the block `name`, or the empty
/// string when it is never closed.
fn skip_block<'a>(rest: &'a str, name: &str) -> &'a str {
    let lowered = rest.to_ascii_lowercase();
    let needle = format!("</{}", name);
    let mut from = 0;

    while let Some(found) = lowered[from..].find(&needle) {
        let after = from + found + needle.len();
        let boundary = lowered.as_bytes().get(after);
        if matches!(boundary, Some(b) if b.is_ascii_alphanumeric()) {
            from = after;
            continue;
        }
        return match lowered[after..].find('>') {
            Some(gt) => &rest[after + gt + 1..],
            None => "",
        };
    }
    ""
}

/// Reduce `html` to the allowed tag subset with every attribute removed.
pub fn sanitize_fragment(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(at) = rest.find(|c: char| c == '<' || c == '>') {
        out.push_str(&rest[..at]);
        let tail = &rest[at..];

        if tail.starts_with('>') {
            out.push_str("&gt;");
            rest = &tail[1..];
            continue;
        }

        let Some((tag, len)) = parse_tag(tail) else {
            out.push_str("&lt;");
            rest = &tail[1..];
            continue;
        };
        rest = &tail[len..];

        if let Tag::Element {
            name,
            closing,
            self_closing,
        } = tag
        {
            if ALLOWED_TAGS.contains(&name.as_str()) {
                match (closing, name.as_str()) {
                    (true, "br") => {}
                    (true, _) => out.push_str(&format!("</{}>", name)),
                    (false, _) => out.push_str(&format!("<{}>", name)),
                }
            } else if !closing && !self_closing && DROPPED_BLOCKS.contains(&name.as_str()) {
                rest = skip_block(rest, &name);
            }
        }
    }

    out.push_str(rest);
    out
}
