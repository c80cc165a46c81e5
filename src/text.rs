use std::sync::LazyLock;

use regex::{Captures, Regex};

static HEX_ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)&#x([0-9a-f]+);").expect("valid hex entity regex"));
static DEC_ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(\d+);").expect("valid decimal entity regex"));
static NBSP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)&nbsp;").expect("valid nbsp regex"));
static AMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)&amp;").expect("valid amp regex"));
static QUOT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)&quot;").expect("valid quot regex"));

/// Decode, repair double-encoded UTF-8, then collapse whitespace.
pub fn clean_text(value: &str) -> String {
    collapse_whitespace(&repair_mojibake(&decode_entities(value)))
}

/// Decodes numeric references and the handful of named entities the legacy
/// export actually contains. Unknown entities are left alone.
pub fn decode_entities(value: &str) -> String {
    let out = HEX_ENTITY_RE.replace_all(value, |caps: &Captures<'_>| {
        decode_code_point(&caps[0], u32::from_str_radix(&caps[1], 16).ok())
    });
    let out = DEC_ENTITY_RE.replace_all(&out, |caps: &Captures<'_>| {
        decode_code_point(&caps[0], caps[1].parse::<u32>().ok())
    });
    let out = NBSP_RE.replace_all(&out, " ");
    let out = AMP_RE.replace_all(&out, "&");
    let out = QUOT_RE.replace_all(&out, "\"");
    out.replace("&#39;", "'")
}

fn decode_code_point(original: &str, code: Option<u32>) -> String {
    match code.and_then(char::from_u32) {
        Some(ch) => ch.to_string(),
        None => original.to_owned(),
    }
}

pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Reinterprets runs of Latin-1 chars as bytes and decodes them as UTF-8 when
/// `Ã`/`Â` markers are present. Chars above U+00FF pass through, and bytes
/// that are not valid UTF-8 keep their Latin-1 char, except a stray `Â`
/// (the remains of a double-encoded no-break space), which is dropped.
pub fn repair_mojibake(input: &str) -> String {
    if !input.contains(['\u{00c3}', '\u{00c2}']) {
        return input.to_owned();
    }

    let mut out = String::with_capacity(input.len());
    let mut run: Vec<u8> = Vec::new();
    for ch in input.chars() {
        match u8::try_from(u32::from(ch)) {
            Ok(byte) => run.push(byte),
            Err(_) => {
                decode_latin1_run(&run, &mut out);
                run.clear();
                out.push(ch);
            }
        }
    }
    decode_latin1_run(&run, &mut out);
    out
}

fn decode_latin1_run(bytes: &[u8], out: &mut String) {
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
        out.extend(
            chunk
                .invalid()
                .iter()
                .filter(|byte| **byte != 0xc2)
                .map(|byte| char::from(*byte)),
        );
    }
}

pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Splits after a `.` that is followed by whitespace and an ASCII uppercase
/// letter. The whitespace between sentences is dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        current.push(ch);
        i += 1;

        if ch != '.' {
            continue;
        }

        let mut j = i;
        while j < chars.len() && chars[j].is_whitespace() {
            j += 1;
        }
        if j > i && j < chars.len() && chars[j].is_ascii_uppercase() {
            sentences.push(std::mem::take(&mut current));
            i = j;
        }
    }

    if !current.is_empty() {
        sentences.push(current);
    }
    sentences
}

/// Wraps each chunk in an escaped `<p>` element.
pub fn paragraphs_html<S: AsRef<str>>(chunks: &[S]) -> String {
    chunks
        .iter()
        .map(|chunk| format!("<p>{}</p>", escape_html(chunk.as_ref())))
        .collect()
}

/// Fallback markup for a page without usable source HTML.
pub fn synthesize_html(text: &str, max_paragraphs: usize, placeholder_html: &str) -> String {
    if text.trim().is_empty() {
        return placeholder_html.to_owned();
    }

    let sentences = split_sentences(text);
    let limit = max_paragraphs.max(1).min(sentences.len());
    paragraphs_html(&sentences[..limit])
}
