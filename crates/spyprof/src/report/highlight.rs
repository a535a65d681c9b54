//! Per-line syntax highlighting into HTML spans.

/// Renders one line of source text as HTML markup
pub trait Highlighter: Send + Sync {
    /// Markup for `line`. Must escape everything it does not wrap in tags.
    fn highlight(&self, line: &str) -> String;

    /// CSS rules for the classes `highlight` emits
    fn stylesheet(&self) -> String;
}

/// Escape text for inclusion in HTML element content or attributes
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        push_escaped(&mut out, c);
    }
    out
}

fn push_escaped(out: &mut String, c: char) {
    match c {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        '"' => out.push_str("&quot;"),
        _ => out.push(c),
    }
}

/// Escapes only
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainHighlighter;

impl Highlighter for PlainHighlighter {
    fn highlight(&self, line: &str) -> String {
        escape(line)
    }

    fn stylesheet(&self) -> String {
        String::new()
    }
}

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "self", "static", "struct", "super", "trait", "true", "type",
    "union", "unsafe", "use", "where", "while",
];

const PRIMITIVES: &[&str] = &[
    "bool", "char", "str", "u8", "u16", "u32", "u64", "u128", "usize", "i8", "i16", "i32",
    "i64", "i128", "isize", "f32", "f64", "Self",
];

/// Token classes, named after the Pygments short names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Comment,
    String,
    Char,
    Lifetime,
    Number,
    Keyword,
    Primitive,
    Macro,
    Attribute,
}

impl Class {
    fn css(self) -> &'static str {
        match self {
            Class::Comment => "c",
            Class::String => "s",
            Class::Char => "sc",
            Class::Lifetime => "nl",
            Class::Number => "m",
            Class::Keyword => "k",
            Class::Primitive => "kt",
            Class::Macro => "fm",
            Class::Attribute => "nd",
        }
    }
}

/// Line-at-a-time Rust highlighter.
///
/// Each line is tokenized on its own, so a block comment or string that
/// spans lines is only recognised on the line where it opens.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustHighlighter;

impl Highlighter for RustHighlighter {
    fn highlight(&self, line: &str) -> String {
        let chars: Vec<char> = line.chars().collect();
        let mut out = String::with_capacity(line.len() * 2);
        let mut i = 0;

        while i < chars.len() {
            let (class, end) = scan_token(&chars, i);
            match class {
                Some(class) => {
                    out.push_str("<span class=\"");
                    out.push_str(class.css());
                    out.push_str("\">");
                    for &c in &chars[i..end] {
                        push_escaped(&mut out, c);
                    }
                    out.push_str("</span>");
                }
                None => {
                    for &c in &chars[i..end] {
                        push_escaped(&mut out, c);
                    }
                }
            }
            i = end;
        }

        out
    }

    fn stylesheet(&self) -> String {
        [
            ".c { color: #408080; font-style: italic }",
            ".s { color: #ba2121 }",
            ".sc { color: #ba2121 }",
            ".nl { color: #a0a000 }",
            ".m { color: #666666 }",
            ".k { color: #008000; font-weight: bold }",
            ".kt { color: #b00040 }",
            ".fm { color: #0000ff }",
            ".nd { color: #aa22ff }",
        ]
        .join("\n")
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Classify the token starting at `start`; returns its class and end index
fn scan_token(chars: &[char], start: usize) -> (Option<Class>, usize) {
    let at = |i: usize| chars.get(i).copied();
    let c = chars[start];

    match c {
        '/' if at(start + 1) == Some('/') => (Some(Class::Comment), chars.len()),
        '/' if at(start + 1) == Some('*') => {
            let mut i = start + 2;
            while i < chars.len() {
                if chars[i] == '*' && at(i + 1) == Some('/') {
                    return (Some(Class::Comment), i + 2);
                }
                i += 1;
            }
            (Some(Class::Comment), chars.len())
        }
        '"' => (Some(Class::String), scan_quoted(chars, start + 1, '"')),
        'r' if matches!(at(start + 1), Some('"') | Some('#')) => match scan_raw_string(chars, start)
        {
            Some(end) => (Some(Class::String), end),
            None => scan_word(chars, start),
        },
        '\'' => scan_quote_or_lifetime(chars, start),
        '#' if at(start + 1) == Some('[')
            || (at(start + 1) == Some('!') && at(start + 2) == Some('[')) =>
        {
            (Some(Class::Attribute), scan_brackets(chars, start))
        }
        c if c.is_ascii_digit() => {
            let mut i = start + 1;
            while let Some(c) = at(i) {
                let fraction = c == '.' && at(i + 1).is_some_and(|d| d.is_ascii_digit());
                if is_ident_continue(c) || fraction {
                    i += 1;
                } else {
                    break;
                }
            }
            (Some(Class::Number), i)
        }
        c if is_ident_start(c) => scan_word(chars, start),
        _ => (None, start + 1),
    }
}

fn scan_word(chars: &[char], start: usize) -> (Option<Class>, usize) {
    let mut end = start + 1;
    while end < chars.len() && is_ident_continue(chars[end]) {
        end += 1;
    }
    let word: String = chars[start..end].iter().collect();

    if chars.get(end) == Some(&'!') && chars.get(end + 1) != Some(&'=') {
        return (Some(Class::Macro), end + 1);
    }
    if KEYWORDS.contains(&word.as_str()) {
        return (Some(Class::Keyword), end);
    }
    if PRIMITIVES.contains(&word.as_str()) {
        return (Some(Class::Primitive), end);
    }
    (None, end)
}

/// End index just past the closing `quote`, honouring backslash escapes
fn scan_quoted(chars: &[char], mut i: usize, quote: char) -> usize {
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}

/// `r"..."` / `r#"..."#`; None if this is not actually a raw string
fn scan_raw_string(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    let mut hashes = 0;
    while chars.get(i) == Some(&'#') {
        hashes += 1;
        i += 1;
    }
    if chars.get(i) != Some(&'"') {
        return None;
    }
    i += 1;

    while i < chars.len() {
        if chars[i] == '"' && (1..=hashes).all(|h| chars.get(i + h) == Some(&'#')) {
            return Some(i + 1 + hashes);
        }
        i += 1;
    }
    Some(chars.len())
}

fn scan_quote_or_lifetime(chars: &[char], start: usize) -> (Option<Class>, usize) {
    match (chars.get(start + 1), chars.get(start + 2)) {
        (Some('\\'), _) => (Some(Class::Char), scan_quoted(chars, start + 1, '\'')),
        (Some(_), Some('\'')) => (Some(Class::Char), start + 3),
        (Some(&c), _) if is_ident_start(c) => {
            let mut end = start + 2;
            while end < chars.len() && is_ident_continue(chars[end]) {
                end += 1;
            }
            (Some(Class::Lifetime), end)
        }
        _ => (None, start + 1),
    }
}

/// End of a `#[...]` attribute, balancing nested brackets on this line
fn scan_brackets(chars: &[char], start: usize) -> usize {
    let mut depth = 0usize;
    for (i, &c) in chars.iter().enumerate().skip(start) {
        match c {
            '[' => depth += 1,
            ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
    }
    chars.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hl(line: &str) -> String {
        RustHighlighter.highlight(line)
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("a < b && c > \"d\""), "a &lt; b &amp;&amp; c &gt; &quot;d&quot;");
        assert_eq!(PlainHighlighter.highlight("<x>"), "&lt;x&gt;");
    }

    #[test]
    fn test_keywords_and_types() {
        assert_eq!(
            hl("fn main() -> u32"),
            "<span class=\"k\">fn</span> main() -&gt; <span class=\"kt\">u32</span>"
        );
    }

    #[test]
    fn test_comment_swallows_rest_of_line() {
        assert_eq!(
            hl("let x = 1; // <tail>"),
            "<span class=\"k\">let</span> x = <span class=\"m\">1</span>; \
             <span class=\"c\">// &lt;tail&gt;</span>"
        );
    }

    #[test]
    fn test_strings_with_escapes() {
        assert_eq!(
            hl(r#"println!("a\"<b>", x)"#),
            "<span class=\"fm\">println!</span>(<span class=\"s\">&quot;a\\&quot;&lt;b&gt;&quot;</span>, x)"
        );
        assert_eq!(
            hl(r##"r#"raw "str""#"##),
            "<span class=\"s\">r#&quot;raw &quot;str&quot;&quot;#</span>"
        );
    }

    #[test]
    fn test_chars_and_lifetimes() {
        assert_eq!(
            hl("fn f<'a>(c: char) { 'x' }"),
            "<span class=\"k\">fn</span> f&lt;<span class=\"nl\">'a</span>&gt;(c: \
             <span class=\"kt\">char</span>) { <span class=\"sc\">'x'</span> }"
        );
        assert_eq!(hl(r"'\n'"), "<span class=\"sc\">'\\n'</span>");
    }

    #[test]
    fn test_attribute_and_numbers() {
        assert_eq!(
            hl("#[derive(Debug)] 3.5e2"),
            "<span class=\"nd\">#[derive(Debug)]</span> <span class=\"m\">3.5e2</span>"
        );
        // method call on an integer is not a fraction
        assert_eq!(hl("1.max"), "<span class=\"m\">1</span>.max");
    }

    #[test]
    fn test_spans_balanced_on_unterminated_input() {
        for line in ["\"open", "/* open", "#[open", "r#\"open", "'"] {
            let html = hl(line);
            assert_eq!(html.matches("<span").count(), html.matches("</span>").count());
        }
    }

    #[test]
    fn test_not_equal_is_not_a_macro() {
        assert_eq!(hl("a!=b"), "a!=b");
    }
}
