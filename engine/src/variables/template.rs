//! Template reference syntax.
//!
//! ```text
//! Hello {first_name|capitalize}, save {discount|percent} today \{literal\}
//!       └── field ─┘└ filter ┘        └ field ┘└ filter ┘      └ escaped ┘
//! ```
//!
//! - `{field}` or `{field|filter|filter:arg1,arg2}`
//! - arguments may be double-quoted to contain `,` `|` `:` or `}`;
//!   inside quotes `\"` and `\\` are escapes
//! - `\{` and `\}` are literal braces; any other backslash is literal
//! - an unterminated `{` or an empty `{}` is kept as literal text and
//!   reported as a syntax problem

use serde::Serialize;

/// Byte range of a reference in the template, braces included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// One `name:args` step of a filter chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<String>,
}

/// A parsed `{field|filters}` reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedVariable {
    pub field_name: String,
    pub filters: Vec<FilterCall>,
    /// Reference text exactly as written, braces included.
    pub raw: String,
    pub span: Span,
}

/// A malformed reference, kept as literal text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyntaxProblem {
    /// Byte offset of the opening brace.
    pub position: usize,
    pub text: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Variable(ExtractedVariable),
}

/// A template split into literal text and references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Template {
    pub segments: Vec<Segment>,
    pub problems: Vec<SyntaxProblem>,
}

impl Template {
    pub fn variables(&self) -> impl Iterator<Item = &ExtractedVariable> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Variable(v) => Some(v),
            Segment::Text(_) => None,
        })
    }

    pub fn has_variables(&self) -> bool {
        self.variables().next().is_some()
    }
}

/// Parse `template` into segments. Never fails; malformed references become
/// text plus a [`SyntaxProblem`].
pub fn parse(template: &str) -> Template {
    let mut out = Template::default();
    let mut text = String::new();
    let mut chars = template.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.peek() {
                Some(&(_, next @ ('{' | '}'))) => {
                    text.push(next);
                    chars.next();
                }
                _ => text.push('\\'),
            },
            '{' => match scan_reference(template, i) {
                Ok(end) => {
                    let raw = &template[i..end];
                    match parse_body(&raw[1..raw.len() - 1]) {
                        Ok((field_name, filters)) => {
                            if !text.is_empty() {
                                out.segments.push(Segment::Text(std::mem::take(&mut text)));
                            }
                            out.segments.push(Segment::Variable(ExtractedVariable {
                                field_name,
                                filters,
                                raw: raw.to_string(),
                                span: Span { start: i, end },
                            }));
                        }
                        Err(message) => {
                            text.push_str(raw);
                            out.problems.push(SyntaxProblem {
                                position: i,
                                text: raw.to_string(),
                                message,
                            });
                        }
                    }
                    while chars.peek().is_some_and(|&(j, _)| j < end) {
                        chars.next();
                    }
                }
                Err(message) => {
                    text.push('{');
                    out.problems.push(SyntaxProblem {
                        position: i,
                        text: "{".to_string(),
                        message,
                    });
                }
            },
            _ => text.push(c),
        }
    }

    if !text.is_empty() {
        out.segments.push(Segment::Text(text));
    }
    out
}

/// Every well-formed reference in `template`, in order.
///
/// ```
/// use creative_sync::variables::extract_variables;
///
/// let vars = extract_variables("Hello {name}, you owe {amount|currency:USD}");
/// assert_eq!(vars.len(), 2);
/// assert_eq!(vars[0].field_name, "name");
/// assert!(vars[0].filters.is_empty());
/// assert_eq!(vars[1].filters[0].name, "currency");
/// assert_eq!(vars[1].filters[0].args, vec!["USD".to_string()]);
/// ```
pub fn extract_variables(template: &str) -> Vec<ExtractedVariable> {
    parse(template).variables().cloned().collect()
}

/// Find the byte offset just past the `}` closing the reference opened at
/// `open`.
fn scan_reference(template: &str, open: usize) -> Result<usize, String> {
    let mut in_quote = false;
    let mut escaped = false;
    for (j, c) in template[open + 1..].char_indices() {
        let at = open + 1 + j;
        if in_quote {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_quote = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_quote = true,
            '}' => return Ok(at + 1),
            '{' => return Err("'{' opened inside a reference".to_string()),
            _ => {}
        }
    }
    Err("unterminated '{'".to_string())
}

/// Split on `sep` outside double quotes.
fn split_unquoted(s: &str, sep: char, max_parts: Option<usize>) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quote = false;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        if in_quote {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_quote = false,
                _ => {}
            }
        } else if c == '"' {
            in_quote = true;
        } else if c == sep && max_parts.map_or(true, |m| parts.len() + 1 < m) {
            parts.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts
}

fn unquote(arg: &str) -> String {
    let arg = arg.trim();
    let inner = match arg.strip_prefix('"').and_then(|a| a.strip_suffix('"')) {
        Some(inner) if arg.len() >= 2 => inner,
        _ => return arg.to_string(),
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(n @ ('"' | '\\')) => out.push(n),
                Some(n) => {
                    out.push('\\');
                    out.push(n);
                }
                None => out.push('\\'),
            },
            _ => out.push(c),
        }
    }
    out
}

fn parse_body(body: &str) -> Result<(String, Vec<FilterCall>), String> {
    let mut pieces = split_unquoted(body, '|', None).into_iter();
    let field_name = pieces.next().unwrap_or_default().trim().to_string();
    if field_name.is_empty() {
        return Err("empty variable reference".to_string());
    }

    let mut filters = Vec::new();
    for piece in pieces {
        let mut head = split_unquoted(piece, ':', Some(2)).into_iter();
        let name = head.next().unwrap_or_default().trim().to_string();
        if name.is_empty() {
            return Err(format!("empty filter name after '{}'", field_name));
        }
        let args = match head.next() {
            Some(raw_args) => split_unquoted(raw_args, ',', None).into_iter().map(unquote).collect(),
            None => Vec::new(),
        };
        filters.push(FilterCall { name, args });
    }
    Ok((field_name, filters))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_with_filters_and_spans() {
        let template = "Hello {name}, you owe {amount|currency:USD}";
        let vars = extract_variables(template);

        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0].field_name, "name");
        assert!(vars[0].filters.is_empty());
        assert_eq!(&template[vars[0].span.start..vars[0].span.end], "{name}");
        assert_eq!(
            vars[1].filters,
            vec![FilterCall {
                name: "currency".into(),
                args: vec!["USD".into()]
            }]
        );
        assert_eq!(vars[1].raw, "{amount|currency:USD}");
    }

    #[test]
    fn test_filter_chain_and_multiple_args() {
        let vars = extract_variables("{ headline | trim | truncate:30,... | upper }");
        let names: Vec<&str> = vars[0].filters.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(vars[0].field_name, "headline");
        assert_eq!(names, vec!["trim", "truncate", "upper"]);
        assert_eq!(vars[0].filters[1].args, vec!["30".to_string(), "...".to_string()]);
    }

    #[test]
    fn test_quoted_arguments() {
        let vars = extract_variables(r#"{tags|join:" | "}{title|replace:"[,:]","\"}"}"#);
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0].filters[0].args, vec![" | ".to_string()]);
        assert_eq!(vars[1].filters[0].args, vec!["[,:]".to_string(), "\"}".to_string()]);
    }

    #[test]
    fn test_colon_in_unquoted_args() {
        let vars = extract_variables("{start|date:%H:%M}");
        assert_eq!(vars[0].filters[0].args, vec!["%H:%M".to_string()]);
    }

    #[test]
    fn test_escaped_braces_are_text() {
        let template = parse(r"Use \{braces\} and C:\path");
        assert!(!template.has_variables());
        assert!(template.problems.is_empty());
        assert_eq!(template.segments, vec![Segment::Text(r"Use {braces} and C:\path".into())]);
    }

    #[test]
    fn test_malformed_references_stay_literal() {
        let template = parse("a {} b {name c");
        assert!(!template.has_variables());
        assert_eq!(template.problems.len(), 2);
        assert_eq!(template.segments, vec![Segment::Text("a {} b {name c".into())]);

        let template = parse("{a{b}");
        assert_eq!(template.problems.len(), 1);
        assert_eq!(template.variables().count(), 1);
        assert_eq!(template.variables().next().map(|v| v.field_name.as_str()), Some("b"));
    }
}
