//! Template filters.
//!
//! A filter is a named `(value, args, row) -> value` step of a reference's
//! chain. [`FilterRegistry`] maps names to [`Filter`] implementations;
//! closures with the right signature are filters too.
//!
//! Built-in filters pass empty values through unchanged (except `default`
//! and `length`), so an empty cell is reported once as empty rather than as
//! a filter failure.

use chrono::NaiveDateTime;
use regex::Regex;
use std::collections::HashMap;
use std::fmt::{self, Write};
use std::sync::Arc;

use crate::error::{FilterError, FilterResult};
use crate::models::{CellValue, Row};
use crate::normalize::parse_date;
use crate::transform::lenient_number;

/// Capability of transforming one value.
pub trait Filter: Send + Sync {
    fn apply(&self, value: &CellValue, args: &[String], row: &Row) -> FilterResult<CellValue>;

    /// Static argument check, used when validating a template without rows.
    fn check_args(&self, _args: &[String]) -> FilterResult<()> {
        Ok(())
    }
}

impl<F> Filter for F
where
    F: Fn(&CellValue, &[String], &Row) -> FilterResult<CellValue> + Send + Sync,
{
    fn apply(&self, value: &CellValue, args: &[String], row: &Row) -> FilterResult<CellValue> {
        self(value, args, row)
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Name → filter lookup. Names are case-insensitive.
#[derive(Clone, Default)]
pub struct FilterRegistry {
    filters: HashMap<String, Arc<dyn Filter>>,
}

impl FilterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in filter.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for builtin in BUILTINS {
            registry.register(builtin.name, *builtin);
        }
        registry
    }

    /// Add or replace a filter.
    pub fn register(&mut self, name: impl Into<String>, filter: impl Filter + 'static) -> &mut Self {
        self.filters.insert(name.into().to_lowercase(), Arc::new(filter));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn Filter> {
        self.filters.get(&name.to_lowercase()).map(|f| &**f)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(&name.to_lowercase())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.filters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRegistry").field("filters", &self.names()).finish()
    }
}

// =============================================================================
// Built-ins
// =============================================================================

type BuiltinFn = fn(&Builtin, &CellValue, &[String]) -> FilterResult<CellValue>;

/// Upper bound for decimal-place arguments.
const MAX_DECIMALS: usize = 20;
/// Upper bound for pad widths.
const MAX_PAD_WIDTH: usize = 1_000;

/// A built-in filter with a fixed arity.
#[derive(Clone, Copy)]
struct Builtin {
    name: &'static str,
    min_args: usize,
    max_args: usize,
    run: BuiltinFn,
}

impl Filter for Builtin {
    fn apply(&self, value: &CellValue, args: &[String], _row: &Row) -> FilterResult<CellValue> {
        self.check_args(args)?;
        (self.run)(self, value, args)
    }

    fn check_args(&self, args: &[String]) -> FilterResult<()> {
        if args.len() < self.min_args {
            return Err(FilterError::MissingArgument {
                filter: self.name.to_string(),
                expected: self.min_args,
            });
        }
        if args.len() > self.max_args {
            return Err(FilterError::InvalidArgument {
                filter: self.name.to_string(),
                arg: args[self.max_args].clone(),
                message: format!("takes at most {} argument(s)", self.max_args),
            });
        }
        Ok(())
    }
}

impl Builtin {
    fn invalid_input(&self, value: &CellValue) -> FilterError {
        FilterError::InvalidInput {
            filter: self.name.to_string(),
            value: value.to_string(),
        }
    }

    fn invalid_arg(&self, arg: &str, message: impl Into<String>) -> FilterError {
        FilterError::InvalidArgument {
            filter: self.name.to_string(),
            arg: arg.to_string(),
            message: message.into(),
        }
    }

    fn usize_arg(&self, args: &[String], index: usize, default: usize, max: usize) -> FilterResult<usize> {
        let Some(a) = args.get(index) else {
            return Ok(default);
        };
        let n: usize = a
            .trim()
            .parse()
            .map_err(|_| self.invalid_arg(a, "expected a non-negative integer"))?;
        if n > max {
            return Err(self.invalid_arg(a, format!("must be at most {}", max)));
        }
        Ok(n)
    }

    fn char_arg(&self, args: &[String], index: usize, default: char) -> FilterResult<char> {
        match args.get(index) {
            Some(a) => {
                let mut chars = a.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(c),
                    _ => Err(self.invalid_arg(a, "expected a single character")),
                }
            }
            None => Ok(default),
        }
    }
}

const fn builtin(name: &'static str, min_args: usize, max_args: usize, run: BuiltinFn) -> Builtin {
    Builtin {
        name,
        min_args,
        max_args,
        run,
    }
}

const BUILTINS: &[Builtin] = &[
    builtin("upper", 0, 0, |_, v, _| Ok(map_text(v, |s| s.to_uppercase()))),
    builtin("lower", 0, 0, |_, v, _| Ok(map_text(v, |s| s.to_lowercase()))),
    builtin("trim", 0, 0, |_, v, _| Ok(map_text(v, |s| s.trim().to_string()))),
    builtin("capitalize", 0, 0, |_, v, _| Ok(map_text(v, capitalize))),
    builtin("title", 0, 0, |_, v, _| Ok(map_text(v, title_case))),
    builtin("truncate", 1, 2, truncate),
    builtin("default", 1, 1, |_, v, args| {
        Ok(if v.is_empty() {
            CellValue::String(args[0].clone())
        } else {
            v.clone()
        })
    }),
    builtin("currency", 1, 2, currency),
    builtin("number", 0, 1, number),
    builtin("percent", 0, 1, percent),
    builtin("date", 1, 1, date),
    builtin("replace", 1, 2, replace),
    builtin("prefix", 1, 1, |_, v, args| Ok(map_text(v, |s| format!("{}{}", args[0], s)))),
    builtin("suffix", 1, 1, |_, v, args| Ok(map_text(v, |s| format!("{}{}", s, args[0])))),
    builtin("pad_start", 1, 2, |f, v, args| pad(f, v, args, true)),
    builtin("pad_end", 1, 2, |f, v, args| pad(f, v, args, false)),
    builtin("substring", 1, 2, substring),
    builtin("digits_only", 0, 0, |_, v, _| {
        Ok(map_text(v, |s| s.chars().filter(|c| c.is_ascii_digit()).collect()))
    }),
    builtin("alphanumeric", 0, 0, |_, v, _| {
        Ok(map_text(v, |s| s.chars().filter(|c| c.is_alphanumeric()).collect()))
    }),
    builtin("slug", 0, 0, |_, v, _| Ok(map_text(v, slug))),
    builtin("urlencode", 0, 0, |_, v, _| {
        Ok(map_text(v, |s| url::form_urlencoded::byte_serialize(s.as_bytes()).collect()))
    }),
    builtin("join", 0, 1, join),
    builtin("first", 0, 0, |_, v, _| Ok(pick(v, true))),
    builtin("last", 0, 0, |_, v, _| Ok(pick(v, false))),
    builtin("length", 0, 0, |_, v, _| {
        let n = match v {
            CellValue::List(items) => items.len(),
            CellValue::Null => 0,
            other => other.to_string().chars().count(),
        };
        Ok(CellValue::Number(n as f64))
    }),
];

/// Apply `f` to the display text of a non-empty value.
fn map_text(value: &CellValue, f: impl FnOnce(&str) -> String) -> CellValue {
    if value.is_empty() {
        return value.clone();
    }
    CellValue::String(f(&value.to_string()))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| capitalize(&word.to_lowercase()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn slug(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.to_lowercase().chars() {
        if c.is_alphanumeric() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_end_matches('-').to_string()
}

fn truncate(f: &Builtin, value: &CellValue, args: &[String]) -> FilterResult<CellValue> {
    let max = f.usize_arg(args, 0, 0, usize::MAX)?;
    let suffix = args.get(1).map(String::as_str).unwrap_or("");
    Ok(map_text(value, |s| {
        if s.chars().count() <= max {
            return s.to_string();
        }
        // A suffix that does not fit is dropped.
        let suffix_len = suffix.chars().count();
        if suffix_len >= max {
            return s.chars().take(max).collect();
        }
        let mut out: String = s.chars().take(max - suffix_len).collect();
        out.push_str(suffix);
        out
    }))
}

/// Fixed decimals with `,` thousands grouping.
pub fn format_grouped(n: f64, decimals: usize) -> String {
    let fixed = format!("{:.*}", decimals, n.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };

    let mut grouped = String::with_capacity(fixed.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if let Some(frac) = frac_part {
        grouped.push('.');
        grouped.push_str(frac);
    }

    let is_zero = fixed.chars().all(|c| c == '0' || c == '.');
    if n < 0.0 && !is_zero {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

fn numeric(f: &Builtin, value: &CellValue) -> FilterResult<f64> {
    lenient_number(value).ok_or_else(|| f.invalid_input(value))
}

fn currency(f: &Builtin, value: &CellValue, args: &[String]) -> FilterResult<CellValue> {
    if value.is_empty() {
        return Ok(value.clone());
    }
    let code = args[0].trim().to_uppercase();
    let (symbol, default_decimals) = match code.as_str() {
        "USD" | "CAD" | "AUD" => ("$", 2),
        "EUR" => ("€", 2),
        "GBP" => ("£", 2),
        "JPY" => ("¥", 0),
        "INR" => ("₹", 2),
        _ if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) => ("", 2),
        _ => return Err(f.invalid_arg(&args[0], "expected an ISO 4217 currency code")),
    };
    let decimals = f.usize_arg(args, 1, default_decimals, MAX_DECIMALS)?;
    let n = numeric(f, value)?;
    let amount = format_grouped(n, decimals);

    let text = match (symbol, amount.strip_prefix('-')) {
        ("", _) => format!("{} {}", amount, code),
        (s, Some(abs)) => format!("-{}{}", s, abs),
        (s, None) => format!("{}{}", s, amount),
    };
    Ok(CellValue::String(text))
}

fn number(f: &Builtin, value: &CellValue, args: &[String]) -> FilterResult<CellValue> {
    if value.is_empty() {
        return Ok(value.clone());
    }
    let decimals = f.usize_arg(args, 0, 0, MAX_DECIMALS)?;
    Ok(CellValue::String(format_grouped(numeric(f, value)?, decimals)))
}

/// The value is a ratio: `0.25` renders as `25%`.
fn percent(f: &Builtin, value: &CellValue, args: &[String]) -> FilterResult<CellValue> {
    if value.is_empty() {
        return Ok(value.clone());
    }
    let decimals = f.usize_arg(args, 0, 0, MAX_DECIMALS)?;
    let n = numeric(f, value)? * 100.0;
    Ok(CellValue::String(format!("{:.*}%", decimals, n)))
}

fn date(f: &Builtin, value: &CellValue, args: &[String]) -> FilterResult<CellValue> {
    let parsed: Option<NaiveDateTime> = match value {
        CellValue::Date(d) => Some(*d),
        CellValue::String(s) if !s.trim().is_empty() => parse_date(s),
        _ if value.is_empty() => return Ok(value.clone()),
        _ => None,
    };
    let d = parsed.ok_or_else(|| f.invalid_input(value))?;
    let mut out = String::new();
    write!(out, "{}", d.format(&args[0])).map_err(|_| f.invalid_arg(&args[0], "invalid date format"))?;
    Ok(CellValue::String(out))
}

fn replace(f: &Builtin, value: &CellValue, args: &[String]) -> FilterResult<CellValue> {
    let re = Regex::new(&args[0]).map_err(|e| f.invalid_arg(&args[0], e.to_string()))?;
    let replacement = args.get(1).map(String::as_str).unwrap_or("");
    Ok(map_text(value, |s| re.replace_all(s, replacement).into_owned()))
}

fn pad(f: &Builtin, value: &CellValue, args: &[String], start: bool) -> FilterResult<CellValue> {
    let width = f.usize_arg(args, 0, 0, MAX_PAD_WIDTH)?;
    let fill = f.char_arg(args, 1, if start { '0' } else { ' ' })?;
    Ok(map_text(value, |s| {
        let len = s.chars().count();
        if len >= width {
            return s.to_string();
        }
        let padding: String = std::iter::repeat(fill).take(width - len).collect();
        if start {
            format!("{}{}", padding, s)
        } else {
            format!("{}{}", s, padding)
        }
    }))
}

fn substring(f: &Builtin, value: &CellValue, args: &[String]) -> FilterResult<CellValue> {
    let start = f.usize_arg(args, 0, 0, usize::MAX)?;
    let len = args.get(1).map(|_| f.usize_arg(args, 1, 0, usize::MAX)).transpose()?;
    Ok(map_text(value, |s| {
        let chars = s.chars().skip(start);
        match len {
            Some(n) => chars.take(n).collect(),
            None => chars.collect(),
        }
    }))
}

fn join(_f: &Builtin, value: &CellValue, args: &[String]) -> FilterResult<CellValue> {
    let separator = args.first().map(String::as_str).unwrap_or(", ");
    Ok(match value {
        CellValue::List(items) => CellValue::String(
            items
                .iter()
                .filter(|v| !v.is_empty())
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(separator),
        ),
        other => other.clone(),
    })
}

/// First/last item of a list, or of a comma-separated string.
fn pick(value: &CellValue, first: bool) -> CellValue {
    match value {
        CellValue::List(items) => {
            let item = if first { items.first() } else { items.last() };
            item.cloned().unwrap_or_default()
        }
        CellValue::String(s) if s.contains(',') => {
            let mut parts = s.split(',').map(str::trim);
            let part = if first { parts.next() } else { parts.last() };
            part.map(CellValue::from).unwrap_or_default()
        }
        other => other.clone(),
    }
}
