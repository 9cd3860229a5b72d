use std::borrow::Cow;
use std::fmt;

fn escape_single_quotes(input: &str) -> Cow<'_, str> {
    if input.contains('\'') {
        Cow::Owned(input.replace('\'', "\\'"))
    } else {
        Cow::Borrowed(input)
    }
}

fn format_stage_error(
    stage: &str,
    subject: Option<&str>,
    detail: impl fmt::Display,
) -> String {
    match subject {
        Some(subject) => {
            let escaped = escape_single_quotes(subject);
            format!("{stage}('{}'): {detail}", escaped)
        }
        None => format!("{stage}: {detail}"),
    }
}

/// Message for a call site whose argument count falls outside the declared range.
pub fn arity_error(function: &str, expected: impl fmt::Display, found: usize) -> String {
    let noun = if found == 1 { "argument" } else { "arguments" };
    format_stage_error(
        "check",
        Some(function),
        format!("expected {expected}, found {found} {noun}"),
    )
}

pub fn argument_type_error(
    function: &str,
    index: usize,
    expected: impl fmt::Display,
    found: impl fmt::Display,
) -> String {
    format_stage_error(
        "check",
        Some(function),
        format!("argument {} expects {expected}, found {found}", index + 1),
    )
}

pub fn check_error(subject: &str, detail: impl fmt::Display) -> String {
    format_stage_error("check", Some(subject), detail)
}

pub fn emit_error(subject: &str, detail: impl fmt::Display) -> String {
    format_stage_error("emit", Some(subject), detail)
}

pub fn variable_error(name: &str, detail: impl fmt::Display) -> String {
    format_stage_error("variable", Some(name), detail)
}
