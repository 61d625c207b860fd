use std::fmt;
use std::io::{self, Write};

use termcolor::{Buffer, Color, ColorSpec, WriteColor};
use thiserror::Error;

use crate::{object::ErrorObject, options::Options};

/// A syntax error recorded while parsing. Parsing keeps going after one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }

    pub fn render(&self, file: &str, options: &Options) -> String {
        format_error(&self.message, Some((self.line, self.column)), file, options)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}:{}", self.message, self.line, self.column)
    }
}

/// Failures of the host around the interpreter: reading scripts, rejecting
/// a program with syntax errors, or a script ending in a runtime error.
#[derive(Debug, Error)]
pub enum LangError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("{} parse error(s), first: {}", .0.len(), first_message(.0))]
    Parse(Vec<ParseError>),
    #[error("Runtime error: {0}")]
    Runtime(ErrorObject),
}

pub type LangResult<T> = Result<T, LangError>;

fn first_message(errors: &[ParseError]) -> String {
    errors
        .first()
        .map(ToString::to_string)
        .unwrap_or_default()
}

/// Renders an error for display:
/// `[Error] <message> (<file> <line>:<column>)`.
///
/// The `[Error] ` prefix is emitted only with `stderr_prefix`, ANSI colours only
/// with `stderr_color`. The function has no side effects; printing is left to
/// the caller.
pub fn format_error(
    message: &str,
    position: Option<(usize, usize)>,
    file: &str,
    options: &Options,
) -> String {
    let location = match position {
        Some((line, column)) => format!("{}:{}", line, column),
        None => String::new(),
    };

    if options.stderr_color {
        let mut buffer = Buffer::ansi();
        if paint(&mut buffer, message, file, &location, options.stderr_prefix).is_ok() {
            return String::from_utf8_lossy(buffer.as_slice()).into_owned();
        }
    }

    let prefix = if options.stderr_prefix { "[Error] " } else { "" };
    if location.is_empty() {
        format!("{}{} ({})", prefix, message, file)
    } else {
        format!("{}{} ({} {})", prefix, message, file, location)
    }
}

fn paint(
    out: &mut Buffer,
    message: &str,
    file: &str,
    location: &str,
    prefix: bool,
) -> io::Result<()> {
    if prefix {
        out.set_color(ColorSpec::new().set_bg(Some(Color::Red)))?;
        write!(out, "[Error]")?;
        out.reset()?;
        write!(out, " ")?;
    }
    out.set_color(ColorSpec::new().set_fg(Some(Color::Red)))?;
    write!(out, "{}", message)?;
    out.reset()?;
    write!(out, " ({}", file)?;
    if !location.is_empty() {
        write!(out, " ")?;
        out.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)))?;
        write!(out, "{}", location)?;
        out.reset()?;
    }
    write!(out, ")")
}
