//! Message formatting
//!
//! A [`LogFormat`] is compiled from a template once per setup call and then
//! shared by every output of that logger.

use std::fmt::Write;

use crate::error::LogError;
use crate::event::LogEvent;

/// Default line layout
pub const DEFAULT_FORMAT: &str =
    "{name}|{asctime}.{msecs}|{levelname}|{process}:{thread}|{filename}:{lineno}|{funcName}: {message}";

/// strftime layout for `{asctime}`; milliseconds come from `{msecs}`
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Name,
    AscTime,
    Msecs,
    LevelName,
    LevelNo,
    Process,
    Thread,
    ThreadName,
    Filename,
    Pathname,
    Lineno,
    FuncName,
    Message,
}

impl Field {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "name" => Field::Name,
            "asctime" => Field::AscTime,
            "msecs" => Field::Msecs,
            "levelname" => Field::LevelName,
            "levelno" => Field::LevelNo,
            "process" => Field::Process,
            "thread" => Field::Thread,
            "threadName" => Field::ThreadName,
            "filename" => Field::Filename,
            "pathname" => Field::Pathname,
            "lineno" => Field::Lineno,
            "funcName" => Field::FuncName,
            "message" => Field::Message,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// A compiled line template
///
/// Placeholders are written `{field}`; `{{` and `}}` produce literal braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFormat {
    template: String,
    segments: Vec<Segment>,
}

impl LogFormat {
    /// Compile a template, rejecting unknown fields and unbalanced braces
    pub fn parse(template: &str) -> Result<Self, LogError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => name.push(c),
                            None => {
                                return Err(LogError::config(format!(
                                    "unterminated placeholder in log format '{template}'"
                                )));
                            }
                        }
                    }
                    let field = Field::parse(&name).ok_or_else(|| {
                        LogError::config(format!("unknown log format field '{{{name}}}'"))
                    })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(field));
                }
                '}' => {
                    return Err(LogError::config(format!(
                        "unmatched '}}' in log format '{template}'"
                    )));
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            template: template.to_string(),
            segments,
        })
    }

    /// The template this format was compiled from
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Render an event as one line, followed by its exception text if any
    pub fn render(&self, event: &LogEvent) -> String {
        let mut out = String::with_capacity(128 + event.message().len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(field) => write_field(&mut out, *field, event),
            }
        }
        if let Some(exception) = event.exception() {
            out.push('\n');
            out.push_str(exception);
        }
        out
    }
}

impl Default for LogFormat {
    fn default() -> Self {
        // DEFAULT_FORMAT only names known fields
        Self::parse(DEFAULT_FORMAT).unwrap_or_else(|_| Self {
            template: String::new(),
            segments: vec![Segment::Field(Field::Message)],
        })
    }
}

fn write_field(out: &mut String, field: Field, event: &LogEvent) {
    // Writing into a String cannot fail
    let _ = match field {
        Field::Name => write!(out, "{}", event.logger_name()),
        Field::AscTime => write!(out, "{}", event.timestamp().format(DATETIME_FORMAT)),
        Field::Msecs => write!(out, "{:03}", event.timestamp().timestamp_subsec_millis()),
        Field::LevelName => write!(out, "{}", event.level()),
        Field::LevelNo => write!(out, "{}", event.level().value()),
        Field::Process => write!(out, "{}", event.process_id()),
        Field::Thread => write!(out, "{}", event.thread_id()),
        Field::ThreadName => write!(out, "{}", event.thread_name().unwrap_or("-")),
        Field::Filename => write!(out, "{}", event.location().filename()),
        Field::Pathname => write!(out, "{}", event.location().file),
        Field::Lineno => write!(out, "{}", event.location().line),
        Field::FuncName => write!(
            out,
            "{}",
            event.location().function.as_deref().unwrap_or("-")
        ),
        Field::Message => write!(out, "{}", event.message()),
    };
}
