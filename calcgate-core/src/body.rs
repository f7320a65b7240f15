//! Parser for the calculation request body.
//!
//! Worker clusters expect a text body in which the input file and callback
//! address appear as `input=<fileKey>` and `callback=<url>` fields, each on
//! its own line (`\r\n` or `\n` terminated, or running to the end of the
//! body). Everything else in the body is passed through byte for byte.

use crate::{GateError, Result};
use std::ops::Range;

const INPUT_FIELD: &str = "input=";
const CALLBACK_FIELD: &str = "callback=";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalculationBody {
    raw: String,
    input: Range<usize>,
    callback: Range<usize>,
}

impl CalculationBody {
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();

        let mut input = None;
        let mut callback = None;

        let mut line_start = 0;
        for line in raw.split_inclusive('\n') {
            let content = line.trim_end_matches(['\n', '\r']);
            let indent = content.len() - content.trim_start().len();
            let field = &content[indent..];
            let field_start = line_start + indent;

            if input.is_none() {
                input = field_value(field, field_start, INPUT_FIELD);
            }
            if callback.is_none() {
                callback = field_value(field, field_start, CALLBACK_FIELD);
            }

            line_start += line.len();
        }

        match (input, callback) {
            (Some(input), Some(callback)) => Ok(Self {
                raw,
                input,
                callback,
            }),
            _ => Err(GateError::MalformedRequest(
                "Invalid request body format".to_string(),
            )),
        }
    }

    pub fn input_file(&self) -> &str {
        &self.raw[self.input.clone()]
    }

    pub fn callback_url(&self) -> &str {
        &self.raw[self.callback.clone()]
    }

    /// The body with only the callback field's value replaced.
    pub fn with_callback(&self, callback_url: &str) -> String {
        let mut rewritten = String::with_capacity(self.raw.len() + callback_url.len());
        rewritten.push_str(&self.raw[..self.callback.start]);
        rewritten.push_str(callback_url);
        rewritten.push_str(&self.raw[self.callback.end..]);
        rewritten
    }
}

/// Byte range of the value when `field` starts with `name`; empty values do not count.
fn field_value(field: &str, field_start: usize, name: &str) -> Option<Range<usize>> {
    let value = field.strip_prefix(name)?.trim_end();
    if value.is_empty() {
        return None;
    }

    let start = field_start + name.len();
    Some(start..start + value.len())
}
