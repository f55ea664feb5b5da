//! JSON line output for the CLI
//!
//! - One JSON object per line on stdout
//! - UTF-8 only

use std::io::{self, Write};

use serde_json::{json, Value};

use crate::model::FeedResponse;

use super::errors::CliResult;

/// Renders a page as `{"items", "continuation", "requestCharge"}`
pub fn page_json(page: &FeedResponse) -> Value {
    json!({
        "items": page.items,
        "continuation": page.continuation,
        "requestCharge": page.request_charge,
    })
}

pub fn write_page<W: Write>(out: &mut W, page: &FeedResponse) -> CliResult<()> {
    write_json(out, &page_json(page))
}

pub fn write_json<W: Write>(out: &mut W, value: &Value) -> CliResult<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

/// Write an error object to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    let response = json!({
        "status": "error",
        "code": code,
        "message": message,
    });
    write_json(&mut io::stdout(), &response)
}
