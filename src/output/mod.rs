//! Output formatting for CLI results

use serde::Serialize;

use crate::cache::Cached;
use crate::cli::OutputFormat;
use crate::error::Result;

pub mod json;
pub mod pretty;
pub mod rows;
pub mod table;

/// Print `data` as a JSON envelope, or through `render` in pretty mode
pub fn emit<T: Serialize + ?Sized>(
    format: OutputFormat,
    data: &T,
    render: impl FnOnce(&T) -> String,
) -> Result<()> {
    let output = match format {
        OutputFormat::Json => json::format_json(data)?,
        OutputFormat::Pretty => render(data),
    };
    println!("{}", output);
    Ok(())
}

/// Like [`emit`], moving cache provenance into the JSON metadata
pub fn emit_cached<T: Serialize>(
    format: OutputFormat,
    cached: &Cached<T>,
    render: impl FnOnce(&Cached<T>) -> String,
) -> Result<()> {
    let output = match format {
        OutputFormat::Json => json::format_cached(cached)?,
        OutputFormat::Pretty => render(cached),
    };
    println!("{}", output);
    Ok(())
}
