//! Per-symbol commands: fundamentals, history, indicators, news, predict and analyze

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use log::debug;

use crate::cli::{CommandContext, GlobalOptions, OutputFormat};
use crate::error::{ConfigError, Result};
use crate::market::{HISTORY_RANGES, is_valid_range};
use crate::output::{self, pretty};

pub async fn fundamentals(opts: &GlobalOptions, symbol: &str) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let data = ctx.service.fundamentals(symbol).await?;
    output::emit_cached(ctx.format, &data, pretty::fundamentals)
}

fn check_range(range: &str) -> Result<()> {
    if !is_valid_range(range) {
        return Err(ConfigError::Invalid(format!(
            "unsupported range '{}', expected one of: {}",
            range,
            HISTORY_RANGES.join(", ")
        ))
        .into());
    }
    Ok(())
}

pub async fn history(
    opts: &GlobalOptions,
    symbol: &str,
    range: &str,
    limit: Option<usize>,
) -> Result<()> {
    check_range(range)?;

    let ctx = CommandContext::new(opts)?;
    let mut data = ctx.service.history(symbol, range).await?;
    debug!("{} bars for {}", data.value.bars.len(), data.value.symbol);
    if let Some(n) = limit {
        data.value.keep_latest(n);
    }

    output::emit_cached(ctx.format, &data, pretty::history)
}

pub async fn indicators(opts: &GlobalOptions, symbol: &str, range: &str) -> Result<()> {
    check_range(range)?;

    let ctx = CommandContext::new(opts)?;
    let data = ctx.service.indicators(symbol, range).await?;
    output::emit_cached(ctx.format, &data, |cached| {
        let mut text = pretty::indicators(&cached.value);
        text.push('\n');
        text.push_str(&pretty::provenance_line(cached.provenance, cached.stored_at));
        text
    })
}

pub async fn news(opts: &GlobalOptions, symbol: &str, limit: usize) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    if ctx.config.news_api_key.is_none() {
        return Err(ConfigError::MissingApiKey.into());
    }
    let report = ctx.service.company_news(symbol, limit).await?;
    output::emit(ctx.format, &report, pretty::news)
}

pub async fn predict(opts: &GlobalOptions, symbol: &str) -> Result<()> {
    let ctx = CommandContext::new(opts)?;

    let spinner = spinner(ctx.format, format!("Training forecast model for {}...", symbol));
    let result = ctx.service.predict(symbol).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let forecast = result?;
    output::emit(ctx.format, forecast.as_ref(), pretty::forecast)
}

pub async fn analyze(opts: &GlobalOptions, symbol: &str, limit: usize) -> Result<()> {
    let ctx = CommandContext::new(opts)?;

    let spinner = spinner(ctx.format, format!("Analyzing {}...", symbol));
    let result = ctx.service.analyze(symbol, limit).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let analysis = result?;
    output::emit(ctx.format, &analysis, pretty::analysis)
}

/// Spinner on stderr while the model trains; pretty mode only
pub(crate) fn spinner(format: OutputFormat, message: String) -> Option<ProgressBar> {
    if format.is_json() {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}
