//! Market overview command

use crate::cli::{CommandContext, GlobalOptions};
use crate::error::Result;
use crate::output::{self, pretty};

/// Index quotes and, when a NewsAPI key is configured, market news
pub async fn run(opts: &GlobalOptions, limit: usize) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let summary = ctx.service.market_summary(limit).await?;
    output::emit(ctx.format, &summary, pretty::market)
}
