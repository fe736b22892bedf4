use super::CliContext;
use crate::errors::CliError;
use crate::println_pad;
use colored::Colorize;
use kcs_patcher::{prepatch, PrepatchOptions};
use miette::Result;
use std::io::Write;

pub struct PrepatchCacheArgs {
    /// Overrides `prepatch_concurrency` from the configuration.
    pub concurrency: Option<usize>,
}

pub fn prepatch_cache(ctx: &CliContext, args: PrepatchCacheArgs) -> Result<()> {
    if !ctx.modder_enabled() {
        return Ok(());
    }

    let response_cache = ctx.response_cache()?;
    let patcher = ctx.open_patcher()?;

    let options = PrepatchOptions::new()
        .with_concurrency(args.concurrency.unwrap_or(ctx.config.prepatch_concurrency))
        .with_progress(|progress| {
            eprint!(
                "\r    {}/{} {}\x1b[K",
                progress.current, progress.total, progress.key
            );
            let _ = std::io::stderr().flush();
        });

    let summary = prepatch(&patcher, &response_cache, &options).map_err(CliError::from)?;
    eprintln!();

    println_pad!(
        "{} {} images in {:.1}s",
        "✓ Prepatched".bright_green().bold(),
        summary.total.to_string().bright_white().bold(),
        summary.elapsed.as_secs_f64()
    );
    println_pad!(
        "   {} {}",
        "patched:".bright_white(),
        summary.patched.to_string().bright_green()
    );
    println_pad!("   {} {}", "unchanged:".bright_white(), summary.unchanged);
    if summary.failed > 0 {
        println_pad!(
            "   {} {}",
            "failed:".bright_white(),
            summary.failed.to_string().bright_red()
        );
    }

    Ok(())
}
