use super::CliContext;
use crate::errors::CliError;
use crate::println_pad;
use crate::utils::format_size;
use camino::Utf8PathBuf;
use colored::Colorize;
use kcs_patcher::{PatchOutcome, ResponseCache};
use miette::{IntoDiagnostic, Result};

pub struct PatchAssetArgs {
    pub key: String,
    pub output: Option<String>,
}

pub fn patch_asset(ctx: &CliContext, args: PatchAssetArgs) -> Result<()> {
    if !ctx.modder_enabled() {
        return Ok(());
    }

    let response_cache = ctx.response_cache()?;
    let asset = response_cache
        .asset(&args.key)
        .ok_or_else(|| CliError::asset_not_cached(&args.key))?;
    let stored_file = response_cache.location(&asset.key);
    let content = std::fs::read(stored_file.as_std_path()).map_err(CliError::from)?;

    let patcher = ctx.open_patcher()?;
    let outcome = patcher
        .patch_asset(&asset.key, Some(content), &stored_file, &asset.meta)
        .map_err(CliError::from)?;

    let status = match &outcome {
        PatchOutcome::Patched(_) => "patched".bright_green().bold(),
        PatchOutcome::Unchanged(_) => "unchanged".bright_yellow().bold(),
        PatchOutcome::NoOverrides(_) => "no overrides".dimmed(),
    };
    println_pad!(
        "{} {} {} ({})",
        "🎨".bright_blue(),
        asset.key.bright_cyan(),
        status,
        format_size(outcome.bytes().len())
    );

    if let Some(output) = args.output {
        let output = Utf8PathBuf::from(output);
        std::fs::write(output.as_std_path(), outcome.bytes()).into_diagnostic()?;
        println_pad!("{} {}", "Written to".bright_white(), output.as_str().bright_green());
    }

    Ok(())
}
