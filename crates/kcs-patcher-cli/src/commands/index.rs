use super::CliContext;
use crate::println_pad;
use colored::Colorize;
use miette::Result;

pub struct ShowIndexArgs {
    /// Only list targets whose key starts with this prefix.
    pub filter: Option<String>,
}

pub fn show_index(ctx: &CliContext, args: ShowIndexArgs) -> Result<()> {
    if !ctx.modder_enabled() {
        return Ok(());
    }

    let patcher = ctx.open_patcher()?;
    let index = patcher.index();

    let keys: Vec<&str> = index
        .keys()
        .into_iter()
        .filter(|key| {
            args.filter
                .as_deref()
                .map_or(true, |prefix| key.starts_with(prefix))
        })
        .collect();

    if keys.is_empty() {
        println_pad!("\n{}", "No overrides indexed".bright_yellow());
        return Ok(());
    }

    println_pad!("\n{}", "🗂️  Targets:".bright_magenta().bold());
    for key in keys {
        let Some(set) = index.get(key) else {
            continue;
        };
        println_pad!("   {}", key.bright_cyan().bold());

        for (original, patched) in set.pairs() {
            match patched {
                Some(_) => println_pad!("     {} {}", "•".bright_green(), original.name),
                None => println_pad!(
                    "     {} {} {}",
                    "✗".bright_red(),
                    original.name.bright_red(),
                    "(missing patched)".dimmed()
                ),
            }
        }
        for name in set.unmatched_patched() {
            println_pad!(
                "     {} {} {}",
                "?".bright_yellow(),
                name.bright_yellow(),
                "(no original)".dimmed()
            );
        }
    }

    Ok(())
}
