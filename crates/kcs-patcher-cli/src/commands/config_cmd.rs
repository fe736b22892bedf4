use super::CliContext;
use crate::errors::CliError;
use crate::utils::config::{self, AppConfig};
use camino::Utf8Path;
use colored::Colorize;
use miette::Result;

/// Print a config path entry with status indicator
fn print_path_config(name: &str, path: Option<&Utf8Path>) {
    match path {
        Some(p) => {
            let status = if p.as_std_path().exists() {
                "✓".bright_green()
            } else {
                "✗".bright_red()
            };
            println!("  {} {} {}", format!("{}:", name).bright_white(), p, status);
        }
        None => {
            println!(
                "  {} {}",
                format!("{}:", name).bright_white(),
                "(not set)".bright_yellow()
            );
        }
    }
}

pub fn show_config(ctx: &CliContext) -> Result<()> {
    let cfg = &ctx.config;
    let file_status = if ctx.config_path.as_std_path().exists() {
        "".normal()
    } else {
        "(not found, using defaults)".bright_yellow()
    };

    println!();
    println!(
        "  {} {} {}",
        "config_file:".bright_white(),
        ctx.config_path,
        file_status
    );
    println!("  {} {}", "enable_modder:".bright_white(), cfg.enable_modder);
    print_path_config("cache_dir", cfg.cache_dir.as_deref());
    print_path_config("patched_cache_dir", cfg.patched_cache_dir().as_deref());
    println!(
        "  {} {}",
        "prepatch_concurrency:".bright_white(),
        cfg.prepatch_concurrency
    );

    println!("  {}", "mods:".bright_white());
    if cfg.mods.is_empty() {
        println!("    {}", "(none)".bright_yellow());
    }
    for descriptor in &cfg.mods {
        let status = if descriptor.descriptor_path.as_std_path().is_file() {
            "✓".bright_green()
        } else {
            "✗".bright_red()
        };
        let label = match (&descriptor.name, &descriptor.version) {
            (Some(name), Some(version)) => format!(" ({name} {version})"),
            (Some(name), None) => format!(" ({name})"),
            _ => String::new(),
        };
        println!(
            "    {} {}{} {}",
            "•".bright_cyan(),
            descriptor.descriptor_path,
            label.dimmed(),
            status
        );
    }

    println!();
    Ok(())
}

pub fn init_config(ctx: &CliContext) -> Result<()> {
    if ctx.config_path.as_std_path().exists() {
        return Err(CliError::config_exists(ctx.config_path.clone()).into());
    }

    config::save_config(&ctx.config_path, &AppConfig::default())
        .map_err(|e| miette::miette!("Failed to write config: {}", e))?;

    println!("{}", "✓ Configuration created".bright_green().bold());
    println!();
    println!("  {} {}", "Config file:".bright_white().bold(), ctx.config_path);
    println!();
    println!(
        "  {}",
        "Set cache_dir and add [[mods]] entries to start patching".bright_cyan()
    );

    Ok(())
}
