use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::Result;

use crate::config::WardenConfig;

/// Interactive configuration wizard. With `accept_defaults` every prompt
/// is skipped and the default configuration is written as-is.
pub fn run(config_path: &Path, accept_defaults: bool) -> Result<()> {
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut output = std::io::stdout();
    let config = build_config(&mut input, &mut output, accept_defaults)?;
    config.save(config_path)?;
    writeln!(output, "wrote {}", config_path.display())?;
    Ok(())
}

fn build_config<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    accept_defaults: bool,
) -> Result<WardenConfig> {
    let mut config = WardenConfig::default();
    if accept_defaults {
        return Ok(config);
    }

    writeln!(output, "warden configuration wizard (enter keeps the default)")?;
    config.data_dir = prompt(input, output, "data directory", &config.data_dir)?;
    config.manager.max_delegation_depth = prompt_parsed(
        input,
        output,
        "max delegation depth",
        config.manager.max_delegation_depth,
    )?;
    config.firebreak.high_value_limit = prompt_parsed(
        input,
        output,
        "high-value firebreak limit",
        config.firebreak.high_value_limit,
    )?;
    config.security.abuse.max_contracts_per_hour = prompt_parsed(
        input,
        output,
        "max contracts per delegator per hour",
        config.security.abuse.max_contracts_per_hour,
    )?;
    config.mcp.health_check_interval_secs = prompt_parsed(
        input,
        output,
        "tool-server health check interval (seconds)",
        config.mcp.health_check_interval_secs,
    )?;
    Ok(config)
}

fn prompt<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    label: &str,
    default: &str,
) -> Result<String> {
    write!(output, "{label} [{default}]: ")?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    let trimmed = line.trim();
    Ok(if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    })
}

fn prompt_parsed<R: BufRead, W: Write, T: std::str::FromStr + std::fmt::Display + Copy>(
    input: &mut R,
    output: &mut W,
    label: &str,
    default: T,
) -> Result<T> {
    loop {
        let answer = prompt(input, output, label, &default.to_string())?;
        match answer.parse() {
            Ok(value) => return Ok(value),
            Err(_) => writeln!(output, "could not parse '{answer}', try again")?,
        }
    }
}
