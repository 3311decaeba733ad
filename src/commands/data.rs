//! Data export/import and the JSON formatting tools

use anyhow::{bail, Context, Result};
use std::path::Path;

use super::{read_input, OutputFormat, Workspace};
use crate::config::{load_config, AppPaths};
use crate::format::{escape_string, unescape_string, JsonFormatter};
use crate::fsutil::format_file_size;
use crate::transfer::{self, TransferScope};

pub fn export(paths: &AppPaths, output: Option<&Path>, scope: &str) -> Result<()> {
    let ws = Workspace::open(paths)?;
    let scope: TransferScope = scope.parse().map_err(anyhow::Error::msg)?;
    let path = match output {
        Some(path) => path.to_path_buf(),
        None => ws.paths.exports.join(format!(
            "api-tester-{}-{}.json",
            scope,
            chrono::Local::now().format("%Y%m%d-%H%M%S")
        )),
    };
    transfer::export_data(&ws.db, &path, scope)?;
    println!("✓ Exported {} to {}", scope, path.display());
    Ok(())
}

pub fn import(paths: &AppPaths, input: &Path, replace: bool) -> Result<()> {
    let ws = Workspace::open(paths)?;
    let summary = transfer::import_data(&ws.db, input, !replace)?;

    println!("✓ Imported {}", input.display());
    if let Some(count) = summary.history {
        println!("  History:      {} entries", count);
    }
    if let Some(count) = summary.environments {
        println!("  Environments: {}", count);
    }
    if let Some(count) = summary.collections {
        println!("  Collections:  {}", count);
    }
    if summary.skipped > 0 {
        println!("  Skipped {} invalid entries", summary.skipped);
    }
    Ok(())
}

/// Operations of the `format` command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatOp {
    Prettify,
    Minify,
    Validate,
    Stats,
    Flatten,
    Extract,
    Escape,
    Unescape,
}

impl std::str::FromStr for FormatOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "prettify" | "pretty" => Ok(FormatOp::Prettify),
            "minify" | "min" => Ok(FormatOp::Minify),
            "validate" => Ok(FormatOp::Validate),
            "stats" => Ok(FormatOp::Stats),
            "flatten" => Ok(FormatOp::Flatten),
            "extract" => Ok(FormatOp::Extract),
            "escape" => Ok(FormatOp::Escape),
            "unescape" => Ok(FormatOp::Unescape),
            _ => Err(format!(
                "Invalid operation: {}. Use: prettify, minify, validate, stats, flatten, extract, escape, unescape",
                s
            )),
        }
    }
}

/// Formatter honoring the editor settings when api-tester is initialized
fn formatter(paths: &AppPaths, indent: Option<usize>, sort_keys: bool) -> JsonFormatter {
    let editor = if paths.is_initialized() {
        load_config(paths).map(|c| c.editor).unwrap_or_default()
    } else {
        Default::default()
    };
    JsonFormatter::new(indent.unwrap_or(editor.indent), sort_keys || editor.sort_keys)
}

pub fn format(
    paths: &AppPaths,
    input: Option<&Path>,
    op: &str,
    indent: Option<usize>,
    sort_keys: bool,
    format: OutputFormat,
) -> Result<()> {
    let op: FormatOp = op.parse().map_err(anyhow::Error::msg)?;
    let formatter = formatter(paths, indent, sort_keys);
    let text = read_input(input)?;

    match op {
        FormatOp::Prettify => println!("{}", formatter.prettify(&text)?),
        FormatOp::Minify => println!("{}", formatter.minify(&text)?),
        FormatOp::Validate => match formatter.validate(&text) {
            Ok(()) => println!("✓ Valid JSON"),
            Err(error) => bail!("Invalid JSON: {}", error),
        },
        FormatOp::Stats => {
            let stats = formatter.stats(&text);
            if let OutputFormat::Json = format {
                println!("{}", serde_json::to_string_pretty(&stats)?);
                return Ok(());
            }
            if let Some(error) = &stats.error {
                bail!("Invalid JSON: {}", error);
            }
            println!("JSON Statistics");
            println!("{}", "=".repeat(50));
            println!("Size:           {}", format_file_size(stats.size_bytes as u64));
            println!("Formatted:      {}", format_file_size(stats.size_formatted as u64));
            println!("Minified:       {}", format_file_size(stats.size_minified as u64));
            println!("Max depth:      {}", stats.max_depth);
            println!("Objects:        {}", stats.objects);
            println!("Arrays:         {}", stats.arrays);
            println!("Keys:           {}", stats.total_keys);
            println!("Strings:        {}", stats.strings);
            println!("Numbers:        {}", stats.numbers);
            println!("Booleans:       {}", stats.booleans);
            println!("Nulls:          {}", stats.nulls);
        }
        FormatOp::Flatten => {
            formatter.validate(&text).map_err(|e| anyhow::anyhow!("Invalid JSON: {}", e))?;
            let flat = formatter.flatten(&text, ".");
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&flat)?),
                OutputFormat::Summary => {
                    for (key, value) in &flat {
                        println!("{} = {}", key, value);
                    }
                }
            }
        }
        FormatOp::Extract => {
            let json = formatter
                .extract_json_from_text(&text)
                .context("No JSON found in input")?;
            println!("{}", formatter.safe_format(&json, None));
        }
        FormatOp::Escape => println!("{}", escape_string(text.trim_end_matches('\n'))),
        FormatOp::Unescape => println!("{}", unescape_string(text.trim_end_matches('\n'))),
    }
    Ok(())
}

/// Compare two JSON documents
pub fn compare(paths: &AppPaths, left: &Path, right: &Path, format: OutputFormat) -> Result<()> {
    let formatter = formatter(paths, None, false);
    let left_text = read_input(Some(left))?;
    let right_text = read_input(Some(right))?;
    let comparison = formatter.compare(&left_text, &right_text);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&comparison)?),
        OutputFormat::Summary => {
            if !comparison.both_valid {
                for (path, stats) in [(left, &comparison.left), (right, &comparison.right)] {
                    if let Some(error) = &stats.error {
                        println!("{}: invalid JSON ({})", path.display(), error);
                    }
                }
                bail!("Both inputs must be valid JSON");
            }
            if comparison.are_equal {
                println!("✓ Documents are equal");
            } else {
                println!("Documents differ");
            }
            println!("Size difference:  {:+} bytes", comparison.size_difference);
            println!("Depth difference: {:+}", comparison.depth_difference);
        }
    }
    Ok(())
}
