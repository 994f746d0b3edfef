//! Filter command

use crate::app::{FilterArgs, OutputFormat};
use anyhow::Result;
use pia_core::filter::{compose, parse, validate, FacetSet};
use pia_core::{Config, PiaError, ToolRegistry};
use serde_json::json;

pub fn run(args: FilterArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let tree = match parse(&args.expression) {
        Ok(tree) => tree,
        Err(e) => {
            if format == OutputFormat::Cli {
                eprintln!("  {}", args.expression);
                eprintln!("  {}^", " ".repeat(caret_column(&args.expression, e.offset)));
            }
            return Err(PiaError::from(e).into());
        }
    };

    let warnings = match &tree {
        Some(tree) => validate(tree, Some(&FacetSet::pia_default())),
        None => Vec::new(),
    };
    if config.strict_fields {
        if let Some(unknown) = warnings.iter().find(|w| w.is_unknown_field()) {
            return Err(PiaError::validation(unknown.to_string()).into());
        }
    }

    let sent = match &args.tool {
        Some(name) => {
            let registry = ToolRegistry::pia()?;
            let spec = registry.lookup(name)?;
            Some(compose(tree.clone(), spec.preset.clone()))
        }
        None => None,
    };

    let canonical = tree.as_ref().map(|t| t.to_string());
    let fields: Vec<&str> = tree.as_ref().map(|t| t.fields()).unwrap_or_default();

    match format {
        OutputFormat::Json => {
            let output = json!({
                "canonical": canonical,
                "fields": fields,
                "warnings": warnings,
                "sent": sent.as_ref().map(|s| s.as_ref().map(|t| t.to_string())),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Cli => {
            match &canonical {
                Some(text) => println!("Filter:   {}", text),
                None => println!("Filter:   (none)"),
            }
            if !fields.is_empty() {
                println!("Fields:   {}", fields.join(", "));
            }
            if let Some(sent) = &sent {
                match sent {
                    Some(tree) => println!("Sent as:  {}", tree),
                    None => println!("Sent as:  (no filter)"),
                }
            }
            for warning in &warnings {
                println!("Warning:  {}", warning);
            }
        }
    }
    Ok(())
}

/// Display column of a byte offset
fn caret_column(text: &str, offset: usize) -> usize {
    let end = offset.min(text.len());
    text.char_indices().take_while(|(i, _)| *i < end).count()
}
