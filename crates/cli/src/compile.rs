//! `watchpost compile`: show how a search filter lowers to storage.

use std::io::{Read, Write};

use anyhow::{Context, Result};
use serde::Serialize;
use watchpost_rules::compiler::postgres::{self, SqlFilter};
use watchpost_rules::compiler::{CompiledFilter, QueryCompiler};
use watchpost_rules::schema::DynamicFilter;

use crate::cli::CompileArgs;

#[derive(Debug, Serialize)]
struct CompileReport {
    #[serde(flatten)]
    compiled: CompiledFilter,
    postgres: SqlFilter,
}

fn read_filter(args: &CompileArgs) -> Result<String> {
    if args.filter.as_os_str() == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("failed to read filter from stdin")?;
        Ok(raw)
    } else {
        std::fs::read_to_string(&args.filter)
            .with_context(|| format!("failed to read filter from {}", args.filter.display()))
    }
}

pub fn run(args: &CompileArgs, out: &mut impl Write) -> Result<CompiledFilter> {
    let filter = DynamicFilter::from_json(&read_filter(args)?).context("invalid filter JSON")?;

    let mut compiler = QueryCompiler::default();
    if args.no_regex {
        compiler = compiler.without_regex();
    }
    let compiled = compiler.compile_filter(&filter).context("invalid filter")?;

    let report = CompileReport {
        postgres: postgres::render_filter(&compiled),
        compiled,
    };
    writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
    Ok(report.compiled)
}
