use std::fs;

use anyhow::{Context, Result, bail};
use frankenengine_adapter::config::AdapterConfig;
use frankenengine_adapter::diagnostics::{InteractionScript, render_summary, replay_script};
use frankenengine_adapter::error::AdapterError;

fn main() {
    if let Err(error) = run(std::env::args().skip(1).collect()) {
        eprintln!("{error:#}");
        std::process::exit(2);
    }
}

fn run(args: Vec<String>) -> Result<()> {
    if args.is_empty() {
        bail!(usage());
    }

    match args[0].as_str() {
        "replay" => run_replay(&args[1..]),
        "help" | "--help" | "-h" => {
            println!("{}", usage());
            Ok(())
        }
        other => bail!("unknown subcommand '{other}'\n\n{}", usage()),
    }
}

fn usage() -> String {
    [
        "adapter_diagnostics usage:",
        "  adapter_diagnostics replay --input <script.json> [--config <config.json>]",
        "      [--summary | --journal-jsonl]",
    ]
    .join("\n")
}

#[derive(Default)]
struct ReplayArgs<'a> {
    input: Option<&'a str>,
    config: Option<&'a str>,
    summary: bool,
    journal_jsonl: bool,
}

fn parse_replay_args(args: &[String]) -> Result<ReplayArgs<'_>> {
    let mut parsed = ReplayArgs::default();
    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "--input" => {
                index += 1;
                let value = args.get(index).context("--input requires a path")?;
                parsed.input = Some(value);
            }
            "--config" => {
                index += 1;
                let value = args.get(index).context("--config requires a path")?;
                parsed.config = Some(value);
            }
            "--summary" => parsed.summary = true,
            "--journal-jsonl" => parsed.journal_jsonl = true,
            flag => bail!("unknown flag for replay: {flag}"),
        }
        index += 1;
    }
    if parsed.summary && parsed.journal_jsonl {
        bail!("--summary and --journal-jsonl are mutually exclusive");
    }
    Ok(parsed)
}

fn run_replay(args: &[String]) -> Result<()> {
    let parsed = parse_replay_args(args)?;
    let input = parsed.input.context("missing required --input <path>")?;

    let script = InteractionScript::from_json(&read_file(input)?)
        .with_context(|| format!("failed to parse script '{input}'"))?;
    let config = match parsed.config {
        Some(path) => AdapterConfig::from_json(&read_file(path)?)
            .with_context(|| format!("failed to load config '{path}'"))?,
        None => AdapterConfig::default(),
    };

    let report = replay_script(config, &script).map_err(with_code)?;

    if parsed.summary {
        println!("{}", render_summary(&report));
    } else if parsed.journal_jsonl {
        for event in &report.journal {
            println!(
                "{}",
                serde_json::to_string(event).context("failed to encode journal event")?
            );
        }
    } else {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to encode diagnostics report")?
        );
    }

    Ok(())
}

fn with_code(error: AdapterError) -> anyhow::Error {
    let code = error.stable_code();
    anyhow::Error::new(error).context(format!("replay failed [{code}]"))
}

fn read_file(path: &str) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read file '{path}'"))
}
