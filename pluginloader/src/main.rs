//! Command-line front end for inspecting plugin scripts.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pluginloader::{Args as PluginArgs, BindingKind, LoaderConfig, OnlyIf, PluginLoader};
use regex::Regex;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing_subscriber::EnvFilter;

/// Load Lua plugin scripts and report what they define.
#[derive(Parser, Debug)]
#[command(name = "pluginloader")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Loader configuration file (JSON).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the plugins defined by one or more files.
    Inspect {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Keep every top-level binding, builtins included.
        #[arg(long, conflicts_with_all = ["none", "filter"])]
        all: bool,
        /// Keep nothing (the files are still executed).
        #[arg(long, conflicts_with = "filter")]
        none: bool,
        /// Keep classes whose name matches this regex.
        #[arg(long)]
        filter: Option<String>,
        /// Print a JSON array instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Construct a plugin and print the instance's type name.
    Construct {
        file: PathBuf,
        name: String,
        /// Positional arguments, parsed as JSON when possible.
        args: Vec<String>,
        /// Named argument as key=value.
        #[arg(long = "named", value_parser = parse_named)]
        named: Vec<(String, String)>,
    },
}

#[derive(Serialize)]
struct PluginSummary<'a> {
    name: &'a str,
    kind: BindingKind,
}

fn parse_named(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {:?}", s))?;
    if key.is_empty() {
        return Err(format!("missing argument name in {:?}", s));
    }
    Ok((key.to_string(), value.to_string()))
}

fn parse_value(raw: &str) -> JsonValue {
    serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.to_string()))
}

fn init_tracing(verbose: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "pluginloader=debug" } else { "pluginloader=info" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => LoaderConfig::from_file(path)?,
        None => LoaderConfig::default(),
    };
    let mut loader = PluginLoader::with_config(config)?;

    match cli.command {
        Command::Inspect {
            files,
            all,
            none,
            filter,
            json,
        } => {
            for file in &files {
                let only_if = if all {
                    OnlyIf::All
                } else if none {
                    OnlyIf::Nothing
                } else if let Some(pattern) = &filter {
                    OnlyIf::NameMatches(Regex::new(pattern).context("invalid --filter pattern")?)
                } else {
                    loader.config().only_if()?
                };
                loader
                    .load_file(file, only_if)
                    .with_context(|| format!("failed to load {}", file.display()))?;
            }

            let summaries: Vec<PluginSummary> = loader
                .names()
                .into_iter()
                .filter_map(|name| {
                    loader.get(name).map(|c| PluginSummary {
                        name,
                        kind: c.kind(),
                    })
                })
                .collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else {
                for summary in &summaries {
                    println!("{}\t{}", summary.name, summary.kind);
                }
            }
        }
        Command::Construct {
            file,
            name,
            args,
            named,
        } => {
            loader
                .load(&file)
                .with_context(|| format!("failed to load {}", file.display()))?;
            let mut plugin_args = PluginArgs::new();
            for raw in &args {
                plugin_args = plugin_args.arg(parse_value(raw));
            }
            for (key, raw) in &named {
                plugin_args = plugin_args.named(key.as_str(), parse_value(raw));
            }
            let instance = loader
                .construct(&name, plugin_args)
                .with_context(|| format!("failed to construct {}", name))?;
            println!("{}", instance.type_name());
        }
    }

    Ok(())
}
