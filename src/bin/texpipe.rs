//! Command-line interface for texpipe
//! Scans one document and runs it through the passes named on the command line.
//!
//! Usage:
//!   texpipe --file `<path>` [--pass `<name>`]... [--lua-directory `<dir>`]...
//!           [--plugin `<path>`]... [--config `<key=value>`]... [--config-file `<path>`]...
//!           [--print-after-all]
//!   texpipe --list-passes [--lua-directory `<dir>`]...

use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing_subscriber::EnvFilter;

use texpipe::texpipe::{
    read_file, ConfigStore, PassRegistry, Pipeline, PipelineContext, Severity, SourceManager,
};

/// Environment variable holding the log filter
const LOG_ENV: &str = "TEXPIPE_LOG";

fn main() -> ExitCode {
    let matches = cli().get_matches();
    init_tracing();

    match run(&matches) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn cli() -> Command {
    Command::new("texpipe")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Scan TeX-style markup and run it through a pipeline of passes")
        .arg(
            Arg::new("file")
                .long("file")
                .help("Document to process")
                .value_parser(existing_file)
                .required_unless_present("list-passes"),
        )
        .arg(
            Arg::new("pass")
                .long("pass")
                .help("Pass to run; repeat to run several, in order")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("lua-directory")
                .long("lua-directory")
                .help("Directory of *.lua script passes")
                .value_parser(existing_directory)
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("plugin")
                .long("plugin")
                .help("Native plugin library to load")
                .value_parser(existing_file)
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .help("Configuration option, key=value or a bare key for true")
                .value_parser(config_option)
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("config-file")
                .long("config-file")
                .help("TOML file of configuration options")
                .value_parser(existing_file)
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("print-after-all")
                .long("print-after-all")
                .help("Print the tree to stderr after every pass")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("list-passes")
                .long("list-passes")
                .help("List the available passes and exit")
                .action(ArgAction::SetTrue),
        )
}

fn existing_file(value: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(value);
    if path.is_file() {
        Ok(path)
    } else {
        Err(format!("{value} is not an existing file"))
    }
}

fn existing_directory(value: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(value);
    if path.is_dir() {
        Ok(path)
    } else {
        Err(format!("{value} is not an existing directory"))
    }
}

fn config_option(value: &str) -> Result<String, String> {
    let key = value.split_once('=').map_or(value, |(key, _)| key);
    if key.is_empty() {
        Err(format!("{value} has an empty key"))
    } else {
        Ok(value.to_string())
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn paths<'a>(matches: &'a ArgMatches, id: &str) -> impl Iterator<Item = &'a PathBuf> {
    matches.get_many::<PathBuf>(id).into_iter().flatten()
}

fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    let mut config = ConfigStore::new();
    for path in paths(matches, "config-file") {
        config.merge_file(path)?;
    }
    for option in matches.get_many::<String>("config").into_iter().flatten() {
        config.set_option(option)?;
    }

    let mut registry = PassRegistry::with_builtins();
    for dir in paths(matches, "lua-directory") {
        registry
            .register_script_directory(dir)
            .with_context(|| format!("cannot read script directory {}", dir.display()))?;
    }

    let mut ctx = PipelineContext::new(SourceManager::new(), config, registry);
    load_plugins(&mut ctx, matches)?;

    if matches.get_flag("list-passes") {
        for name in ctx.registry.list_passes() {
            println!("{name}");
        }
        return Ok(());
    }

    let file = matches
        .get_one::<PathBuf>("file")
        .context("--file is required")?;
    let ctx = Rc::new(ctx);
    let tree = read_file(&ctx.sources, file)
        .with_context(|| format!("cannot parse {}", file.display()))?;

    let passes: Vec<&String> = matches
        .get_many::<String>("pass")
        .into_iter()
        .flatten()
        .collect();
    Pipeline::new(Rc::clone(&ctx))
        .print_after_all(matches.get_flag("print-after-all"))
        .run(tree, &passes)
        // Lua errors are not `Send`, so only the message crosses into anyhow.
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    let warnings = ctx.sources.diagnostic_count(Severity::Warning);
    let errors = ctx.sources.diagnostic_count(Severity::Error);
    if warnings + errors > 0 {
        tracing::warn!(warnings, errors, "finished with diagnostics");
    }
    Ok(())
}

#[cfg(feature = "plugins")]
fn load_plugins(ctx: &mut PipelineContext, matches: &ArgMatches) -> anyhow::Result<()> {
    for path in paths(matches, "plugin") {
        texpipe::texpipe::plugin::load_plugin(ctx, path)?;
    }
    Ok(())
}

#[cfg(not(feature = "plugins"))]
fn load_plugins(_ctx: &mut PipelineContext, matches: &ArgMatches) -> anyhow::Result<()> {
    if let Some(path) = paths(matches, "plugin").next() {
        anyhow::bail!("cannot load {}: built without plugin support", path.display());
    }
    Ok(())
}
