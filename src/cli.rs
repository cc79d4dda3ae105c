//! Command-line assembly, parsing, and pipeline launch.
//!
//! The command is built in layers: core arguments, then the generic
//! extensions' `pre_add_args` hooks, then every extension's contributed
//! arguments, then `post_add_args`. After parsing, extension arguments
//! are hydrated, generic `post_parse_args` hooks may rewrite the
//! invocation, and the pipeline is assembled and run.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};
use crate::extension::args::ExtensionArgs;
use crate::extension::{hooks, Family, Registry};
use crate::medium::{self, Medium};
use crate::scheduler::{Pipeline, PipelineConfig};
use crate::spec::{parse_producer_spec, ProducerSpec};

/// The effective configuration after parsing and post-parse hooks.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    /// Raw producer spec tokens.
    pub model_tokens: Vec<String>,
    /// Total records to emit; `None` = unlimited.
    pub number: Option<u64>,
    /// Global records-per-second cap.
    pub rate: Option<f64>,
    /// Records per batch.
    pub batch_size: u64,
    /// Writer-pool size.
    pub writers: usize,
    /// Format title.
    pub format: String,
    /// Whether the user picked the format explicitly.
    pub format_user_set: bool,
    /// Medium title; `None` = auto-select.
    pub medium: Option<String>,
    /// Global mapping URIs in command-line order.
    pub global_maps: Vec<String>,
    /// Wall-clock cap in seconds.
    pub duration: Option<Duration>,
    /// Progress report interval; `None` disables reports.
    pub progress: Option<Duration>,
    pub(crate) ext: BTreeMap<(Family, String), ExtensionArgs>,
}

impl Invocation {
    /// Hydrated arguments for one extension (empty if it has none).
    pub fn extension_args(&self, family: Family, title: &str) -> ExtensionArgs {
        self.ext
            .get(&(family, title.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn set_extension_args_for_test(
        &mut self,
        family: Family,
        title: &str,
        values: &[(&str, crate::extension::args::ArgValue)],
    ) {
        let mut args = ExtensionArgs::new();
        for (attr, value) in values {
            args.set(*attr, value.clone());
        }
        self.ext.insert((family, title.to_string()), args);
    }
}

fn base_command() -> Command {
    Command::new("avalon")
        .version(clap::crate_version!())
        .about("Real-time streaming test-data generator")
        .arg(
            Arg::new("models")
                .num_args(0..)
                .value_name("[I]model[W][{uri,..}]")
                .help(
                    "Producer specs: create I instances of the model, emitting the W \
                     ratio of the total output, with optional per-producer mapping \
                     URIs in braces (e.g. '10snort1000')",
                ),
        )
        .arg(
            Arg::new("number")
                .long("number")
                .value_name("<N>")
                .help("Total records to emit [default: unlimited]"),
        )
        .arg(
            Arg::new("rate")
                .long("rate")
                .value_name("<R>")
                .help("Cap global emission at <R> records per second"),
        )
        .arg(
            Arg::new("batch_size")
                .long("batch-size")
                .value_name("<S>")
                .default_value("1")
                .help("Records per batch"),
        )
        .arg(
            Arg::new("duration")
                .long("duration")
                .value_name("<SECS>")
                .help("Stop and drain after <SECS> seconds"),
        )
        .arg(
            Arg::new("progress")
                .long("progress")
                .value_name("<SECS>")
                .default_value("0")
                .help("Report progress every <SECS> seconds (0 disables)"),
        )
        .arg(
            Arg::new("output_format")
                .long("output-format")
                .value_name("<F>")
                .default_value("json-lines")
                .help("Output format title"),
        )
        .arg(
            Arg::new("output_media")
                .long("output-media")
                .value_name("<M>")
                .help("Output medium title [default: auto-detect from medium arguments]"),
        )
        .arg(
            Arg::new("output_writers")
                .long("output-writers")
                .value_name("<W>")
                .default_value("4")
                .help("Maximum number of simultaneous output writers"),
        )
        .arg(
            Arg::new("map")
                .long("map")
                .value_name("<URI>")
                .action(ArgAction::Append)
                .help("Append a global mapping (registered title or file:// program)"),
        )
        .arg(
            Arg::new("log_level")
                .long("log-level")
                .value_name("<LEVEL>")
                .default_value("info")
                .help("Diagnostic verbosity (error, warn, info, debug, trace)"),
        )
        .arg(
            Arg::new("list_models")
                .long("list-models")
                .action(ArgAction::SetTrue)
                .help("Print the available data models and exit"),
        )
        .arg(
            Arg::new("list_formats")
                .long("list-formats")
                .action(ArgAction::SetTrue)
                .help("Print the available formats and exit"),
        )
        .arg(
            Arg::new("list_mediums")
                .long("list-mediums")
                .action(ArgAction::SetTrue)
                .help("Print the available mediums and exit"),
        )
        .arg(
            Arg::new("list_mappings")
                .long("list-mappings")
                .action(ArgAction::SetTrue)
                .help("Print the available mappings and exit"),
        )
        .arg(
            Arg::new("completion_script")
                .long("completion-script")
                .value_name("<SHELL>")
                .help("Emit a completion script for <SHELL> and exit"),
        )
}

/// Build the full command: core arguments, hooks, and every extension's
/// contributed arguments.
pub fn build_command(registry: &Registry) -> Command {
    let mut cmd = base_command();
    cmd = hooks::run_pre_add_args(registry, cmd);
    for (heading, specs) in registry.arg_contributions() {
        cmd = crate::extension::args::attach_args(cmd, &heading, specs);
    }
    hooks::run_post_add_args(registry, cmd)
}

/// Initialize tracing output; `RUST_LOG` overrides the level.
pub fn init_logging(level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// What an invocation asks for: exit immediately or run a pipeline.
#[derive(Debug)]
pub(crate) enum Directive {
    Exit(i32),
    Run(Box<Invocation>),
}

fn parse_num<T: FromStr>(matches: &ArgMatches, id: &str, flag: &str) -> Result<Option<T>> {
    match matches.get_one::<String>(id) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("invalid value {raw:?} for {flag}"))),
    }
}

fn hydrate_all(registry: &Registry, matches: &ArgMatches) -> BTreeMap<(Family, String), ExtensionArgs> {
    let mut ext = BTreeMap::new();
    for d in registry.models() {
        ext.insert((Family::Model, d.title.to_string()), d.hydrate(matches));
    }
    for d in registry.mappings() {
        ext.insert((Family::Mapping, d.title.to_string()), d.hydrate(matches));
    }
    for d in registry.formats() {
        ext.insert((Family::Format, d.title.to_string()), d.hydrate(matches));
    }
    for d in registry.mediums() {
        ext.insert((Family::Medium, d.title.to_string()), d.hydrate(matches));
    }
    for d in registry.generics() {
        ext.insert((Family::Generic, d.title.to_string()), d.hydrate(matches));
    }
    ext
}

pub(crate) fn evaluate<I, T>(registry: &Registry, argv: I) -> Result<Directive>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = match build_command(registry).try_get_matches_from(argv) {
        Ok(matches) => matches,
        Err(err) => {
            let code = err.exit_code();
            let _ = err.print();
            return Ok(Directive::Exit(code));
        }
    };

    init_logging(
        matches
            .get_one::<String>("log_level")
            .map(String::as_str)
            .unwrap_or("info"),
    );

    if matches.get_flag("list_models") {
        print_titles(&registry.model_titles());
        return Ok(Directive::Exit(0));
    }
    if matches.get_flag("list_formats") {
        print_titles(&registry.format_titles());
        return Ok(Directive::Exit(0));
    }
    if matches.get_flag("list_mediums") {
        print_titles(&registry.medium_titles());
        return Ok(Directive::Exit(0));
    }
    if matches.get_flag("list_mappings") {
        print_titles(&registry.mapping_titles());
        return Ok(Directive::Exit(0));
    }
    if let Some(raw_shell) = matches.get_one::<String>("completion_script") {
        let shell = clap_complete::Shell::from_str(raw_shell)
            .map_err(|_| Error::Config(format!("unknown shell {raw_shell:?}")))?;
        let mut cmd = build_command(registry);
        clap_complete::generate(shell, &mut cmd, "avalon", &mut std::io::stdout());
        return Ok(Directive::Exit(0));
    }

    let model_tokens: Vec<String> = matches
        .get_many::<String>("models")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    let mut invocation = Invocation {
        model_tokens: if model_tokens.is_empty() {
            vec!["test".to_string()]
        } else {
            model_tokens
        },
        number: parse_num(&matches, "number", "--number")?,
        rate: parse_num(&matches, "rate", "--rate")?,
        batch_size: parse_num(&matches, "batch_size", "--batch-size")?.unwrap_or(1),
        writers: parse_num(&matches, "output_writers", "--output-writers")?.unwrap_or(4),
        format: matches
            .get_one::<String>("output_format")
            .cloned()
            .unwrap_or_else(|| "json-lines".to_string()),
        format_user_set: matches.value_source("output_format") == Some(ValueSource::CommandLine),
        medium: matches.get_one::<String>("output_media").cloned(),
        global_maps: matches
            .get_many::<String>("map")
            .map(|values| values.cloned().collect())
            .unwrap_or_default(),
        duration: parse_num::<u64>(&matches, "duration", "--duration")?.map(Duration::from_secs),
        progress: parse_num::<u64>(&matches, "progress", "--progress")?
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs),
        ext: hydrate_all(registry, &matches),
    };

    if invocation.rate == Some(0.0) {
        return Err(Error::Config(
            "rate must be a positive number of records per second".to_string(),
        ));
    }

    hooks::run_post_parse_args(registry, &mut invocation)?;

    Ok(Directive::Run(Box::new(invocation)))
}

fn print_titles(titles: &[&str]) {
    for title in titles {
        println!("{title}");
    }
}

/// Resolve the medium title and construct the medium instance.
fn build_medium(registry: &Registry, invocation: &Invocation) -> Result<Arc<dyn Medium>> {
    let title = match &invocation.medium {
        Some(title) => title.clone(),
        None => {
            let lookup = |title: &str| invocation.extension_args(Family::Medium, title);
            medium::auto_select(registry, &lookup).to_string()
        }
    };
    let descriptor = registry
        .medium(&title)
        .ok_or_else(|| Error::Config(format!("unknown medium {title:?}")))?;
    (descriptor.ctor)(&invocation.extension_args(Family::Medium, &title))
}

/// Run a parsed invocation to completion and return the exit code.
pub(crate) fn execute(registry: &Registry, invocation: &Invocation) -> Result<i32> {
    let specs: Vec<ProducerSpec> = invocation
        .model_tokens
        .iter()
        .map(|token| parse_producer_spec(token))
        .collect::<Result<_>>()?;

    let medium = build_medium(registry, invocation)?;

    let config = PipelineConfig {
        specs,
        number: invocation.number,
        rate: invocation.rate,
        batch_size: invocation.batch_size,
        writers: invocation.writers,
        format: invocation.format.clone(),
        global_maps: invocation.global_maps.clone(),
        duration: invocation.duration,
        progress: invocation.progress,
    };

    let ext_args = |family: Family, title: &str| invocation.extension_args(family, title);
    let pipeline = Pipeline::build(registry, config, &ext_args, medium)?;

    let cancel = pipeline.cancel_handle();
    let signals = Arc::new(AtomicUsize::new(0));
    let _ = ctrlc::set_handler(move || {
        if signals.fetch_add(1, Ordering::SeqCst) == 0 {
            cancel.cancel();
        } else {
            // Second signal: abort immediately.
            std::process::exit(1);
        }
    });

    let report = pipeline.run()?;
    info!(emitted = report.emitted, "run complete");
    Ok(0)
}

/// Parse `argv` and run: the binary's whole lifecycle.
///
/// Returns the process exit code; errors have already been printed.
pub fn run<I, T>(registry: &Registry, argv: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let outcome = evaluate(registry, argv).and_then(|directive| match directive {
        Directive::Exit(code) => Ok(code),
        Directive::Run(invocation) => execute(registry, &invocation),
    });

    match outcome {
        Ok(code) => code,
        Err(err) => {
            eprintln!("avalon: {err}");
            err.exit_code()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn registry() -> Registry {
        Registry::with_builtins()
    }

    fn evaluate_ok(argv: &[&str]) -> Invocation {
        match evaluate(&registry(), argv.iter().copied()).unwrap() {
            Directive::Run(invocation) => *invocation,
            Directive::Exit(code) => panic!("unexpected exit {code}"),
        }
    }

    #[test]
    fn test_command_is_well_formed() {
        build_command(&registry()).debug_assert();
    }

    #[test]
    fn test_defaults() {
        let invocation = evaluate_ok(&["avalon"]);
        assert_eq!(invocation.model_tokens, vec!["test"]);
        assert_eq!(invocation.number, None);
        assert_eq!(invocation.batch_size, 1);
        assert_eq!(invocation.writers, 4);
        assert_eq!(invocation.format, "json-lines");
        assert!(!invocation.format_user_set);
        assert_eq!(invocation.medium, None);
    }

    #[test]
    fn test_core_arguments_parse() {
        let invocation = evaluate_ok(&[
            "avalon",
            "2snort3",
            "asa",
            "--number",
            "500",
            "--rate",
            "250",
            "--batch-size",
            "10",
            "--map",
            "ts-to-iso",
        ]);
        assert_eq!(invocation.model_tokens, vec!["2snort3", "asa"]);
        assert_eq!(invocation.number, Some(500));
        assert_eq!(invocation.rate, Some(250.0));
        assert_eq!(invocation.batch_size, 10);
        assert_eq!(invocation.global_maps, vec!["ts-to-iso"]);
    }

    #[test]
    fn test_unknown_flag_exits_2() {
        match evaluate(&registry(), ["avalon", "--no-such-flag"]).unwrap() {
            Directive::Exit(code) => assert_eq!(code, 2),
            Directive::Run(_) => panic!("should not run"),
        }
    }

    #[test]
    fn test_help_exits_0() {
        match evaluate(&registry(), ["avalon", "--help"]).unwrap() {
            Directive::Exit(code) => assert_eq!(code, 0),
            Directive::Run(_) => panic!("should not run"),
        }
    }

    #[test]
    fn test_list_flags_exit_0() {
        for flag in ["--list-models", "--list-formats", "--list-mediums", "--list-mappings"] {
            match evaluate(&registry(), ["avalon", flag]).unwrap() {
                Directive::Exit(code) => assert_eq!(code, 0),
                Directive::Run(_) => panic!("{flag} should not run"),
            }
        }
    }

    #[test]
    fn test_completion_script_exits_0() {
        match evaluate(&registry(), ["avalon", "--completion-script", "bash"]).unwrap() {
            Directive::Exit(code) => assert_eq!(code, 0),
            Directive::Run(_) => panic!("should not run"),
        }
    }

    #[test]
    fn test_rate_zero_is_config_error() {
        let err = evaluate(&registry(), ["avalon", "--rate", "0"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_bad_number_is_config_error() {
        let err = evaluate(&registry(), ["avalon", "--number", "many"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_medium_argument_enables_auto_selection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let invocation = evaluate_ok(&["avalon", "--file-name", path.to_str().unwrap()]);
        let reg = registry();
        let medium = build_medium(&reg, &invocation);
        assert_eq!(medium.unwrap().name(), "file");
    }

    #[test]
    fn test_first_sink_flag_on_command_line_wins() {
        let invocation = evaluate_ok(&[
            "avalon",
            "--syslog-tag",
            "gen",
            "--http-url",
            "http://localhost:9/x",
        ]);
        let reg = registry();
        let lookup = |title: &str| invocation.extension_args(Family::Medium, title);
        assert_eq!(medium::auto_select(&reg, &lookup), "syslog");
    }

    #[test]
    fn test_textlog_switches_medium_and_format() {
        let invocation = evaluate_ok(&["avalon", "--textlog"]);
        assert_eq!(invocation.medium.as_deref(), Some("syslog"));
        assert_eq!(invocation.format, "json-lines");
    }

    #[test]
    fn test_end_to_end_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jsonl");
        let code = run(
            &registry(),
            [
                "avalon",
                "snort",
                "--number",
                "3",
                "--output-format",
                "json-lines",
                "--file-name",
                path.to_str().unwrap(),
            ],
        );
        assert_eq!(code, 0);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        for line in lines {
            let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(parsed["aname"], "snort");
        }
    }

    #[test]
    fn test_unknown_model_exits_2_and_names_it() {
        let code = run(&registry(), ["avalon", "unknown_model", "--number", "1"]);
        assert_eq!(code, 2);
    }

    #[test]
    fn test_inline_mapping_from_cli() {
        let mut program = tempfile::NamedTempFile::new().unwrap();
        writeln!(program, "set origin e2e").unwrap();
        let url = format!("file://{}", program.path().display());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let code = run(
            &registry(),
            [
                "avalon",
                "test",
                "--number",
                "2",
                "--map",
                url.as_str(),
                "--file-name",
                path.to_str().unwrap(),
            ],
        );
        assert_eq!(code, 0);

        let content = std::fs::read_to_string(&path).unwrap();
        for line in content.lines() {
            let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(parsed["origin"], "e2e");
        }
    }
}
