//! Argument contribution and binding for extensions.
//!
//! Extensions declare the command-line arguments they need as a list of
//! [`ArgSpec`]s. The binder materializes those as `clap` arguments grouped
//! under the extension's help heading, and after parsing *hydrates* one
//! [`ExtensionArgs`] per extension by applying the prefix/mapping rules:
//!
//! - a parsed destination listed in the extension's `args_mapping` is
//!   attached under the mapped name;
//! - otherwise a destination starting with the extension's `args_prefix`
//!   is attached with the prefix stripped;
//! - otherwise the argument is registered but not attached, and a startup
//!   warning is logged (another extension may claim it).
//!
//! Constructors receive the hydrated map and read typed values through the
//! `get_*` accessors.

use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::{Error, Result};

/// A parsed argument value.
///
/// Values arrive from the command line as strings; the accessors convert
/// on demand so extensions can read whichever type they expect.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    /// A string value.
    String(String),
    /// An integer value.
    Integer(i64),
    /// A floating-point value.
    Float(f64),
    /// A boolean value (flags).
    Bool(bool),
}

impl ArgValue {
    /// Get as a string, converting if necessary.
    pub fn as_string(&self) -> String {
        match self {
            ArgValue::String(s) => s.clone(),
            ArgValue::Integer(i) => i.to_string(),
            ArgValue::Float(f) => f.to_string(),
            ArgValue::Bool(b) => b.to_string(),
        }
    }

    /// Try to get as an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ArgValue::Integer(i) => Some(*i),
            ArgValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Try to get as a u64.
    pub fn as_u64(&self) -> Option<u64> {
        self.as_i64().and_then(|i| u64::try_from(i).ok())
    }

    /// Try to get as a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ArgValue::Float(f) => Some(*f),
            ArgValue::Integer(i) => Some(*i as f64),
            ArgValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Try to get as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Bool(b) => Some(*b),
            ArgValue::String(s) => match s.to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            ArgValue::Integer(i) => Some(*i != 0),
            _ => None,
        }
    }
}

/// One command-line argument contributed by an extension.
#[derive(Debug, Clone)]
pub struct ArgSpec {
    /// Long option name as typed on the command line (`http-url`).
    pub long: &'static str,
    /// Parsed destination (`http_url`); derived from `long`.
    pub dest: String,
    /// Placeholder shown in help for value arguments.
    pub value_name: &'static str,
    /// Help text.
    pub help: &'static str,
    /// Default applied when the user does not pass the argument.
    pub default: Option<ArgValue>,
    /// Whether this is a boolean flag rather than a value argument.
    pub flag: bool,
}

impl ArgSpec {
    /// Declare a value argument.
    pub fn value(long: &'static str, value_name: &'static str, help: &'static str) -> Self {
        Self {
            long,
            dest: long.replace('-', "_"),
            value_name,
            help,
            default: None,
            flag: false,
        }
    }

    /// Declare a boolean flag.
    pub fn flag(long: &'static str, help: &'static str) -> Self {
        Self {
            long,
            dest: long.replace('-', "_"),
            value_name: "",
            help,
            default: Some(ArgValue::Bool(false)),
            flag: true,
        }
    }

    /// Set a string default.
    pub fn default_str(mut self, value: &str) -> Self {
        self.default = Some(ArgValue::String(value.to_string()));
        self
    }

    /// Set an integer default.
    pub fn default_int(mut self, value: i64) -> Self {
        self.default = Some(ArgValue::Integer(value));
        self
    }
}

/// Add an extension's arguments to the command under a help heading.
pub fn attach_args(mut cmd: Command, heading: &str, specs: &[ArgSpec]) -> Command {
    for spec in specs {
        let mut arg = Arg::new(spec.dest.clone())
            .long(spec.long)
            .help(help_with_default(spec))
            .help_heading(heading.to_string());
        if spec.flag {
            arg = arg.action(ArgAction::SetTrue);
        } else {
            arg = arg.action(ArgAction::Set).value_name(spec.value_name);
        }
        cmd = cmd.arg(arg);
    }
    cmd
}

fn help_with_default(spec: &ArgSpec) -> String {
    match (&spec.default, spec.flag) {
        (Some(default), false) => format!("{} [default: {}]", spec.help, default.as_string()),
        _ => spec.help.to_string(),
    }
}

/// Arguments attached to one extension instance after binding.
///
/// Keys are attribute names (destination with the prefix stripped, or the
/// mapped name); values come from the command line or the spec default.
#[derive(Debug, Clone, Default)]
pub struct ExtensionArgs {
    values: BTreeMap<String, ArgValue>,
    /// Command-line match index per attribute the user set explicitly.
    user_indices: BTreeMap<String, usize>,
}

impl ExtensionArgs {
    /// Create an empty argument set (extensions without arguments).
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an attribute value directly (used by tests and embedders).
    pub fn set(&mut self, attr: impl Into<String>, value: ArgValue) {
        self.values.insert(attr.into(), value);
    }

    /// Get a raw attribute value.
    pub fn get(&self, attr: &str) -> Option<&ArgValue> {
        self.values.get(attr)
    }

    /// Get an attribute as a string.
    pub fn get_str(&self, attr: &str) -> Option<String> {
        self.values.get(attr).map(ArgValue::as_string)
    }

    /// Get an attribute as a u64.
    pub fn get_u64(&self, attr: &str) -> Option<u64> {
        self.values.get(attr).and_then(ArgValue::as_u64)
    }

    /// Get an attribute as a float.
    pub fn get_f64(&self, attr: &str) -> Option<f64> {
        self.values.get(attr).and_then(ArgValue::as_f64)
    }

    /// Get an attribute as a boolean (false when absent).
    pub fn get_bool(&self, attr: &str) -> bool {
        self.values
            .get(attr)
            .and_then(ArgValue::as_bool)
            .unwrap_or(false)
    }

    /// Get a required string attribute, failing with a configuration error.
    pub fn require_str(&self, attr: &str) -> Result<String> {
        self.get_str(attr)
            .ok_or_else(|| Error::Config(format!("missing required argument {attr:?}")))
    }

    /// Whether the user explicitly set any of this extension's arguments.
    pub fn any_user_set(&self) -> bool {
        !self.user_indices.is_empty()
    }

    /// Earliest command-line position among user-set arguments.
    ///
    /// Used for medium auto-selection: when several mediums were addressed,
    /// the one whose argument came first on the command line wins.
    pub fn earliest_user_index(&self) -> Option<usize> {
        self.user_indices.values().copied().min()
    }

    #[cfg(test)]
    pub(crate) fn set_user_index_for_test(&mut self, attr: &str, index: usize) {
        self.user_indices.insert(attr.to_string(), index);
    }
}

/// Build an extension's [`ExtensionArgs`] from the parse result.
///
/// `prefix` is the extension's destination prefix (`http_`), `mapping` its
/// destination-to-attribute overrides.
pub fn hydrate(
    title: &str,
    prefix: &str,
    mapping: &[(&str, &str)],
    specs: &[ArgSpec],
    matches: &ArgMatches,
) -> ExtensionArgs {
    let mut out = ExtensionArgs::new();

    for spec in specs {
        let attr = match mapping.iter().find(|(dest, _)| *dest == spec.dest) {
            Some((_, attr)) => (*attr).to_string(),
            None => match spec.dest.strip_prefix(prefix) {
                Some(stripped) if !prefix.is_empty() => stripped.to_string(),
                _ => {
                    warn!(
                        extension = title,
                        dest = spec.dest.as_str(),
                        "argument destination matches neither prefix nor mapping; not attached"
                    );
                    continue;
                }
            },
        };

        let user_set = matches.value_source(&spec.dest) == Some(ValueSource::CommandLine);

        let value = if spec.flag {
            let set = matches.get_flag(&spec.dest);
            // An unset flag carries no information beyond its default.
            if !set && !user_set {
                spec.default.clone()
            } else {
                Some(ArgValue::Bool(set))
            }
        } else if user_set {
            matches
                .get_one::<String>(&spec.dest)
                .map(|s| ArgValue::String(s.clone()))
        } else {
            spec.default.clone()
        };

        if let Some(value) = value {
            if user_set {
                // Flags report the index of the switch itself.
                if let Some(index) = matches.index_of(&spec.dest) {
                    out.user_indices.insert(attr.clone(), index);
                }
            }
            out.values.insert(attr, value);
        }
    }

    out
}
