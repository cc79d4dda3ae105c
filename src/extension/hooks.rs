//! Generic extensions: startup lifecycle hooks.
//!
//! Generics do not produce, transform, serialize, or deliver data. They
//! observe command-line assembly and the parse result, which is enough to
//! implement cross-cutting switches that span the other families. Hooks
//! run in registration order; a failing hook aborts startup.

use std::sync::Arc;

use clap::Command;

use super::args::ArgSpec;
use super::registry::{Descriptor, Registry};
use super::Family;
use crate::cli::Invocation;
use crate::error::{Error, Result};

/// A lifecycle-only extension.
///
/// All hooks have no-op defaults; implementations override the points they
/// care about. Hook errors are reported as plain strings and wrapped with
/// the extension title by the runner.
pub trait Generic: Send + Sync {
    /// Called before any extension adds arguments to the command.
    fn pre_add_args(&self, cmd: Command) -> Command {
        cmd
    }

    /// Called after all extensions added arguments, before parsing.
    fn post_add_args(&self, cmd: Command) -> Command {
        cmd
    }

    /// Called after parsing, before pipeline construction.
    ///
    /// May rewrite the effective invocation (format/medium selection,
    /// flags). Returning an error aborts startup.
    fn post_parse_args(&self, _invocation: &mut Invocation) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Run every generic's `pre_add_args` hook in registration order.
pub(crate) fn run_pre_add_args(registry: &Registry, mut cmd: Command) -> Command {
    for entry in registry.generics() {
        cmd = entry.ctor.pre_add_args(cmd);
    }
    cmd
}

/// Run every generic's `post_add_args` hook in registration order.
pub(crate) fn run_post_add_args(registry: &Registry, mut cmd: Command) -> Command {
    for entry in registry.generics() {
        cmd = entry.ctor.post_add_args(cmd);
    }
    cmd
}

/// Run every generic's `post_parse_args` hook in registration order.
pub(crate) fn run_post_parse_args(registry: &Registry, invocation: &mut Invocation) -> Result<()> {
    for entry in registry.generics() {
        entry
            .ctor
            .post_parse_args(invocation)
            .map_err(|reason| Error::GenericHook {
                title: entry.title.to_string(),
                reason,
            })?;
    }
    Ok(())
}

/// The `--textlog` shortcut: mimic a text-log appliance.
///
/// Rewrites the invocation to the syslog medium with json-lines framing,
/// deferring to any format or medium the user picked explicitly.
struct TextlogHook;

impl Generic for TextlogHook {
    fn post_parse_args(&self, invocation: &mut Invocation) -> std::result::Result<(), String> {
        let enabled = invocation
            .extension_args(Family::Generic, "textlog")
            .get_bool("enabled");
        if !enabled {
            return Ok(());
        }
        if invocation.medium.is_none() {
            invocation.medium = Some("syslog".to_string());
        }
        if !invocation.format_user_set {
            invocation.format = "json-lines".to_string();
        }
        Ok(())
    }
}

/// Descriptor for the built-in `textlog` generic.
pub fn textlog_descriptor() -> Descriptor<Arc<dyn Generic>> {
    Descriptor::new("textlog", Arc::new(TextlogHook) as Arc<dyn Generic>)
        .with_args(vec![ArgSpec::flag(
            "textlog",
            "Shortcut: mimic a text-log appliance (syslog medium, json-lines format)",
        )])
        .with_mapping(&[("textlog", "enabled")])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::args::ArgValue;

    #[test]
    fn test_textlog_rewrites_auto_medium() {
        let mut invocation = Invocation::default();
        invocation.set_extension_args_for_test(
            Family::Generic,
            "textlog",
            &[("enabled", ArgValue::Bool(true))],
        );
        TextlogHook.post_parse_args(&mut invocation).unwrap();
        assert_eq!(invocation.medium.as_deref(), Some("syslog"));
        assert_eq!(invocation.format, "json-lines");
    }

    #[test]
    fn test_textlog_defers_to_explicit_choice() {
        let mut invocation = Invocation {
            medium: Some("file".to_string()),
            format: "csv".to_string(),
            format_user_set: true,
            ..Invocation::default()
        };
        invocation.set_extension_args_for_test(
            Family::Generic,
            "textlog",
            &[("enabled", ArgValue::Bool(true))],
        );
        TextlogHook.post_parse_args(&mut invocation).unwrap();
        assert_eq!(invocation.medium.as_deref(), Some("file"));
        assert_eq!(invocation.format, "csv");
    }

    #[test]
    fn test_textlog_noop_when_disabled() {
        let mut invocation = Invocation::default();
        TextlogHook.post_parse_args(&mut invocation).unwrap();
        assert_eq!(invocation.medium, None);
    }

    #[test]
    fn test_failing_hook_carries_title() {
        struct Failing;
        impl Generic for Failing {
            fn post_parse_args(
                &self,
                _invocation: &mut Invocation,
            ) -> std::result::Result<(), String> {
                Err("broken".to_string())
            }
        }

        let mut registry = Registry::new();
        registry
            .register_generic(Descriptor::new("failing", Arc::new(Failing) as Arc<dyn Generic>))
            .unwrap();
        let mut invocation = Invocation::default();
        let err = run_post_parse_args(&registry, &mut invocation).unwrap_err();
        match err {
            Error::GenericHook { title, reason } => {
                assert_eq!(title, "failing");
                assert_eq!(reason, "broken");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_hooks_run_in_registration_order() {
        use std::sync::Mutex;

        static ORDER: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

        struct Tagged(&'static str);
        impl Generic for Tagged {
            fn post_parse_args(
                &self,
                _invocation: &mut Invocation,
            ) -> std::result::Result<(), String> {
                ORDER.lock().unwrap().push(self.0);
                Ok(())
            }
        }

        let mut registry = Registry::new();
        registry
            .register_generic(Descriptor::new("alpha", Arc::new(Tagged("alpha")) as _))
            .unwrap();
        registry
            .register_generic(Descriptor::new("beta", Arc::new(Tagged("beta")) as _))
            .unwrap();

        let mut invocation = Invocation::default();
        run_post_parse_args(&registry, &mut invocation).unwrap();
        assert_eq!(*ORDER.lock().unwrap(), vec!["alpha", "beta"]);
    }
}
