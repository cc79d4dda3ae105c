//! Extension registry: one entry per `(family, title)`.

use std::sync::Arc;

use super::args::{ArgSpec, ExtensionArgs};
use super::hooks::Generic;
use super::Family;
use crate::error::{Error, Result};
use crate::format::FormatCtor;
use crate::mapping::MappingCtor;
use crate::medium::MediumCtor;
use crate::model::ModelCtor;

/// A registry entry: title, argument contract, and constructor.
///
/// `C` is the family's constructor type (for generics it holds the hook
/// instance itself, since hooks must exist before argument parsing).
#[derive(Clone)]
pub struct Descriptor<C> {
    /// Unique title within the family.
    pub title: &'static str,
    /// Destination prefix override; `None` means `"<title>_"`.
    pub args_prefix: Option<&'static str>,
    /// Destination-to-attribute overrides consulted before the prefix rule.
    pub args_mapping: &'static [(&'static str, &'static str)],
    /// Arguments this extension contributes to the command line.
    pub args: Vec<ArgSpec>,
    /// Constructor (or, for generics, the hook instance).
    pub ctor: C,
}

impl<C> Descriptor<C> {
    /// Create a descriptor with no arguments and default prefix.
    pub fn new(title: &'static str, ctor: C) -> Self {
        Self {
            title,
            args_prefix: None,
            args_mapping: &[],
            args: Vec::new(),
            ctor,
        }
    }

    /// Set the contributed arguments.
    pub fn with_args(mut self, args: Vec<ArgSpec>) -> Self {
        self.args = args;
        self
    }

    /// Override the destination prefix.
    pub fn with_prefix(mut self, prefix: &'static str) -> Self {
        self.args_prefix = Some(prefix);
        self
    }

    /// Set destination-to-attribute overrides.
    pub fn with_mapping(mut self, mapping: &'static [(&'static str, &'static str)]) -> Self {
        self.args_mapping = mapping;
        self
    }

    /// Effective destination prefix (`"<title>_"` unless overridden).
    ///
    /// Dashes in the title are normalized to underscores, matching how
    /// long options map to parsed destinations.
    pub fn prefix(&self) -> String {
        match self.args_prefix {
            Some(prefix) => prefix.to_string(),
            None => format!("{}_", self.title.replace('-', "_")),
        }
    }

    /// Hydrate this extension's arguments from the parse result.
    pub fn hydrate(&self, matches: &clap::ArgMatches) -> ExtensionArgs {
        super::args::hydrate(
            self.title,
            &self.prefix(),
            self.args_mapping,
            &self.args,
            matches,
        )
    }
}

/// Registry of all known extensions across the five families.
///
/// Entries are added through the typed `register_*` calls; builtins come
/// from [`Registry::with_builtins`]. Duplicate titles within a family fail
/// with [`Error::DuplicateExtension`].
#[derive(Default)]
pub struct Registry {
    models: Vec<Descriptor<ModelCtor>>,
    mappings: Vec<Descriptor<MappingCtor>>,
    formats: Vec<Descriptor<FormatCtor>>,
    mediums: Vec<Descriptor<MediumCtor>>,
    generics: Vec<Descriptor<Arc<dyn Generic>>>,
}

fn check_duplicate<C>(family: Family, entries: &[Descriptor<C>], title: &str) -> Result<()> {
    if entries.iter().any(|d| d.title == title) {
        return Err(Error::DuplicateExtension {
            family,
            title: title.to_string(),
        });
    }
    Ok(())
}

fn titles<C>(entries: &[Descriptor<C>]) -> Vec<&'static str> {
    let mut out: Vec<&'static str> = entries.iter().map(|d| d.title).collect();
    out.sort_unstable();
    out
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every built-in extension registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        // Registration order is stable (by title) within each family; the
        // generic hook order and medium auto-selection order depend on it.
        for descriptor in [
            crate::model::asa::descriptor(),
            crate::model::rflow::descriptor(),
            crate::model::snort::descriptor(),
            crate::model::test::descriptor(),
        ] {
            registry
                .register_model(descriptor)
                .expect("builtin model titles are unique");
        }

        for descriptor in [
            crate::mapping::cast::ts_to_epoch_descriptor(),
            crate::mapping::cast::ts_to_iso_descriptor(),
        ] {
            registry
                .register_mapping(descriptor)
                .expect("builtin mapping titles are unique");
        }

        for descriptor in [
            crate::format::lines::batch_headered_csv_descriptor(),
            crate::format::lines::csv_descriptor(),
            crate::format::lines::headered_csv_descriptor(),
            crate::format::lines::json_lines_descriptor(),
        ] {
            registry
                .register_format(descriptor)
                .expect("builtin format titles are unique");
        }

        for descriptor in [
            crate::medium::file::directory_descriptor(),
            crate::medium::file::file_descriptor(),
            crate::medium::http::descriptor(),
            crate::medium::syslog::descriptor(),
        ] {
            registry
                .register_medium(descriptor)
                .expect("builtin medium titles are unique");
        }

        registry
            .register_generic(super::hooks::textlog_descriptor())
            .expect("builtin generic titles are unique");

        registry
    }

    /// Register a model extension.
    pub fn register_model(&mut self, descriptor: Descriptor<ModelCtor>) -> Result<()> {
        check_duplicate(Family::Model, &self.models, descriptor.title)?;
        self.models.push(descriptor);
        Ok(())
    }

    /// Register a mapping extension.
    pub fn register_mapping(&mut self, descriptor: Descriptor<MappingCtor>) -> Result<()> {
        check_duplicate(Family::Mapping, &self.mappings, descriptor.title)?;
        self.mappings.push(descriptor);
        Ok(())
    }

    /// Register a format extension.
    pub fn register_format(&mut self, descriptor: Descriptor<FormatCtor>) -> Result<()> {
        check_duplicate(Family::Format, &self.formats, descriptor.title)?;
        self.formats.push(descriptor);
        Ok(())
    }

    /// Register a medium extension.
    pub fn register_medium(&mut self, descriptor: Descriptor<MediumCtor>) -> Result<()> {
        check_duplicate(Family::Medium, &self.mediums, descriptor.title)?;
        self.mediums.push(descriptor);
        Ok(())
    }

    /// Register a generic (lifecycle hook) extension.
    pub fn register_generic(&mut self, descriptor: Descriptor<Arc<dyn Generic>>) -> Result<()> {
        check_duplicate(Family::Generic, &self.generics, descriptor.title)?;
        self.generics.push(descriptor);
        Ok(())
    }

    /// Look up a model by title.
    pub fn model(&self, title: &str) -> Option<&Descriptor<ModelCtor>> {
        self.models.iter().find(|d| d.title == title)
    }

    /// Look up a mapping by title.
    pub fn mapping(&self, title: &str) -> Option<&Descriptor<MappingCtor>> {
        self.mappings.iter().find(|d| d.title == title)
    }

    /// Look up a format by title.
    pub fn format(&self, title: &str) -> Option<&Descriptor<FormatCtor>> {
        self.formats.iter().find(|d| d.title == title)
    }

    /// Look up a medium by title.
    pub fn medium(&self, title: &str) -> Option<&Descriptor<MediumCtor>> {
        self.mediums.iter().find(|d| d.title == title)
    }

    /// Models in registration order.
    pub fn models(&self) -> &[Descriptor<ModelCtor>] {
        &self.models
    }

    /// Mappings in registration order.
    pub fn mappings(&self) -> &[Descriptor<MappingCtor>] {
        &self.mappings
    }

    /// Formats in registration order.
    pub fn formats(&self) -> &[Descriptor<FormatCtor>] {
        &self.formats
    }

    /// Mediums in registration order (auto-selection scans this order).
    pub fn mediums(&self) -> &[Descriptor<MediumCtor>] {
        &self.mediums
    }

    /// Generics in registration order (hooks run in this order).
    pub fn generics(&self) -> &[Descriptor<Arc<dyn Generic>>] {
        &self.generics
    }

    /// Sorted model titles.
    pub fn model_titles(&self) -> Vec<&'static str> {
        titles(&self.models)
    }

    /// Sorted mapping titles.
    pub fn mapping_titles(&self) -> Vec<&'static str> {
        titles(&self.mappings)
    }

    /// Sorted format titles.
    pub fn format_titles(&self) -> Vec<&'static str> {
        titles(&self.formats)
    }

    /// Sorted medium titles.
    pub fn medium_titles(&self) -> Vec<&'static str> {
        titles(&self.mediums)
    }

    /// All descriptors' `(heading, args)` pairs for command assembly.
    pub(crate) fn arg_contributions(&self) -> Vec<(String, &[ArgSpec])> {
        let mut out = Vec::new();
        for d in &self.models {
            out.push((format!("Arguments for the '{}' model", d.title), &d.args[..]));
        }
        for d in &self.mappings {
            out.push((
                format!("Arguments for the '{}' mapping", d.title),
                &d.args[..],
            ));
        }
        for d in &self.formats {
            out.push((
                format!("Arguments for the '{}' format", d.title),
                &d.args[..],
            ));
        }
        for d in &self.mediums {
            out.push((
                format!("Arguments for the '{}' medium", d.title),
                &d.args[..],
            ));
        }
        for d in &self.generics {
            out.push((format!("Arguments for '{}'", d.title), &d.args[..]));
        }
        out.retain(|(_, args)| !args.is_empty());
        out
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("models", &self.models.len())
            .field("mappings", &self.mappings.len())
            .field("formats", &self.formats.len())
            .field("mediums", &self.mediums.len())
            .field("generics", &self.generics.len())
            .finish()
    }
}
