//! Configuration resolution
//!
//! Precedence per key: environment variable > persisted file value >
//! interactive prompt > documented default. The resolver is consumed by
//! [`ConfigResolver::finish`], which yields the immutable snapshot and
//! persists it.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::debug;

use super::keys::{self, KeySpec};
use super::paths::HostkeepPaths;
use super::settings::Settings;
use super::snapshot::{ConfigSnapshot, ValueSource};
use crate::error::{HostkeepError, HostkeepResult};
use crate::host::prompt::Prompter;

type EnvLookup = Box<dyn Fn(&str) -> Option<String>>;

/// Merges environment, persisted file and prompts into a snapshot
pub struct ConfigResolver<'a> {
    env: EnvLookup,
    persisted: BTreeMap<String, String>,
    prompter: &'a dyn Prompter,
    values: BTreeMap<String, String>,
    sources: BTreeMap<String, ValueSource>,
}

impl<'a> ConfigResolver<'a> {
    /// Create a resolver reading the process environment
    pub fn new(settings: &Settings, prompter: &'a dyn Prompter) -> Self {
        Self {
            env: Box::new(|key| std::env::var(key).ok()),
            persisted: settings.values.clone(),
            prompter,
            values: BTreeMap::new(),
            sources: BTreeMap::new(),
        }
    }

    /// Replace the environment lookup (useful for testing)
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + 'static,
    {
        self.env = Box::new(lookup);
        self
    }

    /// Resolve one key
    ///
    /// Prompts only when `prompt` is set and the prompter is interactive.
    pub fn resolve(
        &mut self,
        key: &str,
        default: Option<&str>,
    ) -> HostkeepResult<Option<String>> {
        self.resolve_with(key, key, default, true)
    }

    fn resolve_with(
        &mut self,
        key: &str,
        description: &str,
        default: Option<&str>,
        prompt: bool,
    ) -> HostkeepResult<Option<String>> {
        if let Some(value) = self.values.get(key) {
            return Ok(Some(value.clone()));
        }

        let found = if let Some(v) = (self.env)(key).filter(|v| !v.is_empty()) {
            Some((v, ValueSource::Env))
        } else if let Some(v) = self.persisted.get(key).filter(|v| !v.is_empty()) {
            Some((v.clone(), ValueSource::File))
        } else if prompt && self.prompter.is_interactive() {
            self.prompter
                .ask(key, description, default)?
                .filter(|v| !v.is_empty())
                .map(|v| (v, ValueSource::Prompt))
        } else {
            default.map(|v| (v.to_string(), ValueSource::Default))
        };

        match found {
            Some((value, source)) => {
                debug!(key, %source, "resolved configuration value");
                self.values.insert(key.to_string(), value.clone());
                self.sources.insert(key.to_string(), source);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Resolve every documented key
    ///
    /// With `interactive` set, keys marked promptable are asked for when
    /// unset. Backup commands pass `false` so they never block on input.
    pub fn resolve_known(&mut self, interactive: bool) -> HostkeepResult<()> {
        for spec in keys::KNOWN_KEYS {
            self.resolve_spec(spec, interactive)?;
        }
        Ok(())
    }

    fn resolve_spec(&mut self, spec: &KeySpec, interactive: bool) -> HostkeepResult<()> {
        self.resolve_with(
            spec.name,
            spec.description,
            spec.default,
            interactive && spec.prompt,
        )?;
        Ok(())
    }

    /// Resolve keys a plan requires (always promptable)
    pub fn resolve_required(&mut self, required: &[String]) -> HostkeepResult<()> {
        for key in required {
            let (description, default) = keys::spec_for(key)
                .map(|s| (s.description, s.default))
                .unwrap_or((key.as_str(), None));
            self.resolve_with(key, description, default, true)?;
        }
        Ok(())
    }

    /// Fail with `MissingConfiguration` if any key is still unresolved
    pub fn validate_required<S: AsRef<str>>(&self, required: &[S]) -> HostkeepResult<()> {
        let missing: Vec<String> = required
            .iter()
            .map(|k| k.as_ref())
            .filter(|k| !self.values.contains_key(*k))
            .map(str::to_string)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(HostkeepError::MissingConfiguration { keys: missing })
        }
    }

    /// Freeze the resolved values and persist them for the next invocation
    pub fn finish(self, paths: &HostkeepPaths) -> HostkeepResult<ConfigSnapshot> {
        let snapshot = self.into_snapshot();
        persist(&snapshot, paths)?;
        Ok(snapshot)
    }

    /// Freeze without persisting
    pub fn into_snapshot(self) -> ConfigSnapshot {
        ConfigSnapshot::from_parts(self.values, self.sources)
    }
}

/// Write the snapshot back to the settings file
pub fn persist(snapshot: &ConfigSnapshot, paths: &HostkeepPaths) -> HostkeepResult<()> {
    let mut settings = Settings::load_or_create(paths)?;
    if &settings.values == snapshot.values() {
        return Ok(());
    }
    settings.values = snapshot.values().clone();
    settings.updated_at = Some(Utc::now());
    settings.save(paths)
}
