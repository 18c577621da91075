//! Registered features: macros and export filters.
//!
//! A feature record holds registry keys for its script callables. The keys
//! are only meaningful together with the runtime that created them, so every
//! operation takes the owning [`ScriptRuntime`] explicitly.

use std::fmt;

use mlua::{Function, MultiValue, RegistryKey, Value};
use serde::Serialize;

use subauto_document::Document;

use crate::dialog::ConfigDialog;
use crate::error::{format_lua_error, AutomationError};
use crate::marshal::{
    is_truthy, push_active_line, push_integer_array, read_selection_array, DocumentSnapshot,
    Selection,
};
use crate::progress::ProgressSink;
use crate::runtime::ScriptRuntime;
use crate::threaded::{self, RunOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Macro,
    Filter,
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Macro => write!(f, "macro"),
            Self::Filter => write!(f, "filter"),
        }
    }
}

/// What a host needs to list a feature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureInfo {
    pub index: usize,
    pub kind: FeatureKind,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merit: Option<i32>,
    pub has_configuration: bool,
}

/// Result of a threaded invocation, as reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationStatus {
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationReport {
    pub status: InvocationStatus,
    /// The document was changed by this invocation.
    pub committed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InvocationReport {
    fn from_outcome(outcome: &RunOutcome, committed: bool) -> Self {
        let (status, error) = match outcome {
            RunOutcome::Completed(_) => (InvocationStatus::Completed, None),
            RunOutcome::Failed(msg) => (InvocationStatus::Failed, Some(msg.clone())),
            RunOutcome::Cancelled => (InvocationStatus::Cancelled, None),
        };
        Self { status, committed, error }
    }
}

pub enum Feature {
    Macro(MacroFeature),
    Filter(FilterFeature),
}

impl Feature {
    pub fn info(&self) -> &FeatureInfo {
        match self {
            Feature::Macro(m) => &m.info,
            Feature::Filter(f) => &f.info,
        }
    }

    pub fn kind(&self) -> FeatureKind {
        self.info().kind
    }

    pub fn as_macro(&self) -> Option<&MacroFeature> {
        match self {
            Feature::Macro(m) => Some(m),
            Feature::Filter(_) => None,
        }
    }

    pub fn as_filter(&self) -> Option<&FilterFeature> {
        match self {
            Feature::Filter(f) => Some(f),
            Feature::Macro(_) => None,
        }
    }
}

// ============================================================================
// Macros
// ============================================================================

pub struct MacroFeature {
    info: FeatureInfo,
    process: RegistryKey,
    validate: Option<RegistryKey>,
}

impl MacroFeature {
    pub(crate) fn new(info: FeatureInfo, process: RegistryKey, validate: Option<RegistryKey>) -> Self {
        Self { info, process, validate }
    }

    pub fn info(&self) -> &FeatureInfo {
        &self.info
    }

    /// Ask the script whether the macro applies to this document and
    /// selection. No validator means always applicable; a validator that
    /// raises means not applicable.
    pub fn validate(&self, runtime: &ScriptRuntime, document: &Document, selection: &Selection) -> bool {
        let Some(key) = &self.validate else {
            return true;
        };
        if runtime.is_busy() {
            log::warn!("Skipping validation of \"{}\": script is still running", self.info.name);
            return false;
        }

        let snapshot = DocumentSnapshot::read_only(document);
        let result = (|| -> mlua::Result<Value> {
            let lua = runtime.lua();
            let func: Function = lua.registry_value(key)?;
            let args = MultiValue::from_iter([
                Value::UserData(snapshot.push(lua)?),
                Value::Table(push_integer_array(lua, &selection.lines)?),
                push_active_line(selection.active),
            ]);
            func.call::<Value>(args)
        })();
        snapshot.release();

        match result {
            Ok(v) => is_truthy(&v),
            Err(e) => {
                log::warn!(
                    "Runtime error in Lua macro validation function:\n{}",
                    format_lua_error(&e)
                );
                false
            }
        }
    }

    /// Run the macro on a worker thread. Changes are committed to `document`
    /// as one undo step named after the macro. A returned selection replaces
    /// `selection.lines`, sorted ascending.
    pub fn process(
        &self,
        runtime: &ScriptRuntime,
        document: &mut Document,
        selection: &mut Selection,
        sink: &mut dyn ProgressSink,
    ) -> Result<InvocationReport, AutomationError> {
        // A detached worker holds the Lua state; touching it here would block.
        if runtime.is_busy() {
            return Err(AutomationError::Busy);
        }
        let lua = runtime.lua();
        let func: Function = lua.registry_value(&self.process)?;
        let snapshot = DocumentSnapshot::for_macro(document);
        let args = MultiValue::from_iter([
            Value::UserData(snapshot.push(lua)?),
            Value::Table(push_integer_array(lua, &selection.lines)?),
            push_active_line(selection.active),
        ]);

        let outcome = threaded::run(runtime, func, args, 1, &self.info.name, sink);
        let committed = snapshot.complete(document, &self.info.name);
        let outcome = outcome?;

        if let RunOutcome::Completed(values) = &outcome {
            if let Some(mut lines) = values.first().and_then(read_selection_array) {
                lines.sort_unstable();
                selection.lines = lines;
            }
        }

        Ok(InvocationReport::from_outcome(&outcome, committed))
    }
}

// ============================================================================
// Export filters
// ============================================================================

pub struct FilterFeature {
    info: FeatureInfo,
    process: RegistryKey,
    config: Option<RegistryKey>,
}

impl FilterFeature {
    pub(crate) fn new(info: FeatureInfo, process: RegistryKey, config: Option<RegistryKey>) -> Self {
        Self { info, process, config }
    }

    pub fn info(&self) -> &FeatureInfo {
        &self.info
    }

    pub fn merit(&self) -> i32 {
        self.info.merit.unwrap_or(0)
    }

    /// Build the configuration dialog. `None` without calling the script
    /// when no config function was registered, or when it raised.
    pub fn build_config_dialog(&self, runtime: &ScriptRuntime, document: &Document) -> Option<ConfigDialog> {
        let key = self.config.as_ref()?;
        if runtime.is_busy() {
            log::warn!("Skipping config dialog of \"{}\": script is still running", self.info.name);
            return None;
        }

        let snapshot = DocumentSnapshot::read_only(document);
        let result = (|| -> mlua::Result<ConfigDialog> {
            let lua = runtime.lua();
            let func: Function = lua.registry_value(key)?;
            let args = MultiValue::from_iter([
                Value::UserData(snapshot.push(lua)?),
                Value::Table(lua.create_table()?),
            ]);
            let value = func.call::<Value>(args)?;
            Ok(ConfigDialog::from_lua(lua, value))
        })();
        snapshot.release();

        match result {
            Ok(dialog) => Some(dialog),
            Err(e) => {
                log::warn!(
                    "Runtime error in Lua config dialog function:\n{}",
                    format_lua_error(&e)
                );
                None
            }
        }
    }

    /// Run the filter over `document` on a worker thread. Changes are applied
    /// without an undo step.
    pub fn process_subs(
        &self,
        runtime: &ScriptRuntime,
        document: &mut Document,
        dialog: Option<&ConfigDialog>,
        sink: &mut dyn ProgressSink,
    ) -> Result<InvocationReport, AutomationError> {
        // A detached worker holds the Lua state; touching it here would block.
        if runtime.is_busy() {
            return Err(AutomationError::Busy);
        }
        let lua = runtime.lua();
        let func: Function = lua.registry_value(&self.process)?;
        let snapshot = DocumentSnapshot::for_export(document);
        let options = match dialog {
            Some(dialog) if self.info.has_configuration => dialog.read_back(lua)?,
            _ => lua.create_table()?,
        };
        let args = MultiValue::from_iter([
            Value::UserData(snapshot.push(lua)?),
            Value::Table(options),
        ]);

        let outcome = threaded::run(runtime, func, args, 0, &self.info.name, sink);
        let committed = snapshot.complete(document, &self.info.name);
        let outcome = outcome?;

        Ok(InvocationReport::from_outcome(&outcome, committed))
    }
}
