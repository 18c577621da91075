//! One loaded script file.

use std::fs;
use std::path::{Path, PathBuf};

use mlua::Value;
use serde::Serialize;

use subauto_document::Document;

use crate::dialog::ConfigDialog;
use crate::error::{format_lua_error, AutomationError};
use crate::feature::{Feature, FeatureInfo, FeatureKind, FilterFeature, InvocationReport, MacroFeature};
use crate::marshal::{coerce_integer, read_global_string, Selection};
use crate::progress::ProgressSink;
use crate::registry::{FeatureRegistry, RegistrationPass};
use crate::runtime::ScriptRuntime;
use crate::services::HostServices;

const AUTOMATION3_MESSAGE: &str =
    "Attempted to load an Automation 3 script as an Automation 4 Lua script. Automation 3 is no longer supported.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptState {
    Unloaded,
    Ready,
    Failed,
}

/// Script metadata, from the `script_*` globals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScriptMetadata {
    pub name: String,
    pub description: String,
    pub author: String,
    pub version: String,
}

/// Runtime and the features registered into it. Field order matters: the
/// registry keys are dropped before the runtime that owns them.
struct Loaded {
    features: FeatureRegistry,
    runtime: ScriptRuntime,
}

pub struct ScriptSession {
    path: PathBuf,
    services: HostServices,
    metadata: ScriptMetadata,
    state: ScriptState,
    last_error: Option<AutomationError>,
    loaded: Option<Loaded>,
}

impl ScriptSession {
    /// Load `path`. A failed load still yields a session, in state
    /// `Failed`, with the error as its description.
    pub fn load(path: impl Into<PathBuf>, services: HostServices) -> Self {
        let path = path.into();
        let mut session = Self {
            metadata: ScriptMetadata::default(),
            path,
            services,
            state: ScriptState::Unloaded,
            last_error: None,
            loaded: None,
        };
        // Failure is recorded on the session.
        let _ = session.create();
        session
    }

    /// Tear down and load again from disk. Previously returned feature
    /// indices are meaningless afterwards.
    pub fn reload(&mut self) -> Result<(), AutomationError> {
        self.create()
    }

    /// Drop the runtime and every registered feature.
    pub fn unload(&mut self) {
        self.loaded = None;
        self.state = ScriptState::Unloaded;
    }

    fn create(&mut self) -> Result<(), AutomationError> {
        self.unload();
        self.last_error = None;

        match self.load_runtime() {
            Ok((loaded, metadata)) => {
                log::info!(
                    "Loaded script \"{}\" ({} features)",
                    metadata.name,
                    loaded.features.len()
                );
                self.metadata = metadata;
                self.loaded = Some(loaded);
                self.state = ScriptState::Ready;
                Ok(())
            }
            Err(e) => {
                log::warn!("{}", e);
                self.metadata = ScriptMetadata {
                    name: self.file_name(),
                    description: e.to_string(),
                    author: String::new(),
                    version: String::new(),
                };
                self.state = ScriptState::Failed;
                self.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    fn load_runtime(&self) -> Result<(Loaded, ScriptMetadata), AutomationError> {
        let pretty = self.file_name();
        let load_error = |msg: String| {
            AutomationError::ScriptLoad(format!("Error loading Lua script \"{}\":\n\n{}", pretty, msg))
        };

        let source = fs::read(&self.path).map_err(|e| load_error(e.to_string()))?;

        let pass = RegistrationPass::open();
        let runtime = ScriptRuntime::new(&self.path, &self.services, &pass)
            .map_err(|e| load_error(format_lua_error(&e)))?;
        let lua = runtime.lua();

        let chunk = lua
            .load(source)
            .set_name(format!("@{}", self.path.display()))
            .into_function()
            .map_err(|e| load_error(format_lua_error(&e)))?;

        // Registration pass: top level runs once, on this thread.
        let run = chunk.call::<()>(());
        let features = pass.close();
        run.map_err(|e| {
            AutomationError::ScriptLoad(format!(
                "Error initialising Lua script \"{}\":\n\n{}",
                pretty,
                format_lua_error(&e)
            ))
        })?;

        let version = lua
            .globals()
            .raw_get::<Value>("version")
            .map_err(|e| load_error(format_lua_error(&e)))?;
        if coerce_integer(&version) == Some(3) {
            return Err(AutomationError::ScriptLoad(AUTOMATION3_MESSAGE.to_string()));
        }

        let mut metadata = ScriptMetadata {
            name: read_global_string(lua, "script_name"),
            description: read_global_string(lua, "script_description"),
            author: read_global_string(lua, "script_author"),
            version: read_global_string(lua, "script_version"),
        };
        if metadata.name.is_empty() {
            metadata.name = pretty.clone();
        }
        if metadata.version.is_empty() {
            metadata.version = pretty;
        }

        Ok((Loaded { features, runtime }, metadata))
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    // -- Accessors --------------------------------------------------------------

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> ScriptState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ScriptState::Ready
    }

    pub fn last_error(&self) -> Option<&AutomationError> {
        self.last_error.as_ref()
    }

    pub fn metadata(&self) -> &ScriptMetadata {
        &self.metadata
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn description(&self) -> &str {
        &self.metadata.description
    }

    /// The live runtime, if loaded.
    pub fn runtime(&self) -> Option<&ScriptRuntime> {
        self.loaded.as_ref().map(|l| &l.runtime)
    }

    /// All registered features, in registration order.
    pub fn features(&self) -> Vec<FeatureInfo> {
        match &self.loaded {
            Some(l) => l.features.iter().map(|f| f.info().clone()).collect(),
            None => Vec::new(),
        }
    }

    pub fn features_of_kind(&self, kind: FeatureKind) -> Vec<FeatureInfo> {
        match &self.loaded {
            Some(l) => l.features.of_kind(kind).map(|f| f.info().clone()).collect(),
            None => Vec::new(),
        }
    }

    pub fn find_feature(&self, kind: FeatureKind, name: &str) -> Option<FeatureInfo> {
        self.features_of_kind(kind).into_iter().find(|f| f.name == name)
    }

    fn lookup(&self, index: usize) -> Result<(&Feature, &ScriptRuntime), AutomationError> {
        let loaded = self.loaded.as_ref().ok_or(AutomationError::NotReady)?;
        Ok((loaded.features.lookup(index)?, &loaded.runtime))
    }

    fn lookup_macro(&self, index: usize) -> Result<(&MacroFeature, &ScriptRuntime), AutomationError> {
        let (feature, runtime) = self.lookup(index)?;
        let m = feature.as_macro().ok_or(AutomationError::WrongKind {
            index,
            expected: FeatureKind::Macro,
        })?;
        Ok((m, runtime))
    }

    fn lookup_filter(&self, index: usize) -> Result<(&FilterFeature, &ScriptRuntime), AutomationError> {
        let (feature, runtime) = self.lookup(index)?;
        let f = feature.as_filter().ok_or(AutomationError::WrongKind {
            index,
            expected: FeatureKind::Filter,
        })?;
        Ok((f, runtime))
    }

    // -- Invocation -------------------------------------------------------------

    pub fn validate_macro(
        &self,
        index: usize,
        document: &Document,
        selection: &Selection,
    ) -> Result<bool, AutomationError> {
        let (m, runtime) = self.lookup_macro(index)?;
        Ok(m.validate(runtime, document, selection))
    }

    pub fn process_macro(
        &self,
        index: usize,
        document: &mut Document,
        selection: &mut Selection,
        sink: &mut dyn ProgressSink,
    ) -> Result<InvocationReport, AutomationError> {
        let (m, runtime) = self.lookup_macro(index)?;
        m.process(runtime, document, selection, sink)
    }

    pub fn build_config_dialog(
        &self,
        index: usize,
        document: &Document,
    ) -> Result<Option<ConfigDialog>, AutomationError> {
        let (f, runtime) = self.lookup_filter(index)?;
        Ok(f.build_config_dialog(runtime, document))
    }

    pub fn process_filter(
        &self,
        index: usize,
        document: &mut Document,
        dialog: Option<&ConfigDialog>,
        sink: &mut dyn ProgressSink,
    ) -> Result<InvocationReport, AutomationError> {
        let (f, runtime) = self.lookup_filter(index)?;
        f.process_subs(runtime, document, dialog, sink)
    }
}
