//! Lua automation for subtitle documents.
//!
//! # Architecture
//!
//! 1. **ScriptSession** owns one Lua runtime per script file and the features
//!    the script registered while its top level ran
//! 2. **Feature** (macro or export filter) holds registry keys for the
//!    script's callables; it is always invoked with its owning runtime
//! 3. **DocumentSnapshot** is the only way a script sees a document
//! 4. **threaded::run** executes processing functions on a worker thread
//!    while the caller drains progress and polls for cancellation
//!
//! # Critical Rule
//!
//! **Scripts never touch the host document directly.**
//!
//! A script edits a private copy of the entries through its `subs` handle.
//! When the invocation ends the copy is committed in one step (one undo
//! entry for macros, none for export filters) and the handle turns stale.
//!
//! # Indexing
//!
//! The host works in zero-based line indices; scripts see one-based ones.
//! `marshal` is the only module that converts.

pub mod dialog;
mod error;
pub mod feature;
mod host_api;
pub mod include;
pub mod manager;
pub mod marshal;
pub mod progress;
pub mod registry;
mod runtime;
pub mod services;
pub mod session;
pub mod threaded;

pub use dialog::{ConfigDialog, ControlClass, ControlValue, DialogControl};
pub use error::{format_lua_error, AutomationError};
pub use feature::{
    Feature, FeatureInfo, FeatureKind, FilterFeature, InvocationReport, InvocationStatus,
    MacroFeature,
};
pub use host_api::LUA_AUTOMATION_VERSION;
pub use manager::{is_lua_script, FeatureRef, ScriptManager};
pub use marshal::{DocumentSnapshot, Selection};
pub use progress::{
    CancelToken, CollectingProgress, LogProgress, ProgressEvent, ProgressRoute, ProgressSink,
};
pub use registry::FeatureRegistry;
pub use runtime::{lua_value_to_string, ScriptRuntime};
pub use services::{
    ConstantFrameRate, HostServices, MonospaceMetrics, NoVideo, TextExtents, TextMetrics,
    VideoProvider, VideoSize,
};
pub use session::{ScriptMetadata, ScriptSession, ScriptState};
