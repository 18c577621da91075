//! Lua runtime instances for automation scripts.
//!
//! One `ScriptRuntime` per loaded script. Creation applies the capability
//! policy once: the fixed set of standard libraries, the raw file loaders
//! swapped for `include()`, `print` redirected to the progress route, and the
//! `aegisub` host table installed.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mlua::{Lua, LuaOptions, MultiValue, StdLib, Value};

use crate::host_api::{self, HostContext};
use crate::include::{self, IncludeResolver};
use crate::progress::{ProgressEvent, ProgressRoute};
use crate::registry::RegistrationPass;
use crate::services::HostServices;

/// Libraries scripts get. `debug` is not among them.
fn host_stdlib() -> StdLib {
    StdLib::PACKAGE
        | StdLib::STRING
        | StdLib::TABLE
        | StdLib::MATH
        | StdLib::IO
        | StdLib::OS
        | StdLib::UTF8
        | StdLib::COROUTINE
}

pub struct ScriptRuntime {
    lua: Lua,
    route: ProgressRoute,
    busy: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl ScriptRuntime {
    pub(crate) fn new(
        script_path: &Path,
        services: &HostServices,
        pass: &RegistrationPass,
    ) -> mlua::Result<Self> {
        let lua = Lua::new_with(host_stdlib(), LuaOptions::default())?;
        let route = ProgressRoute::new();

        // Override print() to feed the progress log
        {
            let route = route.clone();
            let print_fn = lua.create_function(move |_, args: MultiValue| {
                let parts: Vec<String> = args
                    .into_iter()
                    .map(|v| lua_value_to_string(&v))
                    .collect();
                route.emit(ProgressEvent::Log(parts.join("\t")));
                Ok(())
            })?;
            lua.globals().set("print", print_fn)?;
        }

        // Raw file loaders are replaced by the host include mechanism
        let globals = lua.globals();
        globals.set("dofile", Value::Nil)?;
        globals.set("loadfile", Value::Nil)?;
        include::install(
            &lua,
            IncludeResolver::new(script_path, services.include_dirs.clone()),
        )?;

        host_api::install(
            &lua,
            HostContext {
                pass: pass.clone(),
                route: route.clone(),
                services: services.clone(),
            },
        )?;

        Ok(Self {
            lua,
            route,
            busy: Arc::new(AtomicBool::new(false)),
            poll_interval: services.poll_interval,
        })
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    pub fn route(&self) -> &ProgressRoute {
        &self.route
    }

    /// True while a threaded invocation (possibly detached) is running.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub(crate) fn busy_flag(&self) -> &Arc<AtomicBool> {
        &self.busy
    }
}

/// Convert a Lua value to a display string, like `tostring` for plain values.
pub fn lua_value_to_string(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{:.1}", n)
            } else {
                format!("{}", n)
            }
        }
        Value::String(s) => s.to_string_lossy().to_string(),
        Value::Table(_) => "table".to_string(),
        Value::Function(_) => "function".to_string(),
        Value::Thread(_) => "thread".to_string(),
        Value::UserData(_) => "userdata".to_string(),
        Value::LightUserData(_) => "lightuserdata".to_string(),
        Value::Error(e) => format!("error: {}", e),
        _ => "<unknown>".to_string(),
    }
}
