//! Host-mediated file loading: `include()` and the `require` file searcher.
//!
//! The raw file loaders (`dofile`, `loadfile`) are gone from script
//! environments. Everything a script pulls in from disk goes through here.

use std::fs;
use std::path::{Path, PathBuf};

use mlua::{Lua, MultiValue, Value};

use crate::error::format_lua_error;

/// Resolves `include()` names for one script.
///
/// - filename only: first match in the include directories
/// - relative path with directories: relative to the script's directory
/// - absolute path: used as-is
#[derive(Debug, Clone)]
pub struct IncludeResolver {
    script_dir: PathBuf,
    include_dirs: Vec<PathBuf>,
}

impl IncludeResolver {
    pub fn new(script_path: &Path, include_dirs: Vec<PathBuf>) -> Self {
        let script_dir = script_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self { script_dir, include_dirs }
    }

    pub fn include_dirs(&self) -> &[PathBuf] {
        &self.include_dirs
    }

    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let path = Path::new(name);
        let candidate = if path.is_absolute() {
            path.to_path_buf()
        } else if path.components().count() == 1 {
            return self
                .include_dirs
                .iter()
                .map(|dir| dir.join(path))
                .find(|p| p.is_file());
        } else {
            self.script_dir.join(path)
        };
        candidate.is_file().then_some(candidate)
    }
}

/// Load a Lua file through Rust, naming the chunk after its path.
fn load_file(lua: &Lua, path: &Path) -> Result<mlua::Function, String> {
    let source = fs::read(path).map_err(|e| e.to_string())?;
    lua.load(source)
        .set_name(format!("@{}", path.display()))
        .into_function()
        .map_err(|e| format_lua_error(&e))
}

/// Install `include`, extend `package.path` and replace the file searcher.
pub(crate) fn install(lua: &Lua, resolver: IncludeResolver) -> mlua::Result<()> {
    let globals = lua.globals();

    let package: mlua::Table = globals.get("package")?;
    let mut search_path: String = package.get("path")?;
    for dir in resolver.include_dirs() {
        let dir = dir.display();
        search_path.push_str(&format!(";{dir}/?.lua;{dir}/?/init.lua"));
    }
    package.set("path", search_path)?;

    let searchers: mlua::Table = package.get("searchers")?;
    searchers.raw_set(2, lua.create_function(search_module)?)?;

    let include = lua.create_function(move |lua, name: Value| {
        let Value::String(name) = name else {
            return Err(mlua::Error::RuntimeError(
                "Argument to include must be a string".to_string(),
            ));
        };
        let name = name.to_str()?.to_string();
        let path = resolver
            .resolve(&name)
            .ok_or_else(|| mlua::Error::RuntimeError(format!("Lua include not found: {}", name)))?;
        let chunk = load_file(lua, &path).map_err(|msg| {
            mlua::Error::RuntimeError(format!(
                "Error loading Lua include \"{}\":\n\n{}",
                path.display(),
                msg
            ))
        })?;
        chunk.call::<MultiValue>(())
    })?;
    globals.set("include", include)?;

    Ok(())
}

/// Replacement for the `package.searchers[2]` file searcher.
fn search_module(lua: &Lua, name: String) -> mlua::Result<MultiValue> {
    let package: mlua::Table = lua.globals().get("package")?;
    let search_path: String = package.get("path")?;
    let module = name.replace('.', std::path::MAIN_SEPARATOR_STR);

    let mut tried = String::new();
    for template in search_path.split(';').filter(|t| !t.is_empty()) {
        let filename = template.replace('?', &module);
        if !Path::new(&filename).is_file() {
            tried.push_str(&format!("\n\tno file '{}'", filename));
            continue;
        }
        let chunk = load_file(lua, Path::new(&filename)).map_err(|msg| {
            mlua::Error::RuntimeError(format!("Error loading Lua module \"{}\":\n\n{}", filename, msg))
        })?;
        return Ok(MultiValue::from_iter([
            Value::Function(chunk),
            Value::String(lua.create_string(&filename)?),
        ]));
    }

    Ok(MultiValue::from_iter([Value::String(lua.create_string(&tried)?)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_resolve_precedence() {
        let root = tempfile::tempdir().unwrap();
        let inc = root.path().join("inc");
        let scripts = root.path().join("scripts");
        fs::create_dir_all(inc.join("nested")).unwrap();
        fs::create_dir_all(scripts.join("lib")).unwrap();
        fs::write(inc.join("util.lua"), "return 1").unwrap();
        fs::write(scripts.join("util.lua"), "return 2").unwrap();
        fs::write(scripts.join("lib").join("local.lua"), "return 3").unwrap();

        let resolver = IncludeResolver::new(&scripts.join("main.lua"), vec![inc.clone()]);

        // Filename only: include dirs, not the script directory
        assert_eq!(resolver.resolve("util.lua"), Some(inc.join("util.lua")));
        // Relative with directories: script directory
        assert_eq!(resolver.resolve("lib/local.lua"), Some(scripts.join("lib/local.lua")));
        // Absolute: as-is
        let abs = scripts.join("util.lua");
        assert_eq!(resolver.resolve(abs.to_str().unwrap()), Some(abs.clone()));
        assert_eq!(resolver.resolve("missing.lua"), None);
    }

    #[test]
    fn test_include_and_require() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("helper.lua"), "return 40 + 2").unwrap();
        fs::create_dir_all(root.path().join("pkg")).unwrap();
        fs::write(root.path().join("pkg").join("init.lua"), "return { answer = 7 }").unwrap();

        let lua = Lua::new();
        let resolver = IncludeResolver::new(&root.path().join("s.lua"), vec![root.path().to_path_buf()]);
        install(&lua, resolver).unwrap();

        assert_eq!(lua.load("return include('helper.lua')").eval::<i64>().unwrap(), 42);
        assert_eq!(lua.load("return require('pkg').answer").eval::<i64>().unwrap(), 7);

        let err = lua.load("include('nope.lua')").exec().unwrap_err();
        assert!(err.to_string().contains("Lua include not found: nope.lua"));
        let err = lua.load("include(5)").exec().unwrap_err();
        assert!(err.to_string().contains("Argument to include must be a string"));
    }

    #[test]
    fn test_include_syntax_error_names_file() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("bad.lua"), "return (").unwrap();

        let lua = Lua::new();
        let resolver = IncludeResolver::new(&root.path().join("s.lua"), vec![root.path().to_path_buf()]);
        install(&lua, resolver).unwrap();

        let err = lua.load("include('bad.lua')").exec().unwrap_err();
        assert!(err.to_string().contains("Error loading Lua include"));
    }
}
