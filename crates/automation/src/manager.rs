//! Script discovery and cross-script feature listing.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::feature::{FeatureInfo, FeatureKind};
use crate::services::HostServices;
use crate::session::ScriptSession;

/// True for files this engine loads: `.lua`, any case.
pub fn is_lua_script(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("lua"))
}

/// A feature together with the script it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRef {
    pub script: usize,
    #[serde(flatten)]
    pub info: FeatureInfo,
}

pub struct ScriptManager {
    services: HostServices,
    scripts: Vec<ScriptSession>,
}

impl ScriptManager {
    pub fn new(services: HostServices) -> Self {
        Self { services, scripts: Vec::new() }
    }

    pub fn services(&self) -> &HostServices {
        &self.services
    }

    /// Load one script. `None` if the file is not a Lua script; a script
    /// that fails to load is still added.
    pub fn add(&mut self, path: impl Into<PathBuf>) -> Option<usize> {
        let path = path.into();
        if !is_lua_script(&path) {
            log::debug!("Not a Lua script, skipping: {}", path.display());
            return None;
        }
        self.scripts.push(ScriptSession::load(path, self.services.clone()));
        Some(self.scripts.len() - 1)
    }

    /// Load every `.lua` file in `dirs`, each directory in file-name order.
    /// Returns the number of scripts added.
    pub fn autoload(&mut self, dirs: &[PathBuf]) -> usize {
        let mut added = 0;
        for dir in dirs {
            let entries = match fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    log::warn!("Cannot read autoload directory {}: {}", dir.display(), e);
                    continue;
                }
            };
            let mut files: Vec<PathBuf> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file() && is_lua_script(p))
                .collect();
            files.sort();

            for file in files {
                if self.add(file).is_some() {
                    added += 1;
                }
            }
        }
        let failed = self.scripts.iter().filter(|s| !s.is_ready()).count();
        if failed > 0 {
            log::warn!("{} automation script(s) failed to load", failed);
        }
        added
    }

    pub fn reload_all(&mut self) {
        for script in &mut self.scripts {
            // Failures are recorded on the session.
            let _ = script.reload();
        }
    }

    pub fn scripts(&self) -> &[ScriptSession] {
        &self.scripts
    }

    pub fn script(&self, index: usize) -> Option<&ScriptSession> {
        self.scripts.get(index)
    }

    pub fn script_mut(&mut self, index: usize) -> Option<&mut ScriptSession> {
        self.scripts.get_mut(index)
    }

    /// Macros from every ready script, in load then registration order.
    pub fn macros(&self) -> Vec<FeatureRef> {
        self.features_of_kind(FeatureKind::Macro)
    }

    pub fn find_macro(&self, name: &str) -> Option<FeatureRef> {
        self.macros().into_iter().find(|m| m.info.name == name)
    }

    /// Export filters ordered by merit, highest first. Equal merits keep
    /// load order.
    pub fn filter_chain(&self) -> Vec<FeatureRef> {
        let mut filters = self.features_of_kind(FeatureKind::Filter);
        filters.sort_by(|a, b| b.info.merit.unwrap_or(0).cmp(&a.info.merit.unwrap_or(0)));
        filters
    }

    fn features_of_kind(&self, kind: FeatureKind) -> Vec<FeatureRef> {
        self.scripts
            .iter()
            .enumerate()
            .flat_map(|(script, session)| {
                session
                    .features_of_kind(kind)
                    .into_iter()
                    .map(move |info| FeatureRef { script, info })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_lua_script() {
        assert!(is_lua_script(Path::new("a.lua")));
        assert!(is_lua_script(Path::new("/x/B.LUA")));
        assert!(!is_lua_script(Path::new("a.moon")));
        assert!(!is_lua_script(Path::new("lua")));
    }

    #[test]
    fn test_autoload_sorted_and_failures_kept() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.lua"), "script_name = 'B'").unwrap();
        fs::write(dir.path().join("a.lua"), "script_name = 'A'").unwrap();
        fs::write(dir.path().join("c.lua"), "error('broken')").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut m = ScriptManager::new(HostServices::default());
        assert_eq!(m.autoload(&[dir.path().to_path_buf()]), 3);
        let names: Vec<&str> = m.scripts().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["A", "B", "c.lua"]);
        assert!(!m.scripts()[2].is_ready());
    }

    #[test]
    fn test_filter_chain_by_merit() {
        let dir = tempfile::tempdir().unwrap();
        let one = dir.path().join("one.lua");
        let two = dir.path().join("two.lua");
        fs::write(
            &one,
            r#"
            aegisub.register_filter("low", "", 10, function() end)
            aegisub.register_filter("tie-first", "", 50, function() end)
            aegisub.register_macro("m", "", function() end)
            "#,
        )
        .unwrap();
        fs::write(
            &two,
            r#"
            aegisub.register_filter("tie-second", "", 50, function() end)
            aegisub.register_filter("high", "", 90, function() end)
            "#,
        )
        .unwrap();

        let mut m = ScriptManager::new(HostServices::default());
        m.add(&one);
        m.add(&two);
        let chain: Vec<String> = m.filter_chain().into_iter().map(|f| f.info.name).collect();
        assert_eq!(chain, vec!["high", "tie-first", "tie-second", "low"]);

        let mac = m.find_macro("m").unwrap();
        assert_eq!((mac.script, mac.info.index), (0, 2));
    }
}
