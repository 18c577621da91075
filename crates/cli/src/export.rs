//! `subauto export`: run export filters from one or more scripts.
//!
//! All configuration dialogs are built and filled in before the first filter
//! runs, so every filter configures against the original document.

use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;

use subauto_automation::{ConfigDialog, FeatureRef, InvocationStatus, ScriptManager};
use subauto_config::Settings;

use crate::exit_codes::EXIT_SCRIPT_LOAD;
use crate::util::parse_option;
use crate::{build_progress, build_services, load_document, print_script_log};
use crate::{CliError, RunArgs};

pub fn cmd_export(
    settings: &Settings,
    run: &RunArgs,
    subs: PathBuf,
    scripts: Vec<PathBuf>,
    filters: Vec<String>,
    options: Vec<String>,
    output: Option<PathBuf>,
) -> Result<(), CliError> {
    let services = build_services(settings, run)?;
    let mut progress = build_progress(settings, run)?;
    let options = options
        .iter()
        .map(|raw| parse_option(raw))
        .collect::<Result<Vec<_>, _>>()
        .map_err(CliError::args)?;
    let mut document = load_document(&subs)?;

    let mut manager = ScriptManager::new(services);
    for path in &scripts {
        if !path.exists() {
            return Err(CliError::io(format!("file not found: {}", path.display())));
        }
        let index = manager
            .add(path)
            .ok_or_else(|| CliError::args(format!("not a Lua script: {}", path.display())))?;
        if let Some(session) = manager.script(index).filter(|s| !s.is_ready()) {
            return Err(CliError {
                code: EXIT_SCRIPT_LOAD,
                message: session.description().to_string(),
                hint: None,
            });
        }
    }

    let chain = select_filters(manager.filter_chain(), &filters)?;
    if chain.is_empty() {
        return Err(CliError::args("no export filters registered by the given scripts"));
    }

    let mut dialogs = Vec::with_capacity(chain.len());
    for filter in &chain {
        let session = manager
            .script(filter.script)
            .ok_or_else(|| CliError::script(format!("script #{} vanished", filter.script)))?;
        let dialog = session
            .build_config_dialog(filter.info.index, &document)
            .map_err(CliError::automation)?;
        dialogs.push(dialog);
    }
    apply_options(&mut dialogs, &chain, &options)?;

    for (filter, dialog) in chain.iter().zip(&dialogs) {
        let Some(session) = manager.script(filter.script) else { continue };
        log::info!("Applying export filter \"{}\"", filter.info.name);
        let report = session
            .process_filter(filter.info.index, &mut document, dialog.as_ref(), &mut progress)
            .map_err(CliError::automation)?;

        match report.status {
            InvocationStatus::Completed => {}
            InvocationStatus::Failed => {
                print_script_log(&progress);
                return Err(CliError::script(format!(
                    "export filter '{}' failed: {}",
                    filter.info.name,
                    report.error.unwrap_or_default()
                )));
            }
            InvocationStatus::Cancelled => {
                print_script_log(&progress);
                let message = format!("export filter '{}' was cancelled", filter.info.name);
                // Dropping the scripts would wait for the detached worker.
                std::mem::forget(manager);
                return Err(CliError::cancelled(message));
            }
        }
    }
    print_script_log(&progress);

    match output {
        Some(path) => {
            document.save(&path).map_err(CliError::document)?;
            eprintln!("Exported {} lines to {}", document.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(document.to_ass_string().as_bytes())
                .map_err(|e| CliError::io(format!("stdout: {}", e)))?;
        }
    }

    Ok(())
}

/// Keep the filters named on the command line, in chain order. Every name
/// must match a registered filter.
fn select_filters(chain: Vec<FeatureRef>, names: &[String]) -> Result<Vec<FeatureRef>, CliError> {
    if names.is_empty() {
        return Ok(chain);
    }
    let known: HashSet<&str> = chain.iter().map(|f| f.info.name.as_str()).collect();
    if let Some(missing) = names.iter().find(|n| !known.contains(n.as_str())) {
        let mut available: Vec<&str> = known.into_iter().collect();
        available.sort_unstable();
        return Err(CliError::args(format!("no export filter named '{}'", missing))
            .with_hint(format!("available filters: {}", available.join(", "))));
    }
    Ok(chain
        .into_iter()
        .filter(|f| names.iter().any(|n| *n == f.info.name))
        .collect())
}

/// Each option goes to every dialog that has a control by that name. An
/// option no dialog declares is an error.
fn apply_options(
    dialogs: &mut [Option<ConfigDialog>],
    chain: &[FeatureRef],
    options: &[(String, String)],
) -> Result<(), CliError> {
    for (key, value) in options {
        let mut used = false;
        for (dialog, filter) in dialogs.iter_mut().zip(chain) {
            let Some(dialog) = dialog else { continue };
            if dialog.control(key).is_none() {
                continue;
            }
            dialog.set_value(key, value).map_err(|e| {
                CliError::args(format!("filter '{}': {}", filter.info.name, e))
            })?;
            used = true;
        }
        if !used {
            return Err(CliError::args(format!(
                "no export filter has a setting named '{}'",
                key
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use subauto_automation::{FeatureInfo, FeatureKind};

    fn filter(script: usize, index: usize, name: &str, merit: i32) -> FeatureRef {
        FeatureRef {
            script,
            info: FeatureInfo {
                index,
                kind: FeatureKind::Filter,
                name: name.to_string(),
                description: String::new(),
                merit: Some(merit),
                has_configuration: false,
            },
        }
    }

    #[test]
    fn select_keeps_chain_order() {
        let chain = vec![filter(0, 1, "high", 90), filter(1, 0, "mid", 50), filter(0, 0, "low", 10)];
        let picked = select_filters(chain, &["low".to_string(), "high".to_string()]).unwrap();
        let names: Vec<&str> = picked.iter().map(|f| f.info.name.as_str()).collect();
        assert_eq!(names, vec!["high", "low"]);
    }

    #[test]
    fn select_unknown_is_usage_error() {
        let chain = vec![filter(0, 0, "only", 1)];
        let err = select_filters(chain, &["other".to_string()]).unwrap_err();
        assert_eq!(err.code, crate::exit_codes::EXIT_USAGE);
        assert_eq!(err.hint.as_deref(), Some("available filters: only"));
    }

    #[test]
    fn unused_option_is_rejected() {
        let chain = vec![filter(0, 0, "plain", 1)];
        let mut dialogs = vec![None];
        let err = apply_options(&mut dialogs, &chain, &[("x".to_string(), "1".to_string())])
            .unwrap_err();
        assert!(err.message.contains("'x'"));
    }
}
