//! `subauto scripts`: load scripts and report what they register.

use std::path::PathBuf;

use serde::Serialize;

use subauto_automation::{FeatureInfo, HostServices, ScriptManager, ScriptSession, ScriptState};
use subauto_config::Settings;

use crate::exit_codes::EXIT_SCRIPT_LOAD;
use crate::util::fit_column;
use crate::CliError;

#[derive(Serialize)]
struct ScriptReport<'a> {
    path: String,
    name: &'a str,
    description: &'a str,
    author: &'a str,
    version: &'a str,
    state: ScriptState,
    features: Vec<FeatureInfo>,
}

impl<'a> ScriptReport<'a> {
    fn new(session: &'a ScriptSession) -> Self {
        let meta = session.metadata();
        Self {
            path: session.path().display().to_string(),
            name: &meta.name,
            description: &meta.description,
            author: &meta.author,
            version: &meta.version,
            state: session.state(),
            features: session.features(),
        }
    }
}

pub fn cmd_scripts(settings: &Settings, files: Vec<PathBuf>, json: bool) -> Result<(), CliError> {
    let mut manager = ScriptManager::new(HostServices::from_settings(settings));

    if files.is_empty() {
        let dirs = settings.autoload_dirs();
        if dirs.is_empty() {
            return Err(CliError::args("no script files given and no autoload directory exists")
                .with_hint(format!(
                    "set automation.autoloadPath in {}",
                    Settings::config_path_display()
                )));
        }
        manager.autoload(&dirs);
    } else {
        for path in &files {
            if !path.exists() {
                return Err(CliError::io(format!("file not found: {}", path.display())));
            }
            if manager.add(path).is_none() {
                return Err(CliError::args(format!("not a Lua script: {}", path.display())));
            }
        }
    }

    let reports: Vec<ScriptReport> = manager.scripts().iter().map(ScriptReport::new).collect();
    if json {
        let text = serde_json::to_string_pretty(&reports)
            .map_err(|e| CliError::script(format!("failed to encode result: {}", e)))?;
        println!("{}", text);
    } else {
        print_scripts_table(&reports);
    }

    let failed = reports.iter().filter(|r| r.state != ScriptState::Ready).count();
    if failed > 0 {
        return Err(CliError {
            code: EXIT_SCRIPT_LOAD,
            message: format!("{} of {} script(s) failed to load", failed, reports.len()),
            hint: None,
        });
    }
    Ok(())
}

fn print_scripts_table(reports: &[ScriptReport]) {
    if reports.is_empty() {
        println!("No scripts found.");
        return;
    }

    println!(
        "{} {} {} STATE",
        fit_column("NAME", 28),
        fit_column("VERSION", 12),
        fit_column("AUTHOR", 16)
    );
    println!("{}", "-".repeat(72));

    for report in reports {
        let state = match report.state {
            ScriptState::Ready => "ready",
            ScriptState::Failed => "failed",
            ScriptState::Unloaded => "unloaded",
        };
        println!(
            "{} {} {} {}",
            fit_column(report.name, 28),
            fit_column(report.version, 12),
            fit_column(report.author, 16),
            state,
        );

        if report.state != ScriptState::Ready {
            for line in report.description.lines().filter(|l| !l.trim().is_empty()) {
                println!("    ! {}", line);
            }
            continue;
        }
        for feature in &report.features {
            let merit = feature.merit.map(|m| format!(" [merit {}]", m)).unwrap_or_default();
            let config = if feature.has_configuration { " [config]" } else { "" };
            println!(
                "    {} {}{}{}",
                fit_column(&feature.kind.to_string(), 7),
                feature.name,
                merit,
                config
            );
            if !feature.description.is_empty() {
                println!("            {}", feature.description);
            }
        }
    }
}
