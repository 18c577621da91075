//! `subauto macro`: validate, then run one macro over a subtitle file.

use std::path::PathBuf;

use serde::Serialize;

use subauto_automation::{FeatureKind, InvocationStatus, Selection};
use subauto_config::Settings;

use crate::exit_codes::EXIT_MACRO_NOT_APPLICABLE;
use crate::util::{format_line_list, parse_line_list, parse_line_number};
use crate::{build_progress, build_services, load_document, load_script, print_script_log};
use crate::{CliError, RunArgs};

/// `--json` result. Line numbers are one-based.
#[derive(Serialize)]
struct MacroResult<'a> {
    script: &'a str,
    name: &'a str,
    status: InvocationStatus,
    committed: bool,
    selection: Vec<usize>,
    active: Option<usize>,
    output: Option<String>,
    log: &'a [String],
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_macro(
    settings: &Settings,
    run: &RunArgs,
    script: PathBuf,
    name: String,
    subs: PathBuf,
    select: Option<String>,
    active: Option<String>,
    output: Option<PathBuf>,
    json: bool,
) -> Result<(), CliError> {
    let services = build_services(settings, run)?;
    let mut progress = build_progress(settings, run)?;
    let mut document = load_document(&subs)?;
    let session = load_script(&script, &services)?;

    let feature = session.find_feature(FeatureKind::Macro, &name).ok_or_else(|| {
        let known: Vec<String> = session
            .features_of_kind(FeatureKind::Macro)
            .into_iter()
            .map(|f| f.name)
            .collect();
        let err = CliError::args(format!("no macro named '{}' in {}", name, script.display()));
        if known.is_empty() {
            err.with_hint("this script registers no macros")
        } else {
            err.with_hint(format!("available macros: {}", known.join(", ")))
        }
    })?;

    let lines = match &select {
        Some(spec) => parse_line_list(spec).map_err(CliError::args)?,
        None => Vec::new(),
    };
    let active = match &active {
        Some(text) => Some(parse_line_number(text).map_err(CliError::args)?),
        None => lines.first().copied(),
    };
    if let Some(&out_of_range) = lines.iter().chain(active.iter()).find(|&&i| i >= document.len()) {
        return Err(CliError::args(format!(
            "line {} is out of range ({} has {} lines)",
            out_of_range + 1,
            subs.display(),
            document.len()
        )));
    }
    let mut selection = Selection::new(lines, active);

    let applicable = session
        .validate_macro(feature.index, &document, &selection)
        .map_err(CliError::automation)?;
    if !applicable {
        return Err(CliError {
            code: EXIT_MACRO_NOT_APPLICABLE,
            message: format!("macro '{}' cannot run on this selection", name),
            hint: Some("check --select and --active".to_string()),
        });
    }

    log::info!("Running macro \"{}\" from {}", name, script.display());
    let report = session
        .process_macro(feature.index, &mut document, &mut selection, &mut progress)
        .map_err(CliError::automation)?;
    print_script_log(&progress);

    match report.status {
        InvocationStatus::Completed => {}
        InvocationStatus::Failed => {
            return Err(CliError::script(format!(
                "macro '{}' failed: {}",
                name,
                report.error.unwrap_or_default()
            ))
            .with_hint("nothing was written"));
        }
        InvocationStatus::Cancelled => {
            // The detached worker may still hold the Lua state; dropping the
            // session would wait for it. Process exit reclaims it instead.
            std::mem::forget(session);
            return Err(CliError::cancelled(format!("macro '{}' was cancelled", name))
                .with_hint("nothing was written"));
        }
    }

    // Without --output the file is only rewritten when something changed.
    let target = match output {
        Some(path) => Some(path),
        None if report.committed => Some(subs.clone()),
        None => None,
    };
    if let Some(path) = &target {
        document.save(path).map_err(CliError::document)?;
    }

    let selection_out: Vec<usize> = selection.lines.iter().map(|i| i + 1).collect();
    let active_out = selection.active.map(|i| i + 1);

    if json {
        let result = MacroResult {
            script: session.name(),
            name: &name,
            status: report.status,
            committed: report.committed,
            selection: selection_out,
            active: active_out,
            output: target.as_ref().map(|p| p.display().to_string()),
            log: &progress.lines,
        };
        let text = serde_json::to_string_pretty(&result)
            .map_err(|e| CliError::script(format!("failed to encode result: {}", e)))?;
        println!("{}", text);
    } else {
        println!("selection: {}", format_line_list(&selection.lines));
        if let Some(active) = active_out {
            println!("active:    {}", active);
        }
        match &target {
            Some(path) if report.committed => println!("wrote:     {}", path.display()),
            Some(path) => println!("wrote:     {} (unchanged)", path.display()),
            None => println!("unchanged"),
        }
    }

    Ok(())
}
