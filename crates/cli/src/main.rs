// subauto - run subtitle automation scripts headless

mod exit_codes;
mod export;
mod macros;
mod scripts;
mod util;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};

use subauto_automation::{
    AutomationError, CollectingProgress, ConstantFrameRate, HostServices, ScriptSession,
};
use subauto_config::Settings;
use subauto_document::{Document, DocumentError};

use exit_codes::{
    automation_exit_code, EXIT_CANCELLED, EXIT_ERROR, EXIT_IO, EXIT_PARSE, EXIT_SCRIPT_LOAD,
    EXIT_SUCCESS, EXIT_USAGE,
};

#[derive(Parser)]
#[command(name = "subauto")]
#[command(about = "Run Lua automation scripts against subtitle files")]
#[command(long_version = long_version())]
#[command(version)]
#[command(subcommand_required = false)]
struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true, env = "SUBAUTO_CONFIG")]
    config: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Options shared by commands that run script code.
#[derive(clap::Args, Clone)]
struct RunArgs {
    /// Give up waiting after this many seconds (exit code 32)
    #[arg(long, value_name = "SECS")]
    timeout: Option<f64>,

    /// Frame rate for frame/time conversion, e.g. 25 or 24000/1001
    #[arg(long)]
    fps: Option<String>,

    /// Video resolution reported to scripts, e.g. 1920x1080 (needs --fps)
    #[arg(long, value_name = "WxH", requires = "fps")]
    video_size: Option<String>,

    /// Extra include directory for include() and require() (repeatable)
    #[arg(long = "include", value_name = "DIR")]
    include: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load scripts and list what they register
    #[command(after_help = "\
Without FILES, every .lua file in the configured autoload directories is loaded.

Examples:
  subauto scripts
  subauto scripts karaoke.lua cleanup.lua
  subauto scripts --json tools/*.lua")]
    Scripts {
        /// Script files to load
        files: Vec<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate and run a macro on a subtitle file
    #[command(after_help = "\
Line numbers count entries from 1, in file order, the way scripts see them.

Examples:
  subauto macro --script trim.lua --name 'Trim text' --subs ep01.ass --select 12-20
  subauto macro --script shift.lua --name Shift --subs ep01.ass --output out.ass --json
  subauto macro --script slow.lua --name Slow --subs ep01.ass --timeout 30")]
    Macro {
        /// Script that registers the macro
        #[arg(long)]
        script: PathBuf,

        /// Macro name as registered
        #[arg(long)]
        name: String,

        /// Subtitle file to work on
        #[arg(long)]
        subs: PathBuf,

        /// Selected lines, e.g. 3,5,8-10
        #[arg(long)]
        select: Option<String>,

        /// Active line (defaults to the first selected line)
        #[arg(long)]
        active: Option<String>,

        /// Write the result here instead of over --subs
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Output the result as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Run export filters over a subtitle file
    #[command(after_help = "\
Filters run highest merit first. Without --filter, every filter the scripts
register is applied. --option sets a configuration dialog value by control
name for whichever filter declares that control.

Examples:
  subauto export --subs ep01.ass --script strip.lua --output ep01.clean.ass
  subauto export --subs ep01.ass --script a.lua --script b.lua --filter 'Strip comments'
  subauto export --subs ep01.ass --script shift.lua --option offset=250 > out.ass")]
    Export {
        /// Subtitle file to export
        #[arg(long)]
        subs: PathBuf,

        /// Script that registers filters (repeatable)
        #[arg(long = "script", required = true)]
        scripts: Vec<PathBuf>,

        /// Only run these filters (repeatable)
        #[arg(long = "filter", value_name = "NAME")]
        filters: Vec<String>,

        /// Configuration value, KEY=VALUE (repeatable)
        #[arg(long = "option", value_name = "KEY=VALUE")]
        options: Vec<String>,

        /// Output file (stdout if omitted)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        #[command(flatten)]
        run: RunArgs,
    },
}

fn long_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nlua:     ", env!("LUA_FLAVOUR"),
            "\nbuild:   debug",
            "\ntarget:  ", env!("TARGET"),
        )
    } else {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nlua:     ", env!("LUA_FLAVOUR"),
            "\nbuild:   release",
            "\ntarget:  ", env!("TARGET"),
        )
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };

    let result = match cli.command {
        None => {
            eprintln!("Usage: subauto <command> [options]");
            eprintln!("       subauto --help for more information");
            Ok(())
        }
        Some(Commands::Scripts { files, json }) => scripts::cmd_scripts(&settings, files, json),
        Some(Commands::Macro { script, name, subs, select, active, output, json, run }) => {
            macros::cmd_macro(&settings, &run, script, name, subs, select, active, output, json)
        }
        Some(Commands::Export { subs, scripts, filters, options, output, run }) => {
            export::cmd_export(&settings, &run, subs, scripts, filters, options, output)
        }
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

/// stderr logging; RUST_LOG still wins when set.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_env("RUST_LOG")
        .format_timestamp(None)
        .init();
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self { code: EXIT_PARSE, message: msg.into(), hint: None }
    }

    pub fn script(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self { code: EXIT_CANCELLED, message: msg.into(), hint: None }
    }

    /// Create error from an automation error with the matching exit code.
    pub fn automation(err: AutomationError) -> Self {
        let code = automation_exit_code(&err);
        let hint = match &err {
            AutomationError::Busy => {
                Some("a cancelled invocation is still running in this script".to_string())
            }
            AutomationError::NotReady => Some("the script failed to load".to_string()),
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }

    pub fn document(err: DocumentError) -> Self {
        match err {
            DocumentError::Parse { .. } => Self::parse(err.to_string()),
            DocumentError::Io(_) => Self::io(err.to_string()),
            _ => Self { code: EXIT_ERROR, message: err.to_string(), hint: None },
        }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Host services for a run: settings, plus any video and include overrides
/// from the command line.
fn build_services(settings: &Settings, run: &RunArgs) -> Result<HostServices, CliError> {
    let mut include_dirs = run.include.clone();
    include_dirs.extend(settings.include_dirs());
    let mut services = HostServices::from_settings(settings).with_include_dirs(include_dirs);

    if let Some(fps) = &run.fps {
        let (num, den) = util::parse_fps(fps).map_err(CliError::args)?;
        let mut video = ConstantFrameRate::new(num, den);
        if let Some(size) = &run.video_size {
            let (w, h) = util::parse_size(size).map_err(CliError::args)?;
            video = video.with_size(w, h);
        }
        services = services.with_video(Arc::new(video));
    }
    Ok(services)
}

fn build_progress(settings: &Settings, run: &RunArgs) -> Result<CollectingProgress, CliError> {
    let progress = CollectingProgress::with_max_lines(settings.max_log_lines);
    match run.timeout {
        None => Ok(progress),
        Some(secs) if secs.is_finite() && secs > 0.0 => {
            Ok(progress.with_deadline(Instant::now() + Duration::from_secs_f64(secs)))
        }
        Some(secs) => Err(CliError::args(format!("invalid timeout: {}", secs))),
    }
}

fn load_document(path: &Path) -> Result<Document, CliError> {
    if !path.exists() {
        return Err(CliError::io(format!("file not found: {}", path.display())));
    }
    Document::load(path).map_err(|e| match e {
        DocumentError::Parse { line, message } => {
            CliError::parse(format!("{}:{}: {}", path.display(), line, message))
        }
        other => CliError::document(other),
    })
}

/// Load a script that must be usable.
fn load_script(path: &Path, services: &HostServices) -> Result<ScriptSession, CliError> {
    if !path.exists() {
        return Err(CliError::io(format!("file not found: {}", path.display())));
    }
    let session = ScriptSession::load(path, services.clone());
    if !session.is_ready() {
        return Err(CliError {
            code: EXIT_SCRIPT_LOAD,
            message: session.description().to_string(),
            hint: None,
        });
    }
    Ok(session)
}

/// Script output goes to stderr so stdout stays machine-readable.
fn print_script_log(progress: &CollectingProgress) {
    for line in &progress.lines {
        eprintln!("{}", line);
    }
    if progress.truncated {
        eprintln!("[script log truncated]");
    }
}
