// Integration tests for the subauto binary: exit codes, --json stdout and
// the files each command writes.
//
// Run with: cargo test -p subauto-cli --test cli_tests -- --nocapture

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const SAMPLE: &str = "\
[Script Info]
Title: sample
ScriptType: v4.00+

[Events]
Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text
Dialogue: 0,0:00:01.00,0:00:02.00,Default,,0,0,0,,   first
Dialogue: 0,0:00:03.00,0:00:04.00,Default,,0,0,0,,second
Dialogue: 0,0:00:05.00,0:00:06.00,Default,,0,0,0,, third
";

const TRIM: &str = r#"
script_name = "Trim tools"
script_author = "tests"
script_version = "1.2"

local function trim(subs, sel, active)
    for _, i in ipairs(sel) do
        local line = subs[i]
        line.text = line.text:match("^%s*(.-)%s*$")
        subs[i] = line
    end
    return {5, 3}
end

local function has_selection(subs, sel, active)
    return #sel > 0
end

aegisub.register_macro("Trim", "Trim selected lines", trim, has_selection)
"#;

/// A scratch directory with a settings file and the sample subtitles.
struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self::with_autoload("")
    }

    fn with_autoload(autoload: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let settings = serde_json::json!({
            "automation.includePath": "",
            "automation.autoloadPath": autoload,
            "automation.pollIntervalMs": 5,
        });
        fs::write(dir.path().join("settings.json"), settings.to_string()).unwrap();
        fs::write(dir.path().join("in.ass"), SAMPLE).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write(&self, name: &str, body: &str) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, body).unwrap();
        path
    }

    fn read(&self, name: &str) -> String {
        fs::read_to_string(self.path(name)).unwrap()
    }

    fn subauto(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_subauto"))
            .current_dir(self.dir.path())
            .env("SUBAUTO_CONFIG", self.path("settings.json"))
            .env_remove("RUST_LOG")
            .args(args)
            .output()
            .expect("run subauto")
    }
}

fn code(output: &Output) -> i32 {
    output.status.code().unwrap_or(-1)
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

/// Assert stdout is a single, parseable JSON value.
fn assert_single_json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let trimmed = stdout.trim();
    assert!(!trimmed.is_empty(), "stdout should not be empty\nstderr: {}", stderr(output));
    serde_json::from_str(trimmed).unwrap_or_else(|e| {
        panic!("stdout must be valid JSON.\nParse error: {}\nstdout:\n{}", e, trimmed)
    })
}

fn dialogue_texts(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter(|l| l.starts_with("Dialogue:"))
        .map(|l| l.splitn(10, ',').nth(9).unwrap_or("").to_string())
        .collect()
}

// ===========================================================================
// subauto scripts
// ===========================================================================

#[test]
fn scripts_json_lists_metadata_and_features() {
    let fx = Fixture::new();
    fx.write("trim.lua", TRIM);

    let output = fx.subauto(&["scripts", "--json", "trim.lua"]);
    assert_eq!(code(&output), 0, "stderr: {}", stderr(&output));

    let val = assert_single_json(&output);
    let script = &val[0];
    assert_eq!(script["name"], "Trim tools");
    assert_eq!(script["version"], "1.2");
    assert_eq!(script["state"], "ready");
    assert_eq!(script["features"][0]["kind"], "macro");
    assert_eq!(script["features"][0]["name"], "Trim");
    assert_eq!(script["features"][0]["index"], 0);
}

#[test]
fn scripts_reports_broken_script_with_exit_30() {
    let fx = Fixture::new();
    fx.write("ok.lua", TRIM);
    fx.write("broken.lua", "function (");

    let output = fx.subauto(&["scripts", "ok.lua", "broken.lua"]);
    assert_eq!(code(&output), 30);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Trim tools"));
    assert!(stdout.contains("broken.lua"));
    assert!(stdout.contains("failed"));
    assert!(stderr(&output).contains("1 of 2 script(s) failed to load"));
}

#[test]
fn scripts_without_files_uses_autoload_directory() {
    let autoload = tempfile::tempdir().unwrap();
    fs::write(autoload.path().join("b.lua"), "script_name = 'Second'").unwrap();
    fs::write(autoload.path().join("a.lua"), "script_name = 'First'").unwrap();
    fs::write(autoload.path().join("readme.txt"), "not a script").unwrap();
    let fx = Fixture::with_autoload(autoload.path().to_str().unwrap());

    let output = fx.subauto(&["scripts", "--json"]);
    assert_eq!(code(&output), 0, "stderr: {}", stderr(&output));

    let val = assert_single_json(&output);
    let names: Vec<&str> = val
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["First", "Second"]);
}

#[test]
fn scripts_without_files_or_autoload_is_usage_error() {
    let fx = Fixture::new();
    let output = fx.subauto(&["scripts"]);
    assert_eq!(code(&output), 2);
    assert!(stderr(&output).contains("hint:"));
}

// ===========================================================================
// subauto macro
// ===========================================================================

#[test]
fn macro_trims_selection_and_writes_output() {
    let fx = Fixture::new();
    fx.write("trim.lua", TRIM);

    let output = fx.subauto(&[
        "macro", "--script", "trim.lua", "--name", "Trim", "--subs", "in.ass",
        "--select", "3,5", "--output", "out.ass", "--json",
    ]);
    assert_eq!(code(&output), 0, "stderr: {}", stderr(&output));

    let val = assert_single_json(&output);
    assert_eq!(val["status"], "completed");
    assert_eq!(val["committed"], true);
    assert_eq!(val["selection"], serde_json::json!([3, 5]));
    assert_eq!(val["active"], 3);

    assert_eq!(dialogue_texts(&fx.path("out.ass")), vec!["first", "second", "third"]);
    // Input untouched when --output is given
    assert_eq!(fx.read("in.ass"), SAMPLE);
}

#[test]
fn macro_rewrites_input_in_place_when_changed() {
    let fx = Fixture::new();
    fx.write("trim.lua", TRIM);

    let output = fx.subauto(&[
        "macro", "--script", "trim.lua", "--name", "Trim", "--subs", "in.ass", "--select", "3",
    ]);
    assert_eq!(code(&output), 0, "stderr: {}", stderr(&output));
    assert!(String::from_utf8_lossy(&output.stdout).contains("selection: 3,5"));
    assert_eq!(dialogue_texts(&fx.path("in.ass")), vec!["first", "second", " third"]);
}

#[test]
fn macro_rejected_by_validator_exits_31() {
    let fx = Fixture::new();
    fx.write("trim.lua", TRIM);

    let output = fx.subauto(&["macro", "--script", "trim.lua", "--name", "Trim", "--subs", "in.ass"]);
    assert_eq!(code(&output), 31);
    assert_eq!(fx.read("in.ass"), SAMPLE);
}

#[test]
fn unknown_macro_lists_available_ones() {
    let fx = Fixture::new();
    fx.write("trim.lua", TRIM);

    let output = fx.subauto(&["macro", "--script", "trim.lua", "--name", "Nope", "--subs", "in.ass"]);
    assert_eq!(code(&output), 2);
    assert!(stderr(&output).contains("available macros: Trim"));
}

#[test]
fn macro_selection_out_of_range_is_usage_error() {
    let fx = Fixture::new();
    fx.write("trim.lua", TRIM);

    let output = fx.subauto(&[
        "macro", "--script", "trim.lua", "--name", "Trim", "--subs", "in.ass", "--select", "9",
    ]);
    assert_eq!(code(&output), 2);
    assert!(stderr(&output).contains("line 9 is out of range"));
}

#[test]
fn macro_runtime_error_exits_1_and_writes_nothing() {
    let fx = Fixture::new();
    fx.write(
        "boom.lua",
        r#"
        aegisub.register_macro("Boom", "", function(subs)
            subs[3] = nil
            print("about to fail")
            error("kaboom")
        end)
        "#,
    );

    let output = fx.subauto(&["macro", "--script", "boom.lua", "--name", "Boom", "--subs", "in.ass"]);
    assert_eq!(code(&output), 1);
    let err = stderr(&output);
    assert!(err.contains("about to fail"));
    assert!(err.contains("kaboom"));
    assert_eq!(fx.read("in.ass"), SAMPLE);
}

#[test]
fn macro_timeout_cancels_with_exit_32() {
    let fx = Fixture::new();
    fx.write(
        "spin.lua",
        r#"
        aegisub.register_macro("Spin", "", function()
            while not aegisub.progress.is_cancelled() do end
        end)
        "#,
    );

    let output = fx.subauto(&[
        "macro", "--script", "spin.lua", "--name", "Spin", "--subs", "in.ass", "--timeout", "0.2",
    ]);
    assert_eq!(code(&output), 32);
    assert_eq!(fx.read("in.ass"), SAMPLE);
}

#[test]
fn macro_sees_frame_rate_from_command_line() {
    let fx = Fixture::new();
    fx.write(
        "frames.lua",
        r#"
        aegisub.register_macro("Frames", "", function(subs, sel)
            local line = subs[sel[1]]
            local w, h = aegisub.video_size()
            line.text = tostring(aegisub.frame_from_ms(line.start_time)) .. "@" .. w .. "x" .. h
            subs[sel[1]] = line
        end)
        "#,
    );

    let output = fx.subauto(&[
        "macro", "--script", "frames.lua", "--name", "Frames", "--subs", "in.ass",
        "--select", "4", "--fps", "25", "--video-size", "640x480",
    ]);
    assert_eq!(code(&output), 0, "stderr: {}", stderr(&output));
    assert_eq!(dialogue_texts(&fx.path("in.ass"))[1], "75@640x480");
}

#[test]
fn automation3_script_exits_30() {
    let fx = Fixture::new();
    fx.write("old.lua", "version = 3");

    let output = fx.subauto(&["macro", "--script", "old.lua", "--name", "x", "--subs", "in.ass"]);
    assert_eq!(code(&output), 30);
    assert!(stderr(&output).contains("Automation 3"));
}

// ===========================================================================
// subauto export
// ===========================================================================

const SUFFIX_FILTERS: &str = r#"
local function suffix(tag)
    return function(subs, options)
        for i = 1, #subs do
            local l = subs[i]
            if l.class == "dialogue" then
                l.text = l.text .. tag
                subs[i] = l
            end
        end
    end
end
aegisub.register_filter("Add A", "", 10, suffix("A"))
aegisub.register_filter("Add B", "", 90, suffix("B"))
"#;

#[test]
fn export_runs_filters_by_merit_to_stdout() {
    let fx = Fixture::new();
    fx.write("suffix.lua", SUFFIX_FILTERS);

    let output = fx.subauto(&["export", "--subs", "in.ass", "--script", "suffix.lua"]);
    assert_eq!(code(&output), 0, "stderr: {}", stderr(&output));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(",,   firstBA\n"), "stdout:\n{}", stdout);
    assert_eq!(fx.read("in.ass"), SAMPLE);
}

#[test]
fn export_filter_flag_restricts_chain() {
    let fx = Fixture::new();
    fx.write("suffix.lua", SUFFIX_FILTERS);

    let output = fx.subauto(&[
        "export", "--subs", "in.ass", "--script", "suffix.lua", "--filter", "Add A", "-o", "out.ass",
    ]);
    assert_eq!(code(&output), 0, "stderr: {}", stderr(&output));
    assert_eq!(dialogue_texts(&fx.path("out.ass")), vec!["   firstA", "secondA", " thirdA"]);
}

#[test]
fn export_option_fills_config_dialog() {
    let fx = Fixture::new();
    fx.write(
        "shift.lua",
        r#"
        local function config(subs, stored)
            return {
                { class = "label", label = "Shift (ms)", x = 0 },
                { class = "intedit", name = "shift", value = 0, x = 1 },
            }
        end
        local function shift(subs, options)
            for i = 1, #subs do
                local l = subs[i]
                if l.class == "dialogue" then
                    l.start_time = l.start_time + options.shift
                    l.end_time = l.end_time + options.shift
                    subs[i] = l
                end
            end
        end
        aegisub.register_filter("Shift", "", 0, shift, config)
        "#,
    );

    let output = fx.subauto(&[
        "export", "--subs", "in.ass", "--script", "shift.lua", "--option", "shift=1000", "-o", "out.ass",
    ]);
    assert_eq!(code(&output), 0, "stderr: {}", stderr(&output));
    assert!(fx.read("out.ass").contains("Dialogue: 0,0:00:02.00,0:00:03.00,"));

    let output = fx.subauto(&[
        "export", "--subs", "in.ass", "--script", "shift.lua", "--option", "speed=2",
    ]);
    assert_eq!(code(&output), 2);
    assert!(stderr(&output).contains("'speed'"));
}

#[test]
fn export_unknown_filter_is_usage_error() {
    let fx = Fixture::new();
    fx.write("suffix.lua", SUFFIX_FILTERS);

    let output = fx.subauto(&["export", "--subs", "in.ass", "--script", "suffix.lua", "--filter", "Add C"]);
    assert_eq!(code(&output), 2);
    assert!(stderr(&output).contains("available filters: Add A, Add B"));
}

// ===========================================================================
// Files
// ===========================================================================

#[test]
fn missing_subtitle_file_exits_3() {
    let fx = Fixture::new();
    fx.write("trim.lua", TRIM);

    let output = fx.subauto(&["macro", "--script", "trim.lua", "--name", "Trim", "--subs", "gone.ass"]);
    assert_eq!(code(&output), 3);
}

#[test]
fn malformed_subtitle_file_exits_4() {
    let fx = Fixture::new();
    fx.write("trim.lua", TRIM);
    fx.write("bad.ass", "[Events]\nDialogue: 0,not-a-time,0:00:01.00,Default,,0,0,0,,x\n");

    let output = fx.subauto(&["macro", "--script", "trim.lua", "--name", "Trim", "--subs", "bad.ass"]);
    assert_eq!(code(&output), 4);
    assert!(stderr(&output).contains("bad.ass:2"));
}
