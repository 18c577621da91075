//! ASS text reader/writer.
//!
//! Only the three sections scripts work with are parsed into typed entries.
//! Everything else (fonts, graphics, comments, unknown sections) is kept as
//! `Entry::Unknown` and written back verbatim. `Format:` lines are not kept;
//! the writer always emits the standard field order.

use crate::entry::{
    format_time, parse_time, Dialogue, Entry, InfoEntry, RawEntry, Style, SECTION_EVENTS,
    SECTION_INFO, SECTION_STYLES,
};
use crate::DocumentError;

const STYLE_FORMAT: &str = "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, \
OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, \
BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding";

const EVENT_FORMAT: &str =
    "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text";

const STYLE_FIELDS: usize = 23;
const EVENT_FIELDS: usize = 10;

// ============================================================================
// Parsing
// ============================================================================

/// Parse ASS text into entries.
pub fn parse(text: &str) -> Result<Vec<Entry>, DocumentError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut entries = Vec::new();
    let mut section = String::new();

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim_end_matches('\r');
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            section = canonical_section(trimmed);
            continue;
        }

        if section.is_empty() {
            return Err(DocumentError::Parse {
                line: line_no,
                message: "content before the first section header".to_string(),
            });
        }

        let entry = match section.as_str() {
            SECTION_INFO => parse_info_line(&section, line),
            SECTION_STYLES => match split_key(line) {
                Some(("Format", _)) => continue,
                Some(("Style", body)) => Entry::Style(parse_style(body, line_no)?),
                _ => raw(&section, line),
            },
            SECTION_EVENTS => match split_key(line) {
                Some(("Format", _)) => continue,
                Some(("Dialogue", body)) => Entry::Dialogue(parse_dialogue(body, false, line_no)?),
                Some(("Comment", body)) => Entry::Dialogue(parse_dialogue(body, true, line_no)?),
                _ => raw(&section, line),
            },
            _ => raw(&section, line),
        };
        entries.push(entry);
    }

    Ok(entries)
}

/// `[v4+ styles]` and friends map onto the canonical spelling.
fn canonical_section(header: &str) -> String {
    let lower = header.to_ascii_lowercase();
    match lower.as_str() {
        "[script info]" => SECTION_INFO.to_string(),
        "[v4+ styles]" | "[v4 styles+]" => SECTION_STYLES.to_string(),
        "[events]" => SECTION_EVENTS.to_string(),
        _ => header.to_string(),
    }
}

fn raw(section: &str, line: &str) -> Entry {
    Entry::Unknown(RawEntry {
        section: section.to_string(),
        raw: line.to_string(),
    })
}

fn split_key(line: &str) -> Option<(&str, &str)> {
    let (key, rest) = line.split_once(':')?;
    Some((key.trim(), rest.trim_start()))
}

fn parse_info_line(section: &str, line: &str) -> Entry {
    if line.starts_with(';') {
        return raw(section, line);
    }
    match split_key(line) {
        Some((key, value)) => Entry::Info(InfoEntry {
            key: key.to_string(),
            value: value.to_string(),
        }),
        None => raw(section, line),
    }
}

fn parse_style(body: &str, line_no: usize) -> Result<Style, DocumentError> {
    let fields: Vec<&str> = body.splitn(STYLE_FIELDS, ',').map(str::trim).collect();
    if fields.len() != STYLE_FIELDS {
        return Err(DocumentError::Parse {
            line: line_no,
            message: format!("style has {} fields, expected {}", fields.len(), STYLE_FIELDS),
        });
    }

    let num = |i: usize| -> Result<f64, DocumentError> {
        fields[i].parse::<f64>().map_err(|_| DocumentError::Parse {
            line: line_no,
            message: format!("invalid number '{}' in style field {}", fields[i], i + 1),
        })
    };
    let int = |i: usize| -> Result<i32, DocumentError> { num(i).map(|v| v as i32) };
    let flag = |i: usize| -> Result<bool, DocumentError> { num(i).map(|v| v != 0.0) };

    Ok(Style {
        name: fields[0].to_string(),
        fontname: fields[1].to_string(),
        fontsize: num(2)?,
        color1: fields[3].to_string(),
        color2: fields[4].to_string(),
        color3: fields[5].to_string(),
        color4: fields[6].to_string(),
        bold: flag(7)?,
        italic: flag(8)?,
        underline: flag(9)?,
        strikeout: flag(10)?,
        scale_x: num(11)?,
        scale_y: num(12)?,
        spacing: num(13)?,
        angle: num(14)?,
        borderstyle: int(15)?,
        outline: num(16)?,
        shadow: num(17)?,
        align: int(18)?,
        margin_l: int(19)?,
        margin_r: int(20)?,
        margin_t: int(21)?,
        encoding: int(22)?,
    })
}

fn parse_dialogue(body: &str, comment: bool, line_no: usize) -> Result<Dialogue, DocumentError> {
    // Text is last and may itself contain commas.
    let fields: Vec<&str> = body.splitn(EVENT_FIELDS, ',').collect();
    if fields.len() != EVENT_FIELDS {
        return Err(DocumentError::Parse {
            line: line_no,
            message: format!("event has {} fields, expected {}", fields.len(), EVENT_FIELDS),
        });
    }

    let int = |i: usize| -> Result<i32, DocumentError> {
        fields[i].trim().parse::<i32>().map_err(|_| DocumentError::Parse {
            line: line_no,
            message: format!("invalid number '{}' in event field {}", fields[i].trim(), i + 1),
        })
    };
    let time = |i: usize| -> Result<i64, DocumentError> {
        parse_time(fields[i]).ok_or_else(|| DocumentError::Parse {
            line: line_no,
            message: format!("invalid time '{}'", fields[i].trim()),
        })
    };

    Ok(Dialogue {
        comment,
        layer: int(0)?,
        start_time: time(1)?,
        end_time: time(2)?,
        style: fields[3].trim().to_string(),
        actor: fields[4].trim().to_string(),
        margin_l: int(5)?,
        margin_r: int(6)?,
        margin_t: int(7)?,
        effect: fields[8].trim().to_string(),
        text: fields[9].to_string(),
    })
}

// ============================================================================
// Writing
// ============================================================================

/// Serialize entries as ASS text. Sections appear in first-seen order.
pub fn write(entries: &[Entry]) -> String {
    let mut sections: Vec<&str> = Vec::new();
    for entry in entries {
        let section = entry.section();
        if !sections.contains(&section) {
            sections.push(section);
        }
    }

    let mut out = String::new();
    for (i, section) in sections.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(section);
        out.push('\n');
        match *section {
            SECTION_STYLES => {
                out.push_str(STYLE_FORMAT);
                out.push('\n');
            }
            SECTION_EVENTS => {
                out.push_str(EVENT_FORMAT);
                out.push('\n');
            }
            _ => {}
        }
        for entry in entries.iter().filter(|e| e.section() == *section) {
            out.push_str(&entry_line(entry));
            out.push('\n');
        }
    }
    out
}

/// The text line for a single entry.
pub fn entry_line(entry: &Entry) -> String {
    match entry {
        Entry::Info(info) => format!("{}: {}", info.key, info.value),
        Entry::Style(s) => format!(
            "Style: {},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            s.name,
            s.fontname,
            fmt_num(s.fontsize),
            s.color1,
            s.color2,
            s.color3,
            s.color4,
            ass_bool(s.bold),
            ass_bool(s.italic),
            ass_bool(s.underline),
            ass_bool(s.strikeout),
            fmt_num(s.scale_x),
            fmt_num(s.scale_y),
            fmt_num(s.spacing),
            fmt_num(s.angle),
            s.borderstyle,
            fmt_num(s.outline),
            fmt_num(s.shadow),
            s.align,
            s.margin_l,
            s.margin_r,
            s.margin_t,
            s.encoding,
        ),
        Entry::Dialogue(d) => format!(
            "{}: {},{},{},{},{},{},{},{},{},{}",
            if d.comment { "Comment" } else { "Dialogue" },
            d.layer,
            format_time(d.start_time),
            format_time(d.end_time),
            d.style,
            d.actor,
            d.margin_l,
            d.margin_r,
            d.margin_t,
            d.effect,
            d.text,
        ),
        Entry::Unknown(r) => r.raw.clone(),
    }
}

fn ass_bool(b: bool) -> &'static str {
    if b { "-1" } else { "0" }
}

fn fmt_num(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}
