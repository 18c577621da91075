//! Subtitle entries.
//!
//! Every line of a subtitle file is one `Entry`. The serde shape of an entry
//! is also the shape scripts see: a flat table with a `class` discriminator
//! (`"info"`, `"style"`, `"dialogue"`, `"unknown"`) and the fields of the
//! variant.

use serde::{Deserialize, Deserializer, Serialize};

pub const SECTION_INFO: &str = "[Script Info]";
pub const SECTION_STYLES: &str = "[V4+ Styles]";
pub const SECTION_EVENTS: &str = "[Events]";

/// One line of a subtitle document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "lowercase")]
pub enum Entry {
    Info(InfoEntry),
    Style(Style),
    Dialogue(Dialogue),
    Unknown(RawEntry),
}

impl Entry {
    /// Section header this entry belongs to.
    pub fn section(&self) -> &str {
        match self {
            Entry::Info(_) => SECTION_INFO,
            Entry::Style(_) => SECTION_STYLES,
            Entry::Dialogue(_) => SECTION_EVENTS,
            Entry::Unknown(raw) => &raw.section,
        }
    }

    pub fn as_dialogue(&self) -> Option<&Dialogue> {
        match self {
            Entry::Dialogue(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_style(&self) -> Option<&Style> {
        match self {
            Entry::Style(s) => Some(s),
            _ => None,
        }
    }

    /// Short class name, as exposed to scripts.
    pub fn class_name(&self) -> &'static str {
        match self {
            Entry::Info(_) => "info",
            Entry::Style(_) => "style",
            Entry::Dialogue(_) => "dialogue",
            Entry::Unknown(_) => "unknown",
        }
    }
}

/// `Key: Value` line from `[Script Info]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfoEntry {
    pub key: String,
    pub value: String,
}

/// A line kept verbatim: comments, blank-ish lines, unknown sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawEntry {
    pub section: String,
    pub raw: String,
}

/// A `Style:` line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Style {
    pub name: String,
    pub fontname: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub fontsize: f64,
    pub color1: String,
    pub color2: String,
    pub color3: String,
    pub color4: String,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikeout: bool,
    #[serde(deserialize_with = "lenient_f64")]
    pub scale_x: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub scale_y: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub spacing: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub angle: f64,
    #[serde(deserialize_with = "lenient_i32")]
    pub borderstyle: i32,
    #[serde(deserialize_with = "lenient_f64")]
    pub outline: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub shadow: f64,
    #[serde(deserialize_with = "lenient_i32")]
    pub align: i32,
    #[serde(deserialize_with = "lenient_i32")]
    pub margin_l: i32,
    #[serde(deserialize_with = "lenient_i32")]
    pub margin_r: i32,
    #[serde(deserialize_with = "lenient_i32")]
    pub margin_t: i32,
    #[serde(deserialize_with = "lenient_i32")]
    pub encoding: i32,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            fontname: "Arial".to_string(),
            fontsize: 20.0,
            color1: "&H00FFFFFF".to_string(),
            color2: "&H000000FF".to_string(),
            color3: "&H00000000".to_string(),
            color4: "&H00000000".to_string(),
            bold: false,
            italic: false,
            underline: false,
            strikeout: false,
            scale_x: 100.0,
            scale_y: 100.0,
            spacing: 0.0,
            angle: 0.0,
            borderstyle: 1,
            outline: 2.0,
            shadow: 2.0,
            align: 2,
            margin_l: 10,
            margin_r: 10,
            margin_t: 10,
            encoding: 1,
        }
    }
}

/// A `Dialogue:` or `Comment:` event line. Times are milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dialogue {
    pub comment: bool,
    #[serde(deserialize_with = "lenient_i32")]
    pub layer: i32,
    #[serde(deserialize_with = "lenient_i64")]
    pub start_time: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub end_time: i64,
    pub style: String,
    pub actor: String,
    #[serde(deserialize_with = "lenient_i32")]
    pub margin_l: i32,
    #[serde(deserialize_with = "lenient_i32")]
    pub margin_r: i32,
    #[serde(deserialize_with = "lenient_i32")]
    pub margin_t: i32,
    pub effect: String,
    pub text: String,
}

impl Default for Dialogue {
    fn default() -> Self {
        Self {
            comment: false,
            layer: 0,
            start_time: 0,
            end_time: 5000,
            style: "Default".to_string(),
            actor: String::new(),
            margin_l: 0,
            margin_r: 0,
            margin_t: 0,
            effect: String::new(),
            text: String::new(),
        }
    }
}

impl Dialogue {
    pub fn duration(&self) -> i64 {
        self.end_time.saturating_sub(self.start_time)
    }
}

// ============================================================================
// Times
// ============================================================================

/// Format milliseconds as `H:MM:SS.cc`. Negative times clamp to zero.
pub fn format_time(ms: i64) -> String {
    let cs = ms.max(0).saturating_add(5) / 10;
    let h = cs / 360_000;
    let m = (cs / 6_000) % 60;
    let s = (cs / 100) % 60;
    let c = cs % 100;
    format!("{}:{:02}:{:02}.{:02}", h, m, s, c)
}

/// Parse `H:MM:SS.cc` (fraction may have 1-3 digits) into milliseconds.
pub fn parse_time(text: &str) -> Option<i64> {
    let mut parts = text.trim().splitn(3, ':');
    let h: i64 = parts.next()?.trim().parse().ok()?;
    let m: i64 = parts.next()?.trim().parse().ok()?;
    let rest = parts.next()?.trim();

    let (secs, frac) = match rest.split_once('.') {
        Some((s, f)) => (s, f),
        None => (rest, ""),
    };
    let s: i64 = secs.parse().ok()?;
    if !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let frac_ms = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 100,
        2 => frac.parse::<i64>().ok()? * 10,
        _ => frac[..3].parse::<i64>().ok()?,
    };

    let secs = h
        .saturating_mul(3600)
        .saturating_add(m.saturating_mul(60))
        .saturating_add(s);
    Some(secs.saturating_mul(1000).saturating_add(frac_ms))
}

// ============================================================================
// Lenient numbers
// ============================================================================
//
// Script-side numbers arrive as integers, floats or numeric strings depending
// on how the script computed them.

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberRepr {
    Int(i64),
    Float(f64),
    Text(String),
}

impl NumberRepr {
    fn to_f64(&self) -> Option<f64> {
        match self {
            NumberRepr::Int(i) => Some(*i as f64),
            NumberRepr::Float(f) if f.is_finite() => Some(*f),
            NumberRepr::Float(_) => None,
            NumberRepr::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        }
    }
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    NumberRepr::deserialize(d)?
        .to_f64()
        .ok_or_else(|| serde::de::Error::custom("expected a number"))
}

fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    match NumberRepr::deserialize(d)? {
        NumberRepr::Int(i) => Ok(i),
        other => other
            .to_f64()
            .map(|f| f.round() as i64)
            .ok_or_else(|| serde::de::Error::custom("expected a number")),
    }
}

fn lenient_i32<'de, D: Deserializer<'de>>(d: D) -> Result<i32, D::Error> {
    let v = lenient_i64(d)?;
    i32::try_from(v).map_err(|_| serde::de::Error::custom(format!("{} out of range", v)))
}
