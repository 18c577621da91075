use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Fit `s` into exactly `width` display columns: pad with spaces, or cut at
/// a character boundary and end with "..". Script names are often CJK, so
/// widths are display columns, not bytes.
pub(crate) fn fit_column(s: &str, width: usize) -> String {
    let sw = UnicodeWidthStr::width(s);
    if sw <= width {
        return format!("{}{}", s, " ".repeat(width - sw));
    }
    if width < 3 {
        return s
            .chars()
            .find(|ch| ch.width().unwrap_or(0) <= width)
            .map(String::from)
            .unwrap_or_default();
    }

    let budget = width - 2;
    let mut used = 0;
    let mut out = String::new();
    for ch in s.chars() {
        let cw = ch.width().unwrap_or(0);
        if used + cw > budget {
            break;
        }
        used += cw;
        out.push(ch);
    }
    out.push_str("..");
    let pad = width.saturating_sub(used + 2);
    out.push_str(&" ".repeat(pad));
    out
}

/// Parse a line list as typed on the command line: `1,2,5` or `3-7`, mixed.
/// Numbers are one-based; the result is zero-based, sorted, deduplicated.
pub(crate) fn parse_line_list(spec: &str) -> Result<Vec<usize>, String> {
    let mut lines = Vec::new();
    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (lo, hi) = match part.split_once('-') {
            Some((a, b)) => (parse_line_number(a)?, parse_line_number(b)?),
            None => {
                let n = parse_line_number(part)?;
                (n, n)
            }
        };
        if lo > hi {
            return Err(format!("invalid line range '{}'", part));
        }
        lines.extend(lo..=hi);
    }
    lines.sort_unstable();
    lines.dedup();
    Ok(lines)
}

/// One-based line number to zero-based index.
pub(crate) fn parse_line_number(text: &str) -> Result<usize, String> {
    match text.trim().parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(format!("invalid line number '{}' (lines start at 1)", text.trim())),
    }
}

/// Split `KEY=VALUE`. The value may itself contain `=`.
pub(crate) fn parse_option(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("invalid option '{}' (expected KEY=VALUE)", raw)),
    }
}

/// Parse a frame rate: `25`, `23.976` or `24000/1001`.
pub(crate) fn parse_fps(text: &str) -> Result<(u32, u32), String> {
    let err = || format!("invalid frame rate '{}' (expected e.g. 25 or 24000/1001)", text);
    let (num, den) = match text.split_once('/') {
        Some((n, d)) => (
            n.trim().parse::<u32>().map_err(|_| err())?,
            d.trim().parse::<u32>().map_err(|_| err())?,
        ),
        None => {
            let fps: f64 = text.trim().parse().map_err(|_| err())?;
            if !fps.is_finite() || fps <= 0.0 || fps > 1000.0 {
                return Err(err());
            }
            ((fps * 1000.0).round() as u32, 1000)
        }
    };
    if num == 0 || den == 0 {
        return Err(err());
    }
    Ok((num, den))
}

/// Parse `WIDTHxHEIGHT`.
pub(crate) fn parse_size(text: &str) -> Result<(u32, u32), String> {
    let parsed = text
        .split_once(['x', 'X'])
        .and_then(|(w, h)| Some((w.trim().parse::<u32>().ok()?, h.trim().parse::<u32>().ok()?)));
    match parsed {
        Some((w, h)) if w > 0 && h > 0 => Ok((w, h)),
        _ => Err(format!("invalid video size '{}' (expected e.g. 1920x1080)", text)),
    }
}

/// Format zero-based indices the way users count lines.
pub(crate) fn format_line_list(lines: &[usize]) -> String {
    lines
        .iter()
        .map(|i| (i + 1).to_string())
        .collect::<Vec<_>>()
        .join(",")
}
