// Path token decoding for configured directories
//
// `?user` -> <config dir>/subauto
// `?data` -> <data dir>/subauto
// `~`     -> home directory

use std::path::PathBuf;

const APP_DIR: &str = "subauto";

/// Decode a single configured path.
pub fn decode_path(raw: &str) -> PathBuf {
    let raw = raw.trim();

    if let Some(rest) = raw.strip_prefix("?user") {
        return join_token(dirs::config_dir(), rest);
    }
    if let Some(rest) = raw.strip_prefix("?data") {
        return join_token(dirs::data_dir(), rest);
    }

    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

/// Split a pipe-delimited list and decode every non-empty element.
pub fn decode_path_list(list: &str) -> Vec<PathBuf> {
    list.split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(decode_path)
        .collect()
}

fn join_token(base: Option<PathBuf>, rest: &str) -> PathBuf {
    let base = base.unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR);
    let rest = rest.trim_start_matches(['/', '\\']);
    if rest.is_empty() {
        base
    } else {
        base.join(rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_absolute_path_unchanged() {
        assert_eq!(decode_path("/usr/share/inc"), PathBuf::from("/usr/share/inc"));
    }

    #[test]
    fn test_user_token() {
        if let Some(config) = dirs::config_dir() {
            assert_eq!(
                decode_path("?user/automation/include"),
                config.join("subauto").join("automation/include")
            );
        }
    }

    #[test]
    fn test_list_skips_empty_segments() {
        let list = decode_path_list("/a||/b| ");
        assert_eq!(list, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }
}
