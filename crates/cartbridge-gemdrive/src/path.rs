//! Path and name service.
//!
//! The target speaks backslash paths with an optional drive prefix; the
//! storage volume wants forward-slash absolute paths under the emulated
//! root. Everything here is a pure string transform so the responder can
//! compose them freely.

use crate::layout::MAX_FOLDER_LENGTH;

/// Characters allowed through the name filter besides alphanumerics.
const NAME_PUNCTUATION: &str = "_!@#$%^&()+=-~`;'<,>.|[]{}";
/// Characters a DOS name may never contain.
const DOS_INVALID: &str = "<>:\"/\\|?*";
/// Longest short-name the enumeration record carries, without terminator.
const SHORT_NAME_MAX: usize = 13;
/// Segment bound for `..`/`.` resolution.
const MAX_SEGMENTS: usize = 32;

pub fn forward_slashes(path: &str) -> String {
    path.replace('\\', "/")
}

pub fn back_slashes(path: &str) -> String {
    path.replace('/', "\\")
}

/// Collapses every run of `/` to a single one. Idempotent, never grows.
pub fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' {
            if !prev_slash {
                out.push('/');
            }
            prev_slash = true;
        } else {
            out.push(c);
            prev_slash = false;
        }
    }
    out
}

pub fn strip_trailing_slashes(path: &str) -> &str {
    path.trim_end_matches(['/', '\\'])
}

/// Drops a `X:` drive prefix, any letter.
pub fn strip_drive_prefix(path: &str) -> &str {
    match path.as_bytes() {
        [_, b':', ..] => &path[2..],
        _ => path,
    }
}

/// Splits a full search spec into drive prefix (with the colon), folder part
/// (with its trailing separator) and the final name or pattern.
pub fn split_full_path(full: &str) -> (String, String, String) {
    let (drive, rest) = match full.find(':') {
        Some(i) => (full[..=i].to_string(), &full[i + 1..]),
        None => (String::new(), full),
    };
    match rest.rfind(['/', '\\']) {
        Some(i) => (drive, rest[..=i].to_string(), rest[i + 1..].to_string()),
        None => (drive, String::new(), rest.to_string()),
    }
}

/// Resolves `.` and `..` segments. The result is absolute; an empty result
/// collapses to `/`.
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::with_capacity(MAX_SEGMENTS);
    for token in path.split(['/', '\\']) {
        match token {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => {
                if segments.len() < MAX_SEGMENTS {
                    segments.push(token);
                }
            }
        }
    }
    if segments.is_empty() {
        "/".to_string()
    } else {
        let mut out = String::new();
        for seg in segments {
            out.push('/');
            out.push_str(seg);
        }
        out
    }
}

/// Composes the volume-side absolute path for a request from the target.
///
/// The cached default path is skipped when the request is already absolute
/// or carries a drive prefix; either way the result lives under `root`.
pub fn local_path(root: &str, default_path: &str, request: &str) -> String {
    let mut request = request;
    let base = if request.len() >= 2 && request.as_bytes()[1] == b':' {
        request = &request[2..];
        format!("{root}/")
    } else if request.starts_with(['\\', '/']) {
        format!("{root}/")
    } else {
        format!("{root}/{}", strip_drive_prefix(default_path))
    };
    collapse_slashes(&forward_slashes(&format!("{base}/{request}")))
}

/// Keeps alphanumerics and the DOS punctuation set, dropping the rest.
pub fn filter_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || NAME_PUNCTUATION.contains(*c))
        .take(SHORT_NAME_MAX)
        .collect()
}

pub fn upper_name(name: &str) -> String {
    name.chars()
        .take(SHORT_NAME_MAX)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn sanitize_dos(part: &str) -> String {
    let mut out: String = part
        .chars()
        .map(|c| {
            if c.is_control() || DOS_INVALID.contains(c) {
                '_'
            } else {
                c.to_ascii_uppercase()
            }
        })
        .collect();
    while out.ends_with([' ', '.']) {
        out.pop();
    }
    out
}

/// Coerces a name to 8.3: base truncated to eight characters (the last two
/// becoming `~1` when it overflowed), extension to three, both sanitized
/// and upper-cased. Applying it twice changes nothing.
pub fn shorten_name(name: &str) -> String {
    const BASE_LEN: usize = 8;
    const EXT_LEN: usize = 3;

    let (base, ext) = match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i + 1..]),
        _ => (name, ""),
    };

    let mut base_part: String = base.chars().take(BASE_LEN).collect();
    if base.chars().count() > BASE_LEN {
        base_part = base_part.chars().take(BASE_LEN - 2).collect();
        base_part.push('~');
        base_part.push('1');
    }
    let ext_part: String = ext.chars().take(EXT_LEN).collect();

    let base_part = sanitize_dos(&base_part);
    let ext_part = sanitize_dos(&ext_part);
    if ext_part.is_empty() {
        base_part
    } else {
        format!("{base_part}.{ext_part}")
    }
}

/// Truncates a path string to what fits the target-side buffer.
pub fn clamp_to_folder_length(path: &str) -> &str {
    let max = MAX_FOLDER_LENGTH - 1;
    if path.len() <= max {
        path
    } else {
        let mut end = max;
        while !path.is_char_boundary(end) {
            end -= 1;
        }
        &path[..end]
    }
}
