//! Path and filename templating.
//!
//! Patterns contain `[Token]` placeholders, matched case-insensitively.
//! `[####]` is an alias for `[IncrementingValue]`. Values supplied by the
//! caller always win over the built-in dynamic tokens (`date`, `time`,
//! `applicationpath`). A known token missing from the data is an error;
//! an unknown token is left in place with a warning so typos surface in
//! the output instead of silently vanishing.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::Local;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::FileTypeDefinition;
use crate::error::PatternError;

const KNOWN_TOKENS: [&str; 12] = [
    "assettype",
    "supplier",
    "assetname",
    "maptype",
    "resolution",
    "ext",
    "incrementingvalue",
    "sha5",
    "####",
    "date",
    "time",
    "applicationpath",
];

/// Replaces every `[Token]` in `pattern` with its value from `tokens`.
pub fn generate_path_from_pattern(
    pattern: &str,
    tokens: &HashMap<String, String>,
) -> Result<String, PatternError> {
    let normalized: HashMap<String, String> = tokens
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.clone()))
        .collect();

    let now = Local::now();
    let mut full_tokens: HashMap<String, String> = HashMap::new();
    full_tokens.insert("date".to_string(), now.format("%Y%m%d").to_string());
    full_tokens.insert("time".to_string(), now.format("%H%M%S").to_string());
    full_tokens.insert(
        "applicationpath".to_string(),
        std::env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
    );
    // Caller-supplied values win over the dynamic defaults.
    full_tokens.extend(normalized);

    let known_tokens: HashSet<&str> = KNOWN_TOKENS.iter().copied().collect();

    let token_re = match Regex::new(r"\[([^\]]+)\]") {
        Ok(re) => re,
        Err(_) => return Ok(pattern.to_string()),
    };

    let mut output = pattern.to_string();
    let mut processed: HashSet<String> = HashSet::new();

    for caps in token_re.captures_iter(pattern) {
        let token_name = &caps[1];
        let token_name_lc = token_name.to_lowercase();

        let lookup_key = if token_name_lc == "####" {
            "incrementingvalue".to_string()
        } else {
            token_name_lc
        };

        if !processed.insert(lookup_key.clone()) {
            continue;
        }

        if let Some(value) = full_tokens.get(&lookup_key) {
            let literal = regex::escape(&format!("[{}]", token_name));
            if let Ok(re) = Regex::new(&format!("(?i){}", literal)) {
                output = re.replace_all(&output, value.as_str()).into_owned();
            }
        } else if known_tokens.contains(lookup_key.as_str()) {
            warn!(token = %token_name, pattern = %pattern, "required token missing from token data");
            return Err(PatternError::MissingToken {
                name: token_name.to_string(),
            });
        } else {
            warn!(token = %token_name, pattern = %pattern, "unknown token in pattern, leaving unchanged");
        }
    }

    Ok(output)
}

/// Scans existing output directories and returns the next value for the
/// incrementing token, zero-padded to the token's digit width.
///
/// Fails soft: "00" when the pattern carries no incrementing token, the
/// base path does not exist, or the scan errors. The scan is not atomic
/// across concurrent runs.
pub fn next_incrementing_value(output_base: &Path, directory_pattern: &str) -> String {
    debug!(pattern = %directory_pattern, base = %output_base.display(), "calculating next incrementing value");

    let split_re = match Regex::new(r"^(.*?)(\[IncrementingValue\]|#+)(.*)$") {
        Ok(re) => re,
        Err(_) => return "00".to_string(),
    };
    let Some(caps) = split_re.captures(directory_pattern) else {
        warn!(pattern = %directory_pattern, "no incrementing token in pattern, defaulting to 00");
        return "00".to_string();
    };

    let prefix = &caps[1];
    let token = &caps[2];
    let suffix = &caps[3];
    let num_digits = if token.starts_with('#') { token.len() } else { 2 };

    if !output_base.is_dir() {
        warn!(base = %output_base.display(), "output base path missing, cannot scan for existing values");
        return format!("{:0width$}", 0, width = num_digits);
    }

    // Other tokens become wildcards for globbing; the digits match exactly.
    let other_token_re = match Regex::new(r"\[[^\]]+\]") {
        Ok(re) => re,
        Err(_) => return "00".to_string(),
    };
    let glob_prefix = other_token_re.replace_all(prefix, "*");
    let glob_suffix = other_token_re.replace_all(suffix, "*");
    let glob_digits = "[0-9]".repeat(num_digits);
    let glob_pattern = format!(
        "{}/{}{}{}",
        output_base.display(),
        glob_prefix,
        glob_digits,
        glob_suffix
    );

    let extract_re = match Regex::new(&format!(
        "^{}(\\d{{{}}}){}.*",
        regex::escape(prefix),
        num_digits,
        regex::escape(suffix)
    )) {
        Ok(re) => re,
        Err(_) => return "00".to_string(),
    };

    let entries = match glob::glob(&glob_pattern) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(pattern = %glob_pattern, error = %e, "glob scan failed, defaulting to 00");
            return "00".to_string();
        }
    };

    let mut max_value: i64 = -1;
    for entry in entries.flatten() {
        if !entry.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(num_caps) = extract_re.captures(name) {
            if let Ok(value) = num_caps[1].parse::<i64>() {
                max_value = max_value.max(value);
            }
        } else {
            debug!(directory = %name, "matched glob but not extraction pattern");
        }
    }

    let next = max_value + 1;
    let next_str = format!("{:0width$}", next, width = num_digits);
    info!(next = %next_str, max_found = max_value, "determined next incrementing value");
    next_str
}

/// Replaces characters invalid in file and directory names.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut collapsed = String::with_capacity(replaced.len());
    let mut last_was_underscore = false;
    for c in replaced.chars() {
        if c == '_' {
            if !last_was_underscore {
                collapsed.push(c);
            }
            last_was_underscore = true;
        } else {
            collapsed.push(c);
            last_was_underscore = false;
        }
    }

    let trimmed = collapsed.trim_matches('_');
    if trimmed.is_empty() {
        "invalid_name".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Derives a filename-friendly map type from the internal type, e.g.
/// "MAP_COL-1" becomes "COL-1". Longest definition key wins so that
/// overlapping prefixes resolve deterministically.
pub fn filename_friendly_map_type(
    internal_map_type: &str,
    definitions: &HashMap<String, FileTypeDefinition>,
) -> String {
    if definitions.is_empty() {
        warn!(map_type = %internal_map_type, "no file type definitions, falling back to internal type");
        return internal_map_type.to_string();
    }

    let mut keys: Vec<&String> = definitions.keys().collect();
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    for key in keys {
        if let Some(suffix) = internal_map_type.strip_prefix(key.as_str()) {
            let alias = definitions[key].standard_type.trim();
            if alias.is_empty() {
                warn!(map_type = %internal_map_type, base = %key, "blank standard_type alias, falling back");
                return internal_map_type.to_string();
            }
            let friendly = format!("{}{}", alias, suffix);
            debug!(from = %internal_map_type, to = %friendly, "derived filename-friendly map type");
            return friendly;
        }
    }

    warn!(map_type = %internal_map_type, "no definition prefix matches, falling back to internal type");
    internal_map_type.to_string()
}
