pub mod image_processor;

use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};

use crate::entities::{file::FileType, file_usage::UsageType};
use crate::models::settings::HandlePosition;

/// True when the identifier is a numeric row id rather than a fid.
pub fn is_pure_int(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

/// Prefixes relative object paths with a bucket domain. Absolute URLs pass through.
pub fn qualify_url(path: &str, domain: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        domain.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Splices a rendition parameter into an object path.
pub fn apply_handle_position(position: HandlePosition, parameter: &str, path: &str) -> String {
    if parameter.is_empty() {
        return path.to_string();
    }

    let (dir, name) = match path.rsplit_once('/') {
        Some((dir, name)) => (format!("{dir}/"), name),
        None => (String::new(), path),
    };

    match position {
        HandlePosition::PathStart => format!("{parameter}{path}"),
        HandlePosition::PathEnd => format!("{path}{parameter}"),
        HandlePosition::NameStart => format!("{dir}{parameter}{name}"),
        HandlePosition::NameEnd => match name.rsplit_once('.') {
            Some((stem, ext)) => format!("{dir}{stem}{parameter}.{ext}"),
            None => format!("{dir}{name}{parameter}"),
        },
    }
}

/// Extension of the last path segment, lowercased, without the dot.
pub fn path_extension(path: &str) -> Option<String> {
    let name = path.rsplit('/').next()?;
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

pub fn replace_extension(path: &str, extension: &str) -> String {
    let (dir, name) = match path.rsplit_once('/') {
        Some((dir, name)) => (format!("{dir}/"), name),
        None => (String::new(), path),
    };
    let stem = name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name);
    format!("{dir}{stem}.{extension}")
}

/// Directory for new uploads: `{type dir}/{usage dir}`, sharded by date for
/// high-volume usages.
pub fn storage_directory(file_type: FileType, usage_type: UsageType, now: DateTime<Utc>) -> String {
    let base = format!("{}/{}", file_type.storage_dir(), usage_type.storage_dir());
    if usage_type.dated_storage() {
        format!("{base}/{}", now.format("%Y%m/%d"))
    } else {
        base
    }
}

pub fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Public file id.
pub fn generate_fid() -> String {
    random_token(12)
}

pub fn html_escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
