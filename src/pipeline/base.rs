//! Helpers shared by the built-in steps

use super::context::{Metadata, UploadContext};
use super::core::StepResult;
use crate::error::StepError;
use crate::logger::{LogLevel, LOGGER};
use std::collections::BTreeMap;

/// Continue the chain with `delta` folded into the context
pub fn success(context: &UploadContext, message: impl Into<String>, delta: Metadata) -> StepResult {
    StepResult::proceed(context.with_metadata_map(&delta), message, delta)
}

/// Log and build a failed, terminal result for `step_name`
pub fn failure(
    step_name: &str,
    context: &UploadContext,
    message: impl Into<String>,
    errors: Vec<StepError>,
) -> StepResult {
    let message = message.into();

    let mut fields = BTreeMap::new();
    fields.insert("step".to_string(), step_name.into());
    fields.insert("session_id".to_string(), context.session_label().into());
    fields.insert("owner_id".to_string(), context.owner().as_str().into());
    fields.insert("file".to_string(), context.file().original_name().into());
    fields.insert(
        "errors".to_string(),
        serde_json::to_value(&errors).unwrap_or_default(),
    );
    LOGGER.log_with_context(
        LogLevel::Error,
        &format!(
            "Step '{}' failed: {} (session: {})",
            step_name,
            message,
            context.session_label()
        ),
        &format!("pipeline::{}", step_name),
        fields,
    );

    StepResult::failed(message, errors)
}

pub fn is_size_within_limit(context: &UploadContext) -> bool {
    context.file().size() <= context.max_size_bytes()
}

/// Whether the file's MIME type is in the allow-list (empty = unrestricted)
pub fn is_mime_type_allowed(context: &UploadContext) -> bool {
    let allowed = context.allowed_mime_types();
    allowed.is_empty()
        || allowed
            .iter()
            .any(|pattern| mime_matches(pattern, context.file().mime_type()))
}

/// Case-insensitive MIME match; `image/*` matches any image subtype
pub fn mime_matches(pattern: &str, mime_type: &str) -> bool {
    let pattern = pattern.trim().to_ascii_lowercase();
    let mime_type = mime_type.trim().to_ascii_lowercase();
    // Parameters such as `; charset=utf-8` don't affect the type
    let essence = mime_type.split(';').next().unwrap_or("").trim();

    if pattern == "*/*" {
        return essence.contains('/');
    }
    match pattern.strip_suffix("/*") {
        Some(top_level) => essence
            .split_once('/')
            .map_or(false, |(kind, _)| kind == top_level),
        None => pattern == essence,
    }
}

/// Human-readable byte count, e.g. `2 MB` or `1.5 KB`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}
