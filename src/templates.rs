// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Placeholder substitution for configuration documents and startup scripts.
//!
//! Templates live under `templates/` and are embedded with `include_str!`.
//! Placeholders are written `{{NAME}}`; conditional sections are assembled in Rust
//! and substituted as a whole.

use crate::errors::TransferError;

/// Substitute every `{{KEY}}` in `template` in a single pass.
///
/// Substituted values are copied verbatim and never scanned for placeholders.
///
/// # Errors
///
/// Returns [`TransferError::Template`] for the first placeholder without a value.
pub fn render(name: &str, template: &str, values: &[(&str, &str)]) -> Result<String, TransferError> {
    let unresolved = |placeholder: &str| TransferError::Template {
        template: name.to_string(),
        placeholder: placeholder.to_string(),
    };

    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            return Err(unresolved(&rest[start..]));
        };
        let key = &after[..end];
        let Some((_, value)) = values.iter().find(|(k, _)| *k == key) else {
            return Err(unresolved(&rest[start..start + end + 4]));
        };
        output.push_str(value);
        rest = &after[end + 2..];
    }
    output.push_str(rest);

    Ok(output)
}
