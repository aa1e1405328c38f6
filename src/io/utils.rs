//! Utilities for paths and filesystem preparation.

use std::{fs, path::Path};

use crate::error::{RegistrationError, Result};

/// Token replaced by the input file stem in output path templates.
pub const STEM_TOKEN: &str = "%stem%";
/// Token replaced by the output file extension in output path templates.
pub const EXTENSION_TOKEN: &str = "%ext%";
/// Token replaced by the outer loop index in output path templates.
pub const OUTER_TOKEN: &str = "%outer%";
/// Token replaced by the inner loop index in output path templates.
pub const INNER_TOKEN: &str = "%inner%";

/// Fails with a file-not-found error if the given path does not exist.
pub fn check_file_exists(file_path: &Path) -> Result<()> {
    if file_path.exists() {
        Ok(())
    } else {
        Err(RegistrationError::FileNotFound(file_path.to_path_buf()))
    }
}

/// Creates every missing directory leading up to the given target path.
pub fn ensure_parent_directories(file_path: &Path) -> Result<()> {
    if let Some(parent) = file_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Replaces every literal occurrence of the given token in the template.
pub fn replace_token(template: &str, token: &str, replacement: &str) -> String {
    template.replace(token, replacement)
}

/// Substitutes all recognized tokens in the given output path template.
pub fn substitute_path_tokens(
    template: &str,
    stem: &str,
    extension: &str,
    outer_index: usize,
    inner_index: usize,
) -> String {
    let path = replace_token(template, STEM_TOKEN, stem);
    let path = replace_token(&path, EXTENSION_TOKEN, extension);
    let path = replace_token(&path, OUTER_TOKEN, &outer_index.to_string());
    replace_token(&path, INNER_TOKEN, &inner_index.to_string())
}
