use std::path::{Component, Path};

use crate::TransferError;

/// Validates that an uploaded file name is a single plain path component.
///
/// The name is used both as a staging directory and as the destination
/// file name, so anything that could leave the base directory is rejected:
/// - Empty names, `.` and `..`
/// - Absolute paths (Unix `/` or Windows `C:\`)
/// - Any separator, so no nested components either
pub fn validate_file_name(name: &str) -> Result<(), TransferError> {
    if name.is_empty() {
        return Err(TransferError::InvalidPath("empty file name".into()));
    }

    if name.contains('/') || name.contains('\\') {
        return Err(TransferError::InvalidPath(format!(
            "path separators not allowed: {name}"
        )));
    }

    if name.contains('\0') {
        return Err(TransferError::InvalidPath(format!(
            "NUL byte not allowed: {name:?}"
        )));
    }

    let path = Path::new(name);
    if path.is_absolute() {
        return Err(TransferError::InvalidPath(format!(
            "absolute path not allowed: {name}"
        )));
    }

    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        (Some(Component::ParentDir), _) => Err(TransferError::InvalidPath(format!(
            "parent directory not allowed: {name}"
        ))),
        _ => Err(TransferError::InvalidPath(format!(
            "not a plain file name: {name}"
        ))),
    }
}
