use crate::TransferError;

/// Longest file name kept, in bytes.
const MAX_NAME_LEN: usize = 255;

/// Reduces a peer-supplied file name to a single safe path component.
///
/// Any directory part (with `/` or `\` separators) is dropped, control
/// characters and characters reserved on common filesystems are replaced,
/// and overlong names are truncated. Rejects names that end up empty or
/// consist only of dots.
pub fn sanitize_file_name(name: &str) -> Result<String, TransferError> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let mut clean: String = base
        .chars()
        .map(|c| match c {
            c if c.is_control() => '_',
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();
    let trimmed = clean.trim();
    if trimmed.len() != clean.len() {
        clean = trimmed.to_string();
    }

    if clean.is_empty() || clean.chars().all(|c| c == '.') {
        return Err(TransferError::InvalidName(name.to_string()));
    }

    if clean.len() > MAX_NAME_LEN {
        let mut cut = MAX_NAME_LEN;
        while !clean.is_char_boundary(cut) {
            cut -= 1;
        }
        clean.truncate(cut);
    }

    Ok(clean)
}
