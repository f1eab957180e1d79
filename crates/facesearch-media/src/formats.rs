//! File-name validation for uploads.

/// Extensions accepted when none are configured.
pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 4] = [".jpg", ".jpeg", ".png", ".bmp"];

/// The entry of `allowed` that `filename` ends with, ignoring case.
///
/// Entries are expected lowercase with a leading dot.
pub fn allowed_extension<'a, S: AsRef<str>>(filename: &str, allowed: &'a [S]) -> Option<&'a str> {
    let lower = filename.to_ascii_lowercase();
    allowed
        .iter()
        .map(<S as AsRef<str>>::as_ref)
        .find(|ext| !ext.is_empty() && lower.ends_with(ext))
}

/// MIME type for an image extension such as `.png`.
pub fn content_type_for(ext: &str) -> String {
    match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg".to_string(),
        "" => "application/octet-stream".to_string(),
        other => format!("image/{other}"),
    }
}

/// Extension of the last path segment of `key`, including the dot.
pub fn extension_of(key: &str) -> &str {
    let name = key.rsplit('/').next().unwrap_or(key);
    name.rfind('.').map(|i| &name[i..]).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_extension_case_insensitive() {
        assert_eq!(allowed_extension("Photo.JPG", &DEFAULT_ALLOWED_EXTENSIONS), Some(".jpg"));
        assert_eq!(allowed_extension("scan.jpeg", &DEFAULT_ALLOWED_EXTENSIONS), Some(".jpeg"));
        assert_eq!(allowed_extension("notes.txt", &DEFAULT_ALLOWED_EXTENSIONS), None);
        assert_eq!(allowed_extension("", &DEFAULT_ALLOWED_EXTENSIONS), None);
    }

    #[test]
    fn test_allowed_extension_owned_list() {
        let allowed = vec![".webp".to_string()];
        assert_eq!(allowed_extension("a.WEBP", &allowed), Some(".webp"));
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(".jpg"), "image/jpeg");
        assert_eq!(content_type_for(".png"), "image/png");
        assert_eq!(content_type_for(".bmp"), "image/bmp");
        assert_eq!(content_type_for(""), "application/octet-stream");
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("dir/a.b/c.png"), ".png");
        assert_eq!(extension_of("dir.x/file"), "");
    }
}
