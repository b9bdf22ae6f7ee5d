use std::path::{Path, PathBuf};

const DETAIL_SUFFIX: &str = "_tracklets";
const EXPORT_SUFFIX: &str = "_export.json";
const FORBIDDEN_FILE_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Path of the tracklet detail side file for a frame-level annotation file.
///
/// `rally001.txt` → `rally001_tracklets.txt`; a path without extension gets `_tracklets.txt`.
#[must_use]
pub fn derive_detail_file_path(frame_file_path: &str) -> String {
    // Only a dot inside the final path segment counts as an extension separator.
    let name_start = frame_file_path
        .rfind(&['/', '\\'][..])
        .map_or(0, |idx| idx + 1);
    match frame_file_path[name_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let split = name_start + dot;
            format!(
                "{}{DETAIL_SUFFIX}{}",
                &frame_file_path[..split],
                &frame_file_path[split..]
            )
        }
        _ => format!("{frame_file_path}{DETAIL_SUFFIX}.txt"),
    }
}

/// Digits of a filename read as one number; `None` without digits (or on overflow)
#[must_use]
pub fn embedded_frame_number(file_name: &str) -> Option<i64> {
    let digits: String = file_name.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Frame number embedded in an image filename: non-digits are stripped, falls back to `1`
#[must_use]
pub fn frame_number_from_name(file_name: &str) -> i64 {
    embedded_frame_number(file_name).unwrap_or(1)
}

/// Canonical image filename for a frame: 6-digit zero padded + `.jpg`
#[must_use]
pub fn frame_file_name(frame: i64) -> String {
    format!("{frame:06}.jpg")
}

/// Strip characters that are not allowed in file names on common platforms
#[must_use]
pub fn sanitize_file_stem(name: &str) -> String {
    name.chars()
        .filter(|c| !FORBIDDEN_FILE_CHARS.contains(c))
        .collect()
}

/// Default JSON export path: `<dir>/<sanitized rally name>_export.json`
#[must_use]
pub fn export_file_path(dir: &Path, rally_name: &str) -> PathBuf {
    dir.join(format!("{}{EXPORT_SUFFIX}", sanitize_file_stem(rally_name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_path_inserts_suffix_before_extension() {
        assert_eq!(derive_detail_file_path("rally001.txt"), "rally001_tracklets.txt");
        assert_eq!(
            derive_detail_file_path("rally/207s2rally001.txt"),
            "rally/207s2rally001_tracklets.txt"
        );
        assert_eq!(
            derive_detail_file_path("data/v1.2/rally.csv"),
            "data/v1.2/rally_tracklets.csv"
        );
    }

    #[test]
    fn test_detail_path_without_extension() {
        assert_eq!(derive_detail_file_path("rally001"), "rally001_tracklets.txt");
        assert_eq!(
            derive_detail_file_path("data.v2/rally001"),
            "data.v2/rally001_tracklets.txt"
        );
        assert_eq!(derive_detail_file_path(".hidden"), ".hidden_tracklets.txt");
    }

    #[test]
    fn test_frame_number_from_name() {
        assert_eq!(frame_number_from_name("000042.jpg"), 42);
        assert_eq!(frame_number_from_name("frame_17.png"), 17);
        assert_eq!(frame_number_from_name("cover.jpg"), 1);
        assert_eq!(embedded_frame_number("cover.jpg"), None);
        assert_eq!(embedded_frame_number("frame_0003.jpg"), Some(3));
    }

    #[test]
    fn test_frame_file_name_is_zero_padded() {
        assert_eq!(frame_file_name(5), "000005.jpg");
        assert_eq!(frame_file_name(123_456), "123456.jpg");
    }

    #[test]
    fn test_export_path_sanitizes_name() {
        assert_eq!(sanitize_file_stem(r#"a<b>c:d"e/f\g|h?i*j"#), "abcdefghij");
        assert_eq!(
            export_file_path(Path::new("/tmp/out"), "rally:01?"),
            PathBuf::from("/tmp/out/rally01_export.json")
        );
    }
}
