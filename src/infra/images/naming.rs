//! Deterministic local filenames for mirrored image URLs.

use sha2::{Digest, Sha256};
use slug::slugify;
use url::Url;

const HASH_PREFIX_LEN: usize = 16;
const MAX_STEM_LEN: usize = 48;
const FALLBACK_STEM: &str = "image";
const FALLBACK_EXTENSION: &str = "img";
const KNOWN_EXTENSIONS: [&str; 9] = [
    "jpg", "jpeg", "png", "gif", "webp", "avif", "svg", "bmp", "ico",
];

/// `<first 16 hex of sha256(url)>-<slugified stem>.<ext>`; `None` for non-http(s) URLs.
pub fn filename_for(source_url: &str) -> Option<String> {
    let url = Url::parse(source_url).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let digest = Sha256::digest(source_url.as_bytes());
    let hash = hex::encode(digest);
    let hash = &hash[..HASH_PREFIX_LEN];

    let last_segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();
    let (raw_stem, raw_ext) = match last_segment.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (last_segment, None),
    };

    let mut stem = slugify(raw_stem);
    stem.truncate(MAX_STEM_LEN);
    let stem = stem.trim_matches('-');
    let stem = if stem.is_empty() { FALLBACK_STEM } else { stem };

    let extension = raw_ext
        .map(str::to_ascii_lowercase)
        .filter(|ext| KNOWN_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string());

    Some(format!("{hash}-{stem}.{extension}"))
}

/// Whether `filename` could have been produced by [`filename_for`].
pub fn is_valid_filename(filename: &str) -> bool {
    if !filename.is_ascii() {
        return false;
    }
    let Some((stem, extension)) = filename.rsplit_once('.') else {
        return false;
    };
    stem.len() > HASH_PREFIX_LEN + 1
        && stem.as_bytes()[HASH_PREFIX_LEN] == b'-'
        && stem[..HASH_PREFIX_LEN]
            .bytes()
            .all(|byte| byte.is_ascii_hexdigit() && !byte.is_ascii_uppercase())
        && stem[HASH_PREFIX_LEN + 1..]
            .bytes()
            .all(|byte| byte.is_ascii_lowercase() || byte.is_ascii_digit() || byte == b'-')
        && (extension == FALLBACK_EXTENSION || KNOWN_EXTENSIONS.contains(&extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_url_same_filename() {
        let url = "https://shop.example/wp-content/uploads/2026/01/Blue_Mug.JPG";
        let first = filename_for(url).expect("filename");
        assert_eq!(filename_for(url), Some(first.clone()));
        assert!(first.ends_with("-blue-mug.jpg"), "{first}");
        assert!(is_valid_filename(&first));
    }

    #[test]
    fn different_urls_with_same_name_do_not_collide() {
        let a = filename_for("https://shop.example/a/mug.png").expect("a");
        let b = filename_for("https://shop.example/b/mug.png").expect("b");
        assert_ne!(a, b);
    }

    #[test]
    fn unknown_extension_falls_back() {
        let name = filename_for("https://cdn.example/render?id=4").expect("filename");
        assert!(name.ends_with("-render.img"), "{name}");
        let name = filename_for("https://cdn.example/").expect("filename");
        assert!(name.ends_with("-image.img"), "{name}");
    }

    #[test]
    fn non_http_urls_are_rejected() {
        assert_eq!(filename_for("file:///etc/passwd"), None);
        assert_eq!(filename_for("not a url"), None);
    }

    #[test]
    fn traversal_names_are_invalid() {
        assert!(!is_valid_filename("../index.json"));
        assert!(!is_valid_filename("index.json"));
        assert!(!is_valid_filename("0123456789abcdef-x/../y.png"));
        assert!(!is_valid_filename("0123456789ABCDEF-mug.png"));
        assert!(!is_valid_filename("0123456789abcdéf-mug.png"));
        assert!(is_valid_filename("0123456789abcdef-mug.png"));
    }
}
