use crate::errors::Ck101Error;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref THREAD_PATTERN: Regex = Regex::new(r"thread-(\d+)-.*").unwrap();
}

/// Numeric thread id from a link like `http://ck101.com/thread-2593278-1-1.html`.
pub fn thread_id(link: &str) -> Result<String, Ck101Error> {
    let last_segment = link.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    THREAD_PATTERN
        .captures(last_segment)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
        .ok_or_else(|| Ck101Error::InvalidInput(link.to_string()))
}

/// `<root>/<thread id> - <title>`
pub fn target_directory(pictures_root: &Path, thread_id: &str, title: &str) -> PathBuf {
    pictures_root.join(format!("{thread_id} - {title}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_id() {
        assert_eq!(
            thread_id("http://ck101.com/thread-2593278-1-1.html").unwrap(),
            "2593278"
        );
        assert_eq!(thread_id("https://ck101.com/thread-42-3-1.html/").unwrap(), "42");
    }

    #[test]
    fn test_thread_id_only_looks_at_last_segment() {
        assert!(thread_id("http://ck101.com/thread-1-1-1.html/forum.php").is_err());
        assert!(matches!(
            thread_id("http://ck101.com/forum.php?mod=viewthread"),
            Err(Ck101Error::InvalidInput(_))
        ));
        assert!(thread_id("").is_err());
    }

    #[test]
    fn test_target_directory() {
        assert_eq!(
            target_directory(Path::new("/home/me/Pictures/go-ck101"), "2593278", "My Thread"),
            PathBuf::from("/home/me/Pictures/go-ck101/2593278 - My Thread")
        );
    }
}
