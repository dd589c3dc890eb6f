//! Content-type guessing from object key extensions.

/// Fallback for unknown or missing extensions.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Get the content type for an object key based on its extension.
pub fn guess_content_type(key: &str) -> &'static str {
    mime_guess::from_path(key).first_raw().unwrap_or(OCTET_STREAM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_extensions() {
        assert_eq!(guess_content_type("robots.txt"), "text/plain");
        assert_eq!(guess_content_type("corpora/files/a.PDF"), "application/pdf");
        assert_eq!(guess_content_type("downloads/bundle.zip"), "application/zip");
    }

    #[test]
    fn test_extensions_beyond_common_documents() {
        assert_eq!(guess_content_type("corpora/src/a.py"), "text/x-python");
        assert_eq!(guess_content_type("corpora/mail/msg.eml"), "message/rfc822");
        assert_eq!(guess_content_type("corpora/print/page.ps"), "application/postscript");
    }

    #[test]
    fn test_unknown_or_missing_extension() {
        assert_eq!(guess_content_type("corpora/drives/disk.E01"), OCTET_STREAM);
        assert_eq!(guess_content_type("corpora/README"), OCTET_STREAM);
        assert_eq!(guess_content_type("corpora/.hidden"), OCTET_STREAM);
        assert_eq!(guess_content_type("corpora.d/README"), OCTET_STREAM);
    }
}
