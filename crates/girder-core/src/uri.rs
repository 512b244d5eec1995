use std::path::{Path, PathBuf};

use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum UriError {
    #[error("failed to parse URI `{uri}`: {source}")]
    Parse {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    #[error("URI `{0}` is not a local file URI")]
    NotFile(String),

    #[error("path `{0}` cannot be represented as a file URI")]
    NotAbsolute(PathBuf),
}

/// Parse a `file://` URI into a local path, decoding percent escapes.
///
/// Non-file schemes and URIs with a non-local host are rejected.
pub fn file_uri_to_path(uri: &str) -> Result<PathBuf, UriError> {
    let parsed = Url::parse(uri).map_err(|source| UriError::Parse {
        uri: uri.to_string(),
        source,
    })?;
    if parsed.scheme() != "file" {
        return Err(UriError::NotFile(uri.to_string()));
    }
    parsed
        .to_file_path()
        .map_err(|()| UriError::NotFile(uri.to_string()))
}

/// Render an absolute path as a `file://` URI.
pub fn path_to_file_uri(path: &Path) -> Result<String, UriError> {
    Url::from_file_path(path)
        .map(|url| url.to_string())
        .map_err(|()| UriError::NotAbsolute(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_uri_roundtrip() {
        let path = Path::new("/tmp/workspace/app");
        let uri = path_to_file_uri(path).unwrap();
        assert_eq!(uri, "file:///tmp/workspace/app");
        assert_eq!(file_uri_to_path(&uri).unwrap(), path);
    }

    #[test]
    fn file_uri_decodes_percent_escapes() {
        let path = file_uri_to_path("file:///tmp/a%20b/Main.java").unwrap();
        assert_eq!(path, PathBuf::from("/tmp/a b/Main.java"));
    }

    #[test]
    fn non_file_scheme_is_rejected() {
        let err = file_uri_to_path("https://example.com/x").unwrap_err();
        assert!(matches!(err, UriError::NotFile(_)));
    }

    #[test]
    fn garbage_uri_is_rejected() {
        assert!(file_uri_to_path("not a uri").is_err());
    }

    #[test]
    fn relative_path_cannot_become_uri() {
        let err = path_to_file_uri(Path::new("relative/dir")).unwrap_err();
        assert!(matches!(err, UriError::NotAbsolute(_)));
    }
}
