//! Configuration and startup error types

use thiserror::Error;

/// Errors raised while loading or validating service configuration.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display_includes_reason() {
        let err = Error::Config("timeout_secs must be greater than 0".into());
        assert_eq!(
            err.to_string(),
            "Configuration error: timeout_secs must be greater than 0"
        );
    }

    #[test]
    fn url_error_converts_from_parse_failure() {
        let parse_err = url::Url::parse("http://").unwrap_err();
        let err: Error = parse_err.into();
        assert!(err.to_string().starts_with("Invalid URL:"), "got: {err}");
    }

    #[test]
    fn io_error_keeps_variant_in_debug() {
        let err = Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "storefront-bff.toml",
        ));
        let debug = format!("{err:?}");
        assert!(debug.contains("Io"), "got: {debug}");
        assert!(err.to_string().contains("storefront-bff.toml"));
    }
}
