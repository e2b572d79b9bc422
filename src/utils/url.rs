//! URL utilities for consistent endpoint construction
//!
//! The backend base URL comes from config or the command line and may carry
//! trailing slashes; these helpers keep the assembled endpoints free of
//! doubled separators.

/// Normalize a base URL by removing trailing slashes.
///
/// # Examples
///
/// ```
/// use duet::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://localhost:8000"), "http://localhost:8000");
/// assert_eq!(normalize_base_url("http://localhost:8000/"), "http://localhost:8000");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Construct a complete endpoint URL from a base URL and a path.
///
/// # Examples
///
/// ```
/// use duet::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("http://localhost:8000/", "api/chat"),
///     "http://localhost:8000/api/chat"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("http://localhost:8000"),
            "http://localhost:8000"
        );
        assert_eq!(
            normalize_base_url("http://localhost:8000/"),
            "http://localhost:8000"
        );
        assert_eq!(
            normalize_base_url("http://localhost:8000///"),
            "http://localhost:8000"
        );
        assert_eq!(normalize_base_url(""), "");
        assert_eq!(normalize_base_url("///"), "");
    }

    #[test]
    fn test_construct_api_url() {
        assert_eq!(
            construct_api_url("http://localhost:8000", "api/chat"),
            "http://localhost:8000/api/chat"
        );
        assert_eq!(
            construct_api_url("http://localhost:8000/", "api/chat"),
            "http://localhost:8000/api/chat"
        );
        assert_eq!(
            construct_api_url("http://localhost:8000", "/api/chat/image"),
            "http://localhost:8000/api/chat/image"
        );
        assert_eq!(
            construct_api_url("https://companion.example.com///", "api/conversation"),
            "https://companion.example.com/api/conversation"
        );
    }
}
