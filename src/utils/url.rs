//! Endpoint URL construction.

/// Strip surrounding whitespace and trailing slashes from a base URL.
///
/// ```
/// use chatdeck::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url(" http://localhost:8080/v1// "), "http://localhost:8080/v1");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Join an endpoint path onto a base URL with exactly one slash between.
///
/// ```
/// use chatdeck::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.openai.com/v1/", "/models"),
///     "https://api.openai.com/v1/models"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let endpoint = endpoint.trim().trim_start_matches('/');
    format!("{}/{endpoint}", normalize_base_url(base_url))
}
