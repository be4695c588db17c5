//! App URL schemes

const EXP_SCHEME: &str = "exp://";
const EXPS_SCHEME: &str = "exps://";

/// Rewrite `exp://` to `http://` and `exps://` to `https://`; other URLs pass through
pub fn to_http(url: &str) -> String {
    if let Some(rest) = url.strip_prefix(EXP_SCHEME) {
        format!("http://{}", rest)
    } else if let Some(rest) = url.strip_prefix(EXPS_SCHEME) {
        format!("https://{}", rest)
    } else {
        url.to_string()
    }
}
