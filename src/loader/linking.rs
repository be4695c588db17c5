//! Linking URI
//!
//! The base URI an app prepends to its deep links. Apps served from a managed
//! host get the `--/` separator appended to their project path; everything
//! else links against the manifest URL itself.

use url::Url;

use crate::config::HostConfig;
use crate::domain::SdkVersion;

/// Compute the linking URI for an app loaded from `manifest_url` at `sdk`
pub fn linking_uri(config: &HostConfig, manifest_url: &str, sdk: &SdkVersion) -> String {
    if let Some(scheme) = &config.shell_app_scheme {
        return format!("{}://", scheme);
    }

    if *sdk < config.linking_threshold {
        return format!("{}/+", manifest_url);
    }

    let Ok(mut url) = Url::parse(manifest_url) else {
        log::debug!("Linking URI: cannot parse {}, using it unchanged", manifest_url);
        return manifest_url.to_string();
    };

    let managed = url
        .host_str()
        .is_some_and(|host| is_managed_host(&config.managed_hosts, host));
    if !managed {
        return manifest_url.to_string();
    }

    let segments: Vec<String> = url
        .path_segments()
        .map(|segments| {
            segments
                .filter(|s| !s.is_empty())
                .take_while(|s| *s != config.deep_link_separator)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut path = String::from("/");
    for segment in &segments {
        path.push_str(segment);
        path.push('/');
    }
    path.push_str(&config.deep_link_separator_with_slash());
    url.set_path(&path);
    with_original_authority(manifest_url, &url)
}

/// Render `url` with scheme and authority exactly as written in `original`.
/// Parsing drops an explicit default port, which the linking URI keeps.
fn with_original_authority(original: &str, url: &Url) -> String {
    let Some((scheme, rest)) = original.split_once("://") else {
        return url.to_string();
    };
    let authority = &rest[..rest.find(['/', '?', '#']).unwrap_or(rest.len())];

    let mut linked = format!("{}://{}{}", scheme, authority, url.path());
    if let Some(query) = url.query() {
        linked.push('?');
        linked.push_str(query);
    }
    if let Some(fragment) = url.fragment() {
        linked.push('#');
        linked.push_str(fragment);
    }
    linked
}

fn is_managed_host(managed_hosts: &[String], host: &str) -> bool {
    managed_hosts
        .iter()
        .any(|managed| host == managed || host.ends_with(&format!(".{}", managed)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> SdkVersion {
        SdkVersion::parse(s).unwrap()
    }

    #[test]
    fn test_managed_host_gets_separator() {
        let config = HostConfig::default();
        assert_eq!(
            linking_uri(&config, "https://exp.host/@user/app", &v("28.0.0")),
            "https://exp.host/@user/app/--/"
        );
    }

    #[test]
    fn test_existing_deep_link_is_cut() {
        let config = HostConfig::default();
        assert_eq!(
            linking_uri(&config, "https://exp.host/@user/app/--/some/route", &v("28.0.0")),
            "https://exp.host/@user/app/--/"
        );
    }

    #[test]
    fn test_subdomain_of_managed_host() {
        let config = HostConfig::default();
        assert_eq!(
            linking_uri(&config, "http://abc-123.exp.direct:80/@user/app", &v("30.0.0")),
            "http://abc-123.exp.direct:80/@user/app/--/"
        );
    }

    #[test]
    fn test_query_survives_rebuild() {
        let config = HostConfig::default();
        assert_eq!(
            linking_uri(&config, "https://exp.host/@user/app?release-channel=beta", &v("28.0.0")),
            "https://exp.host/@user/app/--/?release-channel=beta"
        );
    }

    #[test]
    fn test_lookalike_host_is_not_managed() {
        let config = HostConfig::default();
        let url = "https://notexp.host/@user/app";
        assert_eq!(linking_uri(&config, url, &v("28.0.0")), url);
    }

    #[test]
    fn test_unmanaged_host_unchanged() {
        let config = HostConfig::default();
        let url = "https://example.com/apps/app.json";
        assert_eq!(linking_uri(&config, url, &v("28.0.0")), url);
    }

    #[test]
    fn test_old_sdk_appends_plus() {
        let config = HostConfig::default();
        assert_eq!(
            linking_uri(&config, "https://exp.host/@user/app", &v("26.0.0")),
            "https://exp.host/@user/app/+"
        );
    }

    #[test]
    fn test_unversioned_counts_as_newest() {
        let config = HostConfig::default();
        assert_eq!(
            linking_uri(&config, "exp://exp.host/@user/app", &SdkVersion::Unversioned),
            "exp://exp.host/@user/app/--/"
        );
    }

    #[test]
    fn test_shell_scheme_wins() {
        let config = HostConfig::default().with_shell_scheme("myapp");
        assert_eq!(
            linking_uri(&config, "https://exp.host/@user/app", &v("20.0.0")),
            "myapp://"
        );
    }

    #[test]
    fn test_unparseable_url_unchanged() {
        let config = HostConfig::default();
        assert_eq!(linking_uri(&config, "not a url", &v("28.0.0")), "not a url");
    }
}
