use log::{debug, warn};
use url::Url;

const MAX_REDIRECT_LENGTH: usize = 2048;

/// Accept only same-origin paths as a post-login redirect target.
///
/// The path must start with a single `/`, carry no scheme, no backslash, no
/// `..` segment and no control characters. Anything else yields `None`.
#[must_use]
pub fn validate_post_auth_redirect(redirect: &str) -> Option<String> {
    debug!("Validating post-authentication redirect: {redirect}");

    if redirect.len() > MAX_REDIRECT_LENGTH {
        warn!("Excessively long redirect URL: {} characters", redirect.len());
        return None;
    }

    if !is_relative_url(redirect) {
        warn!("Rejected non-local redirect: {redirect}");
        return None;
    }

    let decoded = urlencoding::decode(redirect).map_or_else(|_| redirect.into(), |d| d);
    let suspicious = [redirect, decoded.as_ref()].iter().any(|candidate| {
        candidate.contains('\\')
            || candidate.contains("..")
            || candidate.starts_with("//")
            || candidate.chars().any(char::is_control)
    });
    if suspicious {
        warn!("Suspicious redirect rejected: {redirect}");
        return None;
    }

    Some(redirect.to_string())
}

/// Like [`validate_post_auth_redirect`], but an absolute URL on the same
/// origin as `origin` is first reduced to its path, query and fragment.
#[must_use]
pub fn validate_return_to(redirect: &str, origin: &str) -> Option<String> {
    if redirect.len() > MAX_REDIRECT_LENGTH || is_relative_url(redirect) {
        return validate_post_auth_redirect(redirect);
    }

    let (Ok(target), Ok(origin)) = (Url::parse(redirect), Url::parse(origin)) else {
        warn!("Rejected non-local redirect: {redirect}");
        return None;
    };
    let same_origin = target.scheme() == origin.scheme()
        && target.host_str().is_some()
        && target.host_str() == origin.host_str()
        && target.port_or_known_default() == origin.port_or_known_default();
    if !same_origin || !target.username().is_empty() {
        warn!("Rejected cross-origin redirect: {redirect}");
        return None;
    }

    let mut local = target.path().to_string();
    if let Some(query) = target.query() {
        local.push('?');
        local.push_str(query);
    }
    if let Some(fragment) = target.fragment() {
        local.push('#');
        local.push_str(fragment);
    }
    validate_post_auth_redirect(&local)
}

/// Check if URL is relative (starts with /, not //, and has no scheme)
fn is_relative_url(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//") && !url.contains(':')
}
