//! Resource discovery by scanning document text.
//!
//! No I/O happens here. Each function returns a map of resource reference to
//! inferred mime type; keys are unique, so the same reference found by more
//! than one pattern is reported once.

use crate::consts::{
    ABSOLUTE_DOUBLE_QUOTED_REGEX, ABSOLUTE_SINGLE_QUOTED_REGEX, NON_RESOURCE_HOSTS, RELATIVE_DOUBLE_QUOTED_REGEX,
    RELATIVE_JSON_REGEX, RELATIVE_SINGLE_QUOTED_REGEX,
};
use regex::Regex;
use std::collections::BTreeMap;
use url::Url;

fn captures<'d>(patterns: &[&Regex], document: &'d str) -> Vec<&'d str> {
    patterns
        .iter()
        .flat_map(|pattern| pattern.captures_iter(document).filter_map(|c| c.get(1)).map(|m| m.as_str()))
        .collect()
}

/// Absolute `http(s)://` URLs referenced from quoted attributes or JSON
/// string values.
///
/// A URL is kept only if it parses, has a path beyond `/` and its host is
/// not one of the well-known vocabulary hosts (`w3.org`, `schema.org`,
/// `ogp.me`, or any of their subdomains).
pub fn discover_absolute_resources(document: &str) -> BTreeMap<String, String> {
    captures(&[&*ABSOLUTE_DOUBLE_QUOTED_REGEX, &*ABSOLUTE_SINGLE_QUOTED_REGEX], document)
        .into_iter()
        .filter(|url| is_resource_url(url))
        .map(|url| (url.to_string(), mime_for_path(url)))
        .collect()
}

/// Relative references under `/runtime/`, `../` or `build/`, normalised so
/// that `/runtime/a.js`, `../runtime/a.js` and `runtime/a.js` share a key.
pub fn discover_relative_resources(document: &str) -> BTreeMap<String, String> {
    captures(
        &[&*RELATIVE_DOUBLE_QUOTED_REGEX, &*RELATIVE_SINGLE_QUOTED_REGEX, &*RELATIVE_JSON_REGEX],
        document,
    )
    .into_iter()
    .map(normalise_relative)
    .filter(|path| !path.is_empty())
    .map(|path| (path.to_string(), mime_for_path(path)))
    .collect()
}

fn normalise_relative(mut path: &str) -> &str {
    while let Some(rest) = path.strip_prefix("../") {
        path = rest;
    }
    path.trim_start_matches('/')
}

fn is_resource_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    parsed.path() != "/"
        && !NON_RESOURCE_HOSTS
            .iter()
            .any(|excluded| host == *excluded || host.ends_with(&format!(".{excluded}")))
}

/// Infer a mime type from the extension of the last path segment.
///
/// `js` maps to `text/javascript`, no extension to `text/plain`, anything
/// else to `text/{extension}`. Query strings and fragments are ignored.
///
/// ```
/// use webstash_manifest::resolve::mime_for_path;
///
/// assert_eq!(mime_for_path("/runtime/app.js?v=2"), "text/javascript");
/// assert_eq!(mime_for_path("styles/a.css"), "text/css");
/// assert_eq!(mime_for_path("build/LICENSE"), "text/plain");
/// ```
pub fn mime_for_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let segment = path.rsplit('/').next().unwrap_or(path);
    match segment.rsplit_once('.') {
        Some((_, "js")) => "text/javascript".to_string(),
        Some((_, extension)) if !extension.is_empty() => format!("text/{extension}"),
        _ => "text/plain".to_string(),
    }
}
