use std::sync::LazyLock;

use regex::Regex;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https?://\S+").expect("URL pattern is valid")
});

/// Hosts we know how to fetch from, matched by substring against the
/// lowercased host.
const SUPPORTED_DOMAINS: &[(&str, Platform)] = &[
    ("youtube.com", Platform::Youtube),
    ("youtu.be", Platform::Youtube),
    ("m.youtube.com", Platform::Youtube),
    ("instagram.com", Platform::Instagram),
    ("www.instagram.com", Platform::Instagram),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Youtube,
    Instagram,
    Unsupported,
}

impl Platform {
    pub fn is_supported(self) -> bool {
        self != Platform::Unsupported
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Youtube => write!(f, "youtube"),
            Platform::Instagram => write!(f, "instagram"),
            Platform::Unsupported => write!(f, "unsupported"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedUrl {
    pub url: String,
    pub platform: Platform,
}

/// Find the first URL in `text` and tag it with its platform.
/// Only the first URL counts; later ones are ignored.
pub fn classify(text: &str) -> Option<ClassifiedUrl> {
    let url = URL_RE.find(text)?.as_str();
    let host = host_of(url).to_ascii_lowercase();

    let platform = SUPPORTED_DOMAINS
        .iter()
        .find(|(domain, _)| host.contains(domain))
        .map(|(_, platform)| *platform)
        .unwrap_or(Platform::Unsupported);

    Some(ClassifiedUrl {
        url: url.to_string(),
        platform,
    })
}

/// Authority part of a `scheme://...` URL without userinfo and port.
fn host_of(url: &str) -> &str {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let authority = rest
        .split(|c| c == '/' || c == '?' || c == '#')
        .next()
        .unwrap_or(rest);
    let authority = authority.rsplit_once('@').map(|(_, h)| h).unwrap_or(authority);
    authority.split(':').next().unwrap_or(authority)
}
