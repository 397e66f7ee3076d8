//! Host allow-list for download requests.

use crate::domain::jobs::AcceptedUrl;
use crate::error::ValidationError;
use url::Url;

/// Platforms accepted when no `ALLOWED_DOMAINS` override is configured.
/// Subdomains of each entry are accepted as well.
pub const DEFAULT_ALLOWED_DOMAINS: &[&str] = &[
    "youtube.com",
    "youtu.be",
    "vimeo.com",
    "dailymotion.com",
    "twitch.tv",
    "twitter.com",
    "x.com",
    "instagram.com",
    "tiktok.com",
    "facebook.com",
    "fb.watch",
    "reddit.com",
    "v.redd.it",
    "streamable.com",
    "imgur.com",
    "gfycat.com",
    "rumble.com",
    "bitchute.com",
    "odysee.com",
    "peertube.tv",
    "framatube.org",
    "video.blender.org",
    "bilibili.com",
    "b23.tv",
    "nicovideo.jp",
    "soundcloud.com",
    "bandcamp.com",
    "mixcloud.com",
    "open.spotify.com",
    "cnn.com",
    "bbc.com",
    "bbc.co.uk",
    "vevo.com",
    "coub.com",
    "vk.com",
    "flickr.com",
    "tumblr.com",
    "ted.com",
    "crunchyroll.com",
];

#[derive(Debug, Clone)]
pub struct AllowList {
    domains: Vec<String>,
}

impl Default for AllowList {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_DOMAINS.iter().copied())
    }
}

impl AllowList {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut domains: Vec<String> = domains
            .into_iter()
            .map(|d| normalize_host(d.as_ref()))
            .filter(|d| !d.is_empty())
            .collect();
        domains.sort();
        domains.dedup();
        Self { domains }
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// Accepts `url` iff its host is an allow-listed domain or a subdomain of one.
    pub fn validate(&self, url: &str) -> Result<AcceptedUrl, ValidationError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ValidationError::EmptyUrl);
        }

        let parsed = if url.contains("://") {
            Url::parse(url)
        } else {
            Url::parse(&format!("https://{}", url))
        }
        .map_err(|_| ValidationError::InvalidUrl)?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ValidationError::UnsupportedScheme(parsed.scheme().to_owned()));
        }

        let host = parsed
            .host_str()
            .map(normalize_host)
            .filter(|h| !h.is_empty())
            .ok_or(ValidationError::InvalidUrl)?;

        if self.is_allowed(&host) {
            Ok(AcceptedUrl::new(parsed, host))
        } else {
            Err(ValidationError::UnsupportedDomain(host))
        }
    }

    fn is_allowed(&self, host: &str) -> bool {
        self.domains.iter().any(|domain| {
            host == domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_owned(),
        None => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_listed_domain() {
        let list = AllowList::default();
        let accepted = list.validate("https://youtube.com/watch?v=x").unwrap();
        assert_eq!(accepted.host(), "youtube.com");
    }

    #[test]
    fn test_accepts_www_and_case_variants() {
        let list = AllowList::default();
        assert!(list.validate("https://WWW.YouTube.COM/watch?v=x").is_ok());
        assert!(list.validate("http://www.vimeo.com/123").is_ok());
    }

    #[test]
    fn test_accepts_subdomain() {
        let list = AllowList::default();
        assert_eq!(
            list.validate("https://m.youtube.com/watch?v=x").unwrap().host(),
            "m.youtube.com"
        );
        assert!(list.validate("https://clips.twitch.tv/abc").is_ok());
    }

    #[test]
    fn test_accepts_url_without_scheme() {
        let list = AllowList::default();
        let accepted = list.validate("youtu.be/abc").unwrap();
        assert_eq!(accepted.as_str(), "https://youtu.be/abc");
    }

    #[test]
    fn test_rejects_lookalike_domain() {
        let list = AllowList::default();
        assert_eq!(
            list.validate("https://notyoutube.com/x"),
            Err(ValidationError::UnsupportedDomain("notyoutube.com".into()))
        );
        assert!(list.validate("https://youtube.com.evil.net/x").is_err());
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        let list = AllowList::default();
        assert_eq!(
            list.validate("ftp://youtube.com/x"),
            Err(ValidationError::UnsupportedScheme("ftp".into()))
        );
        assert!(list.validate("file:///etc/passwd").is_err());
    }

    #[test]
    fn test_rejects_empty_and_garbage() {
        let list = AllowList::default();
        assert_eq!(list.validate("   "), Err(ValidationError::EmptyUrl));
        assert_eq!(list.validate("http://"), Err(ValidationError::InvalidUrl));
    }

    #[test]
    fn test_ignores_port_and_userinfo() {
        let list = AllowList::default();
        assert!(list.validate("https://user:pw@youtube.com:443/x").is_ok());
        assert!(list.validate("https://youtube.com@evil.net/x").is_err());
    }

    #[test]
    fn test_custom_list_normalizes_entries() {
        let list = AllowList::new(["WWW.Example.org", "", "example.org"]);
        assert_eq!(list.domains(), &["example.org".to_string()]);
        assert!(list.validate("https://media.example.org/v").is_ok());
        assert!(list.validate("https://youtube.com/v").is_err());
    }
}
