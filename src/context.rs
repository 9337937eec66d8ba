//! Per-session values handed explicitly to every pipeline operation.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::{form_urlencoded, Url};

use crate::error::Error;
use crate::models::Device;

const RELATIVE_BASE: &str = "http://localhost/";

/// Display language for rendered views.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    #[default]
    Tr,
    En,
}

impl FromStr for Lang {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tr" => Ok(Lang::Tr),
            "en" => Ok(Lang::En),
            other => Err(Error::InvalidInput(format!("unsupported language: {other}"))),
        }
    }
}

/// What the page knows about the current visit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageContext {
    pub path: String,
    /// Raw query string including the leading `?`, or empty.
    pub search: String,
    pub referrer: String,
    pub locale: String,
    pub timezone: String,
    pub viewport_width: u32,
}

impl PageContext {
    /// Split a URL or path (`https://host/a?b=c#d`, `/a?b=c`) into path and query.
    /// Relative input resolves against a placeholder origin, as a page's own
    /// `location` would.
    pub fn from_url(raw: &str) -> Self {
        let parsed = Url::parse(raw).or_else(|_| Url::parse(RELATIVE_BASE)?.join(raw));
        let Ok(url) = parsed else {
            tracing::debug!(url = raw, "unparseable page url, using root");
            return Self {
                path: "/".to_string(),
                ..Self::default()
            };
        };

        let search = match url.query() {
            Some(query) if !query.is_empty() => format!("?{query}"),
            _ => String::new(),
        };
        let path = if url.path().is_empty() { "/" } else { url.path() };

        Self {
            path: path.to_string(),
            search,
            ..Self::default()
        }
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = referrer.into();
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    pub fn with_viewport_width(mut self, width: u32) -> Self {
        self.viewport_width = width;
        self
    }

    pub fn landing_page(&self) -> String {
        format!("{}{}", self.path, self.search)
    }

    pub fn device(&self) -> Device {
        Device::from_viewport_width(self.viewport_width)
    }

    /// First value of a query parameter, form-decoded; empty when absent.
    /// Invalid escapes decode to U+FFFD.
    pub fn query_param(&self, name: &str) -> String {
        let query = self.search.strip_prefix('?').unwrap_or(&self.search);
        form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key.as_ref() == name)
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default()
    }
}

/// Everything a pipeline call needs to know about who is asking.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub page: PageContext,
    pub brand_name: Option<String>,
    pub lang: Lang,
}

impl SessionContext {
    pub fn new(page: PageContext) -> Self {
        Self {
            page,
            ..Self::default()
        }
    }

    pub fn with_brand(mut self, brand_name: impl Into<String>) -> Self {
        self.brand_name = Some(brand_name.into());
        self
    }

    pub fn with_lang(mut self, lang: Lang) -> Self {
        self.lang = lang;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_full_url() {
        let page = PageContext::from_url("https://studio.example/hizmetler?utm_source=google&x=1#top");
        assert_eq!(page.path, "/hizmetler");
        assert_eq!(page.search, "?utm_source=google&x=1");
        assert_eq!(page.landing_page(), "/hizmetler?utm_source=google&x=1");
    }

    #[test]
    fn splits_bare_path_and_host_only_url() {
        assert_eq!(PageContext::from_url("/book?a=b").path, "/book");
        assert_eq!(PageContext::from_url("https://studio.example").path, "/");
        assert_eq!(PageContext::from_url("").path, "/");
    }

    #[test]
    fn decodes_query_params() {
        let page = PageContext::from_url("/?utm_campaign=spring+sale&utm_term=%C3%BCr%C3%BCn&gclid=");
        assert_eq!(page.query_param("utm_campaign"), "spring sale");
        assert_eq!(page.query_param("utm_term"), "ürün");
        assert_eq!(page.query_param("gclid"), "");
        assert_eq!(page.query_param("fbclid"), "");
    }

    #[test]
    fn invalid_escapes_decode_to_replacement_char() {
        let page = PageContext::from_url("/?utm_source=%FFgoogle&utm_term=100%");
        assert_eq!(page.query_param("utm_source"), "\u{FFFD}google");
        assert_eq!(page.query_param("utm_term"), "100%");
    }

    #[test]
    fn bare_question_mark_leaves_no_search() {
        let page = PageContext::from_url("/iletisim?");
        assert_eq!(page.path, "/iletisim");
        assert_eq!(page.search, "");
        assert_eq!(page.landing_page(), "/iletisim");
    }

    #[test]
    fn first_duplicate_param_wins() {
        let page = PageContext::from_url("/?utm_source=a&utm_source=b");
        assert_eq!(page.query_param("utm_source"), "a");
    }
}
