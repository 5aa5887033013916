use std::collections::BTreeMap;

use url::{Url, form_urlencoded};

pub const DEFAULT_BASE_LINK: &str = "https://beatlink.example/";

pub trait LinkHost {
    fn base_link(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticLinkHost {
    base_link: String,
}

impl StaticLinkHost {
    #[must_use]
    pub fn new(base_link: impl Into<String>) -> Self {
        Self {
            base_link: base_link.into(),
        }
    }
}

impl Default for StaticLinkHost {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_LINK)
    }
}

impl LinkHost for StaticLinkHost {
    fn base_link(&self) -> String {
        self.base_link.clone()
    }
}

/// Query parameters of `link`, first occurrence winning.
///
/// Accepts an absolute link, a bare query with or without the leading `?`,
/// or an empty string. Never fails; unreadable input yields no parameters.
#[must_use]
pub fn query_params(link: &str) -> BTreeMap<String, String> {
    let link = link.trim();
    let pairs: Vec<(String, String)> = match Url::parse(link) {
        Ok(url) => url.query_pairs().into_owned().collect(),
        Err(_) => {
            let without_fragment = link.split_once('#').map_or(link, |(head, _)| head);
            let query = without_fragment
                .split_once('?')
                .map_or(without_fragment, |(_, query)| query);
            form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect()
        }
    };

    let mut params = BTreeMap::new();
    for (name, value) in pairs {
        params.entry(name).or_insert(value);
    }
    params
}
