//! Join link generation and parsing
//!
//! Link format: `<base>/?join=<counter-id>`
//!
//! A bare id and a `/tasbih/<counter-id>` path are accepted as well, so a
//! pasted code, a scanned link and an API path all resolve to the same
//! counter.

use std::str::FromStr;

use tasbih_core::CounterId;

use crate::error::{Error, Result};

/// Query key carrying the counter id
const JOIN_KEY: &str = "join";

/// Path segment preceding the counter id in API-style links
const PATH_PREFIX: &str = "tasbih";

/// Shareable join link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinLink {
    pub base: String,
    pub id: CounterId,
}

impl JoinLink {
    /// Create a link for `id` under `base` (trailing slashes are dropped)
    pub fn new(base: impl Into<String>, id: CounterId) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
            id,
        }
    }

    /// Format as URL string
    pub fn to_url(&self) -> String {
        format!("{}/?{}={}", self.base, JOIN_KEY, self.id)
    }

    /// Extract a counter id from a bare id, a join link, or an API path
    pub fn parse_id(s: &str) -> Result<CounterId> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::Protocol("Empty join code".into()));
        }

        if let Some(value) = query_value(s, JOIN_KEY) {
            return parse_counter_id(value);
        }

        let path = s.split(['?', '#']).next().unwrap_or(s);
        let mut segments = path.rsplit('/').filter(|seg| !seg.is_empty());
        match (segments.next(), segments.next()) {
            (Some(id), Some(PATH_PREFIX)) => parse_counter_id(id),
            (Some(id), None) => parse_counter_id(id),
            _ => Err(Error::Protocol(format!("Invalid join link: '{}'", s))),
        }
    }

    /// Parse a full link, keeping its base. A bare id gets an empty base.
    pub fn parse(s: &str) -> Result<Self> {
        let id = Self::parse_id(s)?;
        let trimmed = s.trim();
        let base = match trimmed.find('?') {
            Some(pos) => &trimmed[..pos],
            None => match trimmed.rfind(&format!("/{}/", PATH_PREFIX)) {
                Some(pos) => &trimmed[..pos],
                None => "",
            },
        };
        Ok(Self::new(base, id))
    }
}

fn query_value<'a>(s: &'a str, key: &str) -> Option<&'a str> {
    let (_, query) = s.split_once('?')?;
    let query = query.split('#').next().unwrap_or(query);
    query.split('&').find_map(|pair| match pair.split_once('=') {
        Some((k, v)) if k == key => Some(v),
        _ => None,
    })
}

fn parse_counter_id(s: &str) -> Result<CounterId> {
    CounterId::parse(s).map_err(|_| Error::Protocol(format!("Invalid counter id '{}'", s)))
}

impl std::fmt::Display for JoinLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_url())
    }
}

impl FromStr for JoinLink {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "550e8400-e29b-41d4-a716-446655440000";

    #[test]
    fn test_link_format() {
        let id = CounterId::parse(ID).unwrap();
        let link = JoinLink::new("https://tasbih.example/", id);
        assert_eq!(
            link.to_url(),
            format!("https://tasbih.example/?join={}", ID)
        );
    }

    #[test]
    fn test_link_roundtrip() {
        let link = JoinLink::new("https://tasbih.example", CounterId::new());
        let parsed: JoinLink = link.to_url().parse().unwrap();
        assert_eq!(parsed, link);
    }

    #[test]
    fn test_every_encoding_resolves_to_same_id() {
        let expected = CounterId::parse(ID).unwrap();
        let inputs = [
            ID.to_string(),
            format!("  {}\n", ID),
            format!("https://tasbih.example/?join={}", ID),
            format!("https://tasbih.example/?lang=ar&join={}#top", ID),
            format!("https://tasbih.example/tasbih/{}", ID),
            format!("/tasbih/{}/", ID),
        ];

        for input in &inputs {
            assert_eq!(JoinLink::parse_id(input).unwrap(), expected, "{}", input);
        }
    }

    #[test]
    fn test_path_link_keeps_base() {
        let link = JoinLink::parse(&format!("http://10.0.0.2:7340/tasbih/{}", ID)).unwrap();
        assert_eq!(link.base, "http://10.0.0.2:7340");
    }

    #[test]
    fn test_link_parse_invalid() {
        assert!(JoinLink::parse_id("").is_err());
        assert!(JoinLink::parse_id("not-a-uuid").is_err());
        assert!(JoinLink::parse_id("https://tasbih.example/?join=").is_err());
        assert!(JoinLink::parse_id(&format!("https://tasbih.example/other/{}", ID)).is_err());
    }
}
