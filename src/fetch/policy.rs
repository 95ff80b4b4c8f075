//! Which tier a URL's fetch starts at.
//!
//! The policy is an ordered table of domain rules consulted once per URL.
//! The first rule matching the hostname decides the starting tier; hosts no
//! rule matches start with the lightweight fetch.

use serde::{Deserialize, Serialize};

use crate::error::Tier;

/// Matches a hostname against a registered domain.
///
/// `reuters.com` matches `reuters.com` and any subdomain such as
/// `www.reuters.com`, but not `notreuters.com`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRule {
    pub domain: String,
    pub start: Tier,
}

impl DomainRule {
    pub fn matches(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.');
        host.eq_ignore_ascii_case(&self.domain)
            || (host.len() > self.domain.len()
                && host.to_ascii_lowercase().ends_with(&format!(".{}", self.domain)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchPolicy {
    rules: Vec<DomainRule>,
}

impl FetchPolicy {
    pub fn new(rules: Vec<DomainRule>) -> Self {
        Self { rules }
    }

    /// Policy sending every listed domain straight to the renderer.
    pub fn with_tricky_domains<S: AsRef<str>>(domains: &[S]) -> Self {
        Self::new(
            domains
                .iter()
                .map(|d| DomainRule {
                    domain: d.as_ref().trim().to_ascii_lowercase(),
                    start: Tier::Render,
                })
                .collect(),
        )
    }

    pub fn start_tier(&self, host: &str) -> Tier {
        self.rules
            .iter()
            .find(|rule| rule.matches(host))
            .map(|rule| rule.start)
            .unwrap_or(Tier::Light)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tricky_domains_and_subdomains_start_at_render() {
        let policy = FetchPolicy::with_tricky_domains(&["reuters.com", "nytimes.com"]);
        assert_eq!(policy.start_tier("reuters.com"), Tier::Render);
        assert_eq!(policy.start_tier("www.reuters.com"), Tier::Render);
        assert_eq!(policy.start_tier("WWW.NYTIMES.COM"), Tier::Render);
    }

    #[test]
    fn test_other_hosts_start_light() {
        let policy = FetchPolicy::with_tricky_domains(&["reuters.com"]);
        assert_eq!(policy.start_tier("notreuters.com"), Tier::Light);
        assert_eq!(policy.start_tier("reuters.com.evil.net"), Tier::Light);
        assert_eq!(policy.start_tier("apnews.com"), Tier::Light);
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let policy = FetchPolicy::new(vec![
            DomainRule { domain: "blog.example.com".into(), start: Tier::Light },
            DomainRule { domain: "example.com".into(), start: Tier::Render },
        ]);
        assert_eq!(policy.start_tier("blog.example.com"), Tier::Light);
        assert_eq!(policy.start_tier("www.example.com"), Tier::Render);
    }
}
