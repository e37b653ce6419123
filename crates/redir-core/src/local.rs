//! Default loopback rules
//!
//! The local gateway should always be reached as `localhost` (subdomain
//! gateways only work there) and the RPC API as `127.0.0.1`. These rules are
//! regenerated from the current endpoints every time configuration changes.

use crate::escape::{escape, normalize};
use crate::types::{RedirectPair, RegexRule};
use crate::url::{extract_scheme, port_or_default};

/// Path, query and fragment after the port, or nothing.
const LOCAL_REGEX_ENDING: &str = "((?:[\\/\\?#]|$).*)$";

/// Gateway and API endpoints the default rules are bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalEndpoints<'a> {
    pub gateway_url: &'a str,
    pub api_url: &'a str,
}

/// Which endpoint a default rule targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalService {
    Gateway,
    Api,
}

/// One entry of the fixed loopback table.
#[derive(Debug, Clone, Copy)]
pub struct DefaultLocalRule {
    pub from_host: &'static str,
    pub to_host: &'static str,
    pub service: LocalService,
}

pub const DEFAULT_LOCAL_RULES: [DefaultLocalRule; 3] = [
    DefaultLocalRule {
        from_host: "127.0.0.1",
        to_host: "localhost",
        service: LocalService::Gateway,
    },
    DefaultLocalRule {
        from_host: "[::1]",
        to_host: "localhost",
        service: LocalService::Gateway,
    },
    DefaultLocalRule {
        from_host: "localhost",
        to_host: "127.0.0.1",
        service: LocalService::Api,
    },
];

/// A default rule resolved against concrete endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRule {
    pub pair: RedirectPair,
    pub rule: RegexRule,
}

impl DefaultLocalRule {
    /// Resolve against `endpoints`. `None` if the endpoint URL has no port.
    pub fn resolve(&self, endpoints: &LocalEndpoints<'_>) -> Option<LocalRule> {
        let url = match self.service {
            LocalService::Gateway => endpoints.gateway_url,
            LocalService::Api => endpoints.api_url,
        };
        let scheme = extract_scheme(url).unwrap_or("http");
        let port = port_or_default(url)?;

        let origin = format!("{}://{}:{}", scheme, self.from_host, port);
        let redirect = format!("{}://{}:{}", scheme, self.to_host, port);
        let rule = RegexRule::new(
            format!("^{}{}", normalize(&escape(&origin)), LOCAL_REGEX_ENDING),
            format!("{}\\1", redirect),
        );

        Some(LocalRule {
            pair: RedirectPair::new(origin, redirect),
            rule,
        })
    }
}

/// Resolve the whole table.
///
/// When gateway and API share a port the API entry is dropped: together with
/// the gateway entries it would bounce `localhost` and `127.0.0.1` forever.
pub fn default_local_rules(endpoints: &LocalEndpoints<'_>) -> Vec<LocalRule> {
    let shared_port = port_or_default(endpoints.gateway_url).is_some()
        && port_or_default(endpoints.gateway_url) == port_or_default(endpoints.api_url);
    if shared_port {
        log::warn!(
            "gateway {} and API {} share a port, skipping localhost -> 127.0.0.1 rule",
            endpoints.gateway_url,
            endpoints.api_url
        );
    }

    DEFAULT_LOCAL_RULES
        .iter()
        .filter(|entry| !(shared_port && entry.service == LocalService::Api))
        .filter_map(|entry| {
            let resolved = entry.resolve(endpoints);
            if resolved.is_none() {
                log::warn!("no port for {:?} endpoint, skipping default rule", entry.service);
            }
            resolved
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENDPOINTS: LocalEndpoints<'static> = LocalEndpoints {
        gateway_url: "http://localhost:8080",
        api_url: "http://127.0.0.1:5001",
    };

    #[test]
    fn resolves_three_rules() {
        let rules = default_local_rules(&ENDPOINTS);
        let pairs: Vec<(&str, &str)> = rules
            .iter()
            .map(|r| (r.pair.origin_url.as_str(), r.pair.redirect_url.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("http://127.0.0.1:8080", "http://localhost:8080"),
                ("http://[::1]:8080", "http://localhost:8080"),
                ("http://localhost:5001", "http://127.0.0.1:5001"),
            ]
        );
    }

    #[test]
    fn rules_rewrite_loopback_urls() {
        let rules = default_local_rules(&ENDPOINTS);
        assert_eq!(
            rules[0].rule.apply("http://127.0.0.1:8080/ipfs/bafy?x=1").unwrap().as_deref(),
            Some("http://localhost:8080/ipfs/bafy?x=1")
        );
        assert_eq!(
            rules[1].rule.apply("http://[::1]:8080/").unwrap().as_deref(),
            Some("http://localhost:8080/")
        );
        assert_eq!(
            rules[2].rule.apply("http://localhost:5001/webui").unwrap().as_deref(),
            Some("http://127.0.0.1:5001/webui")
        );
        assert_eq!(rules[0].rule.apply("http://127.0.0.1:80801/").unwrap(), None);
        assert_eq!(rules[2].rule.apply("http://localhost:8080/ipfs/x").unwrap(), None);
    }

    #[test]
    fn follows_configured_ports() {
        let rules = default_local_rules(&LocalEndpoints {
            gateway_url: "http://localhost:48080/",
            api_url: "http://127.0.0.1:45001/",
        });
        assert!(rules[0].rule.pattern.contains("\\:48080"));
        assert!(rules[2].rule.pattern.contains("\\:45001"));
    }

    #[test]
    fn drops_api_rule_on_shared_port() {
        let rules = default_local_rules(&LocalEndpoints {
            gateway_url: "http://localhost:8080",
            api_url: "http://127.0.0.1:8080",
        });
        assert_eq!(rules.len(), 2);
        assert!(rules.iter().all(|r| r.pair.redirect_url.contains("localhost")));
    }

    #[test]
    fn default_ports_from_scheme() {
        let rules = default_local_rules(&LocalEndpoints {
            gateway_url: "http://localhost",
            api_url: "https://127.0.0.1",
        });
        assert_eq!(rules[0].pair.origin_url, "http://127.0.0.1:80");
        assert_eq!(rules[2].pair.origin_url, "https://localhost:443");
    }
}
