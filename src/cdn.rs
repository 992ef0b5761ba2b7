//! CDN rendezvous configurations and the ordered fallback set.
//!
//! Each entry pairs a broker URL with its matching front domains. If the
//! broker on one CDN becomes unreachable (e.g. blocked by censors), the
//! transport manager rotates to the next entry in the set.

/// One rendezvous endpoint. A non-empty `amp_cache_url` selects AMP cache
/// rendezvous instead of plain domain fronting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdnConfig {
    pub broker_url: String,
    pub front_domains: Vec<String>,
    pub amp_cache_url: String,
}

impl CdnConfig {
    fn new(broker_url: &str, front_domains: &[&str], amp_cache_url: &str) -> Self {
        CdnConfig {
            broker_url: broker_url.to_string(),
            front_domains: front_domains.iter().map(|d| d.to_string()).collect(),
            amp_cache_url: amp_cache_url.to_string(),
        }
    }
}

/// Built-in fallback CDNs, ordered by preference. These match the latest
/// Tor Browser defaults.
pub fn builtin_cdns() -> Vec<CdnConfig> {
    vec![
        CdnConfig::new("https://1098762253.rsc.cdn77.org/", &["www.cdn77.com"], ""),
        // AMP cache rendezvous routes broker requests through Google's AMP
        // CDN, which is very hard to block without blocking all of Google.
        CdnConfig::new(
            "https://snowflake-broker.torproject.net/",
            &["www.google.com"],
            "https://cdn.ampproject.org/",
        ),
        CdnConfig::new(
            "https://snowflake-broker.torproject.net.global.prod.fastly.net/",
            &["www.shazam.com", "www.cosmopolitan.com", "www.esquire.com"],
            "",
        ),
        CdnConfig::new(
            "https://snowflake-broker.azureedge.net/",
            &["ajax.aspnetcdn.com"],
            "",
        ),
    ]
}

/// Diverse STUN servers, avoiding Google. Includes port 443 and 10000
/// variants which are harder to block than 3478.
pub const DEFAULT_STUN_URLS: &str = "stun:stun.antisip.com:3478,\
    stun:stun.epygi.com:3478,\
    stun:stun.uls.co.za:3478,\
    stun:stun.voipgate.com:3478,\
    stun:stun.mixvoip.com:3478,\
    stun:stun.nextcloud.com:3478,\
    stun:stun.bethesda.net:3478,\
    stun:stun.nextcloud.com:443,\
    stun:stun.sipgate.net:3478,\
    stun:stun.sipgate.net:10000,\
    stun:stun.sonetel.com:3478,\
    stun:stun.voipia.net:3478,\
    stun:stun.ucsb.edu:3478,\
    stun:stun.schlund.de:3478";

pub const DEFAULT_UTLS_CLIENT_ID: &str = "hellorandomizedalpn";

/// Splits a comma-separated string into trimmed non-empty tokens, keeping
/// order and duplicates. Empty input yields an empty list.
pub fn split_trimmed(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Builds the ordered CDN set: the primary (if both broker URL and front
/// domains were supplied) followed by every builtin whose broker + AMP cache
/// pair differs from it. The result is never empty.
pub fn build_cdn_configs(broker_url: &str, front_domains: &str, amp_cache_url: &str) -> Vec<CdnConfig> {
    let mut configs = Vec::new();
    if !broker_url.is_empty() && !front_domains.is_empty() {
        configs.push(CdnConfig {
            broker_url: broker_url.to_string(),
            front_domains: split_trimmed(front_domains),
            amp_cache_url: amp_cache_url.to_string(),
        });
    }
    for fb in builtin_cdns() {
        if fb.broker_url == broker_url && fb.amp_cache_url == amp_cache_url {
            continue;
        }
        configs.push(fb);
    }
    if configs.is_empty() {
        configs = builtin_cdns();
    }
    configs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_trimmed_basic() {
        assert_eq!(
            split_trimmed("a, b ,c"),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn split_trimmed_empty_input() {
        assert!(split_trimmed("").is_empty());
        assert!(split_trimmed(" , ,, ").is_empty());
    }

    #[test]
    fn split_trimmed_keeps_order_and_duplicates() {
        assert_eq!(
            split_trimmed("x,y,x"),
            vec!["x".to_string(), "y".to_string(), "x".to_string()]
        );
    }

    #[test]
    fn primary_comes_first() {
        let configs = build_cdn_configs("https://broker.example/", "front.example", "");
        assert_eq!(configs[0].broker_url, "https://broker.example/");
        assert_eq!(configs[0].front_domains, vec!["front.example".to_string()]);
        assert_eq!(configs.len(), builtin_cdns().len() + 1);
    }

    #[test]
    fn primary_matching_builtin_is_deduplicated() {
        let builtins = builtin_cdns();
        let first = &builtins[0];
        let configs = build_cdn_configs(&first.broker_url, "some.front", &first.amp_cache_url);
        assert_eq!(configs.len(), builtins.len());
        assert_eq!(configs[0].front_domains, vec!["some.front".to_string()]);
        for later in &configs[1..] {
            assert!(
                later.broker_url != configs[0].broker_url
                    || later.amp_cache_url != configs[0].amp_cache_url
            );
        }
    }

    #[test]
    fn no_primary_yields_builtins() {
        let configs = build_cdn_configs("", "", "");
        assert_eq!(configs, builtin_cdns());
        assert!(!configs.is_empty());
    }

    #[test]
    fn broker_without_fronts_is_ignored() {
        let configs = build_cdn_configs("https://broker.example/", "", "");
        assert_eq!(configs, builtin_cdns());
    }
}
