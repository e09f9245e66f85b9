use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Parser;

use crate::{
    profile::{DEFAULT_PROFILE, Matcher, RouteRule},
    state::StoreConfig,
};

#[derive(Debug, Clone, Parser)]
#[command(name = "netpane", about = "Terminal network log for devtools traffic")]
pub struct Config {
    /// Address the ingest endpoint listens on.
    #[arg(
        long = "bind",
        alias = "bind-addr",
        env = "NETPANE_BIND",
        value_name = "ADDR",
        default_value = "127.0.0.1:23518",
        help = "Bind address for incoming capture events"
    )]
    pub bind_addr: SocketAddr,

    #[arg(
        long = "pending-delay-ms",
        env = "NETPANE_PENDING_DELAY_MS",
        value_name = "MS",
        default_value_t = 100,
        help = "How long an in-flight request stays hidden before it is shown"
    )]
    pub pending_delay_ms: u64,

    #[arg(
        long = "cached-flush-ms",
        env = "NETPANE_CACHED_FLUSH_MS",
        value_name = "MS",
        default_value_t = 300,
        help = "Quiet period before a burst of cached responses is applied"
    )]
    pub cached_flush_ms: u64,

    #[arg(
        long = "profile",
        env = "NETPANE_PROFILE",
        value_name = "NAME",
        default_value = DEFAULT_PROFILE,
        help = "Profile used for requests no route matches (default, jsonRpc, graphql)"
    )]
    pub profile: String,

    /// Regex routes checked in order before the fallback profile.
    #[arg(
        long = "route",
        value_name = "PATTERN=PROFILE",
        help = "Use PROFILE for request URLs matching PATTERN (repeatable)"
    )]
    pub routes: Vec<RouteRule>,

    #[arg(
        long = "import",
        value_name = "FILE",
        help = "Load a HAR file on startup and show it as a static list"
    )]
    pub import: Option<PathBuf>,

    #[arg(
        long = "export",
        value_name = "FILE",
        help = "Write the current list as HAR to FILE on exit"
    )]
    pub export: Option<PathBuf>,

    /// Optional file path to dump store events for debugging.
    #[arg(
        long = "event-dump",
        env = "NETPANE_EVENT_DUMP",
        value_name = "FILE",
        help = "Append each store event to FILE as JSON lines"
    )]
    pub event_dump: Option<PathBuf>,
}

impl Config {
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            pending_delay: Duration::from_millis(self.pending_delay_ms),
            cached_flush_delay: Duration::from_millis(self.cached_flush_ms),
        }
    }

    pub fn matcher(&self) -> Matcher {
        Matcher::constant(self.profile.clone()).with_rules(self.routes.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_store_constants() {
        let config = Config::try_parse_from(["netpane"]).expect("parses");

        assert_eq!(config.bind_addr.port(), 23518);
        assert_eq!(config.profile, DEFAULT_PROFILE);
        assert!(config.routes.is_empty());

        let store = config.store_config();
        let defaults = StoreConfig::default();
        assert_eq!(store.pending_delay, defaults.pending_delay);
        assert_eq!(store.cached_flush_delay, defaults.cached_flush_delay);
    }

    #[test]
    fn routes_feed_the_matcher_in_order() {
        let config = Config::try_parse_from([
            "netpane",
            "--profile",
            "graphql",
            "--route",
            "rpc\\.example=jsonRpc",
            "--route",
            "/api/=default",
        ])
        .expect("parses");

        let matcher = config.matcher();
        assert_eq!(matcher.profile_for("https://rpc.example/api/"), "jsonRpc");
        assert_eq!(matcher.profile_for("https://x.dev/api/users"), "default");
        assert_eq!(matcher.profile_for("https://x.dev/gql"), "graphql");
    }

    #[test]
    fn malformed_route_is_rejected() {
        assert!(Config::try_parse_from(["netpane", "--route", "no-separator"]).is_err());
        assert!(Config::try_parse_from(["netpane", "--route", "([=default"]).is_err());
    }

    #[test]
    fn delays_are_configurable() {
        let config = Config::try_parse_from([
            "netpane",
            "--pending-delay-ms",
            "250",
            "--cached-flush-ms",
            "0",
        ])
        .expect("parses");

        let store = config.store_config();
        assert_eq!(store.pending_delay, Duration::from_millis(250));
        assert_eq!(store.cached_flush_delay, Duration::ZERO);
    }
}
