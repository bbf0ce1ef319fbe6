//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes in registration order
//! - Look up the route with the longest matching prefix
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) prefix scan (acceptable for typical route counts)
//! - Explicit NoMatch rather than silent default

use std::sync::Arc;

use crate::config::{ConfigError, ProxyConfig, RouteConfig};
use crate::headers::{HeaderInjector, SecretStore};
use crate::load_balancer::BackendGroup;
use crate::routing::matcher::PathPrefixMatcher;
use crate::routing::rewrite::PathRewrite;

/// A compiled route.
#[derive(Debug)]
pub struct Route {
    pub name: String,
    pub matcher: PathPrefixMatcher,
    pub rewrite: Option<PathRewrite>,
    pub injector: Arc<HeaderInjector>,
    pub backends: Arc<BackendGroup>,
    /// MCP session tracking enabled.
    pub mcp: bool,
}

/// Result of a successful lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<Route>,
    /// Request path after prefix rewriting (query string excluded).
    pub path: String,
}

/// Immutable table of routes.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self {
            routes: routes.into_iter().map(Arc::new).collect(),
        }
    }

    /// Compile routes, backend groups and header injectors from configuration.
    pub fn compile(config: &ProxyConfig) -> Result<Self, ConfigError> {
        let groups = BackendGroup::from_configs(&config.backends)?;
        let secrets = SecretStore::from_config(&config.secrets);

        let mut routes = Vec::with_capacity(config.routes.len());
        for route in &config.routes {
            let backends = groups.get(&route.backend_group).cloned().ok_or_else(|| {
                ConfigError::Backend {
                    name: route.backend_group.clone(),
                    reason: format!("group referenced by route {:?} has no backends", route.name),
                }
            })?;
            routes.push(Route::compile(route, backends, &secrets)?);
        }

        Ok(Self::new(routes))
    }

    /// Find the route for `path`, rewriting its prefix.
    pub fn match_path(&self, path: &str) -> Option<RouteMatch> {
        let mut best: Option<(&Arc<Route>, &str)> = None;
        for route in &self.routes {
            let Some(remainder) = route.matcher.remainder(path) else {
                continue;
            };
            // Strictly longer only: the earlier route keeps ties
            let better = match best {
                Some((current, _)) => {
                    route.matcher.specificity() > current.matcher.specificity()
                }
                None => true,
            };
            if better {
                best = Some((route, remainder));
            }
        }

        best.map(|(route, remainder)| RouteMatch {
            route: route.clone(),
            path: match &route.rewrite {
                Some(rewrite) => rewrite.apply(remainder),
                None => path.to_string(),
            },
        })
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Route {
    pub fn compile(
        config: &RouteConfig,
        backends: Arc<BackendGroup>,
        secrets: &SecretStore,
    ) -> Result<Self, ConfigError> {
        let injector =
            HeaderInjector::compile(&config.headers, secrets).map_err(|source| {
                ConfigError::Headers {
                    route: config.name.clone(),
                    source,
                }
            })?;

        Ok(Self {
            name: config.name.clone(),
            matcher: PathPrefixMatcher::new(config.path_prefix.clone()),
            rewrite: config.rewrite.clone().map(PathRewrite::new),
            injector: Arc::new(injector),
            backends,
            mcp: config.mcp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::BackendRef;

    fn route(name: &str, prefix: &str, rewrite: Option<&str>) -> Route {
        Route {
            name: name.into(),
            matcher: PathPrefixMatcher::new(prefix),
            rewrite: rewrite.map(PathRewrite::new),
            injector: Arc::new(HeaderInjector::default()),
            backends: Arc::new(BackendGroup::new(
                name,
                vec![Arc::new(BackendRef::plain(name, "127.0.0.1", 8000))],
            )),
            mcp: false,
        }
    }

    #[test]
    fn longest_prefix_wins_regardless_of_order() {
        let table = RouteTable::new(vec![
            route("root", "/", None),
            route("api", "/api", None),
            route("api-v2", "/api/v2", None),
        ]);

        assert_eq!(table.match_path("/api/v2/x").unwrap().route.name, "api-v2");
        assert_eq!(table.match_path("/api/v1").unwrap().route.name, "api");
        assert_eq!(table.match_path("/other").unwrap().route.name, "root");
    }

    #[test]
    fn equal_prefixes_resolve_to_first_registered() {
        let table = RouteTable::new(vec![
            route("first", "/mcp", None),
            route("second", "/mcp/", None),
        ]);
        assert_eq!(table.match_path("/mcp/tools").unwrap().route.name, "first");
    }

    #[test]
    fn no_match_is_explicit() {
        let table = RouteTable::new(vec![route("mcp", "/mcp-github", None)]);
        assert!(table.match_path("/unknown").is_none());
        assert!(table.match_path("/mcp-githubx").is_none());
    }

    #[test]
    fn rewrites_matched_prefix() {
        let table = RouteTable::new(vec![
            route("agent", "/github-agent", Some("/")),
            route("plain", "/keep", None),
        ]);
        assert_eq!(table.match_path("/github-agent/chat").unwrap().path, "/chat");
        assert_eq!(table.match_path("/github-agent").unwrap().path, "/");
        assert_eq!(table.match_path("/keep/x").unwrap().path, "/keep/x");
    }

    #[test]
    fn compiles_from_config() {
        let config = crate::config::parse_config(
            r#"
            [[backends]]
            name = "agent"
            group = "agent"
            url = "http://127.0.0.1:8000"

            [[routes]]
            name = "github-agent"
            path_prefix = "/github-agent"
            backend_group = "agent"
            rewrite = "/"

            [[routes.headers]]
            op = "set"
            name = "X-Gateway"
            value = "mcp-gateway"
            "#,
        )
        .unwrap();

        let table = RouteTable::compile(&config).unwrap();
        assert_eq!(table.len(), 1);
        let matched = table.match_path("/github-agent/chat").unwrap();
        assert_eq!(matched.route.injector.len(), 1);
        assert_eq!(matched.route.backends.backends().len(), 1);
    }

    #[test]
    fn missing_secret_fails_compilation() {
        let config = crate::config::parse_config(
            r#"
            [secrets.pat]
            env = "MCP_GATEWAY_TEST_UNSET_VARIABLE"

            [[backends]]
            name = "github"
            group = "github"
            url = "http://127.0.0.1:8000"

            [[routes]]
            name = "mcp-github"
            path_prefix = "/mcp-github"
            backend_group = "github"

            [[routes.headers]]
            op = "set"
            name = "Authorization"
            value = "Bearer ${secret:pat}"
            "#,
        )
        .unwrap();

        let err = RouteTable::compile(&config).unwrap_err();
        assert!(matches!(err, ConfigError::Headers { ref route, .. } if route == "mcp-github"));
    }
}
