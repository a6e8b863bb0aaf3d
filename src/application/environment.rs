//! Database alias resolution.
//!
//! Turns a database token (literal URL, `env` alias, or nothing) into the
//! store handles a push writes to.

use serde_json::Value;

use crate::domain::{AppError, EnvLookup, Result, StoreHandle};

/// Server root used when an alias has no `env` entry.
pub const DEFAULT_SERVER_URI: &str = "http://127.0.0.1:5984";

/// Schemes accepted verbatim as database URLs.
const URL_SCHEMES: &[&str] = &["http://", "https://", "desktopcouch://"];

/// Variables whose non-empty presence turns on proxy use.
const PROXY_VARS: &[&str] = &["http_proxy", "https_proxy"];

/// Whether `token` is already a database URL.
#[must_use]
pub fn is_url(token: &str) -> bool {
    URL_SCHEMES.iter().any(|scheme| token.starts_with(scheme))
}

/// Resolves tokens against the `env` table of a merged configuration.
pub struct EnvironmentResolver<'a> {
    env_table: Option<&'a Value>,
    vars: &'a dyn EnvLookup,
}

impl<'a> EnvironmentResolver<'a> {
    /// Create a resolver over an `env` table and a process environment.
    #[must_use]
    pub fn new(env_table: Option<&'a Value>, vars: &'a dyn EnvLookup) -> Self {
        Self { env_table, vars }
    }

    fn entry(&self, alias: &str) -> Option<&'a Value> {
        self.env_table.and_then(|table| table.get(alias))
    }

    /// Resolve `db_token` into one or more store handles.
    ///
    /// # Errors
    /// Returns a configuration error if no token is given and there is no
    /// `default` entry, or if an entry's `db` is not a URL or list of URLs.
    pub fn store_handles(&self, db_token: Option<&str>) -> Result<Vec<StoreHandle>> {
        let token = db_token.unwrap_or_default();

        let resolved = if is_url(token) {
            Value::String(token.to_string())
        } else if token.is_empty() {
            self.entry("default")
                .and_then(|entry| entry.get("db"))
                .cloned()
                .ok_or_else(|| AppError::config("database isn't specified"))?
        } else {
            self.entry(token)
                .and_then(|entry| entry.get("db"))
                .cloned()
                .unwrap_or_else(|| Value::String(format!("{DEFAULT_SERVER_URI}/{token}")))
        };

        let urls = match resolved {
            Value::String(url) => vec![url],
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(url) => Ok(url),
                    other => Err(AppError::config(format!(
                        "Database URL must be a string, got {other}"
                    ))),
                })
                .collect::<Result<Vec<_>>>()?,
            other => {
                return Err(AppError::config(format!(
                    "Database for '{token}' must be a URL or list of URLs, got {other}"
                )))
            }
        };

        let use_proxy = self.use_proxy();
        tracing::debug!(token, count = urls.len(), use_proxy, "Resolved databases");

        Ok(urls
            .into_iter()
            .map(|url| StoreHandle::new(url, use_proxy))
            .collect())
    }

    fn use_proxy(&self) -> bool {
        PROXY_VARS
            .iter()
            .any(|name| self.vars.var(name).is_some_and(|v| !v.is_empty()))
    }

    /// Friendly application name for `db_token`, falling back to `default`.
    ///
    /// An alias with an `env` entry yields that entry's `name`; any other
    /// non-URL token yields the `default` entry's `name`. Literal URLs never
    /// consult the table.
    #[must_use]
    pub fn app_name(&self, db_token: Option<&str>, default: Option<&str>) -> Option<String> {
        let token = db_token.unwrap_or_default();
        let fallback = || default.map(String::from);

        if is_url(token) {
            return fallback();
        }

        let entry = self.entry(token).or_else(|| self.entry("default"));
        match entry {
            Some(entry) => entry
                .get("name")
                .and_then(Value::as_str)
                .map(String::from)
                .or_else(fallback),
            None => fallback(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StaticEnv;
    use serde_json::json;

    fn urls(handles: &[StoreHandle]) -> Vec<&str> {
        handles.iter().map(|h| h.url.as_str()).collect()
    }

    #[test]
    fn test_empty_token_uses_default_entry() {
        let table = json!({"default": {"db": "http://x/d"}});
        let vars = StaticEnv::default();
        let resolver = EnvironmentResolver::new(Some(&table), &vars);

        assert_eq!(urls(&resolver.store_handles(None).unwrap()), vec!["http://x/d"]);
        assert_eq!(urls(&resolver.store_handles(Some("")).unwrap()), vec!["http://x/d"]);
    }

    #[test]
    fn test_empty_token_without_default_fails() {
        let table = json!({"prod": {"db": "http://prod/db"}});
        let vars = StaticEnv::default();
        let resolver = EnvironmentResolver::new(Some(&table), &vars);

        let err = resolver.store_handles(None).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("database isn't specified"));

        let resolver = EnvironmentResolver::new(None, &vars);
        assert!(resolver.store_handles(None).unwrap_err().is_config());
    }

    #[test]
    fn test_alias_synthesizes_default_server_url() {
        let table = json!({});
        let vars = StaticEnv::default();
        let resolver = EnvironmentResolver::new(Some(&table), &vars);

        assert_eq!(
            urls(&resolver.store_handles(Some("foo")).unwrap()),
            vec!["http://127.0.0.1:5984/foo"]
        );
    }

    #[test]
    fn test_alias_entry_overrides() {
        let table = json!({"foo": {"db": "http://y/z"}, "bar": {"name": "no db"}});
        let vars = StaticEnv::default();
        let resolver = EnvironmentResolver::new(Some(&table), &vars);

        assert_eq!(urls(&resolver.store_handles(Some("foo")).unwrap()), vec!["http://y/z"]);
        assert_eq!(
            urls(&resolver.store_handles(Some("bar")).unwrap()),
            vec!["http://127.0.0.1:5984/bar"]
        );
    }

    #[test]
    fn test_literal_url_passes_through() {
        let table = json!({"https://host/db": {"db": "http://other/db"}});
        let vars = StaticEnv::default();
        let resolver = EnvironmentResolver::new(Some(&table), &vars);

        for token in ["https://host/db", "http://host/db", "desktopcouch://blog"] {
            assert_eq!(urls(&resolver.store_handles(Some(token)).unwrap()), vec![token]);
        }
    }

    #[test]
    fn test_alias_fans_out() {
        let table = json!({"both": {"db": ["http://a/db", "http://b/db"]}, "bad": {"db": [1]}});
        let vars = StaticEnv::default();
        let resolver = EnvironmentResolver::new(Some(&table), &vars);

        assert_eq!(
            urls(&resolver.store_handles(Some("both")).unwrap()),
            vec!["http://a/db", "http://b/db"]
        );
        assert!(resolver.store_handles(Some("bad")).unwrap_err().is_config());
    }

    #[test]
    fn test_proxy_flag_applies_to_every_handle() {
        let table = json!({"both": {"db": ["http://a/db", "http://b/db"]}});

        let vars = StaticEnv::from_pairs([("https_proxy", "http://proxy:3128")]);
        let handles = EnvironmentResolver::new(Some(&table), &vars)
            .store_handles(Some("both"))
            .unwrap();
        assert!(handles.iter().all(|h| h.use_proxy));

        let vars = StaticEnv::from_pairs([("http_proxy", "")]);
        let handles = EnvironmentResolver::new(Some(&table), &vars)
            .store_handles(Some("both"))
            .unwrap();
        assert!(handles.iter().all(|h| !h.use_proxy));
    }

    #[test]
    fn test_app_name_lookup() {
        let table = json!({
            "default": {"db": "http://x/d", "name": "Default App"},
            "blog": {"db": "http://x/blog", "name": "Blog"},
            "bare": {"db": "http://x/bare"}
        });
        let vars = StaticEnv::default();
        let resolver = EnvironmentResolver::new(Some(&table), &vars);

        assert_eq!(resolver.app_name(Some("blog"), Some("fallback")).as_deref(), Some("Blog"));
        assert_eq!(
            resolver.app_name(Some("unknown"), Some("fallback")).as_deref(),
            Some("Default App")
        );
        assert_eq!(resolver.app_name(None, None).as_deref(), Some("Default App"));
        assert_eq!(resolver.app_name(Some("bare"), Some("fallback")).as_deref(), Some("fallback"));
        assert_eq!(
            resolver.app_name(Some("http://x/blog"), Some("fallback")).as_deref(),
            Some("fallback")
        );
    }

    #[test]
    fn test_app_name_without_table() {
        let vars = StaticEnv::default();
        let resolver = EnvironmentResolver::new(None, &vars);
        assert_eq!(resolver.app_name(Some("blog"), Some("fallback")).as_deref(), Some("fallback"));
        assert_eq!(resolver.app_name(Some("blog"), None), None);
    }
}
