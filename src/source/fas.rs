//! Blocking HTTP client for the FAS JSON API.
//!
//! FAS answers any page with JSON when asked for `tg_format=json`. Credentials
//! are posted with every request; the session cookie is kept by the client's
//! cookie store.

use std::time::Duration;

use reqwest::blocking::Client;
use url::Url;

use super::{SourceClient, TransportError};
use crate::config::SourceConfig;
use crate::error::{Error, Result};

/// Talks to one FAS instance.
pub struct FasClient {
    base: Url,
    username: Option<String>,
    password: Option<String>,
    http: Client,
}

impl FasClient {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let http = Client::builder()
            .cookie_store(true)
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("fas2ipa/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Source {
                source_name: config.name.clone(),
                resource: config.url.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            base: base_url(&config.url),
            username: config.username.clone(),
            password: config.password.clone(),
            http,
        })
    }

    fn endpoint(&self, resource: &str) -> std::result::Result<Url, TransportError> {
        let mut url = self
            .base
            .join(resource.trim_start_matches('/'))
            .map_err(|e| TransportError::Response(e.to_string()))?;
        url.query_pairs_mut().append_pair("tg_format", "json");
        Ok(url)
    }
}

/// Make sure relative resources resolve below the base path.
fn base_url(url: &Url) -> Url {
    let mut base = url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_connect() || err.is_timeout() {
        TransportError::Connection(err.to_string())
    } else {
        TransportError::Response(err.to_string())
    }
}

impl SourceClient for FasClient {
    fn fetch(
        &self,
        resource: &str,
        params: &[(&str, &str)],
    ) -> std::result::Result<serde_json::Value, TransportError> {
        let url = self.endpoint(resource)?;

        let mut form: Vec<(&str, &str)> = params.to_vec();
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            form.push(("user_name", username.as_str()));
            form.push(("password", password.as_str()));
            form.push(("login", "Login"));
        }

        let response = self.http.post(url).form(&form).send().map_err(classify)?;
        let status = response.status();
        if status.is_server_error() {
            return Err(TransportError::Connection(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(TransportError::Response(format!("HTTP {}", status)));
        }

        let body: serde_json::Value = response.json().map_err(classify)?;
        if let Some(exc) = body.get("exc") {
            let flash = body
                .get("tg_flash")
                .and_then(|f| f.as_str())
                .unwrap_or_default();
            return Err(TransportError::Response(format!("{} {}", exc, flash).trim().to_string()));
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn client(url: &str) -> FasClient {
        let config =
            Config::from_toml_str(&format!("[fas.fedora]\nurl = \"{}\"\nusername = \"admin\"\n", url))
                .unwrap();
        FasClient::new(&config.sources[0]).unwrap()
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = client("https://admin.fedoraproject.test/accounts");
        let url = client.endpoint("/user/list").unwrap();
        assert_eq!(
            url.as_str(),
            "https://admin.fedoraproject.test/accounts/user/list?tg_format=json"
        );
    }

    #[test]
    fn test_endpoint_with_trailing_slash() {
        let client = client("https://fas.test/accounts/");
        let url = client.endpoint("group/list").unwrap();
        assert_eq!(url.path(), "/accounts/group/list");
    }

    #[test]
    fn test_unreachable_host_is_connection_error() {
        let client = client("http://127.0.0.1:9/accounts");
        let err = client.fetch("user/list", &[("search", "a*")]).unwrap_err();
        assert!(matches!(err, TransportError::Connection(_)));
    }
}
