//! Effective settings: config file first, then flags and env vars.

use anyhow::Context;
use caucus_core::ViewerContext;
use caucus_session::{HttpResourceApi, SessionConfig};

use crate::cli::Cli;

pub struct Settings {
    pub session: SessionConfig,
    pub token: Option<String>,
}

impl Settings {
    pub fn resolve(cli: &Cli) -> anyhow::Result<Self> {
        let mut session = match &cli.config {
            Some(path) => SessionConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => SessionConfig::default(),
        };
        if let Some(url) = &cli.api_url {
            session.api_base_url = url.clone();
        }
        if let Some(url) = &cli.ws_url {
            session.ws_base_url = url.clone();
        }
        let token = cli.token.clone().filter(|t| !t.trim().is_empty());
        Ok(Self { session, token })
    }

    pub fn api(&self) -> HttpResourceApi {
        HttpResourceApi::new(self.session.api_base_url.clone()).with_token(self.token.clone())
    }

    pub fn is_admin(&self) -> bool {
        self.token.is_some()
    }

    /// Role context for view selection. Holding a token is what makes a
    /// viewer an administrator.
    pub fn viewer(&self, user: Option<&str>) -> ViewerContext {
        if self.is_admin() {
            ViewerContext::admin(user.unwrap_or("admin"))
        } else {
            ViewerContext {
                is_admin: false,
                username: user.map(str::to_owned),
            }
        }
    }
}
