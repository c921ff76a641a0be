//! Blocking HTTP session against the game server.

use reqwest::blocking::{Client, ClientBuilder, Response};
use url::Url;

use crate::config::BotConfig;
use crate::gateway::{
    self, AuthError, GatewayError, RemoteGateway, LOGIN_PATH, LOGOUT_PATH, OVERVIEW_PATH,
};
use crate::markup;
use crate::village::{Locator, VillageRef};

/// Cookie-carrying client bound to one server and one logged-in account.
pub struct HttpGateway {
    client: Client,
    base: Url,
    closed: bool,
}

impl HttpGateway {
    /// Open a session and log in with the configured credentials.
    pub fn authenticate(config: &BotConfig) -> Result<Self, AuthError> {
        Self::login(config, client_builder(config))
    }

    fn login(config: &BotConfig, builder: ClientBuilder) -> Result<Self, AuthError> {
        let base = config.base_url()?;
        let client = builder.build().map_err(|source| GatewayError::Request {
            url: base.to_string(),
            source,
        })?;
        let gateway = Self {
            client,
            base,
            closed: false,
        };

        let login_url = gateway.url(LOGIN_PATH)?;
        let login_page = gateway.get_url(&login_url)?;
        let form = markup::parse_login_form(&login_page)?
            .with_credentials(&config.username, &config.password);
        let target = match form.action.as_deref() {
            Some(action) if !action.trim().is_empty() => {
                login_url.join(action).map_err(|source| GatewayError::InvalidUrl {
                    path: action.to_string(),
                    source,
                })?
            }
            _ => login_url.clone(),
        };

        let landing = gateway.post_form(&target, &form.fields)?;
        if markup::has_password_prompt(&landing)? {
            return Err(AuthError::Rejected {
                username: config.username.clone(),
            });
        }
        tracing::info!(
            target: "village_bot::http",
            server = %gateway.base,
            username = %config.username,
            "login.completed"
        );
        Ok(gateway)
    }

    fn url(&self, path: &str) -> Result<Url, GatewayError> {
        self.base
            .join(path)
            .map_err(|source| GatewayError::InvalidUrl {
                path: path.to_string(),
                source,
            })
    }

    fn get(&self, path: &str) -> Result<String, GatewayError> {
        let url = self.url(path)?;
        self.get_url(&url)
    }

    fn get_url(&self, url: &Url) -> Result<String, GatewayError> {
        if self.closed {
            return Err(GatewayError::Closed);
        }
        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|source| GatewayError::Request {
                url: url.to_string(),
                source,
            })?;
        read_body(url, response)
    }

    fn post_form(&self, url: &Url, fields: &[(String, String)]) -> Result<String, GatewayError> {
        if self.closed {
            return Err(GatewayError::Closed);
        }
        let response = self
            .client
            .post(url.clone())
            .form(fields)
            .send()
            .map_err(|source| GatewayError::Request {
                url: url.to_string(),
                source,
            })?;
        read_body(url, response)
    }
}

fn client_builder(config: &BotConfig) -> ClientBuilder {
    Client::builder()
        .cookie_store(true)
        .user_agent(config.user_agent.as_str())
        .timeout(config.request_timeout())
}

fn read_body(url: &Url, response: Response) -> Result<String, GatewayError> {
    let status = response.status();
    tracing::debug!(
        target: "village_bot::http",
        %url,
        status = status.as_u16(),
        "http.response"
    );
    if !status.is_success() {
        return Err(GatewayError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    response.text().map_err(|source| GatewayError::Request {
        url: url.to_string(),
        source,
    })
}

impl RemoteGateway for HttpGateway {
    fn list_villages(&mut self) -> Result<Vec<VillageRef>, GatewayError> {
        let page = self.get(OVERVIEW_PATH)?;
        markup::parse_village_list(&page).map_err(|source| GatewayError::Page {
            url: OVERVIEW_PATH.to_string(),
            source,
        })
    }

    fn fetch_overview(&mut self, locator: &Locator) -> Result<String, GatewayError> {
        self.get(&gateway::overview_path(locator))
    }

    fn fetch_defense(&mut self, locator: &Locator) -> Result<String, GatewayError> {
        self.get(&gateway::rally_point_path(locator))
    }

    fn fetch_slot(&mut self, locator: &Locator, slot: u32) -> Result<String, GatewayError> {
        self.get(&gateway::slot_path(locator, slot))
    }

    fn issue_build(&mut self, action_url: &str) -> Result<(), GatewayError> {
        self.get(action_url).map(|_| ())
    }

    fn teardown(&mut self) -> Result<(), GatewayError> {
        if self.closed {
            return Ok(());
        }
        let result = self.get(LOGOUT_PATH).map(|_| ());
        self.closed = true;
        result
    }
}
