//! Boundary to the remote game server.
//!
//! [`RemoteGateway`] is the seam between the scheduling core and the HTTP
//! transport. The core only ever sees raw page markup and never builds
//! request URLs itself.

use thiserror::Error;

use crate::config::ConfigError;
use crate::markup::ParseError;
use crate::village::{Locator, VillageRef};

pub const LOGIN_PATH: &str = "login.php";
pub const LOGOUT_PATH: &str = "logout.php";
pub const OVERVIEW_PATH: &str = "dorf1.php";
pub const RALLY_POINT_PATH: &str = "build.php?tt=1&id=39";
pub const SLOT_PATH: &str = "build.php?id=";

pub fn overview_path(locator: &Locator) -> String {
    format!("{OVERVIEW_PATH}?{}", locator.query())
}

pub fn rally_point_path(locator: &Locator) -> String {
    format!("{RALLY_POINT_PATH}&{}", locator.query())
}

pub fn slot_path(locator: &Locator, slot: u32) -> String {
    format!("{SLOT_PATH}{slot}&{}", locator.query())
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid url '{path}': {source}")]
    InvalidUrl {
        path: String,
        #[source]
        source: url::ParseError,
    },
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("unexpected page at {url}: {source}")]
    Page {
        url: String,
        #[source]
        source: ParseError,
    },
    #[error("session is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not reach login page: {0}")]
    Gateway(#[from] GatewayError),
    #[error("login page unreadable: {0}")]
    LoginPage(#[from] ParseError),
    #[error("server rejected credentials for '{username}'")]
    Rejected { username: String },
}

/// Operations the bot needs from an authenticated session.
pub trait RemoteGateway {
    fn list_villages(&mut self) -> Result<Vec<VillageRef>, GatewayError>;

    fn fetch_overview(&mut self, locator: &Locator) -> Result<String, GatewayError>;

    fn fetch_defense(&mut self, locator: &Locator) -> Result<String, GatewayError>;

    /// Detail page of one construction slot, carrying its level and upgrade button.
    fn fetch_slot(&mut self, locator: &Locator, slot: u32) -> Result<String, GatewayError>;

    fn issue_build(&mut self, action_url: &str) -> Result<(), GatewayError>;

    fn teardown(&mut self) -> Result<(), GatewayError>;
}

/// Owns an authenticated gateway and guarantees it is torn down once.
///
/// [`Session::close`] is the orderly path; dropping an open session tears it
/// down as well, logging rather than returning any failure.
pub struct Session<G: RemoteGateway> {
    gateway: G,
    open: bool,
}

impl<G: RemoteGateway> Session<G> {
    pub fn new(gateway: G) -> Self {
        Self {
            gateway,
            open: true,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    pub fn close(mut self) -> Result<(), GatewayError> {
        self.open = false;
        let result = self.gateway.teardown();
        match &result {
            Ok(()) => tracing::info!(target: "village_bot::session", "session.closed"),
            Err(err) => tracing::warn!(
                target: "village_bot::session",
                error = %err,
                "session.close_failed"
            ),
        }
        result
    }
}

impl<G: RemoteGateway> Drop for Session<G> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        match self.gateway.teardown() {
            Ok(()) => tracing::info!(target: "village_bot::session", "session.closed=drop"),
            Err(err) => tracing::warn!(
                target: "village_bot::session",
                error = %err,
                "session.close_failed=drop"
            ),
        }
    }
}
