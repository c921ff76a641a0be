#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Once;

use crossbeam_channel::Sender;

use bot_core::markup::parse_village_list;
use bot_core::{
    Alert, BotConfig, DeliveryError, GatewayError, Locator, Notifier, RemoteGateway, SmtpNotifier,
    VillageRef,
};

static INIT: Once = Once::new();

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn fixture(name: &str) -> String {
    let path = fixture_path(name);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|err| panic!("missing fixture {}: {err}", path.display()))
}

/// Points the config lookup at the fixture config, once per test binary.
pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = fixture_path("test_bot_config.json");

        debug_assert!(
            config_path.exists(),
            "missing test bot config at {}",
            config_path.display()
        );

        std::env::set_var("VILLAGE_BOT_CONFIG_PATH", &config_path);
    });
}

pub fn test_config(max_cycles: Option<u64>) -> BotConfig {
    let mut config = BotConfig::from_json_str(
        r#"{
            "server_url": "https://ts1.example.invalid",
            "username": "chief",
            "password": "secret",
            "poll_interval_seconds": 1
        }"#,
    )
    .expect("test config parses");
    config.max_cycles = max_cycles;
    config
}

/// Upgrade control shown on a slot page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotButton {
    Upgrade,
    Premium,
    Missing,
}

#[derive(Clone, Debug)]
pub struct SlotState {
    pub level: u32,
    pub button: SlotButton,
}

#[derive(Clone, Debug, Default)]
pub struct VillageState {
    pub work_remaining: Option<u64>,
    pub incoming_raids: u32,
    pub incoming_supply: u32,
    pub slots: BTreeMap<u32, SlotState>,
    pub fail_overview: bool,
    pub fail_defense: bool,
}

/// Everything the fake server knows and everything it was asked.
#[derive(Debug, Default)]
pub struct ServerState {
    pub village_list: String,
    pub fail_listing: bool,
    pub villages: HashMap<String, VillageState>,
    pub requests: Vec<String>,
    pub issued: Vec<String>,
    pub teardowns: u32,
    actions: HashMap<String, (String, u32)>,
    interrupt: Option<(String, Sender<()>)>,
}

impl ServerState {
    fn record(&mut self, request: String) {
        if let Some((trigger, signal)) = &self.interrupt {
            if *trigger == request {
                let _ = signal.try_send(());
            }
        }
        self.requests.push(request);
    }
}

/// In-memory stand-in for the game server. Clones share state, so a test can
/// keep one handle while the scheduler owns another.
#[derive(Clone, Debug, Default)]
pub struct FakeServer {
    state: Rc<RefCell<ServerState>>,
}

impl FakeServer {
    /// Three idle, quiet villages as listed in the village list fixture.
    pub fn three_villages() -> Self {
        let server = Self::default();
        {
            let mut state = server.state.borrow_mut();
            state.village_list = fixture("village_list.html");
            for name in ["Village1", "Village2", "Village3"] {
                state
                    .villages
                    .insert(name.to_string(), VillageState::default());
            }
        }
        server
    }

    pub fn state(&self) -> std::cell::Ref<'_, ServerState> {
        self.state.borrow()
    }

    pub fn with_village(&self, name: &str, edit: impl FnOnce(&mut VillageState)) {
        let mut state = self.state.borrow_mut();
        let village = state.villages.entry(name.to_string()).or_default();
        edit(village);
    }

    pub fn set_slot(&self, village: &str, slot: u32, level: u32, button: SlotButton) {
        self.with_village(village, |state| {
            state.slots.insert(slot, SlotState { level, button });
        });
    }

    /// Deliver a shutdown signal the moment `request` is served.
    pub fn interrupt_on(&self, request: &str, signal: Sender<()>) {
        self.state.borrow_mut().interrupt = Some((request.to_string(), signal));
    }

    pub fn fail_listing(&self) {
        self.state.borrow_mut().fail_listing = true;
    }

    pub fn issued(&self) -> Vec<String> {
        self.state.borrow().issued.clone()
    }

    pub fn teardowns(&self) -> u32 {
        self.state.borrow().teardowns
    }

    pub fn requests(&self) -> Vec<String> {
        self.state.borrow().requests.clone()
    }

    pub fn requests_matching(&self, prefix: &str) -> Vec<String> {
        self.state
            .borrow()
            .requests
            .iter()
            .filter(|request| request.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn village_for(&self, locator: &Locator) -> Result<String, GatewayError> {
        let state = self.state.borrow();
        let refs = parse_village_list(&state.village_list).map_err(|source| GatewayError::Page {
            url: "dorf1.php".to_string(),
            source,
        })?;
        refs.into_iter()
            .find(|village| village.locator.query() == locator.query())
            .map(|village| village.name)
            .ok_or_else(|| GatewayError::Status {
                url: locator.to_string(),
                status: 404,
            })
    }
}

fn unavailable(url: String) -> GatewayError {
    GatewayError::Status { url, status: 503 }
}

impl RemoteGateway for FakeServer {
    fn list_villages(&mut self) -> Result<Vec<VillageRef>, GatewayError> {
        let mut state = self.state.borrow_mut();
        state.record("list".to_string());
        if state.fail_listing {
            return Err(unavailable("dorf1.php".to_string()));
        }
        parse_village_list(&state.village_list).map_err(|source| GatewayError::Page {
            url: "dorf1.php".to_string(),
            source,
        })
    }

    fn fetch_overview(&mut self, locator: &Locator) -> Result<String, GatewayError> {
        let name = self.village_for(locator)?;
        let mut state = self.state.borrow_mut();
        state.record(format!("overview:{name}"));
        let village = state.villages.get(&name).cloned().unwrap_or_default();
        if village.fail_overview {
            return Err(unavailable(format!("dorf1.php?{}", locator.query())));
        }
        Ok(overview_page([750, 750, 750, 750], village.work_remaining))
    }

    fn fetch_defense(&mut self, locator: &Locator) -> Result<String, GatewayError> {
        let name = self.village_for(locator)?;
        let mut state = self.state.borrow_mut();
        state.record(format!("defense:{name}"));
        let village = state.villages.get(&name).cloned().unwrap_or_default();
        if village.fail_defense {
            return Err(unavailable(format!(
                "build.php?tt=1&id=39&{}",
                locator.query()
            )));
        }
        Ok(rally_point_page(
            village.incoming_raids,
            village.incoming_supply,
        ))
    }

    fn fetch_slot(&mut self, locator: &Locator, slot: u32) -> Result<String, GatewayError> {
        let name = self.village_for(locator)?;
        let mut state = self.state.borrow_mut();
        state.record(format!("slot:{name}:{slot}"));
        let current = state
            .villages
            .get(&name)
            .and_then(|village| village.slots.get(&slot))
            .cloned()
            .unwrap_or(SlotState {
                level: 0,
                button: SlotButton::Upgrade,
            });
        let action = format!("dorf1.php?a={slot}&{}&c=5f3a", locator.query());
        state.actions.insert(action.clone(), (name, slot));
        Ok(slot_page(current.level, current.button, &action))
    }

    fn issue_build(&mut self, action_url: &str) -> Result<(), GatewayError> {
        let mut state = self.state.borrow_mut();
        state.record(format!("build:{action_url}"));
        let (name, slot) = state
            .actions
            .get(action_url)
            .cloned()
            .ok_or_else(|| GatewayError::Status {
                url: action_url.to_string(),
                status: 400,
            })?;
        state.issued.push(action_url.to_string());
        if let Some(village) = state.villages.get_mut(&name) {
            if let Some(current) = village.slots.get_mut(&slot) {
                current.level += 1;
            }
        }
        Ok(())
    }

    fn teardown(&mut self) -> Result<(), GatewayError> {
        let mut state = self.state.borrow_mut();
        state.record("logout".to_string());
        state.teardowns += 1;
        Ok(())
    }
}

pub fn overview_page(resources: [u64; 4], work_remaining: Option<u64>) -> String {
    let counters: String = resources
        .iter()
        .enumerate()
        .map(|(index, amount)| {
            format!(
                r#"<li><span id="l{}" class="value">{amount}</span></li>"#,
                index + 1
            )
        })
        .collect();
    let queue = match work_remaining {
        Some(seconds) => format!(
            r#"<div class="boxes buildingList"><ul><li><div class="buildDuration">
            <span class="timer" value="{seconds}">{seconds}s</span></div></li></ul></div>"#
        ),
        None => String::new(),
    };
    format!(
        r#"<html><body><ul id="stockBar">{counters}</ul><div id="villageContent">{queue}</div></body></html>"#
    )
}

pub fn rally_point_page(incoming_raids: u32, incoming_supply: u32) -> String {
    let mut tables = String::new();
    for _ in 0..incoming_raids {
        tables.push_str(r#"<table class="troop_details inRaid"><tr><td>Raid</td></tr></table>"#);
    }
    for _ in 0..incoming_supply {
        tables.push_str(
            r#"<table class="troop_details inSupply"><tr><td>Reinforcement</td></tr></table>"#,
        );
    }
    format!(r#"<html><body><div id="build" class="gid16">{tables}</div></body></html>"#)
}

pub fn slot_page(level: u32, button: SlotButton, action: &str) -> String {
    let escaped = action.replace('&', "&amp;");
    let controls = match button {
        SlotButton::Upgrade => format!(
            r#"<div class="upgradeButtonsContainer section2Enabled"><div class="section1">
            <button type="button" class="green build" onclick="window.location.href = '{escaped}'; return false;">Upgrade</button>
            </div></div>"#
        ),
        SlotButton::Premium => r#"<div class="upgradeButtonsContainer section2Enabled"><div class="section1">
            <button type="button" class="gold builder" onclick="return false;">Exchange resources</button>
            </div></div>"#
            .to_string(),
        SlotButton::Missing => {
            r#"<div class="upgradeButtonsContainer"><span class="none">Not enough resources</span></div>"#
                .to_string()
        }
    };
    format!(
        r#"<html><body><div id="build"><h1 class="titleInHeader">Woodcutter <span class="level">Level {level}</span></h1>{controls}</div></body></html>"#
    )
}

/// Notifier that keeps every alert it is handed. Clones share the log.
#[derive(Clone, Debug, Default)]
pub struct RecordingNotifier {
    sent: Rc<RefCell<Vec<Alert>>>,
    failing: bool,
}

impl RecordingNotifier {
    /// Records each attempt, then reports a delivery failure.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Alert> {
        self.sent.borrow().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&mut self, alert: &Alert) -> Result<(), DeliveryError> {
        self.sent.borrow_mut().push(alert.clone());
        if self.failing {
            return Err(delivery_error());
        }
        Ok(())
    }
}

fn delivery_error() -> DeliveryError {
    match SmtpNotifier::new(
        "smtp.example.invalid",
        587,
        "bot@example.invalid",
        "pw",
        "not-an-address",
    ) {
        Err(err) => err,
        Ok(_) => panic!("malformed address was accepted"),
    }
}
