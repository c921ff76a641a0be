//! Extraction of typed fields from the game server's HTML pages.
//!
//! Every function takes the raw markup of one page. An element that the page
//! must contain but does not is a [`ParseError`], never a silent zero. The one
//! exception is the build list on the overview page, whose absence is how the
//! server says "nothing under construction".

use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

use crate::village::{ResourceKind, Resources, VillageRef};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid selector '{0}'")]
    InvalidSelector(&'static str),
    #[error("missing element '{0}'")]
    MissingElement(&'static str),
    #[error("missing attribute '{attribute}' on '{element}'")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    #[error("no digits in '{value}' for {context}")]
    NoDigits {
        value: String,
        context: &'static str,
    },
    #[error("number '{value}' out of range for {context}")]
    OutOfRange {
        value: String,
        context: &'static str,
    },
    #[error("malformed build action '{0}'")]
    MalformedAction(String),
}

/// Why the server offers no usable construction action for a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// No upgrade button at all, e.g. prerequisites or resources missing.
    NoButton,
    /// The only enabled button spends premium currency.
    PremiumOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildAction {
    Available { url: String },
    Blocked(BlockReason),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TroopMovements {
    pub incoming_raids: u32,
    pub incoming_supply: u32,
    pub outgoing_raids: u32,
    pub outgoing_supply: u32,
}

impl TroopMovements {
    pub fn incoming_threat_count(&self) -> u32 {
        self.incoming_raids
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginForm {
    pub action: Option<String>,
    pub fields: Vec<(String, String)>,
}

impl LoginForm {
    /// Hidden fields kept as served, credentials filled in.
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.fields.retain(|(name, _)| name != "name" && name != "password");
        self.fields.push(("name".to_string(), username.to_string()));
        self.fields.push(("password".to_string(), password.to_string()));
        self
    }
}

const VILLAGE_LIST_ITEM: &str = "#sidebarBoxVillagelist li";
const VILLAGE_LINK: &str = "a";
const VILLAGE_NAME: &str = "a div";
const BUILD_LIST: &str = "div.boxes.buildingList";
const BUILD_DURATION: &str = "div.buildDuration span";
const SLOT_LEVEL: &str = "span.level";
const UPGRADE_CONTAINER: &str = "div.upgradeButtonsContainer.section2Enabled";
const UPGRADE_BUTTON: &str = "div.section1 button";
const LOGIN_FORM: &str = "form";
const FORM_INPUT: &str = "input";
const PASSWORD_INPUT: &str = "input[type=password], input[name=password]";

fn selector(css: &'static str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|_| ParseError::InvalidSelector(css))
}

fn first<'a>(page: &'a Html, css: &'static str) -> Result<Option<ElementRef<'a>>, ParseError> {
    let sel = selector(css)?;
    Ok(page.select(&sel).next())
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>()
}

/// Strip everything that is not an ASCII digit, then parse what is left.
pub fn parse_digits(value: &str, context: &'static str) -> Result<u64, ParseError> {
    let digits: String = value.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Err(ParseError::NoDigits {
            value: value.trim().to_string(),
            context,
        });
    }
    digits.parse::<u64>().map_err(|_| ParseError::OutOfRange {
        value: digits,
        context,
    })
}

pub fn parse_village_list(markup: &str) -> Result<Vec<VillageRef>, ParseError> {
    let page = Html::parse_document(markup);
    let items = selector(VILLAGE_LIST_ITEM)?;
    let link = selector(VILLAGE_LINK)?;
    let name = selector(VILLAGE_NAME)?;

    let mut villages = Vec::new();
    for item in page.select(&items) {
        let anchor = item
            .select(&link)
            .next()
            .ok_or(ParseError::MissingElement(VILLAGE_LINK))?;
        let href = anchor
            .value()
            .attr("href")
            .ok_or(ParseError::MissingAttribute {
                element: VILLAGE_LINK,
                attribute: "href",
            })?;
        let label = item
            .select(&name)
            .next()
            .map(text_of)
            .ok_or(ParseError::MissingElement(VILLAGE_NAME))?;
        villages.push(VillageRef::new(label.trim(), href));
    }
    Ok(villages)
}

pub fn parse_resources(markup: &str) -> Result<Resources, ParseError> {
    let page = Html::parse_document(markup);
    let mut resources = Resources::default();
    for kind in ResourceKind::ALL {
        let css = kind.counter_selector();
        let element = first(&page, css)?.ok_or(ParseError::MissingElement(css))?;
        resources.set(kind, parse_digits(&text_of(element), kind.label())?);
    }
    Ok(resources)
}

pub fn parse_work_remaining(markup: &str) -> Result<u64, ParseError> {
    let page = Html::parse_document(markup);
    let Some(list) = first(&page, BUILD_LIST)? else {
        return Ok(0);
    };
    let duration = selector(BUILD_DURATION)?;
    let span = list
        .select(&duration)
        .next()
        .ok_or(ParseError::MissingElement(BUILD_DURATION))?;
    let value = span.value().attr("value").ok_or(ParseError::MissingAttribute {
        element: BUILD_DURATION,
        attribute: "value",
    })?;
    parse_digits(value, "work remaining")
}

pub fn parse_troop_movements(markup: &str) -> Result<TroopMovements, ParseError> {
    let page = Html::parse_document(markup);
    let count = |css: &'static str| -> Result<u32, ParseError> {
        let sel = selector(css)?;
        Ok(page.select(&sel).count() as u32)
    };
    Ok(TroopMovements {
        incoming_raids: count("table.troop_details.inRaid")?,
        incoming_supply: count("table.troop_details.inSupply")?,
        outgoing_raids: count("table.troop_details.outRaid")?,
        outgoing_supply: count("table.troop_details.outSupply")?,
    })
}

pub fn parse_incoming_threat_count(markup: &str) -> Result<u32, ParseError> {
    parse_troop_movements(markup).map(|movements| movements.incoming_threat_count())
}

pub fn parse_current_level(markup: &str) -> Result<u32, ParseError> {
    let page = Html::parse_document(markup);
    let element = first(&page, SLOT_LEVEL)?.ok_or(ParseError::MissingElement(SLOT_LEVEL))?;
    let level = parse_digits(&text_of(element), "slot level")?;
    u32::try_from(level).map_err(|_| ParseError::OutOfRange {
        value: level.to_string(),
        context: "slot level",
    })
}

pub fn parse_build_action(markup: &str) -> Result<BuildAction, ParseError> {
    let page = Html::parse_document(markup);
    let Some(container) = first(&page, UPGRADE_CONTAINER)? else {
        return Ok(BuildAction::Blocked(BlockReason::NoButton));
    };
    let button_sel = selector(UPGRADE_BUTTON)?;
    let Some(button) = container.select(&button_sel).next() else {
        return Ok(BuildAction::Blocked(BlockReason::NoButton));
    };
    if button.value().classes().any(|class| class == "gold") {
        return Ok(BuildAction::Blocked(BlockReason::PremiumOnly));
    }
    let onclick = button
        .value()
        .attr("onclick")
        .ok_or(ParseError::MissingAttribute {
            element: UPGRADE_BUTTON,
            attribute: "onclick",
        })?;
    let url = quoted_target(onclick)
        .ok_or_else(|| ParseError::MalformedAction(onclick.to_string()))?;
    Ok(BuildAction::Available {
        url: url.to_string(),
    })
}

/// `window.location.href = 'dorf1.php?a=1&c=x'; return false;` -> the quoted part.
fn quoted_target(onclick: &str) -> Option<&str> {
    let start = onclick.find('\'')? + 1;
    let len = onclick[start..].find('\'')?;
    let target = onclick[start..start + len].trim();
    (!target.is_empty()).then_some(target)
}

pub fn parse_login_form(markup: &str) -> Result<LoginForm, ParseError> {
    let page = Html::parse_document(markup);
    let form = first(&page, LOGIN_FORM)?.ok_or(ParseError::MissingElement(LOGIN_FORM))?;
    let input = selector(FORM_INPUT)?;
    let fields = form
        .select(&input)
        .filter_map(|element| {
            let name = element.value().attr("name")?;
            let value = element.value().attr("value").unwrap_or_default();
            Some((name.to_string(), value.to_string()))
        })
        .collect();
    Ok(LoginForm {
        action: form.value().attr("action").map(str::to_string),
        fields,
    })
}

/// True when the page still asks for a password, i.e. the login did not take.
pub fn has_password_prompt(markup: &str) -> Result<bool, ParseError> {
    let page = Html::parse_document(markup);
    Ok(first(&page, PASSWORD_INPUT)?.is_some())
}
