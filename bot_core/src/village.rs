use std::fmt;

use thiserror::Error;

use crate::gateway::{GatewayError, RemoteGateway};
use crate::markup::{self, ParseError, TroopMovements};

/// Fixed set of resources a village stockpiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Wood,
    Clay,
    Iron,
    Cereal,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Wood,
        ResourceKind::Clay,
        ResourceKind::Iron,
        ResourceKind::Cereal,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ResourceKind::Wood => "wood",
            ResourceKind::Clay => "clay",
            ResourceKind::Iron => "iron",
            ResourceKind::Cereal => "cereal",
        }
    }

    /// Stock counter on the overview page.
    pub(crate) fn counter_selector(self) -> &'static str {
        match self {
            ResourceKind::Wood => "span#l1",
            ResourceKind::Clay => "span#l2",
            ResourceKind::Iron => "span#l3",
            ResourceKind::Cereal => "span#l4",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Resources {
    wood: u64,
    clay: u64,
    iron: u64,
    cereal: u64,
}

impl Resources {
    pub fn new(wood: u64, clay: u64, iron: u64, cereal: u64) -> Self {
        Self {
            wood,
            clay,
            iron,
            cereal,
        }
    }

    pub fn amount(&self, kind: ResourceKind) -> u64 {
        match kind {
            ResourceKind::Wood => self.wood,
            ResourceKind::Clay => self.clay,
            ResourceKind::Iron => self.iron,
            ResourceKind::Cereal => self.cereal,
        }
    }

    pub fn set(&mut self, kind: ResourceKind, amount: u64) {
        match kind {
            ResourceKind::Wood => self.wood = amount,
            ResourceKind::Clay => self.clay = amount,
            ResourceKind::Iron => self.iron = amount,
            ResourceKind::Cereal => self.cereal = amount,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, u64)> + '_ {
        ResourceKind::ALL
            .into_iter()
            .map(move |kind| (kind, self.amount(kind)))
    }
}

/// Server-side address of a village, as handed out by the village list link.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Locator(String);

impl Locator {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The link without its leading `?` and trailing `&`, ready to append to
    /// another query string.
    pub fn query(&self) -> &str {
        let trimmed = self.0.trim();
        let trimmed = trimmed.strip_prefix('?').unwrap_or(trimmed);
        trimmed.strip_suffix('&').unwrap_or(trimmed)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A village as listed by the server, before any snapshot is taken.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VillageRef {
    pub name: String,
    pub locator: Locator,
}

impl VillageRef {
    pub fn new(name: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locator: Locator::new(locator),
        }
    }
}

/// Which page a refresh step was reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshPhase {
    Overview,
    Defense,
}

impl fmt::Display for RefreshPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshPhase::Overview => f.write_str("overview"),
            RefreshPhase::Defense => f.write_str("defense"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("{phase} fetch failed: {source}")]
    Fetch {
        phase: RefreshPhase,
        #[source]
        source: GatewayError,
    },
    #[error("{phase} page unreadable: {source}")]
    Parse {
        phase: RefreshPhase,
        #[source]
        source: ParseError,
    },
}

impl RefreshError {
    pub fn phase(&self) -> RefreshPhase {
        match self {
            RefreshError::Fetch { phase, .. } | RefreshError::Parse { phase, .. } => *phase,
        }
    }
}

/// Result of one refresh; the two page groups succeed or fail independently.
#[derive(Debug)]
pub struct RefreshOutcome {
    pub overview: Result<(), RefreshError>,
    pub defense: Result<(), RefreshError>,
}

impl RefreshOutcome {
    pub fn is_complete(&self) -> bool {
        self.overview.is_ok() && self.defense.is_ok()
    }

    pub fn errors(&self) -> impl Iterator<Item = &RefreshError> {
        [&self.overview, &self.defense]
            .into_iter()
            .filter_map(|result| result.as_ref().err())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct OverviewSnapshot {
    resources: Resources,
    work_remaining_seconds: u64,
}

/// Observed state of one managed village.
///
/// Every observed field starts out unknown and is only ever replaced as a
/// whole group by a successful fetch.
#[derive(Clone, Debug)]
pub struct Village {
    name: String,
    locator: Locator,
    overview: Option<OverviewSnapshot>,
    troops: Option<TroopMovements>,
}

impl Village {
    pub fn new(village: VillageRef) -> Self {
        Self {
            name: village.name,
            locator: village.locator,
            overview: None,
            troops: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn resources(&self) -> Option<Resources> {
        self.overview.map(|snapshot| snapshot.resources)
    }

    pub fn work_remaining_seconds(&self) -> Option<u64> {
        self.overview.map(|snapshot| snapshot.work_remaining_seconds)
    }

    pub fn troop_movements(&self) -> Option<TroopMovements> {
        self.troops
    }

    pub fn incoming_threat_count(&self) -> Option<u32> {
        self.troops.map(|troops| troops.incoming_threat_count())
    }

    pub fn is_idle(&self) -> bool {
        self.work_remaining_seconds() == Some(0)
    }

    /// Install an overview snapshot directly, bypassing the gateway.
    pub fn record_overview(&mut self, resources: Resources, work_remaining_seconds: u64) {
        self.overview = Some(OverviewSnapshot {
            resources,
            work_remaining_seconds,
        });
    }

    pub fn record_troops(&mut self, troops: TroopMovements) {
        self.troops = Some(troops);
    }

    /// Fetch both pages and replace whichever groups parsed cleanly. A failed
    /// group keeps its previous value.
    pub fn refresh<G: RemoteGateway + ?Sized>(&mut self, gateway: &mut G) -> RefreshOutcome {
        let overview = self.refresh_overview(gateway);
        let defense = self.refresh_defense(gateway);
        RefreshOutcome { overview, defense }
    }

    fn refresh_overview<G: RemoteGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
    ) -> Result<(), RefreshError> {
        let phase = RefreshPhase::Overview;
        let page = gateway
            .fetch_overview(&self.locator)
            .map_err(|source| RefreshError::Fetch { phase, source })?;
        let resources =
            markup::parse_resources(&page).map_err(|source| RefreshError::Parse { phase, source })?;
        let work = markup::parse_work_remaining(&page)
            .map_err(|source| RefreshError::Parse { phase, source })?;
        self.record_overview(resources, work);
        Ok(())
    }

    fn refresh_defense<G: RemoteGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
    ) -> Result<(), RefreshError> {
        let phase = RefreshPhase::Defense;
        let page = gateway
            .fetch_defense(&self.locator)
            .map_err(|source| RefreshError::Fetch { phase, source })?;
        let troops = markup::parse_troop_movements(&page)
            .map_err(|source| RefreshError::Parse { phase, source })?;
        self.record_troops(troops);
        Ok(())
    }
}
