//! Declarative build plan.
//!
//! The plan is a `|`-delimited text file, one job per row, read again at the
//! start of every cycle so edits apply from the next cycle on:
//!
//! ```text
//! VillageName|BuildType|BuildID|BuildLvl
//! Village1|field|34|2
//! ```

use std::{
    fmt, fs, io,
    num::ParseIntError,
    path::{Path, PathBuf},
};

use thiserror::Error;

const COLUMNS: usize = 4;

/// Class of construction slot a job targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Field,
    Building,
}

impl TargetKind {
    fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "field" => Some(TargetKind::Field),
            "building" => Some(TargetKind::Building),
            _ => None,
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Field => f.write_str("field"),
            TargetKind::Building => f.write_str("building"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildJob {
    pub village_name: String,
    pub target: TargetKind,
    pub field_id: u32,
    pub target_level: u32,
}

impl fmt::Display for BuildJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> level {}",
            self.target, self.field_id, self.target_level
        )
    }
}

#[derive(Debug, Error)]
pub enum RowError {
    #[error("expected 4 columns, found {0}")]
    ColumnCount(usize),
    #[error("empty village name")]
    EmptyVillage,
    #[error("unknown target type '{0}'")]
    UnknownTarget(String),
    #[error("invalid integer '{value}' for {context}: {source}")]
    InvalidInteger {
        value: String,
        context: &'static str,
        source: ParseIntError,
    },
    #[error("target level must be at least 1")]
    ZeroLevel,
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("failed to read job plan from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("job plan line {line}: {source}")]
    Row {
        line: usize,
        #[source]
        source: RowError,
    },
}

/// Ordered, immutable list of jobs loaded for one cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JobPlan {
    jobs: Vec<BuildJob>,
}

impl JobPlan {
    pub fn new(jobs: Vec<BuildJob>) -> Self {
        Self { jobs }
    }

    /// Parse the whole text. Any bad row rejects the plan, so a typo can never
    /// silently drop a job and let a later one run out of order.
    pub fn parse_str(text: &str) -> Result<Self, PlanError> {
        let mut jobs = Vec::new();
        for (index, row) in text.lines().enumerate() {
            // The header is skipped by position, whatever it contains.
            if index == 0 || row.trim().is_empty() {
                continue;
            }
            let job = parse_row(row).map_err(|source| PlanError::Row {
                line: index + 1,
                source,
            })?;
            jobs.push(job);
        }
        Ok(Self { jobs })
    }

    pub fn jobs(&self) -> &[BuildJob] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Jobs for one village in declared order.
    pub fn queue_for(&self, village_name: &str) -> Vec<&BuildJob> {
        self.jobs
            .iter()
            .filter(|job| job.village_name == village_name)
            .collect()
    }
}

fn parse_row(row: &str) -> Result<BuildJob, RowError> {
    let columns: Vec<&str> = row.split('|').map(str::trim).collect();
    if columns.len() != COLUMNS {
        return Err(RowError::ColumnCount(columns.len()));
    }
    let village_name = columns[0];
    if village_name.is_empty() {
        return Err(RowError::EmptyVillage);
    }
    let target =
        TargetKind::parse(columns[1]).ok_or_else(|| RowError::UnknownTarget(columns[1].into()))?;
    let field_id = parse_u32(columns[2], "field id")?;
    let target_level = parse_u32(columns[3], "target level")?;
    if target_level == 0 {
        return Err(RowError::ZeroLevel);
    }
    Ok(BuildJob {
        village_name: village_name.to_string(),
        target,
        field_id,
        target_level,
    })
}

fn parse_u32(value: &str, context: &'static str) -> Result<u32, RowError> {
    value
        .parse::<u32>()
        .map_err(|source| RowError::InvalidInteger {
            value: value.to_string(),
            context,
            source,
        })
}

/// Where the scheduler gets a fresh plan each cycle.
pub trait PlanSource {
    fn load(&self) -> Result<JobPlan, PlanError>;
}

/// Plan backed by a file on disk.
#[derive(Clone, Debug)]
pub struct JobPlanStore {
    path: PathBuf,
}

impl JobPlanStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PlanSource for JobPlanStore {
    fn load(&self) -> Result<JobPlan, PlanError> {
        let text = fs::read_to_string(&self.path).map_err(|source| PlanError::ReadFailed {
            path: self.path.clone(),
            source,
        })?;
        let plan = JobPlan::parse_str(&text)?;
        tracing::debug!(
            target: "village_bot::plan",
            path = %self.path.display(),
            jobs = plan.len(),
            "job_plan.loaded"
        );
        Ok(plan)
    }
}

impl PlanSource for JobPlan {
    fn load(&self) -> Result<JobPlan, PlanError> {
        Ok(self.clone())
    }
}
