use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectRecord {
    pub name: String,
    pub held: u64,
    pub attended: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Safe,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// No classes held yet; the ratio is undefined.
    NoData,
    Measured(Measurement),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub percentage: f64,
    pub status: Status,
    pub buffer: f64,
    pub skippable: u64,
    pub needed: u64,
    pub in_safe_zone: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection: Option<Projection>,
}

/// Outlook over a fixed number of classes still to come.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Projection {
    pub remaining: u64,
    /// `None` when attending every remaining class still misses the threshold.
    pub max_skips: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub subject: String,
    pub held: u64,
    pub attended: u64,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Analysis {
    pub fn measurement(&self) -> Option<&Measurement> {
        match &self.outcome {
            Outcome::Measured(measurement) => Some(measurement),
            Outcome::NoData => None,
        }
    }
}

/// Provenance carried by extractor-written data files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceInfo {
    pub source: Option<String>,
    pub captured: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendanceData {
    pub info: SourceInfo,
    pub records: Vec<SubjectRecord>,
}

/// Whole-semester tallies; the overall ratio is total attended over total held,
/// not an average of per-subject percentages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub subjects: usize,
    pub safe: usize,
    pub danger: usize,
    pub no_data: usize,
    pub attended: u64,
    pub held: u64,
}

impl Totals {
    pub fn percentage(&self) -> Option<f64> {
        (self.held > 0).then(|| 100.0 * self.attended as f64 / self.held as f64)
    }
}
