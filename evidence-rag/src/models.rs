use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::Value;
use std::fmt;

pub const DEFAULT_AGE: u32 = 40;
pub const DEFAULT_BMI: f64 = 22.0;

/// Upper bound on the number of abstracts grounding one report.
pub const MAX_EVIDENCE_RECORDS: usize = 5;

const PUBMED_RECORD_URL: &str = "https://pubmed.ncbi.nlm.nih.gov";

/// One literature search term set. Position in the planned list is its priority.
pub type SearchQuery = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
    #[default]
    Other,
}

impl From<&str> for Sex {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Sex::Male,
            "female" | "f" => Sex::Female,
            _ => Sex::Other,
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sex::Male => write!(f, "male"),
            Sex::Female => write!(f, "female"),
            Sex::Other => write!(f, "other"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SmokingStatus {
    Current,
    Former,
    Never,
    #[default]
    Unknown,
}

impl From<&str> for SmokingStatus {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "current" => SmokingStatus::Current,
            "former" => SmokingStatus::Former,
            "never" => SmokingStatus::Never,
            _ => SmokingStatus::Unknown,
        }
    }
}

impl fmt::Display for SmokingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmokingStatus::Current => write!(f, "current"),
            SmokingStatus::Former => write!(f, "former"),
            SmokingStatus::Never => write!(f, "never"),
            SmokingStatus::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlcoholConsumption {
    #[default]
    None,
    Moderate,
    Heavy,
}

impl From<&str> for AlcoholConsumption {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "moderate" => AlcoholConsumption::Moderate,
            "heavy" => AlcoholConsumption::Heavy,
            _ => AlcoholConsumption::None,
        }
    }
}

impl fmt::Display for AlcoholConsumption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlcoholConsumption::None => write!(f, "none"),
            AlcoholConsumption::Moderate => write!(f, "moderate"),
            AlcoholConsumption::Heavy => write!(f, "heavy"),
        }
    }
}

// Enumerated profile fields never reject input: anything unrecognised
// (including null or a non-string) becomes the variant's default.
macro_rules! lenient_enum_deserialize {
    ($($ty:ty),+) => {
        $(
            impl<'de> Deserialize<'de> for $ty {
                fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                    let value = Value::deserialize(deserializer)?;
                    Ok(value.as_str().map(<$ty as From<&str>>::from).unwrap_or_default())
                }
            }
        )+
    };
}

lenient_enum_deserialize!(Sex, SmokingStatus, AlcoholConsumption);

/// Recognised subset of the free-form dietary tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DietaryPattern {
    Western,
    Mediterranean,
    Vegetarian,
    Vegan,
    Unrecognized,
}

impl DietaryPattern {
    pub fn classify(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "western" => DietaryPattern::Western,
            "mediterranean" => DietaryPattern::Mediterranean,
            "vegetarian" => DietaryPattern::Vegetarian,
            "vegan" => DietaryPattern::Vegan,
            _ => DietaryPattern::Unrecognized,
        }
    }

    pub fn is_plant_based(self) -> bool {
        matches!(
            self,
            DietaryPattern::Mediterranean | DietaryPattern::Vegetarian | DietaryPattern::Vegan
        )
    }
}

/// Personal health and lifestyle input driving query planning and synthesis.
///
/// Deserialization is tolerant: missing fields take the [`Default`] values,
/// numeric fields accept numeric strings, and unparsable values fall back to
/// their defaults instead of failing the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RiskProfile {
    #[serde(deserialize_with = "lenient_age")]
    pub age: u32,
    pub sex: Sex,
    #[serde(alias = "bmi", deserialize_with = "lenient_bmi")]
    pub body_mass_index: f64,
    pub smoking_status: SmokingStatus,
    pub alcohol_consumption: AlcoholConsumption,
    #[serde(deserialize_with = "lenient_text")]
    pub dietary_pattern: String,
    #[serde(deserialize_with = "condition_list")]
    pub family_history: Vec<String>,
}

impl Default for RiskProfile {
    fn default() -> Self {
        Self {
            age: DEFAULT_AGE,
            sex: Sex::default(),
            body_mass_index: DEFAULT_BMI,
            smoking_status: SmokingStatus::default(),
            alcohol_consumption: AlcoholConsumption::default(),
            dietary_pattern: String::new(),
            family_history: Vec::new(),
        }
    }
}

impl RiskProfile {
    pub fn diet(&self) -> DietaryPattern {
        DietaryPattern::classify(&self.dietary_pattern)
    }

    /// Family-history conditions, trimmed, without blanks or case-insensitive repeats.
    pub fn family_conditions(&self) -> Vec<&str> {
        let mut seen: Vec<String> = Vec::new();
        let mut conditions = Vec::new();
        for condition in &self.family_history {
            let condition = condition.trim();
            if condition.is_empty() {
                continue;
            }
            let key = condition.to_lowercase();
            if !seen.contains(&key) {
                seen.push(key);
                conditions.push(condition);
            }
        }
        conditions
    }
}

fn number_from(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn lenient_age<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(number_from(&value)
        .filter(|age| *age >= 0.0 && *age <= u32::MAX as f64)
        .map(|age| age as u32)
        .unwrap_or(DEFAULT_AGE))
}

fn lenient_bmi<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(number_from(&value)
        .filter(|bmi| *bmi > 0.0)
        .unwrap_or(DEFAULT_BMI))
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_str().unwrap_or_default().to_string())
}

/// Accepts either a JSON array of strings or a single comma-separated string.
fn condition_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let conditions = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str())
            .map(str::to_string)
            .collect(),
        Value::String(text) => text.split(',').map(|s| s.trim().to_string()).collect(),
        _ => Vec::new(),
    };
    Ok(conditions)
}

/// One parsed abstract from the literature repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiteratureRecord {
    #[serde(rename = "pmid")]
    pub identifier: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub url: String,
    /// Equal to `url` when the repository offers no distinct DOI.
    pub doi: String,
    #[serde(rename = "year")]
    pub publication_year: Option<u16>,
}

impl LiteratureRecord {
    pub fn new(
        identifier: impl Into<String>,
        title: impl Into<String>,
        abstract_text: impl Into<String>,
        publication_year: Option<u16>,
    ) -> Self {
        let identifier = identifier.into();
        let url = record_url(&identifier);
        Self {
            doi: url.clone(),
            url,
            identifier,
            title: title.into(),
            abstract_text: abstract_text.into(),
            publication_year,
        }
    }
}

/// Canonical repository page for a record identifier.
pub fn record_url(identifier: &str) -> String {
    format!("{}/{}/", PUBMED_RECORD_URL, identifier)
}

/// Ordered, identifier-unique collection of at most [`MAX_EVIDENCE_RECORDS`] records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EvidenceSet {
    records: Vec<LiteratureRecord>,
}

impl EvidenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set in iteration order, skipping repeated identifiers and
    /// anything past the cap.
    pub fn from_records(records: impl IntoIterator<Item = LiteratureRecord>) -> Self {
        let mut set = Self::new();
        for record in records {
            if set.is_full() {
                break;
            }
            set.push(record);
        }
        set
    }

    /// Returns false when the record was rejected as a duplicate or the set is full.
    pub fn push(&mut self, record: LiteratureRecord) -> bool {
        if self.is_full()
            || self
                .records
                .iter()
                .any(|existing| existing.identifier == record.identifier)
        {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= MAX_EVIDENCE_RECORDS
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[LiteratureRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LiteratureRecord> {
        self.records.iter()
    }
}

impl<'a> IntoIterator for &'a EvidenceSet {
    type Item = &'a LiteratureRecord;
    type IntoIter = std::slice::Iter<'a, LiteratureRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

const RISK_LEVELS: &[&str] = &["low", "moderate", "high"];

/// Case-insensitive, but anything outside low/moderate/high is still rejected.
impl<'de> Deserialize<'de> for RiskLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "moderate" => Ok(RiskLevel::Moderate),
            "high" => Ok(RiskLevel::High),
            _ => Err(de::Error::unknown_variant(&value, RISK_LEVELS)),
        }
    }
}

/// A `null` title or url reads as empty; grounding can still match on the other field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(default, deserialize_with = "lenient_text")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub cancer_type: String,
    pub risk_level: RiskLevel,
    pub explanation: String,
    #[serde(default, deserialize_with = "citation_list")]
    pub citations: Vec<Citation>,
    pub recommendation: String,
}

fn citation_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Citation>, D::Error> {
    Ok(Option::<Vec<Citation>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Validated synthesis output, with the evidence and invocation id attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub insights: Vec<Insight>,
    pub disclaimer: String,
    #[serde(rename = "searchedAbstracts")]
    pub evidence: EvidenceSet,
    pub invocation_id: String,
}
