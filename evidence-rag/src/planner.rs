//! Maps a risk profile to a short, prioritised list of literature queries.
//!
//! Each clause looks at the profile and contributes zero or more fixed query
//! strings. Clauses run in priority order, their output is concatenated, and
//! the result is truncated, so a clause that emits many queries (family
//! history) can crowd out everything after it.

use crate::models::{
    AlcoholConsumption, DietaryPattern, RiskProfile, SearchQuery, Sex, SmokingStatus,
};
use tracing::debug;

/// Maximum number of queries sent to the literature repository per request.
pub const MAX_QUERIES: usize = 3;

pub const FALLBACK_QUERY: &str = "lifestyle cancer risk prevention epidemiology";

struct Clause {
    name: &'static str,
    emit: fn(&RiskProfile) -> Vec<SearchQuery>,
}

const CLAUSES: &[Clause] = &[
    Clause {
        name: "current_smoker",
        emit: current_smoker,
    },
    Clause {
        name: "former_smoker",
        emit: former_smoker,
    },
    Clause {
        name: "alcohol",
        emit: alcohol,
    },
    Clause {
        name: "body_mass_index",
        emit: body_mass_index,
    },
    Clause {
        name: "diet",
        emit: diet,
    },
    Clause {
        name: "family_history",
        emit: family_history,
    },
    Clause {
        name: "prostate_screening",
        emit: prostate_screening,
    },
    Clause {
        name: "breast_screening",
        emit: breast_screening,
    },
    Clause {
        name: "colorectal_screening",
        emit: colorectal_screening,
    },
];

fn when(matches: bool, query: &str) -> Vec<SearchQuery> {
    if matches {
        vec![query.to_string()]
    } else {
        Vec::new()
    }
}

fn current_smoker(profile: &RiskProfile) -> Vec<SearchQuery> {
    when(
        profile.smoking_status == SmokingStatus::Current,
        "smoking lung cancer risk factors epidemiology",
    )
}

fn former_smoker(profile: &RiskProfile) -> Vec<SearchQuery> {
    when(
        profile.smoking_status == SmokingStatus::Former,
        "former smoker cancer risk reduction",
    )
}

fn alcohol(profile: &RiskProfile) -> Vec<SearchQuery> {
    when(
        matches!(
            profile.alcohol_consumption,
            AlcoholConsumption::Moderate | AlcoholConsumption::Heavy
        ),
        "alcohol consumption cancer risk liver colorectal",
    )
}

fn body_mass_index(profile: &RiskProfile) -> Vec<SearchQuery> {
    let bmi = profile.body_mass_index;
    if bmi >= 30.0 {
        when(true, "obesity BMI cancer risk endometrial breast colorectal")
    } else {
        when(bmi >= 25.0, "overweight cancer risk metabolic syndrome")
    }
}

fn diet(profile: &RiskProfile) -> Vec<SearchQuery> {
    let pattern = profile.diet();
    if pattern == DietaryPattern::Western {
        when(true, "western diet processed food cancer risk")
    } else {
        when(pattern.is_plant_based(), "plant based diet cancer prevention")
    }
}

fn family_history(profile: &RiskProfile) -> Vec<SearchQuery> {
    profile
        .family_conditions()
        .into_iter()
        .map(|condition| format!("hereditary {} cancer genetic risk", condition))
        .collect()
}

fn prostate_screening(profile: &RiskProfile) -> Vec<SearchQuery> {
    when(
        profile.age >= 50 && profile.sex == Sex::Male,
        "prostate cancer age risk screening men",
    )
}

fn breast_screening(profile: &RiskProfile) -> Vec<SearchQuery> {
    when(
        profile.age >= 40 && profile.sex == Sex::Female,
        "breast cancer age risk screening women mammography",
    )
}

fn colorectal_screening(profile: &RiskProfile) -> Vec<SearchQuery> {
    when(
        profile.age >= 45,
        "colorectal cancer age risk colonoscopy screening",
    )
}

/// Deterministic, side-effect free query planner.
#[derive(Debug, Clone)]
pub struct QueryPlanner {
    max_queries: usize,
}

impl Default for QueryPlanner {
    fn default() -> Self {
        Self {
            max_queries: MAX_QUERIES,
        }
    }
}

impl QueryPlanner {
    pub fn new(max_queries: usize) -> Self {
        Self {
            max_queries: max_queries.max(1),
        }
    }

    /// Returns between 1 and `max_queries` queries, most salient first.
    pub fn plan(&self, profile: &RiskProfile) -> Vec<SearchQuery> {
        let mut queries = Vec::new();
        for clause in CLAUSES {
            let emitted = (clause.emit)(profile);
            if !emitted.is_empty() {
                debug!(clause = clause.name, count = emitted.len(), "Planner clause matched");
            }
            queries.extend(emitted);
        }

        if queries.is_empty() {
            queries.push(FALLBACK_QUERY.to_string());
        }

        queries.truncate(self.max_queries);
        queries
    }
}
