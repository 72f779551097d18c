use serde::{Deserialize, Serialize};

/// Weight `b` of the heaviest question; every answer is scored out of `5 * b`.
pub const MAX_QUESTION_WEIGHT: f64 = 3.0;

const MAX_ANSWER: f64 = 5.0;

/// Yearly per-province aggregate fed to the calculator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
#[serde(rename_all = "PascalCase")]
pub struct ProvinceAggregate {
    pub id: i32,
    pub name: String,
    #[serde(default)]
    pub region: Option<String>,
    pub total_point: f64,
    pub total_users: i64,
    pub total_members: i64,
    pub members_surveyed: i64,
    pub non_members_surveyed: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ScoredProvince {
    #[serde(flatten)]
    pub province: ProvinceAggregate,
    pub final_point: f64,
}

/// The three multipliers behind a final point, exposed for dashboards.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Coefficients {
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
}

/// `part / whole` as a percentage in [0, 100]; zero when `whole` is not positive.
fn percentage(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    (part.max(0) as f64 / whole as f64 * 100.0).clamp(0.0, 100.0)
}

/// Completion-rate coefficient. Tiers collapse to 1.0 once enough members
/// answered; below the last tier the raw percentage is returned.
pub fn compute_k1(surveyed: i64, total: i64) -> f64 {
    let ratio = percentage(surveyed, total);
    if ratio >= 100.0 && total < 500 {
        1.0
    } else if ratio >= 80.0 && total < 1000 {
        1.0
    } else if ratio >= 70.0 {
        1.0
    } else {
        ratio
    }
}

/// Membership-size multiplier. `_total_active` is accepted for call-site
/// compatibility and does not affect the bucket.
pub fn compute_k2(member_count: i64, _total_active: i64) -> f64 {
    match member_count {
        n if n < 100 => 0.6,
        n if n < 200 => 0.7,
        n if n < 300 => 0.8,
        n if n < 500 => 1.0,
        n if n < 1000 => 1.2,
        _ => 1.4,
    }
}

/// Flat bonus for reaching non-members.
pub fn compute_k3(non_member_surveyed: i64) -> f64 {
    match non_member_surveyed {
        n if n <= 0 => 0.0,
        n if n < 100 => 5.0,
        n if n < 200 => 10.0,
        _ => 15.0,
    }
}

pub fn coefficients(agg: &ProvinceAggregate) -> Coefficients {
    Coefficients {
        k1: compute_k1(agg.members_surveyed, agg.total_members),
        k2: compute_k2(agg.total_members, agg.total_users),
        k3: compute_k3(agg.non_members_surveyed),
    }
}

/// `(total_point / (5 * b * n)) * 100 * k1 * k2 + k3`, or zero when there are no users.
pub fn weighted_point(total_point: f64, total_users: i64, k: Coefficients) -> f64 {
    if total_users <= 0 {
        return 0.0;
    }
    let denom = MAX_ANSWER * MAX_QUESTION_WEIGHT * total_users as f64;
    (total_point.max(0.0) / denom) * 100.0 * k.k1 * k.k2 + k.k3
}

pub fn final_point(agg: &ProvinceAggregate) -> f64 {
    weighted_point(agg.total_point, agg.total_users, coefficients(agg))
}

/// Scores every province and orders them best first. Equal scores keep input order.
pub fn rank_provinces(provinces: Vec<ProvinceAggregate>) -> Vec<ScoredProvince> {
    let mut scored: Vec<ScoredProvince> = provinces
        .into_iter()
        .map(|province| ScoredProvince {
            final_point: final_point(&province),
            province,
        })
        .collect();
    scored.sort_by(|a, b| b.final_point.total_cmp(&a.final_point));
    scored
}
