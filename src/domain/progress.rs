use crate::domain::access;
use crate::domain::models::{AccessRule, Role, UserType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// Respondent attributes needed for progress counting.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Respondent {
    pub id: Uuid,
    pub role: Role,
    pub user_type: Option<UserType>,
    pub province_id: Option<i32>,
    pub ward_id: Option<i32>,
}

/// Explicit user filter. `None` leaves that dimension unrestricted.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct UserFilter {
    pub province_id: Option<i32>,
    pub ward_id: Option<i32>,
    pub role: Option<Role>,
    pub user_type: Option<UserType>,
    pub survey_status: Option<bool>,
}

impl UserFilter {
    pub fn matches_profile(&self, r: &Respondent) -> bool {
        self.province_id.map_or(true, |p| r.province_id == Some(p))
            && self.ward_id.map_or(true, |w| r.ward_id == Some(w))
            && self.role.map_or(true, |role| r.role == role)
            && self.user_type.map_or(true, |t| r.user_type == Some(t))
    }

    pub fn matches(&self, r: &Respondent, finished: bool) -> bool {
        self.matches_profile(r) && self.survey_status.map_or(true, |s| s == finished)
    }

    /// Pins the filter to one province, used for province-union accounts.
    pub fn restricted_to(mut self, province_id: Option<i32>) -> Self {
        if province_id.is_some() {
            self.province_id = province_id;
        }
        self
    }
}

/// `(user, survey)` pairs that have a locked submission.
#[derive(Debug, Default, Clone)]
pub struct CompletionIndex(HashSet<(Uuid, i32)>);

impl CompletionIndex {
    pub fn is_finished(&self, user_id: Uuid, survey_id: i32) -> bool {
        self.0.contains(&(user_id, survey_id))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<(Uuid, i32)> for CompletionIndex {
    fn from_iter<I: IntoIterator<Item = (Uuid, i32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SurveyProgress {
    pub survey_id: i32,
    pub finished_num: usize,
    pub total_num: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProvinceProgress {
    pub province_id: Option<i32>,
    pub finished_num: usize,
    pub total_num: usize,
}

fn in_scope<'a>(
    survey_id: i32,
    rules: &'a [AccessRule],
    users: &'a [Respondent],
    completions: &'a CompletionIndex,
    filter: &'a UserFilter,
) -> impl Iterator<Item = (&'a Respondent, bool)> + 'a {
    users
        .iter()
        .filter(move |u| access::counts_toward(u.role, u.user_type, rules))
        .map(move |u| (u, completions.is_finished(u.id, survey_id)))
        .filter(move |(u, finished)| filter.matches(u, *finished))
}

pub fn survey_progress(
    survey_id: i32,
    rules: &[AccessRule],
    users: &[Respondent],
    completions: &CompletionIndex,
    filter: &UserFilter,
) -> SurveyProgress {
    let mut progress = SurveyProgress {
        survey_id,
        finished_num: 0,
        total_num: 0,
    };
    for (_, finished) in in_scope(survey_id, rules, users, completions, filter) {
        progress.total_num += 1;
        if finished {
            progress.finished_num += 1;
        }
    }
    progress
}

/// Progress of one survey split by province, ordered by province id with
/// users lacking a province first.
pub fn province_breakdown(
    survey_id: i32,
    rules: &[AccessRule],
    users: &[Respondent],
    completions: &CompletionIndex,
    filter: &UserFilter,
) -> Vec<ProvinceProgress> {
    let mut buckets: BTreeMap<Option<i32>, (usize, usize)> = BTreeMap::new();
    for (user, finished) in in_scope(survey_id, rules, users, completions, filter) {
        let entry = buckets.entry(user.province_id).or_default();
        entry.1 += 1;
        if finished {
            entry.0 += 1;
        }
    }
    buckets
        .into_iter()
        .map(|(province_id, (finished_num, total_num))| ProvinceProgress {
            province_id,
            finished_num,
            total_num,
        })
        .collect()
}

/// Progress for each `(survey_id, rules)` pair, in input order.
pub fn summarize<'a, I>(
    surveys: I,
    users: &[Respondent],
    completions: &CompletionIndex,
    filter: &UserFilter,
) -> Vec<SurveyProgress>
where
    I: IntoIterator<Item = (i32, &'a [AccessRule])>,
{
    surveys
        .into_iter()
        .map(|(survey_id, rules)| survey_progress(survey_id, rules, users, completions, filter))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn respondent(role: Role, user_type: Option<UserType>, province: i32, ward: i32) -> Respondent {
        Respondent {
            id: Uuid::new_v4(),
            role,
            user_type,
            province_id: Some(province),
            ward_id: Some(ward),
        }
    }

    fn rule(role: Role, user_type: Option<UserType>) -> AccessRule {
        AccessRule {
            survey_id: 10,
            role,
            user_type,
        }
    }

    fn fixture() -> (Vec<Respondent>, CompletionIndex) {
        let users = vec![
            respondent(Role::Htx, Some(UserType::Nn), 1, 11),
            respondent(Role::Htx, Some(UserType::Nn), 1, 12),
            respondent(Role::Htx, Some(UserType::Pnn), 2, 21),
            respondent(Role::Qtd, None, 2, 21),
            respondent(Role::Admin, None, 1, 11),
        ];
        let completions = [(users[0].id, 10), (users[2].id, 10), (users[3].id, 99)]
            .into_iter()
            .collect();
        (users, completions)
    }

    #[test]
    fn counts_only_users_matched_by_rules() {
        let (users, completions) = fixture();
        let rules = vec![rule(Role::Htx, Some(UserType::Nn))];
        let p = survey_progress(10, &rules, &users, &completions, &UserFilter::default());
        assert_eq!(p.total_num, 2);
        assert_eq!(p.finished_num, 1);
    }

    #[test]
    fn open_survey_counts_all_respondents_but_not_admin() {
        let (users, completions) = fixture();
        let p = survey_progress(10, &[], &users, &completions, &UserFilter::default());
        assert_eq!(p.total_num, 4);
        assert_eq!(p.finished_num, 2);
    }

    #[test]
    fn completion_is_scoped_to_the_survey() {
        let (users, completions) = fixture();
        let rules = vec![rule(Role::Qtd, None)];
        let p = survey_progress(10, &rules, &users, &completions, &UserFilter::default());
        assert_eq!((p.finished_num, p.total_num), (0, 1));
        let p = survey_progress(99, &rules, &users, &completions, &UserFilter::default());
        assert_eq!((p.finished_num, p.total_num), (1, 1));
    }

    #[test]
    fn filter_narrows_population() {
        let (users, completions) = fixture();
        let filter = UserFilter {
            province_id: Some(2),
            ..Default::default()
        };
        let p = survey_progress(10, &[], &users, &completions, &filter);
        assert_eq!((p.finished_num, p.total_num), (1, 2));

        let unfinished = UserFilter {
            survey_status: Some(false),
            ..Default::default()
        };
        let p = survey_progress(10, &[], &users, &completions, &unfinished);
        assert_eq!((p.finished_num, p.total_num), (0, 2));

        let ward = UserFilter {
            ward_id: Some(12),
            user_type: Some(UserType::Nn),
            ..Default::default()
        };
        let p = survey_progress(10, &[], &users, &completions, &ward);
        assert_eq!((p.finished_num, p.total_num), (0, 1));
    }

    #[test]
    fn restricted_filter_overrides_requested_province() {
        let filter = UserFilter {
            province_id: Some(5),
            ..Default::default()
        };
        assert_eq!(filter.clone().restricted_to(Some(2)).province_id, Some(2));
        assert_eq!(filter.restricted_to(None).province_id, Some(5));
    }

    #[test]
    fn breakdown_groups_by_province() {
        let (users, completions) = fixture();
        let rows = province_breakdown(10, &[], &users, &completions, &UserFilter::default());
        assert_eq!(
            rows,
            vec![
                ProvinceProgress { province_id: Some(1), finished_num: 1, total_num: 2 },
                ProvinceProgress { province_id: Some(2), finished_num: 1, total_num: 2 },
            ]
        );
    }

    #[test]
    fn summarize_keeps_survey_order() {
        let (users, completions) = fixture();
        let qtd = vec![rule(Role::Qtd, None)];
        let out = summarize(
            vec![(99, qtd.as_slice()), (10, &[][..])],
            &users,
            &completions,
            &UserFilter::default(),
        );
        assert_eq!(out.iter().map(|p| p.survey_id).collect::<Vec<_>>(), vec![99, 10]);
        assert_eq!(out[1].total_num, 4);
    }
}
