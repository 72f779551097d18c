pub mod seed;

use crate::domain::models::{
    AccessRule, MemberKind, Province, Question, Role, Survey, UserSurveyStatus, UserType, Ward,
};
use crate::domain::progress::{CompletionIndex, Respondent, UserFilter};
use crate::domain::scoring::{ProvinceAggregate, ScoredProvince};
use crate::domain::submission::ValidatedSubmission;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DbUser {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub hash: String,
    pub name: String,
    pub role: Role,
    pub user_type: Option<UserType>,
    pub member: Option<MemberKind>,
    pub province_id: Option<i32>,
    pub ward_id: Option<i32>,
    pub is_locked: bool,
    pub survey_status: bool,
    pub survey_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

const USER_COLUMNS: &str = r#"
    id,
    username,
    hash,
    name,
    role,
    user_type,
    member,
    province_id,
    ward_id,
    is_locked,
    survey_status,
    survey_time,
    created_at
"#;

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub hash: String,
    pub name: String,
    pub role: Role,
    pub user_type: Option<UserType>,
    pub member: Option<MemberKind>,
    pub province_id: Option<i32>,
    pub ward_id: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct NewSurvey {
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: bool,
    pub questions: Vec<String>,
    pub rules: Vec<(Role, Option<UserType>)>,
}

/// Outcome of persisting a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    AlreadyLocked,
}

pub async fn find_user_by_username(pool: &PgPool, username: &str) -> Result<Option<DbUser>> {
    let user = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
    ))
    .bind(username)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn find_user_by_id(pool: &PgPool, id: Uuid) -> Result<Option<DbUser>> {
    let user = sqlx::query_as::<_, DbUser>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// Users matching `filter`; `survey_status` applies to the user's last-submission flag.
pub async fn list_users(pool: &PgPool, filter: &UserFilter) -> Result<Vec<DbUser>> {
    let mut qb: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users WHERE TRUE"));
    if let Some(province_id) = filter.province_id {
        qb.push(" AND province_id = ").push_bind(province_id);
    }
    if let Some(ward_id) = filter.ward_id {
        qb.push(" AND ward_id = ").push_bind(ward_id);
    }
    if let Some(role) = filter.role {
        qb.push(" AND role = ").push_bind(role);
    }
    if let Some(user_type) = filter.user_type {
        qb.push(" AND user_type = ").push_bind(user_type);
    }
    if let Some(status) = filter.survey_status {
        qb.push(" AND survey_status = ").push_bind(status);
    }
    qb.push(" ORDER BY province_id NULLS FIRST, username");

    let users = qb.build_query_as::<DbUser>().fetch_all(pool).await?;
    Ok(users)
}

pub async fn insert_user(pool: &PgPool, user: &NewUser) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO users (id, username, hash, name, role, user_type, member, province_id, ward_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(id)
    .bind(&user.username)
    .bind(&user.hash)
    .bind(&user.name)
    .bind(user.role)
    .bind(user.user_type)
    .bind(user.member)
    .bind(user.province_id)
    .bind(user.ward_id)
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn set_user_locked(pool: &PgPool, user_id: Uuid, locked: bool) -> Result<bool> {
    let res = sqlx::query("UPDATE users SET is_locked = $1, updated_at = NOW() WHERE id = $2")
        .bind(locked)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn list_respondents(pool: &PgPool) -> Result<Vec<Respondent>> {
    let rows = sqlx::query_as::<_, Respondent>(
        r#"
        SELECT id, role, user_type, province_id, ward_id
        FROM users
        WHERE role <> 'admin'
        ORDER BY created_at ASC
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn list_provinces(pool: &PgPool) -> Result<Vec<Province>> {
    let rows = sqlx::query_as::<_, Province>("SELECT id, name, region FROM provinces ORDER BY name")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn list_wards(pool: &PgPool, province_id: i32) -> Result<Vec<Ward>> {
    let rows = sqlx::query_as::<_, Ward>(
        "SELECT id, name, province_id FROM wards WHERE province_id = $1 ORDER BY name",
    )
    .bind(province_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn ward_in_province(pool: &PgPool, ward_id: i32, province_id: i32) -> Result<bool> {
    let found: Option<i32> =
        sqlx::query_scalar("SELECT id FROM wards WHERE id = $1 AND province_id = $2")
            .bind(ward_id)
            .bind(province_id)
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}

pub async fn list_surveys(pool: &PgPool) -> Result<Vec<Survey>> {
    let rows = sqlx::query_as::<_, Survey>(
        "SELECT id, title, start_time, end_time, status FROM surveys ORDER BY start_time DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn find_survey(pool: &PgPool, survey_id: i32) -> Result<Option<Survey>> {
    let row = sqlx::query_as::<_, Survey>(
        "SELECT id, title, start_time, end_time, status FROM surveys WHERE id = $1",
    )
    .bind(survey_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn create_survey(pool: &PgPool, survey: &NewSurvey) -> Result<i32> {
    let mut tx = pool.begin().await?;

    let survey_id: i32 = sqlx::query_scalar(
        r#"
        INSERT INTO surveys (title, start_time, end_time, status)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(&survey.title)
    .bind(survey.start_time)
    .bind(survey.end_time)
    .bind(survey.status)
    .fetch_one(&mut *tx)
    .await?;

    for (idx, content) in survey.questions.iter().enumerate() {
        sqlx::query(
            "INSERT INTO questions (survey_id, question_content, order_index) VALUES ($1, $2, $3)",
        )
        .bind(survey_id)
        .bind(content)
        .bind(idx as i32)
        .execute(&mut *tx)
        .await?;
    }

    for (role, user_type) in &survey.rules {
        sqlx::query("INSERT INTO survey_access_rules (survey_id, role, user_type) VALUES ($1, $2, $3)")
            .bind(survey_id)
            .bind(*role)
            .bind(*user_type)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(survey_id)
}

pub async fn set_survey_status(pool: &PgPool, survey_id: i32, status: bool) -> Result<bool> {
    let res = sqlx::query("UPDATE surveys SET status = $1 WHERE id = $2")
        .bind(status)
        .bind(survey_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

/// Unpublishes surveys whose end time has passed. Returns how many were closed.
pub async fn close_expired_surveys(pool: &PgPool, now: DateTime<Utc>) -> Result<u64> {
    let res = sqlx::query("UPDATE surveys SET status = FALSE WHERE status = TRUE AND end_time < $1")
        .bind(now)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

pub async fn get_access_rules(pool: &PgPool, survey_id: i32) -> Result<Vec<AccessRule>> {
    let rows = sqlx::query_as::<_, AccessRule>(
        "SELECT survey_id, role, user_type FROM survey_access_rules WHERE survey_id = $1 ORDER BY id",
    )
    .bind(survey_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// All access rules keyed by survey id. Surveys without rules are absent.
pub async fn get_all_access_rules(pool: &PgPool) -> Result<HashMap<i32, Vec<AccessRule>>> {
    let rows = sqlx::query_as::<_, AccessRule>(
        "SELECT survey_id, role, user_type FROM survey_access_rules ORDER BY survey_id, id",
    )
    .fetch_all(pool)
    .await?;

    let mut out: HashMap<i32, Vec<AccessRule>> = HashMap::new();
    for rule in rows {
        out.entry(rule.survey_id).or_default().push(rule);
    }
    Ok(out)
}

pub async fn replace_access_rules(
    pool: &PgPool,
    survey_id: i32,
    rules: &[(Role, Option<UserType>)],
) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM survey_access_rules WHERE survey_id = $1")
        .bind(survey_id)
        .execute(&mut *tx)
        .await?;
    for (role, user_type) in rules {
        sqlx::query("INSERT INTO survey_access_rules (survey_id, role, user_type) VALUES ($1, $2, $3)")
            .bind(survey_id)
            .bind(*role)
            .bind(*user_type)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn get_questions(pool: &PgPool, survey_id: i32) -> Result<Vec<Question>> {
    let rows = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, survey_id, question_content
        FROM questions
        WHERE survey_id = $1
        ORDER BY order_index, id
        "#,
    )
    .bind(survey_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn find_user_survey_status(
    pool: &PgPool,
    user_id: Uuid,
    survey_id: i32,
) -> Result<Option<UserSurveyStatus>> {
    let row = sqlx::query_as::<_, UserSurveyStatus>(
        r#"
        SELECT user_id, survey_id, is_locked, survey_time, point
        FROM user_survey_status
        WHERE user_id = $1 AND survey_id = $2
        "#,
    )
    .bind(user_id)
    .bind(survey_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn list_user_statuses(pool: &PgPool, user_id: Uuid) -> Result<Vec<UserSurveyStatus>> {
    let rows = sqlx::query_as::<_, UserSurveyStatus>(
        r#"
        SELECT user_id, survey_id, is_locked, survey_time, point
        FROM user_survey_status
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn load_completions(pool: &PgPool) -> Result<CompletionIndex> {
    let rows: Vec<(Uuid, i32)> =
        sqlx::query_as("SELECT user_id, survey_id FROM user_survey_status WHERE is_locked = TRUE")
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().collect())
}

/// Stores answers, locks the per-survey status and marks the user as surveyed,
/// all in one transaction. A survey that is already locked for the user is left untouched.
pub async fn save_submission(
    pool: &PgPool,
    user_id: Uuid,
    survey_id: i32,
    submission: &ValidatedSubmission,
    now: DateTime<Utc>,
) -> Result<SaveOutcome> {
    let mut tx = pool.begin().await?;

    let locked = sqlx::query(
        r#"
        INSERT INTO user_survey_status (user_id, survey_id, is_locked, survey_time, point)
        VALUES ($1, $2, TRUE, $3, $4)
        ON CONFLICT (user_id, survey_id) DO UPDATE
        SET is_locked = TRUE, survey_time = EXCLUDED.survey_time, point = EXCLUDED.point
        WHERE user_survey_status.is_locked = FALSE
        "#,
    )
    .bind(user_id)
    .bind(survey_id)
    .bind(now)
    .bind(submission.point)
    .execute(&mut *tx)
    .await?;

    if locked.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(SaveOutcome::AlreadyLocked);
    }

    for (question_id, level) in &submission.answers {
        sqlx::query("INSERT INTO results (user_id, question_id, answer, created_at) VALUES ($1, $2, $3, $4)")
            .bind(user_id)
            .bind(*question_id)
            .bind(level.points())
            .bind(now)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query(
        "UPDATE users SET survey_status = TRUE, survey_time = $1, updated_at = NOW() WHERE id = $2",
    )
    .bind(now)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(SaveOutcome::Saved)
}

/// Per-province inputs for the yearly score. Surveys are attributed to the
/// year they start in.
pub async fn province_aggregates(pool: &PgPool, year: i32) -> Result<Vec<ProvinceAggregate>> {
    let rows = sqlx::query_as::<_, ProvinceAggregate>(
        r#"
        SELECT
            p.id,
            p.name,
            p.region,
            COALESCE((
                SELECT SUM(r.answer)
                FROM results r
                JOIN users u ON u.id = r.user_id
                JOIN questions q ON q.id = r.question_id
                JOIN surveys s ON s.id = q.survey_id
                WHERE u.province_id = p.id
                  AND EXTRACT(YEAR FROM s.start_time)::int = $1
            ), 0)::float8 AS total_point,
            (
                SELECT COUNT(*) FROM users u
                WHERE u.province_id = p.id AND u.role <> 'admin'
            ) AS total_users,
            (
                SELECT COUNT(*) FROM users u
                WHERE u.province_id = p.id AND u.member = 'TV'
            ) AS total_members,
            (
                SELECT COUNT(DISTINCT u.id)
                FROM users u
                JOIN user_survey_status uss ON uss.user_id = u.id AND uss.is_locked = TRUE
                JOIN surveys s ON s.id = uss.survey_id
                WHERE u.province_id = p.id
                  AND u.member = 'TV'
                  AND EXTRACT(YEAR FROM s.start_time)::int = $1
            ) AS members_surveyed,
            (
                SELECT COUNT(DISTINCT u.id)
                FROM users u
                JOIN user_survey_status uss ON uss.user_id = u.id AND uss.is_locked = TRUE
                JOIN surveys s ON s.id = uss.survey_id
                WHERE u.province_id = p.id
                  AND u.member = 'KTV'
                  AND EXTRACT(YEAR FROM s.start_time)::int = $1
            ) AS non_members_surveyed
        FROM provinces p
        ORDER BY p.id
        "#,
    )
    .bind(year)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Replaces the stored yearly totals with freshly scored rows.
pub async fn upsert_province_totals(pool: &PgPool, year: i32, scored: &[ScoredProvince]) -> Result<()> {
    let mut tx = pool.begin().await?;
    for row in scored {
        let p = &row.province;
        sqlx::query(
            r#"
            INSERT INTO provinces_total_point
                (year, province_id, total_point, total_users, total_members,
                 members_surveyed, non_members_surveyed, final_point, computed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            ON CONFLICT (year, province_id) DO UPDATE
            SET total_point = EXCLUDED.total_point,
                total_users = EXCLUDED.total_users,
                total_members = EXCLUDED.total_members,
                members_surveyed = EXCLUDED.members_surveyed,
                non_members_surveyed = EXCLUDED.non_members_surveyed,
                final_point = EXCLUDED.final_point,
                computed_at = NOW()
            "#,
        )
        .bind(year)
        .bind(p.id)
        .bind(p.total_point)
        .bind(p.total_users)
        .bind(p.total_members)
        .bind(p.members_surveyed)
        .bind(p.non_members_surveyed)
        .bind(row.final_point)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

#[derive(Debug, FromRow)]
struct StoredTotalRow {
    id: i32,
    name: String,
    region: Option<String>,
    total_point: f64,
    total_users: i64,
    total_members: i64,
    members_surveyed: i64,
    non_members_surveyed: i64,
    final_point: f64,
}

/// Stored ranking for `year`, best first.
pub async fn list_province_totals(pool: &PgPool, year: i32) -> Result<Vec<ScoredProvince>> {
    let rows = sqlx::query_as::<_, StoredTotalRow>(
        r#"
        SELECT
            p.id,
            p.name,
            p.region,
            t.total_point,
            t.total_users,
            t.total_members,
            t.members_surveyed,
            t.non_members_surveyed,
            t.final_point
        FROM provinces_total_point t
        JOIN provinces p ON p.id = t.province_id
        WHERE t.year = $1
        ORDER BY t.final_point DESC, p.id ASC
        "#,
    )
    .bind(year)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| ScoredProvince {
            province: ProvinceAggregate {
                id: r.id,
                name: r.name,
                region: r.region,
                total_point: r.total_point,
                total_users: r.total_users,
                total_members: r.total_members,
                members_surveyed: r.members_surveyed,
                non_members_surveyed: r.non_members_surveyed,
            },
            final_point: r.final_point,
        })
        .collect())
}
