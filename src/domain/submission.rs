use crate::domain::access;
use crate::domain::models::{AccessRule, Role, SatisfactionLevel, Survey, UserType};
use crate::domain::survey_window::SurveyWindow;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct SubmittedAnswer {
    pub question_id: i32,
    pub answer: i16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSubmission {
    pub answers: Vec<(i32, SatisfactionLevel)>,
    pub point: i32,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("survey is not accepting answers ({0:?})")]
    NotOpen(SurveyWindow),
    #[error("account is locked")]
    AccountLocked,
    #[error("survey is not addressed to this user")]
    NotApplicable,
    #[error("survey already submitted")]
    AlreadySubmitted,
    #[error("survey has no questions")]
    NoQuestions,
    #[error("question {0} does not belong to this survey")]
    UnknownQuestion(i32),
    #[error("question {0} answered more than once")]
    DuplicateAnswer(i32),
    #[error("answer {answer} for question {question_id} is not a satisfaction level")]
    InvalidAnswer { question_id: i32, answer: i16 },
    #[error("{} question(s) left unanswered", .0.len())]
    MissingAnswers(Vec<i32>),
}

/// Respondent state checked before answers are looked at.
pub struct Submitter {
    pub role: Role,
    pub user_type: Option<UserType>,
    pub is_locked: bool,
    pub already_submitted: bool,
}

pub fn check_eligibility(
    survey: &Survey,
    rules: &[AccessRule],
    submitter: &Submitter,
    now: DateTime<Utc>,
) -> Result<(), SubmissionError> {
    let window = survey.window(now);
    if !window.accepts_submissions() {
        return Err(SubmissionError::NotOpen(window));
    }
    if submitter.is_locked {
        return Err(SubmissionError::AccountLocked);
    }
    if !access::counts_toward(submitter.role, submitter.user_type, rules) {
        return Err(SubmissionError::NotApplicable);
    }
    if submitter.already_submitted {
        return Err(SubmissionError::AlreadySubmitted);
    }
    Ok(())
}

/// Every question must be answered exactly once with a valid level.
/// Answers come back in the survey's question order.
pub fn validate_answers(
    question_ids: &[i32],
    answers: &[SubmittedAnswer],
) -> Result<ValidatedSubmission, SubmissionError> {
    if question_ids.is_empty() {
        return Err(SubmissionError::NoQuestions);
    }

    let known: HashSet<i32> = question_ids.iter().copied().collect();
    let mut seen = HashSet::new();
    for a in answers {
        if !known.contains(&a.question_id) {
            return Err(SubmissionError::UnknownQuestion(a.question_id));
        }
        if !seen.insert(a.question_id) {
            return Err(SubmissionError::DuplicateAnswer(a.question_id));
        }
        if SatisfactionLevel::try_from(a.answer).is_err() {
            return Err(SubmissionError::InvalidAnswer {
                question_id: a.question_id,
                answer: a.answer,
            });
        }
    }

    let missing: Vec<i32> = question_ids
        .iter()
        .copied()
        .filter(|id| !seen.contains(id))
        .collect();
    if !missing.is_empty() {
        return Err(SubmissionError::MissingAnswers(missing));
    }

    let mut ordered = Vec::with_capacity(question_ids.len());
    for id in question_ids {
        if let Some(a) = answers.iter().find(|a| a.question_id == *id) {
            if let Ok(level) = SatisfactionLevel::try_from(a.answer) {
                ordered.push((*id, level));
            }
        }
    }
    let point = ordered.iter().map(|(_, level)| level.points() as i32).sum();

    Ok(ValidatedSubmission {
        answers: ordered,
        point,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn open_survey() -> Survey {
        let now = Utc::now();
        Survey {
            id: 4,
            title: "Khảo sát mức độ hài lòng".to_string(),
            start_time: now - Duration::days(1),
            end_time: now + Duration::days(1),
            status: true,
        }
    }

    fn submitter() -> Submitter {
        Submitter {
            role: Role::Htx,
            user_type: Some(UserType::Nn),
            is_locked: false,
            already_submitted: false,
        }
    }

    fn ans(question_id: i32, answer: i16) -> SubmittedAnswer {
        SubmittedAnswer { question_id, answer }
    }

    #[test]
    fn complete_submission_scores_sum_of_levels() {
        let out = validate_answers(&[1, 2, 3], &[ans(3, 1), ans(1, 5), ans(2, 3)]).unwrap();
        assert_eq!(out.point, 9);
        assert_eq!(
            out.answers,
            vec![
                (1, SatisfactionLevel::Satisfied),
                (2, SatisfactionLevel::Partially),
                (3, SatisfactionLevel::NotSatisfied),
            ]
        );
    }

    #[test]
    fn rejects_malformed_answer_sets() {
        assert_eq!(
            validate_answers(&[1, 2], &[ans(1, 5)]),
            Err(SubmissionError::MissingAnswers(vec![2]))
        );
        assert_eq!(
            validate_answers(&[1, 2], &[ans(1, 5), ans(1, 3), ans(2, 1)]),
            Err(SubmissionError::DuplicateAnswer(1))
        );
        assert_eq!(
            validate_answers(&[1], &[ans(1, 4)]),
            Err(SubmissionError::InvalidAnswer { question_id: 1, answer: 4 })
        );
        assert_eq!(
            validate_answers(&[1], &[ans(1, 5), ans(7, 5)]),
            Err(SubmissionError::UnknownQuestion(7))
        );
        assert_eq!(validate_answers(&[], &[]), Err(SubmissionError::NoQuestions));
    }

    #[test]
    fn eligibility_checks() {
        let survey = open_survey();
        let now = Utc::now();
        assert_eq!(check_eligibility(&survey, &[], &submitter(), now), Ok(()));

        let closed = check_eligibility(&survey, &[], &submitter(), now + Duration::days(3));
        assert_eq!(closed, Err(SubmissionError::NotOpen(SurveyWindow::Closed)));

        let rules = vec![AccessRule {
            survey_id: 4,
            role: Role::Qtd,
            user_type: None,
        }];
        assert_eq!(
            check_eligibility(&survey, &rules, &submitter(), now),
            Err(SubmissionError::NotApplicable)
        );

        let mut done = submitter();
        done.already_submitted = true;
        assert_eq!(
            check_eligibility(&survey, &[], &done, now),
            Err(SubmissionError::AlreadySubmitted)
        );

        let mut locked = submitter();
        locked.is_locked = true;
        assert_eq!(
            check_eligibility(&survey, &[], &locked, now),
            Err(SubmissionError::AccountLocked)
        );

        let admin = Submitter {
            role: Role::Admin,
            ..submitter()
        };
        assert_eq!(
            check_eligibility(&survey, &[], &admin, now),
            Err(SubmissionError::NotApplicable)
        );
    }
}
