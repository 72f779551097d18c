use crate::domain::models::Survey;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SurveyWindow {
    /// Not published.
    Draft,
    Upcoming,
    Open,
    Closed,
}

impl SurveyWindow {
    pub fn accepts_submissions(&self) -> bool {
        matches!(self, SurveyWindow::Open)
    }
}

/// A survey past its end time is `Closed` whether or not it is still
/// published, since the expiry job unpublishes it.
pub fn window_for(
    status: bool,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    now: DateTime<Utc>,
) -> SurveyWindow {
    if now > end_time {
        SurveyWindow::Closed
    } else if !status {
        SurveyWindow::Draft
    } else if now < start_time {
        SurveyWindow::Upcoming
    } else {
        SurveyWindow::Open
    }
}

impl Survey {
    pub fn window(&self, now: DateTime<Utc>) -> SurveyWindow {
        window_for(self.status, self.start_time, self.end_time, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn survey(status: bool) -> Survey {
        Survey {
            id: 1,
            title: "Đánh giá 2024".to_string(),
            start_time: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2024, 3, 31, 23, 59, 59).unwrap(),
            status,
        }
    }

    #[test]
    fn transitions_at_bounds() {
        let s = survey(true);
        assert_eq!(s.window(s.start_time - Duration::seconds(1)), SurveyWindow::Upcoming);
        assert_eq!(s.window(s.start_time), SurveyWindow::Open);
        assert_eq!(s.window(s.end_time), SurveyWindow::Open);
        assert_eq!(s.window(s.end_time + Duration::seconds(1)), SurveyWindow::Closed);
    }

    #[test]
    fn unpublished_is_draft_until_it_ends() {
        let s = survey(false);
        assert_eq!(s.window(s.start_time - Duration::days(1)), SurveyWindow::Draft);
        assert_eq!(s.window(s.start_time + Duration::days(2)), SurveyWindow::Draft);
        assert!(!SurveyWindow::Draft.accepts_submissions());
        assert!(SurveyWindow::Open.accepts_submissions());
    }

    #[test]
    fn expired_and_unpublished_reads_as_closed() {
        let s = survey(false);
        assert_eq!(s.window(s.end_time + Duration::hours(1)), SurveyWindow::Closed);
        assert!(!s.window(s.end_time + Duration::hours(1)).accepts_submissions());
    }
}
