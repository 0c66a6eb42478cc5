//! Bucketing of weekly commit-activity data into scoring windows.

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::types::ActivityWindows;

/// Bucket weekly `(week_start_unix, commits)` pairs into 3/6/12-month
/// windows relative to `now`.
///
/// `total_commits` is left at the year total; callers overwrite it with the
/// host's all-time figure when one is available. First/last commit dates
/// only consider the trailing year, matching the window the host reports.
pub(crate) fn bucket_weeks(
    weeks: impl IntoIterator<Item = (i64, i64)>,
    now: DateTime<Utc>,
) -> ActivityWindows {
    let three_months_ago = (now - Duration::days(90)).timestamp();
    let six_months_ago = (now - Duration::days(180)).timestamp();
    let one_year_ago = (now - Duration::days(365)).timestamp();

    let mut windows = ActivityWindows::default();

    for (week_ts, commits) in weeks {
        if commits == 0 {
            continue;
        }

        if week_ts >= one_year_ago {
            windows.commits_last_year += commits;
            let week_date = Utc
                .timestamp_opt(week_ts, 0)
                .single()
                .unwrap_or_else(Utc::now);
            if windows.first_commit_date.is_none() {
                windows.first_commit_date = Some(week_date);
            }
            windows.last_commit_date = Some(week_date);
        }
        if week_ts >= six_months_ago {
            windows.commits_last_6_months += commits;
        }
        if week_ts >= three_months_ago {
            windows.commits_last_3_months += commits;
        }
    }

    windows.total_commits = windows.commits_last_year;
    windows
}
