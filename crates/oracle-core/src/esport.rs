use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Team {
    pub id: i64,
    pub acronym: String,
    pub name: String,
    pub logo: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: String,
    pub tournament: String,
    pub team1: Team,
    pub team2: Team,
    pub score: String,
    pub time: DateTime<Utc>,
    pub best_of: i32,
    pub location: String,
    pub url: String,
    pub is_live: bool,
    pub game_type: String,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum DayBucket {
    Today,
    Upcoming,
    Past,
}

fn bucket(day: NaiveDate, today: NaiveDate) -> DayBucket {
    match day.cmp(&today) {
        Ordering::Equal => DayBucket::Today,
        Ordering::Greater => DayBucket::Upcoming,
        Ordering::Less => DayBucket::Past,
    }
}

/// Today's matches first, then upcoming (soonest first), then past (latest first).
pub fn sort_matches(matches: &mut [Match], now: DateTime<Utc>) {
    let today = now.date_naive();
    matches.sort_by(|a, b| {
        let (ba, bb) = (bucket(a.time.date_naive(), today), bucket(b.time.date_naive(), today));
        ba.cmp(&bb).then_with(|| match ba {
            DayBucket::Upcoming => a.time.cmp(&b.time),
            DayBucket::Today | DayBucket::Past => b.time.cmp(&a.time),
        })
    });
}
