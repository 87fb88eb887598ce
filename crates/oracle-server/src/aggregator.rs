use crate::clients::MatchSource;
use crate::providers::{HistoryFeed, Provider};
use futures::future::{join_all, BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use oracle_core::clock::Clock;
use oracle_core::esport::{sort_matches, Match};
use oracle_core::{Content, Result};
use std::sync::Arc;
use tracing::{debug, warn};

/// Adapters queried at once after history has been read.
pub const FAN_OUT_WIDTH: usize = 4;

/// History first (its ids become the ignore set), then every other adapter
/// through a bounded pool. One failing adapter only costs its own results.
pub struct ProviderAggregator {
    history: Arc<dyn HistoryFeed>,
    providers: Vec<Arc<dyn Provider>>,
}

impl ProviderAggregator {
    pub fn new(history: Arc<dyn HistoryFeed>, providers: Vec<Arc<dyn Provider>>) -> Self {
        Self { history, providers }
    }

    pub async fn get_all(&self) -> Result<Vec<Content>> {
        let batch = self.history.history().await?;
        let ignored = batch.ignored_ids();
        let mut merged = batch.content;

        let ignored_ref = &ignored;
        let tasks: Vec<BoxFuture<'_, Vec<Content>>> = self
            .providers
            .iter()
            .map(|provider| {
                async move {
                    match provider.get_all(ignored_ref).await {
                        Ok(mut content) => {
                            content.retain(|c| !ignored_ref.contains(&c.id));
                            debug!(provider = provider.name(), count = content.len(), "Provider done");
                            content
                        }
                        Err(e) => {
                            warn!(error = %e, provider = provider.name(), "Provider failed, skipping");
                            Vec::new()
                        }
                    }
                }
                .boxed()
            })
            .collect();

        let partials: Vec<Vec<Content>> = stream::iter(tasks)
            .buffer_unordered(FAN_OUT_WIDTH)
            .collect()
            .await;

        for partial in partials {
            merged.extend(partial);
        }
        Ok(merged)
    }
}

pub struct EsportAggregator {
    sources: Vec<Arc<dyn MatchSource>>,
    clock: Arc<dyn Clock>,
}

impl EsportAggregator {
    pub fn new(sources: Vec<Arc<dyn MatchSource>>, clock: Arc<dyn Clock>) -> Self {
        Self { sources, clock }
    }

    pub async fn get_all(&self) -> Result<Vec<Match>> {
        let results = join_all(self.sources.iter().map(|s| s.get_matches())).await;

        let mut matches = Vec::new();
        for (source, result) in self.sources.iter().zip(results) {
            match result {
                Ok(found) => matches.extend(found),
                Err(e) => warn!(error = %e, source = source.name(), "Match source failed"),
            }
        }
        sort_matches(&mut matches, self.clock.now());
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::HistoryBatch;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use oracle_core::clock::ManualClock;
    use oracle_core::esport::Team;
    use oracle_core::{AppError, Artist, Category};
    use std::collections::HashSet;
    use std::sync::Mutex;

    fn content(id: &str, category: Category) -> Content {
        Content {
            id: id.into(),
            artist: Artist::default(),
            title: id.into(),
            thumbnail: String::new(),
            url: String::new(),
            is_live: false,
            position: 0.0,
            remaining: 0,
            category,
            published_at: None,
        }
    }

    struct FakeHistory {
        fail: bool,
    }

    #[async_trait]
    impl HistoryFeed for FakeHistory {
        async fn history(&self) -> Result<HistoryBatch> {
            if self.fail {
                return Err(AppError::Upstream("history server down".into()));
            }
            Ok(HistoryBatch {
                content: vec![content("h1", Category::History)],
                seen_ids: ["h1".to_string(), "watched".to_string()].into(),
            })
        }
    }

    struct FakeProvider {
        name: String,
        result: std::result::Result<Vec<&'static str>, &'static str>,
        received: Mutex<Option<HashSet<String>>>,
    }

    impl FakeProvider {
        fn ok(name: &str, ids: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                result: Ok(ids),
                received: Mutex::new(None),
            })
        }

        fn failing(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                result: Err("quota exceeded"),
                received: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl Provider for FakeProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn get_all(&self, ignored: &HashSet<String>) -> Result<Vec<Content>> {
            *self.received.lock().unwrap() = Some(ignored.clone());
            match &self.result {
                Ok(ids) => Ok(ids.iter().map(|id| content(id, Category::Suggestions)).collect()),
                Err(msg) => Err(AppError::Upstream(msg.to_string())),
            }
        }
    }

    fn ids(content: &[Content]) -> HashSet<&str> {
        content.iter().map(|c| c.id.as_str()).collect()
    }

    #[tokio::test]
    async fn failing_adapter_is_skipped() {
        let aggregator = ProviderAggregator::new(
            Arc::new(FakeHistory { fail: false }),
            vec![
                FakeProvider::ok("one", vec!["p1"]),
                FakeProvider::failing("two"),
                FakeProvider::ok("three", vec!["p3a", "p3b"]),
                FakeProvider::ok("four", vec!["p4"]),
            ],
        );
        let merged = aggregator.get_all().await.unwrap();
        assert_eq!(ids(&merged), HashSet::from(["h1", "p1", "p3a", "p3b", "p4"]));
    }

    #[tokio::test]
    async fn history_failure_is_fatal() {
        let aggregator = ProviderAggregator::new(
            Arc::new(FakeHistory { fail: true }),
            vec![FakeProvider::ok("one", vec!["p1"])],
        );
        assert!(aggregator.get_all().await.is_err());
    }

    #[tokio::test]
    async fn every_adapter_gets_the_same_ignore_set() {
        let a = FakeProvider::ok("a", vec![]);
        let b = FakeProvider::ok("b", vec![]);
        let aggregator = ProviderAggregator::new(
            Arc::new(FakeHistory { fail: false }),
            vec![a.clone(), b.clone()],
        );
        aggregator.get_all().await.unwrap();
        let expected: HashSet<String> = ["h1".to_string(), "watched".to_string()].into();
        assert_eq!(a.received.lock().unwrap().as_ref(), Some(&expected));
        assert_eq!(b.received.lock().unwrap().as_ref(), Some(&expected));
    }

    #[tokio::test]
    async fn ignored_ids_never_leak_from_adapters() {
        let aggregator = ProviderAggregator::new(
            Arc::new(FakeHistory { fail: false }),
            vec![FakeProvider::ok("leaky", vec!["watched", "fresh"])],
        );
        let merged = aggregator.get_all().await.unwrap();
        assert_eq!(ids(&merged), HashSet::from(["h1", "fresh"]));
    }

    #[tokio::test]
    async fn runs_inside_a_spawned_task() {
        let aggregator = Arc::new(ProviderAggregator::new(
            Arc::new(FakeHistory { fail: false }),
            vec![FakeProvider::ok("one", vec!["p1"]), FakeProvider::ok("two", vec!["p2"])],
        ));
        let handle = tokio::spawn({
            let aggregator = Arc::clone(&aggregator);
            async move { aggregator.get_all().await }
        });
        let merged = handle.await.unwrap().unwrap();
        assert_eq!(ids(&merged), HashSet::from(["h1", "p1", "p2"]));
    }

    fn fixture(id: &str, time: DateTime<Utc>) -> Match {
        let team = |n: i64| Team {
            id: n,
            acronym: format!("T{n}"),
            name: format!("Team {n}"),
            logo: String::new(),
        };
        Match {
            id: id.into(),
            tournament: "Major".into(),
            team1: team(1),
            team2: team(2),
            score: String::new(),
            time,
            best_of: 3,
            location: String::new(),
            url: String::new(),
            is_live: false,
            game_type: "cs2".into(),
            modified_at: time,
        }
    }

    struct FakeMatches {
        matches: Option<Vec<Match>>,
    }

    #[async_trait]
    impl MatchSource for FakeMatches {
        fn name(&self) -> &str {
            "fake"
        }

        async fn get_matches(&self) -> Result<Vec<Match>> {
            self.matches
                .clone()
                .ok_or_else(|| AppError::Upstream("feed down".into()))
        }
    }

    #[tokio::test]
    async fn esport_merges_sources_and_orders_by_day() {
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
        let aggregator = EsportAggregator::new(
            vec![
                Arc::new(FakeMatches {
                    matches: Some(vec![
                        fixture("past", now - Duration::days(2)),
                        fixture("today", now + Duration::hours(2)),
                    ]),
                }),
                Arc::new(FakeMatches { matches: None }),
                Arc::new(FakeMatches {
                    matches: Some(vec![fixture("soon", now + Duration::days(1))]),
                }),
            ],
            Arc::new(ManualClock::new(now)),
        );
        let matches = aggregator.get_all().await.unwrap();
        let ids: Vec<_> = matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["today", "soon", "past"]);
    }
}
