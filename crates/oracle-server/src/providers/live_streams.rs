use super::Provider;
use crate::clients::{LiveStream, LiveStreamSource};
use async_trait::async_trait;
use oracle_core::{Artist, Category, Content, Result};
use std::collections::HashSet;
use std::sync::Arc;

const THUMB_WIDTH: &str = "1280";
const THUMB_HEIGHT: &str = "720";

pub struct LiveStreamsProvider {
    source: Arc<dyn LiveStreamSource>,
}

impl LiveStreamsProvider {
    pub fn new(source: Arc<dyn LiveStreamSource>) -> Self {
        Self { source }
    }
}

fn stream_to_content(stream: LiveStream) -> Content {
    let thumbnail = stream
        .thumbnail_url
        .replacen("{width}", THUMB_WIDTH, 1)
        .replacen("{height}", THUMB_HEIGHT, 1);
    Content {
        url: format!("https://www.twitch.tv/{}", stream.user_login),
        id: stream.id,
        artist: Artist {
            id: stream.user_login,
            name: stream.user_name,
        },
        title: stream.title,
        thumbnail,
        is_live: true,
        position: 0.0,
        remaining: 0,
        category: Category::LiveStreams,
        published_at: stream.started_at,
    }
}

#[async_trait]
impl Provider for LiveStreamsProvider {
    fn name(&self) -> &str {
        "twitch-live-streams"
    }

    async fn get_all(&self, ignored: &HashSet<String>) -> Result<Vec<Content>> {
        Ok(self
            .source
            .followed_streams()
            .await?
            .into_iter()
            .filter(|s| !ignored.contains(&s.id))
            .map(stream_to_content)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeStreams;

    #[async_trait]
    impl LiveStreamSource for FakeStreams {
        async fn followed_streams(&self) -> Result<Vec<LiveStream>> {
            Ok(vec![LiveStream {
                id: "s1".into(),
                user_login: "shroud".into(),
                user_name: "Shroud".into(),
                title: "ranked".into(),
                thumbnail_url: "https://cdn/live_user_shroud-{width}x{height}.jpg".into(),
                started_at: None,
            }])
        }
    }

    #[tokio::test]
    async fn fills_thumbnail_template_and_channel_url() {
        let provider = LiveStreamsProvider::new(Arc::new(FakeStreams));
        let content = provider.get_all(&HashSet::new()).await.unwrap();
        assert_eq!(content[0].thumbnail, "https://cdn/live_user_shroud-1280x720.jpg");
        assert_eq!(content[0].url, "https://www.twitch.tv/shroud");
        assert!(content[0].is_live);
        assert_eq!(content[0].category, Category::LiveStreams);
    }
}
