//! Shared fixtures for the integration tests.

use chrono::Utc;
use realtime_service::events::{CommentView, Event, PostView};
use std::time::Duration;

/// Generous upper bound for anything that should happen "promptly".
pub const PROMPT: Duration = Duration::from_secs(2);

pub fn comment(id: &str) -> Event {
    let now = Utc::now();
    Event::NewComment(CommentView {
        id: id.to_string(),
        blog_post_id: "post-1".to_string(),
        author_id: "author-1".to_string(),
        content: format!("comment {id}"),
        parent_id: None,
        created_at: now,
        updated_at: now,
    })
}

pub fn post(id: &str) -> Event {
    Event::NewPost(PostView {
        id: id.to_string(),
        title: format!("Post {id}"),
        content: "body".to_string(),
        author_id: Some("author-1".to_string()),
    })
}
