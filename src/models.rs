use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Identifier of messages, comments and users.
pub type Id = Uuid;

/// Inclusive bounds for wish and blessing text, counted in chars after trimming.
pub const CONTENT_MIN_CHARS: usize = 3;
pub const CONTENT_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContentError {
    #[error("content is required")]
    Missing,
    #[error("content must be between 3 and 200 characters (got {0})")]
    Length(usize),
}

/// Reject text whose length falls outside the content bounds. The text is
/// measured as given; callers that accept user input go through
/// [`normalize_content`] first.
pub fn check_content_len(content: &str) -> Result<(), ContentError> {
    let n = content.chars().count();
    if (CONTENT_MIN_CHARS..=CONTENT_MAX_CHARS).contains(&n) {
        Ok(())
    } else {
        Err(ContentError::Length(n))
    }
}

/// Trim user supplied text and check its length.
pub fn normalize_content(raw: Option<&str>) -> Result<String, ContentError> {
    let trimmed = raw.ok_or(ContentError::Missing)?.trim();
    check_content_len(trimmed)?;
    Ok(trimmed.to_string())
}

/// Who wrote a wish or a blessing. Taken from the caller's token at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Author {
    pub id: Uuid,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub id: Uuid,
    pub content: String,
    pub author: Author,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewMessage {
    pub content: Option<String>,
}

/// Flat comment row. Nesting is rebuilt on read, see [`crate::tree`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Comment {
    pub id: Uuid,
    pub message_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub author: Author,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewComment {
    pub message_id: Uuid,
    pub content: Option<String>,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

/// A comment together with its replies, as returned on the single-message read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CommentNode {
    pub id: Uuid,
    pub message_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub author: Author,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub replies: Vec<CommentNode>,
}

impl CommentNode {
    pub fn new(comment: Comment, replies: Vec<CommentNode>) -> Self {
        let Comment { id, message_id, parent_id, author, content, created_at } = comment;
        Self { id, message_id, parent_id, author, content, created_at, replies }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MessageDetail {
    pub id: Uuid,
    pub content: String,
    pub author: Author,
    pub created_at: DateTime<Utc>,
    pub comments: Vec<CommentNode>,
    pub comment_count: usize,
}

/// List entry: carries the aggregate count only, never the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MessageSummary {
    pub id: Uuid,
    pub content: String,
    pub author: Author,
    pub created_at: DateTime<Utc>,
    pub comment_count: usize,
}

impl MessageSummary {
    pub fn new(message: Message, comment_count: usize) -> Self {
        let Message { id, content, author, created_at } = message;
        Self { id, content, author, created_at, comment_count }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessagePage {
    pub page_index: u32,
    pub page_size: u32,
    pub total: usize,
    pub messages: Vec<MessageSummary>,
}

/// Storage-level list query, already validated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageQuery {
    pub search: Option<String>,
    pub offset: usize,
    pub limit: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_is_trimmed_before_length_check() {
        assert_eq!(normalize_content(Some("   hi  ")), Err(ContentError::Length(2)));
        assert_eq!(normalize_content(Some("  hey ")).unwrap(), "hey");
        assert_eq!(normalize_content(None), Err(ContentError::Missing));
    }

    #[test]
    fn content_length_counts_chars_not_bytes() {
        // 200 multi-byte chars are within bounds
        let s = "愿".repeat(CONTENT_MAX_CHARS);
        assert!(check_content_len(&s).is_ok());
        let s = "愿".repeat(CONTENT_MAX_CHARS + 1);
        assert_eq!(check_content_len(&s), Err(ContentError::Length(CONTENT_MAX_CHARS + 1)));
    }
}
