//! Request-level rules on top of the repositories: who may write, what content
//! is acceptable, and how a single message is composed with its thread.

use tracing::debug;

use crate::error::ApiError;
use crate::models::*;
use crate::repo::Repo;
use crate::tree;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;
const MIN_SEARCH_CHARS: usize = 2;

/// Create a top-level comment or a reply on behalf of `current_user`.
///
/// The caller check happens before the store is touched. Message and parent
/// references are resolved by the store.
pub async fn create_comment(
    repo: &dyn Repo,
    current_user: Option<&Author>,
    new: NewComment,
) -> Result<Comment, ApiError> {
    let author = current_user.ok_or(ApiError::Unauthorized)?;
    let content = normalize_content(new.content.as_deref())?;
    let comment = repo
        .insert_comment(new.message_id, new.parent_id, author.clone(), content)
        .await?;
    debug!(comment_id = %comment.id, message_id = %comment.message_id, parent_id = ?comment.parent_id, "comment created");
    Ok(comment)
}

/// Fetch one message with its assembled reply forest and total comment count.
pub async fn get_message_with_comments(repo: &dyn Repo, message_id: Id) -> Result<MessageDetail, ApiError> {
    let message = repo.get_message(message_id).await?;
    let rows = repo.list_comments(message.id).await?;
    let forest = tree::assemble(rows);
    let Message { id, content, author, created_at } = message;
    Ok(MessageDetail {
        id,
        content,
        author,
        created_at,
        comments: forest.comments,
        comment_count: forest.comment_count,
    })
}

pub async fn create_message(
    repo: &dyn Repo,
    current_user: Option<&Author>,
    new: NewMessage,
) -> Result<Message, ApiError> {
    let author = current_user.ok_or(ApiError::Unauthorized)?;
    let content = normalize_content(new.content.as_deref())?;
    let message = repo.create_message(author.clone(), content).await?;
    debug!(message_id = %message.id, "message created");
    Ok(message)
}

/// Raw paging parameters as they arrive on the query string.
#[derive(Debug, Clone, Default, serde::Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// 1-based page number (default 1).
    pub page_index: Option<u32>,
    /// Messages per page, 1-100 (default 10).
    pub page_size: Option<u32>,
    /// Case-insensitive substring filter, at least 2 characters.
    pub search: Option<String>,
}

/// Page through messages, newest first. Entries carry only their comment count.
pub async fn list_messages(repo: &dyn Repo, params: ListParams) -> Result<MessagePage, ApiError> {
    let page_index = params.page_index.unwrap_or(1);
    if page_index < 1 {
        return Err(ApiError::Validation("page_index must be at least 1".into()));
    }
    let page_size = params.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(ApiError::Validation(format!("page_size must be between 1 and {MAX_PAGE_SIZE}")));
    }
    let search = match params.search.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(s) if s.chars().count() < MIN_SEARCH_CHARS => {
            return Err(ApiError::Validation("search term must be at least 2 characters".into()));
        }
        Some(s) => Some(s.to_string()),
    };

    let offset = usize::try_from(page_index - 1)
        .ok()
        .and_then(|skipped| skipped.checked_mul(page_size as usize))
        .ok_or_else(|| ApiError::Validation("page_index is too large".into()))?;
    let query = MessageQuery { search, offset, limit: page_size as usize };
    let (messages, total) = repo.list_messages(query).await?;
    Ok(MessagePage { page_index, page_size, total, messages })
}
