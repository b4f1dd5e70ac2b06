use async_trait::async_trait;

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    /// Names the missing thing, e.g. "message" or "parent comment".
    #[error("{0} not found")] NotFound(&'static str),
    #[error("{0}")] Validation(String),
    #[error("storage error: {0}")] Internal(String),
}

impl From<ContentError> for RepoError {
    fn from(e: ContentError) -> Self {
        RepoError::Validation(e.to_string())
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait MessageRepo: Send + Sync {
    async fn create_message(&self, author: Author, content: String) -> RepoResult<Message>;
    async fn get_message(&self, id: Id) -> RepoResult<Message>;
    /// Newest first. Returns the requested page and the total number of matches.
    async fn list_messages(&self, query: MessageQuery) -> RepoResult<(Vec<MessageSummary>, usize)>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    /// Append one comment. The message and, when given, the parent (which must
    /// belong to the same message) are checked atomically with the append.
    async fn insert_comment(
        &self,
        message_id: Id,
        parent_id: Option<Id>,
        author: Author,
        content: String,
    ) -> RepoResult<Comment>;
    /// All comments of one message in insertion order.
    async fn list_comments(&self, message_id: Id) -> RepoResult<Vec<Comment>>;
}

pub trait Repo: MessageRepo + CommentRepo {}

impl<T> Repo for T where T: MessageRepo + CommentRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use std::io::ErrorKind;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
    use uuid::Uuid;

    const SNAPSHOT_FILE: &str = "state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        messages: Vec<Message>,
        // append-only; position is insertion order
        comments: Vec<Comment>,
    }

    /// On-disk copy of the state. Writers serialize on `write_lock` so a newer
    /// snapshot is never replaced by an older one.
    struct Snapshot {
        path: PathBuf,
        write_lock: Mutex<()>,
    }

    impl Snapshot {
        fn write(&self, state: &RwLock<State>) {
            let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
            let bytes = match state.read() {
                Ok(s) => serde_json::to_vec(&*s),
                Err(_) => {
                    log::error!("state lock poisoned; snapshot skipped");
                    return;
                }
            };
            let bytes = match bytes {
                Ok(b) => b,
                Err(e) => {
                    log::error!("failed to encode snapshot: {e}");
                    return;
                }
            };
            if let Some(dir) = self.path.parent() {
                if let Err(e) = std::fs::create_dir_all(dir) {
                    log::error!("failed to create snapshot dir '{}': {e}", dir.display());
                    return;
                }
            }
            // write aside, then rename over the live file
            let tmp = self.path.with_extension("json.tmp");
            if let Err(e) = std::fs::write(&tmp, bytes).and_then(|_| std::fs::rename(&tmp, &self.path)) {
                log::error!("failed to write snapshot '{}': {e}", self.path.display());
            }
        }
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot: Option<Arc<Snapshot>>,
    }

    impl InMemRepo {
        /// Store without a snapshot file; state lives and dies with the process.
        pub fn ephemeral() -> Self {
            Self { state: Arc::new(RwLock::new(State::default())), snapshot: None }
        }

        /// Store persisted to `<data_dir>/state.json`, reloading it when present.
        ///
        /// An unparsable snapshot is renamed to `state.json.corrupt-<timestamp>`
        /// before starting empty; if that rename fails the store refuses to open.
        pub fn with_data_dir(data_dir: impl AsRef<Path>) -> RepoResult<Self> {
            let path = data_dir.as_ref().join(SNAPSHOT_FILE);
            let state = Self::load_state_from(&path)?;
            let snapshot = Snapshot { path, write_lock: Mutex::new(()) };
            Ok(Self { state: Arc::new(RwLock::new(state)), snapshot: Some(Arc::new(snapshot)) })
        }

        fn load_state_from(path: &Path) -> RepoResult<State> {
            let bytes = match std::fs::read(path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    log::info!("no snapshot at '{}'. Starting empty.", path.display());
                    return Ok(State::default());
                }
                Err(e) => {
                    return Err(RepoError::Internal(format!("cannot read snapshot '{}': {e}", path.display())));
                }
            };
            match serde_json::from_slice::<State>(&bytes) {
                Ok(s) => {
                    log::info!("loaded snapshot '{}' ({} messages, {} comments)", path.display(), s.messages.len(), s.comments.len());
                    Ok(s)
                }
                Err(e) => {
                    let aside = path.with_file_name(format!(
                        "{SNAPSHOT_FILE}.corrupt-{}",
                        Utc::now().format("%Y%m%dT%H%M%S%.f")
                    ));
                    std::fs::rename(path, &aside).map_err(|re| {
                        RepoError::Internal(format!(
                            "snapshot '{}' is unreadable ({e}) and could not be moved aside: {re}",
                            path.display()
                        ))
                    })?;
                    log::warn!("failed to parse snapshot '{}': {e}. Moved to '{}', starting empty.", path.display(), aside.display());
                    Ok(State::default())
                }
            }
        }

        // Runs after the write lock is released; the blocking pool does the I/O.
        async fn persist(&self) {
            let Some(snapshot) = self.snapshot.clone() else { return };
            let state = Arc::clone(&self.state);
            if let Err(e) = actix_web::web::block(move || snapshot.write(&state)).await {
                log::error!("snapshot task failed: {e}");
            }
        }

        fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self { Self::ephemeral() }
    }

    #[async_trait]
    impl MessageRepo for InMemRepo {
        async fn create_message(&self, author: Author, content: String) -> RepoResult<Message> {
            check_content_len(&content)?;
            let message = Message { id: Uuid::new_v4(), content, author, created_at: Utc::now() };
            self.write()?.messages.push(message.clone());
            self.persist().await;
            Ok(message)
        }

        async fn get_message(&self, id: Id) -> RepoResult<Message> {
            let s = self.read()?;
            s.messages.iter().find(|m| m.id == id).cloned().ok_or(RepoError::NotFound("message"))
        }

        async fn list_messages(&self, query: MessageQuery) -> RepoResult<(Vec<MessageSummary>, usize)> {
            let s = self.read()?;
            let needle = query.search.as_deref().map(str::to_lowercase);
            let mut hits: Vec<(usize, &Message)> = s.messages
                .iter()
                .enumerate()
                .filter(|(_, m)| needle.as_deref().map_or(true, |n| m.content.to_lowercase().contains(n)))
                .collect();
            hits.sort_by(|(ia, a), (ib, b)| b.created_at.cmp(&a.created_at).then(ib.cmp(ia)));
            let total = hits.len();
            let page = hits
                .into_iter()
                .skip(query.offset)
                .take(query.limit)
                .map(|(_, m)| {
                    let count = s.comments.iter().filter(|c| c.message_id == m.id).count();
                    MessageSummary::new(m.clone(), count)
                })
                .collect();
            Ok((page, total))
        }
    }

    #[async_trait]
    impl CommentRepo for InMemRepo {
        async fn insert_comment(
            &self,
            message_id: Id,
            parent_id: Option<Id>,
            author: Author,
            content: String,
        ) -> RepoResult<Comment> {
            check_content_len(&content)?;
            let comment = {
                let mut s = self.write()?;
                if !s.messages.iter().any(|m| m.id == message_id) {
                    return Err(RepoError::NotFound("message"));
                }
                if let Some(pid) = parent_id {
                    let same_message = s.comments.iter().any(|c| c.id == pid && c.message_id == message_id);
                    if !same_message {
                        return Err(RepoError::NotFound("parent comment"));
                    }
                }
                let comment = Comment {
                    id: Uuid::new_v4(),
                    message_id,
                    parent_id,
                    author,
                    content,
                    created_at: Utc::now(),
                };
                s.comments.push(comment.clone());
                comment
            };
            self.persist().await;
            Ok(comment)
        }

        async fn list_comments(&self, message_id: Id) -> RepoResult<Vec<Comment>> {
            let s = self.read()?;
            Ok(s.comments.iter().filter(|c| c.message_id == message_id).cloned().collect())
        }
    }
}

#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use chrono::{DateTime, Utc};
    use sqlx::{Pool, Postgres};

    fn internal(e: sqlx::Error) -> RepoError {
        RepoError::Internal(e.to_string())
    }

    /// Escape LIKE metacharacters so the search term matches literally.
    fn like_pattern(term: &str) -> String {
        let mut out = String::with_capacity(term.len() + 2);
        out.push('%');
        for ch in term.chars() {
            if matches!(ch, '%' | '_' | '\\') {
                out.push('\\');
            }
            out.push(ch);
        }
        out.push('%');
        out
    }

    #[derive(sqlx::FromRow)]
    struct MessageRow {
        id: Id,
        content: String,
        author_id: Id,
        author_username: String,
        author_display_name: Option<String>,
        created_at: DateTime<Utc>,
    }

    impl From<MessageRow> for Message {
        fn from(r: MessageRow) -> Self {
            Message {
                id: r.id,
                content: r.content,
                author: Author { id: r.author_id, username: r.author_username, display_name: r.author_display_name },
                created_at: r.created_at,
            }
        }
    }

    #[derive(sqlx::FromRow)]
    struct SummaryRow {
        #[sqlx(flatten)]
        message: MessageRow,
        comment_count: i64,
    }

    #[derive(sqlx::FromRow)]
    struct CommentRow {
        id: Id,
        message_id: Id,
        parent_id: Option<Id>,
        author_id: Id,
        author_username: String,
        author_display_name: Option<String>,
        content: String,
        created_at: DateTime<Utc>,
    }

    impl From<CommentRow> for Comment {
        fn from(r: CommentRow) -> Self {
            Comment {
                id: r.id,
                message_id: r.message_id,
                parent_id: r.parent_id,
                author: Author { id: r.author_id, username: r.author_username, display_name: r.author_display_name },
                content: r.content,
                created_at: r.created_at,
            }
        }
    }

    const MESSAGE_COLS: &str = "m.id, m.content, m.author_id, m.author_username, m.author_display_name, m.created_at";
    const COMMENT_COLS: &str = "id, message_id, parent_id, author_id, author_username, author_display_name, content, created_at";

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        /// Apply the schema under `migrations/`.
        pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
            sqlx::migrate!("./migrations").run(&self.pool).await
        }
    }

    #[async_trait]
    impl MessageRepo for PgRepo {
        async fn create_message(&self, author: Author, content: String) -> RepoResult<Message> {
            check_content_len(&content)?;
            let sql = format!(
                "INSERT INTO messages AS m (id, content, author_id, author_username, author_display_name) \
                 VALUES ($1,$2,$3,$4,$5) RETURNING {MESSAGE_COLS}"
            );
            let row = sqlx::query_as::<_, MessageRow>(&sql)
                .bind(uuid::Uuid::new_v4())
                .bind(&content)
                .bind(author.id)
                .bind(&author.username)
                .bind(author.display_name.as_ref())
                .fetch_one(&self.pool).await.map_err(internal)?;
            Ok(row.into())
        }

        async fn get_message(&self, id: Id) -> RepoResult<Message> {
            let sql = format!("SELECT {MESSAGE_COLS} FROM messages m WHERE m.id = $1");
            sqlx::query_as::<_, MessageRow>(&sql)
                .bind(id)
                .fetch_optional(&self.pool).await.map_err(internal)?
                .map(Message::from)
                .ok_or(RepoError::NotFound("message"))
        }

        async fn list_messages(&self, query: MessageQuery) -> RepoResult<(Vec<MessageSummary>, usize)> {
            let pattern = query.search.as_deref().map(like_pattern);
            let total: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM messages m WHERE ($1::text IS NULL OR m.content ILIKE $1)"
            )
                .bind(pattern.as_ref())
                .fetch_one(&self.pool).await.map_err(internal)?;
            let sql = format!(r#"
                SELECT {MESSAGE_COLS},
                       (SELECT COUNT(*) FROM comments c WHERE c.message_id = m.id) AS comment_count
                FROM messages m
                WHERE ($1::text IS NULL OR m.content ILIKE $1)
                ORDER BY m.created_at DESC, m.seq DESC
                LIMIT $2 OFFSET $3
            "#);
            let rows = sqlx::query_as::<_, SummaryRow>(&sql)
                .bind(pattern.as_ref())
                .bind(query.limit as i64)
                .bind(query.offset as i64)
                .fetch_all(&self.pool).await.map_err(internal)?;
            let page = rows
                .into_iter()
                .map(|r| MessageSummary::new(r.message.into(), r.comment_count as usize))
                .collect();
            Ok((page, total as usize))
        }
    }

    #[async_trait]
    impl CommentRepo for PgRepo {
        async fn insert_comment(
            &self,
            message_id: Id,
            parent_id: Option<Id>,
            author: Author,
            content: String,
        ) -> RepoResult<Comment> {
            check_content_len(&content)?;
            let mut tx = self.pool.begin().await.map_err(internal)?;
            let message: Option<Id> = sqlx::query_scalar("SELECT id FROM messages WHERE id = $1 FOR SHARE")
                .bind(message_id)
                .fetch_optional(&mut *tx).await.map_err(internal)?;
            if message.is_none() {
                return Err(RepoError::NotFound("message"));
            }
            if let Some(pid) = parent_id {
                let owner: Option<Id> = sqlx::query_scalar("SELECT message_id FROM comments WHERE id = $1 FOR SHARE")
                    .bind(pid)
                    .fetch_optional(&mut *tx).await.map_err(internal)?;
                if owner != Some(message_id) {
                    return Err(RepoError::NotFound("parent comment"));
                }
            }
            let sql = format!(
                "INSERT INTO comments (id, message_id, parent_id, author_id, author_username, author_display_name, content) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7) RETURNING {COMMENT_COLS}"
            );
            let row = sqlx::query_as::<_, CommentRow>(&sql)
                .bind(uuid::Uuid::new_v4())
                .bind(message_id)
                .bind(parent_id)
                .bind(author.id)
                .bind(&author.username)
                .bind(author.display_name.as_ref())
                .bind(&content)
                .fetch_one(&mut *tx).await.map_err(internal)?;
            tx.commit().await.map_err(internal)?;
            Ok(row.into())
        }

        async fn list_comments(&self, message_id: Id) -> RepoResult<Vec<Comment>> {
            let sql = format!("SELECT {COMMENT_COLS} FROM comments WHERE message_id = $1 ORDER BY seq ASC");
            let rows = sqlx::query_as::<_, CommentRow>(&sql)
                .bind(message_id)
                .fetch_all(&self.pool).await.map_err(internal)?;
            Ok(rows.into_iter().map(Comment::from).collect())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::like_pattern;

        #[test]
        fn like_pattern_escapes_wildcards() {
            assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        }
    }
}
