use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::budget::limits::ContextWindowPolicy;
use crate::conversation::{Conversation, ConversationSummary, NewConversation, Turn};
use crate::storage::{
    normalize_title, prepare_import, sort_summaries, ConversationStore, StoreError, StoreResult,
};

const MAX_ID_LEN: usize = 128;

/// File-backed store: one `{id}.json` metadata record and one `{id}.jsonl`
/// turn log per conversation.
///
/// Turns are appended as single lines and synced before the call returns.
/// Metadata is replaced through a temporary file and a rename, so a reader
/// never observes a half-written record. If the metadata write fails after a
/// turn line was appended, the log is truncated back to its previous length.
/// Mutations of one conversation are serialized by a per-conversation lock.
#[derive(Debug)]
pub struct JsonlConversationStore {
    base_path: PathBuf,
    policy: Arc<ContextWindowPolicy>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl JsonlConversationStore {
    pub fn new(base_path: impl AsRef<Path>, policy: Arc<ContextWindowPolicy>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            policy,
            locks: DashMap::new(),
        }
    }

    /// Create the storage directory if needed.
    pub async fn init(&self) -> io::Result<()> {
        fs::create_dir_all(&self.base_path).await
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn lock_for(&self, conversation_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run `op` under the conversation's lock. A `NotFound` outcome drops the
    /// lock entry again unless another caller still holds it.
    async fn locked<T>(
        &self,
        conversation_id: &str,
        op: impl Future<Output = StoreResult<T>>,
    ) -> StoreResult<T> {
        let lock = self.lock_for(conversation_id);
        let result = {
            let _guard = lock.lock().await;
            op.await
        };
        if matches!(result, Err(StoreError::NotFound(_))) {
            drop(lock);
            self.locks
                .remove_if(conversation_id, |_, entry| Arc::strong_count(entry) == 1);
        }
        result
    }

    fn metadata_path(&self, conversation_id: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", conversation_id))
    }

    fn turns_path(&self, conversation_id: &str) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", conversation_id))
    }

    async fn read_metadata(&self, conversation_id: &str) -> StoreResult<ConversationSummary> {
        let path = self.metadata_path(conversation_id);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(conversation_id.to_string()));
            }
            Err(error) => return Err(read_failure(&path, error)),
        };
        serde_json::from_str(&content).map_err(|error| {
            StoreError::InvalidData(format!("{}: {}", path.display(), error))
        })
    }

    async fn write_metadata(&self, summary: &ConversationSummary) -> StoreResult<()> {
        let path = self.metadata_path(&summary.id);
        let tmp_path = self.base_path.join(format!("{}.json.tmp", summary.id));
        let json = serde_json::to_vec_pretty(summary)
            .map_err(|error| StoreError::WriteFailure(error.to_string()))?;

        let mut file = fs::File::create(&tmp_path)
            .await
            .map_err(|error| write_failure(&tmp_path, error))?;
        file.write_all(&json)
            .await
            .map_err(|error| write_failure(&tmp_path, error))?;
        file.sync_all()
            .await
            .map_err(|error| write_failure(&tmp_path, error))?;
        drop(file);

        fs::rename(&tmp_path, &path)
            .await
            .map_err(|error| write_failure(&path, error))
    }

    async fn read_turns(&self, conversation_id: &str) -> StoreResult<Vec<Turn>> {
        let path = self.turns_path(conversation_id);
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(read_failure(&path, error)),
        };

        let mut lines = BufReader::new(file).lines();
        let mut turns = Vec::new();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|error| read_failure(&path, error))?
        {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Turn>(&line) {
                Ok(turn) => turns.push(turn),
                Err(error) => {
                    tracing::warn!(
                        "[{}] Skipping unreadable turn record: {}",
                        conversation_id,
                        error
                    );
                }
            }
        }
        Ok(turns)
    }

    /// Replace the whole turn log.
    async fn write_turns(&self, conversation_id: &str, turns: &[Turn]) -> StoreResult<()> {
        let path = self.turns_path(conversation_id);
        let mut buffer = Vec::new();
        for turn in turns {
            serde_json::to_writer(&mut buffer, turn)
                .map_err(|error| StoreError::WriteFailure(error.to_string()))?;
            buffer.push(b'\n');
        }

        let mut file = fs::File::create(&path)
            .await
            .map_err(|error| write_failure(&path, error))?;
        file.write_all(&buffer)
            .await
            .map_err(|error| write_failure(&path, error))?;
        file.sync_data()
            .await
            .map_err(|error| write_failure(&path, error))
    }

    /// Append one turn line and return the log length before it.
    async fn append_turn_line(&self, conversation_id: &str, turn: &Turn) -> StoreResult<u64> {
        let path = self.turns_path(conversation_id);
        let mut line = serde_json::to_vec(turn)
            .map_err(|error| StoreError::WriteFailure(error.to_string()))?;
        line.push(b'\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|error| write_failure(&path, error))?;
        let previous_len = file
            .metadata()
            .await
            .map_err(|error| write_failure(&path, error))?
            .len();

        let written = async {
            file.write_all(&line).await?;
            file.sync_data().await
        }
        .await;
        if let Err(error) = written {
            drop(file);
            self.truncate_turns(conversation_id, previous_len).await;
            return Err(write_failure(&path, error));
        }
        Ok(previous_len)
    }

    /// Cut the turn log back to `len` bytes.
    async fn truncate_turns(&self, conversation_id: &str, len: u64) {
        let path = self.turns_path(conversation_id);
        let result = async {
            let file = fs::OpenOptions::new().write(true).open(&path).await?;
            file.set_len(len).await?;
            file.sync_data().await
        }
        .await;
        if let Err(error) = result {
            tracing::error!(
                "[{}] Failed to roll back turn log {}: {}",
                conversation_id,
                path.display(),
                error
            );
        }
    }

    async fn load(&self, conversation_id: &str) -> StoreResult<Conversation> {
        let summary = self.read_metadata(conversation_id).await?;
        let turns = self.read_turns(conversation_id).await?;
        Ok(Conversation::from_parts(summary, turns))
    }

    async fn persist_new(&self, conversation: &Conversation) -> StoreResult<()> {
        self.write_turns(&conversation.id, &conversation.turns).await?;
        self.write_metadata(&conversation.summary()).await
    }

    async fn exists(&self, conversation_id: &str) -> StoreResult<bool> {
        let path = self.metadata_path(conversation_id);
        fs::try_exists(&path)
            .await
            .map_err(|error| read_failure(&path, error))
    }
}

/// Ids become file names, so only a conservative character set is accepted.
fn is_valid_id(conversation_id: &str) -> bool {
    !conversation_id.is_empty()
        && conversation_id.len() <= MAX_ID_LEN
        && conversation_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn checked_id(conversation_id: &str) -> StoreResult<&str> {
    if is_valid_id(conversation_id) {
        Ok(conversation_id)
    } else {
        Err(StoreError::NotFound(conversation_id.to_string()))
    }
}

fn read_failure(path: &Path, error: io::Error) -> StoreError {
    StoreError::ReadFailure(format!("{}: {}", path.display(), error))
}

fn write_failure(path: &Path, error: io::Error) -> StoreError {
    StoreError::WriteFailure(format!("{}: {}", path.display(), error))
}

#[async_trait]
impl ConversationStore for JsonlConversationStore {
    async fn create_with(&self, request: NewConversation) -> StoreResult<Conversation> {
        let conversation = request.build(&self.policy)?;
        let lock = self.lock_for(&conversation.id);
        let _guard = lock.lock().await;

        self.persist_new(&conversation).await?;
        tracing::debug!(
            "[{}] Created conversation for model {}",
            conversation.id,
            conversation.model_id
        );
        Ok(conversation)
    }

    async fn append(&self, conversation_id: &str, turn: Turn) -> StoreResult<Conversation> {
        let conversation_id = checked_id(conversation_id)?;
        self.locked(conversation_id, async {
            let mut conversation = self.load(conversation_id).await?;
            conversation.add_turn(turn)?;
            let Some(appended) = conversation.last_turn() else {
                return Err(StoreError::WriteFailure(
                    "turn missing after append".to_string(),
                ));
            };

            let previous_len = self.append_turn_line(conversation_id, appended).await?;
            if let Err(error) = self.write_metadata(&conversation.summary()).await {
                self.truncate_turns(conversation_id, previous_len).await;
                return Err(error);
            }
            Ok(conversation)
        })
        .await
    }

    async fn get(&self, conversation_id: &str) -> StoreResult<Conversation> {
        let conversation_id = checked_id(conversation_id)?;
        self.locked(conversation_id, self.load(conversation_id))
            .await
    }

    async fn list(&self) -> StoreResult<Vec<ConversationSummary>> {
        let mut entries = match fs::read_dir(&self.base_path).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(read_failure(&self.base_path, error)),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|error| read_failure(&self.base_path, error))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(conversation_id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if !is_valid_id(conversation_id) {
                continue;
            }
            match self.read_metadata(conversation_id).await {
                Ok(summary) => summaries.push(summary),
                // Deleted between read_dir and read
                Err(StoreError::NotFound(_)) => {}
                Err(error) => {
                    tracing::warn!("Skipping unreadable conversation {}: {}", path.display(), error);
                }
            }
        }

        sort_summaries(&mut summaries);
        Ok(summaries)
    }

    async fn delete(&self, conversation_id: &str) -> StoreResult<bool> {
        if !is_valid_id(conversation_id) {
            return Ok(false);
        }
        let lock = self.lock_for(conversation_id);
        let guard = lock.lock().await;

        let mut deleted_any = false;
        for path in [
            self.metadata_path(conversation_id),
            self.turns_path(conversation_id),
        ] {
            match fs::remove_file(&path).await {
                Ok(()) => deleted_any = true,
                Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                Err(error) => return Err(write_failure(&path, error)),
            }
        }

        drop(guard);
        self.locks.remove(conversation_id);
        if deleted_any {
            tracing::debug!("[{}] Deleted conversation", conversation_id);
        }
        Ok(deleted_any)
    }

    async fn rename(&self, conversation_id: &str, title: &str) -> StoreResult<Conversation> {
        let conversation_id = checked_id(conversation_id)?;
        let title = normalize_title(title)?;
        self.locked(conversation_id, async {
            let mut conversation = self.load(conversation_id).await?;
            conversation.title = title;
            conversation.updated_at = Utc::now();
            self.write_metadata(&conversation.summary()).await?;
            Ok::<_, StoreError>(conversation)
        })
        .await
    }

    async fn import(&self, conversation: Conversation) -> StoreResult<Conversation> {
        let conversation = prepare_import(conversation)?;
        if !is_valid_id(&conversation.id) {
            return Err(StoreError::InvalidData(format!(
                "invalid conversation id: {}",
                conversation.id
            )));
        }
        let lock = self.lock_for(&conversation.id);
        let _guard = lock.lock().await;

        if self.exists(&conversation.id).await? {
            return Err(StoreError::AlreadyExists(conversation.id));
        }
        self.persist_new(&conversation).await?;
        Ok(conversation)
    }
}
