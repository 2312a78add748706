//! Document collections holding raw sensor records.

use crate::error::TrainingResult;
use crate::frame::Frame;
use rusqlite::{Connection, params};
use serde_json::{Map, Number, Value};
use std::sync::Mutex;
use tracing::{debug, info};

/// One raw record; key order is preserved from the store.
pub type Document = Map<String, Value>;

pub const IN_MEMORY_URI: &str = ":memory:";

pub trait DocumentStore: Send + Sync {
    fn collection(&self) -> &str;

    /// Every document in insertion order.
    fn find(&self) -> TrainingResult<Vec<Document>>;

    /// Append documents; returns how many were written.
    fn insert_many(&self, documents: &[Document]) -> TrainingResult<usize>;
}

/// SQLite-backed collection. Documents are stored as JSON text and read back
/// in insertion order.
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
    collection: String,
}

impl std::fmt::Debug for SqliteDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDocumentStore").field("collection", &self.collection).finish_non_exhaustive()
    }
}

impl SqliteDocumentStore {
    /// Open the database at `uri` (`:memory:` for a private in-memory store).
    pub fn connect(uri: &str, collection: &str) -> TrainingResult<Self> {
        let conn = if uri == IN_MEMORY_URI { Connection::open_in_memory()? } else { Connection::open(uri)? };
        let store = Self { conn: Mutex::new(conn), collection: collection.to_string() };
        store.init_schema()?;
        debug!(uri, collection, "document store connected");
        Ok(store)
    }

    fn init_schema(&self) -> TrainingResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                r"
                CREATE TABLE IF NOT EXISTS documents (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    collection TEXT NOT NULL,
                    body TEXT NOT NULL
                )
                ",
                [],
            )?;
            conn.execute("CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection, seq)", [])?;
            Ok(())
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> TrainingResult<T>) -> TrainingResult<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| crate::error::TrainingError::Config("document store lock poisoned".to_string()))?;
        f(&mut conn)
    }

    pub fn count(&self) -> TrainingResult<usize> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM documents WHERE collection = ?1",
                params![self.collection],
                |row| row.get(0),
            )?;
            Ok(n.max(0) as usize)
        })
    }

    /// Remove every document of this collection.
    pub fn clear(&self) -> TrainingResult<usize> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM documents WHERE collection = ?1", params![self.collection])?))
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    fn find(&self) -> TrainingResult<Vec<Document>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT body FROM documents WHERE collection = ?1 ORDER BY seq")?;
            let bodies = stmt.query_map(params![self.collection], |row| row.get::<_, String>(0))?;
            let mut documents = Vec::new();
            for body in bodies {
                documents.push(serde_json::from_str::<Document>(&body?)?);
            }
            Ok(documents)
        })
    }

    fn insert_many(&self, documents: &[Document]) -> TrainingResult<usize> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare("INSERT INTO documents (collection, body) VALUES (?1, ?2)")?;
                for doc in documents {
                    stmt.execute(params![self.collection, serde_json::to_string(doc)?])?;
                }
            }
            tx.commit()?;
            info!(collection = %self.collection, inserted = documents.len(), "documents inserted");
            Ok(documents.len())
        })
    }
}

/// Process-local collection.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collection: String,
    documents: Mutex<Vec<Document>>,
}

impl MemoryDocumentStore {
    pub fn new(collection: &str) -> Self {
        Self { collection: collection.to_string(), documents: Mutex::new(Vec::new()) }
    }

    pub fn with_documents(collection: &str, documents: Vec<Document>) -> Self {
        Self { collection: collection.to_string(), documents: Mutex::new(documents) }
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    fn find(&self) -> TrainingResult<Vec<Document>> {
        Ok(self.documents.lock().map(|d| d.to_vec()).unwrap_or_default())
    }

    fn insert_many(&self, documents: &[Document]) -> TrainingResult<usize> {
        if let Ok(mut stored) = self.documents.lock() {
            stored.extend_from_slice(documents);
        }
        Ok(documents.len())
    }
}

/// One document per frame row; missing cells become JSON `null`.
pub fn documents_from_frame(frame: &Frame) -> Vec<Document> {
    frame
        .rows()
        .iter()
        .map(|row| {
            frame
                .columns()
                .iter()
                .zip(row)
                .map(|(name, cell)| {
                    let value = cell.and_then(Number::from_f64).map_or(Value::Null, Value::Number);
                    (name.clone(), value)
                })
                .collect()
        })
        .collect()
}
