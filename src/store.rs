use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{QueryBridgeError, Result};
use crate::models::DatabaseSchema;

/// Persists the single current [`DatabaseSchema`].
#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Replace whatever is stored with `schema`
    async fn put(&self, schema: &DatabaseSchema) -> Result<()>;
    /// The current schema, if any index run has completed
    async fn get(&self) -> Result<Option<DatabaseSchema>>;
}

const CURRENT_KEY: &[u8] = b"current";

/// Schema store backed by an embedded sled tree
pub struct SledSchemaStore {
    tree: sled::Tree,
}

impl SledSchemaStore {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;
        let db = sled::open(path)?;
        let tree = db.open_tree("schemas")?;
        Ok(Self { tree })
    }

    /// Remove the stored document
    pub fn clear(&self) -> Result<()> {
        self.tree.clear()?;
        self.tree.flush()?;
        Ok(())
    }
}

#[async_trait]
impl SchemaStore for SledSchemaStore {
    async fn put(&self, schema: &DatabaseSchema) -> Result<()> {
        // One fixed key: the insert swaps the whole document atomically.
        let data = bincode::serialize(schema)?;
        self.tree.insert(CURRENT_KEY, data)?;
        self.tree.flush_async().await?;
        Ok(())
    }

    async fn get(&self) -> Result<Option<DatabaseSchema>> {
        match self.tree.get(CURRENT_KEY)? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }
}

/// In-process schema store
#[derive(Default)]
pub struct MemorySchemaStore {
    current: RwLock<Option<DatabaseSchema>>,
}

impl MemorySchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a schema
    pub fn with_schema(schema: DatabaseSchema) -> Self {
        Self { current: RwLock::new(Some(schema)) }
    }
}

#[async_trait]
impl SchemaStore for MemorySchemaStore {
    async fn put(&self, schema: &DatabaseSchema) -> Result<()> {
        let mut current = self
            .current
            .write()
            .map_err(|_| QueryBridgeError::Store("schema lock poisoned".to_string()))?;
        *current = Some(schema.clone());
        Ok(())
    }

    async fn get(&self) -> Result<Option<DatabaseSchema>> {
        let current = self
            .current
            .read()
            .map_err(|_| QueryBridgeError::Store("schema lock poisoned".to_string()))?;
        Ok(current.clone())
    }
}
