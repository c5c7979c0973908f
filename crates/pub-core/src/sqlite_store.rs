//! SQLite-based persistent storage.
//!
//! Two tables: `Self` holds the single local identity row and `Peer` holds
//! one row per remote onion address. Schema creation is idempotent and
//! tracked in `schema_version`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use crate::records::{Peer, PublicProfile, SelfIdentity, SessionSecret};
use crate::store::{Store, StoreError};

const SCHEMA_VERSION: i32 = 1;

const PEER_COLUMNS: &str = "onion, name, about, public_sign_key, public_box_key, secret_auth_key";

/// SQLite-based persistent store.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| {
            StoreError::OperationFailed(format!("failed to open database: {}", e))
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| StoreError::OperationFailed(format!("failed to set pragmas: {}", e)))?;

        Self::run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database, for tests.
    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            StoreError::OperationFailed(format!("failed to open in-memory database: {}", e))
        })?;

        Self::run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            [],
        )
        .map_err(|e| StoreError::OperationFailed(format!("failed to create schema_version: {}", e)))?;

        let current_version: i32 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
                row.get(0)
            })
            .map_err(|e| StoreError::OperationFailed(format!("failed to read schema_version: {}", e)))?;

        if current_version < 1 {
            Self::migrate_v1(conn)?;
        }

        Ok(())
    }

    fn migrate_v1(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS Self (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                onion TEXT NOT NULL,
                name TEXT NOT NULL,
                about TEXT NOT NULL,
                onion_key_type TEXT NOT NULL,
                private_onion_key BLOB NOT NULL,
                public_box_key BLOB NOT NULL,
                private_box_key BLOB NOT NULL,
                public_sign_key BLOB NOT NULL,
                private_sign_key BLOB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS Peer (
                onion TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                about TEXT NOT NULL,
                public_sign_key BLOB NOT NULL,
                public_box_key BLOB NOT NULL,
                secret_auth_key BLOB
            );
            "#,
        )
        .map_err(|e| StoreError::OperationFailed(format!("migration v1 failed: {}", e)))?;

        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )
        .map_err(|e| StoreError::OperationFailed(format!("failed to record schema version: {}", e)))?;

        Ok(())
    }

    fn row_to_peer(row: &rusqlite::Row) -> rusqlite::Result<(PublicProfile, Option<Vec<u8>>)> {
        Ok((
            PublicProfile {
                onion: row.get(0)?,
                name: row.get(1)?,
                about: row.get(2)?,
                sign_key: row.get(3)?,
                box_key: row.get(4)?,
            },
            row.get(5)?,
        ))
    }

    fn into_peer(profile: PublicProfile, secret: Option<Vec<u8>>) -> Result<Peer, StoreError> {
        let secret_auth_key = match secret {
            Some(bytes) => Some(SessionSecret::from_slice(&bytes).ok_or_else(|| {
                StoreError::DataCorruption(format!(
                    "peer {} has a {}-byte session secret",
                    profile.onion,
                    bytes.len()
                ))
            })?),
            None => None,
        };
        Ok(Peer {
            profile,
            secret_auth_key,
        })
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_self(&self, identity: &SelfIdentity) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let profile = identity.profile();
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO Self (id, onion, name, about, onion_key_type,
                    private_onion_key, public_box_key, private_box_key,
                    public_sign_key, private_sign_key)
                 VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    profile.onion,
                    profile.name,
                    profile.about,
                    identity.scheme().as_str(),
                    identity.private_onion_key(),
                    profile.box_key,
                    identity.private_box_key(),
                    profile.sign_key,
                    identity.private_sign_key(),
                ],
            )
            .map_err(|e| StoreError::OperationFailed(format!("failed to save self: {}", e)))?;

        if inserted == 0 {
            return Err(StoreError::AlreadyExists("self".to_string()));
        }
        Ok(())
    }

    async fn get_self(&self) -> Result<SelfIdentity, StoreError> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT onion, name, about, onion_key_type, private_onion_key,
                        public_box_key, private_box_key, public_sign_key, private_sign_key
                 FROM Self WHERE id = 1",
                [],
                |row| {
                    Ok((
                        PublicProfile {
                            onion: row.get(0)?,
                            name: row.get(1)?,
                            about: row.get(2)?,
                            box_key: row.get(5)?,
                            sign_key: row.get(7)?,
                        },
                        row.get::<_, String>(3)?,
                        row.get::<_, Vec<u8>>(4)?,
                        row.get::<_, Vec<u8>>(6)?,
                        row.get::<_, Vec<u8>>(8)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| StoreError::OperationFailed(format!("failed to load self: {}", e)))?;

        let (profile, key_type, onion_key, box_key, sign_key) =
            row.ok_or_else(|| StoreError::NotFound("self".to_string()))?;

        SelfIdentity::from_parts(profile, &key_type, onion_key, box_key, sign_key)
            .map_err(|e| StoreError::DataCorruption(format!("self record: {}", e)))
    }

    async fn insert_peer(&self, peer: &Peer) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let profile = &peer.profile;
        conn.execute(
            "INSERT OR REPLACE INTO Peer (onion, name, about, public_sign_key, public_box_key, secret_auth_key)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                profile.onion,
                profile.name,
                profile.about,
                profile.sign_key,
                profile.box_key,
                peer.secret_auth_key.as_ref().map(|s| s.as_bytes().as_slice()),
            ],
        )
        .map_err(|e| StoreError::OperationFailed(format!("failed to save peer: {}", e)))?;
        Ok(())
    }

    async fn get_peer(&self, onion: &str) -> Result<Option<Peer>, StoreError> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM Peer WHERE onion = ?1", PEER_COLUMNS),
                params![onion],
                Self::row_to_peer,
            )
            .optional()
            .map_err(|e| StoreError::OperationFailed(format!("failed to load peer: {}", e)))?;

        row.map(|(profile, secret)| Self::into_peer(profile, secret))
            .transpose()
    }

    async fn list_peers(&self) -> Result<Vec<Peer>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM Peer ORDER BY onion", PEER_COLUMNS))
            .map_err(|e| StoreError::OperationFailed(format!("failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], Self::row_to_peer)
            .map_err(|e| StoreError::OperationFailed(format!("failed to list peers: {}", e)))?;

        let mut peers = Vec::new();
        for row in rows {
            let (profile, secret) = row
                .map_err(|e| StoreError::OperationFailed(format!("failed to read peer: {}", e)))?;
            peers.push(Self::into_peer(profile, secret)?);
        }
        Ok(peers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pub_crypto::address::OnionScheme;
    use pub_crypto::rng::OsRandom;

    fn make_peer(onion: &str, name: &str, secret: Option<u8>) -> Peer {
        Peer {
            profile: PublicProfile {
                onion: onion.to_string(),
                name: name.to_string(),
                about: "about".to_string(),
                box_key: vec![3; 32],
                sign_key: vec![4; 32],
            },
            secret_auth_key: secret.map(|b| SessionSecret::new([b; 32])),
        }
    }

    #[tokio::test]
    async fn test_sqlite_self_round_trip() {
        let store = SqliteStore::new_in_memory().unwrap();
        let me = SelfIdentity::generate("alice", "writes things", OnionScheme::Rsa1024, &OsRandom).unwrap();

        store.create_self(&me).await.unwrap();
        let loaded = store.get_self().await.unwrap();

        assert_eq!(loaded.profile(), me.profile());
        assert_eq!(loaded.scheme(), OnionScheme::Rsa1024);
        assert_eq!(loaded.private_onion_key(), me.private_onion_key());
        assert_eq!(loaded.private_box_key(), me.private_box_key());
        assert_eq!(loaded.private_sign_key(), me.private_sign_key());
    }

    #[tokio::test]
    async fn test_sqlite_self_missing_and_duplicate() {
        let store = SqliteStore::new_in_memory().unwrap();
        assert!(matches!(store.get_self().await, Err(StoreError::NotFound(_))));

        let me = SelfIdentity::generate("a", "", OnionScheme::Ed25519V3, &OsRandom).unwrap();
        store.create_self(&me).await.unwrap();
        assert!(matches!(
            store.create_self(&me).await,
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_sqlite_unknown_key_type_is_corruption() {
        let store = SqliteStore::new_in_memory().unwrap();
        let me = SelfIdentity::generate("a", "", OnionScheme::Ed25519V3, &OsRandom).unwrap();
        store.create_self(&me).await.unwrap();

        store
            .conn
            .lock()
            .await
            .execute("UPDATE Self SET onion_key_type = 'DSA'", [])
            .unwrap();

        assert!(matches!(
            store.get_self().await,
            Err(StoreError::DataCorruption(_))
        ));
    }

    #[tokio::test]
    async fn test_sqlite_peer_upsert() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.insert_peer(&make_peer("bbbbbbbbbbbbbbbb", "old", Some(1))).await.unwrap();
        store.insert_peer(&make_peer("bbbbbbbbbbbbbbbb", "new", Some(9))).await.unwrap();
        store.insert_peer(&make_peer("aaaaaaaaaaaaaaaa", "other", None)).await.unwrap();

        let peers = store.list_peers().await.unwrap();
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].onion(), "aaaaaaaaaaaaaaaa");
        assert!(peers[0].secret_auth_key.is_none());
        assert_eq!(peers[1].profile.name, "new");
        assert_eq!(peers[1].secret_auth_key, Some(SessionSecret::new([9; 32])));

        let peer = store.get_peer("bbbbbbbbbbbbbbbb").await.unwrap().unwrap();
        assert_eq!(peer, make_peer("bbbbbbbbbbbbbbbb", "new", Some(9)));
        assert!(store.get_peer("cccccccccccccccc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.db");
        let me = SelfIdentity::generate("a", "b", OnionScheme::Ed25519V3, &OsRandom).unwrap();

        {
            let store = SqliteStore::new(&path).unwrap();
            store.create_self(&me).await.unwrap();
            store.insert_peer(&make_peer("aaaaaaaaaaaaaaaa", "p", Some(5))).await.unwrap();
        }

        let store = SqliteStore::new(&path).unwrap();
        assert_eq!(store.get_self().await.unwrap().onion(), me.onion());
        assert_eq!(store.list_peers().await.unwrap().len(), 1);
    }
}
