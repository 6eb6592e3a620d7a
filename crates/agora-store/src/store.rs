use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use agora_types::{Address, Client, EntityKind, Fingerprint, Protocol, Subprotocol, Timestamp};

use crate::config::{RetryPolicy, StoreConfig};
use crate::error::StoreResult;
use crate::schema;

const META_LAST_CACHE_GENERATION: &str = "last_cache_generation";

/// Transactional entity storage with last-writer-wins merge semantics.
///
/// The connection and config are explicit and injected; tests run against
/// isolated in-memory instances. One writer transaction wraps each
/// entity-type bucket on the write path (see [`crate::write`]); reads take
/// the same lock for short, statement-scoped sections.
pub struct MergeStore {
    pub(crate) conn: Mutex<Connection>,
    pub(crate) config: StoreConfig,
    pub(crate) retry: RetryPolicy,
}

impl MergeStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: &Path, config: StoreConfig, retry: RetryPolicy) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        schema::init(&conn)?;
        info!(path = %path.display(), "merge store opened");
        Ok(Self {
            conn: Mutex::new(conn),
            config,
            retry,
        })
    }

    /// An isolated in-memory store, for tests and embedding.
    pub fn open_in_memory(config: StoreConfig) -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config,
            retry: RetryPolicy::default(),
        })
    }

    // -----------------------------------------------------------------------
    // Store metadata
    // -----------------------------------------------------------------------

    /// Record the timestamp of the node's own latest cache generation. Used
    /// as the floor for time-range reads.
    pub fn set_last_cache_generation(&self, at: Timestamp) -> StoreResult<()> {
        let conn = self.conn.lock().expect("lock poisoned");
        conn.execute(
            "INSERT INTO store_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![META_LAST_CACHE_GENERATION, at.as_secs()],
        )?;
        Ok(())
    }

    pub fn last_cache_generation(&self) -> StoreResult<Option<Timestamp>> {
        let conn = self.conn.lock().expect("lock poisoned");
        Self::last_cache_generation_on(&conn)
    }

    pub(crate) fn last_cache_generation_on(conn: &Connection) -> StoreResult<Option<Timestamp>> {
        let value: Option<i64> = conn
            .query_row(
                "SELECT value FROM store_meta WHERE key = ?1",
                params![META_LAST_CACHE_GENERATION],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.map(Timestamp::new))
    }

    // -----------------------------------------------------------------------
    // Manifest-gating probe
    // -----------------------------------------------------------------------

    /// Whether a local copy of `(kind, fingerprint)` exists that is at least
    /// as new as `last_update`.
    ///
    /// This is the download-avoidance probe behind manifest-gated fetching:
    /// a manifest entry whose entity is current contributes nothing to the
    /// page hit-set. Immutable kinds are current the moment they exist.
    pub fn is_current(
        &self,
        kind: EntityKind,
        fingerprint: &Fingerprint,
        last_update: Timestamp,
    ) -> StoreResult<bool> {
        let conn = self.conn.lock().expect("lock poisoned");
        match Self::stored_stamps(&conn, kind, fingerprint)? {
            None => Ok(false),
            Some((creation, stored_update)) => {
                if !kind.is_updateable() {
                    return Ok(true);
                }
                Ok(creation.max(stored_update) >= last_update)
            }
        }
    }

    /// The stored `(creation, last_update)` stamps for an entity, if any.
    /// Immutable kinds report a zero `last_update`.
    pub(crate) fn stored_stamps(
        conn: &Connection,
        kind: EntityKind,
        fingerprint: &Fingerprint,
    ) -> StoreResult<Option<(Timestamp, Timestamp)>> {
        let sql = match kind {
            EntityKind::Board => "SELECT creation, last_update FROM boards WHERE fingerprint = ?1",
            EntityKind::Thread => "SELECT creation, 0 FROM threads WHERE fingerprint = ?1",
            EntityKind::Post => "SELECT creation, 0 FROM posts WHERE fingerprint = ?1",
            EntityKind::Vote => "SELECT creation, last_update FROM votes WHERE fingerprint = ?1",
            EntityKind::Key => "SELECT creation, last_update FROM keys WHERE fingerprint = ?1",
            EntityKind::Truststate => {
                "SELECT creation, last_update FROM truststates WHERE fingerprint = ?1"
            }
            // Addresses have no fingerprint identity.
            EntityKind::Address => return Ok(None),
        };
        let stamps = conn
            .query_row(sql, params![fingerprint.as_str()], |row| {
                Ok((
                    Timestamp::new(row.get::<_, i64>(0)?),
                    Timestamp::new(row.get::<_, i64>(1)?),
                ))
            })
            .optional()?;
        Ok(stamps)
    }

    // -----------------------------------------------------------------------
    // Address lookups
    // -----------------------------------------------------------------------

    /// Load one address row with its subprotocol join resolved.
    pub fn address(
        &self,
        location: &str,
        sublocation: &str,
        port: u16,
    ) -> StoreResult<Option<Address>> {
        let conn = self.conn.lock().expect("lock poisoned");
        let row = conn
            .query_row(
                "SELECT location, sublocation, port, ip_type, address_type, last_online,
                        protocol_version_major, protocol_version_minor,
                        client_version_major, client_version_minor, client_version_patch,
                        client_name, local_arrival
                 FROM addresses WHERE location = ?1 AND sublocation = ?2 AND port = ?3",
                params![location, sublocation, port],
                |row| {
                    Ok(Address {
                        location: row.get(0)?,
                        sublocation: row.get(1)?,
                        port: row.get(2)?,
                        ip_type: row.get(3)?,
                        address_type: row.get(4)?,
                        last_online: Timestamp::new(row.get::<_, i64>(5)?),
                        protocol: Protocol {
                            version_major: row.get(6)?,
                            version_minor: row.get(7)?,
                            subprotocols: Vec::new(),
                        },
                        client: Client {
                            version_major: row.get(8)?,
                            version_minor: row.get(9)?,
                            version_patch: row.get(10)?,
                            name: row.get(11)?,
                        },
                        local_arrival: Timestamp::new(row.get::<_, i64>(12)?),
                    })
                },
            )
            .optional()?;

        let Some(mut address) = row else {
            return Ok(None);
        };
        address.protocol.subprotocols =
            Self::subprotocols_for(&conn, location, sublocation, port)?;
        Ok(Some(address))
    }

    pub(crate) fn subprotocols_for(
        conn: &Connection,
        location: &str,
        sublocation: &str,
        port: u16,
    ) -> StoreResult<Vec<Subprotocol>> {
        let mut stmt = conn.prepare(
            "SELECT s.fingerprint, s.name, s.version_major, s.version_minor, s.supported_entities
             FROM subprotocols s
             JOIN address_subprotocols j ON j.subprotocol_fingerprint = s.fingerprint
             WHERE j.location = ?1 AND j.sublocation = ?2 AND j.port = ?3
             ORDER BY s.fingerprint",
        )?;
        let rows = stmt.query_map(params![location, sublocation, port], |row| {
            let entities_json: String = row.get(4)?;
            Ok(Subprotocol {
                fingerprint: Fingerprint::new(row.get::<_, String>(0)?),
                name: row.get(1)?,
                version_major: row.get(2)?,
                version_minor: row.get(3)?,
                supported_entities: serde_json::from_str(&entities_json).unwrap_or_default(),
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Number of stored rows for a kind. Mostly for tests and status output.
    pub fn count(&self, kind: EntityKind) -> StoreResult<u64> {
        let conn = self.conn.lock().expect("lock poisoned");
        let table = match kind {
            EntityKind::Board => "boards",
            EntityKind::Thread => "threads",
            EntityKind::Post => "posts",
            EntityKind::Vote => "votes",
            EntityKind::Key => "keys",
            EntityKind::Truststate => "truststates",
            EntityKind::Address => "addresses",
        };
        let count: i64 =
            conn.query_row(&format!("SELECT count(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl std::fmt::Debug for MergeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeStore").finish_non_exhaustive()
    }
}
