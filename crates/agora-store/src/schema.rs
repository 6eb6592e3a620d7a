//! Logical schema: one table per entity type keyed by fingerprint,
//! sub-entity tables keyed by composite identity, and the
//! address-subprotocol junction.

use rusqlite::Connection;

use crate::error::StoreResult;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS boards (
    fingerprint          TEXT PRIMARY KEY,
    name                 TEXT NOT NULL,
    owner                TEXT NOT NULL,
    description          BLOB NOT NULL,
    creation             INTEGER NOT NULL,
    proof_of_work        TEXT NOT NULL,
    signature            TEXT NOT NULL,
    last_update          INTEGER NOT NULL,
    update_proof_of_work TEXT NOT NULL,
    update_signature     TEXT NOT NULL,
    local_arrival        INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_boards_arrival ON boards(local_arrival);

CREATE TABLE IF NOT EXISTS board_owners (
    board_fingerprint TEXT NOT NULL,
    key_fingerprint   TEXT NOT NULL,
    expiry            INTEGER NOT NULL,
    level             INTEGER NOT NULL,
    PRIMARY KEY (board_fingerprint, key_fingerprint)
);

CREATE TABLE IF NOT EXISTS threads (
    fingerprint   TEXT PRIMARY KEY,
    board         TEXT NOT NULL,
    name          TEXT NOT NULL,
    body          BLOB NOT NULL,
    link          TEXT NOT NULL,
    owner         TEXT NOT NULL,
    creation      INTEGER NOT NULL,
    proof_of_work TEXT NOT NULL,
    signature     TEXT NOT NULL,
    local_arrival INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_threads_board ON threads(board);
CREATE INDEX IF NOT EXISTS idx_threads_arrival ON threads(local_arrival);

CREATE TABLE IF NOT EXISTS posts (
    fingerprint   TEXT PRIMARY KEY,
    board         TEXT NOT NULL,
    thread        TEXT NOT NULL,
    parent        TEXT NOT NULL,
    body          BLOB NOT NULL,
    owner         TEXT NOT NULL,
    creation      INTEGER NOT NULL,
    proof_of_work TEXT NOT NULL,
    signature     TEXT NOT NULL,
    local_arrival INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_posts_thread ON posts(thread);
CREATE INDEX IF NOT EXISTS idx_posts_arrival ON posts(local_arrival);

CREATE TABLE IF NOT EXISTS votes (
    fingerprint          TEXT PRIMARY KEY,
    board                TEXT NOT NULL,
    thread               TEXT NOT NULL,
    target               TEXT NOT NULL,
    owner                TEXT NOT NULL,
    vote_type            INTEGER NOT NULL,
    creation             INTEGER NOT NULL,
    proof_of_work        TEXT NOT NULL,
    signature            TEXT NOT NULL,
    last_update          INTEGER NOT NULL,
    update_proof_of_work TEXT NOT NULL,
    update_signature     TEXT NOT NULL,
    local_arrival        INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_votes_target ON votes(target);
CREATE INDEX IF NOT EXISTS idx_votes_arrival ON votes(local_arrival);

CREATE TABLE IF NOT EXISTS keys (
    fingerprint          TEXT PRIMARY KEY,
    key_type             TEXT NOT NULL,
    public_key           TEXT NOT NULL,
    name                 TEXT NOT NULL,
    info                 BLOB NOT NULL,
    creation             INTEGER NOT NULL,
    proof_of_work        TEXT NOT NULL,
    signature            TEXT NOT NULL,
    last_update          INTEGER NOT NULL,
    update_proof_of_work TEXT NOT NULL,
    update_signature     TEXT NOT NULL,
    local_arrival        INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_keys_arrival ON keys(local_arrival);

CREATE TABLE IF NOT EXISTS currency_addresses (
    key_fingerprint TEXT NOT NULL,
    address         TEXT NOT NULL,
    currency_code   TEXT NOT NULL,
    PRIMARY KEY (key_fingerprint, address)
);

CREATE TABLE IF NOT EXISTS truststates (
    fingerprint          TEXT PRIMARY KEY,
    target               TEXT NOT NULL,
    owner                TEXT NOT NULL,
    trust_type           INTEGER NOT NULL,
    expiry               INTEGER NOT NULL,
    creation             INTEGER NOT NULL,
    proof_of_work        TEXT NOT NULL,
    signature            TEXT NOT NULL,
    last_update          INTEGER NOT NULL,
    update_proof_of_work TEXT NOT NULL,
    update_signature     TEXT NOT NULL,
    local_arrival        INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_truststates_arrival ON truststates(local_arrival);

CREATE TABLE IF NOT EXISTS addresses (
    location               TEXT NOT NULL,
    sublocation            TEXT NOT NULL,
    port                   INTEGER NOT NULL,
    ip_type                INTEGER NOT NULL,
    address_type           INTEGER NOT NULL,
    last_online            INTEGER NOT NULL,
    protocol_version_major INTEGER NOT NULL,
    protocol_version_minor INTEGER NOT NULL,
    client_version_major   INTEGER NOT NULL,
    client_version_minor   INTEGER NOT NULL,
    client_version_patch   INTEGER NOT NULL,
    client_name            TEXT NOT NULL,
    local_arrival          INTEGER NOT NULL,
    PRIMARY KEY (location, sublocation, port)
);

CREATE TABLE IF NOT EXISTS subprotocols (
    fingerprint        TEXT PRIMARY KEY,
    name               TEXT NOT NULL,
    version_major      INTEGER NOT NULL,
    version_minor      INTEGER NOT NULL,
    supported_entities TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS address_subprotocols (
    location               TEXT NOT NULL,
    sublocation            TEXT NOT NULL,
    port                   INTEGER NOT NULL,
    subprotocol_fingerprint TEXT NOT NULL,
    PRIMARY KEY (location, sublocation, port, subprotocol_fingerprint)
);

CREATE TABLE IF NOT EXISTS store_meta (
    key   TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
";

/// Create all tables and indexes if they do not exist.
pub fn init(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch(SCHEMA)?;
    Ok(())
}
