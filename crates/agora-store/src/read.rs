//! The query read path.
//!
//! Callers select one entity type by explicit fingerprints or by local
//! arrival time range, optionally pulling in related entities (threads of a
//! board, posts of those threads, votes on both, and finally the keys that
//! own any of it). Time ranges are sanitized before use so a remote can
//! never read past the node's own cache horizon.

use std::collections::BTreeSet;

use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, Row};
use tracing::debug;

use agora_types::{
    Address, Board, BoardOwner, Client, CurrencyAddress, EntityKind, Fingerprint, Key, Post,
    Protocol, Thread, Timestamp, Truststate, Vote,
};

use crate::error::{StoreError, StoreResult};
use crate::store::MergeStore;
use crate::textblob;

/// Related entities to pull in alongside the primary result.
///
/// Requested embeds always resolve in dependency order (threads, then posts,
/// then votes, then keys) regardless of the order given, because each stage
/// widens the fingerprint sets the later stages select on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Embed {
    Threads,
    Posts,
    Votes,
    Keys,
}

/// How the primary rows are selected.
#[derive(Clone, Debug)]
pub enum Selector {
    /// Explicit fingerprints. Yields at most one row per fingerprint;
    /// unknown fingerprints are silently absent from the result.
    Fingerprints(Vec<Fingerprint>),
    /// Local arrival time range. Open ends are filled in by sanitization.
    Arrival {
        begin: Option<Timestamp>,
        end: Option<Timestamp>,
    },
}

#[derive(Clone, Debug)]
pub struct ReadQuery {
    pub kind: EntityKind,
    pub selector: Selector,
    pub embeds: Vec<Embed>,
}

/// Everything a read produced, grouped by entity type. Embedded entities
/// land in their own group next to the primary ones.
#[derive(Clone, Debug, Default)]
pub struct ResultSet {
    pub boards: Vec<Board>,
    pub threads: Vec<Thread>,
    pub posts: Vec<Post>,
    pub votes: Vec<Vote>,
    pub keys: Vec<Key>,
    pub truststates: Vec<Truststate>,
    pub addresses: Vec<Address>,
}

impl ResultSet {
    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
            && self.threads.is_empty()
            && self.posts.is_empty()
            && self.votes.is_empty()
            && self.keys.is_empty()
            && self.truststates.is_empty()
            && self.addresses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.boards.len()
            + self.threads.len()
            + self.posts.len()
            + self.votes.len()
            + self.keys.len()
            + self.truststates.len()
            + self.addresses.len()
    }
}

impl MergeStore {
    pub fn read(&self, query: ReadQuery) -> StoreResult<ResultSet> {
        let conn = self.conn.lock().expect("lock poisoned");
        let mut out = ResultSet::default();

        match &query.selector {
            Selector::Fingerprints(fps) => {
                self.load_primary_by_fingerprint(&conn, query.kind, fps, &mut out)?
            }
            Selector::Arrival { begin, end } => {
                let (begin, end) = self.sanitize_range(&conn, *begin, *end)?;
                debug!(kind = %query.kind, begin = begin.as_secs(), end = end.as_secs(),
                       "arrival-range read");
                Self::load_primary_by_arrival(&conn, query.kind, begin, end, &mut out)?;
            }
        }

        let mut embeds = query.embeds.clone();
        embeds.sort();
        embeds.dedup();
        for embed in embeds {
            match embed {
                Embed::Threads => Self::embed_threads(&conn, &mut out)?,
                Embed::Posts => Self::embed_posts(&conn, &mut out)?,
                Embed::Votes => Self::embed_votes(&conn, &mut out)?,
                Embed::Keys => Self::embed_keys(&conn, &mut out)?,
            }
        }
        Ok(out)
    }

    /// Clamp a requested time range to what this node will serve.
    ///
    /// The floor is the node's own last cache generation (a range reaching
    /// further back would duplicate what the caches already serve), or the
    /// network-head horizon when no cache has ever been generated. A begin
    /// in the future is an error; an inverted range after clamping extends
    /// its end to now.
    fn sanitize_range(
        &self,
        conn: &Connection,
        begin: Option<Timestamp>,
        end: Option<Timestamp>,
    ) -> StoreResult<(Timestamp, Timestamp)> {
        let now = Timestamp::now();
        let floor = Self::last_cache_generation_on(conn)?
            .unwrap_or_else(|| now.rewind(self.config.network_head_horizon_secs));

        let mut end = end.unwrap_or(now).min(now);
        let mut begin = begin.unwrap_or(floor);
        if begin > now {
            return Err(StoreError::InvalidTimeRange(format!(
                "begin {} is in the future",
                begin.as_secs()
            )));
        }
        if begin < floor {
            begin = floor;
        }
        if begin > end {
            end = now;
        }
        Ok((begin, end))
    }

    // -----------------------------------------------------------------------
    // Primary selection
    // -----------------------------------------------------------------------

    fn load_primary_by_fingerprint(
        &self,
        conn: &Connection,
        kind: EntityKind,
        fingerprints: &[Fingerprint],
        out: &mut ResultSet,
    ) -> StoreResult<()> {
        if fingerprints.is_empty() {
            return Ok(());
        }
        let clause = in_clause(fingerprints.len());
        let fps = fingerprints.iter().map(|f| f.as_str().to_string());
        match kind {
            EntityKind::Board => {
                let sql = format!("{BOARD_SELECT} WHERE fingerprint IN ({clause})");
                out.boards = Self::query_boards(conn, &sql, params_from_iter(fps))?;
            }
            EntityKind::Thread => {
                let sql = format!("{THREAD_SELECT} WHERE fingerprint IN ({clause})");
                out.threads = query_rows(conn, &sql, params_from_iter(fps), thread_from_row)?;
            }
            EntityKind::Post => {
                let sql = format!("{POST_SELECT} WHERE fingerprint IN ({clause})");
                out.posts = query_rows(conn, &sql, params_from_iter(fps), post_from_row)?;
            }
            EntityKind::Vote => {
                let sql = format!("{VOTE_SELECT} WHERE fingerprint IN ({clause})");
                out.votes = query_rows(conn, &sql, params_from_iter(fps), vote_from_row)?;
            }
            EntityKind::Key => {
                let sql = format!("{KEY_SELECT} WHERE fingerprint IN ({clause})");
                out.keys = Self::query_keys(conn, &sql, params_from_iter(fps))?;
            }
            EntityKind::Truststate => {
                let sql = format!("{TRUSTSTATE_SELECT} WHERE fingerprint IN ({clause})");
                out.truststates =
                    query_rows(conn, &sql, params_from_iter(fps), truststate_from_row)?;
            }
            // Addresses have no fingerprint identity to select on.
            EntityKind::Address => {}
        }
        Ok(())
    }

    fn load_primary_by_arrival(
        conn: &Connection,
        kind: EntityKind,
        begin: Timestamp,
        end: Timestamp,
        out: &mut ResultSet,
    ) -> StoreResult<()> {
        let range = params![begin.as_secs(), end.as_secs()];
        const COND: &str = "WHERE local_arrival >= ?1 AND local_arrival <= ?2";
        match kind {
            EntityKind::Board => {
                out.boards = Self::query_boards(conn, &format!("{BOARD_SELECT} {COND}"), range)?;
            }
            EntityKind::Thread => {
                out.threads =
                    query_rows(conn, &format!("{THREAD_SELECT} {COND}"), range, thread_from_row)?;
            }
            EntityKind::Post => {
                out.posts =
                    query_rows(conn, &format!("{POST_SELECT} {COND}"), range, post_from_row)?;
            }
            EntityKind::Vote => {
                out.votes =
                    query_rows(conn, &format!("{VOTE_SELECT} {COND}"), range, vote_from_row)?;
            }
            EntityKind::Key => {
                out.keys = Self::query_keys(conn, &format!("{KEY_SELECT} {COND}"), range)?;
            }
            EntityKind::Truststate => {
                out.truststates = query_rows(
                    conn,
                    &format!("{TRUSTSTATE_SELECT} {COND}"),
                    range,
                    truststate_from_row,
                )?;
            }
            EntityKind::Address => {
                out.addresses = Self::query_addresses(
                    conn,
                    "SELECT location, sublocation, port, ip_type, address_type, last_online,
                            protocol_version_major, protocol_version_minor,
                            client_version_major, client_version_minor, client_version_patch,
                            client_name, local_arrival
                     FROM addresses WHERE local_arrival >= ?1 AND local_arrival <= ?2",
                    range,
                )?;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Embeds
    // -----------------------------------------------------------------------

    fn embed_threads(conn: &Connection, out: &mut ResultSet) -> StoreResult<()> {
        let board_fps: BTreeSet<String> = out
            .boards
            .iter()
            .map(|b| b.fingerprint.as_str().to_string())
            .collect();
        if board_fps.is_empty() {
            return Ok(());
        }
        let sql = format!("{THREAD_SELECT} WHERE board IN ({})", in_clause(board_fps.len()));
        let embedded = query_rows(conn, &sql, params_from_iter(board_fps), thread_from_row)?;
        merge_by_fingerprint(&mut out.threads, embedded, |t| &t.fingerprint);
        Ok(())
    }

    fn embed_posts(conn: &Connection, out: &mut ResultSet) -> StoreResult<()> {
        let thread_fps: BTreeSet<String> = out
            .threads
            .iter()
            .map(|t| t.fingerprint.as_str().to_string())
            .collect();
        if thread_fps.is_empty() {
            return Ok(());
        }
        let sql = format!("{POST_SELECT} WHERE thread IN ({})", in_clause(thread_fps.len()));
        let embedded = query_rows(conn, &sql, params_from_iter(thread_fps), post_from_row)?;
        merge_by_fingerprint(&mut out.posts, embedded, |p| &p.fingerprint);
        Ok(())
    }

    fn embed_votes(conn: &Connection, out: &mut ResultSet) -> StoreResult<()> {
        let targets: BTreeSet<String> = out
            .threads
            .iter()
            .map(|t| t.fingerprint.as_str().to_string())
            .chain(out.posts.iter().map(|p| p.fingerprint.as_str().to_string()))
            .collect();
        if targets.is_empty() {
            return Ok(());
        }
        let sql = format!("{VOTE_SELECT} WHERE target IN ({})", in_clause(targets.len()));
        let embedded = query_rows(conn, &sql, params_from_iter(targets), vote_from_row)?;
        merge_by_fingerprint(&mut out.votes, embedded, |v| &v.fingerprint);
        Ok(())
    }

    /// Keys resolve last so they cover the owners of every entity the
    /// earlier stages brought in.
    fn embed_keys(conn: &Connection, out: &mut ResultSet) -> StoreResult<()> {
        let mut owners: BTreeSet<String> = BTreeSet::new();
        for board in &out.boards {
            owners.insert(board.owner.as_str().to_string());
            for bo in &board.board_owners {
                owners.insert(bo.key_fingerprint.as_str().to_string());
            }
        }
        for thread in &out.threads {
            owners.insert(thread.owner.as_str().to_string());
        }
        for post in &out.posts {
            owners.insert(post.owner.as_str().to_string());
        }
        for vote in &out.votes {
            owners.insert(vote.owner.as_str().to_string());
        }
        for ts in &out.truststates {
            owners.insert(ts.owner.as_str().to_string());
            owners.insert(ts.target.as_str().to_string());
        }
        owners.remove("");
        if owners.is_empty() {
            return Ok(());
        }
        let sql = format!("{KEY_SELECT} WHERE fingerprint IN ({})", in_clause(owners.len()));
        let embedded = Self::query_keys(conn, &sql, params_from_iter(owners))?;
        merge_by_fingerprint(&mut out.keys, embedded, |k| &k.fingerprint);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Row loaders with sub-entity joins
    // -----------------------------------------------------------------------

    fn query_boards<P: rusqlite::Params>(
        conn: &Connection,
        sql: &str,
        params: P,
    ) -> StoreResult<Vec<Board>> {
        let mut boards = query_rows(conn, sql, params, board_from_row)?;
        for board in &mut boards {
            let mut stmt = conn.prepare(
                "SELECT key_fingerprint, expiry, level FROM board_owners
                 WHERE board_fingerprint = ?1 ORDER BY key_fingerprint",
            )?;
            let rows = stmt.query_map(params![board.fingerprint.as_str()], |row| {
                Ok(BoardOwner {
                    key_fingerprint: Fingerprint::new(row.get::<_, String>(0)?),
                    expiry: Timestamp::new(row.get::<_, i64>(1)?),
                    level: row.get(2)?,
                })
            })?;
            board.board_owners = rows.collect::<Result<_, _>>()?;
        }
        Ok(boards)
    }

    fn query_keys<P: rusqlite::Params>(
        conn: &Connection,
        sql: &str,
        params: P,
    ) -> StoreResult<Vec<Key>> {
        let mut keys = query_rows(conn, sql, params, key_from_row)?;
        for key in &mut keys {
            let mut stmt = conn.prepare(
                "SELECT address, currency_code FROM currency_addresses
                 WHERE key_fingerprint = ?1 ORDER BY address",
            )?;
            let rows = stmt.query_map(params![key.fingerprint.as_str()], |row| {
                Ok(CurrencyAddress {
                    address: row.get(0)?,
                    currency_code: row.get(1)?,
                })
            })?;
            key.currency_addresses = rows.collect::<Result<_, _>>()?;
        }
        Ok(keys)
    }

    fn query_addresses<P: rusqlite::Params>(
        conn: &Connection,
        sql: &str,
        params: P,
    ) -> StoreResult<Vec<Address>> {
        let mut addresses = query_rows(conn, sql, params, address_from_row)?;
        for address in &mut addresses {
            address.protocol.subprotocols = Self::subprotocols_for(
                conn,
                &address.location,
                &address.sublocation,
                address.port,
            )?;
        }
        Ok(addresses)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const BOARD_SELECT: &str = "SELECT fingerprint, name, owner, description, creation, \
     proof_of_work, signature, last_update, update_proof_of_work, update_signature, \
     local_arrival FROM boards";
const THREAD_SELECT: &str = "SELECT fingerprint, board, name, body, link, owner, creation, \
     proof_of_work, signature, local_arrival FROM threads";
const POST_SELECT: &str = "SELECT fingerprint, board, thread, parent, body, owner, creation, \
     proof_of_work, signature, local_arrival FROM posts";
const VOTE_SELECT: &str = "SELECT fingerprint, board, thread, target, owner, vote_type, \
     creation, proof_of_work, signature, last_update, update_proof_of_work, update_signature, \
     local_arrival FROM votes";
const KEY_SELECT: &str = "SELECT fingerprint, key_type, public_key, name, info, creation, \
     proof_of_work, signature, last_update, update_proof_of_work, update_signature, \
     local_arrival FROM keys";
const TRUSTSTATE_SELECT: &str = "SELECT fingerprint, target, owner, trust_type, expiry, \
     creation, proof_of_work, signature, last_update, update_proof_of_work, update_signature, \
     local_arrival FROM truststates";

fn in_clause(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn query_rows<T, P, F>(conn: &Connection, sql: &str, params: P, f: F) -> StoreResult<Vec<T>>
where
    P: rusqlite::Params,
    F: Fn(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, f)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Deduplicating append for embed stages: a row selected as primary is not
/// duplicated when an embed selects it again.
fn merge_by_fingerprint<T, F>(existing: &mut Vec<T>, incoming: Vec<T>, fp: F)
where
    F: Fn(&T) -> &Fingerprint,
{
    let seen: BTreeSet<String> = existing
        .iter()
        .map(|e| fp(e).as_str().to_string())
        .collect();
    for item in incoming {
        if !seen.contains(fp(&item).as_str()) {
            existing.push(item);
        }
    }
}

fn unpack_text(idx: usize, blob: Vec<u8>) -> rusqlite::Result<String> {
    textblob::unpack(&blob)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Blob, Box::new(e)))
}

fn board_from_row(row: &Row<'_>) -> rusqlite::Result<Board> {
    Ok(Board {
        fingerprint: Fingerprint::new(row.get::<_, String>(0)?),
        name: row.get(1)?,
        owner: Fingerprint::new(row.get::<_, String>(2)?),
        board_owners: Vec::new(),
        description: unpack_text(3, row.get(3)?)?,
        creation: Timestamp::new(row.get::<_, i64>(4)?),
        proof_of_work: row.get(5)?,
        signature: row.get(6)?,
        last_update: Timestamp::new(row.get::<_, i64>(7)?),
        update_proof_of_work: row.get(8)?,
        update_signature: row.get(9)?,
        local_arrival: Timestamp::new(row.get::<_, i64>(10)?),
    })
}

fn thread_from_row(row: &Row<'_>) -> rusqlite::Result<Thread> {
    Ok(Thread {
        fingerprint: Fingerprint::new(row.get::<_, String>(0)?),
        board: Fingerprint::new(row.get::<_, String>(1)?),
        name: row.get(2)?,
        body: unpack_text(3, row.get(3)?)?,
        link: row.get(4)?,
        owner: Fingerprint::new(row.get::<_, String>(5)?),
        creation: Timestamp::new(row.get::<_, i64>(6)?),
        proof_of_work: row.get(7)?,
        signature: row.get(8)?,
        local_arrival: Timestamp::new(row.get::<_, i64>(9)?),
    })
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        fingerprint: Fingerprint::new(row.get::<_, String>(0)?),
        board: Fingerprint::new(row.get::<_, String>(1)?),
        thread: Fingerprint::new(row.get::<_, String>(2)?),
        parent: Fingerprint::new(row.get::<_, String>(3)?),
        body: unpack_text(4, row.get(4)?)?,
        owner: Fingerprint::new(row.get::<_, String>(5)?),
        creation: Timestamp::new(row.get::<_, i64>(6)?),
        proof_of_work: row.get(7)?,
        signature: row.get(8)?,
        local_arrival: Timestamp::new(row.get::<_, i64>(9)?),
    })
}

fn vote_from_row(row: &Row<'_>) -> rusqlite::Result<Vote> {
    Ok(Vote {
        fingerprint: Fingerprint::new(row.get::<_, String>(0)?),
        board: Fingerprint::new(row.get::<_, String>(1)?),
        thread: Fingerprint::new(row.get::<_, String>(2)?),
        target: Fingerprint::new(row.get::<_, String>(3)?),
        owner: Fingerprint::new(row.get::<_, String>(4)?),
        vote_type: row.get(5)?,
        creation: Timestamp::new(row.get::<_, i64>(6)?),
        proof_of_work: row.get(7)?,
        signature: row.get(8)?,
        last_update: Timestamp::new(row.get::<_, i64>(9)?),
        update_proof_of_work: row.get(10)?,
        update_signature: row.get(11)?,
        local_arrival: Timestamp::new(row.get::<_, i64>(12)?),
    })
}

fn key_from_row(row: &Row<'_>) -> rusqlite::Result<Key> {
    Ok(Key {
        fingerprint: Fingerprint::new(row.get::<_, String>(0)?),
        key_type: row.get(1)?,
        key: row.get(2)?,
        name: row.get(3)?,
        info: unpack_text(4, row.get(4)?)?,
        currency_addresses: Vec::new(),
        creation: Timestamp::new(row.get::<_, i64>(5)?),
        proof_of_work: row.get(6)?,
        signature: row.get(7)?,
        last_update: Timestamp::new(row.get::<_, i64>(8)?),
        update_proof_of_work: row.get(9)?,
        update_signature: row.get(10)?,
        local_arrival: Timestamp::new(row.get::<_, i64>(11)?),
    })
}

fn truststate_from_row(row: &Row<'_>) -> rusqlite::Result<Truststate> {
    Ok(Truststate {
        fingerprint: Fingerprint::new(row.get::<_, String>(0)?),
        target: Fingerprint::new(row.get::<_, String>(1)?),
        owner: Fingerprint::new(row.get::<_, String>(2)?),
        trust_type: row.get(3)?,
        expiry: Timestamp::new(row.get::<_, i64>(4)?),
        creation: Timestamp::new(row.get::<_, i64>(5)?),
        proof_of_work: row.get(6)?,
        signature: row.get(7)?,
        last_update: Timestamp::new(row.get::<_, i64>(8)?),
        update_proof_of_work: row.get(9)?,
        update_signature: row.get(10)?,
        local_arrival: Timestamp::new(row.get::<_, i64>(11)?),
    })
}

fn address_from_row(row: &Row<'_>) -> rusqlite::Result<Address> {
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
}
