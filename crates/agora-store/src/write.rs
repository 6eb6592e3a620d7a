//! The merge write path.
//!
//! `batch_merge` commits fetched or locally authored entities with
//! last-writer-wins semantics. Candidates are bucketed by entity type; each
//! bucket commits in one transaction; within a bucket every candidate is
//! accepted or skipped independently, so a single bad entity never poisons
//! the batch.

use rusqlite::{params, Transaction};
use tracing::debug;

use agora_types::{
    Address, Board, Entity, EntityKind, Fingerprint, Key, Post, Thread, Timestamp, Truststate,
    Updateable, Vote,
};

use crate::error::StoreResult;
use crate::store::MergeStore;
use crate::textblob;

/// Per-batch accounting of merge decisions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Candidates written (inserted or updated).
    pub committed: usize,
    /// Immutable candidates whose row already existed.
    pub already_present: usize,
    /// Updateable candidates rejected by the LWW rule.
    pub skipped_stale: usize,
    /// Candidates with empty identity columns.
    pub skipped_identity: usize,
    /// Candidates missing schema-required content.
    pub skipped_required: usize,
}

impl MergeReport {
    pub fn total_skipped(&self) -> usize {
        self.already_present + self.skipped_stale + self.skipped_identity + self.skipped_required
    }

    fn absorb(&mut self, other: MergeReport) {
        self.committed += other.committed;
        self.already_present += other.already_present;
        self.skipped_stale += other.skipped_stale;
        self.skipped_identity += other.skipped_identity;
        self.skipped_required += other.skipped_required;
    }
}

/// Symmetric difference of a sub-entity set over composite keys.
///
/// Returns `(additions, deletions)`: keys only the candidate set has, and
/// keys only the stored set has. The write path upserts every candidate row
/// (which also applies attribute changes to retained keys) and deletes the
/// `deletions`, so the stored set transitions atomically to exactly the
/// candidate set.
pub fn subentity_diff<K: Ord + Clone>(stored: &[K], candidate: &[K]) -> (Vec<K>, Vec<K>) {
    let stored_set: std::collections::BTreeSet<&K> = stored.iter().collect();
    let candidate_set: std::collections::BTreeSet<&K> = candidate.iter().collect();
    let additions = candidate_set
        .difference(&stored_set)
        .map(|k| (*k).clone())
        .collect();
    let deletions = stored_set
        .difference(&candidate_set)
        .map(|k| (*k).clone())
        .collect();
    (additions, deletions)
}

fn bucket_index(kind: EntityKind) -> usize {
    match kind {
        EntityKind::Board => 0,
        EntityKind::Thread => 1,
        EntityKind::Post => 2,
        EntityKind::Vote => 3,
        EntityKind::Key => 4,
        EntityKind::Truststate => 5,
        EntityKind::Address => 6,
    }
}

impl MergeStore {
    /// Merge a batch of candidates into storage.
    ///
    /// Entities arriving here are expected to have passed the verification
    /// gate already; this path enforces identity, required-content, and LWW
    /// rules only. Addresses always take the untrusted path here; use
    /// [`MergeStore::merge_address_trusted`] for self-observed metadata.
    pub fn batch_merge(&self, candidates: Vec<Entity>) -> StoreResult<MergeReport> {
        let mut buckets: [Vec<Entity>; 7] = Default::default();
        for entity in candidates {
            buckets[bucket_index(entity.kind())].push(entity);
        }

        let mut report = MergeReport::default();
        for bucket in &buckets {
            if bucket.is_empty() {
                continue;
            }
            let part = self.retry.run(|| self.merge_bucket(bucket))?;
            report.absorb(part);
        }
        Ok(report)
    }

    fn merge_bucket(&self, bucket: &[Entity]) -> StoreResult<MergeReport> {
        let mut conn = self.conn.lock().expect("lock poisoned");
        let tx = conn.transaction()?;
        let now = Timestamp::now();
        let mut report = MergeReport::default();
        for entity in bucket {
            self.merge_one(&tx, entity, now, &mut report)?;
        }
        tx.commit()?;
        Ok(report)
    }

    fn merge_one(
        &self,
        tx: &Transaction<'_>,
        entity: &Entity,
        now: Timestamp,
        report: &mut MergeReport,
    ) -> StoreResult<()> {
        if !entity.identity_present() {
            debug!(kind = %entity.kind(), "skipped: empty identity columns");
            report.skipped_identity += 1;
            return Ok(());
        }
        if !entity.content_present() {
            debug!(kind = %entity.kind(), "skipped: missing required content");
            report.skipped_required += 1;
            return Ok(());
        }

        match entity {
            Entity::Board(board) => self.merge_board(tx, board, now, report),
            Entity::Thread(thread) => self.merge_thread(tx, thread, now, report),
            Entity::Post(post) => self.merge_post(tx, post, now, report),
            Entity::Vote(vote) => Self::merge_vote(tx, vote, now, report),
            Entity::Key(key) => self.merge_key(tx, key, now, report),
            Entity::Truststate(ts) => Self::merge_truststate(tx, ts, now, report),
            Entity::Address(address) => Self::merge_address_untrusted(tx, address, now, report),
        }
    }

    // -----------------------------------------------------------------------
    // Immutable entities: insert-if-absent
    // -----------------------------------------------------------------------

    fn merge_thread(
        &self,
        tx: &Transaction<'_>,
        thread: &Thread,
        now: Timestamp,
        report: &mut MergeReport,
    ) -> StoreResult<()> {
        let body = textblob::pack(&thread.body, self.config.compress_threshold_bytes);
        let changed = tx.execute(
            "INSERT OR IGNORE INTO threads
             (fingerprint, board, name, body, link, owner, creation, proof_of_work,
              signature, local_arrival)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                thread.fingerprint.as_str(),
                thread.board.as_str(),
                thread.name,
                body,
                thread.link,
                thread.owner.as_str(),
                thread.creation.as_secs(),
                thread.proof_of_work,
                thread.signature,
                now.as_secs(),
            ],
        )?;
        if changed == 1 {
            report.committed += 1;
        } else {
            report.already_present += 1;
        }
        Ok(())
    }

    fn merge_post(
        &self,
        tx: &Transaction<'_>,
        post: &Post,
        now: Timestamp,
        report: &mut MergeReport,
    ) -> StoreResult<()> {
        let body = textblob::pack(&post.body, self.config.compress_threshold_bytes);
        let changed = tx.execute(
            "INSERT OR IGNORE INTO posts
             (fingerprint, board, thread, parent, body, owner, creation, proof_of_work,
              signature, local_arrival)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                post.fingerprint.as_str(),
                post.board.as_str(),
                post.thread.as_str(),
                post.parent.as_str(),
                body,
                post.owner.as_str(),
                post.creation.as_secs(),
                post.proof_of_work,
                post.signature,
                now.as_secs(),
            ],
        )?;
        if changed == 1 {
            report.committed += 1;
        } else {
            report.already_present += 1;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Updateable entities: LWW
    // -----------------------------------------------------------------------

    fn merge_board(
        &self,
        tx: &Transaction<'_>,
        board: &Board,
        now: Timestamp,
        report: &mut MergeReport,
    ) -> StoreResult<()> {
        let description = textblob::pack(&board.description, self.config.compress_threshold_bytes);
        match Self::stored_stamps(tx, EntityKind::Board, &board.fingerprint)? {
            None => {
                tx.execute(
                    "INSERT INTO boards
                     (fingerprint, name, owner, description, creation, proof_of_work,
                      signature, last_update, update_proof_of_work, update_signature,
                      local_arrival)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        board.fingerprint.as_str(),
                        board.name,
                        board.owner.as_str(),
                        description,
                        board.creation.as_secs(),
                        board.proof_of_work,
                        board.signature,
                        board.last_update.as_secs(),
                        board.update_proof_of_work,
                        board.update_signature,
                        now.as_secs(),
                    ],
                )?;
            }
            Some((creation, last_update)) => {
                if !board.supersedes(creation, last_update) {
                    debug!(fingerprint = board.fingerprint.short(), "stale board skipped");
                    report.skipped_stale += 1;
                    return Ok(());
                }
                tx.execute(
                    "UPDATE boards
                     SET name = ?2, owner = ?3, description = ?4, last_update = ?5,
                         update_proof_of_work = ?6, update_signature = ?7
                     WHERE fingerprint = ?1",
                    params![
                        board.fingerprint.as_str(),
                        board.name,
                        board.owner.as_str(),
                        description,
                        board.last_update.as_secs(),
                        board.update_proof_of_work,
                        board.update_signature,
                    ],
                )?;
            }
        }
        Self::reconcile_board_owners(tx, board)?;
        report.committed += 1;
        Ok(())
    }

    /// Transition the stored BoardOwner set to exactly the candidate set.
    /// Runs only when the parent board write was approved, inside the same
    /// transaction.
    fn reconcile_board_owners(tx: &Transaction<'_>, board: &Board) -> StoreResult<()> {
        let stored_keys: Vec<Fingerprint> = {
            let mut stmt = tx.prepare(
                "SELECT key_fingerprint FROM board_owners WHERE board_fingerprint = ?1",
            )?;
            let rows = stmt.query_map(params![board.fingerprint.as_str()], |row| {
                Ok(Fingerprint::new(row.get::<_, String>(0)?))
            })?;
            rows.collect::<Result<_, _>>()?
        };
        let candidate_keys: Vec<Fingerprint> = board
            .board_owners
            .iter()
            .map(|o| o.key_fingerprint.clone())
            .collect();

        let (_additions, deletions) = subentity_diff(&stored_keys, &candidate_keys);
        for gone in &deletions {
            tx.execute(
                "DELETE FROM board_owners WHERE board_fingerprint = ?1 AND key_fingerprint = ?2",
                params![board.fingerprint.as_str(), gone.as_str()],
            )?;
        }
        for owner in &board.board_owners {
            tx.execute(
                "INSERT INTO board_owners (board_fingerprint, key_fingerprint, expiry, level)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(board_fingerprint, key_fingerprint)
                 DO UPDATE SET expiry = excluded.expiry, level = excluded.level",
                params![
                    board.fingerprint.as_str(),
                    owner.key_fingerprint.as_str(),
                    owner.expiry.as_secs(),
                    owner.level,
                ],
            )?;
        }
        Ok(())
    }

    fn merge_key(
        &self,
        tx: &Transaction<'_>,
        key: &Key,
        now: Timestamp,
        report: &mut MergeReport,
    ) -> StoreResult<()> {
        let info = textblob::pack(&key.info, self.config.compress_threshold_bytes);
        match Self::stored_stamps(tx, EntityKind::Key, &key.fingerprint)? {
            None => {
                tx.execute(
                    "INSERT INTO keys
                     (fingerprint, key_type, public_key, name, info, creation,
                      proof_of_work, signature, last_update, update_proof_of_work,
                      update_signature, local_arrival)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        key.fingerprint.as_str(),
                        key.key_type,
                        key.key,
                        key.name,
                        info,
                        key.creation.as_secs(),
                        key.proof_of_work,
                        key.signature,
                        key.last_update.as_secs(),
                        key.update_proof_of_work,
                        key.update_signature,
                        now.as_secs(),
                    ],
                )?;
            }
            Some((creation, last_update)) => {
                if !key.supersedes(creation, last_update) {
                    debug!(fingerprint = key.fingerprint.short(), "stale key skipped");
                    report.skipped_stale += 1;
                    return Ok(());
                }
                tx.execute(
                    "UPDATE keys
                     SET name = ?2, info = ?3, last_update = ?4,
                         update_proof_of_work = ?5, update_signature = ?6
                     WHERE fingerprint = ?1",
                    params![
                        key.fingerprint.as_str(),
                        key.name,
                        info,
                        key.last_update.as_secs(),
                        key.update_proof_of_work,
                        key.update_signature,
                    ],
                )?;
            }
        }
        Self::reconcile_currency_addresses(tx, key)?;
        report.committed += 1;
        Ok(())
    }

    fn reconcile_currency_addresses(tx: &Transaction<'_>, key: &Key) -> StoreResult<()> {
        let stored: Vec<String> = {
            let mut stmt =
                tx.prepare("SELECT address FROM currency_addresses WHERE key_fingerprint = ?1")?;
            let rows = stmt.query_map(params![key.fingerprint.as_str()], |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };
        let candidate: Vec<String> = key
            .currency_addresses
            .iter()
            .map(|c| c.address.clone())
            .collect();

        let (_additions, deletions) = subentity_diff(&stored, &candidate);
        for gone in &deletions {
            tx.execute(
                "DELETE FROM currency_addresses WHERE key_fingerprint = ?1 AND address = ?2",
                params![key.fingerprint.as_str(), gone],
            )?;
        }
        for currency in &key.currency_addresses {
            tx.execute(
                "INSERT INTO currency_addresses (key_fingerprint, address, currency_code)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key_fingerprint, address)
                 DO UPDATE SET currency_code = excluded.currency_code",
                params![
                    key.fingerprint.as_str(),
                    currency.address,
                    currency.currency_code,
                ],
            )?;
        }
        Ok(())
    }

    fn merge_vote(
        tx: &Transaction<'_>,
        vote: &Vote,
        now: Timestamp,
        report: &mut MergeReport,
    ) -> StoreResult<()> {
        match Self::stored_stamps(tx, EntityKind::Vote, &vote.fingerprint)? {
            None => {
                tx.execute(
                    "INSERT INTO votes
                     (fingerprint, board, thread, target, owner, vote_type, creation,
                      proof_of_work, signature, last_update, update_proof_of_work,
                      update_signature, local_arrival)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    params![
                        vote.fingerprint.as_str(),
                        vote.board.as_str(),
                        vote.thread.as_str(),
                        vote.target.as_str(),
                        vote.owner.as_str(),
                        vote.vote_type,
                        vote.creation.as_secs(),
                        vote.proof_of_work,
                        vote.signature,
                        vote.last_update.as_secs(),
                        vote.update_proof_of_work,
                        vote.update_signature,
                        now.as_secs(),
                    ],
                )?;
                report.committed += 1;
            }
            Some((creation, last_update)) => {
                if !vote.supersedes(creation, last_update) {
                    report.skipped_stale += 1;
                    return Ok(());
                }
                tx.execute(
                    "UPDATE votes
                     SET vote_type = ?2, last_update = ?3, update_proof_of_work = ?4,
                         update_signature = ?5
                     WHERE fingerprint = ?1",
                    params![
                        vote.fingerprint.as_str(),
                        vote.vote_type,
                        vote.last_update.as_secs(),
                        vote.update_proof_of_work,
                        vote.update_signature,
                    ],
                )?;
                report.committed += 1;
            }
        }
        Ok(())
    }

    fn merge_truststate(
        tx: &Transaction<'_>,
        ts: &Truststate,
        now: Timestamp,
        report: &mut MergeReport,
    ) -> StoreResult<()> {
        match Self::stored_stamps(tx, EntityKind::Truststate, &ts.fingerprint)? {
            None => {
                tx.execute(
                    "INSERT INTO truststates
                     (fingerprint, target, owner, trust_type, expiry, creation,
                      proof_of_work, signature, last_update, update_proof_of_work,
                      update_signature, local_arrival)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        ts.fingerprint.as_str(),
                        ts.target.as_str(),
                        ts.owner.as_str(),
                        ts.trust_type,
                        ts.expiry.as_secs(),
                        ts.creation.as_secs(),
                        ts.proof_of_work,
                        ts.signature,
                        ts.last_update.as_secs(),
                        ts.update_proof_of_work,
                        ts.update_signature,
                        now.as_secs(),
                    ],
                )?;
                report.committed += 1;
            }
            Some((creation, last_update)) => {
                if !ts.supersedes(creation, last_update) {
                    report.skipped_stale += 1;
                    return Ok(());
                }
                tx.execute(
                    "UPDATE truststates
                     SET trust_type = ?2, expiry = ?3, last_update = ?4,
                         update_proof_of_work = ?5, update_signature = ?6
                     WHERE fingerprint = ?1",
                    params![
                        ts.fingerprint.as_str(),
                        ts.trust_type,
                        ts.expiry.as_secs(),
                        ts.last_update.as_secs(),
                        ts.update_proof_of_work,
                        ts.update_signature,
                    ],
                )?;
                report.committed += 1;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Addresses: two disjoint write paths
    // -----------------------------------------------------------------------

    /// The untrusted gossip path: identity-only rows, create-only.
    ///
    /// Every non-identity field is zeroed before storage so that
    /// third-party-reported liveness and version metadata never lands in
    /// the local table.
    fn merge_address_untrusted(
        tx: &Transaction<'_>,
        address: &Address,
        now: Timestamp,
        report: &mut MergeReport,
    ) -> StoreResult<()> {
        let bare = address.identity_only();
        let changed = tx.execute(
            "INSERT OR IGNORE INTO addresses
             (location, sublocation, port, ip_type, address_type, last_online,
              protocol_version_major, protocol_version_minor, client_version_major,
              client_version_minor, client_version_patch, client_name, local_arrival)
             VALUES (?1, ?2, ?3, 0, 0, 0, 0, 0, 0, 0, 0, '', ?4)",
            params![bare.location, bare.sublocation, bare.port, now.as_secs()],
        )?;
        if changed == 1 {
            report.committed += 1;
        } else {
            report.already_present += 1;
        }
        Ok(())
    }

    /// The trusted direct-connection path: the peer reported its own
    /// metadata over a live connection, so liveness, version and
    /// subprotocol details overwrite whatever is stored.
    pub fn merge_address_trusted(&self, address: &Address) -> StoreResult<()> {
        if !address.identity_present() {
            debug!("trusted address with empty identity ignored");
            return Ok(());
        }
        self.retry.run(|| {
            let mut conn = self.conn.lock().expect("lock poisoned");
            let tx = conn.transaction()?;
            let now = Timestamp::now();
            tx.execute(
                "INSERT INTO addresses
                 (location, sublocation, port, ip_type, address_type, last_online,
                  protocol_version_major, protocol_version_minor, client_version_major,
                  client_version_minor, client_version_patch, client_name, local_arrival)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(location, sublocation, port) DO UPDATE SET
                     ip_type = excluded.ip_type,
                     address_type = excluded.address_type,
                     last_online = excluded.last_online,
                     protocol_version_major = excluded.protocol_version_major,
                     protocol_version_minor = excluded.protocol_version_minor,
                     client_version_major = excluded.client_version_major,
                     client_version_minor = excluded.client_version_minor,
                     client_version_patch = excluded.client_version_patch,
                     client_name = excluded.client_name",
                params![
                    address.location,
                    address.sublocation,
                    address.port,
                    address.ip_type,
                    address.address_type,
                    address.last_online.as_secs(),
                    address.protocol.version_major,
                    address.protocol.version_minor,
                    address.client.version_major,
                    address.client.version_minor,
                    address.client.version_patch,
                    address.client.name,
                    now.as_secs(),
                ],
            )?;
            Self::reconcile_subprotocols(&tx, address)?;
            tx.commit()?;
            Ok(())
        })
    }

    fn reconcile_subprotocols(tx: &Transaction<'_>, address: &Address) -> StoreResult<()> {
        let stored: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT subprotocol_fingerprint FROM address_subprotocols
                 WHERE location = ?1 AND sublocation = ?2 AND port = ?3",
            )?;
            let rows = stmt.query_map(
                params![address.location, address.sublocation, address.port],
                |row| row.get(0),
            )?;
            rows.collect::<Result<_, _>>()?
        };
        let candidate: Vec<String> = address
            .protocol
            .subprotocols
            .iter()
            .map(|s| s.fingerprint.as_str().to_string())
            .collect();

        let (_additions, deletions) = subentity_diff(&stored, &candidate);
        for gone in &deletions {
            tx.execute(
                "DELETE FROM address_subprotocols
                 WHERE location = ?1 AND sublocation = ?2 AND port = ?3
                   AND subprotocol_fingerprint = ?4",
                params![address.location, address.sublocation, address.port, gone],
            )?;
        }
        for sp in &address.protocol.subprotocols {
            let entities =
                serde_json::to_string(&sp.supported_entities).unwrap_or_else(|_| "[]".into());
            tx.execute(
                "INSERT INTO subprotocols
                 (fingerprint, name, version_major, version_minor, supported_entities)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(fingerprint) DO UPDATE SET
                     name = excluded.name,
                     version_major = excluded.version_major,
                     version_minor = excluded.version_minor,
                     supported_entities = excluded.supported_entities",
                params![
                    sp.fingerprint.as_str(),
                    sp.name,
                    sp.version_major,
                    sp.version_minor,
                    entities,
                ],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO address_subprotocols
                 (location, sublocation, port, subprotocol_fingerprint)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    address.location,
                    address.sublocation,
                    address.port,
                    sp.fingerprint.as_str(),
                ],
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::read::{ReadQuery, Selector};
    use agora_types::{BoardOwner, Client, CurrencyAddress, Protocol, Subprotocol};

    fn store() -> MergeStore {
        MergeStore::open_in_memory(StoreConfig::default()).unwrap()
    }

    fn thread(fp: &str) -> Entity {
        Entity::Thread(Thread {
            fingerprint: Fingerprint::new(fp),
            board: Fingerprint::new("board-1"),
            name: "a thread".into(),
            body: "text".into(),
            owner: Fingerprint::new("key-t"),
            creation: Timestamp::new(100),
            ..Default::default()
        })
    }

    fn board(fp: &str, creation: i64, last_update: i64, owners: &[&str]) -> Entity {
        Entity::Board(Board {
            fingerprint: Fingerprint::new(fp),
            name: "rust".into(),
            owner: Fingerprint::new("key-owner"),
            board_owners: owners
                .iter()
                .map(|k| BoardOwner {
                    key_fingerprint: Fingerprint::new(*k),
                    expiry: Timestamp::new(9000),
                    level: 1,
                })
                .collect(),
            description: "a board".into(),
            creation: Timestamp::new(creation),
            last_update: Timestamp::new(last_update),
            ..Default::default()
        })
    }

    fn read_board(store: &MergeStore, fp: &str) -> Board {
        let result = store
            .read(ReadQuery {
                kind: EntityKind::Board,
                selector: Selector::Fingerprints(vec![Fingerprint::new(fp)]),
                embeds: vec![],
            })
            .unwrap();
        result.boards.into_iter().next().expect("board present")
    }

    // -----------------------------------------------------------------------
    // Immutable entities
    // -----------------------------------------------------------------------

    #[test]
    fn merging_same_thread_twice_stores_one_row() {
        let store = store();
        let first = store.batch_merge(vec![thread("t1")]).unwrap();
        assert_eq!(first.committed, 1);

        let second = store.batch_merge(vec![thread("t1")]).unwrap();
        assert_eq!(second.committed, 0);
        assert_eq!(second.already_present, 1);
        assert_eq!(store.count(EntityKind::Thread).unwrap(), 1);
    }

    #[test]
    fn threads_are_permanently_immutable() {
        let store = store();
        store.batch_merge(vec![thread("t1")]).unwrap();

        let mut altered = thread("t1");
        if let Entity::Thread(t) = &mut altered {
            t.name = "rewritten".into();
        }
        store.batch_merge(vec![altered]).unwrap();

        let result = store
            .read(ReadQuery {
                kind: EntityKind::Thread,
                selector: Selector::Fingerprints(vec![Fingerprint::new("t1")]),
                embeds: vec![],
            })
            .unwrap();
        assert_eq!(result.threads[0].name, "a thread");
    }

    // -----------------------------------------------------------------------
    // LWW
    // -----------------------------------------------------------------------

    #[test]
    fn lww_matrix_against_stored_board() {
        let store = store();
        // Stored: creation=1, last_update=2.
        store.batch_merge(vec![board("b1", 1, 2, &[])]).unwrap();

        // candidate last_update=1: rejected.
        let report = store.batch_merge(vec![board("b1", 1, 1, &[])]).unwrap();
        assert_eq!(report.skipped_stale, 1);

        // candidate last_update=2 (equal): rejected.
        let report = store.batch_merge(vec![board("b1", 1, 2, &[])]).unwrap();
        assert_eq!(report.skipped_stale, 1);

        // candidate last_update=3: accepted, field change visible.
        let mut newer = board("b1", 1, 3, &[]);
        if let Entity::Board(b) = &mut newer {
            b.name = "renamed".into();
        }
        let report = store.batch_merge(vec![newer]).unwrap();
        assert_eq!(report.committed, 1);
        assert_eq!(read_board(&store, "b1").name, "renamed");
        assert_eq!(read_board(&store, "b1").last_update, Timestamp::new(3));
    }

    #[test]
    fn update_must_also_beat_stored_creation() {
        let store = store();
        // Stored creation is 10; a candidate updated at 5 loses even though
        // the stored row has never been updated.
        store.batch_merge(vec![board("b1", 10, 0, &[])]).unwrap();
        let report = store.batch_merge(vec![board("b1", 10, 5, &[])]).unwrap();
        assert_eq!(report.skipped_stale, 1);
    }

    // -----------------------------------------------------------------------
    // Sub-entity reconciliation
    // -----------------------------------------------------------------------

    #[test]
    fn board_owner_set_transitions_exactly() {
        let store = store();
        store
            .batch_merge(vec![board("b1", 1, 1, &["A", "B", "C"])])
            .unwrap();

        store
            .batch_merge(vec![board("b1", 1, 2, &["A", "B", "D"])])
            .unwrap();

        let mut owners: Vec<String> = read_board(&store, "b1")
            .board_owners
            .iter()
            .map(|o| o.key_fingerprint.as_str().to_string())
            .collect();
        owners.sort();
        assert_eq!(owners, vec!["A", "B", "D"]);
    }

    #[test]
    fn attribute_change_on_one_owner_leaves_others_untouched() {
        let store = store();
        store
            .batch_merge(vec![board("b1", 1, 1, &["A", "B", "C"])])
            .unwrap();

        let mut updated = board("b1", 1, 2, &["A", "B", "C"]);
        if let Entity::Board(b) = &mut updated {
            for owner in &mut b.board_owners {
                if owner.key_fingerprint.as_str() == "B" {
                    owner.level = 2;
                    owner.expiry = Timestamp::new(12_000);
                }
            }
        }
        store.batch_merge(vec![updated]).unwrap();

        let owners = read_board(&store, "b1").board_owners;
        assert_eq!(owners.len(), 3);
        for owner in owners {
            match owner.key_fingerprint.as_str() {
                "B" => {
                    assert_eq!(owner.level, 2);
                    assert_eq!(owner.expiry, Timestamp::new(12_000));
                }
                _ => {
                    assert_eq!(owner.level, 1);
                    assert_eq!(owner.expiry, Timestamp::new(9000));
                }
            }
        }
    }

    #[test]
    fn stale_candidate_does_not_touch_subentities() {
        let store = store();
        store
            .batch_merge(vec![board("b1", 1, 5, &["A", "B"])])
            .unwrap();
        // Stale parent: its different owner set must not apply.
        store
            .batch_merge(vec![board("b1", 1, 3, &["Z"])])
            .unwrap();

        let mut owners: Vec<String> = read_board(&store, "b1")
            .board_owners
            .iter()
            .map(|o| o.key_fingerprint.as_str().to_string())
            .collect();
        owners.sort();
        assert_eq!(owners, vec!["A", "B"]);
    }

    #[test]
    fn currency_addresses_reconcile_like_board_owners() {
        let store = store();
        let key = |lu: i64, addrs: &[(&str, &str)]| {
            Entity::Key(Key {
                fingerprint: Fingerprint::new("k1"),
                key_type: "ed25519".into(),
                key: "pubkey-material".into(),
                currency_addresses: addrs
                    .iter()
                    .map(|(code, addr)| CurrencyAddress {
                        currency_code: (*code).into(),
                        address: (*addr).into(),
                    })
                    .collect(),
                creation: Timestamp::new(1),
                last_update: Timestamp::new(lu),
                ..Default::default()
            })
        };
        store
            .batch_merge(vec![key(1, &[("BTC", "addr-1"), ("ETH", "addr-2")])])
            .unwrap();
        store
            .batch_merge(vec![key(2, &[("BTC", "addr-1"), ("XMR", "addr-3")])])
            .unwrap();

        let result = store
            .read(ReadQuery {
                kind: EntityKind::Key,
                selector: Selector::Fingerprints(vec![Fingerprint::new("k1")]),
                embeds: vec![],
            })
            .unwrap();
        let mut addrs: Vec<String> = result.keys[0]
            .currency_addresses
            .iter()
            .map(|c| c.address.clone())
            .collect();
        addrs.sort();
        assert_eq!(addrs, vec!["addr-1", "addr-3"]);
    }

    #[test]
    fn subentity_diff_computes_symmetric_difference() {
        let stored = vec!["A".to_string(), "B".into(), "C".into()];
        let candidate = vec!["A".to_string(), "B".into(), "D".into()];
        let (additions, deletions) = subentity_diff(&stored, &candidate);
        assert_eq!(additions, vec!["D".to_string()]);
        assert_eq!(deletions, vec!["C".to_string()]);
    }

    // -----------------------------------------------------------------------
    // Identity / required-field skips
    // -----------------------------------------------------------------------

    #[test]
    fn empty_identity_is_silently_skipped() {
        let store = store();
        let report = store
            .batch_merge(vec![Entity::Thread(Thread {
                board: Fingerprint::new("b"),
                name: "x".into(),
                creation: Timestamp::new(1),
                ..Default::default()
            })])
            .unwrap();
        assert_eq!(report.skipped_identity, 1);
        assert_eq!(report.committed, 0);
    }

    #[test]
    fn missing_required_content_is_skipped() {
        let store = store();
        let report = store
            .batch_merge(vec![Entity::Post(Post {
                fingerprint: Fingerprint::new("p1"),
                board: Fingerprint::new("b"),
                thread: Fingerprint::new("t"),
                body: String::new(),
                creation: Timestamp::new(1),
                ..Default::default()
            })])
            .unwrap();
        assert_eq!(report.skipped_required, 1);
    }

    #[test]
    fn one_bad_candidate_never_poisons_the_batch() {
        let store = store();
        let report = store
            .batch_merge(vec![
                thread("t1"),
                Entity::Thread(Thread::default()),
                thread("t2"),
            ])
            .unwrap();
        assert_eq!(report.committed, 2);
        assert_eq!(report.skipped_identity, 1);
        assert_eq!(store.count(EntityKind::Thread).unwrap(), 2);
    }

    // -----------------------------------------------------------------------
    // Addresses
    // -----------------------------------------------------------------------

    fn gossiped_address() -> Address {
        Address {
            location: "peer.example".into(),
            sublocation: String::new(),
            port: 49120,
            ip_type: 4,
            address_type: 2,
            last_online: Timestamp::new(5000),
            protocol: Protocol {
                version_major: 9,
                version_minor: 9,
                subprotocols: vec![Subprotocol {
                    fingerprint: Fingerprint::new("sp1"),
                    name: "c0".into(),
                    version_major: 1,
                    version_minor: 0,
                    supported_entities: vec!["board".into()],
                }],
            },
            client: Client {
                version_major: 3,
                version_minor: 1,
                version_patch: 4,
                name: "evil-client".into(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn untrusted_address_merge_strips_all_metadata() {
        let store = store();
        store
            .batch_merge(vec![Entity::Address(gossiped_address())])
            .unwrap();

        let stored = store.address("peer.example", "", 49120).unwrap().unwrap();
        assert_eq!(stored.ip_type, 0);
        assert_eq!(stored.address_type, 0);
        assert!(stored.last_online.is_zero());
        assert_eq!(stored.protocol.version_major, 0);
        assert!(stored.protocol.subprotocols.is_empty());
        assert_eq!(stored.client.version_major, 0);
        assert_eq!(stored.client.name, "");
    }

    #[test]
    fn untrusted_path_never_overwrites_existing_rows() {
        let store = store();
        store.merge_address_trusted(&gossiped_address()).unwrap();

        // Gossip about the same address arrives later; trusted data stays.
        store
            .batch_merge(vec![Entity::Address(gossiped_address())])
            .unwrap();
        let stored = store.address("peer.example", "", 49120).unwrap().unwrap();
        assert_eq!(stored.client.name, "evil-client");
        assert_eq!(stored.last_online, Timestamp::new(5000));
    }

    #[test]
    fn trusted_address_merge_reconciles_subprotocol_junction() {
        let store = store();
        store.merge_address_trusted(&gossiped_address()).unwrap();

        let mut updated = gossiped_address();
        updated.protocol.subprotocols = vec![Subprotocol {
            fingerprint: Fingerprint::new("sp2"),
            name: "c1".into(),
            version_major: 2,
            version_minor: 0,
            supported_entities: vec!["thread".into(), "post".into()],
        }];
        store.merge_address_trusted(&updated).unwrap();

        let stored = store.address("peer.example", "", 49120).unwrap().unwrap();
        assert_eq!(stored.protocol.subprotocols.len(), 1);
        assert_eq!(
            stored.protocol.subprotocols[0].fingerprint,
            Fingerprint::new("sp2")
        );
        assert_eq!(
            stored.protocol.subprotocols[0].supported_entities,
            vec!["thread".to_string(), "post".into()]
        );
    }
}
