//! The local mirror store.
//!
//! A SQLite-backed, per-entity-type table store; the single source of truth
//! for everything the application reads while offline. All mutations run
//! inside a transaction, so a concurrent reader observes either the pre- or
//! post-state, never an interleaved partial write.

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use gradebook_api::{EntityRef, LocalId, Mirrored, ServerId, SyncState};

use super::entities::MirrorEntity;
use super::schema::{self, FOREIGN_KEYS};
use super::types::{state_column, MutationKind, StorageError, StorageResult};

/// Outcome of a remote batch applied to one table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpsertSummary {
    /// Rows in the incoming batch.
    pub fetched: usize,
    /// Rows written (inserted or overwritten) as `synced`.
    pub applied: usize,
    /// Rows skipped because a pending local row holds the same identity.
    pub protected: usize,
    /// Synced rows removed because the authoritative list no longer
    /// contains them (full-collection pulls only).
    pub pruned: usize,
}

pub struct MirrorStore {
    conn: Mutex<Connection>,
}

impl MirrorStore {
    pub fn open(path: &Path) -> StorageResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        schema::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Apply a batch of authoritative rows to `E`'s table.
    ///
    /// Rows are matched by server identity, falling back to the entity's
    /// natural key. Pending rows are never overwritten: `create`/`update`
    /// rows protect local edits, `delete` tombstones are not resurrected.
    /// With `prune`, synced rows absent from the batch are removed; prune
    /// only with full-collection pulls, never with filtered subsets.
    pub async fn upsert_from_remote<E: MirrorEntity>(
        &self,
        rows: Vec<(ServerId, E)>,
        prune: bool,
    ) -> StorageResult<UpsertSummary> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let mut summary = UpsertSummary {
            fetched: rows.len(),
            ..Default::default()
        };
        let mut seen: Vec<i64> = Vec::with_capacity(rows.len());

        for (server_id, entity) in rows {
            seen.push(server_id.0);

            let existing = match find_by_server::<E>(&tx, server_id)? {
                Some(row) => Some(row),
                None => best_natural_match(&tx, &entity)?,
            };

            match existing {
                Some(row) if row.state.is_pending() => {
                    debug!(
                        table = E::TABLE,
                        local_id = row.local_id.0,
                        state = %row.state,
                        "protecting pending local row from remote overwrite"
                    );
                    summary.protected += 1;
                }
                Some(row) => {
                    update_row(&tx, row.local_id, Some(server_id), SyncState::Synced, &entity)?;
                    summary.applied += 1;
                }
                None => {
                    insert_row(&tx, Some(server_id), SyncState::Synced, &entity)?;
                    summary.applied += 1;
                }
            }
        }

        if prune {
            summary.pruned = prune_absent_synced(&tx, E::TABLE, &seen)?;
        }

        tx.commit()?;
        Ok(summary)
    }

    /// Confirmed remote write: overwrite (or insert) the row and mark it
    /// `synced`, regardless of any pending state it held.
    pub async fn write_through<E: MirrorEntity>(
        &self,
        server_id: ServerId,
        entity: E,
    ) -> StorageResult<Mirrored<E>> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let existing = match find_by_server::<E>(&tx, server_id)? {
            Some(row) => Some(row),
            None => best_natural_match(&tx, &entity)?,
        };

        let local_id = match existing {
            Some(row) => {
                update_row(&tx, row.local_id, Some(server_id), SyncState::Synced, &entity)?;
                row.local_id
            }
            None => insert_row(&tx, Some(server_id), SyncState::Synced, &entity)?,
        };

        tx.commit()?;
        Ok(Mirrored {
            local_id,
            server_id: Some(server_id),
            state: SyncState::Synced,
            entity,
        })
    }

    /// Record a local mutation against the mirror.
    ///
    /// An existing row for the same logical identity (the explicit target,
    /// or the entity's natural key) is updated in place with its state
    /// escalated; otherwise a new row is inserted with the state the
    /// mutation kind implies. Deleting a row that never reached the server
    /// removes it immediately; deleting a synced row leaves a tombstone.
    pub async fn record_local_mutation<E: MirrorEntity>(
        &self,
        target: Option<EntityRef>,
        entity: E,
        kind: MutationKind,
    ) -> StorageResult<Mirrored<E>> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let existing = match target {
            Some(EntityRef::Server(id)) => find_by_server::<E>(&tx, id)?,
            Some(EntityRef::Local(id)) => find_by_local::<E>(&tx, id)?,
            None => best_natural_match(&tx, &entity)?,
        };

        let result = match (existing, kind) {
            (Some(row), MutationKind::Delete) => {
                if row.server_id.is_none() {
                    // Never synced: no tombstone needed, drop it outright.
                    delete_row(&tx, E::TABLE, row.local_id)?;
                    row
                } else {
                    mark_state(&tx, E::TABLE, row.local_id, SyncState::PendingDelete)?;
                    Mirrored {
                        state: SyncState::PendingDelete,
                        ..row
                    }
                }
            }
            (Some(row), MutationKind::Create | MutationKind::Update) => {
                let state = escalate(row.state, row.server_id.is_some());
                update_row(&tx, row.local_id, row.server_id, state, &entity)?;
                Mirrored {
                    local_id: row.local_id,
                    server_id: row.server_id,
                    state,
                    entity,
                }
            }
            (None, MutationKind::Create) => {
                let local_id = insert_row(&tx, None, SyncState::PendingCreate, &entity)?;
                Mirrored {
                    local_id,
                    server_id: None,
                    state: SyncState::PendingCreate,
                    entity,
                }
            }
            (None, MutationKind::Update) => match target {
                // Editing a row known remotely but not yet mirrored.
                Some(EntityRef::Server(id)) => {
                    let local_id = insert_row(&tx, Some(id), SyncState::PendingUpdate, &entity)?;
                    Mirrored {
                        local_id,
                        server_id: Some(id),
                        state: SyncState::PendingUpdate,
                        entity,
                    }
                }
                _ => {
                    return Err(StorageError::NotFound {
                        table: E::TABLE,
                        key: describe_target(target),
                    })
                }
            },
            (None, MutationKind::Delete) => {
                return Err(StorageError::NotFound {
                    table: E::TABLE,
                    key: describe_target(target),
                })
            }
        };

        tx.commit()?;
        Ok(result)
    }

    /// All rows holding an unconfirmed local mutation, in local-key order.
    pub async fn list_pending<E: MirrorEntity>(&self) -> StorageResult<Vec<Mirrored<E>>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "{} WHERE sync_state != 'synced' ORDER BY local_id",
            select_sql::<E>()
        );
        collect_rows(&conn, &sql, [])
    }

    /// All rows a reader should see: everything except tombstones.
    pub async fn list_live<E: MirrorEntity>(&self) -> StorageResult<Vec<Mirrored<E>>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "{} WHERE sync_state != 'delete' ORDER BY local_id",
            select_sql::<E>()
        );
        collect_rows(&conn, &sql, [])
    }

    /// Every row including tombstones. Mostly useful to tests and debugging.
    pub async fn list_all<E: MirrorEntity>(&self) -> StorageResult<Vec<Mirrored<E>>> {
        let conn = self.conn.lock().await;
        let sql = format!("{} ORDER BY local_id", select_sql::<E>());
        collect_rows(&conn, &sql, [])
    }

    /// Live rows where each named column matches one of the given encoded
    /// values. Used for reference-scoped reads (students of a group,
    /// activities of a subject/term, scores of an activity).
    pub async fn list_live_matching<E: MirrorEntity>(
        &self,
        filters: &[(&str, Vec<String>)],
    ) -> StorageResult<Vec<Mirrored<E>>> {
        let conn = self.conn.lock().await;
        let mut sql = format!("{} WHERE sync_state != 'delete'", select_sql::<E>());
        let mut values: Vec<Value> = Vec::new();
        for (column, candidates) in filters {
            let placeholders = vec!["?"; candidates.len()].join(", ");
            sql.push_str(&format!(" AND {column} IN ({placeholders})"));
            values.extend(candidates.iter().map(|v| Value::Text(v.clone())));
        }
        sql.push_str(" ORDER BY local_id");
        collect_rows(&conn, &sql, params_from_iter(values))
    }

    pub async fn get_by_ref<E: MirrorEntity>(
        &self,
        reference: EntityRef,
    ) -> StorageResult<Option<Mirrored<E>>> {
        let conn = self.conn.lock().await;
        match reference {
            EntityRef::Server(id) => find_by_server::<E>(&conn, id),
            EntityRef::Local(id) => find_by_local::<E>(&conn, id),
        }
    }

    /// Confirm a pushed row: assign the server identity and mark it
    /// `synced`; a confirmed tombstone is removed entirely.
    pub async fn reconcile_after_push<E: MirrorEntity>(
        &self,
        local_id: LocalId,
        server_id: ServerId,
    ) -> StorageResult<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let row = find_by_local::<E>(&tx, local_id)?.ok_or(StorageError::NotFound {
            table: E::TABLE,
            key: local_id.to_string(),
        })?;

        if row.state == SyncState::PendingDelete {
            delete_row(&tx, E::TABLE, local_id)?;
        } else {
            tx.execute(
                &format!(
                    "UPDATE {} SET server_id = ?1, sync_state = 'synced' WHERE local_id = ?2",
                    E::TABLE
                ),
                params![server_id.0, local_id.0],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Remove a row outright (confirmed remote delete, or a purely local
    /// tombstone that needs no network call).
    pub async fn remove_row<E: MirrorEntity>(&self, local_id: LocalId) -> StorageResult<()> {
        let conn = self.conn.lock().await;
        delete_row(&conn, E::TABLE, local_id)?;
        Ok(())
    }

    /// The explicit post-push cascade: rewrite every registered foreign-key
    /// column that still references `old` by its local key to the freshly
    /// assigned server identity. Returns the number of rewritten rows.
    pub async fn rewrite_parent_ref(
        &self,
        parent_table: &'static str,
        old: LocalId,
        server_id: ServerId,
    ) -> StorageResult<usize> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let old_encoded = EntityRef::Local(old).encode();
        let new_encoded = EntityRef::Server(server_id).encode();
        let mut rewritten = 0;

        for spec in FOREIGN_KEYS.iter().filter(|s| s.parent_table == parent_table) {
            rewritten += tx.execute(
                &format!(
                    "UPDATE {} SET {} = ?1 WHERE {} = ?2",
                    spec.table, spec.column, spec.column
                ),
                params![new_encoded, old_encoded],
            )?;
        }

        tx.commit()?;
        if rewritten > 0 {
            debug!(
                parent = parent_table,
                old = %old_encoded,
                new = %new_encoded,
                rewritten,
                "rewrote child references after push"
            );
        }
        Ok(rewritten)
    }
}

// =============================================================================
// Row-level helpers (operate inside the caller's transaction)
// =============================================================================

fn select_sql<E: MirrorEntity>() -> String {
    format!(
        "SELECT local_id, server_id, sync_state, {} FROM {}",
        E::COLUMNS.join(", "),
        E::TABLE
    )
}

fn read_row<E: MirrorEntity>(row: &Row<'_>) -> rusqlite::Result<Mirrored<E>> {
    Ok(Mirrored {
        local_id: LocalId(row.get(0)?),
        server_id: row.get::<_, Option<i64>>(1)?.map(ServerId),
        state: state_column(row, 2)?,
        entity: E::from_row(row, 3)?,
    })
}

fn collect_rows<E: MirrorEntity, P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> StorageResult<Vec<Mirrored<E>>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, read_row::<E>)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn find_by_local<E: MirrorEntity>(
    conn: &Connection,
    id: LocalId,
) -> StorageResult<Option<Mirrored<E>>> {
    let sql = format!("{} WHERE local_id = ?1", select_sql::<E>());
    Ok(conn.query_row(&sql, params![id.0], read_row::<E>).optional()?)
}

fn find_by_server<E: MirrorEntity>(
    conn: &Connection,
    id: ServerId,
) -> StorageResult<Option<Mirrored<E>>> {
    let sql = format!("{} WHERE server_id = ?1", select_sql::<E>());
    Ok(conn.query_row(&sql, params![id.0], read_row::<E>).optional()?)
}

/// Locate the row a natural-key match should land on: a pending edit wins
/// over a synced row, the greatest local key breaks ties.
fn best_natural_match<E: MirrorEntity>(
    conn: &Connection,
    entity: &E,
) -> StorageResult<Option<Mirrored<E>>> {
    let Some(pairs) = entity.natural_key() else {
        return Ok(None);
    };

    let mut sql = select_sql::<E>();
    let mut values: Vec<Value> = Vec::new();
    for (i, (column, value)) in pairs.iter().enumerate() {
        sql.push_str(if i == 0 { " WHERE " } else { " AND " });
        sql.push_str(&format!("{column} = ?"));
        values.push(Value::Text(value.clone()));
    }

    let mut candidates: Vec<Mirrored<E>> = collect_rows(conn, &sql, params_from_iter(values))?;
    candidates.sort_by_key(|r| (r.state.is_pending_edit(), r.local_id));
    Ok(candidates.pop())
}

fn insert_row<E: MirrorEntity>(
    conn: &Connection,
    server_id: Option<ServerId>,
    state: SyncState,
    entity: &E,
) -> StorageResult<LocalId> {
    let placeholders = (1..=E::COLUMNS.len() + 2)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} (server_id, sync_state, {}) VALUES ({})",
        E::TABLE,
        E::COLUMNS.join(", "),
        placeholders
    );

    let mut values: Vec<Value> = vec![
        server_id.map_or(Value::Null, |s| Value::Integer(s.0)),
        Value::Text(state.as_str().to_string()),
    ];
    values.extend(entity.bind_values());
    conn.execute(&sql, params_from_iter(values))?;
    Ok(LocalId(conn.last_insert_rowid()))
}

fn update_row<E: MirrorEntity>(
    conn: &Connection,
    local_id: LocalId,
    server_id: Option<ServerId>,
    state: SyncState,
    entity: &E,
) -> StorageResult<()> {
    let assignments = E::COLUMNS
        .iter()
        .map(|c| format!("{c} = ?"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE {} SET server_id = ?, sync_state = ?, {} WHERE local_id = ?",
        E::TABLE,
        assignments
    );

    let mut values: Vec<Value> = vec![
        server_id.map_or(Value::Null, |s| Value::Integer(s.0)),
        Value::Text(state.as_str().to_string()),
    ];
    values.extend(entity.bind_values());
    values.push(Value::Integer(local_id.0));
    conn.execute(&sql, params_from_iter(values))?;
    Ok(())
}

fn mark_state(
    conn: &Connection,
    table: &str,
    local_id: LocalId,
    state: SyncState,
) -> StorageResult<()> {
    conn.execute(
        &format!("UPDATE {table} SET sync_state = ?1 WHERE local_id = ?2"),
        params![state.as_str(), local_id.0],
    )?;
    Ok(())
}

fn delete_row(conn: &Connection, table: &str, local_id: LocalId) -> StorageResult<()> {
    conn.execute(
        &format!("DELETE FROM {table} WHERE local_id = ?1"),
        params![local_id.0],
    )?;
    Ok(())
}

fn prune_absent_synced(conn: &Connection, table: &str, seen: &[i64]) -> StorageResult<usize> {
    let pruned = if seen.is_empty() {
        conn.execute(
            &format!("DELETE FROM {table} WHERE sync_state = 'synced'"),
            [],
        )?
    } else {
        let placeholders = vec!["?"; seen.len()].join(", ");
        let sql = format!(
            "DELETE FROM {table} WHERE sync_state = 'synced' AND server_id NOT IN ({placeholders})"
        );
        conn.execute(
            &sql,
            params_from_iter(seen.iter().map(|id| Value::Integer(*id))),
        )?
    };
    if pruned > 0 {
        warn!(table, pruned, "pruned rows absent from authoritative list");
    }
    Ok(pruned)
}

/// Escalation keeps a row at or above its current pending tier: a synced
/// row becomes a pending update, an unsynced create stays a create, and a
/// tombstone edited again is revived at the tier its identity allows.
fn escalate(current: SyncState, has_server_id: bool) -> SyncState {
    match current {
        SyncState::Synced => SyncState::PendingUpdate,
        SyncState::PendingCreate => SyncState::PendingCreate,
        SyncState::PendingUpdate => SyncState::PendingUpdate,
        SyncState::PendingDelete => {
            if has_server_id {
                SyncState::PendingUpdate
            } else {
                SyncState::PendingCreate
            }
        }
    }
}

fn describe_target(target: Option<EntityRef>) -> String {
    match target {
        Some(r) => r.encode(),
        None => "<natural key>".to_string(),
    }
}
