use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use borsh::{from_slice as from_borsh_slice, to_vec as to_borsh_vec};
use serde::Serialize;
use strata_crdt::{ClockOrdering, LwwRegister, OrSet, Tag, VectorClock};
use strata_crypto::Keypair;
use strata_merkle::build_root;
use strata_primitives::{Hash, NodeId};
use strata_store::{Column, Database, WriteBatch};
use tracing::debug;

use crate::bundle::CatalogBundle;
use crate::delta::{Delta, DeltaBody, DeltaKind, Metadata, Scope};
use crate::CatalogError;

const KEY_CLOCK: &[u8] = b"clock";
const KEY_SNAPSHOTS: &[u8] = b"snapshots";
const KEY_IMAGES: &[u8] = b"images";
const KEY_SNAPSHOT_META: &[u8] = b"snapshot_meta";
const KEY_IMAGE_META: &[u8] = b"image_meta";
const KEY_OUTGOING: &[u8] = b"outgoing";
const KEY_LWW_FLOOR: &[u8] = b"lww_floor";

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
}

/// Query result for a single catalog entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EntityRecord {
    pub id: String,
    pub present: bool,
    pub metadata: Option<Metadata>,
    pub updated_at: Option<u64>,
    pub updated_by: Option<NodeId>,
}

/// The node-local catalog replica.
///
/// Single-writer by construction: the owning task is the only mutator,
/// readers receive cloned records. Every successful mutation, local or
/// applied, persists the clock, both sets and both register maps in one
/// atomic batch before returning.
pub struct Catalog {
    node: NodeId,
    keypair: Keypair,
    db: Arc<dyn Database>,
    clock: VectorClock,
    snapshots: OrSet<String>,
    images: OrSet<String>,
    snapshot_meta: BTreeMap<String, LwwRegister<Metadata>>,
    image_meta: BTreeMap<String, LwwRegister<Metadata>>,
    outgoing: VecDeque<Delta>,
    /// Floor keeping local LWW timestamps strictly increasing even if the
    /// wall clock steps backwards.
    lww_floor: u64,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("node", &self.node)
            .field("snapshots", &self.snapshots.len())
            .field("images", &self.images.len())
            .field("outgoing", &self.outgoing.len())
            .finish_non_exhaustive()
    }
}

fn load<T: borsh::BorshDeserialize + Default>(
    db: &dyn Database,
    key: &[u8],
) -> Result<T, CatalogError> {
    match db.get(Column::Catalog, key)? {
        None => Ok(T::default()),
        Some(bytes) => from_borsh_slice(&bytes)
            .map_err(|_| CatalogError::CorruptState(String::from_utf8_lossy(key).into_owned())),
    }
}

impl Catalog {
    /// Opens the catalog, restoring any persisted state.
    pub fn open(
        node: NodeId,
        keypair: Keypair,
        db: Arc<dyn Database>,
    ) -> Result<Self, CatalogError> {
        let clock = load(&*db, KEY_CLOCK)?;
        let snapshots = load(&*db, KEY_SNAPSHOTS)?;
        let images = load(&*db, KEY_IMAGES)?;
        let snapshot_meta = load(&*db, KEY_SNAPSHOT_META)?;
        let image_meta = load(&*db, KEY_IMAGE_META)?;
        let outgoing: Vec<Delta> = load(&*db, KEY_OUTGOING)?;
        let lww_floor = load(&*db, KEY_LWW_FLOOR)?;

        Ok(Self {
            node,
            keypair,
            db,
            clock,
            snapshots,
            images,
            snapshot_meta,
            image_meta,
            outgoing: outgoing.into(),
            lww_floor,
        })
    }

    #[must_use]
    pub const fn node_id(&self) -> &NodeId {
        &self.node
    }

    #[must_use]
    pub const fn clock(&self) -> &VectorClock {
        &self.clock
    }

    fn persist(&self) -> Result<(), CatalogError> {
        let mut batch = WriteBatch::new();
        batch.put(
            Column::Catalog,
            KEY_CLOCK,
            to_borsh_vec(&self.clock).expect("clock serializes"),
        );
        batch.put(
            Column::Catalog,
            KEY_SNAPSHOTS,
            to_borsh_vec(&self.snapshots).expect("set serializes"),
        );
        batch.put(
            Column::Catalog,
            KEY_IMAGES,
            to_borsh_vec(&self.images).expect("set serializes"),
        );
        batch.put(
            Column::Catalog,
            KEY_SNAPSHOT_META,
            to_borsh_vec(&self.snapshot_meta).expect("registers serialize"),
        );
        batch.put(
            Column::Catalog,
            KEY_IMAGE_META,
            to_borsh_vec(&self.image_meta).expect("registers serialize"),
        );
        batch.put(
            Column::Catalog,
            KEY_OUTGOING,
            to_borsh_vec(&self.outgoing.iter().cloned().collect::<Vec<_>>())
                .expect("deltas serialize"),
        );
        batch.put(
            Column::Catalog,
            KEY_LWW_FLOOR,
            to_borsh_vec(&self.lww_floor).expect("u64 serializes"),
        );
        self.db.write(batch)?;
        Ok(())
    }

    /// Next logical timestamp: wall clock, floored to stay strictly
    /// increasing at this node.
    fn next_timestamp(&mut self) -> u64 {
        let ts = now_nanos().max(self.lww_floor + 1);
        self.lww_floor = ts;
        ts
    }

    /// Increments the clock and enqueues a signed delta carrying the
    /// post-increment snapshot.
    fn push_delta(
        &mut self,
        kind: DeltaKind,
        scope: Scope,
        entity_id: &str,
        payload: Vec<u8>,
        timestamp: u64,
    ) {
        let body = DeltaBody {
            origin: self.node.clone(),
            clock: self.clock.clone(),
            kind,
            scope,
            entity_id: entity_id.to_owned(),
            payload,
            timestamp,
        };
        self.outgoing.push_back(Delta::sign(body, &self.keypair));
    }

    fn set_for(&mut self, scope: Scope) -> &mut OrSet<String> {
        match scope {
            Scope::Snapshots => &mut self.snapshots,
            Scope::Images => &mut self.images,
            Scope::SnapshotMeta | Scope::ImageMeta => unreachable!("meta scopes have no set"),
        }
    }

    fn add_entity(
        &mut self,
        set_scope: Scope,
        meta_scope: Scope,
        id: &str,
        metadata: Metadata,
    ) -> Result<(), CatalogError> {
        let counter = self.clock.increment(&self.node);
        let tag = Tag::new(self.node.clone(), counter);
        self.set_for(set_scope).add(id.to_owned(), tag.clone());
        let ts = self.next_timestamp();
        self.push_delta(
            DeltaKind::OrSetAdd,
            set_scope,
            id,
            to_borsh_vec(&tag).expect("tag serializes"),
            ts,
        );

        self.write_register(meta_scope, id, metadata)?;
        self.persist()
    }

    fn remove_entity(&mut self, set_scope: Scope, id: &str) -> Result<(), CatalogError> {
        if !self.set_for(set_scope).contains(&id.to_owned()) {
            return Err(CatalogError::NotFound(id.to_owned()));
        }

        let _ = self.clock.increment(&self.node);
        let tags = self.set_for(set_scope).remove(&id.to_owned());
        let ts = self.next_timestamp();
        self.push_delta(
            DeltaKind::OrSetRemove,
            set_scope,
            id,
            to_borsh_vec(&tags).expect("tags serialize"),
            ts,
        );
        self.persist()
    }

    /// Applies a local register write and enqueues its delta. Caller is
    /// responsible for the final persist.
    fn write_register(
        &mut self,
        meta_scope: Scope,
        id: &str,
        metadata: Metadata,
    ) -> Result<(), CatalogError> {
        let ts = self.next_timestamp();
        let _ = self.clock.increment(&self.node);

        let node = self.node.clone();
        let map = match meta_scope {
            Scope::SnapshotMeta => &mut self.snapshot_meta,
            Scope::ImageMeta => &mut self.image_meta,
            Scope::Snapshots | Scope::Images => {
                return Err(CatalogError::KindScopeMismatch {
                    kind: DeltaKind::LwwUpdate,
                    scope: meta_scope,
                })
            }
        };
        match map.get_mut(id) {
            Some(register) => {
                let _ = register.set(metadata.clone(), ts, node);
            }
            None => {
                let _ = map.insert(
                    id.to_owned(),
                    LwwRegister::new(metadata.clone(), ts, node),
                );
            }
        }

        self.push_delta(
            DeltaKind::LwwUpdate,
            meta_scope,
            id,
            to_borsh_vec(&metadata).expect("metadata serializes"),
            ts,
        );
        Ok(())
    }

    pub fn add_snapshot(&mut self, id: &str, metadata: Metadata) -> Result<(), CatalogError> {
        self.add_entity(Scope::Snapshots, Scope::SnapshotMeta, id, metadata)
    }

    pub fn remove_snapshot(&mut self, id: &str) -> Result<(), CatalogError> {
        self.remove_entity(Scope::Snapshots, id)
    }

    pub fn update_snapshot_metadata(
        &mut self,
        id: &str,
        metadata: Metadata,
    ) -> Result<(), CatalogError> {
        if !self.snapshots.contains(&id.to_owned()) {
            return Err(CatalogError::NotFound(id.to_owned()));
        }
        self.write_register(Scope::SnapshotMeta, id, metadata)?;
        self.persist()
    }

    pub fn add_image(&mut self, id: &str, metadata: Metadata) -> Result<(), CatalogError> {
        self.add_entity(Scope::Images, Scope::ImageMeta, id, metadata)
    }

    pub fn remove_image(&mut self, id: &str) -> Result<(), CatalogError> {
        self.remove_entity(Scope::Images, id)
    }

    pub fn update_image_metadata(
        &mut self,
        id: &str,
        metadata: Metadata,
    ) -> Result<(), CatalogError> {
        if !self.images.contains(&id.to_owned()) {
            return Err(CatalogError::NotFound(id.to_owned()));
        }
        self.write_register(Scope::ImageMeta, id, metadata)?;
        self.persist()
    }

    /// Applies a delta received from a peer.
    ///
    /// Returns `Ok(false)` for causal duplicates: the origin's counter in
    /// the delta must strictly exceed what this replica has already seen
    /// from that origin. Application is idempotent for OR-Set operations
    /// and monotonic for LWW updates.
    pub fn apply_delta(&mut self, delta: &Delta) -> Result<bool, CatalogError> {
        let body = &delta.body;
        let seen = self.clock.get(&body.origin);
        let incoming = body.clock.get(&body.origin);

        if incoming <= seen {
            debug!(
                origin = %body.origin,
                incoming,
                seen,
                "dropping causally duplicate delta"
            );
            return Ok(false);
        }

        match (body.kind, body.scope) {
            (DeltaKind::OrSetAdd, scope @ (Scope::Snapshots | Scope::Images)) => {
                let tag: Tag = from_borsh_slice(&body.payload).map_err(|_| {
                    CatalogError::MalformedPayload {
                        kind: body.kind,
                        scope: body.scope,
                    }
                })?;
                self.set_for(scope).add(body.entity_id.clone(), tag);
            }
            (DeltaKind::OrSetRemove, scope @ (Scope::Snapshots | Scope::Images)) => {
                let tags = from_borsh_slice(&body.payload).map_err(|_| {
                    CatalogError::MalformedPayload {
                        kind: body.kind,
                        scope: body.scope,
                    }
                })?;
                self.set_for(scope).apply_remove(&body.entity_id, &tags);
            }
            (DeltaKind::LwwUpdate, scope @ (Scope::SnapshotMeta | Scope::ImageMeta)) => {
                let metadata: Metadata = from_borsh_slice(&body.payload).map_err(|_| {
                    CatalogError::MalformedPayload {
                        kind: body.kind,
                        scope: body.scope,
                    }
                })?;
                let incoming_register =
                    LwwRegister::new(metadata, body.timestamp, body.origin.clone());
                let map = match scope {
                    Scope::SnapshotMeta => &mut self.snapshot_meta,
                    Scope::ImageMeta => &mut self.image_meta,
                    Scope::Snapshots | Scope::Images => unreachable!("matched above"),
                };
                match map.get_mut(&body.entity_id) {
                    Some(register) => register.merge(&incoming_register),
                    None => {
                        let _ = map.insert(body.entity_id.clone(), incoming_register);
                    }
                }
            }
            (kind, scope) => {
                return Err(CatalogError::KindScopeMismatch { kind, scope });
            }
        }

        self.clock.merge(&body.clock);
        self.persist()?;
        Ok(true)
    }

    /// Deltas awaiting broadcast acknowledgement, oldest first.
    #[must_use]
    pub fn pending_deltas(&self) -> Vec<Delta> {
        self.outgoing.iter().cloned().collect()
    }

    /// Drops queued deltas whose clock snapshot is covered by `up_to`.
    pub fn drain_confirmed_deltas(&mut self, up_to: &VectorClock) -> Result<(), CatalogError> {
        self.outgoing.retain(|delta| {
            !matches!(
                delta.body.clock.compare(up_to),
                ClockOrdering::Less | ClockOrdering::Equal
            )
        });
        self.persist()
    }

    /// Serializes the whole replica state for anti-entropy repair.
    pub fn full_bundle(&self) -> Result<Vec<u8>, CatalogError> {
        let bundle = CatalogBundle {
            clock: self.clock.clone(),
            snapshots: self.snapshots.clone(),
            images: self.images.clone(),
            snapshot_meta: self.snapshot_meta.clone(),
            image_meta: self.image_meta.clone(),
        };
        Ok(to_borsh_vec(&bundle).expect("bundle serializes"))
    }

    /// Merges a peer's full-state bundle into this replica.
    pub fn merge_bundle(&mut self, bytes: &[u8]) -> Result<(), CatalogError> {
        let bundle: CatalogBundle = from_borsh_slice(bytes)
            .map_err(|_| CatalogError::CorruptState("bundle".to_owned()))?;

        self.clock.merge(&bundle.clock);
        self.snapshots.merge(&bundle.snapshots);
        self.images.merge(&bundle.images);
        for (id, register) in &bundle.snapshot_meta {
            match self.snapshot_meta.get_mut(id) {
                Some(existing) => existing.merge(register),
                None => {
                    let _ = self.snapshot_meta.insert(id.clone(), register.clone());
                }
            }
        }
        for (id, register) in &bundle.image_meta {
            match self.image_meta.get_mut(id) {
                Some(existing) => existing.merge(register),
                None => {
                    let _ = self.image_meta.insert(id.clone(), register.clone());
                }
            }
        }

        self.persist()
    }

    /// Canonical Merkle root over the replica's visible state.
    ///
    /// Leaves are `(scope, id, timestamp, node, payload-hash)` tuples for
    /// every present entity, sorted by scope then id; two replicas whose
    /// delta histories converge compute the same root byte for byte.
    #[must_use]
    pub fn state_root(&self) -> Hash {
        let mut leaves = Vec::new();

        for (scope, set, meta) in [
            (Scope::Snapshots, &self.snapshots, &self.snapshot_meta),
            (Scope::Images, &self.images, &self.image_meta),
        ] {
            for id in set.elements() {
                let register = meta.get(id);
                let timestamp = register.map_or(0, LwwRegister::timestamp);
                let node = register.map_or_else(String::new, |r| r.node().to_string());
                let payload_hash = register.map_or(Hash::ZERO, |r| {
                    Hash::digest(to_borsh_vec(r.get()).expect("metadata serializes"))
                });

                let leaf = to_borsh_vec(&(scope, id, timestamp, node, *payload_hash.as_bytes()))
                    .expect("leaf tuple serializes");
                leaves.push(Hash::digest(leaf));
            }
        }

        if leaves.is_empty() {
            return Hash::ZERO;
        }
        build_root(&leaves).expect("leaf list is non-empty")
    }

    /// Present snapshot ids with their metadata, lexicographically
    /// sorted, optionally filtered by id prefix.
    #[must_use]
    pub fn list_snapshots(&self, prefix: Option<&str>) -> Vec<EntityRecord> {
        self.list(&self.snapshots, &self.snapshot_meta, prefix)
    }

    #[must_use]
    pub fn list_images(&self, prefix: Option<&str>) -> Vec<EntityRecord> {
        self.list(&self.images, &self.image_meta, prefix)
    }

    fn list(
        &self,
        set: &OrSet<String>,
        meta: &BTreeMap<String, LwwRegister<Metadata>>,
        prefix: Option<&str>,
    ) -> Vec<EntityRecord> {
        set.elements()
            .filter(|id| prefix.map_or(true, |p| id.starts_with(p)))
            .map(|id| Self::record(id, true, meta.get(id)))
            .collect()
    }

    #[must_use]
    pub fn get_snapshot(&self, id: &str) -> EntityRecord {
        Self::record(
            id,
            self.snapshots.contains(&id.to_owned()),
            self.snapshot_meta.get(id),
        )
    }

    #[must_use]
    pub fn get_image(&self, id: &str) -> EntityRecord {
        Self::record(
            id,
            self.images.contains(&id.to_owned()),
            self.image_meta.get(id),
        )
    }

    fn record(id: &str, present: bool, register: Option<&LwwRegister<Metadata>>) -> EntityRecord {
        EntityRecord {
            id: id.to_owned(),
            present,
            metadata: register.map(|r| r.get().clone()),
            updated_at: register.map(LwwRegister::timestamp),
            updated_by: register.map(|r| r.node().clone()),
        }
    }
}

#[cfg(test)]
#[path = "tests/catalog.rs"]
mod tests;
