//! The single writer of an index directory
//!
//! Mutations are serialized behind one mutex. Readers never take it: they
//! load the last published [`Snapshot`] from an `ArcSwap`.
//!
//! Commit protocol:
//! 1. Flush the live part of the buffer into a new segment directory (fsynced)
//! 2. Atomically replace `manifest.json`
//! 3. Publish the new snapshot
//!
//! A failure before step 3 leaves both the on-disk manifest and the published
//! snapshot at the previous generation, and keeps the buffer for a retry.

use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::IndexConfig;
use crate::error::{Result, SearchError};
use crate::models::{Document, DocumentId};
use crate::query::CancellationToken;
use crate::schema::Schema;
use crate::segment::{
    DocNoEntry, MergeCandidate, MergeReason, MergeScheduler, MutableBuffer,
    SegmentId, SegmentManifest, SegmentStore, SegmentSummary, SegmentWriteResult, SegmentWriter,
    TieredMergePolicy, Tombstones, Version,
};
use crate::tokenizer::Analyzer;

use super::reader::IndexReader;
use super::snapshot::{SegmentHandle, Snapshot, SnapshotInner};

/// Result of an installed merge
#[derive(Clone, Debug, PartialEq)]
pub struct MergeOutcome {
    /// Segments that were merged away
    pub merged: Vec<SegmentId>,
    /// The new segment, `None` when no live document survived
    pub segment: Option<SegmentId>,
    /// Manifest generation that made the merge durable
    pub generation: u64,
    pub live_docs: u32,
    pub reason: MergeReason,
}

/// A merge selected under the writer lock, built outside of it
struct MergePlan {
    candidate: MergeCandidate,
    snapshot: Snapshot,
    segment_id: SegmentId,
}

struct WriterState {
    /// Last durable manifest
    manifest: SegmentManifest,
    /// Loaded segments, in manifest order
    handles: Vec<Arc<SegmentHandle>>,
    /// Durable schema plus fields mapped since the last commit
    schema: Schema,
    buffer: MutableBuffer,
    /// Visible tombstones: durable ones plus deletes since the last commit
    tombstones: Tombstones,
    /// Upsert cutoffs, applied together with their replacement at commit
    deferred: Tombstones,
    next_version: Version,
    next_segment_id: SegmentId,
    delete_all_pending: bool,
    /// Tombstones changed since the last commit
    dirty: bool,
}

impl WriterState {
    fn allocate_segment_id(&mut self) -> SegmentId {
        let id = self.next_segment_id;
        self.next_segment_id = id.next();
        id
    }

    fn current_version(&self) -> Version {
        Version::new(self.next_version.0.saturating_sub(1))
    }

    /// Segments that survive the next commit
    fn surviving_handles(&self) -> &[Arc<SegmentHandle>] {
        if self.delete_all_pending {
            &[]
        } else {
            &self.handles
        }
    }

    /// Whether any entry, live or dead, exists for `doc_id`
    fn has_entries(&self, doc_id: DocumentId) -> bool {
        self.buffer.entries_of(doc_id).next().is_some()
            || self
                .surviving_handles()
                .iter()
                .any(|h| h.reader().docno_map().docnos_of(doc_id).next().is_some())
    }

    /// Whether a live entry exists for `doc_id`, pending upserts included
    fn is_live(&self, doc_id: DocumentId) -> bool {
        let dead = |e: &DocNoEntry| self.tombstones.is_dead(e) || self.deferred.is_dead(e);
        if self.buffer.entries_of(doc_id).any(|e| !dead(e)) {
            return true;
        }
        self.surviving_handles().iter().any(|h| {
            let map = h.reader().docno_map();
            map.docnos_of(doc_id)
                .filter_map(|docno| map.get(docno))
                .any(|e| !dead(e))
        })
    }

    fn has_pending_changes(&self) -> bool {
        !self.buffer.is_empty()
            || !self.deferred.is_empty()
            || self.delete_all_pending
            || self.dirty
            || self.schema != self.manifest.schema
    }
}

/// Drop tombstones that no longer match any entry
fn prune_tombstones(
    tombstones: &Tombstones,
    handles: &[Arc<SegmentHandle>],
    buffer: Option<&MutableBuffer>,
) -> Tombstones {
    let mut pruned = tombstones.clone();
    pruned.retain(|doc_id, cutoff| {
        handles
            .iter()
            .any(|h| h.reader().docno_map().has_version_at_most(doc_id, cutoff))
            || buffer.map_or(false, |b| b.has_version_at_most(doc_id, cutoff))
    });
    pruned
}

struct WriterShared {
    store: SegmentStore,
    config: IndexConfig,
    analyzer: Analyzer,
    state: Mutex<WriterState>,
    published: ArcSwap<SnapshotInner>,
    /// Lock order: `state` before `scheduler`
    scheduler: Mutex<MergeScheduler>,
}

/// Handle to the writer of one index directory
///
/// Cloning is cheap; every clone drives the same writer.
#[derive(Clone)]
pub struct IndexWriter {
    shared: Arc<WriterShared>,
}

impl IndexWriter {
    /// Open or create the index in `dir`
    ///
    /// Every segment listed in the manifest is loaded and checksum-verified.
    /// Segment directories and temp files the manifest does not reference
    /// are deleted.
    pub fn open<P: AsRef<Path>>(dir: P, config: IndexConfig) -> Result<Self> {
        let store = SegmentStore::create(dir.as_ref())?;
        let analyzer = Analyzer::new(&config.settings.analyzer)?;

        let manifest = match store.load_manifest()? {
            Some(mut manifest) => {
                if manifest.settings != config.settings {
                    return Err(SearchError::Config(format!(
                        "analyzer settings {:?} conflict with persisted settings {:?}",
                        config.settings.analyzer, manifest.settings.analyzer
                    )));
                }
                manifest.schema.reconcile(&config.schema)?;
                manifest
            }
            None => {
                let manifest = SegmentManifest::new(config.schema.clone(), config.settings.clone());
                store.save_manifest(&manifest)?;
                info!(dir = %store.base_dir().display(), "Created new index");
                manifest
            }
        };

        let mut handles = Vec::with_capacity(manifest.segment_count());
        for entry in manifest.iter() {
            let reader = store.read_segment(entry)?;
            handles.push(Arc::new(SegmentHandle::new(reader, Some(store.clone()))));
        }

        let removed = store.cleanup_orphans(&manifest)?;
        if !removed.is_empty() {
            info!(removed = removed.len(), "Recovered from interrupted commit or merge");
        }

        let state = WriterState {
            schema: manifest.schema.clone(),
            buffer: MutableBuffer::new(),
            tombstones: manifest.tombstones.clone(),
            deferred: Tombstones::new(),
            next_version: manifest.next_version,
            next_segment_id: manifest.next_segment_id,
            delete_all_pending: false,
            dirty: false,
            handles,
            manifest,
        };
        let snapshot = Snapshot::new(
            state.manifest.generation,
            &state.handles,
            state.tombstones.clone(),
            state.schema.clone(),
        );

        info!(
            dir = %store.base_dir().display(),
            generation = snapshot.generation(),
            segments = snapshot.segment_count(),
            docs = snapshot.num_docs(),
            "Opened index"
        );

        let scheduler = MergeScheduler::new(config.merge_threads);
        Ok(Self {
            shared: Arc::new(WriterShared {
                store,
                config,
                analyzer,
                state: Mutex::new(state),
                published: ArcSwap::new(snapshot.into_inner()),
                scheduler: Mutex::new(scheduler),
            }),
        })
    }

    pub fn config(&self) -> &IndexConfig {
        &self.shared.config
    }

    /// The analyzer shared by indexing and query parsing
    pub fn analyzer(&self) -> &Analyzer {
        &self.shared.analyzer
    }

    pub fn directory(&self) -> &Path {
        self.shared.store.base_dir()
    }

    /// Current schema, including fields mapped since the last commit
    pub fn schema(&self) -> Schema {
        self.shared.state.lock().schema.clone()
    }

    /// Number of documents waiting for the next commit
    pub fn buffered_docs(&self) -> u32 {
        self.shared.state.lock().buffer.doc_count()
    }

    /// Last durable manifest generation
    pub fn generation(&self) -> u64 {
        self.shared.state.lock().manifest.generation
    }

    /// Current published snapshot
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from_inner(self.shared.published.load_full())
    }

    /// A reader that follows this writer's published snapshots
    pub fn reader(&self) -> IndexReader {
        IndexReader::from_writer(self.clone())
    }

    fn publish(&self, state: &WriterState) {
        let snapshot = Snapshot::new(
            state.manifest.generation,
            &state.handles,
            state.tombstones.clone(),
            state.schema.clone(),
        );
        self.shared.published.store(snapshot.into_inner());
    }

    /// Validate, analyze and buffer a document
    ///
    /// A document whose id is already present replaces it at the next
    /// commit. Crossing the buffer limits commits right away; if that commit
    /// fails the document stays buffered and the error is returned. While a
    /// `delete_all` is pending the buffer grows until the next explicit
    /// commit, so readers never see a partly refilled index.
    pub fn add_document(&self, doc: &Document) -> Result<DocumentId> {
        let mut state = self.shared.state.lock();
        let resolved = state.schema.resolve(doc)?;
        for (name, mapping) in &resolved.new_mappings {
            debug!(field = %name, kind = %mapping.kind, "Mapped new field");
            state.schema.fields.insert(name.clone(), *mapping);
        }

        let version = state.next_version;
        state.next_version = version.next();
        if state.has_entries(resolved.id) {
            state
                .deferred
                .insert(resolved.id, Version::new(version.0 - 1));
        }
        state
            .buffer
            .index_document(&resolved, &self.shared.analyzer, version);

        if !state.delete_all_pending && state.buffer.should_flush(&self.shared.config.buffer) {
            debug!(
                docs = state.buffer.doc_count(),
                bytes = state.buffer.size_bytes(),
                "Buffer full, committing"
            );
            self.commit_locked(&mut state)?;
        }
        Ok(resolved.id)
    }

    /// Tombstone every entry of `doc_id` added so far
    ///
    /// Visible to new snapshots immediately, durable at the next commit.
    /// Returns whether a live entry existed.
    pub fn delete_document(&self, doc_id: DocumentId) -> Result<bool> {
        let mut state = self.shared.state.lock();
        if !state.is_live(doc_id) {
            return Ok(false);
        }
        let cutoff = state.current_version();
        state.tombstones.insert(doc_id, cutoff);
        state.dirty = true;
        let snapshot = self.snapshot().with_changed_doc(
            doc_id,
            state.tombstones.clone(),
            state.schema.clone(),
        );
        self.shared.published.store(snapshot.into_inner());
        debug!(doc_id, cutoff = cutoff.0, "Deleted document");
        Ok(true)
    }

    /// Drop every segment and buffered document at the next commit
    pub fn delete_all(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        state.buffer.clear();
        state.deferred.clear();
        state.delete_all_pending = true;
        self.shared.scheduler.lock().clear_pending();
        info!(segments = state.handles.len(), "Deleting all documents at next commit");
        Ok(())
    }

    /// Make every pending change durable and visible
    ///
    /// Returns the new generation, or the current one when nothing is pending.
    pub fn commit(&self) -> Result<u64> {
        let mut state = self.shared.state.lock();
        self.commit_locked(&mut state)
    }

    fn commit_locked(&self, state: &mut WriterState) -> Result<u64> {
        if !state.has_pending_changes() {
            return Ok(state.manifest.generation);
        }
        let store = &self.shared.store;

        let mut tombstones = state.tombstones.clone();
        tombstones.extend(&state.deferred);

        let mut manifest = state.manifest.clone();
        let mut handles = if state.delete_all_pending {
            manifest.clear_segments();
            Vec::new()
        } else {
            state.handles.clone()
        };

        let flushed = state.buffer.doc_count();
        let mut new_segment = None;
        if !state.buffer.is_empty() {
            let deleted = state.buffer.deleted_by(&tombstones);
            if (deleted.len() as u32) < state.buffer.doc_count() {
                let id = state.allocate_segment_id();
                let result = SegmentWriter::new(id).write_from_buffer(&state.buffer, &deleted)?;
                store.write_segment(&result)?;
                manifest.add_segment(result.meta().clone(), result.checksum());
                let handle = Arc::new(SegmentHandle::new(result.reader, Some(store.clone())));
                handles.push(Arc::clone(&handle));
                new_segment = Some(handle);
            }
        }

        manifest.tombstones = prune_tombstones(&tombstones, &handles, None);
        manifest.schema = state.schema.clone();
        manifest.next_version = state.next_version;
        manifest.next_segment_id = state.next_segment_id;
        let generation = manifest.bump_generation();

        if let Err(e) = store.save_manifest(&manifest) {
            warn!(error = %e, generation = state.manifest.generation, "Commit failed, keeping previous generation");
            if let Some(handle) = &new_segment {
                if let Err(e) = store.remove_segment_dir(handle.id()) {
                    warn!(segment = %handle.id(), error = %e, "Failed to remove uncommitted segment");
                }
            }
            return Err(e.into());
        }

        if state.delete_all_pending {
            for handle in &state.handles {
                handle.mark_obsolete();
            }
        }
        state.manifest = manifest;
        state.handles = handles;
        state.tombstones = state.manifest.tombstones.clone();
        state.deferred.clear();
        state.buffer.clear();
        state.delete_all_pending = false;
        state.dirty = false;
        self.publish(state);

        info!(
            generation,
            segment = ?new_segment.as_ref().map(|h| h.id()),
            flushed,
            segments = state.handles.len(),
            tombstones = state.tombstones.len(),
            "Committed"
        );
        Ok(generation)
    }

    /// Merge-policy view of the current segments
    pub fn merge_summaries(&self) -> Vec<SegmentSummary> {
        self.snapshot().segment_summaries()
    }

    /// Run the best merge the policy finds, inline
    pub fn merge_segments(&self, policy: &TieredMergePolicy) -> Result<Option<MergeOutcome>> {
        self.merge_with_cancel(policy, &CancellationToken::new())
    }

    /// Run the best merge the policy finds, polling `cancel` while building
    pub fn merge_with_cancel(
        &self,
        policy: &TieredMergePolicy,
        cancel: &CancellationToken,
    ) -> Result<Option<MergeOutcome>> {
        let plan = self.plan_merge(|summaries, scheduler| {
            scheduler.add_candidates(policy.find_merges(summaries));
            scheduler.next_merge()
        });
        match plan {
            Some(plan) => self.run_merge(plan, cancel),
            None => Ok(None),
        }
    }

    /// Merge every segment into one
    ///
    /// Returns `None` when there is nothing to merge or a running merge
    /// holds one of the segments.
    pub fn force_merge(&self) -> Result<Option<MergeOutcome>> {
        let policy = TieredMergePolicy::new(self.shared.config.merge.clone());
        let plan = self.plan_merge(|summaries, scheduler| {
            let candidate = policy.find_forced_merge(summaries)?;
            scheduler.try_start(&candidate).then_some(candidate)
        });
        match plan {
            Some(plan) => self.run_merge(plan, &CancellationToken::new()),
            None => Ok(None),
        }
    }

    fn plan_merge<F>(&self, select: F) -> Option<MergePlan>
    where
        F: FnOnce(&[SegmentSummary], &mut MergeScheduler) -> Option<MergeCandidate>,
    {
        let mut state = self.shared.state.lock();
        if state.delete_all_pending {
            return None;
        }
        // Only committed deletes are folded into merged segments
        let snapshot = Snapshot::new(
            state.manifest.generation,
            &state.handles,
            state.manifest.tombstones.clone(),
            state.schema.clone(),
        );
        let summaries = snapshot.segment_summaries();
        let candidate = {
            let mut scheduler = self.shared.scheduler.lock();
            select(&summaries, &mut scheduler)?
        };
        let segment_id = state.allocate_segment_id();
        Some(MergePlan {
            candidate,
            snapshot,
            segment_id,
        })
    }

    fn run_merge(&self, plan: MergePlan, cancel: &CancellationToken) -> Result<Option<MergeOutcome>> {
        let result = self.build_merge(&plan, cancel);
        self.shared
            .scheduler
            .lock()
            .complete_merge(&plan.candidate.segment_ids);
        match &result {
            Err(SearchError::Cancelled) => {
                debug!(segments = ?plan.candidate.segment_ids, "Merge cancelled")
            }
            Err(e) => warn!(segments = ?plan.candidate.segment_ids, error = %e, "Merge failed"),
            Ok(_) => {}
        }
        result
    }

    fn build_merge(&self, plan: &MergePlan, cancel: &CancellationToken) -> Result<Option<MergeOutcome>> {
        let mut sources = Vec::with_capacity(plan.candidate.segment_ids.len());
        for id in &plan.candidate.segment_ids {
            match plan.snapshot.segment(*id) {
                Some(view) => sources.push((view.reader(), view.deleted())),
                None => return Ok(None),
            }
        }

        debug!(
            segments = ?plan.candidate.segment_ids,
            reason = %plan.candidate.reason,
            target = %plan.segment_id,
            "Merging segments"
        );
        let result =
            SegmentWriter::new(plan.segment_id).merge_segments(&sources, || cancel.is_cancelled())?;
        cancel.check()?;

        let written = if result.meta().doc_count > 0 {
            self.shared.store.write_segment(&result)?;
            Some(result)
        } else {
            None
        };
        self.install_merge(&plan.candidate, written)
    }

    fn discard_segment(&self, id: SegmentId) {
        if let Err(e) = self.shared.store.remove_segment_dir(id) {
            warn!(segment = %id, error = %e, "Failed to remove discarded merge output");
        }
    }

    fn install_merge(
        &self,
        candidate: &MergeCandidate,
        written: Option<SegmentWriteResult>,
    ) -> Result<Option<MergeOutcome>> {
        let mut state = self.shared.state.lock();
        let new_id = written.as_ref().map(|r| r.reader.id());
        let live_docs = written.as_ref().map_or(0, |r| r.meta().doc_count);

        let mut manifest = state.manifest.clone();
        let entry = written.as_ref().map(|r| (r.meta().clone(), r.checksum()));
        if state.delete_all_pending || !manifest.replace_segments(&candidate.segment_ids, entry) {
            if let Some(id) = new_id {
                self.discard_segment(id);
            }
            info!(segments = ?candidate.segment_ids, "Discarding merge, source segments are gone");
            return Ok(None);
        }

        let new_handle = written
            .map(|r| Arc::new(SegmentHandle::new(r.reader, Some(self.shared.store.clone()))));
        let handles: Vec<Arc<SegmentHandle>> = manifest
            .iter()
            .filter_map(|entry| match &new_handle {
                Some(handle) if handle.id() == entry.meta.id => Some(Arc::clone(handle)),
                _ => state
                    .handles
                    .iter()
                    .find(|h| h.id() == entry.meta.id)
                    .cloned(),
            })
            .collect();

        manifest.tombstones = prune_tombstones(&manifest.tombstones, &handles, None);
        manifest.next_segment_id = state.next_segment_id;
        let generation = manifest.bump_generation();

        if let Err(e) = self.shared.store.save_manifest(&manifest) {
            if let Some(id) = new_id {
                self.discard_segment(id);
            }
            return Err(e.into());
        }

        for handle in &state.handles {
            if candidate.segment_ids.contains(&handle.id()) {
                handle.mark_obsolete();
            }
        }
        state.tombstones = prune_tombstones(&state.tombstones, &handles, Some(&state.buffer));
        state.manifest = manifest;
        state.handles = handles;
        self.publish(&state);

        info!(
            generation,
            merged = ?candidate.segment_ids,
            segment = ?new_id,
            live_docs,
            reason = %candidate.reason,
            "Merged segments"
        );
        Ok(Some(MergeOutcome {
            merged: candidate.segment_ids.clone(),
            segment: new_id,
            generation,
            live_docs,
            reason: candidate.reason,
        }))
    }
}

impl std::fmt::Debug for IndexWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexWriter")
            .field("dir", &self.shared.store.base_dir())
            .finish()
    }
}
