// Integration tests for the history system.
//
// These exercise the stack together with the temp-dir offload store, using
// an entry type that writes a byte payload into a buffer.

use std::sync::Arc;

use pixtile_mod_history::offload::{offload_value, reload_value};
use pixtile_mod_history::{
    HistoryConfig, HistoryEntry, OffloadService, TempDirOffloadStore, UnifiedHistoryStack,
};
use uuid::Uuid;

/// Overwrites `buffer[offset..]` with `after`; undo writes `before` back.
struct WriteEntry {
    offset: usize,
    before: Vec<u8>,
    after: Vec<u8>,
    blob: Option<Uuid>,
}

impl WriteEntry {
    fn apply(buffer: &mut [u8], offset: usize, after: Vec<u8>) -> Self {
        let before = buffer[offset..offset + after.len()].to_vec();
        buffer[offset..offset + after.len()].copy_from_slice(&after);
        Self {
            offset,
            before,
            after,
            blob: None,
        }
    }
}

impl HistoryEntry for WriteEntry {
    type Target = Vec<u8>;

    fn undo(&mut self, target: &mut Vec<u8>) {
        assert!(self.blob.is_none(), "replayed while offloaded");
        target[self.offset..self.offset + self.before.len()].copy_from_slice(&self.before);
    }

    fn redo(&mut self, target: &mut Vec<u8>) {
        assert!(self.blob.is_none(), "replayed while offloaded");
        target[self.offset..self.offset + self.after.len()].copy_from_slice(&self.after);
    }

    fn description(&self) -> &str {
        "Write"
    }

    fn icon(&self) -> &'static str {
        "pixels"
    }

    fn has_changes(&self) -> bool {
        self.before != self.after
    }

    fn estimated_bytes(&self) -> usize {
        self.before.len() + self.after.len()
    }

    fn is_offloaded(&self) -> bool {
        self.blob.is_some()
    }

    fn offload(&mut self, service: &dyn OffloadService) -> bool {
        let Some(id) = offload_value(service, &(&self.before, &self.after)) else {
            return false;
        };
        self.before = Vec::new();
        self.after = Vec::new();
        self.blob = Some(id);
        true
    }

    fn reload(&mut self, service: &dyn OffloadService) -> bool {
        let Some(id) = self.blob else {
            return true;
        };
        let Some((before, after)) = reload_value::<(Vec<u8>, Vec<u8>)>(service, id) else {
            return false;
        };
        service.remove_data(id);
        self.before = before;
        self.after = after;
        self.blob = None;
        true
    }

    fn discard(&mut self, service: &dyn OffloadService) {
        if let Some(id) = self.blob.take() {
            service.remove_data(id);
        }
    }
}

fn budget_config(max_resident_bytes: usize, keep_resident: usize) -> HistoryConfig {
    HistoryConfig {
        max_history_depth: 1000,
        max_resident_bytes,
        keep_resident,
    }
}

fn write(stack: &mut UnifiedHistoryStack<WriteEntry>, buffer: &mut Vec<u8>, offset: usize, byte: u8) {
    let entry = WriteEntry::apply(buffer, offset, vec![byte; 16]);
    stack.push(entry);
}

// ── Offload Governance ─────────────────────────────────────────────────

#[test]
fn test_over_budget_entries_are_offloaded_oldest_first() {
    let store = TempDirOffloadStore::new().unwrap();
    let mut stack = UnifiedHistoryStack::with_offload(budget_config(64, 1), store.clone());
    let mut buffer = vec![0u8; 256];

    for i in 0..6 {
        write(&mut stack, &mut buffer, i * 16, i as u8 + 1);
    }

    assert!(stack.resident_bytes() <= 64);
    assert!(stack.offloaded_count() > 0);
    assert_eq!(store.len(), stack.offloaded_count());
    // The newest entry is never offloaded
    assert!(!stack.undo_entries().last().unwrap().is_offloaded());
    assert!(stack.undo_entries().next().unwrap().is_offloaded());
}

#[test]
fn test_undo_all_through_offloaded_entries_restores_buffer() {
    let store = TempDirOffloadStore::new().unwrap();
    let mut stack = UnifiedHistoryStack::with_offload(budget_config(32, 0), store.clone());
    let original = vec![0u8; 128];
    let mut buffer = original.clone();

    for i in 0..8 {
        write(&mut stack, &mut buffer, i * 16, 0xA0 + i as u8);
    }
    let edited = buffer.clone();

    while stack.undo(&mut buffer) {}
    assert_eq!(buffer, original);

    while stack.redo(&mut buffer) {}
    assert_eq!(buffer, edited);
}

#[test]
fn test_missing_blob_fails_undo_without_mutation() {
    let store = TempDirOffloadStore::new().unwrap();
    let mut stack = UnifiedHistoryStack::with_offload(budget_config(0, 0), store.clone());
    let mut buffer = vec![0u8; 32];
    write(&mut stack, &mut buffer, 0, 9);
    assert_eq!(stack.offloaded_count(), 1);

    // Simulate disk loss of every blob
    for entry in std::fs::read_dir(store.root()).unwrap() {
        std::fs::remove_file(entry.unwrap().path()).unwrap();
    }

    let before = buffer.clone();
    assert!(!stack.undo(&mut buffer));
    assert_eq!(buffer, before);
    assert_eq!(stack.undo_count(), 1);
    assert!(stack.undo_entries().next().unwrap().is_offloaded());
}

#[test]
fn test_redo_clear_releases_blobs() {
    let store = TempDirOffloadStore::new().unwrap();
    let mut stack = UnifiedHistoryStack::with_offload(budget_config(16, 0), store.clone());
    let mut buffer = vec![0u8; 64];
    for i in 0..3 {
        write(&mut stack, &mut buffer, i * 16, 1);
    }

    // Undo everything, then branch: the redo entries are discarded
    stack.jump_to(0, &mut buffer);
    write(&mut stack, &mut buffer, 48, 2);

    assert_eq!(stack.len(), 1);
    assert_eq!(store.len(), stack.offloaded_count());
}

#[test]
fn test_eviction_releases_blobs() {
    let store = TempDirOffloadStore::new().unwrap();
    let config = HistoryConfig {
        max_history_depth: 2,
        max_resident_bytes: 0,
        keep_resident: 0,
    };
    let mut stack = UnifiedHistoryStack::with_offload(config, store.clone());
    let mut buffer = vec![0u8; 96];
    for i in 0..6 {
        write(&mut stack, &mut buffer, i * 16, 3);
    }
    assert_eq!(stack.undo_count(), 2);
    assert_eq!(store.len(), 2);
}

#[test]
fn test_background_writer_alongside_editing() {
    let store = TempDirOffloadStore::new().unwrap();
    let shared: Arc<dyn OffloadService> = store.clone();
    let housekeeping = {
        let shared = Arc::clone(&shared);
        std::thread::spawn(move || {
            (0..50)
                .map(|i| {
                    let id = Uuid::new_v4();
                    shared.write_data(id, &[i as u8; 64]).unwrap();
                    id
                })
                .collect::<Vec<_>>()
        })
    };

    let mut stack = UnifiedHistoryStack::with_offload(budget_config(32, 0), shared);
    let mut buffer = vec![0u8; 160];
    for i in 0..10 {
        write(&mut stack, &mut buffer, i * 16, 7);
    }
    while stack.undo(&mut buffer) {}
    assert!(buffer.iter().all(|b| *b == 0));

    let ids = housekeeping.join().unwrap();
    for id in ids {
        assert_eq!(store.read_data(id).map(|d| d.len()), Some(64));
    }
}

#[test]
fn test_in_memory_stack_never_offloads() {
    let mut stack = UnifiedHistoryStack::new(budget_config(0, 0));
    let mut buffer = vec![0u8; 64];
    for i in 0..4 {
        write(&mut stack, &mut buffer, i * 16, 5);
    }
    assert_eq!(stack.offloaded_count(), 0);
    assert_eq!(stack.resident_bytes(), 4 * 32);
}
