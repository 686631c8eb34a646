#![deny(warnings)]

//! One-shot save migration tool: opens a save directory, runs the load
//! pipeline (which migrates any old-version document through the marker and
//! backup protocol), and re-persists the result.

use persistence::{DirStore, KvStore, SaveManager, StorageError, SAVE_KEY};

fn main() -> Result<(), StorageError> {
    let dir = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "./saves".to_string());
    let store = DirStore::new(&dir)?;
    let had_save = store.get(SAVE_KEY).is_some();
    let mut manager = SaveManager::new(store);
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    let mut state = manager.load_game(now);
    let _ = manager.save_game(&mut state, now);
    println!(
        "Save {} at {} | version {} | money ${:.2}",
        if had_save { "migrated" } else { "initialized" },
        dir,
        state.version,
        state.money
    );
    Ok(())
}
