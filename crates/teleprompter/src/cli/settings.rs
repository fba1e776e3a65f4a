//! CLI handlers for `show`, `export` and `import`.
//!
//! All three work on the persisted settings only. Live playback, timer
//! progress and messages are never stored.

use std::fs;
use std::path::Path;

use chrono::Utc;
use teleprompter_core::config::StorageKeys;
use teleprompter_core::exchange::{ExportData, ImportData};
use teleprompter_core::settings::{load_settings, save_settings};
use teleprompter_core::state::{SharedState, TimerMode};
use teleprompter_core::store::{FileStore, KeyValueStore};

use super::CliError;
use crate::config::Config;

/// Print the persisted settings.
pub fn handle_show(config: &Config, json: bool) -> Result<(), CliError> {
    let store = FileStore::open(&config.store_dir)?;
    let (state, loaded) = load_state(&store, &config.sync.keys);

    if json {
        println!("{}", ExportData::from_state(&state, Utc::now()).to_json_pretty()?);
        return Ok(());
    }

    if loaded == 0 {
        println!("No saved settings in {}, showing defaults.", config.store_dir.display());
        println!();
    }
    print!("{}", summarize(&state));
    Ok(())
}

/// Write the export JSON to `output`, or stdout.
pub fn handle_export(config: &Config, output: Option<&Path>) -> Result<(), CliError> {
    let store = FileStore::open(&config.store_dir)?;
    let (state, _) = load_state(&store, &config.sync.keys);
    let json = ExportData::from_state(&state, Utc::now()).to_json_pretty()?;

    match output {
        Some(path) => {
            fs::write(path, json).map_err(|source| CliError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            println!("Exported {} presenter(s) to {}", state.presenters.len(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Import `file` into the store.
pub fn handle_import(config: &Config, file: &Path, dry_run: bool) -> Result<(), CliError> {
    let text = fs::read_to_string(file).map_err(|source| CliError::Io {
        path: file.to_path_buf(),
        source,
    })?;
    let store = FileStore::open(&config.store_dir)?;
    let state = import_into(&store, &config.sync.keys, &text, !dry_run)?;

    if dry_run {
        println!("Dry run, nothing saved. Settings after import would be:");
        println!();
    } else {
        println!("Imported {} into {}", file.display(), config.store_dir.display());
        println!();
    }
    print!("{}", summarize(&state));
    Ok(())
}

/// Persisted settings applied over the default state, plus how many keys were found.
fn load_state(store: &dyn KeyValueStore, keys: &StorageKeys) -> (SharedState, usize) {
    let mut state = SharedState::default();
    let loaded = load_settings(store, keys, &mut state);
    (state, loaded)
}

/// Apply import `text` over the stored settings, saving them when `save` is set.
///
/// Sections missing from the file keep their stored values.
fn import_into(store: &dyn KeyValueStore, keys: &StorageKeys, text: &str, save: bool) -> Result<SharedState, CliError> {
    let data = ImportData::from_json(text)?;
    data.validate()?;

    let (mut state, _) = load_state(store, keys);
    data.apply_to(&mut state);
    if save {
        save_settings(store, keys, &state)?;
    }
    Ok(state)
}

fn summarize(state: &SharedState) -> String {
    let mut out = String::new();
    out.push_str(&format!("Mode:       {}\n", state.mode));
    out.push_str(&format!("Speed:      {}\n", state.speed));
    out.push_str(&format!("Font size:  {}\n", state.font_size));
    out.push_str(&format!(
        "Timer:      {} ({})\n",
        format_duration(state.duration_ms),
        match state.timer_mode {
            TimerMode::Up => "count up",
            TimerMode::Down => "count down",
        }
    ));
    out.push_str(&format!("Presenters: {}\n", state.presenters.len()));
    for presenter in &state.presenters {
        let marker = if state.selected_presenter_id == Some(presenter.id) {
            "*"
        } else {
            " "
        };
        out.push_str(&format!(
            "  {marker} [{}] {} ({} words)\n",
            presenter.id,
            presenter.name,
            presenter.script.split_whitespace().count()
        ));
    }
    out
}

fn format_duration(ms: u64) -> String {
    let total_secs = ms / 1000;
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use teleprompter_core::state::{AppMode, Presenter};
    use tempfile::TempDir;

    fn store() -> (TempDir, FileStore) {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_empty_store_loads_defaults() {
        let (_dir, store) = store();
        let (state, loaded) = load_state(&store, &StorageKeys::default());
        assert_eq!(loaded, 0);
        assert_eq!(state, SharedState::default());
    }

    #[test]
    fn test_import_saves_and_show_reads_back() {
        let (_dir, store) = store();
        let keys = StorageKeys::default();
        let text = r#"{
            "version": 1,
            "settings": { "speed": 3, "fontSize": 56, "mode": "timer" },
            "timer": { "timerMode": "down", "durationMs": 600000 },
            "presenters": [
                { "id": 4, "name": "Ada", "script": "Hello there" },
                { "id": 9, "name": "Bo", "script": "" }
            ]
        }"#;

        import_into(&store, &keys, text, true).unwrap();

        let (state, loaded) = load_state(&store, &keys);
        assert_eq!(loaded, 4);
        assert_eq!(state.speed, 3.0);
        assert_eq!(state.font_size, 56.0);
        assert_eq!(state.mode, AppMode::Timer);
        assert_eq!(state.timer_mode, TimerMode::Down);
        assert_eq!(state.duration_ms, 600_000);
        assert_eq!(state.presenters, vec![Presenter::new(4, "Ada", "Hello there"), Presenter::new(9, "Bo", "")]);
        assert_eq!(state.selected_presenter_id, Some(4));
    }

    #[test]
    fn test_dry_run_leaves_store_untouched() {
        let (dir, store) = store();
        let keys = StorageKeys::default();
        let state = import_into(&store, &keys, r#"{"settings": {"speed": 5}}"#, false).unwrap();
        assert_eq!(state.speed, 5.0);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_partial_import_keeps_stored_sections() {
        let (_dir, store) = store();
        let keys = StorageKeys::default();
        import_into(&store, &keys, r#"{"presenters": [{"id": 2, "name": "Cy", "script": "x"}]}"#, true).unwrap();
        import_into(&store, &keys, r#"{"settings": {"fontSize": 40}}"#, true).unwrap();

        let (state, _) = load_state(&store, &keys);
        assert_eq!(state.font_size, 40.0);
        assert_eq!(state.presenters, vec![Presenter::new(2, "Cy", "x")]);
    }

    #[test]
    fn test_invalid_import_saves_nothing() {
        let (dir, store) = store();
        let keys = StorageKeys::default();
        let dup = r#"{"presenters": [{"id": 1, "name": "A"}, {"id": 1, "name": "B"}]}"#;
        assert!(import_into(&store, &keys, dup, true).is_err());
        assert!(import_into(&store, &keys, "not json", true).is_err());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_export_round_trips_through_import() {
        let (_dir, source) = store();
        let keys = StorageKeys::default();
        import_into(&source, &keys, r#"{"settings": {"speed": 2.5}, "presenters": [{"id": 3, "name": "Di"}]}"#, true)
            .unwrap();
        let (state, _) = load_state(&source, &keys);
        let json = ExportData::from_state(&state, Utc::now()).to_json_pretty().unwrap();

        let (_dir2, target) = store();
        import_into(&target, &keys, &json, true).unwrap();
        let (imported, _) = load_state(&target, &keys);
        assert_eq!(imported.speed, 2.5);
        assert_eq!(imported.presenters, state.presenters);
    }

    #[test]
    fn test_summary_marks_selected_presenter() {
        let mut state = SharedState::default();
        state.presenters = vec![Presenter::new(1, "Ada", "one two three"), Presenter::new(2, "Bo", "")];
        state.selected_presenter_id = Some(2);
        state.duration_ms = 90_000;
        let summary = summarize(&state);
        assert!(summary.contains("    [1] Ada (3 words)"));
        assert!(summary.contains("  * [2] Bo (0 words)"));
        assert!(summary.contains("Timer:      01:30"));
    }
}
