#[cfg(test)]
mod tests {
    use mind_core::*;
    use mind_memory::{Database, MemoryStore, MindStore, TraceKind};
    use tempfile::TempDir;

    fn setup() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("mind.db")).unwrap();
        (dir, db)
    }

    // ── Memory store ───────────────────────────────────────────

    mod memory {
        use super::*;

        #[test]
        fn test_empty_query_returns_nothing() {
            let (_dir, db) = setup();
            let store = MemoryStore::new(db);
            store.save(&MemoryEntry::new("m1", "anything at all")).unwrap();
            assert!(store.search("m1", "", 5).unwrap().is_empty());
            assert!(store.search("m1", "   \t", 5).unwrap().is_empty());
        }

        #[test]
        fn test_search_respects_top_k() {
            let (_dir, db) = setup();
            let store = MemoryStore::new(db);
            for n in 0..10 {
                store
                    .save(&MemoryEntry::new("m1", format!("Alpha topic {n}")))
                    .unwrap();
            }
            let hits = store.search("m1", "alpha", 3).unwrap();
            assert!(!hits.is_empty());
            assert!(hits.len() <= 3);
            assert!(hits.iter().all(|h| !h.content.is_empty()));
        }

        #[test]
        fn test_search_matches_keywords() {
            let (_dir, db) = setup();
            let store = MemoryStore::new(db);
            store
                .save(
                    &MemoryEntry::new("m1", "Prefers short answers")
                        .with_category(category::USER_FEEDBACK)
                        .with_keywords(["brevity", "style"]),
                )
                .unwrap();
            let hits = store.search("m1", "brevity", 5).unwrap();
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].relevance_keywords, vec!["brevity", "style"]);
        }

        #[test]
        fn test_isolation_between_minds() {
            let (_dir, db) = setup();
            let store = MemoryStore::new(db);
            store.save(&MemoryEntry::new("a", "shared secret plan")).unwrap();
            store.save(&MemoryEntry::new("b", "shared secret plan")).unwrap();

            let hits = store.search("b", "secret", 10).unwrap();
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].mind_id, "b");
            assert!(store.list("b", None, None).unwrap().iter().all(|m| m.mind_id == "b"));
            assert!(store.search("c", "secret", 10).unwrap().is_empty());
        }

        #[test]
        fn test_delete_makes_entry_unsearchable() {
            let (_dir, db) = setup();
            let store = MemoryStore::new(db);
            let entry = MemoryEntry::new("m1", "ephemeral zebra fact");
            store.save(&entry).unwrap();
            assert_eq!(store.search("m1", "zebra", 5).unwrap().len(), 1);

            assert!(store.delete("m1", &entry.id).unwrap());
            assert!(store.search("m1", "zebra", 5).unwrap().is_empty());
            assert!(store.get("m1", &entry.id).unwrap().is_none());
            assert!(!store.delete("m1", &entry.id).unwrap());
        }

        #[test]
        fn test_delete_is_scoped_to_owner() {
            let (_dir, db) = setup();
            let store = MemoryStore::new(db);
            let entry = MemoryEntry::new("a", "owned by a");
            store.save(&entry).unwrap();
            assert!(!store.delete("b", &entry.id).unwrap());
            assert!(store.get("a", &entry.id).unwrap().is_some());
        }

        #[test]
        fn test_substring_fallback() {
            let (_dir, db) = setup();
            let store = MemoryStore::new(db);
            store
                .save(&MemoryEntry::new("m1", "configuration lives in the home dir"))
                .unwrap();
            // "onfig" is not a whole indexed token, only a substring.
            let hits = store.search("m1", "onfig", 5).unwrap();
            assert_eq!(hits.len(), 1);
            assert!(store.search("m1", "nowhere", 5).unwrap().is_empty());
        }

        #[test]
        fn test_unicode_search() {
            let (_dir, db) = setup();
            let store = MemoryStore::new(db);
            store.save(&MemoryEntry::new("m1", "Größe der Datei prüfen")).unwrap();
            assert_eq!(store.search("m1", "GRÖSSE größe", 5).unwrap().len(), 1);
        }

        #[test]
        fn test_list_by_category_newest_first() {
            let (_dir, db) = setup();
            let store = MemoryStore::new(db);
            let mut first = MemoryEntry::new("m1", "first").with_category(category::MIND_INSIGHT);
            first.created_at = chrono::Utc::now() - chrono::Duration::seconds(10);
            let second = MemoryEntry::new("m1", "second").with_category(category::MIND_INSIGHT);
            let other = MemoryEntry::new("m1", "other").with_category(category::TASK_RESULT);
            store.save(&first).unwrap();
            store.save(&second).unwrap();
            store.save(&other).unwrap();

            let insights = store.list("m1", Some(category::MIND_INSIGHT), None).unwrap();
            assert_eq!(
                insights.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
                vec!["second", "first"]
            );
            let latest = store
                .latest_in_category("m1", category::MIND_INSIGHT)
                .unwrap()
                .unwrap();
            assert_eq!(latest.content, "second");
            assert_eq!(store.list("m1", None, Some(2)).unwrap().len(), 2);
        }
    }

    // ── Mind store ─────────────────────────────────────────────

    mod minds {
        use super::*;

        #[test]
        fn test_mind_roundtrip_with_charter() {
            let (_dir, db) = setup();
            let store = MindStore::new(db);
            let mut mind = Mind::new("Ada");
            mind.personality = "curious".into();
            mind.preferences
                .insert("tone".into(), serde_json::json!("formal"));
            mind.charter.mission = "Ship reliable tools".into();
            store.save_mind(&mind).unwrap();

            let loaded = store.get_mind(&mind.id).unwrap().unwrap();
            assert_eq!(loaded.name, "Ada");
            assert_eq!(loaded.preferences["tone"], "formal");
            assert_eq!(loaded.charter.mission, "Ship reliable tools");
            assert!(store.get_mind("missing").unwrap().is_none());
        }

        #[test]
        fn test_save_mind_updates_in_place() {
            let (_dir, db) = setup();
            let store = MindStore::new(db);
            let mut mind = Mind::new("Ada");
            store.save_mind(&mind).unwrap();
            mind.name = "Ada II".into();
            store.save_mind(&mind).unwrap();
            let all = store.list_minds().unwrap();
            assert_eq!(all.len(), 1);
            assert_eq!(all[0].name, "Ada II");
        }

        #[test]
        fn test_task_lifecycle_and_latest() {
            let (_dir, db) = setup();
            let store = MindStore::new(db);
            let mind = Mind::new("Ada");
            store.save_mind(&mind).unwrap();

            let mut older = Task::new(&mind.id, "first task");
            older.created_at = chrono::Utc::now() - chrono::Duration::minutes(1);
            older.finish(TaskStatus::Completed, Some("done".into()));
            store.save_task(&older).unwrap();

            let mut current = Task::new(&mind.id, "second task");
            current.status = TaskStatus::Running;
            store.save_task(&current).unwrap();

            let latest = store.latest_task(&mind.id, Some(&current.id)).unwrap().unwrap();
            assert_eq!(latest.id, older.id);
            assert_eq!(latest.status, TaskStatus::Completed);
            assert_eq!(latest.result.as_deref(), Some("done"));
            assert!(latest.completed_at.is_some());

            let newest = store.latest_task(&mind.id, None).unwrap().unwrap();
            assert_eq!(newest.id, current.id);
            assert_eq!(store.list_tasks(&mind.id).unwrap().len(), 2);
        }

        #[test]
        fn test_trace_roundtrip() {
            let (_dir, db) = setup();
            let store = MindStore::new(db);
            let events = vec![
                TraceEvent::record(&RawEvent::text("hello")),
                TraceEvent::record(&RawEvent::error("boom")),
            ];
            store.save_trace(TraceKind::Task, "m1", "t1", &events).unwrap();

            let trace = store.get_trace(TraceKind::Task, "m1", "t1").unwrap().unwrap();
            assert_eq!(trace.events, events);
            assert!(store.get_trace(TraceKind::Drone, "m1", "t1").unwrap().is_none());
            assert!(store.get_trace(TraceKind::Task, "m2", "t1").unwrap().is_none());
        }

        #[test]
        fn test_drone_rows() {
            let (_dir, db) = setup();
            let store = MindStore::new(db);
            let mind = Mind::new("Ada");
            store.save_mind(&mind).unwrap();

            let mut drone = Drone::new(&mind.id, "t1", "count files");
            drone.status = TaskStatus::Running;
            store.save_drone(&drone).unwrap();
            drone.finish(TaskStatus::Failed, "Drone failed: boom".into());
            store.save_drone(&drone).unwrap();

            let loaded = store.get_drone(&mind.id, &drone.id).unwrap().unwrap();
            assert_eq!(loaded.status, TaskStatus::Failed);
            assert_eq!(store.list_drones(&mind.id, Some("t1")).unwrap().len(), 1);
            assert!(store.list_drones(&mind.id, Some("t2")).unwrap().is_empty());
        }

        #[test]
        fn test_runtime_tools_unique_per_mind() {
            let (_dir, db) = setup();
            let store = MindStore::new(db);
            let spec = RuntimeToolSpec {
                name: "greet".into(),
                description: "Say hi".into(),
                response: "hi".into(),
            };
            store.save_runtime_tool("m1", &spec).unwrap();
            store.save_runtime_tool("m2", &spec).unwrap();
            let err = store.save_runtime_tool("m1", &spec).unwrap_err();
            assert!(matches!(err, MindError::Validation(_)));
            assert_eq!(store.list_runtime_tools("m1").unwrap(), vec![spec]);
        }
    }

    // ── Migrations ─────────────────────────────────────────────

    mod migrations {
        use super::*;

        #[test]
        fn test_reopen_is_idempotent() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("mind.db");
            let db = Database::open(&path).unwrap();
            MemoryStore::new(db.clone())
                .save(&MemoryEntry::new("m1", "persisted fact"))
                .unwrap();
            drop(db);

            let db = Database::open(&path).unwrap();
            let _ = Database::open(&path).unwrap();
            let hits = MemoryStore::new(db).search("m1", "persisted", 5).unwrap();
            assert_eq!(hits.len(), 1);
        }

        #[test]
        fn test_charter_column_added_to_old_schema() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("old.db");
            {
                let conn = rusqlite::Connection::open(&path).unwrap();
                conn.execute_batch(
                    "CREATE TABLE minds (
                        id TEXT PRIMARY KEY, name TEXT NOT NULL,
                        personality TEXT NOT NULL DEFAULT '',
                        preferences TEXT NOT NULL DEFAULT '{}',
                        system_prompt TEXT NOT NULL DEFAULT '',
                        created_at TEXT NOT NULL);
                     INSERT INTO minds (id, name, created_at)
                     VALUES ('old', 'Legacy', '2024-01-01T00:00:00.000000Z');",
                )
                .unwrap();
            }
            let store = MindStore::new(Database::open(&path).unwrap());
            let mind = store.get_mind("old").unwrap().unwrap();
            assert_eq!(mind.name, "Legacy");
            assert_eq!(mind.charter, Charter::default());
        }
    }
}
