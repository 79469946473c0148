// querytree/src/backup/logic.rs
use std::path::PathBuf;

use crate::backup::materialize::Materializer;
use crate::backup::source::{Database, PgDatabase, RowSource};
use crate::backup::validate::validate_shape;
use crate::config::{ConnectionSettings, Settings, load_query};
use crate::errors::Result;
use crate::utils::paths::ResolvedPath;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub files_written: u64,
    pub storage: PathBuf,
}

/// Exports a query result into a folder tree.
///
/// `project_dir` holds `settings.json` and `query.sql`; a relative storage
/// folder is resolved against it as well.
#[derive(Debug, Clone)]
pub struct BackupTool {
    project_dir: PathBuf,
}

impl BackupTool {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        BackupTool {
            project_dir: project_dir.into(),
        }
    }

    /// Runs the export against the PostgreSQL server from the settings,
    /// printing one line per created file.
    pub fn create_backup(&self) -> Result<BackupReport> {
        self.create_backup_with(PgDatabase::connect, |target| {
            println!("Файл {} успешно создан", target.display.display());
        })
    }

    /// Runs the export with a caller-supplied connection factory.
    ///
    /// Settings and query are loaded before connecting. The session is dropped,
    /// and so released, before this returns, whether or not the export succeeded.
    pub fn create_backup_with<D, C, R>(&self, connect: C, on_written: R) -> Result<BackupReport>
    where
        D: Database,
        C: FnOnce(&ConnectionSettings) -> Result<D>,
        R: FnMut(&ResolvedPath),
    {
        let settings = Settings::load(&self.project_dir)?;
        let query = load_query(&self.project_dir)?;

        println!("Подключение к базе данных");
        let mut database = connect(&settings.connection)?;
        let result = export_query(&mut database, &query, &settings, on_written);
        drop(database);
        result
    }
}

fn export_query<D, R>(
    database: &mut D,
    query: &str,
    settings: &Settings,
    on_written: R,
) -> Result<BackupReport>
where
    D: Database,
    R: FnMut(&ResolvedPath),
{
    let rows = database.execute(query)?;
    validate_shape(&rows.shape())?;

    let materializer = Materializer::new(&settings.target_root, settings.overwrite);
    let files_written = materializer.run(rows, on_written)?;

    Ok(BackupReport {
        files_written,
        storage: settings.target_root.absolute().to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::source::ExportRow;
    use crate::backup::source::memory::MemoryDatabase;
    use crate::config::{QUERY_FILE_NAME, SETTINGS_FILE_NAME};
    use crate::errors::BackupError;
    use serde_json::json;
    use std::cell::Cell;
    use std::fs;
    use std::path::Path;
    use std::rc::Rc;
    use tempfile::TempDir;

    const QUERY: &str = "SELECT folder, name, body FROM documents ORDER BY id";

    fn row(folder: &str, file_name: &str, content: &str) -> Result<ExportRow> {
        Ok(ExportRow {
            folder: folder.to_string(),
            file_name: file_name.to_string(),
            content: content.to_string(),
        })
    }

    fn project(overwriting: bool) -> anyhow::Result<TempDir> {
        let dir = tempfile::tempdir()?;
        let settings = json!({
            "connection": {"host": "localhost", "dbname": "docs", "user": "reader"},
            "storage": "out",
            "overwriting": overwriting
        });
        fs::write(dir.path().join(SETTINGS_FILE_NAME), settings.to_string())?;
        fs::write(dir.path().join(QUERY_FILE_NAME), QUERY)?;
        Ok(dir)
    }

    struct Run {
        result: Result<BackupReport>,
        lines: Vec<String>,
        closed: Rc<Cell<bool>>,
        pulled: Rc<Cell<usize>>,
        queries: Vec<String>,
    }

    fn run(dir: &Path, db: MemoryDatabase) -> Run {
        let closed = db.closed.clone();
        let pulled = db.pulled.clone();
        let queries = db.queries.clone();
        let mut lines = Vec::new();

        let result = BackupTool::new(dir).create_backup_with(
            |connection: &ConnectionSettings| {
                assert_eq!(connection.params.get("dbname"), Some(&"docs".to_string()));
                Ok(db)
            },
            |target| lines.push(target.display_string()),
        );

        let queries = queries.borrow().clone();
        Run {
            result,
            lines,
            closed,
            pulled,
            queries,
        }
    }

    #[test]
    fn test_exports_rows_into_storage_folder() -> anyhow::Result<()> {
        let dir = project(false)?;
        let db = MemoryDatabase::new(
            3,
            vec![row("a/b", "f.txt", "hello"), row("a/b", "g.txt", "world")],
        );

        let run = run(dir.path(), db);

        let report = run.result?;
        assert_eq!(report.files_written, 2);
        assert_eq!(report.storage, dir.path().join("out"));
        assert_eq!(run.lines, vec!["out/a/b/f.txt", "out/a/b/g.txt"]);
        assert_eq!(run.queries, vec![QUERY.to_string()]);
        assert_eq!(fs::read_to_string(dir.path().join("out/a/b/f.txt"))?, "hello");
        assert_eq!(fs::read_to_string(dir.path().join("out/a/b/g.txt"))?, "world");
        assert!(run.closed.get());
        Ok(())
    }

    #[test]
    fn test_two_columns_abort_before_any_row() -> anyhow::Result<()> {
        let dir = project(false)?;
        let db = MemoryDatabase::new(2, vec![row("a", "f.txt", "x")]);

        let run = run(dir.path(), db);

        match &run.result {
            Err(err @ BackupError::ColumnCount { count: 2, noun }) => {
                assert_eq!(*noun, "столбцов");
                assert!(err.to_string().contains("2 столбцов"));
            }
            other => panic!("expected ColumnCount, got {:?}", other),
        }
        assert_eq!(run.pulled.get(), 0);
        assert!(!dir.path().join("out").exists());
        assert!(run.closed.get());
        Ok(())
    }

    #[test]
    fn test_empty_result_aborts_and_releases_connection() -> anyhow::Result<()> {
        let dir = project(true)?;
        let run = run(dir.path(), MemoryDatabase::new(3, Vec::new()));

        assert!(matches!(run.result, Err(BackupError::EmptyResult)));
        assert!(run.lines.is_empty());
        assert!(!dir.path().join("out").exists());
        assert!(run.closed.get());
        Ok(())
    }

    #[test]
    fn test_exclusive_rerun_names_colliding_file() -> anyhow::Result<()> {
        let dir = project(false)?;
        let rows = || vec![row("a/b", "f.txt", "hello"), row("a/b", "g.txt", "world")];

        run(dir.path(), MemoryDatabase::new(3, rows())).result?;
        let second = run(dir.path(), MemoryDatabase::new(3, rows()));

        match &second.result {
            Err(BackupError::FileExists { path }) => assert_eq!(path, "out/a/b/f.txt"),
            other => panic!("expected FileExists, got {:?}", other),
        }
        assert!(second.lines.is_empty());
        assert!(second.closed.get());
        Ok(())
    }

    #[test]
    fn test_overwrite_rerun_leaves_same_tree() -> anyhow::Result<()> {
        let dir = project(true)?;
        let rows = || vec![row("a", "1.txt", "one"), row("a/b", "2.txt", "two")];

        run(dir.path(), MemoryDatabase::new(3, rows())).result?;
        let second = run(dir.path(), MemoryDatabase::new(3, rows()));

        assert_eq!(second.result?.files_written, 2);
        assert_eq!(fs::read_to_string(dir.path().join("out/a/1.txt"))?, "one");
        assert_eq!(fs::read_to_string(dir.path().join("out/a/b/2.txt"))?, "two");
        assert_eq!(fs::read_dir(dir.path().join("out/a"))?.count(), 2);
        Ok(())
    }

    #[test]
    fn test_row_failure_keeps_earlier_files_and_releases_connection() -> anyhow::Result<()> {
        let dir = project(true)?;
        let db = MemoryDatabase::new(
            3,
            vec![row("a", "1.txt", "one"), row("a", "", "nameless"), row("a", "3.txt", "three")],
        );

        let run = run(dir.path(), db);

        assert!(matches!(run.result, Err(BackupError::InvalidPath { .. })));
        assert_eq!(run.lines, vec!["out/a/1.txt"]);
        assert!(dir.path().join("out/a/1.txt").is_file());
        assert!(!dir.path().join("out/a/3.txt").exists());
        assert!(run.closed.get());
        Ok(())
    }

    #[test]
    fn test_missing_query_fails_before_connecting() -> anyhow::Result<()> {
        let dir = project(true)?;
        fs::remove_file(dir.path().join(QUERY_FILE_NAME))?;
        let connected = Cell::new(false);

        let result = BackupTool::new(dir.path()).create_backup_with(
            |_: &ConnectionSettings| {
                connected.set(true);
                Ok(MemoryDatabase::new(3, Vec::new()))
            },
            |_| {},
        );

        match result {
            Err(BackupError::MissingArtifact { name }) => assert_eq!(name, QUERY_FILE_NAME),
            other => panic!("expected MissingArtifact, got {:?}", other),
        }
        assert!(!connected.get());
        Ok(())
    }

    #[test]
    fn test_connection_failure_is_propagated() -> anyhow::Result<()> {
        let dir = project(true)?;

        let result = BackupTool::new(dir.path()).create_backup_with(
            |connection: &ConnectionSettings| {
                // an unknown libpq keyword makes the descriptor itself invalid
                let mut connection = connection.clone();
                connection.params.insert("flavour".to_string(), "x".to_string());
                PgDatabase::connect(&connection)
            },
            |_| {},
        );

        match result {
            Err(BackupError::Connection { name, .. }) => assert_eq!(name, SETTINGS_FILE_NAME),
            other => panic!("expected Connection, got {:?}", other.map(|r| r.files_written)),
        }
        Ok(())
    }
}
