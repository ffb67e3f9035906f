//! End-to-end tests against a real SQLite database file: the full
//! connect → create schema → enforce invariants → close flow.

use rusqlite::params;
use tempfile::TempDir;

use asura_db::{init_tables, BackendKind, DatabaseManager, DbConfig, PoolError};

/// Opens a connected manager backed by `test.db` inside a fresh temp dir.
fn open_db() -> (DatabaseManager, TempDir) {
    let dir = tempfile::tempdir().expect("should create temp dir");

    let mut config = DbConfig::from_table(
        &r#"
            [database]
            type = "sqlite"
            file = "test.db"

            [pool]
            max = 1
        "#
        .parse()
        .expect("should parse test TOML"),
    );
    config.base_dir = Some(dir.path().to_path_buf());

    let mut db = DatabaseManager::new(config);
    db.connect().expect("connect should succeed");
    init_tables(&db).expect("schema creation should succeed");

    (db, dir)
}

fn insert_block(db: &DatabaseManager, chest_id: &str, world: &str, x: i64, y: i64, z: i64) {
    let conn = db.get_connection().expect("should get a connection");
    conn.as_sqlite()
        .expect("backend should be sqlite")
        .execute(
            "INSERT INTO blocks (chest_id, owner_uuid, world, pos_x, pos_y, pos_z)
             VALUES (?1, 'owner-1', ?2, ?3, ?4, ?5)",
            params![chest_id, world, x, y, z],
        )
        .expect("block insert should succeed");
}

#[test]
fn full_sqlite_lifecycle() {
    let (mut db, _dir) = open_db();
    assert_eq!(db.backend(), BackendKind::Sqlite);

    // A second schema pass is a no-op.
    init_tables(&db).expect("re-running schema creation should succeed");

    // The handle is usable.
    insert_block(&db, "c1", "world", 1, 64, 1);

    // Closing leaves the manager unusable but raises nothing.
    db.close();
    db.close();
    let err = db.get_connection().expect_err("closed manager must not connect");
    assert!(matches!(err, PoolError::NotConnected));
}

#[test]
fn duplicate_location_is_rejected() {
    let (db, _dir) = open_db();
    insert_block(&db, "c1", "world", 10, 70, -4);

    let conn = db.get_connection().expect("should get a connection");
    let err = conn
        .as_sqlite()
        .expect("backend should be sqlite")
        .execute(
            "INSERT INTO blocks (chest_id, owner_uuid, world, pos_x, pos_y, pos_z)
             VALUES ('c2', 'owner-2', 'world', 10, 70, -4)",
            [],
        )
        .expect_err("same (world, x, y, z) must violate uniqueness");
    assert!(err.to_string().contains("UNIQUE"), "unexpected error: {err}");
}

#[test]
fn same_coordinates_in_another_world_are_allowed() {
    let (db, _dir) = open_db();
    insert_block(&db, "c1", "world", 0, 0, 0);
    insert_block(&db, "c2", "world_nether", 0, 0, 0);
}

#[test]
fn access_row_requires_existing_block() {
    let (db, _dir) = open_db();

    let conn = db.get_connection().expect("should get a connection");
    let err = conn
        .as_sqlite()
        .expect("backend should be sqlite")
        .execute(
            "INSERT INTO block_access (chest_id, player_uuid) VALUES ('missing', 'p1')",
            [],
        )
        .expect_err("dangling chest_id must violate the foreign key");
    assert!(
        err.to_string().contains("FOREIGN KEY"),
        "unexpected error: {err}"
    );
}

#[test]
fn deleting_a_block_cascades_to_access_rows() {
    let (db, _dir) = open_db();
    insert_block(&db, "c1", "world", 5, 65, 5);

    let conn = db.get_connection().expect("should get a connection");
    let sqlite = conn.as_sqlite().expect("backend should be sqlite");

    sqlite
        .execute(
            "INSERT INTO block_access (chest_id, player_uuid, access_level)
             VALUES ('c1', 'p1', 'DEPOSIT'), ('c1', 'p2', 'FULL_ACCESS')",
            [],
        )
        .expect("access inserts should succeed");

    sqlite
        .execute("DELETE FROM blocks WHERE chest_id = 'c1'", [])
        .expect("block delete should succeed");

    let remaining: i64 = sqlite
        .query_row("SELECT COUNT(*) FROM block_access", [], |row| row.get(0))
        .expect("should count access rows");
    assert_eq!(remaining, 0, "access rows should be deleted with their block");
}

#[test]
fn access_level_defaults_to_readonly_and_rejects_unknown_levels() {
    let (db, _dir) = open_db();
    insert_block(&db, "c1", "world", 2, 60, 2);

    let conn = db.get_connection().expect("should get a connection");
    let sqlite = conn.as_sqlite().expect("backend should be sqlite");

    sqlite
        .execute(
            "INSERT INTO block_access (chest_id, player_uuid) VALUES ('c1', 'p1')",
            [],
        )
        .expect("access insert should succeed");

    let level: String = sqlite
        .query_row(
            "SELECT access_level FROM block_access WHERE player_uuid = 'p1'",
            [],
            |row| row.get(0),
        )
        .expect("should read access level");
    assert_eq!(level, "READONLY");

    let err = sqlite
        .execute(
            "INSERT INTO block_access (chest_id, player_uuid, access_level)
             VALUES ('c1', 'p2', 'ADMIN')",
            [],
        )
        .expect_err("unknown access level must be rejected");
    assert!(err.to_string().contains("CHECK"), "unexpected error: {err}");
}

#[test]
fn one_access_row_per_block_and_player() {
    let (db, _dir) = open_db();
    insert_block(&db, "c1", "world", 3, 61, 3);

    let conn = db.get_connection().expect("should get a connection");
    let sqlite = conn.as_sqlite().expect("backend should be sqlite");

    sqlite
        .execute(
            "INSERT INTO block_access (chest_id, player_uuid) VALUES ('c1', 'p1')",
            [],
        )
        .expect("first access insert should succeed");

    sqlite
        .execute(
            "INSERT INTO block_access (chest_id, player_uuid, access_level)
             VALUES ('c1', 'p1', 'WITHDRAW')",
            [],
        )
        .expect_err("duplicate (chest, player) pair must be rejected");
}

#[test]
fn database_file_is_created_next_to_the_config() {
    let (db, dir) = open_db();
    drop(db);
    assert!(dir.path().join("test.db").exists());
}
