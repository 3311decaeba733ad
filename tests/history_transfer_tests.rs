// Integration tests for history, environments and data export/import

use anyhow::Result;
use api_tester::config::AppPaths;
use api_tester::db::{Database, HISTORY_LIMIT};
use api_tester::models::{
    ApiRequest, ApiResponse, Environment, HistoryEntry, HistoryFilter, HttpMethod,
    RequestCollection,
};
use api_tester::transfer::{export_data, import_data, TransferScope};
use tempfile::TempDir;

fn setup() -> Result<(TempDir, Database)> {
    let temp_dir = TempDir::new()?;
    let paths = AppPaths::at(temp_dir.path());
    paths.ensure_dirs()?;
    let db = Database::init(&paths)?;
    Ok((temp_dir, db))
}

fn ok_response(status: u16) -> ApiResponse {
    ApiResponse {
        status_code: status,
        ..ApiResponse::default()
    }
}

fn entry(method: HttpMethod, url: &str, timestamp: f64) -> HistoryEntry {
    HistoryEntry {
        id: 0,
        request: ApiRequest::new(method, url),
        response: ok_response(200),
        timestamp,
    }
}

#[test]
fn test_history_is_capped_and_newest_first() -> Result<()> {
    let (_temp, db) = setup()?;
    for i in 0..(HISTORY_LIMIT + 5) {
        let request = ApiRequest::new(HttpMethod::Get, format!("https://x.io/{}", i));
        db.save_to_history(&request, &ok_response(200))?;
    }

    let history = db.get_history(HISTORY_LIMIT * 2)?;
    assert_eq!(history.len(), HISTORY_LIMIT);
    assert_eq!(history[0].request.url, format!("https://x.io/{}", HISTORY_LIMIT + 4));
    assert_eq!(history.last().unwrap().request.url, "https://x.io/5");
    Ok(())
}

#[test]
fn test_history_filters() -> Result<()> {
    let (_temp, db) = setup()?;
    db.insert_history_entry(&entry(HttpMethod::Get, "https://api.example.com/users", 1.0))?;
    db.insert_history_entry(&entry(HttpMethod::Post, "https://api.example.com/users", 2.0))?;
    db.insert_history_entry(&entry(HttpMethod::Get, "https://api.example.com/orders", 3.0))?;

    let users = db.search_history(&HistoryFilter {
        query: Some("USERS".into()),
        ..HistoryFilter::default()
    })?;
    assert_eq!(users.len(), 2);
    assert_eq!(users[0].request.method, HttpMethod::Post);

    let gets = db.search_history(&HistoryFilter {
        method: Some(HttpMethod::Get),
        limit: Some(1),
        ..HistoryFilter::default()
    })?;
    assert_eq!(gets.len(), 1);
    assert_eq!(gets[0].request.url, "https://api.example.com/orders");
    Ok(())
}

#[test]
fn test_delete_history_entry_by_id() -> Result<()> {
    let (_temp, db) = setup()?;
    let id = db.insert_history_entry(&entry(HttpMethod::Get, "https://x.io/a", 1.0))?;
    db.insert_history_entry(&entry(HttpMethod::Get, "https://x.io/b", 2.0))?;

    assert!(db.delete_history_item(id)?);
    assert!(!db.delete_history_item(id)?);
    assert!(db.get_history_item(id)?.is_none());
    assert_eq!(db.get_history(10)?.len(), 1);
    Ok(())
}

#[test]
fn test_single_active_environment() -> Result<()> {
    let (_temp, db) = setup()?;
    for name in ["dev", "staging", "prod"] {
        let mut env = Environment::new(name);
        env.is_active = true;
        db.save_environment(&env)?;
    }

    let active: Vec<String> = db
        .get_environments()?
        .into_iter()
        .filter(|e| e.is_active)
        .map(|e| e.name)
        .collect();
    assert_eq!(active, vec!["prod".to_string()]);

    assert!(db.set_active_environment("dev")?);
    assert!(!db.set_active_environment("missing")?);
    assert_eq!(db.get_active_environment()?.unwrap().name, "dev");
    Ok(())
}

#[test]
fn test_export_then_merge_import() -> Result<()> {
    let (temp, db) = setup()?;
    db.insert_history_entry(&entry(HttpMethod::Get, "https://x.io/shared", 10.0))?;
    db.insert_history_entry(&entry(HttpMethod::Get, "https://x.io/exported", 20.0))?;
    let mut staging = Environment::new("staging");
    staging.add_variable("host", "exported.example.com", "");
    db.save_environment(&staging)?;
    db.insert_collection(&RequestCollection::new("Exported", ""))?;

    let path = temp.path().join("bundle.json");
    export_data(&db, &path, TransferScope::All)?;

    // a second installation with overlapping data
    let (_other_temp, other) = setup()?;
    other.insert_history_entry(&entry(HttpMethod::Get, "https://x.io/shared", 10.0))?;
    other.insert_history_entry(&entry(HttpMethod::Post, "https://x.io/local", 30.0))?;
    let mut local_staging = Environment::new("staging");
    local_staging.add_variable("host", "local.example.com", "");
    other.save_environment(&local_staging)?;
    other.save_environment(&Environment::new("prod"))?;

    let summary = import_data(&other, &path, true)?;
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.history, Some(3));
    assert_eq!(summary.environments, Some(2));
    assert_eq!(summary.collections, Some(1));

    let urls: Vec<String> = other
        .get_history(10)?
        .into_iter()
        .map(|e| e.request.url)
        .collect();
    assert_eq!(urls, vec!["https://x.io/local", "https://x.io/exported", "https://x.io/shared"]);

    let staging = other.get_environment("staging")?.unwrap();
    assert_eq!(staging.variables_map()["host"], "exported.example.com");
    assert!(other.get_environment("prod")?.is_some());
    assert_eq!(other.list_collections()?[0].name, "Exported");
    Ok(())
}

#[test]
fn test_scoped_export_and_replace_import() -> Result<()> {
    let (temp, db) = setup()?;
    db.save_environment(&Environment::new("only-env"))?;
    db.insert_history_entry(&entry(HttpMethod::Get, "https://x.io/kept", 1.0))?;

    let path = temp.path().join("envs.json");
    export_data(&db, &path, TransferScope::Environments)?;
    let content: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert!(content.get("environments").is_some());
    assert!(content.get("history").is_none());

    db.save_environment(&Environment::new("extra"))?;
    let summary = import_data(&db, &path, false)?;
    assert_eq!(summary.environments, Some(1));
    assert_eq!(summary.history, None);

    let names: Vec<String> = db.get_environments()?.into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["only-env".to_string()]);
    // sections absent from the file are untouched
    assert_eq!(db.get_history(10)?.len(), 1);
    Ok(())
}

#[test]
fn test_import_skips_invalid_entries() -> Result<()> {
    let (temp, db) = setup()?;
    let path = temp.path().join("broken.json");
    std::fs::write(
        &path,
        r#"{"environments": [{"name": "ok", "variables": []}, 42, "nope"]}"#,
    )?;

    let summary = import_data(&db, &path, true)?;
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.environments, Some(1));
    assert!(db.get_environment("ok")?.is_some());

    assert!(import_data(&db, &temp.path().join("missing.json"), true).is_err());
    Ok(())
}
