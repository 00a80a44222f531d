use serde_json::json;
use std::sync::Arc;
use strata_settings::{LmdbProvider, Scope, SettingsService};
use tempfile::TempDir;

fn open(dir: &TempDir) -> Arc<LmdbProvider> {
    Arc::new(LmdbProvider::open(dir.path(), 16).expect("open lmdb provider"))
}

#[test]
fn script_scenario_over_lmdb() {
    let dir = TempDir::new().expect("temp dir");
    let service = SettingsService::new(open(&dir));

    let mut settings = service.script_settings();
    settings
        .set_property("email", "a@example.com")
        .expect("set email")
        .set_property("config", &json!({"retries": 3}))
        .expect("set config");

    let fresh = service.script_settings();
    assert_eq!(fresh.get_property("email").unwrap(), Some(json!("a@example.com")));
    assert_eq!(fresh.get_property("config").unwrap(), Some(json!({"retries": 3})));

    settings.delete_property("email").expect("delete email");
    assert_eq!(settings.get_property("email").unwrap(), None);
    assert_eq!(fresh.get_property("email").unwrap(), None);
}

#[test]
fn values_survive_reopen() {
    let dir = TempDir::new().expect("temp dir");
    {
        let service = SettingsService::new(open(&dir));
        service
            .user_settings()
            .set_properties([("theme", json!("dark")), ("font_size", json!(14))], false)
            .expect("write batch");
    }

    let service = SettingsService::new(open(&dir));
    let settings = service.user_settings();
    assert_eq!(settings.get_keys().unwrap(), vec!["font_size", "theme"]);
    assert_eq!(settings.get_property("font_size").unwrap(), Some(json!(14)));
    assert_eq!(service.document_settings().get_keys().unwrap(), Vec::<String>::new());
}

#[test]
fn delete_all_over_lmdb() {
    let dir = TempDir::new().expect("temp dir");
    let service = SettingsService::new(open(&dir));
    let mut settings = service.settings(Scope::Document);
    settings
        .set_properties([("a", 1), ("b", 2), ("c", 3)], false)
        .expect("write batch");

    settings.delete_all_properties().expect("delete all");
    assert!(settings.get_properties().unwrap().is_empty());
    assert!(service.document_settings().get_keys().unwrap().is_empty());
}
