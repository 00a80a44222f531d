//! Walk through the script-settings flow.
//!
//! Usage: `settings_demo [LMDB_DIR]`. Without a directory the in-memory
//! backends are used.

use std::error::Error;
use std::sync::Arc;

use serde_json::json;
use strata_settings::{
    init_logging, LmdbProvider, LoggingConfig, MemoryProvider, Settings, SettingsService,
    StoreProvider,
};

fn run<P: StoreProvider>(service: &SettingsService<P>) -> Result<(), Box<dyn Error>> {
    let mut settings = service.script_settings();
    println!("{}", settings);

    settings
        .set_property("email", "a@example.com")?
        .set_property("config", &json!({"retries": 3}))?;
    print_property(&settings, "email")?;
    print_property(&settings, "config")?;

    let fresh = service.script_settings();
    print_property(&fresh, "config")?;

    settings.delete_property("email")?;
    print_property(&settings, "email")?;

    let stats = fresh.stats();
    println!(
        "fresh instance: {} reads, hit rate {:.2}",
        stats.reads(),
        stats.hit_rate()
    );
    Ok(())
}

fn print_property<P: StoreProvider>(
    settings: &Settings<P>,
    key: &str,
) -> Result<(), Box<dyn Error>> {
    match settings.get_property(key)? {
        Some(value) => println!("{key} = {value}"),
        None => println!("{key} is not set"),
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    init_logging(&LoggingConfig::from_env())?;

    match std::env::args().nth(1) {
        Some(dir) => {
            let provider = Arc::new(LmdbProvider::open(&dir, 64)?);
            run(&SettingsService::from_env(provider)?)
        }
        None => run(&SettingsService::from_env(Arc::new(MemoryProvider::new()))?),
    }
}
