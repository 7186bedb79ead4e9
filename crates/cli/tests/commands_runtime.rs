use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use ordermate_cli::commands::{doctor, migrate, order};
use ordermate_core::config::{AppConfig, StoreBackend};
use ordermate_core::domain::customer::{Customer, CustomerLookup};
use ordermate_core::domain::order::{ItemMap, LineItem, Order};
use ordermate_db::open_store;
use serde_json::Value;

#[test]
fn migrate_returns_success_with_sqlite_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = sqlite_url(dir.path());

    with_env(&[("ORDERMATE_STORE_BACKEND", "sqlite"), ("ORDERMATE_STORE_URL", &url)], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert!(dir.path().join("ordermate.db").exists());
    });
}

#[test]
fn migrate_is_a_noop_for_memory_store() {
    with_env(&[("ORDERMATE_STORE_BACKEND", "memory")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["message"], "store backend `memory` has no schema to migrate");
    });
}

#[test]
fn migrate_returns_config_failure_for_unknown_backend() {
    with_env(&[("ORDERMATE_STORE_BACKEND", "postgres")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn order_prints_a_stored_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = sqlite_url(dir.path());
    let order_id = seed_order(&url);

    with_env(&[("ORDERMATE_STORE_BACKEND", "sqlite"), ("ORDERMATE_STORE_URL", &url)], || {
        let result = order::run(&order_id);
        assert_eq!(result.exit_code, 0, "expected order lookup success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "order");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"]["id"], order_id.as_str());
        assert_eq!(payload["data"]["status"], "PLACED");
        assert_eq!(payload["data"]["items"][0]["sku"], "007");
        assert_eq!(payload["data"]["shipping_address"], "1 Orchard Rd");
    });
}

#[test]
fn order_reports_missing_orders() {
    with_env(&[("ORDERMATE_STORE_BACKEND", "memory")], || {
        let result = order::run("nope");
        assert_eq!(result.exit_code, 6);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "lookup");
        assert_eq!(payload["message"], "order `nope` not found");
    });
}

#[test]
fn order_reports_unreachable_store_separately_from_missing_orders() {
    with_env(
        &[("ORDERMATE_STORE_BACKEND", "rtdb"), ("ORDERMATE_STORE_RTDB_URL", "http://127.0.0.1:9")],
        || {
            let result = order::run("o-1");
            assert_eq!(result.exit_code, 4, "expected store failure: {}", result.output);

            let payload = parse_payload(&result.output);
            assert_eq!(payload["status"], "error");
            assert_eq!(payload["error_class"], "store_connectivity");
            assert!(payload["message"]
                .as_str()
                .is_some_and(|message| message.starts_with("store read failed")));
        },
    );
}

#[test]
fn doctor_json_reports_each_check() {
    with_env(&[("ORDERMATE_STORE_BACKEND", "memory"), ("ORDERMATE_LLM_PROVIDER", "ollama")], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 0, "expected passing doctor report: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");
        let names: Vec<_> = payload["checks"]
            .as_array()
            .map(|checks| checks.iter().filter_map(|check| check["name"].as_str()).collect())
            .unwrap_or_default();
        assert_eq!(names, vec!["config_validation", "store_connectivity", "llm_credentials"]);
    });
}

fn sqlite_url(dir: &Path) -> String {
    format!("sqlite://{}", dir.join("ordermate.db").display())
}

fn seed_order(url: &str) -> String {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");

    runtime.block_on(async {
        let mut config = AppConfig::default().store;
        config.backend = StoreBackend::Sqlite;
        config.url = url.to_string();
        let store = open_store(&config).await.expect("open store");

        let customer = Customer::from_lookup(&CustomerLookup::new(
            Some("Alice"),
            Some("a@x.com"),
            Some("1 Orchard Rd"),
        ));
        store.customers.insert(customer.clone()).await.expect("insert customer");

        let items = ItemMap::from_requested(&[LineItem { sku: "007".to_string(), quantity: 2 }])
            .expect("items");
        let order = Order::place(customer.id.clone(), items, customer.address.clone());
        store.orders.insert(order.clone()).await.expect("insert order");
        order.id.0
    })
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "ORDERMATE_STORE_BACKEND",
        "ORDERMATE_STORE_URL",
        "ORDERMATE_STORE_RTDB_URL",
        "ORDERMATE_STORE_RTDB_AUTH",
        "ORDERMATE_STORE_MAX_CONNECTIONS",
        "ORDERMATE_STORE_TIMEOUT_SECS",
        "FIREBASE_RTDB_URL",
        "ORDERMATE_LLM_PROVIDER",
        "ORDERMATE_LLM_API_KEY",
        "ORDERMATE_LLM_BASE_URL",
        "ORDERMATE_LLM_MODEL",
        "ORDERMATE_LLM_TIMEOUT_SECS",
        "ORDERMATE_LLM_TEMPERATURE",
        "ORDERMATE_LLM_MAX_TOKENS",
        "OPENAI_API_KEY",
        "OPENAI_MODEL",
        "OPENAI_MAX_TOKENS",
        "ORDERMATE_SERVER_BIND_ADDRESS",
        "ORDERMATE_SERVER_PORT",
        "ORDERMATE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "ORDERMATE_SESSION_IDLE_TTL_SECS",
        "ORDERMATE_SESSION_MAX_SESSIONS",
        "ORDERMATE_LOGGING_LEVEL",
        "ORDERMATE_LOGGING_FORMAT",
        "ORDERMATE_LOG_LEVEL",
        "ORDERMATE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
