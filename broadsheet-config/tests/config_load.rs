use broadsheet_config::BroadsheetConfigLoader;
use std::io::Write;

#[test]
fn loads_full_config_from_file() {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .expect("temp file");
    write!(
        file,
        r#"
version: "1"
pipeline:
  workers: 4
cascade:
  request_deadline_seconds: 45
  per_domain_concurrency_limit: 1
  max_network_retries: 3
validation:
  min_word_count: 200
cache:
  selector_cache_max_entries: 64
  selector_cache_ttl_days: 7
session:
  session_renewal_threshold_days: 5
rate:
  per_domain_qps: 0.25
  per_domain_burst: 1
state_db: "sqlite://state/test.db"
archive:
  endpoint: "https://mirror.example/api"
browser:
  webdriver_url: "http://localhost:4444"
  headless: false
  stealth: "Maximum"
"#
    )
    .expect("write yaml");

    let config = BroadsheetConfigLoader::new()
        .with_file(file.path())
        .load()
        .expect("valid config");

    assert_eq!(config.pipeline.workers, 4);
    assert_eq!(config.cascade.request_deadline_seconds, 45);
    assert_eq!(config.cascade.per_domain_concurrency_limit, 1);
    assert_eq!(config.cascade.max_network_retries, 3);
    assert_eq!(config.validation.min_word_count, 200);
    assert_eq!(config.cache.selector_cache_max_entries, 64);
    assert_eq!(config.session.session_renewal_threshold_days, 5);
    assert_eq!(config.state_db, "sqlite://state/test.db");
    assert_eq!(
        config.archive.as_ref().map(|a| a.endpoint.as_str()),
        Some("https://mirror.example/api")
    );
    let browser = config.browser.expect("browser settings");
    assert!(!browser.headless);
    assert_eq!(browser.webdriver_url, "http://localhost:4444");
}

#[test]
fn defaults_cover_a_minimal_file() {
    let config = BroadsheetConfigLoader::new()
        .with_yaml_str("version: 'minimal'")
        .load()
        .expect("valid config");

    assert_eq!(config.cascade.per_domain_concurrency_limit, 2);
    assert_eq!(config.validation.min_word_count, 120);
    assert_eq!(config.cache.selector_cache_ttl_days, 14);
    assert_eq!(config.rate.per_domain_burst, 2);
    assert!(config.archive.is_none());
    assert!(config.browser.is_none());
}
