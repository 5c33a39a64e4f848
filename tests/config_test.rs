//! Config loading and defaults integration tests

use icrc_vault::config::{CanisterBinding, Config};
use tempfile::TempDir;

#[test]
fn test_config_with_all_fields() {
    let toml_str = r#"
[vault]
data_dir = "/var/lib/icrc-vault"
vault_principal = "ryjl3-tyaaa-aaaaa-aaaba-cai"
http_port = 9000
status_tx_limit = 25

[ledger]
gateway_url = "http://gateway:8080"
request_timeout_secs = 5
mock = true

[sync]
interval_secs = 0

[init]
admin_principal = "rwlgt-iiaaa-aaaaa-aaaaa-cai"
max_results = 500
max_iteration_count = 20
test_mode_enabled = true

[[init.canisters]]
name = "ckBTC ledger"
principal = "mxzaz-hqaaa-aaaar-qaada-cai"

[[init.canisters]]
name = "ckBTC indexer"
principal = "n5wcd-faaaa-aaaar-qaaea-cai"
"#;

    let config: Config = toml::from_str(toml_str).expect("valid TOML");
    assert_eq!(config.vault.http_port, 9000);
    assert_eq!(config.vault.status_tx_limit, 25);
    assert_eq!(
        config.store_path().to_str().unwrap(),
        "/var/lib/icrc-vault/vault.sled"
    );
    assert!(config.ledger.mock);
    assert_eq!(config.sync.interval_secs, 0);
    assert_eq!(config.init.max_results, Some(500));
    assert_eq!(config.init.canisters.len(), 2);
    assert!(config.validate().is_ok());
}

#[test]
fn test_out_of_range_init_fails_validation() {
    let toml_str = r#"
[vault]
vault_principal = "ryjl3-tyaaa-aaaaa-aaaba-cai"

[init]
max_results = 20000
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let err = config.validate().unwrap_err();
    assert_eq!(err.kind(), "InvalidArgument");
    assert!(err.to_string().contains("max_results"));
}

#[test]
fn test_save_and_reload() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.vault.data_dir = dir.path().to_path_buf();
    config.vault.vault_principal = Some("ryjl3-tyaaa-aaaaa-aaaba-cai".to_string());
    config.init.canisters.push(CanisterBinding {
        name: "ckBTC ledger".to_string(),
        principal: "mxzaz-hqaaa-aaaar-qaada-cai".to_string(),
    });

    config.save(config.config_path()).unwrap();
    let loaded = Config::load(config.config_path()).unwrap();

    assert_eq!(loaded.vault.data_dir, dir.path());
    assert_eq!(loaded.vault.vault_principal, config.vault.vault_principal);
    assert_eq!(loaded.init, config.init);
    assert_eq!(loaded.sync.interval_secs, 60);
}

#[test]
fn test_invalid_toml_is_invalid_data() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[vault\nhttp_port = ").unwrap();

    let err = Config::load(&path).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}
