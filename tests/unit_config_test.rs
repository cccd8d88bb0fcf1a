// tests/unit_config_test.rs

use restatic::config::Config;

#[test]
fn defaults_are_valid() {
    let config = Config::default();
    config.validate().unwrap();
    assert_eq!(config.port, 8378);
    assert_eq!(config.cache.default_ttl, 60);
    assert!(config.cache.use_sharding);
    assert!(config.stats.enabled);
    assert_eq!(config.compression.level, 6);
    assert!(config.freshness.stale_window_seconds.is_none());
}

#[test]
fn empty_toml_yields_defaults() {
    let config = Config::from_toml("").unwrap();
    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.background.timeout, 30);
}

#[test]
fn full_toml_round_trip() {
    let config = Config::from_toml(
        r#"
        host = "0.0.0.0"
        port = 9000
        log_level = "debug"

        [cache]
        dir = "data/pages"
        lock_dir = "data/locks"
        default_ttl = 300
        use_sharding = false
        variant_axes = ["device", "language"]

        [freshness]
        stale_window_seconds = 120

        [background]
        timeout = 45
        queue_depth = 256

        [stats]
        enabled = false

        [compression]
        enabled = true
        level = 9
        "#,
    )
    .unwrap();

    assert_eq!(config.port, 9000);
    assert_eq!(config.cache.default_ttl, 300);
    assert!(!config.cache.use_sharding);
    assert_eq!(config.freshness.stale_window_seconds, Some(120));
    assert_eq!(config.background.timeout, 45);
    assert!(!config.stats.enabled);
    assert_eq!(config.compression.level, 9);
}

#[test]
fn boolean_strings_are_coerced() {
    let config = Config::from_toml(
        r#"
        [cache]
        use_sharding = "0"

        [stats]
        enabled = "false"

        [compression]
        enabled = "1"
        "#,
    )
    .unwrap();
    assert!(!config.cache.use_sharding);
    assert!(!config.stats.enabled);
    assert!(config.compression.enabled);
}

#[test]
fn unknown_boolean_strings_are_rejected() {
    let err = Config::from_toml(
        r#"
        [stats]
        enabled = "yes"
        "#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("Failed to parse"));
}

#[test]
fn out_of_range_compression_level_fails_validation() {
    for level in ["0", "10"] {
        let toml = format!("[compression]\nlevel = {level}\n");
        assert!(Config::from_toml(&toml).is_err());
    }
}

#[test]
fn path_traversal_is_rejected() {
    let err = Config::from_toml(
        r#"
        [cache]
        dir = "../../etc/restatic"
        "#,
    )
    .unwrap_err();
    assert!(err.to_string().contains(".."));
}

#[test]
fn empty_cache_dir_is_rejected() {
    assert!(Config::from_toml("[cache]\ndir = \"  \"\n").is_err());
}

#[test]
fn shared_cache_and_lock_dir_is_rejected() {
    let toml = r#"
        [cache]
        dir = "same/dir"
        lock_dir = "same/dir"
    "#;
    assert!(Config::from_toml(toml).is_err());
}

#[test]
fn unknown_variant_axis_is_rejected() {
    let toml = r#"
        [cache]
        variant_axes = ["device", "favorite_color"]
    "#;
    assert!(Config::from_toml(toml).is_err());
}

#[test]
fn zero_port_is_rejected() {
    assert!(Config::from_toml("port = 0\n").is_err());
}

#[test]
fn zero_queue_depth_is_rejected() {
    assert!(Config::from_toml("[background]\nqueue_depth = 0\n").is_err());
}
