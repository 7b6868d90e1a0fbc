use std::collections::HashMap;
use std::io::Write as _;

use serial_test::serial;
use tempfile::NamedTempFile;

use super::*;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| map.get(name).cloned()
}

#[test]
fn defaults_match_service_contract() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.public_addr.to_string(), "0.0.0.0:8000");
    assert_eq!(settings.server.admin_addr.to_string(), "127.0.0.1:8001");
    assert_eq!(settings.cache.backend, CacheBackendKind::Redis);
    assert_eq!(settings.cache.host, "localhost");
    assert_eq!(settings.cache.port, 6379);
    assert_eq!(settings.cache.db, 0);
    assert_eq!(settings.cache.expiration, Duration::from_secs(600));
    assert_eq!(settings.cache.connect_timeout, Duration::from_secs(5));
    assert_eq!(settings.cache.operation_timeout, Duration::from_secs(5));
    assert_eq!(settings.generation.model, "llama-3.3-70b-versatile");
    assert_eq!(settings.generation.base_url, "https://api.groq.com/openai/v1");
    assert_eq!(settings.generation.max_tokens.get(), 1024);
    assert_eq!(settings.generation.timeout, Duration::from_secs(30));
    assert_eq!(settings.generation.fallback_delay, Duration::from_millis(500));
    assert!(settings.generation.api_key.is_none());
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.public_addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn well_known_env_maps_onto_sections() {
    let mut raw = RawSettings::default();
    raw.apply_env_overrides(env(&[
        ("GROQ_API_KEY", "gsk_test"),
        ("GROQ_MODEL", "llama-3.1-8b-instant"),
        ("REDIS_HOST", "cache.internal"),
        ("REDIS_PORT", "6380"),
        ("REDIS_DB", "2"),
        ("CACHE_EXPIRATION", "120"),
    ]))
    .expect("env applies");

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.generation.api_key.as_deref(), Some("gsk_test"));
    assert_eq!(settings.generation.model, "llama-3.1-8b-instant");
    assert_eq!(settings.cache.host, "cache.internal");
    assert_eq!(settings.cache.port, 6380);
    assert_eq!(settings.cache.db, 2);
    assert_eq!(settings.cache.expiration, Duration::from_secs(120));
}

#[test]
fn cli_beats_well_known_env() {
    let mut raw = RawSettings::default();
    raw.apply_env_overrides(env(&[("CACHE_EXPIRATION", "120")]))
        .expect("env applies");
    raw.apply_cache_overrides(&CacheOverrides {
        cache_expiration_seconds: Some(30),
        ..Default::default()
    });

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.cache.expiration, Duration::from_secs(30));
}

#[test]
fn unparseable_env_value_names_the_variable() {
    let mut raw = RawSettings::default();
    let err = raw
        .apply_env_overrides(env(&[("REDIS_PORT", "not-a-port")]))
        .expect_err("invalid port");
    assert!(matches!(err, LoadError::Invalid { key: "REDIS_PORT", .. }));
}

#[test]
fn blank_api_key_counts_as_absent() {
    let mut raw = RawSettings::default();
    raw.apply_env_overrides(env(&[("GROQ_API_KEY", "   ")]))
        .expect("env applies");
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.generation.api_key.is_none());
}

#[test]
fn empty_api_key_env_keeps_file_credential() {
    let mut raw = RawSettings::default();
    raw.generation.api_key = Some("gsk_from_file".to_string());
    raw.apply_env_overrides(env(&[("GROQ_API_KEY", "")]))
        .expect("env applies");
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.generation.api_key.as_deref(), Some("gsk_from_file"));
}

#[test]
fn zero_expiration_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.expiration_seconds = Some(0);
    let err = Settings::from_raw(raw).expect_err("zero ttl");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.expiration_seconds",
            ..
        }
    ));
}

#[test]
fn unknown_backend_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.backend = Some("memcached".to_string());
    let err = Settings::from_raw(raw).expect_err("unknown backend");
    assert!(matches!(err, LoadError::Invalid { key: "cache.backend", .. }));
}

#[test]
fn backend_name_is_case_insensitive() {
    let mut raw = RawSettings::default();
    raw.cache.backend = Some("Memory".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.cache.backend, CacheBackendKind::Memory);
}

#[test]
fn sampling_parameters_are_range_checked() {
    let mut raw = RawSettings::default();
    raw.generation.temperature = Some(2.5);
    assert!(matches!(
        Settings::from_raw(raw).expect_err("temperature"),
        LoadError::Invalid {
            key: "generation.temperature",
            ..
        }
    ));

    let mut raw = RawSettings::default();
    raw.generation.top_p = Some(0.0);
    assert!(matches!(
        Settings::from_raw(raw).expect_err("top_p"),
        LoadError::Invalid {
            key: "generation.top_p",
            ..
        }
    ));

    let mut raw = RawSettings::default();
    raw.generation.max_tokens = Some(0);
    assert!(matches!(
        Settings::from_raw(raw).expect_err("max_tokens"),
        LoadError::Invalid {
            key: "generation.max_tokens",
            ..
        }
    ));
}

#[test]
fn base_url_trailing_slash_is_trimmed() {
    let mut raw = RawSettings::default();
    raw.generation.base_url = Some("http://localhost:9000/v1/".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.generation.base_url, "http://localhost:9000/v1");
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn api_key_is_redacted_in_debug_output() {
    let mut raw = RawSettings::default();
    raw.generation.api_key = Some("gsk_secret".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    let rendered = format!("{settings:?}");
    assert!(!rendered.contains("gsk_secret"));
    assert!(rendered.contains("<redacted>"));
}

#[test]
#[serial]
fn config_file_is_layered_under_env_and_cli() {
    let mut file = toml_tmp_file();
    writeln!(
        file,
        "[cache]\nexpiration_seconds = 90\nport = 7000\n\n[server]\nport = 9000"
    )
    .expect("write config");

    let args = CliArgs::parse_from([
        "chatcache",
        "--config-file",
        file.path().to_str().expect("utf-8 path"),
        "serve",
        "--server-port",
        "9100",
    ]);

    let settings =
        load_with_env(&args, env(&[("REDIS_PORT", "7100")])).expect("settings load");
    assert_eq!(settings.cache.expiration, Duration::from_secs(90));
    assert_eq!(settings.cache.port, 7100);
    assert_eq!(settings.server.public_addr.port(), 9100);
}

#[test]
#[serial]
fn prefixed_env_layers_under_well_known_env() {
    // SAFETY: serialized with every other test that reads process env.
    unsafe {
        std::env::set_var("CHATCACHE__CACHE__EXPIRATION_SECONDS", "42");
        std::env::set_var("CHATCACHE__CACHE__HOST", "prefixed.internal");
    }

    let args = CliArgs::parse_from(["chatcache"]);
    let result = load_with_env(&args, env(&[("REDIS_HOST", "wellknown.internal")]));

    unsafe {
        std::env::remove_var("CHATCACHE__CACHE__EXPIRATION_SECONDS");
        std::env::remove_var("CHATCACHE__CACHE__HOST");
    }

    let settings = result.expect("settings load");
    assert_eq!(settings.cache.expiration, Duration::from_secs(42));
    assert_eq!(settings.cache.host, "wellknown.internal");
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["chatcache"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "chatcache",
        "serve",
        "--server-host",
        "127.0.0.1",
        "--cache-backend",
        "memory",
        "--generation-fallback-delay-ms",
        "0",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("127.0.0.1"));
            assert_eq!(serve.overrides.cache.cache_backend.as_deref(), Some("memory"));
            assert_eq!(serve.overrides.generation_fallback_delay_ms, Some(0));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_clear_cache_arguments() {
    let args = CliArgs::parse_from([
        "chatcache",
        "clear-cache",
        "--cache-host",
        "redis.internal",
        "--cache-db",
        "3",
    ]);

    match args.command.expect("clear-cache command") {
        Command::ClearCache(clear) => {
            assert_eq!(clear.cache.cache_host.as_deref(), Some("redis.internal"));
            assert_eq!(clear.cache.cache_db, Some(3));
        }
        _ => panic!("wrong command parsed"),
    }
}

fn toml_tmp_file() -> NamedTempFile {
    tempfile::Builder::new()
        .prefix("chatcache-")
        .suffix(".toml")
        .tempfile()
        .expect("tmp config file")
}
