//! Layered configuration resolution across real sources
//!
//! Exercises the full CLI > env > YAML > defaults chain with actual
//! files on disk and injected environment snapshots: every presence
//! combination must resolve to the highest-precedence present source.

use std::fs;
use std::path::PathBuf;

use proptest::prelude::*;
use tempfile::TempDir;

use medir::config::{load_yaml_overlay, BenchConfig, ConfigOverlay, EnvSource};

/// Write a YAML config file and return its path
fn yaml_file(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("medir.yaml");
    fs::write(&path, contents).unwrap();
    path
}

// ============================================================================
// All 16 presence combinations
// ============================================================================

/// Resolve port with the given subset of sources present.
///
/// Sources carry distinct values so the winner is unambiguous:
/// CLI 5001, env 5002, YAML 5003, default 11434.
fn resolve_port(cli_set: bool, env_set: bool, yaml_set: bool) -> u16 {
    let dir = TempDir::new().unwrap();

    let cli = ConfigOverlay {
        port: cli_set.then_some(5001),
        ..ConfigOverlay::default()
    };
    let env = if env_set {
        EnvSource::from_pairs([("OLLAMA_PORT", "5002")])
    } else {
        EnvSource::empty()
    };
    let yaml = if yaml_set {
        let path = yaml_file(&dir, "connection:\n  port: 5003\n");
        load_yaml_overlay(Some(path.as_path())).unwrap()
    } else {
        None
    };

    BenchConfig::resolve(cli, &env, yaml).unwrap().port
}

/// Resolve num_ctx with the given subset of sources present:
/// CLI 1024, env 2048, YAML 3072, default 4096.
fn resolve_num_ctx(cli_set: bool, env_set: bool, yaml_set: bool) -> u32 {
    let dir = TempDir::new().unwrap();

    let cli = ConfigOverlay {
        num_ctx: cli_set.then_some(1024),
        ..ConfigOverlay::default()
    };
    let env = if env_set {
        EnvSource::from_pairs([("OLLAMA_NUM_CTX", "2048")])
    } else {
        EnvSource::empty()
    };
    let yaml = if yaml_set {
        let path = yaml_file(&dir, "benchmark:\n  num_ctx: 3072\n");
        load_yaml_overlay(Some(path.as_path())).unwrap()
    } else {
        None
    };

    BenchConfig::resolve(cli, &env, yaml).unwrap().num_ctx
}

#[test]
fn test_port_all_presence_combinations() {
    // (cli, env, yaml) bits; the default is always present by definition,
    // which doubles the combination count without changing the winner.
    for bits in 0..8u8 {
        let cli = bits & 0b100 != 0;
        let env = bits & 0b010 != 0;
        let yaml = bits & 0b001 != 0;

        let expected = if cli {
            5001
        } else if env {
            5002
        } else if yaml {
            5003
        } else {
            11434
        };
        assert_eq!(
            resolve_port(cli, env, yaml),
            expected,
            "presence combination cli={cli} env={env} yaml={yaml}"
        );
    }
}

#[test]
fn test_num_ctx_all_presence_combinations() {
    for bits in 0..8u8 {
        let cli = bits & 0b100 != 0;
        let env = bits & 0b010 != 0;
        let yaml = bits & 0b001 != 0;

        let expected = if cli {
            1024
        } else if env {
            2048
        } else if yaml {
            3072
        } else {
            4096
        };
        assert_eq!(
            resolve_num_ctx(cli, env, yaml),
            expected,
            "presence combination cli={cli} env={env} yaml={yaml}"
        );
    }
}

#[test]
fn test_cli_value_equal_to_default_still_wins() {
    // Presence decides, not value: --port 11434 beats OLLAMA_PORT=5002
    // even though 11434 is also the default.
    let dir = TempDir::new().unwrap();
    let path = yaml_file(&dir, "connection:\n  port: 5003\n");

    let cli = ConfigOverlay {
        port: Some(11434),
        ..ConfigOverlay::default()
    };
    let env = EnvSource::from_pairs([("OLLAMA_PORT", "5002")]);
    let yaml = load_yaml_overlay(Some(path.as_path())).unwrap();

    let config = BenchConfig::resolve(cli, &env, yaml).unwrap();
    assert_eq!(config.port, 11434);
}

// ============================================================================
// Source failures
// ============================================================================

#[test]
fn test_explicit_config_path_must_exist() {
    let err = load_yaml_overlay(Some(std::path::Path::new("/nonexistent/medir.yaml")))
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("config"));
}

#[test]
fn test_malformed_yaml_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = yaml_file(&dir, "benchmark:\n  num_ctx: [not a number\n");

    let err = load_yaml_overlay(Some(path.as_path())).unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn test_invalid_env_value_is_fatal_even_when_cli_overrides() {
    // A set-but-broken variable is an operator mistake; it must be
    // reported, not silently shadowed by a higher layer.
    let cli = ConfigOverlay {
        port: Some(5001),
        ..ConfigOverlay::default()
    };
    let env = EnvSource::from_pairs([("OLLAMA_PORT", "not-a-port")]);

    let err = BenchConfig::resolve(cli, &env, None).unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("OLLAMA_PORT"));
}

// ============================================================================
// Sectioned YAML end to end
// ============================================================================

#[test]
fn test_full_yaml_round_trip_through_resolution() {
    let dir = TempDir::new().unwrap();
    let path = yaml_file(
        &dir,
        "matrix:\n  context_sizes: [2048, 8192, 16384]\n  models:\n    - qwen3:8b\n    - gemma3:4b\nbenchmark:\n  num_predict: 512\n  temperature: 0.7\n  repeat_runs: 3\n  keep_alive: 5m\noutput:\n  output_dir: bench-out\n  formats: [csv, json, columnar]\nadvanced:\n  cold_start: true\n  stop_between_contexts: true\nconnection:\n  host: 10.0.0.5\n  port: 11435\n",
    );

    let yaml = load_yaml_overlay(Some(path.as_path())).unwrap();
    let config = BenchConfig::resolve(ConfigOverlay::default(), &EnvSource::empty(), yaml)
        .unwrap();

    assert_eq!(config.context_sizes, vec![2048, 8192, 16384]);
    assert_eq!(config.num_predict, 512);
    assert!((config.temperature - 0.7).abs() < f64::EPSILON);
    assert_eq!(config.repeat_runs, 3);
    assert_eq!(config.keep_alive, "5m");
    assert_eq!(config.output_dir, PathBuf::from("bench-out"));
    assert_eq!(config.formats.len(), 3);
    assert!(config.cold_start);
    assert!(config.stop_between_contexts);
    assert!(!config.stop_between_models);
    assert_eq!(config.api_base(), "http://10.0.0.5:11435");
}

#[test]
fn test_context_sizes_keep_configured_order() {
    // The sweep order is the operator's order, never sorted.
    let dir = TempDir::new().unwrap();
    let path = yaml_file(&dir, "matrix:\n  context_sizes: [16384, 2048, 8192]\n");

    let yaml = load_yaml_overlay(Some(path.as_path())).unwrap();
    let config = BenchConfig::resolve(ConfigOverlay::default(), &EnvSource::empty(), yaml)
        .unwrap();
    assert_eq!(config.context_sizes, vec![16384, 2048, 8192]);
}

// ============================================================================
// Precedence law under arbitrary values
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_port_resolves_to_highest_present_source(
        cli in proptest::option::of(1024u16..60000),
        env in proptest::option::of(1024u16..60000),
        yaml in proptest::option::of(1024u16..60000),
    ) {
        let cli_overlay = ConfigOverlay { port: cli, ..ConfigOverlay::default() };
        let env_source = match env {
            Some(p) => EnvSource::from_pairs([("OLLAMA_PORT", p.to_string())]),
            None => EnvSource::empty(),
        };
        let yaml_overlay = yaml.map(|p| ConfigOverlay {
            port: Some(p),
            ..ConfigOverlay::default()
        });

        let resolved = BenchConfig::resolve(cli_overlay, &env_source, yaml_overlay)
            .unwrap()
            .port;
        let expected = cli.or(env).or(yaml).unwrap_or(11434);
        prop_assert_eq!(resolved, expected);
    }
}
