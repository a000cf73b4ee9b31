use std::collections::HashMap;

use super::*;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| map.get(name).cloned()
}

#[test]
fn test_default_weights_sum_to_one() {
    let w = WeightsConfig::default();
    assert!((w.lex + w.vec + w.prior + w.ctx - 1.0).abs() < 1e-9);
    assert!(w.lex > w.vec && w.vec > w.prior && w.prior > w.ctx);
}

#[test]
fn test_default_fuzzy_bands() {
    let g = GazetteerConfig::default();
    assert_eq!(g.fuzzy_max_edit_distance, 1);
    assert_eq!(g.short_fuzzy_band, Band::new(0.65, 0.88));
    assert_eq!(g.fuzzy_score_range, Band::new(0.70, 0.85));
    assert!(g.short_fuzzy_band.low < g.fuzzy_band.low);
    assert!(!g.keep_all_metas);
}

#[test]
fn test_defaults_validate() {
    assert!(LinkerConfig::default().validate().is_ok());
}

#[test]
fn test_partial_toml_fills_defaults() {
    let cfg: LinkerConfig = toml::from_str(
        r#"
        [weights]
        lex = 0.7

        [gazetteer]
        keep_all_metas = true
        "#,
    )
    .unwrap();
    assert_eq!(cfg.weights.lex, 0.7);
    assert_eq!(cfg.weights.vec, 0.3);
    assert!(cfg.gazetteer.keep_all_metas);
    assert_eq!(cfg.gazetteer.ngram_max, 5);
    assert_eq!(cfg.scoring.topk_final, 5);
    assert_eq!(cfg.rescue.max_retries, 2);
}

#[test]
fn test_env_overrides_apply() {
    let mut cfg = LinkerConfig::default();
    apply_overrides(
        &mut cfg,
        lookup_from(&[
            ("KEEP_ALL_METAS", "1"),
            ("W_VEC", "0"),
            ("PLACEHOLDER_PENALTY", "0.08"),
            ("RESCUE_ENABLED", "false"),
            ("TOPK_FINAL", "3"),
        ]),
    )
    .unwrap();
    assert!(cfg.gazetteer.keep_all_metas);
    assert_eq!(cfg.weights.vec, 0.0);
    assert_eq!(cfg.scoring.placeholder_penalty, 0.08);
    assert!(!cfg.rescue.enabled);
    assert_eq!(cfg.scoring.topk_final, 3);
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_bad_override_is_reported() {
    let mut cfg = LinkerConfig::default();
    let err = apply_overrides(&mut cfg, lookup_from(&[("W_LEX", "heavy")])).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidOverride { ref name, .. } if name == "W_LEX"));

    let err = apply_overrides(&mut cfg, lookup_from(&[("KEEP_ALL_METAS", "maybe")])).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidOverride { .. }));
}

#[test]
fn test_validate_rejects_bad_values() {
    let mut cfg = LinkerConfig::default();
    cfg.weights = WeightsConfig { lex: 0.0, vec: 0.0, prior: 0.0, ctx: 0.0 };
    assert!(cfg.validate().is_err());

    let mut cfg = LinkerConfig::default();
    cfg.weights.ctx = -0.1;
    assert!(cfg.validate().is_err());

    let mut cfg = LinkerConfig::default();
    cfg.gazetteer.fuzzy_band = Band::new(0.9, 0.8);
    assert!(cfg.validate().is_err());

    let mut cfg = LinkerConfig::default();
    cfg.vector.cache_capacity = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn test_validate_caps_rescue_retries() {
    let mut cfg = LinkerConfig::default();
    cfg.rescue.max_retries = MAX_RESCUE_RETRIES;
    assert!(cfg.validate().is_ok());

    cfg.rescue.max_retries = 7;
    assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

    let mut cfg = LinkerConfig::default();
    apply_overrides(&mut cfg, lookup_from(&[("RESCUE_MAX_RETRIES", "4294967295")])).unwrap();
    assert_eq!(cfg.rescue.max_retries, u32::MAX);
    assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn test_every_override_name_is_applied() {
    for key in Override::ALL {
        let mut cfg = LinkerConfig::default();
        let value = match key {
            Override::KeepAllMetas | Override::RescueEnabled => "true",
            _ => "1",
        };
        let name = key.name();
        apply_overrides(&mut cfg, |n| (n == name).then(|| value.to_string()))
            .unwrap_or_else(|e| panic!("{name}: {e}"));
    }
}

#[test]
fn test_missing_file_uses_defaults() {
    let path = std::env::temp_dir().join("odontolink-definitely-missing.toml");
    let cfg = LinkerConfig::load(Some(&path)).unwrap();
    assert_eq!(cfg.vector.topk, 10);
}
