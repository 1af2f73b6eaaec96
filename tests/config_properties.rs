//! Property tests for configuration coercion and validation.

use proptest::prelude::*;
use service_bootstrap::config::loader::parse_allow_list;
use service_bootstrap::config::{ConfigLoader, Environment, LogLevel};

fn base_vars() -> Vec<(String, String)> {
    vec![
        ("SECRET_KEY".into(), "prop-secret".into()),
        ("DATABASE_URL".into(), "postgres://localhost:5432/app".into()),
        ("REDIS_URL".into(), "redis://localhost:6379/0".into()),
    ]
}

fn with(mut vars: Vec<(String, String)>, key: &str, value: String) -> Vec<(String, String)> {
    vars.retain(|(k, _)| k != key);
    vars.push((key.to_string(), value));
    vars
}

proptest! {
    #[test]
    fn allow_list_csv_is_split_and_trimmed(
        entries in prop::collection::vec("[a-z0-9*][a-z0-9.*-]{0,15}", 1..8),
        pads in prop::collection::vec((" {0,3}", " {0,3}"), 8),
    ) {
        let raw = entries
            .iter()
            .zip(pads.iter())
            .map(|(e, (left, right))| format!("{left}{e}{right}"))
            .collect::<Vec<_>>()
            .join(",");

        let parsed = parse_allow_list("ALLOWED_HOSTS", &raw).unwrap();
        prop_assert_eq!(parsed.as_slice(), entries.as_slice());
    }

    #[test]
    fn log_level_is_case_insensitive(
        index in 0usize..LogLevel::ALLOWED.len(),
        mask in prop::collection::vec(any::<bool>(), 8),
    ) {
        let canonical = LogLevel::ALLOWED[index];
        let mixed: String = canonical
            .chars()
            .zip(mask.iter().cycle())
            .map(|(c, upper)| if *upper { c.to_ascii_uppercase() } else { c.to_ascii_lowercase() })
            .collect();

        let settings = ConfigLoader::from_vars(with(base_vars(), "LOG_LEVEL", mixed))
            .load()
            .unwrap();
        prop_assert_eq!(settings.log_level.as_str(), canonical);
    }

    #[test]
    fn unknown_environment_is_rejected(value in "[A-Za-z]{1,12}") {
        prop_assume!(!Environment::ALLOWED.contains(&value.as_str()));

        let err = ConfigLoader::from_vars(with(base_vars(), "ENVIRONMENT", value))
            .load()
            .unwrap_err();
        prop_assert!(err.mentions("ENVIRONMENT"));
    }

    #[test]
    fn missing_required_keys_fail(drop_secret in any::<bool>(), drop_db in any::<bool>()) {
        prop_assume!(drop_secret || drop_db);

        let vars: Vec<_> = base_vars()
            .into_iter()
            .filter(|(k, _)| !(drop_secret && k == "SECRET_KEY") && !(drop_db && k == "DATABASE_URL"))
            .collect();

        let err = ConfigLoader::from_vars(vars).load().unwrap_err();
        prop_assert_eq!(err.mentions("SECRET_KEY"), drop_secret);
        prop_assert_eq!(err.mentions("DATABASE_URL"), drop_db);
    }
}

#[test]
fn json_allow_list_preserves_order() {
    let parsed = parse_allow_list("ALLOWED_HOSTS", r#"["b.example", " a.example "]"#).unwrap();
    assert_eq!(parsed.as_slice(), ["b.example", "a.example"]);
}
