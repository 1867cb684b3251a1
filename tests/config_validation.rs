use morrible::config::{ClassifierBackendKind, Settings};

fn set(key: &str, value: &str) {
    // testy w tym pliku są jednowątkowe względem środowiska (jeden test)
    unsafe { std::env::set_var(key, value) };
}

fn unset(key: &str) {
    unsafe { std::env::remove_var(key) };
}

#[test]
fn env_layers_override_defaults_and_bad_values_stop_startup() {
    set("MORRIBLE_ENV", "integration");

    // same domyślne
    let s = Settings::load().unwrap();
    assert_eq!(s.env, "integration");
    assert_eq!(s.automod.max_buffer, 5);
    assert_eq!(s.automod.eval_cooldown_secs, 30);
    assert_eq!(s.classifier.backend, ClassifierBackendKind::Rules);
    assert_eq!(s.database.max_connections, Some(10));
    assert_eq!(s.blacklist.path, "config/blacklist.json");

    // nadpisania ze zmiennych środowiskowych
    set("MORRIBLE_AUTOMOD__MAX_BUFFER", "8");
    set("MORRIBLE_AUTOMOD__BATCH_MODE", "false");
    set("MORRIBLE_MODLOG__CHANNEL_ID", "123456789");
    let s = Settings::load().unwrap();
    assert_eq!(s.automod.max_buffer, 8);
    assert!(!s.automod.batch_mode);
    assert_eq!(s.modlog.channel_id, Some(123456789));

    // progi nierosnące → błąd startu
    set("MORRIBLE_AUTOMOD__TIMEOUT_THRESHOLD", "7");
    let err = Settings::load().unwrap_err();
    assert!(err.to_string().contains("strictly increasing"), "{err}");
    unset("MORRIBLE_AUTOMOD__TIMEOUT_THRESHOLD");

    // backend modelowy bez endpointu → błąd startu
    set("MORRIBLE_CLASSIFIER__BACKEND", "model");
    let err = Settings::load().unwrap_err();
    assert!(err.to_string().contains("endpoint"), "{err}");

    set("MORRIBLE_CLASSIFIER__ENDPOINT", "http://127.0.0.1:8080/score");
    let s = Settings::load().unwrap();
    assert_eq!(s.classifier.backend, ClassifierBackendKind::Model);

    for key in [
        "MORRIBLE_ENV",
        "MORRIBLE_AUTOMOD__MAX_BUFFER",
        "MORRIBLE_AUTOMOD__BATCH_MODE",
        "MORRIBLE_MODLOG__CHANNEL_ID",
        "MORRIBLE_CLASSIFIER__BACKEND",
        "MORRIBLE_CLASSIFIER__ENDPOINT",
    ] {
        unset(key);
    }
}
