use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn default_ttls_follow_collection_volatility() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.cache.products_ttl_minutes.get(), 60);
    assert_eq!(settings.cache.categories_ttl_minutes.get(), 120);
    assert_eq!(settings.cache.pages_ttl_minutes.get(), 120);
    assert_eq!(settings.cache.posts_ttl_minutes.get(), 60);
    assert_eq!(settings.cache.menus_ttl_minutes.get(), 720);
    assert_eq!(settings.cache.site_info_ttl_minutes.get(), 1440);
}

#[test]
fn defaults_are_conservative() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.origin.timeout, Duration::from_secs(10));
    assert!(settings.origin.wordpress_url.is_none());
    assert!(!settings.images.allow_insecure_origin);
    assert_eq!(settings.images.max_age, Duration::from_secs(604_800));
    assert!(settings.security.refresh_secret.is_none());
    assert!(settings.webhooks.woocommerce_secret.is_none());
}

#[test]
fn zero_ttl_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.menus_ttl_minutes = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero ttl");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.menus_ttl_minutes",
            ..
        }
    ));
}

#[test]
fn origin_url_requires_http_scheme() {
    let mut raw = RawSettings::default();
    raw.origin.wordpress_url = Some("ftp://shop.example".to_string());

    let err = Settings::from_raw(raw).expect_err("bad scheme");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "origin.wordpress_url",
            ..
        }
    ));
}

#[test]
fn blank_secrets_count_as_unset() {
    let mut raw = RawSettings::default();
    raw.security.refresh_secret = Some("   ".to_string());
    raw.webhooks.woocommerce_secret = Some(String::new());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.security.refresh_secret.is_none());
    assert!(settings.webhooks.woocommerce_secret.is_none());
}

#[test]
fn legacy_env_fills_unset_values_only() {
    let mut raw = RawSettings::default();
    raw.security.refresh_secret = Some("layered".to_string());

    raw.apply_legacy_env(&LegacyEnv {
        cache_refresh_secret: Some("legacy".to_string()),
        webhook_secret: Some("fallback".to_string()),
        wordpress_url: Some("https://shop.example".to_string()),
        ..Default::default()
    });

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.security.refresh_secret.as_deref(), Some("layered"));
    assert_eq!(
        settings.webhooks.woocommerce_secret.as_deref(),
        Some("fallback")
    );
    assert_eq!(
        settings.origin.wordpress_url.map(|url| url.to_string()),
        Some("https://shop.example/".to_string())
    );
}

#[test]
fn wc_webhook_secret_wins_over_generic_fallback() {
    let mut raw = RawSettings::default();
    raw.apply_legacy_env(&LegacyEnv {
        wc_webhook_secret: Some("specific".to_string()),
        webhook_secret: Some("generic".to_string()),
        ..Default::default()
    });

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.webhooks.woocommerce_secret.as_deref(),
        Some("specific")
    );
}

#[test]
fn public_path_trailing_slash_is_trimmed() {
    let mut raw = RawSettings::default();
    raw.images.public_path = Some("/media/cache/".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.images.public_path, "/media/cache");
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    raw.apply_serve_overrides(&ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    });

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["vitrine"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "vitrine",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--origin-url",
        "https://shop.example",
        "--images-allow-insecure-origin",
        "true",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(
                serve.overrides.origin.origin_url.as_deref(),
                Some("https://shop.example")
            );
            assert_eq!(serve.overrides.images_allow_insecure_origin, Some(true));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_cleanup_images_arguments() {
    let args = CliArgs::parse_from(["vitrine", "cleanup-images", "--max-age-seconds", "3600"]);

    match args.command.expect("cleanup command") {
        Command::CleanupImages(cleanup) => assert_eq!(cleanup.max_age_seconds, Some(3600)),
        _ => panic!("wrong command parsed"),
    }
}
