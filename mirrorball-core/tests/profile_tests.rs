// Tests for site profiles

use mirrorball_core::profile::{DEFAULT_MIRROR_HOSTS, DEFAULT_SEEDS, SiteProfile};
use mirrorball_engine::config::{DEFAULT_CONTENT_ROUTES, DEFAULT_EXCLUDED_SEGMENTS};
use url::Url;

fn origin() -> Url {
    Url::parse("https://shop.example/").unwrap()
}

#[test]
fn test_for_origin_uses_storefront_defaults() {
    let profile = SiteProfile::for_origin(&origin());

    assert_eq!(profile.origin, "https://shop.example/");
    assert_eq!(profile.hosts.len(), DEFAULT_MIRROR_HOSTS.len());
    assert!(profile.hosts.iter().any(|h| h == "cdn.shopify.com"));
    assert_eq!(profile.seeds.len(), DEFAULT_SEEDS.len());
    assert_eq!(profile.content_routes.len(), DEFAULT_CONTENT_ROUTES.len());
}

#[test]
fn test_load_fills_missing_fields_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profile.json");
    std::fs::write(&path, r#"{"origin": "https://shop.example/", "seeds": ["/pages/faq"]}"#)
        .unwrap();

    let profile = SiteProfile::load(&path).unwrap();

    assert!(profile.hosts.is_empty());
    assert_eq!(profile.seeds, vec!["/pages/faq".to_string()]);
    assert_eq!(profile.content_routes.len(), DEFAULT_CONTENT_ROUTES.len());
    assert_eq!(profile.excluded_segments.len(), DEFAULT_EXCLUDED_SEGMENTS.len());
}

#[test]
fn test_load_rejects_invalid_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profile.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = SiteProfile::load(&path).unwrap_err();
    assert!(err.starts_with("Invalid profile"));
}

#[test]
fn test_load_missing_file() {
    let err = SiteProfile::load(std::path::Path::new("/nonexistent/profile.json")).unwrap_err();
    assert!(err.starts_with("Failed to read profile"));
}

#[test]
fn test_save_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profile.json");
    let mut profile = SiteProfile::for_origin(&origin());
    profile.add_hosts(["static.shop.example"]);

    profile.save(&path).unwrap();

    assert_eq!(SiteProfile::load(&path).unwrap(), profile);
}

#[test]
fn test_add_hosts_and_seeds_skip_duplicates() {
    let mut profile = SiteProfile::for_origin(&origin());
    let hosts = profile.hosts.len();
    let seeds = profile.seeds.len();

    profile.add_hosts(["cdn.shopify.com", "static.shop.example"]);
    profile.add_seeds(["/cart", "/pages/faq"]);

    assert_eq!(profile.hosts.len(), hosts + 1);
    assert_eq!(profile.seeds.len(), seeds + 1);
}

#[test]
fn test_into_config_puts_origin_root_first() {
    let mut profile = SiteProfile::for_origin(&Url::parse("https://shop.example/pages/about").unwrap());
    profile.seeds = vec![
        "/pages/faq".to_string(),
        "https://shop.example/".to_string(),
        "/pages/faq".to_string(),
    ];

    let config = profile.into_config("/tmp/out").unwrap();

    let seeds: Vec<&str> = config.seeds.iter().map(|u| u.as_str()).collect();
    assert_eq!(
        seeds,
        vec!["https://shop.example/", "https://shop.example/pages/faq"]
    );
    assert!(config.mirror_hosts.iter().any(|h| h == "fonts.gstatic.com"));
}

#[test]
fn test_into_config_default_seeds_are_deduplicated() {
    let config = SiteProfile::for_origin(&origin()).into_config("/tmp/out").unwrap();

    // "/" collapses into the origin root
    assert_eq!(config.seeds.len(), DEFAULT_SEEDS.len());
    assert_eq!(config.seeds[0].as_str(), "https://shop.example/");
}

#[test]
fn test_into_config_rejects_bad_origin() {
    let mut profile = SiteProfile::for_origin(&origin());
    profile.origin = "not a url".to_string();

    assert!(profile.into_config("/tmp/out").is_err());
}
