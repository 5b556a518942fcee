mod common;

use common::build_zone;
use geozone::config::EngineConfig;
use geozone::dns::RecordType;
use geozone::geo::GeoLookup;
use geozone::targeting::TargetOptions;
use geozone::zone::Zone;

fn geo_zone() -> Zone {
    build_zone(
        "example.com",
        &[
            ("", "example.com. NS ns1.example.net."),
            ("www", "www.example.com. A 192.0.2.1"),
            ("www.eu", "www.eu.example.com. A 192.0.2.2"),
            ("www.nl", "www.nl.example.com. AAAA 2001:db8::3"),
            ("eu", "eu.example.com. A 192.0.2.4"),
            ("mail", "mail.example.com. MF www"),
            ("txt", "txt.example.com. TXT \"hello\""),
        ],
    )
}

#[test]
fn test_fallback_prefers_most_specific_target() {
    let zone = geo_zone();
    let targets = ["nl", "eu", "@"];

    // www.nl only has AAAA, so an A query falls back to the continent
    let found = zone.resolve("www", &targets, &[RecordType::A]);
    assert_eq!(found.rtype, Some(RecordType::A));
    assert_eq!(found.label.unwrap().name, "www.eu");

    let found = zone.resolve("www", &targets, &[RecordType::AAAA]);
    assert_eq!(found.label.unwrap().name, "www.nl");

    let found = zone.resolve("www", &["us", "na", "@"], &[RecordType::A]);
    assert_eq!(found.label.unwrap().name, "www");
}

#[test]
fn test_targets_from_client_location() {
    let zone = geo_zone();
    assert_eq!(
        zone.options.targeting,
        TargetOptions::GLOBAL | TargetOptions::CONTINENT | TargetOptions::COUNTRY
    );

    let targets = zone.targets_for(&GeoLookup::country("NL", "EU"));
    assert_eq!(targets, ["nl", "eu", "@"]);

    let found = zone.resolve("www", &targets, &[RecordType::AAAA]);
    assert_eq!(found.label.unwrap().name, "www.nl");

    // Unknown clients only get the global target
    let targets = zone.targets_for(&GeoLookup::default());
    assert_eq!(targets, ["@"]);
}

#[test]
fn test_apex_with_targets() {
    let zone = geo_zone();

    let found = zone.resolve("", &["eu", "@"], &[RecordType::A]);
    assert_eq!(found.label.unwrap().name, "eu");

    let found = zone.resolve("", &["@"], &[RecordType::NS]);
    assert_eq!(found.rtype, Some(RecordType::NS));
    assert_eq!(found.label.unwrap().name, "");
}

#[test]
fn test_type_order_within_a_target() {
    let zone = geo_zone();
    let found = zone.resolve("www", &["@"], &[RecordType::AAAA, RecordType::A]);
    assert_eq!(found.rtype, Some(RecordType::A));
}

#[test]
fn test_not_found_returns_label_at_name() {
    let zone = geo_zone();

    let found = zone.resolve("txt", &["nl", "eu", "@"], &[RecordType::A]);
    assert!(!found.is_found());
    assert_eq!(found.label.unwrap().name, "txt");

    let found = zone.resolve("nothere", &["@"], &[RecordType::A]);
    assert!(found.label.is_none());
    assert!(found.rtype.is_none());
}

#[test]
fn test_any_short_circuits_to_queried_name() {
    let zone = geo_zone();

    let found = zone.resolve("www", &["nl", "@"], &[RecordType::A, RecordType::ANY]);
    assert_eq!(found.rtype, Some(RecordType::ANY));
    assert_eq!(found.label.unwrap().name, "www");

    // The matching target need not exist at the queried name itself
    let zone = build_zone(
        "example.com",
        &[("api.eu", "api.eu.example.com. A 192.0.2.9")],
    );
    let found = zone.resolve("api", &["eu", "@"], &[RecordType::ANY]);
    assert_eq!(found.rtype, Some(RecordType::ANY));
    assert!(found.label.is_none());
}

#[test]
fn test_alias_is_followed() {
    let zone = geo_zone();
    let found = zone.resolve("mail", &["nl", "eu", "@"], &[RecordType::MF, RecordType::A]);
    assert_eq!(found.rtype, Some(RecordType::A));
    assert_eq!(found.label.unwrap().name, "www.eu");

    // Without MF in the requested types the alias is not followed
    let found = zone.resolve("mail", &["@"], &[RecordType::A]);
    assert!(!found.is_found());
}

#[test]
fn test_alias_depth_is_capped() {
    let config = EngineConfig {
        max_alias_depth: 3,
        ..Default::default()
    };
    let mut zone = Zone::with_config("example.com", &config);
    for (from, to) in [("a", "b"), ("b", "c"), ("c", "d"), ("d", "e")] {
        zone.add_label(from)
            .add_record(common::record(&format!("{}.example.com. MF {}", from, to)));
    }
    zone.add_label("e")
        .add_record(common::record("e.example.com. A 192.0.2.5"));

    let types = [RecordType::MF, RecordType::A];
    let found = zone.resolve("b", &["@"], &types);
    assert_eq!(found.label.unwrap().name, "e");

    let found = zone.resolve("a", &["@"], &types);
    assert!(!found.is_found());
}

#[test]
fn test_alias_loop_terminates() {
    let zone = build_zone(
        "example.com",
        &[
            ("ping", "ping.example.com. MF pong"),
            ("pong", "pong.example.com. MF ping"),
        ],
    );
    let found = zone.resolve("ping", &["@"], &[RecordType::MF, RecordType::A]);
    assert!(!found.is_found());
}

#[test]
fn test_resolution_is_deterministic() {
    let zone = geo_zone();
    let targets = ["nl", "eu", "@"];
    let first = zone.resolve("www", &targets, &[RecordType::A]);

    for _ in 0..100 {
        let again = zone.resolve("www", &targets, &[RecordType::A]);
        assert_eq!(again.rtype, first.rtype);
        assert_eq!(
            again.label.as_ref().map(|l| l.name.clone()),
            first.label.as_ref().map(|l| l.name.clone())
        );
    }
}

#[test]
fn test_mixed_case_label_lookup() {
    let zone = build_zone(
        "example.com",
        &[("WWW", "www.example.com. A 192.0.2.1")],
    );
    assert!(zone.resolve("www", &["@"], &[RecordType::A]).is_found());
    assert!(!zone.resolve("WWW", &["@"], &[RecordType::A]).is_found());
}
