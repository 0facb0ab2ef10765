//! End-to-end tests against a real container engine.
//!
//! These need podman or docker, `grpcurl` and network access, and are marked
//! `#[ignore]`. Run with: `cargo test -- --ignored`
//! Set `OII_TEST_IMAGE` to inspect a different index image.

use oii_inspector::config::Config;
use oii_inspector::container::ContainerManager;
use oii_inspector::registry::Inspector;

fn test_image() -> String {
    std::env::var("OII_TEST_IMAGE")
        .unwrap_or_else(|_| "quay.io/operatorhubio/catalog:latest".to_string())
}

fn config() -> Config {
    Config {
        readiness_timeout: 60,
        ..Config::default()
    }
}

#[test]
#[ignore]
fn serves_and_tears_down_index_image() {
    let mut manager = ContainerManager::with_runner(
        test_image(),
        config(),
        oii_inspector::container::LocalRunner,
    );
    manager.start().expect("container should start");
    let address = manager.local_address().expect("address after start");
    assert!(address.starts_with("localhost:"));
    manager.close();
    assert!(!manager.is_running());
}

#[test]
#[ignore]
fn lists_packages_from_index_image() {
    let inspector = Inspector::new(config());
    let packages = inspector
        .list_packages(&test_image())
        .expect("list packages");
    assert!(!packages.is_empty(), "index should contain packages");
    assert!(packages.iter().all(|p| p.get("name").is_some()));
}

#[test]
#[ignore]
fn two_sessions_negotiate_different_ports() {
    let mut first = ContainerManager::with_runner(
        test_image(),
        config(),
        oii_inspector::container::LocalRunner,
    );
    first.start().expect("first session");
    let mut second = ContainerManager::with_runner(
        test_image(),
        config(),
        oii_inspector::container::LocalRunner,
    );
    second.start().expect("second session");
    assert_ne!(first.port(), second.port());
}
