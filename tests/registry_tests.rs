//! Integration tests for the encrypted device inventory.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use tempfile::TempDir;

use ndct::crypto::{EncryptedStore, EncryptionKey, KeyStore, StoreError};
use ndct::device::Device;
use ndct::prompt::FixedPrompt;
use ndct::registry::{DEVICES_FILE, DeviceRegistry, RegistryError};

fn write_key(dir: &Path) -> std::path::PathBuf {
    let key_path = dir.join("key.key");
    fs::write(&key_path, EncryptionKey::generate().as_bytes()).expect("write key");
    key_path
}

fn open_registry(dir: &Path, prompt: FixedPrompt) -> DeviceRegistry {
    let keys = KeyStore::new(dir.join("key.key"), Box::new(prompt));
    DeviceRegistry::new(EncryptedStore::new(dir.join("db"), keys))
}

fn device(name: &str, ip: &str) -> Device {
    Device::new(name, ip, "admin", "s3cret!", "cisco_ios").expect("valid device")
}

fn snapshot(registry: &DeviceRegistry) -> Vec<Device> {
    registry.iter().cloned().collect()
}

#[test]
fn test_first_save_creates_key_from_passphrase() {
    let dir = TempDir::new().unwrap();
    let prompt = FixedPrompt::new("correct horse");
    let counter = prompt.counter();
    let mut registry = open_registry(dir.path(), prompt);

    registry.add(device("core1", "10.0.0.1")).unwrap();
    registry.save().unwrap();

    assert_eq!(counter.get(), 1);
    assert!(dir.path().join("key.key").is_file());
    assert!(dir.path().join("db").join(DEVICES_FILE).is_file());
}

#[test]
fn test_key_file_is_stable_across_runs() {
    let dir = TempDir::new().unwrap();
    let mut first = open_registry(dir.path(), FixedPrompt::new("passphrase"));
    first.add(device("core1", "10.0.0.1")).unwrap();
    first.save().unwrap();
    let key_before = fs::read(dir.path().join("key.key")).unwrap();

    let prompt = FixedPrompt::new("a different passphrase");
    let counter = prompt.counter();
    let mut second = open_registry(dir.path(), prompt);
    second.load().unwrap();
    second.save().unwrap();

    assert_eq!(counter.get(), 0, "existing key must not prompt");
    assert_eq!(fs::read(dir.path().join("key.key")).unwrap(), key_before);
    assert_eq!(second.names(), vec!["core1"]);
}

#[test]
fn test_missing_device_file_loads_empty_without_prompt() {
    let dir = TempDir::new().unwrap();
    let prompt = FixedPrompt::new("unused");
    let counter = prompt.counter();
    let mut registry = open_registry(dir.path(), prompt);

    registry.load().unwrap();

    assert!(registry.is_empty());
    assert_eq!(counter.get(), 0);
    assert!(!dir.path().join("key.key").exists());
}

#[test]
fn test_load_twice_is_idempotent() {
    let dir = TempDir::new().unwrap();
    write_key(dir.path());
    let mut writer = open_registry(dir.path(), FixedPrompt::new("unused"));
    writer.add(device("a", "10.0.0.1")).unwrap();
    writer.add(device("b", "10.0.0.2")).unwrap();
    writer.save().unwrap();

    let mut reader = open_registry(dir.path(), FixedPrompt::new("unused"));
    reader.load().unwrap();
    let once = snapshot(&reader);
    reader.load().unwrap();

    assert_eq!(snapshot(&reader), once);
}

#[test]
fn test_tampered_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    write_key(dir.path());
    let mut writer = open_registry(dir.path(), FixedPrompt::new("unused"));
    writer.add(device("a", "10.0.0.1")).unwrap();
    writer.save().unwrap();

    let path = dir.path().join("db").join(DEVICES_FILE);
    let mut bytes = fs::read(&path).unwrap();
    let middle = bytes.len() / 2;
    // Swap one base64 character for another so the token still decodes.
    bytes[middle] = if bytes[middle] == b'A' { b'B' } else { b'A' };
    fs::write(&path, &bytes).unwrap();

    let mut reader = open_registry(dir.path(), FixedPrompt::new("unused"));
    let result = reader.load();

    assert!(
        matches!(
            result,
            Err(RegistryError::Store(StoreError::CorruptOrWrongKey))
        ),
        "got {result:?}"
    );
    assert!(reader.is_empty());
}

#[test]
fn test_other_key_cannot_read_inventory() {
    let dir = TempDir::new().unwrap();
    write_key(dir.path());
    let mut writer = open_registry(dir.path(), FixedPrompt::new("unused"));
    writer.add(device("a", "10.0.0.1")).unwrap();
    writer.save().unwrap();

    write_key(dir.path());
    let mut reader = open_registry(dir.path(), FixedPrompt::new("unused"));

    assert!(matches!(
        reader.load(),
        Err(RegistryError::Store(StoreError::CorruptOrWrongKey))
    ));
}

#[test]
fn test_device_file_holds_no_plaintext_credentials() {
    let dir = TempDir::new().unwrap();
    write_key(dir.path());
    let mut registry = open_registry(dir.path(), FixedPrompt::new("unused"));
    registry.add(device("edge-router", "192.0.2.10")).unwrap();
    registry.save().unwrap();

    let raw = fs::read_to_string(dir.path().join("db").join(DEVICES_FILE)).unwrap();

    for secret in ["edge-router", "192.0.2.10", "admin", "s3cret!"] {
        assert!(!raw.contains(secret), "found {secret} in device file");
    }
}

#[test]
fn test_added_device_survives_restart() {
    let dir = TempDir::new().unwrap();
    write_key(dir.path());

    let mut registry = open_registry(dir.path(), FixedPrompt::new("unused"));
    registry.load().unwrap();
    registry.add(device("a", "10.0.0.1")).unwrap();
    registry.save().unwrap();

    let mut registry = open_registry(dir.path(), FixedPrompt::new("unused"));
    registry.load().unwrap();
    registry.add(device("b", "10.0.0.2")).unwrap();
    registry.save().unwrap();

    let mut fresh = open_registry(dir.path(), FixedPrompt::new("unused"));
    fresh.load().unwrap();
    assert_eq!(fresh.names(), vec!["a", "b"]);
    assert_eq!(fresh.get("b").unwrap().password, "s3cret!");
}

fn field() -> impl Strategy<Value = String> {
    "[A-Za-z0-9._-]{1,16}"
}

fn devices() -> impl Strategy<Value = Vec<Device>> {
    prop::collection::btree_map(
        "[a-z][a-z0-9-]{0,11}",
        (field(), field(), "[!-~]{1,20}", field()),
        0..8,
    )
    .prop_map(|entries| {
        entries
            .into_iter()
            .map(|(name, (ip, user, password, os))| {
                Device::new(name, ip, user, password, os).expect("generated fields are non-empty")
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_save_then_load_preserves_devices(devices in devices()) {
        let dir = TempDir::new().unwrap();
        write_key(dir.path());

        let mut writer = open_registry(dir.path(), FixedPrompt::new("unused"));
        for device in &devices {
            writer.add(device.clone()).unwrap();
        }
        writer.save().unwrap();

        let mut reader = open_registry(dir.path(), FixedPrompt::new("unused"));
        reader.load().unwrap();

        prop_assert_eq!(snapshot(&reader), devices);
    }
}
