//! End-to-end runs of the CLI commands against scratch session files

use std::{fs, path::Path};

use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tempfile::TempDir;
use vellum_cli::{Cli, CliError, run};
use vellum_core::{ErrorKind, MegolmInboundSession, MegolmOutboundSession};

const KEY: &str = "correct horse battery staple";

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

struct Fixture {
    dir: TempDir,
    outbound: MegolmOutboundSession,
}

impl Fixture {
    fn new() -> Self {
        let outbound = MegolmOutboundSession::new(&mut ChaCha20Rng::seed_from_u64(7));
        let fixture = Self { dir: TempDir::new().unwrap(), outbound };
        fixture.write("key.txt", &format!("{KEY}\n"));
        fixture
    }

    fn invoke(&self, args: &[&str]) -> Result<Vec<u8>, CliError> {
        self.invoke_with_key_file("key.txt", args)
    }

    fn invoke_with_key_file(&self, key_file: &str, args: &[&str]) -> Result<Vec<u8>, CliError> {
        let key_path = path_str(&self.dir.path().join(key_file)).to_string();
        let mut argv = vec!["vellum", "--pickle-key-file", key_path.as_str()];
        argv.extend_from_slice(args);
        let cli = Cli::try_parse_from(argv).unwrap();

        let mut out = Vec::new();
        run(&cli, &mut out)?;
        Ok(out)
    }

    fn write(&self, name: &str, contents: &str) -> String {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path_str(&path).to_string()
    }

    fn session_path(&self) -> String {
        path_str(&self.dir.path().join("session.pickle")).to_string()
    }

    fn import_share(&self) -> String {
        let input = self.write("share.b64", &format!("{}\n", self.outbound.session_key()));
        let session = self.session_path();
        self.invoke(&["import-share", "--input", &input, "--session", &session]).unwrap();
        session
    }
}

#[test]
fn share_then_decrypt_updates_session_file() {
    let mut fixture = Fixture::new();
    let session = fixture.import_share();

    let first = fixture.outbound.encrypt(b"first").unwrap();
    let second = fixture.outbound.encrypt(b"second").unwrap();
    let first = fixture.write("first.b64", &first);
    let second = fixture.write("second.b64", &second);

    let plaintext = fixture.invoke(&["decrypt", "--session", &session, "--message", &second]).unwrap();
    assert_eq!(plaintext, b"second");

    // Earlier index still reachable after the live ratchet moved on
    let plaintext = fixture.invoke(&["decrypt", "--session", &session, "--message", &first]).unwrap();
    assert_eq!(plaintext, b"first");

    let stored = fs::read_to_string(&session).unwrap();
    let restored = MegolmInboundSession::from_pickle(stored.as_bytes(), KEY.as_bytes()).unwrap();
    assert_eq!(restored.live_index(), 1);
    assert!(restored.is_verified());
}

#[test]
fn inspect_reports_indices_and_verification() {
    let fixture = Fixture::new();
    let session = fixture.import_share();

    let out = fixture.invoke(&["inspect", "--session", &session]).unwrap();
    let summary: serde_json::Value = serde_json::from_slice(&out).unwrap();

    assert_eq!(summary["session_id"], fixture.outbound.id());
    assert_eq!(summary["first_known_index"], 0);
    assert_eq!(summary["live_index"], 0);
    assert_eq!(summary["verified"], true);
}

#[test]
fn export_round_trips_through_import_export() {
    let mut fixture = Fixture::new();
    let session = fixture.import_share();
    for _ in 0..3 {
        fixture.outbound.encrypt(b"skipped").unwrap();
    }
    let message = fixture.outbound.encrypt(b"after export").unwrap();
    let message = fixture.write("message.b64", &message);

    let exported = fixture.invoke(&["export", "--session", &session, "--index", "3"]).unwrap();
    let exported = fixture.write("export.b64", &String::from_utf8(exported).unwrap());

    let imported = path_str(&fixture.dir.path().join("imported.pickle")).to_string();
    fixture.invoke(&["import-export", "--input", &exported, "--session", &imported]).unwrap();

    let out = fixture.invoke(&["inspect", "--session", &imported]).unwrap();
    let summary: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(summary["first_known_index"], 3);
    assert_eq!(summary["verified"], false);

    let plaintext = fixture.invoke(&["decrypt", "--session", &imported, "--message", &message]).unwrap();
    assert_eq!(plaintext, b"after export");
}

#[test]
fn json_format_sessions_load_and_save() {
    let mut fixture = Fixture::new();
    let input = fixture.write("share.b64", &fixture.outbound.session_key());
    let session = fixture.session_path();
    fixture.invoke(&["--format", "json", "import-share", "--input", &input, "--session", &session]).unwrap();

    let message = fixture.outbound.encrypt(b"json").unwrap();
    let message = fixture.write("message.b64", &message);
    let plaintext =
        fixture.invoke(&["--format", "json", "decrypt", "--session", &session, "--message", &message]).unwrap();
    assert_eq!(plaintext, b"json");

    // Binary loader refuses the JSON file
    assert!(fixture.invoke(&["inspect", "--session", &session]).is_err());
}

#[test]
fn wrong_pickle_key_is_integrity_failure() {
    let fixture = Fixture::new();
    let session = fixture.import_share();
    fixture.write("wrong.txt", "wrong");

    let err = fixture.invoke_with_key_file("wrong.txt", &["inspect", "--session", &session]).unwrap_err();
    match err {
        CliError::Olm(err) => assert_eq!(err.kind(), ErrorKind::BadMac),
        other => panic!("expected session error, got {other}"),
    }
}

#[test]
fn missing_key_file_is_io_error() {
    let fixture = Fixture::new();
    let session = fixture.import_share();

    let err = fixture.invoke_with_key_file("absent.txt", &["inspect", "--session", &session]).unwrap_err();
    assert!(matches!(err, CliError::Io { .. }));
}

#[test]
fn failed_decrypt_leaves_session_file_untouched() {
    let fixture = Fixture::new();
    let session = fixture.import_share();
    let before = fs::read(&session).unwrap();

    let garbage = fixture.write("garbage.b64", "not a message");
    assert!(fixture.invoke(&["decrypt", "--session", &session, "--message", &garbage]).is_err());

    assert_eq!(fs::read(&session).unwrap(), before);
}
