use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use recryptor_testkit::{invalid_magic_bytes, sample_bytes};
use tempfile::TempDir;

const EXIT_SUCCESS: i32 = 0;
const EXIT_USAGE: i32 = 2;
const EXIT_FORMAT: i32 = 3;
const EXIT_IO: i32 = 4;
const EXIT_KEY_FORMAT: i32 = 6;
const EXIT_PASSPHRASE: i32 = 7;
const EXIT_UNAUTHORIZED: i32 = 8;
const EXIT_SENDER: i32 = 9;
const EXIT_TRUNCATED: i32 = 10;

const PASSPHRASE: &str = "correct horse";

fn base_command() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_recryptor-cli"));
    cmd.env_remove("C4GH_PASSPHRASE");
    cmd.env_remove("C4GH_PASSPHRASE_CONFIRM");
    cmd.env_remove("RUST_LOG");
    cmd
}

fn run_cmd(args: &[&str], envs: &[(&str, &str)]) -> Output {
    let mut cmd = base_command();
    cmd.args(args);
    for (key, val) in envs {
        cmd.env(key, val);
    }
    cmd.output().expect("run recryptor-cli")
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("utf-8 path")
}

fn assert_exit(output: &Output, expected: i32) {
    assert_eq!(
        output.status.code(),
        Some(expected),
        "stdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn assert_no_temp(output: &Path) {
    let mut tmp_path = output.as_os_str().to_owned();
    tmp_path.push(".tmp");
    let tmp_path = PathBuf::from(tmp_path);
    assert!(
        !tmp_path.exists(),
        "unexpected temp file: {}",
        tmp_path.display()
    );
}

fn write_file(path: &Path, data: &[u8]) {
    fs::write(path, data).expect("write file");
}

struct KeyPair {
    secret: PathBuf,
    public: PathBuf,
}

/// Generates `<name>.sec`/`<name>.pub`, protected by [`PASSPHRASE`] when `protect` is set.
fn generate_keys(dir: &Path, name: &str, protect: bool) -> KeyPair {
    let pair = KeyPair {
        secret: dir.join(format!("{name}.sec")),
        public: dir.join(format!("{name}.pub")),
    };

    let mut args = vec![
        "keygen",
        "--secret-key",
        path_str(&pair.secret),
        "--public-key",
        path_str(&pair.public),
    ];
    let envs: &[(&str, &str)] = if protect {
        &[("C4GH_PASSPHRASE", PASSPHRASE)]
    } else {
        args.push("--nocrypt");
        &[]
    };

    let output = run_cmd(&args, envs);
    assert_exit(&output, EXIT_SUCCESS);
    pair
}

/// Encrypts `plaintext` for `recipient`, written by `writer`.
fn encrypt_file(dir: &Path, plaintext: &[u8], writer: &KeyPair, recipient: &KeyPair) -> PathBuf {
    let input = dir.join("plain.bin");
    let container = dir.join("data.c4gh");
    write_file(&input, plaintext);

    let output = run_cmd(
        &[
            "encrypt",
            "-i",
            path_str(&input),
            "-o",
            path_str(&container),
            "--key",
            path_str(&writer.secret),
            "--recipient-key",
            path_str(&recipient.public),
        ],
        &[("C4GH_PASSPHRASE", PASSPHRASE)],
    );
    assert_exit(&output, EXIT_SUCCESS);
    container
}

#[test]
fn keygen_writes_armored_pair() {
    let dir = TempDir::new().expect("temp dir");
    let pair = generate_keys(dir.path(), "alice", true);

    let secret = fs::read_to_string(&pair.secret).expect("read secret");
    let public = fs::read_to_string(&pair.public).expect("read public");
    assert!(secret.starts_with("-----BEGIN CRYPT4GH PRIVATE KEY-----"));
    assert!(public.starts_with("-----BEGIN CRYPT4GH PUBLIC KEY-----"));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&pair.secret).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

#[test]
fn keygen_refuses_overwrite_without_force() {
    let dir = TempDir::new().expect("temp dir");
    let secret = dir.path().join("key.sec");
    let public = dir.path().join("key.pub");
    write_file(&secret, b"existing");

    let out = run_cmd(
        &[
            "keygen",
            "--secret-key",
            path_str(&secret),
            "--public-key",
            path_str(&public),
            "--nocrypt",
        ],
        &[],
    );

    assert_exit(&out, EXIT_USAGE);
    assert_eq!(fs::read(&secret).expect("read secret"), b"existing");
    assert!(!public.exists(), "public key should not be created");
}

#[test]
fn keygen_rejects_mismatched_confirmation() {
    let dir = TempDir::new().expect("temp dir");
    let secret = dir.path().join("key.sec");
    let public = dir.path().join("key.pub");

    let out = run_cmd(
        &[
            "keygen",
            "--secret-key",
            path_str(&secret),
            "--public-key",
            path_str(&public),
        ],
        &[
            ("C4GH_PASSPHRASE", PASSPHRASE),
            ("C4GH_PASSPHRASE_CONFIRM", "something else"),
        ],
    );

    assert_exit(&out, EXIT_USAGE);
    assert!(!secret.exists());
    assert!(!public.exists());
}

#[test]
fn recrypted_header_decrypts_for_new_recipient() {
    let dir = TempDir::new().expect("temp dir");
    let alice = generate_keys(dir.path(), "alice", true);
    let bob = generate_keys(dir.path(), "bob", false);
    let plaintext = sample_bytes(200_000);
    let container = encrypt_file(dir.path(), &plaintext, &alice, &alice);

    let bob_header = dir.path().join("bob.header");
    let recrypt = run_cmd(
        &[
            "recrypt",
            "-i",
            path_str(&container),
            "-o",
            path_str(&bob_header),
            "--key",
            path_str(&alice.secret),
            "--recipient-key",
            path_str(&bob.public),
        ],
        &[("C4GH_PASSPHRASE", PASSPHRASE)],
    );
    assert_exit(&recrypt, EXIT_SUCCESS);
    assert_no_temp(&bob_header);

    // Whole container as input, its own header skipped.
    let decrypted = dir.path().join("decrypted.bin");
    let dec = run_cmd(
        &[
            "decrypt",
            "-i",
            path_str(&container),
            "-o",
            path_str(&decrypted),
            "--header",
            path_str(&bob_header),
            "--skip-header",
            "--key",
            path_str(&bob.secret),
            "--sender-key",
            path_str(&alice.public),
        ],
        &[],
    );
    assert_exit(&dec, EXIT_SUCCESS);
    assert_eq!(fs::read(&decrypted).expect("read output"), plaintext);

    // Bare payload as input.
    let header_copy = dir.path().join("alice.header");
    let payload = dir.path().join("payload.bin");
    let split = run_cmd(
        &[
            "get-header",
            "-i",
            path_str(&container),
            "-o",
            path_str(&header_copy),
            "--payload",
            path_str(&payload),
        ],
        &[],
    );
    assert_exit(&split, EXIT_SUCCESS);
    assert_no_temp(&header_copy);
    assert_no_temp(&payload);

    let from_payload = dir.path().join("from-payload.bin");
    let dec = run_cmd(
        &[
            "decrypt",
            "-i",
            path_str(&payload),
            "-o",
            path_str(&from_payload),
            "--header",
            path_str(&bob_header),
            "--key",
            path_str(&bob.secret),
        ],
        &[],
    );
    assert_exit(&dec, EXIT_SUCCESS);
    assert_eq!(fs::read(&from_payload).expect("read output"), plaintext);
}

#[test]
fn encrypt_applies_edit_list() {
    let dir = TempDir::new().expect("temp dir");
    let bob = generate_keys(dir.path(), "bob", false);
    let input = dir.path().join("plain.txt");
    let container = dir.path().join("edited.c4gh");
    let decrypted = dir.path().join("edited.txt");
    write_file(&input, b"0123456789abcdefghij");

    let enc = run_cmd(
        &[
            "encrypt",
            "-i",
            path_str(&input),
            "-o",
            path_str(&container),
            "--recipient-key",
            path_str(&bob.public),
            "--edit-list",
            "2,3,5",
        ],
        &[],
    );
    assert_exit(&enc, EXIT_SUCCESS);

    let dec = run_cmd(
        &[
            "decrypt",
            "-i",
            path_str(&container),
            "-o",
            path_str(&decrypted),
            "--key",
            path_str(&bob.secret),
        ],
        &[],
    );
    assert_exit(&dec, EXIT_SUCCESS);
    assert_eq!(fs::read(&decrypted).expect("read output"), b"234abcdefghij");
}

#[test]
fn decrypt_refuses_existing_output() {
    let dir = TempDir::new().expect("temp dir");
    let bob = generate_keys(dir.path(), "bob", false);
    let container = encrypt_file(dir.path(), b"plaintext", &bob, &bob);
    let output = dir.path().join("dec.bin");
    write_file(&output, b"existing");

    let args = [
        "decrypt",
        "-i",
        path_str(&container),
        "-o",
        path_str(&output),
        "--key",
        path_str(&bob.secret),
    ];
    let dec = run_cmd(&args, &[]);
    assert_exit(&dec, EXIT_USAGE);
    assert_eq!(fs::read(&output).expect("read output"), b"existing");
    assert_no_temp(&output);

    let mut forced = args.to_vec();
    forced.push("--force");
    let dec = run_cmd(&forced, &[]);
    assert_exit(&dec, EXIT_SUCCESS);
    assert_eq!(fs::read(&output).expect("read output"), b"plaintext");
}

#[test]
fn foreign_key_is_unauthorized() {
    let dir = TempDir::new().expect("temp dir");
    let bob = generate_keys(dir.path(), "bob", false);
    let eve = generate_keys(dir.path(), "eve", false);
    let container = encrypt_file(dir.path(), b"plaintext", &bob, &bob);
    let output = dir.path().join("dec.bin");

    let dec = run_cmd(
        &[
            "decrypt",
            "-i",
            path_str(&container),
            "-o",
            path_str(&output),
            "--key",
            path_str(&eve.secret),
        ],
        &[],
    );
    assert_exit(&dec, EXIT_UNAUTHORIZED);
    assert!(!output.exists(), "output should not be created");
    assert_no_temp(&output);
}

#[test]
fn unexpected_sender_is_rejected() {
    let dir = TempDir::new().expect("temp dir");
    let bob = generate_keys(dir.path(), "bob", false);
    let mallory = generate_keys(dir.path(), "mallory", false);
    let container = encrypt_file(dir.path(), b"plaintext", &bob, &bob);
    let output = dir.path().join("dec.bin");

    let dec = run_cmd(
        &[
            "decrypt",
            "-i",
            path_str(&container),
            "-o",
            path_str(&output),
            "--key",
            path_str(&bob.secret),
            "--sender-key",
            path_str(&mallory.public),
        ],
        &[],
    );
    assert_exit(&dec, EXIT_SENDER);
    assert!(!output.exists());
    assert_no_temp(&output);
}

#[test]
fn protected_key_needs_the_right_passphrase() {
    let dir = TempDir::new().expect("temp dir");
    let alice = generate_keys(dir.path(), "alice", true);
    let container = encrypt_file(dir.path(), b"plaintext", &alice, &alice);
    let output = dir.path().join("dec.bin");
    let args = [
        "decrypt",
        "-i",
        path_str(&container),
        "-o",
        path_str(&output),
        "--key",
        path_str(&alice.secret),
    ];

    let empty = run_cmd(&args, &[("C4GH_PASSPHRASE", "")]);
    assert_exit(&empty, EXIT_PASSPHRASE);

    let wrong = run_cmd(&args, &[("C4GH_PASSPHRASE", "wrong")]);
    assert_exit(&wrong, EXIT_PASSPHRASE);
    assert!(!output.exists());
    assert_no_temp(&output);

    let right = run_cmd(&args, &[("C4GH_PASSPHRASE", PASSPHRASE)]);
    assert_exit(&right, EXIT_SUCCESS);
}

#[test]
fn malformed_key_file_is_key_format_error() {
    let dir = TempDir::new().expect("temp dir");
    let bob = generate_keys(dir.path(), "bob", false);
    let container = encrypt_file(dir.path(), b"plaintext", &bob, &bob);
    let bogus = dir.path().join("bogus.sec");
    write_file(&bogus, b"-----BEGIN CRYPT4GH PRIVATE KEY-----\nAAAA\n-----END CRYPT4GH PRIVATE KEY-----\n");

    let dec = run_cmd(
        &[
            "decrypt",
            "-i",
            path_str(&container),
            "-o",
            path_str(&dir.path().join("dec.bin")),
            "--key",
            path_str(&bogus),
        ],
        &[],
    );
    assert_exit(&dec, EXIT_KEY_FORMAT);
}

#[test]
fn invalid_container_is_format_error() {
    let dir = TempDir::new().expect("temp dir");
    let input = dir.path().join("bad.c4gh");
    let output = dir.path().join("bad.header");
    write_file(&input, &invalid_magic_bytes());

    let out = run_cmd(
        &["get-header", "-i", path_str(&input), "-o", path_str(&output)],
        &[],
    );
    assert_exit(&out, EXIT_FORMAT);
    assert!(!output.exists());
    assert_no_temp(&output);
}

#[test]
fn truncated_payload_is_reported() {
    let dir = TempDir::new().expect("temp dir");
    let bob = generate_keys(dir.path(), "bob", false);
    let container = encrypt_file(dir.path(), &sample_bytes(70_000), &bob, &bob);
    let mut bytes = fs::read(&container).expect("read container");
    bytes.truncate(bytes.len() - 4_480);
    write_file(&container, &bytes);
    let output = dir.path().join("dec.bin");

    let dec = run_cmd(
        &[
            "decrypt",
            "-i",
            path_str(&container),
            "-o",
            path_str(&output),
            "--key",
            path_str(&bob.secret),
        ],
        &[],
    );
    assert_exit(&dec, EXIT_TRUNCATED);
    assert!(!output.exists());
    assert_no_temp(&output);
}

#[test]
fn missing_output_is_usage_error() {
    let dir = TempDir::new().expect("temp dir");
    let input = dir.path().join("in.c4gh");
    write_file(&input, b"whatever");

    let out = run_cmd(&["get-header", "-i", path_str(&input)], &[]);
    assert_exit(&out, EXIT_USAGE);

    let out = run_cmd(&["decrypt", "-i", path_str(&input), "--skip-header"], &[]);
    assert_exit(&out, EXIT_USAGE);
}

#[test]
fn inspect_lists_packets() {
    let dir = TempDir::new().expect("temp dir");
    let bob = generate_keys(dir.path(), "bob", false);
    let container = encrypt_file(dir.path(), b"plaintext", &bob, &bob);

    let out = run_cmd(
        &[
            "inspect",
            "-i",
            path_str(&container),
            "--key",
            path_str(&bob.secret),
        ],
        &[],
    );
    assert_exit(&out, EXIT_SUCCESS);

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Packet count: 1"), "{stdout}");
    assert!(stdout.contains("content: data key"), "{stdout}");
}

#[test]
fn missing_recipient_key_is_named() {
    let dir = TempDir::new().expect("temp dir");
    let alice = generate_keys(dir.path(), "alice", true);
    let container = encrypt_file(dir.path(), b"payload", &alice, &alice);
    let missing = dir.path().join("does-not-exist.pub");
    let header = dir.path().join("new.header");

    let out = run_cmd(
        &[
            "recrypt",
            "-i",
            path_str(&container),
            "-o",
            path_str(&header),
            "--key",
            path_str(&alice.secret),
            "--recipient-key",
            path_str(&alice.public),
            "--recipient-key",
            path_str(&missing),
        ],
        &[("C4GH_PASSPHRASE", PASSPHRASE)],
    );

    assert_exit(&out, EXIT_IO);
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("does-not-exist.pub"), "stderr: {stderr}");
    assert!(!header.exists());
}

#[test]
fn missing_detached_header_is_named() {
    let dir = TempDir::new().expect("temp dir");
    let alice = generate_keys(dir.path(), "alice", false);
    let container = encrypt_file(dir.path(), b"payload", &alice, &alice);
    let header = dir.path().join("absent.header");
    let output = dir.path().join("out.bin");

    let out = run_cmd(
        &[
            "decrypt",
            "-i",
            path_str(&container),
            "-o",
            path_str(&output),
            "--header",
            path_str(&header),
            "--skip-header",
            "--key",
            path_str(&alice.secret),
        ],
        &[],
    );

    assert_exit(&out, EXIT_IO);
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("absent.header"), "stderr: {stderr}");
    assert!(!output.exists());
    assert_no_temp(&output);
}

#[cfg(unix)]
#[test]
fn split_payload_waits_for_its_header() {
    let dir = TempDir::new().expect("temp dir");
    let alice = generate_keys(dir.path(), "alice", false);
    let container = encrypt_file(dir.path(), &sample_bytes(5000), &alice, &alice);

    // A directory in the header's place makes its rename fail.
    let header = dir.path().join("header-slot");
    fs::create_dir(&header).expect("create dir");
    write_file(&header.join("occupant"), b"x");
    let payload = dir.path().join("payload.bin");

    let out = run_cmd(
        &[
            "get-header",
            "-i",
            path_str(&container),
            "-o",
            path_str(&header),
            "--payload",
            path_str(&payload),
            "--force",
        ],
        &[],
    );

    assert_exit(&out, EXIT_IO);
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("header-slot"), "stderr: {stderr}");
    assert!(!payload.exists(), "payload published without its header");
    assert_no_temp(&header);
    assert_no_temp(&payload);
}

#[test]
fn full_help_covers_every_subcommand() {
    let out = run_cmd(&["--full-help"], &[]);
    assert_exit(&out, EXIT_SUCCESS);

    let stdout = String::from_utf8_lossy(&out.stdout);
    for needle in [
        "get-header",
        "--payload",
        "--skip-header",
        "--recipient-key",
        "--nocrypt",
        "--edit-list",
    ] {
        assert!(stdout.contains(needle), "missing {needle} in:\n{stdout}");
    }
}
