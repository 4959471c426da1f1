#![deny(warnings)]
#![deny(clippy::all)]

use std::env;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::{Args, CommandFactory, Parser, Subcommand};
use recryptor_core::crypto::keys::{
    generate_keypair, load_private_key, load_public_key, read_key_file, write_key_file,
    PrivateKey, PublicKey,
};
use recryptor_core::crypto::CryptoError;
use recryptor_core::ErrorCategory;
use recryptor_format::{
    decrypt, decrypt_detached, encrypt, read_header, recrypt, save_header,
    save_header_and_payload, summarize, write_header, DecryptionKey, FormatError,
    PayloadHeaderPolicy, RecipientKey, PACKET_TYPE_DATA_ENC, PACKET_TYPE_EDIT_LIST,
};
use rpassword::prompt_password;
use thiserror::Error;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

const EXIT_SUCCESS: i32 = 0;
const EXIT_USAGE: i32 = 2;
const EXIT_FORMAT: i32 = 3;
const EXIT_IO: i32 = 4;
const EXIT_CRYPTO: i32 = 5;
const EXIT_KEY_FORMAT: i32 = 6;
const EXIT_PASSPHRASE: i32 = 7;
const EXIT_UNAUTHORIZED: i32 = 8;
const EXIT_SENDER: i32 = 9;
const EXIT_TRUNCATED: i32 = 10;
const EXIT_UNSUPPORTED: i32 = 11;

const PASSPHRASE_ENV: &str = "C4GH_PASSPHRASE";
const PASSPHRASE_CONFIRM_ENV: &str = "C4GH_PASSPHRASE_CONFIRM";

#[derive(Parser, Debug)]
#[command(
    name = "recryptor-cli",
    version,
    about = "Crypt4GH header recryptor",
    arg_required_else_help = true
)]
struct Cli {
    /// Print the help of every subcommand
    #[arg(long, exclusive = true)]
    full_help: bool,
    /// The encrypted input file
    #[arg(short, long, global = true)]
    input: Option<PathBuf>,
    /// The output file: a re-encrypted header, decrypted contents or an extracted header
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,
    /// Replace existing output files
    #[arg(long, global = true)]
    force: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy the header of the input container to the output
    GetHeader {
        /// Also copy the untouched payload to this file
        #[arg(long)]
        payload: Option<PathBuf>,
    },
    /// Decrypt the input container, optionally using a detached header
    Decrypt(DecryptArgs),
    /// Re-encrypt the header of the input container for new recipients
    Recrypt {
        /// Private key that opens the header; it also signs the new packets
        #[arg(long)]
        key: PathBuf,
        /// Public key of a new recipient (repeatable)
        #[arg(long = "recipient-key", required = true)]
        recipient_keys: Vec<PathBuf>,
    },
    /// Generate a new key pair
    Keygen {
        #[arg(long)]
        secret_key: PathBuf,
        #[arg(long)]
        public_key: PathBuf,
        #[arg(long)]
        comment: Option<String>,
        /// Store the private key without passphrase protection
        #[arg(long)]
        nocrypt: bool,
    },
    /// Encrypt the input file into a new container
    Encrypt {
        /// Writer private key; an ephemeral key is used when omitted
        #[arg(long)]
        key: Option<PathBuf>,
        /// Public key of a recipient (repeatable)
        #[arg(long = "recipient-key", required = true)]
        recipient_keys: Vec<PathBuf>,
        /// Comma-separated skip/keep lengths
        #[arg(long, value_delimiter = ',')]
        edit_list: Vec<u64>,
    },
    /// Describe the header of the input container
    Inspect {
        /// Private key used to identify packet types (repeatable)
        #[arg(long = "key")]
        keys: Vec<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct DecryptArgs {
    /// Header to use instead of the one carried by the input
    #[arg(long)]
    header: Option<PathBuf>,
    /// Private key of the reader (repeatable)
    #[arg(long = "key", required = true)]
    keys: Vec<PathBuf>,
    /// Only accept packets written by this public key
    #[arg(long)]
    sender_key: Option<PathBuf>,
    /// The input starts with its own header, which is skipped
    #[arg(long, requires = "header")]
    skip_header: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("format error: {0}")]
    Format(#[from] FormatError),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Usage(String),
    #[error("{stage} {}: {source}", .path.display())]
    Context {
        stage: &'static str,
        path: PathBuf,
        #[source]
        source: Box<CliError>,
    },
}

impl CliError {
    fn exit_code(&self) -> i32 {
        let category = match self {
            CliError::Usage(_) => return EXIT_USAGE,
            CliError::Context { source, .. } => return source.exit_code(),
            CliError::Format(err) => err.category(),
            CliError::Crypto(err) => err.category(),
            CliError::Io(err) => ErrorCategory::of_io(err),
        };

        match category {
            ErrorCategory::Io => EXIT_IO,
            ErrorCategory::Format => EXIT_FORMAT,
            ErrorCategory::Crypto => EXIT_CRYPTO,
            ErrorCategory::KeyFormat => EXIT_KEY_FORMAT,
            ErrorCategory::Passphrase => EXIT_PASSPHRASE,
            ErrorCategory::UnauthorizedPacket => EXIT_UNAUTHORIZED,
            ErrorCategory::SenderAuthentication => EXIT_SENDER,
            ErrorCategory::TruncatedStream => EXIT_TRUNCATED,
            ErrorCategory::UnsupportedOperation => EXIT_UNSUPPORTED,
        }
    }
}

/// Names the file a failing step was working on.
trait PathContext<T> {
    fn at_path(self, stage: &'static str, path: &Path) -> Result<T, CliError>;
}

impl<T, E: Into<CliError>> PathContext<T> for Result<T, E> {
    fn at_path(self, stage: &'static str, path: &Path) -> Result<T, CliError> {
        self.map_err(|err| CliError::Context {
            stage,
            path: path.to_path_buf(),
            source: Box::new(err.into()),
        })
    }
}

fn main() {
    let exit_code = run();
    std::process::exit(exit_code);
}

fn run() -> i32 {
    init_tracing();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                EXIT_USAGE
            } else {
                EXIT_SUCCESS
            };
        }
    };

    if cli.full_help {
        return match print_full_help() {
            Ok(()) => EXIT_SUCCESS,
            Err(err) => {
                report_error(&CliError::Io(err));
                EXIT_IO
            }
        };
    }
    let Some(command) = cli.command else {
        report_error(&CliError::Usage("missing subcommand".to_string()));
        return EXIT_USAGE;
    };

    let paths = IoPaths {
        input: cli.input,
        output: cli.output,
        force: cli.force,
    };

    let result = match command {
        Commands::GetHeader { payload } => cmd_get_header(&paths, payload.as_deref()),
        Commands::Decrypt(args) => cmd_decrypt(&paths, &args),
        Commands::Recrypt {
            key,
            recipient_keys,
        } => cmd_recrypt(&paths, &key, &recipient_keys),
        Commands::Keygen {
            secret_key,
            public_key,
            comment,
            nocrypt,
        } => cmd_keygen(
            &secret_key,
            &public_key,
            comment.as_deref(),
            nocrypt,
            paths.force,
        ),
        Commands::Encrypt {
            key,
            recipient_keys,
            edit_list,
        } => cmd_encrypt(&paths, key.as_deref(), &recipient_keys, &edit_list),
        Commands::Inspect { keys } => cmd_inspect(&paths, &keys),
    };

    match result {
        Ok(()) => EXIT_SUCCESS,
        Err(err) => {
            report_error(&err);
            err.exit_code()
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn print_full_help() -> io::Result<()> {
    let mut cli = Cli::command();
    cli.build();

    let mut out = io::stdout().lock();
    writeln!(out, "{}", cli.render_help())?;
    for sub in cli.get_subcommands_mut().filter(|sub| sub.get_name() != "help") {
        writeln!(out, "{}", sub.render_help())?;
    }
    Ok(())
}

fn report_error(err: &CliError) {
    error!(error = %err, "command failed");
    eprintln!("error: {err}");
}

struct IoPaths {
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    force: bool,
}

impl IoPaths {
    fn input(&self) -> Result<&Path, CliError> {
        self.input
            .as_deref()
            .ok_or_else(|| CliError::Usage("missing --input".to_string()))
    }

    fn output(&self) -> Result<&Path, CliError> {
        self.output
            .as_deref()
            .ok_or_else(|| CliError::Usage("missing --output".to_string()))
    }

    fn open_input(&self) -> Result<BufReader<File>, CliError> {
        let input = self.input()?;
        let file = File::open(input).at_path("unable to open input", input)?;
        Ok(BufReader::new(file))
    }
}

fn cmd_get_header(paths: &IoPaths, payload: Option<&Path>) -> Result<(), CliError> {
    let input = paths.input()?;
    let output = paths.output()?;
    info!(input = %input.display(), output = %output.display(), "extracting header");

    let mut header_out = TempOutput::create(output, paths.force)?;
    let mut reader = paths.open_input()?;

    let payload_out = match payload {
        Some(payload_path) => {
            let mut payload_out = TempOutput::create(payload_path, paths.force)?;
            let (header, copied) = save_header_and_payload(
                &mut reader,
                header_out.writer(),
                Some(payload_out.writer() as &mut dyn Write),
            )?;
            debug!(packets = header.packets.len(), payload_bytes = copied, "header split");
            Some(payload_out)
        }
        None => {
            let header = save_header(&mut reader, header_out.writer())?;
            debug!(packets = header.packets.len(), "header copied");
            None
        }
    };

    // A payload file is only published once its header is in place.
    header_out.commit()?;
    if let Some(payload_out) = payload_out {
        payload_out.commit()?;
    }
    Ok(())
}

fn cmd_decrypt(paths: &IoPaths, args: &DecryptArgs) -> Result<(), CliError> {
    let input = paths.input()?;
    let output = paths.output()?;
    info!(
        input = %input.display(),
        output = %output.display(),
        header = args.header.as_ref().map(|p| p.display().to_string()),
        "decrypting"
    );

    let sender = args.sender_key.as_deref().map(load_public).transpose()?;
    let keys = load_decryption_keys(&args.keys)?;

    let mut out = TempOutput::create(output, paths.force)?;
    let summary = match &args.header {
        Some(header_path) => {
            let policy = if args.skip_header {
                PayloadHeaderPolicy::Discard
            } else {
                PayloadHeaderPolicy::Keep
            };
            let header = File::open(header_path).at_path("unable to open header", header_path)?;
            decrypt_detached(
                BufReader::new(header),
                paths.open_input()?,
                &keys,
                out.writer(),
                sender.as_ref(),
                policy,
            )?
        }
        None => decrypt(&mut paths.open_input()?, &keys, out.writer(), sender.as_ref())?,
    };
    out.commit()?;

    info!(
        packets = summary.header.packets.len(),
        opened = summary.opened_packets,
        bytes = summary.plaintext_len,
        "decrypted"
    );
    Ok(())
}

fn cmd_recrypt(paths: &IoPaths, key: &Path, recipient_keys: &[PathBuf]) -> Result<(), CliError> {
    let input = paths.input()?;
    let output = paths.output()?;
    info!(
        input = %input.display(),
        output = %output.display(),
        recipients = recipient_keys.len(),
        "recrypting header"
    );

    let private_key = load_private(key)?;
    let recipients = recipient_keys
        .iter()
        .map(|path| load_public(path))
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = TempOutput::create(output, paths.force)?;
    let header = recrypt(
        &mut paths.open_input()?,
        &[DecryptionKey::new(private_key.clone())],
        &RecipientKey::for_recipients(&private_key, recipients),
    )?;
    write_header(out.writer(), &header)?;
    out.commit()?;

    info!(packets = header.packets.len(), "header recrypted");
    Ok(())
}

fn cmd_keygen(
    secret_path: &Path,
    public_path: &Path,
    comment: Option<&str>,
    nocrypt: bool,
    force: bool,
) -> Result<(), CliError> {
    info!(
        secret_key = %secret_path.display(),
        public_key = %public_path.display(),
        "generating key pair"
    );

    refuse_existing(secret_path, force)?;
    refuse_existing(public_path, force)?;

    let passphrase = keygen_passphrase(nocrypt)?;
    let (secret, public) =
        generate_keypair(passphrase.as_deref().map(String::as_str), comment)?;

    write_key_file(secret_path, &secret, true, force)
        .at_path("unable to write private key", secret_path)?;
    write_key_file(public_path, &public, false, force)
        .at_path("unable to write public key", public_path)?;
    Ok(())
}

fn cmd_encrypt(
    paths: &IoPaths,
    key: Option<&Path>,
    recipient_keys: &[PathBuf],
    edit_list: &[u64],
) -> Result<(), CliError> {
    let input = paths.input()?;
    let output = paths.output()?;
    info!(input = %input.display(), output = %output.display(), "encrypting");

    let writer_key = match key {
        Some(path) => load_private(path)?,
        None => PrivateKey::generate(),
    };
    let recipients = recipient_keys
        .iter()
        .map(|path| load_public(path))
        .collect::<Result<Vec<_>, _>>()?;
    let edit_list = (!edit_list.is_empty()).then_some(edit_list);

    let mut out = TempOutput::create(output, paths.force)?;
    let container = encrypt(
        &mut paths.open_input()?,
        out.writer(),
        &writer_key,
        &recipients,
        edit_list,
    )?;
    out.commit()?;

    info!(
        packets = container.header.packets.len(),
        segments = container.stats.segments,
        "encrypted"
    );
    Ok(())
}

fn cmd_inspect(paths: &IoPaths, key_paths: &[PathBuf]) -> Result<(), CliError> {
    let input = paths.input()?;
    info!(input = %input.display(), "reading header");

    let keys = load_decryption_keys(key_paths)?;
    let header = read_header(&mut paths.open_input()?)?;

    println!("Crypt4GH header");
    println!("  Path: {}", input.display());
    println!("  Version: {}", header.version);
    println!("  Header length: {} bytes", header.encoded_len());
    println!("  Packet count: {}", header.packets.len());
    println!("Packets:");

    for packet in summarize(&header, &keys) {
        let writer = packet
            .writer_key
            .map(|key| hex(key.as_bytes()))
            .unwrap_or_else(|| "-".to_string());
        let kind = match packet.packet_type {
            Some(PACKET_TYPE_DATA_ENC) => "data key".to_string(),
            Some(PACKET_TYPE_EDIT_LIST) => "edit list".to_string(),
            Some(other) => format!("type {other}"),
            None => "sealed".to_string(),
        };
        println!(
            "  - index: {} method: {} length: {} writer: {} content: {}",
            packet.index, packet.method, packet.encoded_len, writer, kind
        );
    }

    Ok(())
}

fn load_decryption_keys(paths: &[PathBuf]) -> Result<Vec<DecryptionKey>, CliError> {
    paths
        .iter()
        .map(|path| load_private(path).map(DecryptionKey::new))
        .collect()
}

fn load_private(path: &Path) -> Result<PrivateKey, CliError> {
    const STAGE: &str = "unable to read private key";
    let bytes = read_key_file(path).at_path(STAGE, path)?;
    let key = load_private_key(&bytes, || passphrase_for(path)).at_path(STAGE, path)?;
    debug!(path = %path.display(), "private key loaded");
    Ok(key)
}

fn load_public(path: &Path) -> Result<PublicKey, CliError> {
    const STAGE: &str = "unable to read public key";
    let bytes = read_key_file(path).at_path(STAGE, path)?;
    load_public_key(&bytes).at_path(STAGE, path)
}

/// Only called for encrypted private keys.
fn passphrase_for(path: &Path) -> Option<Zeroizing<String>> {
    if let Ok(value) = env::var(PASSPHRASE_ENV) {
        return Some(Zeroizing::new(value));
    }

    match prompt_password(format!("Passphrase for {}: ", path.display())) {
        Ok(value) => Some(Zeroizing::new(value)),
        Err(err) => {
            debug!(error = %err, "passphrase prompt unavailable");
            None
        }
    }
}

fn keygen_passphrase(nocrypt: bool) -> Result<Option<Zeroizing<String>>, CliError> {
    if nocrypt {
        return Ok(None);
    }

    let (passphrase, confirm) = match env::var(PASSPHRASE_ENV) {
        Ok(value) => (
            Zeroizing::new(value),
            env::var(PASSPHRASE_CONFIRM_ENV).ok().map(Zeroizing::new),
        ),
        Err(_) => {
            let first = Zeroizing::new(prompt_password("Passphrase for the private key: ")?);
            let second = Zeroizing::new(prompt_password("Confirm passphrase: ")?);
            (first, Some(second))
        }
    };

    if let Some(confirm) = confirm {
        if confirm.as_str() != passphrase.as_str() {
            return Err(CliError::Usage("passphrases do not match".to_string()));
        }
    }

    Ok(Some(passphrase).filter(|value| !value.is_empty()))
}

fn refuse_existing(path: &Path, force: bool) -> Result<(), CliError> {
    if !force && path.exists() {
        return Err(CliError::Usage(format!(
            "{} already exists; pass --force to replace it",
            path.display()
        )));
    }
    Ok(())
}

fn temp_path_for(output: &Path) -> PathBuf {
    let mut name = OsString::from(output.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Output written next to its destination and renamed into place on commit.
/// Dropping it uncommitted removes the temp file.
struct TempOutput {
    tmp_path: PathBuf,
    output: PathBuf,
    writer: BufWriter<File>,
    committed: bool,
}

impl TempOutput {
    fn create(output: &Path, force: bool) -> Result<Self, CliError> {
        refuse_existing(output, force)?;

        let tmp_path = temp_path_for(output);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .at_path("unable to create output", output)?;

        Ok(Self {
            tmp_path,
            output: output.to_path_buf(),
            writer: BufWriter::new(file),
            committed: false,
        })
    }

    fn writer(&mut self) -> &mut BufWriter<File> {
        &mut self.writer
    }

    fn commit(mut self) -> Result<(), CliError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        finalize_output(&self.tmp_path, &self.output)
            .at_path("unable to write output", &self.output)?;
        self.committed = true;
        debug!(output = %self.output.display(), "output committed");
        Ok(())
    }
}

impl Drop for TempOutput {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.tmp_path);
        }
    }
}

fn finalize_output(tmp_path: &Path, output: &Path) -> Result<(), io::Error> {
    if output.exists() {
        std::fs::remove_file(output)?;
    }
    std::fs::rename(tmp_path, output)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}
