//! Notevault command-line tool.
//!
//! Stores payloads in payment-transaction notes and reads them back.
//! Ledger endpoints come from the `ALGOD_*` / `INDEXER_*` environment
//! variables.

use std::io::Read as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

use notevault_codec::{CompressionChoice, RawContent};
use notevault_core::{
    revision_chain, BlocknoteReader, BlocknoteWriter, NoteEvent, ReadOptions, SaveOptions,
    StreamOptions, StreamnoteReader, StreamnoteWriter,
};
use notevault_crypto::SymmetricKey;
use notevault_ledger::{HttpLedger, Ledger};

/// Store arbitrary payloads inside ledger payment notes.
#[derive(Parser, Debug)]
#[command(name = "notevault")]
#[command(version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "NOTEVAULT_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log format (plain, json)
    #[arg(long, env = "NOTEVAULT_LOG_FORMAT", default_value = "plain")]
    log_format: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store a file or inline text as a blocknote payload
    Store {
        /// Sender account seed, hex
        #[arg(long, env = "NOTEVAULT_SENDER_SEED")]
        sender_seed: String,
        /// File to store
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,
        /// Inline text to store
        #[arg(long)]
        text: Option<String>,
        /// Codec: a name, "best" or "fast"
        #[arg(long, default_value = "best")]
        compression: String,
        /// Title recorded in metadata
        #[arg(long)]
        title: Option<String>,
        /// MIME recorded in metadata
        #[arg(long)]
        mime: Option<String>,
        /// Encrypt with a password
        #[arg(long)]
        password: Option<String>,
        /// Encrypt with a raw 32-byte hex key
        #[arg(long, conflicts_with = "password")]
        aes_key: Option<String>,
        /// Supersede a prior payload id
        #[arg(long)]
        revision_of: Option<String>,
        /// Price the upload without submitting
        #[arg(long)]
        simulate: bool,
    },
    /// Read a blocknote payload
    Read {
        /// Payload transaction id
        payload_id: String,
        /// Password for password-encrypted payloads
        #[arg(long)]
        password: Option<String>,
        /// Raw 32-byte hex key
        #[arg(long, conflicts_with = "password")]
        aes_key: Option<String>,
        /// 1-based revision index
        #[arg(long)]
        revision: Option<usize>,
        /// Skip decryption and decompression
        #[arg(long)]
        raw: bool,
        /// Write content here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Stream stdin to a streamnote session, finalizing on EOF
    StreamWrite {
        /// Sender account seed, hex
        #[arg(long, env = "NOTEVAULT_SENDER_SEED")]
        sender_seed: String,
        /// Per-chunk codec name
        #[arg(long)]
        compression: Option<String>,
        /// Password for the chunk stream cipher
        #[arg(long)]
        password: Option<String>,
    },
    /// Follow a streamnote session, writing chunks to stdout
    StreamRead {
        /// Payload transaction id
        payload_id: String,
        /// Password for the chunk stream cipher
        #[arg(long)]
        password: Option<String>,
        /// Raw 32-byte hex key
        #[arg(long, conflicts_with = "password")]
        aes_key: Option<String>,
    },
    /// List the revision chain of a payload
    Revisions {
        /// Payload transaction id
        payload_id: String,
    },
}

fn setup_logging(log_level: &str, log_format: &str) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    match log_format.to_lowercase().as_str() {
        "json" => {
            let subscriber = fmt::Subscriber::builder()
                .with_env_filter(filter)
                .json()
                .flatten_event(true)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("Failed to set subscriber")?;
        }
        _ => {
            let subscriber = fmt::Subscriber::builder()
                .with_env_filter(filter)
                .with_target(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("Failed to set subscriber")?;
        }
    }
    Ok(())
}

fn parse_compression(value: &str) -> CompressionChoice {
    match value {
        "best" => CompressionChoice::Best,
        "fast" => CompressionChoice::Fast,
        name => CompressionChoice::named(name),
    }
}

fn parse_key(value: Option<String>) -> Result<Option<SymmetricKey>> {
    value
        .map(|hex| SymmetricKey::from_hex(&hex).context("invalid AES key"))
        .transpose()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level, &args.log_format)?;

    let ledger: Arc<dyn Ledger> =
        Arc::new(HttpLedger::from_env().context("Failed to build ledger clients")?);

    match args.command {
        Command::Store {
            sender_seed,
            file,
            text,
            compression,
            title,
            mime,
            password,
            aes_key,
            revision_of,
            simulate,
        } => {
            let content = match (file, text) {
                (Some(path), _) => RawContent::Bytes(
                    std::fs::read(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?,
                ),
                (None, Some(text)) => RawContent::Text(text),
                (None, None) => anyhow::bail!("one of --file or --text is required"),
            };

            let writer = BlocknoteWriter::new(ledger);
            let result = writer
                .save(
                    &sender_seed,
                    content,
                    SaveOptions {
                        compression: parse_compression(&compression),
                        title,
                        mime,
                        password,
                        aes_key: parse_key(aes_key)?,
                        revision_of,
                        simulate,
                        ..SaveOptions::default()
                    },
                )
                .await?;

            info!(
                fees = result.fees,
                codec = %result.compression,
                duration_ms = result.duration_ms,
                simulation = result.simulation,
                "save finished"
            );
            if let Some(id) = result.payload_transaction_id {
                println!("{id}");
            }
        }

        Command::Read {
            payload_id,
            password,
            aes_key,
            revision,
            raw,
            output,
        } => {
            let reader = BlocknoteReader::new(ledger);
            let result = reader
                .read(
                    &payload_id,
                    ReadOptions {
                        password,
                        aes_key: parse_key(aes_key)?,
                        revision,
                        return_raw: raw,
                    },
                )
                .await?;

            info!(
                txid = %result.payload_transaction_id,
                mime = %result.metadata.mime,
                bytes = result.content.len(),
                "read finished"
            );
            match output {
                Some(path) => std::fs::write(&path, &result.content)
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => {
                    use std::io::Write as _;
                    std::io::stdout().write_all(&result.content)?;
                }
            }
        }

        Command::StreamWrite {
            sender_seed,
            compression,
            password,
        } => {
            let mut writer = StreamnoteWriter::new(
                ledger,
                sender_seed,
                StreamOptions {
                    compression,
                    password,
                    ..StreamOptions::default()
                },
            );

            let mut stdin = std::io::stdin();
            let mut buffer = [0u8; 4096];
            loop {
                let read = stdin.read(&mut buffer)?;
                if read == 0 {
                    break;
                }
                writer.save(&buffer[..read]).await?;
            }
            writer.stop().await?;
            if let Some(id) = writer.payload_transaction_id() {
                println!("{id}");
            }
        }

        Command::StreamRead {
            payload_id,
            password,
            aes_key,
        } => {
            let mut reader = StreamnoteReader::new(
                ledger,
                ReadOptions {
                    password,
                    aes_key: parse_key(aes_key)?,
                    ..ReadOptions::default()
                },
            );
            let mut events = reader.take_event_receiver().expect("fresh reader");

            let follow = tokio::spawn(async move { reader.run(&payload_id).await });
            use std::io::Write as _;
            let mut stdout = std::io::stdout();
            while let Some(event) = events.recv().await {
                match event {
                    NoteEvent::Data { bytes, .. } => {
                        stdout.write_all(&bytes)?;
                        stdout.flush()?;
                    }
                    NoteEvent::Finish { .. } => break,
                    NoteEvent::Error(message) => anyhow::bail!("stream failed: {message}"),
                    _ => {}
                }
            }
            follow.await??;
        }

        Command::Revisions { payload_id } => {
            let record = ledger.lookup_by_id(&payload_id).await?;
            let chain = revision_chain(ledger.as_ref(), &record).await?;
            for (index, id) in chain.iter().enumerate() {
                println!("{index}: {id}");
            }
        }
    }

    Ok(())
}
