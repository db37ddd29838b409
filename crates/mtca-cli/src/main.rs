//! mtca - Merkle Tree Certificate authority
//!
//! CLI front-end for creating a CA, queueing assertions, issuing batches,
//! and inspecting the artifacts a CA publishes.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

/// mtca - Merkle Tree Certificate authority
#[derive(Parser, Debug)]
#[command(name = "mtca")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Write a CPU profile to the given file
    #[arg(long, global = true)]
    cpuprofile: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// CA management
    Ca {
        /// Path to CA state
        #[arg(long, default_value = ".")]
        ca_path: PathBuf,

        #[command(subcommand)]
        command: CaCommands,
    },

    /// Creates a new assertion
    NewAssertion {
        #[command(flatten)]
        assertion: AssertionFlags,

        /// Path to write the assertion to (stdout when absent)
        #[arg(short, long)]
        out_file: Option<PathBuf>,
    },

    /// Parses stored artifacts
    Inspect {
        /// Path to CA parameters, required to parse some files
        #[arg(short = 'p', long)]
        ca_params: Option<PathBuf>,

        #[command(subcommand)]
        command: InspectCommands,
    },
}

#[derive(Subcommand, Debug)]
enum CaCommands {
    /// Creates a new CA
    New {
        /// Issuer id (at most 32 bytes)
        issuer_id: String,

        /// Server the batch artifacts will be served from
        http_server: String,

        /// Time between batches, in seconds
        #[arg(short, long)]
        batch_duration: Option<u64>,

        /// Lifetime of an assertion, in seconds
        #[arg(short, long)]
        lifetime: Option<u64>,

        /// Time to serve assertions, in seconds
        #[arg(short, long)]
        storage_duration: Option<u64>,
    },

    /// Queues an assertion for issuance
    Queue {
        #[command(flatten)]
        assertion: AssertionFlags,

        /// Read the assertion from the given file
        #[arg(short, long)]
        in_file: Option<PathBuf>,

        /// Queue the same assertion several times
        #[arg(long, default_value_t = 1)]
        debug_repeat: u32,

        /// Varies each repeated assertion slightly
        #[arg(long)]
        debug_vary: bool,
    },

    /// Prints the queue
    ShowQueue,

    /// Certifies and issues queued assertions
    Issue,

    /// Creates a certificate for an issued assertion
    Cert {
        #[command(flatten)]
        assertion: AssertionFlags,

        /// Read the assertion from the given file
        #[arg(short, long)]
        in_file: Option<PathBuf>,

        /// Path to write the certificate to (stdout when absent)
        #[arg(short, long)]
        out_file: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum InspectCommands {
    /// Parses a ca-params file
    CaParams {
        /// Path to read (stdin when absent)
        path: Option<PathBuf>,
    },

    /// Parses a batch's signed-validity-window file
    SignedValidityWindow {
        /// Path to read (stdin when absent)
        path: Option<PathBuf>,
    },

    /// Parses a batch's abridged-assertions file
    AbridgedAssertions {
        /// Path to read (stdin when absent)
        path: Option<PathBuf>,
    },

    /// Parses an assertion
    Assertion {
        /// Path to read (stdin when absent)
        path: Option<PathBuf>,
    },

    /// Parses a batch's tree file
    Tree {
        /// Path to read (stdin when absent)
        path: Option<PathBuf>,
    },

    /// Parses a batch's index file
    Index {
        /// Path to read (stdin when absent)
        path: Option<PathBuf>,
    },

    /// Parses a certificate
    Cert {
        /// Path to read (stdin when absent)
        path: Option<PathBuf>,
    },
}

/// Flags that describe an assertion on the command line.
#[derive(Args, Debug, Clone)]
struct AssertionFlags {
    /// DNS name claim (repeatable)
    #[arg(short = 'd', long = "dns")]
    dns: Vec<String>,

    /// DNS wildcard claim (repeatable)
    #[arg(short = 'w', long = "dns-wildcard")]
    dns_wildcard: Vec<String>,

    /// ENS name claim (repeatable)
    #[arg(short = 'e', long = "ens")]
    ens: Vec<String>,

    /// IPv4 address claim (repeatable)
    #[arg(long = "ip4")]
    ip4: Vec<String>,

    /// IPv6 address claim (repeatable)
    #[arg(long = "ip6")]
    ip6: Vec<String>,

    /// Path to PEM encoded subject public key
    #[arg(long = "tls-pem")]
    tls_pem: Option<PathBuf>,

    /// Path to DER encoded subject public key
    #[arg(long = "tls-der")]
    tls_der: Option<PathBuf>,

    /// TLS signature scheme to be used by the subject
    #[arg(long = "tls-scheme")]
    tls_scheme: Option<String>,

    /// Only proceed if the assertion matches this checksum (hex)
    #[arg(long)]
    checksum: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let profiler = match &cli.cpuprofile {
        Some(_) => Some(
            pprof::ProfilerGuardBuilder::default()
                .frequency(100)
                .build()
                .context("starting CPU profiler")?,
        ),
        None => None,
    };

    let result = run(&cli);

    if let (Some(path), Some(guard)) = (&cli.cpuprofile, profiler) {
        commands::write_cpu_profile(path, &guard)?;
    }

    result
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Ca { ca_path, command } => match command {
            CaCommands::New {
                issuer_id,
                http_server,
                batch_duration,
                lifetime,
                storage_duration,
            } => commands::ca::new(
                ca_path,
                issuer_id,
                http_server,
                *batch_duration,
                *lifetime,
                *storage_duration,
            ),
            CaCommands::Queue {
                assertion,
                in_file,
                debug_repeat,
                debug_vary,
            } => commands::ca::queue(
                ca_path,
                assertion,
                in_file.as_deref(),
                *debug_repeat,
                *debug_vary,
            ),
            CaCommands::ShowQueue => commands::ca::show_queue(ca_path),
            CaCommands::Issue => commands::ca::issue(ca_path),
            CaCommands::Cert {
                assertion,
                in_file,
                out_file,
            } => commands::ca::cert(ca_path, assertion, in_file.as_deref(), out_file.as_deref()),
        },
        Commands::NewAssertion {
            assertion,
            out_file,
        } => commands::assertion::new_assertion(assertion, out_file.as_deref()),
        Commands::Inspect { ca_params, command } => {
            let params = ca_params.as_deref();
            match command {
                InspectCommands::CaParams { path } => {
                    commands::inspect::ca_params(path.as_deref())
                },
                InspectCommands::SignedValidityWindow { path } => {
                    commands::inspect::signed_validity_window(path.as_deref(), params)
                },
                InspectCommands::AbridgedAssertions { path } => {
                    commands::inspect::abridged_assertions(path.as_deref())
                },
                InspectCommands::Assertion { path } => {
                    commands::inspect::assertion(path.as_deref())
                },
                InspectCommands::Tree { path } => commands::inspect::tree(path.as_deref()),
                InspectCommands::Index { path } => commands::inspect::index(path.as_deref()),
                InspectCommands::Cert { path } => {
                    commands::inspect::cert(path.as_deref(), params)
                },
            }
        },
    }
}
