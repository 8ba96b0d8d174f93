#![forbid(unsafe_code)]

//! ulriksdal CLI: validate, sign and harden locators.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use ulriksdal::core::{algorithm, Error};
use ulriksdal::keys::{loader, TrustAnchor};
use ulriksdal::schema::{ResourceStore, CATALOG};
use ulriksdal::xml::IdAttribute;
use ulriksdal::{
    harden, DocumentNamespaces, LocatorPolicy, SchemaSource, ValidationResult, Validator,
    ValidatorConfig,
};

#[derive(Parser)]
#[command(
    name = "ulriksdal",
    about = "Ulriksdal: hardened XML signature validation for SAML and SOAP",
    version
)]
struct Cli {
    /// Verbose output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a signed document against a schema and a trust anchor
    Validate {
        /// Input XML file
        file: PathBuf,

        /// Trust anchor: X.509 certificate or public key (PEM or DER)
        #[arg(short = 'k', long)]
        key: PathBuf,

        /// Initial schema: a file or the name of a bundled schema
        #[arg(short = 's', long)]
        schema: String,

        /// Locator of the ds:Signature element
        #[arg(long)]
        signature: String,

        /// Locator of the element the signature must cover
        #[arg(long)]
        target: String,

        /// Identifier attribute on the target element
        #[arg(long = "id-attr")]
        id_attr: Option<String>,

        /// Namespace of the identifier attribute
        #[arg(long = "id-ns", requires = "id_attr")]
        id_ns: Option<String>,

        /// Fail when a locator step matches more than one element
        #[arg(long = "require-unique")]
        require_unique: bool,

        /// Read catalog schemas from this directory instead of the bundled copies
        #[arg(long = "schema-dir")]
        schema_dir: Option<PathBuf>,
    },

    /// Print the hardened XPath for an element locator
    Harden {
        /// Absolute locator, e.g. /soape:Envelope/soape:Body
        locator: String,

        /// Bind a prefix (PREFIX=URI); may be repeated
        #[arg(long = "ns")]
        ns: Vec<String>,
    },

    /// Sign an XML template
    Sign {
        /// Template XML file (with empty DigestValue/SignatureValue)
        template: PathBuf,

        /// Private key (PEM)
        #[arg(short = 'k', long)]
        key: PathBuf,

        /// Identifier attribute the template's references name
        #[arg(long = "id-attr")]
        id_attr: Option<String>,

        /// Namespace of the identifier attribute
        #[arg(long = "id-ns", requires = "id_attr")]
        id_ns: Option<String>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the schema catalog
    Catalog,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Validate {
            file,
            key,
            schema,
            signature,
            target,
            id_attr,
            id_ns,
            require_unique,
            schema_dir,
        } => cmd_validate(
            file,
            key,
            schema,
            signature,
            target,
            id_attribute(id_attr, id_ns),
            require_unique,
            schema_dir,
        ),
        Commands::Harden { locator, ns } => cmd_harden(&locator, &ns),
        Commands::Sign {
            template,
            key,
            id_attr,
            id_ns,
            output,
        } => cmd_sign(template, key, id_attribute(id_attr, id_ns), output),
        Commands::Catalog => cmd_catalog(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_validate(
    file: PathBuf,
    key: PathBuf,
    schema: String,
    signature: String,
    target: String,
    id_attr: Option<IdAttribute>,
    require_unique: bool,
    schema_dir: Option<PathBuf>,
) -> Result<(), Error> {
    let anchor = TrustAnchor::from_file(&key)?;
    let mut config = ValidatorConfig::new(anchor, SchemaSource::from_arg(&schema), signature, target);
    if let Some(attribute) = id_attr {
        config = config.with_id_attribute(attribute);
    }
    if require_unique {
        config = config.with_locator_policy(LocatorPolicy::RequireUnique);
    }
    if let Some(dir) = schema_dir {
        config = config.with_resource_store(ResourceStore::Directory(dir));
    }

    let result = Validator::new(config).validate_file(&file)?;
    report(&result)?;
    if !result.verified {
        process::exit(2);
    }
    Ok(())
}

fn report(result: &ValidationResult) -> Result<(), Error> {
    if let Some(element) = &result.validated_element {
        let fingerprint = algorithm_digest(&element.canonical)?;
        println!("OK");
        println!(
            "  element: {} (bytes {}..{})",
            element.expanded_name(),
            element.range.start,
            element.range.end
        );
        println!("  c14n sha256: {}", hex::encode(fingerprint));
    } else {
        println!("INVALID");
    }
    if let Some(diagnostics) = &result.diagnostics {
        match &diagnostics.signature_value_reason {
            Some(reason) => println!("  SignatureValue: invalid ({reason})"),
            None => println!("  SignatureValue: valid"),
        }
        for reference in &diagnostics.references {
            let uri = reference.uri.as_deref().unwrap_or("<none>");
            match &reference.reason {
                Some(reason) => println!("  Reference {} {uri}: invalid ({reason})", reference.index),
                None => println!("  Reference {} {uri}: valid", reference.index),
            }
        }
    }
    Ok(())
}

fn cmd_harden(locator: &str, bindings: &[String]) -> Result<(), Error> {
    let mut namespaces = DocumentNamespaces::new();
    for binding in bindings {
        let (prefix, uri) = binding.split_once('=').ok_or_else(|| {
            Error::MalformedLocator(format!("namespace binding {binding:?} is not PREFIX=URI"))
        })?;
        namespaces = namespaces.with_binding(prefix, uri);
    }
    println!("{}", harden(locator, &namespaces)?);
    Ok(())
}

fn cmd_sign(
    template: PathBuf,
    key: PathBuf,
    id_attr: Option<IdAttribute>,
    output: Option<PathBuf>,
) -> Result<(), Error> {
    let template_xml = read_file(&template)?;
    let signing_key = loader::load_private_key_file(&key)?
        .to_signing_key()
        .ok_or_else(|| Error::Key(format!("{} holds no private key", key.display())))?;

    let mut ctx = ulriksdal::dsig::SignContext::new(signing_key);
    if let Some(attribute) = id_attr {
        ctx = ctx.with_id_attribute(attribute);
    }

    tracing::info!(template = %template.display(), "signing");
    let signed = ulriksdal::dsig::sign::sign(&ctx, &template_xml)?;
    write_output(output, signed.as_bytes())
}

fn cmd_catalog() -> Result<(), Error> {
    for entry in CATALOG {
        println!("{:?} -> {}", entry.identifier, entry.resource);
    }
    Ok(())
}

// ── Utility functions ────────────────────────────────────────────────

fn init_logging(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn id_attribute(name: Option<String>, namespace: Option<String>) -> Option<IdAttribute> {
    name.map(|name| match namespace {
        Some(namespace) => IdAttribute::namespaced(namespace, name),
        None => IdAttribute::new(name),
    })
}

fn algorithm_digest(data: &[u8]) -> Result<Vec<u8>, Error> {
    ulriksdal::crypto::digest::digest(algorithm::SHA256, data)
}

fn read_file(path: &Path) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|e| {
        Error::Io(std::io::Error::new(e.kind(), format!("{}: {e}", path.display())))
    })
}

fn write_output(path: Option<PathBuf>, data: &[u8]) -> Result<(), Error> {
    match path {
        Some(p) => std::fs::write(&p, data).map_err(Error::Io),
        None => {
            use std::io::Write;
            std::io::stdout().write_all(data).map_err(Error::Io)
        }
    }
}
