use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use realid_auth::{spawn_engine, AuthService, EngineHandle, LogMailer, OtpStore, RegistrationState};
use realid_core::{FaceDetector, FacePipeline};
use realid_store::{CredentialVault, SqliteStore};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Parser)]
#[command(
    name = "realid",
    about = "REAL ID face login and password vault",
    after_help = "OTP codes are written to the log at debug level: RUST_LOG=realid_auth=debug"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and its tables
    Init,
    /// Register a new identity: email code, then face
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        /// Image containing the face to enroll
        #[arg(long)]
        image: PathBuf,
    },
    /// Log in by face or by email code
    Login {
        #[command(flatten)]
        auth: LoginArgs,
    },
    /// Run face detection on an image and print what was found
    Detect {
        #[arg(long)]
        image: PathBuf,
    },
    /// Manage stored credentials. Logs in first, like `login`.
    Vault {
        #[command(flatten)]
        auth: LoginArgs,
        #[command(subcommand)]
        action: VaultAction,
    },
}

#[derive(Args)]
struct LoginArgs {
    /// Expected identity (required with --otp)
    #[arg(long)]
    email: Option<String>,
    /// Image containing the face to identify
    #[arg(long, conflicts_with = "otp", required_unless_present = "otp")]
    image: Option<PathBuf>,
    /// Send a one-time code to the email and prompt for it
    #[arg(long, requires = "email")]
    otp: bool,
}

/// An email that passed face or OTP login in this invocation.
struct Authenticated(String);

#[derive(Subcommand)]
enum VaultAction {
    /// List credentials
    List,
    /// Store a credential
    Add {
        #[arg(long)]
        service: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        secret: String,
    },
    /// Replace a credential
    Update {
        id: i64,
        #[arg(long)]
        service: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        secret: String,
    },
    /// Delete a credential
    Delete { id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    tracing::debug!(
        db_path = %config.db_path.display(),
        threshold = config.match_threshold,
        otp_ttl_secs = config.otp_ttl_secs,
        "configuration loaded"
    );

    match cli.command {
        Commands::Init => {
            SqliteStore::open(&config.db_path)?;
            print_json(&serde_json::json!({ "db_path": config.db_path }))?;
        }
        Commands::Register { email, name, image } => {
            let service = auth_service(&config)?;
            let image = read_image(&image)?;
            let mut state = RegistrationState::default();

            service.begin_registration(&mut state, &email, &name)?;
            let code = prompt(&format!("Registration code sent to {email}: "))?;
            service.confirm_registration_otp(&mut state, &code)?;
            let record = service.complete_registration(&mut state, image).await?;

            print_json(&serde_json::json!({
                "registered": record.email,
                "name": record.name,
                "created_at": record.created_at,
            }))?;
        }
        Commands::Login { auth } => {
            let service = auth_service(&config)?;
            let Authenticated(who) = authenticate(&service, auth).await?;
            let name = service.display_name(&who)?;
            print_json(&serde_json::json!({ "email": who, "name": name }))?;
        }
        Commands::Detect { image } => {
            let engine = engine(&config)?;
            let capture = engine.capture(read_image(&image)?).await?;
            let prefix: String = capture
                .descriptor
                .values()
                .iter()
                .take(8)
                .map(|v| format!("{:02x}", (v * 255.0).round() as u8))
                .collect();
            print_json(&serde_json::json!({
                "detector": capture.detector,
                "image_size": capture.image_size,
                "face": capture.bbox,
                "descriptor_prefix": prefix,
            }))?;
        }
        Commands::Vault { auth, action } => {
            let service = auth_service(&config)?;
            let owner = authenticate(&service, auth).await?;
            let store = SqliteStore::open(&config.db_path)?;
            run_vault(&store, &owner, action)?;
        }
    }

    Ok(())
}

async fn authenticate(service: &AuthService<SqliteStore>, args: LoginArgs) -> Result<Authenticated> {
    let email = match (args.image, args.otp, args.email) {
        (Some(image), _, expected) => {
            let matched = service.authenticate_face(read_image(&image)?).await?;
            if let Some(expected) = expected.filter(|e| *e != matched) {
                bail!("face matched a different identity than {expected}");
            }
            matched
        }
        (None, true, Some(email)) => {
            service.send_login_otp(&email)?;
            let code = prompt(&format!("Login code sent to {email}: "))?;
            service.verify_login_otp(&email, &code)?;
            email
        }
        (None, true, None) => bail!("--otp needs --email"),
        (None, false, _) => bail!("pass --image or --otp"),
    };
    tracing::info!(email = %email, "authenticated");
    Ok(Authenticated(email))
}

fn run_vault(store: &SqliteStore, owner: &Authenticated, action: VaultAction) -> Result<()> {
    let email = owner.0.as_str();
    match action {
        VaultAction::List => {
            print_json(&store.list(email)?)?;
        }
        VaultAction::Add {
            service,
            username,
            secret,
        } => {
            let id = store.add(email, &service, username.as_deref(), &secret)?;
            print_json(&serde_json::json!({ "id": id }))?;
        }
        VaultAction::Update {
            id,
            service,
            username,
            secret,
        } => {
            if !store.update(email, id, &service, username.as_deref(), &secret)? {
                bail!("no credential {id} for {email}");
            }
            print_json(&serde_json::json!({ "updated": id }))?;
        }
        VaultAction::Delete { id } => {
            if !store.delete(email, id)? {
                bail!("no credential {id} for {email}");
            }
            print_json(&serde_json::json!({ "deleted": id }))?;
        }
    }
    Ok(())
}

fn auth_service(config: &Config) -> Result<AuthService<SqliteStore>> {
    let store = Arc::new(SqliteStore::open(&config.db_path)?);
    let otp = Arc::new(OtpStore::new(config.otp_ttl()));
    let mailer = Arc::new(LogMailer::new(config.mail_sender.clone()));
    Ok(AuthService::new(store, otp, mailer, engine(config)?).with_threshold(config.match_threshold))
}

fn engine(config: &Config) -> Result<EngineHandle> {
    let detector = load_detector(config)?;
    tracing::info!(backend = detector.name(), "face detector ready");
    let pipeline = FacePipeline::new(detector);
    Ok(spawn_engine(pipeline)?)
}

#[cfg(not(feature = "opencv"))]
fn load_detector(config: &Config) -> Result<Box<dyn FaceDetector>> {
    let detector = realid_core::detector::SeetaDetector::load(&config.detector_model)
        .context("set REALID_DETECTOR_MODEL to a SeetaFace frontal model")?;
    Ok(Box::new(detector))
}

#[cfg(feature = "opencv")]
fn load_detector(config: &Config) -> Result<Box<dyn FaceDetector>> {
    let detector = realid_core::detector::HaarCascadeDetector::load(&config.cascade_path)
        .context("set REALID_CASCADE_PATH to haarcascade_frontalface_default.xml")?;
    Ok(Box::new(detector))
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn prompt(message: &str) -> Result<String> {
    let mut stderr = std::io::stderr();
    write!(stderr, "{message}")?;
    stderr.flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("realid").chain(args.iter().copied()))
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_vault_requires_a_login_method() {
        assert!(parse(&["vault", "list"]).is_err());
        assert!(parse(&["vault", "--email", "alice@example.com", "list"]).is_err());
        assert!(parse(&["vault", "--otp", "list"]).is_err());
    }

    #[test]
    fn test_vault_accepts_face_or_otp_login() {
        let cli = parse(&["vault", "--image", "me.jpg", "delete", "3"]).unwrap();
        let Commands::Vault { auth, action } = cli.command else {
            panic!("expected vault command");
        };
        assert_eq!(auth.image.as_deref(), Some(Path::new("me.jpg")));
        assert!(matches!(action, VaultAction::Delete { id: 3 }));

        let cli = parse(&["vault", "--otp", "--email", "alice@example.com", "list"]).unwrap();
        let Commands::Vault { auth, action } = cli.command else {
            panic!("expected vault command");
        };
        assert!(auth.otp);
        assert_eq!(auth.email.as_deref(), Some("alice@example.com"));
        assert!(matches!(action, VaultAction::List));
    }

    #[test]
    fn test_login_rejects_both_methods() {
        assert!(parse(&["login", "--image", "me.jpg", "--otp", "--email", "a@example.com"]).is_err());
    }

    #[test]
    fn test_vault_operations_use_the_authenticated_owner() {
        let store = SqliteStore::open_in_memory().unwrap();
        let bob_id = store.add("bob@example.com", "bank", None, "bob-pin").unwrap();
        let alice = Authenticated("alice@example.com".into());

        run_vault(
            &store,
            &alice,
            VaultAction::Add {
                service: "github".into(),
                username: Some("alice".into()),
                secret: "hunter2".into(),
            },
        )
        .unwrap();
        assert!(run_vault(&store, &alice, VaultAction::Delete { id: bob_id }).is_err());

        assert_eq!(store.list("alice@example.com").unwrap().len(), 1);
        assert_eq!(store.list("bob@example.com").unwrap()[0].secret, "bob-pin");
    }
}
