use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context as _;
use axum::{response::Html, Router};
use axum_login::AuthManagerLayerBuilder;
use axum_server::tls_rustls::RustlsConfig;
use clap::{Args, Parser, Subcommand};
use db::DBConnection;
use log::{debug, info, warn};
use tera::{Context, Tera};
use tower_http::trace::TraceLayer;
use tower_sessions::{MemoryStore, SessionManagerLayer};

mod api;
mod db;
mod error;
mod forms;
mod models;
mod permissions;
mod session_auth;
mod templates;
mod utils;

#[derive(Clone)]
pub struct AppState {
    db_conn: DBConnection,
    /// Compiled page templates
    templates: Arc<Tera>,
}

impl AppState {
    pub fn new(db_conn: DBConnection) -> anyhow::Result<AppState> {
        let templates = templates::load().context("Couldn't compile templates")?;
        Ok(AppState {
            db_conn,
            templates: Arc::new(templates),
        })
    }

    pub async fn init(args: &DbArgs) -> anyhow::Result<AppState> {
        let credentials = match (&args.db_username, &args.db_password) {
            (Some(username), Some(password)) => Some((username.as_str(), password.as_str())),
            _ => None,
        };
        let db_conn = db::connect(
            &args.db_url,
            credentials,
            &args.db_namespace,
            &args.db_database,
        )
        .await
        .with_context(|| format!("Couldn't connect to database at {}", args.db_url))?;

        db::migrate(&db_conn).await.context("Couldn't migrate database")?;

        AppState::new(db_conn)
    }

    pub fn render(&self, template: &str, context: &Context) -> error::Result<Html<String>> {
        Ok(Html(self.templates.render(template, context)?))
    }
}

/// Router with the session and authentication layers applied
pub fn app(app_state: AppState, secure_cookies: bool) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default()).with_secure(secure_cookies);
    let backend = session_auth::Backend::new(app_state.db_conn.clone());
    let auth_layer = AuthManagerLayerBuilder::new(backend, session_layer).build();

    Router::new()
        .merge(api::router())
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(auth_layer)
}

#[derive(Args, Debug)]
pub struct DbArgs {
    /// `mem://` for an in-memory store, `ws://host:port` for a SurrealDB server
    #[arg(long, env = "DB_URL", default_value = "mem://")]
    db_url: String,
    #[arg(long, env = "DB_USERNAME")]
    db_username: Option<String>,
    #[arg(long, env = "DB_PASSWORD")]
    db_password: Option<String>,
    #[arg(long, env = "DB_NAMESPACE", default_value = "bugboard")]
    db_namespace: String,
    #[arg(long, env = "DB_DATABASE", default_value = "bugboard")]
    db_database: String,
}

/// Superuser created at startup when none exists yet
#[derive(Args, Debug)]
pub struct DefaultSuperuserArgs {
    #[arg(long, env = "DEFAULT_SUPERUSER_NAME")]
    default_superuser_name: Option<String>,
    #[arg(long, env = "DEFAULT_SUPERUSER_EMAIL")]
    default_superuser_email: Option<String>,
    #[arg(long, env = "DEFAULT_SUPERUSER_PASSWORD", hide_env_values = true)]
    default_superuser_password: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a superuser account and exit
    CreateSuperuser {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "SUPERUSER_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[derive(Parser, Debug)]
#[command(name = "bugboard")]
#[command(bin_name = "bugboard")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Flag to disable HTTPS
    #[arg(long)]
    no_https: bool,

    /// Address to listen on
    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0:3001")]
    bind: SocketAddr,

    /// Directory holding cert.pem and key.pem
    #[arg(long, env = "CERT_DIR", default_value = "certs")]
    cert_dir: PathBuf,

    /// Send the session cookie without the Secure attribute
    #[arg(long)]
    insecure_cookies: bool,

    #[command(flatten)]
    db: DbArgs,

    #[command(flatten)]
    default_superuser: DefaultSuperuserArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

async fn create_superuser(
    db_conn: &DBConnection,
    name: &str,
    email: &str,
    password: &str,
) -> anyhow::Result<()> {
    let email = utils::normalize_email(email);
    anyhow::ensure!(utils::is_valid_email(&email), "{email} is not a valid email address");
    anyhow::ensure!(
        db::member_by_email(db_conn, &email).await?.is_none(),
        "a member with email {email} already exists"
    );

    let password_hash = session_auth::hash_password(password)
        .map_err(|err| anyhow::anyhow!("Couldn't hash password: {err}"))?;
    db::create_member(db_conn, name, &email, password_hash, true).await?;

    Ok(())
}

async fn ensure_default_superuser(
    db_conn: &DBConnection,
    args: &DefaultSuperuserArgs,
) -> anyhow::Result<()> {
    let (Some(name), Some(email), Some(password)) = (
        &args.default_superuser_name,
        &args.default_superuser_email,
        &args.default_superuser_password,
    ) else {
        debug!("No default superuser configured");
        return Ok(());
    };

    if db::superuser_exists(db_conn).await? {
        return Ok(());
    }

    info!("Creating default superuser {email}");
    create_superuser(db_conn, name, email, password).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::builder().format_timestamp(None).init();

    if dotenvy::dotenv().is_err() {
        warn!("Error reading .env file");
    } else {
        debug!("Loaded env vars from .env");
    }

    let cli = Cli::parse();

    let app_state = AppState::init(&cli.db).await?;

    if let Some(Command::CreateSuperuser {
        name,
        email,
        password,
    }) = &cli.command
    {
        create_superuser(&app_state.db_conn, name, email, password).await?;
        info!("Created superuser {email}");
        return Ok(());
    }

    ensure_default_superuser(&app_state.db_conn, &cli.default_superuser).await?;

    let app = app(app_state, !cli.insecure_cookies);

    if cli.no_https {
        info!("Starting server on {} with HTTPS disabled...", cli.bind);

        axum_server::bind(cli.bind)
            .serve(app.into_make_service())
            .await?;
    } else {
        info!("Starting server on {} with HTTPS...", cli.bind);

        let rustls_config = RustlsConfig::from_pem_file(
            cli.cert_dir.join("cert.pem"),
            cli.cert_dir.join("key.pem"),
        )
        .await
        .with_context(|| format!("Couldn't load certificates from {}", cli.cert_dir.display()))?;

        axum_server::bind_rustls(cli.bind, rustls_config)
            .serve(app.into_make_service())
            .await?;
    }

    Ok(())
}
