use std::io::{self, Write};

use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use lapor_api::auth::passwords::PasswordService;
use lapor_api::auth::users::{self, NewAdmin};
use lapor_api::auth::validation;

#[derive(Parser, Debug)]
#[command(name = "create_admin", about = "Provision a Lapor admin account")]
struct Args {
    /// Login name for the admin.
    #[arg(long)]
    username: String,

    /// Email address for the account (stored lowercased).
    #[arg(long)]
    email: String,

    /// Plaintext password; must satisfy the registration password policy.
    #[arg(long)]
    password: String,

    /// Optional division the admin handles.
    #[arg(long)]
    divisi: Option<String>,
}

fn fail(message: impl std::fmt::Display) -> ! {
    let _ = writeln!(io::stderr(), "error: {message}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    let username = args.username.trim();
    let email = args.email.trim().to_lowercase();
    let divisi = args
        .divisi
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty());

    if username.is_empty() {
        fail("username must not be empty");
    }
    if let Err(err) = validation::validate_email(&email) {
        fail(err);
    }
    if let Some(divisi) = divisi {
        if let Err(err) = validation::validate_divisi(divisi) {
            fail(err);
        }
    }
    if let Err(err) = validation::validate_password(&args.password) {
        fail(err);
    }

    let database_url = std::env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await?;

    if users::username_or_email_taken(&pool, username, &email).await? {
        fail(format!("username '{username}' or email '{email}' already exists"));
    }

    let password_service = PasswordService::new()?;
    let password_hash = password_service.hash_password(&args.password)?;

    let admin = users::insert_admin(
        &pool,
        NewAdmin {
            username,
            email: &email,
            divisi,
            password_hash: &password_hash,
        },
    )
    .await?;

    println!("Created admin '{}' with id {}", username, admin.id);
    Ok(())
}
