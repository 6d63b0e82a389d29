use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use probecare_backend::RestBackend;
use probecare_cli::{commands, AppConfig};
use probecare_session::{ProfileDraft, ProfileUpdate, Role, SessionSynchronizer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

fn role_arg(required: bool) -> Arg {
    Arg::new("role")
        .long("role")
        .required(required)
        .value_parser(|s: &str| s.parse::<Role>())
        .help("SALES (VENTAS) or ENGINEER (INGENIERO)")
}

fn cli() -> Command {
    Command::new("probecare")
        .version(probecare_cli::VERSION)
        .about("ProbeCare sign-in, profile and client management")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines on stderr"),
        )
        .arg(
            Arg::new("wait")
                .long("wait")
                .global(true)
                .default_value("10")
                .value_parser(value_parser!(u64))
                .help("Seconds to wait for the session to settle"),
        )
        .subcommand(
            Command::new("login")
                .about("Sign in with email and password")
                .arg(Arg::new("email").long("email").required(true))
                .arg(Arg::new("password").long("password").required(true)),
        )
        .subcommand(
            Command::new("register")
                .about("Create an account and its profile")
                .arg(Arg::new("name").long("name").required(true))
                .arg(Arg::new("email").long("email").required(true))
                .arg(Arg::new("password").long("password").required(true))
                .arg(role_arg(true)),
        )
        .subcommand(Command::new("whoami").about("Show the signed-in user"))
        .subcommand(Command::new("logout").about("Sign out"))
        .subcommand(
            Command::new("update-profile")
                .about("Change name, email or role")
                .arg(Arg::new("name").long("name"))
                .arg(Arg::new("email").long("email"))
                .arg(role_arg(false)),
        )
        .subcommand(
            Command::new("clients")
                .about("Client directory of the signed-in user")
                .subcommand_required(true)
                .subcommand(Command::new("list").about("List clients"))
                .subcommand(
                    Command::new("add")
                        .about("Add a client")
                        .arg(Arg::new("name").long("name").required(true))
                        .arg(Arg::new("phone").long("phone").required(true)),
                ),
        )
        .subcommand(
            Command::new("upload")
                .about("Upload a file to storage")
                .arg(Arg::new("kind").long("kind").required(true))
                .arg(
                    Arg::new("file")
                        .long("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
}

fn text<'a>(args: &'a ArgMatches, id: &str) -> &'a str {
    args.get_one::<String>(id).map_or("", String::as_str)
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("probecare=info,warn"))
        .context("invalid log filter")?;
    if matches.get_flag("log-json") {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    }
    let config = AppConfig::load(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))
        .context("configuration")?;
    let limit = Duration::from_secs(matches.get_one::<u64>("wait").copied().unwrap_or(10));
    let fallback = config.session.display_name_fallback.clone();

    let backend = Arc::new(RestBackend::new(config.backend.clone()).context("backend")?);
    tracing::debug!(url = %config.backend.url, "backend configured");

    let output = match matches.subcommand() {
        Some(("clients", args)) => match args.subcommand() {
            Some(("add", add)) => {
                commands::add_client(&backend, text(add, "name"), text(add, "phone")).await
            }
            _ => commands::list_clients(&backend).await,
        },
        Some(("upload", args)) => {
            let file = args
                .get_one::<PathBuf>("file")
                .context("--file is required")?;
            commands::upload(&backend, text(args, "kind"), file).await
        }
        Some((name, args)) => {
            let sync = SessionSynchronizer::start(backend.clone(), config.session.clone());
            let result = match name {
                "login" => {
                    commands::login(
                        &sync,
                        text(args, "email"),
                        text(args, "password"),
                        &fallback,
                        limit,
                    )
                    .await
                }
                "register" => {
                    let role = args
                        .get_one::<Role>("role")
                        .copied()
                        .context("--role is required")?;
                    let draft = ProfileDraft::new(
                        text(args, "name"),
                        text(args, "email"),
                        text(args, "password"),
                        role,
                    );
                    commands::register(&sync, draft, limit).await
                }
                "logout" => commands::logout(&sync, limit).await,
                "update-profile" => {
                    let mut update = ProfileUpdate::default();
                    if let Some(name) = args.get_one::<String>("name") {
                        update = update.with_name(name);
                    }
                    if let Some(email) = args.get_one::<String>("email") {
                        update = update.with_email(email);
                    }
                    if let Some(role) = args.get_one::<Role>("role") {
                        update = update.with_role(*role);
                    }
                    commands::update_profile(&sync, update, limit).await
                }
                _ => commands::whoami(&sync, &fallback, limit).await,
            };
            sync.dispose();
            result
        }
        None => Err(anyhow::anyhow!("no command given")),
    }?;

    println!("{output}");
    Ok(())
}
