//! Card Ledger command line
//!
//! ```text
//! card_ledger [--env dev] <command> [args...]
//!
//!   health
//!   init-schema
//!   add-account   <login> [--admin]
//!   create-card   <owner_id> <expiry YYYY-MM-DD> [initial_balance]
//!   activate      <card_id>
//!   block         <card_id>
//!   request-block <card_id> <login>
//!   delete        <card_id>
//!   balance       <card_id> <login>
//!   transfer      <from_card_id> <to_card_id> <amount> <login>
//!   list          [--owner <login>] [--status ACTIVE|BLOCKED|EXPIRED] [--page N] [--size N]
//!   search        <login> <last4>
//! ```
//!
//! Results are printed as JSON on stdout. Failures print `{code, message}`
//! and exit with status 1.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use serde_json::{Value, json};

use card_ledger::account::{AccountRole, PgAccountDirectory};
use card_ledger::config::AppConfig;
use card_ledger::db::Database;
use card_ledger::store::{PageRequest, PgCardStore, schema};
use card_ledger::{CardLedger, CardStatus, IdentifierGenerator, IdentifierVault, LedgerError};

// ============================================================
// ARGUMENTS
// ============================================================

/// Flags that take a value
const VALUE_FLAGS: &[&str] = &["--env", "-e", "--owner", "--status", "--page", "--size"];

struct Cli {
    env: String,
    command: String,
    positional: Vec<String>,
    flags: Vec<(String, Option<String>)>,
}

impl Cli {
    fn parse(args: &[String]) -> Result<Self> {
        let mut positional = Vec::new();
        let mut flags = Vec::new();
        let mut i = 0;
        while i < args.len() {
            let arg = &args[i];
            if arg.starts_with('-') {
                if VALUE_FLAGS.contains(&arg.as_str()) {
                    let value = args
                        .get(i + 1)
                        .ok_or_else(|| anyhow!("{} requires a value", arg))?;
                    flags.push((arg.clone(), Some(value.clone())));
                    i += 2;
                } else {
                    flags.push((arg.clone(), None));
                    i += 1;
                }
            } else {
                positional.push(arg.clone());
                i += 1;
            }
        }

        if positional.is_empty() {
            bail!("missing command, see the module docs for usage");
        }
        let command = positional.remove(0);

        let mut cli = Self {
            env: "dev".to_string(),
            command,
            positional,
            flags,
        };
        if let Some(env) = cli
            .flag("--env")
            .or_else(|| cli.flag("-e"))
            .map(str::to_string)
        {
            cli.env = env;
        }
        Ok(cli)
    }

    fn flag(&self, name: &str) -> Option<&str> {
        self.flags
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_deref())
    }

    fn has_flag(&self, name: &str) -> bool {
        self.flags.iter().any(|(n, _)| n == name)
    }

    fn arg(&self, index: usize, name: &str) -> Result<&str> {
        self.positional
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("missing argument <{}> for {}", name, self.command))
    }

    fn id_arg(&self, index: usize, name: &str) -> Result<i64> {
        let raw = self.arg(index, name)?;
        raw.parse()
            .with_context(|| format!("<{}> must be an integer, got {:?}", name, raw))
    }
}

// ============================================================
// COMMANDS
// ============================================================

struct App {
    ledger: CardLedger,
    accounts: Arc<PgAccountDirectory>,
    db: Database,
}

async fn build_app(config: &AppConfig) -> Result<App> {
    let url = config
        .postgres_url
        .as_deref()
        .context("postgres_url is not configured")?;
    let db = Database::connect(url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    let store = PgCardStore::new(
        db.pool().clone(),
        Duration::from_millis(config.ledger.lock_timeout_ms),
    );
    let accounts = Arc::new(PgAccountDirectory::new(db.pool().clone()));
    let vault = IdentifierVault::from_config(&config.vault).context("Invalid vault key")?;
    let generator = IdentifierGenerator::from_entropy(&config.card_number)
        .context("Invalid card number configuration")?;

    let ledger = CardLedger::new(
        Arc::new(store),
        accounts.clone(),
        Arc::new(vault),
        Arc::new(generator),
    );

    Ok(App {
        ledger,
        accounts,
        db,
    })
}

async fn run(cli: &Cli, app: &App) -> Result<Value> {
    let ledger = &app.ledger;

    let value = match cli.command.as_str() {
        "health" => {
            app.db
                .health_check()
                .await
                .context("PostgreSQL health check failed")?;
            json!({ "database": "ok" })
        }
        "init-schema" => {
            schema::init_schema(app.db.pool()).await?;
            json!({ "schema": "ok" })
        }
        "add-account" => {
            let login = cli.arg(0, "login")?;
            let role = if cli.has_flag("--admin") {
                AccountRole::Admin
            } else {
                AccountRole::User
            };
            let id = app.accounts.create(login, role).await?;
            json!({ "account_id": id, "login": login })
        }
        "create-card" => {
            let owner_id = cli.id_arg(0, "owner_id")?;
            let expiry = NaiveDate::parse_from_str(cli.arg(1, "expiry")?, "%Y-%m-%d")
                .context("<expiry> must be YYYY-MM-DD")?;
            let balance = match cli.positional.get(2) {
                Some(s) => Some(card_ledger::money::parse_amount(s).map_err(LedgerError::from)?),
                None => None,
            };
            serde_json::to_value(ledger.create_card(owner_id, expiry, balance).await?)?
        }
        "activate" => serde_json::to_value(ledger.activate(cli.id_arg(0, "card_id")?).await?)?,
        "block" => serde_json::to_value(ledger.block(cli.id_arg(0, "card_id")?).await?)?,
        "request-block" => {
            let card_id = cli.id_arg(0, "card_id")?;
            let owner = ledger.resolve_owner(cli.arg(1, "login")?).await?;
            serde_json::to_value(ledger.request_block(card_id, owner).await?)?
        }
        "delete" => {
            let card_id = cli.id_arg(0, "card_id")?;
            ledger.delete_card(card_id).await?;
            json!({ "deleted": card_id })
        }
        "balance" => {
            let card_id = cli.id_arg(0, "card_id")?;
            let owner = ledger.resolve_owner(cli.arg(1, "login")?).await?;
            let balance = ledger.get_balance(card_id, owner).await?;
            json!({ "card_id": card_id, "balance": balance })
        }
        "transfer" => {
            let from = cli.id_arg(0, "from_card_id")?;
            let to = cli.id_arg(1, "to_card_id")?;
            let amount =
                card_ledger::money::parse_amount(cli.arg(2, "amount")?).map_err(LedgerError::from)?;
            let owner = ledger.resolve_owner(cli.arg(3, "login")?).await?;
            serde_json::to_value(ledger.transfer(from, to, amount, owner).await?)?
        }
        "list" => {
            let status = cli
                .flag("--status")
                .map(|s| s.parse::<CardStatus>().map_err(|e| anyhow!(e)))
                .transpose()?;
            let page = PageRequest::new(
                cli.flag("--page").map(str::parse::<u32>).transpose()?.unwrap_or(0),
                cli.flag("--size")
                    .map(str::parse::<u32>)
                    .transpose()?
                    .unwrap_or(card_ledger::store::DEFAULT_PAGE_SIZE),
            );
            let cards = match cli.flag("--owner") {
                Some(login) => {
                    let owner = ledger.resolve_owner(login).await?;
                    ledger.list_by_owner(owner, status, page).await?
                }
                None => ledger.list_all(status, page).await?,
            };
            serde_json::to_value(cards)?
        }
        "search" => {
            let owner = ledger.resolve_owner(cli.arg(0, "login")?).await?;
            let digits = cli.arg(1, "last4")?;
            serde_json::to_value(ledger.search_by_last_digits(owner, digits).await?)?
        }
        other => bail!("unknown command: {}", other),
    };

    Ok(value)
}

// ============================================================
// MAIN
// ============================================================

fn error_body(e: &anyhow::Error) -> Value {
    match e.downcast_ref::<LedgerError>() {
        Some(ledger_err) => {
            if ledger_err.is_operational() {
                tracing::error!(code = ledger_err.code(), error = %ledger_err, "Ledger operation failed");
            }
            json!({ "code": ledger_err.code(), "message": ledger_err.client_message() })
        }
        None => json!({ "code": "ERROR", "message": format!("{:#}", e) }),
    }
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = match Cli::parse(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{}", error_body(&e));
            std::process::exit(2);
        }
    };

    let app_config = match AppConfig::load(&cli.env) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", error_body(&e));
            std::process::exit(2);
        }
    };
    let _log_guard = card_ledger::logging::init_logging(&app_config);

    tracing::info!(command = %cli.command, env = %cli.env, "Starting card ledger");

    let outcome = match build_app(&app_config).await {
        Ok(app) => run(&cli, &app).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(value) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
            );
        }
        Err(e) => {
            println!("{}", error_body(&e));
            std::process::exit(1);
        }
    }
}
