//! vbank - Virtual Bank command line client
//!
//! ```text
//! ┌──────────┐    ┌──────────────┐    ┌──────────────┐    ┌──────────┐
//! │   CLI    │───▶│ Forms / FSM  │───▶│   BankApi    │───▶│ REST API │
//! │  (clap)  │    │ (validation) │    │ (reqwest)    │    │ /v1/...  │
//! └──────────┘    └──────────────┘    └──────────────┘    └──────────┘
//!                        │                   ▲
//!                        └──── session ──────┘ (bearer token, JSON file)
//! ```
//!
//! `--offline` swaps the HTTP client for the in-memory demo bank.

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use virtual_bank_client::api::{BankApi, BankClient};
use virtual_bank_client::cancel::{AbortHandle, AbortSignal};
use virtual_bank_client::config::{AppConfig, ConfigError};
use virtual_bank_client::core_types::{AccountType, Role};
use virtual_bank_client::form::{LoginField, LoginForm, RegisterField, RegisterForm, UserField, UserForm};
use virtual_bank_client::logging::init_logging;
use virtual_bank_client::models::{AccountOwnerRef, AddFavoriteRequest, CreateAccountRequest};
use virtual_bank_client::money::{format_amount, parse_amount, validate_currency};
use virtual_bank_client::mutations::{MutationResult, Mutations, RecordingNotifier, Notice};
use virtual_bank_client::navigation::{self, Guard};
use virtual_bank_client::resources::{
    Details, Favorites, History, MostActive, MyAccounts, Resource, Users,
};
use virtual_bank_client::session::{FileStorage, SessionContext};
use virtual_bank_client::submission::{
    CodeForm, DepositFields, FormSnapshot, ReversalFields, SubmitOutcome, TransferFields,
    deposit_form, receipt_lines, reversal_form, transfer_form,
};
use virtual_bank_client::validation::Dpi;

#[derive(Parser)]
#[command(name = "vbank")]
#[command(about = "Virtual Bank client - accounts, transfers and administration")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config environment, read from config/<env>.yaml
    #[arg(short, long, default_value = "dev")]
    env: String,

    /// Explicit config file (overrides --env)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API base URL
    #[arg(long, env = "VBANK_API_URL")]
    api_url: Option<String>,

    /// Use the in-memory demo bank instead of the REST API
    #[arg(long)]
    offline: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with a username, email or DPI
    Login {
        identifier: String,
        #[arg(short, long)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the stored session
    Whoami,
    /// Register a new client
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        surname: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        dpi: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        income: String,
        #[arg(long)]
        direction: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        password_confirm: String,
    },
    /// Verify an email with the 6-digit code
    Verify { code: String },
    /// List my accounts
    Accounts,
    /// Open an account for a user (admin)
    CreateAccount {
        /// Owner username
        #[arg(long, conflicts_with = "dpi", required_unless_present = "dpi")]
        username: Option<String>,
        /// Owner DPI
        #[arg(long)]
        dpi: Option<String>,
        #[arg(long, default_value = "0")]
        amount: String,
        #[arg(long, default_value = "GTQ")]
        currency: String,
        /// savings or monetary
        #[arg(long = "type", default_value = "savings")]
        account_type: String,
    },
    /// Delete an account by id
    DeleteAccount { id: String },
    /// Transfer between accounts
    Transfer {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: String,
    },
    /// Deposit into an account
    Deposit {
        #[arg(long)]
        account: String,
        #[arg(long)]
        amount: String,
    },
    /// Movements of one of my accounts
    History { account: String },
    /// List favorite accounts
    Favorites,
    /// Bookmark an account
    AddFavorite {
        /// My account number
        #[arg(long)]
        account: String,
        /// Id of the account to bookmark
        #[arg(long)]
        favorite_id: String,
    },
    /// List users (staff)
    Users,
    /// Create a user (staff)
    CreateUser {
        #[command(flatten)]
        user: UserArgs,
        #[arg(long)]
        dpi: String,
        #[arg(long)]
        password: String,
    },
    /// Update a user by DPI (staff)
    UpdateUser {
        dpi: String,
        #[command(flatten)]
        user: UserArgs,
        /// New password; omitted keeps the current one
        #[arg(long)]
        password: Option<String>,
    },
    /// Delete a user by DPI (staff)
    DeleteUser { dpi: String },
    /// Most active accounts report (staff)
    MostActive,
    /// Account details (staff)
    AccountDetails { id: String },
    /// Reverse a recent deposit (staff)
    ReverseDeposit { transaction_id: String },
    /// Show the menu for the session role, or resolve a route
    Menu {
        #[arg(long)]
        path: Option<String>,
    },
}

#[derive(clap::Args)]
struct UserArgs {
    #[arg(long)]
    username: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    surname: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    phone: String,
    #[arg(long)]
    direction: String,
    #[arg(long)]
    work_name: String,
    #[arg(long)]
    income: String,
    /// ADMIN_ROLE, SUPERVISOR_ROLE or CLIENT_ROLE
    #[arg(long, default_value = "CLIENT_ROLE")]
    role: String,
}

struct App {
    config: AppConfig,
    api: Arc<dyn BankApi>,
    session: SessionContext,
    mutations: Mutations,
    notices: Arc<RecordingNotifier>,
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let loaded = match &cli.config {
        Some(path) => AppConfig::load_from(&path.to_string_lossy()),
        None => AppConfig::load(&cli.env),
    };
    let config = match loaded {
        Ok(config) => config,
        // A missing dev file is fine, defaults apply
        Err(ConfigError::Read { .. }) if cli.config.is_none() && cli.env == "dev" => AppConfig::default(),
        Err(e) => return Err(e.into()),
    };
    Ok(config.with_base_url(cli.api_url.clone()))
}

fn build_api(cli: &Cli, config: &AppConfig, session: &SessionContext) -> Result<Arc<dyn BankApi>> {
    if cli.offline {
        #[cfg(feature = "mock-api")]
        return Ok(Arc::new(virtual_bank_client::api::mock::MockBankApi::demo(
            session.clone(),
        )));
        #[cfg(not(feature = "mock-api"))]
        bail!("--offline needs the mock-api feature");
    }
    let client = BankClient::new(&config.api.client_config(), session.clone())
        .context("Invalid API configuration")?;
    Ok(Arc::new(client))
}

impl App {
    fn new(cli: &Cli) -> Result<Self> {
        let config = load_config(cli)?;
        let mut session_path = config.session.path();
        if cli.offline {
            session_path.set_extension("offline.json");
        }
        let session = SessionContext::new(Arc::new(FileStorage::new(session_path)));
        session.init();

        let api = build_api(cli, &config, &session)?;
        let notices = Arc::new(RecordingNotifier::new());
        let mutations = Mutations::new(api.clone(), session.clone(), notices.clone());
        Ok(Self {
            config,
            api,
            session,
            mutations,
            notices,
        })
    }

    fn print_notices(&self) {
        for notice in self.notices.take() {
            match notice {
                Notice::Success(message) => println!("✔ {}", message),
                Notice::Error(message) => eprintln!("✘ {}", message),
            }
        }
    }

    /// Print notices and turn a failed mutation into an error exit.
    fn finish<T>(&self, result: MutationResult<T>) -> Result<T> {
        self.print_notices();
        match result {
            MutationResult {
                success: true,
                data: Some(data),
                ..
            } => Ok(data),
            MutationResult { message, .. } => {
                bail!(message.unwrap_or_else(|| "Operación fallida".to_string()))
            }
        }
    }
}

/// Abort handle fired by Ctrl-C.
fn ctrl_c_abort() -> AbortSignal {
    let handle = Arc::new(AbortHandle::new());
    let signal = handle.signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, abandoning request");
            handle.abort();
        }
    });
    signal
}

/// Report a form submission. Field errors print one per line.
fn report<F, R>(outcome: SubmitOutcome<R>, snapshot: FormSnapshot<F, R>) -> Result<Option<R>> {
    let banner = snapshot.banner.as_ref().map(|b| b.message().to_string());
    match outcome {
        SubmitOutcome::Succeeded(receipt) => {
            if let Some(banner) = banner {
                println!("✔ {}", banner);
            }
            Ok(Some(receipt))
        }
        SubmitOutcome::Rejected(errors) => {
            for (field, message) in &errors {
                eprintln!("  {}: {}", field, message);
            }
            bail!(banner.unwrap_or_default())
        }
        SubmitOutcome::Failed(e) => bail!(banner.unwrap_or(e.message)),
        SubmitOutcome::Cancelled => bail!("Operación cancelada"),
        SubmitOutcome::Busy => bail!("Ya hay una operación en curso"),
    }
}

fn require_session(app: &App) -> Result<()> {
    if app.session.is_logged() {
        Ok(())
    } else {
        bail!("No hay sesión activa. Usa `vbank login`.")
    }
}

fn parse_role(role: &str) -> Result<Role> {
    role.parse::<Role>().map_err(|e| anyhow!(e))
}

fn fill_user_form(form: &mut UserForm, user: &UserArgs) -> Result<()> {
    let values = [
        (UserField::Username, &user.username),
        (UserField::Name, &user.name),
        (UserField::Surname, &user.surname),
        (UserField::Email, &user.email),
        (UserField::Phone, &user.phone),
        (UserField::Direction, &user.direction),
        (UserField::WorkName, &user.work_name),
        (UserField::Income, &user.income),
    ];
    for (field, value) in values {
        form.change(field, value);
    }
    let role = parse_role(&user.role)?;
    if !form.set_role(role) {
        warn!("Administrator role cannot be changed, ignoring --role");
    }
    Ok(())
}

fn print_field_errors(errors: &virtual_bank_client::api::FieldErrors) -> anyhow::Error {
    for (field, message) in errors {
        eprintln!("  {}: {}", field, message);
    }
    anyhow!(virtual_bank_client::submission::VALIDATION_SUMMARY)
}

async fn run(cli: Cli) -> Result<()> {
    let app = App::new(&cli)?;

    match cli.command {
        Commands::Login {
            identifier,
            password,
        } => {
            let mut form = LoginForm::new();
            form.change(LoginField::Identifier, &identifier);
            form.change(LoginField::Password, &password);
            let ok = form.blur(LoginField::Identifier) & form.blur(LoginField::Password);
            if !ok {
                for field in [LoginField::Identifier, LoginField::Password] {
                    if let Some(message) = form.error(field) {
                        eprintln!("  {}", message);
                    }
                }
                bail!(virtual_bank_client::submission::VALIDATION_SUMMARY);
            }
            let (identifier, password) = form.credentials();
            let session = app.finish(app.mutations.login(identifier, password).await)?;
            println!(
                "Sesión iniciada como {} ({})",
                session.username().unwrap_or(identifier),
                session.role.map_or("-", |r| r.as_str())
            );
        }
        Commands::Logout => {
            app.finish(app.mutations.logout())?;
            println!("Sesión cerrada. Ir a {}", navigation::LOGIN_ROUTE);
        }
        Commands::Whoami => match app.session.current() {
            Some(session) => {
                println!("usuario: {}", session.username().unwrap_or("-"));
                println!("correo:  {}", session.email().unwrap_or("-"));
                println!("rol:     {}", session.role.map_or("-", |r| r.as_str()));
            }
            None => println!("Sin sesión"),
        },
        Commands::Register {
            name,
            surname,
            username,
            dpi,
            email,
            income,
            direction,
            phone,
            password,
            password_confirm,
        } => {
            let mut form = RegisterForm::new();
            let values = [
                (RegisterField::Name, name),
                (RegisterField::Surname, surname),
                (RegisterField::Username, username),
                (RegisterField::Dpi, dpi),
                (RegisterField::Email, email),
                (RegisterField::Income, income),
                (RegisterField::Direction, direction),
                (RegisterField::Phone, phone),
                (RegisterField::Password, password),
                (RegisterField::PasswordConfirm, password_confirm),
            ];
            for (field, value) in &values {
                form.change(*field, value);
            }
            if !form.blur_all() {
                for field in RegisterField::ALL {
                    if let Some(message) = form.error(field) {
                        eprintln!("  {:?}: {}", field, message);
                    }
                }
                bail!(virtual_bank_client::submission::VALIDATION_SUMMARY);
            }
            app.finish(app.mutations.register(&form.request()).await)?;
            println!("Revisa tu correo y usa `vbank verify <código>`.");
        }
        Commands::Verify { code } => {
            let form = CodeForm::new(app.api.clone(), app.config.verification.redirect_delay());
            let abort = ctrl_c_abort();
            let outcome = form
                .enter_code(code.trim(), &abort)
                .await
                .ok_or_else(|| anyhow!("El código debe tener 6 dígitos"))?;
            report(outcome, form.machine().snapshot())?;
            if let Some(route) = form.redirect(&abort).await {
                println!("Redirigiendo a {}", route);
            }
        }
        Commands::Accounts => {
            require_session(&app)?;
            let accounts = Resource::new(MyAccounts, app.api.clone()).refetch().await?;
            if accounts.is_empty() {
                println!("No tienes cuentas.");
            }
            for account in accounts {
                println!(
                    "{:<12} {:<18} {:>16}  {}{}",
                    account.no_account,
                    account.account_type.label(),
                    format_amount(account.amount, &account.currency),
                    account.id,
                    if account.is_favorite() { "  ★" } else { "" }
                );
            }
        }
        Commands::CreateAccount {
            username,
            dpi,
            amount,
            currency,
            account_type,
        } => {
            require_session(&app)?;
            let owner = match (username, dpi) {
                (_, Some(dpi)) => AccountOwnerRef::Dpi(Dpi::new(&dpi)?.into_string()),
                (Some(username), None) => AccountOwnerRef::Username(username),
                (None, None) => bail!("Indica --username o --dpi"),
            };
            let amount = match amount.trim() {
                "0" | "" => Decimal::ZERO,
                other => parse_amount(other)?,
            };
            let currency = validate_currency(&currency)?;
            let account_type: AccountType = account_type.parse().map_err(|e: String| anyhow!(e))?;
            let request = CreateAccountRequest::new(owner, amount, currency, account_type);
            let created = app.finish(app.mutations.create_account(&request).await)?;
            println!(
                "{} Cuenta {} ({})",
                created.message.as_deref().unwrap_or("Cuenta creada"),
                created.account.no_account,
                format_amount(created.account.amount, &created.account.currency)
            );
        }
        Commands::DeleteAccount { id } => {
            require_session(&app)?;
            app.finish(app.mutations.delete_account(id.trim()).await)?;
        }
        Commands::Transfer { from, to, amount } => {
            require_session(&app)?;
            let accounts = Resource::new(MyAccounts, app.api.clone());
            if let Err(e) = accounts.refetch().await {
                warn!(error = %e, "Balances unavailable, server will check funds");
            }
            let form = transfer_form(app.api.clone(), accounts);
            form.set_fields(TransferFields {
                from_account: from,
                to_account: to,
                amount,
            });
            let outcome = form.submit(&ctrl_c_abort()).await;
            if let Some(receipt) = report(outcome, form.snapshot())? {
                for line in receipt_lines(&receipt) {
                    println!("  {}", line);
                }
            }
        }
        Commands::Deposit { account, amount } => {
            require_session(&app)?;
            let form = deposit_form(app.api.clone(), None);
            form.set_fields(DepositFields { account, amount });
            let outcome = form.submit(&ctrl_c_abort()).await;
            report(outcome, form.snapshot())?;
        }
        Commands::History { account } => {
            require_session(&app)?;
            let history = Resource::new(History, app.api.clone());
            let movements = history.load(Some(&account)).await?;
            if movements.is_empty() {
                println!("Sin movimientos.");
            }
            for tx in movements {
                let sign = if tx.is_credit_for(&account) { "+" } else { "-" };
                println!(
                    "{}  {:<10} {}{:>14}  {} → {}",
                    tx.created_at
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "-".into()),
                    tx.tx_type,
                    sign,
                    format_amount(tx.amount, &tx.currency),
                    tx.from_account.as_deref().unwrap_or("-"),
                    tx.to_account.as_deref().unwrap_or("-"),
                );
            }
        }
        Commands::Favorites => {
            require_session(&app)?;
            let favorites = Resource::new(Favorites, app.api.clone()).refetch().await?;
            for account in favorites {
                println!("{:<12} {}  {}", account.no_account, account.currency, account.id);
            }
        }
        Commands::AddFavorite {
            account,
            favorite_id,
        } => {
            require_session(&app)?;
            let request = AddFavoriteRequest {
                my_account_no: account,
                favorite_account_id: favorite_id,
            };
            app.finish(app.mutations.add_favorite(&request).await)?;
        }
        Commands::Users => {
            require_session(&app)?;
            let page = Resource::new(Users, app.api.clone()).refetch().await?;
            println!("{} usuarios", page.total);
            for user in page.users {
                println!(
                    "{}  {:<20} {:<16} {}{}",
                    user.dpi,
                    user.username,
                    user.role,
                    user.email,
                    if user.status { "" } else { "  (inactivo)" }
                );
            }
        }
        Commands::CreateUser {
            user,
            dpi,
            password,
        } => {
            require_session(&app)?;
            let mut form = UserForm::create();
            fill_user_form(&mut form, &user)?;
            form.change(UserField::Dpi, &dpi);
            form.change(UserField::Password, &password);
            let payload = form.payload().map_err(|e| print_field_errors(&e))?;
            let ack = app.finish(app.mutations.create_user(&payload).await)?;
            println!("{}", ack.message_or("Usuario creado"));
        }
        Commands::UpdateUser {
            dpi,
            user,
            password,
        } => {
            require_session(&app)?;
            let dpi = Dpi::new(&dpi)?;
            let page = Resource::new(Users, app.api.clone()).refetch().await?;
            let existing = page
                .users
                .iter()
                .find(|u| u.dpi == dpi.as_str())
                .ok_or_else(|| anyhow!("Usuario no encontrado"))?;
            let mut form = UserForm::edit(existing);
            fill_user_form(&mut form, &user)?;
            if let Some(password) = password {
                form.change(UserField::Password, &password);
            }
            let payload = form.payload().map_err(|e| print_field_errors(&e))?;
            let ack = app.finish(app.mutations.update_user(&dpi, &payload).await)?;
            println!("{}", ack.message_or("Usuario actualizado"));
        }
        Commands::DeleteUser { dpi } => {
            require_session(&app)?;
            let dpi = Dpi::new(&dpi)?;
            let ack = app.finish(app.mutations.delete_user(&dpi).await)?;
            println!("{}", ack.message_or("Usuario eliminado"));
        }
        Commands::MostActive => {
            require_session(&app)?;
            let rows = Resource::new(MostActive, app.api.clone()).refetch().await?;
            for row in rows {
                println!(
                    "{:<12} {:<24} mov {:>16}  saldo {:>16}",
                    row.no_account,
                    row.owner_name,
                    format_amount(row.total_movement, &row.currency),
                    format_amount(row.current_balance, &row.currency),
                );
            }
        }
        Commands::AccountDetails { id } => {
            require_session(&app)?;
            let details = Resource::new(Details, app.api.clone())
                .load(Some(&id))
                .await?
                .ok_or_else(|| anyhow!("Cuenta no encontrada"))?;
            println!("cuenta:   {}", details.no_account);
            if let Some(owner) = &details.user {
                println!("titular:  {} ({})", owner.name, owner.username);
            }
            println!("tipo:     {}", details.account_type.label());
            println!("saldo:    {}", format_amount(details.amount, &details.currency));
            println!("estado:   {}", if details.status { "activa" } else { "inactiva" });
            for tx in &details.last_movements {
                println!("  {} {} {}", tx.id, tx.tx_type, format_amount(tx.amount, &tx.currency));
            }
        }
        Commands::ReverseDeposit { transaction_id } => {
            require_session(&app)?;
            let form = reversal_form(app.api.clone());
            form.set_fields(ReversalFields { transaction_id });
            let outcome = form.submit(&ctrl_c_abort()).await;
            report(outcome, form.snapshot())?;
        }
        Commands::Menu { path } => {
            let session = app.session.current();
            let role = session.as_ref().and_then(|s| s.role);
            let active = path.as_deref().and_then(navigation::active_section);
            for item in navigation::visible_menu(role) {
                let marker = if Some(item.section) == active { "▶" } else { " " };
                println!("{} {:<16} {}", marker, item.label, item.section.path());
            }
            if let Some(path) = path {
                match navigation::guard(session.as_ref(), &path) {
                    Guard::Allow(page) => println!("{} → {:?}", path, page),
                    Guard::Redirect(to) => println!("{} → redirige a {}", path, to),
                    Guard::NotFound => println!("{} → no existe", path),
                }
            }
        }
    }

    info!(api = app.api.name(), "Done");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging needs the config; a broken config still reports on stderr
    let log_config = load_config(&cli).unwrap_or_default();
    let _log_guard = init_logging(&log_config);
    info!(env = %cli.env, offline = cli.offline, "vbank starting");

    run(cli).await
}
