mod api;
mod app;
mod apply;
mod cli;
mod config;
mod db;
mod entities;
mod error;
mod model;
mod ourgroceries;
mod pending;
mod projector;
mod reorder;
mod service;
mod session;
mod state;
mod upstream;
mod util;

use std::sync::Arc;

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::api::SessionApi;
use crate::app::App;
use crate::apply::BatchApplyEngine;
use crate::cli::{
    Apply, CategoryCommand, Cli, Command, FilterCommand, ItemCommand, Login, StageCommand,
};
use crate::config::{Config, DEFAULT_LOG_FILTER, LOG_ENV, PASSWORD_ENV};
use crate::error::AppError;
use crate::model::{
    CreateCategoryInput, DeleteCategoryInput, RenameCategoryInput, RenameItemInput,
};
use crate::ourgroceries::OurGroceriesConnector;
use crate::pending::ToggleOutcome;
use crate::service::MasterService;
use crate::session::{short_id, SessionClientCache, SessionRecord, SESSION_MISSING_MESSAGE};
use crate::state::{LocalState, CURRENT_SESSION_KEY};
use crate::util::{
    format_datetime, format_filters, format_lists, format_master_view, format_notice,
    format_pending, format_steps,
};

type Service = MasterService<OurGroceriesConnector>;
type MasterApp = App<SessionApi<OurGroceriesConnector>>;

struct Context {
    state: LocalState,
    service: Arc<Service>,
    engine: BatchApplyEngine,
}

impl Context {
    async fn open_app(&self, session_id: &str) -> Result<MasterApp, AppError> {
        let api = SessionApi::new(Arc::clone(&self.service), session_id);
        App::load(api, self.state.clone(), self.engine.clone()).await
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn run() -> Result<(), AppError> {
    let Cli {
        home,
        session_id,
        command,
    } = Cli::parse();
    let config = Config::resolve(home)?;

    let db_path = db::resolve_db_path(&config.home);
    db::ensure_parent_dir(&db_path)?;
    let mut lock = db::open_lock(&db_path)?;
    let _guard = lock.write()?;

    let db = db::connect(&db_path).await?;
    db::ensure_schema(&db).await?;
    let state = LocalState::new(db);
    let purged = state.purge_expired_sessions().await?;
    if purged > 0 {
        debug!(purged, "removed expired sessions");
    }

    let connector = OurGroceriesConnector::new(&config.upstream_url, config.step_timeout)
        .map_err(|err| AppError::InvalidInput(format!("invalid upstream url: {err}")))?;
    let service = Arc::new(MasterService::new(SessionClientCache::new(
        connector,
        config.session_ttl,
    )));
    let context = Context {
        state,
        service,
        engine: BatchApplyEngine::new(config.step_timeout),
    };

    match command {
        Command::Login(args) => handle_login(&context, args).await,
        Command::Logout => handle_logout(&context, session_id).await,
        Command::Pending => handle_pending(&context).await,
        Command::Filter(command) => handle_filter(&context, command).await,
        command => {
            let record = restore_session(&context, session_id).await?;
            let result = handle_session_command(&context, &record.id, command).await;
            if let Some(refreshed) = context.service.sessions().session(&record.id) {
                context.state.save_session(&refreshed).await?;
            }
            result
        }
    }
}

async fn current_session_id(
    context: &Context,
    flag: Option<String>,
) -> Result<Option<String>, AppError> {
    if let Some(value) = flag {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(AppError::InvalidInput("--session-id is empty".to_string()));
        }
        return Ok(Some(trimmed.to_string()));
    }
    context.state.read_json::<String>(CURRENT_SESSION_KEY).await
}

async fn restore_session(
    context: &Context,
    flag: Option<String>,
) -> Result<SessionRecord, AppError> {
    let missing = || AppError::Auth(SESSION_MISSING_MESSAGE.to_string());
    let session_id = current_session_id(context, flag).await?.ok_or_else(missing)?;
    let record = context
        .state
        .load_session(&session_id)
        .await?
        .ok_or_else(missing)?;
    if !context.service.sessions().restore(record.clone()) {
        context.state.delete_session(&session_id).await?;
        return Err(missing());
    }
    debug!(session = short_id(&record.id), "session restored");
    Ok(record)
}

async fn handle_login(context: &Context, args: Login) -> Result<(), AppError> {
    let password = match args.password {
        Some(password) => password,
        None => std::env::var(PASSWORD_ENV).map_err(|_| {
            AppError::InvalidInput(format!("--password or {PASSWORD_ENV} is required"))
        })?,
    };
    let record = context.service.login(&args.email, &password).await?;
    context.state.save_session(&record).await?;
    context
        .state
        .write_json(CURRENT_SESSION_KEY, &record.id)
        .await?;
    info!(session = short_id(&record.id), "logged in");

    println!("Logged in as {}.", record.email);
    println!("Session ID: {}", record.id);
    println!("Expires: {}", format_datetime(record.expires_at));
    Ok(())
}

async fn handle_logout(context: &Context, flag: Option<String>) -> Result<(), AppError> {
    let current = context.state.read_json::<String>(CURRENT_SESSION_KEY).await?;
    let Some(session_id) = current_session_id(context, flag).await? else {
        println!("No active session.");
        return Ok(());
    };
    context.service.logout(&session_id);
    context.state.delete_session(&session_id).await?;
    if current.as_deref() == Some(session_id.as_str()) {
        context.state.remove(CURRENT_SESSION_KEY).await?;
    }
    println!("Logged out.");
    Ok(())
}

async fn handle_pending(context: &Context) -> Result<(), AppError> {
    let app = context.open_app("").await?;
    println!("{}", format_pending(&app.stored_pending().await?));
    Ok(())
}

/// Filters are local view state, so no session is needed to change them.
async fn handle_filter(context: &Context, command: FilterCommand) -> Result<(), AppError> {
    let mut app = context.open_app("").await?;
    match command {
        FilterCommand::Category(args) => app.toggle_category_filter(&args.id).await?,
        FilterCommand::Pending => app.toggle_pending_only().await?,
        FilterCommand::Clear => app.clear_filters().await?,
    }
    println!("{}", format_filters(app.filters()));
    print_notices(&mut app);
    Ok(())
}

async fn handle_session_command(
    context: &Context,
    session_id: &str,
    command: Command,
) -> Result<(), AppError> {
    match command {
        Command::Lists => {
            let overview = context.service.lists_overview(session_id).await?;
            println!("{}", format_lists(&overview.lists));
            println!(
                "Master list: {} ({} items)",
                overview.master_list.name, overview.master_list.item_count
            );
            Ok(())
        }
        Command::Show => {
            let mut app = context.open_app(session_id).await?;
            app.refresh().await?;
            print_master(&app);
            print_notices(&mut app);
            Ok(())
        }
        Command::Stage(command) => {
            let mut app = context.open_app(session_id).await?;
            app.refresh().await?;
            match command {
                StageCommand::Move(args) => {
                    let outcome = app.stage_move(&args.item_id, &args.category_id).await?;
                    print_toggle("Move", &args.item_id, outcome);
                }
                StageCommand::Delete(args) => {
                    let outcome = app.stage_delete(&args.item_id).await?;
                    print_toggle("Delete", &args.item_id, outcome);
                }
            }
            print_notices(&mut app);
            Ok(())
        }
        Command::Unstage(args) => {
            let mut app = context.open_app(session_id).await?;
            app.refresh().await?;
            for item_id in &args.item_ids {
                if app.unstage(item_id).await? {
                    println!("Unstaged item ID: {item_id}.");
                } else {
                    println!("Nothing staged for item ID: {item_id}.");
                }
            }
            print_notices(&mut app);
            Ok(())
        }
        Command::Apply(args) => handle_apply(context, session_id, args).await,
        Command::Item(ItemCommand::Rename(args)) => {
            let list = context
                .service
                .rename_item(
                    session_id,
                    RenameItemInput {
                        item_id: args.item_id.clone(),
                        new_name: args.name,
                    },
                )
                .await?;
            let mut app = context.open_app(session_id).await?;
            app.adopt(list).await?;
            println!("Renamed item ID: {}.", args.item_id);
            print_notices(&mut app);
            Ok(())
        }
        Command::Category(command) => handle_category(context, session_id, command).await,
        Command::Login(_) | Command::Logout | Command::Pending | Command::Filter(_) => {
            Err(AppError::InvalidInput(
                "command does not run against a session".to_string(),
            ))
        }
    }
}

async fn handle_apply(context: &Context, session_id: &str, args: Apply) -> Result<(), AppError> {
    let mut app = context.open_app(session_id).await?;
    app.refresh().await?;
    app.prepare_apply();

    for item_id in &args.skip {
        let keys: Vec<String> = app
            .progress()
            .steps
            .iter()
            .filter(|step| &step.item_id == item_id)
            .map(|step| step.key.clone())
            .collect();
        if keys.is_empty() {
            println!("No step for item ID: {item_id}.");
        }
        for key in keys {
            app.remove_step(&key).await?;
            println!("Skipped and unstaged {key}.");
        }
    }

    if !app.progress().open {
        print_notices(&mut app);
        return Ok(());
    }
    println!("{}", format_steps(&app.progress().steps));
    if !args.yes {
        println!();
        println!("Run again with --yes to apply these changes.");
        return Ok(());
    }

    let summary = app.commit_apply().await?;
    println!();
    if app.progress().open {
        println!("{}", format_steps(&app.progress().steps));
    }
    println!(
        "Applied {} of {} changes.",
        summary.succeeded,
        summary.succeeded + summary.failed
    );
    print_notices(&mut app);
    if summary.failed > 0 {
        let remaining = app.pending().len();
        return Err(AppError::Upstream(format!(
            "{} change(s) failed; {remaining} remain staged",
            summary.failed
        )));
    }
    Ok(())
}

async fn handle_category(
    context: &Context,
    session_id: &str,
    command: CategoryCommand,
) -> Result<(), AppError> {
    let service = &context.service;
    let (list, message) = match command {
        CategoryCommand::Reorder(args) => {
            let mut app = context.open_app(session_id).await?;
            app.refresh().await?;
            app.reorder_categories(&args.source_id, &args.target_id)
                .await?;
            if let Some(master) = app.master() {
                let ids: Vec<_> = master.sections.iter().map(|s| s.id.as_str()).collect();
                println!("Order: {}", ids.join(", "));
            }
            print_notices(&mut app);
            return Ok(());
        }
        CategoryCommand::Create(args) => {
            let list = service
                .create_category(session_id, CreateCategoryInput { name: args.name.clone() })
                .await?;
            (list, format!("Created category {}.", args.name.trim()))
        }
        CategoryCommand::Rename(args) => {
            let list = service
                .rename_category(
                    session_id,
                    RenameCategoryInput {
                        category_id: args.category_id.clone(),
                        new_name: args.name,
                    },
                )
                .await?;
            (list, format!("Renamed category ID: {}.", args.category_id))
        }
        CategoryCommand::Delete(args) => {
            let list = service
                .delete_category(
                    session_id,
                    DeleteCategoryInput {
                        category_id: args.category_id.clone(),
                    },
                )
                .await?;
            (list, format!("Deleted category ID: {}.", args.category_id))
        }
    };

    let mut app = context.open_app(session_id).await?;
    app.adopt(list).await?;
    println!("{message}");
    print_notices(&mut app);
    Ok(())
}

fn print_master(app: &MasterApp) {
    let Some(master) = app.master() else {
        return;
    };
    let sections = app.visible_sections();
    println!(
        "{}",
        format_master_view(master, &sections, app.pending(), app.filters())
    );
}

fn print_toggle(kind: &str, item_id: &str, outcome: ToggleOutcome) {
    match outcome {
        ToggleOutcome::Staged => println!("{kind} staged for item ID: {item_id}."),
        ToggleOutcome::Cleared => println!("{kind} cleared for item ID: {item_id}."),
        ToggleOutcome::AlreadyInCategory => {}
    }
}

fn print_notices(app: &mut MasterApp) {
    for notice in app.take_notices() {
        println!("{}", format_notice(&notice));
    }
}
