//! focusshield - focus sessions, ship notes and weekly fragmentation reports
//!
//! Records are kept in a local JSON document and, once signed in, pushed to
//! the configured remote store.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Data: $XDG_DATA_HOME/focusshield/ (~/.local/share/focusshield/)
//! - Logs: $XDG_STATE_HOME/focusshield/ (~/.local/state/focusshield/)
//! - Config: $XDG_CONFIG_HOME/focusshield/config.toml (~/.config/focusshield/config.toml)

mod countdown;
mod render;

use std::io::Read;

use anyhow::{bail, Context, Result};
use chrono::{Local, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use focusshield_core::auth::{track_login, APP_SLUG};
use focusshield_core::billing::{apply_subscription_event, SubscriptionEvent};
use focusshield_core::entitlement::is_week_locked;
use focusshield_core::remote::{RemoteStore, RestRemoteStore};
use focusshield_core::time::parse_datetime;
use focusshield_core::{
    AuthProvider, AuthSession, AuthUser, Config, FileStorage, HistoryFilter, LocalStore, Plan,
    Reconciler, SyncOutcome, Tracker,
};
use indicatif::{ProgressBar, ProgressStyle};

use crate::countdown::CountdownOutcome;

#[derive(Parser)]
#[command(name = "focusshield")]
#[command(about = "Timed focus sessions and weekly fragmentation reports")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a focus session
    Start(StartArgs),
    /// Attach a ship note to a session
    Note {
        /// Note text (at least 10 characters)
        text: String,
        /// Session id; defaults to the most recent session
        #[arg(long)]
        session: Option<String>,
        /// What got in the way
        #[arg(long)]
        blocked: Option<String>,
    },
    /// Record or remove meeting blocks
    #[command(subcommand)]
    Meeting(MeetingCommand),
    /// Show past sessions
    History {
        #[arg(long, value_enum, default_value = "all")]
        filter: FilterArg,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Show weekly fragmentation reports
    Report {
        /// Only this week (0 is the current week)
        #[arg(long)]
        week: Option<u32>,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Push unsynced records to your account
    Sync,
    /// Show account, plan and sync status
    Status,
    /// Sign in as a user from the identity provider
    Login {
        #[arg(long)]
        id: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Sign out
    Logout,
    /// Apply a payment-provider webhook event (path or `-` for stdin)
    Webhook { input: String },
    /// Delete all local records
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args)]
struct StartArgs {
    /// What you are working on
    title: String,
    /// Session length in minutes (defaults to the pomodoro preset)
    #[arg(short, long, conflicts_with_all = ["long", "seconds"])]
    minutes: Option<u32>,
    /// Use the long preset
    #[arg(long, conflicts_with = "seconds")]
    long: bool,
    /// Session length in seconds
    #[arg(long)]
    seconds: Option<u64>,
    /// Link to what the session produced
    #[arg(long)]
    artifact: Option<String>,
    /// Ship note to save when the session ends
    #[arg(long)]
    note: Option<String>,
    /// Blocked reason saved with the note
    #[arg(long, requires = "note")]
    blocked: Option<String>,
}

#[derive(Subcommand)]
enum MeetingCommand {
    /// Add a meeting block (times as `YYYY-MM-DD HH:MM` local, or RFC 3339)
    Add {
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        #[arg(long)]
        title: Option<String>,
    },
    /// Remove a meeting block by id
    Remove { id: String },
    /// List meeting blocks
    List,
}

#[derive(Clone, Copy, ValueEnum)]
enum FilterArg {
    All,
    Completed,
    Interrupted,
}

impl From<FilterArg> for HistoryFilter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::All => HistoryFilter::All,
            FilterArg::Completed => HistoryFilter::Completed,
            FilterArg::Interrupted => HistoryFilter::Interrupted,
        }
    }
}

/// Everything a command needs.
struct App {
    config: Config,
    store: LocalStore,
    auth: AuthSession,
    remote: Option<RestRemoteStore>,
}

impl App {
    fn open(config: Config) -> Result<Self> {
        let remote =
            RestRemoteStore::new(&config.remote).context("failed to configure remote store")?;
        Ok(Self {
            store: LocalStore::new(FileStorage::new(Config::data_dir())),
            auth: AuthSession::open_default(),
            remote,
            config,
        })
    }

    fn remote(&self) -> Option<&dyn RemoteStore> {
        self.remote.as_ref().map(|r| r as &dyn RemoteStore)
    }

    fn plan(&self, user: Option<&AuthUser>) -> Plan {
        Reconciler::new(&self.store)
            .with_remote(self.remote())
            .with_user(user)
            .plan(&self.config.billing)
    }

    /// Push after a local write. Failures leave records unsynced and are reported.
    fn sync_quietly(&self, user: Option<&AuthUser>) {
        let reconciler = Reconciler::new(&self.store)
            .with_remote(self.remote())
            .with_user(user);
        if let Err(e) = reconciler.push_sync() {
            tracing::warn!(error = %e, "Background push-sync failed");
            eprintln!("Saved locally; sync failed: {e}");
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        focusshield_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("focusshield starting");

    let app = App::open(config)?;
    let user = app.auth.current_user();

    match cli.command {
        Command::Start(args) => cmd_start(&app, user.as_ref(), args),
        Command::Note {
            text,
            session,
            blocked,
        } => cmd_note(&app, user.as_ref(), &text, session, blocked.as_deref()),
        Command::Meeting(command) => cmd_meeting(&app, user.as_ref(), command),
        Command::History { filter, json } => cmd_history(&app, user.as_ref(), filter, json),
        Command::Report { week, json } => cmd_report(&app, user.as_ref(), week, json),
        Command::Sync => cmd_sync(&app, user.as_ref()),
        Command::Status => cmd_status(&app, user.as_ref()),
        Command::Login { id, email, name } => cmd_login(
            &app,
            AuthUser {
                id,
                email,
                name,
                avatar_url: None,
            },
        ),
        Command::Logout => {
            if app.auth.sign_out().context("failed to sign out")? {
                println!("Signed out. Local records stay on this device.");
            } else {
                println!("Not signed in.");
            }
            Ok(())
        }
        Command::Webhook { input } => cmd_webhook(&app, &input),
        Command::Clear { yes } => {
            if !yes {
                bail!("refusing to delete local records without --yes");
            }
            app.store.clear();
            println!("Local records deleted.");
            Ok(())
        }
    }
}

fn cmd_start(app: &App, user: Option<&AuthUser>, args: StartArgs) -> Result<()> {
    let timer = &app.config.timer;
    let duration_sec = match (args.seconds, args.minutes, args.long) {
        (Some(seconds), _, _) => seconds,
        (None, Some(minutes), _) => u64::from(minutes) * 60,
        (None, None, true) => u64::from(timer.long_minutes) * 60,
        (None, None, false) => u64::from(timer.pomodoro_minutes) * 60,
    };
    if duration_sec == 0 {
        bail!("session length must be greater than zero");
    }

    let tracker = Tracker::new(&app.store);
    let session = tracker
        .start_session(&args.title, duration_sec, args.artifact.as_deref(), Utc::now())
        .context("failed to start session")?;

    let (outcome, finished) = countdown::finish_after(&tracker, &session.id, || {
        countdown::run(&session.task_title, duration_sec)
    })?;

    if outcome == CountdownOutcome::Interrupted {
        println!("Session stopped after {}.", render::duration(finished.duration_sec));
    } else {
        println!("Session complete: {}", finished.task_title);
    }

    if let Some(note) = args.note {
        match tracker.save_ship_note(&session.id, &note, args.blocked.as_deref(), Utc::now()) {
            Ok(_) => println!("Ship note saved."),
            Err(e) => eprintln!("Ship note not saved: {e}"),
        }
    } else {
        println!("Add a ship note: focusshield note \"<what shipped>\"");
    }

    finish_write(app, user, &tracker);
    Ok(())
}

fn cmd_note(
    app: &App,
    user: Option<&AuthUser>,
    text: &str,
    session: Option<String>,
    blocked: Option<&str>,
) -> Result<()> {
    let session_id = match session {
        Some(id) => id,
        None => {
            let mut sessions = app.store.load().sessions;
            sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            match sessions.into_iter().next() {
                Some(latest) => latest.id,
                None => bail!("no sessions yet; run `focusshield start` first"),
            }
        }
    };

    let tracker = Tracker::new(&app.store);
    let note = tracker.save_ship_note(&session_id, text, blocked, Utc::now())?;
    println!("Ship note saved for session {}.", note.session_id);

    finish_write(app, user, &tracker);
    Ok(())
}

/// Push for signed-in users, nudge anonymous ones.
fn finish_write(app: &App, user: Option<&AuthUser>, tracker: &Tracker<'_, FileStorage>) {
    if user.is_some() {
        app.sync_quietly(user);
    } else if tracker.should_suggest_sign_in() {
        println!("Sign in to keep your sessions across devices: focusshield login --id <id> --email <email>");
    }
}

fn cmd_meeting(app: &App, user: Option<&AuthUser>, command: MeetingCommand) -> Result<()> {
    let tracker = Tracker::new(&app.store);
    match command {
        MeetingCommand::Add { start, end, title } => {
            let start_at = parse_datetime(&Local, &start)
                .with_context(|| format!("could not parse start time '{start}'"))?;
            let end_at = parse_datetime(&Local, &end)
                .with_context(|| format!("could not parse end time '{end}'"))?;
            let block = tracker.add_meeting(start_at, end_at, title.as_deref(), Utc::now())?;
            println!("Meeting added ({:.1}h): {}", block.hours(), block.id);
            finish_write(app, user, &tracker);
        }
        MeetingCommand::Remove { id } => {
            if !tracker.remove_meeting(&id) {
                bail!("no meeting block with id {id}");
            }
            println!("Meeting removed.");
        }
        MeetingCommand::List => {
            let merged = Reconciler::new(&app.store)
                .with_remote(app.remote())
                .with_user(user)
                .merged();
            render::meetings(&merged.meeting_blocks);
        }
    }
    Ok(())
}

fn cmd_history(app: &App, user: Option<&AuthUser>, filter: FilterArg, json: bool) -> Result<()> {
    let history = Reconciler::new(&app.store)
        .with_remote(app.remote())
        .with_user(user)
        .history(filter.into());

    if json {
        println!("{}", serde_json::to_string_pretty(&render::history_json(&history))?);
    } else {
        render::history(&history);
    }
    Ok(())
}

fn cmd_report(app: &App, user: Option<&AuthUser>, week: Option<u32>, json: bool) -> Result<()> {
    let now = Local::now();
    let weeks = match week {
        Some(offset) => offset + 1,
        None => app.config.report.weeks,
    };
    let reports = Reconciler::new(&app.store)
        .with_remote(app.remote())
        .with_user(user)
        .weekly_reports(&now, weeks);

    let plan = app.plan(user);
    let free_weeks = app.config.billing.free_tier_weeks;
    let entries: Vec<render::ReportEntry<'_>> = reports
        .iter()
        .filter(|r| week.map_or(true, |w| r.week_offset == w))
        .map(|report| {
            if is_week_locked(plan.is_pro(), report.week_offset, free_weeks) {
                render::ReportEntry::locked(report.week_offset)
            } else {
                render::ReportEntry::Unlocked(report)
            }
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        render::reports(&entries, plan);
    }
    Ok(())
}

fn cmd_sync(app: &App, user: Option<&AuthUser>) -> Result<()> {
    if user.is_none() {
        bail!("not signed in; run `focusshield login` first");
    }
    if app.remote.is_none() {
        bail!("no remote store configured (set remote.url and remote.anon_key)");
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .context("invalid spinner template")?,
    );
    spinner.set_message("Syncing...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));

    let result = Reconciler::new(&app.store)
        .with_remote(app.remote())
        .with_user(user)
        .push_sync();
    spinner.finish_and_clear();

    match result.context("sync failed")? {
        SyncOutcome::Skipped => println!("Nothing to sync."),
        outcome @ SyncOutcome::Pushed { .. } => {
            println!("Synced {} record(s).", outcome.pushed_count());
        }
    }
    Ok(())
}

fn cmd_status(app: &App, user: Option<&AuthUser>) -> Result<()> {
    let doc = app.store.load();
    match user {
        Some(user) => println!("Signed in:  {} ({})", user.email, user.id),
        None => println!("Signed in:  no"),
    }
    println!("Plan:       {}", app.plan(user));
    println!(
        "Remote:     {}",
        if app.remote.is_some() { "configured" } else { "not configured" }
    );
    println!(
        "Local:      {} session(s), {} note(s), {} meeting(s)",
        doc.sessions.len(),
        doc.ship_notes.len(),
        doc.meeting_blocks.len()
    );
    println!("Unsynced:   {}", doc.unsynced_count());
    println!(
        "Data file:  {}",
        app.store
            .backend()
            .path_for(focusshield_core::store::LOCAL_STORAGE_KEY)
            .display()
    );
    Ok(())
}

fn cmd_login(app: &App, user: AuthUser) -> Result<()> {
    let is_new = app
        .auth
        .sign_in(&user, Utc::now())
        .context("failed to sign in")?;
    println!("Signed in as {}.", user.email);

    if let Some(remote) = app.remote() {
        if is_new {
            track_login(remote, &user, APP_SLUG, Utc::now());
        }
        if app.store.has_unsynced() {
            app.sync_quietly(Some(&user));
        }
    }
    Ok(())
}

fn cmd_webhook(app: &App, input: &str) -> Result<()> {
    let body = if input == "-" {
        let mut body = String::new();
        std::io::stdin()
            .read_to_string(&mut body)
            .context("failed to read event from stdin")?;
        body
    } else {
        std::fs::read_to_string(input).with_context(|| format!("failed to read {input}"))?
    };

    let event = SubscriptionEvent::parse(&body).context("invalid webhook event")?;
    let Some(remote) = app.remote() else {
        bail!("no remote store configured (set remote.url and remote.anon_key)");
    };

    if apply_subscription_event(remote, &event, Utc::now())? {
        println!("Subscription updated.");
    } else {
        println!("Event ignored.");
    }
    Ok(())
}
