#![allow(clippy::print_stdout)]

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};
use uuid::Uuid;

use zesty_ops::app::{self, NoticeLevel};
use zesty_ops::config::AppConfig;
use zesty_ops::incidents::{facility_map, history, IncidentDetail, ResolveControl};
use zesty_ops::live::{Snapshot, SyncState};
use zesty_ops::logging::init_logging;
use zesty_ops::messaging::filter_summaries;
use zesty_ops::models::{Incident, Preferences, ProfileUpdate};
use zesty_ops::navigation::{Frame, Nav};
use zesty_ops::sites::{PinStatus, REPORT_LOCATIONS};
use zesty_ops::validation::{ImageAttachment, ReportDraft};
use zesty_ops::{App, SupabaseBackend};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Run against a seeded in-process backend instead of the hosted project
    #[arg(long, env = "ZESTY_OFFLINE")]
    offline: bool,

    /// Extra configuration file layered over the defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (text or json)
    #[arg(long)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login {
        #[arg(short, long)]
        email: String,

        #[arg(short, long, env = "ZESTY_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account
    Signup {
        /// Display name
        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        email: String,

        #[arg(short, long, env = "ZESTY_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Dashboard feed of active incidents
    Feed {
        /// Keep printing the feed as it changes, until interrupted
        #[arg(short, long)]
        watch: bool,
    },
    /// Every incident, resolved ones marked
    Incidents,
    /// Incident detail
    Show {
        id: Uuid,
    },
    /// Report a new incident
    Report {
        /// Safety, Cleaning or Repair
        #[arg(short, long)]
        category: String,

        /// Location slug, site name or free text
        #[arg(short, long)]
        location: String,

        /// Short description
        #[arg(short, long)]
        description: String,

        /// Longer description shown on the detail screen
        #[arg(long)]
        details: Option<String>,

        /// High, Med or Low
        #[arg(short, long)]
        priority: Option<String>,

        /// Photo to attach
        #[arg(short, long)]
        image: Option<PathBuf>,
    },
    /// Mark an incident resolved
    Resolve {
        id: Uuid,
    },
    /// Facility map pins
    Map,
    /// Report form locations
    Locations,
    /// Conversations, most recent first
    Inbox {
        /// Only colleagues whose name contains this
        #[arg(short, long, default_value = "")]
        search: String,
    },
    /// Messages exchanged with one colleague
    Thread {
        /// Colleague id or name
        with: String,
    },
    /// Send a direct message
    Send {
        /// Colleague id or name
        #[arg(short, long)]
        to: String,

        message: String,
    },
    /// Colleague directory
    Directory {
        /// Filter by name, role, department or email
        #[arg(default_value = "")]
        query: String,

        /// Group by department
        #[arg(short, long)]
        group: bool,
    },
    /// This week's shifts
    Schedule,
    /// Show or edit the signed-in profile
    Profile {
        #[command(subcommand)]
        action: Option<ProfileAction>,
    },
    /// Change password
    Password {
        #[arg(long, env = "ZESTY_NEW_PASSWORD", hide_env_values = true)]
        new: String,

        #[arg(long)]
        confirm: String,
    },
    /// Show or change notification and display preferences
    Preferences {
        #[arg(long)]
        email_notifications: Option<bool>,

        #[arg(long)]
        push_notifications: Option<bool>,

        #[arg(long)]
        incident_alerts: Option<bool>,

        #[arg(long)]
        schedule_reminders: Option<bool>,

        #[arg(long)]
        dark_mode: Option<bool>,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Subcommand)]
enum ProfileAction {
    Show,
    Update {
        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        role: Option<String>,

        #[arg(short, long)]
        department: Option<String>,

        #[arg(short, long)]
        phone: Option<String>,
    },
}

impl Commands {
    const fn needs_session(&self) -> bool {
        !matches!(self, Self::Login { .. } | Self::Signup { .. } | Self::Logout | Self::Locations | Self::Config)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration
    let mut config = AppConfig::load_from(cli.config.as_deref())?;
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }
    if let Some(format) = &cli.log_format {
        config.logging.format.clone_from(format);
    }
    config.validate()?;

    // Initialize logging; the guard flushes the file writer on exit
    let log_file = config.logging.file_path.as_ref().map(PathBuf::from);
    let _guard = init_logging(Some(&config.get_log_level()), log_file.as_deref(), &config.logging.format)?;

    info!(offline = cli.offline, "Starting zesty");

    if let Commands::Config = cli.command {
        print!("{}", config.to_yaml()?);
        return Ok(ExitCode::SUCCESS);
    }

    let mut app = if cli.offline {
        let (store, mut app) = app::offline(config);
        let (email, password) = store.seed_demo();
        if cli.command.needs_session() && !app.sign_in(email, password).await {
            anyhow::bail!("demo sign-in failed");
        }
        info!(email, "Offline demo data loaded");
        app
    } else {
        let backend = SupabaseBackend::new(&config.backend)
            .context("Failed to set up backend client")?
            .into_backend();
        let mut app = App::new(&backend, config);
        if app.restore() {
            debug!("Session restored");
        }
        app
    };

    if cli.command.needs_session() && !app.router().is_authenticated() {
        println!("Not signed in. Run `zesty login` first.");
        return Ok(ExitCode::FAILURE);
    }

    // Process command
    match cli.command {
        Commands::Login { email, password } => {
            if app.sign_in(&email, &password).await {
                println!("Signed in as {email}");
            }
        },
        Commands::Signup { name, email, password } => {
            app.sign_up(&name, &email, &password).await;
        },
        Commands::Logout => {
            app.sign_out().await;
            println!("Signed out");
        },
        Commands::Feed { watch } => show_feed(&mut app, watch).await?,
        Commands::Incidents => show_history(&mut app).await?,
        Commands::Show { id } => show_incident(&mut app, id).await,
        Commands::Report { category, location, description, details, priority, image } => {
            let image = match image {
                Some(path) => Some(load_image(&path).await?),
                None => None,
            };
            let draft = ReportDraft {
                category,
                location,
                description,
                detailed_description: details,
                priority,
                image,
            };
            submit_report(&mut app, &draft).await;
        },
        Commands::Resolve { id } => resolve_incident(&mut app, id).await,
        Commands::Map => show_map(&mut app).await?,
        Commands::Locations => {
            for location in REPORT_LOCATIONS {
                println!("{:<20} {}", location.slug, location.name);
            }
        },
        Commands::Inbox { search } => show_inbox(&mut app, &search).await,
        Commands::Thread { with } => show_thread(&mut app, &with).await,
        Commands::Send { to, message } => send_message(&mut app, &to, &message).await,
        Commands::Directory { query, group } => show_directory(&mut app, &query, group).await,
        Commands::Schedule => show_schedule(&mut app).await,
        Commands::Profile { action } => profile(&mut app, action).await,
        Commands::Password { new, confirm } => {
            app.navigate(Nav::OpenAccountSettings);
            let result = app.account().change_password(&new, &confirm).await;
            if app.settle(result).is_some() {
                println!("Password updated");
            }
        },
        Commands::Preferences {
            email_notifications,
            push_notifications,
            incident_alerts,
            schedule_reminders,
            dark_mode,
        } => {
            let changes = PreferenceChanges {
                email_notifications,
                push_notifications,
                incident_alerts,
                schedule_reminders,
                dark_mode,
            };
            preferences(&mut app, &changes).await;
        },
        Commands::Config => {},
    }

    Ok(print_notices(&mut app))
}

/// Print pending notices; any error notice fails the process
fn print_notices(app: &mut App) -> ExitCode {
    let mut failed = false;
    for notice in app.notices().drain() {
        let tag = match notice.level {
            NoticeLevel::Success => "ok",
            NoticeLevel::Info => "info",
            NoticeLevel::Error => {
                failed = true;
                "error"
            },
        };
        println!("[{tag}] {}", notice.text);
    }
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn local(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%b %-d %H:%M").to_string()
}

fn incident_row(incident: &Incident) -> String {
    format!(
        "{}  {:<5} {:<9} {:<36} {} [{}]",
        incident.id,
        incident.priority,
        incident.category,
        incident.location,
        incident.description,
        incident.status,
    )
}

fn print_sync<T>(snapshot: &Snapshot<T>) {
    let sync = match snapshot.sync {
        SyncState::Connecting => "connecting",
        SyncState::Live => "live",
        SyncState::Polling => "polling",
        SyncState::Stale => "stale",
    };
    match &snapshot.last_error {
        Some(error) => println!("-- {sync}, last refresh failed: {error}"),
        None => println!("-- {sync}"),
    }
}

/// Dashboard feed, optionally followed as it changes
async fn show_feed(app: &mut App, watch: bool) -> Result<()> {
    app.navigate(Nav::Back);
    let mut feed = app.incidents().live_feed();
    let timeout = app.config().fetch_timeout() * 2;
    let mut snapshot = feed.wait_for(timeout, |s| !s.loading).await?;

    loop {
        println!("Active incidents ({} shown, newest first)", snapshot.items.len());
        for incident in &snapshot.items {
            println!("{}", incident_row(incident));
        }
        print_sync(&snapshot);
        if !watch {
            return Ok(());
        }

        tokio::select! {
            next = feed.changed() => snapshot = next?,
            _ = tokio::signal::ctrl_c() => {
                info!("Feed watch interrupted");
                return Ok(());
            },
        }
        println!();
    }
}

/// Full history including resolved incidents
async fn show_history(app: &mut App) -> Result<()> {
    app.navigate(Nav::ViewAllIncidents);
    let mut all = app.incidents().live_history();
    let snapshot = all.wait_for(app.config().fetch_timeout() * 2, |s| !s.loading).await?;
    for entry in history(&snapshot.items) {
        println!(
            "{}  {:<24} {:<36} {} ({})",
            entry.incident.id,
            entry.marker(),
            entry.incident.location,
            entry.incident.description,
            local(entry.incident.created_at),
        );
    }
    print_sync(&snapshot);
    Ok(())
}

/// Incident detail screen
async fn show_incident(app: &mut App, id: Uuid) {
    let result = app.incidents().get(id).await;
    let Some(incident) = app.settle(result) else { return };
    app.navigate(Nav::SelectIncident(incident));
    if let Frame::App { view, .. } = app.router().render() {
        if let Some(incident) = view.selected_incident() {
            print_detail(&IncidentDetail::from_incident(incident));
        }
    }
}

fn print_detail(detail: &IncidentDetail) {
    println!("{}", detail.title);
    println!("  Location:  {}", detail.location);
    println!("  Category:  {}", detail.category);
    println!("  Priority:  {}", detail.priority);
    println!("  Status:    {}", detail.status);
    println!("  Reported:  {} by {}", detail.reported_at, detail.reporter);
    if let Some(url) = &detail.image_url {
        println!("  Photo:     {url}");
    }
    println!();
    println!("{}", detail.description);
    if detail.control == ResolveControl::Offer {
        println!();
        println!("Resolve with `zesty resolve {}`", detail.id);
    }
}

async fn load_image(path: &std::path::Path) -> Result<ImageAttachment> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image {}", path.display()))?;
    let file_name = path
        .file_name()
        .map_or_else(|| "photo".to_string(), |n| n.to_string_lossy().into_owned());
    Ok(ImageAttachment::from_bytes(file_name, bytes))
}

/// Report form submission
async fn submit_report(app: &mut App, draft: &ReportDraft) {
    app.navigate(Nav::ReportNewIssue);
    if let Some(incident) = app.submit_report(draft).await {
        println!("{}", incident_row(&incident));
    }
}

/// Detail screen resolve action
async fn resolve_incident(app: &mut App, id: Uuid) {
    let result = app.incidents().get(id).await;
    let Some(incident) = app.settle(result) else { return };
    app.navigate(Nav::SelectIncident(incident));
    if let Some(updated) = app.resolve_selected().await {
        println!("{}", incident_row(&updated));
    }
}

/// Facility map pins from the active incidents
async fn show_map(app: &mut App) -> Result<()> {
    app.navigate(Nav::Back);
    let mut active = app.incidents().live_active();
    let snapshot = active.wait_for(app.config().fetch_timeout() * 2, |s| !s.loading).await?;
    for pin in facility_map(&snapshot.items) {
        let status = match pin.status {
            PinStatus::Good => "good".to_string(),
            PinStatus::Issue => format!("{} open", pin.open_incidents),
        };
        println!("{:<24} ({:>2}%, {:>2}%)  {status}", pin.name, pin.x, pin.y);
    }
    print_sync(&snapshot);
    Ok(())
}

/// Colleague id, or a name query matching exactly one colleague
async fn find_colleague(app: &mut App, who: &str) -> Option<Uuid> {
    if let Ok(id) = who.parse::<Uuid>() {
        return Some(id);
    }
    let me = app.user_id();
    let me = app.settle(me)?;
    let result = app.messaging().search_recipients(me, who).await;
    let matches = app.settle(result)?;
    match matches.as_slice() {
        [only] => Some(only.id),
        [] => {
            println!("No colleague matches \"{who}\"");
            None
        },
        many => {
            println!("\"{who}\" matches several colleagues:");
            for profile in many {
                println!("  {}  {}", profile.id, profile.full_name);
            }
            None
        },
    }
}

async fn show_inbox(app: &mut App, search: &str) {
    app.navigate(Nav::OpenMessaging);
    let me = app.user_id();
    let Some(me) = app.settle(me) else { return };
    let result = app.messaging().inbox(me).await;
    let Some(rows) = app.settle(result) else { return };
    if rows.is_empty() {
        println!("No conversations yet");
        return;
    }
    let rows = filter_summaries(&rows, search);
    if rows.is_empty() {
        println!("No conversations match \"{search}\"");
    }
    for row in rows {
        let from = if row.last_from_me { "You: " } else { "" };
        println!(
            "[{}] {:<20} {:<12} {from}{}",
            row.initials,
            row.name,
            local(row.last_at),
            row.preview
        );
    }
}

async fn show_thread(app: &mut App, with: &str) {
    app.navigate(Nav::OpenMessaging);
    let Some(counterpart) = find_colleague(app, with).await else { return };
    print_thread(app, counterpart).await;
}

async fn print_thread(app: &mut App, counterpart: Uuid) {
    let me = app.user_id();
    let Some(me) = app.settle(me) else { return };
    let result = app.messaging().thread(me, counterpart).await;
    let Some(messages) = app.settle(result) else { return };
    for message in messages {
        let who = if message.is_sent { "me" } else { "them" };
        println!("{} {:>4}: {}", local(message.sent_at), who, message.body);
    }
}

/// Compose dialog
async fn send_message(app: &mut App, to: &str, body: &str) {
    app.navigate(Nav::ComposeNew);
    let Some(recipient) = find_colleague(app, to).await else { return };
    if app.send_message(recipient, body).await.is_some() {
        app.navigate(Nav::OpenMessaging);
        print_thread(app, recipient).await;
    }
}

async fn show_directory(app: &mut App, query: &str, group: bool) {
    app.navigate(Nav::OpenColleagueDirectory);
    let me = app.user_id().ok();
    let result = app.directory().stats(me).await;
    if let Some(stats) = app.settle(result) {
        println!("{} staff across {} departments", stats.total_staff, stats.departments);
    }

    if group {
        let result = app.directory().grouped(me, query).await;
        let Some(groups) = app.settle(result) else { return };
        for (department, members) in groups {
            println!("{department}");
            for card in members {
                println!("  [{}] {:<20} {}", card.initials, card.name, card.role.unwrap_or_default());
            }
        }
        return;
    }

    let result = app.directory().colleagues(me, query).await;
    let Some(cards) = app.settle(result) else { return };
    for card in cards {
        println!(
            "[{}] {:<20} {:<32} {:<20} {}",
            card.initials,
            card.name,
            card.role.unwrap_or_default(),
            card.department.unwrap_or_default(),
            card.email.unwrap_or_default(),
        );
    }
}

async fn show_schedule(app: &mut App) {
    app.navigate(Nav::OpenWorkSchedule);
    let me = app.user_id();
    let Some(me) = app.settle(me) else { return };
    let result = app.schedule().week(me, Local::now().date_naive()).await;
    let Some(week) = app.settle(result) else { return };
    for day in &week.days {
        if day.shifts.is_empty() {
            println!("{:<6} {:<7} -", day.label, day.date_label);
        }
        for line in &day.shifts {
            let span = match (&line.start, &line.end) {
                (Some(start), Some(end)) => format!("{start} - {end}"),
                _ => String::new(),
            };
            println!(
                "{:<6} {:<7} {:<20} {:<10} {} {}",
                day.label,
                day.date_label,
                span,
                line.duration_label(),
                line.location.as_deref().unwrap_or(""),
                line.role.as_deref().unwrap_or(""),
            );
        }
    }
    println!("{} shifts, {} hours", week.shift_count, week.total_hours);
}

async fn profile(app: &mut App, action: Option<ProfileAction>) {
    app.navigate(Nav::OpenAccountSettings);
    let result = match action {
        None | Some(ProfileAction::Show) => app.account().profile().await,
        Some(ProfileAction::Update { name, role, department, phone }) => {
            let update = ProfileUpdate { full_name: name, role, department, phone };
            app.account().update_profile(&update).await
        },
    };
    let Some(profile) = app.settle(result) else { return };
    println!("{} [{}]", profile.full_name, profile.initials());
    println!("  Email:      {}", profile.email.as_deref().unwrap_or("-"));
    println!("  Role:       {}", profile.role.as_deref().unwrap_or("-"));
    println!("  Department: {}", profile.department.as_deref().unwrap_or("-"));
    println!("  Phone:      {}", profile.phone.as_deref().unwrap_or("-"));
}

struct PreferenceChanges {
    email_notifications: Option<bool>,
    push_notifications: Option<bool>,
    incident_alerts: Option<bool>,
    schedule_reminders: Option<bool>,
    dark_mode: Option<bool>,
}

impl PreferenceChanges {
    const fn is_empty(&self) -> bool {
        self.email_notifications.is_none()
            && self.push_notifications.is_none()
            && self.incident_alerts.is_none()
            && self.schedule_reminders.is_none()
            && self.dark_mode.is_none()
    }

    fn apply(&self, mut preferences: Preferences) -> Preferences {
        if let Some(on) = self.email_notifications {
            preferences.email_notifications = on;
        }
        if let Some(on) = self.push_notifications {
            preferences.push_notifications = on;
        }
        if let Some(on) = self.incident_alerts {
            preferences.incident_alerts = on;
        }
        if let Some(on) = self.schedule_reminders {
            preferences.schedule_reminders = on;
        }
        if let Some(on) = self.dark_mode {
            preferences.dark_mode = on;
        }
        preferences
    }
}

async fn preferences(app: &mut App, changes: &PreferenceChanges) {
    app.navigate(Nav::OpenAccountSettings);
    let result = app.account().profile().await;
    let Some(profile) = app.settle(result) else { return };
    let mut preferences = profile.preferences;
    if !changes.is_empty() {
        let result = app.account().update_preferences(changes.apply(preferences)).await;
        let Some(saved) = app.settle(result) else { return };
        preferences = saved;
        println!("Preferences saved");
    }
    println!("  Email notifications: {}", preferences.email_notifications);
    println!("  Push notifications:  {}", preferences.push_notifications);
    println!("  Incident alerts:     {}", preferences.incident_alerts);
    println!("  Schedule reminders:  {}", preferences.schedule_reminders);
    println!("  Dark mode:           {}", preferences.dark_mode);
}
