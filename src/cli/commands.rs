//! CLI commands

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing::debug;

use crate::api::{ApiError, ApiResponse};
use crate::config::Config;
use crate::core::{AppState, Theme};
use crate::domain::models::{
    CreatePatientRequest, SessionUpload, SignupRequest, TherapySession, UpdatePatientRequest,
};
use crate::domain::query::sort_by_column;
use crate::domain::validation::{validate_new_patient, validate_patient_update, validate_signup, FieldErrors};
use crate::domain::{ListQuery, PatientId, SessionId, SessionStatus, SortOrder, UserRole};

#[derive(Parser)]
#[command(name = "therapybridge")]
#[command(about = "Manage patients and therapy sessions on a TherapyBridge server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (default: ~/.therapybridge/config.yml)
    #[arg(long)]
    config: Option<String>,

    /// API base URL, overrides the config file
    #[arg(long)]
    api_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and remember the token
    Login {
        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,
    },

    /// Create an account
    Signup {
        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,

        /// Full name
        #[arg(long)]
        name: String,

        /// Role (therapist, patient)
        #[arg(long, default_value = "therapist")]
        role: String,
    },

    /// Confirm an email address with the token from the verification mail
    VerifyEmail { token: String },

    /// Sign out and clear local state
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Patient records
    #[command(subcommand)]
    Patients(PatientCommands),

    /// Therapy sessions
    #[command(subcommand)]
    Sessions(SessionCommands),

    /// Show the notes extracted from a session
    Notes { session_id: String },

    /// Show or change the theme preference
    Theme {
        /// light, dark or system
        value: Option<String>,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Args, Clone)]
struct ListArgs {
    #[arg(long, default_value = "1")]
    page: u32,

    #[arg(long, default_value = "20")]
    page_size: u32,

    /// Column to sort by
    #[arg(long)]
    sort: Option<String>,

    /// Sort descending
    #[arg(long)]
    desc: bool,
}

impl ListArgs {
    fn query(&self) -> ListQuery {
        ListQuery {
            page: self.page,
            page_size: self.page_size,
            sort_by: self.sort.clone(),
            order: if self.desc { SortOrder::Desc } else { SortOrder::Asc },
        }
    }
}

#[derive(Subcommand)]
enum PatientCommands {
    /// List patients
    List {
        #[command(flatten)]
        list: ListArgs,
    },

    /// Show one patient
    Show { id: String },

    /// Create a patient
    Create {
        #[arg(long)]
        name: String,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        phone: Option<String>,
    },

    /// Edit a patient
    Update {
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        phone: Option<String>,
    },

    /// Delete a patient
    Delete { id: String },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// List sessions
    List {
        /// Only sessions for this patient
        #[arg(long)]
        patient: Option<String>,

        #[command(flatten)]
        list: ListArgs,
    },

    /// Show one session
    Show {
        id: String,

        /// Print the raw response envelope as JSON
        #[arg(long)]
        json: bool,
    },

    /// Upload session audio
    Upload {
        #[arg(long)]
        patient: String,

        /// Audio file
        #[arg(long)]
        file: String,

        /// Session date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,

        /// Keep polling until processing finishes
        #[arg(long)]
        watch: bool,
    },

    /// Poll a session until processing finishes
    Watch { id: String },

    /// Delete a session
    Delete { id: String },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(url) = cli.api_url {
        config.api.base_url = url;
    }

    let state = AppState::from_config(config)?;
    state.init()?;

    // Create a multi-threaded runtime for CLI operations
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(async { execute(&state, cli.command).await })
}

async fn execute(state: &AppState, command: Commands) -> Result<()> {
    match command {
        Commands::Login { email, password } => {
            let session = state
                .login(&email, &password)
                .await
                .map_err(|e| surface(state, e))?;
            match &session.user {
                Some(user) => println!("Logged in as {} ({})", user.display_name(), user.role.as_str()),
                None => println!("Logged in as {}", email),
            }
            Ok(())
        }

        Commands::Signup {
            email,
            password,
            name,
            role,
        } => {
            let request = SignupRequest {
                email,
                password,
                full_name: name,
                role: UserRole::from_str(&role)?,
            };
            validate_signup(&request).map_err(invalid)?;

            let user = state
                .client
                .signup(&request)
                .await
                .map_err(|e| surface(state, ApiError::from(e)))?
                .into_result()
                .map_err(|e| surface(state, e))?;
            println!("Created account for {}", user.email);
            if !user.is_verified {
                println!("Check your inbox for a verification email.");
            }
            Ok(())
        }

        Commands::VerifyEmail { token } => {
            state
                .client
                .verify_email(&token)
                .await
                .map_err(|e| surface(state, ApiError::from(e)))?
                .into_result()
                .map_err(|e| surface(state, e))?;
            println!("Email verified");
            Ok(())
        }

        Commands::Logout => {
            state.logout().await?;
            println!("Logged out");
            Ok(())
        }

        Commands::Whoami => {
            if !state.is_authenticated() {
                println!("Not logged in");
                return Ok(());
            }
            let user = state.current_user().await.map_err(|e| surface(state, e))?;
            println!("{} <{}>", user.display_name(), user.email);
            println!("  id:       {}", user.id);
            println!("  role:     {}", user.role.as_str());
            println!("  verified: {}", user.is_verified);
            if user.is_demo {
                match user.demo_expires_at {
                    Some(at) if user.demo_expired(chrono::Utc::now()) => println!("  demo:     expired {}", at),
                    Some(at) => println!("  demo:     expires {}", at),
                    None => println!("  demo:     yes"),
                }
            }
            if let Some(expires) = state.session().and_then(|s| s.expires_at) {
                println!("  token expires {}", expires);
            }
            Ok(())
        }

        Commands::Patients(command) => patients(state, command).await,
        Commands::Sessions(command) => sessions(state, command).await,

        Commands::Notes { session_id } => {
            let id = SessionId::parse(&session_id)?;
            let notes = state
                .resources
                .load_notes(&id)
                .await
                .map_err(|e| surface(state, e))?;

            println!("Mood: {} ({})", notes.session_mood.as_str(), notes.mood_trajectory.as_str());
            if !notes.topic_summary.is_empty() {
                println!("\n{}", notes.topic_summary);
            }
            print_list("Key topics", notes.key_topics.iter().map(String::as_str));
            print_list("Strategies", notes.strategies.iter().map(|s| s.name.as_str()));
            print_list("Triggers", notes.triggers.iter().map(|t| t.trigger.as_str()));
            print_list("Action items", notes.action_items.iter().map(|a| a.task.as_str()));
            print_list("Quotes", notes.significant_quotes.iter().map(|q| q.quote.as_str()));
            print_list("Follow-up", notes.follow_up_topics.iter().map(String::as_str));
            if notes.has_risk_flags() {
                println!("\nRisk flags:");
                for flag in &notes.risk_flags {
                    println!("  ! [{}] {}: {}", flag.severity, flag.kind, flag.evidence);
                }
            }
            Ok(())
        }

        Commands::Theme { value } => {
            match value {
                Some(value) => {
                    let theme = Theme::from_str(&value)?;
                    state.set_theme(theme)?;
                    println!("Theme set to {}", theme);
                }
                None => println!("{}", state.theme()),
            }
            Ok(())
        }

        Commands::Config => {
            print!("{}", serde_yaml::to_string(&state.config)?);
            Ok(())
        }
    }
}

async fn patients(state: &AppState, command: PatientCommands) -> Result<()> {
    match command {
        PatientCommands::List { list } => {
            let query = list.query();
            let mut patients = state
                .resources
                .load_patients(&query)
                .await
                .map_err(|e| surface(state, e))?;
            if let Some(column) = &query.sort_by {
                sort_by_column(&mut patients, column, query.order);
            }

            if patients.is_empty() {
                println!("No patients found");
            } else {
                for patient in patients {
                    println!(
                        "[{}] {} - {} - {}",
                        patient.id.short(),
                        patient.name,
                        patient.email.as_deref().unwrap_or("-"),
                        patient.phone.as_deref().unwrap_or("-")
                    );
                }
            }
            Ok(())
        }

        PatientCommands::Show { id } => {
            let id = PatientId::parse(&id)?;
            let patient = state
                .resources
                .load_patient(&id)
                .await
                .map_err(|e| surface(state, e))?;
            println!("{} ({})", patient.name, patient.id);
            println!("  email: {}", patient.email.as_deref().unwrap_or("-"));
            println!("  phone: {}", patient.phone.as_deref().unwrap_or("-"));
            if let Some(created) = patient.created_at {
                println!("  since: {}", created.format("%Y-%m-%d"));
            }
            Ok(())
        }

        PatientCommands::Create { name, email, phone } => {
            let therapist_id = state.session().and_then(|s| s.user).map(|u| u.id);
            let request = CreatePatientRequest {
                name,
                email,
                phone,
                therapist_id,
            };
            validate_new_patient(&request).map_err(invalid)?;

            let patient = state
                .resources
                .create_patient(&ListQuery::default(), request)
                .await
                .map_err(|e| surface(state, e))?;
            println!("Created patient: {} ({})", patient.name, patient.id);
            Ok(())
        }

        PatientCommands::Update {
            id,
            name,
            email,
            phone,
        } => {
            let id = PatientId::parse(&id)?;
            let request = UpdatePatientRequest { name, email, phone };
            validate_patient_update(&request).map_err(invalid)?;

            let patient = state
                .resources
                .update_patient(&id, request)
                .await
                .map_err(|e| surface(state, e))?;
            println!("Updated patient: {} ({})", patient.name, patient.id);
            Ok(())
        }

        PatientCommands::Delete { id } => {
            let id = PatientId::parse(&id)?;
            state
                .resources
                .delete_patient(&ListQuery::default(), &id)
                .await
                .map_err(|e| surface(state, e))?;
            println!("Deleted patient: {}", id);
            Ok(())
        }
    }
}

async fn sessions(state: &AppState, command: SessionCommands) -> Result<()> {
    match command {
        SessionCommands::List { patient, list } => {
            let patient = patient.map(PatientId::parse).transpose()?;
            let query = list.query();
            let mut sessions = state
                .resources
                .load_sessions(patient.as_ref(), &query)
                .await
                .map_err(|e| surface(state, e))?;
            if let Some(column) = &query.sort_by {
                sort_by_column(&mut sessions, column, query.order);
            }

            if sessions.is_empty() {
                println!("No sessions found");
            } else {
                for session in &sessions {
                    print_session_line(session);
                }
                if sessions.len() as u32 == query.page_size {
                    println!("... more on page {}", query.page.max(1).saturating_add(1));
                }
            }
            Ok(())
        }

        SessionCommands::Show { id, json } => {
            let id = SessionId::parse(&id)?;
            if json {
                let response: ApiResponse<TherapySession> = state
                    .client
                    .get_session(&id)
                    .await
                    .map_err(|e| surface(state, ApiError::from(e)))?;
                println!("{}", serde_json::to_string_pretty(&response.to_envelope())?);
                return Ok(());
            }

            let session = state
                .resources
                .load_session(&id)
                .await
                .map_err(|e| surface(state, e))?;
            print_session_line(&session);
            if let Some(message) = &session.error_message {
                println!("  error: {}", message);
            }
            if let Some(processed) = session.processed_at {
                println!("  processed: {}", processed);
            }
            if session.extracted_notes.is_some() {
                println!("  notes available: therapybridge notes {}", session.id);
            }
            Ok(())
        }

        SessionCommands::Upload {
            patient,
            file,
            date,
            watch,
        } => {
            let patient_id = PatientId::parse(&patient)?;
            let session_date = date
                .map(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d"))
                .transpose()
                .context("Session date must be YYYY-MM-DD")?;
            let path = Path::new(&file);
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read {}", file))?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| file.clone());

            let upload = SessionUpload {
                patient_id,
                content_type: audio_content_type(&filename).to_string(),
                filename,
                session_date,
                bytes,
            };

            let handle = state.resources.upload_session(&ListQuery::default(), upload, |pct| {
                eprint!("\rUploading... {:>3}%", pct);
            });
            let result = handle.finish().await;
            eprintln!();
            let session = result.map_err(|e| surface(state, e))?;
            println!("Uploaded session: {} ({})", session.id, session.status.as_str());

            if watch {
                watch_session(state, &session.id).await?;
            }
            Ok(())
        }

        SessionCommands::Watch { id } => {
            let id = SessionId::parse(&id)?;
            watch_session(state, &id).await
        }

        SessionCommands::Delete { id } => {
            let id = SessionId::parse(&id)?;
            state
                .resources
                .delete_session(None, &ListQuery::default(), &id)
                .await
                .map_err(|e| surface(state, e))?;
            println!("Deleted session: {}", id);
            Ok(())
        }
    }
}

async fn watch_session(state: &AppState, id: &SessionId) -> Result<()> {
    let key = crate::cache::resources::session_key(id);
    let mut updates = state.resources.session.subscribe(&key);
    let poll = state.resources.watch_session(id);

    let printer = tokio::spawn(async move {
        let mut last = None;
        while updates.changed().await.is_ok() {
            let status = updates.borrow_and_update().value.as_ref().map(|s| s.status);
            if let Some(status) = status {
                if last != Some(status) {
                    println!("[{:>3}%] {}", status.progress_percent(), status.as_str());
                    last = Some(status);
                }
            }
        }
    });

    let finished = poll.finished().await;
    printer.abort();

    match finished {
        Some(session) if session.status == SessionStatus::Failed => {
            anyhow::bail!(
                "Processing failed: {}",
                session.error_message.as_deref().unwrap_or("no details")
            )
        }
        Some(session) => {
            println!("Session {} is {}", session.id, session.status.as_str());
            Ok(())
        }
        None => anyhow::bail!("Stopped watching session {}", id),
    }
}

fn print_session_line(session: &TherapySession) {
    println!(
        "[{}] {} - {} - {}",
        session.id.short(),
        session.session_date.format("%Y-%m-%d"),
        session.status.as_str(),
        session.audio_filename.as_deref().unwrap_or("-")
    );
}

fn print_list<'a>(title: &str, items: impl Iterator<Item = &'a str>) {
    let items: Vec<&str> = items.collect();
    if items.is_empty() {
        return;
    }
    println!("\n{}:", title);
    for item in items {
        println!("  - {}", item);
    }
}

fn audio_content_type(filename: &str) -> &'static str {
    let ext = filename.rsplit('.').next().unwrap_or("").to_lowercase();
    match ext.as_str() {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        "webm" => "audio/webm",
        "flac" => "audio/flac",
        _ => "application/octet-stream",
    }
}

/// Turn an API failure into what the user should read
fn surface(state: &AppState, error: ApiError) -> anyhow::Error {
    debug!(
        "API failure: code={} status={:?} request_id={:?} detail={:?}",
        error.code(),
        error.status(),
        error.request_id(),
        error.detail()
    );
    if let Err(e) = state.observe_error(&error) {
        debug!("Could not clear session: {}", e);
    }
    anyhow::anyhow!(describe_failure(&error))
}

/// The user-safe text for an API failure. Raw server or decoder text stays
/// in the debug log.
pub fn describe_failure(error: &ApiError) -> String {
    let mut message = error.user_message().to_string();
    if let Some(fields) = error.fields() {
        message.push_str(&format_fields(fields));
    }
    if let Some(suggestion) = error.suggestion() {
        message.push(' ');
        message.push_str(suggestion);
    }
    if error.is_retriable() {
        message.push_str(" (retrying may help)");
    }
    if let Some(request_id) = error.request_id() {
        message.push_str(&format!(" [request {}]", request_id));
    }
    message
}

fn invalid(fields: FieldErrors) -> anyhow::Error {
    anyhow::anyhow!("Invalid input:{}", format_fields(&fields))
}

fn format_fields(fields: &FieldErrors) -> String {
    let mut out = String::new();
    for (field, messages) in fields {
        for message in messages {
            out.push_str(&format!("\n  {}: {}", field, message));
        }
    }
    out
}
