//! Records exchanged with the TherapyBridge API

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{PatientId, SessionId, UserId};

/// Anything held in a cached collection that can be matched by identity
pub trait Record: Clone + Send + Sync + 'static {
    type Id: PartialEq + Clone + Send + Sync;

    fn id(&self) -> &Self::Id;
}

// ========== USER ==========

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Therapist,
    Patient,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Therapist => "therapist",
            UserRole::Patient => "patient",
            UserRole::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "therapist" => Ok(UserRole::Therapist),
            "patient" => Ok(UserRole::Patient),
            "admin" => Ok(UserRole::Admin),
            _ => anyhow::bail!("Unknown role: {}", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    pub role: UserRole,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub is_demo: bool,
    #[serde(default)]
    pub demo_expires_at: Option<DateTime<Utc>>,
}

impl User {
    /// Demo accounts are removed server-side once they expire
    pub fn demo_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_demo && self.demo_expires_at.map(|at| at <= now).unwrap_or(false)
    }

    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.email)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: UserRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub user: Option<User>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

// ========== PATIENT ==========

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub id: PatientId,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub therapist_id: Option<UserId>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Record for Patient {
    type Id = PatientId;

    fn id(&self) -> &PatientId {
        &self.id
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreatePatientRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub therapist_id: Option<UserId>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdatePatientRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl UpdatePatientRequest {
    /// Apply the patch locally, for optimistic projections
    pub fn apply_to(&self, patient: &Patient) -> Patient {
        let mut next = patient.clone();
        if let Some(name) = &self.name {
            next.name = name.clone();
        }
        if let Some(email) = &self.email {
            next.email = Some(email.clone());
        }
        if let Some(phone) = &self.phone {
            next.phone = Some(phone.clone());
        }
        next
    }
}

// ========== SESSION ==========

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Uploading,
    Transcribing,
    Transcribed,
    ExtractingNotes,
    Processed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Uploading => "uploading",
            SessionStatus::Transcribing => "transcribing",
            SessionStatus::Transcribed => "transcribed",
            SessionStatus::ExtractingNotes => "extracting_notes",
            SessionStatus::Processed => "processed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "uploading" => Ok(SessionStatus::Uploading),
            "transcribing" => Ok(SessionStatus::Transcribing),
            "transcribed" => Ok(SessionStatus::Transcribed),
            "extracting_notes" => Ok(SessionStatus::ExtractingNotes),
            "processed" => Ok(SessionStatus::Processed),
            "failed" => Ok(SessionStatus::Failed),
            _ => anyhow::bail!("Unknown session status: {}", s),
        }
    }

    /// Still moving through the upload / transcription / extraction pipeline
    pub fn is_processing(&self) -> bool {
        match self {
            SessionStatus::Uploading
            | SessionStatus::Transcribing
            | SessionStatus::Transcribed
            | SessionStatus::ExtractingNotes => true,
            SessionStatus::Processed | SessionStatus::Failed => false,
        }
    }

    /// Rough pipeline position, used for progress display
    pub fn progress_percent(&self) -> u8 {
        match self {
            SessionStatus::Uploading => 10,
            SessionStatus::Transcribing => 35,
            SessionStatus::Transcribed => 60,
            SessionStatus::ExtractingNotes => 80,
            SessionStatus::Processed | SessionStatus::Failed => 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TherapySession {
    pub id: SessionId,
    pub patient_id: PatientId,
    #[serde(default)]
    pub therapist_id: Option<UserId>,
    #[serde(default)]
    pub audio_filename: Option<String>,
    pub status: SessionStatus,
    pub session_date: DateTime<Utc>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub transcript_text: Option<String>,
    #[serde(default)]
    pub extracted_notes: Option<ExtractedNotes>,
}

impl TherapySession {
    /// Local stand-in shown while an upload is in flight
    pub fn placeholder(patient_id: PatientId, audio_filename: impl Into<String>, session_date: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::temporary(),
            patient_id,
            therapist_id: None,
            audio_filename: Some(audio_filename.into()),
            status: SessionStatus::Uploading,
            session_date,
            error_message: None,
            created_at: Some(Utc::now()),
            processed_at: None,
            transcript_text: None,
            extracted_notes: None,
        }
    }
}

impl Record for TherapySession {
    type Id = SessionId;

    fn id(&self) -> &SessionId {
        &self.id
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateSessionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl UpdateSessionRequest {
    pub fn apply_to(&self, session: &TherapySession) -> TherapySession {
        let mut next = session.clone();
        if let Some(status) = self.status {
            next.status = status;
        }
        if let Some(date) = self.session_date {
            next.session_date = date;
        }
        if let Some(message) = &self.error_message {
            next.error_message = Some(message.clone());
        }
        next
    }
}

/// Metadata sent alongside an audio upload
#[derive(Debug, Clone)]
pub struct SessionUpload {
    pub patient_id: PatientId,
    pub filename: String,
    pub content_type: String,
    pub session_date: Option<NaiveDate>,
    pub bytes: Vec<u8>,
}

// ========== EXTRACTED NOTES ==========

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    VeryLow,
    Low,
    Neutral,
    Positive,
    VeryPositive,
}

impl Mood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::VeryLow => "very_low",
            Mood::Low => "low",
            Mood::Neutral => "neutral",
            Mood::Positive => "positive",
            Mood::VeryPositive => "very_positive",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MoodTrajectory {
    Improving,
    Declining,
    Stable,
    Fluctuating,
}

impl MoodTrajectory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoodTrajectory::Improving => "improving",
            MoodTrajectory::Declining => "declining",
            MoodTrajectory::Stable => "stable",
            MoodTrajectory::Fluctuating => "fluctuating",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Strategy {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trigger {
    pub trigger: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionItem {
    pub task: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignificantQuote {
    pub quote: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub timestamp_start: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskFlag {
    #[serde(rename = "type")]
    pub kind: String,
    pub evidence: String,
    pub severity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedNotes {
    #[serde(default)]
    pub key_topics: Vec<String>,
    #[serde(default)]
    pub topic_summary: String,
    #[serde(default)]
    pub strategies: Vec<Strategy>,
    #[serde(default)]
    pub emotional_themes: Vec<String>,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub action_items: Vec<ActionItem>,
    #[serde(default)]
    pub significant_quotes: Vec<SignificantQuote>,
    pub session_mood: Mood,
    pub mood_trajectory: MoodTrajectory,
    #[serde(default)]
    pub follow_up_topics: Vec<String>,
    #[serde(default)]
    pub unresolved_concerns: Vec<String>,
    #[serde(default)]
    pub risk_flags: Vec<RiskFlag>,
    #[serde(default)]
    pub therapist_notes: String,
    #[serde(default)]
    pub patient_summary: String,
}

impl ExtractedNotes {
    pub fn has_risk_flags(&self) -> bool {
        !self.risk_flags.is_empty()
    }
}
