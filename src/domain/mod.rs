//! Domain model: identifiers, records, listing queries and input checks

pub mod ids;
pub mod models;
pub mod query;
pub mod validation;

pub use ids::{IdError, PatientId, SessionId, UserId};
pub use models::{
    ExtractedNotes, Mood, MoodTrajectory, Patient, Record, SessionStatus, SessionUpload,
    TherapySession, User, UserRole,
};
pub use query::{ListQuery, Page, SortOrder};
