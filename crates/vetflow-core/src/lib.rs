//! Vetflow Core Library
//!
//! Veterinary appointment scheduling and clinical workflow engine.
//!
//! # Architecture
//!
//! ```text
//!   Owner request ──► Scheduler ──► [vet conflict check] ──► PENDING
//!                                                              │
//!                              Vet decision (approve / reject / reschedule)
//!                                                              │
//!                        ┌─────────────────────────────────────┼──────────────┐
//!                        ▼                                     ▼              ▼
//!                 Action Ledger                        Assistant links   Lab tests
//!          (hash-chained, append-only)           (idempotent, mirrors
//!                        │                         live assignments)
//!                        ▼
//!               Owner notifications (best effort, after commit)
//! ```
//!
//! # Core Principle
//!
//! **Check and write happen in one transaction.** Every state change runs under
//! `BEGIN IMMEDIATE`, so two concurrent bookings for the same vet or assistant
//! cannot both pass the conflict check.
//!
//! # Modules
//!
//! - [`db`]: SQLite storage layer
//! - [`models`]: Domain types (Appointment, AppointmentAction, LabTest, etc.)
//! - [`workflow`]: Scheduler, status machine, ledger, assistants, lab tests, messages
//! - [`config`]: Clinic policy and runtime settings

pub mod config;
pub mod db;
pub mod models;
pub mod workflow;

// Re-export commonly used types
pub use config::ClinicConfig;
pub use db::Database;
pub use models::{
    ActionKind, ActionStatus, Appointment, AppointmentAction, AppointmentKind,
    AppointmentMessage, AppointmentStatus, LabTest, LabTestStatus, LocationKind, Role,
};
pub use workflow::{
    AssistantResolver, ConflictPolicy, ErrorKind, LabWorkflow, Ledger, MessageThread, Scheduler,
    StatusMachine, WorkflowError,
};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};

use db::fmt_ts;
use models::{
    AssignedAppointment, Assistant, MessageOrder, Owner, Pet, User, Vet,
};
use workflow::{ActionRequest, AppointmentRequest, LabTestRequest, LedgerReport};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ClinicError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Illegal transition: {0}")]
    IllegalTransition(String),
}

impl From<db::DbError> for ClinicError {
    fn from(e: db::DbError) -> Self {
        ClinicError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for ClinicError {
    fn from(e: serde_json::Error) -> Self {
        ClinicError::InvalidInput(e.to_string())
    }
}

impl From<WorkflowError> for ClinicError {
    fn from(e: WorkflowError) -> Self {
        let message = e.to_string();
        match e.kind() {
            ErrorKind::NotFound => ClinicError::NotFound(message),
            ErrorKind::InvalidInput => ClinicError::InvalidInput(message),
            ErrorKind::Conflict => ClinicError::Conflict(message),
            ErrorKind::NotAuthorized => ClinicError::NotAuthorized(message),
            ErrorKind::IllegalTransition => ClinicError::IllegalTransition(message),
            ErrorKind::Storage => ClinicError::DatabaseError(message),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for ClinicError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ClinicError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path, configured from `VETFLOW_*`.
#[uniffi::export]
pub fn open_database(path: String) -> Result<Arc<ClinicCore>, ClinicError> {
    ClinicCore::open(&path, ClinicConfig::from_env())
}

/// Open or create a database with a JSON clinic configuration.
#[uniffi::export]
pub fn open_database_with_config(
    path: String,
    config_json: String,
) -> Result<Arc<ClinicCore>, ClinicError> {
    ClinicCore::open(&path, ClinicConfig::from_json(&config_json)?)
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<ClinicCore>, ClinicError> {
    let db = Database::open_in_memory()?;
    Ok(Arc::new(ClinicCore {
        db: Arc::new(Mutex::new(db)),
        config: ClinicConfig::default(),
    }))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe workflow engine for FFI.
#[derive(uniffi::Object)]
pub struct ClinicCore {
    db: Arc<Mutex<Database>>,
    config: ClinicConfig,
}

impl ClinicCore {
    fn open(path: &str, config: ClinicConfig) -> Result<Arc<Self>, ClinicError> {
        let db = Database::open_with_timeout(path, Duration::from_millis(config.busy_timeout_ms))?;
        Ok(Arc::new(Self {
            db: Arc::new(Mutex::new(db)),
            config,
        }))
    }
}

#[uniffi::export]
impl ClinicCore {
    // =========================================================================
    // Identity Directory
    // =========================================================================

    /// Register a login with its roles.
    pub fn register_user(&self, login: String, roles: Vec<String>) -> Result<FfiUser, ClinicError> {
        if login.trim().is_empty() {
            return Err(ClinicError::InvalidInput("Login is empty".into()));
        }
        let roles = roles
            .iter()
            .map(|r| parse_enum(r, Role::parse, "role"))
            .collect::<Result<Vec<_>, _>>()?;

        let db = self.db.lock()?;
        let user = User::new(&login, roles);
        db.insert_user(&user)?;
        Ok(user.into())
    }

    pub fn get_user_by_login(&self, login: String) -> Result<Option<FfiUser>, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.get_user_by_login(&login)?.map(Into::into))
    }

    /// Whether a login carries a role. Unknown logins carry none.
    pub fn has_role(&self, login: String, role: String) -> Result<bool, ClinicError> {
        let role = parse_enum(&role, Role::parse, "role")?;
        let db = self.db.lock()?;
        Ok(db
            .get_user_by_login(&login)?
            .is_some_and(|user| user.has_role(role)))
    }

    pub fn create_owner_profile(&self, user_id: String, name: String) -> Result<FfiProfile, ClinicError> {
        let db = self.db.lock()?;
        require_user_id(&db, &user_id)?;
        let owner = Owner::new(user_id, name);
        db.insert_owner(&owner)?;
        Ok(FfiProfile {
            id: owner.id,
            user_id: owner.user_id,
            name: owner.name,
        })
    }

    pub fn create_vet_profile(&self, user_id: String, name: String) -> Result<FfiProfile, ClinicError> {
        let db = self.db.lock()?;
        require_user_id(&db, &user_id)?;
        let vet = Vet::new(user_id, name);
        db.insert_vet(&vet)?;
        Ok(FfiProfile {
            id: vet.id,
            user_id: vet.user_id,
            name: vet.name,
        })
    }

    pub fn create_assistant_profile(
        &self,
        user_id: String,
        name: String,
    ) -> Result<FfiProfile, ClinicError> {
        let db = self.db.lock()?;
        require_user_id(&db, &user_id)?;
        let assistant = Assistant::new(user_id, name);
        db.insert_assistant(&assistant)?;
        Ok(FfiProfile {
            id: assistant.id,
            user_id: assistant.user_id,
            name: assistant.name,
        })
    }

    /// Register a pet, optionally owned.
    pub fn register_pet(
        &self,
        name: String,
        species: String,
        owner_id: Option<String>,
    ) -> Result<FfiPet, ClinicError> {
        let db = self.db.lock()?;
        if let Some(owner_id) = &owner_id {
            if db.get_owner(owner_id)?.is_none() {
                return Err(ClinicError::NotFound(format!("Owner not found: {}", owner_id)));
            }
        }
        let pet = Pet::new(name, species, owner_id);
        db.insert_pet(&pet)?;
        Ok(pet.into())
    }

    pub fn get_pet(&self, pet_id: String) -> Result<Option<FfiPet>, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.get_pet(&pet_id)?.map(Into::into))
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// Book a new appointment.
    pub fn create_appointment(
        &self,
        request: FfiAppointmentRequest,
        requester_login: String,
    ) -> Result<FfiAppointment, ClinicError> {
        let request = AppointmentRequest {
            pet_id: request.pet_id,
            vet_id: request.vet_id,
            kind: parse_enum(&request.kind, AppointmentKind::parse, "appointment kind")?,
            location: parse_enum(&request.location, LocationKind::parse, "location")?,
            time_start: parse_instant(&request.time_start)?,
            time_end: request.time_end.as_deref().map(parse_instant).transpose()?,
            notes: request.notes,
        };

        let db = self.db.lock()?;
        let appointment =
            Scheduler::new(&db, &self.config).create_appointment(&request, &requester_login)?;
        Ok(appointment.into())
    }

    pub fn check_vet_availability(&self, vet_id: String, start: String) -> Result<bool, ClinicError> {
        let start = parse_instant(&start)?;
        let db = self.db.lock()?;
        Ok(Scheduler::new(&db, &self.config).check_vet_availability(&vet_id, start)?)
    }

    pub fn overlapping_for_vet(
        &self,
        vet_id: String,
        start: String,
        end: String,
    ) -> Result<Vec<FfiAppointment>, ClinicError> {
        let (start, end) = (parse_instant(&start)?, parse_instant(&end)?);
        let db = self.db.lock()?;
        let found = Scheduler::new(&db, &self.config).overlapping_for_vet(&vet_id, start, end)?;
        Ok(into_all(found))
    }

    pub fn get_appointment(&self, appointment_id: String) -> Result<FfiAppointment, ClinicError> {
        let db = self.db.lock()?;
        match db.get_appointment(&appointment_id)? {
            Some(appointment) => Ok(appointment.into()),
            None => Err(ClinicError::NotFound(format!(
                "Appointment not found: {}",
                appointment_id
            ))),
        }
    }

    /// Appointments on a `yyyy-MM-dd` clinic day (blank for today).
    pub fn appointments_on(
        &self,
        date: String,
        kind: Option<String>,
        vet_id: Option<String>,
    ) -> Result<Vec<FfiAppointment>, ClinicError> {
        let kind = parse_opt_enum(kind.as_deref(), AppointmentKind::parse, "appointment kind")?;
        let db = self.db.lock()?;
        let scheduler = Scheduler::new(&db, &self.config);
        let date: NaiveDate = scheduler.parse_day(&date)?;
        Ok(into_all(scheduler.appointments_on(date, kind, vet_id.as_deref())?))
    }

    pub fn appointments_on_for_vet_login(
        &self,
        date: String,
        kind: Option<String>,
        vet_login: String,
    ) -> Result<Vec<FfiAppointment>, ClinicError> {
        let kind = parse_opt_enum(kind.as_deref(), AppointmentKind::parse, "appointment kind")?;
        let db = self.db.lock()?;
        let scheduler = Scheduler::new(&db, &self.config);
        let date = scheduler.parse_day(&date)?;
        Ok(into_all(
            scheduler.appointments_on_for_vet_login(date, kind, &vet_login)?,
        ))
    }

    pub fn appointments_for_vet_login(&self, vet_login: String) -> Result<Vec<FfiAppointment>, ClinicError> {
        let db = self.db.lock()?;
        Ok(into_all(
            Scheduler::new(&db, &self.config).appointments_for_vet_login(&vet_login)?,
        ))
    }

    pub fn appointments_for_owner_login(
        &self,
        owner_login: String,
    ) -> Result<Vec<FfiAppointment>, ClinicError> {
        let db = self.db.lock()?;
        Ok(into_all(
            Scheduler::new(&db, &self.config).appointments_for_owner_login(&owner_login)?,
        ))
    }

    pub fn appointments_for_pet(&self, pet_id: String) -> Result<Vec<FfiAppointment>, ClinicError> {
        let db = self.db.lock()?;
        Ok(into_all(
            Scheduler::new(&db, &self.config).appointments_for_pet(&pet_id)?,
        ))
    }

    /// A pet's history, visible to vets and to the pet's owner.
    pub fn pet_history(&self, pet_id: String, login: String) -> Result<Vec<FfiAppointment>, ClinicError> {
        let db = self.db.lock()?;
        Ok(into_all(
            Scheduler::new(&db, &self.config).pet_history(&pet_id, &login)?,
        ))
    }

    // =========================================================================
    // Vet Workflow
    // =========================================================================

    pub fn approve(
        &self,
        appointment_id: String,
        vet_login: String,
        notes: Option<String>,
    ) -> Result<FfiAppointment, ClinicError> {
        let db = self.db.lock()?;
        let appointment = StatusMachine::new(&db, &self.config).approve(
            &appointment_id,
            &vet_login,
            notes.as_deref(),
        )?;
        Ok(appointment.into())
    }

    pub fn reject(
        &self,
        appointment_id: String,
        vet_login: String,
        notes: Option<String>,
    ) -> Result<FfiAppointment, ClinicError> {
        let db = self.db.lock()?;
        let appointment = StatusMachine::new(&db, &self.config).reject(
            &appointment_id,
            &vet_login,
            notes.as_deref(),
        )?;
        Ok(appointment.into())
    }

    pub fn reschedule(
        &self,
        appointment_id: String,
        new_start: String,
        vet_login: String,
        notes: Option<String>,
    ) -> Result<FfiAppointment, ClinicError> {
        let new_start = parse_instant(&new_start)?;
        let db = self.db.lock()?;
        let appointment = StatusMachine::new(&db, &self.config).reschedule(
            &appointment_id,
            new_start,
            &vet_login,
            notes.as_deref(),
        )?;
        Ok(appointment.into())
    }

    pub fn update_status(
        &self,
        appointment_id: String,
        status: String,
        vet_login: String,
    ) -> Result<FfiAppointment, ClinicError> {
        let status = parse_enum(&status, AppointmentStatus::parse, "appointment status")?;
        let db = self.db.lock()?;
        let appointment =
            StatusMachine::new(&db, &self.config).update_status(&appointment_id, status, &vet_login)?;
        Ok(appointment.into())
    }

    pub fn request_home_visit(
        &self,
        appointment_id: String,
        vet_login: String,
        notes: Option<String>,
    ) -> Result<FfiAction, ClinicError> {
        let db = self.db.lock()?;
        let action = StatusMachine::new(&db, &self.config).request_home_visit(
            &appointment_id,
            &vet_login,
            notes.as_deref(),
        )?;
        Ok(action.into())
    }

    /// An appointment as seen by its own vet.
    pub fn appointment_for_vet(
        &self,
        appointment_id: String,
        vet_login: String,
    ) -> Result<FfiAppointment, ClinicError> {
        let db = self.db.lock()?;
        Ok(StatusMachine::new(&db, &self.config)
            .appointment_for_vet(&appointment_id, &vet_login)?
            .into())
    }

    // =========================================================================
    // Action Ledger
    // =========================================================================

    pub fn create_action(&self, request: FfiActionRequest) -> Result<FfiAction, ClinicError> {
        let request = ActionRequest {
            appointment_id: request.appointment_id,
            kind: parse_enum(&request.kind, ActionKind::parse, "action kind")?,
            status: parse_enum(&request.status, ActionStatus::parse, "action status")?,
            description: request.description,
            notes: request.notes,
            creator_login: request.creator_login,
            assignee_login: request.assignee_login,
        };
        let db = self.db.lock()?;
        Ok(Ledger::new(&db, &self.config).create_action(&request)?.into())
    }

    pub fn complete_action(
        &self,
        action_id: String,
        status: String,
        completer_login: String,
    ) -> Result<FfiAction, ClinicError> {
        let status = parse_enum(&status, ActionStatus::parse, "action status")?;
        let db = self.db.lock()?;
        Ok(Ledger::new(&db, &self.config)
            .complete_action(&action_id, status, &completer_login)?
            .into())
    }

    pub fn get_action(&self, action_id: String) -> Result<FfiAction, ClinicError> {
        let db = self.db.lock()?;
        Ok(Ledger::new(&db, &self.config).get_action(&action_id)?.into())
    }

    pub fn actions_for_appointment(&self, appointment_id: String) -> Result<Vec<FfiAction>, ClinicError> {
        let db = self.db.lock()?;
        Ok(into_all(Ledger::new(&db, &self.config).actions_for_appointment(&appointment_id)?))
    }

    pub fn actions_assigned_to(
        &self,
        assignee_login: String,
        status: Option<String>,
    ) -> Result<Vec<FfiAction>, ClinicError> {
        let status = parse_opt_enum(status.as_deref(), ActionStatus::parse, "action status")?;
        let db = self.db.lock()?;
        Ok(into_all(
            Ledger::new(&db, &self.config).actions_assigned_to(&assignee_login, status)?,
        ))
    }

    pub fn actions_assigned_to_user(
        &self,
        user_id: String,
        status: Option<String>,
    ) -> Result<Vec<FfiAction>, ClinicError> {
        let status = parse_opt_enum(status.as_deref(), ActionStatus::parse, "action status")?;
        let db = self.db.lock()?;
        Ok(into_all(
            Ledger::new(&db, &self.config).actions_assigned_to_user(&user_id, status)?,
        ))
    }

    pub fn actions_created_by(&self, creator_login: String) -> Result<Vec<FfiAction>, ClinicError> {
        let db = self.db.lock()?;
        Ok(into_all(Ledger::new(&db, &self.config).actions_created_by(&creator_login)?))
    }

    pub fn actions_of_kind(
        &self,
        kind: String,
        appointment_id: Option<String>,
    ) -> Result<Vec<FfiAction>, ClinicError> {
        let kind = parse_enum(&kind, ActionKind::parse, "action kind")?;
        let db = self.db.lock()?;
        Ok(into_all(
            Ledger::new(&db, &self.config).actions_of_kind(kind, appointment_id.as_deref())?,
        ))
    }

    /// Recompute the ledger hash chain.
    pub fn verify_ledger(&self) -> Result<FfiLedgerReport, ClinicError> {
        let db = self.db.lock()?;
        Ok(Ledger::new(&db, &self.config).verify_ledger()?.into())
    }

    // =========================================================================
    // Assistants
    // =========================================================================

    pub fn assign_assistant(
        &self,
        appointment_id: String,
        assistant_id: String,
        notes: Option<String>,
        vet_login: String,
    ) -> Result<FfiAction, ClinicError> {
        let db = self.db.lock()?;
        let action = AssistantResolver::new(&db, &self.config).assign_assistant(
            &appointment_id,
            &assistant_id,
            notes.as_deref(),
            &vet_login,
        )?;
        Ok(action.into())
    }

    pub fn assigned_to_assistant(
        &self,
        assistant_login: String,
        status: Option<String>,
    ) -> Result<Vec<FfiAction>, ClinicError> {
        let status = parse_opt_enum(status.as_deref(), ActionStatus::parse, "action status")?;
        let db = self.db.lock()?;
        Ok(into_all(
            AssistantResolver::new(&db, &self.config).assigned_to_assistant(&assistant_login, status)?,
        ))
    }

    pub fn assigned_appointments(
        &self,
        assistant_login: String,
    ) -> Result<Vec<FfiAssignedAppointment>, ClinicError> {
        let db = self.db.lock()?;
        Ok(into_all(
            AssistantResolver::new(&db, &self.config).assigned_appointments(&assistant_login)?,
        ))
    }

    pub fn assigned_appointment_detail(
        &self,
        appointment_id: String,
        assistant_login: String,
    ) -> Result<FfiAppointment, ClinicError> {
        let db = self.db.lock()?;
        Ok(AssistantResolver::new(&db, &self.config)
            .assigned_appointment_detail(&appointment_id, &assistant_login)?
            .into())
    }

    // =========================================================================
    // Lab Tests
    // =========================================================================

    pub fn create_lab_test(
        &self,
        request: FfiLabTestRequest,
        requester_login: String,
        assignee_login: Option<String>,
    ) -> Result<FfiLabTest, ClinicError> {
        let request = LabTestRequest {
            appointment_id: request.appointment_id,
            test_name: request.test_name,
            test_type: request.test_type,
            description: request.description,
        };
        let db = self.db.lock()?;
        Ok(LabWorkflow::new(&db)
            .create_lab_test(&request, &requester_login, assignee_login.as_deref())?
            .into())
    }

    pub fn update_lab_test_status(
        &self,
        lab_test_id: String,
        status: String,
        result: Option<String>,
        notes: Option<String>,
        completer_login: String,
    ) -> Result<FfiLabTest, ClinicError> {
        let status = parse_enum(&status, LabTestStatus::parse, "lab test status")?;
        let db = self.db.lock()?;
        Ok(LabWorkflow::new(&db)
            .update_lab_test_status(
                &lab_test_id,
                status,
                result.as_deref(),
                notes.as_deref(),
                &completer_login,
            )?
            .into())
    }

    pub fn assign_lab_test(
        &self,
        lab_test_id: String,
        assignee_login: String,
    ) -> Result<FfiLabTest, ClinicError> {
        let db = self.db.lock()?;
        Ok(LabWorkflow::new(&db)
            .assign_lab_test(&lab_test_id, &assignee_login)?
            .into())
    }

    pub fn get_lab_test(&self, lab_test_id: String) -> Result<FfiLabTest, ClinicError> {
        let db = self.db.lock()?;
        Ok(LabWorkflow::new(&db).get_lab_test(&lab_test_id)?.into())
    }

    pub fn lab_tests_for_appointment(&self, appointment_id: String) -> Result<Vec<FfiLabTest>, ClinicError> {
        let db = self.db.lock()?;
        Ok(into_all(LabWorkflow::new(&db).lab_tests_for_appointment(&appointment_id)?))
    }

    pub fn lab_tests_for_pet(&self, pet_id: String) -> Result<Vec<FfiLabTest>, ClinicError> {
        let db = self.db.lock()?;
        Ok(into_all(LabWorkflow::new(&db).lab_tests_for_pet(&pet_id)?))
    }

    pub fn lab_tests_requested_by(&self, requester_login: String) -> Result<Vec<FfiLabTest>, ClinicError> {
        let db = self.db.lock()?;
        Ok(into_all(LabWorkflow::new(&db).lab_tests_requested_by(&requester_login)?))
    }

    pub fn lab_tests_assigned_to(
        &self,
        assignee_login: String,
        status: Option<String>,
    ) -> Result<Vec<FfiLabTest>, ClinicError> {
        let status = parse_opt_enum(status.as_deref(), LabTestStatus::parse, "lab test status")?;
        let db = self.db.lock()?;
        Ok(into_all(
            LabWorkflow::new(&db).lab_tests_assigned_to(&assignee_login, status)?,
        ))
    }

    // =========================================================================
    // Messages
    // =========================================================================

    pub fn send_message(
        &self,
        appointment_id: String,
        text: String,
        sender_login: String,
    ) -> Result<FfiMessage, ClinicError> {
        let db = self.db.lock()?;
        Ok(MessageThread::new(&db, &self.config)
            .send_message(&appointment_id, &text, &sender_login)?
            .into())
    }

    pub fn list_messages(
        &self,
        appointment_id: String,
        newest_first: bool,
    ) -> Result<Vec<FfiMessage>, ClinicError> {
        let order = if newest_first {
            MessageOrder::Descending
        } else {
            MessageOrder::Ascending
        };
        let db = self.db.lock()?;
        Ok(into_all(
            MessageThread::new(&db, &self.config).list_messages(&appointment_id, order)?,
        ))
    }
}

// =========================================================================
// Input Parsing
// =========================================================================

fn parse_instant(raw: &str) -> Result<DateTime<Utc>, ClinicError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| ClinicError::InvalidInput(format!("Invalid timestamp {:?}: {}", raw, e)))
}

fn parse_enum<T>(raw: &str, parse: fn(&str) -> Option<T>, what: &str) -> Result<T, ClinicError> {
    parse(raw).ok_or_else(|| ClinicError::InvalidInput(format!("Invalid {}: {}", what, raw)))
}

fn parse_opt_enum<T>(
    raw: Option<&str>,
    parse: fn(&str) -> Option<T>,
    what: &str,
) -> Result<Option<T>, ClinicError> {
    raw.map(|r| parse_enum(r, parse, what)).transpose()
}

fn require_user_id(db: &Database, user_id: &str) -> Result<(), ClinicError> {
    match db.get_user(user_id)? {
        Some(_) => Ok(()),
        None => Err(ClinicError::NotFound(format!("User not found: {}", user_id))),
    }
}

fn into_all<T, U: From<T>>(items: Vec<T>) -> Vec<U> {
    items.into_iter().map(U::from).collect()
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe user account.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiUser {
    pub id: String,
    pub login: String,
    pub roles: Vec<String>,
    pub created_at: String,
}

impl From<User> for FfiUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            login: user.login,
            roles: user.roles.iter().map(|r| r.as_str().to_string()).collect(),
            created_at: fmt_ts(&user.created_at),
        }
    }
}

/// FFI-safe owner, vet or assistant profile.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiProfile {
    pub id: String,
    pub user_id: String,
    pub name: String,
}

/// FFI-safe pet.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPet {
    pub id: String,
    pub name: String,
    pub species: String,
    pub owner_id: Option<String>,
}

impl From<Pet> for FfiPet {
    fn from(pet: Pet) -> Self {
        Self {
            id: pet.id,
            name: pet.name,
            species: pet.species,
            owner_id: pet.owner_id,
        }
    }
}

/// FFI-safe booking request. Times are RFC 3339.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAppointmentRequest {
    pub pet_id: String,
    pub vet_id: String,
    pub kind: String,
    pub location: String,
    pub time_start: String,
    pub time_end: Option<String>,
    pub notes: Option<String>,
}

/// FFI-safe appointment.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAppointment {
    pub id: String,
    pub time_start: String,
    pub time_end: Option<String>,
    pub kind: String,
    pub location: String,
    pub status: String,
    pub notes: Option<String>,
    pub pet_id: String,
    pub owner_id: String,
    pub vet_id: Option<String>,
    pub vet_bound: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Appointment> for FfiAppointment {
    fn from(appt: Appointment) -> Self {
        Self {
            id: appt.id,
            time_start: fmt_ts(&appt.time_start),
            time_end: appt.time_end.as_ref().map(fmt_ts),
            kind: appt.kind.as_str().to_string(),
            location: appt.location.as_str().to_string(),
            status: appt.status.as_str().to_string(),
            notes: appt.notes,
            pet_id: appt.pet_id,
            owner_id: appt.owner_id,
            vet_id: appt.vet_id,
            vet_bound: appt.vet_bound,
            created_at: fmt_ts(&appt.created_at),
            updated_at: fmt_ts(&appt.updated_at),
        }
    }
}

/// FFI-safe ledger row.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAction {
    pub id: String,
    pub appointment_id: String,
    pub kind: String,
    pub status: String,
    pub description: String,
    pub notes: Option<String>,
    pub scheduled_time: String,
    pub completed_time: Option<String>,
    pub created_by: String,
    pub assigned_to: Option<String>,
    pub entry_hash: String,
}

impl From<AppointmentAction> for FfiAction {
    fn from(action: AppointmentAction) -> Self {
        Self {
            id: action.id,
            appointment_id: action.appointment_id,
            kind: action.kind.as_str().to_string(),
            status: action.status.as_str().to_string(),
            description: action.description,
            notes: action.notes,
            scheduled_time: fmt_ts(&action.scheduled_time),
            completed_time: action.completed_time.as_ref().map(fmt_ts),
            created_by: action.created_by,
            assigned_to: action.assigned_to,
            entry_hash: action.entry_hash,
        }
    }
}

/// FFI-safe ledger append request.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiActionRequest {
    pub appointment_id: String,
    pub kind: String,
    pub status: String,
    pub description: String,
    pub notes: Option<String>,
    pub creator_login: String,
    pub assignee_login: Option<String>,
}

/// FFI-safe ledger verification result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLedgerReport {
    pub checked: u32,
    pub first_broken: Option<String>,
}

impl From<LedgerReport> for FfiLedgerReport {
    fn from(report: LedgerReport) -> Self {
        Self {
            checked: report.checked as u32,
            first_broken: report.first_broken,
        }
    }
}

/// FFI-safe assistant link with its appointment.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAssignedAppointment {
    pub assignment_id: String,
    pub assistant_id: String,
    pub linked_at: String,
    pub appointment: FfiAppointment,
}

impl From<AssignedAppointment> for FfiAssignedAppointment {
    fn from(assigned: AssignedAppointment) -> Self {
        Self {
            assignment_id: assigned.assignment.id,
            assistant_id: assigned.assignment.assistant_id,
            linked_at: fmt_ts(&assigned.assignment.created_at),
            appointment: assigned.appointment.into(),
        }
    }
}

/// FFI-safe lab test.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLabTest {
    pub id: String,
    pub appointment_id: String,
    pub pet_id: String,
    pub test_name: String,
    pub test_type: Option<String>,
    pub description: Option<String>,
    pub status: String,
    pub result: Option<String>,
    pub notes: Option<String>,
    pub requested_date: String,
    pub sample_collected_date: Option<String>,
    pub completed_date: Option<String>,
    pub requested_by: String,
    pub assigned_to: Option<String>,
}

impl From<LabTest> for FfiLabTest {
    fn from(test: LabTest) -> Self {
        Self {
            id: test.id,
            appointment_id: test.appointment_id,
            pet_id: test.pet_id,
            test_name: test.test_name,
            test_type: test.test_type,
            description: test.description,
            status: test.status.as_str().to_string(),
            result: test.result,
            notes: test.notes,
            requested_date: fmt_ts(&test.requested_date),
            sample_collected_date: test.sample_collected_date.as_ref().map(fmt_ts),
            completed_date: test.completed_date.as_ref().map(fmt_ts),
            requested_by: test.requested_by,
            assigned_to: test.assigned_to,
        }
    }
}

/// FFI-safe lab test request.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLabTestRequest {
    pub appointment_id: String,
    pub test_name: String,
    pub test_type: Option<String>,
    pub description: Option<String>,
}

/// FFI-safe thread message.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMessage {
    pub id: String,
    pub appointment_id: String,
    pub sender_id: String,
    pub message: String,
    pub timestamp: String,
}

impl From<AppointmentMessage> for FfiMessage {
    fn from(message: AppointmentMessage) -> Self {
        Self {
            id: message.id,
            appointment_id: message.appointment_id,
            sender_id: message.sender_id,
            message: message.message,
            timestamp: fmt_ts(&message.timestamp),
        }
    }
}
