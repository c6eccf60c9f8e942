//! Appointment creation, availability probes and calendar queries.

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use tracing::{debug, info, warn};

use super::{
    found, non_blank, require_pet, require_user, ActorKind, ConflictPolicy, Entity,
    WorkflowError, WorkflowResult,
};
use crate::config::ClinicConfig;
use crate::db::{AppointmentQuery, Database};
use crate::models::{Appointment, AppointmentKind, LocationKind, Role};

/// An owner's (or a vet's on their behalf) booking request.
#[derive(Debug, Clone)]
pub struct AppointmentRequest {
    pub pet_id: String,
    pub vet_id: String,
    pub kind: AppointmentKind,
    pub location: LocationKind,
    pub time_start: DateTime<Utc>,
    /// Defaults to the kind's standard duration
    pub time_end: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

pub struct Scheduler<'a> {
    db: &'a Database,
    config: &'a ClinicConfig,
    policy: ConflictPolicy,
}

impl<'a> Scheduler<'a> {
    pub fn new(db: &'a Database, config: &'a ClinicConfig) -> Self {
        Self {
            db,
            config,
            policy: ConflictPolicy::from_config(config),
        }
    }

    /// Book a new PENDING appointment after checking the vet's calendar.
    pub fn create_appointment(
        &self,
        request: &AppointmentRequest,
        requester_login: &str,
    ) -> WorkflowResult<Appointment> {
        debug!(
            "Request to create appointment for pet {} with vet {} at {}",
            request.pet_id, request.vet_id, request.time_start
        );

        let appointment = self.db.immediate(|| -> WorkflowResult<_> {
            let pet = require_pet(self.db, &request.pet_id)?;
            let pet_owner_id = pet
                .owner_id
                .clone()
                .ok_or_else(|| WorkflowError::PetHasNoOwner(pet.id.clone()))?;
            let owner_id = self.effective_owner(requester_login, &pet_owner_id)?;

            let vet = found(self.db.get_vet(&request.vet_id)?, Entity::Vet, &request.vet_id)?;

            let time_start = request.time_start.trunc_subsecs(6);
            let time_end = match request.time_end {
                Some(end) => end.trunc_subsecs(6),
                None => time_start + self.config.default_duration(request.kind),
            };
            if time_end <= time_start {
                return Err(WorkflowError::InvalidInput(format!(
                    "time_end {} is not after time_start {}",
                    time_end, time_start
                )));
            }

            ensure_vet_available(self.db, &self.policy, &vet.id, time_start, None)?;

            let mut appointment = Appointment::new(
                time_start,
                time_end,
                request.kind,
                request.location,
                pet.id,
                owner_id,
                vet.id,
            );
            appointment.notes = non_blank(request.notes.as_deref());
            self.db.insert_appointment(&appointment)?;
            Ok(appointment)
        })?;

        info!(
            "Created appointment {} ({}) at {}",
            appointment.id,
            appointment.kind.as_str(),
            appointment.time_start
        );
        Ok(appointment)
    }

    /// The requester's own owner profile when it owns the pet, otherwise the
    /// pet's owner of record.
    fn effective_owner(&self, requester_login: &str, pet_owner_id: &str) -> WorkflowResult<String> {
        if let Some(owner) = self.db.get_owner_by_login(requester_login)? {
            if owner.id == pet_owner_id {
                return Ok(owner.id);
            }
        }
        debug!(
            "Requester {} is not the pet owner, booking for owner {}",
            requester_login, pet_owner_id
        );
        found(self.db.get_owner(pet_owner_id)?, Entity::Owner, pet_owner_id).map(|o| o.id)
    }

    /// Whether the vet could take an appointment starting at `start`.
    pub fn check_vet_availability(&self, vet_id: &str, start: DateTime<Utc>) -> WorkflowResult<bool> {
        found(self.db.get_vet(vet_id)?, Entity::Vet, vet_id)?;
        match ensure_vet_available(self.db, &self.policy, vet_id, start, None) {
            Ok(()) => Ok(true),
            Err(WorkflowError::Conflict { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Active appointments of a vet whose interval overlaps `[start, end)`.
    pub fn overlapping_for_vet(
        &self,
        vet_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> WorkflowResult<Vec<Appointment>> {
        Ok(self.db.list_overlapping_for_vet(vet_id, &start, &end)?)
    }

    /// Parse a `yyyy-MM-dd` day. Blank means today on the clinic clock.
    pub fn parse_day(&self, raw: &str) -> WorkflowResult<NaiveDate> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(self.policy.local_date(Utc::now()));
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| {
            WorkflowError::InvalidInput(format!("Invalid date {:?}, expected yyyy-MM-dd: {}", raw, e))
        })
    }

    /// Appointments on a clinic day, optionally narrowed by kind and vet id.
    pub fn appointments_on(
        &self,
        date: NaiveDate,
        kind: Option<AppointmentKind>,
        vet_id: Option<&str>,
    ) -> WorkflowResult<Vec<Appointment>> {
        let (from, until) = self.policy.day_bounds(date);
        Ok(self.db.list_appointments(&AppointmentQuery {
            from: Some(from),
            until: Some(until),
            kind,
            vet_id: vet_id.map(str::to_string),
            ..Default::default()
        })?)
    }

    /// Appointments on a clinic day for the vet behind `vet_login`.
    pub fn appointments_on_for_vet_login(
        &self,
        date: NaiveDate,
        kind: Option<AppointmentKind>,
        vet_login: &str,
    ) -> WorkflowResult<Vec<Appointment>> {
        match self.db.get_vet_by_login(vet_login)? {
            Some(vet) => self.appointments_on(date, kind, Some(&vet.id)),
            None => Ok(Vec::new()),
        }
    }

    pub fn appointments_for_vet_login(&self, vet_login: &str) -> WorkflowResult<Vec<Appointment>> {
        match self.db.get_vet_by_login(vet_login)? {
            Some(vet) => Ok(self.db.list_appointments(&AppointmentQuery {
                vet_id: Some(vet.id),
                ..Default::default()
            })?),
            None => Ok(Vec::new()),
        }
    }

    pub fn appointments_for_owner_login(&self, owner_login: &str) -> WorkflowResult<Vec<Appointment>> {
        match self.db.get_owner_by_login(owner_login)? {
            Some(owner) => Ok(self.db.list_appointments(&AppointmentQuery {
                owner_id: Some(owner.id),
                ..Default::default()
            })?),
            None => Ok(Vec::new()),
        }
    }

    pub fn appointments_for_pet(&self, pet_id: &str) -> WorkflowResult<Vec<Appointment>> {
        Ok(self.db.list_appointments(&AppointmentQuery {
            pet_id: Some(pet_id.to_string()),
            ..Default::default()
        })?)
    }

    /// A pet's appointment history. Vets see any pet; everyone else only
    /// pets they own.
    pub fn pet_history(&self, pet_id: &str, login: &str) -> WorkflowResult<Vec<Appointment>> {
        let pet = require_pet(self.db, pet_id)?;
        let user = require_user(self.db, login, Entity::User)?;

        if !user.has_role(Role::Vet) {
            let owns = match (self.db.get_owner_by_user(&user.id)?, &pet.owner_id) {
                (Some(owner), Some(owner_id)) => &owner.id == owner_id,
                _ => false,
            };
            if !owns {
                return Err(WorkflowError::NotAuthorized(format!(
                    "{} may not view the history of pet {}",
                    user.login, pet.id
                )));
            }
        }
        self.appointments_for_pet(&pet.id)
    }
}

/// Fail with a vet `Conflict` if `start` collides with the vet's active
/// appointments on the same clinic day. Runs inside the caller's transaction.
pub(crate) fn ensure_vet_available(
    db: &Database,
    policy: &ConflictPolicy,
    vet_id: &str,
    start: DateTime<Utc>,
    exclude_appointment: Option<&str>,
) -> WorkflowResult<()> {
    let (from, until) = policy.day_bounds_of(start);
    let existing = db.list_active_for_vet_between(vet_id, &from, &until, exclude_appointment)?;

    match policy.first_conflict(existing.iter().map(|a| a.time_start), start) {
        Some(conflicting_start) => {
            warn!(
                "Vet {} not available at {}: conflicts with {}",
                vet_id, start, conflicting_start
            );
            Err(WorkflowError::Conflict {
                actor: ActorKind::Vet,
                actor_id: vet_id.to_string(),
                conflicting_start,
            })
        }
        None => Ok(()),
    }
}
