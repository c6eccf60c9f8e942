//! SQLite schema definition.

/// Complete database schema for vetflow.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Identity Directory
-- ============================================================================

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    login TEXT NOT NULL UNIQUE,
    roles TEXT NOT NULL DEFAULT '[]',            -- JSON array of role names
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS owners (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL UNIQUE REFERENCES users(id),
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS vets (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL UNIQUE REFERENCES users(id),
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS assistants (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL UNIQUE REFERENCES users(id),
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pets (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    species TEXT NOT NULL,
    owner_id TEXT REFERENCES owners(id)          -- NULL for unowned animals
);

CREATE INDEX IF NOT EXISTS idx_pets_owner ON pets(owner_id);

-- ============================================================================
-- Appointments
-- ============================================================================

CREATE TABLE IF NOT EXISTS appointments (
    id TEXT PRIMARY KEY,
    time_start TEXT NOT NULL,                    -- fixed-width RFC 3339 UTC
    time_end TEXT,
    kind TEXT NOT NULL CHECK (kind IN ('EMERGENCY', 'NORMAL')),
    location TEXT NOT NULL CHECK (location IN ('AT_CLINIC', 'AT_HOME')),
    status TEXT NOT NULL CHECK (status IN (
        'PENDING', 'APPROVED', 'REJECTED', 'SCHEDULED', 'CONFIRMED',
        'IN_PROGRESS', 'RESCHEDULED', 'COMPLETED', 'CANCELLED'
    )),
    notes TEXT,
    pet_id TEXT NOT NULL REFERENCES pets(id),
    owner_id TEXT NOT NULL REFERENCES owners(id),
    vet_id TEXT REFERENCES vets(id),
    vet_bound INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK (time_end IS NULL OR time_end > time_start)
);

CREATE INDEX IF NOT EXISTS idx_appointments_vet_start ON appointments(vet_id, time_start);
CREATE INDEX IF NOT EXISTS idx_appointments_start ON appointments(time_start);
CREATE INDEX IF NOT EXISTS idx_appointments_owner ON appointments(owner_id);
CREATE INDEX IF NOT EXISTS idx_appointments_pet ON appointments(pet_id);

-- ============================================================================
-- Action Ledger (Append-Only - only status/completed_time change)
-- ============================================================================

CREATE TABLE IF NOT EXISTS appointment_actions (
    id TEXT PRIMARY KEY,
    appointment_id TEXT NOT NULL REFERENCES appointments(id),
    kind TEXT NOT NULL CHECK (kind IN (
        'APPROVE', 'REJECT', 'RESCHEDULE', 'ASSIGN_ASSISTANT', 'REQUEST_HOME_VISIT'
    )),
    status TEXT NOT NULL CHECK (status IN ('PENDING', 'COMPLETED', 'CANCELLED')),
    description TEXT NOT NULL,
    notes TEXT,
    scheduled_time TEXT NOT NULL,
    completed_time TEXT,
    created_by TEXT NOT NULL REFERENCES users(id),
    assigned_to TEXT REFERENCES users(id),
    prev_hash TEXT NOT NULL,
    entry_hash TEXT NOT NULL UNIQUE
);

CREATE INDEX IF NOT EXISTS idx_actions_appointment ON appointment_actions(appointment_id);
CREATE INDEX IF NOT EXISTS idx_actions_assigned ON appointment_actions(assigned_to, status);
CREATE INDEX IF NOT EXISTS idx_actions_created_by ON appointment_actions(created_by);
CREATE INDEX IF NOT EXISTS idx_actions_kind ON appointment_actions(kind);

-- Kind, creator and chain fields never change once written
CREATE TRIGGER IF NOT EXISTS appointment_actions_immutable BEFORE UPDATE ON appointment_actions
WHEN new.kind IS NOT old.kind
  OR new.created_by IS NOT old.created_by
  OR new.appointment_id IS NOT old.appointment_id
  OR new.entry_hash IS NOT old.entry_hash
BEGIN
    SELECT RAISE(ABORT, 'Ledger rows are immutable');
END;

CREATE TRIGGER IF NOT EXISTS appointment_actions_no_delete BEFORE DELETE ON appointment_actions
BEGIN
    SELECT RAISE(ABORT, 'Ledger rows cannot be deleted');
END;

-- ============================================================================
-- Appointment <-> Assistant links (idempotent)
-- ============================================================================

CREATE TABLE IF NOT EXISTS appointment_assistants (
    id TEXT PRIMARY KEY,
    appointment_id TEXT NOT NULL REFERENCES appointments(id),
    assistant_id TEXT NOT NULL REFERENCES assistants(id),
    created_at TEXT NOT NULL,
    UNIQUE (appointment_id, assistant_id)
);

CREATE INDEX IF NOT EXISTS idx_links_assistant ON appointment_assistants(assistant_id);

-- ============================================================================
-- Lab Tests
-- ============================================================================

CREATE TABLE IF NOT EXISTS lab_tests (
    id TEXT PRIMARY KEY,
    appointment_id TEXT NOT NULL REFERENCES appointments(id),
    pet_id TEXT NOT NULL REFERENCES pets(id),
    test_name TEXT NOT NULL,
    test_type TEXT,
    description TEXT,
    status TEXT NOT NULL CHECK (status IN (
        'REQUESTED', 'ASSIGNED', 'IN_PROGRESS', 'COMPLETED', 'CANCELLED'
    )),
    result TEXT,
    notes TEXT,
    requested_date TEXT NOT NULL,
    sample_collected_date TEXT,
    completed_date TEXT,
    requested_by TEXT NOT NULL REFERENCES users(id),
    assigned_to TEXT REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_lab_tests_appointment ON lab_tests(appointment_id);
CREATE INDEX IF NOT EXISTS idx_lab_tests_pet ON lab_tests(pet_id);
CREATE INDEX IF NOT EXISTS idx_lab_tests_assigned ON lab_tests(assigned_to, status);

-- ============================================================================
-- Appointment Messages (Append-Only)
-- ============================================================================

CREATE TABLE IF NOT EXISTS appointment_messages (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,       -- tie-breaker for equal timestamps
    id TEXT NOT NULL UNIQUE,
    appointment_id TEXT NOT NULL REFERENCES appointments(id),
    sender_id TEXT NOT NULL REFERENCES users(id),
    message TEXT NOT NULL,
    timestamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_appointment ON appointment_messages(appointment_id, timestamp);

CREATE TRIGGER IF NOT EXISTS appointment_messages_immutable BEFORE UPDATE ON appointment_messages
BEGIN
    SELECT RAISE(ABORT, 'Messages are immutable');
END;
"#;
