//! Identity directory database operations: users, role profiles and pets.

use rusqlite::{params, OptionalExtension, Row};

use super::{fmt_ts, parse_ts, Database, DbError, DbResult};
use crate::models::{Assistant, Owner, Pet, Role, User, Vet};

impl Database {
    /// Insert a new user account.
    pub fn insert_user(&self, user: &User) -> DbResult<()> {
        let roles: Vec<&str> = user.roles.iter().map(Role::as_str).collect();
        let roles_json = serde_json::to_string(&roles)?;

        self.conn.execute(
            "INSERT INTO users (id, login, roles, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![user.id, user.login, roles_json, fmt_ts(&user.created_at)],
        )?;
        Ok(())
    }

    /// Get a user by ID.
    pub fn get_user(&self, user_id: &str) -> DbResult<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, login, roles, created_at FROM users WHERE id = ?",
                [user_id],
                UserRow::from_row,
            )
            .optional()?
            .map(User::try_from)
            .transpose()
    }

    /// Get a user by login (case-insensitive).
    pub fn get_user_by_login(&self, login: &str) -> DbResult<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, login, roles, created_at FROM users WHERE login = ?",
                [login.trim().to_lowercase()],
                UserRow::from_row,
            )
            .optional()?
            .map(User::try_from)
            .transpose()
    }

    /// Whether the user carries `role`. Unknown users carry nothing.
    pub fn user_has_role(&self, user_id: &str, role: Role) -> DbResult<bool> {
        Ok(self
            .get_user(user_id)?
            .map(|u| u.has_role(role))
            .unwrap_or(false))
    }

    pub fn insert_owner(&self, owner: &Owner) -> DbResult<()> {
        self.insert_profile("owners", &owner.id, &owner.user_id, &owner.name)
    }

    pub fn insert_vet(&self, vet: &Vet) -> DbResult<()> {
        self.insert_profile("vets", &vet.id, &vet.user_id, &vet.name)
    }

    pub fn insert_assistant(&self, assistant: &Assistant) -> DbResult<()> {
        self.insert_profile("assistants", &assistant.id, &assistant.user_id, &assistant.name)
    }

    pub fn get_owner(&self, owner_id: &str) -> DbResult<Option<Owner>> {
        Ok(self
            .profile_by("owners", "p.id", owner_id)?
            .map(|(id, user_id, name)| Owner { id, user_id, name }))
    }

    pub fn get_owner_by_user(&self, user_id: &str) -> DbResult<Option<Owner>> {
        Ok(self
            .profile_by("owners", "p.user_id", user_id)?
            .map(|(id, user_id, name)| Owner { id, user_id, name }))
    }

    pub fn get_owner_by_login(&self, login: &str) -> DbResult<Option<Owner>> {
        Ok(self
            .profile_by("owners", "u.login", &login.trim().to_lowercase())?
            .map(|(id, user_id, name)| Owner { id, user_id, name }))
    }

    pub fn get_vet(&self, vet_id: &str) -> DbResult<Option<Vet>> {
        Ok(self
            .profile_by("vets", "p.id", vet_id)?
            .map(|(id, user_id, name)| Vet { id, user_id, name }))
    }

    pub fn get_vet_by_user(&self, user_id: &str) -> DbResult<Option<Vet>> {
        Ok(self
            .profile_by("vets", "p.user_id", user_id)?
            .map(|(id, user_id, name)| Vet { id, user_id, name }))
    }

    pub fn get_vet_by_login(&self, login: &str) -> DbResult<Option<Vet>> {
        Ok(self
            .profile_by("vets", "u.login", &login.trim().to_lowercase())?
            .map(|(id, user_id, name)| Vet { id, user_id, name }))
    }

    pub fn get_assistant(&self, assistant_id: &str) -> DbResult<Option<Assistant>> {
        Ok(self
            .profile_by("assistants", "p.id", assistant_id)?
            .map(|(id, user_id, name)| Assistant { id, user_id, name }))
    }

    pub fn get_assistant_by_user(&self, user_id: &str) -> DbResult<Option<Assistant>> {
        Ok(self
            .profile_by("assistants", "p.user_id", user_id)?
            .map(|(id, user_id, name)| Assistant { id, user_id, name }))
    }

    pub fn get_assistant_by_login(&self, login: &str) -> DbResult<Option<Assistant>> {
        Ok(self
            .profile_by("assistants", "u.login", &login.trim().to_lowercase())?
            .map(|(id, user_id, name)| Assistant { id, user_id, name }))
    }

    /// Insert a new pet.
    pub fn insert_pet(&self, pet: &Pet) -> DbResult<()> {
        self.conn.execute(
            "INSERT INTO pets (id, name, species, owner_id) VALUES (?1, ?2, ?3, ?4)",
            params![pet.id, pet.name, pet.species, pet.owner_id],
        )?;
        Ok(())
    }

    /// Get a pet by ID.
    pub fn get_pet(&self, pet_id: &str) -> DbResult<Option<Pet>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, species, owner_id FROM pets WHERE id = ?",
                [pet_id],
                |row| {
                    Ok(Pet {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        species: row.get(2)?,
                        owner_id: row.get(3)?,
                    })
                },
            )
            .optional()?)
    }

    /// List pets belonging to an owner.
    pub fn list_pets_for_owner(&self, owner_id: &str) -> DbResult<Vec<Pet>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, species, owner_id FROM pets WHERE owner_id = ? ORDER BY name",
        )?;
        let pets = stmt
            .query_map([owner_id], |row| {
                Ok(Pet {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    species: row.get(2)?,
                    owner_id: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pets)
    }

    fn insert_profile(&self, table: &str, id: &str, user_id: &str, name: &str) -> DbResult<()> {
        self.conn.execute(
            &format!("INSERT INTO {} (id, user_id, name) VALUES (?1, ?2, ?3)", table),
            params![id, user_id, name],
        )?;
        Ok(())
    }

    /// Look up one profile row, joined to its user so it can be found by login.
    /// `table` and `column` are always crate-supplied constants.
    fn profile_by(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> DbResult<Option<(String, String, String)>> {
        let sql = format!(
            "SELECT p.id, p.user_id, p.name FROM {} p JOIN users u ON u.id = p.user_id WHERE {} = ?",
            table, column
        );
        Ok(self
            .conn
            .query_row(&sql, [value], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .optional()?)
    }
}

/// Intermediate row struct for database mapping.
struct UserRow {
    id: String,
    login: String,
    roles: String,
    created_at: String,
}

impl UserRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            login: row.get(1)?,
            roles: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

impl TryFrom<UserRow> for User {
    type Error = DbError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let names: Vec<String> = serde_json::from_str(&row.roles)?;
        let roles = names
            .iter()
            .map(|name| {
                Role::parse(name)
                    .ok_or_else(|| DbError::Constraint(format!("Unknown role: {}", name)))
            })
            .collect::<DbResult<Vec<_>>>()?;

        Ok(User {
            id: row.id,
            login: row.login,
            roles,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}
