use chrono::Utc;
use diesel::prelude::*;
use log::info;
use uuid::Uuid;

use super::error::{LearnError, LearnResult};
use super::types::{CreateUserRequest, UpdateProfileRequest, User, UserRole};
use super::LearnEngine;
use crate::core::shared::schema::learn::users;

pub(crate) fn normalize_email(email: &str) -> LearnResult<String> {
    let email = email.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'));
    if !valid || email.chars().any(char::is_whitespace) {
        return Err(LearnError::validation("A valid email address is required"));
    }
    Ok(email)
}

pub(crate) fn validate_name(name: &str) -> LearnResult<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > 100 {
        return Err(LearnError::validation("Name must be between 1 and 100 characters"));
    }
    Ok(name.to_string())
}

/// Roles a caller may pick at sign-up; admins are provisioned out of band
pub(crate) fn registration_role(requested: Option<UserRole>) -> LearnResult<UserRole> {
    match requested.unwrap_or(UserRole::Student) {
        UserRole::Admin => Err(LearnError::validation(
            "Role must be either student or instructor",
        )),
        role => Ok(role),
    }
}

impl LearnEngine {
    pub fn create_user(&self, req: CreateUserRequest) -> LearnResult<User> {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: validate_name(&req.name)?,
            email: normalize_email(&req.email)?,
            role: registration_role(req.role)?.to_string(),
            image_url: req.image_url,
            bio: None,
            created_at: now,
            updated_at: now,
        };

        let mut conn = self.conn()?;
        diesel::insert_into(users::table)
            .values(&user)
            .execute(&mut conn)
            .map_err(|e| match LearnError::from(e) {
                LearnError::Duplicate(_) => {
                    LearnError::Duplicate("An account with this email already exists".into())
                }
                other => other,
            })?;

        info!("Created user {} ({})", user.id, user.role);
        Ok(user)
    }

    pub fn find_user(&self, user_id: Uuid) -> LearnResult<Option<User>> {
        let mut conn = self.conn()?;
        Ok(users::table
            .filter(users::id.eq(user_id))
            .first::<User>(&mut conn)
            .optional()?)
    }

    pub fn get_user(&self, user_id: Uuid) -> LearnResult<User> {
        self.find_user(user_id)?
            .ok_or_else(|| LearnError::not_found("User"))
    }

    pub fn update_profile(&self, user_id: Uuid, req: UpdateProfileRequest) -> LearnResult<User> {
        let name = req.name.as_deref().map(validate_name).transpose()?;
        if req.bio.as_ref().is_some_and(|b| b.chars().count() > 2000) {
            return Err(LearnError::validation("Bio must be at most 2000 characters"));
        }

        let mut conn = self.conn()?;
        let mut user: User = users::table
            .filter(users::id.eq(user_id))
            .first(&mut conn)?;

        if let Some(name) = name {
            user.name = name;
        }
        if let Some(image_url) = req.image_url {
            user.image_url = Some(image_url).filter(|u| !u.trim().is_empty());
        }
        if let Some(bio) = req.bio {
            user.bio = Some(bio).filter(|b| !b.trim().is_empty());
        }
        user.updated_at = Utc::now();

        diesel::update(users::table.filter(users::id.eq(user_id)))
            .set((
                users::name.eq(&user.name),
                users::image_url.eq(&user.image_url),
                users::bio.eq(&user.bio),
                users::updated_at.eq(user.updated_at),
            ))
            .execute(&mut conn)?;

        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(
            normalize_email("  Ada@Example.COM ").unwrap(),
            "ada@example.com"
        );
        assert!(normalize_email("no-at-sign").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("ada@localhost").is_err());
        assert!(normalize_email("a da@example.com").is_err());
    }

    #[test]
    fn test_registration_role_rejects_admin() {
        assert_eq!(registration_role(None).unwrap(), UserRole::Student);
        assert_eq!(
            registration_role(Some(UserRole::Instructor)).unwrap(),
            UserRole::Instructor
        );
        assert!(matches!(
            registration_role(Some(UserRole::Admin)),
            Err(LearnError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("  Grace  ").unwrap(), "Grace");
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(101)).is_err());
    }
}
