use crate::domain::models::{AccessRule, Role, UserType};

impl AccessRule {
    /// A rule without a type covers every type of its role.
    pub fn matches(&self, role: Role, user_type: Option<UserType>) -> bool {
        self.role == role && self.user_type.map_or(true, |t| Some(t) == user_type)
    }
}

/// Whether a survey with `rules` is addressed to a user with `role` and `user_type`.
/// A survey without rules is open to everyone.
pub fn is_applicable(role: Role, user_type: Option<UserType>, rules: &[AccessRule]) -> bool {
    rules.is_empty() || rules.iter().any(|rule| rule.matches(role, user_type))
}

/// Applicability for completion counting: admins are never part of the population.
pub fn counts_toward(role: Role, user_type: Option<UserType>, rules: &[AccessRule]) -> bool {
    role.is_respondent() && is_applicable(role, user_type, rules)
}
